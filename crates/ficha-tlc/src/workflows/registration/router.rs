use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use super::form::RegistrationForm;
use super::intake::{IntakeError, IntakeService};
use super::pages;
use super::reconciliation::{Notification, ReconciliationError, ReconciliationService};
use super::repository::RegistrationRepository;
use crate::notify::Notifier;
use crate::payments::PaymentGateway;

/// Services shared by the registration routes.
pub struct RegistrationState<R, G, N> {
    pub intake: Arc<IntakeService<R, G>>,
    pub reconciliation: Arc<ReconciliationService<R, G, N>>,
}

impl<R, G, N> Clone for RegistrationState<R, G, N> {
    fn clone(&self) -> Self {
        Self {
            intake: Arc::clone(&self.intake),
            reconciliation: Arc::clone(&self.reconciliation),
        }
    }
}

/// Router builder exposing the form, the thank-you page and the webhook.
pub fn registration_router<R, G, N>(state: RegistrationState<R, G, N>) -> Router
where
    R: RegistrationRepository + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/",
            get(form_handler).post(submit_handler::<R, G, N>),
        )
        .route("/obrigado", get(thanks_handler))
        .route("/webhook", axum::routing::post(webhook_handler::<R, G, N>))
        .route("/static/script.js", get(script_handler))
        .with_state(state)
}

pub(crate) async fn form_handler() -> Html<String> {
    Html(pages::form_page(None))
}

pub(crate) async fn thanks_handler() -> Html<&'static str> {
    Html(pages::thanks_page())
}

pub(crate) async fn script_handler() -> Response {
    let mime = mime_guess::from_path("script.js").first_or_octet_stream();
    (
        [(header::CONTENT_TYPE, mime.essence_str().to_string())],
        pages::FORM_SCRIPT,
    )
        .into_response()
}

pub(crate) async fn submit_handler<R, G, N>(
    State(state): State<RegistrationState<R, G, N>>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response
where
    R: RegistrationRepository + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match state.intake.submit(RegistrationForm::from(pairs)).await {
        Ok(receipt) => Redirect::to(receipt.redirect_url()).into_response(),
        Err(IntakeError::Form(err)) => {
            warn!(error = %err, "registration rejected");
            (
                StatusCode::BAD_REQUEST,
                Html(pages::form_page(Some(&err.to_string()))),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = ?err, "registration failed");
            internal_error()
        }
    }
}

pub(crate) async fn webhook_handler<R, G, N>(
    State(state): State<RegistrationState<R, G, N>>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response
where
    R: RegistrationRepository + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let notification = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Notification::from_query(&params))
    } else {
        Notification::from_json(&body).map(|parsed| parsed.or_query(&params))
    };

    let result = match notification {
        Ok(notification) => state.reconciliation.reconcile(notification).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(ReconciliationError::Malformed(reason)) => {
            warn!(%reason, "malformed notification");
            let payload = json!({ "error": format!("malformed notification: {reason}") });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        Err(ReconciliationError::PaymentNotFound(payment_id)) => {
            warn!(%payment_id, "notification for unknown payment");
            let payload = json!({ "error": "payment not found", "payment_id": payment_id });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => {
            error!(error = ?err, "reconciliation failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    let payload = json!({ "error": "internal server error" });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
