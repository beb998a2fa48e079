const FORM_TEMPLATE: &str = include_str!("../../../assets/index.html");
const THANKS_PAGE: &str = include_str!("../../../assets/obrigado.html");
pub(crate) const FORM_SCRIPT: &str = include_str!("../../../assets/script.js");

const ERROR_SLOT: &str = "{{error}}";

/// Registration page, optionally carrying a validation message.
pub fn form_page(error: Option<&str>) -> String {
    let slot = match error {
        Some(message) => format!("<p class=\"erro\">{}</p>", escape_html(message)),
        None => String::new(),
    };
    FORM_TEMPLATE.replace(ERROR_SLOT, &slot)
}

pub fn thanks_page() -> &'static str {
    THANKS_PAGE
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
