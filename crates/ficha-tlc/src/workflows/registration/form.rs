//! Turns the raw urlencoded pairs posted by the registration page into a
//! [`NewRegistration`].
//!
//! Pairs are taken as a list rather than a map because guardian fields repeat
//! (`nome_responsavel[]` and friends) and are zipped back together by position.

use super::domain::{Guardian, HealthDisclosures, NewRegistration, Sacraments};

const NAME_KEYS: &[&str] = &["nome_cursista", "name"];
const PHONE_KEYS: &[&str] = &["telefone_cursista", "phone"];
const ADDRESS_KEYS: &[&str] = &["endereco_cursista", "address"];

const GUARDIAN_NAME: &str = "nome_responsavel[]";
const GUARDIAN_ADDRESS: &str = "endereco_responsavel[]";
const GUARDIAN_PHONE: &str = "telefone_responsavel[]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for field: {0}")]
    InvalidField(&'static str),
}

/// Submitted form, as received.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pairs: Vec<(String, String)>,
}

impl From<Vec<(String, String)>> for RegistrationForm {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl RegistrationForm {
    pub fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.pairs
                .iter()
                .find(|(name, value)| name == key && !value.trim().is_empty())
                .map(|(_, value)| value.trim())
        })
    }

    fn all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.trim())
            .collect()
    }

    fn answered_yes(&self, key: &str) -> bool {
        self.first(&[key])
            .map(|value| matches!(value.to_lowercase().as_str(), "sim" | "yes" | "on" | "true"))
            .unwrap_or(false)
    }

    fn disclosure(&self, flag: &str, detail: &str) -> Option<String> {
        if self.answered_yes(flag) {
            Some(self.first(&[detail]).unwrap_or_default().to_string())
        } else {
            None
        }
    }

    /// Validates required fields and normalizes the rest.
    pub fn into_registration(self) -> Result<NewRegistration, FormError> {
        let name = self
            .first(NAME_KEYS)
            .ok_or(FormError::MissingField("name"))?
            .to_string();
        let phone = normalize_phone(
            self.first(PHONE_KEYS)
                .ok_or(FormError::MissingField("phone"))?,
        );
        if phone.is_empty() {
            return Err(FormError::InvalidField("phone"));
        }

        Ok(NewRegistration {
            name,
            phone,
            address: self.first(ADDRESS_KEYS).map(str::to_string),
            guardians: self.guardians(),
            health: HealthDisclosures {
                controlled_medication: self.disclosure("remedio_controlado", "qual_remedio"),
                mobility_impairment: self.disclosure("deficiencia_locomocao", "qual_deficiencia"),
                mental_health_condition: self.disclosure("condicao_mental", "qual_condicao"),
            },
            sacraments: Sacraments {
                baptism: self.answered_yes("batismo"),
                first_communion: self.answered_yes("eucaristia"),
                confirmation: self.answered_yes("crisma"),
            },
        })
    }

    fn guardians(&self) -> Vec<Guardian> {
        let names = self.all(GUARDIAN_NAME);
        let addresses = self.all(GUARDIAN_ADDRESS);
        let phones = self.all(GUARDIAN_PHONE);

        names
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(index, name)| Guardian {
                name: (*name).to_string(),
                address: non_blank(addresses.get(index).copied()),
                phone: non_blank(phones.get(index).copied().map(normalize_phone).as_deref()),
            })
            .collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Keeps digits only; the page asks for `11991234567` but people type masks.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> RegistrationForm {
        RegistrationForm::from(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn minimal_form_with_portuguese_keys() {
        let registration = form(&[
            ("nome_cursista", " Ana "),
            ("telefone_cursista", "(11) 99999-0000"),
        ])
        .into_registration()
        .expect("valid form");

        assert_eq!(registration.name, "Ana");
        assert_eq!(registration.phone, "11999990000");
        assert!(registration.guardians.is_empty());
        assert_eq!(registration.health, HealthDisclosures::default());
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = form(&[("name", "   "), ("phone", "123")])
            .into_registration()
            .expect_err("name is blank");
        assert_eq!(err, FormError::MissingField("name"));
    }

    #[test]
    fn phone_without_digits_is_rejected() {
        let err = form(&[("name", "Ana"), ("phone", "n/a")])
            .into_registration()
            .expect_err("phone has no digits");
        assert_eq!(err, FormError::InvalidField("phone"));
        assert_eq!(err.to_string(), "invalid value for field: phone");

        let err = form(&[("name", "Ana"), ("phone", " ")])
            .into_registration()
            .expect_err("phone is blank");
        assert_eq!(err, FormError::MissingField("phone"));
    }

    #[test]
    fn guardians_are_zipped_by_position_and_blank_names_dropped() {
        let registration = form(&[
            ("name", "Ana"),
            ("phone", "5511999990000"),
            ("nome_responsavel[]", "Maria"),
            ("endereco_responsavel[]", "Rua A, 10"),
            ("telefone_responsavel[]", "11 98888-7777"),
            ("nome_responsavel[]", ""),
            ("endereco_responsavel[]", "Rua B"),
            ("telefone_responsavel[]", ""),
            ("nome_responsavel[]", "José"),
        ])
        .into_registration()
        .expect("valid form");

        assert_eq!(
            registration.guardians,
            vec![
                Guardian {
                    name: "Maria".to_string(),
                    address: Some("Rua A, 10".to_string()),
                    phone: Some("11988887777".to_string()),
                },
                Guardian {
                    name: "José".to_string(),
                    address: None,
                    phone: None,
                },
            ]
        );
    }

    #[test]
    fn disclosure_details_only_kept_when_answered_yes() {
        let registration = form(&[
            ("name", "Ana"),
            ("phone", "1"),
            ("remedio_controlado", "Sim"),
            ("qual_remedio", "Ritalina"),
            ("deficiencia_locomocao", "Não"),
            ("qual_deficiencia", "stale value"),
            ("batismo", "Sim"),
            ("crisma", "Não"),
        ])
        .into_registration()
        .expect("valid form");

        assert_eq!(
            registration.health.controlled_medication.as_deref(),
            Some("Ritalina")
        );
        assert_eq!(registration.health.mobility_impairment, None);
        assert!(registration.sacraments.baptism);
        assert!(!registration.sacraments.confirmation);
    }
}
