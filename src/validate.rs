use axum::extract::{FromRequest, FromRequestParts};

use crate::appresult::{AppError, AppResult, FieldErrors, NON_FIELD_ERRORS};

/// `axum::Json` whose rejection renders as a field-level validation error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` that answers a malformed id with a JSON 404.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

/// Collects field errors so a request reports every bad field at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    /// Trimmed, non-blank and at most `max` characters.
    pub fn required(&mut self, field: &str, value: Option<&str>, max: Option<usize>) -> Option<String> {
        let Some(value) = value else {
            self.error(field, REQUIRED);
            return None;
        };
        let value = value.trim();
        if value.is_empty() {
            self.error(field, BLANK);
            return None;
        }
        self.bounded(field, value, max)
    }

    /// Trimmed; blank becomes `None`.
    pub fn optional(&mut self, field: &str, value: Option<&str>, max: Option<usize>) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.bounded(field, value, max)
    }

    /// Present and non-empty, taken verbatim.
    pub fn secret(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        match value {
            None => {
                self.error(field, REQUIRED);
                None
            }
            Some("") => {
                self.error(field, BLANK);
                None
            }
            Some(value) => Some(value.to_owned()),
        }
    }

    pub fn choice(&mut self, field: &str, value: Option<&str>, choices: &[&str]) -> Option<String> {
        let value = value?;
        if choices.contains(&value) {
            Some(value.to_owned())
        } else {
            self.error(field, format!("\"{value}\" is not a valid choice."));
            None
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let value = self.required(field, value, Some(254))?;
        if looks_like_email(&value) {
            Some(value.to_lowercase())
        } else {
            self.error(field, "Enter a valid email address.");
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Folds the errors of a nested object under `field`.
    pub fn nest(&mut self, field: &str, inner: Validator) {
        for (name, messages) in inner.errors {
            for message in messages {
                self.error(&format!("{field}.{name}"), message);
            }
        }
    }

    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }

    /// `value` once every check has passed.
    pub fn finish_with<T>(self, value: Option<T>) -> AppResult<T> {
        self.finish()?;
        value.ok_or_else(|| AppError::field(NON_FIELD_ERRORS, "Invalid data."))
    }

    fn bounded(&mut self, field: &str, value: &str, max: Option<usize>) -> Option<String> {
        match max {
            Some(max) if value.chars().count() > max => {
                self.error(field, format!("Ensure this field has no more than {max} characters."));
                None
            }
            _ => Some(value.to_owned()),
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !value.contains(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(v: Validator) -> FieldErrors {
        match v.finish() {
            Err(AppError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn required_reports_missing_and_blank() {
        let mut v = Validator::new();
        assert_eq!(v.required("name", None, None), None);
        assert_eq!(v.required("title", Some("   "), None), None);
        let errors = errors(v);
        assert_eq!(errors["name"], vec![REQUIRED]);
        assert_eq!(errors["title"], vec![BLANK]);
    }

    #[test]
    fn required_trims_and_bounds() {
        let mut v = Validator::new();
        assert_eq!(v.required("name", Some("  flu  "), Some(3)).as_deref(), Some("flu"));
        assert_eq!(v.required("name", Some("asthma"), Some(3)), None);
        assert_eq!(
            errors(v)["name"],
            vec!["Ensure this field has no more than 3 characters."]
        );
    }

    #[test]
    fn optional_blank_is_none() {
        let mut v = Validator::new();
        assert_eq!(v.optional("region", Some(" "), Some(100)), None);
        assert_eq!(v.optional("region", None, Some(100)), None);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn secret_is_not_trimmed() {
        let mut v = Validator::new();
        assert_eq!(v.secret("password", Some(" pw ")).as_deref(), Some(" pw "));
        assert_eq!(v.secret("password", Some("")), None);
        assert_eq!(errors(v)["password"], vec![BLANK]);
    }

    #[test]
    fn finish_with_returns_value_or_errors() {
        assert_eq!(Validator::new().finish_with(Some(3)).unwrap(), 3);

        let mut v = Validator::new();
        v.error("name", BLANK);
        assert!(matches!(v.finish_with(Some(3)), Err(AppError::Validation(_))));
    }

    #[test]
    fn choice_rejects_unknown() {
        let mut v = Validator::new();
        assert_eq!(v.choice("gender", Some("male"), &["male", "female"]).as_deref(), Some("male"));
        assert_eq!(v.choice("gender", Some("x"), &["male", "female"]), None);
        assert_eq!(errors(v)["gender"], vec!["\"x\" is not a valid choice."]);
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a b@c.de"));
        assert!(!looks_like_email("a@.de"));

        let mut v = Validator::new();
        assert_eq!(v.email("email", Some(" Nour@Clinic.org ")).as_deref(), Some("nour@clinic.org"));
        assert!(v.is_valid());
    }

    #[test]
    fn nest_prefixes_fields() {
        let mut inner = Validator::new();
        inner.error("email", REQUIRED);
        let mut outer = Validator::new();
        outer.nest("user", inner);
        assert_eq!(errors(outer)["user.email"], vec![REQUIRED]);
    }
}
