use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validation messages keyed by form field, in the order they were found.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(Vec<(&'static str, &'static str)>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: &'static str) {
        self.0.push((field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'static str> + 'a {
        self.0
            .iter()
            .filter(move |(f, _)| *f == field)
            .map(|(_, m)| *m)
    }
}

fn required(errors: &mut FieldErrors, field: &'static str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, "This field is required.");
        return false;
    }
    true
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Trims the username and normalizes the email in place, then validates.
    pub fn clean(&mut self) -> FieldErrors {
        self.username = self.username.trim().to_string();
        self.email = normalize_email(&self.email);

        let mut errors = FieldErrors::default();
        if required(&mut errors, "username", &self.username) {
            let len = self.username.chars().count();
            if !(2..=150).contains(&len) {
                errors.add("username", "Field must be between 2 and 150 characters long.");
            }
        }
        if required(&mut errors, "email", &self.email) {
            if !is_valid_email(&self.email) {
                errors.add("email", "Invalid email address.");
            }
            if self.email.chars().count() > 120 {
                errors.add("email", "Field cannot be longer than 120 characters.");
            }
        }
        if required(&mut errors, "password", &self.password) && self.password.chars().count() < 8 {
            errors.add("password", "Field must be at least 8 characters long.");
        }
        if required(&mut errors, "confirm_password", &self.confirm_password)
            && self.confirm_password != self.password
        {
            errors.add("confirm_password", "Field must be equal to password.");
        }
        errors
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn clean(&mut self) -> FieldErrors {
        self.email = normalize_email(&self.email);
        let mut errors = FieldErrors::default();
        required(&mut errors, "email", &self.email);
        required(&mut errors, "password", &self.password);
        errors
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct EmailForm {
    #[serde(default)]
    pub email: String,
}

impl EmailForm {
    pub fn clean(&mut self) -> FieldErrors {
        self.email = normalize_email(&self.email);
        let mut errors = FieldErrors::default();
        if required(&mut errors, "email", &self.email) && !is_valid_email(&self.email) {
            errors.add("email", "Invalid email address.");
        }
        errors
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl ResetPasswordForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        if required(&mut errors, "password", &self.password) && self.password.chars().count() < 8 {
            errors.add("password", "Password must be at least 8 characters long");
        }
        if required(&mut errors, "confirm_password", &self.confirm_password)
            && self.confirm_password != self.password
        {
            errors.add("confirm_password", "Passwords must match");
        }
        errors
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_new_password: String,
}

impl ProfileForm {
    /// Presence only; whether the new passwords match is reported as a flash.
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        required(&mut errors, "current_password", &self.current_password);
        required(&mut errors, "new_password", &self.new_password);
        required(&mut errors, "confirm_new_password", &self.confirm_new_password);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn email_regex() {
        assert!(is_valid_email("alice@example.com"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn registration_normalizes_and_accepts_valid_input() {
        let mut form = registration(" alice ", " Alice@Example.COM ", "password123", "password123");
        assert!(form.clean().is_empty());
        assert_eq!(form.username, "alice");
        assert_eq!(form.email, "alice@example.com");
    }

    #[test]
    fn registration_rules() {
        let mut form = registration("a", "not-an-email", "short", "different");
        let errors = form.clean();
        assert_eq!(errors.for_field("username").count(), 1);
        assert_eq!(
            errors.for_field("email").collect::<Vec<_>>(),
            vec!["Invalid email address."]
        );
        assert_eq!(errors.for_field("password").count(), 1);
        assert_eq!(errors.for_field("confirm_password").count(), 1);

        let long_email = format!("{}@example.com", "a".repeat(120));
        let mut form = registration("alice", &long_email, "password123", "password123");
        assert_eq!(
            form.clean().for_field("email").collect::<Vec<_>>(),
            vec!["Field cannot be longer than 120 characters."]
        );

        let mut form = registration("", "", "", "");
        let errors = form.clean();
        assert_eq!(
            errors.for_field("username").collect::<Vec<_>>(),
            vec!["This field is required."]
        );
    }

    #[test]
    fn reset_password_rules() {
        let form = ResetPasswordForm {
            password: "short".into(),
            confirm_password: "other".into(),
        };
        let errors = form.validate();
        assert_eq!(
            errors.for_field("password").collect::<Vec<_>>(),
            vec!["Password must be at least 8 characters long"]
        );
        assert_eq!(
            errors.for_field("confirm_password").collect::<Vec<_>>(),
            vec!["Passwords must match"]
        );
    }

    #[test]
    fn profile_and_login_require_fields() {
        assert_eq!(ProfileForm::default().validate().for_field("new_password").count(), 1);
        let mut login = LoginForm::default();
        let errors = login.clean();
        assert_eq!(errors.for_field("email").count(), 1);
        assert_eq!(errors.for_field("password").count(), 1);
    }

    #[test]
    fn email_form_requires_valid_address() {
        let mut form = EmailForm {
            email: "nope".into(),
        };
        assert!(!form.clean().is_empty());
        let mut form = EmailForm {
            email: "Bob@Example.com".into(),
        };
        assert!(form.clean().is_empty());
        assert_eq!(form.email, "bob@example.com");
    }
}
