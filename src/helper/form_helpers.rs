use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";
pub const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

pub const CONTACT_NAME_MAX: usize = 100;
pub const USERNAME_MAX: usize = 150;
pub const POST_TITLE_MAX: usize = 200;
pub const PASSWORD_MIN: usize = 8;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password12", "password123", "passw0rd", "12345678", "123456789",
    "1234567890", "qwertyuiop", "qwerty123", "iloveyou", "sunshine", "princess", "football",
    "baseball", "welcome1", "letmein1", "trustno1", "superman", "starwars", "dragon12",
    "monkey123", "abc12345", "abcdefgh", "11111111", "00000000", "aaaaaaaa", "zaq12wsx",
    "1q2w3e4r", "qazwsxedc", "changeme", "administrator", "whatever", "computer", "internet",
];

/// Field-level and form-level validation messages, rendered next to the inputs.
#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub non_field: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }
}

fn max_length_message(max: usize, actual: usize) -> String {
    format!(
        "Ensure this value has at most {} characters (it has {}).",
        max, actual
    )
}

fn check_required(errors: &mut FormErrors, field: &str, value: &str) -> bool {
    if value.is_empty() {
        errors.add(field, REQUIRED);
        false
    } else {
        true
    }
}

fn check_max_length(errors: &mut FormErrors, field: &str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(field, max_length_message(max, len));
    }
}

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

// --- Contact ---

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

impl ContactForm {
    pub fn cleaned(self) -> Self {
        ContactForm {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            message: self.message,
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if check_required(&mut errors, "name", &self.name) {
            check_max_length(&mut errors, "name", &self.name, CONTACT_NAME_MAX);
        }
        if check_required(&mut errors, "email", &self.email) && !is_valid_email(&self.email) {
            errors.add("email", INVALID_EMAIL);
        }
        if self.message.trim().is_empty() {
            errors.add("message", REQUIRED);
        }
        errors
    }
}

// --- Registration ---

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password1: String,
    #[serde(default, skip_serializing)]
    pub password2: String,
}

impl RegistrationForm {
    pub fn cleaned(self) -> Self {
        RegistrationForm {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            ..self
        }
    }

    /// Checks everything that does not need the database.
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();

        if check_required(&mut errors, "username", &self.username) {
            check_max_length(&mut errors, "username", &self.username, USERNAME_MAX);
            if !USERNAME_RE.is_match(&self.username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }

        if check_required(&mut errors, "email", &self.email) && !is_valid_email(&self.email) {
            errors.add("email", INVALID_EMAIL);
        }

        let has_password1 = check_required(&mut errors, "password1", &self.password1);
        let has_password2 = check_required(&mut errors, "password2", &self.password2);
        if has_password1 && has_password2 {
            if self.password1 != self.password2 {
                errors.add("password2", PASSWORD_MISMATCH);
            } else {
                for message in password_policy_errors(&self.password1, &self.username, &self.email) {
                    errors.add("password2", message);
                }
            }
        }

        errors
    }
}

fn too_similar(password: &str, attribute: &str) -> bool {
    let password = password.to_lowercase();
    let attribute = attribute.to_lowercase();
    if attribute.chars().count() < 3 {
        return false;
    }
    password == attribute || password.contains(&attribute) || attribute.contains(&password)
}

/// Length, numeric-only, common-password and user-attribute similarity checks.
pub fn password_policy_errors(password: &str, username: &str, email: &str) -> Vec<String> {
    let mut messages = Vec::new();

    let email_local = email.split('@').next().unwrap_or_default();
    if [username, email, email_local]
        .iter()
        .any(|attribute| too_similar(password, attribute))
    {
        let which = if too_similar(password, username) { "username" } else { "email address" };
        messages.push(format!("The password is too similar to the {}.", which));
    }

    if password.chars().count() < PASSWORD_MIN {
        messages.push(format!(
            "This password is too short. It must contain at least {} characters.",
            PASSWORD_MIN
        ));
    }

    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        messages.push("This password is too common.".to_string());
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        messages.push("This password is entirely numeric.".to_string());
    }

    messages
}

// --- Login ---

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        check_required(&mut errors, "username", self.username.trim());
        check_required(&mut errors, "password", &self.password);
        errors
    }
}

// --- Post ---

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl PostForm {
    pub fn cleaned(self) -> Self {
        PostForm {
            title: self.title.trim().to_string(),
            content: self.content,
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if check_required(&mut errors, "title", &self.title) {
            check_max_length(&mut errors, "title", &self.title, POST_TITLE_MAX);
        }
        if self.content.trim().is_empty() {
            errors.add("content", REQUIRED);
        }
        errors
    }
}
