//! Form bodies posted by the HTML pages, validated with `validator`.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("username regex is valid"));

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        let mut err = ValidationError::new("username_chars");
        err.message = Some(Cow::Borrowed(
            "Usernames must have only letters, numbers, dots or underscores.",
        ));
        Err(err)
    }
}

fn validate_optional_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() || password.chars().count() >= 8 {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_length");
        err.message = Some(Cow::Borrowed("New password must be at least 8 characters."));
        Err(err)
    }
}

/// HTML checkboxes post a value only when ticked.
pub fn checked(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty() && v != "false")
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegistrationForm {
    #[validate(
        length(min = 4, max = 32, message = "Username must be 4 to 32 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(
        email(message = "Invalid email address."),
        length(min = 6, max = 64, message = "Email must be 6 to 64 characters.")
    )]
    pub email: String,
    #[validate(
        length(min = 8, message = "Password must be at least 8 characters."),
        must_match(other = "confirm_password", message = "Passwords must match.")
    )]
    pub password: String,
    pub confirm_password: String,
    pub terms_of_service: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    pub remember_me: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ResetPasswordRequestForm {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ResetPasswordForm {
    #[validate(
        length(min = 8, message = "Password must be at least 8 characters."),
        must_match(other = "confirm_password", message = "Passwords must match.")
    )]
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ChangePasswordForm {
    #[validate(length(min = 1, message = "Old password is required."))]
    pub old_password: String,
    #[validate(
        length(min = 8, message = "Password must be at least 8 characters."),
        must_match(other = "confirm_new_password", message = "Passwords must match.")
    )]
    pub new_password: String,
    pub confirm_new_password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ChangeEmailForm {
    #[validate(
        email(message = "Please enter a valid email address."),
        length(min = 6, max = 64, message = "Email must be 6 to 64 characters.")
    )]
    pub new_email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct EditProfileForm {
    #[serde(default)]
    #[validate(length(max = 64, message = "Name must be at most 64 characters."))]
    pub name: String,
    #[validate(
        length(min = 4, max = 32, message = "Username must be 4 to 32 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(length(max = 64, message = "Location must be at most 64 characters."))]
    pub location: String,
    #[serde(default)]
    pub about_me: String,
}

/// Profile form as posted by an administrator. Non-administrators post the
/// same page without the admin-only fields; see [`EditProfileAdminForm::profile`].
#[derive(Debug, Default, Deserialize, Validate)]
pub struct EditProfileAdminForm {
    #[serde(default)]
    #[validate(length(max = 64, message = "Name must be at most 64 characters."))]
    pub name: String,
    #[validate(
        length(min = 4, max = 32, message = "Username must be 4 to 32 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(
        email(message = "Invalid email address."),
        length(min = 6, max = 64, message = "Email must be 6 to 64 characters.")
    )]
    pub email: String,
    pub confirmed: Option<String>,
    #[serde(default)]
    #[validate(
        custom(function = "validate_optional_password"),
        must_match(other = "confirm_new_password", message = "Passwords must match.")
    )]
    pub new_password: String,
    #[serde(default)]
    pub confirm_new_password: String,
    /// Absent when a non-administrator posts the plain profile form.
    pub role: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 64, message = "Location must be at most 64 characters."))]
    pub location: String,
    #[serde(default)]
    pub about_me: String,
}

impl EditProfileAdminForm {
    /// The subset of fields every user may edit.
    pub fn profile(&self) -> EditProfileForm {
        EditProfileForm {
            name: self.name.clone(),
            username: self.username.clone(),
            location: self.location.clone(),
            about_me: self.about_me.clone(),
        }
    }
}

/// Post fields; built from a multipart body rather than deserialized.
#[derive(Debug, Default, Validate)]
pub struct PostForm {
    #[validate(length(min = 1, max = 128, message = "Title must be 1 to 128 characters."))]
    pub title: String,
    #[validate(length(min = 1, message = "Post body is required."))]
    pub raw_body: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CommentForm {
    #[validate(length(min = 1, max = 144, message = "Comments must be 1 to 144 characters."))]
    pub raw_body: String,
}

/// Flatten validation errors into messages for display, ordered by field.
pub fn error_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("Invalid value for {}.", field.replace('_', " ")),
            })
        })
        .collect()
}

/// Empty optional text inputs are stored as NULL.
pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
            terms_of_service: Some("y".to_string()),
        }
    }

    #[test]
    fn valid_registration_passes() {
        let form = registration("alice_1", "alice@example.com", "password1", "password1");
        assert!(form.validate().is_ok());
    }

    #[test]
    fn username_rules() {
        let too_long = "a".repeat(33);
        for bad in ["abc", "1alice", "al ice", "alice!", too_long.as_str()] {
            let form = registration(bad, "alice@example.com", "password1", "password1");
            assert!(form.validate().is_err(), "{} should be rejected", bad);
        }
        let dotted = registration("a.l_ice9", "alice@example.com", "password1", "password1");
        assert!(dotted.validate().is_ok());
    }

    #[test]
    fn password_mismatch_is_reported() {
        let form = registration("alice", "alice@example.com", "password1", "password2");
        let errors = form.validate().unwrap_err();
        assert!(error_messages(&errors).contains(&"Passwords must match.".to_string()));
    }

    #[test]
    fn short_password_and_bad_email_are_reported() {
        let form = registration("alice", "nope", "short", "short");
        let messages = error_messages(&form.validate().unwrap_err());
        assert!(messages.iter().any(|m| m.contains("email")));
        assert!(messages.iter().any(|m| m.contains("at least 8")));
    }

    #[test]
    fn comment_length_is_capped() {
        let ok = CommentForm {
            raw_body: "x".repeat(144),
        };
        assert!(ok.validate().is_ok());
        let long = CommentForm {
            raw_body: "x".repeat(145),
        };
        assert!(long.validate().is_err());
        let empty = CommentForm {
            raw_body: String::new(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn post_title_is_required_and_capped() {
        let empty = PostForm {
            title: String::new(),
            raw_body: "body".into(),
        };
        assert!(empty.validate().is_err());
        let long = PostForm {
            title: "t".repeat(129),
            raw_body: "body".into(),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn admin_form_allows_blank_new_password() {
        let form = EditProfileAdminForm {
            username: "alice".into(),
            email: "alice@example.com".into(),
            role: Some(1),
            ..Default::default()
        };
        assert!(form.validate().is_ok());

        let short = EditProfileAdminForm {
            new_password: "short".into(),
            confirm_new_password: "short".into(),
            ..form
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn checkbox_values() {
        assert!(checked(&Some("on".into())));
        assert!(checked(&Some("y".into())));
        assert!(!checked(&Some(String::new())));
        assert!(!checked(&None));
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty("  Oxford "), Some("Oxford"));
        assert_eq!(non_empty("   "), None);
    }
}
