use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{assets::services::PendingUpload, error::AppError, users::repo_types::PublicUser};

/// Multipart registration form as received; fields are optional until validated.
#[derive(Debug, Default)]
pub struct RegisterForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<PendingUpload>,
    pub cover: Option<PendingUpload>,
}

/// Registration input that passed field validation.
#[derive(Debug)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Validated form plus the files still to be uploaded.
#[derive(Debug)]
pub struct ValidatedRegistration {
    pub profile: Registration,
    pub avatar: PendingUpload,
    pub cover: Option<PendingUpload>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Loose shape check: one `@` with something on either side, no whitespace.
pub(crate) fn validate_email(email: &str) -> Result<(), AppError> {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap();
    }
    if !EMAIL_RE.is_match(email) {
        return Err(AppError::validation("Email is required"));
    }
    Ok(())
}

impl RegisterForm {
    pub fn validate(self) -> Result<ValidatedRegistration, AppError> {
        let full_name =
            non_blank(self.full_name).ok_or_else(|| AppError::validation("Full Name is required"))?;
        let email = non_blank(self.email).unwrap_or_default();
        validate_email(&email)?;
        let username = non_blank(self.username)
            .ok_or_else(|| AppError::validation("Username is required"))?
            .to_lowercase();
        // passwords are taken verbatim, only emptiness is checked
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::validation("Password is required"))?;
        let avatar = self
            .avatar
            .filter(|f| !f.body.is_empty())
            .ok_or_else(|| AppError::validation("Avatar is required"))?;
        let cover = self.cover.filter(|f| !f.body.is_empty());

        Ok(ValidatedRegistration {
            profile: Registration {
                full_name,
                email,
                username,
                password,
            },
            avatar,
            cover,
        })
    }
}

/// Request body for login: either identifier plus password.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Login identifier; username already lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl LoginRequest {
    pub fn validate(self) -> Result<(LoginIdentity, String), AppError> {
        let username = non_blank(self.username).map(|u| u.to_lowercase());
        let email = non_blank(self.email);
        if username.is_none() && email.is_none() {
            return Err(AppError::validation("Email or username is required"));
        }
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::validation("Password is required"))?;
        Ok((LoginIdentity { username, email }, password))
    }
}

/// Request body for token refresh; the cookie takes precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.old_password.is_empty() || self.new_password.is_empty() {
            return Err(AppError::validation("Old and new password are required"));
        }
        Ok(())
    }
}

/// Freshly minted access/refresh pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn upload() -> PendingUpload {
        PendingUpload {
            body: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        }
    }

    fn form() -> RegisterForm {
        RegisterForm {
            full_name: Some("Ada Lovelace".into()),
            email: Some("a@x.com".into()),
            username: Some("Ada".into()),
            password: Some("p1".into()),
            avatar: Some(upload()),
            cover: None,
        }
    }

    fn message(err: AppError) -> String {
        assert!(matches!(err, AppError::Validation(_)));
        err.to_string()
    }

    #[test]
    fn valid_form_lowercases_username() {
        let v = form().validate().unwrap();
        assert_eq!(v.profile.username, "ada");
        assert_eq!(v.profile.email, "a@x.com");
        assert!(v.cover.is_none());
    }

    #[test]
    fn each_required_field_is_checked() {
        let mut f = form();
        f.full_name = Some("  ".into());
        assert_eq!(message(f.validate().unwrap_err()), "Full Name is required");

        let mut f = form();
        f.email = Some("no-at-sign".into());
        assert_eq!(message(f.validate().unwrap_err()), "Email is required");

        let mut f = form();
        f.username = None;
        assert_eq!(message(f.validate().unwrap_err()), "Username is required");

        let mut f = form();
        f.password = Some(String::new());
        assert_eq!(message(f.validate().unwrap_err()), "Password is required");

        let mut f = form();
        f.avatar = None;
        assert_eq!(message(f.validate().unwrap_err()), "Avatar is required");
    }

    #[test]
    fn login_needs_one_identifier_and_password() {
        let req = LoginRequest {
            email: None,
            username: Some("ADA".into()),
            password: Some("p1".into()),
        };
        let (id, pw) = req.validate().unwrap();
        assert_eq!(id.username.as_deref(), Some("ada"));
        assert_eq!(id.email, None);
        assert_eq!(pw, "p1");

        let req = LoginRequest {
            email: Some("a@x.com".into()),
            username: None,
            password: Some("p1".into()),
        };
        assert!(req.validate().is_ok());

        let req = LoginRequest {
            email: Some("".into()),
            username: None,
            password: Some("p1".into()),
        };
        assert_eq!(message(req.validate().unwrap_err()), "Email or username is required");

        let req = LoginRequest {
            email: Some("a@x.com".into()),
            username: None,
            password: None,
        };
        assert_eq!(message(req.validate().unwrap_err()), "Password is required");
    }
}
