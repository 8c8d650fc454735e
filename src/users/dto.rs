use serde::Deserialize;

use super::repo_types::UserPatch;
use crate::{auth::dto::validate_email, error::AppError};

/// Request body for PATCH /profile.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl UpdateProfileRequest {
    pub fn into_patch(self) -> Result<UserPatch, AppError> {
        let full_name = self.full_name.map(|s| s.trim().to_string());
        let email = self.email.map(|s| s.trim().to_string());

        if full_name.is_none() && email.is_none() {
            return Err(AppError::validation("Full Name or email is required"));
        }
        if full_name.as_deref() == Some("") {
            return Err(AppError::validation("Full Name is required"));
        }
        if let Some(email) = &email {
            validate_email(email)?;
        }

        Ok(UserPatch {
            full_name,
            email,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_some_field() {
        let err = UpdateProfileRequest::default().into_patch().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn validates_present_fields() {
        let req = UpdateProfileRequest {
            full_name: Some(" ".into()),
            email: None,
        };
        assert!(req.into_patch().is_err());

        let req = UpdateProfileRequest {
            full_name: None,
            email: Some("nope".into()),
        };
        assert!(req.into_patch().is_err());

        let patch = UpdateProfileRequest {
            full_name: Some(" Ada King ".into()),
            email: None,
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.full_name.as_deref(), Some("Ada King"));
        assert!(patch.email.is_none());
        assert!(patch.password_hash.is_none());
    }
}
