use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Opaque authenticated principal supplied by the host environment.
///
/// Authentication itself is out of scope here: an upstream gateway or
/// middleware terminates the credential and forwards the resolved identity in
/// trusted request headers. This extractor only reads them back.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

const USER_ID_HEADER: &str = "x-user-id";
const USER_EMAIL_HEADER: &str = "x-user-email";
const USER_FIRST_NAME_HEADER: &str = "x-user-first-name";
const USER_LAST_NAME_HEADER: &str = "x-user-last-name";
const USER_STAFF_HEADER: &str = "x-user-staff";

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_str(parts, USER_ID_HEADER)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing or malformed principal identity".to_string())
            })?;

        let email = header_str(parts, USER_EMAIL_HEADER)
            .unwrap_or_default()
            .to_string();
        let first_name = header_str(parts, USER_FIRST_NAME_HEADER)
            .unwrap_or_default()
            .to_string();
        let last_name = header_str(parts, USER_LAST_NAME_HEADER)
            .unwrap_or_default()
            .to_string();
        let is_staff = header_str(parts, USER_STAFF_HEADER)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(AuthenticatedUser {
            id,
            email,
            first_name,
            last_name,
            is_staff,
        })
    }
}
