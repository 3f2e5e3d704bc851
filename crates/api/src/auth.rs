//! Caller identity extraction.
//!
//! Token verification happens in the upstream gateway, which forwards the
//! verified identity in the `x-user-id` and `x-user-role` headers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{Principal, Role, UserId};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(Authenticated)
    }
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let user_id = header(headers, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
    let user_id = Uuid::parse_str(user_id)
        .map(UserId::from_uuid)
        .map_err(|e| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER}: {e}")))?;

    let role = match header(headers, USER_ROLE_HEADER)? {
        Some(role) => role
            .parse::<Role>()
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?,
        None => Role::default(),
    };

    Ok(Principal { user_id, role })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ApiError::Unauthorized(format!("invalid {name} header")))
        })
        .transpose()
}
