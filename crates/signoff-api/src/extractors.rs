//! # Custom Extractors & Validation
//!
//! The [`Validate`] trait for request DTOs, helpers to extract and validate
//! JSON bodies, and [`CallerActor`], the acting user taken from request
//! headers.
//!
//! Authentication is the host application's concern. It forwards the
//! authenticated user in `x-actor-id` and their role codes, comma-separated,
//! in `x-actor-roles`.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;

use signoff_core::{Actor, RoleCode, UserId};

use crate::error::AppError;

/// Header carrying the acting user id.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the actor's role codes, comma-separated.
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";

/// Request types that validate business rules beyond what serde checks.
pub trait Validate {
    /// Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// The acting user, from `x-actor-id` and `x-actor-roles`.
///
/// Rejects with 401 when `x-actor-id` is missing and 422 when a header is
/// malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerActor(pub Actor);

impl CallerActor {
    /// Parse the actor headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = header_str(headers, ACTOR_ID_HEADER)?
            .ok_or_else(|| AppError::Unauthorized(format!("missing {ACTOR_ID_HEADER} header")))?;
        let mut actor = Actor::new(UserId::new(user_id).map_err(|e| AppError::Validation(e.to_string()))?);

        if let Some(roles) = header_str(headers, ACTOR_ROLES_HEADER)? {
            for code in roles.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                let role = RoleCode::new(code).map_err(|e| AppError::Validation(e.to_string()))?;
                actor = actor.with_role(role);
            }
        }
        Ok(Self(actor))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::Validation(format!("{name} header is not valid ASCII")))
        })
        .transpose()
}

impl<S: Send + Sync> FromRequestParts<S> for CallerActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
