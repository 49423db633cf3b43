//! Caller identity extraction.
//!
//! Authentication itself is terminated upstream; requests arrive carrying
//! the verified subject in the `x-user-subject` header and the extractor
//! resolves it to a stored user.

use crate::{error::GatewayError, state::GatewayState};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use parley_database::entities::User;

pub const SUBJECT_HEADER: &str = "x-user-subject";

#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<GatewayState> for CurrentUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &GatewayState,
    ) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(SUBJECT_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                GatewayError::AuthenticationFailed("missing subject header".to_string())
            })?;

        let user = state
            .users
            .find_by_subject(subject)
            .await
            .map_err(GatewayError::from)?
            .ok_or_else(|| {
                GatewayError::AuthenticationFailed("unknown subject".to_string())
            })?;

        Ok(CurrentUser(user))
    }
}
