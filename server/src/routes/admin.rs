//! Back-office authentication: an OAuth2 password form checked against
//! the environment, answered with a bearer token.

use std::sync::Arc;

use axum::extract::State;
use axum::{Form, Json};
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::Authorization;
use headers::authorization::Bearer;

use qubic_protocol::{AdminTokenForm, AdminTokenResponse};

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn token(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AdminTokenForm>,
) -> Result<Json<AdminTokenResponse>, ApiError> {
    if form.username != state.config.admin_username
        || form.password != state.config.admin_password
    {
        return Err(ApiError::Unauthorized);
    }
    let expires_at = Utc::now() + Duration::minutes(state.config.token_expiry_minutes);
    let access_token = state
        .tokens
        .mint_admin(&form.username, expires_at)
        .map_err(ApiError::internal)?;
    Ok(Json(AdminTokenResponse {
        access_token,
        token_type: "bearer".to_owned(),
    }))
}

pub async fn is_authorized(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<&'static str, ApiError> {
    let bearer = bearer.ok_or(ApiError::Unauthorized)?;
    state
        .tokens
        .verify_admin(bearer.token())
        .map_err(|_| ApiError::Unauthorized)?;
    Ok("ok")
}
