use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use diesel::QueryDsl;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::{
    core::{aliases::DieselError, app_error::AppError, app_state::AppState},
    models::SessionEntity,
    schema::sessions,
};

pub const ADMIN_ROLE: &str = "ADMIN";

/// Authenticated caller, injected as a request extension by the
/// authorization middlewares.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub role: String,
}

pub async fn user_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

pub async fn admin_authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    if user.role != ADMIN_ROLE {
        return Err(AppError::ForbiddenResource("Admin access required".into()));
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

async fn authenticate(
    state: &AppState,
    headers: &axum::http::HeaderMap,
) -> Result<AuthUser, AppError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = bearer_token(header)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;
    let token = Uuid::parse_str(token)
        .map_err(|_| AppError::Unauthorized("Malformed bearer token".into()))?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let session: SessionEntity = sessions::table
        .find(token)
        .get_result(conn)
        .await
        .map_err(|err| match err {
            DieselError::NotFound => AppError::Unauthorized("Invalid session".into()),
            _ => AppError::Other(err.into()),
        })?;

    if session.expires_at <= Utc::now() {
        return Err(AppError::Unauthorized("Session expired".into()));
    }

    Ok(AuthUser {
        id: session.user_id,
        role: session.role,
    })
}

fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_bearer_header() {
        assert_eq!(
            bearer_token(Some("Bearer 4f2c9c6a-0000-0000-0000-000000000000")),
            Some("4f2c9c6a-0000-0000-0000-000000000000")
        );
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        assert_eq!(bearer_token(None), None);
        assert_eq!(bearer_token(Some("")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic dXNlcjpwYXNz")), None);
    }
}
