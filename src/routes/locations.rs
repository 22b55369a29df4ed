use anyhow::Context;
use axum::{extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    models::StateEntity,
    schema::states,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/location",
        OpenApiRouter::new().routes(utoipa_axum::routes!(get_states)),
    )
}

/// Fetch the active states reference set, ordered by name.
#[utoipa::path(
    get,
    path = "/states",
    tags = ["Locations"],
    responses(
        (status = 200, description = "List active states", body = StdResponse<Vec<StateEntity>, String>)
    )
)]
async fn get_states(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows: Vec<StateEntity> = states::table
        .filter(states::active.eq(true))
        .order_by(states::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get states")?;

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get states successfully"),
    })
}
