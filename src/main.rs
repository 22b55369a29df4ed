use anyhow::Result;
use axum::Router;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use storefront_orderservice::{
    core::{app_state::AppState, bootstrap, config, db, swagger},
    routes,
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;
    if !config.razorpay.is_configured() {
        tracing::warn!("Razorpay credentials are not set; payment endpoints will fail");
    }

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let state = AppState::from_config(&config).await?;

    let routes = routes::locations::routes_with_openapi()
        .merge(routes::products::routes_with_openapi())
        .merge(routes::carts::routes_with_openapi(&state))
        .merge(routes::orders::routes_with_openapi(&state))
        .merge(routes::payments::routes_with_openapi(&state));

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("Storefront OrderService API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi);

    let app = Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .with_state(state);

    bootstrap::serve("OrderService", app, config.server.port).await
}
