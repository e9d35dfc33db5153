//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{OpenAiOcrAdapter, OpenAiVerifierAdapter, PgStore},
    config::Config,
    error::ApiError,
    web::{
        active_commitments_handler, create_commitment_handler, delete_commitment_handler,
        list_commitments_handler, recap_handler, rest::ApiDoc, state::AppState,
        verify_commitment_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    routing::{delete, get, post},
    Router,
};
use commitment_core::manager::CommitmentManager;
use commitment_core::recap::RecapAggregator;
use commitment_core::windows::WindowCalculator;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let verifier = Arc::new(OpenAiVerifierAdapter::new(
        openai_client.clone(),
        config.verify_model.clone(),
    ));
    let ocr = Arc::new(OpenAiOcrAdapter::new(
        openai_client.clone(),
        config.ocr_model.clone(),
    ));

    // --- 4. Build the Engine and Shared AppState ---
    let windows = WindowCalculator::new(config.reference_tz);
    let manager = Arc::new(CommitmentManager::new(store.clone(), verifier, windows));
    let recaps = Arc::new(RecapAggregator::new(store.clone(), windows));

    let app_state = Arc::new(AppState {
        manager,
        recaps,
        ocr,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route(
            "/commitments",
            post(create_commitment_handler).get(list_commitments_handler),
        )
        .route("/commitments/active", get(active_commitments_handler))
        .route("/commitments/{id}/verify", post(verify_commitment_handler))
        .route("/commitments/{id}", delete(delete_commitment_handler))
        .route("/recap", get(recap_handler))
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
