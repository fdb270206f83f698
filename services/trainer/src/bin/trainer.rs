//! services/trainer/src/bin/trainer.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use roleplay_training_core::{
    ports::{CustomerSimulationService, StaffResponseService, TrainingStore},
    TurnGenerator,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trainer_lib::{
    adapters::{DbAdapter, HttpTurnAdapter, InMemoryStore, OpenAiTurnAdapter},
    config::{Config, GeneratorBackend},
    error::ApiError,
    web::{
        require_admin_token,
        rest::{self, ApiDoc},
        state::AppState,
        ws_handler,
    },
};
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
    info!("Configuration loaded. Starting trainer...");

    // --- 2. Choose the Training Store ---
    let store: Arc<dyn TrainingStore> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            info!("DATABASE_URL not set; training data is kept in memory.");
            Arc::new(InMemoryStore::new())
        }
    };

    // --- 3. Initialize the Generation Backend ---
    let (staff, customer): (Arc<dyn StaffResponseService>, Arc<dyn CustomerSimulationService>) =
        match &config.backend {
            GeneratorBackend::Endpoint {
                staff_url,
                customer_url,
                opening_url,
            } => {
                info!(%staff_url, %customer_url, "Generating turns through chat endpoints");
                let adapter = Arc::new(
                    HttpTurnAdapter::new(
                        staff_url.clone(),
                        customer_url.clone(),
                        opening_url.clone(),
                        config.generation_timeout,
                    )
                    .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?,
                );
                (
                    adapter.clone() as Arc<dyn StaffResponseService>,
                    adapter as Arc<dyn CustomerSimulationService>,
                )
            }
            GeneratorBackend::OpenAi { api_key } => {
                info!(model = %config.training_model, "Generating turns with OpenAI");
                let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
                let adapter = Arc::new(OpenAiTurnAdapter::new(client, config.training_model.clone()));
                (
                    adapter.clone() as Arc<dyn StaffResponseService>,
                    adapter as Arc<dyn CustomerSimulationService>,
                )
            }
        };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store,
        generator: TurnGenerator::new(staff, customer),
        config: config.clone(),
    });
    app_state.seed_default_scenarios().await?;

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/personas", get(rest::list_personas_handler))
        .route("/templates/{role}", get(rest::list_templates_handler))
        .route("/staff", get(rest::list_staff_handler).post(rest::create_staff_handler))
        .route(
            "/staff/{id}",
            put(rest::rename_staff_handler).delete(rest::delete_staff_handler),
        )
        .route(
            "/scenarios",
            get(rest::list_scenarios_handler).post(rest::create_scenario_handler),
        )
        .route("/scenarios/{id}", delete(rest::delete_scenario_handler))
        .route("/scenarios/generate/{role}", post(rest::generate_scenarios_handler))
        .route("/scenarios/exhausted/{role}", get(rest::templates_exhausted_handler))
        .route("/sessions", get(rest::list_sessions_handler))
        .route("/sessions/stats", get(rest::session_stats_handler))
        .route("/sessions/{id}", delete(rest::delete_session_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_admin_token,
        ))
        .layer(cors)
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
