pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let translation_routes = Router::new()
        .route("/languages", get(routes::translation::languages))
        .route("/voices/{language}", get(routes::translation::voices))
        .route("/participants/{room_id}", get(routes::translation::participants))
        .route(
            "/settings",
            get(routes::translation::get_settings).put(routes::translation::update_settings),
        )
        .route("/translate", post(routes::translation::translate))
        .route("/synthesize", post(routes::translation::synthesize))
        .route("/detect-language", post(routes::translation::detect_language));

    let api = Router::new().nest("/translation", translation_routes);

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
