use crate::{handlers, AppState};
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Data ingestion
        .route("/clusters/upload", post(handlers::upload_data))
        // Cluster views
        .route("/clusters", get(handlers::list_clusters))
        .route("/clusters/{cluster_id}", get(handlers::get_cluster))
        // Role generation
        .route("/roles/generate", post(handlers::generate_role))
        .route("/roles/generate/batch", post(handlers::generate_batch))
        // Multi-option flow
        .route("/roles/generate-multiple", post(handlers::generate_role_options))
        .route("/roles/select", post(handlers::select_role_option))
        .route("/roles/comparison/{cluster_id}", get(handlers::get_role_comparison))
        // Review and export
        .route("/roles/review/{cluster_id}", put(handlers::review_role))
        .route("/roles/export", get(handlers::export_roles))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}
