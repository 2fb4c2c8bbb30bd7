pub mod auth;
pub mod error;
pub mod middleware;
pub mod password;
pub mod reports;
pub mod token;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower_http::services::ServeDir;

use safeline_db::Database;
use safeline_types::models::Role;

use crate::middleware::{require_auth, require_role};

pub type AppState = Arc<AppStateInner>;

/// Read-only after startup.
pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
}

/// All routes plus static `/uploads`. Cross-cutting layers (CORS, tracing)
/// are left to the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/reports/{id}", get(reports::get_report))
        .with_state(state.clone());

    let member_routes = Router::new().route(
        "/reports",
        post(reports::create_report).layer(DefaultBodyLimit::max(upload::MAX_REPORT_BODY_BYTES)),
    );

    let admin_routes = Router::new()
        .route("/reports", get(reports::list_reports))
        .route("/reports/{id}/handle", put(reports::handle_report))
        .route("/reports/{id}/category", put(reports::update_report_category))
        .route_layer(from_fn_with_state(Role::Admin, require_role));

    let protected_routes = member_routes
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
}
