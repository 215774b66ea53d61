pub mod routes;
pub mod state;
pub mod stream;
pub mod views;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::adapters::http::state::HttpState;
use crate::adapters::http::stream::video_feed;

pub fn router(state: HttpState) -> Router {
    let detections_dir = ServeDir::new(&state.ctx.detection_dir);
    Router::new()
        .route("/", get(routes::index))
        .route("/video_feed", get(video_feed))
        .route("/detections", get(routes::view_detections))
        .route("/settings", get(routes::get_settings).post(routes::post_settings))
        .route(
            "/start",
            post(routes::start_detection).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/stop", get(routes::stop_detection))
        .route("/api/status", get(routes::status))
        .route("/api/detections", get(routes::list_detections))
        .nest_service("/static", detections_dir)
        .with_state(state)
}
