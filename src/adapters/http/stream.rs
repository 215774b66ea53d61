use axum::{body::Body, extract::State, http::header, response::IntoResponse};
use std::convert::Infallible;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::adapters::http::state::HttpState;
use crate::domain::stream::MJPEG_CONTENT_TYPE;

/// `GET /video_feed`: cada conexión abre una generación nueva del pipeline.
/// La respuesta termina cuando la generación termina; si el cliente se va,
/// el pipeline lo detecta en el siguiente envío.
pub async fn video_feed(State(st): State<HttpState>) -> impl IntoResponse {
    let rx = st.ctx.pipeline.open_stream();
    let parts = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
}
