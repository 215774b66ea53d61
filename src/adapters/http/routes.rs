use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use tracing::{info, warn};

use crate::adapters::http::{state::HttpState, views};
use crate::application::dto::{
    DetectionsResponse, SettingsForm, SettingsView, StartPlan, StartRequest, StatusResponse, Upload,
};
use crate::domain::{
    errors::{DomainError, DomainResult},
    settings::{parse_confidence, parse_recipient},
    source::SourceDescriptor,
};

fn status_for(e: &DomainError) -> StatusCode {
    match e {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DomainError::Source(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: DomainError) -> Response {
    (status_for(&e), e.to_string()).into_response()
}

async fn blocking<T, F>(f: F) -> DomainResult<T>
where
    F: FnOnce() -> DomainResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::OperationFailed(e.to_string()))?
}

pub async fn index(State(st): State<HttpState>) -> Html<String> {
    let source = st.ctx.sources.current().map(|d| d.to_string());
    Html(views::index_page(st.ctx.pipeline.state(), source.as_deref()))
}

pub async fn view_detections(State(st): State<HttpState>) -> Html<String> {
    Html(views::detections_page(&st.ctx.store.snapshot()))
}

pub async fn get_settings(State(st): State<HttpState>) -> Html<String> {
    Html(views::settings_page(&SettingsView::from(&st.ctx.settings.snapshot()), None))
}

/// Ambos campos se validan antes de aplicar ninguno. Un campo vacío conserva el valor actual.
pub async fn post_settings(State(st): State<HttpState>, Form(form): Form<SettingsForm>) -> Response {
    let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned);

    let parsed = (|| -> DomainResult<(Option<String>, Option<f32>)> {
        let recipient = present(&form.email).map(|r| parse_recipient(&r)).transpose()?;
        let confidence = present(&form.confidence).map(|c| parse_confidence(&c)).transpose()?;
        Ok((recipient, confidence))
    })();

    let (recipient, confidence) = match parsed {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Ajustes rechazados");
            let view = SettingsView::from(&st.ctx.settings.snapshot());
            return (status_for(&e), Html(views::settings_page(&view, Some(e.to_string().as_str())))).into_response();
        }
    };

    let applied = recipient
        .map(|r| st.ctx.settings.set_recipient(&r))
        .transpose()
        .and_then(|_| confidence.map(|c| st.ctx.settings.set_confidence_threshold(c)).transpose());
    match applied {
        Ok(_) => Redirect::to("/settings").into_response(),
        Err(e) => error_response(e),
    }
}

async fn read_start_form(mut multipart: Multipart) -> Result<StartRequest, MultipartError> {
    let mut request = StartRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "source" => request.source = Some(field.text().await?),
            "cctv_url" => request.cctv_url = Some(field.text().await?),
            "video_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                request.upload = Some(Upload { filename, bytes });
            }
            _ => {}
        }
    }
    Ok(request)
}

pub async fn start_detection(State(st): State<HttpState>, multipart: Multipart) -> Response {
    // Un cuerpo por encima del límite llega aquí como 413.
    let request = match read_start_form(multipart).await {
        Ok(request) => request,
        Err(e) => {
            warn!(status = %e.status(), "Formulario de inicio ilegible: {}", e.body_text());
            return e.into_response();
        }
    };

    let started = async {
        let descriptor = match StartPlan::try_from(request)? {
            StartPlan::Open(descriptor) => descriptor,
            StartPlan::SaveAndOpen { filename, bytes } => {
                let snapshots = st.ctx.snapshots.clone();
                let path = blocking(move || snapshots.save_upload(&filename, &bytes)).await?;
                SourceDescriptor::File { path }
            }
        };
        let sources = st.ctx.sources.clone();
        blocking(move || sources.start(descriptor)).await?;
        Ok::<_, DomainError>(())
    }
    .await;

    match started {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => {
            warn!(error = %e, "No se pudo iniciar la detección");
            error_response(e)
        }
    }
}

pub async fn stop_detection(State(st): State<HttpState>) -> Response {
    let sources = st.ctx.sources.clone();
    match tokio::task::spawn_blocking(move || sources.stop()).await {
        Ok(released) => {
            info!(released, "Detección detenida");
            Redirect::to("/").into_response()
        }
        Err(e) => error_response(DomainError::OperationFailed(e.to_string())),
    }
}

pub async fn status(State(st): State<HttpState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: st.ctx.pipeline.state(),
        source: st.ctx.sources.current().map(|d| d.to_string()),
        settings: SettingsView::from(&st.ctx.settings.snapshot()),
        events: st.ctx.store.len(),
    })
}

pub async fn list_detections(State(st): State<HttpState>) -> Json<DetectionsResponse> {
    Json(DetectionsResponse { detections: st.ctx.store.snapshot() })
}
