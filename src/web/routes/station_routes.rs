use axum::{
    Json, Router,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use crate::data::window::format_iso8601_duration;
use crate::data::{Station, StationId};
use crate::render;
use crate::services::DashboardOutcome;
use crate::services::dashboard_service::NO_NEW_MEASUREMENTS;
use crate::web::{
    AppState,
    error::AppError,
    models::{DetectionResponse, DetectionStatus},
};

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stations", get(list_stations))
        .route("/stations/{station_id}/detection", get(get_detection))
        .route("/stations/{station_id}/plot.svg", get(get_detection_plot))
}

fn parse_station(raw: &str) -> Result<StationId, AppError> {
    raw.parse()
        .map_err(|e| AppError::InvalidInput(format!("Invalid station id '{raw}': {e}")))
}

async fn list_stations(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<Station>>, AppError> {
    let stations = app_state.dashboard.stations().await?;
    Ok(Json(stations))
}

async fn get_detection(
    State(app_state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
) -> Result<Json<DetectionResponse>, AppError> {
    let station = parse_station(&station_id)?;
    let outcome = app_state.dashboard.run(&station).await?;
    let message = outcome.message();

    let (status, reference_rows, measurements) = match outcome {
        DashboardOutcome::NoNewMeasurements => (DetectionStatus::NoNewMeasurements, 0, Vec::new()),
        DashboardOutcome::Detected { reference, scored } => {
            (DetectionStatus::Detected, reference.len(), scored.rows)
        }
    };

    Ok(Json(DetectionResponse {
        station: station.to_string(),
        status,
        message,
        detector: app_state.dashboard.detector_name(),
        reference_window: format_iso8601_duration(app_state.config.reference_window),
        prediction_window: format_iso8601_duration(app_state.config.prediction_window),
        reference_rows,
        rows: measurements.len(),
        outliers: measurements.iter().filter(|m| m.novelty.is_outlier()).count(),
        measurements,
    }))
}

async fn get_detection_plot(
    State(app_state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let station = parse_station(&station_id)?;

    match app_state.dashboard.run(&station).await? {
        DashboardOutcome::NoNewMeasurements => Err(AppError::NotFound(NO_NEW_MEASUREMENTS.to_string())),
        DashboardOutcome::Detected { scored, .. } => {
            let svg = render::render_detection(&scored)?;
            Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
        }
    }
}
