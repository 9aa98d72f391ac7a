use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::data::StationId;
use crate::render::{self, DashboardPage, MessageKind, Summary};
use crate::services::DashboardOutcome;
use crate::web::{AppState, error::AppError};

#[derive(Deserialize)]
pub struct DashboardQuery {
    pub station: Option<String>,
}

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(dashboard_page))
}

/// Full page: station selector, status message and both plots. Defaults to
/// the first listed station when none is selected.
async fn dashboard_page(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> Result<Html<String>, AppError> {
    let stations = app_state.dashboard.stations().await?;

    let requested = params
        .station
        .filter(|s| !s.trim().is_empty())
        .or_else(|| stations.first().map(|s| s.uuid.clone()));
    let Some(requested) = requested else {
        let page = DashboardPage::new(&stations, None)
            .with_message(MessageKind::Info, "No stations are available right now.");
        return Ok(Html(render::render_page(&page)?));
    };

    let station: StationId = requested
        .parse()
        .map_err(|e| AppError::InvalidInput(format!("Invalid station id '{requested}': {e}")))?;

    let outcome = app_state.dashboard.run(&station).await?;
    let message = outcome.message();
    let selected = station.to_string();
    let mut page = DashboardPage::new(&stations, Some(&selected));

    match outcome {
        DashboardOutcome::NoNewMeasurements => {
            page = page.with_message(MessageKind::Info, message);
        }
        DashboardOutcome::Detected { reference, scored } => {
            page = page.with_message(MessageKind::Success, message);
            page.summary = Some(Summary {
                rows: scored.len(),
                outliers: scored.outlier_count(),
                detector: app_state.dashboard.detector_name(),
            });
            page.detection_svg = Some(render::render_detection(&scored)?);
            page.reference_svg = Some(render::render_reference(&reference)?);
        }
    }

    Ok(Html(render::render_page(&page)?))
}
