use serde::Serialize;

use super::{RenderError, render_template};
use crate::data::Station;

pub const PAGE_TITLE: &str = "Novelty Detection for Water Level";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationOption {
    pub uuid: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub outliers: usize,
    pub detector: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardPage {
    pub title: &'static str,
    pub version: &'static str,
    pub stations: Vec<StationOption>,
    pub message: Option<String>,
    pub message_kind: MessageKind,
    pub summary: Option<Summary>,
    pub detection_svg: Option<String>,
    pub reference_svg: Option<String>,
}

impl DashboardPage {
    pub fn new(stations: &[Station], selected: Option<&str>) -> Self {
        let stations = stations
            .iter()
            .map(|station| StationOption {
                uuid: station.uuid.clone(),
                label: station.label(),
                selected: Some(station.uuid.as_str()) == selected,
            })
            .collect();
        Self {
            title: PAGE_TITLE,
            version: crate::version::VERSION,
            stations,
            message: None,
            message_kind: MessageKind::Info,
            summary: None,
            detection_svg: None,
            reference_svg: None,
        }
    }

    pub fn with_message(mut self, kind: MessageKind, message: impl Into<String>) -> Self {
        self.message_kind = kind;
        self.message = Some(message.into());
        self
    }
}

pub fn render_page(page: &DashboardPage) -> Result<String, RenderError> {
    render_template("index.html", page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        vec![
            Station {
                uuid: "a6ee8177-107b-47dd-bcfd-30960ccc6e9c".to_string(),
                shortname: "KÖLN".to_string(),
                longname: "KÖLN".to_string(),
                water: None,
            },
            Station {
                uuid: "593647aa-9fea-43ec-a7d6-6476a76ae868".to_string(),
                shortname: "<BONN>".to_string(),
                longname: "<BONN>".to_string(),
                water: None,
            },
        ]
    }

    #[test]
    fn test_page_marks_selected_station() {
        let page = DashboardPage::new(&stations(), Some("593647aa-9fea-43ec-a7d6-6476a76ae868"));
        assert!(!page.stations[0].selected);
        assert!(page.stations[1].selected);
    }

    #[test]
    fn test_render_page_escapes_labels() {
        let page = DashboardPage::new(&stations(), None)
            .with_message(MessageKind::Info, "There are no new measurements.");
        let html = render_page(&page).unwrap();

        assert!(html.contains("<h1>Novelty Detection for Water Level</h1>"));
        assert!(html.contains("There are no new measurements."));
        assert!(html.contains("&lt;BONN&gt;"));
        assert!(!html.contains("<BONN>"));
        assert!(!html.contains("class=\"plot\""));
    }

    #[test]
    fn test_render_page_embeds_plots() {
        let mut page = DashboardPage::new(&stations(), None);
        page.detection_svg = Some("<svg id=\"detection\"></svg>".to_string());

        let html = render_page(&page).unwrap();
        assert!(html.contains("<svg id=\"detection\"></svg>"));
    }
}
