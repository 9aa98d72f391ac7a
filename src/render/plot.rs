use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;

use super::{RenderError, render_template};
use crate::data::Sample;
use crate::detection::{Novelty, ScoredSample};

const WIDTH: f64 = 1100.0;
const HEIGHT: f64 = 700.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 130.0;
/// Axis padding as a fraction of the data span on each side.
const AXIS_MARGIN: f64 = 0.05;
const MAX_TICKS: f64 = 8.0;
const MAX_VALUE_TICKS: usize = 12;

/// Candidate spacings for time ticks, in seconds.
const TIME_STEPS: &[i64] = &[
    1, 2, 5, 10, 15, 30, 60, 120, 300, 600, 900, 1800, 3600, 7200, 10800, 21600, 43200, 86400,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    Circle,
    Cross,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub tooltip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub label: &'static str,
    pub color: &'static str,
    pub marker: Marker,
    pub points: Vec<PlotPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tick {
    pub pos: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
    pub center_x: f64,
    pub center_y: f64,
}

/// Everything the SVG template needs, in pixel coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct ScatterPlot {
    pub id: &'static str,
    pub width: f64,
    pub height: f64,
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub frame: Frame,
    pub x_ticks: Vec<Tick>,
    pub y_ticks: Vec<Tick>,
    pub series: Vec<Series>,
    pub legend_height: f64,
}

struct RawSeries {
    label: &'static str,
    color: &'static str,
    marker: Marker,
    points: Vec<(DateTime<FixedOffset>, f64)>,
}

/// Scatter of the scored prediction window: normal points as blue circles,
/// outliers as red crosses.
pub fn detection_plot(scored: &ScoredSample) -> ScatterPlot {
    let pick = |novelty: Novelty| {
        scored
            .rows
            .iter()
            .filter(|row| row.novelty == novelty)
            .map(|row| (row.timestamp, row.value))
            .collect::<Vec<_>>()
    };
    let series = vec![
        RawSeries {
            label: "Normal",
            color: "blue",
            marker: Marker::Circle,
            points: pick(Novelty::Normal),
        },
        RawSeries {
            label: "Novelty",
            color: "red",
            marker: Marker::Cross,
            points: pick(Novelty::Outlier),
        },
    ];
    layout(
        "detection",
        titled("Novelty Detection Results", scored.first_timestamp()),
        series,
    )
}

/// Scatter of the reference window. Rows without a value are skipped.
pub fn reference_plot(sample: &Sample) -> ScatterPlot {
    let points = sample
        .iter()
        .filter_map(|m| m.value.map(|v| (m.timestamp, v)))
        .collect();
    let series = vec![RawSeries {
        label: "Reference",
        color: "gray",
        marker: Marker::Circle,
        points,
    }];
    layout(
        "reference",
        titled("Reference Data", sample.first_timestamp()),
        series,
    )
}

pub fn render_svg(plot: &ScatterPlot) -> Result<String, RenderError> {
    render_template("scatter.svg", plot)
}

pub fn render_detection(scored: &ScoredSample) -> Result<String, RenderError> {
    render_svg(&detection_plot(scored))
}

pub fn render_reference(sample: &Sample) -> Result<String, RenderError> {
    render_svg(&reference_plot(sample))
}

fn titled(prefix: &str, first: Option<DateTime<FixedOffset>>) -> String {
    match first {
        Some(ts) => format!("{prefix} on  {}", ts.format("%Y-%m-%d")),
        None => prefix.to_string(),
    }
}

fn layout(id: &'static str, title: String, series: Vec<RawSeries>) -> ScatterPlot {
    let frame = Frame {
        left: MARGIN_LEFT,
        top: MARGIN_TOP,
        right: WIDTH - MARGIN_RIGHT,
        bottom: HEIGHT - MARGIN_BOTTOM,
        width: WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
        height: HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
        center_x: MARGIN_LEFT + (WIDTH - MARGIN_LEFT - MARGIN_RIGHT) / 2.0,
        center_y: MARGIN_TOP + (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM) / 2.0,
    };

    let all: Vec<(DateTime<FixedOffset>, f64)> =
        series.iter().flat_map(|s| s.points.iter().copied()).collect();
    let offset = all
        .first()
        .map(|(ts, _)| ts.offset().fix())
        .unwrap_or_else(|| Utc.fix());

    let (x_ticks, y_ticks, series): (Vec<Tick>, Vec<Tick>, Vec<Series>) = if all.is_empty() {
        let series = series.into_iter().map(|s| finish(s, Vec::new())).collect();
        (Vec::new(), Vec::new(), series)
    } else {
        let (x_lo, x_hi) = padded_range(all.iter().map(|(ts, _)| seconds(ts)), 30.0);
        let (y_lo, y_hi) = padded_range(all.iter().map(|(_, v)| *v), 0.5);

        let to_px = |ts: &DateTime<FixedOffset>, v: f64| {
            (
                px(frame.left + (seconds(ts) - x_lo) / (x_hi - x_lo) * frame.width),
                px(frame.bottom - (v - y_lo) / (y_hi - y_lo) * frame.height),
            )
        };

        let x_ticks = time_ticks(x_lo, x_hi, offset)
            .into_iter()
            .map(|(t, label)| Tick {
                pos: px(frame.left + (t - x_lo) / (x_hi - x_lo) * frame.width),
                label,
            })
            .collect();
        let y_ticks = value_ticks(y_lo, y_hi)
            .into_iter()
            .map(|(v, label)| Tick {
                pos: px(frame.bottom - (v - y_lo) / (y_hi - y_lo) * frame.height),
                label,
            })
            .collect();

        let series = series
            .into_iter()
            .map(|s| {
                let points = s
                    .points
                    .iter()
                    .map(|(ts, v)| {
                        let (x, y) = to_px(ts, *v);
                        PlotPoint {
                            x,
                            y,
                            tooltip: format!("{} | {v}", ts.format("%Y-%m-%d %H:%M:%S")),
                        }
                    })
                    .collect();
                finish(s, points)
            })
            .collect();
        (x_ticks, y_ticks, series)
    };

    ScatterPlot {
        id,
        width: WIDTH,
        height: HEIGHT,
        title,
        x_label: "Timestamp (hh:mm:ss)",
        y_label: "Value",
        frame,
        x_ticks,
        y_ticks,
        legend_height: series.len() as f64 * 22.0 + 8.0,
        series,
    }
}

fn finish(raw: RawSeries, points: Vec<PlotPoint>) -> Series {
    Series {
        label: raw.label,
        color: raw.color,
        marker: raw.marker,
        points,
    }
}

fn seconds(ts: &DateTime<FixedOffset>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

fn px(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Data range widened by the axis margin; degenerate ranges get `min_pad`.
fn padded_range(values: impl Iterator<Item = f64>, min_pad: f64) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = hi - lo;
    if span > 0.0 {
        (lo - span * AXIS_MARGIN, hi + span * AXIS_MARGIN)
    } else {
        let pad = (lo.abs() * AXIS_MARGIN).max(min_pad);
        (lo - pad, hi + pad)
    }
}

/// Ticks aligned to the station's wall clock, labelled `%H:%M:%S`.
fn time_ticks(lo: f64, hi: f64, offset: FixedOffset) -> Vec<(f64, String)> {
    let span = hi - lo;
    let step = TIME_STEPS
        .iter()
        .copied()
        .find(|&step| span / step as f64 <= MAX_TICKS)
        .unwrap_or_else(|| ((span / MAX_TICKS / 86_400.0).ceil() as i64).max(1) * 86_400) as f64;

    let shift = offset.local_minus_utc() as f64;
    let mut t = ((lo + shift) / step).ceil() * step - shift;
    let mut ticks = Vec::new();
    while t <= hi {
        if let Some(dt) = DateTime::from_timestamp(t.round() as i64, 0) {
            ticks.push((t, dt.with_timezone(&offset).format("%H:%M:%S").to_string()));
        }
        t += step;
    }
    ticks
}

fn value_ticks(lo: f64, hi: f64) -> Vec<(f64, String)> {
    let step = nice_step((hi - lo) / 6.0);
    if !step.is_finite() || step <= 0.0 {
        return Vec::new();
    }
    let decimals = (-step.log10().floor()).max(0.0) as usize;
    // Count ticks up front: with a span near one ulp of `lo`, the tick index
    // exceeds 2^53 and stepping it in floating point stalls.
    let first = (lo / step).ceil();
    let count = ((hi + step * 1e-9 - first * step) / step).floor().max(0.0) as usize;
    (0..=count.min(MAX_VALUE_TICKS))
        .map(|j| (first + j as f64) * step)
        .filter(|v| *v <= hi + step * 1e-9)
        .map(|v| (v, format!("{v:.decimals$}")))
        .collect()
}

/// Rounds `raw` up to 1, 2 or 5 times a power of ten.
fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let residual = raw / magnitude;
    let nice = if residual <= 1.0 {
        1.0
    } else if residual <= 2.0 {
        2.0
    } else if residual <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::testing::sample;
    use crate::detection::{LocalOutlierFactor, detect};

    fn scored() -> ScoredSample {
        detect(
            &LocalOutlierFactor::default(),
            &sample(&[1.0; 6]),
            &sample(&[1.0, 1.1, 50.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_detection_plot_layout() {
        let plot = detection_plot(&scored());

        assert_eq!(plot.title, "Novelty Detection Results on  2024-05-01");
        assert_eq!(plot.x_label, "Timestamp (hh:mm:ss)");
        assert_eq!(plot.series[0].label, "Normal");
        assert_eq!(plot.series[0].marker, Marker::Circle);
        assert_eq!(plot.series[0].points.len(), 2);
        assert_eq!(plot.series[1].label, "Novelty");
        assert_eq!(plot.series[1].marker, Marker::Cross);
        assert_eq!(plot.series[1].points.len(), 1);

        for point in plot.series.iter().flat_map(|s| &s.points) {
            assert!(point.x >= plot.frame.left && point.x <= plot.frame.right);
            assert!(point.y >= plot.frame.top && point.y <= plot.frame.bottom);
        }
        // The outlier sits highest on screen.
        assert!(plot.series[1].points[0].y < plot.series[0].points[0].y);
    }

    #[test]
    fn test_time_ticks_use_station_clock() {
        let plot = detection_plot(&scored());

        // Samples start at 08:00 +02:00 every 15 minutes.
        assert!(!plot.x_ticks.is_empty());
        assert!(plot.x_ticks.iter().any(|t| t.label == "08:15:00"));
        for tick in &plot.x_ticks {
            assert_eq!(tick.label.len(), 8);
        }
    }

    #[test]
    fn test_value_ticks() {
        let ticks = value_ticks(0.0, 10.0);
        let labels: Vec<_> = ticks.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, vec!["0", "2", "4", "6", "8", "10"]);

        let ticks = value_ticks(0.95, 1.05);
        assert!(ticks.iter().all(|(_, l)| l.contains('.')));
    }

    #[test]
    fn test_value_ticks_on_near_equal_values() {
        let ticks = value_ticks(299.999999999999, 300.000000000001);
        assert!(!ticks.is_empty());
        assert!(ticks.len() <= MAX_VALUE_TICKS + 1);

        assert!(value_ticks(5.0, 5.0).is_empty());
    }

    #[test]
    fn test_render_readings_one_ulp_apart() {
        let svg = render_reference(&sample(&[300.0, 300.0000000000001])).unwrap();
        assert!(svg.starts_with("<svg"));

        let scored = detect(
            &LocalOutlierFactor::default(),
            &sample(&[300.0, 300.0000000000001, 300.0]),
            &sample(&[300.0, 300.0000000000001]),
        )
        .unwrap();
        assert!(render_detection(&scored).unwrap().contains("detection-circle"));
    }

    #[test]
    fn test_nice_step() {
        for (raw, expected) in [(1.3, 2.0), (0.04, 0.05), (7.0, 10.0), (300.0, 500.0)] {
            let step = nice_step(raw);
            assert!((step - expected).abs() < 1e-12, "nice_step({raw}) = {step}");
        }
    }

    #[test]
    fn test_empty_plot() {
        let plot = detection_plot(&ScoredSample::default());
        assert_eq!(plot.title, "Novelty Detection Results");
        assert!(plot.x_ticks.is_empty());
        assert!(plot.series.iter().all(|s| s.points.is_empty()));
        assert!(render_svg(&plot).is_ok());
    }

    #[test]
    fn test_render_detection_svg() {
        let svg = render_detection(&scored()).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Novelty Detection Results on  2024-05-01"));
        assert!(svg.contains("Timestamp (hh:mm:ss)"));
        assert!(svg.contains("Novelty"));
        assert!(svg.contains("detection-cross"));
    }

    #[test]
    fn test_render_reference_svg() {
        let svg = render_reference(&sample(&[3.0, 4.0, 5.0])).unwrap();
        assert!(svg.contains("Reference Data on  2024-05-01"));
    }
}
