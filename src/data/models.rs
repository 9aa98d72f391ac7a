use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A single gauge reading. The timestamp keeps the UTC offset reported by the
/// station so plots show the station's wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl Measurement {
    pub fn new(timestamp: DateTime<FixedOffset>, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }
}

/// Ordered measurements of one station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample {
    pub measurements: Vec<Measurement>,
}

impl Sample {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self { measurements }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.measurements.first().map(|m| m.timestamp)
    }
}

impl FromIterator<Measurement> for Sample {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Reference and prediction windows fetched for one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationData {
    pub reference: Sample,
    pub prediction: Sample,
}

/// Which of the two windows a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Reference,
    Prediction,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Reference => write!(f, "reference"),
            Window::Prediction => write!(f, "prediction"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Water {
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub longname: String,
}

/// Station summary as listed by the upstream gauge service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub uuid: String,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub longname: String,
    #[serde(default)]
    pub water: Option<Water>,
}

impl Station {
    /// Human-readable label for selectors, e.g. `KÖLN (RHEIN)`.
    pub fn label(&self) -> String {
        let name = if self.longname.is_empty() {
            &self.shortname
        } else {
            &self.longname
        };
        if name.is_empty() {
            return self.uuid.clone();
        }
        match &self.water {
            Some(water) if !water.shortname.is_empty() => format!("{name} ({})", water.shortname),
            _ => name.clone(),
        }
    }
}

/// Validated station identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationId(Uuid);

impl StationId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for StationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(StationId)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
