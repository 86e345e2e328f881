use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One incident exactly as the upstream returned it
pub type RawIncident = serde_json::Map<String, serde_json::Value>;

/// Severity of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    High,
    Medium,
    Low,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::High => "High",
            Status::Medium => "Medium",
            Status::Low => "Low",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Status::High),
            "medium" => Ok(Status::Medium),
            "low" => Ok(Status::Low),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// A normalized incident row.
///
/// Field order is the persisted column order. `None` is the null sentinel and
/// is written as an empty CSV cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub title: String,
    pub description: String,
    #[serde(rename = "extendedDescription")]
    pub extended_description: Option<String>,
    pub state: String,
    /// Always present after normalization; rows loaded from older partitions may lack it.
    pub lga: Option<String>,
    pub status: Status,
    #[serde(rename = "incidentDate")]
    pub incident_date: Option<NaiveDate>,
    #[serde(rename = "incidentTime")]
    pub incident_time: Option<NaiveTime>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_duplicate: Option<bool>,
}

impl IncidentRecord {
    /// Text the duplicate detector compares: title, body, state, LGA and date.
    pub fn composite_text(&self) -> String {
        let body = self
            .extended_description
            .as_deref()
            .unwrap_or(self.description.as_str());
        let date = self
            .incident_date
            .map(|d| d.format(crate::constants::DATE_FORMAT).to_string())
            .unwrap_or_default();

        [
            self.title.as_str(),
            body,
            self.state.as_str(),
            self.lga.as_deref().unwrap_or(""),
            date.as_str(),
        ]
        .join(" | ")
    }
}

/// Source of "now" for the pipeline
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
