//! Schema normalizer.
//!
//! Coerces loosely shaped upstream incidents into [`IncidentRecord`] rows with
//! the fixed column set. Required fields are checked for every row before any
//! row is returned, so one call reports every offending row at once.

use crate::constants::{self, DATE_FORMAT, REQUIRED_FIELDS, TIME_FORMAT};
use crate::error::{RowViolation, ValidationError};
use crate::types::{IncidentRecord, RawIncident, Status};
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use tracing::{debug, warn};

/// Normalize a batch of raw incidents.
///
/// Fails with a [`ValidationError`] naming every row that lacks a required
/// field (or carries an unknown status) and which fields were at fault.
pub fn normalize_batch(raw: &[RawIncident]) -> Result<Vec<IncidentRecord>, ValidationError> {
    let mut records = Vec::with_capacity(raw.len());
    let mut violations = Vec::new();

    for (row, item) in raw.iter().enumerate() {
        match normalize_one(row, item) {
            Ok(record) => records.push(record),
            Err(violation) => violations.push(violation),
        }
    }

    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    debug!("Normalized {} incident(s)", records.len());
    Ok(records)
}

fn normalize_one(row: usize, item: &RawIncident) -> Result<IncidentRecord, RowViolation> {
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| text_field(item, field).is_none())
        .collect();

    let mut invalid = Vec::new();
    let status = match text_field(item, constants::STATUS) {
        Some(raw_status) => match raw_status.parse::<Status>() {
            Ok(status) => Some(status),
            Err(_) => {
                invalid.push(format!("{}={}", constants::STATUS, raw_status));
                None
            }
        },
        None => None,
    };

    let title = text_field(item, constants::TITLE);
    let (Some(title), Some(description), Some(state), Some(lga), Some(status)) = (
        title.clone(),
        text_field(item, constants::DESCRIPTION),
        text_field(item, constants::STATE),
        text_field(item, constants::LGA),
        status,
    ) else {
        return Err(RowViolation {
            row,
            title,
            missing,
            invalid,
        });
    };

    Ok(IncidentRecord {
        extended_description: text_field(item, constants::EXTENDED_DESCRIPTION),
        incident_date: date_field(row, item),
        incident_time: time_field(row, item),
        lat: coordinate_field(row, item, constants::LAT),
        lng: coordinate_field(row, item, constants::LNG),
        title,
        description,
        state,
        lga: Some(lga),
        status,
        is_duplicate: None,
    })
}

/// Look a field up under its canonical name, then its aliases.
/// JSON `null` and the literal string "null" count as absent.
fn lookup<'a>(item: &'a RawIncident, field: &str) -> Option<&'a Value> {
    std::iter::once(field)
        .chain(constants::field_aliases(field).iter().copied())
        .filter_map(|key| item.get(key))
        .find(|value| !is_null_like(value))
}

fn is_null_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().eq_ignore_ascii_case("null"),
        _ => false,
    }
}

pub(crate) fn text_field(item: &RawIncident, field: &str) -> Option<String> {
    lookup(item, field).map(|value| match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

pub(crate) fn parse_incident_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub(crate) fn parse_incident_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn date_field(row: usize, item: &RawIncident) -> Option<NaiveDate> {
    let raw = text_field(item, constants::INCIDENT_DATE)?;
    let date = parse_incident_date(&raw);
    if date.is_none() {
        warn!("Row {}: dropping unparsable incidentDate '{}'", row, raw);
    }
    date
}

fn time_field(row: usize, item: &RawIncident) -> Option<NaiveTime> {
    let raw = text_field(item, constants::INCIDENT_TIME)?;
    let time = parse_incident_time(&raw);
    if time.is_none() {
        warn!("Row {}: dropping unparsable incidentTime '{}'", row, raw);
    }
    time
}

fn coordinate_field(row: usize, item: &RawIncident, field: &str) -> Option<f64> {
    let value = lookup(item, field)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!("Row {}: dropping non-numeric {} value {}", row, field, value);
    }
    parsed
}
