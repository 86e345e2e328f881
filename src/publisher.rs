use crate::config::{env_secret, PublishConfig};
use crate::constants::{DATE_FORMAT, PUBLISH_API_KEY_ENV, TIME_FORMAT};
use crate::error::{FeedError, Result};
use crate::types::{IncidentRecord, Status};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument};

/// Body of one `POST /api/threats` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatSubmission {
    pub title: String,
    pub description: String,
    pub state: String,
    pub lga: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_time: Option<String>,
}

impl ThreatSubmission {
    /// Build the publish body, substituting `lga_placeholder` for a null or blank LGA.
    pub fn from_record(record: &IncidentRecord, lga_placeholder: &str) -> Self {
        let lga = record
            .lga
            .as_deref()
            .map(str::trim)
            .filter(|lga| !lga.is_empty())
            .unwrap_or(lga_placeholder)
            .to_string();

        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            state: record.state.clone(),
            lga,
            status: record.status,
            incident_date: record
                .incident_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
            incident_time: record
                .incident_time
                .map(|t| t.format(TIME_FORMAT).to_string()),
        }
    }
}

/// Destination for unique incidents, one submission per call
pub trait Publisher {
    fn publish(&self, submission: &ThreatSubmission) -> Result<Value>;
}

/// Publisher for the dashboard's `/api/threats` HTTP action
pub struct ThreatApiPublisher {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl ThreatApiPublisher {
    pub fn new(api_key: String, settings: &PublishConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/threats", settings.base_url.trim_end_matches('/')),
            api_key,
        })
    }

    /// Build a publisher with the key from `CONVEX_API_KEY`
    pub fn from_env(settings: &PublishConfig) -> Result<Self> {
        Self::new(env_secret(PUBLISH_API_KEY_ENV)?, settings)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Publisher for ThreatApiPublisher {
    #[instrument(skip(self, submission), fields(title = %submission.title))]
    fn publish(&self, submission: &ThreatSubmission) -> Result<Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("api_key", self.api_key.as_str())])
            .json(submission)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            error!("Publish rejected with HTTP {}: {}", status.as_u16(), body);
            return Err(FeedError::PublishRejected {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Logs each submission instead of sending it
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, submission: &ThreatSubmission) -> Result<Value> {
        info!("Would publish: {}", serde_json::to_string(submission)?);
        Ok(Value::Null)
    }
}

/// Publish submissions in order, stopping at the first failure.
///
/// Returns the responses of every accepted submission. On failure the error
/// says how many went out before it, and nothing after it is attempted.
pub fn publish_all(
    publisher: &dyn Publisher,
    submissions: &[ThreatSubmission],
) -> Result<Vec<Value>> {
    let mut responses = Vec::with_capacity(submissions.len());

    for submission in submissions {
        match publisher.publish(submission) {
            Ok(response) => {
                info!("Published '{}'", submission.title);
                responses.push(response);
            }
            Err(e) => {
                error!(
                    "Publishing stopped at '{}' after {} success(es): {}",
                    submission.title,
                    responses.len(),
                    e
                );
                return Err(FeedError::PublishAborted {
                    sent: responses.len(),
                    title: submission.title.clone(),
                    source: Box::new(e),
                });
            }
        }
    }

    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{read_partition, PartitionStore};
    use crate::test_support::serve_once;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use serde_json::json;
    use std::cell::RefCell;

    fn record(title: &str, lga: Option<&str>) -> IncidentRecord {
        IncidentRecord {
            title: title.to_string(),
            description: "Armed men attacked a checkpoint".to_string(),
            extended_description: None,
            state: "Benue".to_string(),
            lga: lga.map(str::to_string),
            status: Status::Low,
            incident_date: NaiveDate::from_ymd_opt(2025, 10, 19),
            incident_time: NaiveTime::from_hms_opt(6, 5, 0),
            lat: Some(7.7),
            lng: Some(8.5),
            is_duplicate: Some(false),
        }
    }

    /// Accepts everything except titles listed in `reject`
    struct FakePublisher {
        reject: Vec<String>,
        attempts: RefCell<Vec<String>>,
    }

    impl Publisher for FakePublisher {
        fn publish(&self, submission: &ThreatSubmission) -> Result<Value> {
            self.attempts.borrow_mut().push(submission.title.clone());
            if self.reject.contains(&submission.title) {
                return Err(FeedError::PublishRejected {
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
            Ok(json!({ "ok": true }))
        }
    }

    #[test]
    fn test_submission_json_shape() {
        assert_eq!(
            serde_json::to_value(submission()).unwrap(),
            json!({
                "title": "Checkpoint attack",
                "description": "Armed men attacked a checkpoint",
                "state": "Benue",
                "lga": "Makurdi",
                "status": "Low",
                "incidentDate": "2025-10-19",
                "incidentTime": "06:05"
            })
        );
    }

    #[test]
    fn test_missing_lga_becomes_placeholder() {
        let missing = ThreatSubmission::from_record(&record("No LGA", None), "Somewhere");
        assert_eq!(missing.lga, "Somewhere");

        let blank = ThreatSubmission::from_record(&record("Blank LGA", Some("  ")), "Somewhere");
        assert_eq!(blank.lga, "Somewhere");
    }

    #[test]
    fn test_optional_date_and_time_are_omitted() {
        let mut rec = record("Undated", Some("Gboko"));
        rec.incident_date = None;
        rec.incident_time = None;
        let value = serde_json::to_value(ThreatSubmission::from_record(&rec, "Somewhere")).unwrap();
        assert!(value.get("incidentDate").is_none());
        assert!(value.get("incidentTime").is_none());
    }

    #[test]
    fn test_publish_all_sends_each_once() {
        let publisher = FakePublisher {
            reject: vec![],
            attempts: RefCell::new(vec![]),
        };
        let submissions: Vec<ThreatSubmission> = ["a", "b", "c"]
            .iter()
            .map(|t| ThreatSubmission::from_record(&record(t, Some("Otukpo")), "Somewhere"))
            .collect();

        let responses = publish_all(&publisher, &submissions).unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(*publisher.attempts.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_publish_all_aborts_on_first_failure() {
        let publisher = FakePublisher {
            reject: vec!["b".to_string()],
            attempts: RefCell::new(vec![]),
        };
        let submissions: Vec<ThreatSubmission> = ["a", "b", "c"]
            .iter()
            .map(|t| ThreatSubmission::from_record(&record(t, Some("Otukpo")), "Somewhere"))
            .collect();

        let err = publish_all(&publisher, &submissions).unwrap_err();
        match err {
            FeedError::PublishAborted { sent, title, source } => {
                assert_eq!(sent, 1);
                assert_eq!(title, "b");
                assert!(matches!(*source, FeedError::PublishRejected { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*publisher.attempts.borrow(), vec!["a", "b"]);
    }

    fn stub_publisher(base_url: String) -> ThreatApiPublisher {
        let settings = PublishConfig {
            base_url,
            ..PublishConfig::default()
        };
        ThreatApiPublisher::new("stmp_key".to_string(), &settings).unwrap()
    }

    fn submission() -> ThreatSubmission {
        ThreatSubmission::from_record(&record("Checkpoint attack", Some("Makurdi")), "Somewhere")
    }

    #[test]
    fn test_http_error_becomes_publish_rejected() {
        let (base_url, server) = serve_once(500, "boom");
        let err = stub_publisher(base_url).publish(&submission()).unwrap_err();

        match err {
            FeedError::PublishRejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/threats?api_key=stmp_key "));
        assert!(request.contains("\"title\":\"Checkpoint attack\""));
    }

    #[test]
    fn test_empty_success_body_is_null() {
        let (base_url, server) = serve_once(201, "");
        let response = stub_publisher(base_url).publish(&submission()).unwrap();
        assert_eq!(response, Value::Null);
        server.join().unwrap();
    }

    #[test]
    fn test_success_body_is_parsed() {
        let (base_url, server) = serve_once(200, r#"{"id": "k17abc"}"#);
        let response = stub_publisher(base_url).publish(&submission()).unwrap();
        assert_eq!(response, json!({ "id": "k17abc" }));
        server.join().unwrap();
    }

    #[test]
    fn test_reloaded_row_without_lga_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let at = Utc.with_ymd_and_hms(2025, 10, 19, 7, 0, 0).unwrap();
        let path = store.save_batch(&[record("Old row", None)], at).unwrap();

        let reloaded = read_partition(&path).unwrap();
        assert_eq!(reloaded[0].lga, None);
        assert_eq!(ThreatSubmission::from_record(&reloaded[0], "Somewhere").lga, "Somewhere");
    }

    #[test]
    fn test_endpoint_is_threats_route() {
        let settings = PublishConfig {
            base_url: "https://example.convex.site/".to_string(),
            ..PublishConfig::default()
        };
        let publisher = ThreatApiPublisher::new("stmp_key".to_string(), &settings).unwrap();
        assert_eq!(publisher.endpoint(), "https://example.convex.site/api/threats");
    }
}
