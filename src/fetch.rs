//! Upstream news source: a search-augmented language model asked for recent
//! security incidents as a strict JSON array.

use crate::config::{env_secret, FetchConfig};
use crate::constants::{self, DATE_FORMAT, MAX_LOOKBACK_HOURS, XAI_API_KEY_ENV};
use crate::error::{FeedError, Result};
use crate::normalize::{parse_incident_date, parse_incident_time, text_field};
use crate::types::RawIncident;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Anything that can produce a batch of raw incidents for a time window
pub trait NewsSource {
    fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawIncident>>;
}

/// Half-open interval of interest, both ends UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn last_hours(now: DateTime<Utc>, hours: i64) -> Result<Self> {
        if !(1..=MAX_LOOKBACK_HOURS).contains(&hours) {
            return Err(FeedError::Config(format!(
                "lookback must be between 1 and {} hours, got {}",
                MAX_LOOKBACK_HOURS, hours
            )));
        }
        let start = Duration::try_hours(hours)
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .ok_or_else(|| {
                FeedError::Config(format!("lookback of {} hours is out of range", hours))
            })?;
        Ok(Self { start, end: now })
    }

    pub fn hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }
}

const PROMPT_TEMPLATE: &str = r#"
Please retrieve news articles from the past {hours} hours related to security issues in {country}, including incidents such as banditry, gunmen attacks, kidnappings and other violent activities.

The response must be returned as a valid JSON array. Each news item must follow this schema exactly:

{
"title": "<headline of the news>",
"description": "<concise summary>",
"extendedDescription": "<a fuller account of what happened, who was involved and the aftermath>",
"state": "<state of occurrence>",
"lga": "<local government area, compulsory; infer if not explicitly stated>",
"incidentDate": "<date in YYYY-MM-DD format; if unavailable, use today's date>",
"incidentTime": "<time in HH:MM 24-hour format; if unavailable, use '00:00'>",
"status": "<one of: 'High', 'Medium', or 'Low'>"
}

Rules:
- All fields are required. If a value cannot be found, return null (except for incidentDate and incidentTime, which must follow the fallback rules above).
- Ensure the output is strictly valid JSON and can be parsed without errors.
- Do not include extra text, explanations, or formatting outside of the JSON.
"#;

pub fn build_prompt(country: &str, hours: i64) -> String {
    PROMPT_TEMPLATE
        .replace("{hours}", &hours.to_string())
        .replace("{country}", country)
        .trim()
        .to_string()
}

/// Client for the xAI chat completions API with live search enabled
pub struct GrokNewsClient {
    http: reqwest::blocking::Client,
    api_key: String,
    settings: FetchConfig,
}

impl GrokNewsClient {
    pub fn new(api_key: String, settings: FetchConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            api_key,
            settings,
        })
    }

    /// Build a client with the key from `XAI_API_KEY`
    pub fn from_env(settings: FetchConfig) -> Result<Self> {
        Self::new(env_secret(XAI_API_KEY_ENV)?, settings)
    }

    pub fn request_body(&self, window: &FetchWindow) -> Value {
        let mut sources = vec![
            json!({ "type": "web", "country": self.settings.country_code }),
            json!({ "type": "news", "country": self.settings.country_code }),
            json!({ "type": "x" }),
        ];
        if !self.settings.rss_links.is_empty() {
            sources.push(json!({ "type": "rss", "links": self.settings.rss_links }));
        }

        json!({
            "model": self.settings.model,
            "messages": [
                { "role": "user", "content": build_prompt(&self.settings.country, window.hours()) }
            ],
            "search_parameters": {
                "mode": "on",
                "return_citations": true,
                "from_date": window.start.format(DATE_FORMAT).to_string(),
                "to_date": window.end.format(DATE_FORMAT).to_string(),
                "max_search_results": self.settings.max_search_results,
                "sources": sources,
            },
            "temperature": 0
        })
    }

    fn complete(&self, window: &FetchWindow) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(window))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FeedError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json()?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FeedError::MalformedResponse {
                message: "missing choices[0].message.content".to_string(),
            })
    }
}

impl NewsSource for GrokNewsClient {
    #[instrument(skip(self), fields(model = %self.settings.model))]
    fn fetch(&self, window: &FetchWindow) -> Result<Vec<RawIncident>> {
        info!(
            "Requesting {} security news from {} to {}",
            self.settings.country, window.start, window.end
        );
        let content = self.complete(window)?;
        debug!("Upstream returned {} bytes of content", content.len());

        let incidents = parse_incidents(&content)?;
        Ok(discard_stale(incidents, window))
    }
}

/// Reads a saved upstream response (or hand-written batch) from disk.
/// No window filter is applied: the file is taken as the batch.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NewsSource for FileSource {
    fn fetch(&self, _window: &FetchWindow) -> Result<Vec<RawIncident>> {
        let content = fs::read_to_string(&self.path)?;
        let incidents = parse_incidents(&content)?;
        info!("Read {} incident(s) from {}", incidents.len(), self.path.display());
        Ok(incidents)
    }
}

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid fence regex"));

/// Parse model output into raw incidents.
///
/// Accepts a JSON array of objects (optionally inside a markdown code fence)
/// or a single object. Non-object array entries are dropped.
pub fn parse_incidents(content: &str) -> Result<Vec<RawIncident>> {
    let body = CODE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content.trim(), |m| m.as_str());

    let value: Value = serde_json::from_str(body).map_err(|e| FeedError::MalformedResponse {
        message: e.to_string(),
    })?;

    match value {
        Value::Array(items) => {
            let total = items.len();
            let incidents: Vec<RawIncident> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            if incidents.len() < total {
                warn!("Dropped {} non-object entries from upstream array", total - incidents.len());
            }
            Ok(incidents)
        }
        Value::Object(map) => Ok(vec![map]),
        other => Err(FeedError::MalformedResponse {
            message: format!("expected a JSON array, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// When an incident happened, with a missing date read as the window's end
/// date and a missing time as midnight.
pub fn incident_timestamp(item: &RawIncident, window: &FetchWindow) -> DateTime<Utc> {
    let date = text_field(item, constants::INCIDENT_DATE)
        .and_then(|raw| parse_incident_date(&raw))
        .unwrap_or_else(|| window.end.date_naive());
    let time = text_field(item, constants::INCIDENT_TIME)
        .and_then(|raw| parse_incident_time(&raw))
        .unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Drop incidents that happened before the window opened.
pub fn discard_stale(items: Vec<RawIncident>, window: &FetchWindow) -> Vec<RawIncident> {
    let total = items.len();
    let kept: Vec<RawIncident> = items
        .into_iter()
        .filter(|item| incident_timestamp(item, window) >= window.start)
        .collect();
    if kept.len() < total {
        info!(
            "Discarded {} incident(s) older than {}",
            total - kept.len(),
            window.start
        );
    }
    kept
}
