use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {name} error: {source}")]
    Env {
        name: &'static str,
        #[source]
        source: std::env::VarError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Upstream request rejected with status {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Upstream response is not a valid incident array: {message}")]
    MalformedResponse { message: String },

    #[error("Publish rejected with status {status}: {body}")]
    PublishRejected { status: u16, body: String },

    #[error("Publishing aborted after {sent} record(s) at '{title}': {source}")]
    PublishAborted {
        sent: usize,
        title: String,
        #[source]
        source: Box<FeedError>,
    },
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// One offending input row and what is wrong with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RowViolation {
    /// Position of the row in the input batch.
    pub row: usize,
    pub title: Option<String>,
    pub missing: Vec<&'static str>,
    /// `field=value` pairs for values present but not acceptable.
    pub invalid: Vec<String>,
}

/// Raised by the normalizer when any row lacks a required field.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub violations: Vec<RowViolation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record(s) failed validation:", self.violations.len())?;
        for v in &self.violations {
            write!(f, " [row {}", v.row)?;
            if let Some(title) = &v.title {
                write!(f, " '{}'", title)?;
            }
            if !v.missing.is_empty() {
                write!(f, " missing: {}", v.missing.join(", "))?;
            }
            if !v.invalid.is_empty() {
                write!(f, " invalid: {}", v.invalid.join(", "))?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
