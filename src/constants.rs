/// Column names of the normalized incident schema, in persisted order.
pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const EXTENDED_DESCRIPTION: &str = "extendedDescription";
pub const STATE: &str = "state";
pub const LGA: &str = "lga";
pub const STATUS: &str = "status";
pub const INCIDENT_DATE: &str = "incidentDate";
pub const INCIDENT_TIME: &str = "incidentTime";
pub const LAT: &str = "lat";
pub const LNG: &str = "lng";
pub const IS_DUPLICATE: &str = "is_duplicate";

pub const REQUIRED_FIELDS: [&str; 5] = [TITLE, DESCRIPTION, STATE, LGA, STATUS];

pub const ALL_FIELDS: [&str; 11] = [
    TITLE,
    DESCRIPTION,
    EXTENDED_DESCRIPTION,
    STATE,
    LGA,
    STATUS,
    INCIDENT_DATE,
    INCIDENT_TIME,
    LAT,
    LNG,
    IS_DUPLICATE,
];

/// snake_case spellings the upstream model sometimes produces
pub fn field_aliases(field: &str) -> &'static [&'static str] {
    match field {
        EXTENDED_DESCRIPTION => &["extended_description"],
        INCIDENT_DATE => &["incident_date"],
        INCIDENT_TIME => &["incident_time"],
        _ => &[],
    }
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Partition directory (`YYYY-MM`) and file stem (`YYYYMMDD_HH`) formats
pub const PARTITION_MONTH_FORMAT: &str = "%Y-%m";
pub const PARTITION_FILE_FORMAT: &str = "%Y%m%d_%H";

pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.35;
pub const DEFAULT_WINDOW_DAYS: i64 = 5;
pub const DEFAULT_LOOKBACK_HOURS: i64 = 8;
pub const MAX_WINDOW_DAYS: i64 = 3650;
pub const MAX_LOOKBACK_HOURS: i64 = 24 * 31;
pub const LGA_PLACEHOLDER: &str = "Somewhere";

// Environment variables holding the two credentials
pub const XAI_API_KEY_ENV: &str = "XAI_API_KEY";
pub const PUBLISH_API_KEY_ENV: &str = "CONVEX_API_KEY";
pub const PUSHGATEWAY_URL_ENV: &str = "THREAT_FEED_PUSHGATEWAY_URL";
