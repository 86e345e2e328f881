use crate::constants::{ALL_FIELDS, PARTITION_FILE_FORMAT, PARTITION_MONTH_FORMAT};
use crate::error::{FeedError, Result};
use crate::types::IncidentRecord;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// CSV partitions laid out as `<root>/<YYYY-MM>/<YYYYMMDD_HH>.csv`, one per run.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the partition a run at `at` writes to
    pub fn partition_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.root
            .join(at.format(PARTITION_MONTH_FORMAT).to_string())
            .join(format!("{}.csv", at.format(PARTITION_FILE_FORMAT)))
    }

    /// Write a batch to the partition for `at`, header row first.
    ///
    /// A second run in the same hour replaces that hour's file.
    pub fn save_batch(&self, records: &[IncidentRecord], at: DateTime<Utc>) -> Result<PathBuf> {
        let path = self.partition_path(at);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() {
            warn!("Overwriting existing partition {}", path.display());
        }

        let file = File::create(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        // Written by hand so an empty batch still gets a header
        writer.write_record(ALL_FIELDS)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!("Saved {} incident(s) to {}", records.len(), path.display());
        Ok(path)
    }

    /// Partitions stamped at or after `now - days`, oldest first.
    pub fn list_recent(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<(DateTime<Utc>, PathBuf)>> {
        let cutoff = window_cutoff(now, days)?;
        let mut partitions = Vec::new();

        for month in months_between(cutoff.date_naive(), now.date_naive()) {
            let dir = self.root.join(&month);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("No partitions for {} ({}): {}", month, dir.display(), e);
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                    continue;
                }
                let Some(stamp) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(parse_partition_stem)
                else {
                    warn!("Skipping partition with unparsable name: {}", path.display());
                    continue;
                };
                if stamp >= cutoff {
                    partitions.push((stamp, path));
                }
            }
        }

        partitions.sort();
        Ok(partitions)
    }

    /// Every record persisted within the last `days` days of `now`.
    ///
    /// Unreadable or corrupt partitions are skipped; no partitions at all
    /// yields an empty history. A window `now` cannot be shifted by is a
    /// config error.
    pub fn load_recent(&self, now: DateTime<Utc>, days: i64) -> Result<Vec<IncidentRecord>> {
        let mut records = Vec::new();
        let partitions = self.list_recent(now, days)?;

        for (_, path) in &partitions {
            match read_partition(path) {
                Ok(mut rows) => records.append(&mut rows),
                Err(e) => warn!("Skipping unreadable partition {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded {} historical incident(s) from {} partition(s) covering the last {} day(s)",
            records.len(),
            partitions.len(),
            days
        );
        Ok(records)
    }
}

fn window_cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if days < 0 {
        return Err(FeedError::Config(format!(
            "history window must not be negative, got {} day(s)",
            days
        )));
    }
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            FeedError::Config(format!("history window of {} day(s) is out of range", days))
        })
}

/// Read every row of one partition file
pub fn read_partition(path: &Path) -> Result<Vec<IncidentRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<IncidentRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `YYYYMMDD_HH` -> timestamp at the top of that hour, UTC
pub fn parse_partition_stem(stem: &str) -> Option<DateTime<Utc>> {
    let (day, hour) = stem.split_once('_')?;
    if hour.len() != 2 {
        return None;
    }
    let date = NaiveDate::parse_from_str(day, "%Y%m%d").ok()?;
    let naive: NaiveDateTime = date.and_hms_opt(hour.parse().ok()?, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// `YYYY-MM` directory names from the month of `from` through the month of `to`
fn months_between(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut months = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    while (year, month) <= (to.year(), to.month()) {
        months.push(format!("{:04}-{:02}", year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}
