use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;
use threat_feed::error::{FeedError, Result};
use threat_feed::fetch::{FetchWindow, NewsSource};
use threat_feed::pipeline::{Pipeline, PipelineSettings};
use threat_feed::publisher::{Publisher, ThreatSubmission};
use threat_feed::storage::{read_partition, PartitionStore};
use threat_feed::types::{FixedClock, RawIncident};

/// Hands out a canned batch, or a canned error
struct CannedSource {
    batch: Vec<RawIncident>,
    malformed: bool,
}

impl CannedSource {
    fn new(batch: Vec<RawIncident>) -> Self {
        Self { batch, malformed: false }
    }

    fn malformed() -> Self {
        Self {
            batch: Vec::new(),
            malformed: true,
        }
    }
}

impl NewsSource for CannedSource {
    fn fetch(&self, _window: &FetchWindow) -> Result<Vec<RawIncident>> {
        if self.malformed {
            return Err(FeedError::MalformedResponse {
                message: "expected value at line 1 column 1".to_string(),
            });
        }
        Ok(self.batch.clone())
    }
}

/// Records every submission; rejects the call numbered `fail_on` (0-based)
struct RecordingPublisher {
    sent: Rc<RefCell<Vec<ThreatSubmission>>>,
    attempts: Rc<RefCell<usize>>,
    fail_on: Option<usize>,
}

impl Publisher for RecordingPublisher {
    fn publish(&self, submission: &ThreatSubmission) -> Result<Value> {
        let attempt = *self.attempts.borrow();
        *self.attempts.borrow_mut() += 1;
        if self.fail_on == Some(attempt) {
            return Err(FeedError::PublishRejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.borrow_mut().push(submission.clone());
        Ok(json!({ "id": attempt }))
    }
}

struct Harness {
    dir: TempDir,
    sent: Rc<RefCell<Vec<ThreatSubmission>>>,
    attempts: Rc<RefCell<usize>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            sent: Rc::new(RefCell::new(Vec::new())),
            attempts: Rc::new(RefCell::new(0)),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn pipeline(
        &self,
        source: CannedSource,
        now: DateTime<Utc>,
        fail_on: Option<usize>,
    ) -> Pipeline {
        let publisher = RecordingPublisher {
            sent: Rc::clone(&self.sent),
            attempts: Rc::clone(&self.attempts),
            fail_on,
        };
        Pipeline::new(
            Box::new(source),
            Box::new(publisher),
            PartitionStore::new(self.root()),
            Box::new(FixedClock(now)),
            PipelineSettings::default(),
        )
    }

    fn partitions(&self) -> Vec<std::path::PathBuf> {
        PartitionStore::new(self.root())
            .list_recent(t0() + Duration::days(1), 30)
            .unwrap()
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    fn sent_titles(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|s| s.title.clone()).collect()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 19, 9, 15, 0).unwrap()
}

fn incident(title: &str, description: &str, state: &str, lga: &str, date: &str) -> RawIncident {
    let value = json!({
        "title": title,
        "description": description,
        "state": state,
        "lga": lga,
        "status": "High",
        "incidentDate": date,
        "incidentTime": "07:30",
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn first_batch() -> Vec<RawIncident> {
    vec![
        incident(
            "Bandits abduct worshippers during evening prayers",
            "Gunmen stormed a mosque and seized several worshippers",
            "Zamfara",
            "Maru",
            "2025-10-18",
        ),
        incident(
            "Pipeline vandals arrested near creek",
            "Navy operatives intercepted crude thieves along waterway",
            "Rivers",
            "Okrika",
            "2025-09-03",
        ),
        incident(
            "Herders clash with farmers over grazing land",
            "Violent dispute leaves homesteads burnt and cattle missing",
            "Benue",
            "Guma",
            "2025-08-11",
        ),
    ]
}

fn second_batch() -> Vec<RawIncident> {
    let mut batch = vec![first_batch().remove(0)];
    batch.push(incident(
        "Kidnapped students regain freedom after negotiations",
        "Schoolchildren returned home following ransom talks",
        "Kaduna",
        "Kajuru",
        "2025-07-22",
    ));
    batch.push(incident(
        "Explosive device detonates at market square",
        "Traders injured when improvised bomb exploded",
        "Borno",
        "Konduga",
        "2025-06-27",
    ));
    batch
}

#[test]
fn test_second_run_publishes_only_new_incidents() {
    let harness = Harness::new();

    let first = harness
        .pipeline(CannedSource::new(first_batch()), t0(), None)
        .run()
        .unwrap();
    assert_eq!(first.fetched, 3);
    assert_eq!(first.unique, 3);
    assert_eq!(first.published, 3);

    let later = t0() + Duration::hours(2);
    let second = harness
        .pipeline(CannedSource::new(second_batch()), later, None)
        .run()
        .unwrap();
    assert_eq!(second.fetched, 3);
    assert_eq!(second.duplicates, 1);
    assert_eq!(second.unique, 2);
    assert_eq!(second.published, 2);

    let titles = harness.sent_titles();
    assert_eq!(titles.len(), 5);
    assert_eq!(
        titles[3..].to_vec(),
        vec![
            "Kidnapped students regain freedom after negotiations".to_string(),
            "Explosive device detonates at market square".to_string(),
        ]
    );

    let partitions = harness.partitions();
    assert_eq!(partitions.len(), 2);
    assert_eq!(
        partitions[0],
        harness.root().join("2025-10").join("20251019_09.csv")
    );
    assert_eq!(
        partitions[1],
        harness.root().join("2025-10").join("20251019_11.csv")
    );
    for path in &partitions {
        assert_eq!(read_partition(path).unwrap().len(), 3);
    }
}

#[test]
fn test_blank_lga_is_published_with_placeholder() {
    let harness = Harness::new();
    let batch = vec![incident(
        "Gunmen ambush patrol team on highway",
        "Soldiers repelled attackers after heavy gunfire",
        "Niger",
        "",
        "2025-10-19",
    )];

    let report = harness
        .pipeline(CannedSource::new(batch), t0(), None)
        .run()
        .unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(harness.sent.borrow()[0].lga, "Somewhere");
}

#[test]
fn test_publish_failure_keeps_partition_and_stops() {
    let harness = Harness::new();

    let err = harness
        .pipeline(CannedSource::new(first_batch()), t0(), Some(1))
        .run()
        .unwrap_err();

    match err {
        FeedError::PublishAborted { sent, title, .. } => {
            assert_eq!(sent, 1);
            assert_eq!(title, "Pipeline vandals arrested near creek");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*harness.attempts.borrow(), 2);
    assert_eq!(harness.sent_titles().len(), 1);

    let partitions = harness.partitions();
    assert_eq!(partitions.len(), 1);
    assert_eq!(read_partition(&partitions[0]).unwrap().len(), 3);
}

#[test]
fn test_validation_failure_writes_nothing() {
    let harness = Harness::new();
    let mut batch = first_batch();
    batch[1].remove("state");
    batch[2].insert("status".to_string(), json!("Severe"));

    let err = harness
        .pipeline(CannedSource::new(batch), t0(), None)
        .run()
        .unwrap_err();

    match err {
        FeedError::Validation(e) => {
            let rows: Vec<usize> = e.violations.iter().map(|v| v.row).collect();
            assert_eq!(rows, vec![1, 2]);
            assert_eq!(e.violations[0].missing, vec!["state"]);
            assert_eq!(e.violations[1].invalid, vec!["status=Severe".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.partitions().is_empty());
    assert_eq!(*harness.attempts.borrow(), 0);
}

#[test]
fn test_malformed_upstream_yields_empty_run() {
    let harness = Harness::new();

    let report = harness
        .pipeline(CannedSource::malformed(), t0(), None)
        .run()
        .unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.published, 0);
    assert!(report.partition.is_none());
    assert!(!harness.root().join("2025-10").exists());
}

#[test]
fn test_records_from_elsewhere_skip_the_fetch() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(CannedSource::malformed(), t0(), None);

    let report = pipeline.filter_and_publish(first_batch()).unwrap();
    assert_eq!(report.published, 3);
    assert_eq!(
        report.partition,
        Some(harness.root().join("2025-10").join("20251019_09.csv"))
    );
    assert!(fs::metadata(report.partition.unwrap()).unwrap().len() > 0);
}
