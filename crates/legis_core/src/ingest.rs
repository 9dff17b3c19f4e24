//! Per-session batch ingestion of bill and roll-call feeds.
//!
//! A run goes fetch → index legislators → parse/derive/upsert each file →
//! report. Validation failures are collected and skipped; anything else
//! stops the run, leaving earlier upserts in place.

use crate::bill;
use crate::db::{Collection, Condition, Document, Projection, Store};
use crate::error::{FetchError, IngestError, ParseError, StoreError};
use crate::fetch::{Fetcher, SourceKind};
use crate::legislators::{LegislatorIndex, MissingId, MissingIds};
use crate::query;
use crate::report::ReportSink;
use crate::roll;
use serde::Serialize;
use serde_json::{Value, json};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// The session in progress for a given year (the 111th ran 2009–2010).
pub fn session_for_year(year: i32) -> u32 {
    ((year + 1) / 2 - 894).max(0) as u32
}

pub fn current_session() -> u32 {
    session_for_year(OffsetDateTime::now_utc().year())
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub attributes: Value,
    pub error_messages: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub count: usize,
    pub missing_ids: Vec<MissingId>,
    pub failed: Vec<FailedRecord>,
    pub aborted: Option<String>,
    pub elapsed_secs: f64,
}

#[derive(Default)]
struct RunState {
    count: usize,
    missing: MissingIds,
    failed: Vec<FailedRecord>,
}

/// `{data_dir}/{session}/.{kind}.lock`, held for the length of a run.
struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(data_dir: &Path, kind: SourceKind, session: u32) -> Result<Self, IngestError> {
        let dir = data_dir.join(session.to_string());
        let path = dir.join(format!(".{}.lock", kind.as_str()));
        fs::create_dir_all(&dir).map_err(|source| IngestError::Lock {
            path: path.clone(),
            source,
        })?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(IngestError::Locked { path }),
            Err(source) => Err(IngestError::Lock { path, source }),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "could not release run lock");
        }
    }
}

pub struct Ingestor<'a> {
    store: &'a Store,
    fetcher: &'a dyn Fetcher,
    sink: &'a dyn ReportSink,
    lock_dir: Option<PathBuf>,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a Store, fetcher: &'a dyn Fetcher, sink: &'a dyn ReportSink) -> Self {
        Self {
            store,
            fetcher,
            sink,
            lock_dir: None,
        }
    }

    /// Holds `{dir}/{session}/.{kind}.lock` for the length of each run.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn run(&self, kind: SourceKind, session: u32) -> RunSummary {
        let start = Instant::now();
        info!(kind = kind.as_str(), session, "starting ingestion run");

        let mut state = RunState::default();
        let outcome = self.process(kind, session, &mut state);

        let mut summary = RunSummary {
            count: state.count,
            missing_ids: state.missing.into_vec(),
            failed: state.failed,
            aborted: None,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };

        let source = kind.source();
        let label = kind.label();
        match outcome {
            Ok(()) => {
                info!(
                    count = summary.count,
                    failed = summary.failed.len(),
                    missing = summary.missing_ids.len(),
                    "ingestion run finished"
                );
                self.report(kind, session, &summary, None);
            }
            Err(err @ IngestError::Fetch(_)) => {
                summary.aborted = Some(err.to_string());
                self.sink.failure(
                    source,
                    &format!("Couldn't sync {label} for session #{session}."),
                    json!({"error": err.to_string()}),
                );
            }
            Err(err @ IngestError::Locked { .. }) => {
                summary.aborted = Some(err.to_string());
                self.sink.failure(
                    source,
                    &format!("Another run is already syncing {label} for session #{session}."),
                    json!({"error": err.to_string()}),
                );
            }
            Err(err) => {
                error!(%err, "ingestion run aborted");
                summary.aborted = Some(err.to_string());
                self.report(kind, session, &summary, Some(&err));
            }
        }

        summary
    }

    fn process(&self, kind: SourceKind, session: u32, state: &mut RunState) -> Result<(), IngestError> {
        let _lock = match &self.lock_dir {
            Some(dir) => Some(RunLock::acquire(dir, kind, session)?),
            None => None,
        };

        let dir = self.fetcher.fetch(session, kind)?;
        let legislators = LegislatorIndex::load(self.store).map_err(IngestError::Index)?;
        let files = source_files(&dir)?;
        info!(
            files = files.len(),
            legislators = legislators.len(),
            dir = %dir.display(),
            "processing source files"
        );

        let session = session.to_string();
        for path in files {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = fs::read_to_string(&path).map_err(|source| IngestError::Parse {
                file: filename.clone(),
                source: ParseError::Read {
                    path: path.clone(),
                    source,
                },
            })?;
            let parse_failed = |source| IngestError::Parse {
                file: filename.clone(),
                source,
            };

            match kind {
                SourceKind::Bills => {
                    let bill = bill::parse_bill(&text, &filename, &session, &legislators, &mut state.missing)
                        .map_err(parse_failed)?;
                    self.save(&bill, &filename, state)?;
                }
                SourceKind::Rolls => {
                    let mut roll = roll::parse_roll(&text, &filename, &session, &legislators, &mut state.missing)
                        .map_err(parse_failed)?;
                    roll.bill = self
                        .bill_snapshot(roll.bill_id.as_deref())
                        .map_err(|source| IngestError::Store {
                            file: filename.clone(),
                            source,
                        })?;
                    self.save(&roll, &filename, state)?;
                }
            }
        }

        Ok(())
    }

    fn bill_snapshot(&self, bill_id: Option<&str>) -> Result<Option<Value>, StoreError> {
        let Some(bill_id) = bill_id else {
            return Ok(None);
        };
        self.store.find_one(
            Collection::Bills,
            &[Condition::equals("bill_id", bill_id)],
            &Projection::fields(query::BILL.basic_fields),
        )
    }

    fn save<D: Document>(&self, document: &D, filename: &str, state: &mut RunState) -> Result<(), IngestError> {
        match self.store.upsert(document) {
            Ok(()) => {
                state.count += 1;
                debug!(key = document.key(), filename, "saved");
                Ok(())
            }
            Err(StoreError::Invalid(error_messages)) => {
                warn!(key = document.key(), filename, errors = ?error_messages, "record failed validation");
                let attributes = serde_json::to_value(document).map_err(|err| IngestError::Store {
                    file: filename.to_string(),
                    source: StoreError::Json(err),
                })?;
                state.failed.push(FailedRecord {
                    attributes,
                    error_messages,
                });
                Ok(())
            }
            Err(source) => Err(IngestError::Store {
                file: filename.to_string(),
                source,
            }),
        }
    }

    fn report(&self, kind: SourceKind, session: u32, summary: &RunSummary, aborted: Option<&IngestError>) {
        let source = kind.source();
        let label = kind.label();

        if summary.count > 0 {
            self.sink.success(
                source,
                &format!("Synced {} {label} for session #{session}.", summary.count),
                json!({"count": summary.count, "elapsed_time": summary.elapsed_secs}),
            );
        }

        if !summary.missing_ids.is_empty() {
            let mut message = format!(
                "Found {} missing legislator ids, attached.",
                summary.missing_ids.len()
            );
            if kind == SourceKind::Rolls {
                message.push_str(" Vote counts on roll calls may be inaccurate until these are fixed.");
            }
            self.sink
                .warning(source, &message, json!({"missing_ids": summary.missing_ids}));
        }

        if !summary.failed.is_empty() {
            self.sink.failure(
                source,
                &format!(
                    "Failed to save {} {label}. Attached the failed records' attributes and errors.",
                    summary.failed.len()
                ),
                json!({
                    "count": summary.failed.len(),
                    "failed": summary.failed,
                    "last": summary.failed.last(),
                }),
            );
        }

        if let Some(err) = aborted {
            self.sink.failure(
                source,
                &format!("Exception while saving {label}. Attached the error."),
                json!({"exception": {"message": err.to_string(), "file": err.file()}}),
            );
        }
    }
}

/// `*.xml` files in the directory, sorted by name.
fn source_files(dir: &Path) -> Result<Vec<PathBuf>, FetchError> {
    let io_error = |source| FetchError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("xml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
