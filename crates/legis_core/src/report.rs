//! Run outcome reporting. Reports go to a sink; nothing here is stored.

use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Failure,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Warning => "warning",
            Status::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub status: Status,
    pub source: String,
    pub message: String,
    pub metadata: Value,
}

pub trait ReportSink {
    fn emit(&self, report: Report);

    fn success(&self, source: &str, message: &str, metadata: Value) {
        self.emit(Report {
            status: Status::Success,
            source: source.to_string(),
            message: message.to_string(),
            metadata,
        });
    }

    fn warning(&self, source: &str, message: &str, metadata: Value) {
        self.emit(Report {
            status: Status::Warning,
            source: source.to_string(),
            message: message.to_string(),
            metadata,
        });
    }

    fn failure(&self, source: &str, message: &str, metadata: Value) {
        self.emit(Report {
            status: Status::Failure,
            source: source.to_string(),
            message: message.to_string(),
            metadata,
        });
    }
}

/// Writes reports to the log.
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, report: Report) {
        let Report {
            status,
            source,
            message,
            metadata,
        } = report;
        match status {
            Status::Success => info!(%source, %metadata, "{message}"),
            Status::Warning => warn!(%source, %metadata, "{message}"),
            Status::Failure => error!(%source, %metadata, "{message}"),
        }
    }
}

/// Keeps reports in memory.
#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, report: Report) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report);
    }
}

/// Sends every report to each inner sink in turn.
pub struct FanoutSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for FanoutSink {
    fn emit(&self, report: Report) {
        for sink in &self.sinks {
            sink.emit(report.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct Shared(Arc<MemorySink>);

    impl ReportSink for Shared {
        fn emit(&self, report: Report) {
            self.0.emit(report);
        }
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(MemorySink::default());
        let second = Arc::new(MemorySink::default());
        let fanout = FanoutSink::new(vec![
            Box::new(Shared(first.clone())),
            Box::new(Shared(second.clone())),
            Box::new(TracingSink),
        ]);

        fanout.warning("Roll", "Found 2 unresolved legislator ids", json!({"missing_ids": ["1", "2"]}));

        for sink in [&first, &second] {
            let reports = sink.reports();
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].status, Status::Warning);
            assert_eq!(reports[0].source, "Roll");
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Status::Failure).unwrap(), json!("failure"));
        assert_eq!(Status::Success.as_str(), "success");
    }
}
