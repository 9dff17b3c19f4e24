use anyhow::{Context, Result};
use legis_core::report::{Report, ReportSink};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::{debug, error};

pub struct ReportPaths {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl ReportPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            index_dir: root.join("00_Index"),
            runs_dir: root.join("Reports").join("Runs"),
            root,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.index_dir)
            .with_context(|| format!("creating {}", self.index_dir.display()))?;
        fs::create_dir_all(&self.runs_dir)
            .with_context(|| format!("creating {}", self.runs_dir.display()))?;
        Ok(())
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join("MOC - Reports.md")
    }
}

/// Writes every report as a markdown note and keeps an index of them.
/// Write failures are logged, never raised into the run that reported.
pub struct VaultSink {
    paths: ReportPaths,
}

impl VaultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: ReportPaths::new(root),
        }
    }

    pub fn paths(&self) -> &ReportPaths {
        &self.paths
    }

    pub fn record(&self, report: &Report, recorded_at: OffsetDateTime) -> Result<PathBuf> {
        self.paths.ensure()?;
        let note_path = write_report_note(&self.paths, report, recorded_at)?;
        write_index(&self.paths)?;
        Ok(note_path)
    }
}

impl ReportSink for VaultSink {
    fn emit(&self, report: Report) {
        match self.record(&report, OffsetDateTime::now_utc()) {
            Ok(path) => debug!(path = %path.display(), "wrote report note"),
            Err(err) => error!(
                root = %self.paths.root.display(),
                source = %report.source,
                err = format!("{err:#}"),
                "could not write report note"
            ),
        }
    }
}

fn write_report_note(paths: &ReportPaths, report: &Report, recorded_at: OffsetDateTime) -> Result<PathBuf> {
    let stamp = recorded_at.format(format_description!(
        "[year][month][day]T[hour][minute][second]Z"
    ))?;
    let stem = format!("{stamp}-{}-{}", report.source, report.status.as_str());

    // Reports from one run can land in the same second.
    let mut note_path = paths.runs_dir.join(format!("{stem}.md"));
    let mut attempt = 1;
    while note_path.exists() {
        attempt += 1;
        note_path = paths.runs_dir.join(format!("{stem}-{attempt}.md"));
    }

    let metadata_json = serde_json::to_string_pretty(&report.metadata)?;

    let mut md = String::new();
    md.push_str("---\n");
    md.push_str(&format!("recorded_at: {}\n", recorded_at.format(&Rfc3339)?));
    md.push_str(&format!("source: {}\n", report.source));
    md.push_str(&format!("status: {}\n", report.status.as_str()));
    md.push_str("message: |\n");
    md.push_str(&indent_yaml_block(&report.message));
    md.push_str("metadata_json: |\n");
    md.push_str(&indent_yaml_block(&metadata_json));
    md.push_str("---\n\n");

    md.push_str(&format!("# {} {}\n\n", report.source, report.status.as_str()));
    md.push_str(&report.message);
    md.push_str("\n\n");

    md.push_str("## Metadata\n");
    match &report.metadata {
        serde_json::Value::Null => md.push_str("_No metadata attached._\n"),
        serde_json::Value::Object(map) if map.is_empty() => md.push_str("_No metadata attached._\n"),
        _ => {
            md.push_str("```json\n");
            md.push_str(&metadata_json);
            md.push_str("\n```\n");
        }
    }

    fs::write(&note_path, md).with_context(|| format!("writing {}", note_path.display()))?;
    Ok(note_path)
}

/// Rebuilds the index from the notes on disk, newest first.
pub fn write_index(paths: &ReportPaths) -> Result<()> {
    let mut stems: Vec<String> = fs::read_dir(&paths.runs_dir)
        .with_context(|| format!("listing {}", paths.runs_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                return None;
            }
            Some(path.file_stem()?.to_str()?.to_string())
        })
        .collect();
    stems.sort_by(|a, b| b.cmp(a));

    let mut lines: Vec<String> = Vec::new();
    lines.push("# MOC - Reports".to_string());
    lines.push(String::new());
    lines.push("This index is generated. Do not edit manually.".to_string());
    lines.push(String::new());
    lines.push("## Runs".to_string());
    lines.push(String::new());

    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    if stems.is_empty() {
        lines.push("_No run reports found._".to_string());
    }
    for stem in &stems {
        lines.push(format!("- [[Reports/Runs/{stem}|{stem}]]"));
        if let Some(key) = source_and_status(stem) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    lines.push(String::new());
    lines.push("## By Source".to_string());
    lines.push(String::new());
    if counts.is_empty() {
        lines.push("_No run reports found._".to_string());
    } else {
        for ((source, status), count) in counts {
            lines.push(format!("- {source} {status} ({count})"));
        }
    }

    let index_path = paths.index_path();
    fs::write(&index_path, lines.join("\n")).with_context(|| format!("writing {}", index_path.display()))?;
    Ok(())
}

/// `20090128T190500Z-Bill-warning-2` → ("Bill", "warning").
fn source_and_status(stem: &str) -> Option<(String, String)> {
    let mut parts = stem.split('-').skip(1);
    let source = parts.next()?;
    let status = parts.next()?;
    Some((source.to_string(), status.to_string()))
}

fn indent_yaml_block(s: &str) -> String {
    let mut out = String::new();
    for line in s.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_blocks_are_indented() {
        assert_eq!(indent_yaml_block("{\n  \"a\": 1\n}"), "  {\n    \"a\": 1\n  }\n");
        assert_eq!(indent_yaml_block(""), "");
    }

    #[test]
    fn stems_split_into_source_and_status() {
        assert_eq!(
            source_and_status("20100301T120000Z-Roll-failure-2"),
            Some(("Roll".to_string(), "failure".to_string()))
        );
        assert_eq!(source_and_status("notes"), None);
    }
}
