use crate::db::Store;
use crate::error::StoreError;
use crate::schema::{Legislator, LegislatorSnapshot};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// An external id that matched no legislator, and the file that referenced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingId {
    pub id: String,
    pub filename: String,
}

/// Unresolved ids for one run, kept once per id in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct MissingIds {
    seen: HashSet<String>,
    entries: Vec<MissingId>,
}

impl MissingIds {
    pub fn record(&mut self, id: &str, filename: &str) {
        if !self.seen.insert(id.to_string()) {
            return;
        }
        self.entries.push(MissingId {
            id: id.to_string(),
            filename: filename.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[MissingId] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<MissingId> {
        self.entries
    }
}

/// Lookup from the feeds' govtrack id to a legislator snapshot. Built once
/// per ingestion run and read-only afterwards.
#[derive(Debug, Default)]
pub struct LegislatorIndex {
    by_govtrack_id: HashMap<String, LegislatorSnapshot>,
}

impl LegislatorIndex {
    pub fn build<'a>(legislators: impl IntoIterator<Item = &'a Legislator>) -> Self {
        let by_govtrack_id = legislators
            .into_iter()
            .map(|legislator| {
                (
                    legislator.govtrack_id.clone(),
                    LegislatorSnapshot::from(legislator),
                )
            })
            .collect();
        Self { by_govtrack_id }
    }

    pub fn load(store: &Store) -> Result<Self, StoreError> {
        let legislators: Vec<Legislator> = store.all()?;
        let index = Self::build(&legislators);
        debug!(legislators = index.len(), "built legislator index");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.by_govtrack_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_govtrack_id.is_empty()
    }

    pub fn get(&self, govtrack_id: &str) -> Option<&LegislatorSnapshot> {
        self.by_govtrack_id.get(govtrack_id)
    }

    /// Looks the id up, recording it as missing when there is no match.
    pub fn resolve(
        &self,
        govtrack_id: &str,
        filename: &str,
        missing: &mut MissingIds,
    ) -> Option<LegislatorSnapshot> {
        match self.get(govtrack_id) {
            Some(snapshot) => Some(snapshot.clone()),
            None => {
                missing.record(govtrack_id, filename);
                None
            }
        }
    }
}

/// Reads a legislator list from a `.json`, `.yaml` or `.yml` file.
pub fn read_legislators(path: &Path) -> Result<Vec<Legislator>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => serde_json::from_str(&raw)
            .with_context(|| format!("parsing {} as JSON", path.display())),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing {} as YAML", path.display())),
        _ => Err(anyhow!(
            "Unknown legislator file type: {} (expected .json, .yaml or .yml)",
            path.display()
        )),
    }
}
