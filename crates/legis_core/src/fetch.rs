use crate::error::FetchError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Bills,
    Rolls,
}

impl SourceKind {
    /// Directory name on the mirror and locally.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Bills => "bills",
            SourceKind::Rolls => "rolls",
        }
    }

    /// Report source name.
    pub fn source(self) -> &'static str {
        match self {
            SourceKind::Bills => "Bill",
            SourceKind::Rolls => "Roll",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Bills => "bills",
            SourceKind::Rolls => "roll calls",
        }
    }
}

pub fn source_dir(data_dir: &Path, session: u32, kind: SourceKind) -> PathBuf {
    data_dir.join(session.to_string()).join(kind.as_str())
}

/// Materializes a session's source files locally and returns their directory.
pub trait Fetcher {
    fn fetch(&self, session: u32, kind: SourceKind) -> Result<PathBuf, FetchError>;
}

/// Mirrors `{remote}/{session}/{kind}/` with rsync.
pub struct RsyncFetcher {
    pub remote: String, // e.g. "govtrack.us::govtrackdata/us"
    pub data_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Fetcher for RsyncFetcher {
    fn fetch(&self, session: u32, kind: SourceKind) -> Result<PathBuf, FetchError> {
        let dest = source_dir(&self.data_dir, session, kind);
        fs::create_dir_all(&dest).map_err(|source| FetchError::Io {
            path: dest.clone(),
            source,
        })?;

        let remote = format!(
            "{}/{}/{}/",
            self.remote.trim_end_matches('/'),
            session,
            kind.as_str()
        );
        info!(%remote, dest = %dest.display(), "syncing source files");

        let status = Command::new("rsync")
            .arg("-az")
            .arg(format!("--timeout={}", self.timeout_secs))
            .arg(&remote)
            .arg(format!("{}/", dest.display()))
            .status()
            .map_err(FetchError::Spawn)?;

        if !status.success() {
            return Err(FetchError::Sync {
                remote,
                status: status.to_string(),
            });
        }
        Ok(dest)
    }
}

/// Uses files already on disk, e.g. placed there by a separate sync job.
pub struct LocalFetcher {
    pub data_dir: PathBuf,
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, session: u32, kind: SourceKind) -> Result<PathBuf, FetchError> {
        let dir = source_dir(&self.data_dir, session, kind);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(FetchError::Missing(dir))
        }
    }
}
