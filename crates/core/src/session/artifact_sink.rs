use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::ARTIFACT_TIMESTAMP_FORMAT;

/// Saves raw request payloads to a directory for later audit.
///
/// Files are named `<yyyyMMdd_HHmmss>_<session>.png`; the session id keeps
/// names unique when several sessions arrive within the same second.
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, session_id: u64, payload: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stamp = chrono::Local::now().format(ARTIFACT_TIMESTAMP_FORMAT);
        let path = self.dir.join(format!("{stamp}_{session_id}.png"));
        fs::write(&path, payload)?;
        Ok(path)
    }
}
