//! Port to the external extraction collaborator.
//!
//! The engine never talks to the document-extraction API directly; it reads
//! per-version element streams through `ElementSource`. The shipped
//! implementation reads the collaborator's JSON dumps from a directory tree
//! (`<root>/<law_id>/<version>.json`), which is also what the test corpus
//! uses.

use std::path::PathBuf;

use crate::elements::DocElement;
use crate::extract::ExtractError;

/// Read-only access to element streams, per (law, version).
pub trait ElementSource: Send + Sync {
    /// All laws the source knows about, sorted.
    fn laws(&self) -> Result<Vec<String>, ExtractError>;

    /// Versions of one law, in version order (oldest first).
    fn versions(&self, law_id: &str) -> Result<Vec<String>, ExtractError>;

    /// One version's ordered element stream.
    fn elements(&self, law_id: &str, version: &str) -> Result<Vec<DocElement>, ExtractError>;
}

/// Order versions numerically where they parse as numbers, lexically
/// otherwise. Nachtragsnummern are numeric in practice ("3" < "12"), but the
/// source occasionally carries suffixed identifiers.
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
}

/// Directory-backed element source.
pub struct JsonElementSource {
    root: PathBuf,
}

impl JsonElementSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ElementSource for JsonElementSource {
    fn laws(&self) -> Result<Vec<String>, ExtractError> {
        let mut laws = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(laws),
            Err(e) => return Err(ExtractError::Io(e)),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                laws.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        laws.sort();
        Ok(laws)
    }

    fn versions(&self, law_id: &str) -> Result<Vec<String>, ExtractError> {
        let mut versions = Vec::new();
        let entries = match std::fs::read_dir(self.root.join(law_id)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(ExtractError::Io(e)),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(version) = name.strip_suffix(".json") {
                versions.push(version.to_string());
            }
        }
        sort_versions(&mut versions);
        Ok(versions)
    }

    fn elements(&self, law_id: &str, version: &str) -> Result<Vec<DocElement>, ExtractError> {
        let path = self.root.join(law_id).join(format!("{version}.json"));
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractError::VersionNotFound {
                    law_id: law_id.to_string(),
                    version: version.to_string(),
                });
            }
            Err(e) => return Err(ExtractError::Io(e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| ExtractError::MalformedInput {
            law_id: law_id.to_string(),
            version: version.to_string(),
            detail: e.to_string(),
        })
    }
}
