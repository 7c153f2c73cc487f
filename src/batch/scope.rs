//! Work-item selection for batch runs.
//!
//! A scope names which (law, version) pairs a run covers; enumeration
//! resolves it against the element source (for extract/review) or against the
//! correction store (for reset/status, which must not require source access).

use serde::{Deserialize, Serialize};

use crate::extract::ExtractError;
use crate::source::ElementSource;
use crate::store::{CorrectionStore, StoreError};

/// One (law, version) pending processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub law_id: String,
    pub version: String,
}

impl WorkItem {
    pub fn new(law_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            law_id: law_id.into(),
            version: version.into(),
        }
    }

    /// Stable identifier used in progress records.
    pub fn id(&self) -> String {
        format!("{}@{}", self.law_id, self.version)
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.law_id, self.version)
    }
}

/// Which part of the corpus a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkScope {
    /// Every law in the source folder; optionally only each law's latest
    /// version.
    All { latest_only: bool },
    /// One law; `None` covers all of its versions.
    Law {
        law_id: String,
        version: Option<String>,
    },
}

impl WorkScope {
    /// Filesystem-safe key identifying this scope's progress record.
    pub fn key(&self) -> String {
        match self {
            Self::All { latest_only: true } => "all-latest".to_string(),
            Self::All { latest_only: false } => "all".to_string(),
            Self::Law {
                law_id,
                version: None,
            } => format!("law-{}", sanitize(law_id)),
            Self::Law {
                law_id,
                version: Some(version),
            } => format!("law-{}-v{}", sanitize(law_id), sanitize(version)),
        }
    }

    /// Resolve against the element source.
    pub fn enumerate_source(
        &self,
        source: &dyn ElementSource,
    ) -> Result<Vec<WorkItem>, ExtractError> {
        match self {
            Self::All { latest_only } => {
                let mut items = Vec::new();
                for law_id in source.laws()? {
                    let versions = source.versions(&law_id)?;
                    collect(&mut items, &law_id, versions, *latest_only);
                }
                Ok(items)
            }
            Self::Law {
                law_id,
                version: Some(version),
            } => Ok(vec![WorkItem::new(law_id, version)]),
            Self::Law {
                law_id,
                version: None,
            } => {
                let mut items = Vec::new();
                collect(&mut items, law_id, source.versions(law_id)?, false);
                Ok(items)
            }
        }
    }

    /// Resolve against existing correction files.
    pub fn enumerate_store(&self, store: &CorrectionStore) -> Result<Vec<WorkItem>, StoreError> {
        match self {
            Self::All { latest_only } => {
                let mut items = Vec::new();
                for law_id in store.list_laws()? {
                    let versions = store.list_versions(&law_id)?;
                    collect(&mut items, &law_id, versions, *latest_only);
                }
                Ok(items)
            }
            Self::Law {
                law_id,
                version: Some(version),
            } => Ok(vec![WorkItem::new(law_id, version)]),
            Self::Law {
                law_id,
                version: None,
            } => {
                let mut items = Vec::new();
                collect(&mut items, law_id, store.list_versions(law_id)?, false);
                Ok(items)
            }
        }
    }
}

fn collect(items: &mut Vec<WorkItem>, law_id: &str, versions: Vec<String>, latest_only: bool) {
    if latest_only {
        if let Some(latest) = versions.last() {
            items.push(WorkItem::new(law_id, latest));
        }
    } else {
        for version in versions {
            items.push(WorkItem::new(law_id, version));
        }
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
