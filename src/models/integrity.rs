//! File integrity domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content hash of one monitored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: String,
    pub content_hash: String,
}

/// Stored reference snapshot, replaced wholesale on regeneration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityBaseline {
    pub files: Vec<FileFingerprint>,
    pub created_at: DateTime<Utc>,
}

/// Result of comparing the tree against the baseline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub scanned_files: usize,
    pub baseline_created_at: Option<DateTime<Utc>>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Summary returned after generating a baseline
#[derive(Debug, Clone, Serialize)]
pub struct BaselineSummary {
    pub file_count: usize,
    pub created_at: DateTime<Utc>,
}
