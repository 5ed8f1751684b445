//! 文件完整性监控
//!
//! Walks the monitored roots, hashes each file with SHA-256 and diffs the
//! result against the stored baseline by path.

use crate::{
    config::IntegrityConfig,
    error::AppError,
    models::{
        integrity::{BaselineSummary, FileFingerprint, IntegrityBaseline, IntegrityReport},
        security_event::{NewSecurityEvent, SecurityEventType},
    },
    repository::store::BaselineStore,
    services::event_service::EventLog,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Walk settings, moved into the blocking task
#[derive(Debug, Clone)]
struct ScanPlan {
    base_dir: PathBuf,
    roots: Vec<String>,
    excluded_dirs: HashSet<String>,
}

pub struct IntegrityMonitor {
    store: Arc<dyn BaselineStore>,
    events: Arc<EventLog>,
    plan: ScanPlan,
}

impl IntegrityMonitor {
    pub fn new(store: Arc<dyn BaselineStore>, events: Arc<EventLog>, config: &IntegrityConfig) -> Self {
        Self {
            store,
            events,
            plan: ScanPlan {
                base_dir: PathBuf::from(&config.base_dir),
                roots: config.monitored_roots.clone(),
                excluded_dirs: config.excluded_dirs.iter().cloned().collect(),
            },
        }
    }

    /// 生成并整体替换基线
    pub async fn generate_baseline(&self) -> Result<BaselineSummary, AppError> {
        let files = self.fingerprint_tree().await?;
        let baseline = IntegrityBaseline {
            files,
            created_at: Utc::now(),
        };

        self.store.replace(&baseline).await?;

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::IntegrityScan).metadata(serde_json::json!({
                    "action": "baseline",
                    "file_count": baseline.files.len(),
                })),
            )
            .await?;

        tracing::info!(file_count = baseline.files.len(), "Integrity baseline generated");
        Ok(BaselineSummary {
            file_count: baseline.files.len(),
            created_at: baseline.created_at,
        })
    }

    /// 重新计算并与基线比较
    pub async fn scan_for_changes(&self) -> Result<IntegrityReport, AppError> {
        let baseline = self
            .store
            .load()
            .await?
            .ok_or_else(|| AppError::NotFound("Integrity baseline".to_string()))?;

        let current = self.fingerprint_tree().await?;
        let mut report = diff(&baseline.files, &current);
        report.baseline_created_at = Some(baseline.created_at);

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::IntegrityScan).metadata(serde_json::json!({
                    "action": "scan",
                    "new": report.new.len(),
                    "modified": report.modified.len(),
                    "deleted": report.deleted.len(),
                })),
            )
            .await?;

        if report.is_clean() {
            tracing::info!(scanned = report.scanned_files, "Integrity scan clean");
        } else {
            tracing::warn!(
                new = report.new.len(),
                modified = report.modified.len(),
                deleted = report.deleted.len(),
                "Integrity scan found changes"
            );
        }

        Ok(report)
    }

    async fn fingerprint_tree(&self) -> Result<Vec<FileFingerprint>, AppError> {
        let plan = self.plan.clone();
        tokio::task::spawn_blocking(move || plan.fingerprint()).await?
    }
}

impl ScanPlan {
    fn fingerprint(&self) -> Result<Vec<FileFingerprint>, AppError> {
        let mut files = BTreeMap::new();

        for root in &self.roots {
            let path = self.base_dir.join(root);
            match std::fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => self.walk(&path, &mut files),
                Ok(meta) if meta.is_file() => self.hash_into(&path, &mut files),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(root = %path.display(), "Monitored root does not exist, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(files
            .into_iter()
            .map(|(path, content_hash)| FileFingerprint { path, content_hash })
            .collect())
    }

    /// Symlinks are not followed; unreadable directories are skipped like unreadable files
    fn walk(&self, dir: &Path, files: &mut BTreeMap<String, String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();

            if file_type.is_dir() {
                let excluded = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| self.excluded_dirs.contains(name));
                if !excluded {
                    self.walk(&path, files);
                }
            } else if file_type.is_file() {
                self.hash_into(&path, files);
            }
        }
    }

    fn hash_into(&self, path: &Path, files: &mut BTreeMap<String, String>) {
        match hash_file(path) {
            Ok(hash) => {
                files.insert(self.relative_path(path), hash);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
            }
        }
    }

    /// Path relative to `base_dir`, '/'-separated
    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Three set operations over paths; output lists are sorted
pub fn diff(baseline: &[FileFingerprint], current: &[FileFingerprint]) -> IntegrityReport {
    let before: BTreeMap<&str, &str> = baseline
        .iter()
        .map(|f| (f.path.as_str(), f.content_hash.as_str()))
        .collect();
    let after: BTreeMap<&str, &str> = current
        .iter()
        .map(|f| (f.path.as_str(), f.content_hash.as_str()))
        .collect();

    let mut report = IntegrityReport {
        scanned_files: after.len(),
        ..Default::default()
    };

    for (path, hash) in &after {
        match before.get(path) {
            None => report.new.push(path.to_string()),
            Some(old) if old != hash => report.modified.push(path.to_string()),
            Some(_) => {}
        }
    }
    report.deleted = before
        .keys()
        .filter(|path| !after.contains_key(*path))
        .map(|path| path.to_string())
        .collect();

    report
}
