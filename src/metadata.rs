//! C10 — Run metadata writer: two-phase commit of run status plus atomic
//! `latest.json` / `index.json` updates, mirroring the write-temp + rename
//! discipline used throughout `storage/manager.rs`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Complete,
    Partial,
    Failed,
}

/// Crate version + optional build-time git SHA, recorded once per run.
/// No git subprocess at runtime — unlike the source this was distilled
/// from, a Rust binary shouldn't assume its working directory is a
/// checkout (SPEC_FULL.md §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_sha: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: option_env!("GIT_SHA").unwrap_or("unknown").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub started_at: String,
    pub saved_at: Option<String>,
    pub status: RunStatus,
    pub schema_version: u32,
    pub analysis_hash: String,
    pub occupied_bins: usize,
    pub nonzero_density_bins: usize,
    pub total_features: usize,
    pub start_times: Vec<String>,
    pub event_durations: Vec<u32>,
    pub build_info: BuildInfo,
    pub error: Option<String>,
}

impl RunMetadata {
    pub fn new_in_progress(run_id: String, started_at: String) -> Self {
        Self {
            run_id,
            started_at,
            saved_at: None,
            status: RunStatus::InProgress,
            schema_version: crate::serialize::SCHEMA_VERSION,
            analysis_hash: String::new(),
            occupied_bins: 0,
            nonzero_density_bins: 0,
            total_features: 0,
            start_times: Vec::new(),
            event_durations: Vec::new(),
            build_info: BuildInfo::current(),
            error: None,
        }
    }

    fn write_to(&self, run_dir: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        crate::serialize::write_atomic(&run_dir.join("metadata.json"), &bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPointer {
    pub run_id: String,
    pub run_dir: String,
    pub saved_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub run_id: String,
    pub run_dir: String,
    pub status: RunStatus,
    pub saved_at: String,
}

/// Writes the in-progress marker immediately after the run directory is
/// created, before any artifact lands (spec.md §4.10).
pub fn commit_in_progress(run_dir: &Path, meta: &RunMetadata) -> Result<()> {
    std::fs::create_dir_all(run_dir)?;
    meta.write_to(run_dir)
}

/// Finalizes the run: rewrites `metadata.json` with the terminal status,
/// then — only for `Complete`/`Partial` — atomically updates `latest.json`
/// (complete only) and appends to `index.json`. A `Failed` run updates
/// neither shared file, matching spec.md's "pointer is not updated" rule.
pub fn commit_final(
    run_dir: &Path,
    index_dir: &Path,
    mut meta: RunMetadata,
    status: RunStatus,
    error: Option<String>,
    saved_at: String,
) -> Result<()> {
    meta.status = status;
    meta.error = error;
    meta.saved_at = Some(saved_at.clone());
    meta.write_to(run_dir)?;

    if status == RunStatus::Failed {
        warn!(run_id = %meta.run_id, "run failed, shared pointers left untouched");
        return Ok(());
    }

    if status == RunStatus::Complete {
        let pointer = LatestPointer {
            run_id: meta.run_id.clone(),
            run_dir: run_dir.display().to_string(),
            saved_at: saved_at.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&pointer)?;
        crate::serialize::write_atomic(&index_dir.join("latest.json"), &bytes)?;
    } else {
        info!(run_id = %meta.run_id, "partial run, latest.json left pointing at prior success");
    }

    append_index_entry(
        index_dir,
        IndexEntry {
            run_id: meta.run_id.clone(),
            run_dir: run_dir.display().to_string(),
            status,
            saved_at,
        },
    )
}

/// Appends one line of newline-delimited JSON to `index.json`, via the same
/// write-temp + rename pattern applied to the whole (old content + new
/// entry) file so a reader never observes a half-written append.
fn append_index_entry(index_dir: &Path, entry: IndexEntry) -> Result<()> {
    let index_path = index_dir.join("index.json");
    let mut existing = if index_path.exists() {
        std::fs::read_to_string(&index_path)?
    } else {
        String::new()
    };
    let line = serde_json::to_string(&entry)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        existing.push('\n');
    }
    existing.push_str(&line);
    existing.push('\n');

    let tmp_path = index_path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(existing.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, &index_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_progress_then_complete_updates_latest_and_index() {
        let base = tempdir().unwrap();
        let run_dir = base.path().join("runs/run-1");
        let meta = RunMetadata::new_in_progress("run-1".to_string(), "2026-01-01T00:00:00Z".to_string());
        commit_in_progress(&run_dir, &meta).unwrap();
        assert!(run_dir.join("metadata.json").exists());

        commit_final(
            &run_dir,
            base.path(),
            meta,
            RunStatus::Complete,
            None,
            "2026-01-01T00:01:00Z".to_string(),
        )
        .unwrap();

        assert!(base.path().join("latest.json").exists());
        let index = std::fs::read_to_string(base.path().join("index.json")).unwrap();
        assert!(index.contains("\"run-1\""));
    }

    #[test]
    fn failed_run_does_not_touch_latest() {
        let base = tempdir().unwrap();
        let run_dir = base.path().join("runs/run-2");
        let meta = RunMetadata::new_in_progress("run-2".to_string(), "2026-01-01T00:00:00Z".to_string());
        commit_in_progress(&run_dir, &meta).unwrap();
        commit_final(
            &run_dir,
            base.path(),
            meta,
            RunStatus::Failed,
            Some("dataset too large".to_string()),
            "2026-01-01T00:01:00Z".to_string(),
        )
        .unwrap();
        assert!(!base.path().join("latest.json").exists());
    }

    #[test]
    fn partial_run_appends_index_but_not_latest() {
        let base = tempdir().unwrap();
        let run_dir = base.path().join("runs/run-3");
        let meta = RunMetadata::new_in_progress("run-3".to_string(), "2026-01-01T00:00:00Z".to_string());
        commit_in_progress(&run_dir, &meta).unwrap();
        commit_final(
            &run_dir,
            base.path(),
            meta,
            RunStatus::Partial,
            None,
            "2026-01-01T00:01:00Z".to_string(),
        )
        .unwrap();
        assert!(!base.path().join("latest.json").exists());
        let index = std::fs::read_to_string(base.path().join("index.json")).unwrap();
        assert!(index.contains("partial"));
    }
}
