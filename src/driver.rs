use crate::cache::DataCache;
use crate::changes::ChangeSet;
use crate::config::Config;
use crate::db::{BundleDb, BundleReader};
use crate::error::MergeError;
use crate::merge::{IdGenerator, MergeStats, UuidGenerator};
use crate::ops::CancelToken;
use crate::persistence::{Patcher, Writer};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Merges `patch_file` into a copy of `base_file` and publishes it at `result_file`.
///
/// On error neither `base_file` nor `result_file` is touched, the working
/// copy is removed, and result directories created for the merge are removed
/// again if they are still empty.
pub fn merge_bundles(
    base_file: &Path,
    patch_file: &Path,
    result_file: &Path,
    changes: &ChangeSet,
) -> Result<MergeStats> {
    MergeDriver::new().run(base_file, patch_file, result_file, changes)
}

/// Runs a merge against a private working copy and replaces the destination
/// only once the merge has committed.
pub struct MergeDriver {
    ids: Box<dyn IdGenerator + Send>,
    cancel: Option<CancelToken>,
    cache_capacity: usize,
}

impl Default for MergeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeDriver {
    pub fn new() -> Self {
        Self {
            ids: Box::new(UuidGenerator),
            cancel: None,
            cache_capacity: Config::get().cache_capacity,
        }
    }

    pub fn with_id_generator(mut self, ids: impl IdGenerator + Send + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn run(
        &mut self,
        base_file: &Path,
        patch_file: &Path,
        result_file: &Path,
        changes: &ChangeSet,
    ) -> Result<MergeStats> {
        tracing::info!(
            base = %base_file.display(),
            patch = %patch_file.display(),
            result = %result_file.display(),
            changes = changes.len(),
            "merging bundles"
        );

        let directory = match result_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let created = missing_directories(directory);
        std::fs::create_dir_all(directory)
            .with_context(|| format!("create result directory {}", directory.display()))?;

        let outcome = self.merge_into(directory, base_file, patch_file, result_file, changes);
        if outcome.is_err() {
            // Deepest first; only directories left empty go away.
            for dir in &created {
                if let Err(err) = std::fs::remove_dir(dir) {
                    tracing::debug!("keeping directory {}: {err}", dir.display());
                }
            }
        }
        let stats = outcome?;

        tracing::info!(
            purged = stats.purged_entries,
            dropped = stats.dropped_documents,
            adopted = stats.adopted_documents,
            reused = stats.reused_result_sets,
            minted = stats.minted_result_sets,
            appended = stats.appended_entries,
            "merged bundle written to {}",
            result_file.display()
        );
        Ok(stats)
    }

    fn merge_into(
        &mut self,
        directory: &Path,
        base_file: &Path,
        patch_file: &Path,
        result_file: &Path,
        changes: &ChangeSet,
    ) -> Result<MergeStats> {
        // Removed on drop unless persisted.
        let mut working = tempfile::Builder::new()
            .prefix(".bundle-merge-")
            .suffix(".tmp")
            .tempfile_in(directory)
            .with_context(|| format!("create working file in {}", directory.display()))?;
        {
            let base = File::open(base_file)
                .with_context(|| format!("open base bundle {}", base_file.display()))?;
            io::copy(&mut BufReader::new(base), working.as_file_mut())
                .with_context(|| format!("copy base bundle {}", base_file.display()))?;
            working
                .as_file()
                .sync_all()
                .context("sync working copy")?;
        }
        self.checkpoint()?;

        let stats = self.patch_working_copy(working.path(), patch_file, changes)?;
        self.checkpoint()?;

        working
            .persist(result_file)
            .map_err(|err| err.error)
            .with_context(|| format!("replace {}", result_file.display()))?;
        Ok(stats)
    }

    fn patch_working_copy(
        &mut self,
        working: &Path,
        patch_file: &Path,
        changes: &ChangeSet,
    ) -> Result<MergeStats> {
        let mut db = BundleDb::open(working, DataCache::new(self.cache_capacity))?;

        let mut stats = MergeStats::default();
        let outcome = BundleReader::open(patch_file, DataCache::new(self.cache_capacity))
            .and_then(|patch| db.patch_database(&patch, changes, self.ids.as_mut()))
            .and_then(|merged| {
                stats = merged;
                self.checkpoint()
            });
        db.close(outcome)?;
        Ok(stats)
    }

    fn checkpoint(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_canceled() => Err(MergeError::Canceled.into()),
            _ => Ok(()),
        }
    }
}

/// Ancestors of `dir` (itself included) that do not exist yet, deepest first.
fn missing_directories(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .map(Path::to_path_buf)
        .collect()
}
