// src/persist.rs
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Sibling temp path: `dir/.name.tmp`.
fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".into());
    path.with_file_name(format!(".{}.tmp", name))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PipelineError::io("creating directory", dir, e))?;
    }
    Ok(())
}

/// Writes files to temp siblings and renames them into place on `commit`.
/// Dropping without committing removes whatever was staged.
#[derive(Default)]
pub struct StagedWrites {
    staged: Vec<(PathBuf, PathBuf)>,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `write` against a buffered temp file for `path`.
    pub fn stage<F>(&mut self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<()>,
    {
        ensure_parent(path)?;
        let tmp = tmp_path_for(path);
        let file = File::create(&tmp).map_err(|e| PipelineError::io("creating", &tmp, e))?;
        // register first so a failed write still gets cleaned up
        self.staged.push((tmp.clone(), path.to_path_buf()));

        let mut out = BufWriter::new(file);
        write(&mut out)?;
        out.flush().map_err(|e| PipelineError::io("flushing", &tmp, e))?;
        out.get_ref()
            .sync_all()
            .map_err(|e| PipelineError::io("syncing", &tmp, e))?;
        debug!(tmp = %tmp.display(), "staged");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Rename every staged file over its destination, in staging order.
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        let staged = std::mem::take(&mut self.staged);
        let mut done = Vec::with_capacity(staged.len());
        for (i, (tmp, dest)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, dest) {
                // leave no temp files behind for the entries we did not reach
                for (rest, _) in &staged[i..] {
                    let _ = fs::remove_file(rest);
                }
                return Err(PipelineError::io("renaming into place", dest, e));
            }
            done.push(dest.clone());
        }
        Ok(done)
    }
}

impl Drop for StagedWrites {
    fn drop(&mut self) {
        for (tmp, dest) in self.staged.drain(..) {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!(tmp = %tmp.display(), dest = %dest.display(), "could not discard staged file: {}", e);
            }
        }
    }
}

/// Single-file convenience over [`StagedWrites`].
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut staged = StagedWrites::new();
    staged.stage(path, write)?;
    staged.commit()?;
    Ok(())
}
