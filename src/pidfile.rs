use std::path::{Path, PathBuf};

/// Writes `"%d\n"` to `path`, unlinked by [`Drop`] so every exit path
/// cleans it up (spec.md §3 invariant 4, §6 "Persisted state").  Failure to
/// write is logged, not fatal — the original `k5start`/`krenew` can't
/// usefully report pidfile failures either since they're commonly used
/// with `-b`, after the controlling terminal is gone.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn write(path: &Path, pid: i32) -> Self {
        if let Err(err) = std::fs::write(path, format!("{pid}\n")) {
            tracing::warn!(path = %path.display(), %err, "failed to write pid file");
        }
        PidFile {
            path: path.to_path_buf(),
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
