use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use nix::sys::stat::{fchmod, Mode};
use nix::unistd::{chown, Gid, Group, Uid, User};

use crate::error::CoreError;

/// Ownership/permission overrides requested for the finalised cache
/// (spec.md §3, flags `-o`/`-g`/`-m`).
#[derive(Debug, Clone, Default)]
pub struct CachePerms {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

impl CachePerms {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }
}

/// A sibling scratch file created by [`CacheWriter::prepare`]; owns both the
/// open file descriptor (kept alive so nothing else can reuse the inode
/// between `mkstemp` and the final rename) and its path.
pub struct ScratchHandle {
    path: PathBuf,
    file: File,
}

impl ScratchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Implements the atomic cache-update protocol from spec.md §4.3: a cache
/// under `cache_path` is either absent or a complete, valid cache — readers
/// never observe a half-written one.
pub struct CacheWriter;

impl CacheWriter {
    /// Creates a sibling temporary path (same directory, unique suffix)
    /// with owner-only mode 0600.
    pub fn prepare(final_path: &Path) -> Result<ScratchHandle, CoreError> {
        let template = sibling_template(final_path);
        let (fd, path) = nix::unistd::mkstemp(&template).map_err(|source| CoreError::CacheIo {
            path: final_path.to_path_buf(),
            source: std::io::Error::from_raw_os_error(source as i32),
        })?;
        // mkstemp(3) already creates the file 0600, but umask could have
        // widened it on some platforms; pin it down explicitly. `fchmod`
        // takes the `OwnedFd` by reference before it is handed to `File`.
        fchmod(fd.as_fd(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|source| {
            CoreError::CachePermIo {
                path: path.clone(),
                source,
            }
        })?;
        let file = File::from(fd);
        Ok(ScratchHandle { path, file })
    }

    /// Applies `perms` to the scratch file, then atomically renames it over
    /// `final_path`. On any failure the scratch file is unlinked and
    /// `final_path` is left untouched.
    pub fn commit(
        handle: ScratchHandle,
        final_path: &Path,
        perms: &CachePerms,
    ) -> Result<(), CoreError> {
        let result = (|| -> Result<(), CoreError> {
            if !perms.is_empty() {
                apply_perms(&handle, perms)?;
            }
            std::fs::rename(&handle.path, final_path).map_err(|source| CoreError::CacheRename {
                path: final_path.to_path_buf(),
                source,
            })
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&handle.path);
        }
        result
    }

    /// Unconditionally unlinks the scratch file; used on error paths that
    /// never reach `commit`.
    pub fn discard(handle: ScratchHandle) {
        let _ = std::fs::remove_file(&handle.path);
    }
}

fn sibling_template(final_path: &Path) -> PathBuf {
    let dir = final_path.parent().unwrap_or_else(|| Path::new("."));
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".to_string());
    dir.join(format!(".{name}.XXXXXX"))
}

fn apply_perms(handle: &ScratchHandle, perms: &CachePerms) -> Result<(), CoreError> {
    if perms.owner.is_some() || perms.group.is_some() {
        let uid = perms
            .owner
            .as_deref()
            .map(|o| resolve_uid(o, handle.path()))
            .transpose()?;
        let mut gid = perms
            .group
            .as_deref()
            .map(|g| resolve_gid(g, handle.path()))
            .transpose()?;

        // If only an owner name (not a numeric UID) was given and no group
        // was specified, default to that user's primary group, matching
        // file_permissions() in the original util/perms.c.
        if gid.is_none() {
            if let Some(owner) = perms.owner.as_deref() {
                if owner.parse::<u32>().is_err() {
                    if let Ok(Some(user)) = User::from_name(owner) {
                        gid = Some(user.gid);
                    }
                }
            }
        }

        chown(handle.path(), uid, gid).map_err(|source| CoreError::CachePermIo {
            path: handle.path().to_path_buf(),
            source,
        })?;
    }

    if let Some(mode) = perms.mode {
        let mode = Mode::from_bits_truncate(mode);
        fchmod(handle.file.as_fd(), mode).map_err(|source| CoreError::CachePermIo {
            path: handle.path().to_path_buf(),
            source,
        })?;
    }

    Ok(())
}

fn resolve_uid(owner: &str, path: &Path) -> Result<Uid, CoreError> {
    if let Ok(n) = owner.parse::<u32>() {
        return Ok(Uid::from_raw(n));
    }
    User::from_name(owner)
        .map_err(|source| CoreError::CachePermIo {
            path: path.to_path_buf(),
            source,
        })?
        .map(|u| u.uid)
        .ok_or_else(|| CoreError::Config(format!("unknown user {owner}")))
}

fn resolve_gid(group: &str, path: &Path) -> Result<Gid, CoreError> {
    if let Ok(n) = group.parse::<u32>() {
        return Ok(Gid::from_raw(n));
    }
    Group::from_name(group)
        .map_err(|source| CoreError::CachePermIo {
            path: path.to_path_buf(),
            source,
        })?
        .map(|g| g.gid)
        .ok_or_else(|| CoreError::Config(format!("unknown group {group}")))
}
