use std::path::{Path, PathBuf};

use crate::config::AuthMethod;
use crate::error::AuthError;
use crate::expiry::CredentialSummary;

/// The capability the maintenance loop requires from a Kerberos library
/// binding (spec.md §4.6). This crate treats the actual protocol exchange
/// as an external collaborator: no cryptography or wire format lives here.
pub trait CredentialProvider {
    /// Produces a fresh cache at `target`, or in place if `target` is the
    /// already-active cache. `prior_status` carries the previous
    /// maintenance cycle's result so an implementation can skip redundant
    /// work (e.g. acquire's happy-ticket short-circuit is handled by the
    /// caller, but a provider may use this for its own bookkeeping).
    fn authenticate(
        &self,
        target: &Path,
        client_principal: Option<&str>,
        method: Option<&AuthMethod>,
        prior_status: Option<&AuthError>,
    ) -> Result<(), AuthError>;

    /// Reads the credential summary the Expiry Evaluator needs.
    fn inspect(&self, path: &Path) -> Result<CredentialSummary, AuthError>;

    /// Snapshots an existing cache into a private copy used by *renew* so
    /// that its renewal cycle does not disturb other consumers of the
    /// user's real cache.
    fn copy(&self, src_path: &Path, dest_path: &Path) -> Result<(), AuthError>;

    /// Looks up the principal of the first entry in a keytab, for `-U`.
    fn first_principal_in_keytab(&self, keytab: &Path) -> Result<String, AuthError>;
}

/// Placeholder implementation. The real Kerberos library binding (MIT
/// krb5 or Heimdal — spec.md §9's portability note) is outside this
/// crate's scope; embedders supply their own `CredentialProvider`. This
/// stub exists so the crate builds and its tests can exercise the
/// maintenance loop's control flow without linking a Kerberos library.
#[derive(Debug, Default)]
pub struct UnavailableProvider;

impl CredentialProvider for UnavailableProvider {
    fn authenticate(
        &self,
        _target: &Path,
        _client_principal: Option<&str>,
        _method: Option<&AuthMethod>,
        _prior_status: Option<&AuthError>,
    ) -> Result<(), AuthError> {
        Err(AuthError::Other(
            "no Kerberos backend configured; link a CredentialProvider implementation".into(),
        ))
    }

    fn inspect(&self, _path: &Path) -> Result<CredentialSummary, AuthError> {
        Err(AuthError::Other("no Kerberos backend configured".into()))
    }

    fn copy(&self, _src_path: &Path, _dest_path: &Path) -> Result<(), AuthError> {
        Err(AuthError::Other("no Kerberos backend configured".into()))
    }

    fn first_principal_in_keytab(&self, _keytab: &Path) -> Result<String, AuthError> {
        Err(AuthError::Other("no Kerberos backend configured".into()))
    }
}

/// The capability for creating a process authentication group (PAG) and
/// running the post-auth hook that turns Kerberos credentials into a
/// network-filesystem token (spec.md §4.6, §1).
pub trait AfsIntegration {
    /// Whether this system has AFS/PAG support at all.
    fn available(&self) -> bool;

    /// Creates a new PAG for the current process (and its future
    /// children). Must be called before the first authentication so
    /// credentials land in the isolated container.
    fn create_pag(&self) -> std::io::Result<()>;

    /// Runs the post-auth hook, returning its exit status.
    fn run_hook(&self, hook: &Path, verbose: bool) -> std::io::Result<i32>;
}

/// Default AFS integration: no PAG support, hook run via `/bin/sh -c`.
/// Creating a real PAG requires a platform-specific syscall (`setpag`,
/// `k_setpag`, AFS kernel module ioctls — spec.md §1's out-of-scope list);
/// this stub reports `available() == false` so callers configured with
/// `-t` fail fast with a clear `Config` error instead of silently skipping
/// isolation.
#[derive(Debug, Default)]
pub struct NoPagIntegration;

impl AfsIntegration for NoPagIntegration {
    fn available(&self) -> bool {
        false
    }

    fn create_pag(&self) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "AFS/PAG support is not available",
        ))
    }

    fn run_hook(&self, hook: &Path, verbose: bool) -> std::io::Result<i32> {
        use std::process::Command;

        let status = Command::new("/bin/sh").arg("-c").arg(hook).status()?;
        if verbose {
            tracing::debug!(hook = %hook.display(), status = ?status, "post-auth hook finished");
        }
        Ok(status.code().unwrap_or(127))
    }
}

/// Where a fabricated one-off cache lives when no `-k` was given and a
/// child command is configured (spec.md §4.3). Uses `mkstemp` to reserve a
/// unique name under the per-uid prefix so two concurrent supervisors
/// without `-k` never collide on the same fabricated path; the reserved
/// file itself is discarded immediately since `CacheWriter` creates and
/// renames its own scratch file onto this path later.
pub fn fabricate_cache_path(uid: u32) -> PathBuf {
    let template = std::env::temp_dir().join(format!("krb5cc_{uid}_XXXXXX"));
    match nix::unistd::mkstemp(&template) {
        Ok((fd, path)) => {
            // `fd` is an `OwnedFd`; dropping it here closes the reserved
            // file, matching `close(fd)` without needing a raw descriptor.
            drop(fd);
            let _ = std::fs::remove_file(&path);
            path
        }
        Err(_) => template,
    }
}
