use std::path::PathBuf;

/// Errors produced by Kerberos authentication or renewal attempts.
///
/// Mirrors the distinct failure modes the KDC and ticket cache can report;
/// kept separate from [`CoreError`] because the maintenance loop treats each
/// variant with different retry/fatality policy.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("transient network failure contacting KDC: {0}")]
    TransientNetwork(String),
    #[error("bad credentials: {0}")]
    BadCredentials(String),
    #[error("ticket cannot be renewed: {0}")]
    CannotRenew(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the shared maintenance framework.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Config(String),

    #[error("cache i/o error on {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot set permissions on {path}: {source}")]
    CachePermIo {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("cannot finalize cache at {path}: {source}")]
    CacheRename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("unable to start command: {0}")]
    Spawn(#[source] nix::Error),

    #[error("post-auth hook exited with status {0}")]
    HookNonZero(i32),
}
