use std::fs::File;
use std::os::fd::AsRawFd;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::{chdir, dup2, fork, setsid, ForkResult};

/// Detaches the process from its controlling terminal: a double fork (so
/// the daemon can never reacquire a controlling terminal), a new session,
/// `chdir("/")`, and standard streams redirected to `/dev/null`. Mirrors
/// what `daemon(3)` does for the original `k5start -b`/`krenew -b`.
///
/// Both forked-away parents exit immediately with status 0; only the
/// grandchild returns from this function.
pub fn daemonize() -> nix::Result<()> {
    // SAFETY: single-threaded at this point in startup except for the
    // signal-listener thread, which is reinstalled fresh after detaching
    // rather than surviving the fork.
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid()?;

    // SAFETY: see above.
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    chdir("/")?;

    // `open` returns an `OwnedFd` in this nix version; wrap it in a `File`
    // so it closes on drop instead of needing a manual `close` call, the
    // same idiom `vinit/src/memory.rs` uses for `nix::fcntl::open`.
    let devnull = File::from(nix::fcntl::open("/dev/null", OFlag::O_RDWR, Mode::empty())?);
    let devnull_fd = devnull.as_raw_fd();
    for fd in 0..=2 {
        dup2(devnull_fd, fd)?;
    }

    Ok(())
}
