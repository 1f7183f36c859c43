use std::ffi::CString;

use nix::sys::wait::{waitid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, fork, ForkResult, Pid};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    NotExited,
    Exited(i32),
    WaitFailed,
}

/// Forks, execs, and non-blockingly reaps exactly one child process per
/// supervisor lifetime (spec.md §4.4). Modelled directly on
/// `util/command.c`'s `command_start`/`command_finish` and
/// `vinit/src/bin/simplevisor.rs`'s `reap_processes`.
pub struct ChildSupervisor {
    pid: Pid,
}

impl ChildSupervisor {
    /// Forks and execs `program` with `argv` (argv[0] conventionally equal
    /// to `program`). Only one `start` call is valid per supervisor
    /// lifetime; termination/hang-up signal propagation to the returned pid
    /// is the caller's responsibility via [`crate::signals::SignalInbox`].
    pub fn start(program: &str, argv: &[String]) -> Result<Self, CoreError> {
        let c_program = CString::new(program)
            .map_err(|_| CoreError::Spawn(nix::Error::EINVAL))?;
        let c_argv: Vec<CString> = argv
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| CoreError::Spawn(nix::Error::EINVAL))?;

        // SAFETY: the child immediately execs or exits; no other thread
        // exists between fork and exec since this crate runs single
        // threaded except for the signal-listener thread, which never
        // touches process-global state the child would observe.
        match unsafe { fork() }.map_err(CoreError::Spawn)? {
            ForkResult::Parent { child } => Ok(ChildSupervisor { pid: child }),
            ForkResult::Child => {
                let _ = execvp(&c_program, &c_argv);
                // execvp only returns on failure.
                std::process::exit(127);
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Non-blocking check: must never block while the child is still
    /// running (spec.md §4.4).
    pub fn poll(&self) -> ChildState {
        match waitid(
            Id::Pid(self.pid),
            WaitPidFlag::WNOHANG | WaitPidFlag::WEXITED,
        ) {
            Ok(WaitStatus::Exited(_, status)) => ChildState::Exited(status),
            Ok(WaitStatus::Signaled(_, signal, _)) => ChildState::Exited(128 + signal as i32),
            Ok(WaitStatus::StillAlive) => ChildState::NotExited,
            Ok(_) => ChildState::NotExited,
            Err(_) => ChildState::WaitFailed,
        }
    }
}

/// Seam the maintenance loop drives instead of calling [`ChildSupervisor`]
/// directly, so tests can substitute a fake child without forking a real
/// process.
pub trait ChildSupervision {
    fn start(&self, program: &str, argv: &[String]) -> Result<Pid, CoreError>;
    fn poll(&self, pid: Pid) -> ChildState;
}

#[derive(Debug, Default)]
pub struct RealChildSupervision;

impl ChildSupervision for RealChildSupervision {
    fn start(&self, program: &str, argv: &[String]) -> Result<Pid, CoreError> {
        ChildSupervisor::start(program, argv).map(|c| c.pid())
    }

    fn poll(&self, pid: Pid) -> ChildState {
        ChildSupervisor { pid }.poll()
    }
}
