use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::unistd::Pid;

use crate::cache::{CachePerms, CacheWriter};
use crate::child::{ChildState, ChildSupervision};
use crate::clock::{Clock, Sleeper};
use crate::config::{Config, Mode};
use crate::daemon::daemonize;
use crate::environment::Environment;
use crate::error::{AuthError, CoreError};
use crate::expiry::{evaluate, Expiry, ExpiryPolicy};
use crate::pidfile::PidFile;
use crate::provider::{AfsIntegration, CredentialProvider};
use crate::signals::{SignalFlags, WaitOutcome};

/// Where the hook's exit status is looked up when nothing overrides it
/// (spec.md §4.6's post-auth hook; the original's `PATH_AKLOG`, normally
/// set by the build, is out of this crate's scope — see DESIGN.md).
pub const DEFAULT_AKLOG_PATH: &str = "/usr/bin/aklog";

fn hook_path(env: &dyn Environment) -> Option<PathBuf> {
    env.get("AKLOG")
        .or_else(|| env.get("KINIT_PROG"))
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from(DEFAULT_AKLOG_PATH)))
}

/// The resolved identity of the cache this run maintains, computed once
/// during INIT (spec.md §4.3: "no `-k` and a command is present" fabricates
/// a private cache that does not outlive the process).
pub struct ResolvedCache {
    pub path: PathBuf,
    pub clean_on_exit: bool,
}

impl ResolvedCache {
    pub fn resolve(cfg: &Config) -> Self {
        match &cfg.cache_path {
            Some(path) => ResolvedCache {
                path: path.clone(),
                clean_on_exit: false,
            },
            None if cfg.command.is_some() => {
                let uid = nix::unistd::getuid().as_raw();
                ResolvedCache {
                    path: crate::provider::fabricate_cache_path(uid),
                    clean_on_exit: true,
                }
            }
            None => {
                let uid = nix::unistd::getuid().as_raw();
                ResolvedCache {
                    path: PathBuf::from(format!("/tmp/krb5cc_{uid}")),
                    clean_on_exit: false,
                }
            }
        }
    }
}

/// Everything the maintenance loop needs beyond `Config`, grouped so a test
/// can substitute fakes for every side-effecting capability at once.
pub struct LoopDeps<'a> {
    pub provider: &'a dyn CredentialProvider,
    pub afs: &'a dyn AfsIntegration,
    pub sleeper: &'a dyn Sleeper,
    pub clock: &'a dyn Clock,
    pub flags: &'a SignalFlags,
    pub child_sup: &'a dyn ChildSupervision,
    pub set_child_pid: &'a dyn Fn(Option<Pid>),
    pub env: &'a dyn Environment,
}

#[derive(Debug, Clone, Copy)]
pub struct ExitOutcome {
    pub code: i32,
}

impl ExitOutcome {
    fn clean(code: i32) -> Self {
        ExitOutcome { code }
    }
}

struct CleanCacheGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl Drop for CleanCacheGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(self.path);
        }
    }
}

fn perms_from_config(cfg: &Config) -> CachePerms {
    CachePerms {
        owner: cfg.owner.clone(),
        group: cfg.group.clone(),
        mode: cfg.mode_bits,
    }
}

/// Runs one authentication/renewal attempt: writes into a scratch file,
/// commits it atomically over the resolved cache, and — if configured —
/// runs the post-auth hook. Returns the hook's exit status, if it ran.
fn do_authenticate(
    cfg: &Config,
    cache: &ResolvedCache,
    client_principal: Option<&str>,
    deps: &LoopDeps,
    prior: Option<&AuthError>,
) -> Result<Option<i32>, CoreError> {
    let handle = CacheWriter::prepare(&cache.path)?;
    let method = if cfg.mode == Mode::Acquire {
        cfg.auth_method.as_ref()
    } else {
        None
    };
    match deps
        .provider
        .authenticate(handle.path(), client_principal, method, prior)
    {
        Ok(()) => {
            CacheWriter::commit(handle, &cache.path, &perms_from_config(cfg))?;
        }
        Err(e) => {
            CacheWriter::discard(handle);
            return Err(CoreError::Auth(e));
        }
    }

    if !cfg.do_hook {
        return Ok(None);
    }
    let Some(hook) = hook_path(deps.env) else {
        return Ok(None);
    };
    let status = deps
        .afs
        .run_hook(&hook, cfg.verbose)
        .map_err(|_| CoreError::HookNonZero(127))?;
    if status != 0 {
        tracing::warn!(status, hook = %hook.display(), "post-auth hook exited non-zero");
    }
    Ok(Some(status))
}

/// Extracts the `AuthError` a failed `do_authenticate` call carries, if
/// any, so it can be fed back in as the next call's `prior_status`
/// (spec.md §4.6). Cache-I/O and hook failures aren't Provider-level
/// results and don't change what the Provider was last told.
fn auth_error_of(err: CoreError) -> Option<AuthError> {
    match err {
        CoreError::Auth(e) => Some(e),
        _ => None,
    }
}

/// Honours shutdown immediately but ignores early-wake while backing off
/// after an initial authentication failure (spec.md §4.7 PRIMED). Returns
/// `true` if shutdown was requested during the wait.
fn backoff_sleep(total: Duration, flags: &SignalFlags, sleeper: &dyn Sleeper) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if flags.shutdown_requested() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match sleeper.wait(remaining) {
            WaitOutcome::TimedOut => return false,
            WaitOutcome::Interrupted => {
                if flags.shutdown_requested() {
                    return true;
                }
                flags.clear_refresh();
            }
        }
    }
}

fn next_backoff_delay(current: u64) -> u64 {
    if current < 30 {
        (current * 2).min(30)
    } else {
        30
    }
}

/// Drives the full INIT → PRIMED → (DETACHED) → SPAWNED? → RUNNING ⇄
/// REFRESH → RUNNING → DRAIN lifecycle shared by both supervisors
/// (spec.md §4.7). `acquire`/`renew` differ only in `cfg.mode` and which
/// `CredentialProvider` they inject.
pub fn run(cfg: &Config, deps: &LoopDeps) -> ExitOutcome {
    let cache = ResolvedCache::resolve(cfg);
    let _clean_cache_guard = CleanCacheGuard {
        path: &cache.path,
        armed: cache.clean_on_exit,
    };

    // INIT
    if cfg.do_hook && cfg.command.is_some() {
        if !deps.afs.available() {
            tracing::error!("AFS/PAG integration requested but not available");
            return ExitOutcome::clean(1);
        }
        if let Err(err) = deps.afs.create_pag() {
            tracing::error!(%err, "failed to create process authentication group");
            return ExitOutcome::clean(1);
        }
    }

    // The managed cache is set in the environment as soon as it is resolved
    // so that both the supervised command and the post-auth hook inherit it
    // (spec.md §6: "KRB5CCNAME is set by the process... before the
    // supervised command starts").
    deps.env.set("KRB5CCNAME", &cache.path.display().to_string());

    let client_principal = if cfg.search_keytab {
        let keytab = match &cfg.auth_method {
            Some(crate::config::AuthMethod::Keytab(path)) => path.clone(),
            _ => {
                tracing::error!("-U requires a keytab");
                return ExitOutcome::clean(1);
            }
        };
        match deps.provider.first_principal_in_keytab(&keytab) {
            Ok(principal) => Some(principal),
            Err(err) => {
                tracing::error!(%err, keytab = %keytab.display(), "no principal found in keytab");
                return ExitOutcome::clean(1);
            }
        }
    } else {
        cfg.client_principal.clone()
    };

    // PRIMED
    let mut last_hook_status: Option<i32> = None;
    let mut skip_initial_auth = false;

    // The last result the Credential Provider reported, fed back in as
    // `prior_status` on the next call (spec.md §4.6: "for *renew*, non-zero
    // `prior_status` means renewal required"). `None` on the very first
    // call since there is no prior cycle yet.
    let mut last_auth_code: Option<AuthError> = None;

    if cfg.happy_threshold_min > 0 {
        if let Ok(summary) = deps.provider.inspect(&cache.path) {
            let policy = ExpiryPolicy {
                keep_interval_min: cfg.keep_interval_min,
                happy_threshold_min: cfg.happy_threshold_min,
            };
            if evaluate(&summary, &policy, deps.clock.now()) == Expiry::Fresh {
                skip_initial_auth = true;
            }
        }
    }

    if !skip_initial_auth {
        match do_authenticate(
            cfg,
            &cache,
            client_principal.as_deref(),
            deps,
            last_auth_code.as_ref(),
        ) {
            Ok(status) => {
                last_hook_status = status;
                last_auth_code = None;
            }
            Err(err) => {
                if !cfg.ignore_initial_errors {
                    tracing::error!(%err, "initial authentication failed");
                    return ExitOutcome::clean(1);
                }
                tracing::warn!(%err, "initial authentication failed; backing off");
                last_auth_code = auth_error_of(err);
                let mut delay = 1u64;
                loop {
                    if backoff_sleep(Duration::from_secs(delay), deps.flags, deps.sleeper) {
                        return ExitOutcome::clean(0);
                    }
                    match do_authenticate(
                        cfg,
                        &cache,
                        client_principal.as_deref(),
                        deps,
                        last_auth_code.as_ref(),
                    ) {
                        Ok(status) => {
                            last_hook_status = status;
                            last_auth_code = None;
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(%err, delay, "retry failed; backing off further");
                            last_auth_code = auth_error_of(err);
                            delay = next_backoff_delay(delay);
                        }
                    }
                }
            }
        }
    }

    // DETACHED
    if cfg.background {
        if let Err(err) = daemonize() {
            tracing::error!(%err, "failed to detach from controlling terminal");
            return ExitOutcome::clean(1);
        }
    }

    let mut _pidfile_guard: Option<PidFile> = None;
    if let Some(path) = &cfg.pidfile {
        _pidfile_guard = Some(PidFile::write(path, nix::unistd::getpid().as_raw()));
    }

    // SPAWNED?
    let mut _childfile_guard: Option<PidFile> = None;
    let mut child_pid: Option<Pid> = None;
    let mut effective_keep_interval_min = cfg.keep_interval_min;

    if let Some(command) = &cfg.command {
        let program = command.first().map(String::as_str).unwrap_or_default();
        match deps.child_sup.start(program, command) {
            Ok(pid) => {
                deps.set_child_pid(Some(pid));
                child_pid = Some(pid);
                if let Some(path) = &cfg.childfile {
                    _childfile_guard = Some(PidFile::write(path, pid.as_raw()));
                }
                if effective_keep_interval_min == 0 {
                    effective_keep_interval_min = 60;
                }
            }
            Err(err) => {
                tracing::error!(%err, "failed to start supervised command");
                return ExitOutcome::clean(1);
            }
        }
    }

    if effective_keep_interval_min == 0 {
        // One-shot: nothing left to maintain.
        return ExitOutcome::clean(last_hook_status.unwrap_or(0).clamp(0, 255));
    }

    // RUNNING ⇄ REFRESH
    let mut last_auth_ok = true;
    loop {
        if let Some(pid) = child_pid {
            match deps.child_sup.poll(pid) {
                ChildState::Exited(status) => {
                    tracing::info!(status, "supervised command exited; shutting down");
                    return ExitOutcome::clean(status);
                }
                ChildState::WaitFailed => {
                    tracing::error!("failed to wait on supervised command");
                    return ExitOutcome::clean(1);
                }
                ChildState::NotExited => {}
            }
        }

        let wait_secs = if last_auth_ok {
            (effective_keep_interval_min as u64) * 60
        } else {
            60
        };
        match deps.sleeper.wait(Duration::from_secs(wait_secs)) {
            WaitOutcome::TimedOut | WaitOutcome::Interrupted => {}
        }

        if deps.flags.shutdown_requested() {
            return ExitOutcome::clean(0);
        }

        let refresh_requested = deps.flags.refresh_requested();

        let expiry = match deps.provider.inspect(&cache.path) {
            Ok(summary) => {
                let policy = ExpiryPolicy {
                    keep_interval_min: cfg.keep_interval_min,
                    happy_threshold_min: cfg.happy_threshold_min,
                };
                Some(evaluate(&summary, &policy, deps.clock.now()))
            }
            Err(err) => {
                if cfg.mode == Mode::Renew {
                    if cfg.ignore_initial_errors {
                        tracing::warn!(%err, "cache unreadable; continuing to poll");
                        last_auth_ok = false;
                        deps.flags.clear_refresh();
                        continue;
                    }
                    tracing::error!(%err, "cache unreadable");
                    return ExitOutcome::clean(1);
                }
                None
            }
        };

        let needs_refresh =
            refresh_requested || cfg.always_renew || !matches!(expiry, Some(Expiry::Fresh));

        if needs_refresh {
            match do_authenticate(
                cfg,
                &cache,
                client_principal.as_deref(),
                deps,
                last_auth_code.as_ref(),
            ) {
                Ok(status) => {
                    last_hook_status = status;
                    last_auth_ok = true;
                    last_auth_code = None;
                }
                Err(err @ CoreError::Auth(AuthError::CannotRenew(_))) if cfg.mode == Mode::Renew => {
                    if cfg.ignore_initial_errors {
                        tracing::warn!(%err, "ticket cannot be renewed; continuing to poll");
                        last_auth_ok = false;
                        last_auth_code = auth_error_of(err);
                    } else {
                        tracing::error!(%err, "ticket cannot be renewed");
                        deps.flags.clear_refresh();
                        return ExitOutcome::clean(1);
                    }
                }
                Err(err) => {
                    last_auth_ok = false;
                    if cfg.exit_on_errors {
                        tracing::error!(%err, "refresh failed; exiting");
                        deps.flags.clear_refresh();
                        return ExitOutcome::clean(1);
                    }
                    tracing::warn!(%err, "refresh failed; will retry");
                    last_auth_code = auth_error_of(err);
                }
            }
        }

        deps.flags.clear_refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::RealChildSupervision;
    use crate::config::AuthMethod;
    use crate::environment::FakeEnvironment;
    use crate::expiry::CredentialSummary;
    use std::cell::{Cell, RefCell};
    use std::time::SystemTime;

    struct FakeProvider {
        authenticate_results: RefCell<Vec<Result<(), AuthError>>>,
        inspect_result: Option<CredentialSummary>,
        auth_calls: Cell<u32>,
    }

    impl Default for FakeProvider {
        fn default() -> Self {
            FakeProvider {
                authenticate_results: RefCell::new(Vec::new()),
                inspect_result: None,
                auth_calls: Cell::new(0),
            }
        }
    }

    impl CredentialProvider for FakeProvider {
        fn authenticate(
            &self,
            _target: &Path,
            _client_principal: Option<&str>,
            _method: Option<&AuthMethod>,
            _prior_status: Option<&AuthError>,
        ) -> Result<(), AuthError> {
            self.auth_calls.set(self.auth_calls.get() + 1);
            let mut results = self.authenticate_results.borrow_mut();
            if results.is_empty() {
                Ok(())
            } else {
                results.remove(0)
            }
        }

        fn inspect(&self, _path: &Path) -> Result<CredentialSummary, AuthError> {
            self.inspect_result
                .clone()
                .ok_or_else(|| AuthError::Other("no cache".into()))
        }

        fn copy(&self, _src_path: &Path, _dest_path: &Path) -> Result<(), AuthError> {
            Ok(())
        }

        fn first_principal_in_keytab(&self, _keytab: &Path) -> Result<String, AuthError> {
            Ok("alice@EXAMPLE.ORG".into())
        }
    }

    struct FakeAfs;

    impl AfsIntegration for FakeAfs {
        fn available(&self) -> bool {
            true
        }

        fn create_pag(&self) -> std::io::Result<()> {
            Ok(())
        }

        fn run_hook(&self, _hook: &Path, _verbose: bool) -> std::io::Result<i32> {
            Ok(0)
        }
    }

    struct InstantSleeper;

    impl Sleeper for InstantSleeper {
        fn wait(&self, _timeout: Duration) -> WaitOutcome {
            WaitOutcome::TimedOut
        }
    }

    struct FixedClock(SystemTime);

    impl Clock for FixedClock {
        fn now(&self) -> SystemTime {
            self.0
        }
    }

    fn base_config(dir: &std::path::Path) -> Config {
        Config {
            mode: Mode::Acquire,
            cache_path: Some(dir.join("krb5cc_test")),
            client_principal: Some("alice@EXAMPLE.ORG".into()),
            auth_method: Some(AuthMethod::Password),
            keep_interval_min: 0,
            happy_threshold_min: 0,
            always_renew: false,
            ignore_initial_errors: false,
            exit_on_errors: false,
            background: false,
            do_hook: false,
            command: None,
            pidfile: None,
            childfile: None,
            owner: None,
            group: None,
            mode_bits: None,
            verbose: false,
            quiet: false,
            search_keytab: false,
        }
    }

    fn noop_set_child_pid(_pid: Option<Pid>) {}

    #[test]
    fn happy_fresh_ticket_skips_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let mut provider = FakeProvider::default();
        provider.inspect_result = Some(CredentialSummary {
            end_time: now + Duration::from_secs(7200),
            renew_until: now + Duration::from_secs(14400),
            client: "alice@EXAMPLE.ORG".into(),
        });

        let mut cfg = base_config(dir.path());
        cfg.happy_threshold_min = 30;

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(now);
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 0);
        assert_eq!(provider.auth_calls.get(), 0);
    }

    #[test]
    fn initial_auth_failure_without_ignore_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();
        provider
            .authenticate_results
            .borrow_mut()
            .push(Err(AuthError::BadCredentials("nope".into())));

        let cfg = base_config(dir.path());
        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 1);
    }

    #[test]
    fn initial_auth_failure_with_ignore_backs_off_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();
        {
            let mut results = provider.authenticate_results.borrow_mut();
            results.push(Err(AuthError::TransientNetwork("kdc down".into())));
            results.push(Err(AuthError::TransientNetwork("kdc down".into())));
            results.push(Ok(()));
        }

        let mut cfg = base_config(dir.path());
        cfg.ignore_initial_errors = true;

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 0);
        assert_eq!(provider.auth_calls.get(), 3);
    }

    #[test]
    fn running_loop_exits_cleanly_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();

        let mut cfg = base_config(dir.path());
        cfg.keep_interval_min = 10;

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        flags.test_set_shutdown();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 0);
        // one authentication in PRIMED, then RUNNING sees shutdown and exits.
        assert_eq!(provider.auth_calls.get(), 1);
    }

    #[test]
    fn search_keytab_resolves_principal_before_authenticating() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();

        let mut cfg = base_config(dir.path());
        cfg.client_principal = None;
        cfg.search_keytab = true;
        cfg.auth_method = Some(AuthMethod::Keytab(dir.path().join("krb5.keytab")));

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 0);
        assert_eq!(provider.auth_calls.get(), 1);
    }

    struct EmptyKeytabProvider;

    impl CredentialProvider for EmptyKeytabProvider {
        fn authenticate(
            &self,
            _target: &Path,
            _client_principal: Option<&str>,
            _method: Option<&AuthMethod>,
            _prior_status: Option<&AuthError>,
        ) -> Result<(), AuthError> {
            panic!("authenticate must not be called when keytab search fails");
        }

        fn inspect(&self, _path: &Path) -> Result<CredentialSummary, AuthError> {
            Err(AuthError::Other("no cache".into()))
        }

        fn copy(&self, _src_path: &Path, _dest_path: &Path) -> Result<(), AuthError> {
            Ok(())
        }

        fn first_principal_in_keytab(&self, _keytab: &Path) -> Result<String, AuthError> {
            Err(AuthError::Other("no principal found in keytab file".into()))
        }
    }

    #[test]
    fn search_keytab_with_no_entries_is_fatal_before_authenticating() {
        let dir = tempfile::tempdir().unwrap();
        let provider = EmptyKeytabProvider;

        let mut cfg = base_config(dir.path());
        cfg.client_principal = None;
        cfg.search_keytab = true;
        cfg.auth_method = Some(AuthMethod::Keytab(dir.path().join("krb5.keytab")));

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 1);
    }

    #[test]
    fn renew_unrenewable_is_fatal_without_ignore_initial_errors() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let mut provider = FakeProvider::default();
        provider.authenticate_results.borrow_mut().push(Err(AuthError::CannotRenew(
            "renewable lifetime exceeded".into(),
        )));
        // The first RUNNING iteration's `inspect` sees the ticket already
        // inside the horizon, so `authenticate` is called and reports
        // CannotRenew.
        provider.inspect_result = Some(CredentialSummary {
            end_time: now + Duration::from_secs(10),
            renew_until: now + Duration::from_secs(250),
            client: "alice@EXAMPLE.ORG".into(),
        });

        let mut cfg = base_config(dir.path());
        cfg.mode = Mode::Renew;
        cfg.keep_interval_min = 60;

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(now);
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 1);
    }

    #[test]
    fn managed_cache_path_is_exported_as_krb5ccname() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();
        let cfg = base_config(dir.path());
        let expected = cfg.cache_path.clone().unwrap();

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let env = FakeEnvironment::default();
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &env,
        };

        run(&cfg, &deps);
        assert_eq!(
            env.get("KRB5CCNAME").unwrap(),
            expected.display().to_string()
        );
    }

    /// spec.md §8 testable property 2: with a real supervised command, the
    /// loop's exit status is the child's own, and `keep_interval_min == 0`
    /// is clamped to 60 rather than skipping supervision entirely.
    #[test]
    fn supervised_command_exit_status_propagates_through_real_child_supervision() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();

        let mut cfg = base_config(dir.path());
        cfg.command = Some(vec!["/bin/true".to_string()]);

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 0);
        // one authentication in PRIMED; the child's own exit (not a signal
        // or a fatal auth error) is what ends RUNNING.
        assert_eq!(provider.auth_calls.get(), 1);
    }

    #[test]
    fn supervised_command_nonzero_exit_status_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::default();

        let mut cfg = base_config(dir.path());
        cfg.command = Some(vec!["/bin/false".to_string()]);

        let afs = FakeAfs;
        let sleeper = InstantSleeper;
        let clock = FixedClock(SystemTime::now());
        let flags = SignalFlags::default();
        let child_sup = RealChildSupervision;
        let deps = LoopDeps {
            provider: &provider,
            afs: &afs,
            sleeper: &sleeper,
            clock: &clock,
            flags: &flags,
            child_sup: &child_sup,
            set_child_pid: &noop_set_child_pid,
            env: &FakeEnvironment::default(),
        };

        let outcome = run(&cfg, &deps);
        assert_eq!(outcome.code, 1);
    }

    #[test]
    fn resolved_cache_fabricates_private_path_when_unspecified_with_command() {
        let mut cfg = base_config(Path::new("/unused"));
        cfg.cache_path = None;
        cfg.command = Some(vec!["/bin/true".to_string()]);

        let resolved = ResolvedCache::resolve(&cfg);
        assert!(resolved.clean_on_exit);
        assert!(resolved.path.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn resolved_cache_uses_conventional_path_when_unspecified_without_command() {
        let mut cfg = base_config(Path::new("/unused"));
        cfg.cache_path = None;

        let resolved = ResolvedCache::resolve(&cfg);
        assert!(!resolved.clean_on_exit);
        assert!(resolved
            .path
            .to_string_lossy()
            .starts_with("/tmp/krb5cc_"));
    }
}
