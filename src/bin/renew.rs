use std::path::PathBuf;

use clap::Parser;
use nix::unistd::Pid;

use credkeep::child::RealChildSupervision;
use credkeep::clock::SystemClock;
use credkeep::config::{parse_octal_mode, Config, Mode};
use credkeep::environment::RealEnvironment;
use credkeep::error::CoreError;
use credkeep::maintenance::{self, LoopDeps};
use credkeep::provider::{NoPagIntegration, UnavailableProvider};
use credkeep::signals::SignalInbox;

/// Keep an existing Kerberos credential cache renewed for as long as a
/// supervised command runs, or indefinitely with `-K`. Modelled on
/// `krenew`; unlike `acquire`, it never creates a cache from scratch — only
/// a cache that already exists can be renewed.
#[derive(Parser, Debug)]
#[command(name = "renew", version, about)]
struct Cli {
    /// Credential cache to renew (defaults to `$KRB5CCNAME`, falling back
    /// to the conventional per-uid path).
    #[arg(short = 'k', long = "cache")]
    cache: Option<PathBuf>,

    /// Re-check and, if needed, renew every KEEP minutes instead of exiting
    /// once the supervised command finishes.
    #[arg(short = 'K', long = "keep-interval", value_name = "MINUTES", default_value_t = 0)]
    keep_interval: u32,

    /// Detach from the controlling terminal once renewal succeeds once.
    #[arg(short = 'b', long = "background")]
    background: bool,

    /// Run the configured post-auth hook (e.g. `aklog`) after each
    /// successful renewal.
    #[arg(short = 't', long = "run-aklog")]
    run_aklog: bool,

    /// Write the supervisor's own pid to this file.
    #[arg(short = 'p', long = "pidfile")]
    pidfile: Option<PathBuf>,

    /// Write the supervised command's pid to this file.
    #[arg(short = 'c', long = "childfile")]
    childfile: Option<PathBuf>,

    /// Owner to chown the finalised cache to.
    #[arg(short = 'o', long = "owner")]
    owner: Option<String>,

    /// Group to chown the finalised cache to.
    #[arg(short = 'g', long = "group")]
    group: Option<String>,

    /// Octal permission mode for the finalised cache.
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,

    /// Tolerate a cache that is unreadable or unrenewable and keep polling
    /// instead of exiting.
    #[arg(short = 'i', long = "ignore-initial-errors")]
    ignore_initial_errors: bool,

    /// Exit the moment a renewal attempt fails rather than retrying on the
    /// next cycle.
    #[arg(short = 'x', long = "exit-on-errors")]
    exit_on_errors: bool,

    /// Verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet logging.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Command to supervise; renewal continues for as long as it runs (or
    /// indefinitely, if `-K` is also given).
    #[arg(last = true)]
    command: Vec<String>,
}

fn default_cache_path(env: &dyn credkeep::environment::Environment) -> PathBuf {
    if let Some(name) = env.get("KRB5CCNAME") {
        return PathBuf::from(name.strip_prefix("FILE:").unwrap_or(&name));
    }
    let uid = nix::unistd::getuid().as_raw();
    PathBuf::from(format!("/tmp/krb5cc_{uid}"))
}

fn build_config(cli: &Cli, env: &dyn credkeep::environment::Environment) -> Result<Config, CoreError> {
    let mode_bits = cli.mode.as_deref().map(parse_octal_mode).transpose()?;

    let cfg = Config {
        mode: Mode::Renew,
        cache_path: Some(cli.cache.clone().unwrap_or_else(|| default_cache_path(env))),
        client_principal: None,
        auth_method: None,
        keep_interval_min: cli.keep_interval,
        happy_threshold_min: 0,
        always_renew: false,
        ignore_initial_errors: cli.ignore_initial_errors,
        exit_on_errors: cli.exit_on_errors,
        background: cli.background,
        do_hook: cli.run_aklog,
        command: if cli.command.is_empty() {
            None
        } else {
            Some(cli.command.clone())
        },
        pidfile: cli.pidfile.clone(),
        childfile: cli.childfile.clone(),
        owner: cli.owner.clone(),
        group: cli.group.clone(),
        mode_bits,
        verbose: cli.verbose,
        quiet: cli.quiet,
        search_keytab: false,
    };
    cfg.validate()?;
    Ok(cfg)
}

fn run() -> anyhow::Result<i32> {
    use anyhow::Context;

    let cli = Cli::parse();
    let env = RealEnvironment;
    let cfg = build_config(&cli, &env).context("invalid arguments")?;

    let quiet = Config::effective_quiet(
        cfg.quiet,
        cfg.verbose,
        cfg.keep_interval_min,
        cfg.happy_threshold_min,
        cfg.background,
    );
    credkeep::logging::init(cfg.verbose, quiet);

    let provider = UnavailableProvider;
    let afs = NoPagIntegration;
    let clock = SystemClock;
    let child_sup = RealChildSupervision;

    let inbox = SignalInbox::install().context("failed to install signal handlers")?;
    let flags = inbox.flags.clone();
    let set_child_pid = |pid: Option<Pid>| inbox.set_child_pid(pid);

    let deps = LoopDeps {
        provider: &provider,
        afs: &afs,
        sleeper: &inbox,
        clock: &clock,
        flags: &flags,
        child_sup: &child_sup,
        set_child_pid: &set_child_pid,
        env: &env,
    };

    Ok(maintenance::run(&cfg, &deps).code)
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("renew: {err:#}");
            std::process::exit(1);
        }
    }
}
