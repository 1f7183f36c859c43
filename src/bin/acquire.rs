use std::path::PathBuf;

use clap::Parser;
use nix::unistd::Pid;

use credkeep::child::RealChildSupervision;
use credkeep::clock::SystemClock;
use credkeep::config::{parse_octal_mode, AuthMethod, Config, Mode};
use credkeep::environment::RealEnvironment;
use credkeep::error::CoreError;
use credkeep::maintenance::{self, LoopDeps};
use credkeep::provider::{NoPagIntegration, UnavailableProvider};
use credkeep::signals::SignalInbox;

/// Keep a Kerberos credential cache populated from a keytab (or an
/// interactively supplied password), optionally supervising a command for
/// as long as the cache stays valid. Modelled on `k5start`.
#[derive(Parser, Debug)]
#[command(name = "acquire", version, about)]
struct Cli {
    /// Client principal to authenticate as.
    principal: Option<String>,

    /// Path to the credential cache to populate (defaults to a private
    /// cache when a command is given, the session default otherwise).
    #[arg(short = 'k', long = "cache")]
    cache: Option<PathBuf>,

    /// Keytab to authenticate from.
    #[arg(short = 'f', long = "keytab")]
    keytab: Option<PathBuf>,

    /// Read the password from stdin instead of prompting on the terminal.
    #[arg(short = 's', long = "stdin")]
    stdin: bool,

    /// Search the keytab for the first usable principal instead of
    /// requiring one on the command line.
    #[arg(short = 'U', long = "search-keytab")]
    search_keytab: bool,

    /// Re-authenticate every KEEP minutes, running in the foreground or
    /// background (see `-b`) until a fatal error or shutdown signal.
    #[arg(short = 'K', long = "keep-interval", value_name = "MINUTES", default_value_t = 0)]
    keep_interval: u32,

    /// Only re-authenticate once fewer than HAPPY minutes remain on the
    /// existing ticket; mutually exclusive with `-K`.
    #[arg(short = 'H', long = "happy-ticket", value_name = "MINUTES", default_value_t = 0)]
    happy_ticket: u32,

    /// Always re-authenticate on each cycle even if the cache looks fresh.
    #[arg(short = 'a', long = "always-renew")]
    always_renew: bool,

    /// Tolerate the first authentication attempt failing and retry with
    /// backoff instead of exiting immediately.
    #[arg(short = 'i', long = "ignore-initial-errors")]
    ignore_initial_errors: bool,

    /// Exit the maintenance loop the first time a later re-authentication
    /// attempt fails, rather than retrying on the next cycle.
    #[arg(short = 'x', long = "exit-on-errors")]
    exit_on_errors: bool,

    /// Detach from the controlling terminal after the first successful
    /// authentication.
    #[arg(short = 'b', long = "background")]
    background: bool,

    /// Run the configured post-auth hook (e.g. `aklog`) after each
    /// successful authentication.
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

    /// Verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet logging.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Command to supervise; its lifetime bounds the cache's lifetime when
    /// no `-K`/`-H` keep-alive interval is given.
    #[arg(last = true)]
    command: Vec<String>,
}

fn build_config(cli: &Cli) -> Result<Config, CoreError> {
    let auth_method = if let Some(keytab) = &cli.keytab {
        Some(AuthMethod::Keytab(keytab.clone()))
    } else if cli.stdin {
        Some(AuthMethod::Stdin)
    } else {
        Some(AuthMethod::Password)
    };

    let mode_bits = cli.mode.as_deref().map(parse_octal_mode).transpose()?;

    let cfg = Config {
        mode: Mode::Acquire,
        cache_path: cli.cache.clone(),
        client_principal: cli.principal.clone(),
        auth_method,
        keep_interval_min: cli.keep_interval,
        happy_threshold_min: cli.happy_ticket,
        always_renew: cli.always_renew,
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
        search_keytab: cli.search_keytab,
    };
    cfg.validate()?;
    Ok(cfg)
}

fn run() -> anyhow::Result<i32> {
    use anyhow::Context;

    let cli = Cli::parse();
    let cfg = build_config(&cli).context("invalid arguments")?;

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
    let env = RealEnvironment;

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
            eprintln!("acquire: {err:#}");
            std::process::exit(1);
        }
    }
}
