use std::path::PathBuf;

use crate::error::CoreError;

/// Which of the two supervisors is running; changes how a handful of
/// maintenance-loop decisions are made (§4.6, §4.7, §7 of the expanded
/// spec) without forking the loop itself into two copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Acquire,
    Renew,
}

/// How the initial (and, for `renew`, every) credential is obtained.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Keytab(PathBuf),
    Password,
    Stdin,
}

/// Immutable configuration built once from parsed CLI arguments and never
/// mutated after the maintenance loop starts (spec.md §3).
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub cache_path: Option<PathBuf>,
    pub client_principal: Option<String>,
    pub auth_method: Option<AuthMethod>,
    pub keep_interval_min: u32,
    pub happy_threshold_min: u32,
    pub always_renew: bool,
    pub ignore_initial_errors: bool,
    pub exit_on_errors: bool,
    pub background: bool,
    pub do_hook: bool,
    pub command: Option<Vec<String>>,
    pub pidfile: Option<PathBuf>,
    pub childfile: Option<PathBuf>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode_bits: Option<u32>,
    pub verbose: bool,
    pub quiet: bool,
    pub search_keytab: bool,
}

impl Config {
    /// Validates the cross-flag consistency rules from spec.md §6/§8 that
    /// cannot be expressed in clap's declarative constraints alone.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.background && self.keep_interval_min == 0 && self.command.is_none() {
            return Err(CoreError::Config(
                "-b only makes sense with -K or a command to run".into(),
            ));
        }
        if self.mode == Mode::Acquire {
            if self.background && !matches!(self.auth_method, Some(AuthMethod::Keytab(_))) {
                return Err(CoreError::Config(
                    "-b option requires a keytab be specified with -f".into(),
                ));
            }
            if self.keep_interval_min > 0 && !matches!(self.auth_method, Some(AuthMethod::Keytab(_)))
            {
                return Err(CoreError::Config(
                    "-K option requires a keytab be specified with -f".into(),
                ));
            }
            if self.command.is_some() && !matches!(self.auth_method, Some(AuthMethod::Keytab(_))) {
                return Err(CoreError::Config(
                    "running a command requires a keytab be specified with -f".into(),
                ));
            }
            if self.search_keytab && !matches!(self.auth_method, Some(AuthMethod::Keytab(_))) {
                return Err(CoreError::Config(
                    "-U option requires a keytab be specified with -f".into(),
                ));
            }
            if self.happy_threshold_min > 0 && self.keep_interval_min > 0 {
                return Err(CoreError::Config(
                    "-H and -K options cannot be used at the same time".into(),
                ));
            }
        }
        if let Some(mode_bits) = self.mode_bits {
            if mode_bits > 0o7777 {
                return Err(CoreError::Config(format!(
                    "mode {mode_bits:o} is not a valid permission bitmask"
                )));
            }
        }
        Ok(())
    }

    /// Whether `-v`/`-K`/`-H`/`-b` imply quiet output per spec.md §6's
    /// "implied unless -v" rule. Applied after parsing since it depends on
    /// the combination of several flags.
    pub fn effective_quiet(explicit_quiet: bool, verbose: bool, keep_interval_min: u32, happy_threshold_min: u32, background: bool) -> bool {
        if explicit_quiet {
            return true;
        }
        if verbose {
            return false;
        }
        keep_interval_min > 0 || happy_threshold_min > 0 || background
    }
}

/// Parses an octal mode string per spec.md §8 ("a mode argument with any
/// non-octal digit must fail with `Config`").
pub fn parse_octal_mode(s: &str) -> Result<u32, CoreError> {
    u32::from_str_radix(s, 8)
        .map_err(|_| CoreError::Config(format!("invalid mode {s}, expected an octal number")))
}
