/// Initialises `tracing-subscriber` from `-v`/`-q`, falling back to
/// `RUST_LOG` when neither flag is given. Mirrors
/// `vinit/src/bin/simplevisor.rs`'s startup logging setup, adapted from its
/// fixed level to the three-way verbose/default/quiet switch the original
/// `k5start`/`krenew` expose.
pub fn init(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default_directive = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
