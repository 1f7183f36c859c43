//! Shared maintenance-loop core for the `acquire` and `renew` binaries: a
//! single state machine that keeps a Kerberos credential cache fresh,
//! driven by pluggable capability traits so the binaries are the only
//! place that links a real Kerberos library and a real signal handler.

pub mod cache;
pub mod child;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod environment;
pub mod error;
pub mod expiry;
pub mod logging;
pub mod maintenance;
pub mod pidfile;
pub mod provider;
pub mod signals;
