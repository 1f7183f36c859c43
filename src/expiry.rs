use std::time::{Duration, SystemTime};

/// The fudge added to the expiry horizon so a wakeup never lands exactly as
/// a ticket expires (`EXPIRE_FUDGE` in k5start.c/krenew.c).
pub const EXPIRE_FUDGE_SECS: u64 = 120;

/// Read-only view of a cache's relevant fields (spec.md §3). Absence of any
/// field counts as expired by the caller treating `inspect` as failed.
#[derive(Debug, Clone)]
pub struct CredentialSummary {
    pub end_time: SystemTime,
    pub renew_until: SystemTime,
    pub client: String,
}

/// The parameters the horizon is computed from (spec.md §4.5).
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    pub keep_interval_min: u32,
    pub happy_threshold_min: u32,
}

impl ExpiryPolicy {
    /// The required remaining lifetime, in seconds, below which a ticket is
    /// considered stale. Mirrors `ticket_expired`'s `offset` computation in
    /// both k5start.c and krenew.c.
    pub fn horizon(&self) -> Duration {
        if self.happy_threshold_min > 0 {
            Duration::from_secs(60 * (self.keep_interval_min + self.happy_threshold_min) as u64)
        } else {
            Duration::from_secs(60 * self.keep_interval_min as u64 + EXPIRE_FUDGE_SECS)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Fresh,
    Stale,
    Unrenewable,
}

/// Decides whether a credential summary is fresh enough given policy
/// parameters (spec.md §4.5).
pub fn evaluate(summary: &CredentialSummary, policy: &ExpiryPolicy, now: SystemTime) -> Expiry {
    let horizon = policy.horizon();
    let deadline = now + horizon;
    // Strictly greater, not >=: a ticket expiring exactly at the horizon
    // boundary (e.g. horizon == 0 and end_time == now) must still read
    // Stale, per the documented boundary case.
    if summary.end_time > deadline {
        return Expiry::Fresh;
    }
    if summary.renew_until <= deadline {
        Expiry::Unrenewable
    } else {
        Expiry::Stale
    }
}
