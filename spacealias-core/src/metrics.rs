//! Metrics for alias sessions and follow operations
//!
//! Counters go through the `metrics` facade; without an installed recorder
//! they are no-ops.

use metrics::{counter, describe_counter};

pub const ALIAS_REGISTRATIONS: &str = "alias.registrations.total";
pub const ALIAS_REGISTRATIONS_FAILED: &str = "alias.registrations.failed";
pub const ALIAS_CHECKS_VALID: &str = "alias.checks.valid";
pub const ALIAS_CHECKS_INVALID: &str = "alias.checks.invalid";
pub const FOLLOW_SUBMISSIONS: &str = "follow.submissions.total";
pub const GUARD_ACTIONS_FAILED: &str = "guard.actions.failed";

/// Register metric descriptions
pub fn init_metrics() {
    describe_counter!(ALIAS_REGISTRATIONS, "Alias registrations attempted");
    describe_counter!(ALIAS_REGISTRATIONS_FAILED, "Alias registrations whose remote phase failed");
    describe_counter!(ALIAS_CHECKS_VALID, "Validity checks that found a valid binding");
    describe_counter!(ALIAS_CHECKS_INVALID, "Validity checks that found no valid binding");
    describe_counter!(FOLLOW_SUBMISSIONS, "Follow and unfollow messages submitted");
    describe_counter!(GUARD_ACTIONS_FAILED, "Guarded actions that ended in a caught error");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}
