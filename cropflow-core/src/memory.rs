//! Memory-cleanup policies for the record store.
//!
//! A single injectable policy decides when a record's decoded pixels are
//! released, with one implementation per mode: manual (explicit user action
//! only), auto (age-based sweep of completed records), aggressive (release
//! the moment a record completes).

use std::time::{Duration, Instant};

/// When to release a record's decoded pixel buffer.
pub trait MemoryPolicy: Send {
    /// Release pixels immediately after a record transitions to `Completed`.
    fn cleanup_on_complete(&self) -> bool {
        false
    }

    /// Release pixels of a completed record during an opportunistic sweep.
    fn should_sweep(&self, _completed_at: Instant, _now: Instant) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Cleanup only on explicit user action.
pub struct ManualPolicy;

impl MemoryPolicy for ManualPolicy {
    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Cleanup completed records older than a fixed age threshold.
pub struct AutoPolicy {
    pub max_age: Duration,
}

impl MemoryPolicy for AutoPolicy {
    fn should_sweep(&self, completed_at: Instant, now: Instant) -> bool {
        now.duration_since(completed_at) >= self.max_age
    }

    fn name(&self) -> &'static str {
        "auto"
    }
}

/// Cleanup immediately after completion.
pub struct AggressivePolicy;

impl MemoryPolicy for AggressivePolicy {
    fn cleanup_on_complete(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "aggressive"
    }
}

/// Resolve a policy by its configured name.
pub fn policy_from_name(name: &str, auto_age: Duration) -> Box<dyn MemoryPolicy> {
    match name.trim().to_ascii_lowercase().as_str() {
        "aggressive" => Box::new(AggressivePolicy),
        "auto" => Box::new(AutoPolicy { max_age: auto_age }),
        _ => Box::new(ManualPolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_never_volunteers_cleanup() {
        let policy = ManualPolicy;
        assert!(!policy.cleanup_on_complete());
        assert!(!policy.should_sweep(Instant::now(), Instant::now()));
    }

    #[test]
    fn auto_sweeps_past_threshold() {
        let policy = AutoPolicy {
            max_age: Duration::from_secs(60),
        };
        let completed = Instant::now();
        assert!(!policy.should_sweep(completed, completed + Duration::from_secs(59)));
        assert!(policy.should_sweep(completed, completed + Duration::from_secs(60)));
        assert!(!policy.cleanup_on_complete());
    }

    #[test]
    fn aggressive_cleans_on_complete() {
        assert!(AggressivePolicy.cleanup_on_complete());
    }

    #[test]
    fn policy_resolution_defaults_to_manual() {
        assert_eq!(policy_from_name("auto", Duration::from_secs(1)).name(), "auto");
        assert_eq!(
            policy_from_name("AGGRESSIVE", Duration::from_secs(1)).name(),
            "aggressive"
        );
        assert_eq!(policy_from_name("???", Duration::from_secs(1)).name(), "manual");
    }
}
