//! Turn classification, scheduling delay, and escalation tier computation.
//! Pure functions — the driver feeds them metrics and streak counters.

use std::time::Duration;

/// Accumulated metrics for one turn, reset at the start of each prompt.
#[derive(Debug, Clone, Default)]
pub struct TurnMetrics {
    pub chars: usize,
    pub tools: u32,
    pub events: u32,
    pub errored: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnClass {
    Productive,
    Idle,
    Empty,
    Error,
    Ok,
}

/// Classify a finished turn per the fixed thresholds: `productive` if at
/// least one tool call happened (or the turn timed out), `idle` under 200
/// streamed chars with no tools, `empty` with nothing at all, `error` on an
/// error event, `ok` otherwise.
pub fn classify(metrics: &TurnMetrics) -> TurnClass {
    if metrics.errored {
        return TurnClass::Error;
    }
    if metrics.timed_out || metrics.tools >= 1 {
        return TurnClass::Productive;
    }
    if metrics.chars == 0 {
        return TurnClass::Empty;
    }
    if metrics.chars < 200 {
        return TurnClass::Idle;
    }
    TurnClass::Ok
}

/// Tracks consecutive idle/empty streaks across turns, reset whenever a
/// `productive` turn breaks the streak.
#[derive(Debug, Clone, Default)]
pub struct StreakCounters {
    pub idle: u32,
    pub empty: u32,
}

impl StreakCounters {
    /// Update streaks for `class`, returning the delay to schedule before the
    /// next turn.
    pub fn apply(&mut self, class: TurnClass) -> Duration {
        match class {
            TurnClass::Productive => {
                self.idle = 0;
                self.empty = 0;
                Duration::from_secs(15)
            }
            TurnClass::Ok => Duration::from_secs(30),
            TurnClass::Idle => {
                self.idle += 1;
                Duration::from_secs((300 * self.idle as u64).min(600))
            }
            TurnClass::Empty => {
                self.empty += 1;
                if self.empty < 3 {
                    Duration::from_secs(120)
                } else {
                    let scaled = 120u64.saturating_mul(1u64 << (self.empty - 3).min(16));
                    Duration::from_secs(scaled.min(600))
                }
            }
            TurnClass::Error => Duration::from_secs(120),
        }
    }
}

/// Escalation directive for the next prompt, based on the current empty streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationTier {
    /// No escalation: send the normal continuation prompt.
    Normal,
    /// 5+ consecutive empty turns: resend a full context prompt.
    FullContext,
    /// 10+ consecutive empty turns: an explicit recovery directive.
    RecoveryDirective,
    /// 20+ consecutive empty turns: full re-initialization.
    Reinitialize,
}

pub fn escalation_tier(empty_streak: u32) -> EscalationTier {
    if empty_streak >= 20 {
        EscalationTier::Reinitialize
    } else if empty_streak >= 10 {
        EscalationTier::RecoveryDirective
    } else if empty_streak >= 5 {
        EscalationTier::FullContext
    } else {
        EscalationTier::Normal
    }
}

/// Tracks whether memory files have changed across turns, to decide when to
/// append a memory-update reminder.
#[derive(Debug, Clone, Default)]
pub struct MemoryReminderTracker {
    last_hash: Option<String>,
    unchanged_productive_or_ok_turns: u32,
}

impl MemoryReminderTracker {
    /// Observe the current memory-file hash for a turn classified `class`.
    /// Returns `true` if the next prompt should carry a reminder.
    pub fn observe(&mut self, current_hash: &str, class: TurnClass) -> bool {
        let unchanged = self.last_hash.as_deref() == Some(current_hash);
        self.last_hash = Some(current_hash.to_owned());

        if !matches!(class, TurnClass::Productive | TurnClass::Ok) {
            return false;
        }

        if unchanged {
            self.unchanged_productive_or_ok_turns += 1;
        } else {
            self.unchanged_productive_or_ok_turns = 0;
        }

        self.unchanged_productive_or_ok_turns >= 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_productive_requires_tool_or_timeout() {
        let m = TurnMetrics { tools: 1, chars: 0, ..Default::default() };
        assert_eq!(classify(&m), TurnClass::Productive);

        let m = TurnMetrics { timed_out: true, ..Default::default() };
        assert_eq!(classify(&m), TurnClass::Productive);
    }

    #[test]
    fn classify_empty_vs_idle_vs_ok() {
        assert_eq!(classify(&TurnMetrics::default()), TurnClass::Empty);
        assert_eq!(classify(&TurnMetrics { chars: 150, ..Default::default() }), TurnClass::Idle);
        assert_eq!(classify(&TurnMetrics { chars: 250, ..Default::default() }), TurnClass::Ok);
    }

    #[test]
    fn classify_error_takes_priority() {
        let m = TurnMetrics { tools: 3, errored: true, ..Default::default() };
        assert_eq!(classify(&m), TurnClass::Error);
    }

    #[test]
    fn productive_resets_streaks_and_delays_15s() {
        let mut s = StreakCounters { idle: 4, empty: 7 };
        let delay = s.apply(TurnClass::Productive);
        assert_eq!(delay, Duration::from_secs(15));
        assert_eq!(s.idle, 0);
        assert_eq!(s.empty, 0);
    }

    #[test]
    fn idle_delay_scales_and_caps_at_10_minutes() {
        let mut s = StreakCounters::default();
        assert_eq!(s.apply(TurnClass::Idle), Duration::from_secs(300));
        assert_eq!(s.apply(TurnClass::Idle), Duration::from_secs(600));
        assert_eq!(s.apply(TurnClass::Idle), Duration::from_secs(600));
    }

    #[test]
    fn empty_delay_below_threshold_is_flat_2_minutes() {
        let mut s = StreakCounters::default();
        assert_eq!(s.apply(TurnClass::Empty), Duration::from_secs(120));
        assert_eq!(s.apply(TurnClass::Empty), Duration::from_secs(120));
    }

    #[test]
    fn empty_delay_past_threshold_doubles_and_caps() {
        let mut s = StreakCounters { idle: 0, empty: 2 };
        // 3rd consecutive empty: scaled = 120 * 2^0 = 120
        assert_eq!(s.apply(TurnClass::Empty), Duration::from_secs(120));
        // 4th: 120 * 2^1 = 240
        assert_eq!(s.apply(TurnClass::Empty), Duration::from_secs(240));
        // 5th: 120 * 2^2 = 480
        assert_eq!(s.apply(TurnClass::Empty), Duration::from_secs(480));
        // 6th: 120 * 2^3 = 960 -> capped at 600
        assert_eq!(s.apply(TurnClass::Empty), Duration::from_secs(600));
    }

    #[test]
    fn escalation_tiers() {
        assert_eq!(escalation_tier(0), EscalationTier::Normal);
        assert_eq!(escalation_tier(4), EscalationTier::Normal);
        assert_eq!(escalation_tier(5), EscalationTier::FullContext);
        assert_eq!(escalation_tier(9), EscalationTier::FullContext);
        assert_eq!(escalation_tier(10), EscalationTier::RecoveryDirective);
        assert_eq!(escalation_tier(19), EscalationTier::RecoveryDirective);
        assert_eq!(escalation_tier(20), EscalationTier::Reinitialize);
    }

    #[test]
    fn memory_reminder_fires_after_3_unchanged_turns() {
        let mut tracker = MemoryReminderTracker::default();
        assert!(!tracker.observe("hash-a", TurnClass::Productive));
        assert!(!tracker.observe("hash-a", TurnClass::Ok));
        assert!(tracker.observe("hash-a", TurnClass::Productive));
    }

    #[test]
    fn memory_reminder_resets_on_change_or_non_productive() {
        let mut tracker = MemoryReminderTracker::default();
        tracker.observe("hash-a", TurnClass::Productive);
        tracker.observe("hash-a", TurnClass::Ok);
        assert!(!tracker.observe("hash-b", TurnClass::Productive));
        assert!(!tracker.observe("hash-b", TurnClass::Idle));
    }
}
