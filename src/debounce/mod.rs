//! AlertDebouncer - Sustained violation state machine
//!
//! ## States
//!
//! - `Idle` - nothing pending
//! - `Pending` - a subject was seen missing equipment; start time, frame and
//!   missing set are snapshotted
//! - Alerted - transient: reported through `Transition::Alerted` and
//!   collapsed back to `Idle` in the same step
//!
//! ## Transitions per frame
//!
//! | state   | input                               | next    | effect                 |
//! |---------|-------------------------------------|---------|------------------------|
//! | Idle    | subject, >=1 missing                | Pending | snapshot               |
//! | Pending | subject, >=1 missing, elapsed < d   | Pending | none                   |
//! | Pending | subject, >=1 missing, elapsed >= d  | Idle    | alert with snapshot    |
//! | Pending | subject, 0 missing                  | Idle    | discard                |
//! | Pending | no subject                          | Idle    | discard                |
//! | Idle    | subject, 0 missing / no subject     | Idle    | none                   |

use crate::compliance::{ComplianceStatus, RequiredItem};
use crate::frame::Frame;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Default delay before a violation is accepted as genuine
pub const DEFAULT_ALERT_DELAY_MS: i64 = 3_000;

/// Violation waiting for the delay to mature
#[derive(Debug, Clone)]
pub struct PendingViolation {
    pub started_at: DateTime<Utc>,
    /// Frame seen when the violation was first observed
    pub frame: Frame,
    /// Missing items when the violation was first observed
    pub missing: Vec<RequiredItem>,
}

impl PendingViolation {
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }
}

#[derive(Debug, Clone)]
enum DebounceState {
    Idle,
    Pending(PendingViolation),
}

/// Outcome of one step
#[derive(Debug, Clone)]
pub enum Transition {
    /// Idle and stays idle
    Idle,
    /// A new pending violation was recorded
    PendingStarted,
    /// Still pending, delay not reached
    PendingHeld { elapsed: Duration },
    /// Delay matured: alert with the original snapshot
    Alerted(PendingViolation),
    /// Subject now fully equipped, pending discarded
    ComplianceRestored,
    /// Subject left the frame, pending discarded
    SubjectLeft,
}

impl Transition {
    pub fn is_alert(&self) -> bool {
        matches!(self, Transition::Alerted(_))
    }
}

/// Reported debounce state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebouncePhase {
    Idle,
    PendingViolation,
}

/// AlertDebouncer instance (one per session)
#[derive(Debug)]
pub struct AlertDebouncer {
    delay: Duration,
    state: DebounceState,
}

impl AlertDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
        }
    }

    pub fn with_default_delay() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_ALERT_DELAY_MS))
    }

    /// Feed one frame's compliance status
    pub fn step(&mut self, status: &ComplianceStatus, frame: &Frame, now: DateTime<Utc>) -> Transition {
        let state = std::mem::replace(&mut self.state, DebounceState::Idle);

        match state {
            DebounceState::Idle => {
                if status.is_violation() {
                    let missing = status.missing_items();
                    tracing::info!(
                        missing = ?missing,
                        delay_ms = self.delay.num_milliseconds(),
                        "Subject without PPE detected, waiting for delay"
                    );
                    self.state = DebounceState::Pending(PendingViolation {
                        started_at: now,
                        frame: frame.clone(),
                        missing,
                    });
                    Transition::PendingStarted
                } else {
                    Transition::Idle
                }
            }
            DebounceState::Pending(pending) => {
                if !status.subject_present {
                    tracing::info!("Subject no longer detected, pending violation discarded");
                    return Transition::SubjectLeft;
                }
                if !status.is_violation() {
                    tracing::info!("Subject fully equipped, pending violation discarded");
                    return Transition::ComplianceRestored;
                }

                let elapsed = pending.elapsed(now);
                if elapsed >= self.delay {
                    tracing::info!(
                        elapsed_ms = elapsed.num_milliseconds(),
                        missing = ?pending.missing,
                        "Violation sustained, alert triggered"
                    );
                    Transition::Alerted(pending)
                } else {
                    tracing::debug!(
                        remaining_ms = (self.delay - elapsed).num_milliseconds(),
                        "Violation pending"
                    );
                    self.state = DebounceState::Pending(pending);
                    Transition::PendingHeld { elapsed }
                }
            }
        }
    }

    pub fn pending(&self) -> Option<&PendingViolation> {
        match &self.state {
            DebounceState::Pending(p) => Some(p),
            DebounceState::Idle => None,
        }
    }

    pub fn phase(&self) -> DebouncePhase {
        match self.state {
            DebounceState::Idle => DebouncePhase::Idle,
            DebounceState::Pending(_) => DebouncePhase::PendingViolation,
        }
    }

    /// Time left before the pending violation matures
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.pending().map(|p| {
            let left = self.delay - p.elapsed(now);
            left.max(Duration::zero())
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Drop any pending violation
    pub fn reset(&mut self) {
        self.state = DebounceState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::evaluate;
    use crate::detector::{BoundingBox, Detection, DetectionResult};
    use image::RgbImage;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn status(labels: &[&str]) -> ComplianceStatus {
        let bbox = BoundingBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 };
        evaluate(&DetectionResult::new(
            labels.iter().map(|l| Detection::new(*l, 0.9, bbox)).collect(),
        ))
    }

    fn missing_boots() -> ComplianceStatus {
        status(&["human", "helmet", "vest"])
    }

    fn compliant() -> ComplianceStatus {
        status(&["human", "helmet", "vest", "boots"])
    }

    fn absent() -> ComplianceStatus {
        status(&[])
    }

    fn frame_at(ms: i64) -> Frame {
        Frame::new(RgbImage::new(2, 2), at(ms))
    }

    #[test]
    fn test_alert_after_sustained_violation() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        let first = frame_at(0);

        assert!(matches!(debouncer.step(&missing_boots(), &first, at(0)), Transition::PendingStarted));
        assert!(matches!(debouncer.step(&missing_boots(), &frame_at(1000), at(1000)), Transition::PendingHeld { .. }));
        assert!(matches!(debouncer.step(&missing_boots(), &frame_at(2900), at(2900)), Transition::PendingHeld { .. }));

        match debouncer.step(&missing_boots(), &frame_at(3100), at(3100)) {
            Transition::Alerted(violation) => {
                assert!(violation.frame.same_buffer(&first));
                assert_eq!(violation.started_at, at(0));
                assert_eq!(violation.missing, vec![RequiredItem::Boots]);
                assert_eq!(violation.missing[0].display_name(), "Botas");
            }
            other => panic!("expected alert, got {:?}", other),
        }
        assert_eq!(debouncer.phase(), DebouncePhase::Idle);
    }

    #[test]
    fn test_compliance_before_delay_resets() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        debouncer.step(&missing_boots(), &frame_at(0), at(0));

        let transition = debouncer.step(&compliant(), &frame_at(1000), at(1000));
        assert!(matches!(transition, Transition::ComplianceRestored));
        assert_eq!(debouncer.phase(), DebouncePhase::Idle);
        assert!(debouncer.pending().is_none());
    }

    #[test]
    fn test_subject_leaving_resets() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        debouncer.step(&missing_boots(), &frame_at(0), at(0));

        assert!(matches!(debouncer.step(&absent(), &frame_at(2000), at(2000)), Transition::SubjectLeft));
        // Violation resumes: timer restarts, so 3.5s is not enough
        assert!(matches!(debouncer.step(&missing_boots(), &frame_at(2500), at(2500)), Transition::PendingStarted));
        assert!(!debouncer.step(&missing_boots(), &frame_at(3500), at(3500)).is_alert());
        assert!(debouncer.step(&missing_boots(), &frame_at(5500), at(5500)).is_alert());
    }

    #[test]
    fn test_exact_delay_triggers() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        debouncer.step(&missing_boots(), &frame_at(0), at(0));
        assert!(!debouncer.step(&missing_boots(), &frame_at(2999), at(2999)).is_alert());
        assert!(debouncer.step(&missing_boots(), &frame_at(3000), at(3000)).is_alert());
    }

    #[test]
    fn test_idle_noops() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        assert!(matches!(debouncer.step(&compliant(), &frame_at(0), at(0)), Transition::Idle));
        assert!(matches!(debouncer.step(&absent(), &frame_at(10), at(10)), Transition::Idle));
        assert_eq!(debouncer.phase(), DebouncePhase::Idle);
    }

    #[test]
    fn test_snapshot_kept_when_missing_set_changes() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        let first = frame_at(0);
        debouncer.step(&missing_boots(), &first, at(0));
        // later the helmet disappears too
        debouncer.step(&status(&["human", "vest"]), &frame_at(1500), at(1500));

        match debouncer.step(&status(&["human"]), &frame_at(3200), at(3200)) {
            Transition::Alerted(violation) => {
                assert_eq!(violation.missing, vec![RequiredItem::Boots]);
                assert!(violation.frame.same_buffer(&first));
            }
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_next_violation_after_alert_starts_new_cycle() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        debouncer.step(&missing_boots(), &frame_at(0), at(0));
        assert!(debouncer.step(&missing_boots(), &frame_at(3100), at(3100)).is_alert());

        let second = frame_at(3200);
        assert!(matches!(debouncer.step(&missing_boots(), &second, at(3200)), Transition::PendingStarted));
        match debouncer.step(&missing_boots(), &frame_at(6300), at(6300)) {
            Transition::Alerted(violation) => {
                assert_eq!(violation.started_at, at(3200));
                assert!(violation.frame.same_buffer(&second));
            }
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_remaining_countdown() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        assert!(debouncer.remaining(at(0)).is_none());

        debouncer.step(&missing_boots(), &frame_at(0), at(0));
        assert_eq!(debouncer.remaining(at(1000)), Some(Duration::milliseconds(2000)));
        assert_eq!(debouncer.remaining(at(5000)), Some(Duration::zero()));
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut debouncer = AlertDebouncer::with_default_delay();
        debouncer.step(&missing_boots(), &frame_at(0), at(0));
        debouncer.reset();
        assert_eq!(debouncer.phase(), DebouncePhase::Idle);
        // after reset a violation must wait the full delay again
        debouncer.step(&missing_boots(), &frame_at(3100), at(3100));
        assert!(!debouncer.step(&missing_boots(), &frame_at(4000), at(4000)).is_alert());
    }

    #[test]
    fn test_interrupted_sequences_never_alert() {
        // every sequence that breaks the violation before 3s emits nothing
        let breakers = [compliant(), absent()];
        for breaker in &breakers {
            for break_at in [100, 1000, 2000, 2999] {
                let mut debouncer = AlertDebouncer::with_default_delay();
                let mut alerts = 0;
                for (ms, st) in [(0, missing_boots()), (break_at, breaker.clone()), (break_at + 1, missing_boots()), (3100, missing_boots())] {
                    if debouncer.step(&st, &frame_at(ms), at(ms)).is_alert() {
                        alerts += 1;
                    }
                }
                assert_eq!(alerts, 0, "break at {}ms", break_at);
            }
        }
    }
}
