//! Pure ticket lifecycle decisions.
//!
//! Nothing here reads a clock or touches I/O: every function takes `now`
//! explicitly so the state machine and the scheduler can be driven by an
//! injected clock.
//!
//! | Threshold     | Anchor             | Default |
//! |---------------|--------------------|---------|
//! | warning       | `created_at`       | 23h     |
//! | expiry        | `created_at`       | 24h     |
//! | inactivity    | `last_activity_at` | 12h     |
//! | sweep         | -                  | 15min   |

use std::time::Duration;

use super::clock::duration_ms;
use super::ledger::Ticket;

pub const DEFAULT_WARNING_THRESHOLD: Duration = Duration::from_secs(23 * 60 * 60);
pub const DEFAULT_EXPIRY_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketThresholds {
    pub warning: Duration,
    pub expiry: Duration,
    pub inactivity: Duration,
    pub sweep_interval: Duration,
}

impl Default for TicketThresholds {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING_THRESHOLD,
            expiry: DEFAULT_EXPIRY_THRESHOLD,
            inactivity: DEFAULT_INACTIVITY_THRESHOLD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl TicketThresholds {
    /// Time left between the warning notice and deletion.
    pub fn warning_lead(&self) -> Duration {
        self.expiry.saturating_sub(self.warning)
    }
}

/// Where a ticket sits on its fixed, creation-anchored timeline.
///
/// `WarnedPendingExpiry` is never persisted; it is re-derived from
/// elapsed time whenever it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketPhase {
    Open,
    WarnedPendingExpiry,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Pending(Duration),
    Elapsed,
}

pub fn age_ms(ticket: &Ticket, now_ms: i64) -> i64 {
    now_ms.saturating_sub(ticket.created_at)
}

pub fn idle_ms(ticket: &Ticket, now_ms: i64) -> i64 {
    now_ms.saturating_sub(ticket.last_activity_at)
}

pub fn warning_deadline(ticket: &Ticket, thresholds: &TicketThresholds) -> i64 {
    ticket
        .created_at
        .saturating_add(duration_ms(thresholds.warning))
}

/// Anchored to `created_at` only; activity never moves it.
pub fn expiry_deadline(ticket: &Ticket, thresholds: &TicketThresholds) -> i64 {
    ticket
        .created_at
        .saturating_add(duration_ms(thresholds.expiry))
}

pub fn remaining(deadline_ms: i64, now_ms: i64) -> Deadline {
    if now_ms < deadline_ms {
        let left = deadline_ms.saturating_sub(now_ms);
        Deadline::Pending(Duration::from_millis(left.unsigned_abs()))
    } else {
        Deadline::Elapsed
    }
}

pub fn phase(ticket: &Ticket, now_ms: i64, thresholds: &TicketThresholds) -> TicketPhase {
    let age = age_ms(ticket, now_ms);
    if age >= duration_ms(thresholds.expiry) {
        TicketPhase::Expired
    } else if age >= duration_ms(thresholds.warning) {
        TicketPhase::WarnedPendingExpiry
    } else {
        TicketPhase::Open
    }
}

/// Strictly greater than the threshold: a ticket idle for exactly the
/// inactivity window survives the sweep.
pub fn is_inactive(ticket: &Ticket, now_ms: i64, thresholds: &TicketThresholds) -> bool {
    idle_ms(ticket, now_ms) > duration_ms(thresholds.inactivity)
}
