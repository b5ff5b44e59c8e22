//! Ticket lifecycle: ledger, timers and the state machine that drives them.

pub mod clock;
pub mod ledger;
pub mod lifecycle;
pub mod machine;
pub mod notices;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{LedgerError, LedgerStore, Ticket, TicketLedger};
pub use lifecycle::{TicketPhase, TicketThresholds};
pub use machine::{RestoreReport, TicketService, TicketSettings};
pub use scheduler::{ScheduleOutcome, TimerScheduler};

use crate::channels::GatewayIntent;

/// Everything the state machine reacts to, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketEvent {
    Intent(GatewayIntent),
    WarningDue(String),
    ExpiryDue(String),
    SweepDue,
}

/// Why a ticket is being closed. Only affects the notice text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    UserRequested,
    Expired,
    Inactive,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested => write!(f, "user_requested"),
            Self::Expired => write!(f, "expired"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}
