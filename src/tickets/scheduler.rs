//! Per-ticket deferred actions and the recurring inactivity sweep.
//!
//! Timers never touch ticket state. Each one is a spawned task that sleeps
//! until its deadline and then pushes a [`TicketEvent`] onto the queue the
//! state machine drains, so every callback runs on the machine's single
//! consumer task. The scheduler only holds live handles keyed by ticket id;
//! the ledger stays authoritative.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::clock::Clock;
use super::ledger::Ticket;
use super::lifecycle::{expiry_deadline, remaining, warning_deadline, Deadline, TicketThresholds};
use super::TicketEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Armed(Duration),
    /// The deadline passed before the timer could be armed.
    Elapsed,
}

#[derive(Debug, Default)]
struct TicketTimers {
    warning: Option<JoinHandle<()>>,
    expiry: Option<JoinHandle<()>>,
}

impl TicketTimers {
    fn abort(self) {
        for handle in [self.warning, self.expiry].into_iter().flatten() {
            handle.abort();
        }
    }
}

pub struct TimerScheduler {
    clock: Arc<dyn Clock>,
    thresholds: TicketThresholds,
    events: mpsc::UnboundedSender<TicketEvent>,
    timers: HashMap<String, TicketTimers>,
    sweep: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("thresholds", &self.thresholds)
            .field("armed", &self.timers.len())
            .field("sweep_running", &self.sweep.is_some())
            .finish()
    }
}

impl TimerScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        thresholds: TicketThresholds,
        events: mpsc::UnboundedSender<TicketEvent>,
    ) -> Self {
        Self {
            clock,
            thresholds,
            events,
            timers: HashMap::new(),
            sweep: None,
        }
    }

    pub fn thresholds(&self) -> &TicketThresholds {
        &self.thresholds
    }

    /// Arms the pre-expiry notice. A warning window that already
    /// passed (e.g. during downtime) is skipped, not reported.
    pub fn schedule_warning(&mut self, ticket: &Ticket) -> ScheduleOutcome {
        let deadline = warning_deadline(ticket, &self.thresholds);
        match remaining(deadline, self.clock.now_ms()) {
            Deadline::Pending(delay) => {
                let handle = self.arm(delay, TicketEvent::WarningDue(ticket.id.clone()));
                let timers = self.timers.entry(ticket.id.clone()).or_default();
                if let Some(previous) = timers.warning.replace(handle) {
                    previous.abort();
                }
                debug!("Warning for ticket {} armed in {:?}", ticket.id, delay);
                ScheduleOutcome::Armed(delay)
            }
            Deadline::Elapsed => {
                debug!("Warning window for ticket {} already passed", ticket.id);
                ScheduleOutcome::Elapsed
            }
        }
    }

    /// Arms the fixed expiry. On [`ScheduleOutcome::Elapsed`] nothing is
    /// armed and the caller must expire the ticket itself.
    pub fn schedule_expiry(&mut self, ticket: &Ticket) -> ScheduleOutcome {
        let deadline = expiry_deadline(ticket, &self.thresholds);
        match remaining(deadline, self.clock.now_ms()) {
            Deadline::Pending(delay) => {
                let handle = self.arm(delay, TicketEvent::ExpiryDue(ticket.id.clone()));
                let timers = self.timers.entry(ticket.id.clone()).or_default();
                if let Some(previous) = timers.expiry.replace(handle) {
                    previous.abort();
                }
                debug!("Expiry for ticket {} armed in {:?}", ticket.id, delay);
                ScheduleOutcome::Armed(delay)
            }
            Deadline::Elapsed => ScheduleOutcome::Elapsed,
        }
    }

    /// Starts (or restarts) the recurring sweep. The first tick comes one
    /// full `interval` after the call.
    pub fn start_inactivity_sweep(&mut self, interval: Duration) {
        if let Some(previous) = self.sweep.take() {
            previous.abort();
        }

        let events = self.events.clone();
        self.sweep = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(TicketEvent::SweepDue).is_err() {
                    debug!("Ticket event queue closed, stopping inactivity sweep");
                    break;
                }
            }
        }));
        info!("Inactivity sweep running every {:?}", interval);
    }

    /// Cancels every outstanding one-shot timer for `id`. Unknown ids are fine.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.timers.remove(id) {
            Some(timers) => {
                timers.abort();
                debug!("Cancelled timers for ticket {}", id);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.timers
            .get(id)
            .map(|t| t.warning.is_some() || t.expiry.is_some())
            .unwrap_or(false)
    }

    fn arm(&self, delay: Duration, event: TicketEvent) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(event).is_err() {
                debug!("Ticket event queue closed, dropping timer");
            }
        })
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for (_, timers) in self.timers.drain() {
            timers.abort();
        }
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
    }
}
