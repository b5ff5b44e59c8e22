//! Ticket state machine.
//!
//! ```text
//!   OpenRequested ──create──► Open ──(warning deadline)──► WarnedPendingExpiry
//!                              │                                  │
//!                              ├── close request ─────────────────┤
//!                              ├── inactivity sweep ──────────────┤
//!                              └── expiry deadline ───────────────┴──► Closed (removed)
//! ```
//!
//! [`TicketService`] is the only writer of the ledger. It is driven by a
//! single consumer ([`TicketService::run`]) so each event, including its
//! ledger save, completes before the next one starts. Handlers that await
//! gateway I/O re-check the ledger afterwards instead of trusting what they
//! read before the call.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::clock::Clock;
use super::ledger::{Ticket, TicketLedger};
use super::lifecycle::{self, Deadline, TicketPhase, TicketThresholds};
use super::notices;
use super::scheduler::{ScheduleOutcome, TimerScheduler};
use super::{CloseReason, TicketEvent};
use crate::catalog::{CatalogCommand, ServiceCatalog};
use crate::channels::{
    ChannelError, ChannelSpec, GatewayIntent, InteractionRef, InteractionReply, TicketGateway,
    TicketUser,
};

/// A timer that fires earlier than this, by the wall clock, is re-armed
/// rather than acted on.
const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TicketSettings {
    pub thresholds: TicketThresholds,
    pub category: String,
    pub entry_channel_id: Option<String>,
    pub welcome_image_url: Option<String>,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            thresholds: TicketThresholds::default(),
            category: "Tickets".to_string(),
            entry_channel_id: None,
            welcome_image_url: Some(notices::DEFAULT_WELCOME_IMAGE.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub dropped: usize,
    pub expired: usize,
}

pub struct TicketService {
    ledger: TicketLedger,
    scheduler: TimerScheduler,
    gateway: Arc<dyn TicketGateway>,
    clock: Arc<dyn Clock>,
    catalog: ServiceCatalog,
    settings: TicketSettings,
    announced: bool,
}

impl TicketService {
    pub fn new(
        ledger: TicketLedger,
        gateway: Arc<dyn TicketGateway>,
        clock: Arc<dyn Clock>,
        catalog: ServiceCatalog,
        settings: TicketSettings,
        events: mpsc::UnboundedSender<TicketEvent>,
    ) -> Self {
        let scheduler = TimerScheduler::new(clock.clone(), settings.thresholds, events);
        Self {
            ledger,
            scheduler,
            gateway,
            clock,
            catalog,
            settings,
            announced: false,
        }
    }

    pub fn ledger(&self) -> &TicketLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    pub fn thresholds(&self) -> &TicketThresholds {
        &self.settings.thresholds
    }

    /// Re-arms persisted tickets and starts the inactivity sweep.
    pub async fn start(&mut self) -> RestoreReport {
        let report = self.restore_on_startup().await;
        self.scheduler
            .start_inactivity_sweep(self.settings.thresholds.sweep_interval);
        report
    }

    /// Drains the event queue until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<TicketEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Ticket event queue closed, state machine stopping");
    }

    pub async fn handle(&mut self, event: TicketEvent) {
        match event {
            TicketEvent::Intent(intent) => self.handle_intent(intent).await,
            TicketEvent::WarningDue(id) => self.fire_warning(&id).await,
            TicketEvent::ExpiryDue(id) => self.fire_expiry(&id).await,
            TicketEvent::SweepDue => {
                self.sweep().await;
            }
        }
    }

    async fn handle_intent(&mut self, intent: GatewayIntent) {
        match intent {
            GatewayIntent::Ready => self.announce().await,
            GatewayIntent::OpenRequested {
                user,
                guild_id,
                interaction,
            } => {
                self.open_ticket(&user, &guild_id, interaction.as_ref()).await;
            }
            GatewayIntent::CloseRequested {
                channel_id,
                user_id,
                interaction,
            } => {
                if let Some(interaction) = &interaction {
                    self.reply(interaction, InteractionReply::Acknowledge).await;
                }
                if self.ledger.contains(&channel_id) {
                    info!("User {} asked to close ticket {}", user_id, channel_id);
                    self.close(&channel_id, CloseReason::UserRequested).await;
                } else {
                    debug!("Ignoring close request for unknown ticket {}", channel_id);
                }
            }
            GatewayIntent::MessageReceived {
                channel_id,
                author_is_bot,
                text,
                ..
            } => {
                if !author_is_bot {
                    self.handle_message(&channel_id, &text).await;
                }
            }
        }
    }

    /// Posts the entry message with the open button, once per process.
    pub async fn announce(&mut self) {
        if self.announced {
            return;
        }
        self.announced = true;

        let Some(entry) = self.settings.entry_channel_id.clone() else {
            warn!("No entry channel configured, skipping welcome message");
            return;
        };

        let welcome = notices::welcome(self.settings.welcome_image_url.as_deref());
        match self.gateway.send_message(&entry, &welcome).await {
            Ok(()) => info!("Posted welcome message to channel {}", entry),
            Err(e) => error!("Could not post welcome message to channel {}: {}", entry, e),
        }
    }

    /// Provisions a private channel for `user` and registers it as a ticket.
    pub async fn open_ticket(
        &mut self,
        user: &TicketUser,
        guild_id: &str,
        interaction: Option<&InteractionRef>,
    ) -> Option<Ticket> {
        let spec = ChannelSpec::ticket(guild_id, &self.settings.category, user);
        let channel = match self.gateway.create_channel(&spec).await {
            Ok(channel) => channel,
            Err(e) => {
                error!("Failed to create ticket channel for user {}: {}", user.id, e);
                if let Some(interaction) = interaction {
                    self.reply(interaction, InteractionReply::Ephemeral(notices::creation_failed()))
                        .await;
                }
                return None;
            }
        };

        let ticket = self.create(&channel.id, &user.id).await;

        let intro = notices::intro(user, &self.settings.thresholds);
        if let Err(e) = self.gateway.send_message(&channel.id, &intro).await {
            log_io_failure("send intro", &channel.id, &e);
        }
        if let Some(interaction) = interaction {
            self.reply(interaction, InteractionReply::Ephemeral(notices::created(&channel.id)))
                .await;
        }

        Some(ticket)
    }

    /// Registers a ticket for an already provisioned channel, persists it and
    /// arms its warning and expiry timers.
    pub async fn create(&mut self, channel_id: &str, owner_id: &str) -> Ticket {
        if let Some(existing) = self.ledger.get(channel_id) {
            warn!("Ticket {} already exists, keeping the existing record", channel_id);
            return existing.clone();
        }

        let ticket = Ticket::new(channel_id, owner_id, self.clock.now_ms());
        self.ledger.insert(ticket.clone());
        self.persist();
        info!("Opened ticket {} for user {}", ticket.id, ticket.owner_id);

        self.arm_or_expire(&ticket).await;
        ticket
    }

    /// Bumps `last_activity_at`. Unknown ids are ignored.
    pub fn record_activity(&mut self, id: &str) -> bool {
        let now = self.clock.now_ms();
        if self.ledger.upsert_activity(id, now) {
            self.persist();
            true
        } else {
            false
        }
    }

    /// Sends the closing notice, deletes the channel and drops the record.
    ///
    /// Returns `false` when the ticket was not in the ledger, which makes a
    /// second close (or a close racing an expiry) a no-op. Gateway failures
    /// are logged and never keep the record alive.
    pub async fn close(&mut self, id: &str, reason: CloseReason) -> bool {
        if !self.ledger.contains(id) {
            debug!("Ticket {} already closed", id);
            return false;
        }

        self.scheduler.cancel(id);
        info!("Closing ticket {} ({})", id, reason);

        let notice = notices::closing(reason, &self.settings.thresholds);
        let channel_gone = match self.gateway.send_message(id, &notice).await {
            Ok(()) => false,
            Err(e) => {
                log_io_failure("send closing notice", id, &e);
                e.is_not_found()
            }
        };

        if !channel_gone {
            match self.gateway.delete_channel(id).await {
                Ok(()) => debug!("Deleted channel for ticket {}", id),
                Err(e) if e.is_not_found() => debug!("Channel for ticket {} already gone", id),
                Err(e) => error!("Failed to delete channel for ticket {}: {}", id, e),
            }
        }

        if self.ledger.remove(id).is_some() {
            self.persist();
        }
        true
    }

    /// Verifies every persisted ticket against the gateway and re-arms the
    /// survivors from their persisted timestamps. Tickets whose expiry passed
    /// during downtime are closed right away.
    pub async fn restore_on_startup(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();

        for id in self.ledger.ids() {
            match self.gateway.fetch_channel(&id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!("Channel for ticket {} no longer exists, dropping it", id);
                    self.forget(&id);
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Could not verify channel for ticket {} ({}), keeping it", id, e);
                }
            }

            let Some(ticket) = self.ledger.get(&id).cloned() else {
                continue;
            };
            if self.arm_or_expire(&ticket).await {
                report.expired += 1;
            } else {
                report.restored += 1;
            }
        }

        info!(
            "Restored {} tickets ({} dropped, {} expired during downtime)",
            report.restored, report.dropped, report.expired
        );
        report
    }

    pub async fn fire_warning(&mut self, id: &str) {
        let now = self.clock.now_ms();
        let Some(ticket) = self.ledger.get(id).cloned() else {
            debug!("Warning for closed ticket {} ignored", id);
            return;
        };

        match lifecycle::remaining(lifecycle::warning_deadline(&ticket, self.thresholds()), now) {
            Deadline::Pending(left) if left > CLOCK_SKEW_TOLERANCE => {
                debug!("Warning for ticket {} fired {:?} early, re-arming", id, left);
                self.scheduler.schedule_warning(&ticket);
                return;
            }
            _ => {}
        }

        if lifecycle::phase(&ticket, now, self.thresholds()) == TicketPhase::Expired {
            debug!("Ticket {} already past expiry, skipping warning", id);
            return;
        }

        let warning = notices::expiry_warning(self.thresholds());
        match self.gateway.send_message(id, &warning).await {
            Ok(()) => info!("Warned ticket {} about upcoming expiry", id),
            Err(e) if e.is_not_found() => {
                info!("Channel for ticket {} disappeared, dropping it", id);
                self.forget(id);
            }
            Err(e) => log_io_failure("send expiry warning", id, &e),
        }
    }

    pub async fn fire_expiry(&mut self, id: &str) {
        let now = self.clock.now_ms();
        let Some(ticket) = self.ledger.get(id).cloned() else {
            debug!("Expiry for closed ticket {} ignored", id);
            return;
        };

        match lifecycle::remaining(lifecycle::expiry_deadline(&ticket, self.thresholds()), now) {
            Deadline::Pending(left) if left > CLOCK_SKEW_TOLERANCE => {
                debug!("Expiry for ticket {} fired {:?} early, re-arming", id, left);
                self.scheduler.schedule_expiry(&ticket);
            }
            _ => {
                self.close(id, CloseReason::Expired).await;
            }
        }
    }

    /// Closes every ticket idle for longer than the inactivity threshold.
    pub async fn sweep(&mut self) -> usize {
        let now = self.clock.now_ms();
        let inactive: Vec<String> = self
            .ledger
            .tickets()
            .iter()
            .filter(|t| lifecycle::is_inactive(t, now, &self.settings.thresholds))
            .map(|t| t.id.clone())
            .collect();

        if inactive.is_empty() {
            debug!("Inactivity sweep: nothing to close");
            return 0;
        }

        let mut closed = 0;
        for id in inactive {
            if self.close(&id, CloseReason::Inactive).await {
                closed += 1;
            }
        }
        info!("Inactivity sweep closed {} tickets", closed);
        closed
    }

    async fn handle_message(&mut self, channel_id: &str, text: &str) {
        if !self.record_activity(channel_id) {
            return;
        }

        let Some(command) = CatalogCommand::parse(text) else {
            return;
        };
        for reply in self.catalog.answer(&command) {
            if let Err(e) = self.gateway.send_message(channel_id, &reply).await {
                log_io_failure("answer catalog command", channel_id, &e);
                break;
            }
        }
    }

    /// Returns `true` when the expiry had already passed and the ticket was
    /// closed instead of armed.
    async fn arm_or_expire(&mut self, ticket: &Ticket) -> bool {
        match self.scheduler.schedule_expiry(ticket) {
            ScheduleOutcome::Armed(_) => {
                self.scheduler.schedule_warning(ticket);
                false
            }
            ScheduleOutcome::Elapsed => {
                info!("Ticket {} expired while it was not scheduled", ticket.id);
                self.close(&ticket.id, CloseReason::Expired).await;
                true
            }
        }
    }

    /// Drops a ticket whose channel is already gone.
    fn forget(&mut self, id: &str) {
        self.scheduler.cancel(id);
        if self.ledger.remove(id).is_some() {
            self.persist();
        }
    }

    async fn reply(&self, interaction: &InteractionRef, reply: InteractionReply) {
        if let Err(e) = self.gateway.reply(interaction, &reply).await {
            warn!("Failed to answer interaction {}: {}", interaction.id, e);
        }
    }

    fn persist(&self) {
        if let Err(e) = self.ledger.save() {
            error!("Failed to save ticket ledger: {}", e);
        }
    }
}

fn log_io_failure(action: &str, id: &str, e: &ChannelError) {
    if e.is_not_found() {
        debug!("Could not {} for ticket {}: channel is gone", action, id);
    } else {
        warn!("Could not {} for ticket {}: {}", action, id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ServiceGroup, ServiceItem};
    use crate::channels::OPEN_TICKET_ID;
    use crate::core::test_utils::RecordingGateway;
    use crate::tickets::clock::ManualClock;
    use crate::tickets::ledger::LedgerStore;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    struct Harness {
        service: TicketService,
        gateway: Arc<RecordingGateway>,
        clock: Arc<ManualClock>,
        store: LedgerStore,
        sender: mpsc::UnboundedSender<TicketEvent>,
        events: mpsc::UnboundedReceiver<TicketEvent>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(tickets: &[Ticket], now: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("tickets.json"));
        store.save(tickets).unwrap();

        let gateway = Arc::new(RecordingGateway::new());
        let clock = Arc::new(ManualClock::new(now.as_millis() as i64));
        let (tx, rx) = mpsc::unbounded_channel();
        let catalog = ServiceCatalog::new(vec![ServiceGroup {
            kind: "Daily".to_string(),
            items: vec![ServiceItem {
                name: "Commissions".to_string(),
                price: "100k".to_string(),
            }],
        }]);
        let settings = TicketSettings {
            entry_channel_id: Some("entry".to_string()),
            ..TicketSettings::default()
        };

        let service = TicketService::new(
            TicketLedger::open(store.clone()),
            gateway.clone(),
            clock.clone(),
            catalog,
            settings,
            tx.clone(),
        );
        Harness {
            service,
            gateway,
            clock,
            store,
            sender: tx,
            events: rx,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(&[], Duration::ZERO)
    }

    fn bob() -> TicketUser {
        TicketUser {
            id: "u1".to_string(),
            username: "Bob".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_persists_and_arms() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        let ticket = h.service.create("c1", "u1").await;

        assert_eq!(ticket.created_at, 0);
        assert!(h.service.scheduler().is_armed("c1"));
        assert_eq!(h.store.load(), vec![ticket]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_twice_is_noop() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;

        assert!(h.service.close("c1", CloseReason::UserRequested).await);
        assert!(!h.service.close("c1", CloseReason::UserRequested).await);

        assert!(h.service.ledger().is_empty());
        assert!(h.store.load().is_empty());
        assert_eq!(h.gateway.deleted(), vec!["c1".to_string()]);
        assert!(!h.service.scheduler().is_armed("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_survives_gateway_failures() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;
        h.gateway.fail_sends(true);
        h.gateway.fail_deletes(true);

        assert!(h.service.close("c1", CloseReason::Expired).await);
        assert!(!h.service.ledger().contains("c1"));
        assert!(h.store.load().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_on_vanished_channel_cleans_ledger() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;
        h.gateway.remove_channel("c1");

        assert!(h.service.close("c1", CloseReason::Inactive).await);
        assert!(h.service.ledger().is_empty());
        assert!(h.gateway.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_never_extends_expiry() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;
        let deadline = lifecycle::expiry_deadline(h.service.ledger().get("c1").unwrap(), h.service.thresholds());

        for _ in 0..5 {
            h.clock.advance(3 * HOUR);
            assert!(h.service.record_activity("c1"));
            let ticket = h.service.ledger().get("c1").unwrap();
            assert_eq!(lifecycle::expiry_deadline(ticket, h.service.thresholds()), deadline);
        }
        assert_eq!(h.store.load()[0].last_activity_at, (15 * HOUR).as_millis() as i64);

        h.clock.set((24 * HOUR).as_millis() as i64);
        h.service.fire_expiry("c1").await;
        assert!(h.service.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_expiry_timer_is_rearmed() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;

        h.clock.set((20 * HOUR).as_millis() as i64);
        h.service.fire_expiry("c1").await;
        assert!(h.service.ledger().contains("c1"));
        assert!(h.service.scheduler().is_armed("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_activity_on_unknown_ticket() {
        let mut h = harness();
        assert!(!h.service.record_activity("ghost"));
        assert!(h.store.load().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_sent_once_then_skipped_after_expiry() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;

        h.clock.set((23 * HOUR).as_millis() as i64);
        h.service.fire_warning("c1").await;
        assert_eq!(h.gateway.sent_to("c1").len(), 1);

        h.clock.set((24 * HOUR).as_millis() as i64);
        h.service.fire_warning("c1").await;
        assert_eq!(h.gateway.sent_to("c1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_on_vanished_channel_drops_ticket() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;
        h.gateway.remove_channel("c1");

        h.clock.set((23 * HOUR).as_millis() as i64);
        h.service.fire_warning("c1").await;
        assert!(h.service.ledger().is_empty());
        assert!(!h.service.scheduler().is_armed("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_inactivity_window() {
        let mut h = harness();
        h.gateway.add_channel("c2");
        h.service.create("c2", "u1").await;

        h.clock.set((11 * HOUR).as_millis() as i64);
        h.service.record_activity("c2");

        h.clock.set((23 * HOUR).as_millis() as i64);
        assert_eq!(h.service.sweep().await, 0);
        assert!(h.service.ledger().contains("c2"));

        h.clock.advance(Duration::from_secs(60));
        assert_eq!(h.service.sweep().await, 1);
        assert!(!h.service.ledger().contains("c2"));
        assert_eq!(h.gateway.deleted(), vec!["c2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_drops_missing_and_expires_overdue() {
        let tickets = vec![
            Ticket::new("gone", "u1", 0),
            Ticket::new("overdue", "u2", 0),
            Ticket::new("fresh", "u3", (5 * HOUR).as_millis() as i64),
        ];
        let mut h = harness_with(&tickets, 24 * HOUR + Duration::from_millis(1));
        h.gateway.add_channel("overdue");
        h.gateway.add_channel("fresh");

        let report = h.service.restore_on_startup().await;

        assert_eq!(
            report,
            RestoreReport {
                restored: 1,
                dropped: 1,
                expired: 1
            }
        );
        assert_eq!(h.service.ledger().ids(), vec!["fresh".to_string()]);
        assert_eq!(h.gateway.deleted(), vec!["overdue".to_string()]);
        assert!(h.service.scheduler().is_armed("fresh"));
        assert_eq!(h.store.load().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_keeps_ticket_when_gateway_errors() {
        let tickets = vec![Ticket::new("c1", "u1", 0)];
        let mut h = harness_with(&tickets, HOUR);
        h.gateway.fail_fetches(true);

        let report = h.service.restore_on_startup().await;
        assert_eq!(report.restored, 1);
        assert!(h.service.scheduler().is_armed("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_ticket_flow() {
        let mut h = harness();
        let interaction = InteractionRef {
            id: "i1".to_string(),
            token: "t".to_string(),
        };

        let ticket = h
            .service
            .open_ticket(&bob(), "g1", Some(&interaction))
            .await
            .unwrap();

        assert!(h.service.ledger().contains(&ticket.id));
        assert_eq!(ticket.owner_id, "u1");
        let created = h.gateway.created();
        assert_eq!(created[0].name, "ticket-bob");
        assert_eq!(created[0].category, "Tickets");
        assert_eq!(h.gateway.sent_to(&ticket.id).len(), 1);
        assert_eq!(
            h.gateway.replies(),
            vec![InteractionReply::Ephemeral(notices::created(&ticket.id))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_ticket_failure_replies_and_skips_ledger() {
        let mut h = harness();
        h.gateway.fail_creates(true);
        let interaction = InteractionRef {
            id: "i1".to_string(),
            token: "t".to_string(),
        };

        assert!(h
            .service
            .open_ticket(&bob(), "g1", Some(&interaction))
            .await
            .is_none());
        assert!(h.service.ledger().is_empty());
        assert_eq!(
            h.gateway.replies(),
            vec![InteractionReply::Ephemeral(notices::creation_failed())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_request_for_unknown_channel_is_acknowledged_only() {
        let mut h = harness();
        h.gateway.add_channel("general");
        h.service
            .handle(TicketEvent::Intent(GatewayIntent::CloseRequested {
                channel_id: "general".to_string(),
                user_id: "u1".to_string(),
                interaction: Some(InteractionRef {
                    id: "i1".to_string(),
                    token: "t".to_string(),
                }),
            }))
            .await;

        assert!(h.gateway.deleted().is_empty());
        assert_eq!(h.gateway.replies(), vec![InteractionReply::Acknowledge]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_in_tickets_record_activity_and_answer_catalog() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.gateway.add_channel("general");
        h.service.create("c1", "u1").await;
        h.clock.set((2 * HOUR).as_millis() as i64);

        let message = |channel: &str, bot: bool, text: &str| {
            TicketEvent::Intent(GatewayIntent::MessageReceived {
                channel_id: channel.to_string(),
                author_id: "u1".to_string(),
                author_is_bot: bot,
                text: text.to_string(),
            })
        };

        h.service.handle(message("general", false, "!prices")).await;
        assert!(h.gateway.sent_to("general").is_empty());

        h.service.handle(message("c1", true, "!prices")).await;
        assert_eq!(h.service.ledger().get("c1").unwrap().last_activity_at, 0);

        h.service.handle(message("c1", false, "!prices")).await;
        assert_eq!(
            h.service.ledger().get("c1").unwrap().last_activity_at,
            (2 * HOUR).as_millis() as i64
        );
        let sent = h.gateway.sent_to("c1");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].embeds[0].fields[0].name, "Commissions");
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_only_once() {
        let mut h = harness();
        h.gateway.add_channel("entry");
        h.service.handle(TicketEvent::Intent(GatewayIntent::Ready)).await;
        h.service.handle(TicketEvent::Intent(GatewayIntent::Ready)).await;

        let sent = h.gateway.sent_to("entry");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].buttons[0].custom_id, OPEN_TICKET_ID);
        assert_eq!(
            sent[0].embeds[0].image_url.as_deref(),
            Some(notices::DEFAULT_WELCOME_IMAGE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_timer_events_after_user_close_are_noops() {
        let mut h = harness();
        h.gateway.add_channel("c1");
        h.service.create("c1", "u1").await;

        h.service
            .handle(TicketEvent::Intent(GatewayIntent::CloseRequested {
                channel_id: "c1".to_string(),
                user_id: "u1".to_string(),
                interaction: None,
            }))
            .await;
        assert_eq!(h.gateway.deleted(), vec!["c1".to_string()]);
        let sends = h.gateway.sent_to("c1").len();

        // Same id reappearing on the gateway must not make stale events act.
        h.gateway.add_channel("c1");
        h.clock.set((24 * HOUR).as_millis() as i64);
        h.service.handle(TicketEvent::ExpiryDue("c1".to_string())).await;
        h.service.handle(TicketEvent::WarningDue("c1".to_string())).await;
        h.service.handle(TicketEvent::SweepDue).await;

        assert_eq!(h.gateway.deleted().len(), 1);
        assert_eq!(h.gateway.sent_to("c1").len(), sends);
        assert!(h.gateway.has_channel("c1"));
        assert!(h.store.load().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_drains_queue_in_order() {
        let Harness {
            service,
            gateway,
            clock,
            store,
            sender,
            events,
            _dir,
        } = harness();
        let settle = || tokio::time::sleep(Duration::from_millis(10));
        let worker = tokio::spawn(service.run(events));

        sender
            .send(TicketEvent::Intent(GatewayIntent::OpenRequested {
                user: bob(),
                guild_id: "g1".to_string(),
                interaction: None,
            }))
            .unwrap();
        settle().await;

        let opened = store.load();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].owner_id, "u1");
        let id = opened[0].id.clone();

        clock.set((12 * HOUR).as_millis() as i64 + 1);
        sender.send(TicketEvent::SweepDue).unwrap();
        settle().await;

        assert!(store.load().is_empty());
        assert_eq!(gateway.deleted(), vec![id]);
        worker.abort();
    }
}
