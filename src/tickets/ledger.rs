//! Durable record of every open ticket.
//!
//! The ledger is a pretty-printed JSON array on disk. [`LedgerStore`] only
//! knows how to read and atomically replace that file; [`TicketLedger`] owns
//! the canonical in-memory set and is the single writer for it.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Id of the channel backing the ticket.
    pub id: String,
    #[serde(alias = "userId")]
    pub owner_id: String,
    pub created_at: i64,
    #[serde(alias = "lastActivity", default)]
    pub last_activity_at: i64,
}

impl Ticket {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            created_at: now_ms,
            last_activity_at: now_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the ledger file. Missing or unreadable storage yields an empty
    /// ledger; individual malformed records are skipped.
    pub fn load(&self) -> Vec<Ticket> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No ticket ledger at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                warn!(
                    "Failed to read ticket ledger {}: {}, starting empty",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        let records: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "Ticket ledger {} is corrupt ({}), starting empty",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Ticket>(record) {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    warn!("Skipping malformed ticket record: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Replaces the ledger file with `tickets`. The new content is written
    /// to a sibling temp file and renamed over the old one.
    pub fn save(&self, tickets: &[Ticket]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_string_pretty(tickets)?;
        let temp_file = self.temp_path();
        std::fs::write(&temp_file, body)?;
        std::fs::rename(&temp_file, &self.path)?;
        debug!("Saved {} tickets to {}", tickets.len(), self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tickets.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[derive(Debug)]
pub struct TicketLedger {
    store: LedgerStore,
    tickets: Vec<Ticket>,
}

impl TicketLedger {
    /// Loads the persisted set and repairs records that break ledger
    /// invariants: later duplicates of an id are dropped and activity
    /// timestamps older than creation are clamped.
    pub fn open(store: LedgerStore) -> Self {
        let mut seen = HashSet::new();
        let mut tickets = Vec::new();

        for mut ticket in store.load() {
            if !seen.insert(ticket.id.clone()) {
                warn!("Dropping duplicate ledger record for ticket {}", ticket.id);
                continue;
            }
            if ticket.last_activity_at < ticket.created_at {
                ticket.last_activity_at = ticket.created_at;
            }
            tickets.push(ticket);
        }

        info!(
            "Loaded {} tickets from {}",
            tickets.len(),
            store.path().display()
        );
        Self { store, tickets }
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn ids(&self) -> Vec<String> {
        self.tickets.iter().map(|t| t.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Returns `false` and leaves the ledger untouched if `id` is already present.
    pub fn insert(&mut self, ticket: Ticket) -> bool {
        if self.contains(&ticket.id) {
            return false;
        }
        self.tickets.push(ticket);
        true
    }

    /// Unknown ids are ignored; the channel may have been deleted out-of-band.
    pub fn upsert_activity(&mut self, id: &str, timestamp_ms: i64) -> bool {
        match self.tickets.iter_mut().find(|t| t.id == id) {
            Some(ticket) => {
                ticket.last_activity_at = timestamp_ms
                    .max(ticket.last_activity_at)
                    .max(ticket.created_at);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Ticket> {
        let index = self.tickets.iter().position(|t| t.id == id)?;
        Some(self.tickets.remove(index))
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        self.store.save(&self.tickets)
    }
}
