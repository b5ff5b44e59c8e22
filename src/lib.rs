//! Discord support-ticket bot: private ticket channels with a fixed lifetime,
//! an inactivity sweep and a restart-safe JSON ledger.

pub mod catalog;
pub mod channels;
pub mod core;
pub mod main_module;
pub mod tickets;
