//! centi-core - Core library for Centi
//!
//! This crate contains the shared models, record store, sync engine, and
//! recurring-rule engine used by all Centi interfaces. Client shells own the
//! UI, navigation, and auth handshake; they drive this crate through
//! [`sync::SyncEngine`], [`recurring::RecurringRunner`], and the repository
//! traits in [`db`].

pub mod auth;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod recurring;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{AnnualTransaction, Category, ProfileSettings, RecurringRule, Transaction};
pub use state::SyncStatus;
