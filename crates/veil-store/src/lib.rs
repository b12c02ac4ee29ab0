//! # veil-store
//!
//! Persistence for the Veil content filter.
//!
//! - [`KeyValueStore`]: async `get`/`set`/`delete`/`getAll` over named stores,
//!   with [`MemoryStore`] and [`SqliteStore`] backends
//! - [`StoreGateway`]: the single entry point; dispatches [`StoreRequest`]s and
//!   broadcasts a [`StoreNotification`] for every mutation
//! - Typed repositories used by the engine and by editing surfaces:
//!   [`FilterListRepository`], [`SubjectRepository`], [`PreferencesRepository`],
//!   [`BlacklistRepository`], [`WordStatsRepository`], [`LedgerRepository`]
//!
//! No locking spans multiple keys: each key is last-write-wins.
//!
//! [`StoreRequest`]: veil_core::StoreRequest
//! [`StoreNotification`]: veil_core::StoreNotification

#![deny(unsafe_code)]

pub mod blacklist;
pub mod bus;
pub mod errors;
pub mod gateway;
pub mod kv;
pub mod ledger;
pub mod lists;
pub mod memory;
pub mod preferences;
pub mod sqlite;
pub mod stats;
pub mod subjects;

pub use blacklist::BlacklistRepository;
pub use bus::ChangeBus;
pub use errors::{Result, StoreError};
pub use gateway::StoreGateway;
pub use kv::KeyValueStore;
pub use ledger::{CostLedger, CostLedgerStore, LedgerRepository, ResetInterval};
pub use lists::FilterListRepository;
pub use memory::MemoryStore;
pub use preferences::PreferencesRepository;
pub use sqlite::SqliteStore;
pub use stats::WordStatsRepository;
pub use subjects::SubjectRepository;
