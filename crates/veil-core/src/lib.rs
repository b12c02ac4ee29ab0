//! # veil-core
//!
//! Foundation types and matching primitives for the Veil content filter.
//!
//! This crate provides the shared vocabulary that all other Veil crates depend on:
//!
//! - **Actions**: [`action::FilterAction`] (blur, hide, tag) and [`action::MlMethod`]
//! - **Trie matcher**: [`trie::Trie`] with boundary-aware whole-word scanning
//! - **Persisted units**: [`list::FilterList`] and [`subject::MlSubject`]
//! - **Inference settings**: [`inference::InferenceSettings`] provider selection
//! - **Store messages**: [`messages::StoreRequest`], [`messages::StoreNotification`]
//! - **Text helpers**: boundary test, ML preprocessing, content hashing
//! - **Logging**: [`logging::init_subscriber`] and test capture utilities
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other veil crates.

#![deny(unsafe_code)]

pub mod action;
pub mod inference;
pub mod list;
pub mod logging;
pub mod messages;
pub mod subject;
pub mod text;
pub mod trie;

pub use action::{FilterAction, MlMethod};
pub use inference::{EmbedType, InferenceSettings, LlmType};
pub use list::FilterList;
pub use messages::{StoreName, StoreNotification, StoreRequest, StoreResponse};
pub use subject::MlSubject;
pub use trie::{TextMatch, Trie, TrieNode};
