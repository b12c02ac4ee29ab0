//! # veil-inference
//!
//! Semantic classification for the Veil content filter.
//!
//! Decides whether free text is "about" a natural-language subject:
//!
//! - **Providers**: [`EmbeddingProvider`] and [`CompletionProvider`] traits with
//!   OpenAI-compatible HTTP clients ([`openai`]) and deterministic mocks ([`mock`])
//! - **Coalescing**: [`SingleFlight`] shares one in-flight computation per key;
//!   [`EmbeddingBatcher`] groups texts into batched embedding requests
//! - **Budget**: [`BudgetGuard`] checks the cost ledger before billed calls and
//!   records spend after them, priced by [`pricing`]
//! - **Classifier**: [`SemanticClassifier`] populates subjects, compares cosine
//!   similarity, and confirms with the LLM per the provider mode matrix
//!
//! ## Crate Position
//!
//! Depends on veil-core, veil-settings, and veil-store.
//! Depended on by veil-engine.

#![deny(unsafe_code)]

pub mod batcher;
pub mod budget;
pub mod classifier;
pub mod errors;
pub mod factory;
pub mod mock;
pub mod openai;
pub mod pricing;
pub mod prompts;
pub mod provider;
pub mod single_flight;
pub mod vector;

pub use batcher::EmbeddingBatcher;
pub use budget::BudgetGuard;
pub use classifier::SemanticClassifier;
pub use errors::{InferenceError, Result};
pub use factory::{HttpProviderFactory, InferenceSettingsProvider, ProviderFactory};
pub use provider::{Completion, CompletionProvider, EmbeddingBatch, EmbeddingProvider, Usage};
pub use single_flight::SingleFlight;
