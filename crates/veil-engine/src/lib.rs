//! # veil-engine
//!
//! Keeps a page's visual filtering consistent with the user's filter lists,
//! subjects, and preferences while the page mutates.
//!
//! - [`dom`]: the [`PageDom`] seam and the in-memory [`MemoryDom`]
//! - [`effects`]: reversible blur/hide/tag treatments
//! - [`lexical`]: cached trie-backed filter sets
//! - [`region`] and [`site`]: which elements are candidates
//! - [`reconciler`]: one reconciliation pass over the candidates
//! - [`stats`]: per-word hit deltas flushed to the store
//! - [`session`]: the event loop that debounces mutations and drives passes
//!
//! ## Crate Position
//!
//! Top of the stack. Depends on veil-core, veil-settings, veil-store, and
//! veil-inference.

#![deny(unsafe_code)]

pub mod debounce;
pub mod dom;
pub mod effects;
pub mod errors;
pub mod lexical;
pub mod reconciler;
pub mod region;
pub mod session;
pub mod site;
pub mod state;
pub mod stats;

pub use dom::{ElementId, MemoryDom, PageDom, Rect, Tooltip, TooltipAction};
pub use errors::{EngineError, Result};
pub use lexical::FilterSets;
pub use reconciler::{PassReport, Reconciler};
pub use region::RegionHeuristic;
pub use session::{FilterSession, PageEvent, SessionSummary};
pub use site::{GenericSiteSupport, SelectorSiteSupport, SiteSupport};
pub use state::{FilterCause, FilterState, FilteredEntry};
pub use stats::StatsAggregator;
