//! Reactive state store.
//!
//! Application state lives in declared, typed entries. Components subscribe to
//! the entries they derive from; assigning an entry recomputes its dependents.
//!
//! ```text
//!  set(focus) ──► commit ──► subscribers(focus) ──► set(rankedView) ─┐
//!                                                                    │ queued
//!                 commit ◄───────────────────────────────────────────┘
//!                   │
//!                   ▼
//!          subscribers(rankedView)
//! ```

mod key;
mod store;

pub use key::StateKey;
pub use store::{StateStore, SubscriberResult};
