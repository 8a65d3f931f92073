//! Per-model usage quota ledger.
//!
//! Tracks how many chat messages were sent with each model inside a rolling
//! window, resets windows lazily once their deadline passes, and reports the
//! remaining allowance. State lives behind a [`PersistenceAdapter`] so the
//! host decides where it is stored; the pure transition rules are in
//! [`LedgerState`].

pub mod catalog;
pub mod clock;
pub mod detect;
pub mod display;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod persistence;
pub mod state;

pub use catalog::{shortest_period, CatalogError, EntityKey, QuotaConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use detect::{detect_model, model_for_label};
pub use error::LedgerError;
pub use ledger::QuotaLedger;
pub use memory::MemoryStore;
pub use persistence::{
    decode_state, encode_state, ChangeOrigin, PersistenceAdapter, PersistenceError, StoreChange,
    StoreEntries,
};
pub use state::{
    LedgerState, LimitExceeded, QuotaRecord, RecordOutcome, UsageSnapshot, ValidationError,
    WindowTransition,
};
