//! Second-order trigger helpers
//!
//! Injected payloads fire when someone, or something, renders them. These
//! modules help make that happen: the active prober requests the endpoints
//! where stored payloads typically surface, and the suggestion engine tells
//! a human where to look based on what was injected.

pub mod active;
pub mod suggest;

pub use active::{ActiveTrigger, TriggerResult, TRIGGER_ENDPOINTS};
pub use suggest::{Likelihood, TriggerSuggester, TriggerSuggestion};
