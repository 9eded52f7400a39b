//! Tessera Types — canonical domain types for the temporal netting engine
//!
//! Zero dependencies on other `tessera-*` crates. Defines the complete
//! data model from the specification: identities, amounts, session-key
//! policy, trade intents, netting results, batch lifecycle state, and
//! the settlement/shadow-table projections.

pub mod action;
pub mod amount;
pub mod batch;
pub mod identity;
pub mod intent;
pub mod netting;
pub mod policy;
pub mod settlement;

pub use action::*;
pub use amount::*;
pub use batch::*;
pub use identity::*;
pub use intent::*;
pub use netting::*;
pub use policy::*;
pub use settlement::*;
