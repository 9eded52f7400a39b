pub mod balance;
pub mod batch;
pub mod inventory;
pub mod pending;
pub mod proof;
pub mod submit;

pub use balance::BalanceResponse;
pub use batch::BatchResponse;
pub use inventory::{InventoryItem, InventoryResponse};
pub use pending::PendingResponse;
pub use proof::ProofResponse;
pub use submit::{SubmitIntentRequest, SubmitIntentResponse};
