// ============================================================================
// Transaction Handles
// ============================================================================
//
// Transactions are owned by the caller; this module only defines the opaque
// handle threaded through every storage call.
//
// ============================================================================

pub mod state;

pub use state::{TransactionContext, TransactionId};
