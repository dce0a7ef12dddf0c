//! The TTL store adapter.
//!
//! All entity reads and writes go through [`Storage`]; it owns TTL
//! computation, index maintenance, and expiry reconciliation. See
//! [`adapter`] for the operations, [`reconcile`] for the lazy index
//! cleanup, [`transaction`] for atomic multi-key batches, and
//! [`scripts`] for the server-side atomic admission and state
//! advancement.

mod adapter;
mod reconcile;
pub(crate) mod scripts;
mod transaction;

pub use adapter::Storage;
pub use transaction::Transaction;

/// Current unix time in seconds. All TTL math derives from this.
pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
