// Quota Ledger: per-(content, identity, day) free-analysis accounting.
// The ledger exclusively owns its store; nothing else reads or writes records.

pub mod ledger;
pub mod models;
pub mod pg_store;
pub mod store;

pub use ledger::{spawn_eviction_task, QuotaLedger};
pub use models::{QuotaDecision, QuotaScope, QuotaUsage};
pub use pg_store::PgQuotaStore;
