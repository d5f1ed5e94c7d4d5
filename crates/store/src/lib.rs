//! Relational persistence for challenges, submissions, votes and the
//! experience ledger.
//!
//! - [`Transactional`] and the repository traits describe what the workflow
//!   needs from storage
//! - [`TransactionManager`] runs a unit of work with guaranteed rollback
//! - [`MemoryStore`] and [`PgStore`] are the two backends
//! - [`SchemaRegistry`] collects table definitions explicitly at startup

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;
pub mod transaction;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, MemoryTx};
pub use postgres::PgStore;
pub use schema::{ModelSchema, SchemaRegistry};
pub use store::{
    ChallengeRepository, LedgerRepository, Store, SubmissionRepository, Transactional,
    VoteRepository,
};
pub use transaction::{TransactionError, TransactionManager};
