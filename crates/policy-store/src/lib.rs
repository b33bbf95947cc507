//! Persistence for the policy issuance engine.
//!
//! This crate provides:
//! - The [`PolicyStore`] trait over orders, policies, read-only reference data
//!   and the outbox
//! - An in-memory implementation for tests and the default binary
//! - A PostgreSQL implementation using sqlx
//!
//! Creating an order and its policy happens in one unit of work; status
//! updates only move forward.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryPolicyStore, ReferenceData};
pub use outbox::{OutboxTask, TaskKind, TaskStatus};
pub use postgres::PgPolicyStore;
pub use store::{
    Activation, CreatedIssuance, NewIssuance, NewOrder, NewPolicy, PolicyStore, PolicyStoreExt,
    StatusUpdate, check_order_transition, check_policy_transition,
};
