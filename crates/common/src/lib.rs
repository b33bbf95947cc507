//! Identifier types shared across the issuance workspace.

mod types;

pub use types::{OrderId, PolicyId, TaskId};
