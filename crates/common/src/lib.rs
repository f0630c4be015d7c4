//! Identifiers shared by every crate in the order fulfillment workspace.

mod types;

pub use types::AggregateId;
