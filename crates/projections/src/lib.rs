//! Decision state of an order, derived from its event log.
//!
//! [`OrderProjection`] folds an ordered history into an [`OrderState`]. The
//! fold is pure: the same history always yields the same state, so it
//! serves both live decisions in the saga and audit replays.

pub mod error;
pub mod order_state;
pub mod projection;

pub use error::{ProjectionError, Result};
pub use order_state::OrderState;
pub use projection::OrderProjection;
