//! Rhai expressions for conditional branches.
//!
//! Branch expressions are compiled once when a router is configured and
//! evaluated against every packet it receives:
//!
//! ```rhai
//! level == "error" && event.http.status >= 500
//! ```
//!
//! An expression that fails to evaluate (unknown variable, wrong type) is a
//! non-match for that packet.

pub mod engine;

pub use engine::{Condition, ExpressionEngine, CATCH_ALL};
