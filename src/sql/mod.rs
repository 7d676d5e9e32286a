//! SQL script executor (`spec.md` §4.6) and its database tunnel.

pub mod executor;
pub mod tunnel;

pub use executor::{Executor, PlanBuilder};
pub use tunnel::Tunnel;

// vim: ts=4
