//! Orchestration for the CLI
//!
//! 1. Session - load config, pick a resolver, compile the step graph
//! 2. Differ - render a plan's pending changes

pub mod differ;
pub mod session;

pub use session::{Findings, Session, SessionOptions};
