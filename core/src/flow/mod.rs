// escrow/src/flow/mod.rs

//! Defines `TransitionFlow<TData>`, its construction and its execution.

pub mod definition;
pub mod execution;

pub use definition::TransitionFlow;
