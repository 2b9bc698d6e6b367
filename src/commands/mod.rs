//! Command implementations for kubectl-nuke

pub mod namespace;
pub mod pod;
