//! kubectl-nuke: force-delete stuck namespaces and pods

pub mod commands;
pub mod config;
pub mod engine;
pub mod k8s;
pub mod utils;
