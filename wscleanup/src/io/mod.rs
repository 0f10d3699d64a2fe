//! Side-effecting operations: filesystem scanning and removal, child
//! processes, configuration loading, and job-runner adapters.

pub mod build;
pub mod config;
pub mod deferred;
pub mod delete;
pub mod process;
pub mod scan;
