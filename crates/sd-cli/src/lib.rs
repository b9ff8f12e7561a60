//! ssh-deploy: command-line front end
//!
//! Collects job inputs from flags and `INPUT_*` environment variables,
//! runs the deployment and reports per-host results.

pub mod cli;
pub mod output;
