//! sd-core: Core abstractions and configuration for ssh-deploy
//!
//! This crate provides the job description, per-host results, the error
//! taxonomy and the transport traits shared by the deploy engine and CLI.

pub mod config;
pub mod error;
pub mod job;
pub mod outcome;
pub mod traits;
pub mod types;

pub use error::{ConfigError, ConnectionError, DeployError, ErrorKind};
pub use job::{Credentials, DeploymentJob, JobInputs};
pub use outcome::{DeployResult, DeployStep, FailureDetail, RunOutcome, StepReport};
pub use types::{parse_host_list, HostTarget, ProxyDescriptor};
