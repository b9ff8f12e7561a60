//! Progress events emitted while a job runs

use std::time::Duration;

use sd_core::{DeployResult, DeployStep, HostTarget};

/// Progress notification from a running deployment
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// An attempt for a host has begun
    AttemptStarted { target: HostTarget },
    /// A remote step completed
    StepFinished {
        target: HostTarget,
        step: DeployStep,
        duration: Duration,
    },
    /// An attempt finished, successfully or not
    AttemptFinished(DeployResult),
}
