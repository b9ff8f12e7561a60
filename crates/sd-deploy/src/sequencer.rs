//! Remote deploy sequencer
//!
//! Runs the fixed step list over one session:
//!
//! 1. reset: `mkdir -p T && rm -rf T && mkdir -p T`
//! 2. stage: `mkdir -p T/tmp`
//! 3. upload the artifact into `T/tmp`
//! 4. extract: `unzip -o -q T/tmp/<artifact> -d T`
//! 5. clean: `rm -rf T/tmp`
//!
//! The first failing step ends the sequence. Nothing already done is rolled
//! back, so a failed extract leaves a reset target with the staging
//! directory still in it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use sd_core::config::DeployConfig;
use sd_core::traits::RemoteSession;
use sd_core::{DeployError, DeployStep, StepReport};

use crate::archive::Artifact;
use crate::events::DeployEvent;

/// Quote a string for a POSIX shell
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Remote paths and commands for one job
#[derive(Debug, Clone)]
pub struct DeployPlan {
    target_dir: String,
    staging_dir: String,
    extract_program: String,
    artifact: Arc<Artifact>,
}

impl DeployPlan {
    /// Build a plan for deploying `artifact` into `target_dir`
    pub fn new(target_dir: &str, config: &DeployConfig, artifact: Arc<Artifact>) -> Self {
        let target_dir = target_dir.trim_end_matches('/').to_string();
        let staging_dir = format!("{}/{}", target_dir, config.staging_dir_name);
        Self {
            target_dir,
            staging_dir,
            extract_program: config.extract_program.clone(),
            artifact,
        }
    }

    /// Remote target directory
    pub fn target_dir(&self) -> &str {
        &self.target_dir
    }

    /// Remote staging directory
    pub fn staging_dir(&self) -> &str {
        &self.staging_dir
    }

    /// The artifact being deployed
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Where the artifact lands on the remote host
    pub fn remote_archive_path(&self) -> String {
        format!("{}/{}", self.staging_dir, self.artifact.file_name)
    }

    /// Shell command for a step, `None` for the upload step
    pub fn command(&self, step: DeployStep) -> Option<String> {
        let target = shell_quote(&self.target_dir);
        let staging = shell_quote(&self.staging_dir);

        match step {
            DeployStep::ResetTarget => Some(format!(
                "mkdir -p {t} && rm -rf {t} && mkdir -p {t}",
                t = target
            )),
            DeployStep::Stage => Some(format!("mkdir -p {}", staging)),
            DeployStep::Upload => None,
            DeployStep::Extract => Some(format!(
                "{} -o -q {} -d {}",
                self.extract_program,
                shell_quote(&self.remote_archive_path()),
                target
            )),
            DeployStep::CleanStaging => Some(format!("rm -rf {}", staging)),
        }
    }
}

/// What happened when the steps ran
#[derive(Debug)]
pub struct SequenceOutcome {
    /// Completed steps, in order
    pub steps: Vec<StepReport>,
    /// The step that failed and why
    pub failure: Option<(DeployStep, DeployError)>,
    /// Wall time of the whole sequence
    pub duration: Duration,
}

impl SequenceOutcome {
    /// Whether every step completed
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs a `DeployPlan` over one session
pub struct RemoteSequencer<'a> {
    plan: &'a DeployPlan,
    events: Option<&'a mpsc::Sender<DeployEvent>>,
}

impl<'a> RemoteSequencer<'a> {
    /// Create a sequencer for `plan`
    pub fn new(plan: &'a DeployPlan) -> Self {
        Self { plan, events: None }
    }

    /// Report each completed step on `events`
    pub fn with_events(mut self, events: &'a mpsc::Sender<DeployEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run every step in order, stopping at the first failure
    pub async fn run<S: RemoteSession + ?Sized>(&self, session: &mut S) -> SequenceOutcome {
        let started = Instant::now();
        let mut steps = Vec::with_capacity(DeployStep::SEQUENCE.len());

        for step in DeployStep::SEQUENCE {
            let step_started = Instant::now();
            let result = self.run_step(step, session).await;
            let elapsed = step_started.elapsed();

            if let Err(error) = result {
                tracing::warn!("Step {} failed on {}: {}", step, session.target(), error);
                return SequenceOutcome {
                    steps,
                    failure: Some((step, error)),
                    duration: started.elapsed(),
                };
            }

            tracing::debug!("Step {} on {} took {:?}", step, session.target(), elapsed);
            steps.push(StepReport {
                step,
                duration_seconds: elapsed.as_secs_f64(),
            });

            if let Some(events) = self.events {
                let _ = events
                    .send(DeployEvent::StepFinished {
                        target: session.target().clone(),
                        step,
                        duration: elapsed,
                    })
                    .await;
            }
        }

        SequenceOutcome {
            steps,
            failure: None,
            duration: started.elapsed(),
        }
    }

    async fn run_step<S: RemoteSession + ?Sized>(
        &self,
        step: DeployStep,
        session: &mut S,
    ) -> Result<(), DeployError> {
        match self.plan.command(step) {
            Some(command) => {
                let output = session.exec(&command).await?;
                if output.success() {
                    Ok(())
                } else {
                    Err(DeployError::RemoteCommand {
                        host: session.target().address(),
                        command,
                        exit_status: output.exit_status,
                        stderr: output.diagnostic(),
                    })
                }
            }
            None => {
                let artifact = self.plan.artifact();
                let bytes = session
                    .upload(&artifact.path, self.plan.staging_dir())
                    .await?;
                tracing::info!(
                    "Uploaded {} ({} bytes) to {}:{}",
                    artifact.file_name,
                    bytes,
                    session.target(),
                    self.plan.staging_dir()
                );
                Ok(())
            }
        }
    }
}
