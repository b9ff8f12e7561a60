//! Deployment orchestrator
//!
//! Packages the source once, then runs one independent attempt per host.
//! Every attempt is its own tokio task and ends in a `DeployResult` no
//! matter how it fails; one host never delays or cancels another.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::Instrument;

use sd_core::config::DeployConfig;
use sd_core::traits::{RemoteSession, SessionConnector};
use sd_core::{
    DeployError, DeployResult, DeploymentJob, FailureDetail, HostTarget, RunOutcome, StepReport,
};

use crate::archive::{Archiver, Artifact};
use crate::events::DeployEvent;
use crate::sequencer::{DeployPlan, RemoteSequencer};
use crate::ssh::SshConnector;

/// Runs a deployment job across all of its hosts
pub struct Orchestrator<C: SessionConnector> {
    connector: Arc<C>,
    config: DeployConfig,
    events: Option<mpsc::Sender<DeployEvent>>,
}

impl Orchestrator<SshConnector> {
    /// Orchestrator that reaches hosts over SSH with the job's credentials
    pub fn ssh(job: &DeploymentJob, config: DeployConfig) -> Self {
        let connector = SshConnector::from_job(job, &config);
        Self::new(connector, config)
    }
}

impl<C: SessionConnector + 'static> Orchestrator<C> {
    /// Create an orchestrator around a connector
    pub fn new(connector: C, config: DeployConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            events: None,
        }
    }

    /// Send progress events to `events`
    pub fn with_events(mut self, events: mpsc::Sender<DeployEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Package the source directory and deploy it to every host
    ///
    /// If packaging fails, every host is reported as failed with an archive
    /// error and no connection is attempted.
    pub async fn run(&self, job: &DeploymentJob) -> RunOutcome {
        let started = Instant::now();
        let archiver = Archiver::new(self.config.archive.clone());

        match archiver.create(&job.source_dir).await {
            Ok(artifact) => {
                let mut outcome = self.run_with_artifact(job, Arc::new(artifact)).await;
                outcome.duration_seconds = started.elapsed().as_secs_f64();
                outcome
            }
            Err(e) => {
                let error = DeployError::from(e);
                tracing::error!("Packaging {:?} failed: {}", job.source_dir, error);

                let mut results = Vec::with_capacity(job.hosts.len());
                for target in &job.hosts {
                    let result = DeployResult::failed(
                        target.clone(),
                        Duration::ZERO,
                        Vec::new(),
                        FailureDetail::from_error(&error, None),
                    );
                    self.emit(DeployEvent::AttemptFinished(result.clone())).await;
                    results.push(result);
                }

                RunOutcome {
                    results,
                    duration_seconds: started.elapsed().as_secs_f64(),
                }
            }
        }
    }

    /// Deploy an already packaged artifact to every host concurrently
    ///
    /// Results come back in host-list order.
    pub async fn run_with_artifact(
        &self,
        job: &DeploymentJob,
        artifact: Arc<Artifact>,
    ) -> RunOutcome {
        let started = Instant::now();
        let plan = Arc::new(DeployPlan::new(&job.target_dir, &self.config, artifact));
        let deadline = self.config.attempt_deadline();

        tracing::info!(
            "Deploying {} to {} host(s) at {}",
            plan.artifact().file_name,
            job.hosts.len(),
            plan.target_dir()
        );

        let handles: Vec<_> = job
            .hosts
            .iter()
            .cloned()
            .map(|target| {
                let span = tracing::info_span!("deploy", host = %target);
                let attempt = run_attempt(
                    Arc::clone(&self.connector),
                    Arc::clone(&plan),
                    target,
                    deadline,
                    self.events.clone(),
                );
                tokio::spawn(attempt.instrument(span))
            })
            .collect();

        let joined = join_all(handles).await;

        let mut results = Vec::with_capacity(joined.len());
        for (target, joined) in job.hosts.iter().zip(joined) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Deployment task for {} died: {}", target, e);
                    let error = DeployError::Aborted {
                        host: target.address(),
                        message: e.to_string(),
                    };
                    let result = DeployResult::failed(
                        target.clone(),
                        Duration::ZERO,
                        Vec::new(),
                        FailureDetail::from_error(&error, None),
                    );
                    self.emit(DeployEvent::AttemptFinished(result.clone())).await;
                    result
                }
            };
            results.push(result);
        }

        RunOutcome {
            results,
            duration_seconds: started.elapsed().as_secs_f64(),
        }
    }

    async fn emit(&self, event: DeployEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }
}

/// One host's attempt; never fails, only reports
async fn run_attempt<C: SessionConnector>(
    connector: Arc<C>,
    plan: Arc<DeployPlan>,
    target: HostTarget,
    deadline: Option<Duration>,
    events: Option<mpsc::Sender<DeployEvent>>,
) -> DeployResult {
    let started = Instant::now();
    if let Some(events) = &events {
        let _ = events
            .send(DeployEvent::AttemptStarted {
                target: target.clone(),
            })
            .await;
    }
    tracing::info!("Deploying to {}", target);

    let attempt = deploy_host(connector.as_ref(), &plan, &target, events.as_ref());
    let (steps, failure) = match deadline {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(finished) => finished,
            Err(_) => {
                let error = DeployError::Timeout {
                    host: target.address(),
                    timeout: limit,
                };
                (Vec::new(), Some(FailureDetail::from_error(&error, None)))
            }
        },
        None => attempt.await,
    };

    let elapsed = started.elapsed();
    let result = match failure {
        None => {
            tracing::info!("Deployed to {} in {:.2}s", target, elapsed.as_secs_f64());
            DeployResult::succeeded(target, elapsed, steps)
        }
        Some(failure) => {
            tracing::warn!(
                "Deployment to {} failed after {:.2}s: {}",
                target,
                elapsed.as_secs_f64(),
                failure.detail
            );
            DeployResult::failed(target, elapsed, steps, failure)
        }
    };

    if let Some(events) = &events {
        let _ = events.send(DeployEvent::AttemptFinished(result.clone())).await;
    }
    result
}

/// Connect, run the sequence and always close the session afterwards
async fn deploy_host<C: SessionConnector>(
    connector: &C,
    plan: &DeployPlan,
    target: &HostTarget,
    events: Option<&mpsc::Sender<DeployEvent>>,
) -> (Vec<StepReport>, Option<FailureDetail>) {
    let mut session = match connector.connect(target).await {
        Ok(session) => session,
        Err(e) => return (Vec::new(), Some(FailureDetail::from_error(&e, None))),
    };

    let mut sequencer = RemoteSequencer::new(plan);
    if let Some(events) = events {
        sequencer = sequencer.with_events(events);
    }
    let outcome = sequencer.run(&mut session).await;

    if let Err(e) = session.close().await {
        tracing::debug!("Closing session to {} failed: {}", target, e);
    }

    tracing::debug!("Sequence on {} took {:?}", target, outcome.duration);
    let failure = outcome
        .failure
        .map(|(step, error)| FailureDetail::from_error(&error, Some(step)));
    (outcome.steps, failure)
}
