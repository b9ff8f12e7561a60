//! Per-host results and the aggregate run outcome

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{DeployError, ErrorKind};
use crate::types::HostTarget;

/// The fixed remote steps of a deployment, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStep {
    /// Wipe and recreate the target directory
    ResetTarget,
    /// Create the staging directory
    Stage,
    /// Copy the artifact into staging
    Upload,
    /// Unpack the artifact into the target directory
    Extract,
    /// Remove the staging directory
    CleanStaging,
}

impl DeployStep {
    /// Every step in the order it runs
    pub const SEQUENCE: [DeployStep; 5] = [
        DeployStep::ResetTarget,
        DeployStep::Stage,
        DeployStep::Upload,
        DeployStep::Extract,
        DeployStep::CleanStaging,
    ];

    /// Short name used in logs and output
    pub fn name(&self) -> &'static str {
        match self {
            DeployStep::ResetTarget => "reset",
            DeployStep::Stage => "stage",
            DeployStep::Upload => "upload",
            DeployStep::Extract => "extract",
            DeployStep::CleanStaging => "clean",
        }
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Timing for one completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: DeployStep,
    pub duration_seconds: f64,
}

/// Why a host failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    /// Step that was running when the failure happened, if any
    pub step: Option<DeployStep>,
    pub detail: String,
}

impl FailureDetail {
    /// Capture an error, optionally tagged with the step it interrupted
    pub fn from_error(error: &DeployError, step: Option<DeployStep>) -> Self {
        Self {
            kind: error.kind(),
            step,
            detail: error.to_string(),
        }
    }
}

/// Outcome of one host's attempt
///
/// `error` is present exactly when `success` is false; use the constructors
/// to keep it that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    #[serde(flatten)]
    pub target: HostTarget,
    pub success: bool,
    pub duration_seconds: f64,
    /// Time spent in the upload step, if it ran to completion
    pub upload_seconds: Option<f64>,
    /// Steps that completed, in order
    pub steps: Vec<StepReport>,
    pub error: Option<FailureDetail>,
}

impl DeployResult {
    /// A host that ran every step
    pub fn succeeded(target: HostTarget, duration: Duration, steps: Vec<StepReport>) -> Self {
        let upload_seconds = upload_time(&steps);
        Self {
            target,
            success: true,
            duration_seconds: duration.as_secs_f64(),
            upload_seconds,
            steps,
            error: None,
        }
    }

    /// A host that stopped on `failure`
    pub fn failed(
        target: HostTarget,
        duration: Duration,
        steps: Vec<StepReport>,
        failure: FailureDetail,
    ) -> Self {
        let upload_seconds = upload_time(&steps);
        Self {
            target,
            success: false,
            duration_seconds: duration.as_secs_f64(),
            upload_seconds,
            steps,
            error: Some(failure),
        }
    }

    /// Failure class, if the host failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

fn upload_time(steps: &[StepReport]) -> Option<f64> {
    steps
        .iter()
        .find(|s| s.step == DeployStep::Upload)
        .map(|s| s.duration_seconds)
}

/// Every host's result for one job, in host-list order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub results: Vec<DeployResult>,
    pub duration_seconds: f64,
}

impl RunOutcome {
    /// True when every host succeeded
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// Hosts that succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &DeployResult> {
        self.results.iter().filter(|r| r.success)
    }

    /// Hosts that failed
    pub fn failed(&self) -> impl Iterator<Item = &DeployResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(step: DeployStep, secs: f64) -> StepReport {
        StepReport {
            step,
            duration_seconds: secs,
        }
    }

    #[test]
    fn test_sequence_order() {
        let names: Vec<_> = DeployStep::SEQUENCE.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["reset", "stage", "upload", "extract", "clean"]);
    }

    #[test]
    fn test_succeeded_result_records_upload_time() {
        let result = DeployResult::succeeded(
            HostTarget::new("a.example.com", 22),
            Duration::from_millis(1500),
            vec![
                step(DeployStep::ResetTarget, 0.1),
                step(DeployStep::Upload, 1.2),
            ],
        );
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.upload_seconds, Some(1.2));
        assert_eq!(result.duration_seconds, 1.5);
    }

    #[test]
    fn test_failed_result_carries_detail() {
        let err = DeployError::Archive("zip exited with status 12".to_string());
        let result = DeployResult::failed(
            HostTarget::new("a.example.com", 22),
            Duration::ZERO,
            vec![],
            FailureDetail::from_error(&err, None),
        );
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::Archive));
        assert!(result.upload_seconds.is_none());
    }

    #[test]
    fn test_run_outcome_success_is_conjunction() {
        let ok = DeployResult::succeeded(HostTarget::new("a", 22), Duration::ZERO, vec![]);
        let bad = DeployResult::failed(
            HostTarget::new("b", 22),
            Duration::ZERO,
            vec![],
            FailureDetail::from_error(
                &DeployError::Timeout {
                    host: "b:22".to_string(),
                    timeout: Duration::from_secs(1),
                },
                None,
            ),
        );

        let outcome = RunOutcome {
            results: vec![ok.clone(), bad],
            duration_seconds: 1.0,
        };
        assert!(!outcome.is_success());
        assert_eq!(outcome.succeeded().count(), 1);
        assert_eq!(outcome.failed().count(), 1);

        let outcome = RunOutcome {
            results: vec![ok],
            duration_seconds: 1.0,
        };
        assert!(outcome.is_success());
    }

    #[test]
    fn test_result_json_shape() {
        let target = HostTarget::new("a.example.com", 22);
        let result = DeployResult::succeeded(target, Duration::ZERO, vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["host"], "a.example.com");
        assert_eq!(json["port"], 22);
        assert_eq!(json["success"], true);
        assert!(json["error"].is_null());
    }
}
