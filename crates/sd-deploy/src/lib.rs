//! sd-deploy: concurrent multi-host deployment over SSH
//!
//! Packages a local directory once, then for every host (in parallel)
//! opens an SSH session, optionally through a SOCKS5 proxy, and runs the
//! reset / stage / upload / extract / clean sequence.

pub mod archive;
pub mod events;
pub mod orchestrator;
pub mod sequencer;
pub mod ssh;
pub mod tunnel;

pub use archive::{ArchiveError, Archiver, Artifact};
pub use events::DeployEvent;
pub use orchestrator::Orchestrator;
pub use sequencer::{DeployPlan, RemoteSequencer, SequenceOutcome};
pub use ssh::{HostKeyPolicy, SshConnector, SshSession};
pub use tunnel::{Dialer, Transport};
