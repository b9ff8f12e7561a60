//! SSH session establishment over russh

mod connector;
mod handler;
mod session;

pub use connector::SshConnector;
pub use handler::HostKeyPolicy;
pub use session::SshSession;
