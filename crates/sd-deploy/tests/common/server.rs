//! In-process SSH server for exercising the real client
//!
//! Accepts one password, answers `exec` requests from a script and serves
//! an SFTP subsystem that keeps uploaded files in memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::{KeyPair, PublicKey};
use russh_sftp::protocol::{FileAttributes, Handle, OpenFlags, Status, StatusCode};
use tokio::net::TcpListener;

/// Reply to a command whose text contains `pattern`
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub pattern: &'static str,
    pub stdout: &'static str,
    pub stderr: &'static str,
    /// `None` closes the channel without reporting a status
    pub exit_status: Option<u32>,
}

/// Everything the server saw
#[derive(Default)]
pub struct ServerLog {
    pub auth_attempts: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub attributes: Mutex<HashMap<String, FileAttributes>>,
}

impl ServerLog {
    pub fn auth_attempts(&self) -> Vec<String> {
        self.auth_attempts.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn attributes(&self, path: &str) -> Option<FileAttributes> {
        self.attributes.lock().unwrap().get(path).cloned()
    }
}

/// A listening test server
pub struct TestServer {
    pub port: u16,
    pub log: Arc<ServerLog>,
}

impl TestServer {
    /// Start a server accepting `password` for any user
    pub async fn start(password: &'static str, script: Vec<ScriptedReply>) -> Self {
        let mut config = russh::server::Config {
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        };
        config
            .keys
            .push(KeyPair::generate_ed25519().expect("ed25519 host key"));
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let log = Arc::new(ServerLog::default());
        let script = Arc::new(script);

        let server_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = ServerHandler {
                    password,
                    script: Arc::clone(&script),
                    log: Arc::clone(&server_log),
                    channels: HashMap::new(),
                };
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    if let Ok(running) = russh::server::run_stream(config, socket, handler).await {
                        let _ = running.await;
                    }
                });
            }
        });

        Self { port, log }
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

struct ServerHandler {
    password: &'static str,
    script: Arc<Vec<ScriptedReply>>,
    log: Arc<ServerLog>,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

#[async_trait]
impl russh::server::Handler for ServerHandler {
    type Error = anyhow::Error;

    async fn auth_publickey(&mut self, user: &str, _key: &PublicKey) -> Result<Auth, Self::Error> {
        self.log
            .auth_attempts
            .lock()
            .unwrap()
            .push(format!("publickey:{}", user));
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.log
            .auth_attempts
            .lock()
            .unwrap()
            .push(format!("password:{}", user));
        if password == self.password {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.log.commands.lock().unwrap().push(command.clone());

        let reply = self
            .script
            .iter()
            .find(|r| command.contains(r.pattern))
            .cloned()
            .unwrap_or(ScriptedReply {
                pattern: "",
                stdout: "",
                stderr: "",
                exit_status: Some(0),
            });

        session.channel_success(channel);
        if !reply.stdout.is_empty() {
            session.data(channel, CryptoVec::from_slice(reply.stdout.as_bytes()));
        }
        if !reply.stderr.is_empty() {
            session.extended_data(channel, 1, CryptoVec::from_slice(reply.stderr.as_bytes()));
        }
        if let Some(status) = reply.exit_status {
            session.exit_status_request(channel, status);
        }
        session.eof(channel);
        session.close(channel);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match (name, self.channels.remove(&channel_id)) {
            ("sftp", Some(channel)) => {
                session.channel_success(channel_id);
                let sftp = MemorySftp {
                    log: Arc::clone(&self.log),
                    open: HashMap::new(),
                };
                russh_sftp::server::run(channel.into_stream(), sftp).await;
            }
            _ => session.channel_failure(channel_id),
        }
        Ok(())
    }
}

/// SFTP backend that stores files in the server log
struct MemorySftp {
    log: Arc<ServerLog>,
    open: HashMap<String, Vec<u8>>,
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

impl russh_sftp::server::Handler for MemorySftp {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        _pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        self.open.insert(filename.clone(), Vec::new());
        Ok(Handle {
            id,
            handle: filename,
        })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self.open.get_mut(&handle).ok_or(StatusCode::Failure)?;
        let start = offset as usize;
        if file.len() < start + data.len() {
            file.resize(start + data.len(), 0);
        }
        file[start..start + data.len()].copy_from_slice(&data);
        Ok(ok(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        let contents = self.open.remove(&handle).ok_or(StatusCode::Failure)?;
        self.log.files.lock().unwrap().insert(handle, contents);
        Ok(ok(id))
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.log.attributes.lock().unwrap().insert(path, attrs);
        Ok(ok(id))
    }
}
