//! SOCKS5 proxy tunnel
//!
//! When a proxy is configured, the TCP stream the SSH handshake runs over is
//! opened by the proxy on our behalf. Without one, hosts are dialed directly
//! and this module never touches the proxy code path.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use sd_core::{ConnectionError, DeployError, HostTarget, ProxyDescriptor};

/// Byte stream to a host, possibly through a proxy
pub enum Transport {
    /// Plain TCP connection
    Direct(TcpStream),
    /// Connection relayed by a SOCKS5 proxy
    Socks5(Socks5Stream<TcpStream>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Direct(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Socks5(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Direct(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Socks5(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Direct(s) => Pin::new(s).poll_flush(cx),
            Transport::Socks5(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Direct(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Socks5(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Opens the raw byte stream an SSH session runs over
#[derive(Debug, Clone)]
pub enum Dialer {
    /// Connect straight to the host
    Direct,
    /// Ask a SOCKS5 proxy to connect for us
    Socks5(ProxyDescriptor),
}

impl Dialer {
    /// Pick the dialer for an optional proxy
    pub fn new(proxy: Option<ProxyDescriptor>) -> Self {
        match proxy {
            Some(proxy) => Dialer::Socks5(proxy),
            None => Dialer::Direct,
        }
    }

    /// Whether connections go through a proxy
    pub fn is_proxied(&self) -> bool {
        matches!(self, Dialer::Socks5(_))
    }

    /// Open a stream to `target`
    pub async fn dial(&self, target: &HostTarget) -> Result<Transport, DeployError> {
        match self {
            Dialer::Direct => {
                tracing::debug!("Dialing {} directly", target);
                let stream = TcpStream::connect((target.host.as_str(), target.port))
                    .await
                    .map_err(|e| ConnectionError::Unreachable {
                        address: target.address(),
                        message: e.to_string(),
                    })?;
                Ok(Transport::Direct(stream))
            }
            Dialer::Socks5(proxy) => {
                tracing::debug!("Dialing {} through proxy {}", target, proxy);
                let stream = Socks5Stream::connect_with_password(
                    (proxy.proxy_host.as_str(), proxy.proxy_port),
                    (target.host.as_str(), target.port),
                    &proxy.username,
                    &proxy.password,
                )
                .await
                .map_err(|e| proxy_error(proxy, target, e))?;
                Ok(Transport::Socks5(stream))
            }
        }
    }
}

fn proxy_error(
    proxy: &ProxyDescriptor,
    target: &HostTarget,
    err: tokio_socks::Error,
) -> DeployError {
    let auth_rejected = matches!(
        err,
        tokio_socks::Error::PasswordAuthFailure(_) | tokio_socks::Error::NoAcceptableAuthMethods
    );
    let message = if auth_rejected {
        format!("proxy rejected credentials for user '{}': {}", proxy.username, err)
    } else {
        format!("could not reach {} through proxy: {}", target, err)
    };

    DeployError::Proxy {
        proxy: proxy.address(),
        message,
        auth_rejected,
    }
}
