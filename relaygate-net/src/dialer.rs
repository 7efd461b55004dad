use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use openssl::ssl::SslConnector;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::resolver::{ResolveError, Resolver};
use crate::tls::{TlsError, build_connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialerConfig {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub keepalive: Option<Duration>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            keepalive: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("connect to {host} failed: {source}")]
    Connect { host: String, source: io::Error },
    #[error("connect to {host} timed out")]
    ConnectTimeout { host: String },
    #[error("tls handshake with {host} failed: {message}")]
    Handshake { host: String, message: String },
    #[error("tls handshake with {host} timed out")]
    HandshakeTimeout { host: String },
}

impl DialError {
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            DialError::Handshake { .. } | DialError::HandshakeTimeout { .. }
        )
    }
}

/// Opens upstream connections, trying each resolved address in order.
pub struct Dialer {
    resolver: Arc<Resolver>,
    config: DialerConfig,
    connector: SslConnector,
}

impl Dialer {
    pub fn new(resolver: Arc<Resolver>, config: DialerConfig) -> Result<Self, TlsError> {
        Ok(Self::with_connector(resolver, config, build_connector(&[])?))
    }

    pub fn with_connector(
        resolver: Arc<Resolver>,
        config: DialerConfig,
        connector: SslConnector,
    ) -> Self {
        Self {
            resolver,
            config,
            connector,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub async fn dial_plain(&self, host: &str, port: u16) -> Result<TcpStream, DialError> {
        let ips = self.resolver.resolve(host).await?;
        self.connect_any(host, &ips, port).await
    }

    pub async fn dial_tls(&self, host: &str, port: u16) -> Result<SslStream<TcpStream>, DialError> {
        let tcp = self.dial_plain(host, port).await?;
        let handshake_error = |message: String| DialError::Handshake {
            host: host.to_string(),
            message,
        };

        let ssl = self
            .connector
            .configure()
            .and_then(|config| config.into_ssl(host))
            .map_err(|err| handshake_error(err.to_string()))?;
        let mut stream = SslStream::new(ssl, tcp).map_err(|err| handshake_error(err.to_string()))?;

        match timeout(
            self.config.handshake_timeout,
            Pin::new(&mut stream).connect(),
        )
        .await
        {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(err)) => Err(handshake_error(err.to_string())),
            Err(_) => Err(DialError::HandshakeTimeout {
                host: host.to_string(),
            }),
        }
    }

    async fn connect_any(
        &self,
        host: &str,
        ips: &[IpAddr],
        port: u16,
    ) -> Result<TcpStream, DialError> {
        let mut last = None;
        for ip in ips {
            let addr = SocketAddr::new(*ip, port);
            match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    self.tune(&stream);
                    tracing::trace!(%host, %addr, "connected");
                    return Ok(stream);
                }
                Ok(Err(err)) => {
                    tracing::debug!(%host, %addr, error = %err, "connect failed");
                    last = Some(DialError::Connect {
                        host: host.to_string(),
                        source: err,
                    });
                }
                Err(_) => {
                    tracing::debug!(%host, %addr, "connect timed out");
                    last = Some(DialError::ConnectTimeout {
                        host: host.to_string(),
                    });
                }
            }
        }
        Err(last.unwrap_or_else(|| DialError::Connect {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses"),
        }))
    }

    fn tune(&self, stream: &TcpStream) {
        let _ = stream.set_nodelay(true);
        if let Some(idle) = self.config.keepalive {
            let keepalive = TcpKeepalive::new().with_time(idle);
            if let Err(err) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
                tracing::debug!(error = %err, "failed to enable keepalive");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::{DialError, Dialer, DialerConfig};
    use crate::resolver::{Network, Resolver};

    fn dialer(resolver: Resolver) -> Dialer {
        let config = DialerConfig {
            connect_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            keepalive: Some(Duration::from_secs(30)),
        };
        Dialer::new(Arc::new(resolver), config).unwrap()
    }

    #[tokio::test]
    async fn falls_through_to_next_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hi").await.unwrap();
        });

        // 127.0.0.2 is loopback too but nothing is bound there.
        let mut resolver = Resolver::new(Network::Tcp);
        resolver.set_host(
            "svc.test",
            vec![
                "127.0.0.2".parse::<IpAddr>().unwrap(),
                "127.0.0.1".parse::<IpAddr>().unwrap(),
            ],
        );
        let dialer = dialer(resolver);

        let mut stream = dialer.dial_plain("svc.test", port).await.unwrap();
        assert_eq!(
            stream.peer_addr().unwrap().ip(),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn refused_everywhere_is_a_connect_error() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = closed.local_addr().unwrap().port();
        drop(closed);

        let mut resolver = Resolver::new(Network::Tcp);
        resolver.set_host("svc.test", vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
        let dialer = dialer(resolver);
        assert_matches!(
            dialer.dial_plain("svc.test", dead_port).await,
            Err(DialError::Connect { .. })
        );
    }

    #[tokio::test]
    async fn unknown_host_is_a_resolve_error() {
        let dialer = dialer(Resolver::new(Network::Tcp));
        assert_matches!(
            dialer.dial_plain("missing.invalid", 80).await,
            Err(DialError::Resolve(_))
        );
    }

    #[tokio::test]
    async fn untrusted_server_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"not tls at all\r\n").await;
        });

        let dialer = dialer(Resolver::new(Network::Tcp));
        let result = dialer.dial_tls("127.0.0.1", port).await;
        assert_matches!(result, Err(err) if err.is_handshake());
    }
}
