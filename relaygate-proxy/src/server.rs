use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

use openssl::ssl::Ssl;
use relaygate_net::{
    Dialer, DialerConfig, HttpVersion, LeafCache, LeafIssuer, Limits, Network, ParseStatus,
    Request, RequestParser, Resolver, Response, build_acceptor, serialize_response,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::config::{NetworkConfig, ProxyConfig, Timeouts};
use crate::envelope::ProxyRequest;
use crate::error::{ProxyError, TimeoutKind};
use crate::filter::{ConnectionClaim, FilterContext};
use crate::filters::{
    AccessLogFilter, ForceSecureFilter, HopByHopFilter, InterceptFilter, StripFilter,
};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::relay::{RelayFilter, RelayPool};
use crate::rules::Policy;
use crate::upstream::fetch_direct;

const READ_CHUNK: usize = 16 * 1024;
const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Everything a connection task needs, built once and shared read-only.
pub struct ProxyState {
    pub pipeline: Pipeline,
    pub dialer: Arc<Dialer>,
    pub leaves: Arc<LeafCache>,
    pub policy: Arc<Policy>,
    pub relay_pool: Arc<RelayPool>,
    pub timeouts: Timeouts,
    pub limits: Limits,
    pub max_replay_body_bytes: usize,
}

impl ProxyState {
    /// Assembles the resolver, dialer, rule sets, relay pool and the standard
    /// filter chain from `config`.
    pub fn from_config(
        config: &ProxyConfig,
        issuer: Arc<dyn LeafIssuer>,
    ) -> Result<Self, ProxyError> {
        let resolver = build_resolver(config)?;
        let timeouts = config.timeouts.resolve();
        let dialer = Dialer::new(
            Arc::new(resolver),
            DialerConfig {
                connect_timeout: timeouts.connect,
                handshake_timeout: timeouts.handshake,
                keepalive: timeouts.keepalive,
            },
        )
        .map_err(|err| ProxyError::Config(err.to_string()))?;
        Self::with_dialer(config, issuer, Arc::new(dialer))
    }

    pub fn with_dialer(
        config: &ProxyConfig,
        issuer: Arc<dyn LeafIssuer>,
        dialer: Arc<Dialer>,
    ) -> Result<Self, ProxyError> {
        let timeouts = config.timeouts.resolve();
        let limits = Limits::default();
        let policy = Arc::new(Policy::from_config(config)?);
        let relay_pool = Arc::new(RelayPool::from_config(&config.relay)?);

        let mut pipeline = Pipeline::new();
        pipeline.push_request(Arc::new(ForceSecureFilter::new(Arc::clone(&policy))));
        pipeline.push_request(Arc::new(StripFilter::new(Arc::clone(&policy))));
        pipeline.push_request(Arc::new(InterceptFilter::new(Arc::clone(&policy))));
        pipeline.push_request(Arc::new(RelayFilter::new(
            Arc::clone(&policy),
            Arc::clone(&relay_pool),
            Arc::clone(&dialer),
            &config.relay,
            timeouts,
            limits,
        )));
        pipeline.push_response(Arc::new(HopByHopFilter));
        pipeline.push_response(Arc::new(AccessLogFilter));

        Ok(Self {
            pipeline,
            dialer,
            leaves: Arc::new(LeafCache::new(issuer, config.leaf_validity())),
            policy,
            relay_pool,
            timeouts,
            limits,
            max_replay_body_bytes: config.relay.max_replay_body_bytes,
        })
    }
}

/// Resolver table from the `[resolver]` section.
fn build_resolver(config: &ProxyConfig) -> Result<Resolver, ProxyError> {
    let network = match config.resolver.network {
        NetworkConfig::Tcp => Network::Tcp,
        NetworkConfig::Tcp4 => Network::Tcp4,
        NetworkConfig::Tcp6 => Network::Tcp6,
    };
    let mut resolver = Resolver::new(network);
    for (name, ips) in &config.resolver.hosts {
        let ips = ips
            .iter()
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .map_err(|err| ProxyError::Config(format!("resolver host {name}: {ip}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        resolver.set_host(name, ips);
    }
    for (pattern, alias) in &config.resolver.cnames {
        resolver
            .set_cname(pattern, alias)
            .map_err(|err| ProxyError::Config(err.to_string()))?;
    }
    Ok(resolver)
}

enum Session {
    Closed,
    Claimed(ConnectionClaim),
}

pub struct ProxyServer {
    state: Arc<ProxyState>,
}

impl ProxyServer {
    pub fn new(state: ProxyState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    /// Accepts connections until the listener fails, one task per client.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProxyError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "proxy listening");
        }
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(state, stream, peer).await {
                    tracing::debug!(%peer, error = %err, "connection closed with error");
                }
            });
        }
    }
}

async fn handle_connection(
    state: Arc<ProxyState>,
    mut client: TcpStream,
    peer: SocketAddr,
) -> Result<(), ProxyError> {
    let _ = client.set_nodelay(true);
    let mut parser = RequestParser::with_limits(state.limits);
    match serve_requests(&state, &mut client, &mut parser, Some(peer), None).await? {
        Session::Closed => Ok(()),
        Session::Claimed(ConnectionClaim::Mitm { host, port }) => {
            let early = parser.take_buffered();
            intercept(&state, client, early, &host, port, peer).await
        }
        Session::Claimed(ConnectionClaim::RawRelay { host, port }) => {
            let early = parser.take_buffered();
            raw_relay(&state, client, early, &host, port).await
        }
    }
}

/// Request loop for one client connection, plain or decrypted. Returns when
/// the client is done or a CONNECT claims the connection.
async fn serve_requests<S>(
    state: &ProxyState,
    client: &mut S,
    parser: &mut RequestParser,
    peer: Option<SocketAddr>,
    tunnel: Option<&str>,
) -> Result<Session, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let wire = match read_request(state, client, parser, &mut buffer).await {
            Ok(Some(wire)) => wire,
            Ok(None) => return Ok(Session::Closed),
            Err(err @ ProxyError::Parse(_)) => {
                reject(state, client, &err).await?;
                return Ok(Session::Closed);
            }
            Err(err) => return Err(err),
        };
        let keep_alive = wire.keep_alive();
        let ctx = FilterContext::new(peer, tunnel.map(str::to_string));

        let mut request =
            match ProxyRequest::from_wire(wire, tunnel, state.max_replay_body_bytes) {
                Ok(request) => request,
                Err(err) => {
                    reject(state, client, &err).await?;
                    return Ok(Session::Closed);
                }
            };
        if tunnel.is_some() && request.is_connect() {
            let err = ProxyError::Parse("CONNECT inside an intercepted tunnel".into());
            reject(state, client, &err).await?;
            return Ok(Session::Closed);
        }
        tracing::debug!(request_id = %ctx.id, method = %request.method, url = %request.url, "request");

        let mut response = match state.pipeline.run_request(&ctx, &mut request).await {
            Ok(PipelineOutcome::Respond(response)) => response,
            Ok(PipelineOutcome::Claim(claim)) => return Ok(Session::Claimed(claim)),
            Ok(PipelineOutcome::Forward) if request.is_connect() => {
                return Ok(Session::Claimed(ConnectionClaim::RawRelay {
                    host: request.host().to_string(),
                    port: request.port(),
                }));
            }
            Ok(PipelineOutcome::Forward) => {
                match fetch_direct(&state.dialer, &mut request, &state.timeouts, state.limits)
                    .await
                {
                    Ok(response) => response,
                    Err(err) => error_response(&ctx, err)?,
                }
            }
            Err(err) => error_response(&ctx, err)?,
        };

        if let Err(err) = state
            .pipeline
            .run_response(&ctx, &request, &mut response)
            .await
        {
            response = error_response(&ctx, err)?;
        }

        write_response(state, client, &request.method, response, keep_alive).await?;
        if !keep_alive {
            return Ok(Session::Closed);
        }
    }
}

async fn read_request<S>(
    state: &ProxyState,
    client: &mut S,
    parser: &mut RequestParser,
    buffer: &mut [u8],
) -> Result<Option<Request>, ProxyError>
where
    S: AsyncRead + Unpin,
{
    let mut status = parser.push(&[]);
    let mut idle = true;
    loop {
        match status {
            ParseStatus::Complete { message, .. } => return Ok(Some(message)),
            ParseStatus::Error { error, .. } => return Err(ProxyError::Parse(error.to_string())),
            ParseStatus::NeedMore { .. } => {}
        }
        let n = match timeout(state.timeouts.read_write, client.read(buffer)).await {
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(ProxyError::ClientIo(err)),
            Err(_) if idle => return Ok(None),
            Err(_) => return Err(ProxyError::Timeout(TimeoutKind::ReadWrite)),
        };
        idle = false;
        status = parser.push(&buffer[..n]);
    }
}

fn error_response(ctx: &FilterContext, err: ProxyError) -> Result<Response, ProxyError> {
    match err.to_response() {
        Some(response) => {
            tracing::warn!(request_id = %ctx.id, error = %err, "request failed");
            Ok(response)
        }
        None => Err(err),
    }
}

async fn reject<S>(state: &ProxyState, client: &mut S, err: &ProxyError) -> Result<(), ProxyError>
where
    S: AsyncWrite + Unpin,
{
    tracing::debug!(error = %err, "rejecting request");
    match err.to_response() {
        Some(response) => write_response(state, client, "GET", response, false).await,
        None => Ok(()),
    }
}

/// Re-frames `response` for the client with an explicit length and writes it.
async fn write_response<S>(
    state: &ProxyState,
    client: &mut S,
    method: &str,
    mut response: Response,
    keep_alive: bool,
) -> Result<(), ProxyError>
where
    S: AsyncWrite + Unpin,
{
    frame_for_client(method, &mut response, keep_alive);
    let bytes = serialize_response(&response);
    match timeout(state.timeouts.read_write, async {
        client.write_all(&bytes).await?;
        client.flush().await
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ProxyError::ClientIo(err)),
        Err(_) => Err(ProxyError::Timeout(TimeoutKind::ReadWrite)),
    }
}

fn frame_for_client(method: &str, response: &mut Response, keep_alive: bool) {
    response.line.version = HttpVersion::Http11;
    response.remove_header("transfer-encoding");
    let status = response.line.status_code;
    if method == "HEAD" {
        response.body.clear();
    } else if (100..200).contains(&status) || status == 204 || status == 304 {
        response.body.clear();
        response.remove_header("content-length");
    } else {
        response.set_header("Content-Length", response.body.len().to_string());
    }
    response.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });
}

/// Terminates the client's TLS with a forged leaf for `host` and serves the
/// decrypted requests. Issuance failure falls back to an opaque tunnel.
async fn intercept(
    state: &ProxyState,
    mut client: TcpStream,
    early: Vec<u8>,
    host: &str,
    port: u16,
    peer: SocketAddr,
) -> Result<(), ProxyError> {
    let acceptor = match state.leaves.leaf_for(host).await {
        Ok(leaf) => build_acceptor(&leaf),
        Err(err) => Err(err),
    };
    let acceptor = match acceptor {
        Ok(acceptor) => acceptor,
        Err(err) => {
            let err = ProxyError::CertIssue {
                host: host.to_string(),
                message: err.to_string(),
            };
            tracing::warn!(error = %err, "falling back to raw relay");
            return raw_relay(state, client, early, host, port).await;
        }
    };
    if !early.is_empty() {
        return Err(ProxyError::Parse(
            "client sent data before the tunnel was established".into(),
        ));
    }

    client
        .write_all(CONNECT_ESTABLISHED)
        .await
        .map_err(ProxyError::ClientIo)?;

    let handshake_error = |message: String| ProxyError::Handshake {
        host: host.to_string(),
        message,
    };
    let ssl = Ssl::new(acceptor.context()).map_err(|err| handshake_error(err.to_string()))?;
    let mut tls = SslStream::new(ssl, client).map_err(|err| handshake_error(err.to_string()))?;
    match timeout(state.timeouts.handshake, Pin::new(&mut tls).accept()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::debug!(%host, error = %err, "client refused the forged handshake");
            return Err(handshake_error(err.to_string()));
        }
        Err(_) => return Err(ProxyError::Timeout(TimeoutKind::Handshake)),
    }
    tracing::debug!(%host, %peer, "intercepting");

    let authority = format!("{host}:{port}");
    let mut parser = RequestParser::with_limits(state.limits);
    serve_requests(state, &mut tls, &mut parser, Some(peer), Some(&authority)).await?;
    let _ = tls.shutdown().await;
    Ok(())
}

/// Relays the tunnel byte-for-byte to the origin without decrypting it.
async fn raw_relay(
    state: &ProxyState,
    mut client: TcpStream,
    early: Vec<u8>,
    host: &str,
    port: u16,
) -> Result<(), ProxyError> {
    let mut upstream = match state.dialer.dial_plain(host, port).await {
        Ok(upstream) => upstream,
        Err(err) => {
            let err = ProxyError::from_dial(err);
            if let Some(response) = err.to_response() {
                write_response(state, &mut client, "CONNECT", response, false).await?;
            }
            return Err(err);
        }
    };
    client
        .write_all(CONNECT_ESTABLISHED)
        .await
        .map_err(ProxyError::ClientIo)?;
    if !early.is_empty() {
        upstream
            .write_all(&early)
            .await
            .map_err(|err| ProxyError::Upstream {
                host: host.to_string(),
                message: err.to_string(),
            })?;
    }

    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((sent, received)) => {
            tracing::debug!(%host, port, sent, received, "raw relay finished");
        }
        Err(err) => {
            tracing::debug!(%host, port, error = %err, "raw relay aborted");
        }
    }
    Ok(())
}
