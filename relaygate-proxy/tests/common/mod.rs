#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use relaygate_net::{
    Limits, ParseStatus, RequestParser, Response, ResponseParser, serialize_response,
};
use relaygate_proxy::{ProxyConfig, ProxyServer, ProxyState, decode_request, encode_response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.timeouts.connect = 2;
    config.timeouts.handshake = 5;
    config.timeouts.response_header = 5;
    config.timeouts.read_write = 5;
    config.timeouts.relay_attempt = 5;
    config
}

pub async fn spawn_proxy(state: ProxyState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(state);
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

/// Reads one response; close-delimited bodies end at EOF.
pub async fn read_response<S>(stream: &mut S, method: &str) -> Response
where
    S: AsyncRead + Unpin,
{
    let mut parser = ResponseParser::for_method(method, Default::default());
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut buffer).await.unwrap();
        let status = if n == 0 {
            parser.finish()
        } else {
            parser.push(&buffer[..n])
        };
        match status {
            ParseStatus::Complete { message, .. } => return message,
            ParseStatus::NeedMore { .. } if n > 0 => continue,
            other => panic!("incomplete response: {other:?}"),
        }
    }
}

/// Sends a CONNECT and consumes the proxy's answer head.
pub async fn connect_through(proxy: SocketAddr, authority: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "proxy closed during CONNECT");
        head.push(byte[0]);
    }
    (stream, String::from_utf8(head).unwrap())
}

pub type Seen = Arc<Mutex<Vec<String>>>;

/// A relay that answers per identity, chosen by the first label of the
/// `Host` header: `bad*` replies with an unframed body, `quota*` with 503,
/// anything else with the wrapped origin response carrying `X-Test: 1`.
pub async fn spawn_relay() -> (u16, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Seen::default();
    let record = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let record = Arc::clone(&record);
            tokio::spawn(async move {
                let request = read_request(&mut stream).await;
                let host = request.header("host").unwrap_or_default().to_string();
                record.lock().unwrap().push(host.clone());

                let reply = if host.starts_with("bad") {
                    let mut reply = Response::new(200, "OK");
                    reply.body = b"<html>not a relay frame</html>".to_vec();
                    reply
                } else if host.starts_with("quota") {
                    Response::new(503, "Over Quota")
                } else {
                    let relayed = decode_request(&request.body, Limits::default()).unwrap();
                    let mut origin = Response::new(200, "OK");
                    origin.set_header("X-Test", "1");
                    origin.set_header("Content-Type", "text/plain");
                    origin.body = format!("{} {}", relayed.method, relayed.url).into_bytes();
                    let mut reply = Response::new(200, "OK");
                    reply.body = encode_response(&origin).unwrap();
                    reply
                };
                write_response(&mut stream, reply).await;
            });
        }
    });
    (port, seen)
}

pub async fn read_request<S>(stream: &mut S) -> relaygate_net::Request
where
    S: AsyncRead + Unpin,
{
    let mut parser = RequestParser::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut buffer).await.unwrap();
        assert!(n > 0, "peer closed before a full request");
        match parser.push(&buffer[..n]) {
            ParseStatus::Complete { message, .. } => return message,
            ParseStatus::NeedMore { .. } => continue,
            ParseStatus::Error { error, .. } => panic!("bad request: {error}"),
        }
    }
}

pub async fn write_response<S>(stream: &mut S, mut response: Response)
where
    S: AsyncWrite + Unpin,
{
    response.set_header("Content-Length", response.body.len().to_string());
    response.set_header("Connection", "close");
    stream
        .write_all(&serialize_response(&response))
        .await
        .unwrap();
    let _ = stream.shutdown().await;
}
