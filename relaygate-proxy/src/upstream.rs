use std::io;

use relaygate_net::{
    Dialer, Header, HttpVersion, Limits, ParseStatus, Request, RequestLine, Response,
    ResponseParser, serialize_request,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::Timeouts;
use crate::envelope::ProxyRequest;
use crate::error::{ProxyError, TimeoutKind};
use crate::filters::strip_hop_by_hop;

const READ_CHUNK: usize = 16 * 1024;

/// Sends `request` straight to its origin over a fresh connection.
pub async fn fetch_direct(
    dialer: &Dialer,
    request: &mut ProxyRequest,
    timeouts: &Timeouts,
    limits: Limits,
) -> Result<Response, ProxyError> {
    let host = request.host().to_string();
    let port = request.port();
    let body = request
        .body
        .take_for_send()
        .ok_or_else(|| ProxyError::NonRetryable {
            url: request.url.to_string(),
        })?;
    let bytes = origin_request_bytes(request, body);

    tracing::debug!(method = %request.method, url = %request.url, "fetching direct");
    if request.url.scheme() == "https" {
        let mut stream = dialer
            .dial_tls(&host, port)
            .await
            .map_err(ProxyError::from_dial)?;
        exchange(&mut stream, &host, &bytes, &request.method, timeouts, limits).await
    } else {
        let mut stream = dialer
            .dial_plain(&host, port)
            .await
            .map_err(ProxyError::from_dial)?;
        exchange(&mut stream, &host, &bytes, &request.method, timeouts, limits).await
    }
}

/// Origin-form request with one-shot framing: hop-by-hop headers removed,
/// `Connection: close` and an explicit `Content-Length`.
pub fn origin_request_bytes(request: &ProxyRequest, body: Vec<u8>) -> Vec<u8> {
    let mut headers = request.headers.clone();
    strip_hop_by_hop(&mut headers);
    if !headers
        .iter()
        .any(|header| header.name.eq_ignore_ascii_case("host"))
    {
        headers.insert(0, Header::new("Host", request.authority()));
    }
    relaygate_net::remove_header(&mut headers, "content-length");
    if !body.is_empty() || matches!(request.method.as_str(), "POST" | "PUT" | "PATCH") {
        headers.push(Header::new("Content-Length", body.len().to_string()));
    }
    headers.push(Header::new("Connection", "close"));

    serialize_request(&Request {
        line: RequestLine {
            method: request.method.clone(),
            target: request.origin_form(),
            version: HttpVersion::Http11,
        },
        headers,
        body,
    })
}

/// Writes one request and reads one complete response. The first read waits
/// up to the response-header timeout, later ones the read/write timeout.
pub async fn exchange<S>(
    stream: &mut S,
    host: &str,
    request: &[u8],
    method: &str,
    timeouts: &Timeouts,
    limits: Limits,
) -> Result<Response, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let upstream_error = |message: String| ProxyError::Upstream {
        host: host.to_string(),
        message,
    };

    match timeout(timeouts.read_write, async {
        stream.write_all(request).await?;
        stream.flush().await
    })
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(upstream_error(err.to_string())),
        Err(_) => return Err(ProxyError::Timeout(TimeoutKind::ReadWrite)),
    }

    let mut parser = ResponseParser::for_method(method, limits);
    let mut buffer = vec![0u8; READ_CHUNK];
    let mut received = 0usize;
    loop {
        let (wait, kind) = if received == 0 {
            (timeouts.response_header, TimeoutKind::ResponseHeader)
        } else {
            (timeouts.read_write, TimeoutKind::ReadWrite)
        };
        let n = match timeout(wait, stream.read(&mut buffer)).await {
            Ok(Ok(n)) => n,
            // Peers that skip close_notify surface EOF as an error.
            Ok(Err(err)) if err.kind() == io::ErrorKind::UnexpectedEof && received > 0 => 0,
            Ok(Err(err)) => return Err(upstream_error(err.to_string())),
            Err(_) => return Err(ProxyError::Timeout(kind)),
        };
        received += n;

        let status = if n == 0 {
            parser.finish()
        } else {
            parser.push(&buffer[..n])
        };
        match status {
            ParseStatus::Complete { message, .. } => return Ok(message),
            ParseStatus::NeedMore { .. } if n > 0 => continue,
            ParseStatus::NeedMore { .. } => {
                return Err(upstream_error("closed before the response ended".into()));
            }
            ParseStatus::Error { error, .. } => return Err(upstream_error(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use relaygate_net::{Header, Limits};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use url::Url;

    use super::{exchange, origin_request_bytes};
    use crate::config::Timeouts;
    use crate::envelope::{Body, ProxyRequest};
    use crate::error::{ProxyError, TimeoutKind};

    #[test]
    fn origin_request_is_one_shot() {
        let mut request = ProxyRequest::new(
            "POST",
            Url::parse("http://example.com:8080/submit?x=1").unwrap(),
        );
        request.headers = vec![
            Header::new("Proxy-Connection", "keep-alive"),
            Header::new("Transfer-Encoding", "chunked"),
            Header::new("Accept", "*/*"),
        ];
        request.body = Body::Replayable(b"abc".to_vec());

        let bytes = origin_request_bytes(&request, b"abc".to_vec());
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "POST /submit?x=1 HTTP/1.1\r\nHost: example.com:8080\r\nAccept: */*\r\n\
Content-Length: 3\r\nConnection: close\r\n\r\nabc"
        );
    }

    #[tokio::test]
    async fn reads_close_delimited_response() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            let mut request = vec![0u8; 64];
            let _ = server.read(&mut request).await.unwrap();
            server
                .write_all(b"HTTP/1.1 200 OK\r\nX-Test: 1\r\n\r\nuntil close")
                .await
                .unwrap();
        });

        let response = exchange(
            &mut client,
            "origin.test",
            b"GET / HTTP/1.1\r\n\r\n",
            "GET",
            &Timeouts::default(),
            Limits::default(),
        )
        .await
        .unwrap();
        assert_eq!(response.header("x-test"), Some("1"));
        assert_eq!(response.body, b"until close");
    }

    #[tokio::test]
    async fn silent_origin_times_out_waiting_for_header() {
        let (mut client, _server) = duplex(4096);
        let timeouts = Timeouts {
            response_header: std::time::Duration::from_millis(50),
            ..Timeouts::default()
        };
        let result = exchange(
            &mut client,
            "origin.test",
            b"GET / HTTP/1.1\r\n\r\n",
            "GET",
            &timeouts,
            Limits::default(),
        )
        .await;
        assert_matches!(
            result,
            Err(ProxyError::Timeout(TimeoutKind::ResponseHeader))
        );
    }
}
