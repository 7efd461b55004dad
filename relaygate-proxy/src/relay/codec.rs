use relaygate_codec::{decode_block, decode_content, encode_block};
use relaygate_net::{Header, Limits, Response, find_header, parse_response_head};
use url::Url;

use crate::error::ProxyError;
use crate::filters::strip_hop_by_hop;

const RELAY_PREFIX: &str = "x-relay-";
const PASSWORD_HEADER: &str = "X-Relay-Password";
const INNER_ENCODING_HEADER: &str = "x-relay-content-encoding";

/// A request as the relay sees it after unwrapping the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<Header>,
    pub password: Option<String>,
    pub body: Vec<u8>,
}

/// Payload of the outbound relay `POST`: a framed head block carrying the
/// request line and headers, then the raw body.
pub fn encode_request(
    method: &str,
    url: &Url,
    headers: &[Header],
    body: &[u8],
    password: Option<&str>,
) -> Result<Vec<u8>, ProxyError> {
    let mut headers = headers.to_vec();
    strip_hop_by_hop(&mut headers);
    headers.retain(|header| !is_relay_header(&header.name));
    if let Some(password) = password {
        headers.push(Header::new(PASSWORD_HEADER, password));
    }

    let mut head = format!("{method} {url}\r\n");
    push_header_lines(&mut head, &headers);

    let mut payload = encode_block(head.as_bytes())
        .map_err(|err| ProxyError::Parse(format!("request head too large to relay: {err}")))?;
    payload.extend_from_slice(body);
    Ok(payload)
}

pub fn decode_request(payload: &[u8], limits: Limits) -> Result<RelayedRequest, ProxyError> {
    let (head, body) = decode_block(payload, limits.max_header_bytes).map_err(decode_error)?;
    let head = String::from_utf8(head).map_err(decode_error)?;
    let mut lines = head.split("\r\n");
    let (method, url) = lines
        .next()
        .and_then(|line| line.split_once(' '))
        .ok_or_else(|| ProxyError::Decode("missing request line".into()))?;

    let mut headers = Vec::new();
    let mut password = None;
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ProxyError::Decode(format!("bad header line {line:?}")))?;
        if name.eq_ignore_ascii_case(PASSWORD_HEADER) {
            password = Some(value.trim().to_string());
        } else {
            headers.push(Header::new(name.trim(), value.trim()));
        }
    }

    Ok(RelayedRequest {
        method: method.to_string(),
        url: url.to_string(),
        headers,
        password,
        body: body.to_vec(),
    })
}

/// Body of a successful relay reply wrapping `response`.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, ProxyError> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.line.status_code, response.line.reason
    );
    push_header_lines(&mut head, &response.headers);
    let mut payload = encode_block(head.as_bytes()).map_err(decode_error)?;
    payload.extend_from_slice(&response.body);
    Ok(payload)
}

/// Unwraps a relay reply into the origin's response. Both the reply's own
/// `Content-Encoding` and any coding the relay applied to the wrapped body
/// are reversed, and relay framing headers are dropped. Inflation is bounded
/// by `limits`.
pub fn decode_response(reply: &Response, limits: Limits) -> Result<Response, ProxyError> {
    // The outer coding covers the framed head as well as the body.
    let outer_limit = limits.max_body_bytes.saturating_add(limits.max_header_bytes);
    let outer = match reply.header("content-encoding") {
        Some(coding) => decode_content(coding, &reply.body, outer_limit).map_err(decode_error)?,
        None => reply.body.clone(),
    };
    let (head, body) = decode_block(&outer, limits.max_header_bytes).map_err(decode_error)?;
    let (line, mut headers) = parse_response_head(&head).map_err(decode_error)?;

    let inner = find_header(&headers, INNER_ENCODING_HEADER).map(str::to_string);
    headers.retain(|header| !is_relay_header(&header.name));

    let mut response = Response {
        line,
        headers,
        body: body.to_vec(),
    };
    if let Some(coding) = inner {
        response.body = decode_content(&coding, body, limits.max_body_bytes).map_err(decode_error)?;
        response.remove_header("content-encoding");
        response.set_header("Content-Length", response.body.len().to_string());
    }
    Ok(response)
}

fn push_header_lines(head: &mut String, headers: &[Header]) {
    for header in headers {
        let name = if header.raw_name.is_empty() {
            &header.name
        } else {
            &header.raw_name
        };
        head.push_str(name);
        head.push_str(": ");
        head.push_str(&header.value);
        head.push_str("\r\n");
    }
}

fn is_relay_header(name: &str) -> bool {
    name.get(..RELAY_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RELAY_PREFIX))
}

fn decode_error(err: impl std::fmt::Display) -> ProxyError {
    ProxyError::Decode(err.to_string())
}
