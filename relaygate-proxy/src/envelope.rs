use relaygate_net::{Header, HttpVersion, Request, find_header, set_header};
use url::Url;

use crate::error::ProxyError;

/// Request body as seen by the pipeline. Bodies above the replay limit are
/// handed out once; a second send attempt finds them gone.
#[derive(Debug, PartialEq, Eq)]
pub enum Body {
    Replayable(Vec<u8>),
    SingleUse(Option<Vec<u8>>),
}

impl Body {
    pub fn new(bytes: Vec<u8>, max_replay_bytes: usize) -> Self {
        if bytes.len() > max_replay_bytes {
            Body::SingleUse(Some(bytes))
        } else {
            Body::Replayable(bytes)
        }
    }

    pub fn empty() -> Self {
        Body::Replayable(Vec::new())
    }

    /// Bytes for one send attempt, or `None` if a single-use body was
    /// already taken.
    pub fn take_for_send(&mut self) -> Option<Vec<u8>> {
        match self {
            Body::Replayable(bytes) => Some(bytes.clone()),
            Body::SingleUse(slot) => slot.take(),
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, Body::SingleUse(None))
    }
}

/// The in-flight request handed to every request filter in turn.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: String,
    pub url: Url,
    pub version: HttpVersion,
    pub headers: Vec<Header>,
    pub body: Body,
}

impl ProxyRequest {
    /// Builds the envelope for a parsed request. `tunnel` is the
    /// `host:port` of the intercepted CONNECT the request arrived through.
    pub fn from_wire(
        request: Request,
        tunnel: Option<&str>,
        max_replay_bytes: usize,
    ) -> Result<Self, ProxyError> {
        let method = request.line.method.to_ascii_uppercase();
        let target = request.line.target.as_str();
        let url = if method == "CONNECT" {
            parse_url(&format!("https://{target}/"))?
        } else if let Some(authority) = tunnel {
            // Whatever form the target takes, a decrypted request goes to the
            // tunnel's authority over https.
            let path = if is_absolute_form(target) {
                path_and_query(&parse_url(target)?)
            } else {
                origin_path(target).to_string()
            };
            parse_url(&format!("https://{authority}{path}"))?
        } else if is_absolute_form(target) {
            parse_url(target)?
        } else {
            let host = find_header(&request.headers, "host")
                .ok_or_else(|| ProxyError::Parse(format!("no host for target {target}")))?;
            parse_url(&format!("http://{host}{}", origin_path(target)))?
        };
        if url.host_str().is_none() {
            return Err(ProxyError::Parse(format!("no host in {url}")));
        }

        Ok(Self {
            method,
            url,
            version: request.line.version,
            headers: request.headers,
            body: Body::new(request.body, max_replay_bytes),
        })
    }

    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            version: HttpVersion::Http11,
            headers: Vec::new(),
            body: Body::empty(),
        }
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    /// Host without the brackets of an IPv6 literal.
    pub fn host(&self) -> &str {
        let host = self.url.host_str().unwrap_or_default();
        host.strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(host)
    }

    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        set_header(&mut self.headers, name, value);
    }

    /// Path and query as sent in an origin-form request line.
    pub fn origin_form(&self) -> String {
        path_and_query(&self.url)
    }

    /// `host` or `host:port` when the port is not the scheme default.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

fn is_absolute_form(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

fn origin_path(target: &str) -> &str {
    if target.starts_with('/') { target } else { "/" }
}

fn parse_url(raw: &str) -> Result<Url, ProxyError> {
    Url::parse(raw).map_err(|err| ProxyError::Parse(format!("{raw}: {err}")))
}

#[cfg(test)]
mod tests {
    use relaygate_net::{Header, HttpVersion, Request, RequestLine};

    use super::{Body, ProxyRequest};

    fn wire(method: &str, target: &str, headers: &[(&str, &str)]) -> Request {
        Request {
            line: RequestLine {
                method: method.to_string(),
                target: target.to_string(),
                version: HttpVersion::Http11,
            },
            headers: headers
                .iter()
                .map(|(name, value)| Header::new(*name, *value))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn absolute_form_keeps_its_scheme() {
        let request =
            ProxyRequest::from_wire(wire("get", "http://example.com/a?b=1", &[]), None, 16)
                .unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.port(), 80);
        assert_eq!(request.origin_form(), "/a?b=1");
    }

    #[test]
    fn tunneled_requests_target_https_authority() {
        let request = ProxyRequest::from_wire(
            wire("GET", "/index.html", &[("Host", "example.com")]),
            Some("example.com:443"),
            16,
        )
        .unwrap();
        assert_eq!(request.url.as_str(), "https://example.com/index.html");
        assert_eq!(request.port(), 443);
        assert_eq!(request.authority(), "example.com");
    }

    #[test]
    fn tunneled_absolute_form_keeps_path_and_query() {
        let request = ProxyRequest::from_wire(
            wire("GET", "http://example.com/deep/path?q=1", &[("Host", "example.com")]),
            Some("example.com:443"),
            16,
        )
        .unwrap();
        assert_eq!(request.url.as_str(), "https://example.com/deep/path?q=1");
        assert_eq!(request.origin_form(), "/deep/path?q=1");
    }

    #[test]
    fn tunneled_absolute_form_cannot_leave_the_tunnel() {
        let request = ProxyRequest::from_wire(
            wire("GET", "https://elsewhere.test:8443/x", &[]),
            Some("example.com:443"),
            16,
        )
        .unwrap();
        assert_eq!(request.url.as_str(), "https://example.com/x");
    }

    #[test]
    fn ipv6_connect_host_has_no_brackets() {
        let request =
            ProxyRequest::from_wire(wire("CONNECT", "[::1]:443", &[]), None, 16).unwrap();
        assert_eq!(request.host(), "::1");
        assert_eq!(request.port(), 443);
        assert_eq!(request.authority(), "[::1]");
    }

    #[test]
    fn connect_target_becomes_authority() {
        let request =
            ProxyRequest::from_wire(wire("CONNECT", "example.com:8443", &[]), None, 16).unwrap();
        assert!(request.is_connect());
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.port(), 8443);
    }

    #[test]
    fn origin_form_without_host_is_rejected() {
        assert!(ProxyRequest::from_wire(wire("GET", "/", &[]), None, 16).is_err());
    }

    #[test]
    fn large_bodies_are_single_use() {
        let mut body = Body::new(vec![0; 32], 16);
        assert!(body.take_for_send().is_some());
        assert!(body.is_consumed());
        assert!(body.take_for_send().is_none());

        let mut small = Body::new(vec![1; 8], 16);
        assert_eq!(small.take_for_send(), Some(vec![1; 8]));
        assert_eq!(small.take_for_send(), Some(vec![1; 8]));
    }
}
