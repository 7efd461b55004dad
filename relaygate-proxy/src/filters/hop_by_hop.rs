use async_trait::async_trait;
use relaygate_net::{Header, Response};

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;
use crate::filter::{FilterContext, ResponseFilter};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Removes headers that only describe one connection, including any named in
/// the message's own `Connection` header.
pub fn strip_hop_by_hop(headers: &mut Vec<Header>) {
    let listed: Vec<String> = headers
        .iter()
        .filter(|header| {
            header.name.eq_ignore_ascii_case("connection")
                || header.name.eq_ignore_ascii_case("proxy-connection")
        })
        .flat_map(|header| header.value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();
    headers.retain(|header| {
        let name = header.name.to_ascii_lowercase();
        !HOP_BY_HOP.contains(&name.as_str()) && !listed.contains(&name)
    });
}

pub struct HopByHopFilter;

#[async_trait]
impl ResponseFilter for HopByHopFilter {
    fn name(&self) -> &'static str {
        "hop-by-hop"
    }

    async fn filter(
        &self,
        _ctx: &FilterContext,
        _request: &ProxyRequest,
        response: &mut Response,
    ) -> Result<(), ProxyError> {
        strip_hop_by_hop(&mut response.headers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use relaygate_net::{Header, Response};
    use url::Url;

    use super::{HopByHopFilter, strip_hop_by_hop};
    use crate::envelope::ProxyRequest;
    use crate::filter::{FilterContext, ResponseFilter};

    #[test]
    fn connection_tokens_are_dropped_too() {
        let mut headers = vec![
            Header::new("Connection", "close, X-Session"),
            Header::new("X-Session", "abc"),
            Header::new("Keep-Alive", "timeout=5"),
            Header::new("Content-Type", "text/html"),
        ];
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers, vec![Header::new("Content-Type", "text/html")]);
    }

    #[tokio::test]
    async fn response_filter_strips_framing_headers() {
        let mut response = Response::new(200, "OK");
        response.set_header("Transfer-Encoding", "chunked");
        response.set_header("X-Test", "1");
        let request = ProxyRequest::new("GET", Url::parse("http://example.com/").unwrap());

        HopByHopFilter
            .filter(&FilterContext::new(None, None), &request, &mut response)
            .await
            .unwrap();
        assert_eq!(response.header("transfer-encoding"), None);
        assert_eq!(response.header("x-test"), Some("1"));
    }
}
