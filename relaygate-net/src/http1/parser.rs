use super::types::{
    Header, HttpVersion, Limits, ParseError, ParseErrorKind, ParseWarning, ParseWarningKind,
    Request, RequestLine, Response, StatusLine, find_header,
};

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus<T> {
    NeedMore {
        warnings: Vec<ParseWarning>,
    },
    Complete {
        message: T,
        warnings: Vec<ParseWarning>,
    },
    Error {
        error: ParseError,
        warnings: Vec<ParseWarning>,
    },
}

/// Incremental HTTP/1.x request parser.
///
/// Bytes past the end of a complete message stay buffered, so a keep-alive
/// connection feeds the same parser for every request it carries.
#[derive(Debug, Default)]
pub struct RequestParser {
    buffer: Vec<u8>,
    warnings: Vec<ParseWarning>,
    limits: Limits,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            buffer: Vec::new(),
            warnings: Vec::new(),
            limits,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> ParseStatus<Request> {
        self.buffer.extend_from_slice(bytes);
        let leading = self
            .buffer
            .iter()
            .take_while(|byte| **byte == b'\r' || **byte == b'\n')
            .count();
        self.buffer.drain(..leading);
        if self.buffer.is_empty() {
            return ParseStatus::NeedMore {
                warnings: self.warnings.clone(),
            };
        }
        self.try_parse_request()
    }

    /// Hands back bytes received after the last complete message, e.g. the
    /// first records of a tunnel that followed a CONNECT head.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn try_parse_request(&mut self) -> ParseStatus<Request> {
        match parse_request_from_buffer(&self.buffer, self.limits, &mut self.warnings) {
            Ok(ParseResult::Complete { message, consumed }) => {
                self.buffer.drain(..consumed);
                let warnings = std::mem::take(&mut self.warnings);
                ParseStatus::Complete { message, warnings }
            }
            Ok(ParseResult::NeedMore) => ParseStatus::NeedMore {
                warnings: self.warnings.clone(),
            },
            Err(error) => {
                let warnings = std::mem::take(&mut self.warnings);
                ParseStatus::Error { error, warnings }
            }
        }
    }
}

/// Incremental HTTP/1.x response parser.
///
/// Interim `1xx` responses (other than `101`) are skipped. Responses without
/// `Content-Length` or chunked framing are close-delimited and only complete
/// once [`ResponseParser::finish`] reports end of stream.
#[derive(Debug, Default)]
pub struct ResponseParser {
    buffer: Vec<u8>,
    warnings: Vec<ParseWarning>,
    limits: Limits,
    head_request: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            buffer: Vec::new(),
            warnings: Vec::new(),
            limits,
            head_request: false,
        }
    }

    /// Parser for the response to a request sent with `method`.
    pub fn for_method(method: &str, limits: Limits) -> Self {
        let mut parser = Self::with_limits(limits);
        parser.head_request = method.eq_ignore_ascii_case("HEAD");
        parser
    }

    pub fn push(&mut self, bytes: &[u8]) -> ParseStatus<Response> {
        self.buffer.extend_from_slice(bytes);
        self.try_parse_response(false)
    }

    /// Signals end of stream and completes a close-delimited body.
    pub fn finish(&mut self) -> ParseStatus<Response> {
        if self.buffer.is_empty() {
            return ParseStatus::Error {
                error: ParseError {
                    kind: ParseErrorKind::UnexpectedEof,
                    offset: 0,
                },
                warnings: std::mem::take(&mut self.warnings),
            };
        }
        self.try_parse_response(true)
    }

    fn try_parse_response(&mut self, at_eof: bool) -> ParseStatus<Response> {
        loop {
            let framing = BodyFraming::Response {
                head_request: self.head_request,
                at_eof,
            };
            match parse_response_from_buffer(&self.buffer, self.limits, framing, &mut self.warnings)
            {
                Ok(ParseResult::Complete { message, consumed }) => {
                    self.buffer.drain(..consumed);
                    let status = message.line.status_code;
                    if (100..200).contains(&status) && status != 101 {
                        continue;
                    }
                    let warnings = std::mem::take(&mut self.warnings);
                    return ParseStatus::Complete { message, warnings };
                }
                Ok(ParseResult::NeedMore) => {
                    if at_eof {
                        return ParseStatus::Error {
                            error: ParseError {
                                kind: ParseErrorKind::UnexpectedEof,
                                offset: self.buffer.len(),
                            },
                            warnings: std::mem::take(&mut self.warnings),
                        };
                    }
                    return ParseStatus::NeedMore {
                        warnings: self.warnings.clone(),
                    };
                }
                Err(error) => {
                    let warnings = std::mem::take(&mut self.warnings);
                    return ParseStatus::Error { error, warnings };
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ParseResult<T> {
    NeedMore,
    Complete { message: T, consumed: usize },
}

#[derive(Debug, Clone, Copy)]
enum BodyFraming {
    Request,
    Response { head_request: bool, at_eof: bool },
}

impl BodyFraming {
    fn at_eof(self) -> bool {
        matches!(self, BodyFraming::Response { at_eof: true, .. })
    }
}

/// Parses a single response head (status line and headers, no body) such as
/// the one carried inside a relay reply.
pub fn parse_response_head(bytes: &[u8]) -> Result<(StatusLine, Vec<Header>), ParseError> {
    let mut warnings = Vec::new();
    let head_end = twoway::find_bytes(bytes, HEADER_TERMINATOR).unwrap_or(bytes.len());
    let head = &bytes[..head_end];
    let line_end = find_line_end(head, 0).unwrap_or(head.len());
    let line = parse_status_line(&head[..line_end], 0, &mut warnings)?;
    let headers_start = (line_end + CRLF.len()).min(head.len());
    let headers = parse_headers(&head[headers_start..], headers_start, &mut warnings)?;
    Ok((line, headers))
}

fn parse_request_from_buffer(
    buffer: &[u8],
    limits: Limits,
    warnings: &mut Vec<ParseWarning>,
) -> Result<ParseResult<Request>, ParseError> {
    let headers_end = match find_headers_end(buffer, limits)? {
        Some(index) => index,
        None => return Ok(ParseResult::NeedMore),
    };

    let line_end = find_line_end(buffer, 0).ok_or(ParseError {
        kind: ParseErrorKind::UnexpectedEof,
        offset: buffer.len(),
    })?;
    let line = parse_request_line(&buffer[..line_end], 0, warnings)?;

    let headers = parse_header_block(buffer, line_end, headers_end, warnings)?;
    let body_start = headers_end + HEADER_TERMINATOR.len();

    let Some((body, body_consumed)) =
        parse_body(buffer, body_start, &headers, limits, BodyFraming::Request)?
    else {
        return Ok(ParseResult::NeedMore);
    };

    Ok(ParseResult::Complete {
        message: Request {
            line,
            headers,
            body,
        },
        consumed: body_start + body_consumed,
    })
}

fn parse_response_from_buffer(
    buffer: &[u8],
    limits: Limits,
    framing: BodyFraming,
    warnings: &mut Vec<ParseWarning>,
) -> Result<ParseResult<Response>, ParseError> {
    let headers_end = match find_headers_end(buffer, limits)? {
        Some(index) => index,
        None => return Ok(ParseResult::NeedMore),
    };

    let line_end = find_line_end(buffer, 0).ok_or(ParseError {
        kind: ParseErrorKind::UnexpectedEof,
        offset: buffer.len(),
    })?;
    let line = parse_status_line(&buffer[..line_end], 0, warnings)?;

    let headers = parse_header_block(buffer, line_end, headers_end, warnings)?;
    let body_start = headers_end + HEADER_TERMINATOR.len();

    let framing = match framing {
        BodyFraming::Response {
            head_request,
            at_eof,
        } => {
            let status = line.status_code;
            let bodiless =
                head_request || (100..200).contains(&status) || status == 204 || status == 304;
            BodyFraming::Response {
                head_request: bodiless,
                at_eof,
            }
        }
        BodyFraming::Request => BodyFraming::Request,
    };

    let Some((body, body_consumed)) = parse_body(buffer, body_start, &headers, limits, framing)?
    else {
        return Ok(ParseResult::NeedMore);
    };

    Ok(ParseResult::Complete {
        message: Response {
            line,
            headers,
            body,
        },
        consumed: body_start + body_consumed,
    })
}

fn parse_header_block(
    buffer: &[u8],
    line_end: usize,
    headers_end: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<Header>, ParseError> {
    let start = line_end + CRLF.len();
    if start >= headers_end {
        return Ok(Vec::new());
    }
    parse_headers(&buffer[start..headers_end], start, warnings)
}

fn find_headers_end(buffer: &[u8], limits: Limits) -> Result<Option<usize>, ParseError> {
    match twoway::find_bytes(buffer, HEADER_TERMINATOR) {
        Some(index) => {
            if index > limits.max_header_bytes {
                return Err(ParseError {
                    kind: ParseErrorKind::HeaderTooLarge,
                    offset: limits.max_header_bytes,
                });
            }
            Ok(Some(index))
        }
        None => {
            if buffer.len() > limits.max_header_bytes {
                return Err(ParseError {
                    kind: ParseErrorKind::HeaderTooLarge,
                    offset: limits.max_header_bytes,
                });
            }
            Ok(None)
        }
    }
}

fn find_line_end(buffer: &[u8], start: usize) -> Option<usize> {
    twoway::find_bytes(&buffer[start..], CRLF).map(|offset| start + offset)
}

fn parse_request_line(
    line: &[u8],
    offset: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Result<RequestLine, ParseError> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError {
        kind: ParseErrorKind::InvalidStartLine,
        offset,
    })?;

    let mut parts = text.split_whitespace();
    let method = parts.next().ok_or(ParseError {
        kind: ParseErrorKind::InvalidStartLine,
        offset,
    })?;
    let target = parts.next().ok_or(ParseError {
        kind: ParseErrorKind::InvalidStartLine,
        offset,
    })?;
    let version_raw = parts.next().unwrap_or("HTTP/1.1");

    if parts.next().is_some() {
        return Err(ParseError {
            kind: ParseErrorKind::InvalidStartLine,
            offset,
        });
    }

    let version = parse_http_version(version_raw, offset, warnings);

    Ok(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
        version,
    })
}

fn parse_status_line(
    line: &[u8],
    offset: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Result<StatusLine, ParseError> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError {
        kind: ParseErrorKind::InvalidStatusLine,
        offset,
    })?;

    let mut parts = text.splitn(3, ' ');
    let version_raw = parts.next().unwrap_or("HTTP/1.1");
    let status_raw = parts.next().ok_or(ParseError {
        kind: ParseErrorKind::InvalidStatusLine,
        offset,
    })?;
    let reason = parts.next().unwrap_or("");

    let status_code = status_raw.parse::<u16>().map_err(|_| ParseError {
        kind: ParseErrorKind::InvalidStatusLine,
        offset,
    })?;

    let version = parse_http_version(version_raw, offset, warnings);

    Ok(StatusLine {
        version,
        status_code,
        reason: reason.to_string(),
    })
}

fn parse_http_version(
    version_raw: &str,
    offset: usize,
    warnings: &mut Vec<ParseWarning>,
) -> HttpVersion {
    match version_raw {
        "HTTP/1.0" => HttpVersion::Http10,
        "HTTP/1.1" => HttpVersion::Http11,
        other => {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::UnknownVersion(other.to_string()),
                offset,
            });
            HttpVersion::Other(other.to_string())
        }
    }
}

fn parse_headers(
    bytes: &[u8],
    base_offset: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<Header>, ParseError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let text = String::from_utf8_lossy(bytes);

    let mut headers = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_raw_name: Option<String> = None;
    let mut current_value = String::new();
    let mut offset = base_offset;

    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }

        if let Some(first) = line.as_bytes().first() {
            if *first == b' ' || *first == b'\t' {
                warnings.push(ParseWarning {
                    kind: ParseWarningKind::ObsFoldDetected,
                    offset,
                });
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                    offset += line.len() + CRLF.len();
                    continue;
                }
            }
        }

        if let Some(name) = current_name.take() {
            headers.push(Header {
                name,
                raw_name: current_raw_name.take().unwrap_or_default(),
                value: current_value.trim().to_string(),
            });
            current_value.clear();
        }

        let mut parts = line.splitn(2, ':');
        let raw_name = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");

        if raw_name.trim().is_empty() {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::InvalidHeaderName,
                offset,
            });
        }

        if value.bytes().any(|byte| byte == b'\r' || byte == b'\n') {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::InvalidHeaderValue,
                offset,
            });
        }

        current_name = Some(raw_name.trim().to_string());
        current_raw_name = Some(raw_name.trim_end().to_string());
        current_value.push_str(value.trim_start());
        offset += line.len() + CRLF.len();
    }

    if let Some(name) = current_name {
        headers.push(Header {
            name,
            raw_name: current_raw_name.unwrap_or_default(),
            value: current_value.trim().to_string(),
        });
    }

    Ok(headers)
}

/// Returns `None` while more bytes are needed to finish the body.
fn parse_body(
    buffer: &[u8],
    body_start: usize,
    headers: &[Header],
    limits: Limits,
    framing: BodyFraming,
) -> Result<Option<(Vec<u8>, usize)>, ParseError> {
    if let BodyFraming::Response {
        head_request: true, ..
    } = framing
    {
        return Ok(Some((Vec::new(), 0)));
    }

    if has_chunked_transfer_encoding(headers) {
        return parse_chunked_body(buffer, body_start, limits, framing.at_eof());
    }

    if let Some(length) = parse_content_length(headers) {
        if length > limits.max_body_bytes {
            return Err(ParseError {
                kind: ParseErrorKind::BodyTooLarge,
                offset: body_start,
            });
        }
        let total_needed = body_start + length;
        if buffer.len() < total_needed {
            if framing.at_eof() {
                return Err(ParseError {
                    kind: ParseErrorKind::UnexpectedEof,
                    offset: buffer.len(),
                });
            }
            return Ok(None);
        }
        let body = buffer[body_start..total_needed].to_vec();
        return Ok(Some((body, length)));
    }

    match framing {
        BodyFraming::Request => Ok(Some((Vec::new(), 0))),
        BodyFraming::Response { at_eof: false, .. } => Ok(None),
        BodyFraming::Response { at_eof: true, .. } => {
            let body = buffer.get(body_start..).unwrap_or_default();
            if body.len() > limits.max_body_bytes {
                return Err(ParseError {
                    kind: ParseErrorKind::BodyTooLarge,
                    offset: body_start,
                });
            }
            Ok(Some((body.to_vec(), body.len())))
        }
    }
}

fn parse_content_length(headers: &[Header]) -> Option<usize> {
    find_header(headers, "content-length").and_then(|value| value.trim().parse::<usize>().ok())
}

fn has_chunked_transfer_encoding(headers: &[Header]) -> bool {
    headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("transfer-encoding"))
        .any(|header| {
            header
                .value
                .split(',')
                .any(|encoding| encoding.trim().eq_ignore_ascii_case("chunked"))
        })
}

fn parse_chunked_body(
    buffer: &[u8],
    body_start: usize,
    limits: Limits,
    at_eof: bool,
) -> Result<Option<(Vec<u8>, usize)>, ParseError> {
    let incomplete = |offset: usize| -> Result<Option<(Vec<u8>, usize)>, ParseError> {
        if at_eof {
            Err(ParseError {
                kind: ParseErrorKind::UnexpectedEof,
                offset,
            })
        } else {
            Ok(None)
        }
    };

    let mut cursor = body_start;
    let mut body = Vec::new();

    loop {
        let Some(line_end) = find_line_end(buffer, cursor) else {
            return incomplete(buffer.len());
        };
        let line = std::str::from_utf8(&buffer[cursor..line_end]).map_err(|_| ParseError {
            kind: ParseErrorKind::InvalidChunkSize,
            offset: cursor,
        })?;
        let chunk_size = line
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .trim_start_matches("0x");

        let size = usize::from_str_radix(chunk_size, 16).map_err(|_| ParseError {
            kind: ParseErrorKind::InvalidChunkSize,
            offset: cursor,
        })?;
        cursor = line_end + CRLF.len();

        if size == 0 {
            // trailer section, terminated by an empty line
            loop {
                let Some(trailer_end) = find_line_end(buffer, cursor) else {
                    return incomplete(buffer.len());
                };
                let empty = trailer_end == cursor;
                cursor = trailer_end + CRLF.len();
                if empty {
                    break;
                }
            }
            break;
        }

        if body.len() + size > limits.max_body_bytes {
            return Err(ParseError {
                kind: ParseErrorKind::BodyTooLarge,
                offset: cursor,
            });
        }
        let next = cursor + size;
        if next + CRLF.len() > buffer.len() {
            return incomplete(buffer.len());
        }
        body.extend_from_slice(&buffer[cursor..next]);
        cursor = next;

        if &buffer[cursor..cursor + CRLF.len()] != CRLF {
            return Err(ParseError {
                kind: ParseErrorKind::InvalidChunkTerminator,
                offset: cursor,
            });
        }
        cursor += CRLF.len();
    }

    Ok(Some((body, cursor - body_start)))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{ParseStatus, RequestParser, ResponseParser, parse_response_head};
    use crate::http1::{Limits, ParseErrorKind, ParseWarningKind};

    #[test]
    fn parses_http10_request() {
        let mut parser = RequestParser::new();
        let input = b"GET / HTTP/1.0\r\nHost: example.com\r\n\r\n";
        let status = parser.push(input);

        match status {
            ParseStatus::Complete { message, .. } => {
                assert_eq!(message.line.method, "GET");
                assert_eq!(message.line.target, "/");
                assert_eq!(message.headers.len(), 1);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn parses_request_without_headers() {
        let mut parser = RequestParser::new();
        let status = parser.push(b"GET / HTTP/1.1\r\n\r\n");
        assert_matches!(status, ParseStatus::Complete { message, .. } if message.headers.is_empty());
    }

    #[test]
    fn parses_request_across_buffers() {
        let mut parser = RequestParser::new();
        let part1 = b"GET /abc HTTP/1.1\r\nHost:";
        let part2 = b" example.com\r\nUser-Agent: test\r\n\r\n";

        let status = parser.push(part1);
        assert!(matches!(status, ParseStatus::NeedMore { .. }));

        let status = parser.push(part2);
        match status {
            ParseStatus::Complete { message, .. } => {
                assert_eq!(message.line.target, "/abc");
                assert_eq!(message.headers.len(), 2);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn waits_for_full_content_length_body() {
        let mut parser = RequestParser::new();
        let status = parser.push(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel");
        assert_matches!(status, ParseStatus::NeedMore { .. });

        match parser.push(b"lo") {
            ParseStatus::Complete { message, .. } => assert_eq!(message.body, b"hello"),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn keeps_pipelined_requests_buffered() {
        let mut parser = RequestParser::new();
        let status = parser.push(b"GET /one HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\n\r\n");
        assert_matches!(status, ParseStatus::Complete { message, .. } if message.line.target == "/one");

        let status = parser.push(&[]);
        assert_matches!(status, ParseStatus::Complete { message, .. } if message.line.target == "/two");
        assert!(parser.take_buffered().is_empty());
    }

    #[test]
    fn parses_chunked_response() {
        let mut parser = ResponseParser::new();
        let input = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let status = parser.push(input);

        match status {
            ParseStatus::Complete { message, .. } => {
                assert_eq!(message.body, b"hello");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn parses_chunked_trailers() {
        let mut parser = ResponseParser::new();
        let input =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\nX-Sum: 1\r\n\r\n";
        assert_matches!(
            parser.push(input),
            ParseStatus::Complete { message, .. } if message.body == b"ok"
        );
    }

    #[test]
    fn close_delimited_response_completes_on_finish() {
        let mut parser = ResponseParser::new();
        let status = parser.push(b"HTTP/1.0 200 OK\r\nServer: old\r\n\r\npartial");
        assert_matches!(status, ParseStatus::NeedMore { .. });
        parser.push(b" body");

        match parser.finish() {
            ParseStatus::Complete { message, .. } => assert_eq!(message.body, b"partial body"),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn truncated_content_length_fails_on_finish() {
        let mut parser = ResponseParser::new();
        parser.push(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc");
        assert_matches!(
            parser.finish(),
            ParseStatus::Error { error, .. } if error.kind == ParseErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn head_and_no_content_responses_have_no_body() {
        let mut parser = ResponseParser::for_method("HEAD", Limits::default());
        assert_matches!(
            parser.push(b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n"),
            ParseStatus::Complete { message, .. } if message.body.is_empty()
        );

        let mut parser = ResponseParser::new();
        assert_matches!(
            parser.push(b"HTTP/1.1 204 No Content\r\n\r\n"),
            ParseStatus::Complete { message, .. } if message.line.status_code == 204
        );
    }

    #[test]
    fn skips_interim_continue_response() {
        let mut parser = ResponseParser::new();
        let input = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n";
        assert_matches!(
            parser.push(input),
            ParseStatus::Complete { message, .. } if message.line.status_code == 201
        );
    }

    #[test]
    fn parses_absolute_form_target() {
        let mut parser = RequestParser::new();
        let input = b"GET http://example.com/path HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let status = parser.push(input);

        match status {
            ParseStatus::Complete { message, .. } => {
                assert_eq!(message.line.target, "http://example.com/path");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn warns_on_obs_fold() {
        let mut parser = RequestParser::new();
        let input = b"GET / HTTP/1.1\r\nHeader: one\r\n\tcontinued\r\n\r\n";
        let status = parser.push(input);

        match status {
            ParseStatus::Complete { warnings, .. } => {
                assert!(
                    warnings
                        .iter()
                        .any(|warning| matches!(warning.kind, ParseWarningKind::ObsFoldDetected))
                );
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn supports_header_limit() {
        let mut parser = RequestParser::with_limits(Limits {
            max_header_bytes: 10,
            max_body_bytes: 1024,
        });
        let input = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let status = parser.push(input);

        assert!(matches!(status, ParseStatus::Error { .. }));
    }

    #[test]
    fn parses_bare_response_head() {
        let (line, headers) =
            parse_response_head(b"HTTP/1.1 404 Not Found\r\nX-Test: 1\r\nContent-Length: 3")
                .unwrap();
        assert_eq!(line.status_code, 404);
        assert_eq!(line.reason, "Not Found");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].value, "1");
    }
}
