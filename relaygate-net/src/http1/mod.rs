mod parser;
mod types;
mod writer;

pub use parser::{ParseStatus, RequestParser, ResponseParser, parse_response_head};
pub use types::{
    Header, HttpVersion, Limits, ParseError, ParseErrorKind, ParseWarning, ParseWarningKind,
    Request, RequestLine, Response, StatusLine, find_header, remove_header, set_header,
};
pub use writer::{serialize_request, serialize_response, write_headers};
