mod dialer;
mod http1;
mod pattern;
mod resolver;
mod tls;

pub use dialer::{DialError, Dialer, DialerConfig};

pub use http1::{
    Header, HttpVersion, Limits, ParseError, ParseErrorKind, ParseStatus, ParseWarning,
    ParseWarningKind, Request, RequestLine, RequestParser, Response, ResponseParser, StatusLine,
    find_header, parse_response_head, remove_header, serialize_request, serialize_response,
    set_header, write_headers,
};

pub use pattern::{HostPattern, PatternError, normalize_host};

pub use resolver::{Network, ResolveError, Resolver};

pub use tls::{
    CaCertificate, CaMaterial, CaMaterialPaths, LeafCache, LeafCertificate, LeafIssuer, TlsError,
    TlsErrorKind, build_acceptor, build_connector, generate_ca, generate_leaf_cert, load_ca,
    load_or_generate_ca, write_ca_to_dir,
};
