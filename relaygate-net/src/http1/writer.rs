use super::types::{Header, Request, Response};

pub fn serialize_request(request: &Request) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(256 + request.body.len());
    bytes.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            request.line.method,
            request.line.target,
            request.line.version.as_str()
        )
        .as_bytes(),
    );
    write_headers(&mut bytes, &request.headers);
    bytes.extend_from_slice(&request.body);
    bytes
}

pub fn serialize_response(response: &Response) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(256 + response.body.len());
    bytes.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            response.line.version.as_str(),
            response.line.status_code,
            response.line.reason
        )
        .as_bytes(),
    );
    write_headers(&mut bytes, &response.headers);
    bytes.extend_from_slice(&response.body);
    bytes
}

/// Writes header lines followed by the blank line ending the head.
pub fn write_headers(bytes: &mut Vec<u8>, headers: &[Header]) {
    for header in headers {
        let name = if header.raw_name.is_empty() {
            &header.name
        } else {
            &header.raw_name
        };
        bytes.extend_from_slice(name.as_bytes());
        bytes.extend_from_slice(b": ");
        bytes.extend_from_slice(header.value.as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(b"\r\n");
}
