//! Minimal HTTP/1.1 wire handling: request parsing and response encoding.
//!
//! The control API speaks one request per connection, so this stays a
//! byte-level parser instead of pulling in a web framework. serde_json
//! serializes object keys in sorted order, which keeps every response
//! body deterministic.

use std::collections::HashMap;

/// A parsed inbound request. Header names are lowercased.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Byte offset of the `\r\n\r\n` header terminator, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Content-Length from raw header text; absent or unparseable means 0.
pub fn content_length(header_text: &str) -> usize {
    header_text
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

/// Parse a complete (or truncated-by-close) request buffer.
///
/// Returns `None` when the request line is unusable. A body shorter than
/// Content-Length is kept as-is; the connection handler decides when to
/// stop reading.
pub fn parse_request(buf: &[u8]) -> Option<Request> {
    let header_end = find_header_end(buf)?;
    let header_text = std::str::from_utf8(&buf[..header_end]).ok()?;

    let mut lines = header_text.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let full_path = parts.next()?;
    // Query strings are accepted and ignored.
    let path = full_path.split('?').next().unwrap_or(full_path).to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let body = buf[header_end + 4..].to_vec();
    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        501 => "Not Implemented",
        _ => "Error",
    }
}

/// Encode a JSON response. One response per connection, so always
/// `Connection: close`.
pub fn encode_response(status: u16, body: &serde_json::Value) -> Vec<u8> {
    let json = body.to_string();
    let mut response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status_text(status),
        json.len()
    )
    .into_bytes();
    response.extend_from_slice(json.as_bytes());
    response
}
