//! Minimal HTTP/1.1 request reading and response writing.

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::{anyhow, Result};
use thiserror::Error;

const MAX_HEADER_BYTES: usize = 8192;

/// Request body exceeded the configured limit.
#[derive(Debug, Error)]
#[error("request body of {0} bytes exceeds limit")]
pub(crate) struct RequestTooLarge(pub usize);

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }
}

pub(crate) fn read_request<R: Read>(stream: &mut R, max_body_bytes: usize) -> Result<HttpRequest> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > max_body_bytes {
        return Err(RequestTooLarge(content_length).into());
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!(
                "request body truncated: expected {}, got {}",
                content_length,
                body.len()
            ));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        303 => "HTTP/1.1 303 See Other",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub(crate) fn write_response<W: Write>(
    stream: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line(status),
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

pub(crate) fn write_json_response<W: Write>(stream: &mut W, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

pub(crate) fn write_html_response<W: Write>(stream: &mut W, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/html; charset=utf-8", body.as_bytes())
}

pub(crate) fn write_redirect<W: Write>(stream: &mut W, location: &str) -> Result<()> {
    let header = format!(
        "{}\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status_line(303),
        location
    );
    stream.write_all(header.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Headers for a body of unknown length, terminated by closing the connection.
pub(crate) fn write_streaming_header<W: Write>(stream: &mut W, content_type: &str) -> Result<()> {
    let header = format!(
        "{}\r\nContent-Type: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line(200),
        content_type
    );
    stream.write_all(header.as_bytes())?;
    stream.flush()?;
    Ok(())
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find_from(haystack, needle, 0)
}

pub(crate) fn find_from(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start > haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_request_with_body() {
        let raw = b"POST /predict_camera?x=1 HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        let req = read_request(&mut Cursor::new(raw.to_vec()), 1024).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/predict_camera");
        assert_eq!(req.header("host"), Some("x"));
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn rejects_oversized_body() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 99\r\n\r\n";
        let err = read_request(&mut Cursor::new(raw.to_vec()), 10).unwrap_err();
        assert!(err.is::<RequestTooLarge>());
    }

    #[test]
    fn rejects_truncated_body() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(read_request(&mut Cursor::new(raw.to_vec()), 1024).is_err());
    }

    #[test]
    fn redirect_carries_location() {
        let mut out = Vec::new();
        write_redirect(&mut out, "/").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 303 See Other\r\n"));
        assert!(text.contains("Location: /\r\n"));
    }

    #[test]
    fn find_from_respects_offset() {
        assert_eq!(find(b"abcabc", b"bc"), Some(1));
        assert_eq!(find_from(b"abcabc", b"bc", 2), Some(4));
        assert_eq!(find_from(b"abc", b"zz", 0), None);
    }
}
