//! Request line and header section parsing.
//!
//! Lines are parsed in place in the header buffer; only the pieces the
//! request keeps (target, version, header names and values) are copied into
//! the arena. Path segments are sub-regions of the target copy.

use std::str;

use tracing::debug;

use crate::error::{Error, Result};
use crate::http::connection::Connection;
use crate::http::request::{HeaderSpan, Method, Request};
use crate::http::token::{Token, Tokenizer};
use crate::memory::Arena;

/// How the request body is framed, as declared by the headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Framing {
    pub content_length: Option<usize>,
    pub chunked: bool,
}

/// Parses the request line and the header section into `request`.
pub(crate) fn parse_head(conn: &mut Connection, arena: &mut Arena, request: &mut Request) -> Result<Framing> {
    parse_request_line(conn, arena, request)?;
    let framing = parse_headers(conn, arena, request)?;

    request.content_length = framing.content_length;
    request.chunked = framing.chunked;
    Ok(framing)
}

fn parse_request_line(conn: &mut Connection, arena: &mut Arena, request: &mut Request) -> Result<()> {
    let line_len = conn.ensure_line(arena)?;
    let line_region = conn.head.pending().slice(0, line_len - 2);
    let line = arena.get(line_region);

    let mut tokens = Tokenizer::new(line);
    let method = tokens
        .next_until(b' ')
        .ok_or(Error::BadRequest("malformed request line"))?;
    let target = tokens
        .next_until(b' ')
        .ok_or(Error::BadRequest("malformed request line"))?;
    let version = tokens.rest();

    let method =
        Method::from_bytes(method.bytes(line)).ok_or(Error::BadRequest("unsupported method"))?;

    let target_bytes = target.bytes(line);
    if !target_bytes.is_empty() && target_bytes[0] != b'/' {
        return Err(Error::BadRequest("request target must start with '/'"));
    }
    if str::from_utf8(target_bytes).is_err() {
        return Err(Error::BadRequest("request target is not valid UTF-8"));
    }
    if !version.bytes(line).starts_with(b"HTTP/") {
        return Err(Error::BadRequest("unsupported protocol version"));
    }

    let base = line_region.offset();
    let (target, version) = (target.region(base), version.region(base));

    request.method = Some(method);
    request.target = arena.duplicate(target)?;
    request.version = arena.duplicate(version)?;

    for segment in path_segments(arena.get(request.target)) {
        request.path.push(request.target.slice(segment.start(), segment.len()));
    }

    debug!(method = method.as_str(), segments = request.path.len(), "parsed request line");
    conn.head.consume(line_len);
    Ok(())
}

fn parse_headers(conn: &mut Connection, arena: &mut Arena, request: &mut Request) -> Result<Framing> {
    let mut framing = Framing::default();
    let mut transfer_encoding = false;

    loop {
        let line_len = conn.ensure_line(arena)?;
        if line_len < 3 {
            conn.head.consume(line_len);
            break;
        }

        let line_region = conn.head.pending().slice(0, line_len - 2);
        let line = arena.get(line_region);
        let (name, value) = split_header(line)?;

        if name.matches_ignore_case(line, "Content-Length") {
            let length = parse_content_length(value.bytes(line))?;
            match framing.content_length {
                Some(previous) if previous != length => {
                    return Err(Error::BadRequest("conflicting Content-Length headers"));
                }
                _ => framing.content_length = Some(length),
            }
        } else if name.matches_ignore_case(line, "Transfer-Encoding") {
            transfer_encoding = true;
            if value.contains_ignore_case(line, "chunked") {
                framing.chunked = true;
            }
        }

        let base = line_region.offset();
        let (name, value) = (name.region(base), value.region(base));
        let header = HeaderSpan {
            name: arena.duplicate(name)?,
            value: arena.duplicate(value)?,
        };
        request.headers.push(header);

        conn.head.consume(line_len);
    }

    // RFC 7230 §3.3.3: a message with both is a framing conflict
    if transfer_encoding && framing.content_length.is_some() {
        return Err(Error::BadRequest("both Content-Length and Transfer-Encoding present"));
    }

    Ok(framing)
}

/// Splits `name: value` at the first colon. Leading blanks of the value and
/// trailing blanks of the line are dropped; both halves must be non-empty.
fn split_header(line: &[u8]) -> Result<(Token, Token)> {
    let mut tokens = Tokenizer::new(line);

    let name = tokens
        .next_until(b':')
        .filter(|name| !name.is_empty())
        .ok_or(Error::BadRequest("malformed header line"))?;
    tokens.skip_while(|b| b == b' ' || b == b'\t');
    let value = tokens.rest().trim_end(line);

    if value.is_empty() {
        return Err(Error::BadRequest("empty header value"));
    }
    if str::from_utf8(name.bytes(line)).is_err() || str::from_utf8(value.bytes(line)).is_err() {
        return Err(Error::BadRequest("header is not valid UTF-8"));
    }

    Ok((name, value))
}

fn parse_content_length(value: &[u8]) -> Result<usize> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(Error::BadRequest("invalid Content-Length"));
    }
    str::from_utf8(value)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or(Error::BadRequest("invalid Content-Length"))
}

/// Non-empty `/`-separated segments of the path, up to the query.
fn path_segments(target: &[u8]) -> Vec<Token> {
    let path_end = target.iter().position(|b| *b == b'?').unwrap_or(target.len());
    let mut tokens = Tokenizer::new(&target[..path_end]);
    let mut segments = Vec::new();

    while let Some(segment) = tokens.next_until(b'/') {
        if !segment.is_empty() {
            segments.push(segment);
        }
    }
    let last = tokens.rest();
    if !last.is_empty() {
        segments.push(last);
    }

    segments
}
