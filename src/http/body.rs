//! Request body ingestion.
//!
//! Bytes that arrived together with the header section are taken from the
//! header buffer first; the rest is read straight into the body buffer. The
//! body is followed by a zero sentinel byte that is not counted in its length.

use std::str;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::http::connection::Connection;
use crate::http::parser::Framing;
use crate::memory::{Arena, Buffer, Region};

/// Reads the body declared by `framing`. Returns `None` when the request has
/// no body framing at all.
pub(crate) fn read_body(conn: &mut Connection, arena: &mut Arena, framing: Framing) -> Result<Option<Region>> {
    let mut body = if framing.chunked {
        read_chunked(conn, arena)?
    } else {
        match framing.content_length {
            Some(length) => read_exact(conn, arena, length)?,
            None => return Ok(None),
        }
    };

    let len = body.len();
    body.append(arena, &[0])?;
    debug!(len, chunked = framing.chunked, "read request body");

    Ok(Some(body.filled().slice(0, len)))
}

fn read_exact(conn: &mut Connection, arena: &mut Arena, length: usize) -> Result<Buffer> {
    let mut body = Buffer::allocate(arena, length)?;
    fill(conn, arena, &mut body, length)?;
    Ok(body)
}

/// Chunk sizes are hexadecimal, as HTTP defines them: `a\r\n` announces ten
/// bytes. Extensions after `;` are ignored and trailer lines are skipped.
fn read_chunked(conn: &mut Connection, arena: &mut Arena) -> Result<Buffer> {
    let mut body = Buffer::allocate(arena, 0)?;

    loop {
        let line_len = conn.ensure_line(arena)?;
        let size = parse_chunk_size(&conn.head.pending_slice(arena)[..line_len - 2])?;
        conn.head.consume(line_len);

        if size == 0 {
            skip_trailers(conn, arena)?;
            return Ok(body);
        }

        trace!(size, "reading chunk");
        body.reserve(arena, size)?;
        let target = body.len() + size;
        fill(conn, arena, &mut body, target)?;

        if conn.ensure_line(arena)? != 2 {
            return Err(Error::BadRequest("chunk data not followed by CRLF"));
        }
        conn.head.consume(2);
    }
}

/// Fills `body` up to `target` bytes: buffered header bytes first, then the socket.
fn fill(conn: &mut Connection, arena: &mut Arena, body: &mut Buffer, target: usize) -> Result<()> {
    let buffered = conn.head.pending_len().min(target - body.len());
    if buffered > 0 {
        body.append_region(arena, conn.head.pending().slice(0, buffered))?;
        conn.head.consume(buffered);
    }

    while body.len() < target {
        match conn.receive_into(arena, body, target - body.len()) {
            Ok(_) => {}
            Err(Error::Disconnect) => {
                return Err(Error::BadRequest("connection closed before end of body"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn skip_trailers(conn: &mut Connection, arena: &mut Arena) -> Result<()> {
    loop {
        let line_len = conn.ensure_line(arena)?;
        conn.head.consume(line_len);
        if line_len == 2 {
            return Ok(());
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let digits = match line.iter().position(|b| *b == b';') {
        Some(end) => &line[..end],
        None => line,
    };

    str::from_utf8(digits)
        .ok()
        .map(|digits| digits.trim_matches([' ', '\t']))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|digits| usize::from_str_radix(digits, 16).ok())
        .ok_or(Error::BadRequest("invalid chunk size"))
}
