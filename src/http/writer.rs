//! Response emission.
//!
//! A reply is buffered in the arena so it can go out with an exact
//! `Content-Length`. When the arena cannot hold more body bytes the writer
//! sends the headers with `Transfer-Encoding: chunked`, flushes what it has as
//! chunks and streams the rest through a fixed window of [`CHUNK_SIZE`] bytes.

use std::fmt::{self, Write as _};
use std::mem;

use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::http::CHUNK_SIZE;
use crate::http::connection::{Connection, State};
use crate::memory::{Arena, Buffer, MemoryError, Region};

/// Best-effort reply sent when a response is aborted before any byte went out.
const ERROR_REPLY: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n\r\n";

impl Connection {
    pub fn set_status(&mut self, arena: &mut Arena, code: u16, text: &str) -> Result<()> {
        if self.state != State::AwaitingStatus {
            return Err(self.violation("set_status"));
        }
        if has_line_break(text) {
            return Err(self.fail(Error::Internal("status text contains a line break".into())));
        }

        self.head.clear();
        if let Err(e) = self
            .head
            .append_fmt(arena, format_args!("HTTP/1.1 {code} {text}\r\n"))
        {
            return Err(self.fail(e));
        }

        self.state = State::HeadersOpen;
        Ok(())
    }

    pub fn add_header(&mut self, arena: &mut Arena, name: &str, value: &str) -> Result<()> {
        if self.state != State::HeadersOpen {
            return Err(self.violation("add_header"));
        }
        if name.is_empty() || has_line_break(name) || has_line_break(value) {
            return Err(self.fail(Error::Internal(format!("invalid header field {name:?}"))));
        }

        if let Err(e) = self
            .head
            .append_fmt(arena, format_args!("{name}: {value}\r\n"))
        {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Closes the header section for writing and allocates the body window.
    /// Calling it again once the body has started is a no-op.
    pub fn begin_body(&mut self, arena: &mut Arena) -> Result<()> {
        match self.state {
            State::HeadersOpen => match Buffer::allocate(arena, CHUNK_SIZE) {
                Ok(body) => {
                    self.body = Some(body);
                    self.state = State::BodyBuffered;
                    Ok(())
                }
                Err(e) => Err(self.fail(e)),
            },
            State::BodyBuffered | State::BodyChunked => Ok(()),
            _ => Err(self.violation("begin_body")),
        }
    }

    pub fn write_body_bytes(&mut self, arena: &mut Arena, data: &[u8]) -> Result<()> {
        self.begin_body(arena)?;

        if self.state == State::BodyBuffered {
            let Some(body) = self.body.as_mut() else {
                return Err(self.fail(Error::Internal("body buffer missing".into())));
            };
            match body.append(arena, data) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(buffered = body.len(), reason = %e, "body does not fit in memory, switching to chunked transfer");
                    if let Err(e) = self.begin_chunked(arena) {
                        return Err(self.fail(e));
                    }
                }
            }
        }

        match self.write_chunked(arena, data) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Formats into a scratch buffer bounded by [`CHUNK_SIZE`], then writes
    /// the result as body bytes. Overflowing the scratch buffer aborts the reply.
    pub fn write_body_formatted(&mut self, arena: &mut Arena, args: fmt::Arguments<'_>) -> Result<()> {
        let mut scratch = mem::take(&mut self.scratch);
        scratch.clear();

        let formatted = Bounded {
            text: &mut scratch,
            limit: CHUNK_SIZE,
        }
        .write_fmt(args);

        let result = match formatted {
            Ok(()) => self.write_body_bytes(arena, scratch.as_bytes()),
            Err(_) => Err(self.fail(MemoryError::FormatOverflow)),
        };
        self.scratch = scratch;
        result
    }

    /// Sends whatever is still pending and closes the connection.
    ///
    /// After an abort this only reports [`Error::Aborted`] and readies the
    /// engine for the next request.
    pub fn finish(&mut self, arena: &mut Arena) -> Result<()> {
        let sent = match self.state {
            State::ErrorClosed => {
                self.state = State::AwaitingRequest;
                return Err(Error::Aborted);
            }
            State::HeadersOpen => self.finish_headers_only(arena),
            State::BodyBuffered => self.finish_buffered(arena),
            State::BodyChunked => self.finish_chunked(arena),
            _ => return Err(self.violation("finish")),
        };

        match sent {
            Ok(()) => {
                self.close();
                self.state = State::AwaitingRequest;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Gives up on the current reply: a bare 500 if nothing was sent yet,
    /// then the socket is closed.
    pub fn abort(&mut self) {
        if self.state == State::ErrorClosed {
            return;
        }

        if !self.sent {
            if let Some(peer) = self.peer.as_deref_mut() {
                if let Err(e) = peer.send_all(ERROR_REPLY) {
                    debug!(error = %e, "could not deliver error reply");
                }
            }
        }

        self.close();
        self.state = State::ErrorClosed;
    }

    fn finish_headers_only(&mut self, arena: &mut Arena) -> Result<()> {
        self.head.append(arena, b"\r\n")?;
        self.send_region(arena, self.head.filled())
    }

    fn finish_buffered(&mut self, arena: &mut Arena) -> Result<()> {
        let body = self.body.ok_or_else(|| Error::Internal("body buffer missing".into()))?;

        self.head
            .append_fmt(arena, format_args!("Content-Length: {}\r\n\r\n", body.len()))?;
        self.send_region(arena, self.head.filled())?;

        if !self.omit_body {
            self.send_region(arena, body.filled())?;
        }
        Ok(())
    }

    fn finish_chunked(&mut self, arena: &mut Arena) -> Result<()> {
        let body = self.body.ok_or_else(|| Error::Internal("body buffer missing".into()))?;
        // connection close marks the end of the body; no zero-size chunk follows
        if !body.is_empty() {
            self.send_chunk(arena, body.filled())?;
        }
        Ok(())
    }

    fn begin_chunked(&mut self, arena: &mut Arena) -> Result<()> {
        let mut body = self.body.ok_or_else(|| Error::Internal("body buffer missing".into()))?;

        self.head.append(arena, b"Transfer-Encoding: chunked\r\n\r\n")?;
        self.send_region(arena, self.head.filled())?;

        while body.pending_len() > CHUNK_SIZE {
            self.send_chunk(arena, body.pending().slice(0, CHUNK_SIZE))?;
            body.consume(CHUNK_SIZE);
        }
        body.compact(arena);

        self.body = Some(body);
        self.state = State::BodyChunked;
        Ok(())
    }

    /// Fills the window, sending one chunk every time it is full.
    fn write_chunked(&mut self, arena: &mut Arena, mut data: &[u8]) -> Result<()> {
        let mut body = self.body.ok_or_else(|| Error::Internal("body buffer missing".into()))?;

        while !data.is_empty() {
            let take = CHUNK_SIZE.saturating_sub(body.len()).min(data.len());
            body.append(arena, &data[..take])?;
            data = &data[take..];

            if body.len() >= CHUNK_SIZE {
                self.send_chunk(arena, body.filled())?;
                body.clear();
            }
        }

        self.body = Some(body);
        Ok(())
    }

    fn send_chunk(&mut self, arena: &Arena, chunk: Region) -> Result<()> {
        if self.omit_body {
            return Ok(());
        }
        trace!(size = chunk.len(), "sending chunk");
        self.send(format!("{:X}\r\n", chunk.len()).as_bytes())?;
        self.send_region(arena, chunk)?;
        self.send(b"\r\n")
    }

    fn send_region(&mut self, arena: &Arena, region: Region) -> Result<()> {
        self.send(arena.get(region))
    }

    /// Logs `err`, aborts the reply and hands the error back.
    pub(crate) fn fail(&mut self, err: impl Into<Error>) -> Error {
        let err = err.into();
        error!(error = %err, state = ?self.state, "aborting response");
        self.abort();
        err
    }

    /// A call made in the wrong state. Replies in progress are aborted; outside
    /// a reply the state is left alone.
    pub(crate) fn violation(&mut self, operation: &'static str) -> Error {
        match self.state {
            State::ErrorClosed => Error::Aborted,
            state if state.is_writing() => self.fail(Error::State { operation, state }),
            state => {
                error!(operation, state = ?state, "operation not allowed in this state");
                Error::State { operation, state }
            }
        }
    }
}

fn has_line_break(text: &str) -> bool {
    text.bytes().any(|b| b == b'\r' || b == b'\n')
}

/// `fmt::Write` sink that refuses to grow past `limit` bytes.
struct Bounded<'a> {
    text: &'a mut String,
    limit: usize,
}

impl fmt::Write for Bounded<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.text.len() + s.len() > self.limit {
            return Err(fmt::Error);
        }
        self.text.push_str(s);
        Ok(())
    }
}
