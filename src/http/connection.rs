use std::io;

use tracing::debug;

use crate::error::{Error, Result};
use crate::http::READ_SIZE;
use crate::http::token::find_crlf;
use crate::memory::{Arena, Buffer};
use crate::server::transport::Transport;

/// Protocol state of the engine.
///
/// ```text
/// Configured ──read──▶ AwaitingRequest ──request parsed──▶ AwaitingStatus
///                            ▲                                  │ set_status
///                            │                                  ▼
///                            │                             HeadersOpen
///                            │                                  │ body bytes
///                            │                                  ▼
///                            │   finish              BodyBuffered ──memory full──▶ BodyChunked
///                            └──────────────────────────────────┴───────────────────────┘
///
/// any writing state ──failure──▶ ErrorClosed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Initialized; templates and functions may be registered.
    Configured,
    AwaitingRequest,
    AwaitingStatus,
    HeadersOpen,
    BodyBuffered,
    BodyChunked,
    /// The reply was aborted and the socket closed.
    ErrorClosed,
}

impl State {
    /// States in which a client socket is attached and a reply is in progress.
    pub fn is_writing(&self) -> bool {
        matches!(
            self,
            State::AwaitingStatus | State::HeadersOpen | State::BodyBuffered | State::BodyChunked
        )
    }
}

/// Per-connection plumbing: the client socket plus the buffers that carry
/// request headers in and response headers/body out.
pub(crate) struct Connection {
    pub state: State,
    /// Request headers on the way in, response headers on the way out.
    pub head: Buffer,
    pub body: Option<Buffer>,
    /// HEAD requests get framing headers but no body bytes.
    pub omit_body: bool,
    pub(super) peer: Option<Box<dyn Transport>>,
    /// Whether any reply bytes reached the socket this cycle.
    pub(super) sent: bool,
    pub(super) scratch: String,
}

impl Connection {
    pub fn new(head: Buffer) -> Self {
        Self {
            state: State::Configured,
            head,
            body: None,
            omit_body: false,
            peer: None,
            sent: false,
            scratch: String::new(),
        }
    }

    pub fn attach(&mut self, peer: Box<dyn Transport>) {
        self.peer = Some(peer);
        self.sent = false;
    }

    /// Forgets all per-cycle buffers. The arena regions they pointed at are
    /// reclaimed separately.
    pub fn reset(&mut self) {
        self.head.clear();
        self.body = None;
        self.omit_body = false;
        self.sent = false;
    }

    pub fn close(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
    }

    /// Makes sure a complete CRLF-terminated line sits at the start of the
    /// pending header bytes, reading more from the socket as needed.
    ///
    /// Returns the line length including the CRLF.
    pub fn ensure_line(&mut self, arena: &mut Arena) -> Result<usize> {
        let mut scanned = 0;
        loop {
            let pending = self.head.pending_slice(arena);
            if let Some(pos) = find_crlf(&pending[scanned..]) {
                return Ok(scanned + pos + 2);
            }
            // a CR at the very end may pair with the next byte read
            scanned = pending.len().saturating_sub(1);

            if self.head.is_full() && !self.head.compact(arena) {
                return Err(Error::Internal("line does not fit in header buffer".into()));
            }

            match receive(self.peer.as_deref_mut(), arena, &mut self.head, READ_SIZE) {
                Ok(_) => {}
                Err(Error::Disconnect) => {
                    return Err(Error::BadRequest("connection closed before end of line"));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads once from the socket into `buf`, at most `max` bytes.
    pub fn receive_into(&mut self, arena: &mut Arena, buf: &mut Buffer, max: usize) -> Result<usize> {
        receive(self.peer.as_deref_mut(), arena, buf, max)
    }

    /// Sends raw bytes to the client.
    pub(super) fn send(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let peer = self.peer.as_deref_mut().ok_or(Error::Disconnect)?;
        self.sent = true;
        peer.send_all(data).map_err(io_error)
    }
}

fn receive(
    peer: Option<&mut (dyn Transport + 'static)>,
    arena: &mut Arena,
    buf: &mut Buffer,
    max: usize,
) -> Result<usize> {
    let peer = peer.ok_or(Error::Disconnect)?;

    let spare = buf.spare_mut(arena);
    let want = max.min(spare.len());
    if want == 0 {
        return Err(Error::Internal("no space left in buffer".into()));
    }

    match peer.recv(&mut spare[..want]) {
        Ok(0) => Err(Error::Disconnect),
        Ok(n) => {
            buf.commit(n);
            Ok(n)
        }
        Err(e) => Err(io_error(e)),
    }
}

/// Socket failures on an established connection.
pub(crate) fn io_error(e: io::Error) -> Error {
    match e.kind() {
        // a silent peer is treated like one that hung up
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::WriteZero => {
            debug!(error = %e, "peer went away");
            Error::Disconnect
        }
        _ => Error::Internal(format!("socket error: {e}")),
    }
}
