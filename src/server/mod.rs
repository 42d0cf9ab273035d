//! The engine: one accept → parse → respond → close cycle at a time.
//!
//! ```ignore
//! let mut server = Server::bind(&config)?;
//! let page = server.compile(PAGE)?;
//!
//! loop {
//!     match server.read()? {
//!         Read::Request(_) => {
//!             server.set_status_code(StatusCode::Ok)?;
//!             server.render_template(&page)?;
//!         }
//!         Read::Timeout | Read::Continue => continue,
//!     }
//! }
//! ```

pub mod listener;
pub mod transport;

use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::runtime::Builder;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::HEAD_BUFFER_SIZE;
use crate::http::body::read_body;
use crate::http::connection::{Connection, State};
use crate::http::parser::parse_head;
use crate::http::request::{Method, Request, RequestRef};
use crate::http::response::StatusCode;
use crate::memory::{Arena, Buffer, Checkpoint};
use crate::template::{FunctionTable, Segment, Template, TemplateError, TemplateFunction};

use self::listener::{Acceptor, TcpAcceptor};

/// Outcome of [`Server::read`].
#[derive(Debug)]
pub enum Read<'a> {
    /// A request was parsed; a reply is expected before the next `read`.
    Request(RequestRef<'a>),
    /// No client arrived within the idle wait.
    Timeout,
    /// The request was rejected and already answered. Read again.
    Continue,
}

pub struct Server {
    arena: Arena,
    conn: Connection,
    request: Request,
    functions: FunctionTable,
    acceptor: Box<dyn Acceptor>,
    /// Arena position once configuration is over; every cycle rewinds to it.
    checkpoint: Option<Checkpoint>,
}

impl Server {
    /// Binds a TCP listener as described by `config`.
    pub fn bind(config: &Config) -> Result<Self> {
        let config = config.clone().normalized();

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Fatal)?;
        let acceptor = TcpAcceptor::bind(
            Rc::new(runtime),
            config.socket_addr(),
            config.backlog,
            config.accept_timeout(),
            config.io_timeout(),
        )
        .map_err(|e| {
            error!(addr = %config.socket_addr(), error = %e, "cannot listen");
            Error::Fatal(e)
        })?;

        Self::with_acceptor(&config, Box::new(acceptor))
    }

    /// Builds an engine that takes its connections from `acceptor`.
    pub fn with_acceptor(config: &Config, acceptor: Box<dyn Acceptor>) -> Result<Self> {
        let config = config.clone().normalized();

        let mut arena = Arena::new(config.total_memory)?;
        let head = Buffer::allocate(&mut arena, HEAD_BUFFER_SIZE)?;
        info!(memory = arena.capacity(), "server initialized");

        Ok(Self {
            arena,
            conn: Connection::new(head),
            request: Request::default(),
            functions: FunctionTable::new(),
            acceptor,
            checkpoint: None,
        })
    }

    /// Closes any open client connection and releases the engine.
    pub fn teardown(mut self) {
        self.conn.close();
        info!(
            high_water = self.arena.high_water(),
            capacity = self.arena.capacity(),
            "server shut down"
        );
    }

    /// Registers a template function. Only allowed before the first [`Server::read`].
    pub fn register_function<F>(&mut self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(&mut Server) -> Result<()> + 'static,
    {
        if self.conn.state != State::Configured {
            return Err(self.conn.violation("register_function"));
        }
        self.functions.register(name, Rc::new(callback))?;
        Ok(())
    }

    /// Compiles `source`, which must outlive the returned template. Only
    /// allowed before the first [`Server::read`].
    pub fn compile<'s>(&mut self, source: &'s str) -> Result<Template<'s>> {
        if self.conn.state != State::Configured {
            return Err(self.conn.violation("compile"));
        }
        Ok(self.functions.compile(source)?)
    }

    /// Waits for the next request.
    ///
    /// The previous cycle's request and everything allocated for it are
    /// reclaimed first. Malformed requests are answered with 400 or 500 and
    /// reported as [`Read::Continue`]. Only a failing listener is an error.
    pub fn read(&mut self) -> Result<Read<'_>> {
        match self.conn.state {
            State::Configured => {
                let checkpoint = self.arena.checkpoint();
                debug!(used = checkpoint.used(), "configuration complete");
                self.checkpoint = Some(checkpoint);
            }
            State::AwaitingRequest => {}
            State::ErrorClosed => debug!("previous response was aborted"),
            _ => return Err(self.conn.violation("read")),
        }
        self.begin_cycle();

        let peer = match self.acceptor.accept() {
            Ok(Some(peer)) => peer,
            Ok(None) => return Ok(Read::Timeout),
            Err(e) => {
                error!(error = %e, "accept failed");
                return Err(Error::Fatal(e));
            }
        };
        self.conn.attach(peer);

        match self.receive_request() {
            Ok(()) => {
                self.conn.state = State::AwaitingStatus;
                Ok(Read::Request(RequestRef::new(&self.request, &self.arena)))
            }
            Err(e) if e.is_request_error() => {
                self.reject(&e);
                Ok(Read::Continue)
            }
            Err(e) => {
                self.conn.abort();
                self.conn.state = State::AwaitingRequest;
                Err(e)
            }
        }
    }

    /// The request of the current cycle, if one was read.
    pub fn request(&self) -> Option<RequestRef<'_>> {
        self.request
            .method
            .is_some()
            .then(|| RequestRef::new(&self.request, &self.arena))
    }

    pub fn set_status(&mut self, code: u16, text: &str) -> Result<()> {
        self.conn.set_status(&mut self.arena, code, text)?;
        self.request.status = Some(code);
        Ok(())
    }

    pub fn set_status_code(&mut self, status: StatusCode) -> Result<()> {
        self.set_status(status.as_u16(), status.reason_phrase())
    }

    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.conn.add_header(&mut self.arena, name, value)
    }

    pub fn write_body_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.conn.write_body_bytes(&mut self.arena, data)
    }

    pub fn write_body_text(&mut self, text: &str) -> Result<()> {
        self.write_body_bytes(text.as_bytes())
    }

    /// Use with `format_args!`.
    pub fn write_body_formatted(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.conn.write_body_formatted(&mut self.arena, args)
    }

    /// Sends the rest of the reply and closes the connection.
    pub fn finish(&mut self) -> Result<()> {
        self.conn.finish(&mut self.arena)
    }

    /// Writes `template` as the body, calling bound functions in place of
    /// their markers, then finishes the reply.
    pub fn render_template(&mut self, template: &Template<'_>) -> Result<()> {
        self.conn.begin_body(&mut self.arena)?;
        if template.table() != self.functions.id() {
            return Err(self.conn.fail(TemplateError::ForeignTemplate));
        }

        for segment in template.segments() {
            match *segment {
                Segment::Text(text) => self.write_body_text(text)?,
                Segment::Function(id) => match self.functions.get(id) {
                    Some(TemplateFunction::Bound { callback, .. }) => {
                        let callback = Rc::clone(callback);
                        if let Err(e) = callback(&mut *self) {
                            if self.state().is_writing() {
                                return Err(self.conn.fail(e));
                            }
                            return Err(e);
                        }
                    }
                    Some(TemplateFunction::Unbound { name }) => self.conn.write_body_formatted(
                        &mut self.arena,
                        format_args!("<span>undefined template function: '{name}'</span>"),
                    )?,
                    None => {
                        return Err(self.conn.fail(Error::Internal("unknown template function".into())));
                    }
                },
            }
        }

        self.finish()
    }

    pub fn state(&self) -> State {
        self.conn.state
    }

    /// Memory accounting: `used`, `capacity` and `high_water`.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.local_addr()
    }

    fn begin_cycle(&mut self) {
        if let Some(checkpoint) = self.checkpoint {
            self.arena.restore(checkpoint);
        }
        self.request.clear();
        self.conn.close();
        self.conn.reset();
        self.conn.state = State::AwaitingRequest;
    }

    fn receive_request(&mut self) -> Result<()> {
        let framing = parse_head(&mut self.conn, &mut self.arena, &mut self.request)?;
        self.request.body = read_body(&mut self.conn, &mut self.arena, framing)?;
        self.conn.omit_body = self.request.method == Some(Method::HEAD);

        debug!(
            uri = RequestRef::new(&self.request, &self.arena).target(),
            headers = self.request.headers.len(),
            body = self.request.body.map_or(0, |b| b.len()),
            "request received"
        );
        Ok(())
    }

    /// Best-effort 400/500 for a request that could not be read.
    fn reject(&mut self, err: &Error) {
        let status = err.status();
        warn!(error = %err, status = status.as_u16(), "rejecting request");

        self.conn.state = State::AwaitingStatus;
        let replied = self
            .conn
            .set_status(&mut self.arena, status.as_u16(), status.reason_phrase())
            .and_then(|()| self.conn.finish(&mut self.arena));
        if let Err(e) = replied {
            debug!(error = %e, "could not deliver error reply");
        }

        self.conn.close();
        self.conn.state = State::AwaitingRequest;
    }
}
