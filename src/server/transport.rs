//! Client socket access.
//!
//! Every operation is a bounded readiness wait followed by a single
//! non-blocking attempt. The tokio reactor does the waiting; the engine
//! itself stays synchronous and drives it with `block_on`.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::time::{Instant, timeout_at};

/// One accepted client connection.
pub trait Transport {
    /// Waits for data (bounded), then reads once. `Ok(0)` means the peer closed.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Waits until writable (bounded), then writes once.
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Shuts the connection down in both directions. Errors are ignored.
    fn close(&mut self);

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn send_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = self.send(data)?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            data = &data[n..];
        }
        Ok(())
    }
}

pub struct TcpTransport {
    stream: TcpStream,
    runtime: Rc<Runtime>,
    timeout: Duration,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    pub(crate) fn new(stream: TcpStream, runtime: Rc<Runtime>, timeout: Duration) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            stream,
            runtime,
            timeout,
            peer,
        }
    }

    fn wait(&self, deadline: Instant, readable: bool) -> io::Result<()> {
        let stream = &self.stream;
        let ready = self.runtime.block_on(async move {
            if readable {
                timeout_at(deadline, stream.readable()).await
            } else {
                timeout_at(deadline, stream.writable()).await
            }
        });

        match ready {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                if readable { "read timed out" } else { "write timed out" },
            )),
        }
    }
}

impl Transport for TcpTransport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.timeout;
        loop {
            self.wait(deadline, true)?;
            match self.stream.try_read(buf) {
                // readiness can be spurious
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                result => return result,
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.timeout;
        loop {
            self.wait(deadline, false)?;
            match self.stream.try_write(data) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                result => return result,
            }
        }
    }

    fn close(&mut self) {
        let deadline = Instant::now() + self.timeout;
        let stream = &mut self.stream;
        let result = self
            .runtime
            .block_on(async move { timeout_at(deadline, stream.shutdown()).await });
        if let Ok(Err(e)) = result {
            tracing::debug!(error = %e, "shutdown failed");
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}
