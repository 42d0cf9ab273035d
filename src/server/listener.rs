use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::runtime::Runtime;
use tracing::info;

use crate::server::transport::{TcpTransport, Transport};

/// Source of client connections.
pub trait Acceptor {
    /// Waits a bounded time for a client. `Ok(None)` means the wait expired.
    fn accept(&mut self) -> io::Result<Option<Box<dyn Transport>>>;

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
    runtime: Rc<Runtime>,
    accept_timeout: Duration,
    io_timeout: Duration,
}

impl TcpAcceptor {
    /// Binds `addr` with `SO_REUSEADDR` and starts listening.
    pub fn bind(
        runtime: Rc<Runtime>,
        addr: SocketAddr,
        backlog: u32,
        accept_timeout: Duration,
        io_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = {
            let _guard = runtime.enter();
            let socket = match addr {
                SocketAddr::V4(_) => TcpSocket::new_v4()?,
                SocketAddr::V6(_) => TcpSocket::new_v6()?,
            };
            socket.set_reuseaddr(true)?;
            socket.bind(addr)?;
            socket.listen(backlog)?
        };
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            runtime,
            accept_timeout,
            io_timeout,
        })
    }
}

impl Acceptor for TcpAcceptor {
    fn accept(&mut self) -> io::Result<Option<Box<dyn Transport>>> {
        let accepted = self
            .runtime
            .block_on(async { tokio::time::timeout(self.accept_timeout, self.listener.accept()).await });

        match accepted {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(e),
            Ok(Ok((stream, peer))) => {
                info!("Accepted connection from {}", peer);
                let transport = TcpTransport::new(stream, Rc::clone(&self.runtime), self.io_timeout);
                Ok(Some(Box::new(transport)))
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}
