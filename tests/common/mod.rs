#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use ember::server::listener::Acceptor;
use ember::server::transport::Transport;
use ember::{Config, Server};

/// In-memory client: replays scripted input chunks and records everything sent.
/// Once the script runs out, reads report a closed peer.
pub struct ScriptedPeer {
    input: VecDeque<Vec<u8>>,
    output: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

impl Transport for ScriptedPeer {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.input.front_mut() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.input.pop_front();
        }
        Ok(n)
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.output.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

/// Client side of a [`ScriptedPeer`].
pub struct Client {
    output: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

impl Client {
    pub fn raw(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }

    pub fn response(&self) -> String {
        String::from_utf8_lossy(&self.output.borrow()).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Hands out the scripted peers in order, then times out.
pub struct ScriptedAcceptor {
    peers: VecDeque<ScriptedPeer>,
}

impl Acceptor for ScriptedAcceptor {
    fn accept(&mut self) -> io::Result<Option<Box<dyn Transport>>> {
        Ok(self
            .peers
            .pop_front()
            .map(|peer| Box::new(peer) as Box<dyn Transport>))
    }
}

pub struct FailingAcceptor;

impl Acceptor for FailingAcceptor {
    fn accept(&mut self) -> io::Result<Option<Box<dyn Transport>>> {
        Err(io::Error::other("listener gone"))
    }
}

pub fn config(total_memory: usize) -> Config {
    Config {
        total_memory,
        ..Config::default()
    }
}

/// One connection per entry, each delivering its input in the given chunks.
pub fn server_with_chunks(config: &Config, connections: Vec<Vec<Vec<u8>>>) -> (Server, Vec<Client>) {
    let mut peers = VecDeque::new();
    let mut clients = Vec::new();

    for chunks in connections {
        let output = Rc::new(RefCell::new(Vec::new()));
        let closed = Rc::new(Cell::new(false));
        peers.push_back(ScriptedPeer {
            input: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
            output: Rc::clone(&output),
            closed: Rc::clone(&closed),
        });
        clients.push(Client { output, closed });
    }

    let server = Server::with_acceptor(config, Box::new(ScriptedAcceptor { peers })).unwrap();
    (server, clients)
}

/// One connection per request, each delivered in a single chunk.
pub fn server_with(requests: &[&[u8]]) -> (Server, Vec<Client>) {
    let connections = requests.iter().map(|r| vec![r.to_vec()]).collect();
    server_with_chunks(&Config::default(), connections)
}

/// Splits a raw response into its header section and body.
pub fn split_response(raw: &str) -> (&str, &str) {
    raw.split_once("\r\n\r\n").unwrap()
}

/// Decodes a chunked body that ends with the connection rather than a zero-size chunk.
pub fn decode_chunked(mut body: &str) -> String {
    let mut decoded = String::new();
    while !body.is_empty() {
        let (size, rest) = body.split_once("\r\n").unwrap();
        let size = usize::from_str_radix(size, 16).unwrap();
        decoded.push_str(&rest[..size]);
        assert_eq!(&rest[size..size + 2], "\r\n");
        body = &rest[size + 2..];
    }
    decoded
}
