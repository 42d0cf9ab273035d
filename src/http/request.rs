use std::ffi::CStr;
use std::fmt;
use std::str;

use crate::memory::{Arena, Region};

/// HTTP request methods the engine accepts. Anything else is a bad request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data
    POST,
    /// HEAD - Like GET but without the response body
    HEAD,
}

impl Method {
    /// Parses a method token.
    ///
    /// Matching is case-sensitive, as method names are on the wire.
    ///
    /// ```
    /// # use ember::http::request::Method;
    /// assert_eq!(Method::from_bytes(b"GET"), Some(Method::GET));
    /// assert_eq!(Method::from_bytes(b"get"), None);
    /// assert_eq!(Method::from_bytes(b"PUT"), None);
    /// ```
    pub fn from_bytes(s: &[u8]) -> Option<Self> {
        match s {
            b"GET" => Some(Method::GET),
            b"POST" => Some(Method::POST),
            b"HEAD" => Some(Method::HEAD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::HEAD => "HEAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderSpan {
    pub name: Region,
    pub value: Region,
}

/// The request of the current cycle.
///
/// Strings and body bytes live in the arena; this struct only holds their
/// regions, in wire order. Everything is dropped en masse when the next
/// cycle restores the arena, so the record is cleared at the same time.
#[derive(Debug, Default)]
pub(crate) struct Request {
    pub method: Option<Method>,
    pub target: Region,
    pub version: Region,
    pub headers: Vec<HeaderSpan>,
    pub path: Vec<Region>,
    pub body: Option<Region>,
    pub content_length: Option<usize>,
    pub chunked: bool,
    pub status: Option<u16>,
}

impl Request {
    pub fn clear(&mut self) {
        self.method = None;
        self.target = Region::default();
        self.version = Region::default();
        self.headers.clear();
        self.path.clear();
        self.body = None;
        self.content_length = None;
        self.chunked = false;
        self.status = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// Read-only view of the current request.
#[derive(Clone, Copy)]
pub struct RequestRef<'a> {
    request: &'a Request,
    arena: &'a Arena,
}

impl<'a> RequestRef<'a> {
    pub(crate) fn new(request: &'a Request, arena: &'a Arena) -> Self {
        Self { request, arena }
    }

    pub fn method(&self) -> Method {
        self.request.method.unwrap_or(Method::GET)
    }

    /// Request-target as sent, query included.
    pub fn target(&self) -> &'a str {
        self.text(self.request.target)
    }

    pub fn version(&self) -> &'a str {
        self.text(self.request.version)
    }

    /// Headers in wire order, recognized or not.
    pub fn headers(&self) -> impl Iterator<Item = Header<'a>> + use<'a> {
        let (request, arena): (&'a Request, &'a Arena) = (self.request, self.arena);
        request.headers.iter().map(move |h| Header {
            name: str::from_utf8(arena.get(h.name)).unwrap_or_default(),
            value: str::from_utf8(arena.get(h.value)).unwrap_or_default(),
        })
    }

    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value)
    }

    /// Non-empty `/`-separated segments of the path, stopping at `?`.
    pub fn path(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        let (request, arena): (&'a Request, &'a Arena) = (self.request, self.arena);
        request
            .path
            .iter()
            .map(move |r| str::from_utf8(arena.get(*r)).unwrap_or_default())
    }

    pub fn path_len(&self) -> usize {
        self.request.path.len()
    }

    pub fn segment(&self, index: usize) -> Option<&'a str> {
        self.request.path.get(index).map(|r| self.text(*r))
    }

    /// Body bytes, without the trailing sentinel.
    pub fn body(&self) -> &'a [u8] {
        match self.request.body {
            Some(region) => self.arena.get(region),
            None => &[],
        }
    }

    pub fn body_len(&self) -> usize {
        self.request.body.map_or(0, |r| r.len())
    }

    /// Body as a NUL-terminated string, up to its first NUL byte.
    pub fn body_c_str(&self) -> Option<&'a CStr> {
        let body = self.request.body?;
        let with_sentinel = self.arena.get(Region::new(body.offset(), body.len() + 1));
        CStr::from_bytes_until_nul(with_sentinel).ok()
    }

    pub fn content_length(&self) -> Option<usize> {
        self.request.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.request.chunked
    }

    /// Status code of the reply, once one has been set.
    pub fn status(&self) -> Option<u16> {
        self.request.status
    }

    fn text(&self, region: Region) -> &'a str {
        str::from_utf8(self.arena.get(region)).unwrap_or_default()
    }
}

impl fmt::Debug for RequestRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method())
            .field("target", &self.target())
            .field("headers", &self.request.headers.len())
            .field("body_len", &self.body_len())
            .finish()
    }
}
