//! Ember - single-connection HTTP/1.1 server engine
//!
//! Requests are parsed into a fixed-size arena that is rewound after every
//! cycle. Replies are buffered to send an exact `Content-Length` and fall back
//! to chunked transfer when memory runs short. HTML templates splice the
//! output of registered functions into literal text.

pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod server;
pub mod template;

pub use config::Config;
pub use error::{Error, Result};
pub use http::connection::State;
pub use http::request::{Header, Method, RequestRef};
pub use http::response::StatusCode;
pub use server::{Read, Server};
pub use template::Template;
