//! HTTP/1.1 wire handling for a single connection at a time.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`token`**: Span-based tokens and the line tokenizer
//! - **`parser`**: Parses the request line and header section
//! - **`body`**: Reads `Content-Length` and chunked request bodies
//! - **`request`**: Request record and the read-only view handed to callers
//! - **`connection`**: Protocol state, client socket and header/body buffers
//! - **`writer`**: Response state machine with buffered→chunked fallback
//! - **`response`**: Status codes
//!
//! # Request Cycle
//!
//! ```text
//!        ┌─────────────┐
//!        │   Accept    │ ← Bounded wait for a client
//!        └──────┬──────┘
//!               │ Connection accepted
//!               ▼
//!        ┌──────────────────┐
//!        │  Parse + Body    │ ← Request line, headers, body into the arena
//!        └──────┬───────────┘
//!               │ Request handed to the caller
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Status, headers, buffered or chunked body
//!        └──────┬───────────┘
//!               │ finish
//!               └─ Close → arena restored for the next cycle
//! ```

pub mod body;
pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod token;
pub mod writer;

/// Capacity of the header buffer. Bounds the request line and each header line.
pub const HEAD_BUFFER_SIZE: usize = 8 * 1024;

/// Upper bound on a single socket read into the header buffer.
pub const READ_SIZE: usize = 256;

/// Size of the response body window, and of every on-wire chunk.
pub const CHUNK_SIZE: usize = 4 * 1024;
