//! # Surge Protocol
//!
//! Wire protocol for SurgeKV:
//! - Request/response message types with a structured conflict channel
//! - Length-prefixed bincode framing over TCP
//! - The server accept loop with connection limiting
//!
//! One connection carries one request/response exchange at a time; the client
//! serializes calls on its end, so the server loop never needs to interleave
//! frames.

pub mod codec;
pub mod message;
pub mod server;

pub use codec::{read_frame, write_frame, MAX_FRAME_LEN};
pub use message::{GetReply, Request, Response};
pub use server::{serve, serve_with_cancel, ConnectionLimiter, RequestHandler};

use std::io;

use tokio::net::TcpStream;

/// Set TCP keepalive on a stream to detect dead connections.
pub fn set_tcp_keepalive(stream: &TcpStream) -> io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(std::time::Duration::from_secs(60))
        .with_interval(std::time::Duration::from_secs(10));
    sock_ref.set_tcp_keepalive(&keepalive)
}
