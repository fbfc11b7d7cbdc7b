//! A single client connection to one SurgeKV server.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use surge_common::prelude::*;
use surge_protocol::codec::{read_frame, write_frame};
use surge_protocol::message::{Request, Response};

/// One TCP connection to one server.
///
/// Calls are strict request/response pairs; the stream mutex serializes
/// concurrent callers sharing a connection, so frames never interleave.
pub struct Connection {
    addr: String,
    stream: Mutex<TcpStream>,
}

impl Connection {
    /// Connect to `addr` (`host:port`) with the given dial timeout.
    pub async fn dial(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Internal(format!("timed out connecting to {addr}")))??;
        stream.set_nodelay(true)?;

        debug!(addr, "connected");
        Ok(Self {
            addr: addr.to_string(),
            stream: Mutex::new(stream),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, request).await?;
        read_frame(&mut *stream).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("addr", &self.addr).finish()
    }
}

/// Dial every host in order. The resulting vector's order defines the shard
/// layout, so all clients of a deployment must pass the same list.
pub async fn dial_hosts(hosts: &[String], connect_timeout: Duration) -> Result<Vec<Connection>> {
    let mut connections = Vec::with_capacity(hosts.len());
    for host in hosts {
        connections.push(Connection::dial(host, connect_timeout).await?);
    }
    Ok(connections)
}
