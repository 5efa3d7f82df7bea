use mio::net::TcpStream;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Identifies a channel across the lifetime of a connection. Wraps the
/// `mio::Token` used to register the underlying socket with the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub usize);

impl From<mio::Token> for ChannelId {
    fn from(token: mio::Token) -> Self {
        ChannelId(token.0)
    }
}

impl From<ChannelId> for mio::Token {
    fn from(id: ChannelId) -> Self {
        mio::Token(id.0)
    }
}

/// A single TCP connection: a fixed-capacity read buffer compacted in
/// place, and a write-side backlog that only grows when the kernel
/// refuses bytes (`WouldBlock`). Modeled on the `gattaca-com-flux`
/// reference TCP stream's `write_or_enqueue_with`/`drain_backlog` split.
pub struct Channel {
    pub stream: TcpStream,
    read_buf: Vec<u8>,
    read_len: usize,
    write_backlog: VecDeque<Vec<u8>>,
    writable_armed: bool,
    /// `Some(remote)` while an initiator-side connect is still in flight —
    /// the socket is writable-registered but `on_connected` hasn't fired
    /// yet. Cleared (and `remote` no longer needed) once the first
    /// writable readiness confirms the connect via `take_error`.
    connecting: Option<SocketAddr>,
}

impl Channel {
    pub fn new(stream: TcpStream, read_capacity: usize) -> Self {
        Channel {
            stream,
            read_buf: vec![0u8; read_capacity],
            read_len: 0,
            write_backlog: VecDeque::new(),
            writable_armed: false,
            connecting: None,
        }
    }

    /// Marks this channel as an in-flight initiator connect to `remote`,
    /// awaiting the first writable readiness to confirm or fail it.
    pub fn mark_connecting(&mut self, remote: SocketAddr) {
        self.connecting = Some(remote);
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.is_some()
    }

    pub fn connecting_remote(&self) -> Option<SocketAddr> {
        self.connecting
    }

    pub fn clear_connecting(&mut self) {
        self.connecting = None;
    }

    pub fn writable_armed(&self) -> bool {
        self.writable_armed
    }

    pub fn arm_writable(&mut self) {
        self.writable_armed = true;
    }

    pub fn disarm_writable(&mut self) {
        self.writable_armed = false;
    }

    /// Reads as many bytes as the kernel currently has, appending to
    /// whatever bytes are already buffered (the unconsumed remainder from
    /// a prior partial message). Returns the number of new bytes read, or
    /// `Ok(0)` on a clean EOF.
    pub fn read_more(&mut self) -> io::Result<usize> {
        if self.read_len == self.read_buf.len() {
            self.read_buf.resize(self.read_buf.len() * 2, 0);
        }
        match self.stream.read(&mut self.read_buf[self.read_len..]) {
            Ok(0) => Ok(0),
            Ok(n) => {
                self.read_len += n;
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }

    pub fn readable(&self) -> &[u8] {
        &self.read_buf[..self.read_len]
    }

    /// Drops `consumed` bytes from the front of the read buffer, moving
    /// whatever remains (an incomplete next message) down to offset 0.
    pub fn consume(&mut self, consumed: usize) {
        debug_assert!(consumed <= self.read_len);
        let remaining = self.read_len - consumed;
        if remaining > 0 {
            self.read_buf.copy_within(consumed..self.read_len, 0);
        }
        self.read_len = remaining;
    }

    /// Writes `bytes` now if the socket accepts them; queues whatever the
    /// kernel would not take and arms writable-interest so the event loop
    /// retries on the next `Writable` readiness.
    pub fn write_or_enqueue(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.write_backlog.is_empty() {
            self.write_backlog.push_back(bytes.to_vec());
            return Ok(());
        }
        match self.stream.write(bytes) {
            Ok(n) if n == bytes.len() => Ok(()),
            Ok(n) => {
                self.write_backlog.push_back(bytes[n..].to_vec());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.write_backlog.push_back(bytes.to_vec());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drains as much of the backlog as the kernel will accept. Returns
    /// `true` once the backlog is fully drained (writable-interest can be
    /// disarmed).
    pub fn drain_backlog(&mut self) -> io::Result<bool> {
        while let Some(front) = self.write_backlog.front_mut() {
            match self.stream.write(front) {
                Ok(n) if n == front.len() => {
                    self.write_backlog.pop_front();
                }
                Ok(n) => {
                    front.drain(..n);
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub fn has_backlog(&self) -> bool {
        !self.write_backlog.is_empty()
    }
}
