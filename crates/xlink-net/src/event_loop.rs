use crate::channel::{Channel, ChannelId};
use crate::error::NetError;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_READ_CAPACITY: usize = 4096;

/// Callbacks invoked by [`EventLoop::run_once`]. Framing lives entirely in
/// `on_data_received`: it is handed everything read so far and returns how
/// many bytes it consumed, leaving the remainder buffered for the next
/// readiness event (spec.md §4.E).
pub trait Handler {
    fn on_connected(&mut self, channel: ChannelId);
    /// `buf` is the full unconsumed read buffer for `channel`. Returns the
    /// number of bytes consumed; anything left over is retried once more
    /// data arrives.
    fn on_data_received(&mut self, channel: ChannelId, buf: &[u8]) -> usize;
    fn on_disconnected(&mut self, channel: ChannelId, cause: Option<&NetError>);
    fn on_connect_failed(&mut self, remote: SocketAddr, cause: &NetError);
    fn on_accept_failed(&mut self, cause: &NetError);
}

enum Endpoint {
    Acceptor(TcpListener),
    Channel(Channel),
}

/// The single-threaded non-blocking event loop: one `mio::Poll`, a
/// `Token`-indexed set of listeners and connections, fixed per-channel
/// buffers. Nothing here spawns a thread or blocks past the poll timeout.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    endpoints: HashMap<Token, Endpoint>,
    next_token: usize,
}

impl EventLoop {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(EventLoop {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
            endpoints: HashMap::new(),
            next_token: 0,
        })
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Binds and registers a listening socket; accepted connections are
    /// reported via `on_connected` as they arrive in `run_once`.
    pub fn listen(&mut self, addr: SocketAddr) -> io::Result<()> {
        let mut listener = TcpListener::bind(addr)?;
        let token = self.alloc_token();
        self.poll.registry().register(&mut listener, token, Interest::READABLE)?;
        self.endpoints.insert(token, Endpoint::Acceptor(listener));
        Ok(())
    }

    /// Begins a non-blocking connect. The channel is usable once the first
    /// writable readiness confirms the connect completed (reported via
    /// `on_connected`, checked with `take_error` per the `mio::TcpStream`
    /// four-step connect recipe), or `on_connect_failed` if it failed.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<ChannelId, NetError> {
        let stream = TcpStream::connect(addr).map_err(|source| NetError::ConnectFailed { remote: addr, source })?;
        let token = self.alloc_token();
        let mut channel = Channel::new(stream, DEFAULT_READ_CAPACITY);
        channel.mark_connecting(addr);
        self.poll
            .registry()
            .register(&mut channel.stream, token, Interest::READABLE | Interest::WRITABLE)
            .map_err(NetError::Io)?;
        self.endpoints.insert(token, Endpoint::Channel(channel));
        Ok(ChannelId::from(token))
    }

    pub fn send(&mut self, channel: ChannelId, bytes: &[u8]) -> io::Result<()> {
        let token = Token::from(channel);
        let Some(Endpoint::Channel(ch)) = self.endpoints.get_mut(&token) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown channel"));
        };
        let was_empty = !ch.has_backlog();
        ch.write_or_enqueue(bytes)?;
        if ch.has_backlog() && !ch.writable_armed() {
            ch.arm_writable();
            self.poll
                .registry()
                .reregister(&mut ch.stream, token, Interest::READABLE | Interest::WRITABLE)?;
        }
        let _ = was_empty;
        Ok(())
    }

    pub fn disconnect(&mut self, channel: ChannelId) {
        let token = Token::from(channel);
        if let Some(Endpoint::Channel(mut ch)) = self.endpoints.remove(&token) {
            let _ = self.poll.registry().deregister(&mut ch.stream);
        }
    }

    /// Polls once with `timeout` and dispatches every ready event to
    /// `handler`. Returns the number of readiness events processed.
    pub fn run_once(&mut self, handler: &mut dyn Handler, timeout: Option<Duration>) -> io::Result<usize> {
        self.poll.poll(&mut self.events, timeout)?;
        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable(), e.is_writable()))
            .collect();
        let count = ready.len();

        for (token, readable, writable) in ready {
            match self.endpoints.get(&token) {
                Some(Endpoint::Acceptor(_)) => {
                    self.accept_loop(token, handler);
                    continue;
                }
                Some(Endpoint::Channel(ch)) if ch.is_connecting() => {
                    // A refused/failed connect can surface as readable
                    // (error pending) rather than writable — resolve via
                    // `take_error` regardless of which interest fired.
                    self.connect_confirm_event(token, handler);
                    continue;
                }
                _ => {}
            }
            if readable {
                self.readable_event(token, handler);
            }
            if writable {
                self.writable_event(token, handler);
            }
        }
        Ok(count)
    }

    fn accept_loop(&mut self, token: Token, handler: &mut dyn Handler) {
        loop {
            let Some(Endpoint::Acceptor(listener)) = self.endpoints.get(&token) else {
                return;
            };
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let child_token = self.alloc_token();
                    let mut channel = Channel::new(stream, DEFAULT_READ_CAPACITY);
                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut channel.stream, child_token, Interest::READABLE)
                    {
                        handler.on_accept_failed(&NetError::Io(e));
                        continue;
                    }
                    self.endpoints.insert(child_token, Endpoint::Channel(channel));
                    handler.on_connected(ChannelId::from(child_token));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    handler.on_accept_failed(&NetError::Io(e));
                    return;
                }
            }
        }
    }

    fn readable_event(&mut self, token: Token, handler: &mut dyn Handler) {
        loop {
            let Some(Endpoint::Channel(ch)) = self.endpoints.get_mut(&token) else {
                return;
            };
            match ch.read_more() {
                Ok(0) => {
                    self.tear_down(token, handler, None);
                    return;
                }
                Ok(_) => {
                    let consumed = handler.on_data_received(ChannelId::from(token), ch.readable());
                    if let Some(Endpoint::Channel(ch)) = self.endpoints.get_mut(&token) {
                        ch.consume(consumed);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!(?e, "channel read error");
                    let cause = NetError::Io(e);
                    self.tear_down(token, handler, Some(cause));
                    return;
                }
            }
        }
    }

    fn writable_event(&mut self, token: Token, handler: &mut dyn Handler) {
        let Some(Endpoint::Channel(ch)) = self.endpoints.get_mut(&token) else {
            return;
        };
        match ch.drain_backlog() {
            Ok(true) => {
                ch.disarm_writable();
                if let Some(Endpoint::Channel(ch)) = self.endpoints.get_mut(&token) {
                    let _ = self.poll.registry().reregister(&mut ch.stream, token, Interest::READABLE);
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(?e, "channel write error");
                let cause = NetError::Io(e);
                self.tear_down(token, handler, Some(cause));
            }
        }
    }

    /// The first writable readiness after `connect()` confirms the
    /// connect rather than meaning "ready to drain a backlog" — check
    /// `take_error` to tell a completed connect from a failed one before
    /// treating the channel as open.
    fn connect_confirm_event(&mut self, token: Token, handler: &mut dyn Handler) {
        let Some(Endpoint::Channel(ch)) = self.endpoints.get_mut(&token) else {
            return;
        };
        let remote = ch.connecting_remote();
        let result = ch.stream.take_error();
        match result {
            Ok(None) => {
                ch.clear_connecting();
                let has_backlog = ch.has_backlog();
                if !has_backlog {
                    let _ = self.poll.registry().reregister(&mut ch.stream, token, Interest::READABLE);
                }
                handler.on_connected(ChannelId::from(token));
            }
            Ok(Some(e)) => self.tear_down_connect_failure(token, handler, remote, e),
            Err(e) => self.tear_down_connect_failure(token, handler, remote, e),
        }
    }

    fn tear_down_connect_failure(
        &mut self,
        token: Token,
        handler: &mut dyn Handler,
        remote: Option<SocketAddr>,
        error: io::Error,
    ) {
        if let Some(Endpoint::Channel(mut ch)) = self.endpoints.remove(&token) {
            let _ = self.poll.registry().deregister(&mut ch.stream);
        }
        let Some(remote) = remote else {
            return;
        };
        handler.on_connect_failed(remote, &NetError::Io(error));
    }

    fn tear_down(&mut self, token: Token, handler: &mut dyn Handler, cause: Option<NetError>) {
        if let Some(Endpoint::Channel(mut ch)) = self.endpoints.remove(&token) {
            let _ = self.poll.registry().deregister(&mut ch.stream);
        }
        handler.on_disconnected(ChannelId::from(token), cause.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as StdTcpStream;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        connected: Vec<ChannelId>,
        received: Vec<Vec<u8>>,
        disconnected: Vec<ChannelId>,
        connect_failed: Vec<SocketAddr>,
    }

    struct RecordingHandler(Arc<Mutex<Recording>>);

    impl Handler for RecordingHandler {
        fn on_connected(&mut self, channel: ChannelId) {
            self.0.lock().unwrap().connected.push(channel);
        }
        fn on_data_received(&mut self, _channel: ChannelId, buf: &[u8]) -> usize {
            self.0.lock().unwrap().received.push(buf.to_vec());
            buf.len()
        }
        fn on_disconnected(&mut self, channel: ChannelId, _cause: Option<&NetError>) {
            self.0.lock().unwrap().disconnected.push(channel);
        }
        fn on_connect_failed(&mut self, remote: SocketAddr, _cause: &NetError) {
            self.0.lock().unwrap().connect_failed.push(remote);
        }
        fn on_accept_failed(&mut self, _cause: &NetError) {}
    }

    #[test]
    fn accept_then_read_reports_connect_and_data() {
        let mut event_loop = EventLoop::new(16).unwrap();
        event_loop.listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let Endpoint::Acceptor(listener) = event_loop.endpoints.values().next().unwrap() else {
            panic!("expected acceptor");
        };
        let addr = listener.local_addr().unwrap();

        let recording = Arc::new(Mutex::new(Recording::default()));
        let mut handler = RecordingHandler(recording.clone());

        let mut client = StdTcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();

        // accept
        let mut iterations = 0;
        while recording.lock().unwrap().connected.is_empty() && iterations < 20 {
            event_loop.run_once(&mut handler, Some(Duration::from_millis(50))).unwrap();
            iterations += 1;
        }
        assert_eq!(recording.lock().unwrap().connected.len(), 1);

        use std::io::Write;
        client.write_all(b"hello").unwrap();

        iterations = 0;
        while recording.lock().unwrap().received.is_empty() && iterations < 20 {
            event_loop.run_once(&mut handler, Some(Duration::from_millis(50))).unwrap();
            iterations += 1;
        }
        assert_eq!(recording.lock().unwrap().received[0], b"hello");
    }

    #[test]
    fn peer_close_reports_disconnect() {
        let mut event_loop = EventLoop::new(16).unwrap();
        event_loop.listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let Endpoint::Acceptor(listener) = event_loop.endpoints.values().next().unwrap() else {
            panic!("expected acceptor");
        };
        let addr = listener.local_addr().unwrap();

        let recording = Arc::new(Mutex::new(Recording::default()));
        let mut handler = RecordingHandler(recording.clone());

        let client = StdTcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();

        let mut iterations = 0;
        while recording.lock().unwrap().connected.is_empty() && iterations < 20 {
            event_loop.run_once(&mut handler, Some(Duration::from_millis(50))).unwrap();
            iterations += 1;
        }
        drop(client);

        iterations = 0;
        while recording.lock().unwrap().disconnected.is_empty() && iterations < 20 {
            event_loop.run_once(&mut handler, Some(Duration::from_millis(50))).unwrap();
            iterations += 1;
        }
        assert_eq!(recording.lock().unwrap().disconnected.len(), 1);
    }

    #[test]
    fn initiator_connect_reports_on_connected_once_writable() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let addr = std_listener.local_addr().unwrap();

        let mut event_loop = EventLoop::new(16).unwrap();
        let channel = event_loop.connect(addr).unwrap();

        let recording = Arc::new(Mutex::new(Recording::default()));
        let mut handler = RecordingHandler(recording.clone());

        let mut accepted = None;
        let mut iterations = 0;
        while accepted.is_none() && iterations < 50 {
            accepted = std_listener.accept().ok();
            event_loop.run_once(&mut handler, Some(Duration::from_millis(20))).unwrap();
            iterations += 1;
        }
        assert!(accepted.is_some(), "peer never accepted the connection");

        iterations = 0;
        while recording.lock().unwrap().connected.is_empty() && iterations < 50 {
            event_loop.run_once(&mut handler, Some(Duration::from_millis(20))).unwrap();
            iterations += 1;
        }
        assert_eq!(recording.lock().unwrap().connected, vec![channel]);
    }

    #[test]
    fn initiator_connect_to_closed_port_reports_connect_failed() {
        let bound = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = bound.local_addr().unwrap();
        drop(bound);

        let mut event_loop = EventLoop::new(16).unwrap();
        event_loop.connect(addr).unwrap();

        let recording = Arc::new(Mutex::new(Recording::default()));
        let mut handler = RecordingHandler(recording.clone());

        let mut iterations = 0;
        while recording.lock().unwrap().connect_failed.is_empty()
            && recording.lock().unwrap().connected.is_empty()
            && iterations < 50
        {
            event_loop.run_once(&mut handler, Some(Duration::from_millis(20))).unwrap();
            iterations += 1;
        }
        assert_eq!(recording.lock().unwrap().connect_failed, vec![addr]);
        assert!(recording.lock().unwrap().connected.is_empty());
    }
}
