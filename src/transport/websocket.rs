//! Blocking WebSocket connection.
//!
//! [`WebSocketConnection`] implements [`SyncWebSocket`] on top of
//! `tungstenite`. A delivery thread reads frames off the socket into a
//! queue guarded by a mutex/condvar pair; the caller thread consumes the
//! queue with a deadline and writes directly to the socket.
//!
//! The delivery thread's only interaction with the rest of the system is
//! the notification callback, raised after a message has been queued.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

use crate::timeout::Timeout;

use super::{NotificationCallback, SocketMessage, SyncWebSocket};

// ============================================================================
// Constants
// ============================================================================

/// Read timeout on the underlying stream.
///
/// Bounds how long the delivery thread holds the socket lock, so that
/// sends from the caller thread are never starved.
const READ_SLICE: Duration = Duration::from_millis(100);

// ============================================================================
// Types
// ============================================================================

/// Socket type produced by `tungstenite::connect`.
type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Receive queue shared between the caller and the delivery thread.
#[derive(Default)]
struct ReceiveQueue {
    /// Messages read off the socket, oldest first.
    messages: VecDeque<String>,
    /// Set once the connection is closed; sticky until the next connect.
    closed: bool,
}

/// State shared with the delivery thread.
struct Inner {
    /// Diagnostic tag for log lines.
    id: Mutex<String>,
    /// The socket; `None` before connect and after teardown.
    socket: Mutex<Option<Socket>>,
    /// Receive queue; the condvar signals pushes and closure.
    queue: Mutex<ReceiveQueue>,
    /// Signalled when `queue` changes.
    readable: Condvar,
    /// Asynchronous-arrival callback.
    callback: Mutex<Option<NotificationCallback>>,
}

// ============================================================================
// WebSocketConnection
// ============================================================================

/// Blocking WebSocket transport over `tungstenite`.
///
/// One instance serves one root client for its whole lifetime; `connect`
/// may be called again after a disconnect.
pub struct WebSocketConnection {
    /// State shared with the delivery thread.
    inner: Arc<Inner>,
    /// Delivery thread of the current connection, if any.
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Default for WebSocketConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketConnection {
    /// Creates a connection in the disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Mutex::new(String::new()),
                socket: Mutex::new(None),
                queue: Mutex::new(ReceiveQueue::default()),
                readable: Condvar::new(),
                callback: Mutex::new(None),
            }),
            reader: Mutex::new(None),
        }
    }

    /// Reads frames into the queue until the socket closes or is torn
    /// down.
    fn delivery_loop(inner: Arc<Inner>) {
        loop {
            let frame = {
                let mut guard = inner.socket.lock();
                let Some(socket) = guard.as_mut() else {
                    return;
                };
                match socket.read() {
                    Ok(frame) => Some(frame),
                    Err(WsError::Io(err))
                        if err.kind() == ErrorKind::WouldBlock
                            || err.kind() == ErrorKind::TimedOut =>
                    {
                        None
                    }
                    Err(err) => {
                        debug!(id = %inner.id.lock(), error = %err, "WebSocket read ended");
                        Self::mark_closed(&inner);
                        return;
                    }
                }
            };

            match frame {
                Some(Message::Text(text)) => {
                    {
                        let mut queue = inner.queue.lock();
                        queue.messages.push_back(text.to_string());
                    }
                    inner.readable.notify_all();
                    if let Some(callback) = inner.callback.lock().as_ref() {
                        callback();
                    }
                }
                Some(Message::Close(_)) => {
                    Self::mark_closed(&inner);
                    return;
                }
                // Binary frames and control frames carry no CDP traffic.
                Some(_) | None => {}
            }
        }
    }

    /// Marks the queue closed and wakes any blocked receiver.
    fn mark_closed(inner: &Inner) {
        inner.queue.lock().closed = true;
        inner.readable.notify_all();
    }
}

impl SyncWebSocket for WebSocketConnection {
    fn is_connected(&self) -> bool {
        if self.inner.queue.lock().closed {
            return false;
        }
        self.inner.socket.lock().is_some()
    }

    fn connect(&self, url: &str) -> bool {
        // Tear down any previous connection and its delivery thread
        // before a new one takes over the queue.
        if let Some(mut old) = self.inner.socket.lock().take() {
            let _ = old.close(None);
        }
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }

        let socket = match tungstenite::connect(url) {
            Ok((socket, _response)) => socket,
            Err(err) => {
                warn!(id = %self.inner.id.lock(), url, error = %err, "WebSocket connect failed");
                return false;
            }
        };

        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            if let Err(err) = stream.set_read_timeout(Some(READ_SLICE)) {
                warn!(error = %err, "unable to set read timeout");
            }
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.messages.clear();
            queue.closed = false;
        }
        *self.inner.socket.lock() = Some(socket);

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("cdp-ws-delivery".into())
            .spawn(move || Self::delivery_loop(inner));
        match handle {
            Ok(handle) => {
                *self.reader.lock() = Some(handle);
                debug!(id = %self.inner.id.lock(), url, "WebSocket connected");
                true
            }
            Err(err) => {
                warn!(error = %err, "unable to spawn delivery thread");
                *self.inner.socket.lock() = None;
                false
            }
        }
    }

    fn send(&self, message: &str) -> bool {
        let result = {
            let mut guard = self.inner.socket.lock();
            let Some(socket) = guard.as_mut() else {
                return false;
            };
            socket.send(Message::text(message.to_owned()))
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(id = %self.inner.id.lock(), error = %err, "WebSocket send failed");
                Self::mark_closed(&self.inner);
                false
            }
        }
    }

    fn receive_next(&self, timeout: &Timeout) -> SocketMessage {
        let mut queue = self.inner.queue.lock();
        loop {
            if let Some(message) = queue.messages.pop_front() {
                return SocketMessage::Message(message);
            }
            if queue.closed {
                return SocketMessage::Disconnected;
            }
            if timeout.is_expired() {
                return SocketMessage::Timeout;
            }
            let _ = self
                .inner
                .readable
                .wait_for(&mut queue, timeout.remaining());
        }
    }

    fn has_next(&self) -> bool {
        !self.inner.queue.lock().messages.is_empty()
    }

    fn set_id(&self, id: &str) {
        *self.inner.id.lock() = id.to_owned();
    }

    fn set_notification_callback(&self, callback: Option<NotificationCallback>) {
        *self.inner.callback.lock() = callback;
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        *self.inner.callback.lock() = None;
        // Taking the socket makes the delivery thread exit on its next
        // iteration.
        if let Some(mut socket) = self.inner.socket.lock().take() {
            let _ = socket.close(None);
        }
        Self::mark_closed(&self.inner);
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_by_default() {
        let connection = WebSocketConnection::new();
        assert!(!connection.is_connected());
        assert!(!connection.has_next());
    }

    #[test]
    fn test_send_without_connection_fails() {
        let connection = WebSocketConnection::new();
        assert!(!connection.send("{}"));
    }

    #[test]
    fn test_receive_without_connection_times_out() {
        let connection = WebSocketConnection::new();
        let timeout = Timeout::new(Duration::ZERO);
        assert_eq!(connection.receive_next(&timeout), SocketMessage::Timeout);
    }

    #[test]
    fn test_connect_refused() {
        let connection = WebSocketConnection::new();
        // Nothing listens on this port.
        assert!(!connection.connect("ws://127.0.0.1:9/"));
        assert!(!connection.is_connected());
    }
}
