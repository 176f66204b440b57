//! DevTools client node.
//!
//! A [`DevToolsClient`] is one debugger endpoint: either the root, which
//! owns the transport, or a child addressing a CDP session multiplexed
//! over the root's connection. The tree is flat (every child hangs off
//! the root) and all nodes share the root's command id counter.
//!
//! # Threading
//!
//! The tree is single-threaded and cooperative. The event pump is the
//! only place that blocks, and it is re-entrant: a listener notified
//! during a pump may send its own commands, nesting another pump frame.
//! `stack_depth` tracks the nesting; connecting while any frame is
//! active is rejected.
//!
//! # Message routing
//!
//! Every frame read off the transport is routed by its `sessionId` to
//! the matching node. Frames for sessions the tree never attached to are
//! dropped; errors raised while serving a foreign session are swallowed
//! so that independent sessions make progress.

// ============================================================================
// Imports
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ptr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::{Error, ErrorCode, Result};
use crate::protocol::{
    bidi_expression, classify_inspector_error, multiplex_bidi_id, parse_inspector_message,
    Command, InspectorCommandResponse, InspectorEvent, InspectorMessage, ParserFunc,
    RESERVED_CHANNEL_COUNT,
};
use crate::timeout::Timeout;
use crate::transport::{SocketMessage, SyncWebSocket, SyncWebSocketFactory};

use super::listener::{ClientOwner, DevToolsEventListener};

// ============================================================================
// Constants
// ============================================================================

/// Root id of the browser-wide client.
///
/// The browser endpoint has no document, so connect-time setup skips the
/// prelude injection for it.
pub const BROWSER_CLIENT_ID: &str = "browser";

/// Deadline applied to a waiting send when the caller supplies none.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Inner pump slice; bounds how long a predicate wait stays blocked in
/// the transport before the predicate is re-evaluated.
const EVENT_WAIT_SLICE: Duration = Duration::from_millis(500);

/// Script injected into every new document on connect.
///
/// Rebinds the globals automation probes use to self-identify before
/// page scripts can patch them.
const PRELUDE_SCRIPT: &str = "(function () {\
window.cdc_adoQpoasnfa76pfcZLmcfl_Array = window.Array;\
window.cdc_adoQpoasnfa76pfcZLmcfl_Promise = window.Promise;\
window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol = window.Symbol;\
}) ();";

// ============================================================================
// Types
// ============================================================================

/// Hook run between the two connect attempts; closing a DevTools
/// frontend frees the debugger for the retry.
pub type FrontendCloserFunc = Box<dyn Fn() -> Result<()>>;

// ============================================================================
// ResponseInfo
// ============================================================================

/// State of one pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    /// Sent; response not seen yet.
    Waiting,
    /// A dialog opened before the response; it will never arrive while
    /// the dialog is up.
    Blocked,
    /// The caller gave up; the response is discarded on arrival.
    Ignored,
    /// Response received and recorded.
    Received,
}

/// Bookkeeping for one pending command, shared between the response
/// table and the frame waiting on it.
#[derive(Debug)]
struct ResponseInfo {
    state: ResponseState,
    /// Method of the originating command, for listeners and logs.
    method: String,
    /// The response, once received.
    response: InspectorCommandResponse,
    /// Timeout the command was sent under, if any.
    command_timeout: Option<Timeout>,
}

impl ResponseInfo {
    fn new(method: &str, command_timeout: Option<Timeout>) -> Self {
        Self {
            state: ResponseState::Waiting,
            method: method.to_owned(),
            response: InspectorCommandResponse::default(),
            command_timeout,
        }
    }
}

// ============================================================================
// StackGuard
// ============================================================================

/// Scope guard counting active pump frames.
struct StackGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> StackGuard<'a> {
    fn new(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

// ============================================================================
// DevToolsClient
// ============================================================================

/// One DevTools debugger endpoint in a session tree.
///
/// Construct the root with [`DevToolsClient::with_transport`] and
/// children with [`DevToolsClient::new`] followed by
/// [`attach_to`](DevToolsClient::attach_to). A freshly constructed child
/// is *null* until it joins a tree, and accepts only attach.
pub struct DevToolsClient {
    /// Opaque client id, used for log correlation.
    id: String,
    /// CDP session addressed by this node; empty for a plain root.
    session_id: String,
    /// Connect URL; meaningful for the root only.
    url: String,
    /// Transport; present on the root only.
    socket: Option<Box<dyn SyncWebSocket>>,
    /// Back-handle to the owning `Rc`, set at construction.
    self_weak: Weak<DevToolsClient>,
    /// Parent link; dead weak pointer means this node is a root or null.
    parent: RefCell<Weak<DevToolsClient>>,
    /// Children keyed by session id.
    children: RefCell<FxHashMap<String, Rc<DevToolsClient>>>,
    /// Owning view, consulted for dialog text and target kind.
    owner: RefCell<Option<Weak<dyn ClientOwner>>>,
    /// Listeners in insertion order.
    listeners: RefCell<Vec<Rc<dyn DevToolsEventListener>>>,
    /// Listeners still owed a connect notification.
    unnotified_connect_listeners: RefCell<VecDeque<Rc<dyn DevToolsEventListener>>>,
    /// Listeners still owed the current event.
    unnotified_event_listeners: RefCell<VecDeque<Rc<dyn DevToolsEventListener>>>,
    /// Listeners still owed the current command response.
    unnotified_cmd_response_listeners: RefCell<VecDeque<Rc<dyn DevToolsEventListener>>>,
    /// Event being delivered, while its queue drains.
    unnotified_event: RefCell<Option<Rc<InspectorEvent>>>,
    /// Response being delivered, while its queue drains.
    unnotified_cmd_response: RefCell<Option<Rc<RefCell<ResponseInfo>>>>,
    /// Pending commands sent from this node.
    response_info_map: RefCell<FxHashMap<i64, Rc<RefCell<ResponseInfo>>>>,
    /// Next command id; advanced at the root only.
    next_id: Cell<i64>,
    /// Active pump frames on this node.
    stack_depth: Cell<usize>,
    /// Set once `Inspector.targetCrashed` is seen.
    crashed: Cell<bool>,
    /// Set by [`set_detached`](DevToolsClient::set_detached).
    detached: Cell<bool>,
    /// Whether this node serves the main page target.
    is_main_page: Cell<bool>,
    /// Whether connect-time setup ran for the current connection.
    remote_configured: Cell<bool>,
    /// Hook between the two connect attempts.
    frontend_closer: RefCell<FrontendCloserFunc>,
    /// Incoming-frame parser; replaceable for testing.
    parser: RefCell<ParserFunc>,
}

impl fmt::Debug for DevToolsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevToolsClient")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("crashed", &self.crashed.get())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DevToolsClient - Construction
// ============================================================================

impl DevToolsClient {
    /// Creates a null client for `session_id`, to be attached to a root.
    #[must_use]
    pub fn new(id: impl Into<String>, session_id: impl Into<String>) -> Rc<Self> {
        Self::build(id.into(), session_id.into(), String::new(), None)
    }

    /// Creates a root client owning a fresh transport from `factory`.
    ///
    /// The transport is drawn immediately; the connection itself is made
    /// by [`connect_if_necessary`](DevToolsClient::connect_if_necessary).
    #[must_use]
    pub fn with_transport(
        id: impl Into<String>,
        session_id: impl Into<String>,
        url: impl Into<String>,
        factory: &SyncWebSocketFactory,
    ) -> Rc<Self> {
        let id = id.into();
        let socket = factory();
        socket.set_id(&id);
        Self::build(id, session_id.into(), url.into(), Some(socket))
    }

    fn build(
        id: String,
        session_id: String,
        url: String,
        socket: Option<Box<dyn SyncWebSocket>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            id,
            session_id,
            url,
            socket,
            self_weak: self_weak.clone(),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(FxHashMap::default()),
            owner: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            unnotified_connect_listeners: RefCell::new(VecDeque::new()),
            unnotified_event_listeners: RefCell::new(VecDeque::new()),
            unnotified_cmd_response_listeners: RefCell::new(VecDeque::new()),
            unnotified_event: RefCell::new(None),
            unnotified_cmd_response: RefCell::new(None),
            response_info_map: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(1),
            stack_depth: Cell::new(0),
            crashed: Cell::new(false),
            detached: Cell::new(false),
            is_main_page: Cell::new(false),
            remote_configured: Cell::new(false),
            frontend_closer: RefCell::new(Box::new(|| Ok(()))),
            parser: RefCell::new(Box::new(parse_inspector_message)),
        })
    }

    /// The `Rc` this node lives in.
    fn rc(&self) -> Rc<DevToolsClient> {
        self.self_weak
            .upgrade()
            .expect("a client is only reachable through its Rc")
    }
}

// ============================================================================
// DevToolsClient - Accessors
// ============================================================================

impl DevToolsClient {
    /// Returns the client id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the CDP session id this node addresses.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns `true` if the target crashed while attached.
    #[inline]
    #[must_use]
    pub fn was_crashed(&self) -> bool {
        self.crashed.get()
    }

    /// Returns `true` while the node is neither attached nor backed by a
    /// transport.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.parent().is_none() && self.socket.is_none()
    }

    /// Returns `true` while the tree's transport is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        match self.parent() {
            Some(parent) => parent.is_connected(),
            None => self.socket.as_ref().is_some_and(|s| s.is_connected()),
        }
    }

    /// Returns the parent, `None` for roots and null nodes.
    #[must_use]
    pub fn parent(&self) -> Option<Rc<DevToolsClient>> {
        self.parent.borrow().upgrade()
    }

    /// Returns the root of the tree this node belongs to.
    #[must_use]
    pub fn root(&self) -> Rc<DevToolsClient> {
        let mut node = self.rc();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// Returns the owning view, if one is set and still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Rc<dyn ClientOwner>> {
        self.owner.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Sets the owning view.
    pub fn set_owner(&self, owner: Weak<dyn ClientOwner>) {
        *self.owner.borrow_mut() = Some(owner);
    }

    /// Returns `true` if this node serves the main page target.
    #[inline]
    #[must_use]
    pub fn is_main_page(&self) -> bool {
        self.is_main_page.get()
    }

    /// Marks this node as serving the main page target.
    ///
    /// Only meaningful before the tree connects.
    pub fn set_main_page(&self, value: bool) {
        debug_assert!(!self.is_connected());
        self.is_main_page.set(value);
    }

    /// Marks this node as detached from its target; every further
    /// operation answers [`Error::TargetDetached`].
    pub fn set_detached(&self) {
        self.detached.set(true);
    }

    /// Returns the id the next drawn command will use.
    #[must_use]
    pub fn next_message_id(&self) -> i64 {
        self.root().next_id.get()
    }

    /// Draws a fresh command id from the root.
    fn advance_next_message_id(&self) -> i64 {
        let root = self.root();
        let id = root.next_id.get();
        root.next_id.set(id + 1);
        id
    }

    /// Appends a listener.
    ///
    /// Connect-interested listeners must be added before the tree
    /// connects; added later they will never see a connect notification.
    pub fn add_listener(&self, listener: Rc<dyn DevToolsEventListener>) {
        if self.is_connected() && listener.listens_to_connections() {
            warn!(
                client = %self.id,
                "subscribing a connect listener to an already connected client; \
                 the connect notification will not arrive"
            );
        }
        self.listeners.borrow_mut().push(listener);
    }

    /// Replaces the frontend-closer hook run between connect attempts.
    pub fn set_frontend_closer_func(&self, closer: FrontendCloserFunc) {
        *self.frontend_closer.borrow_mut() = closer;
    }

    /// Replaces the incoming-frame parser.
    pub fn set_parser_func_for_testing(&self, parser: ParserFunc) {
        *self.parser.borrow_mut() = parser;
    }
}

// ============================================================================
// DevToolsClient - Tree & Connection
// ============================================================================

impl DevToolsClient {
    /// Attaches this null node under `parent`, which must be a root.
    ///
    /// If the parent is already connected the node runs its connect
    /// setup immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownError`] if this node is not null or `parent` is
    ///   itself attached (the hierarchy is flat)
    /// - any error from the connect setup
    pub fn attach_to(&self, parent: &Rc<DevToolsClient>) -> Result<()> {
        if !self.is_null() {
            return Err(Error::unknown(
                "attaching a non-null client to a new parent is prohibited",
            ));
        }
        if parent.parent().is_some() {
            return Err(Error::unknown(
                "a client can be attached only to the root client",
            ));
        }

        if parent.is_connected() {
            self.reset_listeners();
            *self.parent.borrow_mut() = Rc::downgrade(parent);
            parent
                .children
                .borrow_mut()
                .insert(self.session_id.clone(), self.rc());
            self.on_connected()?;
        } else {
            *self.parent.borrow_mut() = Rc::downgrade(parent);
            parent
                .children
                .borrow_mut()
                .insert(self.session_id.clone(), self.rc());
        }
        Ok(())
    }

    /// Connects the tree's transport unless it already is connected.
    ///
    /// A refused first attempt runs the frontend-closer hook once and
    /// retries; a refused retry is [`Error::Disconnected`]. Children
    /// delegate to the root.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownError`] when called from inside a pump frame or
    ///   on a null node
    /// - [`Error::Disconnected`] when both attempts are refused
    /// - any error from the connect setup
    pub fn connect_if_necessary(&self) -> Result<()> {
        if self.stack_depth.get() > 0 {
            return Err(Error::unknown("cannot connect when nested"));
        }
        if self.is_null() {
            return Err(Error::unknown("cannot connect without a socket"));
        }

        match self.parent() {
            Some(parent) => parent.connect_if_necessary(),
            None => {
                let Some(socket) = self.socket.as_ref() else {
                    return Err(Error::unknown("cannot connect without a socket"));
                };
                if socket.is_connected() {
                    return Ok(());
                }

                self.reset_listeners();

                if !socket.connect(&self.url) {
                    // Something else may hold the debugger; close it and
                    // retry once.
                    (*self.frontend_closer.borrow())()?;
                    if !socket.connect(&self.url) {
                        return Err(Error::disconnected("unable to connect to renderer"));
                    }
                }

                self.on_connected()
            }
        }
    }

    /// Rewinds per-connection state throughout the subtree.
    ///
    /// Pending responses are dropped, connect notifications are re-queued
    /// for listeners that want them, and the remote end is marked
    /// unconfigured.
    fn reset_listeners(&self) {
        self.remote_configured.set(false);

        {
            let listeners = self.listeners.borrow();
            let mut queue = self.unnotified_connect_listeners.borrow_mut();
            queue.clear();
            queue.extend(
                listeners
                    .iter()
                    .filter(|listener| listener.listens_to_connections())
                    .cloned(),
            );
        }
        self.unnotified_event_listeners.borrow_mut().clear();
        self.response_info_map.borrow_mut().clear();

        for child in self.children.borrow().values() {
            child.reset_listeners();
        }
    }

    /// Runs connect-time setup on this node, then on every child.
    fn on_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::unknown(
                "the remote end can be configured only over an established connection",
            ));
        }

        self.set_up_devtools()?;

        // Notify listeners now so that their errors surface here rather
        // than during some unrelated later call, and so they can issue
        // commands before other clients do.
        self.ensure_connect_notified()?;

        let children: Vec<_> = self.children.borrow().values().cloned().collect();
        for child in children {
            child.on_connected()?;
        }
        Ok(())
    }

    /// Injects the automation prelude into the remote end.
    ///
    /// Skipped for the browser-wide client and service worker targets,
    /// which have no document to prepare.
    fn set_up_devtools(&self) -> Result<()> {
        if self.remote_configured.get() {
            return Ok(());
        }

        let skip = self.id == BROWSER_CLIENT_ID
            || self.owner().is_some_and(|owner| owner.is_service_worker());
        if !skip {
            self.send_command_and_ignore_response(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": PRELUDE_SCRIPT }),
            )?;
            self.send_command_and_ignore_response(
                "Runtime.evaluate",
                json!({ "expression": PRELUDE_SCRIPT }),
            )?;
        }

        self.remote_configured.set(true);
        Ok(())
    }
}

// ============================================================================
// DevToolsClient - Sending
// ============================================================================

impl DevToolsClient {
    /// Sends a command and waits for its response, discarding the result.
    pub fn send_command(&self, method: &str, params: Value) -> Result<()> {
        self.send_command_internal(method, params, true, true, 0, None)
            .map(drop)
    }

    /// Sends a command and waits for its response under `timeout`.
    pub fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: &Timeout,
    ) -> Result<()> {
        self.send_command_internal(method, params, true, true, 0, Some(timeout))
            .map(drop)
    }

    /// Sends a command, waits, and returns the result object.
    pub fn send_command_and_get_result(&self, method: &str, params: Value) -> Result<Value> {
        self.send_command_and_get_result_inner(method, params, None)
    }

    /// Sends a command, waits under `timeout`, and returns the result
    /// object.
    pub fn send_command_and_get_result_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: &Timeout,
    ) -> Result<Value> {
        self.send_command_and_get_result_inner(method, params, Some(timeout))
    }

    fn send_command_and_get_result_inner(
        &self,
        method: &str,
        params: Value,
        timeout: Option<&Timeout>,
    ) -> Result<Value> {
        let result = self.send_command_internal(method, params, true, true, 0, timeout)?;
        if !result.is_object() {
            return Err(Error::unknown("inspector response missing result"));
        }
        Ok(result)
    }

    /// Sends a command without tracking any response for it.
    pub fn send_async_command(&self, method: &str, params: Value) -> Result<()> {
        self.send_command_internal(method, params, false, false, 0, None)
            .map(drop)
    }

    /// Sends a command and returns immediately; the response slot is
    /// consumed whenever the response happens to arrive.
    pub fn send_command_and_ignore_response(&self, method: &str, params: Value) -> Result<()> {
        self.send_command_internal(method, params, true, false, 0, None)
            .map(drop)
    }

    /// Sends a command under a caller-chosen id and returns immediately.
    ///
    /// The caller owns the id space; ids must not collide with drawn
    /// ones. Used when an outer WebSocket session relays raw commands.
    pub fn send_command_from_websocket(
        &self,
        method: &str,
        params: Value,
        client_command_id: i64,
    ) -> Result<()> {
        self.send_command_internal(method, params, false, false, client_command_id, None)
            .map(drop)
    }

    /// Posts a BiDi command through the tunnel on the first user channel.
    ///
    /// The response arrives asynchronously as a `Runtime.bindingCalled`
    /// event; listeners see the decoded payload under the caller's
    /// original command id.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the command carries no integer `id`
    pub fn post_bidi_command(&self, command: Value) -> Result<()> {
        self.post_bidi_command_on_channel(RESERVED_CHANNEL_COUNT, command)
    }

    fn post_bidi_command_on_channel(&self, channel: i64, mut command: Value) -> Result<()> {
        multiplex_bidi_id(&mut command, channel)?;
        let expression = bidi_expression(&command)?;
        self.send_command_and_ignore_response("Runtime.evaluate", json!({ "expression": expression }))
    }

    fn send_command_internal(
        &self,
        method: &str,
        params: Value,
        expect_response: bool,
        wait_for_response: bool,
        client_command_id: i64,
        timeout: Option<&Timeout>,
    ) -> Result<Value> {
        if self.parent().is_none() {
            let connected = self.socket.as_ref().is_some_and(|s| s.is_connected());
            if !connected {
                return Err(Error::disconnected("not connected to DevTools"));
            }
        }

        // A zero id means the command originates here rather than from a
        // relaying caller.
        let command_id = if client_command_id != 0 {
            client_command_id
        } else {
            self.advance_next_message_id()
        };
        let command = Command::new(command_id, method, params, &self.session_id);
        let message = command.to_json()?;

        debug!(
            method,
            id = command_id,
            session_id = %self.session_id,
            client = %self.id,
            params = %command.params,
            "DevTools WebSocket Command"
        );

        let root = self.root();
        let sent = root.socket.as_ref().is_some_and(|s| s.send(&message));
        if !sent {
            return Err(Error::disconnected("unable to send message to renderer"));
        }

        if !expect_response {
            debug_assert!(!wait_for_response);
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let info = Rc::new(RefCell::new(ResponseInfo::new(method, timeout.copied())));
        self.response_info_map
            .borrow_mut()
            .insert(command_id, Rc::clone(&info));

        if !wait_for_response {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let deadline = timeout
            .copied()
            .unwrap_or_else(|| Timeout::new(DEFAULT_COMMAND_TIMEOUT));
        while info.borrow().state == ResponseState::Waiting {
            if let Err(err) = self.process_next_message(Some(command_id), true, &deadline, self) {
                if info.borrow().state == ResponseState::Received {
                    self.response_info_map.borrow_mut().remove(&command_id);
                }
                return Err(err);
            }
        }

        if info.borrow().state == ResponseState::Blocked {
            info.borrow_mut().state = ResponseState::Ignored;
            if let Some(owner) = self.owner() {
                if let Ok(text) = owner.dialog_message() {
                    return Err(Error::unexpected_alert_open_with_text(text));
                }
            }
            return Err(Error::unexpected_alert_open());
        }

        debug_assert_eq!(info.borrow().state, ResponseState::Received);
        let response = std::mem::take(&mut info.borrow_mut().response);
        match response.result {
            Some(result) => Ok(result),
            None => Err(classify_inspector_error(&response.error)),
        }
    }
}

// ============================================================================
// DevToolsClient - Event Pump
// ============================================================================

impl DevToolsClient {
    /// Pumps messages until `conditional` reports the condition met and
    /// no received events remain unhandled.
    ///
    /// The conditional is re-evaluated at least every 500 ms even while
    /// nothing arrives, since another client on the same transport may
    /// be the one advancing the observed state. A conditional error
    /// returns immediately; an exhausted `timeout` returns
    /// [`Error::Timeout`]. A zero timeout drains without blocking.
    pub fn handle_events_until<F>(&self, mut conditional: F, timeout: &Timeout) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let root = self.root();
        let connected = root.socket.as_ref().is_some_and(|s| s.is_connected());
        if !connected {
            return Err(Error::disconnected("not connected to DevTools"));
        }

        loop {
            let has_next = root.socket.as_ref().is_some_and(|s| s.has_next());
            if !has_next && conditional()? {
                return Ok(());
            }

            let slice = Timeout::with_parent(EVENT_WAIT_SLICE, timeout);
            match self.process_next_message(None, false, &slice, self) {
                Err(err) if err.is_timeout() => {
                    if timeout.is_expired() {
                        let message = format!(
                            "timed out receiving message from renderer: {:.3}",
                            timeout.duration().as_secs_f64()
                        );
                        error!(client = %self.id, "{message}");
                        return Err(Error::timeout(message));
                    }
                }
                Err(err) => return Err(err),
                Ok(()) => {}
            }
        }
    }

    /// Drains messages that were received but not yet handled, without
    /// blocking for new ones.
    pub fn handle_received_events(&self) -> Result<()> {
        self.handle_events_until(|| Ok(true), &Timeout::new(Duration::ZERO))
    }

    /// Pumps one step: drain owed notifications, then read and dispatch
    /// the next frame at the root.
    ///
    /// `expected_id` short-circuits the step once the awaited response
    /// left the `Waiting` state while notifying listeners. `caller` is
    /// the node whose wait drives this pump; errors in other sessions
    /// are not its to see.
    fn process_next_message(
        &self,
        expected_id: Option<i64>,
        log_timeout: bool,
        timeout: &Timeout,
        caller: &DevToolsClient,
    ) -> Result<()> {
        let _guard = StackGuard::new(&self.stack_depth);

        self.ensure_connect_notified()?;
        self.ensure_event_notified()?;
        self.ensure_cmd_response_notified()?;

        // The awaited response may have been received (and removed) or
        // blocked while the notifications above ran.
        if let Some(id) = expected_id {
            let satisfied = match self.response_info_map.borrow().get(&id) {
                None => true,
                Some(info) => info.borrow().state != ResponseState::Waiting,
            };
            if satisfied {
                return Ok(());
            }
        }

        if self.crashed.get() {
            return Err(Error::TabCrashed);
        }
        if self.detached.get() {
            return Err(Error::TargetDetached);
        }

        if let Some(parent) = self.parent() {
            return parent.process_next_message(None, log_timeout, timeout, caller);
        }

        let Some(socket) = self.socket.as_ref() else {
            return Err(Error::disconnected("not connected to DevTools"));
        };
        match socket.receive_next(timeout) {
            SocketMessage::Message(message) => self.handle_message(expected_id, &message, caller),
            SocketMessage::Disconnected => {
                error!(client = %self.id, "unable to receive message from renderer");
                Err(Error::disconnected("unable to receive message from renderer"))
            }
            SocketMessage::Timeout => {
                let message = format!(
                    "timed out receiving message from renderer: {:.3}",
                    timeout.duration().as_secs_f64()
                );
                if log_timeout {
                    error!(client = %self.id, "{message}");
                }
                Err(Error::timeout(message))
            }
        }
    }

    /// Parses one frame and dispatches it to the session it addresses.
    ///
    /// Runs at the root.
    fn handle_message(
        &self,
        expected_id: Option<i64>,
        message: &str,
        caller: &DevToolsClient,
    ) -> Result<()> {
        let parsed = (*self.parser.borrow())(message, expected_id.unwrap_or(-1));
        let Some(parsed) = parsed else {
            error!(client = %self.id, message, "bad inspector message");
            return Err(Error::unknown(format!("bad inspector message: {message}")));
        };

        let client: Rc<DevToolsClient> = if parsed.session_id() != self.session_id {
            let Some(child) = self.children.borrow().get(parsed.session_id()).cloned() else {
                // Auto-attach surfaces sessions of target types this tree
                // never tracks; their traffic is not ours to interpret.
                return Ok(());
            };
            child
        } else {
            self.rc()
        };

        let status = match parsed {
            InspectorMessage::Event { event, .. } => client.process_event(event),
            InspectorMessage::Response { response, .. } => {
                client.process_command_response(response)
            }
        };

        // Errors reach the blocked caller only when the frame was for its
        // own session or for the root's. A failure while serving another
        // session must not stall this one; that session surfaces it on
        // its next operation.
        if ptr::eq(caller, client.as_ref()) || ptr::eq(self, client.as_ref()) {
            status
        } else {
            Ok(())
        }
    }

    /// Delivers an event to this node's listeners and applies its
    /// protocol side effects.
    fn process_event(&self, event: InspectorEvent) -> Result<()> {
        debug!(
            method = %event.method,
            session_id = %self.session_id,
            client = %self.id,
            params = %event.params,
            "DevTools WebSocket Event"
        );

        let event = Rc::new(event);
        *self.unnotified_event_listeners.borrow_mut() =
            self.listeners.borrow().iter().cloned().collect();
        *self.unnotified_event.borrow_mut() = Some(Rc::clone(&event));
        let status = self.ensure_event_notified();
        *self.unnotified_event.borrow_mut() = None;
        status?;

        match event.method.as_str() {
            "Inspector.detached" => Err(Error::disconnected("received Inspector.detached event")),
            "Inspector.targetCrashed" => {
                self.crashed.set(true);
                Err(Error::TabCrashed)
            }
            "Page.javascriptDialogOpening" => {
                // A command may have opened this dialog, and its response
                // will not arrive while the dialog is up. DevTools answers
                // commands in order, so a round trip tells which pending
                // ids the renderer had already passed: everything at or
                // below the pre-probe id that is still waiting afterwards
                // is blocked. A failed probe marks them anyway rather
                // than risking a hang.
                let max_id = self.next_message_id();
                let probe = self.send_command(
                    "Inspector.enable",
                    json!({ "purpose": "detect if alert blocked any cmds" }),
                );
                for (&id, info) in self.response_info_map.borrow().iter() {
                    if id > max_id {
                        continue;
                    }
                    let mut info = info.borrow_mut();
                    if info.state == ResponseState::Waiting {
                        info.state = ResponseState::Blocked;
                    }
                }
                drop(probe);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Resolves a response against this node's pending table and
    /// notifies listeners of the success.
    fn process_command_response(&self, response: InspectorCommandResponse) -> Result<()> {
        let info = self.response_info_map.borrow().get(&response.id).cloned();

        debug!(
            method = %info
                .as_ref()
                .map(|info| info.borrow().method.clone())
                .unwrap_or_default(),
            id = response.id,
            session_id = %self.session_id,
            client = %self.id,
            result = %response
                .result
                .as_ref()
                .map(serde_json::Value::to_string)
                .unwrap_or_else(|| response.error.clone()),
            "DevTools WebSocket Response"
        );

        let Some(info) = info else {
            // A session detached between send and receipt gets its late
            // response delivered here, at the root, without a session id.
            if self.parent().is_none()
                && response.result.is_none()
                && classify_inspector_error(&response.error).code() == ErrorCode::NoSuchFrame
            {
                return Ok(());
            }
            return Err(Error::unknown("unexpected command response"));
        };
        self.response_info_map.borrow_mut().remove(&response.id);

        let ignored = info.borrow().state == ResponseState::Ignored;
        let has_result = response.result.is_some();
        if !ignored {
            let mut guard = info.borrow_mut();
            guard.state = ResponseState::Received;
            guard.response = response;
        }

        if has_result && !ignored {
            *self.unnotified_cmd_response_listeners.borrow_mut() =
                self.listeners.borrow().iter().cloned().collect();
            *self.unnotified_cmd_response.borrow_mut() = Some(Rc::clone(&info));
            let status = self.ensure_cmd_response_notified();
            *self.unnotified_cmd_response.borrow_mut() = None;
            status?;
        }
        Ok(())
    }
}

// ============================================================================
// DevToolsClient - Notification Queues
// ============================================================================

impl DevToolsClient {
    /// Drains owed connect notifications in insertion order.
    fn ensure_connect_notified(&self) -> Result<()> {
        loop {
            let listener = self.unnotified_connect_listeners.borrow_mut().pop_front();
            let Some(listener) = listener else {
                return Ok(());
            };
            listener.on_connected(self)?;
        }
    }

    /// Drains owed event notifications; an error drops the rest of the
    /// queue for this event.
    fn ensure_event_notified(&self) -> Result<()> {
        loop {
            let listener = self.unnotified_event_listeners.borrow_mut().pop_front();
            let Some(listener) = listener else {
                return Ok(());
            };
            let event = self.unnotified_event.borrow().clone();
            let Some(event) = event else {
                continue;
            };
            if let Err(err) = listener.on_event(self, &event.method, &event.params) {
                self.unnotified_event_listeners.borrow_mut().clear();
                return Err(err);
            }
        }
    }

    /// Drains owed command-response notifications in insertion order.
    fn ensure_cmd_response_notified(&self) -> Result<()> {
        loop {
            let listener = self
                .unnotified_cmd_response_listeners
                .borrow_mut()
                .pop_front();
            let Some(listener) = listener else {
                return Ok(());
            };
            let info = self.unnotified_cmd_response.borrow().clone();
            let Some(info) = info else {
                continue;
            };
            let (method, result, command_timeout) = {
                let info = info.borrow();
                (
                    info.method.clone(),
                    info.response.result.clone(),
                    info.command_timeout,
                )
            };
            let Some(result) = result else {
                continue;
            };
            listener.on_command_success(self, &method, &result, command_timeout.as_ref())?;
        }
    }
}
