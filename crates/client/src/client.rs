//! The notification client: one connection, one inbox, one event queue.
//!
//! [`NotificationClient`] is what UI code holds on to. It is cheap to clone
//! (clones share state) and is meant to live on a single thread. Transports
//! and timers never touch it directly; they post [`DriverEvent`]s into a
//! queue that [`NotificationClient::run`] drains, so every state change
//! happens in arrival order on the owning thread.
//!
//! ```rust,ignore
//! let client = NotificationClient::new(ClientConfig::from_env()?);
//! client.on_notification(|n| println!("{} {}", n.kind.icon(), n.title));
//! client.set_identity(Identity::new("u-1", Role::Staff, token));
//! client.run().await;
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use alerta_shared::{normalize, Identity, Notification, Subject};
use futures_channel::mpsc::{self, UnboundedReceiver};
use futures_util::StreamExt;

use crate::config::ClientConfig;
use crate::stores::NotificationStore;
use crate::ws::{
    ConnectionFactory, ConnectionState, Connector, DriverEvent, EventSink, LifecycleManager,
    PlatformConnector, PlatformScheduler, Scheduler,
};

/// What changed after an operation or an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientChange {
    Status(ConnectionState),
    /// The inbox contents or read flags changed.
    Notifications,
}

type Listener = Rc<dyn Fn(&ClientChange)>;
type NotificationCallback = Rc<dyn Fn(&Notification)>;

struct Inner<C: Connector, S: Scheduler> {
    manager: LifecycleManager<C, S>,
    store: NotificationStore,
    /// Bumped on every inbox mutation.
    revision: u64,
    identity: Identity,
    on_notification: Option<NotificationCallback>,
    listeners: Vec<Listener>,
    /// Taken by `run()` while it is draining.
    events: Option<UnboundedReceiver<DriverEvent>>,
}

impl<C: Connector, S: Scheduler> Inner<C, S> {
    fn touch(&mut self) {
        self.revision += 1;
    }

    fn clear_inbox(&mut self) {
        if !self.store.is_empty() {
            self.store.clear();
            self.touch();
        }
    }
}

/// Client with the transport of the current platform.
pub type PlatformClient = NotificationClient<PlatformConnector, PlatformScheduler>;

pub struct NotificationClient<C: Connector, S: Scheduler> {
    inner: Rc<RefCell<Inner<C, S>>>,
}

impl<C: Connector, S: Scheduler> Clone for NotificationClient<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning reference to a [`NotificationClient`], for listeners that
/// need to read the client back without keeping it alive.
pub struct WeakClient<C: Connector, S: Scheduler> {
    inner: Weak<RefCell<Inner<C, S>>>,
}

impl<C: Connector, S: Scheduler> Clone for WeakClient<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector, S: Scheduler> WeakClient<C, S> {
    pub fn upgrade(&self) -> Option<NotificationClient<C, S>> {
        self.inner.upgrade().map(|inner| NotificationClient { inner })
    }
}

impl PlatformClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, PlatformConnector::new(), PlatformScheduler::new())
    }
}

impl<C: Connector, S: Scheduler> NotificationClient<C, S> {
    pub fn with_transport(config: ClientConfig, connector: C, scheduler: S) -> Self {
        let (tx, rx) = mpsc::unbounded();
        let factory = ConnectionFactory::new(config.endpoint, connector);
        let manager =
            LifecycleManager::new(factory, scheduler, EventSink::new(tx), config.reconnect);

        Self {
            inner: Rc::new(RefCell::new(Inner {
                manager,
                store: NotificationStore::new(),
                revision: 0,
                identity: Identity::anonymous(),
                on_notification: None,
                listeners: Vec::new(),
                events: Some(rx),
            })),
        }
    }

    pub fn downgrade(&self) -> WeakClient<C, S> {
        WeakClient {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // --- Queries ---

    pub fn status(&self) -> ConnectionState {
        self.inner.borrow().manager.state()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.borrow().store.to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.borrow().store.unread_count()
    }

    /// Consecutive reconnects since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.borrow().manager.reconnect_attempts()
    }

    // --- Inbox ---

    pub fn mark_as_read(&self, id: &str) {
        self.apply(|inner| {
            if inner.store.mark_read(id) {
                inner.touch();
            }
        });
    }

    pub fn mark_all_as_read(&self) {
        self.apply(|inner| {
            if inner.store.mark_all_read() > 0 {
                inner.touch();
            }
        });
    }

    pub fn clear_one(&self, id: &str) {
        self.apply(|inner| {
            if inner.store.remove(id).is_some() {
                inner.touch();
            }
        });
    }

    pub fn clear_all(&self) {
        self.apply(Inner::clear_inbox);
    }

    // --- Callbacks ---

    /// Called once for every normalized inbound message, after it is stored.
    /// Replaces any earlier callback.
    pub fn on_notification(&self, callback: impl Fn(&Notification) + 'static) {
        self.inner.borrow_mut().on_notification = Some(Rc::new(callback));
    }

    /// Observe status and inbox changes.
    pub fn subscribe(&self, listener: impl Fn(&ClientChange) + 'static) {
        self.inner.borrow_mut().listeners.push(Rc::new(listener));
    }

    // --- Connection ---

    /// Hand over the identity from the session layer.
    ///
    /// An incomplete identity tears everything down and empties the inbox.
    /// A different complete identity does the same and then connects as the
    /// new subject. The same identity again only makes sure a connection
    /// exists.
    pub fn set_identity(&self, identity: Identity) {
        self.apply(|inner| {
            let changed = inner.identity != identity;
            match Subject::try_from(identity.clone()) {
                Err(e) => {
                    crate::log_debug!("No usable identity ({}), staying offline", e);
                    inner.manager.disconnect();
                    inner.manager.set_subject(None);
                    inner.clear_inbox();
                }
                Ok(subject) => {
                    if changed {
                        inner.manager.disconnect();
                        inner.clear_inbox();
                        inner.manager.set_subject(Some(subject));
                    }
                    inner.manager.connect();
                }
            }
            inner.identity = identity;
        });
    }

    /// Connect now unless a connection is already live or in flight. A
    /// pending reconnect timer is cancelled in favour of this attempt.
    pub fn reconnect(&self) {
        self.apply(|inner| {
            inner.manager.connect();
        });
    }

    /// Close the connection and stop reconnecting until the next
    /// `reconnect()` or `set_identity()`.
    pub fn disconnect(&self) {
        self.apply(|inner| inner.manager.disconnect());
    }

    // --- Event pump ---

    /// Drain the event queue until the future is dropped.
    ///
    /// Only one pump runs at a time; a second concurrent call returns
    /// immediately.
    pub async fn run(&self) {
        let Some(rx) = self.inner.borrow_mut().events.take() else {
            crate::log_warn!("Event pump already running");
            return;
        };

        let mut pump = Pump {
            client: self,
            rx: Some(rx),
        };

        while let Some(event) = pump.next().await {
            self.dispatch(event);
        }
    }

    /// Apply one queued event. Exposed so callers with their own loop (and
    /// tests) can drive the client by hand.
    pub fn dispatch(&self, event: DriverEvent) {
        let delivered = self.apply(|inner| match event {
            DriverEvent::Transport { attempt, event } => {
                let text = inner.manager.handle_transport(attempt, event)?;
                let notification = normalize(&text, &inner.identity.role);
                crate::log_debug!(
                    "Notification {} ({:?}): {}",
                    notification.id,
                    notification.kind,
                    notification.title
                );
                inner.store.append(notification.clone());
                inner.touch();
                Some(notification)
            }
            DriverEvent::ReconnectDue { ticket } => {
                inner.manager.handle_reconnect_due(ticket);
                None
            }
        });

        if let Some(notification) = delivered {
            let callback = self.inner.borrow().on_notification.clone();
            if let Some(callback) = callback {
                callback(&notification);
            }
        }
    }

    /// Run `f` against the state, then tell listeners what changed. No
    /// borrow is held while listeners run, so they may call back in.
    fn apply<R>(&self, f: impl FnOnce(&mut Inner<C, S>) -> R) -> R {
        let (result, changes, listeners) = {
            let mut inner = self.inner.borrow_mut();
            let status = inner.manager.state();
            let revision = inner.revision;

            let result = f(&mut inner);

            let mut changes = Vec::new();
            if inner.manager.state() != status {
                changes.push(ClientChange::Status(inner.manager.state()));
            }
            if inner.revision != revision {
                changes.push(ClientChange::Notifications);
            }
            let listeners = if changes.is_empty() {
                Vec::new()
            } else {
                inner.listeners.clone()
            };
            (result, changes, listeners)
        };

        for change in &changes {
            for listener in &listeners {
                listener(change);
            }
        }
        result
    }
}

/// Holds the receiver while `run()` is draining and hands it back when the
/// pump stops, so a later `run()` can pick up where this one left off.
struct Pump<'a, C: Connector, S: Scheduler> {
    client: &'a NotificationClient<C, S>,
    rx: Option<UnboundedReceiver<DriverEvent>>,
}

impl<C: Connector, S: Scheduler> Pump<'_, C, S> {
    async fn next(&mut self) -> Option<DriverEvent> {
        self.rx.as_mut()?.next().await
    }
}

impl<C: Connector, S: Scheduler> Drop for Pump<'_, C, S> {
    fn drop(&mut self) {
        if let (Some(rx), Ok(mut inner)) = (self.rx.take(), self.client.inner.try_borrow_mut()) {
            inner.events = Some(rx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::{MockConnector, MockScheduler};
    use crate::ws::{AttemptId, ReconnectConfig, TransportEvent};
    use alerta_shared::{NotificationKind, Role};
    use std::time::Duration;

    type TestClient = NotificationClient<MockConnector, MockScheduler>;

    fn client() -> (TestClient, MockConnector, MockScheduler) {
        let connector = MockConnector::default();
        let scheduler = MockScheduler::default();
        let config = ClientConfig::new("ws://localhost:8080/ws")
            .unwrap()
            .with_reconnect(ReconnectConfig::default());
        let client =
            NotificationClient::with_transport(config, connector.clone(), scheduler.clone());
        (client, connector, scheduler)
    }

    fn staff() -> Identity {
        Identity::new("u-1", Role::Staff, "tok")
    }

    fn last_attempt(connector: &MockConnector) -> AttemptId {
        connector.log.borrow().last_opened().unwrap()
    }

    fn transport(client: &TestClient, attempt: AttemptId, event: TransportEvent) {
        client.dispatch(DriverEvent::Transport { attempt, event });
    }

    fn push(client: &TestClient, attempt: AttemptId, payload: &str) {
        transport(client, attempt, TransportEvent::Message(payload.to_string()));
    }

    fn connected() -> (TestClient, MockConnector, MockScheduler, AttemptId) {
        let (client, connector, scheduler) = client();
        client.set_identity(staff());
        let attempt = last_attempt(&connector);
        transport(&client, attempt, TransportEvent::Opened);
        (client, connector, scheduler, attempt)
    }

    #[test]
    fn identity_drives_connection() {
        let (client, connector, _) = client();
        assert_eq!(client.status(), ConnectionState::Idle);

        client.set_identity(Identity::anonymous());
        assert!(connector.log.borrow().opened.is_empty());

        client.set_identity(staff());
        assert_eq!(client.status(), ConnectionState::Connecting);
        let attempt = last_attempt(&connector);
        transport(&client, attempt, TransportEvent::Opened);
        assert!(client.is_connected());

        // Same identity again, e.g. a remount.
        client.set_identity(staff());
        assert_eq!(connector.log.borrow().opened.len(), 1);

        client.set_identity(Identity {
            credential: None,
            ..staff()
        });
        assert_eq!(client.status(), ConnectionState::Idle);
        assert!(connector.log.borrow().live().is_empty());
    }

    #[test]
    fn switching_identity_reconnects_and_clears_inbox() {
        let (client, connector, _, first) = connected();
        push(&client, first, r#"{"tipo": "otro", "mensaje": "hola"}"#);
        assert_eq!(client.notifications().len(), 1);

        client.set_identity(Identity::new("u-2", Role::Student, "tok2"));

        assert!(client.notifications().is_empty());
        assert_eq!(connector.log.borrow().closed, vec![(first, 1000, "Logout".into())]);
        let second = last_attempt(&connector);
        assert_ne!(first, second);
        assert!(connector.log.borrow().opened[1].1.contains("user_id=u-2"));
    }

    #[test]
    fn inbound_messages_reach_store_and_callback_once() {
        let (client, _, _, attempt) = connected();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        client.on_notification(move |n| sink.borrow_mut().push(n.clone()));

        push(
            &client,
            attempt,
            r#"{"tipo": "nuevo_incidente", "urgencia": "high", "tipo_incidente": "Fuga"}"#,
        );

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, NotificationKind::NewIncident);
        assert!(seen[0].message.contains("high"));
        assert_eq!(client.notifications(), *seen);
        assert_eq!(client.unread_count(), 1);
    }

    #[test]
    fn malformed_payloads_still_notify() {
        let (client, _, _, attempt) = connected();
        push(&client, attempt, "not json");
        push(&client, attempt, r#"{"tipo": "nuevo_incidente", "urgencia": 5}"#);

        let notes = client.notifications();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.kind == NotificationKind::GenericUpdate));
    }

    #[test]
    fn newest_first_and_read_state() {
        let (client, _, _, attempt) = connected();
        for id in ["A", "B", "C"] {
            push(
                &client,
                attempt,
                &format!(r#"{{"notification_id": "{}", "mensaje": "{}"}}"#, id, id),
            );
        }

        client.mark_as_read("B");

        let notes = client.notifications();
        let ids: Vec<_> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B", "A"]);
        let read: Vec<_> = notes.iter().map(|n| n.read).collect();
        assert_eq!(read, vec![false, true, false]);
        assert_eq!(client.unread_count(), 2);

        client.mark_all_as_read();
        client.mark_all_as_read();
        assert_eq!(client.unread_count(), 0);

        client.clear_one("A");
        assert_eq!(client.notifications().len(), 2);
        client.clear_all();
        assert!(client.notifications().is_empty());
    }

    #[test]
    fn nothing_arrives_after_disconnect() {
        let (client, _, scheduler, attempt) = connected();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        client.on_notification(move |_| *counter.borrow_mut() += 1);

        client.disconnect();
        client.disconnect();
        push(&client, attempt, r#"{"mensaje": "late"}"#);
        transport(&client, attempt, TransportEvent::Closed { code: 1000, reason: String::new() });

        assert_eq!(*calls.borrow(), 0);
        assert!(client.notifications().is_empty());
        assert_eq!(client.status(), ConnectionState::Idle);
        assert!(scheduler.log.borrow().scheduled.is_empty());
    }

    #[test]
    fn lost_connection_comes_back_after_delay() {
        let (client, connector, scheduler, attempt) = connected();
        transport(&client, attempt, TransportEvent::Closed { code: 1006, reason: String::new() });

        assert_eq!(client.status(), ConnectionState::Closed);
        let (ticket, delay) = scheduler.log.borrow().scheduled[0];
        assert_eq!(delay, Duration::from_millis(3000));

        client.dispatch(DriverEvent::ReconnectDue { ticket });
        assert_eq!(client.status(), ConnectionState::Connecting);
        assert_eq!(client.reconnect_attempts(), 1);
        assert_eq!(connector.log.borrow().opened.len(), 2);
    }

    #[test]
    fn reconnect_is_a_no_op_while_open() {
        let (client, connector, _, _) = connected();
        client.reconnect();
        assert_eq!(connector.log.borrow().opened.len(), 1);

        client.disconnect();
        client.reconnect();
        assert_eq!(connector.log.borrow().opened.len(), 2);
    }

    #[test]
    fn listeners_see_status_and_inbox_changes() {
        let (client, connector, _) = client();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        client.subscribe(move |change| sink.borrow_mut().push(*change));

        client.set_identity(staff());
        let attempt = last_attempt(&connector);
        transport(&client, attempt, TransportEvent::Opened);
        push(&client, attempt, r#"{"mensaje": "x"}"#);
        client.mark_all_as_read();
        client.mark_all_as_read();

        assert_eq!(
            *changes.borrow(),
            vec![
                ClientChange::Status(ConnectionState::Connecting),
                ClientChange::Status(ConnectionState::Open),
                ClientChange::Notifications,
                ClientChange::Notifications,
            ]
        );
    }

    #[test]
    fn callback_may_call_back_into_client() {
        let (client, _, _, attempt) = connected();
        let handle = client.clone();
        client.on_notification(move |n| handle.mark_as_read(&n.id));

        push(&client, attempt, r#"{"mensaje": "auto-read"}"#);

        assert_eq!(client.notifications().len(), 1);
        assert_eq!(client.unread_count(), 0);
    }

    #[test]
    fn weak_client_does_not_keep_client_alive() {
        let (client, connector, _, attempt) = connected();
        let weak = client.downgrade();
        assert!(weak.upgrade().is_some());

        drop(client);
        assert!(weak.upgrade().is_none());
        assert_eq!(connector.log.borrow().closed, vec![(attempt, 1000, "Logout".into())]);
    }

    #[test]
    fn run_drains_queued_events() {
        let (client, connector, _) = client();
        client.set_identity(staff());
        let attempt = last_attempt(&connector);

        // Stand in for a transport: report through the same queue it would.
        let tx = {
            let inner = client.inner.borrow();
            assert!(inner.events.is_some());
            inner.manager.sink()
        };
        tx.transport(attempt, TransportEvent::Opened);
        tx.transport(attempt, TransportEvent::Message(r#"{"mensaje": "hi"}"#.into()));

        let pumped = client.clone();
        let mut run = Box::pin(pumped.run());
        assert!(futures_util::FutureExt::now_or_never(&mut run).is_none());
        drop(run);

        assert!(client.is_connected());
        assert_eq!(client.notifications().len(), 1);
        // The receiver is handed back once the pump stops.
        assert!(client.inner.borrow().events.is_some());
    }
}
