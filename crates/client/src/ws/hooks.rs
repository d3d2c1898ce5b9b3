//! Dioxus bindings for the notification client.
//!
//! Components don't talk to the transport. They get a [`NotificationsHandle`]
//! whose signals are kept in sync with the client, and call its methods to
//! mark or clear entries.

use alerta_shared::{Identity, Notification};
use dioxus::prelude::*;

use super::connection::{ConnectionState, Connector, Scheduler};
use crate::client::{ClientChange, NotificationClient, PlatformClient};
use crate::config::ClientConfig;

/// What a component gets back from [`use_notifications`].
#[derive(Clone)]
pub struct NotificationsHandle {
    client: PlatformClient,
    /// Current connection state (reactive).
    pub status: Signal<ConnectionState>,
    /// Inbox, newest first (reactive).
    pub notifications: Signal<Vec<Notification>>,
}

impl NotificationsHandle {
    pub fn is_connected(&self) -> bool {
        self.status.read().is_connected()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.read().iter().filter(|n| !n.read).count()
    }

    pub fn mark_as_read(&self, id: &str) {
        self.client.mark_as_read(id);
    }

    pub fn mark_all_as_read(&self) {
        self.client.mark_all_as_read();
    }

    pub fn clear_one(&self, id: &str) {
        self.client.clear_one(id);
    }

    pub fn clear_all(&self) {
        self.client.clear_all();
    }

    /// Toast hook: called once per inbound notification.
    pub fn on_notification(&self, callback: impl Fn(&Notification) + 'static) {
        self.client.on_notification(callback);
    }

    pub fn reconnect(&self) {
        self.client.reconnect();
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    pub fn client(&self) -> &PlatformClient {
        &self.client
    }
}

/// Forward status and inbox changes of `client` to the given setters.
///
/// The listener only holds a weak reference, so whatever the setters write
/// into never keeps the client alive.
fn mirror<C: Connector + 'static, S: Scheduler + 'static>(
    client: &NotificationClient<C, S>,
    on_status: impl Fn(ConnectionState) + 'static,
    on_notifications: impl Fn(Vec<Notification>) + 'static,
) {
    let weak = client.downgrade();
    client.subscribe(move |change| match change {
        ClientChange::Status(state) => on_status(*state),
        ClientChange::Notifications => {
            if let Some(client) = weak.upgrade() {
                on_notifications(client.notifications());
            }
        }
    });
}

/// Keep a notification connection alive for as long as the calling
/// component is mounted.
///
/// The connection follows `identity`: logging out (an incomplete identity)
/// disconnects and empties the inbox, logging in as someone else starts
/// over. Remounting with the same identity does not open a second
/// connection. Unmounting disconnects.
pub fn use_notifications(config: ClientConfig, identity: Signal<Identity>) -> NotificationsHandle {
    let status = use_signal(ConnectionState::default);
    let notifications = use_signal(Vec::<Notification>::new);

    let client = use_hook(move || {
        let client = PlatformClient::new(config);
        mirror(
            &client,
            move |state| {
                let mut status = status;
                status.set(state);
            },
            move |list| {
                let mut notifications = notifications;
                notifications.set(list);
            },
        );

        let pump = client.clone();
        spawn(async move {
            pump.run().await;
        });

        client
    });

    let effect_client = client.clone();
    use_effect(move || {
        let identity = identity.read().clone();
        effect_client.set_identity(identity);
    });

    let drop_client = client.clone();
    use_drop(move || {
        drop_client.disconnect();
    });

    NotificationsHandle {
        client,
        status,
        notifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::ws::testing::{MockConnector, MockScheduler};
    use crate::ws::{DriverEvent, TransportEvent};
    use alerta_shared::Role;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestClient = NotificationClient<MockConnector, MockScheduler>;

    #[derive(Default)]
    struct Mirrored {
        status: Vec<ConnectionState>,
        notifications: Vec<Notification>,
    }

    fn mirrored() -> (TestClient, MockConnector, Rc<RefCell<Mirrored>>) {
        let connector = MockConnector::default();
        let config = ClientConfig::new("ws://localhost:8080/ws").unwrap();
        let client =
            NotificationClient::with_transport(config, connector.clone(), MockScheduler::default());

        let seen = Rc::new(RefCell::new(Mirrored::default()));
        let (status, inbox) = (seen.clone(), seen.clone());
        mirror(
            &client,
            move |state| status.borrow_mut().status.push(state),
            move |list| inbox.borrow_mut().notifications = list,
        );
        (client, connector, seen)
    }

    fn message(client: &TestClient, connector: &MockConnector, text: &str) {
        let attempt = connector.log.borrow().last_opened().unwrap();
        client.dispatch(DriverEvent::Transport {
            attempt,
            event: TransportEvent::Message(text.to_string()),
        });
    }

    #[test]
    fn mirrors_identity_driven_status_and_inbox() {
        let (client, connector, seen) = mirrored();

        client.set_identity(Identity::new("u-1", Role::Staff, "tok"));
        let attempt = connector.log.borrow().last_opened().unwrap();
        client.dispatch(DriverEvent::Transport {
            attempt,
            event: TransportEvent::Opened,
        });
        message(&client, &connector, r#"{"tipo": "otro", "mensaje": "one"}"#);
        message(&client, &connector, r#"{"tipo": "otro", "mensaje": "two"}"#);

        assert_eq!(
            seen.borrow().status,
            vec![ConnectionState::Connecting, ConnectionState::Open]
        );
        let messages: Vec<String> = seen
            .borrow()
            .notifications
            .iter()
            .map(|n| n.message.clone())
            .collect();
        assert_eq!(messages, vec!["two", "one"]);

        let first = seen.borrow().notifications[1].id.clone();
        client.mark_as_read(&first);
        assert!(seen.borrow().notifications[1].read);

        // Logging out empties the mirrored inbox and goes offline.
        client.set_identity(Identity::anonymous());
        assert!(seen.borrow().notifications.is_empty());
        assert_eq!(seen.borrow().status.last(), Some(&ConnectionState::Idle));
    }

    #[test]
    fn release_closes_with_logout_and_reports_idle() {
        let (client, connector, seen) = mirrored();
        client.set_identity(Identity::new("u-1", Role::Student, "tok"));
        let attempt = connector.log.borrow().last_opened().unwrap();

        client.disconnect();

        assert_eq!(
            connector.log.borrow().closed,
            vec![(attempt, 1000, "Logout".to_string())]
        );
        assert_eq!(seen.borrow().status.last(), Some(&ConnectionState::Idle));
        assert!(connector.log.borrow().live().is_empty());
    }

    #[test]
    fn mirror_does_not_keep_client_alive() {
        let (client, _, _) = mirrored();
        let weak = client.downgrade();
        drop(client);
        assert!(weak.upgrade().is_none());
    }
}
