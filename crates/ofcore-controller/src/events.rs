//! Named controller events and the subscription bus that carries them.
//!
//! Subscribers register a glob pattern over event names (`*` matches any run of
//! characters, dots included) and receive matching events on a bounded channel.
//! Publishing waits for room in every matching channel.

use std::sync::{Arc, Mutex, PoisonError};

use ofcore_codec::{FlowStats, OfpMessage, PortStats, TableStats};
use ofcore_frame::version_label;
use ofcore_transport::ConnectionId;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::switch::Interface;

/// Event name prefix.
pub const NAMESPACE: &str = "ofcore";

/// What happened to an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceChange {
    Created,
    Modified,
    Deleted,
    LinkUp,
    LinkDown,
}

impl InterfaceChange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::LinkUp => "link_up",
            Self::LinkDown => "link_down",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// A decoded inbound message.
    MessageIn {
        connection: ConnectionId,
        dpid: Option<u64>,
        message: Arc<OfpMessage>,
    },
    /// An outbound message, published after it was written to the socket.
    MessageOut {
        connection: ConnectionId,
        dpid: Option<u64>,
        message: Arc<OfpMessage>,
    },
    HandshakeCompleted {
        connection: ConnectionId,
        dpid: u64,
        version: u8,
    },
    HelloFailed {
        connection: ConnectionId,
        peer_version: u8,
        xid: u32,
    },
    ConnectionError {
        connection: ConnectionId,
        dpid: Option<u64>,
        reason: String,
    },
    ConnectionClosed {
        connection: ConnectionId,
        dpid: Option<u64>,
    },
    FlowStatsReceived {
        dpid: u64,
        flows: Arc<Vec<FlowStats>>,
    },
    TableStatsReceived {
        dpid: u64,
        tables: Vec<TableStats>,
    },
    PortStatsReceived {
        dpid: u64,
        ports: Vec<PortStats>,
    },
    Interface {
        change: InterfaceChange,
        interface: Interface,
    },
    InterfacesCreated {
        dpid: u64,
        interfaces: Vec<Interface>,
    },
    PortCreated {
        dpid: u64,
        port_no: u32,
        name: String,
        hw_addr: String,
        state: u32,
    },
    /// A packet-in showed `mac` behind `port_no`.
    ReachableMac {
        dpid: u64,
        port_no: u32,
        interface: Option<Interface>,
        mac: String,
    },
}

impl Event {
    /// Full event name, e.g. `ofcore.v0x04.messages.in.ofpt_hello`.
    pub fn name(&self) -> String {
        match self {
            Self::MessageIn { message, .. } => format!(
                "{NAMESPACE}.{}.messages.in.{}",
                version_label(message.version()),
                message.type_name()
            ),
            Self::MessageOut { message, .. } => format!(
                "{NAMESPACE}.{}.messages.out.{}",
                version_label(message.version()),
                message.type_name()
            ),
            Self::HandshakeCompleted { .. } => format!("{NAMESPACE}.handshake.completed"),
            Self::HelloFailed { .. } => format!("{NAMESPACE}.hello_failed"),
            Self::ConnectionError { .. } => format!("{NAMESPACE}.connection.error"),
            Self::ConnectionClosed { .. } => format!("{NAMESPACE}.connection.closed"),
            Self::FlowStatsReceived { .. } => format!("{NAMESPACE}.flow_stats.received"),
            Self::TableStatsReceived { .. } => format!("{NAMESPACE}.table_stats.received"),
            Self::PortStatsReceived { .. } => format!("{NAMESPACE}.port_stats.received"),
            Self::Interface { change, .. } => {
                format!("{NAMESPACE}.switch.interface.{}", change.as_str())
            }
            Self::InterfacesCreated { .. } => format!("{NAMESPACE}.switch.interfaces.created"),
            Self::PortCreated { .. } => format!("{NAMESPACE}.switch.port.created"),
            Self::ReachableMac { .. } => format!("{NAMESPACE}.reachable.mac"),
        }
    }

    /// Datapath id the event concerns, when known.
    pub fn dpid(&self) -> Option<u64> {
        match self {
            Self::MessageIn { dpid, .. }
            | Self::MessageOut { dpid, .. }
            | Self::ConnectionError { dpid, .. }
            | Self::ConnectionClosed { dpid, .. } => *dpid,
            Self::HandshakeCompleted { dpid, .. }
            | Self::FlowStatsReceived { dpid, .. }
            | Self::TableStatsReceived { dpid, .. }
            | Self::PortStatsReceived { dpid, .. }
            | Self::InterfacesCreated { dpid, .. }
            | Self::PortCreated { dpid, .. }
            | Self::ReachableMac { dpid, .. } => Some(*dpid),
            Self::Interface { interface, .. } => Some(interface.dpid),
            Self::HelloFailed { .. } => None,
        }
    }

    /// Structured payload for display and logging.
    pub fn payload(&self) -> Value {
        match self {
            Self::MessageIn {
                connection,
                message,
                ..
            }
            | Self::MessageOut {
                connection,
                message,
                ..
            } => json!({
                "connection": connection.to_string(),
                "version": message.version(),
                "type": message.type_name(),
                "length": message.header.length,
                "xid": message.xid(),
            }),
            Self::HandshakeCompleted {
                connection,
                version,
                ..
            } => json!({"connection": connection.to_string(), "version": version}),
            Self::HelloFailed {
                connection,
                peer_version,
                xid,
            } => json!({
                "connection": connection.to_string(),
                "peer_version": peer_version,
                "xid": xid,
            }),
            Self::ConnectionError {
                connection, reason, ..
            } => json!({"connection": connection.to_string(), "reason": reason}),
            Self::ConnectionClosed { connection, .. } => {
                json!({"connection": connection.to_string()})
            }
            Self::FlowStatsReceived { flows, .. } => json!({"flows": flows.len()}),
            Self::TableStatsReceived { tables, .. } => json!({"tables": tables}),
            Self::PortStatsReceived { ports, .. } => json!({"ports": ports}),
            Self::Interface { interface, .. } => json!({"interface": interface}),
            Self::InterfacesCreated { interfaces, .. } => json!({"interfaces": interfaces}),
            Self::PortCreated {
                port_no,
                name,
                hw_addr,
                state,
                ..
            } => json!({
                "port": port_no,
                "port_description": {"alias": name, "mac": hw_addr, "state": state},
            }),
            Self::ReachableMac {
                dpid,
                port_no,
                interface,
                mac,
            } => json!({
                "switch": format!("{dpid:016x}"),
                "port": port_no,
                "interface": interface,
                "reachable_mac": mac,
            }),
        }
    }
}

/// Match `name` against a glob `pattern` where `*` matches any run of characters.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let p = pattern.as_bytes();
    let n = name.as_bytes();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ni < n.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            pi += 1;
            mark = ni;
        } else if pi < p.len() && p[pi] == n[ni] {
            pi += 1;
            ni += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

struct Subscriber {
    pattern: String,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out of events to pattern subscribers.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` bounds every subscriber channel.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receive every future event whose name matches `pattern`.
    pub fn subscribe(&self, pattern: &str) -> mpsc::Receiver<Arc<Event>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                pattern: pattern.to_string(),
                tx,
            });
        rx
    }

    /// Deliver `event` to every matching subscriber, waiting for channel room.
    ///
    /// Subscribers whose receiver was dropped are forgotten.
    pub async fn publish(&self, event: Event) {
        let name = event.name();
        let event = Arc::new(event);
        let targets: Vec<mpsc::Sender<Arc<Event>>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sub| pattern_matches(&sub.pattern, &name))
            .map(|sub| sub.tx.clone())
            .collect();

        debug!(event = %name, subscribers = targets.len(), "publishing event");

        let mut lost = false;
        for tx in targets {
            if tx.send(Arc::clone(&event)).await.is_err() {
                lost = true;
            }
        }
        if lost {
            self.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|sub| !sub.tx.is_closed());
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(id: u64) -> Event {
        Event::ConnectionClosed {
            connection: ConnectionId::new(id),
            dpid: None,
        }
    }

    #[test]
    fn glob_matching() {
        assert!(pattern_matches("*", "ofcore.handshake.completed"));
        assert!(pattern_matches("ofcore.*.messages.in.*", "ofcore.v0x04.messages.in.ofpt_hello"));
        assert!(pattern_matches("ofcore.switch.interface.*", "ofcore.switch.interface.link_up"));
        assert!(!pattern_matches("ofcore.switch.interface.*", "ofcore.switch.interfaces.created"));
        assert!(pattern_matches("ofcore.connection.closed", "ofcore.connection.closed"));
        assert!(!pattern_matches("ofcore.connection", "ofcore.connection.closed"));
        assert!(pattern_matches("*.closed", "ofcore.connection.closed"));
    }

    #[test]
    fn interface_event_names() {
        let iface = Interface::default();
        let event = Event::Interface {
            change: InterfaceChange::LinkDown,
            interface: iface,
        };
        assert_eq!(event.name(), "ofcore.switch.interface.link_down");
    }

    #[tokio::test]
    async fn publish_reaches_matching_subscribers_only() {
        let bus = EventBus::new(8);
        let mut all = bus.subscribe("*");
        let mut closed_only = bus.subscribe("ofcore.connection.closed");
        let mut errors = bus.subscribe("ofcore.connection.error");

        bus.publish(closed(1)).await;

        assert_eq!(all.recv().await.unwrap().name(), "ofcore.connection.closed");
        assert_eq!(
            closed_only.recv().await.unwrap().name(),
            "ofcore.connection.closed"
        );
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new(1);
        let rx = bus.subscribe("*");
        let _keep = bus.subscribe("ofcore.handshake.completed");
        drop(rx);

        bus.publish(closed(2)).await;
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn publish_waits_for_room() {
        let bus = Arc::new(EventBus::new(1));
        let mut rx = bus.subscribe("*");
        bus.publish(closed(1)).await;

        let publisher = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.publish(closed(2)).await })
        };
        tokio::task::yield_now().await;
        assert!(!publisher.is_finished());

        rx.recv().await.unwrap();
        publisher.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().dpid(), None);
    }
}
