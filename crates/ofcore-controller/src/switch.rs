//! Switch registry: last-known state per datapath id.
//!
//! Only the controller mutates entries. Everything handed out is a clone.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use ofcore_codec::stats::format_mac;
use ofcore_codec::{FlowStats, PortDesc, SwitchDesc, SwitchFeatures, TableStats};
use ofcore_transport::ConnectionId;
use serde::Serialize;

use crate::error::{ControllerError, Result};

/// One port of a switch as the controller sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub dpid: u64,
    pub port_no: u32,
    pub name: String,
    pub hw_addr: String,
    pub config: u32,
    pub state: u32,
    /// Current features bitmap.
    pub features: u32,
    pub speed: u32,
    pub max_speed: u32,
    pub active: bool,
}

impl Interface {
    pub fn from_port(dpid: u64, port: &PortDesc) -> Self {
        Self {
            dpid,
            port_no: port.port_no,
            name: port.name.clone(),
            hw_addr: format_mac(&port.hw_addr),
            config: port.config,
            state: port.state,
            features: port.curr,
            speed: port.curr_speed,
            max_speed: port.max_speed,
            active: port.is_active(),
        }
    }

    /// `dpid:port` identifier.
    pub fn id(&self) -> String {
        format!("{:016x}:{}", self.dpid, self.port_no)
    }

    pub fn is_link_down(&self) -> bool {
        self.state & ofcore_codec::types::port_state::LINK_DOWN != 0
    }
}

/// Snapshot of one switch.
#[derive(Debug, Clone)]
pub struct Switch {
    pub dpid: u64,
    pub version: u8,
    /// Connection currently bound to the switch, if any.
    pub connection: Option<ConnectionId>,
    pub features: Option<SwitchFeatures>,
    pub description: Option<SwitchDesc>,
    pub flows: Vec<FlowStats>,
    pub tables: Vec<TableStats>,
    pub interfaces: BTreeMap<u32, Interface>,
    pub last_seen: SystemTime,
}

impl Switch {
    fn new(dpid: u64, version: u8, connection: ConnectionId) -> Self {
        Self {
            dpid,
            version,
            connection: Some(connection),
            features: None,
            description: None,
            flows: Vec::new(),
            tables: Vec::new(),
            interfaces: BTreeMap::new(),
            last_seen: SystemTime::now(),
        }
    }

    /// Whether the switch advertised table statistics support.
    pub fn has_table_stats(&self) -> bool {
        self.features
            .as_ref()
            .is_some_and(|f| f.has_capability(ofcore_codec::types::capabilities::TABLE_STATS))
    }
}

/// All switches ever seen, keyed by dpid.
#[derive(Debug, Default)]
pub struct SwitchRegistry {
    switches: Mutex<HashMap<u64, Switch>>,
}

impl SwitchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut HashMap<u64, Switch>) -> T) -> T {
        let mut guard = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn with_switch<T>(&self, dpid: u64, f: impl FnOnce(&mut Switch) -> T) -> Result<T> {
        self.with(|map| {
            map.get_mut(&dpid)
                .map(|switch| {
                    switch.last_seen = SystemTime::now();
                    f(switch)
                })
                .ok_or(ControllerError::UnknownSwitch(dpid))
        })
    }

    /// Bind `connection` to the switch, creating it on first sight.
    ///
    /// Returns `true` when the switch was created.
    pub fn get_or_create(&self, dpid: u64, version: u8, connection: ConnectionId) -> bool {
        self.with(|map| match map.get_mut(&dpid) {
            Some(switch) => {
                switch.connection = Some(connection);
                switch.version = version;
                switch.last_seen = SystemTime::now();
                false
            }
            None => {
                map.insert(dpid, Switch::new(dpid, version, connection));
                true
            }
        })
    }

    /// Detach `connection` if it is still the one bound to `dpid`.
    ///
    /// Returns `true` when it was bound, meaning per-switch state should be reset.
    pub fn unbind(&self, dpid: u64, connection: ConnectionId) -> bool {
        self.with(|map| match map.get_mut(&dpid) {
            Some(switch) if switch.connection == Some(connection) => {
                switch.connection = None;
                true
            }
            _ => false,
        })
    }

    /// Update the last-seen timestamp, if the switch is known.
    pub fn touch(&self, dpid: u64) {
        let _ = self.with_switch(dpid, |_| ());
    }

    pub fn connection_of(&self, dpid: u64) -> Option<ConnectionId> {
        self.with(|map| map.get(&dpid).and_then(|s| s.connection))
    }

    pub fn get(&self, dpid: u64) -> Option<Switch> {
        self.with(|map| map.get(&dpid).cloned())
    }

    pub fn contains(&self, dpid: u64) -> bool {
        self.with(|map| map.contains_key(&dpid))
    }

    /// Known dpids, sorted.
    pub fn dpids(&self) -> Vec<u64> {
        let mut dpids: Vec<u64> = self.with(|map| map.keys().copied().collect());
        dpids.sort_unstable();
        dpids
    }

    pub fn update_features(&self, dpid: u64, features: SwitchFeatures) -> Result<()> {
        self.with_switch(dpid, |s| s.features = Some(features))
    }

    pub fn set_description(&self, dpid: u64, desc: SwitchDesc) -> Result<()> {
        self.with_switch(dpid, |s| s.description = Some(desc))
    }

    /// Replace the flow table with a complete flow stats reply.
    pub fn update_flows(&self, dpid: u64, flows: Vec<FlowStats>) -> Result<()> {
        self.with_switch(dpid, |s| s.flows = flows)
    }

    pub fn update_tables(&self, dpid: u64, tables: Vec<TableStats>) -> Result<()> {
        self.with_switch(dpid, |s| s.tables = tables)
    }

    pub fn interface(&self, dpid: u64, port_no: u32) -> Option<Interface> {
        self.with(|map| {
            map.get(&dpid)
                .and_then(|s| s.interfaces.get(&port_no))
                .cloned()
        })
    }

    /// Insert or replace an interface, returning the previous one.
    pub fn upsert_interface(&self, interface: Interface) -> Result<Option<Interface>> {
        self.with_switch(interface.dpid, |s| {
            s.interfaces.insert(interface.port_no, interface)
        })
    }

    /// Mark an interface inactive. `Ok(None)` when the port is unknown.
    pub fn deactivate_interface(&self, dpid: u64, port_no: u32) -> Result<Option<Interface>> {
        self.with_switch(dpid, |s| {
            s.interfaces.get_mut(&port_no).map(|iface| {
                iface.active = false;
                iface.clone()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofcore_codec::types::{capabilities, port_no, port_state};

    const DPID: u64 = 0x0000_0000_0000_0001;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[test]
    fn create_then_rebind() {
        let registry = SwitchRegistry::new();
        assert!(registry.get_or_create(DPID, 4, conn(1)));
        assert!(!registry.get_or_create(DPID, 4, conn(2)));
        assert_eq!(registry.connection_of(DPID), Some(conn(2)));
        assert_eq!(registry.dpids(), vec![DPID]);
    }

    #[test]
    fn unbind_only_for_current_connection() {
        let registry = SwitchRegistry::new();
        registry.get_or_create(DPID, 4, conn(1));
        registry.get_or_create(DPID, 4, conn(2));

        assert!(!registry.unbind(DPID, conn(1)));
        assert_eq!(registry.connection_of(DPID), Some(conn(2)));
        assert!(registry.unbind(DPID, conn(2)));
        assert_eq!(registry.connection_of(DPID), None);
    }

    #[test]
    fn updates_on_unknown_switch_fail() {
        let registry = SwitchRegistry::new();
        let err = registry.update_flows(DPID, Vec::new()).unwrap_err();
        assert!(matches!(err, ControllerError::UnknownSwitch(DPID)));
    }

    #[test]
    fn interfaces_upsert_and_deactivate() {
        let registry = SwitchRegistry::new();
        registry.get_or_create(DPID, 4, conn(1));

        let port = PortDesc {
            port_no: 1,
            state: port_state::LIVE,
            ..PortDesc::default()
        };
        let iface = Interface::from_port(DPID, &port);
        assert!(iface.active);
        assert!(registry.upsert_interface(iface.clone()).unwrap().is_none());
        assert_eq!(registry.upsert_interface(iface).unwrap().map(|i| i.port_no), Some(1));

        let deactivated = registry.deactivate_interface(DPID, 1).unwrap().unwrap();
        assert!(!deactivated.active);
        assert!(registry.deactivate_interface(DPID, 9).unwrap().is_none());
    }

    #[test]
    fn local_port_is_active() {
        let port = PortDesc {
            port_no: port_no::LOCAL,
            state: port_state::LINK_DOWN,
            ..PortDesc::default()
        };
        let iface = Interface::from_port(DPID, &port);
        assert!(iface.active);
        assert!(iface.is_link_down());
        assert_eq!(iface.id(), "0000000000000001:4294967294");
    }

    #[test]
    fn table_stats_capability() {
        let registry = SwitchRegistry::new();
        registry.get_or_create(DPID, 4, conn(1));
        assert!(!registry.get(DPID).unwrap().has_table_stats());

        registry
            .update_features(
                DPID,
                SwitchFeatures {
                    datapath_id: DPID,
                    capabilities: capabilities::TABLE_STATS,
                    ..SwitchFeatures::default()
                },
            )
            .unwrap();
        assert!(registry.get(DPID).unwrap().has_table_stats());
    }
}
