//! Interface bookkeeping from port-status messages and port descriptions, plus MAC
//! reachability learned from packet-ins.

use ofcore_codec::stats::format_mac;
use ofcore_codec::types::{ether_type, port_config};
use ofcore_codec::{PacketIn, PortDesc, PortReason, PortStatus};
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::events::{Event, InterfaceChange};
use crate::switch::Interface;

/// Ports reporting no supported features and no speed cannot forward.
fn effective_config(port: &PortDesc) -> u32 {
    if port.supported == 0 && port.curr_speed == 0 && port.max_speed == 0 {
        port_config::NO_FWD
    } else {
        port.config
    }
}

impl Controller {
    async fn publish_interface(&self, change: InterfaceChange, interface: Interface) {
        self.inner
            .bus
            .publish(Event::Interface { change, interface })
            .await;
    }

    /// Apply a port-status message received under `xid` from `dpid`.
    pub(crate) async fn handle_port_status(&self, dpid: u64, xid: u32, status: &PortStatus) {
        let port = &status.desc;
        let guard = &self.inner.guard;
        if !guard.should_apply(dpid, port.port_no, xid) {
            info!(
                dpid = %format!("{dpid:016x}"),
                port = port.port_no,
                reason = ?status.reason,
                state = port.state,
                seq = guard.seq_of(dpid, xid),
                last_applied = guard.last_applied(dpid, port.port_no),
                "skipping late port status"
            );
            return;
        }

        let switches = &self.inner.switches;
        let interface = Interface::from_port(dpid, port);
        let change = match status.reason {
            PortReason::Add => {
                if let Err(err) = switches.upsert_interface(interface.clone()) {
                    warn!(error = %err, "port add on unknown switch");
                    return;
                }
                self.publish_interface(InterfaceChange::Created, interface)
                    .await;
                InterfaceChange::Created
            }
            PortReason::Modify => {
                let previous = match switches.upsert_interface(interface.clone()) {
                    Ok(previous) => previous,
                    Err(err) => {
                        warn!(error = %err, "port modify on unknown switch");
                        return;
                    }
                };
                let link_changed = match &previous {
                    Some(prev) if prev.state != 0 => prev.is_link_down() != interface.is_link_down(),
                    _ => true,
                };
                if link_changed {
                    let link = if interface.is_link_down() {
                        InterfaceChange::LinkDown
                    } else {
                        InterfaceChange::LinkUp
                    };
                    self.publish_interface(link, interface.clone()).await;
                }
                let change = if previous.is_some() {
                    InterfaceChange::Modified
                } else {
                    InterfaceChange::Created
                };
                self.publish_interface(change, interface).await;
                change
            }
            PortReason::Delete => match switches.deactivate_interface(dpid, port.port_no) {
                Ok(Some(interface)) => {
                    self.publish_interface(InterfaceChange::Deleted, interface)
                        .await;
                    InterfaceChange::Deleted
                }
                Ok(None) => {
                    warn!(
                        dpid = %format!("{dpid:016x}"),
                        port = port.port_no,
                        "port delete for unknown interface"
                    );
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "port delete on unknown switch");
                    return;
                }
            },
        };

        guard.apply(dpid, port.port_no, xid);
        info!(
            dpid = %format!("{dpid:016x}"),
            port = port.port_no,
            change = change.as_str(),
            state = port.state,
            "port status"
        );
    }

    /// Publish the source MAC of a packet-in as reachable behind its ingress port.
    ///
    /// LLDP and IPv6 frames are ignored.
    pub(crate) async fn handle_packet_in(&self, dpid: u64, packet: &PacketIn) {
        let Some(eth) = packet.ethernet() else {
            debug!(dpid = %format!("{dpid:016x}"), "packet-in without ethernet header");
            return;
        };
        if matches!(eth.ether_type, ether_type::LLDP | ether_type::IPV6) {
            return;
        }

        let mac = format_mac(&eth.src);
        debug!(
            dpid = %format!("{dpid:016x}"),
            port = packet.in_port,
            %mac,
            "mac reachable"
        );
        self.inner
            .bus
            .publish(Event::ReachableMac {
                dpid,
                port_no: packet.in_port,
                interface: self.inner.switches.interface(dpid, packet.in_port),
                mac,
            })
            .await;
    }

    /// Record a list of port descriptions (port-desc reply, or 1.0 features reply).
    pub(crate) async fn apply_port_descs(&self, dpid: u64, xid: u32, ports: &[PortDesc]) {
        let guard = &self.inner.guard;
        let mut created = Vec::new();

        for port in ports {
            if !guard.should_apply(dpid, port.port_no, xid) {
                info!(
                    dpid = %format!("{dpid:016x}"),
                    port = port.port_no,
                    seq = guard.seq_of(dpid, xid),
                    last_applied = guard.last_applied(dpid, port.port_no),
                    "skipping late port description"
                );
                continue;
            }

            let mut interface = Interface::from_port(dpid, port);
            interface.config = effective_config(port);
            if let Err(err) = self.inner.switches.upsert_interface(interface.clone()) {
                warn!(error = %err, "port description for unknown switch");
                return;
            }
            guard.apply(dpid, port.port_no, xid);

            self.inner
                .bus
                .publish(Event::PortCreated {
                    dpid,
                    port_no: port.port_no,
                    name: port.name.clone(),
                    hw_addr: interface.hw_addr.clone(),
                    state: port.state,
                })
                .await;
            self.publish_interface(InterfaceChange::Created, interface.clone())
                .await;
            created.push(interface);
        }

        debug!(
            dpid = %format!("{dpid:016x}"),
            ports = ports.len(),
            applied = created.len(),
            "port descriptions applied"
        );
        if !created.is_empty() {
            self.inner
                .bus
                .publish(Event::InterfacesCreated {
                    dpid,
                    interfaces: created,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speedless_ports_cannot_forward() {
        let port = PortDesc {
            port_no: 3,
            config: port_config::PORT_DOWN,
            ..PortDesc::default()
        };
        assert_eq!(effective_config(&port), port_config::NO_FWD);

        let fast = PortDesc {
            curr_speed: 10_000_000,
            config: port_config::PORT_DOWN,
            ..port
        };
        assert_eq!(effective_config(&fast), port_config::PORT_DOWN);
    }
}
