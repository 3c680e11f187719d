//! Receipt ordering for messages that change interface state.
//!
//! Port-status and multipart replies can be handled out of arrival order (replies are
//! grouped and handled after the rest of a read batch). Each such message gets a
//! per-switch sequence number when it is read; an interface update is applied only if
//! it is not older than the last update applied to that interface.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct SequenceState {
    global_counter: u64,
    seq_by_xid: HashMap<u32, u64>,
    last_applied_by_interface: HashMap<u32, u64>,
}

impl SequenceState {
    fn seq_of(&self, xid: u32) -> u64 {
        self.seq_by_xid.get(&xid).copied().unwrap_or(0)
    }
}

/// Per-switch, per-interface sequencing.
#[derive(Debug)]
pub struct SequenceGuard {
    enabled: bool,
    switches: Mutex<HashMap<u64, SequenceState>>,
}

impl SequenceGuard {
    /// `enabled = false` admits every update.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            switches: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Assign the next sequence number for `dpid` to `xid`.
    pub fn record(&self, dpid: u64, xid: u32) -> u64 {
        let mut switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        let state = switches.entry(dpid).or_default();
        state.global_counter += 1;
        let seq = state.global_counter;
        state.seq_by_xid.insert(xid, seq);
        seq
    }

    /// Whether the update carried by `xid` may be applied to `interface`.
    pub fn should_apply(&self, dpid: u64, interface: u32, xid: u32) -> bool {
        if !self.enabled {
            return true;
        }
        let switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = switches.get(&dpid) else {
            return true;
        };
        let last = state
            .last_applied_by_interface
            .get(&interface)
            .copied()
            .unwrap_or(0);
        state.seq_of(xid) >= last
    }

    /// Remember that the update carried by `xid` was applied to `interface`.
    pub fn apply(&self, dpid: u64, interface: u32, xid: u32) {
        let mut switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        let state = switches.entry(dpid).or_default();
        let seq = state.seq_of(xid);
        state.last_applied_by_interface.insert(interface, seq);
    }

    /// Drop the sequence number of `xid` once its last message has been handled.
    ///
    /// Per-interface history is kept.
    pub fn forget(&self, dpid: u64, xid: u32) {
        let mut switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = switches.get_mut(&dpid) {
            state.seq_by_xid.remove(&xid);
        }
    }

    /// Number of xids currently holding a sequence number for `dpid`.
    pub fn tracked_xids(&self, dpid: u64) -> usize {
        let switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        switches.get(&dpid).map_or(0, |s| s.seq_by_xid.len())
    }

    /// Sequence number recorded for `xid`, 0 if none.
    pub fn seq_of(&self, dpid: u64, xid: u32) -> u64 {
        let switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        switches.get(&dpid).map(|s| s.seq_of(xid)).unwrap_or(0)
    }

    /// Last sequence applied to `interface`, 0 if none.
    pub fn last_applied(&self, dpid: u64, interface: u32) -> u64 {
        let switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        switches
            .get(&dpid)
            .and_then(|s| s.last_applied_by_interface.get(&interface).copied())
            .unwrap_or(0)
    }

    /// Forget everything about `dpid`.
    pub fn reset(&self, dpid: u64) {
        self.switches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&dpid);
    }
}
