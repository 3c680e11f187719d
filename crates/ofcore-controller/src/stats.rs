//! Correlation of multipart statistics replies with the requests that caused them.
//!
//! At most one flow, port and table request is outstanding per switch. Fragments are
//! accumulated under the request's xid and handed back as one batch when the terminal
//! fragment (more bit clear) arrives.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use ofcore_codec::{FlowStats, MultipartReply, MultipartReplyBody, PortStats, TableStats};

/// Statistics kinds under correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKind {
    Flows,
    Ports,
    Tables,
}

impl StatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flows => "flows",
            Self::Ports => "ports",
            Self::Tables => "tables",
        }
    }
}

/// Result of [`StatsCorrelator::begin_poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// A previous request is still pending; `skip_count` is the new count.
    Skipped { skip_count: u32 },
    /// Send these requests, in order, under the given xids.
    Issue(Vec<(StatKind, u32)>),
}

/// A fully reassembled reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsBatch {
    Flows(Vec<FlowStats>),
    Ports(Vec<PortStats>),
    Tables(Vec<TableStats>),
}

/// Result of [`StatsCorrelator::on_fragment`].
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentOutcome {
    /// Not a correlated kind, or not the pending xid.
    NotOurs,
    /// Accumulated; more fragments follow.
    Pending,
    Complete(StatsBatch),
}

#[derive(Debug, Default)]
struct PendingStats {
    xid_by_kind: HashMap<StatKind, u32>,
    flows: Vec<FlowStats>,
    ports: Vec<PortStats>,
    tables: Vec<TableStats>,
    skip_count: u32,
}

impl PendingStats {
    fn clear_kind(&mut self, kind: StatKind) {
        self.xid_by_kind.remove(&kind);
        match kind {
            StatKind::Flows => self.flows.clear(),
            StatKind::Ports => self.ports.clear(),
            StatKind::Tables => self.tables.clear(),
        }
    }
}

/// Per-switch pending stats sessions.
#[derive(Debug)]
pub struct StatsCorrelator {
    max_skip: u32,
    switches: Mutex<HashMap<u64, PendingStats>>,
}

impl StatsCorrelator {
    /// `max_skip` is how many consecutive polls may be skipped while a request is
    /// pending before the pending state is abandoned and requests are reissued.
    pub fn new(max_skip: u32) -> Self {
        Self {
            max_skip,
            switches: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether to issue a new round of requests for `dpid`.
    ///
    /// `next_xid` is called once per issued kind; the xid is recorded before the
    /// decision is returned, so replies can never race the bookkeeping.
    pub fn begin_poll(
        &self,
        dpid: u64,
        table_capable: bool,
        mut next_xid: impl FnMut() -> u32,
    ) -> PollDecision {
        let mut switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = switches.entry(dpid).or_default();

        let busy = pending.xid_by_kind.contains_key(&StatKind::Flows)
            || pending.xid_by_kind.contains_key(&StatKind::Ports)
            || (table_capable && pending.xid_by_kind.contains_key(&StatKind::Tables));
        if busy && pending.skip_count < self.max_skip {
            pending.skip_count += 1;
            return PollDecision::Skipped {
                skip_count: pending.skip_count,
            };
        }

        for kind in [StatKind::Flows, StatKind::Ports, StatKind::Tables] {
            pending.clear_kind(kind);
        }
        pending.skip_count = 0;

        let mut kinds = vec![StatKind::Flows, StatKind::Ports];
        if table_capable {
            kinds.push(StatKind::Tables);
        }
        let issued = kinds
            .into_iter()
            .map(|kind| {
                let xid = next_xid();
                pending.xid_by_kind.insert(kind, xid);
                (kind, xid)
            })
            .collect();
        PollDecision::Issue(issued)
    }

    /// Feed one multipart reply fragment.
    pub fn on_fragment(&self, dpid: u64, xid: u32, reply: &MultipartReply) -> FragmentOutcome {
        let kind = match &reply.body {
            MultipartReplyBody::Flow(_) => StatKind::Flows,
            MultipartReplyBody::PortStats(_) => StatKind::Ports,
            MultipartReplyBody::Table(_) => StatKind::Tables,
            _ => return FragmentOutcome::NotOurs,
        };

        let mut switches = self.switches.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pending) = switches.get_mut(&dpid) else {
            return FragmentOutcome::NotOurs;
        };
        if pending.xid_by_kind.get(&kind) != Some(&xid) {
            return FragmentOutcome::NotOurs;
        }

        match &reply.body {
            MultipartReplyBody::Flow(entries) => pending.flows.extend_from_slice(entries),
            MultipartReplyBody::PortStats(entries) => pending.ports.extend_from_slice(entries),
            MultipartReplyBody::Table(entries) => pending.tables.extend_from_slice(entries),
            _ => {}
        }
        if reply.more() {
            return FragmentOutcome::Pending;
        }

        pending.xid_by_kind.remove(&kind);
        let batch = match kind {
            StatKind::Flows => StatsBatch::Flows(std::mem::take(&mut pending.flows)),
            StatKind::Ports => StatsBatch::Ports(std::mem::take(&mut pending.ports)),
            StatKind::Tables => StatsBatch::Tables(std::mem::take(&mut pending.tables)),
        };
        FragmentOutcome::Complete(batch)
    }

    /// Drop every pending request, accumulator and the skip count for `dpid`.
    pub fn reset(&self, dpid: u64) {
        self.switches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&dpid);
    }

    pub fn pending_xid(&self, dpid: u64, kind: StatKind) -> Option<u32> {
        self.switches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dpid)
            .and_then(|p| p.xid_by_kind.get(&kind).copied())
    }

    pub fn skip_count(&self, dpid: u64) -> u32 {
        self.switches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dpid)
            .map(|p| p.skip_count)
            .unwrap_or(0)
    }
}
