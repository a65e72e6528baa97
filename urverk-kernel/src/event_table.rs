//! ## urverk-kernel::event_table
//! **The scheduler**
//!
//! Produces the next bag from three sources: a min-heap of internal events,
//! per-target external inboxes, and a min-heap of observation requests.
//! Heap entries are never surgically removed; invalidation bumps the owning
//! simulator's stamp and stale entries are discarded when they surface at
//! the top (lazy deletion).
//!
//! Ordering guarantees, all load-bearing:
//! - equal-time ties resolve by simulator creation order;
//! - executives come last within a bag;
//! - a simulator with internal and external work at one instant appears
//!   exactly once, as a confluent activation;
//! - observations at `t` only fire once every transition at `t` is done.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use tracing::trace;

use urverk_core::pool::BufferPool;
use urverk_core::time::Time;
use urverk_output::ViewId;

use crate::error::KernelError;
use crate::event::ExternalEvent;
use crate::simulator::SimulatorId;

/// How a simulator participates in a bag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BagKind {
    Internal,
    External,
    Confluent,
}

/// One activation within a bag. For external and confluent activations the
/// pending events ride along, regular deliveries before requests, arrival
/// order kept within each class.
#[derive(Debug)]
pub struct BagEntry {
    pub sim: SimulatorId,
    pub kind: BagKind,
    pub events: Vec<ExternalEvent>,
}

/// A due observation popped from the observation heap.
#[derive(Clone, Debug)]
pub struct ObservationDue {
    pub time: Time,
    pub sim: SimulatorId,
    pub view: ViewId,
    pub port: String,
}

/// The minimal nonempty set of activations sharing the soonest time, plus
/// the observation drain when no transition is due.
#[derive(Debug)]
pub struct Bag {
    pub time: Time,
    pub transitions: Vec<BagEntry>,
    pub observations: Vec<ObservationDue>,
}

impl Bag {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.observations.is_empty()
    }

    pub fn is_observation_only(&self) -> bool {
        self.transitions.is_empty() && !self.observations.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct InternalEntry {
    time: Time,
    order: u64,
    stamp: u64,
    sim: SimulatorId,
}

impl Ord for InternalEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.order, self.stamp, self.sim).cmp(&(
            other.time,
            other.order,
            other.stamp,
            other.sim,
        ))
    }
}

impl PartialOrd for InternalEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ObservationEntry {
    time: Time,
    order: u64,
    seq: u64,
    obs_stamp: u64,
    sim: SimulatorId,
    view: ViewId,
    port: String,
}

impl Ord for ObservationEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.order, self.seq).cmp(&(other.time, other.order, other.seq))
    }
}

impl PartialOrd for ObservationEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct PendingInput {
    sim: SimulatorId,
    regular: Vec<ExternalEvent>,
    requests: Vec<ExternalEvent>,
}

/// Per-simulator scheduling state. `stamp`/`obs_stamp` values are drawn
/// from one global counter, so a stale heap entry can never collide with a
/// later registration even if the slab reuses the simulator key.
#[derive(Debug)]
struct SimSched {
    order: u64,
    executive: bool,
    stamp: u64,
    obs_stamp: u64,
    /// Finite `t_next` currently on the heap, if any.
    scheduled: Option<Time>,
}

pub struct EventTable {
    internal_heap: BinaryHeap<Reverse<InternalEntry>>,
    observation_heap: BinaryHeap<Reverse<ObservationEntry>>,
    /// Keyed by simulator creation order: drains deterministically.
    external: BTreeMap<u64, PendingInput>,
    sched: HashMap<SimulatorId, SimSched>,
    /// Recycled inbox buffers; events are bulk-dropped when a bag closes.
    pool: BufferPool<ExternalEvent>,
    current_time: Time,
    next_stamp: u64,
    next_seq: u64,
}

impl EventTable {
    pub fn new(t_begin: Time) -> Self {
        Self::with_retention(t_begin, 64)
    }

    /// `retention` bounds how many idle event buffers survive between bags.
    pub fn with_retention(t_begin: Time, retention: usize) -> Self {
        Self {
            internal_heap: BinaryHeap::new(),
            observation_heap: BinaryHeap::new(),
            external: BTreeMap::new(),
            sched: HashMap::new(),
            pool: BufferPool::new(8, retention),
            current_time: t_begin,
            next_stamp: 0,
            next_seq: 0,
        }
    }

    /// Hands a consumed event buffer back for reuse.
    pub fn recycle(&mut self, events: Vec<ExternalEvent>) {
        self.pool.put_back(events);
    }

    /// Rebounds the pool's idle-buffer retention.
    pub fn set_pool_retention(&mut self, retention: usize) {
        self.pool.set_max_free(retention);
    }

    pub fn current_time(&self) -> Time {
        self.current_time
    }

    fn fresh_stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Announces a simulator to the scheduler. Must precede any scheduling
    /// call for it.
    pub fn register(&mut self, sim: SimulatorId, order: u64, executive: bool) {
        let stamp = self.fresh_stamp();
        let obs_stamp = self.fresh_stamp();
        self.sched.insert(
            sim,
            SimSched {
                order,
                executive,
                stamp,
                obs_stamp,
                scheduled: None,
            },
        );
    }

    fn sched_mut(&mut self, sim: SimulatorId) -> Result<&mut SimSched, KernelError> {
        self.sched.get_mut(&sim).ok_or_else(|| {
            KernelError::InternalInvariant(format!("unregistered simulator {sim}"))
        })
    }

    fn internal_entry_is_live(&self, entry: &InternalEntry) -> bool {
        self.sched
            .get(&entry.sim)
            .map(|s| s.stamp == entry.stamp)
            .unwrap_or(false)
    }

    fn observation_entry_is_live(&self, entry: &ObservationEntry) -> bool {
        self.sched
            .get(&entry.sim)
            .map(|s| s.obs_stamp == entry.obs_stamp)
            .unwrap_or(false)
    }

    fn clean_internal_head(&mut self) {
        while let Some(Reverse(head)) = self.internal_heap.peek() {
            if self.internal_entry_is_live(head) {
                break;
            }
            self.internal_heap.pop();
        }
    }

    fn clean_observation_head(&mut self) {
        while let Some(Reverse(head)) = self.observation_heap.peek() {
            if self.observation_entry_is_live(head) {
                break;
            }
            self.observation_heap.pop();
        }
    }

    /// Time of the next bag: `current_time` while any external inbox is
    /// non-empty (immediate bag), else the soonest heap head, else `∞`.
    pub fn next_time(&mut self) -> Time {
        if !self.external.is_empty() {
            return self.current_time;
        }
        self.clean_internal_head();
        self.clean_observation_head();
        let internal = self
            .internal_heap
            .peek()
            .map(|Reverse(e)| e.time)
            .unwrap_or(Time::INFINITY);
        let observation = self
            .observation_heap
            .peek()
            .map(|Reverse(e)| e.time)
            .unwrap_or(Time::INFINITY);
        internal.min(observation)
    }

    /// Builds the bag at the soonest time and advances `current_time` to it.
    pub fn pop_bag(&mut self) -> Bag {
        let t = self.next_time();
        let mut bag = Bag {
            time: t,
            transitions: Vec::new(),
            observations: Vec::new(),
        };
        if t.is_infinite() {
            return bag;
        }
        self.current_time = t;

        loop {
            self.clean_internal_head();
            let Some(Reverse(head)) = self.internal_heap.peek() else {
                break;
            };
            if head.time != t {
                break;
            }
            let Reverse(entry) = self.internal_heap.pop().expect("peeked entry");
            if let Some(s) = self.sched.get_mut(&entry.sim) {
                s.scheduled = None;
            }
            bag.transitions.push(BagEntry {
                sim: entry.sim,
                kind: BagKind::Internal,
                events: Vec::new(),
            });
        }

        self.merge_externals(&mut bag);
        self.sort_bag(&mut bag);

        if bag.transitions.is_empty() {
            loop {
                self.clean_observation_head();
                let Some(Reverse(head)) = self.observation_heap.peek() else {
                    break;
                };
                if head.time != t {
                    break;
                }
                let Reverse(entry) = self.observation_heap.pop().expect("peeked entry");
                bag.observations.push(ObservationDue {
                    time: entry.time,
                    sim: entry.sim,
                    view: entry.view,
                    port: entry.port,
                });
            }
        }

        trace!(
            t = %t,
            transitions = bag.transitions.len(),
            observations = bag.observations.len(),
            "popped bag"
        );
        bag
    }

    /// Folds externals routed during the λ phase into the already-popped
    /// bag: an internal activation gaining events becomes confluent, an
    /// unseen target joins as a plain external activation.
    pub fn absorb_pending(&mut self, bag: &mut Bag) {
        self.merge_externals(bag);
        self.sort_bag(bag);
    }

    fn merge_externals(&mut self, bag: &mut Bag) {
        let drained = std::mem::take(&mut self.external);
        for (_, pending) in drained {
            let PendingInput {
                sim,
                regular: mut events,
                requests: mut rest,
            } = pending;
            if !self.sched.contains_key(&sim) {
                self.pool.put_back(events);
                self.pool.put_back(rest);
                continue;
            }
            events.append(&mut rest);
            self.pool.put_back(rest);
            match bag.transitions.iter_mut().find(|entry| entry.sim == sim) {
                Some(entry) => {
                    if entry.kind == BagKind::Internal {
                        entry.kind = BagKind::Confluent;
                    }
                    entry.events.append(&mut events);
                    self.pool.put_back(events);
                }
                None => bag.transitions.push(BagEntry {
                    sim,
                    kind: BagKind::External,
                    events,
                }),
            }
        }
    }

    /// Executives transition last; everything else is creation order.
    fn sort_bag(&self, bag: &mut Bag) {
        bag.transitions.sort_by_key(|entry| {
            self.sched
                .get(&entry.sim)
                .map(|s| (s.executive, s.order))
                .unwrap_or((true, u64::MAX))
        });
    }

    /// (Re)schedules the next internal event. Any previous entry for the
    /// simulator goes stale; infinite `t_next` retires it from the heap.
    pub fn schedule_internal(&mut self, sim: SimulatorId, t_next: Time) -> Result<(), KernelError> {
        let stamp = self.fresh_stamp();
        let s = self.sched_mut(sim)?;
        s.stamp = stamp;
        if t_next.is_finite() {
            s.scheduled = Some(t_next);
            let order = s.order;
            self.internal_heap.push(Reverse(InternalEntry {
                time: t_next,
                order,
                stamp,
                sim,
            }));
        } else {
            s.scheduled = None;
        }
        Ok(())
    }

    /// Queues inbound events for delivery. A regular delivery supersedes a
    /// strictly later scheduled internal: the impending δ_ext recomputes τ,
    /// so the stale heap entry is invalidated here.
    pub fn schedule_external(
        &mut self,
        sim: SimulatorId,
        events: Vec<ExternalEvent>,
        request: bool,
    ) -> Result<(), KernelError> {
        let current_time = self.current_time;
        let stamp = self.fresh_stamp();
        let s = self.sched_mut(sim)?;
        let order = s.order;
        if !request {
            if let Some(t_next) = s.scheduled {
                if t_next > current_time {
                    s.stamp = stamp;
                    s.scheduled = None;
                }
            }
        }
        if !self.external.contains_key(&order) {
            let inbox = PendingInput {
                sim,
                regular: self.pool.take(),
                requests: self.pool.take(),
            };
            self.external.insert(order, inbox);
        }
        let pending = self.external.get_mut(&order).expect("inbox just ensured");
        if request {
            pending.requests.extend(events);
        } else {
            pending.regular.extend(events);
        }
        Ok(())
    }

    /// Queues one observation request at `t`.
    pub fn schedule_observation(
        &mut self,
        t: Time,
        sim: SimulatorId,
        view: ViewId,
        port: impl Into<String>,
    ) -> Result<(), KernelError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let s = self.sched_mut(sim)?;
        let order = s.order;
        let obs_stamp = s.obs_stamp;
        self.observation_heap.push(Reverse(ObservationEntry {
            time: t,
            order,
            seq,
            obs_stamp,
            sim,
            view,
            port: port.into(),
        }));
        Ok(())
    }

    /// Drains every live observation due at or before `t`, soonest first.
    pub fn pop_observations_due(&mut self, t: Time) -> Vec<ObservationDue> {
        let mut due = Vec::new();
        loop {
            self.clean_observation_head();
            let Some(Reverse(head)) = self.observation_heap.peek() else {
                break;
            };
            if head.time > t {
                break;
            }
            let Reverse(entry) = self.observation_heap.pop().expect("peeked entry");
            due.push(ObservationDue {
                time: entry.time,
                sim: entry.sim,
                view: entry.view,
                port: entry.port,
            });
        }
        due
    }

    /// Marks every pending event bound to the simulator stale and clears
    /// its inbox. The simulator itself stays registered.
    pub fn invalidate(&mut self, sim: SimulatorId) -> Result<(), KernelError> {
        let stamp = self.fresh_stamp();
        let obs_stamp = self.fresh_stamp();
        let s = self.sched_mut(sim)?;
        s.stamp = stamp;
        s.obs_stamp = obs_stamp;
        s.scheduled = None;
        let order = s.order;
        if let Some(inbox) = self.external.remove(&order) {
            self.pool.put_back(inbox.regular);
            self.pool.put_back(inbox.requests);
        }
        Ok(())
    }

    /// [`Self::invalidate`] plus removal of all book-keeping; subsequent
    /// bags can never contain the simulator.
    pub fn delete(&mut self, sim: SimulatorId) -> Result<(), KernelError> {
        self.invalidate(sim)?;
        self.sched.remove(&sim);
        Ok(())
    }

    /// Live scheduled entries: heap entries that would still fire plus
    /// queued external deliveries. Stale heap residue is not counted.
    pub fn event_count(&self) -> usize {
        let internal = self
            .internal_heap
            .iter()
            .filter(|Reverse(e)| self.internal_entry_is_live(e))
            .count();
        let observations = self
            .observation_heap
            .iter()
            .filter(|Reverse(e)| self.observation_entry_is_live(e))
            .count();
        let external: usize = self
            .external
            .values()
            .map(|p| p.regular.len() + p.requests.len())
            .sum();
        internal + observations + external
    }

    pub fn has_pending_external(&self) -> bool {
        !self.external.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urverk_core::value::Map;

    fn sim(n: usize) -> SimulatorId {
        SimulatorId(n)
    }

    fn event(port: &str) -> ExternalEvent {
        ExternalEvent {
            port: port.into(),
            source: None,
            attributes: Map::new(),
        }
    }

    fn table_with(sims: &[(usize, bool)]) -> EventTable {
        let mut table = EventTable::new(Time::ZERO);
        for (i, &(id, executive)) in sims.iter().enumerate() {
            table.register(sim(id), i as u64, executive);
        }
        table
    }

    #[test]
    fn equal_times_resolve_by_registration_order() {
        let mut table = table_with(&[(7, false), (3, false), (5, false)]);
        table.schedule_internal(sim(5), Time::new(1.0)).unwrap();
        table.schedule_internal(sim(7), Time::new(1.0)).unwrap();
        table.schedule_internal(sim(3), Time::new(1.0)).unwrap();

        let bag = table.pop_bag();
        let order: Vec<SimulatorId> = bag.transitions.iter().map(|e| e.sim).collect();
        assert_eq!(order, vec![sim(7), sim(3), sim(5)]);
    }

    #[test]
    fn reschedule_supersedes_older_entry() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(5.0)).unwrap();
        table.schedule_internal(sim(0), Time::new(3.0)).unwrap();

        assert_eq!(table.next_time(), Time::new(3.0));
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::new(3.0));
        assert_eq!(bag.transitions.len(), 1);

        // the stale 5.0 entry must not produce a second firing
        assert_eq!(table.next_time(), Time::INFINITY);
    }

    #[test]
    fn externals_force_an_immediate_bag() {
        let mut table = table_with(&[(0, false), (1, false)]);
        table.schedule_internal(sim(0), Time::new(9.0)).unwrap();
        table
            .schedule_external(sim(1), vec![event("in")], false)
            .unwrap();

        assert_eq!(table.next_time(), Time::ZERO);
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::ZERO);
        assert_eq!(bag.transitions.len(), 1);
        assert_eq!(bag.transitions[0].kind, BagKind::External);
    }

    #[test]
    fn external_supersedes_later_internal() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(4.0)).unwrap();
        table
            .schedule_external(sim(0), vec![event("in")], false)
            .unwrap();

        let bag = table.pop_bag();
        assert_eq!(bag.transitions[0].kind, BagKind::External);
        // the 4.0 internal entry was invalidated; nothing left
        assert_eq!(table.next_time(), Time::INFINITY);
    }

    #[test]
    fn internal_and_external_fuse_to_confluent() {
        let mut table = table_with(&[(0, false)]);
        // advance the clock to 2.0 with a throwaway bag
        table.schedule_internal(sim(0), Time::new(2.0)).unwrap();
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::new(2.0));

        // internal at exactly current_time plus an external: one confluent
        table.schedule_internal(sim(0), Time::new(2.0)).unwrap();
        table
            .schedule_external(sim(0), vec![event("in")], false)
            .unwrap();
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::new(2.0));
        assert_eq!(bag.transitions.len(), 1);
        assert_eq!(bag.transitions[0].kind, BagKind::Confluent);
        assert_eq!(bag.transitions[0].events.len(), 1);
    }

    #[test]
    fn requests_ride_after_regular_events() {
        let mut table = table_with(&[(0, false)]);
        table
            .schedule_external(sim(0), vec![event("request")], true)
            .unwrap();
        table
            .schedule_external(sim(0), vec![event("in")], false)
            .unwrap();
        let bag = table.pop_bag();
        let ports: Vec<&str> = bag.transitions[0]
            .events
            .iter()
            .map(|e| e.port.as_str())
            .collect();
        assert_eq!(ports, vec!["in", "request"]);
    }

    #[test]
    fn executives_transition_last() {
        let mut table = table_with(&[(0, true), (1, false), (2, false)]);
        for id in 0..3 {
            table.schedule_internal(sim(id), Time::new(1.0)).unwrap();
        }
        let bag = table.pop_bag();
        let order: Vec<SimulatorId> = bag.transitions.iter().map(|e| e.sim).collect();
        assert_eq!(order, vec![sim(1), sim(2), sim(0)]);
    }

    #[test]
    fn absorb_upgrades_bag_members() {
        let mut table = table_with(&[(0, false), (1, false)]);
        table.schedule_internal(sim(0), Time::new(1.0)).unwrap();
        table.schedule_internal(sim(1), Time::new(1.0)).unwrap();
        let mut bag = table.pop_bag();
        assert_eq!(bag.transitions.len(), 2);

        // λ of sim 1 routed an event to sim 0
        table
            .schedule_external(sim(0), vec![event("in")], false)
            .unwrap();
        table.absorb_pending(&mut bag);

        assert_eq!(bag.transitions[0].sim, sim(0));
        assert_eq!(bag.transitions[0].kind, BagKind::Confluent);
        assert_eq!(bag.transitions[1].kind, BagKind::Internal);
        assert!(!table.has_pending_external());
    }

    #[test]
    fn observations_wait_for_transitions_at_same_time() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(1.0)).unwrap();
        table
            .schedule_observation(Time::new(1.0), sim(0), ViewId::from_index(0), "p")
            .unwrap();

        let bag = table.pop_bag();
        assert_eq!(bag.transitions.len(), 1);
        assert!(bag.observations.is_empty());

        let due = table.pop_observations_due(Time::new(1.0));
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn observation_only_bag_when_no_transition_is_due() {
        let mut table = table_with(&[(0, false)]);
        table
            .schedule_observation(Time::new(2.0), sim(0), ViewId::from_index(0), "p")
            .unwrap();
        assert_eq!(table.next_time(), Time::new(2.0));
        let bag = table.pop_bag();
        assert!(bag.is_observation_only());
        assert_eq!(bag.observations.len(), 1);
    }

    #[test]
    fn schedule_then_invalidate_equals_never_scheduled() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(1.0)).unwrap();
        table
            .schedule_external(sim(0), vec![event("in")], false)
            .unwrap();
        table
            .schedule_observation(Time::new(1.0), sim(0), ViewId::from_index(0), "p")
            .unwrap();
        table.invalidate(sim(0)).unwrap();

        assert_eq!(table.next_time(), Time::INFINITY);
        assert_eq!(table.event_count(), 0);
    }

    #[test]
    fn deleted_simulator_never_reappears_even_after_key_reuse() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(1.5)).unwrap();
        table.delete(sim(0)).unwrap();

        // the slab may hand the same key to a fresh simulator
        table.register(sim(0), 1, false);
        assert_eq!(table.next_time(), Time::INFINITY);

        table.schedule_internal(sim(0), Time::new(4.0)).unwrap();
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::new(4.0));
        assert_eq!(bag.transitions.len(), 1);
    }

    #[test]
    fn events_to_dead_simulators_are_dropped() {
        let mut table = table_with(&[(0, false), (1, false)]);
        table
            .schedule_external(sim(1), vec![event("in")], false)
            .unwrap();
        table.delete(sim(1)).unwrap();
        let bag = table.pop_bag();
        assert!(bag.is_empty());
    }

    #[test]
    fn zero_tau_produces_a_same_time_bag() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(2.0)).unwrap();
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::new(2.0));

        // transient: τ = 0 reschedules at the same instant
        table.schedule_internal(sim(0), Time::new(2.0)).unwrap();
        let bag = table.pop_bag();
        assert_eq!(bag.time, Time::new(2.0));
        assert_eq!(bag.transitions.len(), 1);
    }

    #[test]
    fn event_count_ignores_stale_heap_residue() {
        let mut table = table_with(&[(0, false)]);
        table.schedule_internal(sim(0), Time::new(5.0)).unwrap();
        table.schedule_internal(sim(0), Time::new(3.0)).unwrap();
        table.schedule_internal(sim(0), Time::new(4.0)).unwrap();
        assert_eq!(table.event_count(), 1);
    }
}
