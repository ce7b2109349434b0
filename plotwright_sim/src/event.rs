// Sim events: timed wake-ups for the sim itself and notifications for the
// host.
//
// Nothing in the sim runs on a thread or a frame callback. Anything that has
// to happen later (a construction timer, the next drag re-evaluation) is a
// `ScheduledEvent` in the `EventQueue`, keyed by the tick it is due and a
// sequence number handed out at scheduling time. `SimState::step()` pops
// due wake-ups in key order and hands them to their owner, which may
// schedule the next one. Ticks with nothing due cost nothing.
//
// Wake-ups are never removed from the queue. Each carries the generation
// its owner had when scheduling; owners cancel by moving to a fresh
// generation, and a wake-up that no longer matches is dropped when popped.
//
// `SimEvent`s go the other way: one-shot notifications for the host (UI,
// audio, logs) collected in the sim's outbox.
//
// See also: `sim.rs` for the tick loop and the outbox, `remodel.rs` for
// drag wake-ups.
//
// Everything here must replay identically: `(tick, sequence)` is unique, so
// the pop order is total.

use crate::types::{CollectionId, PlotId, StructureId, StructureKind};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

// ---------------------------------------------------------------------------
// Wake-ups
// ---------------------------------------------------------------------------

/// A wake-up due at `tick`. Ties on `tick` pop in `sequence` order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub tick: u64,
    pub sequence: u64,
    pub kind: ScheduledEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledEventKind {
    /// Time-gated construction wake: credit elapsed time, maybe advance.
    ConstructionTimer { structure: StructureId, generation: u64 },
    /// Re-evaluate the active drag of a remodel session.
    DragTick { collection: CollectionId, generation: u64 },
}

impl ScheduledEvent {
    fn key(&self) -> (u64, u64) {
        (self.tick, self.sequence)
    }
}

// Identity is the key alone; `kind` never takes part in ordering.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Pending wake-ups, earliest key first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, tick: u64, kind: ScheduledEventKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(ScheduledEvent {
            tick,
            sequence,
            kind,
        }));
    }

    /// Tick of the earliest wake-up, if any.
    pub fn peek_tick(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(e)| e.tick)
    }

    /// The earliest wake-up, if it is due by `tick`.
    pub fn pop_if_ready(&mut self, tick: u64) -> Option<ScheduledEvent> {
        if self.peek_tick()? > tick {
            return None;
        }
        self.heap.pop().map(|Reverse(e)| e)
    }

    /// Includes stale wake-ups that have not been popped yet.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Host-visible notifications (output)
// ---------------------------------------------------------------------------

/// A notification emitted by the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    // -- Boundary --
    BoundaryCreated { plot: PlotId },
    /// Any vertex/loop edit. Carries the recomputed buildability.
    BoundaryVertexChanged { plot: PlotId, buildable: bool },
    BoundaryCompleted { plot: PlotId },
    BoundaryReopened { plot: PlotId },
    PlotDivided { source: PlotId, parts: Vec<PlotId> },

    // -- Structures --
    CollectionAttached { collection: CollectionId, plot: PlotId },
    /// The plot is dropped too when no other collection referenced it.
    CollectionDiscarded { collection: CollectionId, plot_dropped: bool },
    StructureAdded { collection: CollectionId, structure: StructureId, kind: StructureKind },
    StructureRemoved { collection: CollectionId, structure: StructureId },

    // -- Construction --
    /// `amount` moved from pending to collected for the current stage.
    ResourcesAllocated { structure: StructureId, amount: u32 },
    StageAdvanced { structure: StructureId, from: usize, to: usize },
    ConstructionCompleted { structure: StructureId },
    ConstructionReset { structure: StructureId },

    // -- Remodeling --
    SessionStarted { collection: CollectionId },
    /// `None` when the drag ended.
    SelectionChanged { collection: CollectionId, structure: Option<StructureId> },
    PlacementFeedback {
        collection: CollectionId,
        structure: StructureId,
        valid: bool,
        collision_target: Option<StructureId>,
    },
    RuleRejected {
        collection: CollectionId,
        structure: StructureId,
        rule: String,
        reason: String,
        enforced: bool,
    },
    StructureModified { collection: CollectionId, structure: StructureId },
    /// Committed. `reset` lists parts forced back to stage 0.
    SessionCompleted { collection: CollectionId, reset: Vec<StructureId> },
    SessionCancelled { collection: CollectionId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(id: u32) -> ScheduledEventKind {
        ScheduledEventKind::ConstructionTimer {
            structure: StructureId(id),
            generation: 1,
        }
    }

    #[test]
    fn wakes_pop_by_tick_then_schedule_order() {
        let mut queue = EventQueue::new();
        queue.schedule(100, timer(2));
        queue.schedule(50, timer(1));
        queue.schedule(50, timer(2));
        assert_eq!(queue.peek_tick(), Some(50));

        let popped: Vec<(u64, u64, ScheduledEventKind)> =
            std::iter::from_fn(|| queue.pop_if_ready(200))
                .map(|e| (e.tick, e.sequence, e.kind))
                .collect();
        assert_eq!(
            popped,
            vec![(50, 1, timer(1)), (50, 2, timer(2)), (100, 0, timer(2))]
        );
        assert_eq!(queue.peek_tick(), None);
    }

    #[test]
    fn wakes_wait_for_their_tick() {
        let mut queue = EventQueue::new();
        queue.schedule(
            100,
            ScheduledEventKind::DragTick {
                collection: CollectionId(0),
                generation: 3,
            },
        );
        assert!(queue.pop_if_ready(99).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_if_ready(100).is_some());
        assert!(queue.is_empty());
        assert!(queue.pop_if_ready(u64::MAX).is_none());
    }

    #[test]
    fn queue_survives_json_and_keeps_numbering() {
        let mut queue = EventQueue::new();
        queue.schedule(20, timer(0));
        queue.schedule(10, timer(0));

        let json = serde_json::to_string(&queue).unwrap();
        let mut restored: EventQueue = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.pop_if_ready(100).unwrap().tick, 10);

        restored.schedule(5, timer(1));
        let next = restored.pop_if_ready(100).unwrap();
        assert_eq!((next.tick, next.sequence), (5, 2));
    }

    #[test]
    fn notifications_roundtrip() {
        let event = SimEvent {
            tick: 7,
            kind: SimEventKind::SessionCompleted {
                collection: CollectionId(1),
                reset: vec![StructureId(4), StructureId(9)],
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let restored: SimEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }
}
