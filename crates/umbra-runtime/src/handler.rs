use umbra_geom::Vec3;

/// Index of a handler slot in a [`HandlerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u32);

impl HandlerId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Texel,
    Probe,
}

impl HandlerKind {
    const COUNT: usize = 2;

    #[inline]
    fn slot(self) -> usize {
        match self {
            HandlerKind::Texel => 0,
            HandlerKind::Probe => 1,
        }
    }
}

/// What a handler resolves once all of its queries are back.
///
/// Both kinds accumulate a channel mask: a query whose ray reaches the sample
/// (no hit at all, or a hit within `tolerance` of the sample) sets the bit named
/// by the query's tag. Any other hit leaves the mask untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    /// Mask for lightmap texel `(x, y)`.
    Texel {
        x: u32,
        y: u32,
        sample: Vec3,
        tolerance: f32,
    },
    /// Mask for an arbitrary point, reported back under `slot`.
    Probe {
        slot: u32,
        sample: Vec3,
        tolerance: f32,
    },
}

impl Operation {
    #[inline]
    pub fn kind(&self) -> HandlerKind {
        match self {
            Operation::Texel { .. } => HandlerKind::Texel,
            Operation::Probe { .. } => HandlerKind::Probe,
        }
    }

    #[inline]
    fn target(&self) -> (Vec3, f32) {
        match *self {
            Operation::Texel {
                sample, tolerance, ..
            }
            | Operation::Probe {
                sample, tolerance, ..
            } => (sample, tolerance),
        }
    }
}

/// Terminal result of a handler, emitted exactly once per acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Texel { x: u32, y: u32, mask: u32 },
    Probe { slot: u32, mask: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    /// In the idle pool.
    Idle,
    /// Accepting queries; expected count still growing.
    Setup,
    /// Expected count final; waiting for the remaining results.
    Armed,
}

#[derive(Clone, Debug)]
struct Handler {
    op: Operation,
    state: HandlerState,
    expected: u32,
    processed: u32,
    mask: u32,
}

impl Handler {
    fn reset(&mut self, op: Operation) {
        self.op = op;
        self.state = HandlerState::Setup;
        self.expected = 0;
        self.processed = 0;
        self.mask = 0;
    }

    #[inline]
    fn is_done(&self) -> bool {
        self.state == HandlerState::Armed && self.processed == self.expected
    }

    fn completion(&self) -> Completion {
        match self.op {
            Operation::Texel { x, y, .. } => Completion::Texel {
                x,
                y,
                mask: self.mask,
            },
            Operation::Probe { slot, .. } => Completion::Probe {
                slot,
                mask: self.mask,
            },
        }
    }
}

/// Handler slots plus one idle list per kind.
///
/// A handler moves `Setup -> Armed -> (finished) -> Idle`. The finish step hands
/// out its [`Completion`] and recycles the slot; it happens exactly once, after
/// the handler is armed and every expected query has been processed.
#[derive(Default)]
pub struct HandlerPool {
    slots: Vec<Handler>,
    idle: [Vec<HandlerId>; HandlerKind::COUNT],
}

impl HandlerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, op: Operation) -> HandlerId {
        if let Some(id) = self.idle[op.kind().slot()].pop() {
            self.slots[id.index()].reset(op);
            return id;
        }
        let id = HandlerId(self.slots.len() as u32);
        self.slots.push(Handler {
            op,
            state: HandlerState::Setup,
            expected: 0,
            processed: 0,
            mask: 0,
        });
        id
    }

    #[inline]
    pub fn state(&self, id: HandlerId) -> HandlerState {
        self.slots[id.index()].state
    }

    /// Count one more query against a handler in setup.
    pub fn expect_query(&mut self, id: HandlerId) {
        let h = &mut self.slots[id.index()];
        assert_eq!(
            h.state,
            HandlerState::Setup,
            "query submitted to handler {id:?} outside setup"
        );
        h.expected += 1;
    }

    /// Freeze the expected count. Finishes immediately if everything (possibly
    /// nothing) has already been processed.
    pub fn arm(&mut self, id: HandlerId) -> Option<Completion> {
        let h = &mut self.slots[id.index()];
        assert_eq!(
            h.state,
            HandlerState::Setup,
            "handler {id:?} armed twice or after release"
        );
        h.state = HandlerState::Armed;
        if h.is_done() { Some(self.finish(id)) } else { None }
    }

    /// Feed one query result. `hit` is the first hit point, `None` for a clear ray.
    pub fn record(&mut self, id: HandlerId, tag: u8, hit: Option<Vec3>) -> Option<Completion> {
        let h = &mut self.slots[id.index()];
        debug_assert_ne!(h.state, HandlerState::Idle);
        match hit {
            Some(point) => {
                let (sample, tolerance) = h.op.target();
                if point.distance(sample) <= tolerance {
                    h.mask |= 1u32 << tag;
                }
            }
            None => h.mask |= 1u32 << tag,
        }
        h.processed += 1;
        debug_assert!(h.processed <= h.expected);
        if h.is_done() { Some(self.finish(id)) } else { None }
    }

    fn finish(&mut self, id: HandlerId) -> Completion {
        let h = &mut self.slots[id.index()];
        let done = h.completion();
        h.state = HandlerState::Idle;
        self.idle[h.op.kind().slot()].push(id);
        done
    }

    /// Handlers currently in setup or armed.
    pub fn live(&self) -> usize {
        self.slots.len() - self.idle.iter().map(Vec::len).sum::<usize>()
    }

    /// Total slots ever allocated.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(x: u32) -> Operation {
        Operation::Texel {
            x,
            y: 0,
            sample: Vec3::new(0.0, -2.0, 0.0),
            tolerance: 0.01,
        }
    }

    #[test]
    fn finish_waits_for_arm() {
        let mut pool = HandlerPool::new();
        let id = pool.acquire(texel(3));
        pool.expect_query(id);
        // Result arrives before the producer is done adding queries
        assert_eq!(pool.record(id, 0, None), None);
        assert_eq!(pool.state(id), HandlerState::Setup);
        assert_eq!(
            pool.arm(id),
            Some(Completion::Texel {
                x: 3,
                y: 0,
                mask: 1
            })
        );
        assert_eq!(pool.state(id), HandlerState::Idle);
    }

    #[test]
    fn zero_queries_finish_on_arm() {
        let mut pool = HandlerPool::new();
        let id = pool.acquire(texel(0));
        assert_eq!(
            pool.arm(id),
            Some(Completion::Texel {
                x: 0,
                y: 0,
                mask: 0
            })
        );
    }

    #[test]
    fn hits_away_from_sample_leave_bit_clear() {
        let mut pool = HandlerPool::new();
        let id = pool.acquire(texel(0));
        for _ in 0..3 {
            pool.expect_query(id);
        }
        assert_eq!(pool.arm(id), None);
        assert_eq!(pool.record(id, 0, Some(Vec3::new(0.0, -1.0, 0.0))), None);
        assert_eq!(pool.record(id, 4, Some(Vec3::new(0.0, -2.005, 0.0))), None);
        let done = pool.record(id, 7, None);
        assert_eq!(
            done,
            Some(Completion::Texel {
                x: 0,
                y: 0,
                mask: (1 << 4) | (1 << 7)
            })
        );
    }

    #[test]
    fn slots_recycle_per_kind() {
        let mut pool = HandlerPool::new();
        let a = pool.acquire(texel(0));
        pool.arm(a);
        let probe = pool.acquire(Operation::Probe {
            slot: 9,
            sample: Vec3::ZERO,
            tolerance: 0.01,
        });
        // The idle texel slot is not handed out for a probe
        assert_ne!(probe, a);
        let b = pool.acquire(texel(1));
        assert_eq!(b, a);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.live(), 2);
    }

    #[test]
    #[should_panic(expected = "outside setup")]
    fn submitting_to_armed_handler_panics() {
        let mut pool = HandlerPool::new();
        let id = pool.acquire(texel(0));
        pool.expect_query(id);
        pool.arm(id);
        pool.expect_query(id);
    }
}
