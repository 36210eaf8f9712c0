use std::time::Duration;

use proptest::prelude::*;

use forgeloop::reactor::{Disposition, EventLoop, SourceId};

#[derive(Debug, Clone)]
enum Op {
    AddIdle,
    AddTimeout(u64),
    /// Remove the nth live source (modulo the live count).
    RemoveNth(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::AddIdle),
        (1u64..500).prop_map(Op::AddTimeout),
        any::<usize>().prop_map(Op::RemoveNth),
    ]
}

proptest! {
    /// Source ids are unique and strictly increasing for the lifetime of
    /// the reactor, across source kinds and any interleaving of removals;
    /// a removed id is never handed out again.
    #[test]
    fn source_ids_are_unique_and_monotone(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let event_loop = EventLoop::new();
        let mut live: Vec<SourceId> = Vec::new();
        let mut all_ids: Vec<SourceId> = Vec::new();

        for op in ops {
            match op {
                Op::AddIdle => {
                    let id = event_loop.add_idle(|| Disposition::Retain);
                    live.push(id);
                    all_ids.push(id);
                }
                Op::AddTimeout(ms) => {
                    let id = event_loop
                        .add_timeout(Duration::from_millis(ms), || Disposition::Retain);
                    live.push(id);
                    all_ids.push(id);
                }
                Op::RemoveNth(n) => {
                    if !live.is_empty() {
                        let id = live.remove(n % live.len());
                        prop_assert!(event_loop.source_remove(id));
                        // Gone means gone.
                        prop_assert!(!event_loop.source_remove(id));
                        prop_assert!(!event_loop.is_registered(id));
                    }
                }
            }
        }

        // Strictly increasing implies unique and never reused.
        for pair in all_ids.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        for id in &live {
            prop_assert!(event_loop.is_registered(*id));
        }
    }
}
