//! Property tests for stack discipline and handle disjointness

use std::sync::Arc;

use proptest::prelude::*;
use strata_memory::{AllocationHandle, ArenaPool, RegionConfig, RegionStack};

/// Operations a front-end could lower scoping constructs into
#[derive(Debug, Clone, Copy)]
enum Op {
    Enter,
    Exit,
    AllocSmall,
    AllocLarge,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Enter),
        3 => Just(Op::Exit),
        5 => Just(Op::AllocSmall),
        1 => Just(Op::AllocLarge),
    ]
}

fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

proptest! {
    /// Properly nested enter/exit sequences restore the depth they started
    /// from, and the stack's depth tracks the model at every step.
    #[test]
    fn balanced_sequences_restore_depth(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let mut stack = RegionStack::new(Arc::new(ArenaPool::with_default())).unwrap();
        let mut model_depth = 0usize;

        for op in ops {
            match op {
                Op::Enter => {
                    stack.enter().unwrap();
                    model_depth += 1;
                }
                Op::Exit => {
                    // Keep the sequence properly nested: never pop the root.
                    if model_depth > 0 {
                        stack.exit().unwrap();
                        model_depth -= 1;
                    }
                }
                Op::AllocSmall => {
                    stack.allocate_in_current(64, 8).unwrap();
                }
                Op::AllocLarge => {
                    stack.allocate_in_current(96 * 1024, 16).unwrap();
                }
            }
            prop_assert_eq!(stack.depth(), model_depth);
        }

        while model_depth > 0 {
            stack.exit().unwrap();
            model_depth -= 1;
        }
        prop_assert_eq!(stack.depth(), 0);
    }

    /// No two handles live at the same time ever alias, across regions and
    /// growth segments alike.
    #[test]
    fn live_handles_never_alias(ops in proptest::collection::vec(op_strategy(), 0..48)) {
        let pool = Arc::new(ArenaPool::with_default());
        let config = RegionConfig::new().with_default_capacity(64 * 1024);
        let mut stack = RegionStack::with_config(pool, config).unwrap();

        // Live handles grouped per depth so exits retire the right ones.
        let mut live: Vec<Vec<AllocationHandle>> = vec![Vec::new()];

        for op in ops {
            match op {
                Op::Enter => {
                    stack.enter().unwrap();
                    live.push(Vec::new());
                }
                Op::Exit => {
                    if live.len() > 1 {
                        stack.exit().unwrap();
                        live.pop();
                    }
                }
                Op::AllocSmall | Op::AllocLarge => {
                    let size = match op {
                        Op::AllocSmall => 256,
                        _ => 96 * 1024,
                    };
                    let handle = stack.allocate_in_current(size, 8).unwrap();
                    let ptr = stack.resolve(handle).unwrap().as_ptr() as usize;
                    let range = (ptr, ptr + handle.size());

                    for frame in &live {
                        for other in frame {
                            let optr = stack.resolve(*other).unwrap().as_ptr() as usize;
                            prop_assert!(!overlaps(range, (optr, optr + other.size())));
                        }
                    }
                    live.last_mut().unwrap().push(handle);
                }
            }
        }
    }
}
