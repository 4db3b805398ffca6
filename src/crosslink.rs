//! Cycle checks for crosslinks.
//!
//! Tree edges always point from a path to a longer path, so the tree alone cannot loop. A loop
//! needs at least one crosslink, and between two consecutive crosslinks of a loop the walk only
//! descends the tree. A set of crosslinks therefore closes a loop exactly when there is a chain
//! `l1 … lk` in which every `l(i+1).parent` lies at or below `l(i).child`, and `l1.parent` lies
//! at or below `lk.child`. Both tests are path prefix comparisons; no tree walk is needed.
use crate::paths::is_descendant_or_self;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    OnStack,
    Done,
}

/// Stateless cycle detection over `(parent_path, child_path)` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosslinkManager;

impl CrosslinkManager {
    /// A single crosslink loops if its parent is its child or lies below it.
    pub fn check_crosslink<P: AsRef<str>>(link: &(P, P)) -> bool {
        is_descendant_or_self(link.0.as_ref(), link.1.as_ref())
    }

    /// True if any subset of `links` closes a loop.
    pub fn check_circularity<P: AsRef<str>>(links: &[(P, P)]) -> bool {
        Self::find_cycle(links).is_some()
    }

    /// Indices of one looping chain of `links`, in walk order.
    ///
    /// Depth first over the crosslinks, where `b` follows `a` if `b.parent` lies at or below
    /// `a.child`. Successors are found by comparing against every link, so the whole check costs
    /// O(n²) prefix tests.
    pub fn find_cycle<P: AsRef<str>>(links: &[(P, P)]) -> Option<Vec<usize>> {
        let n = links.len();
        let follows = |a: usize, b: usize| {
            is_descendant_or_self(links[b].0.as_ref(), links[a].1.as_ref())
        };

        let mut state = vec![Visit::Unvisited; n];
        for start in 0..n {
            if state[start] != Visit::Unvisited {
                continue;
            }
            state[start] = Visit::OnStack;
            // (link, index of the next candidate successor)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            while let Some(&(link, next)) = stack.last() {
                match (next..n).find(|candidate| follows(link, *candidate)) {
                    Some(successor) => {
                        if let Some(top) = stack.last_mut() {
                            top.1 = successor + 1;
                        }
                        match state[successor] {
                            Visit::OnStack => {
                                let loop_start =
                                    stack.iter().position(|(l, _)| *l == successor)?;
                                return Some(stack[loop_start..].iter().map(|(l, _)| *l).collect());
                            }
                            Visit::Unvisited => {
                                state[successor] = Visit::OnStack;
                                stack.push((successor, 0));
                            }
                            Visit::Done => {}
                        }
                    }
                    None => {
                        state[link] = Visit::Done;
                        stack.pop();
                    }
                }
            }
        }
        None
    }
}
