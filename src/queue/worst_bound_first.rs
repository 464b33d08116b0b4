// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The default queue strategy (`spec.md` §4.5): always expand the node with
//! the weakest bound, which tightens the global bound as quickly as possible.
//! Priority is derived from the bound alone, so there is nothing for a caller
//! to supply — this is the queue `spec.md` §4.4 calls "no external priority
//! function required".

use std::cmp::Ordering;

use binary_heap_plus::BinaryHeap;
use compare::Compare;

use crate::node::Node;

use super::{Converger, PriorityQueue};

struct Entry {
    priority: f64,
    seq: u64,
    node: Node,
}

/// Orders entries by priority, breaking ties in favor of the earliest
/// inserted (FIFO among equal bounds), mirroring the counter tie-break of
/// `examples/original_source/src/pybnb/priority_queue.py`'s
/// `_NoThreadingMaxPriorityFirstQueue`.
struct EntryOrder;

impl Compare<Entry> for EntryOrder {
    fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        a.priority
            .partial_cmp(&b.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.seq.cmp(&a.seq))
    }
}

/// A priority queue that always hands out the node with the worst (most
/// optimistic) bound first.
pub struct WorstBoundFirstPriorityQueue<C> {
    converger: C,
    heap: BinaryHeap<Entry, EntryOrder>,
    next_seq: u64,
}

impl<C: Converger> WorstBoundFirstPriorityQueue<C> {
    pub fn new(converger: C) -> Self {
        WorstBoundFirstPriorityQueue {
            converger,
            heap: BinaryHeap::from_vec_cmp(Vec::new(), EntryOrder),
            next_seq: 0,
        }
    }

    fn priority_of(&self, bound: f64) -> f64 {
        match self.converger.sense() {
            crate::node::Sense::Minimize => -bound,
            crate::node::Sense::Maximize => bound,
        }
    }
}

impl<C: Converger> PriorityQueue for WorstBoundFirstPriorityQueue<C> {
    fn sense(&self) -> crate::node::Sense {
        self.converger.sense()
    }

    fn size(&self) -> usize {
        self.heap.len()
    }

    fn put(&mut self, mut node: Node) -> bool {
        if !self
            .converger
            .objective_can_improve(node.best_objective, node.bound)
        {
            return false;
        }
        let priority = self.priority_of(node.bound);
        node.queue_priority = Some(priority);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { priority, seq, node });
        true
    }

    fn get(&mut self) -> Option<Node> {
        self.heap.pop().map(|entry| entry.node)
    }

    fn bound(&self) -> Option<f64> {
        self.heap.peek().map(|entry| {
            let expected = match self.converger.sense() {
                crate::node::Sense::Minimize => -entry.priority,
                crate::node::Sense::Maximize => entry.priority,
            };
            assert_eq!(
                entry.node.bound, expected,
                "queued priority is inconsistent with the node's own bound"
            );
            entry.node.bound
        })
    }

    fn update_for_best_objective(&mut self, new_best_objective: f64) -> Vec<Node> {
        let entries: Vec<Entry> = self.heap.drain().collect();
        let mut removed = Vec::new();
        for mut entry in entries {
            entry.node.best_objective = new_best_objective;
            if self
                .converger
                .objective_can_improve(new_best_objective, entry.node.bound)
            {
                self.heap.push(entry);
            } else {
                removed.push(entry.node);
            }
        }
        removed
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Node> + '_> {
        Box::new(self.heap.iter().map(|entry| &entry.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Sense;
    use crate::queue::RelativeGapConverger;

    fn queue(sense: Sense) -> WorstBoundFirstPriorityQueue<RelativeGapConverger> {
        WorstBoundFirstPriorityQueue::new(RelativeGapConverger::new(sense))
    }

    #[test]
    fn minimize_pops_the_smallest_bound_first() {
        let mut q = queue(Sense::Minimize);
        q.put(Node::new(f64::INFINITY, 5.0, 0, vec![]));
        q.put(Node::new(f64::INFINITY, 1.0, 0, vec![]));
        q.put(Node::new(f64::INFINITY, 3.0, 0, vec![]));
        assert_eq!(1.0, q.get().unwrap().bound);
        assert_eq!(3.0, q.get().unwrap().bound);
        assert_eq!(5.0, q.get().unwrap().bound);
    }

    #[test]
    fn maximize_pops_the_largest_bound_first() {
        let mut q = queue(Sense::Maximize);
        q.put(Node::new(f64::NEG_INFINITY, 5.0, 0, vec![]));
        q.put(Node::new(f64::NEG_INFINITY, 1.0, 0, vec![]));
        q.put(Node::new(f64::NEG_INFINITY, 3.0, 0, vec![]));
        assert_eq!(5.0, q.get().unwrap().bound);
        assert_eq!(3.0, q.get().unwrap().bound);
        assert_eq!(1.0, q.get().unwrap().bound);
    }

    #[test]
    fn ties_are_broken_first_in_first_out() {
        let mut q = queue(Sense::Minimize);
        q.put(Node::new(f64::INFINITY, 1.0, 0, vec![1.0]));
        q.put(Node::new(f64::INFINITY, 1.0, 0, vec![2.0]));
        assert_eq!(vec![1.0], q.get().unwrap().user_state);
        assert_eq!(vec![2.0], q.get().unwrap().user_state);
    }

    #[test]
    fn bound_returns_none_when_empty() {
        let q = queue(Sense::Minimize);
        assert_eq!(None, q.bound());
    }

    #[test]
    fn update_for_best_objective_purges_converged_nodes() {
        let mut q = queue(Sense::Minimize);
        q.put(Node::new(f64::INFINITY, 10.0, 0, vec![]));
        q.put(Node::new(f64::INFINITY, 1.0, 0, vec![]));
        let removed = q.update_for_best_objective(2.0);
        assert_eq!(1, removed.len());
        assert_eq!(10.0, removed[0].bound);
        assert_eq!(1, q.size());
        assert_eq!(1.0, q.bound().unwrap());
    }

    proptest::proptest! {
        /// P1: size() always equals successful puts minus gets and purges.
        #[test]
        fn size_tracks_successful_puts_minus_gets(bounds in proptest::collection::vec(-1e6f64..1e6, 0..30)) {
            let mut q = queue(Sense::Minimize);
            let mut inserted = 0usize;
            for b in &bounds {
                if q.put(Node::new(f64::INFINITY, *b, 0, vec![])) {
                    inserted += 1;
                }
            }
            let mut removed = 0usize;
            while q.get().is_some() {
                removed += 1;
            }
            proptest::prop_assert_eq!(inserted, removed);
            proptest::prop_assert_eq!(0, q.size());
        }

        /// P2: draining a minimize WorstBoundFirst queue always yields
        /// non-decreasing bounds, with ties broken in insertion order.
        #[test]
        fn drains_in_non_decreasing_bound_order(bounds in proptest::collection::vec(-1e6f64..1e6, 0..30)) {
            let mut q = queue(Sense::Minimize);
            for b in &bounds {
                q.put(Node::new(f64::INFINITY, *b, 0, vec![]));
            }
            let mut drained = Vec::new();
            while let Some(node) = q.get() {
                drained.push(node.bound);
            }
            let mut sorted = drained.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            proptest::prop_assert_eq!(drained, sorted);
        }
    }
}
