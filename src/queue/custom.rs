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

//! The externally-ranked queue strategy (`spec.md` §4.4/§4.6) and the two
//! thin strategies built on top of it: breadth-first and depth-first, which
//! only differ in how they derive a priority from `tree_depth` before
//! delegating to [`CustomPriorityQueue`].
//!
//! Besides the primary max-heap, this queue keeps a secondary structure
//! ordered by bound so that [`PriorityQueue::bound`] doesn't have to scan the
//! whole heap — the same job `sortedcontainers.SortedList` does for
//! `examples/original_source/src/pybnb/priority_queue.py`'s
//! `WorstBoundFirstPriorityQueue`, here built from a `BTreeSet` since this
//! crate has no sorted-list dependency of its own.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use ordered_float::OrderedFloat;

use crate::node::{Node, Sense};

use super::{Converger, PriorityQueue};

struct Entry {
    priority: f64,
    seq: u64,
    node: Node,
}

struct EntryOrder;

impl Compare<Entry> for EntryOrder {
    fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        a.priority
            .partial_cmp(&b.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.seq.cmp(&a.seq))
    }
}

/// Signs a bound so that, regardless of [`Sense`], the *smallest* signed
/// value in the secondary index is always the weakest bound.
fn signed_bound(sense: Sense, bound: f64) -> OrderedFloat<f64> {
    OrderedFloat(match sense {
        Sense::Minimize => bound,
        Sense::Maximize => -bound,
    })
}

/// A priority queue ordered by whatever priority the caller already stamped
/// on [`Node::queue_priority`] (falling back to `0.0` if absent).
pub struct CustomPriorityQueue<C> {
    converger: C,
    heap: BinaryHeap<Entry, EntryOrder>,
    by_bound: BTreeSet<(OrderedFloat<f64>, u64)>,
    next_seq: u64,
}

impl<C: Converger> CustomPriorityQueue<C> {
    pub fn new(converger: C) -> Self {
        CustomPriorityQueue {
            converger,
            heap: BinaryHeap::from_vec_cmp(Vec::new(), EntryOrder),
            by_bound: BTreeSet::new(),
            next_seq: 0,
        }
    }

    fn sense(&self) -> Sense {
        self.converger.sense()
    }
}

impl<C: Converger> PriorityQueue for CustomPriorityQueue<C> {
    fn sense(&self) -> Sense {
        self.converger.sense()
    }

    fn size(&self) -> usize {
        self.heap.len()
    }

    fn put(&mut self, node: Node) -> bool {
        if !self
            .converger
            .objective_can_improve(node.best_objective, node.bound)
        {
            return false;
        }
        let priority = node.queue_priority.unwrap_or(0.0);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_bound.insert((signed_bound(self.sense(), node.bound), seq));
        self.heap.push(Entry { priority, seq, node });
        true
    }

    fn get(&mut self) -> Option<Node> {
        let entry = self.heap.pop()?;
        self.by_bound
            .remove(&(signed_bound(self.sense(), entry.node.bound), entry.seq));
        Some(entry.node)
    }

    fn bound(&self) -> Option<f64> {
        self.by_bound.iter().next().map(|(b, _)| match self.sense() {
            Sense::Minimize => b.into_inner(),
            Sense::Maximize => -b.into_inner(),
        })
    }

    fn update_for_best_objective(&mut self, new_best_objective: f64) -> Vec<Node> {
        let entries: Vec<Entry> = self.heap.drain().collect();
        self.by_bound.clear();
        let mut removed = Vec::new();
        for mut entry in entries {
            entry.node.best_objective = new_best_objective;
            if self
                .converger
                .objective_can_improve(new_best_objective, entry.node.bound)
            {
                self.by_bound
                    .insert((signed_bound(self.sense(), entry.node.bound), entry.seq));
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

/// Explores the frontier level by level: priority is the negated tree depth,
/// so shallower nodes come out first.
pub struct BreadthFirstPriorityQueue<C> {
    inner: CustomPriorityQueue<C>,
}

impl<C: Converger> BreadthFirstPriorityQueue<C> {
    pub fn new(converger: C) -> Self {
        BreadthFirstPriorityQueue {
            inner: CustomPriorityQueue::new(converger),
        }
    }
}

impl<C: Converger> PriorityQueue for BreadthFirstPriorityQueue<C> {
    fn sense(&self) -> Sense {
        self.inner.sense()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn put(&mut self, mut node: Node) -> bool {
        node.queue_priority = Some(-(node.tree_depth as f64));
        self.inner.put(node)
    }

    fn get(&mut self) -> Option<Node> {
        self.inner.get()
    }

    fn bound(&self) -> Option<f64> {
        self.inner.bound()
    }

    fn update_for_best_objective(&mut self, new_best_objective: f64) -> Vec<Node> {
        self.inner.update_for_best_objective(new_best_objective)
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Node> + '_> {
        self.inner.items()
    }
}

/// Explores the frontier depth first: priority is the tree depth itself, so
/// deeper nodes come out first.
pub struct DepthFirstPriorityQueue<C> {
    inner: CustomPriorityQueue<C>,
}

impl<C: Converger> DepthFirstPriorityQueue<C> {
    pub fn new(converger: C) -> Self {
        DepthFirstPriorityQueue {
            inner: CustomPriorityQueue::new(converger),
        }
    }
}

impl<C: Converger> PriorityQueue for DepthFirstPriorityQueue<C> {
    fn sense(&self) -> Sense {
        self.inner.sense()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn put(&mut self, mut node: Node) -> bool {
        node.queue_priority = Some(node.tree_depth as f64);
        self.inner.put(node)
    }

    fn get(&mut self) -> Option<Node> {
        self.inner.get()
    }

    fn bound(&self) -> Option<f64> {
        self.inner.bound()
    }

    fn update_for_best_objective(&mut self, new_best_objective: f64) -> Vec<Node> {
        self.inner.update_for_best_objective(new_best_objective)
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Node> + '_> {
        self.inner.items()
    }
}
