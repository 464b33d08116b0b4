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

//! The priority-queue family that orders the dispatcher's frontier
//! (`spec.md` §4.4-4.6). None of these types are thread-safe by design: the
//! queue is owned by the dispatcher process alone (`spec.md` §5).

pub mod custom;
pub mod worst_bound_first;

use crate::node::{Node, Sense};

/// The external convergence policy (`spec.md` §4.6/Glossary). A queue
/// consults it on every `put` to decide whether a bound can still improve
/// the incumbent, and on `update_for_best_objective` to decide what survives
/// a new incumbent.
///
/// This crate treats the convergence policy as an external collaborator
/// (`spec.md` §1 "Explicitly out of scope"); [`RelativeGapConverger`] is
/// provided only so this crate's own tests and doctests don't need to depend
/// on one supplied by an embedding solver.
pub trait Converger {
    /// The direction the objective is being optimized in.
    fn sense(&self) -> Sense;
    /// Whether a subtree with the given `bound` could still improve on
    /// `incumbent`.
    fn objective_can_improve(&self, incumbent: f64, bound: f64) -> bool;
}

/// A converger that prunes once a bound no longer exceeds the incumbent by
/// more than a relative gap, with ties broken in favor of exploring further.
#[derive(Debug, Clone, Copy)]
pub struct RelativeGapConverger {
    pub sense: Sense,
    pub relative_gap: f64,
}

impl RelativeGapConverger {
    pub fn new(sense: Sense) -> Self {
        RelativeGapConverger {
            sense,
            relative_gap: 0.0,
        }
    }

    pub fn with_relative_gap(mut self, relative_gap: f64) -> Self {
        self.relative_gap = relative_gap;
        self
    }
}

impl Converger for RelativeGapConverger {
    fn sense(&self) -> Sense {
        self.sense
    }

    fn objective_can_improve(&self, incumbent: f64, bound: f64) -> bool {
        if !incumbent.is_finite() {
            return true;
        }
        let tolerance = self.relative_gap * incumbent.abs();
        match self.sense {
            Sense::Minimize => bound < incumbent - tolerance,
            Sense::Maximize => bound > incumbent + tolerance,
        }
    }
}

/// The common contract implemented by every queue strategy (`spec.md` §4.4).
pub trait PriorityQueue {
    /// The direction of optimization this queue's converger was built for.
    fn sense(&self) -> Sense;
    /// Number of nodes currently queued.
    fn size(&self) -> usize;
    /// Inserts `node` if the converger judges its bound can still improve
    /// `best_objective`; returns whether it was inserted.
    fn put(&mut self, node: Node) -> bool;
    /// Removes and returns the highest-priority node, or `None` if empty.
    fn get(&mut self) -> Option<Node>;
    /// The weakest (most optimistic) bound of any queued node, or `None` if
    /// empty.
    fn bound(&self) -> Option<f64>;
    /// Refreshes the incumbent, purging every node whose bound can no longer
    /// improve it, and returns the purged nodes (in arbitrary order).
    fn update_for_best_objective(&mut self, new_best_objective: f64) -> Vec<Node>;
    /// Non-mutating traversal of every queued node, in arbitrary order.
    fn items(&self) -> Box<dyn Iterator<Item = &Node> + '_>;
}
