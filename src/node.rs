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

//! This module defines the most basic data types shared by every layer of the
//! dispatcher/worker core: the frontier item (`Node`), the sense of
//! optimization, and the two-valued process role tag used by the handshake.

/// The direction in which the objective is being optimized. Mirrors the
/// `minimize`/`maximize` namespace of the external convergence policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sense {
    Minimize,
    Maximize,
}

/// The two-valued role a process can take in the handshake. The numeric
/// values matter: the handshake sums and argmaxes them (`spec.md` §3, §6).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(usize)]
pub enum ProcessType {
    Worker = 0,
    Dispatcher = 1,
}

impl ProcessType {
    pub fn as_usize(self) -> usize {
        self as usize
    }
}

/// A subproblem descriptor: the unit of work exchanged between a worker and
/// the dispatcher. Replaces the dynamically-typed numeric buffer used by the
/// source implementation with a typed header plus an opaque payload, per the
/// Design Note in `spec.md` §9.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The incumbent objective known at the time this node was enqueued.
    /// Mutable: the dispatcher refreshes it on every node still present in
    /// the queue whenever the global incumbent improves.
    pub best_objective: f64,
    /// The dual/lower (minimize) or upper (maximize) bound for this subtree.
    pub bound: f64,
    /// Depth of this subproblem in the overall search tree.
    pub tree_depth: u64,
    /// The ordering key used by whichever `PriorityQueue` currently holds
    /// this node. `None` until a queue strategy has stamped one on.
    pub queue_priority: Option<f64>,
    /// The problem-specific payload, carried verbatim through the dispatcher.
    pub user_state: Vec<f64>,
}

impl Node {
    pub fn new(best_objective: f64, bound: f64, tree_depth: u64, user_state: Vec<f64>) -> Self {
        Node {
            best_objective,
            bound,
            tree_depth,
            queue_priority: None,
            user_state,
        }
    }
}
