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

//! The dispatcher process loop (`SPEC_FULL.md` §2 item 8). The distilled
//! protocol only specifies the worker-side [`crate::proxy::DispatcherProxy`];
//! this module supplies the other end it talks to, without which the
//! protocol has nothing to drive it. The source pack has no standalone
//! dispatcher-side file to mirror (only `dispatcher_proxy.py` is kept), so
//! this loop is reconstructed from what that file implies about the other
//! end of each call — each `_update`/`_barrier`/`_finalize` method there
//! fixes exactly what the dispatcher must receive and send back — adapted
//! from a thread-pool driver (as in `examples/xgillard-ddo/ddo`'s
//! `ParallelSolver`) to a single message at a time, per `spec.md` §5's
//! single-owner model.
//!
//! Wire layout for the payloads this module reads and writes, beyond the
//! `UpdateFrame` in [`crate::codec`]:
//!
//! ```text
//! pushed node (inside UpdateFrame::node_states): [bound, tree_depth, ...user_state]
//! Work response:                                 [best_objective, bound, ...user_state]
//! NoWork response:                               [best_objective]
//! Finalize response:                             [best_objective]
//! ```

use crate::codec::UpdateFrame;
use crate::error::{BnbError, Result};
use crate::handshake::handshake;
use crate::node::{Node, ProcessType, Sense};
use crate::queue::PriorityQueue;
use crate::transport::{Payload, Tag, Transport};

fn decode_pushed_node(best_objective: f64, raw: &[f64]) -> Result<Node> {
    if raw.len() < 2 {
        return Err(BnbError::Protocol(
            "pushed node state is too short to contain a bound and a tree depth".into(),
        ));
    }
    let bound = raw[0];
    let tree_depth = raw[1] as u64;
    if tree_depth as f64 != raw[1] {
        return Err(BnbError::Protocol(
            "pushed node's tree depth did not round-trip through f64".into(),
        ));
    }
    Ok(Node::new(best_objective, bound, tree_depth, raw[2..].to_vec()))
}

fn encode_work_node(node: &Node, best_objective: f64) -> Vec<f64> {
    let mut payload = Vec::with_capacity(2 + node.user_state.len());
    payload.push(best_objective);
    payload.push(node.bound);
    payload.extend_from_slice(&node.user_state);
    payload
}

fn improves(sense: Sense, candidate: f64, incumbent: f64) -> bool {
    match sense {
        Sense::Minimize => candidate < incumbent,
        Sense::Maximize => candidate > incumbent,
    }
}

/// Drives the dispatcher side of the protocol: owns the frontier and answers
/// every worker's `update`/`barrier`/`solve_finished`/`finalize`/`log_*`
/// call in turn.
pub struct Dispatcher<'a, Q> {
    comm: &'a dyn Transport,
    queue: Q,
    best_objective: f64,
    explored_nodes_count: u64,
    finished: bool,
}

impl<'a, Q: PriorityQueue> Dispatcher<'a, Q> {
    /// Runs the role handshake and returns a dispatcher owning `queue`.
    pub fn new(comm: &'a dyn Transport, queue: Q) -> Result<Self> {
        handshake(comm, ProcessType::Dispatcher)?;
        let best_objective = match queue.sense() {
            Sense::Minimize => f64::INFINITY,
            Sense::Maximize => f64::NEG_INFINITY,
        };
        Ok(Dispatcher {
            comm,
            queue,
            best_objective,
            explored_nodes_count: 0,
            finished: false,
        })
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub fn best_objective(&self) -> f64 {
        self.best_objective
    }

    pub fn explored_nodes_count(&self) -> u64 {
        self.explored_nodes_count
    }

    /// Whether a worker has reported the search finished (`spec.md` §4.3
    /// `solve_finished`).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn absorb_update(&mut self, frame: UpdateFrame) -> Result<()> {
        if improves(self.queue.sense(), frame.best_objective, self.best_objective) {
            self.best_objective = frame.best_objective;
            self.queue.update_for_best_objective(self.best_objective);
        }
        self.explored_nodes_count += frame.explored_nodes_count;
        for raw in &frame.node_states {
            let node = decode_pushed_node(self.best_objective, raw)?;
            self.queue.put(node);
        }
        Ok(())
    }

    /// Serves exactly one incoming message, blocking until one arrives.
    /// This is the single place every branch of the wire protocol is
    /// dispatched from (`spec.md` §6's tag table).
    pub fn serve_one(&mut self) -> Result<()> {
        let (source, tag) = self.comm.probe()?;
        match tag {
            Tag::Update => {
                let payload = self.comm.recv(source, Tag::Update)?.into_f64()?;
                let frame = UpdateFrame::unpack(&payload)?;
                self.absorb_update(frame)?;
                match self.queue.get() {
                    Some(node) => {
                        let response = encode_work_node(&node, self.best_objective);
                        self.comm.send(source, Tag::Work, Payload::F64(response))?;
                    }
                    None => {
                        self.comm.send(
                            source,
                            Tag::NoWork,
                            Payload::F64(vec![self.best_objective]),
                        )?;
                    }
                }
            }
            Tag::Barrier => {
                self.comm.recv(source, Tag::Barrier)?;
                self.comm.barrier()?;
            }
            Tag::SolveFinished => {
                self.comm.recv(source, Tag::SolveFinished)?;
                self.finished = true;
            }
            Tag::Finalize => {
                self.comm.recv(source, Tag::Finalize)?;
                let rank = self.comm.rank();
                self.comm
                    .broadcast(rank, Some(Payload::F64(vec![self.best_objective])))?;
            }
            Tag::LogInfo | Tag::LogWarning | Tag::LogDebug | Tag::LogError => {
                let bytes = self.comm.recv(source, tag)?.into_bytes()?;
                let message = String::from_utf8_lossy(&bytes);
                match tag {
                    Tag::LogInfo => log::info!("[worker {source}] {message}"),
                    Tag::LogWarning => log::warn!("[worker {source}] {message}"),
                    Tag::LogDebug => log::debug!("[worker {source}] {message}"),
                    Tag::LogError => log::error!("[worker {source}] {message}"),
                    _ => unreachable!("matched above"),
                }
            }
            other => {
                return Err(BnbError::Protocol(format!(
                    "dispatcher received a message it never expects to receive: {other:?}"
                )))
            }
        }
        Ok(())
    }

    /// Serves messages until every worker has reported `solve_finished`.
    /// Convenience wrapper around repeated [`Dispatcher::serve_one`] calls
    /// for an embedding application that doesn't need finer control over
    /// the loop.
    pub fn serve_until_finished(&mut self) -> Result<()> {
        while !self.finished {
            self.serve_one()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Sense;
    use crate::queue::worst_bound_first::WorstBoundFirstPriorityQueue;
    use crate::queue::RelativeGapConverger;
    use crate::transport::channel::ChannelTransport;
    use std::thread;

    fn queue() -> WorstBoundFirstPriorityQueue<RelativeGapConverger> {
        WorstBoundFirstPriorityQueue::new(RelativeGapConverger::new(Sense::Minimize))
    }

    #[test]
    fn update_with_no_queued_work_replies_no_work() {
        let handles = ChannelTransport::new_group(2);
        let mut iter = handles.into_iter();
        let dispatcher_comm = iter.next().unwrap();
        let worker_comm = iter.next().unwrap();

        let dispatcher_thread = thread::spawn(move || {
            let mut dispatcher = Dispatcher::new(&dispatcher_comm, queue()).unwrap();
            dispatcher.serve_one().unwrap();
            assert_eq!(0, dispatcher.queue_mut().size());
        });

        let worker_thread = thread::spawn(move || {
            handshake(&worker_comm, ProcessType::Worker).unwrap();
            worker_comm
                .send(
                    0,
                    Tag::Update,
                    Payload::F64(
                        UpdateFrame {
                            best_objective: f64::INFINITY,
                            previous_bound: f64::NEG_INFINITY,
                            explored_nodes_count: 0,
                            node_states: vec![],
                        }
                        .pack()
                        .unwrap(),
                    ),
                )
                .unwrap();
            let (_, tag) = worker_comm.probe().unwrap();
            assert_eq!(Tag::NoWork, tag);
            worker_comm.recv(0, Tag::NoWork).unwrap();
        });

        worker_thread.join().unwrap();
        dispatcher_thread.join().unwrap();
    }

    #[test]
    fn pushed_node_states_are_absorbed_into_the_frontier() {
        let handles = ChannelTransport::new_group(2);
        let mut iter = handles.into_iter();
        let dispatcher_comm = iter.next().unwrap();
        let worker_comm = iter.next().unwrap();

        let dispatcher_thread = thread::spawn(move || {
            let mut dispatcher = Dispatcher::new(&dispatcher_comm, queue()).unwrap();
            dispatcher.serve_one().unwrap();
            assert_eq!(1, dispatcher.explored_nodes_count());
        });

        let worker_thread = thread::spawn(move || {
            handshake(&worker_comm, ProcessType::Worker).unwrap();
            let frame = UpdateFrame {
                best_objective: f64::INFINITY,
                previous_bound: 0.0,
                explored_nodes_count: 1,
                node_states: vec![vec![2.0, 1.0, 9.0]],
            };
            worker_comm
                .send(0, Tag::Update, Payload::F64(frame.pack().unwrap()))
                .unwrap();
            let (_, tag) = worker_comm.probe().unwrap();
            assert_eq!(Tag::Work, tag);
            let payload = worker_comm.recv(0, Tag::Work).unwrap().into_f64().unwrap();
            assert_eq!(vec![f64::INFINITY, 2.0, 9.0], payload);
        });

        worker_thread.join().unwrap();
        dispatcher_thread.join().unwrap();
    }

    #[test]
    fn solve_finished_sets_the_finished_flag() {
        let _ = env_logger::try_init();
        let handles = ChannelTransport::new_group(2);
        let mut iter = handles.into_iter();
        let dispatcher_comm = iter.next().unwrap();
        let worker_comm = iter.next().unwrap();

        let dispatcher_thread = thread::spawn(move || {
            let mut dispatcher = Dispatcher::new(&dispatcher_comm, queue()).unwrap();
            dispatcher.serve_until_finished().unwrap();
            assert!(dispatcher.is_finished());
        });

        let worker_thread = thread::spawn(move || {
            handshake(&worker_comm, ProcessType::Worker).unwrap();
            worker_comm
                .send_sync(0, Tag::SolveFinished, Payload::Empty)
                .unwrap();
        });

        worker_thread.join().unwrap();
        dispatcher_thread.join().unwrap();
    }
}
