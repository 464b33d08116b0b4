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

//! The worker-side handle to the dispatcher (`spec.md` §4.3). Mirrors
//! `DispatcherProxy` in `examples/original_source/src/pybnb/dispatcher_proxy.py`:
//! every method that talks to the dispatcher is wrapped in an
//! [`ActionTimer`] scope, so a worker can always answer "how much of my wall
//! time went to waiting on the dispatcher".

use crate::codec::UpdateFrame;
use crate::error::{BnbError, Result};
use crate::handshake::{handshake, Handshake};
use crate::node::ProcessType;
use crate::timer::ActionTimer;
use crate::transport::{Payload, Tag, Transport};

/// What the dispatcher handed back in response to an `update` call
/// (`spec.md` §4.3, `Work`/`NoWork` response tags).
#[derive(Debug, Clone, PartialEq)]
pub enum WorkResponse {
    /// A new subproblem to explore, plus the dispatcher's current incumbent.
    Work {
        best_objective: f64,
        node_state: Vec<f64>,
    },
    /// The dispatcher's frontier is currently empty; try again later.
    NoWork { best_objective: f64 },
}

/// A worker's handle to the dispatcher process.
pub struct DispatcherProxy<'a> {
    comm: &'a dyn Transport,
    handshake: Handshake,
    timer: ActionTimer,
}

impl<'a> DispatcherProxy<'a> {
    /// Runs the role handshake and returns a proxy bound to the elected
    /// dispatcher. `comm` must be the same group handle every worker and the
    /// dispatcher call this with.
    pub fn new(comm: &'a dyn Transport) -> Result<Self> {
        let handshake = handshake(comm, ProcessType::Worker)?;
        Ok(DispatcherProxy {
            comm,
            handshake,
            timer: ActionTimer::new(),
        })
    }

    /// This worker's rank within the worker-only sub-group.
    pub fn worker_group_rank(&self) -> usize {
        self.handshake.worker_group_rank
    }

    /// Whether this worker is the root worker (`spec.md` §4.1).
    pub fn is_root_worker(&self) -> bool {
        self.handshake.is_root_worker
    }

    /// Total time spent so far blocked inside proxy calls.
    pub fn comm_time(&self) -> f64 {
        self.timer.comm_time()
    }

    /// Reports `frame` to the dispatcher and receives either a new
    /// subproblem or a no-work notice (`spec.md` §4.3 `update`).
    pub fn update(&self, frame: &UpdateFrame) -> Result<WorkResponse> {
        self.timer.scope(|| {
            let packed = frame.pack()?;
            self.comm
                .send(self.handshake.dispatcher_rank, Tag::Update, Payload::F64(packed))?;
            let (source, tag) = self.comm.probe()?;
            if source != self.handshake.dispatcher_rank {
                return Err(BnbError::Protocol(format!(
                    "update response came from rank {source}, expected the dispatcher"
                )));
            }
            match tag {
                Tag::Work => {
                    let payload = self.comm.recv(source, Tag::Work)?.into_f64()?;
                    let best_objective = crate::codec::extract_best_objective(&payload)?;
                    Ok(WorkResponse::Work {
                        best_objective,
                        node_state: payload,
                    })
                }
                Tag::NoWork => {
                    let payload = self.comm.recv(source, Tag::NoWork)?.into_f64()?;
                    let best_objective = crate::codec::extract_best_objective(&payload)?;
                    Ok(WorkResponse::NoWork { best_objective })
                }
                other => Err(BnbError::Protocol(format!(
                    "update response carried unexpected tag {other:?}"
                ))),
            }
        })
    }

    /// Synchronizes with every worker and the dispatcher (`spec.md` §4.3
    /// `barrier`): first a local barrier on the worker-only group so every
    /// worker has caught up, then a synchronous round-trip with the
    /// dispatcher so it knows every worker reached this point.
    pub fn barrier(&self) -> Result<()> {
        self.timer.scope(|| {
            self.handshake.worker_group.barrier()?;
            if self.handshake.is_root_worker {
                self.comm
                    .send_sync(self.handshake.dispatcher_rank, Tag::Barrier, Payload::Empty)?;
            }
            self.comm.barrier()
        })
    }

    /// Tells the dispatcher this worker has observed a global stopping
    /// condition and will make no further `update` calls (`spec.md` §4.3
    /// `solve_finished`). Only the root worker's call is meaningful; other
    /// workers reach this through the normal termination protocol instead.
    pub fn solve_finished(&self) -> Result<()> {
        self.timer.scope(|| {
            self.comm.send_sync(
                self.handshake.dispatcher_rank,
                Tag::SolveFinished,
                Payload::Empty,
            )
        })
    }

    /// Asks the dispatcher for the final, converged result (`spec.md` §4.3
    /// `finalize`). Must be called after [`DispatcherProxy::solve_finished`].
    /// Only the root worker's send reaches the dispatcher; every worker
    /// (root and non-root) then receives the same answer through one
    /// collective broadcast rooted at the dispatcher.
    pub fn finalize(&self) -> Result<Vec<f64>> {
        self.timer.scope(|| {
            if self.handshake.is_root_worker {
                self.comm
                    .send(self.handshake.dispatcher_rank, Tag::Finalize, Payload::Empty)?;
            }
            self.comm
                .broadcast(self.handshake.dispatcher_rank, None)?
                .into_f64()
        })
    }

    fn log(&self, tag: Tag, message: &str) -> Result<()> {
        self.timer.scope(|| {
            self.comm.send_sync(
                self.handshake.dispatcher_rank,
                tag,
                Payload::Bytes(message.as_bytes().to_vec()),
            )
        })
    }

    /// Relays an info-level diagnostic through the dispatcher (`spec.md`
    /// §4.3 `log_info`), so output from every worker is serialized at one
    /// place instead of interleaving across processes.
    pub fn log_info(&self, message: &str) -> Result<()> {
        self.log(Tag::LogInfo, message)
    }

    pub fn log_warning(&self, message: &str) -> Result<()> {
        self.log(Tag::LogWarning, message)
    }

    pub fn log_debug(&self, message: &str) -> Result<()> {
        self.log(Tag::LogDebug, message)
    }

    pub fn log_error(&self, message: &str) -> Result<()> {
        self.log(Tag::LogError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::node::{Node, Sense};
    use crate::queue::worst_bound_first::WorstBoundFirstPriorityQueue;
    use crate::queue::{PriorityQueue, RelativeGapConverger};
    use crate::transport::channel::ChannelTransport;
    use std::thread;

    #[test]
    fn update_round_trips_a_node_through_a_live_dispatcher() {
        let _ = env_logger::try_init();
        let handles = ChannelTransport::new_group(2);
        let mut iter = handles.into_iter();
        let dispatcher_comm = iter.next().unwrap();
        let worker_comm = iter.next().unwrap();

        let dispatcher_thread = thread::spawn(move || {
            let queue = WorstBoundFirstPriorityQueue::new(RelativeGapConverger::new(Sense::Minimize));
            let mut dispatcher = Dispatcher::new(&dispatcher_comm, queue).unwrap();
            dispatcher
                .queue_mut()
                .put(Node::new(f64::INFINITY, 1.0, 0, vec![9.0, 9.0]));
            dispatcher.serve_one().unwrap(); // answers the worker's update with Work
            dispatcher.serve_one().unwrap(); // answers the no-op update that follows with NoWork
            dispatcher.serve_one().unwrap(); // solve_finished
            dispatcher.serve_one().unwrap(); // finalize
        });

        let worker_thread = thread::spawn(move || {
            let proxy = DispatcherProxy::new(&worker_comm).unwrap();
            let response = proxy
                .update(&UpdateFrame {
                    best_objective: f64::INFINITY,
                    previous_bound: f64::NEG_INFINITY,
                    explored_nodes_count: 0,
                    node_states: vec![],
                })
                .unwrap();
            assert!(matches!(response, WorkResponse::Work { .. }));

            let response = proxy
                .update(&UpdateFrame {
                    best_objective: f64::INFINITY,
                    previous_bound: 1.0,
                    explored_nodes_count: 1,
                    node_states: vec![],
                })
                .unwrap();
            assert!(matches!(response, WorkResponse::NoWork { .. }));

            proxy.solve_finished().unwrap();
            let result = proxy.finalize().unwrap();
            assert_eq!(f64::INFINITY, result[0]);
        });

        worker_thread.join().unwrap();
        dispatcher_thread.join().unwrap();
    }

    #[test]
    fn barrier_blocks_until_the_dispatcher_joins_the_global_barrier() {
        let _ = env_logger::try_init();
        let handles = ChannelTransport::new_group(2);
        let mut iter = handles.into_iter();
        let dispatcher_comm = iter.next().unwrap();
        let worker_comm = iter.next().unwrap();

        let dispatcher_thread = thread::spawn(move || {
            let queue = WorstBoundFirstPriorityQueue::new(RelativeGapConverger::new(Sense::Minimize));
            let mut dispatcher = Dispatcher::new(&dispatcher_comm, queue).unwrap();
            dispatcher.serve_one().unwrap(); // receives the root worker's barrier send, then joins the global barrier
        });

        let worker_thread = thread::spawn(move || {
            let proxy = DispatcherProxy::new(&worker_comm).unwrap();
            proxy.barrier().unwrap();
        });

        worker_thread.join().unwrap();
        dispatcher_thread.join().unwrap();
    }
}
