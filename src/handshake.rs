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

//! The process-role handshake: elects the dispatcher and the root worker,
//! and splits the group into a worker-only sub-group. Mirrors
//! `DispatcherProxy._init` in the source implementation
//! (`examples/original_source/src/pybnb/dispatcher_proxy.py`).

use crate::error::{BnbError, Result};
use crate::node::ProcessType;
use crate::transport::{Transport, WorkerGroup};

/// The outcome of a successful handshake, as observed by one worker.
pub struct Handshake {
    /// Rank of the elected dispatcher within the group.
    pub dispatcher_rank: usize,
    /// Rank of the root worker within the group (never equal to `dispatcher_rank`).
    pub root_worker_rank: usize,
    /// This worker's rank within the worker-only sub-group.
    pub worker_group_rank: usize,
    /// Whether this process *is* the root worker.
    pub is_root_worker: bool,
    /// The worker-only sub-group, used for the local barrier in
    /// [`crate::proxy::DispatcherProxy::barrier`].
    pub worker_group: Box<dyn WorkerGroup>,
}

/// Runs the role handshake described in `spec.md` §4.1. Every process in
/// `comm` must call this with its own `ptype`; the computed `dispatcher_rank`
/// and `root_worker_rank` are identical across every call (property P7).
///
/// Rejects groups smaller than two processes explicitly, resolving the open
/// question in `spec.md` §9: with `comm.size() == 1` there can be no worker
/// distinct from the dispatcher, so `root_worker = size - 1` would collide
/// with (or, after the source's blind decrement, underflow past) the
/// dispatcher's own rank.
pub fn handshake(comm: &dyn Transport, ptype: ProcessType) -> Result<Handshake> {
    if comm.size() < 2 {
        return Err(BnbError::Precondition(format!(
            "handshake requires at least 2 processes (1 dispatcher + >=1 worker), got {}",
            comm.size()
        )));
    }

    let types_sum = comm.all_reduce_sum(ptype.as_usize())?;
    if types_sum != ProcessType::Dispatcher.as_usize() {
        return Err(BnbError::Precondition(format!(
            "expected exactly one dispatcher in the group, got a process-type sum of {types_sum}"
        )));
    }

    let (dispatcher_type, dispatcher_rank) =
        comm.all_reduce_argmax((ptype.as_usize(), comm.rank()))?;
    if dispatcher_type != ProcessType::Dispatcher.as_usize() {
        return Err(BnbError::Precondition(
            "argmax election did not resolve to the dispatcher process type".into(),
        ));
    }
    match ptype {
        ProcessType::Dispatcher => {
            if dispatcher_rank != comm.rank() {
                return Err(BnbError::Precondition(
                    "the dispatcher process disagrees with the group about its own rank".into(),
                ));
            }
        }
        ProcessType::Worker => {
            if dispatcher_rank == comm.rank() {
                return Err(BnbError::Precondition(
                    "a worker process was elected as the dispatcher".into(),
                ));
            }
        }
    }

    let mut root_worker_rank = comm.size() - 1;
    if root_worker_rank == dispatcher_rank {
        root_worker_rank -= 1;
    }

    let is_dispatcher = matches!(ptype, ProcessType::Dispatcher);
    let worker_group = comm.split_workers(is_dispatcher)?;

    // Broadcast the root worker's rank *within the worker group* so every
    // worker can later recognize it without consulting the world comm
    // (spec.md §4.1 step 5). The dispatcher has no meaningful worker-group
    // rank, so it does not participate in this broadcast's payload.
    let payload = if comm.rank() == root_worker_rank {
        Some(crate::transport::Payload::F64(vec![worker_group.local_rank() as f64]))
    } else {
        None
    };
    comm.broadcast(root_worker_rank, payload)?;

    log::debug!(
        "handshake complete: rank={} dispatcher_rank={} root_worker_rank={}",
        comm.rank(),
        dispatcher_rank,
        root_worker_rank
    );

    Ok(Handshake {
        dispatcher_rank,
        root_worker_rank,
        worker_group_rank: worker_group.local_rank(),
        is_root_worker: comm.rank() == root_worker_rank,
        worker_group,
    })
}
