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

//! Abstraction over the collective message-passing fabric that the
//! dispatcher/worker protocol is built on top of (`spec.md` §2 item 1).
//!
//! No example repository in this codebase's lineage depends on a real MPI
//! binding, so this crate ships the trait boundary plus exactly one concrete
//! backend, [`channel::ChannelTransport`], an in-process multi-threaded
//! implementation. See `SPEC_FULL.md` §9 for the rationale.

pub mod channel;

use crate::error::Result;

/// A message tag, classifying every frame exchanged between a worker and the
/// dispatcher. Values are bit-exact to `spec.md` §6 and must never change:
/// they are part of the external wire protocol.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Tag {
    Update = 111,
    SolveFinished = 211,
    Barrier = 311,
    Finalize = 411,
    LogInfo = 511,
    LogWarning = 611,
    LogDebug = 711,
    LogError = 811,
    Work = 1111,
    NoWork = 2111,
}

impl Tag {
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// The payload carried by a single framed message. `spec.md` §4.2/§6
/// describes three concrete shapes: a numeric update/work/no-work frame, a
/// UTF-8 log message, or an empty control trigger (`barrier`,
/// `solve_finished`, `finalize`).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    F64(Vec<f64>),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn into_f64(self) -> Result<Vec<f64>> {
        match self {
            Payload::F64(v) => Ok(v),
            other => Err(crate::error::BnbError::Protocol(format!(
                "expected an f64 payload, got {other:?}"
            ))),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Payload::Bytes(v) => Ok(v),
            other => Err(crate::error::BnbError::Protocol(format!(
                "expected a byte payload, got {other:?}"
            ))),
        }
    }
}

/// The worker-only sub-communicator produced by [`Transport::split_workers`].
/// It exists solely to support the local barrier among workers and to let a
/// worker learn its rank relative to the other workers (`spec.md` §4.1
/// step 4-5); no point-to-point messaging happens on it — the source
/// implementation only ever calls `Barrier()`, `.rank`, and `.Free()` on it.
pub trait WorkerGroup: Send + Sync {
    /// This worker's rank within the worker-only group.
    fn local_rank(&self) -> usize;
    /// Number of workers in the group.
    fn local_size(&self) -> usize;
    /// Synchronizes every member of the worker group.
    fn barrier(&self) -> Result<()>;
}

/// A handle to the collective message-passing fabric, scoped to the global
/// process group (`spec.md` §4.1's `comm`).
pub trait Transport: Send + Sync {
    /// This process's rank within the group.
    fn rank(&self) -> usize;
    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// A possibly-buffered send: may complete before `dest` has posted a
    /// matching receive.
    fn send(&self, dest: usize, tag: Tag, payload: Payload) -> Result<()>;
    /// A synchronous (rendezvous) send: does not return until `dest` has
    /// posted a matching receive. Required for `barrier`, `solve_finished`,
    /// and `log_*` (`spec.md` §9 "Synchronous sends for control messages").
    fn send_sync(&self, dest: usize, tag: Tag, payload: Payload) -> Result<()>;

    /// Blocks until a message destined for this rank is available, and
    /// returns its source and tag *without* consuming it.
    fn probe(&self) -> Result<(usize, Tag)>;
    /// Consumes the next queued message from `source` tagged `tag`. The
    /// caller is expected to have just observed this exact (source, tag)
    /// pair from [`Transport::probe`].
    fn recv(&self, source: usize, tag: Tag) -> Result<Payload>;

    /// Synchronizes every process in the group.
    fn barrier(&self) -> Result<()>;
    /// Broadcasts `payload` (which must be `Some` on `root` and `None`
    /// everywhere else) from `root` to every process in the group.
    fn broadcast(&self, root: usize, payload: Option<Payload>) -> Result<Payload>;
    /// Sums `value` across every process in the group.
    fn all_reduce_sum(&self, value: usize) -> Result<usize>;
    /// Reduces `(key, rank)` pairs to the one with the largest `key`,
    /// breaking ties by the smallest `rank` (mirrors `MPI.MAXLOC`).
    fn all_reduce_argmax(&self, value: (usize, usize)) -> Result<(usize, usize)>;

    /// Splits the group into the worker-only sub-group. `is_dispatcher`
    /// selects which side of the split this process ends up excluded from:
    /// the dispatcher calls this with `true` and gets a singleton group; a
    /// worker calls it with `false` and gets the shared worker group.
    fn split_workers(&self, is_dispatcher: bool) -> Result<Box<dyn WorkerGroup>>;
}
