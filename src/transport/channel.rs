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

//! An in-process, multi-threaded `Transport` backend built from
//! `std::sync::mpsc` mailboxes and `parking_lot::{Mutex, Condvar}` rendezvous
//! barriers — the same primitives `examples/xgillard-ddo/ddo`'s
//! `ParallelSolver` already uses to coordinate worker threads instead of real
//! OS processes. Every "rank" here is a thread rather than a process; the
//! wire protocol doesn't care either way.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{BnbError, Result};

use super::{Payload, Tag, Transport, WorkerGroup};

struct Message {
    from: usize,
    tag: Tag,
    payload: Payload,
    /// Present for synchronous sends: signalled once `recv` has taken the message.
    ack: Option<SyncSender<()>>,
}

struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    cv: Condvar,
}

impl Mailbox {
    fn new() -> Self {
        Mailbox {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }
}

/// A value carried through one round of a collective operation. Type-erased
/// so that a single `GroupState` can serve `barrier`/`broadcast`/`all_reduce_*`
/// calls made in sequence on the same group.
#[derive(Clone)]
enum CollectiveValue {
    Unit,
    Broadcast(Option<Payload>),
    Sum(usize),
    ArgMax((usize, usize)),
    Colour(usize),
    Colours(Vec<usize>),
}

struct GroupInner {
    generation: u64,
    contributions: Vec<Option<CollectiveValue>>,
    result: Option<CollectiveValue>,
    departed: usize,
}

/// A reusable rendezvous point shared by every member of one process group.
/// Implements barrier/broadcast/all-reduce generically: each participant
/// contributes a value, the last arrival computes the combined result, and
/// everyone reads it back out before the slot resets for the next round.
struct GroupState {
    size: usize,
    inner: Mutex<GroupInner>,
    cv: Condvar,
}

impl GroupState {
    fn new(size: usize) -> Self {
        GroupState {
            size,
            inner: Mutex::new(GroupInner {
                generation: 0,
                contributions: vec![None; size],
                result: None,
                departed: 0,
            }),
            cv: Condvar::new(),
        }
    }

    fn collective(
        &self,
        local_rank: usize,
        value: CollectiveValue,
        combine: impl FnOnce(&[CollectiveValue]) -> CollectiveValue,
    ) -> CollectiveValue {
        let mut guard = self.inner.lock();
        let my_generation = guard.generation;
        guard.contributions[local_rank] = Some(value);
        let arrived = guard.contributions.iter().filter(|c| c.is_some()).count();

        if arrived == self.size {
            let values: Vec<CollectiveValue> = guard
                .contributions
                .iter()
                .map(|c| c.clone().expect("all contributions present"))
                .collect();
            let result = combine(&values);
            guard.result = Some(result);
            guard.generation += 1;
            self.cv.notify_all();
        } else {
            while guard.generation == my_generation {
                self.cv.wait(&mut guard);
            }
        }

        let result = guard
            .result
            .clone()
            .expect("result is set once every member has arrived");
        guard.departed += 1;
        if guard.departed == self.size {
            guard.contributions = vec![None; self.size];
            guard.result = None;
            guard.departed = 0;
        }
        result
    }
}

/// Shared state backing every `ChannelTransport` handle created from the same
/// [`Hub`].
struct Hub {
    mailboxes: Vec<Mailbox>,
    groups: Mutex<HashMap<Vec<usize>, Arc<GroupState>>>,
}

impl Hub {
    fn group_state(&self, members: &[usize]) -> Arc<GroupState> {
        let mut groups = self.groups.lock();
        groups
            .entry(members.to_vec())
            .or_insert_with(|| Arc::new(GroupState::new(members.len())))
            .clone()
    }
}

/// An in-process `Transport` handle for one rank. Clone-per-rank handles
/// share the same [`Hub`] and therefore the same mailboxes and collectives.
pub struct ChannelTransport {
    hub: Arc<Hub>,
    rank: usize,
}

impl ChannelTransport {
    /// Creates `size` transport handles, one per rank, all wired to the same
    /// in-process hub. Hand one handle to each worker/dispatcher thread.
    pub fn new_group(size: usize) -> Vec<ChannelTransport> {
        let hub = Arc::new(Hub {
            mailboxes: (0..size).map(|_| Mailbox::new()).collect(),
            groups: Mutex::new(HashMap::new()),
        });
        (0..size)
            .map(|rank| ChannelTransport {
                hub: Arc::clone(&hub),
                rank,
            })
            .collect()
    }

    fn world_members(&self) -> Vec<usize> {
        (0..self.size()).collect()
    }

    fn world_group(&self) -> Arc<GroupState> {
        self.hub.group_state(&self.world_members())
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.hub.mailboxes.len()
    }

    fn send(&self, dest: usize, tag: Tag, payload: Payload) -> Result<()> {
        self.push(dest, tag, payload, None)
    }

    fn send_sync(&self, dest: usize, tag: Tag, payload: Payload) -> Result<()> {
        let (ack_tx, ack_rx) = sync_channel(0);
        self.push(dest, tag, payload, Some(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| BnbError::Transport("synchronous send's ack channel was dropped".into()))
    }

    fn probe(&self) -> Result<(usize, Tag)> {
        let mailbox = &self.hub.mailboxes[self.rank];
        let mut queue = mailbox.queue.lock();
        while queue.is_empty() {
            mailbox.cv.wait(&mut queue);
        }
        let head = queue.front().expect("queue just checked non-empty");
        Ok((head.from, head.tag))
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Payload> {
        let mailbox = &self.hub.mailboxes[self.rank];
        let mut queue = mailbox.queue.lock();
        while queue.is_empty() {
            mailbox.cv.wait(&mut queue);
        }
        let head = queue.front().expect("queue just checked non-empty");
        if head.from != source || head.tag != tag {
            return Err(BnbError::Protocol(format!(
                "recv expected (source={source}, tag={tag:?}) but the head of the mailbox is (source={}, tag={:?})",
                head.from, head.tag
            )));
        }
        let message = queue.pop_front().expect("head was just inspected");
        if let Some(ack) = message.ack {
            let _ = ack.send(());
        }
        Ok(message.payload)
    }

    fn barrier(&self) -> Result<()> {
        self.world_group()
            .collective(self.rank, CollectiveValue::Unit, |_| CollectiveValue::Unit);
        Ok(())
    }

    fn broadcast(&self, root: usize, payload: Option<Payload>) -> Result<Payload> {
        if self.rank == root && payload.is_none() {
            return Err(BnbError::Precondition(
                "broadcast root must supply a payload".into(),
            ));
        }
        let result = self.world_group().collective(
            self.rank,
            CollectiveValue::Broadcast(payload),
            move |values| {
                let chosen = values
                    .get(root)
                    .and_then(|v| match v {
                        CollectiveValue::Broadcast(p) => p.clone(),
                        _ => None,
                    })
                    .expect("root contributed a payload");
                CollectiveValue::Broadcast(Some(chosen))
            },
        );
        match result {
            CollectiveValue::Broadcast(Some(p)) => Ok(p),
            _ => Err(BnbError::Transport("broadcast produced no payload".into())),
        }
    }

    fn all_reduce_sum(&self, value: usize) -> Result<usize> {
        let result =
            self.world_group()
                .collective(self.rank, CollectiveValue::Sum(value), |values| {
                    let total = values
                        .iter()
                        .map(|v| match v {
                            CollectiveValue::Sum(s) => *s,
                            _ => 0,
                        })
                        .sum();
                    CollectiveValue::Sum(total)
                });
        match result {
            CollectiveValue::Sum(s) => Ok(s),
            _ => unreachable!("all_reduce_sum always combines to Sum"),
        }
    }

    fn all_reduce_argmax(&self, value: (usize, usize)) -> Result<(usize, usize)> {
        let result = self.world_group().collective(
            self.rank,
            CollectiveValue::ArgMax(value),
            |values| {
                let best = values
                    .iter()
                    .filter_map(|v| match v {
                        CollectiveValue::ArgMax(pair) => Some(*pair),
                        _ => None,
                    })
                    .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
                    .expect("at least one contribution");
                CollectiveValue::ArgMax(best)
            },
        );
        match result {
            CollectiveValue::ArgMax(pair) => Ok(pair),
            _ => unreachable!("all_reduce_argmax always combines to ArgMax"),
        }
    }

    fn split_workers(&self, is_dispatcher: bool) -> Result<Box<dyn WorkerGroup>> {
        let colour = usize::from(is_dispatcher);
        let result = self.world_group().collective(
            self.rank,
            CollectiveValue::Colour(colour),
            |values| {
                let colours = values
                    .iter()
                    .map(|v| match v {
                        CollectiveValue::Colour(c) => *c,
                        _ => usize::MAX,
                    })
                    .collect();
                CollectiveValue::Colours(colours)
            },
        );
        let colours = match result {
            CollectiveValue::Colours(c) => c,
            _ => unreachable!("split_workers always combines to Colours"),
        };
        let members: Vec<usize> = (0..colours.len())
            .filter(|&rank| colours[rank] == colour)
            .collect();
        let local_rank = members
            .iter()
            .position(|&r| r == self.rank)
            .expect("this rank contributed its own colour");
        let state = self.hub.group_state(&members);
        Ok(Box::new(WorkerGroupImpl {
            state,
            local_rank,
            local_size: members.len(),
        }))
    }
}

impl ChannelTransport {
    fn push(&self, dest: usize, tag: Tag, payload: Payload, ack: Option<SyncSender<()>>) -> Result<()> {
        let mailbox = self
            .hub
            .mailboxes
            .get(dest)
            .ok_or_else(|| BnbError::Precondition(format!("no such rank: {dest}")))?;
        mailbox.queue.lock().push_back(Message {
            from: self.rank,
            tag,
            payload,
            ack,
        });
        mailbox.cv.notify_all();
        Ok(())
    }
}

struct WorkerGroupImpl {
    state: Arc<GroupState>,
    local_rank: usize,
    local_size: usize,
}

impl WorkerGroup for WorkerGroupImpl {
    fn local_rank(&self) -> usize {
        self.local_rank
    }

    fn local_size(&self) -> usize {
        self.local_size
    }

    fn barrier(&self) -> Result<()> {
        self.state
            .collective(self.local_rank, CollectiveValue::Unit, |_| CollectiveValue::Unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn consecutive_sends_from_one_source_arrive_in_order() {
        // P8: the dispatcher must never observe a later Update from a
        // worker before an earlier one from the same source.
        let mut handles = ChannelTransport::new_group(2);
        let b = handles.pop().unwrap();
        let a = handles.pop().unwrap();

        for i in 0..10 {
            a.send(1, Tag::Update, Payload::F64(vec![i as f64])).unwrap();
        }
        for i in 0..10 {
            let (from, tag) = b.probe().unwrap();
            assert_eq!(0, from);
            assert_eq!(Tag::Update, tag);
            let payload = b.recv(0, Tag::Update).unwrap().into_f64().unwrap();
            assert_eq!(vec![i as f64], payload);
        }
    }

    #[test]
    fn point_to_point_send_then_recv() {
        let mut handles = ChannelTransport::new_group(2);
        let b = handles.pop().unwrap();
        let a = handles.pop().unwrap();

        a.send(1, Tag::Update, Payload::F64(vec![1.0, 2.0])).unwrap();
        let (from, tag) = b.probe().unwrap();
        assert_eq!(0, from);
        assert_eq!(Tag::Update, tag);
        let payload = b.recv(0, Tag::Update).unwrap();
        assert_eq!(vec![1.0, 2.0], payload.into_f64().unwrap());
    }

    #[test]
    fn synchronous_send_blocks_until_matching_recv() {
        let mut handles = ChannelTransport::new_group(2);
        let receiver = handles.pop().unwrap();
        let sender = handles.pop().unwrap();

        let handle = thread::spawn(move || {
            sender
                .send_sync(1, Tag::Barrier, Payload::Empty)
                .unwrap();
        });

        // give the sender a moment to actually block before we drain it
        thread::sleep(std::time::Duration::from_millis(20));
        let (from, tag) = receiver.probe().unwrap();
        assert_eq!(0, from);
        assert_eq!(Tag::Barrier, tag);
        receiver.recv(0, Tag::Barrier).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn barrier_releases_all_participants() {
        let handles = ChannelTransport::new_group(4);
        let threads: Vec<_> = handles
            .into_iter()
            .map(|t| thread::spawn(move || t.barrier().unwrap()))
            .collect();
        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn broadcast_delivers_roots_payload_to_everyone() {
        let handles = ChannelTransport::new_group(3);
        let threads: Vec<_> = handles
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let payload = if t.rank() == 1 {
                        Some(Payload::F64(vec![42.0]))
                    } else {
                        None
                    };
                    t.broadcast(1, payload).unwrap().into_f64().unwrap()
                })
            })
            .collect();
        for t in threads {
            assert_eq!(vec![42.0], t.join().unwrap());
        }
    }

    #[test]
    fn all_reduce_sum_adds_every_contribution() {
        let handles = ChannelTransport::new_group(4);
        let threads: Vec<_> = handles
            .into_iter()
            .map(|t| thread::spawn(move || t.all_reduce_sum(1).unwrap()))
            .collect();
        for t in threads {
            assert_eq!(4, t.join().unwrap());
        }
    }

    #[test]
    fn all_reduce_argmax_finds_unique_dispatcher() {
        let handles = ChannelTransport::new_group(4);
        let threads: Vec<_> = handles
            .into_iter()
            .map(|t| {
                let is_dispatcher = t.rank() == 2;
                thread::spawn(move || {
                    let ptype = if is_dispatcher { 1 } else { 0 };
                    t.all_reduce_argmax((ptype, t.rank())).unwrap()
                })
            })
            .collect();
        for t in threads {
            assert_eq!((1, 2), t.join().unwrap());
        }
    }

    #[test]
    fn split_workers_excludes_the_dispatcher() {
        let handles = ChannelTransport::new_group(4);
        let threads: Vec<_> = handles
            .into_iter()
            .map(|t| {
                let is_dispatcher = t.rank() == 0;
                thread::spawn(move || {
                    let group = t.split_workers(is_dispatcher).unwrap();
                    (is_dispatcher, group.local_size(), group.local_rank())
                })
            })
            .collect();
        let mut local_ranks = Vec::new();
        for t in threads {
            let (is_dispatcher, local_size, local_rank) = t.join().unwrap();
            if is_dispatcher {
                assert_eq!(1, local_size);
            } else {
                assert_eq!(3, local_size);
                local_ranks.push(local_rank);
            }
        }
        local_ranks.sort();
        assert_eq!(vec![0, 1, 2], local_ranks);
    }
}
