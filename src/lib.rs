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

//! `bnb-dispatch` is the coordination core of a parallel branch-and-bound
//! solver: the wire protocol, role handshake, and priority-queue family that
//! let a single dispatcher process hand work out to a pool of workers and
//! converge on a proven-optimal incumbent.
//!
//! This crate does not implement a solver. It has no notion of a subproblem
//! other than an opaque `Vec<f64>` payload, no branching rule, and no
//! convergence policy beyond the default [`queue::RelativeGapConverger`]
//! supplied for self-contained use. An embedding application brings those;
//! this crate brings the part that is the same regardless of what's being
//! optimized: getting a bound from a worker to the dispatcher and a
//! subproblem back, in a way that a termination-detection protocol can
//! reason about.
//!
//! # Example
//!
//! A two-process run over the in-process [`transport::channel::ChannelTransport`]:
//!
//! ```
//! use bnb_dispatch::codec::UpdateFrame;
//! use bnb_dispatch::dispatcher::Dispatcher;
//! use bnb_dispatch::node::{Node, Sense};
//! use bnb_dispatch::proxy::{DispatcherProxy, WorkResponse};
//! use bnb_dispatch::queue::worst_bound_first::WorstBoundFirstPriorityQueue;
//! use bnb_dispatch::queue::RelativeGapConverger;
//! use bnb_dispatch::transport::channel::ChannelTransport;
//! use std::thread;
//!
//! let handles = ChannelTransport::new_group(2);
//! let mut iter = handles.into_iter();
//! let dispatcher_comm = iter.next().unwrap();
//! let worker_comm = iter.next().unwrap();
//!
//! let dispatcher_thread = thread::spawn(move || {
//!     let queue = WorstBoundFirstPriorityQueue::new(RelativeGapConverger::new(Sense::Minimize));
//!     let mut dispatcher = Dispatcher::new(&dispatcher_comm, queue).unwrap();
//!     dispatcher
//!         .queue_mut()
//!         .put(Node::new(f64::INFINITY, 1.0, 0, vec![]));
//!     dispatcher.serve_until_finished().unwrap();
//! });
//!
//! let worker_thread = thread::spawn(move || {
//!     let proxy = DispatcherProxy::new(&worker_comm).unwrap();
//!     let response = proxy
//!         .update(&UpdateFrame {
//!             best_objective: f64::INFINITY,
//!             previous_bound: f64::NEG_INFINITY,
//!             explored_nodes_count: 0,
//!             node_states: vec![],
//!         })
//!         .unwrap();
//!     assert!(matches!(response, WorkResponse::Work { .. }));
//!     proxy.solve_finished().unwrap();
//! });
//!
//! worker_thread.join().unwrap();
//! dispatcher_thread.join().unwrap();
//! ```

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod node;
pub mod proxy;
pub mod queue;
pub mod timer;
pub mod transport;

pub use error::{BnbError, Result};
pub use node::{Node, ProcessType, Sense};
