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

//! The error taxonomy used throughout the dispatcher/worker core.
//!
//! All three variants are fatal by design: the core never retries and never
//! swallows one of these. Callers at the edge of an embedding application are
//! expected to let these propagate to a `panic!` or process abort, exactly as
//! the wire protocol has no notion of a recoverable failure.

/// An error raised by the dispatcher/worker coordination core.
#[derive(Debug, thiserror::Error)]
pub enum BnbError {
    /// A precondition of the protocol was violated by local, well-formed-input-independent
    /// state: a handshake assertion failed, a counter would overflow past 2^53, a `None`
    /// node was pushed onto a queue, or a timer was entered while already running.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The peer on the other end of the wire sent something that doesn't match the
    /// protocol: an unexpected response tag, or a frame whose declared lengths don't
    /// agree with its actual size.
    #[error("protocol mismatch: {0}")]
    Protocol(String),

    /// The underlying message-passing fabric reported a failure.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, BnbError>;
