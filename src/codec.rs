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

//! Wire framing for update/work/no-work messages: packs and unpacks a
//! contiguous `f64` buffer per `spec.md` §4.2 and §6.
//!
//! ```text
//! offset | field
//! -------+---------------------------------------------
//!      0 | best_objective
//!      1 | previous_bound
//!      2 | explored_nodes_count (integer stored as f64)
//!      3 | k = number of node states
//!   4..  | for i in 0..k: len_i, then len_i payload doubles
//! ```

use crate::error::{BnbError, Result};

/// Largest integer that every `f64` can represent exactly.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

fn check_exact_integer(value: u64, what: &str) -> Result<()> {
    if value > MAX_EXACT_INTEGER {
        return Err(BnbError::Precondition(format!(
            "{what} = {value} exceeds 2^53 and cannot round-trip through f64"
        )));
    }
    Ok(())
}

/// An update frame as sent by a worker to the dispatcher: the worker's view
/// of the incumbent and its locally explored-node counter, plus zero or more
/// newly discovered node states.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFrame {
    pub best_objective: f64,
    pub previous_bound: f64,
    pub explored_nodes_count: u64,
    pub node_states: Vec<Vec<f64>>,
}

impl UpdateFrame {
    /// Packs this frame into the contiguous wire layout.
    ///
    /// Returns an error if `explored_nodes_count` or any state's length
    /// cannot be represented exactly as an `f64` (`spec.md` §4.2 constraint).
    pub fn pack(&self) -> Result<Vec<f64>> {
        check_exact_integer(self.explored_nodes_count, "explored_nodes_count")?;
        check_exact_integer(self.node_states.len() as u64, "k")?;

        let mut size = 4;
        for state in &self.node_states {
            check_exact_integer(state.len() as u64, "len_i")?;
            size += 1 + state.len();
        }

        let mut data = Vec::with_capacity(size);
        data.push(self.best_objective);
        data.push(self.previous_bound);
        data.push(self.explored_nodes_count as f64);
        data.push(self.node_states.len() as f64);
        for state in &self.node_states {
            data.push(state.len() as f64);
            data.extend_from_slice(state);
        }
        Ok(data)
    }

    /// Unpacks a buffer previously produced by [`UpdateFrame::pack`].
    pub fn unpack(data: &[f64]) -> Result<Self> {
        if data.len() < 4 {
            return Err(BnbError::Protocol(format!(
                "update frame too short: {} doubles, need at least 4",
                data.len()
            )));
        }
        let best_objective = data[0];
        let previous_bound = data[1];
        let explored_nodes_count = data[2] as u64;
        if explored_nodes_count as f64 != data[2] {
            return Err(BnbError::Protocol(
                "explored_nodes_count did not round-trip through f64".into(),
            ));
        }
        let k = data[3] as usize;
        if k as f64 != data[3] {
            return Err(BnbError::Protocol("k did not round-trip through f64".into()));
        }

        let mut node_states = Vec::with_capacity(k);
        let mut pos = 4usize;
        for _ in 0..k {
            let len = *data.get(pos).ok_or_else(|| {
                BnbError::Protocol("update frame truncated while reading a state length".into())
            })? as usize;
            pos += 1;
            let end = pos
                .checked_add(len)
                .ok_or_else(|| BnbError::Protocol("state length overflowed frame offset".into()))?;
            let state = data.get(pos..end).ok_or_else(|| {
                BnbError::Protocol("update frame truncated while reading a state payload".into())
            })?;
            node_states.push(state.to_vec());
            pos = end;
        }
        if pos != data.len() {
            return Err(BnbError::Protocol(format!(
                "update frame has {} trailing doubles after declared payload",
                data.len() - pos
            )));
        }

        Ok(UpdateFrame {
            best_objective,
            previous_bound,
            explored_nodes_count,
            node_states,
        })
    }
}

/// Extracts the embedded `best_objective` header field from a work-response
/// node-state payload, per `spec.md` §4.3 (`Node._extract_best_objective`).
pub fn extract_best_objective(node_state: &[f64]) -> Result<f64> {
    node_state.first().copied().ok_or_else(|| {
        BnbError::Protocol("work response payload is empty, cannot extract best_objective".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_round_trips_exactly() {
        let frame = UpdateFrame {
            best_objective: 2.0,
            previous_bound: 1.5,
            explored_nodes_count: 7,
            node_states: vec![vec![0.1, 0.2], vec![0.3]],
        };
        let packed = frame.pack().unwrap();
        assert_eq!(
            vec![2.0, 1.5, 7.0, 2.0, 2.0, 0.1, 0.2, 1.0, 0.3],
            packed
        );
        let unpacked = UpdateFrame::unpack(&packed).unwrap();
        assert_eq!(frame, unpacked);
    }

    #[test]
    fn pack_with_no_node_states() {
        let frame = UpdateFrame {
            best_objective: f64::INFINITY,
            previous_bound: f64::NEG_INFINITY,
            explored_nodes_count: 0,
            node_states: vec![],
        };
        let packed = frame.pack().unwrap();
        assert_eq!(vec![f64::INFINITY, f64::NEG_INFINITY, 0.0, 0.0], packed);
        assert_eq!(frame, UpdateFrame::unpack(&packed).unwrap());
    }

    #[test]
    fn explored_nodes_count_above_2_53_is_rejected() {
        let frame = UpdateFrame {
            best_objective: 0.0,
            previous_bound: 0.0,
            explored_nodes_count: (1u64 << 53) + 1,
            node_states: vec![],
        };
        assert!(frame.pack().is_err());
    }

    #[test]
    fn unpack_rejects_truncated_frame() {
        assert!(UpdateFrame::unpack(&[1.0, 2.0]).is_err());
        // declares one state of length 5 doubles but only provides 2
        assert!(UpdateFrame::unpack(&[0.0, 0.0, 0.0, 1.0, 5.0, 0.1, 0.2]).is_err());
    }

    #[test]
    fn unpack_rejects_trailing_garbage() {
        assert!(UpdateFrame::unpack(&[0.0, 0.0, 0.0, 0.0, 99.0]).is_err());
    }

    #[test]
    fn extract_best_objective_reads_header() {
        let state = vec![42.0, 1.0, 2.0];
        assert_eq!(42.0, extract_best_objective(&state).unwrap());
    }

    #[test]
    fn extract_best_objective_rejects_empty_payload() {
        assert!(extract_best_objective(&[]).is_err());
    }
}
