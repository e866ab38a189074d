// Copyright (c) 2017 King's College London
// created by the Software Development Team <http://soft-dev.org/>
//
// The Universal Permissive License (UPL), Version 1.0
//
// Subject to the condition set forth below, permission is hereby granted to any person obtaining a
// copy of this software, associated documentation and/or data (collectively the "Software"), free
// of charge and under any and all copyright rights in the Software, and any and all patent rights
// owned or freely licensable by each licensor hereunder covering either (i) the unmodified
// Software as contributed to or provided by such licensor, or (ii) the Larger Works (as defined
// below), to deal in both
//
// (a) the Software, and
// (b) any piece of software and/or hardware listed in the lrgrwrks.txt file
// if one is included with the Software (each a "Larger Work" to which the Software is contributed
// by such licensors),
//
// without restriction, including without limitation the rights to copy, create derivative works
// of, display, perform, and distribute the Software and make, use, sell, offer for sale, import,
// export, have made, and have sold the Software and the Larger Work(s), and to sublicense the
// foregoing rights on either these or other terms.
//
// This license is subject to the following condition: The above copyright notice and either this
// complete permission notice or at a minimum a reference to the UPL must be included in all copies
// or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! LALR(1) table construction: the LR(0) collection and its gotos, exact LALR(1) lookaheads by
//! the marker-terminal spontaneous/propagated technique, lane-trace state splitting for
//! reduce-reduce conflicts, precedence resolution for shift-reduce conflicts, per-state
//! error-repair values, row-displacement compression of scanner and parser automata, and the
//! persisted tables file both ends of the tool agree on.

extern crate fnv;
#[macro_use]
extern crate macro_attr;
#[macro_use]
extern crate newtype_derive;
extern crate num_traits;
extern crate sdgrammar;
extern crate sdlex;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;
extern crate vob;

use std::mem::size_of;

pub mod compress;
pub mod lookahead;
pub mod splitter;
pub mod stategraph;
pub mod statetable;
pub mod tablefile;

pub use stategraph::StateGraph;
pub use statetable::{Action, StateTable, StateTableError, StateTableErrorKind};
pub use tablefile::{Tables, TablesError};

use sdgrammar::firsts::Firsts;
use sdgrammar::Grammar;

macro_attr! {
    /// A type specifically for CFSM state indices. State 1 holds the start kernel; 0 is used
    /// as "no state" in runtime encodings.
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, NewtypeFrom!)]
    pub struct StIdx(u32);
}

impl From<StIdx> for usize {
    fn from(StIdx(v): StIdx) -> usize {
        debug_assert!(size_of::<usize>() >= size_of::<u32>());
        num_traits::cast(v).unwrap()
    }
}

impl From<usize> for StIdx {
    fn from(v: usize) -> StIdx {
        debug_assert!(num_traits::cast::<usize, u32>(v).is_some());
        StIdx(v as u32)
    }
}

/// How many split-then-rebuild rounds are attempted before a conflict is declared
/// unrepairable.
const SPLIT_ROUNDS: usize = 8;

/// Build the stategraph and statetable for a grammar, splitting states on reduce-reduce
/// conflicts when SPLITSTATES is selected.
pub fn from_grammar(grm: &Grammar) -> Result<(StateGraph, StateTable), StateTableError> {
    let firsts = Firsts::new(grm);
    let mut sg = StateGraph::new(grm);
    lookahead::compute_lookaheads(grm, &firsts, &mut sg);
    let mut rounds = 0;
    loop {
        match StateTable::new(grm, &sg) {
            Ok(st) => return Ok((sg, st)),
            Err(e) => {
                let retry = match e.kind {
                    StateTableErrorKind::ReduceReduceConflict { .. } => {
                        grm.cfg.split_states && rounds < SPLIT_ROUNDS
                    }
                    _ => false
                };
                if !retry {
                    return Err(e);
                }
                splitter::split_states(grm, &mut sg)?;
                lookahead::compute_lookaheads(grm, &firsts, &mut sg);
                rounds += 1;
            }
        }
    }
}
