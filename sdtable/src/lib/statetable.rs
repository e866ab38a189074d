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

//! The action/goto matrix. One `i32` encodes every action:
//!
//!   * `v > SHIFT_OFFSET`: shift (or goto) to state `v - SHIFT_OFFSET`
//!   * `0 < v <= SHIFT_OFFSET`: fused shift-reduce by production `v`
//!   * `ACCEPT_OFFSET < v < 0`: reduce by production `-v`
//!   * `v == ACCEPT_OFFSET`: accept
//!   * `v == 0`: error
//!
//! Shifts are entered first, then reduces over each complete item's lookahead; a collision
//! with an existing reduce is a reduce-reduce conflict (lane tracing's cue), one with a shift
//! is resolved by precedence and associativity when AMBIGUOUS is selected and fatal otherwise.

use std::fmt;

use sdgrammar::symtab::Assoc;
use sdgrammar::{Grammar, PIdx, Symbol, TIdx};

use stategraph::{is_complete, next_sym, StateGraph};
use StIdx;

pub const SHIFT_OFFSET: i32 = 0x4000;
pub const ACCEPT_OFFSET: i32 = -0x4000;

/// A decoded action table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Shift(StIdx),
    ShiftReduce(PIdx),
    Reduce(PIdx),
    Accept,
    Error
}

pub fn decode_action(v: i32) -> Action {
    if v > SHIFT_OFFSET {
        Action::Shift(StIdx((v - SHIFT_OFFSET) as u32))
    } else if v > 0 {
        Action::ShiftReduce(PIdx(v as u32))
    } else if v == 0 {
        Action::Error
    } else if v == ACCEPT_OFFSET {
        Action::Accept
    } else {
        Action::Reduce(PIdx((-v) as u32))
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum StateTableErrorKind {
    ShiftReduceConflict { state: StIdx, token: TIdx },
    ReduceReduceConflict {
        state: StIdx,
        token: TIdx,
        p1: PIdx,
        p2: PIdx
    },
    MissingPrecedence { state: StIdx, token: TIdx },
    UnresolvableConflict { state: StIdx }
}

#[derive(Debug)]
pub struct StateTableError {
    pub kind: StateTableErrorKind
}

impl fmt::Display for StateTableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            StateTableErrorKind::ShiftReduceConflict { state, token } => write!(
                f,
                "Shift-reduce conflict in state {} on token {}",
                u32::from(state),
                u32::from(token)
            ),
            StateTableErrorKind::ReduceReduceConflict {
                state,
                token,
                p1,
                p2
            } => write!(
                f,
                "Reduce-reduce conflict in state {} on token {} between productions {} and {}",
                u32::from(state),
                u32::from(token),
                u32::from(p1),
                u32::from(p2)
            ),
            StateTableErrorKind::MissingPrecedence { state, token } => write!(
                f,
                "Ambiguity in state {} on token {} has no precedence to resolve it",
                u32::from(state),
                u32::from(token)
            ),
            StateTableErrorKind::UnresolvableConflict { state } => write!(
                f,
                "Reduce-reduce conflict in state {} cannot be repaired by state splitting",
                u32::from(state)
            )
        }
    }
}

#[derive(Debug)]
pub struct StateTable {
    /// `actions[state][column]`; row 0 is a placeholder, column layout per
    /// `Grammar::symbol_col`.
    pub actions: Vec<Vec<i32>>,
    /// Per-state continuation automaton values for error repair: positive = shift that token,
    /// negative = reduce by that production, 0 = none.
    pub repair: Vec<i32>
}

impl StateTable {
    pub fn new(grm: &Grammar, sg: &StateGraph) -> Result<StateTable, StateTableError> {
        let width = grm.cols_len();
        let mut actions = vec![vec![0i32; width]];
        for (s, st) in sg.states.iter().enumerate().skip(1) {
            let sidx = StIdx::from(s);
            let mut row = vec![0i32; width];
            for &(sym, tgt) in &st.gotos {
                row[grm.symbol_col(sym)] = SHIFT_OFFSET + u32::from(tgt) as i32;
            }
            for &(t, p) in &st.shiftreduces {
                row[grm.symbol_col(Symbol::Token(t))] = u32::from(p) as i32;
            }
            if s == 1 {
                row[grm.symbol_col(Symbol::Rule(grm.goal_rule_idx()))] = ACCEPT_OFFSET;
            }
            for it in &st.items {
                if !is_complete(grm, it.pidx, it.dot) {
                    continue;
                }
                for t in grm.iter_tidxs() {
                    if !it.lookahead[usize::from(t)] {
                        continue;
                    }
                    let col = grm.symbol_col(Symbol::Token(t));
                    let cur = row[col];
                    if cur == 0 {
                        row[col] = -(u32::from(it.pidx) as i32);
                    } else if cur < 0 && cur > ACCEPT_OFFSET {
                        let p1 = PIdx((-cur) as u32);
                        if p1 == it.pidx {
                            continue;
                        }
                        return Err(StateTableError {
                            kind: StateTableErrorKind::ReduceReduceConflict {
                                state: sidx,
                                token: t,
                                p1,
                                p2: it.pidx
                            }
                        });
                    } else {
                        // Shift (or fused shift-reduce) against reduce.
                        if !grm.cfg.ambiguous {
                            return Err(StateTableError {
                                kind: StateTableErrorKind::ShiftReduceConflict {
                                    state: sidx,
                                    token: t
                                }
                            });
                        }
                        if resolve_shift_reduce(grm, sidx, it.pidx, t)? {
                            row[col] = -(u32::from(it.pidx) as i32);
                        }
                    }
                }
            }
            actions.push(row);
        }

        let repair = if grm.cfg.error_repair {
            build_repair(grm, sg)
        } else {
            vec![0; sg.states.len()]
        };
        Ok(StateTable { actions, repair })
    }

    pub fn action(&self, sidx: StIdx, col: usize) -> i32 {
        self.actions[usize::from(sidx)][col]
    }

    pub fn states_len(&self) -> usize {
        self.actions.len() - 1
    }
}

/// Returns true if the reduce should win. Precedence of the reduce side comes from the last
/// real terminal of the reducing production; equal precedences fall back to the shift token's
/// associativity.
fn resolve_shift_reduce(
    grm: &Grammar,
    state: StIdx,
    pidx: PIdx,
    token: TIdx
) -> Result<bool, StateTableError> {
    let reduceprec = grm
        .prod(pidx)
        .rhs
        .iter()
        .rev()
        .filter_map(|sym| match *sym {
            Symbol::Token(t) if !grm.is_empty_token(t) => Some(t),
            _ => None
        })
        .next()
        .and_then(|t| grm.prec(t));
    let shiftprec = grm.prec(token);
    match (reduceprec, shiftprec) {
        (Some(rp), Some(sp)) => {
            if rp > sp {
                Ok(true)
            } else if rp < sp {
                Ok(false)
            } else {
                match grm.assoc(token) {
                    Some(Assoc::Left) => Ok(true),
                    Some(Assoc::Right) => Ok(false),
                    _ => Err(StateTableError {
                        kind: StateTableErrorKind::MissingPrecedence { state, token }
                    })
                }
            }
        }
        _ => Err(StateTableError {
            kind: StateTableErrorKind::MissingPrecedence { state, token }
        })
    }
}

/// The continuation automaton value of each state: what a repair should do here to make
/// progress. Depth-first closure over cheapest-first alternatives means the first usable item
/// is on the cheapest continuation.
fn build_repair(grm: &Grammar, sg: &StateGraph) -> Vec<i32> {
    let mut repair = vec![0i32; sg.states.len()];
    for (s, st) in sg.states.iter().enumerate().skip(1) {
        for it in &st.items {
            if is_complete(grm, it.pidx, it.dot) {
                repair[s] = -(u32::from(it.pidx) as i32);
                break;
            }
            if let Some(Symbol::Token(t)) = next_sym(grm, it.pidx, it.dot) {
                repair[s] = u32::from(t) as i32;
                break;
            }
        }
    }
    repair
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::{Grammar, Symbol};

    use super::{decode_action, Action, StateTable, StateTableErrorKind, SHIFT_OFFSET};
    use lookahead::compute_lookaheads;
    use sdgrammar::firsts::Firsts;
    use stategraph::StateGraph;
    use StIdx;

    fn build(src: &str) -> (Grammar, StateGraph, Result<StateTable, StateTableErrorKind>) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let firsts = Firsts::new(&grm);
        let mut sg = StateGraph::new(&grm);
        compute_lookaheads(&grm, &firsts, &mut sg);
        let st = StateTable::new(&grm, &sg).map_err(|e| e.kind);
        (grm, sg, st)
    }

    #[test]
    fn test_accept_and_shape() {
        let (grm, sg, st) = build(
            "IDENT t;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        let st = st.unwrap();
        assert_eq!(st.states_len(), sg.states_len());
        let goal_col = grm.symbol_col(Symbol::Rule(grm.goal_rule_idx()));
        assert_eq!(decode_action(st.action(StIdx(1), goal_col)), Action::Accept);
        // "a" shifts from state 1; eof reduces the ε production.
        let a_col = grm.symbol_col(Symbol::Token(grm.token_idx("a").unwrap()));
        match decode_action(st.action(StIdx(1), a_col)) {
            Action::Shift(_) => (),
            a => panic!("{:?}", a)
        }
        let eof_col = grm.symbol_col(Symbol::Token(grm.eof_token_idx()));
        match decode_action(st.action(StIdx(1), eof_col)) {
            Action::Reduce(p) => assert!(grm.prod(p).rhs.is_empty()),
            a => panic!("{:?}", a)
        }
    }

    #[test]
    fn test_dangling_else_shifts() {
        let (grm, sg, st) = build(
            "IDENT t;
             OPTIONS AMBIGUOUS;
             SCANNER \"if\"; \"then\", PRECEDENCE=1; \"else\", PRECEDENCE=1, ASSOCIATIVITY=RIGHT; \"x\";
             PARSER <s> = \"if\" <s> \"then\" <s> | \"if\" <s> \"then\" <s> \"else\" <s> | \"x\";"
        );
        let st = st.unwrap();
        let else_col = grm.symbol_col(Symbol::Token(grm.token_idx("else").unwrap()));
        // The state containing both "if <s> then <s> ." items must shift on "else".
        let mut found = false;
        for s in 1..=sg.states_len() {
            let both = sg.states[s]
                .items
                .iter()
                .filter(|it| usize::from(it.dot) == 4)
                .count()
                == 2;
            if both {
                found = true;
                assert!(st.action(StIdx::from(s), else_col) > SHIFT_OFFSET);
            }
        }
        assert!(found);
    }

    #[test]
    fn test_expr_precedence() {
        let (grm, sg, st) = build(
            "IDENT t;
             OPTIONS AMBIGUOUS;
             SCANNER \"+\", PRECEDENCE=1, ASSOCIATIVITY=LEFT;
                     \"*\", PRECEDENCE=2, ASSOCIATIVITY=LEFT;
                     n = [0-9]+;
             PARSER <e> = <e> \"+\" <e> | <e> \"*\" <e> | n;"
        );
        let st = st.unwrap();
        let plus = grm.token_idx("+").unwrap();
        let star = grm.token_idx("*").unwrap();
        let plus_col = grm.symbol_col(Symbol::Token(plus));
        let star_col = grm.symbol_col(Symbol::Token(star));
        // In the e + e . state: reduce on +, shift on *.
        let pp = grm
            .rule_prods(grm.rule_idx("e").unwrap())
            .iter()
            .cloned()
            .find(|&p| grm.prod(p).rhs.contains(&Symbol::Token(plus)))
            .unwrap();
        for s in 1..=sg.states_len() {
            let at_end = sg.states[s]
                .items
                .iter()
                .any(|it| it.pidx == pp && usize::from(it.dot) == 3);
            if at_end {
                match decode_action(st.action(StIdx::from(s), plus_col)) {
                    Action::Reduce(p) => assert_eq!(p, pp),
                    a => panic!("{:?}", a)
                }
                assert!(st.action(StIdx::from(s), star_col) > SHIFT_OFFSET);
            }
        }
    }

    #[test]
    fn test_shift_reduce_fatal_without_ambiguous() {
        let (_, _, st) = build(
            "IDENT t;
             SCANNER \"if\"; \"then\"; \"else\"; \"x\";
             PARSER <s> = \"if\" <s> \"then\" <s> | \"if\" <s> \"then\" <s> \"else\" <s> | \"x\";"
        );
        match st.unwrap_err() {
            StateTableErrorKind::ShiftReduceConflict { .. } => (),
            e => panic!("{:?}", e)
        }
    }

    #[test]
    fn test_reduce_reduce_detected() {
        let (_, _, st) = build(
            "IDENT t;
             SCANNER \"a\"; \"x\";
             PARSER <l> = <a> \"x\" | <b> \"x\"; <a> = \"a\"; <b> = \"a\";"
        );
        match st.unwrap_err() {
            StateTableErrorKind::ReduceReduceConflict { .. } => (),
            e => panic!("{:?}", e)
        }
    }

    #[test]
    fn test_repair_values() {
        let (grm, sg, st) = build(
            "IDENT t;
             OPTIONS ERRORREPAIR;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        let st = st.unwrap();
        // State 1's first item is goal: . <s> $eof, dot on a rule, so the scan falls through
        // to the first closure item; the cheapest <s> alternative is ε, so the repair value
        // reduces it.
        let v = st.repair[1];
        assert!(v < 0);
        assert!(grm.prod(sdgrammar::PIdx((-v) as u32)).rhs.is_empty());
        assert!(sg.states_len() + 1 == st.repair.len());
    }
}
