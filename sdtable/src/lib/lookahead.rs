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

//! Exact LALR(1) lookaheads by the marker-terminal technique. Within each state, every kernel
//! item is tagged with a synthetic marker terminal (token `tokens_len() + 1 + kernel_index`)
//! and follow sets are propagated across the closure: an item whose dot sits on a nonterminal
//! injects `FIRST(tail)` into that nonterminal's closure items, plus its own follow set when
//! the tail is nullable. After the in-state fixpoint, real-token bits become the *spontaneous*
//! follow of the closure item itself and of its shift descendant — a complete closure item (an
//! ε production's) has no descendant and reduces right here, so its own copy is the only one —
//! and marker bits turn into the update graph: kernel item k propagates its lookahead to the
//! descendant of every closure item its marker reached (and to its own descendant). A global
//! fixpoint over the update graph then yields the full lookaheads; closure items materialize
//! theirs from their own spontaneous follow plus their in-state kernel sources at the end.

use vob::Vob;

use sdgrammar::firsts::Firsts;
use sdgrammar::{Grammar, SIdx, Symbol};

use stategraph::{next_sym, norm_dot, StateGraph};
use StIdx;

pub fn compute_lookaheads(grm: &Grammar, firsts: &Firsts, sg: &mut StateGraph) {
    let ntokens = grm.tokens_len();

    for st in sg.states.iter_mut().skip(1) {
        for it in st.items.iter_mut() {
            it.spontaneous = Vob::from_elem(ntokens + 1, false);
            it.lookahead = Vob::from_elem(ntokens + 1, false);
            it.updates.clear();
            it.sources.clear();
        }
    }

    for cur in 1..sg.states.len() {
        state_follow(grm, firsts, sg, cur);
    }

    // Seed and run the global propagation fixpoint. The update graph can contain cycles, but
    // each round either adds a token bit somewhere or is the last, so the round count is
    // bounded by items * states; anything beyond that means the graph is corrupt.
    let nstates = sg.states.len();
    let nitems: usize = sg.states.iter().map(|st| st.items.len()).sum();
    for st in sg.states.iter_mut().skip(1) {
        for it in st.items.iter_mut() {
            it.lookahead = it.spontaneous.clone();
        }
    }
    let eof = usize::from(grm.eof_token_idx());
    sg.states[1].items[0].lookahead.set(eof, true);

    let mut rounds = 0;
    loop {
        let mut changed = false;
        for s in 1..nstates {
            let klen = sg.states[s].kernel_len;
            for k in 0..klen {
                if sg.states[s].items[k].updates.is_empty() {
                    continue;
                }
                let la = sg.states[s].items[k].lookahead.clone();
                let targets = sg.states[s].items[k].updates.clone();
                for (ts, ti) in targets {
                    if sg.states[usize::from(ts)].items[ti].lookahead.or(&la) {
                        changed = true;
                    }
                }
            }
        }
        rounds += 1;
        assert!(
            rounds <= nitems * nstates + 1,
            "lookahead propagation failed to terminate"
        );
        if !changed {
            break;
        }
    }

    // Closure items pick up their kernel sources' final lookaheads.
    for s in 1..nstates {
        let klen = sg.states[s].kernel_len;
        for i in klen..sg.states[s].items.len() {
            let srcs = sg.states[s].items[i].sources.clone();
            for k in srcs {
                let la = sg.states[s].items[k].lookahead.clone();
                sg.states[s].items[i].lookahead.or(&la);
            }
        }
    }
}

/// The in-state marker pass for one state: fills in descendants' spontaneous follows, closure
/// items' `sources`, and kernel items' update edges.
fn state_follow(grm: &Grammar, firsts: &Firsts, sg: &mut StateGraph, cur: usize) {
    let ntokens = grm.tokens_len();
    let (klen, nitems) = (sg.states[cur].kernel_len, sg.states[cur].items.len());
    let width = ntokens + 1 + klen;

    let mut work: Vec<Vob> = (0..nitems).map(|_| Vob::from_elem(width, false)).collect();
    for k in 0..klen {
        work[k].set(ntokens + 1 + k, true);
    }

    loop {
        let mut changed = false;
        for i in 0..nitems {
            let (pidx, dot) = {
                let it = &sg.states[cur].items[i];
                (it.pidx, it.dot)
            };
            let r = match next_sym(grm, pidx, dot) {
                Some(Symbol::Rule(r)) => r,
                _ => continue
            };
            let mut inject = Vob::from_elem(width, false);
            let nullable = {
                let mut tail_first = Vob::from_elem(ntokens + 1, false);
                let rhs = &grm.prod(pidx).rhs;
                let nullable =
                    firsts.firsts_of_seq(grm, &rhs[usize::from(dot) + 1..], &mut tail_first);
                for t in 0..ntokens + 1 {
                    if tail_first[t] {
                        inject.set(t, true);
                    }
                }
                nullable
            };
            if nullable {
                let w = work[i].clone();
                inject.or(&w);
            }
            for j in klen..nitems {
                let matches = {
                    let it = &sg.states[cur].items[j];
                    grm.prod(it.pidx).lhs == r && it.dot == norm_dot(grm, it.pidx, SIdx(0))
                };
                if matches && work[j].or(&inject) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // Distribute: real bits to the item's own spontaneous follow and its descendant's,
    // marker bits into the update graph.
    let mut spont: Vec<((StIdx, usize), Vob)> = Vec::new();
    for i in 0..nitems {
        let desc = sg.states[cur].items[i].descendant;
        let mut real = Vob::from_elem(ntokens + 1, false);
        for b in 0..ntokens + 1 {
            if work[i][b] {
                real.set(b, true);
            }
        }
        if i >= klen {
            // A complete closure item (ε production) has no descendant; this copy is the
            // only one it gets.
            sg.states[cur].items[i].spontaneous.or(&real);
            for b in ntokens + 1..width {
                if !work[i][b] {
                    continue;
                }
                let k = b - ntokens - 1;
                sg.states[cur].items[i].sources.push(k);
                if let Some(d) = desc {
                    if !sg.states[cur].items[k].updates.contains(&d) {
                        sg.states[cur].items[k].updates.push(d);
                    }
                }
            }
        } else if let Some(d) = desc {
            // A kernel item trivially propagates to its own descendant.
            if !sg.states[cur].items[i].updates.contains(&d) {
                sg.states[cur].items[i].updates.push(d);
            }
        }
        if let Some(d) = desc {
            spont.push((d, real));
        }
    }
    for ((ts, ti), v) in spont {
        sg.states[usize::from(ts)].items[ti].spontaneous.or(&v);
    }
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::{Grammar, SIdx, Symbol, TIdx};

    use super::compute_lookaheads;
    use sdgrammar::firsts::Firsts;
    use stategraph::{is_complete, StateGraph};

    fn build(src: &str) -> (Grammar, StateGraph) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let firsts = Firsts::new(&grm);
        let mut sg = StateGraph::new(&grm);
        compute_lookaheads(&grm, &firsts, &mut sg);
        (grm, sg)
    }

    fn has_la(grm: &Grammar, sg: &StateGraph, rule: &str, toks: &[&str]) -> bool {
        // Find any complete item for `rule` whose lookahead is exactly `toks`.
        let ridx = grm.rule_idx(rule).unwrap();
        for st in sg.states.iter().skip(1) {
            for it in &st.items {
                if grm.prod(it.pidx).lhs != ridx || !is_complete(grm, it.pidx, it.dot) {
                    continue;
                }
                let mut ok = true;
                for tidx in grm.iter_tidxs() {
                    let expect = toks.iter().any(|n| *n == grm.token_name(tidx));
                    if it.lookahead[usize::from(tidx)] != expect {
                        ok = false;
                        break;
                    }
                }
                if ok {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn test_epsilon_lookahead_per_state() {
        let (grm, sg) = build(
            "IDENT t;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        // In state 1 the ε reduce is followed by eof; under \"a\" it is followed by \"b\".
        let s1 = &sg.states[1];
        let eps = s1
            .items
            .iter()
            .find(|it| grm.prod(it.pidx).rhs.is_empty())
            .unwrap();
        assert!(eps.lookahead[usize::from(grm.eof_token_idx())]);
        let b = grm.token_idx("b").unwrap();
        assert!(!eps.lookahead[usize::from(b)]);

        let a = grm.token_idx("a").unwrap();
        let tgt = s1
            .gotos
            .iter()
            .find(|&&(sym, _)| sym == Symbol::Token(a))
            .map(|&(_, t)| t)
            .unwrap();
        let eps2 = sg
            .state(tgt)
            .items
            .iter()
            .find(|it| grm.prod(it.pidx).rhs.is_empty())
            .unwrap();
        assert!(eps2.lookahead[usize::from(b)]);
        assert!(!eps2.lookahead[usize::from(grm.eof_token_idx())]);
    }

    #[test]
    fn test_dragon_grammar_lookaheads() {
        // The classic LALR example: S -> L = R | R; L -> * R | id; R -> L. The lone R -> L .
        // state (reached under '*' and '=') carries both '=' and eof; the one merged with
        // S -> L . = R carries eof alone.
        let (grm, sg) = build(
            "IDENT t;
             SCANNER \"=\"; \"*\"; id = [a-z]+;
             DEFAULT START = <s>;
             PARSER
             <s> = <l> \"=\" <r> | <r>;
             <l> = \"*\" <r> | id;
             <r> = <l>;"
        );
        assert!(has_la(&grm, &sg, "r", &["=", "$eof"]));
        // And the R -> L reduce reached after '=' sees only eof.
        assert!(has_la(&grm, &sg, "r", &["$eof"]));
    }

    #[test]
    fn test_goal_item_gets_eof() {
        let (grm, sg) = build(
            "IDENT t;
             SCANNER \"a\";
             PARSER <s> = \"a\";"
        );
        assert_eq!(sg.states[1].items[0].dot, SIdx(0));
        assert!(sg.states[1].items[0].lookahead[usize::from(TIdx(1))]);
        assert_eq!(grm.eof_token_idx(), TIdx(1));
    }
}
