// Copyright (c) 2018 King's College London
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

//! Lane tracing. A reduce-reduce conflict is only a fact about the *merged* lookaheads of one
//! state; tracing walks each conflicting item backwards through its ancestors, accumulating
//! the spontaneous follow found along each distinct predecessor context. If every context
//! separates the lanes, the conflict is a merging artefact: the state (and the interior of
//! each extra context's path) is cloned so each context keeps its own lookaheads, and the
//! LALR construction is re-run over the rewired graph. If any context fails to separate, the
//! grammar is genuinely ambiguous there and parser generation is abandoned.
//!
//! Lanes within one trace move in lock-step through the same predecessor state: a goto that
//! produced the conflict state's kernel advanced an item into *every* kernel item, so each
//! lane always finds its ancestors in the shared predecessor. Tips are item *sets*: a closure
//! item is replaced by all the kernel items whose markers reached it, and a trace forks into
//! one copy per predecessor state.

use vob::Vob;

use sdgrammar::Grammar;

use stategraph::{is_complete, StateGraph};
use statetable::{StateTableError, StateTableErrorKind};
use StIdx;

/// Live traces beyond this are treated as a failure to separate.
const MAX_TRACES: usize = 256;

#[derive(Clone)]
struct Lane {
    /// Current tip items (indices into the tip state's itemset).
    items: Vec<usize>,
    /// Accumulated spontaneous follow over real tokens.
    follow: Vob,
    complete: bool
}

#[derive(Clone)]
struct Trace {
    /// path[0] is the conflict state; the last entry is where the tips live.
    path: Vec<StIdx>,
    lanes: Vec<Lane>
}

/// Split states to remove the first reduce-reduce conflict found. Returns `Ok` if the graph
/// was rewired (the caller must then recompute lookaheads and rebuild the table) and an
/// unrepairable-conflict error otherwise.
pub fn split_states(grm: &Grammar, sg: &mut StateGraph) -> Result<(), StateTableError> {
    let (conflict, collisions) = match find_conflict(grm, sg) {
        Some(c) => c,
        None => {
            // The caller saw a conflict the lookaheads no longer show; nothing to do.
            return Ok(());
        }
    };
    for items in collisions {
        let paths = trace_collision(grm, sg, conflict, &items)?;
        apply_split(sg, &paths);
    }
    sg.relink(grm);
    Ok(())
}

/// The first state holding a reduce-reduce conflict, with its reduce items grouped into
/// collisions (connected components under lookahead overlap).
fn find_conflict(grm: &Grammar, sg: &StateGraph) -> Option<(StIdx, Vec<Vec<usize>>)> {
    for s in 1..sg.states.len() {
        let st = &sg.states[s];
        let reduces: Vec<usize> = st
            .items
            .iter()
            .enumerate()
            .filter(|&(_, it)| is_complete(grm, it.pidx, it.dot))
            .map(|(i, _)| i)
            .collect();
        if reduces.len() < 2 {
            continue;
        }
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for &i in &reduces {
            let mut joined = None;
            for (g, group) in groups.iter().enumerate() {
                if group
                    .iter()
                    .any(|&j| intersects(&st.items[i].lookahead, &st.items[j].lookahead))
                {
                    joined = Some(g);
                    break;
                }
            }
            match joined {
                Some(g) => groups[g].push(i),
                None => groups.push(vec![i])
            }
        }
        let collisions: Vec<Vec<usize>> = groups.into_iter().filter(|g| g.len() > 1).collect();
        if !collisions.is_empty() {
            return Some((StIdx::from(s), collisions));
        }
    }
    None
}

fn intersects(a: &Vob, b: &Vob) -> bool {
    let n = ::std::cmp::min(a.len(), b.len());
    (0..n).any(|i| a[i] && b[i])
}

fn trace_collision(
    grm: &Grammar,
    sg: &StateGraph,
    conflict: StIdx,
    reduce_items: &[usize]
) -> Result<Vec<Vec<StIdx>>, StateTableError> {
    let ntokens = grm.tokens_len();
    let cstate = &sg.states[usize::from(conflict)];
    let mut init = Trace {
        path: vec![conflict],
        lanes: Vec::new()
    };
    for &i in reduce_items {
        let mut follow = Vob::from_elem(ntokens + 1, false);
        if i >= cstate.kernel_len {
            follow.or(&cstate.items[i].spontaneous);
        }
        init.lanes.push(Lane {
            items: vec![i],
            follow,
            complete: false
        });
    }

    let mut work = vec![init];
    let mut successes: Vec<Vec<StIdx>> = Vec::new();
    while let Some(mut trace) = work.pop() {
        loop {
            let tip = *trace.path.last().unwrap();
            let tip_state = &sg.states[usize::from(tip)];

            // Walk closure tips back to the kernel items that propagate into them. A tip
            // with no kernel sources is fully accounted for by spontaneous follow.
            for lane in trace.lanes.iter_mut() {
                if lane.complete {
                    continue;
                }
                let mut kern: Vec<usize> = Vec::new();
                for &i in &lane.items {
                    if i >= tip_state.kernel_len {
                        for &k in &tip_state.items[i].sources {
                            if !kern.contains(&k) {
                                kern.push(k);
                            }
                        }
                    } else if !kern.contains(&i) {
                        kern.push(i);
                    }
                }
                if kern.is_empty() {
                    lane.complete = true;
                }
                lane.items = kern;
            }

            // Success: accumulated follows (widened by open tips' lookaheads) pairwise
            // disjoint.
            let effs: Vec<Vob> = trace
                .lanes
                .iter()
                .map(|lane| {
                    let mut v = lane.follow.clone();
                    if !lane.complete {
                        for &i in &lane.items {
                            v.or(&tip_state.items[i].lookahead);
                        }
                    }
                    v
                })
                .collect();
            let mut disjoint = true;
            'outer: for a in 0..effs.len() {
                for b in a + 1..effs.len() {
                    if intersects(&effs[a], &effs[b]) {
                        disjoint = false;
                        break 'outer;
                    }
                }
            }
            if disjoint {
                if !successes.contains(&trace.path) {
                    successes.push(trace.path.clone());
                }
                break;
            }
            if trace.lanes.iter().all(|l| l.complete) {
                return Err(StateTableError {
                    kind: StateTableErrorKind::UnresolvableConflict { state: conflict }
                });
            }

            // Fork one copy per predecessor state, lanes in lock-step.
            let mut preds: Vec<StIdx> = Vec::new();
            for lane in &trace.lanes {
                if lane.complete {
                    continue;
                }
                for &i in &lane.items {
                    for &(ps, _) in &tip_state.items[i].ancestors {
                        if !preds.contains(&ps) {
                            preds.push(ps);
                        }
                    }
                }
            }
            if preds.is_empty() {
                for lane in trace.lanes.iter_mut() {
                    lane.complete = true;
                }
                continue;
            }
            for &p in &preds[1..] {
                let forked = fork_trace(sg, &trace, p);
                work.push(forked);
            }
            let p0 = preds[0];
            trace = fork_trace(sg, &trace, p0);
            if work.len() + successes.len() > MAX_TRACES {
                return Err(StateTableError {
                    kind: StateTableErrorKind::UnresolvableConflict { state: conflict }
                });
            }
        }
    }

    Ok(successes)
}

/// Move a trace's tips into predecessor `p`, accumulating the spontaneous follow of the
/// closure items entered there. Re-entering a state already on the path would loop, so such a
/// fork's lanes are closed off instead.
fn fork_trace(sg: &StateGraph, trace: &Trace, p: StIdx) -> Trace {
    let mut out = trace.clone();
    let tip = *trace.path.last().unwrap();
    let tip_state = &sg.states[usize::from(tip)];
    let looping = trace.path.contains(&p);
    let pstate = &sg.states[usize::from(p)];
    for lane in out.lanes.iter_mut() {
        if lane.complete {
            continue;
        }
        if looping {
            lane.complete = true;
            continue;
        }
        let mut nitems: Vec<usize> = Vec::new();
        for &i in &lane.items {
            for &(ps, pi) in &tip_state.items[i].ancestors {
                if ps != p || nitems.contains(&pi) {
                    continue;
                }
                nitems.push(pi);
                if pi >= pstate.kernel_len {
                    lane.follow.or(&pstate.items[pi].spontaneous);
                }
            }
        }
        if nitems.is_empty() {
            lane.complete = true;
        }
        lane.items = nitems;
    }
    if !looping {
        out.path.push(p);
    }
    out
}

/// Clone interior path states for every context beyond the first and rewire the deepest
/// state's gotos into the clones, so each context reaches its own copy of the conflict state.
fn apply_split(sg: &mut StateGraph, paths: &[Vec<StIdx>]) {
    for path in paths.iter().skip(1) {
        if path.len() < 2 {
            continue;
        }
        // Clone everything except the deepest state.
        let mut clones: Vec<StIdx> = Vec::new();
        for &orig in &path[..path.len() - 1] {
            let cloned = sg.states[usize::from(orig)].clone();
            let new_idx = StIdx::from(sg.states.len());
            sg.states.push(cloned);
            clones.push(new_idx);
        }
        // Rewire parent -> child edges along the path: the parent's copy (or, for the
        // deepest, the original) routes into the child's copy.
        for i in 0..path.len() - 1 {
            let child = path[i];
            let parent_ref = if i + 1 < path.len() - 1 {
                clones[i + 1]
            } else {
                path[i + 1]
            };
            let clone_of_child = clones[i];
            for &mut (_, ref mut tgt) in
                sg.states[usize::from(parent_ref)].gotos.iter_mut()
            {
                if *tgt == child {
                    *tgt = clone_of_child;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;

    use from_grammar;
    use statetable::StateTableErrorKind;
    use stategraph::StateGraph;

    fn grammar(src: &str) -> Grammar {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        Grammar::new(&symtab, &ast)
    }

    #[test]
    fn test_lalr_but_not_lr1_splits_by_one_state() {
        // The classic 4-context grammar: LALR merges the state after "c" from both the "a"
        // and "b" contexts, manufacturing a reduce-reduce conflict LR(1) does not have. Lane
        // tracing separates the contexts and adds exactly one state.
        let src = "IDENT t;
             OPTIONS SPLITSTATES;
             SCANNER \"a\"; \"b\"; \"c\"; \"d\"; \"e\";
             PARSER
             <s> = \"a\" <x> \"d\" | \"a\" <y> \"e\" | \"b\" <x> \"e\" | \"b\" <y> \"d\";
             <x> = \"c\";
             <y> = \"c\";";
        let grm = grammar(src);
        let unsplit = StateGraph::new(&grm);
        let (sg, _st) = from_grammar(&grm).unwrap();
        assert_eq!(sg.states_len(), unsplit.states_len() + 1);
    }

    #[test]
    fn test_ambiguous_reduce_reduce_is_unrepairable() {
        // Both productions of <l> reduce an "a" under lookahead "x": no amount of splitting
        // can separate them.
        let src = "IDENT t;
             OPTIONS SPLITSTATES;
             SCANNER \"a\"; \"x\";
             PARSER <l> = <a> \"x\" | <b> \"x\"; <a> = \"a\"; <b> = \"a\";";
        let grm = grammar(src);
        match from_grammar(&grm).unwrap_err().kind {
            StateTableErrorKind::UnresolvableConflict { .. } => (),
            e => panic!("{:?}", e)
        }
    }

    #[test]
    fn test_epsilon_reduce_conflict_splits() {
        // Two ε rules whose reduces only conflict because the state after "c" merges the "a"
        // and "b" contexts: their lookaheads arrive purely through nullable-tail marker
        // propagation, and the per-context spontaneous follow of the <w>/<v> closure items
        // ({d} against {e} under "a", {e} against {d} under "b") is what the lanes must
        // recover. One clone of the merged state separates them.
        let src = "IDENT t;
             OPTIONS SPLITSTATES;
             SCANNER \"a\"; \"b\"; \"c\"; \"d\"; \"e\";
             PARSER
             <s> = \"a\" <w> \"d\" | \"a\" <v> \"e\" | \"b\" <w> \"e\" | \"b\" <v> \"d\";
             <w> = \"c\" <x>;
             <v> = \"c\" <y>;
             <x> = \"\";
             <y> = \"\";";
        let grm = grammar(src);
        let unsplit = StateGraph::new(&grm);
        let (sg, st) = from_grammar(&grm).unwrap();
        assert_eq!(sg.states_len(), unsplit.states_len() + 1);
        assert_eq!(st.states_len(), sg.states_len());
    }

    #[test]
    fn test_epsilon_reduce_conflict_unrepairable() {
        // Both ε reduces happen in one unmerged state under the same follow "c": no context
        // separates them, so lane tracing must refuse rather than split.
        let src = "IDENT t;
             OPTIONS SPLITSTATES;
             SCANNER \"a\"; \"c\";
             PARSER <s> = \"a\" <x> \"c\" | \"a\" <y> \"c\"; <x> = \"\"; <y> = \"\";";
        let grm = grammar(src);
        match from_grammar(&grm).unwrap_err().kind {
            StateTableErrorKind::UnresolvableConflict { .. } => (),
            e => panic!("{:?}", e)
        }
    }

    #[test]
    fn test_split_table_is_conflict_free() {
        let src = "IDENT t;
             OPTIONS SPLITSTATES;
             SCANNER \"a\"; \"b\"; \"c\"; \"d\"; \"e\";
             PARSER
             <s> = \"a\" <x> \"d\" | \"a\" <y> \"e\" | \"b\" <x> \"e\" | \"b\" <y> \"d\";
             <x> = \"c\";
             <y> = \"c\";";
        let grm = grammar(src);
        let (sg, st) = from_grammar(&grm).unwrap();
        // Every state/token cell decodes without panicking and the goto rewiring kept the
        // table square.
        assert_eq!(st.states_len(), sg.states_len());
    }
}
