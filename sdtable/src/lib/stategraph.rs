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

//! The canonical LR(0) collection. States own their itemsets (kernel items first, closure
//! items after) and goto lists; items carry the ancestor/descendant links and follow sets the
//! lookahead and lane-tracing passes work over. Closure is depth-first, so with error repair
//! enabled (where rule alternatives are sorted cheapest-first) the first item of a state is
//! always on the cheapest continuation path. Dots are normalized past ε-terminals on every
//! move: those symbols are never shifted.

use fnv::FnvHashMap;
use vob::Vob;

use sdgrammar::{Grammar, PIdx, RIdx, SIdx, Symbol, TIdx};

use StIdx;

#[derive(Clone, Debug)]
pub struct Item {
    pub pidx: PIdx,
    pub dot: SIdx,
    /// (state, item) pairs that shift into this item.
    pub ancestors: Vec<(StIdx, usize)>,
    /// The (state, item) reached by shifting past the dot.
    pub descendant: Option<(StIdx, usize)>,
    /// Follow produced purely by the grammar's structure around this item, over real tokens.
    pub spontaneous: Vob,
    /// The full LALR(1) lookahead once propagation has run.
    pub lookahead: Vob,
    /// Kernel items only: (state, item) targets this item's lookahead propagates to.
    pub updates: Vec<(StIdx, usize)>,
    /// Closure items only: kernel items of this state whose markers reached this item.
    pub sources: Vec<usize>
}

impl Item {
    fn new(pidx: PIdx, dot: SIdx, ntokens: usize) -> Item {
        Item {
            pidx,
            dot,
            ancestors: Vec::new(),
            descendant: None,
            spontaneous: Vob::from_elem(ntokens + 1, false),
            lookahead: Vob::from_elem(ntokens + 1, false),
            updates: Vec::new(),
            sources: Vec::new()
        }
    }
}

#[derive(Clone, Debug)]
pub struct State {
    /// Kernel items first (`kernel_len` of them), closure items after, in depth-first order.
    pub items: Vec<Item>,
    pub kernel_len: usize,
    pub gotos: Vec<(Symbol, StIdx)>,
    /// Fused shift-reduce actions: no goto state exists for these terminals.
    pub shiftreduces: Vec<(TIdx, PIdx)>
}

#[derive(Debug)]
pub struct StateGraph {
    /// Indexed by `StIdx`; entry 0 is a placeholder.
    pub states: Vec<State>
}

/// Skip the dot past ε-terminals; they are never shifted.
pub fn norm_dot(grm: &Grammar, pidx: PIdx, dot: SIdx) -> SIdx {
    let rhs = &grm.prod(pidx).rhs;
    let mut d = usize::from(dot);
    while d < rhs.len() {
        match rhs[d] {
            Symbol::Token(t) if grm.is_empty_token(t) => d += 1,
            _ => break
        }
    }
    SIdx::from(d)
}

/// The symbol after the dot, or `None` when the item is ready to reduce.
pub fn next_sym(grm: &Grammar, pidx: PIdx, dot: SIdx) -> Option<Symbol> {
    let prod = grm.prod(pidx);
    if dot < prod.efflen {
        Some(prod.rhs[usize::from(dot)])
    } else {
        None
    }
}

/// Is the item's dot at (or past) the effective end?
pub fn is_complete(grm: &Grammar, pidx: PIdx, dot: SIdx) -> bool {
    dot >= grm.prod(pidx).efflen
}

fn close_rule(grm: &Grammar, items: &mut Vec<Item>, ridx: RIdx, ntokens: usize) {
    for &pidx in grm.rule_prods(ridx) {
        let dot = norm_dot(grm, pidx, SIdx(0));
        if items.iter().any(|it| it.pidx == pidx && it.dot == dot) {
            continue;
        }
        items.push(Item::new(pidx, dot, ntokens));
        if let Some(Symbol::Rule(r)) = next_sym(grm, pidx, dot) {
            close_rule(grm, items, r, ntokens);
        }
    }
}

/// Close a kernel in depth-first order.
fn closure(grm: &Grammar, items: &mut Vec<Item>, ntokens: usize) {
    let kernel_len = items.len();
    for k in 0..kernel_len {
        let (pidx, dot) = (items[k].pidx, items[k].dot);
        if let Some(Symbol::Rule(r)) = next_sym(grm, pidx, dot) {
            close_rule(grm, items, r, ntokens);
        }
    }
}

impl StateGraph {
    pub fn new(grm: &Grammar) -> StateGraph {
        let ntokens = grm.tokens_len();
        let mut sg = StateGraph {
            states: vec![State {
                items: Vec::new(),
                kernel_len: 0,
                gotos: Vec::new(),
                shiftreduces: Vec::new()
            }]
        };

        let mut keys: FnvHashMap<Vec<(PIdx, SIdx)>, StIdx> = FnvHashMap::default();
        let d0 = norm_dot(grm, PIdx(1), SIdx(0));
        let mut items0 = vec![Item::new(PIdx(1), d0, ntokens)];
        closure(grm, &mut items0, ntokens);
        keys.insert(kernel_key(grm, &[(PIdx(1), d0)]), StIdx(1));
        sg.states.push(State {
            items: items0,
            kernel_len: 1,
            gotos: Vec::new(),
            shiftreduces: Vec::new()
        });

        let mut cur = 1;
        while cur < sg.states.len() {
            let sidx = StIdx::from(cur);
            // Goto symbols in first-appearance order over the itemset.
            let mut symbols: Vec<Symbol> = Vec::new();
            for it in &sg.states[cur].items {
                if let Some(sym) = next_sym(grm, it.pidx, it.dot) {
                    if !symbols.contains(&sym) {
                        symbols.push(sym);
                    }
                }
            }
            for sym in symbols {
                let contrib: Vec<usize> = sg.states[cur]
                    .items
                    .iter()
                    .enumerate()
                    .filter(|&(_, it)| next_sym(grm, it.pidx, it.dot) == Some(sym))
                    .map(|(i, _)| i)
                    .collect();
                let advanced: Vec<(PIdx, SIdx)> = contrib
                    .iter()
                    .map(|&i| {
                        let it = &sg.states[cur].items[i];
                        (it.pidx, norm_dot(grm, it.pidx, SIdx::from(usize::from(it.dot) + 1)))
                    })
                    .collect();

                // A lone terminal item whose advance completes the production becomes a fused
                // shift-reduce: no goto state is generated at all.
                if let Symbol::Token(t) = sym {
                    if grm.cfg.default_reduce && contrib.len() == 1 {
                        let (pidx, adot) = advanced[0];
                        if is_complete(grm, pidx, adot) && pidx != PIdx(1) {
                            sg.states[cur].shiftreduces.push((t, pidx));
                            continue;
                        }
                    }
                }

                let key = kernel_key(grm, &advanced);
                let tgt = match keys.get(&key).cloned() {
                    Some(t) => t,
                    None => {
                        let mut items: Vec<Item> = advanced
                            .iter()
                            .map(|&(p, d)| Item::new(p, d, ntokens))
                            .collect();
                        let kernel_len = items.len();
                        closure(grm, &mut items, ntokens);
                        let t = StIdx::from(sg.states.len());
                        sg.states.push(State {
                            items,
                            kernel_len,
                            gotos: Vec::new(),
                            shiftreduces: Vec::new()
                        });
                        keys.insert(key, t);
                        t
                    }
                };
                sg.states[cur].gotos.push((sym, tgt));
                for (k, &ci) in contrib.iter().enumerate() {
                    let (p, d) = advanced[k];
                    let j = sg.states[usize::from(tgt)].items[..sg.states[usize::from(tgt)]
                        .kernel_len]
                        .iter()
                        .position(|it| it.pidx == p && it.dot == d)
                        .expect("advanced item missing from target kernel");
                    sg.states[cur].items[ci].descendant = Some((tgt, j));
                    sg.states[usize::from(tgt)].items[j].ancestors.push((sidx, ci));
                }
            }
            cur += 1;
        }
        sg
    }

    pub fn states_len(&self) -> usize {
        self.states.len() - 1
    }

    pub fn state(&self, sidx: StIdx) -> &State {
        &self.states[usize::from(sidx)]
    }

    /// Recompute every ancestor/descendant link from the goto lists. The kernel itemsets are
    /// stable under this re-derivation; the splitter relies on it after cloning and rewiring.
    pub fn relink(&mut self, grm: &Grammar) {
        for st in self.states.iter_mut() {
            for it in st.items.iter_mut() {
                it.ancestors.clear();
                it.descendant = None;
            }
        }
        for cur in 1..self.states.len() {
            let sidx = StIdx::from(cur);
            let gotos = self.states[cur].gotos.clone();
            for (sym, tgt) in gotos {
                let contrib: Vec<usize> = self.states[cur]
                    .items
                    .iter()
                    .enumerate()
                    .filter(|&(_, it)| next_sym(grm, it.pidx, it.dot) == Some(sym))
                    .map(|(i, _)| i)
                    .collect();
                for ci in contrib {
                    let (p, d) = {
                        let it = &self.states[cur].items[ci];
                        (it.pidx, norm_dot(grm, it.pidx, SIdx::from(usize::from(it.dot) + 1)))
                    };
                    let j = match self.states[usize::from(tgt)].items
                        [..self.states[usize::from(tgt)].kernel_len]
                        .iter()
                        .position(|it| it.pidx == p && it.dot == d)
                    {
                        Some(j) => j,
                        None => continue
                    };
                    self.states[cur].items[ci].descendant = Some((tgt, j));
                    self.states[usize::from(tgt)].items[j].ancestors.push((sidx, ci));
                }
            }
        }
    }
}

fn kernel_key(grm: &Grammar, kernel: &[(PIdx, SIdx)]) -> Vec<(PIdx, SIdx)> {
    let mut key = kernel.to_vec();
    // With error repair the itemset order is semantically significant (it drives repair
    // continuations), so states are only identified when their kernels agree in order.
    if !grm.cfg.error_repair {
        key.sort();
    }
    key
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::{Grammar, PIdx, SIdx, Symbol};

    use super::{next_sym, StateGraph};
    use StIdx;

    pub fn build(src: &str) -> (Grammar, StateGraph) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let sg = StateGraph::new(&grm);
        (grm, sg)
    }

    #[test]
    fn test_start_state() {
        let (_grm, sg) = build(
            "IDENT t;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        let s1 = sg.state(StIdx(1));
        assert_eq!(s1.kernel_len, 1);
        assert_eq!(s1.items[0].pidx, PIdx(1));
        assert_eq!(s1.items[0].dot, SIdx(0));
        // Closure adds both productions of <s>.
        assert_eq!(s1.items.len(), 3);
    }

    #[test]
    fn test_goto_links() {
        let (grm, sg) = build(
            "IDENT t;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        let s1 = sg.state(StIdx(1));
        let a = grm.token_idx("a").unwrap();
        let tgt = s1
            .gotos
            .iter()
            .find(|&&(sym, _)| sym == Symbol::Token(a))
            .map(|&(_, t)| t)
            .unwrap();
        let ts = sg.state(tgt);
        // Shifting "a" lands in <s> = "a" . <s> "b" whose ancestors point back at state 1.
        assert!(ts.items[..ts.kernel_len]
            .iter()
            .any(|it| it.dot == SIdx(1)));
        assert!(ts.items[0].ancestors.iter().any(|&(s, _)| s == StIdx(1)));
        // Recursion: the goto target for "a" from ts is ts itself.
        let tgt2 = ts
            .gotos
            .iter()
            .find(|&&(sym, _)| sym == Symbol::Token(a))
            .map(|&(_, t)| t)
            .unwrap();
        assert_eq!(tgt2, tgt);
    }

    #[test]
    fn test_kernel_stable_under_relink() {
        let (grm, mut sg) = build(
            "IDENT t;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        let before: Vec<Vec<(PIdx, SIdx)>> = sg
            .states
            .iter()
            .map(|st| st.items.iter().map(|it| (it.pidx, it.dot)).collect())
            .collect();
        let anc_counts: Vec<usize> = sg
            .states
            .iter()
            .map(|st| st.items.iter().map(|it| it.ancestors.len()).sum())
            .collect();
        sg.relink(&grm);
        let after: Vec<Vec<(PIdx, SIdx)>> = sg
            .states
            .iter()
            .map(|st| st.items.iter().map(|it| (it.pidx, it.dot)).collect())
            .collect();
        let anc_counts2: Vec<usize> = sg
            .states
            .iter()
            .map(|st| st.items.iter().map(|it| it.ancestors.len()).sum())
            .collect();
        assert_eq!(before, after);
        assert_eq!(anc_counts, anc_counts2);
    }

    #[test]
    fn test_shiftreduce_fusion() {
        let (grm, sg) = build(
            "IDENT t;
             OPTIONS SHIFTREDUCE;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";"
        );
        // Shifting "b" in the state holding <s> = "a" <s> . "b" completes the production, so
        // it is fused rather than given its own state.
        let fused = sg
            .states
            .iter()
            .skip(1)
            .any(|st| {
                st.shiftreduces
                    .iter()
                    .any(|&(t, _)| t == grm.token_idx("b").unwrap())
            });
        assert!(fused);
        // No state holds the completed item.
        let bp = grm
            .rule_prods(grm.rule_idx("s").unwrap())
            .iter()
            .cloned()
            .find(|&p| grm.prod(p).rhs.len() == 3)
            .unwrap();
        assert!(!sg.states.iter().skip(1).any(|st| {
            st.items
                .iter()
                .any(|it| it.pidx == bp && usize::from(it.dot) == 3)
        }));
    }

    #[test]
    fn test_empty_terminal_not_shifted() {
        let (grm, sg) = build(
            "IDENT t;
             SCANNER \"a\"; mark, EMPTY;
             PARSER <s> = \"a\" mark;"
        );
        let mark = grm.token_idx("mark").unwrap();
        for st in sg.states.iter().skip(1) {
            assert!(st
                .gotos
                .iter()
                .all(|&(sym, _)| sym != Symbol::Token(mark)));
            for it in &st.items {
                assert!(next_sym(&grm, it.pidx, it.dot) != Some(Symbol::Token(mark)));
            }
        }
    }
}
