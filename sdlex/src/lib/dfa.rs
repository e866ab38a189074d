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

//! Subset construction and Moore minimization. Scanner states are numbered from 1; state 0 is
//! the error (absent) entry everywhere, which is also what lets the compressed form use 0 as
//! the free-cell marker. Where two tokens accept in one state the lower token number wins,
//! which by construction is the earlier declaration.

use std::collections::hash_map::Entry;

use fnv::FnvHashMap;
use vob::Vob;

use sdgrammar::ast::GrammarAST;
use sdgrammar::symtab::SymbolTable;
use sdgrammar::{Grammar, TIdx};

use nfa::Nfa;
use {LexBuildError, EOF_COL};

/// The scanner tables: everything the runtime scanner interprets, uncompressed.
pub struct LexTables {
    /// Number of real terminals; scanner finals above this are ignored-regex sentinels.
    pub tnumber: usize,
    /// Total scanner token space: `tnumber` plus the ignored-regex count.
    pub ntokens: usize,
    /// Number of DFA states; valid states are `1..=snumber`.
    pub snumber: usize,
    /// Per state, the token accepted there (0 if none).
    pub finals: Vec<u32>,
    /// Per state, the sorted token numbers whose text ends there.
    pub tokenends: Vec<Vec<u32>>,
    /// Per state, whether the accepted token's text must be captured.
    pub install: Vob,
    /// Per state, the 257-column transition row (256 is the end-of-file column).
    pub trans: Vec<Vec<u32>>
}

impl LexTables {
    pub fn new(
        grm: &Grammar,
        symtab: &SymbolTable,
        ast: &GrammarAST
    ) -> Result<LexTables, LexBuildError> {
        let nfa = Nfa::new(grm, symtab, ast)?;
        let (finals, tokenends, trans) = subset_construct(&nfa);
        let (finals, tokenends, trans) = minimize(finals, tokenends, trans);

        let snumber = finals.len() - 1;
        let mut install = Vob::from_elem(snumber + 1, false);
        for st in 1..=snumber {
            let t = finals[st];
            if t != 0 && (t as usize) <= grm.tokens_len() && grm.is_install_token(TIdx(t)) {
                install.set(st, true);
            }
        }
        Ok(LexTables {
            tnumber: grm.tokens_len(),
            ntokens: grm.tokens_len() + ast.ignores.len(),
            snumber,
            finals,
            tokenends,
            install,
            trans
        })
    }

    pub fn next_state(&self, st: usize, col: usize) -> u32 {
        self.trans[st][col]
    }
}

fn eps_closure(nfa: &Nfa, set: &mut Vec<usize>) {
    let mut i = 0;
    while i < set.len() {
        let st = set[i];
        for &e in &nfa.states[st].eps {
            if !set.contains(&e) {
                set.push(e);
            }
        }
        i += 1;
    }
    set.sort();
    set.dedup();
}

fn subset_construct(nfa: &Nfa) -> (Vec<u32>, Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let mut keys: FnvHashMap<Vec<usize>, usize> = FnvHashMap::default();
    let mut sets: Vec<Vec<usize>> = vec![Vec::new()];
    let mut start = vec![nfa.start];
    eps_closure(nfa, &mut start);
    keys.insert(start.clone(), 1);
    sets.push(start);

    let mut trans: Vec<Vec<u32>> = vec![vec![0; EOF_COL + 1]];
    let mut done = 0;
    while done + 1 < sets.len() {
        done += 1;
        let cur = sets[done].clone();
        let mut row = vec![0u32; EOF_COL + 1];
        for col in 0..=EOF_COL {
            let mut tgt = Vec::new();
            for &n in &cur {
                if col == EOF_COL {
                    if let Some(e) = nfa.states[n].eof_to {
                        tgt.push(e);
                    }
                } else {
                    for &(ref v, to) in &nfa.states[n].edges {
                        if v[col] {
                            tgt.push(to);
                        }
                    }
                }
            }
            if tgt.is_empty() {
                continue;
            }
            eps_closure(nfa, &mut tgt);
            let next = sets.len();
            let id = match keys.entry(tgt.clone()) {
                Entry::Occupied(e) => *e.get(),
                Entry::Vacant(e) => {
                    e.insert(next);
                    sets.push(tgt);
                    next
                }
            };
            row[col] = id as u32;
        }
        trans.push(row);
    }

    let mut finals = vec![0u32; sets.len()];
    let mut tokenends = vec![Vec::new(); sets.len()];
    for (i, set) in sets.iter().enumerate().skip(1) {
        for &n in set {
            if let Some(t) = nfa.states[n].accept {
                if finals[i] == 0 || t < finals[i] {
                    finals[i] = t;
                }
            }
            if let Some(t) = nfa.states[n].tokenend {
                if !tokenends[i].contains(&t) {
                    tokenends[i].push(t);
                }
            }
        }
        tokenends[i].sort();
    }
    (finals, tokenends, trans)
}

/// Moore partition refinement. The initial partition groups states whose observable outputs
/// (accepted token and token-end set) agree; each round refines by transition signature until
/// nothing changes. State 0 stays the error partition and the start state's block is
/// renumbered to 1.
fn minimize(
    finals: Vec<u32>,
    tokenends: Vec<Vec<u32>>,
    trans: Vec<Vec<u32>>
) -> (Vec<u32>, Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let n = finals.len();
    let mut block = vec![0usize; n];
    let mut nblocks;
    {
        let mut sigs: FnvHashMap<(u32, &[u32]), usize> = FnvHashMap::default();
        for st in 1..n {
            let next = sigs.len() + 1;
            let id = *sigs
                .entry((finals[st], tokenends[st].as_slice()))
                .or_insert(next);
            block[st] = id;
        }
        nblocks = sigs.len();
    }

    // Each round splits blocks by (block, successor-block row); the block count grows
    // monotonically, so an unchanged count is the fixpoint.
    loop {
        let mut sigs: FnvHashMap<(usize, Vec<usize>), usize> = FnvHashMap::default();
        let mut nxt = vec![0usize; n];
        for st in 1..n {
            let row = trans[st]
                .iter()
                .map(|&t| block[t as usize])
                .collect::<Vec<_>>();
            let next = sigs.len() + 1;
            let id = *sigs.entry((block[st], row)).or_insert(next);
            nxt[st] = id;
        }
        let new_count = sigs.len();
        block = nxt;
        if new_count == nblocks {
            break;
        }
        nblocks = new_count;
    }

    // Renumber blocks so the start state's block is 1 and representatives appear in state
    // order.
    let nblocks = block.iter().cloned().max().unwrap_or(0);
    let mut renum = vec![0usize; nblocks + 1];
    let mut next = 1;
    renum[block[1]] = 1;
    for st in 1..n {
        if renum[block[st]] == 0 {
            next += 1;
            renum[block[st]] = next;
        }
    }
    let nmin = next;

    let mut finals_m = vec![0u32; nmin + 1];
    let mut tokenends_m = vec![Vec::new(); nmin + 1];
    let mut trans_m = vec![vec![0u32; EOF_COL + 1]; nmin + 1];
    for st in 1..n {
        let b = renum[block[st]];
        finals_m[b] = finals[st];
        tokenends_m[b] = tokenends[st].clone();
        for col in 0..=EOF_COL {
            let t = trans[st][col] as usize;
            trans_m[b][col] = renum[block[t]] as u32;
        }
    }
    (finals_m, tokenends_m, trans_m)
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;

    use super::LexTables;
    use EOF_COL;

    fn build(src: &str) -> (Grammar, LexTables) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let tables = LexTables::new(&grm, &symtab, &ast).unwrap();
        (grm, tables)
    }

    /// Run the DFA over `input` with maximal munch, returning the accepted token and its
    /// length (the position of its last-crossed end marker).
    fn scan(tables: &LexTables, input: &[u8]) -> Option<(u32, usize)> {
        let mut st = 1usize;
        let mut best = None;
        let mut ends = vec![0usize; tables.ntokens + 1];
        for (i, &b) in input.iter().enumerate() {
            let nxt = tables.next_state(st, b as usize);
            if nxt == 0 {
                break;
            }
            st = nxt as usize;
            for &t in &tables.tokenends[st] {
                ends[t as usize] = i + 1;
            }
            if tables.finals[st] != 0 {
                best = Some(tables.finals[st]);
            }
        }
        best.map(|t| (t, ends[t as usize]))
    }

    #[test]
    fn test_digit_runs() {
        let (grm, tables) = build(
            "IDENT t;
             SCANNER run = { [0-9] } 2 : 4;
             PARSER <s> = run;"
        );
        let run = u32::from(grm.token_idx("run").unwrap());
        assert_eq!(scan(&tables, b"1"), None);
        assert_eq!(scan(&tables, b"12"), Some((run, 2)));
        assert_eq!(scan(&tables, b"123"), Some((run, 3)));
        assert_eq!(scan(&tables, b"1234"), Some((run, 4)));
        // Maximal munch stops at four digits.
        assert_eq!(scan(&tables, b"12345"), Some((run, 4)));
        // Three accepting states: two, three, and four digits deep.
        let accepting = (1..=tables.snumber)
            .filter(|&s| tables.finals[s] == run)
            .count();
        assert_eq!(accepting, 3);
    }

    #[test]
    fn test_keyword_beats_ident() {
        // Both accept "if"; the earlier declaration has the lower token number and wins.
        let (grm, tables) = build(
            "IDENT t;
             SCANNER \"if\"; id = [a-z]+;
             PARSER <s> = id | \"if\";"
        );
        let kw = u32::from(grm.token_idx("if").unwrap());
        let id = u32::from(grm.token_idx("id").unwrap());
        assert!(kw < id);
        assert_eq!(scan(&tables, b"if"), Some((kw, 2)));
        assert_eq!(scan(&tables, b"iffy"), Some((id, 4)));
        assert_eq!(scan(&tables, b"x"), Some((id, 1)));
    }

    #[test]
    fn test_trailing_context_rolls_back() {
        let (grm, tables) = build(
            "IDENT t;
             SCANNER num = [0-9]+ > '.'; dot = '.';
             PARSER <s> = num dot;"
        );
        let num = u32::from(grm.token_idx("num").unwrap());
        // "12." accepts num, but its end marker sits before the dot.
        assert_eq!(scan(&tables, b"12."), Some((num, 2)));
        assert_eq!(scan(&tables, b"12"), None);
    }

    #[test]
    fn test_eof_column() {
        let (_, tables) = build(
            "IDENT t;
             SCANNER \"a\";
             PARSER <s> = \"a\";"
        );
        let st = tables.next_state(1, EOF_COL);
        assert!(st != 0);
        assert_eq!(tables.finals[st as usize], 1);
    }

    #[test]
    fn test_ignore_sentinel() {
        let (grm, tables) = build(
            "IDENT t;
             SCANNER \"a\"; IGNORE = ' '+;
             PARSER <s> = \"a\";"
        );
        let (t, len) = scan(&tables, b"   ").unwrap();
        assert_eq!(len, 3);
        assert!((t as usize) > grm.tokens_len());
        assert_eq!(tables.ntokens, grm.tokens_len() + 1);
    }

    #[test]
    fn test_caseless() {
        let (grm, tables) = build(
            "IDENT t;
             SCANNER kw = 'begin', IGNORE CASE;
             PARSER <s> = kw;"
        );
        let kw = u32::from(grm.token_idx("kw").unwrap());
        assert_eq!(scan(&tables, b"BeGiN"), Some((kw, 5)));
    }
}
