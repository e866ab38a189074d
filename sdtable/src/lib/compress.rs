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

//! Row-displacement compression of both automata. The scanner form threads a default-state
//! chain: a state stores only the transitions that differ from its default's, and decoding
//! chases defaults until a `check` cell claims the column. The parser form is plain first-fit
//! displacement with no default: a missed `check` is an error entry. In both, cell ownership
//! is recorded by state number, so 0 marks a free cell and states number from 1.

use sdlex::{LexTables, EOF_COL};

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressedScanner {
    pub sdefault: Vec<u32>,
    pub sbase: Vec<u32>,
    pub check: Vec<u32>,
    pub next: Vec<u32>
}

impl CompressedScanner {
    pub fn decode(&self, st: u32, col: usize) -> u32 {
        let mut s = st;
        while s != 0 {
            let idx = self.sbase[s as usize] as usize + col;
            if idx < self.check.len() && self.check[idx] == s {
                return self.next[idx];
            }
            s = self.sdefault[s as usize];
        }
        0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressedParser {
    pub pbase: Vec<u32>,
    pub check: Vec<u32>,
    pub next: Vec<i32>
}

impl CompressedParser {
    pub fn decode(&self, st: u32, col: usize) -> i32 {
        let idx = self.pbase[st as usize] as usize + col;
        if idx < self.check.len() && self.check[idx] == st {
            self.next[idx]
        } else {
            0
        }
    }
}

const WIDTH: usize = EOF_COL + 1;

pub fn compress_scanner(lex: &LexTables) -> CompressedScanner {
    let n = lex.snumber;
    let mut mismatch = vec![vec![0usize; n + 1]; n + 1];
    for s in 1..=n {
        for t in s + 1..=n {
            let mut m = 0;
            for c in 0..WIDTH {
                if lex.trans[s][c] != lex.trans[t][c] {
                    m += 1;
                }
            }
            mismatch[s][t] = m;
            mismatch[t][s] = m;
        }
    }

    // Insert states in ascending order of mean mismatch: look-alike states then cluster onto
    // short default chains.
    let mut order: Vec<usize> = (1..=n).collect();
    order.sort_by_key(|&s| {
        let sum: usize = (1..=n).filter(|&t| t != s).map(|t| mismatch[s][t]).sum();
        if n > 1 {
            sum / (n - 1)
        } else {
            0
        }
    });

    let mut sdefault = vec![0u32; n + 1];
    let mut sbase = vec![0u32; n + 1];
    let mut chainlen = vec![0u32; n + 1];
    let mut check: Vec<u32> = Vec::new();
    let mut next: Vec<u32> = Vec::new();
    let mut inserted: Vec<usize> = Vec::new();

    for &s in &order {
        let (def, cols) = if inserted.is_empty() {
            (0usize, (0..WIDTH).collect::<Vec<_>>())
        } else {
            let def = inserted
                .iter()
                .cloned()
                .min_by_key(|&d| mismatch[s][d])
                .unwrap();
            let cols = (0..WIDTH)
                .filter(|&c| lex.trans[s][c] != lex.trans[def][c])
                .collect::<Vec<_>>();
            (def, cols)
        };
        let base = first_fit(&check, &cols);
        for &c in &cols {
            ensure(&mut check, &mut next, base + c + 1);
            check[base + c] = s as u32;
            next[base + c] = lex.trans[s][c];
        }
        sdefault[s] = def as u32;
        sbase[s] = base as u32;
        chainlen[s] = if def == 0 { 1 } else { chainlen[def] + 1 };
        inserted.push(s);
    }

    // Claim leftover free cells for the longest chains first: the entry decodes identically
    // but without chasing the chain.
    let mut bychain: Vec<usize> = (1..=n).collect();
    bychain.sort_by(|&a, &b| chainlen[b].cmp(&chainlen[a]));
    for s in bychain {
        for c in 0..WIDTH {
            let idx = sbase[s] as usize + c;
            ensure(&mut check, &mut next, idx + 1);
            if check[idx] == 0 {
                check[idx] = s as u32;
                next[idx] = lex.trans[s][c];
            }
        }
    }

    CompressedScanner {
        sdefault,
        sbase,
        check,
        next
    }
}

pub fn compress_parser(actions: &[Vec<i32>]) -> CompressedParser {
    let n = actions.len() - 1;
    let mut order: Vec<usize> = (1..=n).collect();
    // Densest rows first.
    order.sort_by_key(|&s| actions[s].iter().filter(|&&v| v != 0).count());
    order.reverse();

    let mut pbase = vec![0u32; n + 1];
    let mut check: Vec<u32> = Vec::new();
    let mut next: Vec<i32> = Vec::new();
    for &s in &order {
        let cols: Vec<usize> = (0..actions[s].len())
            .filter(|&c| actions[s][c] != 0)
            .collect();
        let base = first_fit(&check, &cols);
        for &c in &cols {
            ensure(&mut check, &mut next, base + c + 1);
            check[base + c] = s as u32;
            next[base + c] = actions[s][c];
        }
        pbase[s] = base as u32;
    }
    CompressedParser { pbase, check, next }
}

/// Smallest displacement whose cells are all free for `cols`.
fn first_fit(check: &[u32], cols: &[usize]) -> usize {
    let mut base = 0;
    'search: loop {
        for &c in cols {
            if base + c < check.len() && check[base + c] != 0 {
                base += 1;
                continue 'search;
            }
        }
        return base;
    }
}

fn ensure<T: Default + Clone>(check: &mut Vec<u32>, next: &mut Vec<T>, len: usize) {
    if check.len() < len {
        check.resize(len, 0);
    }
    if next.len() < len {
        next.resize(len, T::default());
    }
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;
    use sdlex::LexTables;

    use super::{compress_parser, compress_scanner, WIDTH};
    use from_grammar;

    fn build(src: &str) -> (Grammar, LexTables) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let lex = LexTables::new(&grm, &symtab, &ast).unwrap();
        (grm, lex)
    }

    const SRC: &'static str = "IDENT t;
         SCANNER int = [0-9]+; id = [a-z]+; \"+\"; \"(\"; \")\"; IGNORE = ' '+;
         DEFAULT START = <e>;
         PARSER <e> = <e> \"+\" <t> | <t>; <t> = \"(\" <e> \")\" | int | id;";

    #[test]
    fn test_scanner_roundtrip() {
        let (_, lex) = build(SRC);
        let cs = compress_scanner(&lex);
        for s in 1..=lex.snumber {
            for c in 0..WIDTH {
                assert_eq!(
                    cs.decode(s as u32, c),
                    lex.trans[s][c],
                    "state {} col {}",
                    s,
                    c
                );
            }
        }
    }

    #[test]
    fn test_parser_roundtrip_and_check_invariant() {
        let (symtab, ast) = parse_grammar(SRC).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let (_sg, st) = from_grammar(&grm).unwrap();
        let cp = compress_parser(&st.actions);
        for s in 1..st.actions.len() {
            for c in 0..st.actions[s].len() {
                assert_eq!(cp.decode(s as u32, c), st.actions[s][c]);
                let idx = cp.pbase[s] as usize + c;
                if st.actions[s][c] != 0 {
                    assert_eq!(cp.check[idx], s as u32);
                } else if idx < cp.check.len() {
                    assert!(cp.check[idx] != s as u32);
                }
            }
        }
    }

    #[test]
    fn test_default_chain_is_acyclic() {
        let (_, lex) = build(SRC);
        let cs = compress_scanner(&lex);
        for s in 1..=lex.snumber {
            let mut seen = vec![false; lex.snumber + 1];
            let mut cur = s;
            while cur != 0 {
                assert!(!seen[cur], "default chain cycle at {}", cur);
                seen[cur] = true;
                cur = cs.sdefault[cur] as usize;
            }
        }
    }
}
