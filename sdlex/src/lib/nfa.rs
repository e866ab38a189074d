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

//! Thompson construction. The NFA is an arena of states; every token (and ignored regex)
//! contributes one alternative hanging off the root. A token's *end marker* is the state
//! reached when its text is complete: for ordinary regexes that is its accepting state, for
//! trailing-context regexes it is the cut point, and the runtime rolls the input position back
//! to wherever the marker was last crossed.

use vob::Vob;

use sdgrammar::ast::GrammarAST;
use sdgrammar::rx::{Regex, RegexOp};
use sdgrammar::symtab::SymbolTable;
use sdgrammar::{Grammar, Symbol};

use {LexBuildError, LexBuildErrorKind};

pub struct NfaState {
    pub eps: Vec<usize>,
    pub edges: Vec<(Vob, usize)>,
    pub eof_to: Option<usize>,
    /// Token number accepted here, if any.
    pub accept: Option<u32>,
    /// Token number whose text ends here, if any.
    pub tokenend: Option<u32>
}

pub struct Nfa {
    pub states: Vec<NfaState>,
    pub start: usize
}

impl Nfa {
    /// Combine every scanner declaration of `ast` into a single NFA. Token numbers come from
    /// the standardized grammar; ignored regexes are tagged `tokens_len() + 1` onwards.
    pub fn new(
        grm: &Grammar,
        symtab: &SymbolTable,
        ast: &GrammarAST
    ) -> Result<Nfa, LexBuildError> {
        let mut nfa = Nfa {
            states: Vec::new(),
            start: 0
        };
        nfa.add_state();

        // The eof sentinel is token 1 and always scannable.
        let acc = nfa.add_state();
        nfa.states[acc].accept = Some(1);
        nfa.states[acc].tokenend = Some(1);
        let pre = nfa.add_state();
        nfa.states[pre].eof_to = Some(acc);
        nfa.states[0].eps.push(pre);

        for decl in &ast.tokens {
            let re = match decl.regex {
                Some(ref re) => re,
                None => continue
            };
            let entry = symtab.sym(decl.sym);
            let token = match grm.sym_symbol(decl.sym) {
                Some(Symbol::Token(tidx)) => u32::from(tidx),
                _ => continue
            };
            let caseless = entry.attrs().map(|a| a.caseless).unwrap_or(false);
            nfa.add_alternative(re, token, caseless, &entry.name)?;
        }
        for (i, re) in ast.ignores.iter().enumerate() {
            let token = (grm.tokens_len() + 1 + i) as u32;
            nfa.add_alternative(re, token, false, "IGNORE")?;
        }
        Ok(nfa)
    }

    fn add_state(&mut self) -> usize {
        self.states.push(NfaState {
            eps: Vec::new(),
            edges: Vec::new(),
            eof_to: None,
            accept: None,
            tokenend: None
        });
        self.states.len() - 1
    }

    fn add_alternative(
        &mut self,
        re: &Regex,
        token: u32,
        caseless: bool,
        name: &str
    ) -> Result<(), LexBuildError> {
        let (start, end) = match *re {
            // Trailing context: the end marker sits at the cut, the accept past the context.
            Regex::Node(RegexOp::Look, ref children) => {
                let (s1, e1) = self.frag(&children[0], caseless, name)?;
                let (s2, e2) = self.frag(&children[1], caseless, name)?;
                self.states[e1].tokenend = Some(token);
                self.states[e1].eps.push(s2);
                (s1, e2)
            }
            ref re => {
                let (s, e) = self.frag(re, caseless, name)?;
                self.states[e].tokenend = Some(token);
                (s, e)
            }
        };
        self.states[end].accept = Some(token);
        let root = self.start;
        self.states[root].eps.push(start);
        Ok(())
    }

    fn frag(
        &mut self,
        re: &Regex,
        caseless: bool,
        name: &str
    ) -> Result<(usize, usize), LexBuildError> {
        match *re {
            Regex::Epsilon => {
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].eps.push(e);
                Ok((s, e))
            }
            Regex::Character(ref bytes) => {
                let s = self.add_state();
                let mut cur = s;
                for &b in bytes {
                    let nxt = self.add_state();
                    self.states[cur].edges.push((byte_class(b, caseless), nxt));
                    cur = nxt;
                }
                Ok((s, cur))
            }
            Regex::Class(ref v) => {
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].edges.push((fold_class(v, caseless), e));
                Ok((s, e))
            }
            Regex::ZeroByte => {
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].edges.push((byte_class(0, false), e));
                Ok((s, e))
            }
            Regex::EndOfFile => {
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].eof_to = Some(e);
                Ok((s, e))
            }
            Regex::Node(RegexOp::Cat, ref children) => {
                let s = self.add_state();
                let mut cur = s;
                for c in children {
                    let (cs, ce) = self.frag(c, caseless, name)?;
                    self.states[cur].eps.push(cs);
                    cur = ce;
                }
                Ok((s, cur))
            }
            Regex::Node(RegexOp::Alt, ref children) => {
                let s = self.add_state();
                let e = self.add_state();
                for c in children {
                    let (cs, ce) = self.frag(c, caseless, name)?;
                    self.states[s].eps.push(cs);
                    self.states[ce].eps.push(e);
                }
                Ok((s, e))
            }
            Regex::Node(RegexOp::Star, ref children) => {
                let (cs, ce) = self.frag(&children[0], caseless, name)?;
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].eps.push(cs);
                self.states[s].eps.push(e);
                self.states[ce].eps.push(cs);
                self.states[ce].eps.push(e);
                Ok((s, e))
            }
            Regex::Node(RegexOp::Plus, ref children) => {
                let (cs, ce) = self.frag(&children[0], caseless, name)?;
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].eps.push(cs);
                self.states[ce].eps.push(cs);
                self.states[ce].eps.push(e);
                Ok((s, e))
            }
            Regex::Node(RegexOp::Opt, ref children) => {
                let (cs, ce) = self.frag(&children[0], caseless, name)?;
                let s = self.add_state();
                let e = self.add_state();
                self.states[s].eps.push(cs);
                self.states[s].eps.push(e);
                self.states[ce].eps.push(e);
                Ok((s, e))
            }
            Regex::Node(RegexOp::Diff, _) | Regex::Node(RegexOp::Not, _) => {
                match re.byte_set() {
                    Some(v) => {
                        let s = self.add_state();
                        let e = self.add_state();
                        self.states[s].edges.push((fold_class(&v, caseless), e));
                        Ok((s, e))
                    }
                    None => Err(LexBuildError {
                        kind: LexBuildErrorKind::NotSingleByte,
                        token: name.to_owned()
                    })
                }
            }
            Regex::Repeat(ref inner, m, n) => {
                let s = self.add_state();
                let e = self.add_state();
                let mut cur = s;
                let mut skips = Vec::new();
                for k in 0..n {
                    if k >= m {
                        skips.push(cur);
                    }
                    let (cs, ce) = self.frag(inner, caseless, name)?;
                    self.states[cur].eps.push(cs);
                    cur = ce;
                }
                self.states[cur].eps.push(e);
                for sk in skips {
                    self.states[sk].eps.push(e);
                }
                Ok((s, e))
            }
            Regex::Node(RegexOp::Look, _) => Err(LexBuildError {
                kind: LexBuildErrorKind::NestedLookahead,
                token: name.to_owned()
            }),
            Regex::Lookahead | Regex::Reference(_) | Regex::Semantic(_) => Err(LexBuildError {
                kind: LexBuildErrorKind::IllegalRegex,
                token: name.to_owned()
            })
        }
    }
}

fn byte_class(b: u8, caseless: bool) -> Vob {
    let mut v = Vob::from_elem(256, false);
    v.set(b as usize, true);
    if caseless {
        if (b as char).is_ascii_lowercase() {
            v.set(b.to_ascii_uppercase() as usize, true);
        } else if (b as char).is_ascii_uppercase() {
            v.set(b.to_ascii_lowercase() as usize, true);
        }
    }
    v
}

fn fold_class(v: &Vob, caseless: bool) -> Vob {
    let mut out = v.clone();
    if caseless {
        for b in 0..=255u8 {
            if v[b as usize] {
                if (b as char).is_ascii_lowercase() {
                    out.set(b.to_ascii_uppercase() as usize, true);
                } else if (b as char).is_ascii_uppercase() {
                    out.set(b.to_ascii_lowercase() as usize, true);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;

    use super::Nfa;

    #[test]
    fn test_build() {
        let (symtab, ast) = parse_grammar(
            "IDENT t;
             SCANNER int = [0-9]+; IGNORE = ' '+;
             PARSER <s> = int;"
        )
        .unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let nfa = Nfa::new(&grm, &symtab, &ast).unwrap();
        // Alternatives: eof, int, and the ignore regex.
        assert_eq!(nfa.states[nfa.start].eps.len(), 3);
        let int_tok = u32::from(grm.token_idx("int").unwrap());
        assert!(nfa
            .states
            .iter()
            .any(|s| s.accept == Some(int_tok) && s.tokenend == Some(int_tok)));
        // The ignore alternative is tagged past the real token range.
        assert!(nfa
            .states
            .iter()
            .any(|s| s.accept == Some((grm.tokens_len() + 1) as u32)));
    }

    #[test]
    fn test_nested_lookahead_rejected() {
        let (symtab, ast) = parse_grammar(
            "IDENT t;
             SCANNER x = ('a' > 'b') 'c';
             PARSER <s> = x;"
        )
        .unwrap();
        let grm = Grammar::new(&symtab, &ast);
        assert!(Nfa::new(&grm, &symtab, &ast).is_err());
    }
}
