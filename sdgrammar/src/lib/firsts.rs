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

use vob::Vob;

use grammar::Grammar;
use idxnewtype::{RIdx, TIdx};
use Symbol;

/// `Firsts` stores all the FIRST sets and nullability bits for a given grammar. Each rule's
/// set is a `Vob` over token numbers (bit 0 unused). ε-terminals never reach the input, so
/// they are transparent here: a rule whose productions consist only of ε-terminals is
/// nullable.
#[derive(Debug)]
pub struct Firsts {
    firsts: Vec<Vob>,
    epsilons: Vob
}

impl Firsts {
    /// Generates and returns the FIRST sets for the given grammar.
    pub fn new(grm: &Grammar) -> Self {
        let mut firsts = Vec::with_capacity(grm.rules_len() + 1);
        for _ in 0..grm.rules_len() + 1 {
            firsts.push(Vob::from_elem(grm.tokens_len() + 1, false));
        }
        let mut epsilons = Vob::from_elem(grm.rules_len() + 1, false);
        loop {
            let mut changed = false;
            for pidx in grm.iter_pidxs() {
                let ridx = grm.prod(pidx).lhs;
                let mut nullable = true;
                for sym in &grm.prod(pidx).rhs {
                    match *sym {
                        Symbol::Token(tidx) => {
                            if grm.is_empty_token(tidx) {
                                continue;
                            }
                            if firsts[usize::from(ridx)].set(usize::from(tidx), true) {
                                changed = true;
                            }
                            nullable = false;
                            break;
                        }
                        Symbol::Rule(s_ridx) => {
                            let v = firsts[usize::from(s_ridx)].clone();
                            if firsts[usize::from(ridx)].or(&v) {
                                changed = true;
                            }
                            if !epsilons[usize::from(s_ridx)] {
                                nullable = false;
                                break;
                            }
                        }
                    }
                }
                if nullable && epsilons.set(usize::from(ridx), true) {
                    changed = true;
                }
            }
            if !changed {
                return Firsts { firsts, epsilons };
            }
        }
    }

    /// Return the FIRST `Vob` for rule `ridx`.
    pub fn firsts(&self, ridx: RIdx) -> &Vob {
        &self.firsts[usize::from(ridx)]
    }

    /// Returns true if the token `tidx` is in the FIRST set for rule `ridx`.
    pub fn is_set(&self, ridx: RIdx, tidx: TIdx) -> bool {
        self.firsts[usize::from(ridx)][usize::from(tidx)]
    }

    pub fn is_epsilon_set(&self, ridx: RIdx) -> bool {
        self.epsilons[usize::from(ridx)]
    }

    /// Union FIRST of the symbol sequence `syms` into `out`, returning whether the whole
    /// sequence can derive ε. This is what lookahead construction needs for the tail past a
    /// closure item's dot.
    pub fn firsts_of_seq(&self, grm: &Grammar, syms: &[Symbol], out: &mut Vob) -> bool {
        for sym in syms {
            match *sym {
                Symbol::Token(tidx) => {
                    if grm.is_empty_token(tidx) {
                        continue;
                    }
                    out.set(usize::from(tidx), true);
                    return false;
                }
                Symbol::Rule(ridx) => {
                    out.or(self.firsts(ridx));
                    if !self.is_epsilon_set(ridx) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::Firsts;
    use grammar::Grammar;
    use parser::parse_grammar;

    fn build(src: &str) -> (Grammar, Firsts) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let firsts = Firsts::new(&grm);
        (grm, firsts)
    }

    fn has(grm: &Grammar, firsts: &Firsts, rn: &str, should_be: &[&str]) {
        let ridx = grm.rule_idx(rn).unwrap();
        for tidx in grm.iter_tidxs() {
            let n = grm.token_name(tidx);
            if should_be.iter().any(|x| *x == n) {
                if !firsts.is_set(ridx, tidx) {
                    panic!("{} is not set in {}", n, rn);
                }
            } else if firsts.is_set(ridx, tidx) {
                panic!("{} is incorrectly set in {}", n, rn);
            }
        }
    }

    #[test]
    fn test_firsts() {
        // Adapted from p2 of https://www.cs.uaf.edu/~cs331/notes/FirstFollow.pdf
        let (grm, firsts) = build(
            "IDENT t;
             SCANNER \"+\"; \"*\"; \"(\"; \")\"; id = [a-z]+;
             DEFAULT START = <e>;
             PARSER
             <e> = <t> <e2>;
             <e2> = \"+\" <t> <e2> | \"\";
             <t> = <f> <t2>;
             <t2> = \"*\" <f> <t2> | \"\";
             <f> = \"(\" <e> \")\" | id;"
        );
        has(&grm, &firsts, "e", &["(", "id"]);
        has(&grm, &firsts, "e2", &["+"]);
        has(&grm, &firsts, "t", &["(", "id"]);
        has(&grm, &firsts, "t2", &["*"]);
        has(&grm, &firsts, "f", &["(", "id"]);
        assert!(firsts.is_epsilon_set(grm.rule_idx("e2").unwrap()));
        assert!(firsts.is_epsilon_set(grm.rule_idx("t2").unwrap()));
        assert!(!firsts.is_epsilon_set(grm.rule_idx("f").unwrap()));
    }

    #[test]
    fn test_self_referential() {
        let (grm, firsts) = build(
            "IDENT t;
             SCANNER \"a\";
             PARSER <s> = <s> \"a\" | \"a\";"
        );
        has(&grm, &firsts, "s", &["a"]);
        assert!(!firsts.is_epsilon_set(grm.rule_idx("s").unwrap()));
    }
}
