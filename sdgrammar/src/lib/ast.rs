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

//! The raw result of parsing a grammar file: a symbol table populated with every name the file
//! mentions, plus this AST recording section contents in declaration order. `Grammar::new`
//! consumes both to build the standardized production list.

use std::fmt;

use grammar::GrammarConfig;
use idxnewtype::SymIdx;
use rx::{Regex, RegexOp};
use symtab::{SymbolKind, SymbolTable};

#[derive(Debug)]
pub struct GrammarAST {
    pub ident: String,
    pub title: Option<String>,
    pub config: GrammarConfig,
    /// DEFAULT START, stored as the nonterminal's symbol.
    pub start: Option<SymIdx>,
    /// SCANNER declarations in order: terminals, aliases, and ε-terminals alike.
    pub tokens: Vec<TokenDecl>,
    /// Ignored regexes: matches are consumed silently.
    pub ignores: Vec<Regex>,
    /// PARSER entries: (LHS nonterminal, alternation tree). One entry per nonterminal; later
    /// sections for the same LHS are merged into the first.
    pub prods: Vec<(SymIdx, Regex)>
}

#[derive(Debug)]
pub struct TokenDecl {
    pub sym: SymIdx,
    /// `None` for ε-terminals and aliases (an alias scans with its own regex recorded here if
    /// it has one, otherwise it is a pure cost/flag variant).
    pub regex: Option<Regex>
}

impl GrammarAST {
    pub fn new() -> GrammarAST {
        GrammarAST {
            ident: String::new(),
            title: None,
            config: GrammarConfig::default(),
            start: None,
            tokens: Vec::new(),
            ignores: Vec::new(),
            prods: Vec::new()
        }
    }

    /// Check the parsed grammar for structural errors the parser itself can't see: every
    /// nonterminal referenced in a production body must have productions of its own, the start
    /// symbol must be defined, and ε-terminals may only appear as a trailing run of a
    /// right-hand side.
    pub fn validate(&self, symtab: &SymbolTable) -> Result<(), GrammarValidationError> {
        if self.prods.is_empty() {
            return Err(GrammarValidationError {
                kind: GrammarValidationErrorKind::NoProductions,
                sym: None
            });
        }
        if let Some(start) = self.start {
            if !self.prods.iter().any(|&(lhs, _)| lhs == start) {
                return Err(GrammarValidationError {
                    kind: GrammarValidationErrorKind::UndefinedStart,
                    sym: Some(symtab.sym(start).name.clone())
                });
            }
        }
        for &(_, ref tree) in &self.prods {
            self.validate_tree(symtab, tree)?;
        }
        Ok(())
    }

    fn validate_tree(
        &self,
        symtab: &SymbolTable,
        tree: &Regex
    ) -> Result<(), GrammarValidationError> {
        match *tree {
            Regex::Reference(sym) => {
                let entry = symtab.sym(sym);
                if entry.kind == SymbolKind::Nonterminal
                    && !self.prods.iter().any(|&(lhs, _)| lhs == sym)
                {
                    return Err(GrammarValidationError {
                        kind: GrammarValidationErrorKind::UndefinedRule,
                        sym: Some(entry.name.clone())
                    });
                }
                Ok(())
            }
            Regex::Node(_, ref children) => {
                for c in children {
                    self.validate_tree(symtab, c)?;
                }
                // ε-terminals must form a trailing run of each concatenation: everything the
                // parser never shifts has to sit past the effective length.
                if let Regex::Node(RegexOp::Cat, ref children) = *tree {
                    let mut seen_nonempty_after = false;
                    for c in children.iter().rev() {
                        match *c {
                            Regex::Reference(sym) => {
                                let empty = symtab
                                    .sym(sym)
                                    .attrs()
                                    .map(|a| a.empty)
                                    .unwrap_or(false);
                                if empty && seen_nonempty_after {
                                    return Err(GrammarValidationError {
                                        kind: GrammarValidationErrorKind::EmptyNotTrailing,
                                        sym: Some(symtab.sym(sym).name.clone())
                                    });
                                }
                                if !empty {
                                    seen_nonempty_after = true;
                                }
                            }
                            Regex::Semantic(_) | Regex::Epsilon => (),
                            _ => ()
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(())
        }
    }
}

#[derive(Debug)]
pub struct GrammarValidationError {
    pub kind: GrammarValidationErrorKind,
    pub sym: Option<String>
}

#[derive(Debug, Eq, PartialEq)]
pub enum GrammarValidationErrorKind {
    NoProductions,
    UndefinedRule,
    UndefinedStart,
    EmptyNotTrailing
}

impl fmt::Display for GrammarValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self.kind {
            GrammarValidationErrorKind::NoProductions => "Grammar has no productions",
            GrammarValidationErrorKind::UndefinedRule => "Nonterminal has no productions",
            GrammarValidationErrorKind::UndefinedStart => "Start symbol has no productions",
            GrammarValidationErrorKind::EmptyNotTrailing => {
                "ε-terminal is followed by a normal symbol"
            }
        };
        match self.sym {
            Some(ref name) => write!(f, "{}: {}", s, name),
            None => write!(f, "{}", s)
        }
    }
}
