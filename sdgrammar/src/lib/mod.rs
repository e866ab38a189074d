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

//! A library for manipulating translator grammars: the lexical structure (token regexes) and
//! context-free syntax (productions with semantic action markers) read from a grammar
//! specification file. It is the front half of a syntax-directed translator generator: the
//! grammar file is parsed into a symbol table, regex trees, and a raw AST; the AST is then
//! standardized into a `Grammar` whose productions carry the keys (effective length, derivation
//! steps, minimum insertion cost) that table construction and error repair depend on.
//!
//! Some terminology guidelines, since grammar terminology is something of a mess:
//!
//!   * A *terminal* is a symbol matched by the scanner; it carries a token number and token
//!     attributes (costs, precedence, flags).
//!   * A *nonterminal* maps a name to one or more *productions*.
//!   * A *production* is an ordered sequence of symbols plus an optional semantic action number.
//!   * A *definition* is a named regex fragment, expanded by copy at each use.
//!
//! sdgrammar makes the following guarantees about grammars:
//!
//!   * Terminals are numbered from `1` to `tokens_len()` (inclusive); token number 0 is
//!     reserved. The end-of-file sentinel is always token 1.
//!   * Nonterminals are numbered from `1` to `rules_len()` (inclusive); the synthetic goal
//!     nonterminal is always rule 1.
//!   * Productions are numbered from `1` to `prods_len()` (inclusive); production 1 is the
//!     synthetic start production `goal: start-rule eof`.

#[macro_use]
extern crate lazy_static;
extern crate indexmap;
extern crate num_traits;
extern crate regex;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;
extern crate vob;

mod idxnewtype;
pub mod ast;
pub mod firsts;
pub mod grammar;
pub mod parser;
pub mod rx;
pub mod symtab;

pub use grammar::{Grammar, GrammarConfig, Production};
pub use idxnewtype::{PIdx, RIdx, SIdx, SymIdx, TIdx};
pub use parser::{parse_grammar, GrammarParserError, GrammarParserErrorKind};
pub use symtab::{Assoc, SymbolKind, SymbolTable, TableAction};

/// A symbol on the right-hand side of a production.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Symbol {
    Rule(RIdx),
    Token(TIdx)
}
