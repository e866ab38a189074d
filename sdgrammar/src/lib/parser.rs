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

//! The grammar-file parser. Sections appear in fixed order:
//!
//! ```text
//! IDENT name ;
//! TITLE "string" ;
//! OPTIONS AMBIGUOUS, ERRORREPAIR, SHIFTREDUCE, SPLITSTATES ;
//! DEFINE   name = regex ; ...
//! SCANNER  token-decl ; ...
//! DEFAULT  START = <name> ; COST = n ; CONTEXT = n ; ...
//! PARSER   <name> = rhs | rhs ; ...
//! ```
//!
//! `%…%` comments may appear wherever whitespace may. This parser is itself hand-written (the
//! generator is bootstrapped); it interns every name it meets into the symbol table and leaves
//! section contents in a `GrammarAST` for standardization.

use std::fmt;

use regex::Regex as LexRegex;

use ast::{GrammarAST, TokenDecl};
use idxnewtype::SymIdx;
use rx::{Regex, RegexOp};
use symtab::{Assoc, SymData, SymbolKind, SymbolTable, TableAction};

#[derive(Debug, Eq, PartialEq)]
pub enum GrammarParserErrorKind {
    IllegalCharacter,
    PrematureEnd,
    ExpectedIdent,
    ExpectedChar(char),
    ExpectedSection(&'static str),
    UnknownOption,
    UnknownAttribute,
    UnknownDefault,
    MissingQuote,
    IllegalEscape,
    InvalidRange,
    EmptyClass,
    UnterminatedComment,
    DuplicateToken,
    DuplicateDefinition,
    UndefinedName,
    AliasOfAlias,
    MissingRegex,
    EmptyTokenWithRegex,
    RepeatBounds
}

/// The various different possible grammar parser errors, with the line and column the problem
/// was detected at.
#[derive(Debug)]
pub struct GrammarParserError {
    pub kind: GrammarParserErrorKind,
    pub line: usize,
    pub col: usize
}

impl fmt::Display for GrammarParserError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self.kind {
            GrammarParserErrorKind::IllegalCharacter => "Illegal character".to_owned(),
            GrammarParserErrorKind::PrematureEnd => "File ends prematurely".to_owned(),
            GrammarParserErrorKind::ExpectedIdent => "Expected an identifier".to_owned(),
            GrammarParserErrorKind::ExpectedChar(c) => format!("Expected '{}'", c),
            GrammarParserErrorKind::ExpectedSection(s) => format!("Expected {} section", s),
            GrammarParserErrorKind::UnknownOption => "Unknown option".to_owned(),
            GrammarParserErrorKind::UnknownAttribute => "Unknown token attribute".to_owned(),
            GrammarParserErrorKind::UnknownDefault => "Unknown default".to_owned(),
            GrammarParserErrorKind::MissingQuote => "Missing quote".to_owned(),
            GrammarParserErrorKind::IllegalEscape => "Illegal escape sequence".to_owned(),
            GrammarParserErrorKind::InvalidRange => "Invalid character range".to_owned(),
            GrammarParserErrorKind::EmptyClass => "Empty character class".to_owned(),
            GrammarParserErrorKind::UnterminatedComment => "Unterminated comment".to_owned(),
            GrammarParserErrorKind::DuplicateToken => "Token is already declared".to_owned(),
            GrammarParserErrorKind::DuplicateDefinition => {
                "Definition is already declared".to_owned()
            }
            GrammarParserErrorKind::UndefinedName => "Undefined name".to_owned(),
            GrammarParserErrorKind::AliasOfAlias => "Alias of an alias".to_owned(),
            GrammarParserErrorKind::MissingRegex => "Token has no regex".to_owned(),
            GrammarParserErrorKind::EmptyTokenWithRegex => {
                "ε-token must not have a regex".to_owned()
            }
            GrammarParserErrorKind::RepeatBounds => "Invalid repeat bounds".to_owned()
        };
        write!(f, "{} at line {} column {}", s, self.line, self.col)
    }
}

pub fn parse_grammar(src: &str) -> Result<(SymbolTable, GrammarAST), GrammarParserError> {
    let mut gp = GrammarParser {
        src,
        symtab: SymbolTable::new(),
        ast: GrammarAST::new()
    };
    gp.parse()?;
    Ok((gp.symtab, gp.ast))
}

struct GrammarParser<'a> {
    src: &'a str,
    symtab: SymbolTable,
    ast: GrammarAST
}

lazy_static! {
    static ref RE_NAME: LexRegex = LexRegex::new(r"^[A-Za-z][A-Za-z0-9_]*").unwrap();
    static ref RE_INT: LexRegex = LexRegex::new(r"^[0-9]+").unwrap();
}

impl<'a> GrammarParser<'a> {
    fn parse(&mut self) -> Result<(), GrammarParserError> {
        // The eof sentinel must be the first terminal allocated: it is token 1 everywhere.
        self.symtab
            .lookup("$eof", SymbolKind::Terminal, TableAction::Insert);

        let mut i = self.skip_ws(0)?;
        i = self.expect_keyword(i, "IDENT")?;
        i = self.skip_ws(i)?;
        let (j, ident) = self.parse_name(i)?;
        self.ast.ident = ident;
        i = self.expect_char(self.skip_ws(j)?, ';')?;

        i = self.skip_ws(i)?;
        if let Some(j) = self.keyword(i, "TITLE") {
            let (j2, bytes) = self.parse_qstring(self.skip_ws(j)?)?;
            self.ast.title = Some(String::from_utf8_lossy(&bytes).into_owned());
            i = self.opt_char(self.skip_ws(j2)?, ';')?;
        }

        i = self.skip_ws(i)?;
        if let Some(j) = self.keyword(i, "OPTIONS") {
            i = self.parse_options(self.skip_ws(j)?)?;
        }

        i = self.skip_ws(i)?;
        if let Some(j) = self.keyword(i, "DEFINE") {
            i = self.parse_defines(self.skip_ws(j)?)?;
        }

        i = self.skip_ws(i)?;
        match self.keyword(i, "SCANNER") {
            Some(j) => i = self.parse_scanner(self.skip_ws(j)?)?,
            None => return self.err(GrammarParserErrorKind::ExpectedSection("SCANNER"), i)
        }

        i = self.skip_ws(i)?;
        if let Some(j) = self.keyword(i, "DEFAULT") {
            i = self.parse_defaults(self.skip_ws(j)?)?;
        }

        i = self.skip_ws(i)?;
        match self.keyword(i, "PARSER") {
            Some(j) => i = self.parse_parser(self.skip_ws(j)?)?,
            None => return self.err(GrammarParserErrorKind::ExpectedSection("PARSER"), i)
        }

        i = self.skip_ws(i)?;
        if i != self.src.len() {
            return self.err(GrammarParserErrorKind::IllegalCharacter, i);
        }
        Ok(())
    }

    fn parse_options(&mut self, mut i: usize) -> Result<usize, GrammarParserError> {
        loop {
            let (j, name) = self.parse_name(i)?;
            match name.as_str() {
                "AMBIGUOUS" => self.ast.config.ambiguous = true,
                "ERRORREPAIR" => self.ast.config.error_repair = true,
                "SHIFTREDUCE" => self.ast.config.default_reduce = true,
                "SPLITSTATES" => self.ast.config.split_states = true,
                _ => return self.err(GrammarParserErrorKind::UnknownOption, i)
            }
            i = self.skip_ws(j)?;
            if self.peek(i) == Some(b',') {
                i = self.skip_ws(i + 1)?;
            } else {
                break;
            }
        }
        self.opt_char(i, ';')
    }

    fn parse_defines(&mut self, mut i: usize) -> Result<usize, GrammarParserError> {
        // Each entry is `name = regex ;`. The section ends at the SCANNER keyword.
        loop {
            if self.keyword(i, "SCANNER").is_some() {
                return Ok(i);
            }
            let at = i;
            let (j, name) = self.parse_name(i)?;
            i = self.expect_char(self.skip_ws(j)?, '=')?;
            let (j, re) = self.parse_regex(self.skip_ws(i)?)?;
            i = self.expect_char(self.skip_ws(j)?, ';')?;
            if self
                .symtab
                .lookup(&name, SymbolKind::Definition, TableAction::Lookup)
                .is_some()
            {
                return self.err(GrammarParserErrorKind::DuplicateDefinition, at);
            }
            let sym = self
                .symtab
                .lookup(&name, SymbolKind::Definition, TableAction::Insert)
                .unwrap();
            self.symtab.sym_mut(sym).data = SymData::Definition(Some(re));
            i = self.skip_ws(i)?;
        }
    }

    fn parse_scanner(&mut self, mut i: usize) -> Result<usize, GrammarParserError> {
        loop {
            if self.keyword(i, "DEFAULT").is_some() || self.keyword(i, "PARSER").is_some() {
                return Ok(i);
            }
            if i >= self.src.len() {
                return self.err(GrammarParserErrorKind::ExpectedSection("PARSER"), i);
            }
            i = self.parse_token_decl(i)?;
            i = self.skip_ws(i)?;
        }
    }

    fn parse_token_decl(&mut self, i: usize) -> Result<usize, GrammarParserError> {
        // `IGNORE = regex ;` declares an ignored regex rather than a token.
        if let Some(j) = self.keyword(i, "IGNORE") {
            let j = self.expect_char(self.skip_ws(j)?, '=')?;
            let (j, re) = self.parse_regex(self.skip_ws(j)?)?;
            let j = self.expect_char(self.skip_ws(j)?, ';')?;
            self.ast.ignores.push(re);
            return Ok(j);
        }

        let at = i;
        let (mut i, name) = match self.peek(i) {
            Some(b'"') | Some(b'\'') => {
                let (j, bytes) = self.parse_qstring(i)?;
                (j, String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => self.parse_name(i)?
        };
        if self
            .symtab
            .lookup(&name, SymbolKind::Terminal, TableAction::Lookup)
            .is_some()
        {
            return self.err(GrammarParserErrorKind::DuplicateToken, at);
        }
        let sym = self
            .symtab
            .lookup(&name, SymbolKind::Terminal, TableAction::Insert)
            .unwrap();

        // Optional `= ALIAS "base"` or `= regex`.
        let mut regex = None;
        let mut is_alias = false;
        i = self.skip_ws(i)?;
        if self.peek(i) == Some(b'=') {
            i = self.skip_ws(i + 1)?;
            if let Some(j) = self.keyword(i, "ALIAS") {
                let (j, bytes) = self.parse_qstring(self.skip_ws(j)?)?;
                let base_name = String::from_utf8_lossy(&bytes).into_owned();
                let base = match self
                    .symtab
                    .lookup(&base_name, SymbolKind::Terminal, TableAction::Lookup)
                {
                    Some(b) => b,
                    None => return self.err(GrammarParserErrorKind::UndefinedName, i)
                };
                if self.symtab.sym(base).attrs().unwrap().alias_of.is_some() {
                    return self.err(GrammarParserErrorKind::AliasOfAlias, i);
                }
                self.symtab.sym_mut(sym).attrs_mut().unwrap().alias_of = Some(base);
                is_alias = true;
                i = self.skip_ws(j)?;
            } else {
                let (j, re) = self.parse_regex(i)?;
                regex = Some(re);
                i = self.skip_ws(j)?;
            }
        }

        // Attributes.
        while self.peek(i) == Some(b',') {
            i = self.skip_ws(i + 1)?;
            let at = i;
            let (j, attr) = self.parse_name(i)?;
            i = self.skip_ws(j)?;
            match attr.as_str() {
                "PRECEDENCE" => {
                    i = self.expect_char(i, '=')?;
                    let (j, n) = self.parse_int(self.skip_ws(i)?)?;
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().prec = Some(n);
                    i = self.skip_ws(j)?;
                }
                "ASSOCIATIVITY" => {
                    i = self.expect_char(i, '=')?;
                    let (j, a) = self.parse_name(self.skip_ws(i)?)?;
                    let assoc = match a.as_str() {
                        "LEFT" => Assoc::Left,
                        "RIGHT" => Assoc::Right,
                        "NONE" => Assoc::None,
                        _ => return self.err(GrammarParserErrorKind::UnknownAttribute, at)
                    };
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().assoc = Some(assoc);
                    i = self.skip_ws(j)?;
                }
                "INSERT" => {
                    i = self.expect_char(i, '=')?;
                    let (j, n) = self.parse_int(self.skip_ws(i)?)?;
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().inscost = Some(n);
                    i = self.skip_ws(j)?;
                }
                "DELETE" => {
                    i = self.expect_char(i, '=')?;
                    let (j, n) = self.parse_int(self.skip_ws(i)?)?;
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().delcost = Some(n);
                    i = self.skip_ws(j)?;
                }
                "INSTALL" => {
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().install = true;
                }
                "IGNORE" => {
                    let (j, c) = self.parse_name(i)?;
                    if c != "CASE" {
                        return self.err(GrammarParserErrorKind::UnknownAttribute, at);
                    }
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().caseless = true;
                    i = self.skip_ws(j)?;
                }
                "EMPTY" => {
                    self.symtab.sym_mut(sym).attrs_mut().unwrap().empty = true;
                }
                _ => return self.err(GrammarParserErrorKind::UnknownAttribute, at)
            }
        }
        i = self.expect_char(i, ';')?;

        let empty = self.symtab.sym(sym).attrs().unwrap().empty;
        if empty && regex.is_some() {
            return self.err(GrammarParserErrorKind::EmptyTokenWithRegex, at);
        }
        if !empty && regex.is_none() {
            // A literal-named token (aliases included) scans its own spelling; a word-named
            // one needs a regex unless it is a pure cost/flag alias.
            match self.peek(at) {
                Some(b'"') | Some(b'\'') => {
                    regex = Some(Regex::Character(name.clone().into_bytes()))
                }
                _ if is_alias => (),
                _ => return self.err(GrammarParserErrorKind::MissingRegex, at)
            }
        }
        self.ast.tokens.push(TokenDecl { sym, regex });
        Ok(i)
    }

    fn parse_defaults(&mut self, mut i: usize) -> Result<usize, GrammarParserError> {
        loop {
            if self.keyword(i, "PARSER").is_some() {
                return Ok(i);
            }
            let at = i;
            let (j, name) = self.parse_name(i)?;
            i = self.expect_char(self.skip_ws(j)?, '=')?;
            i = self.skip_ws(i)?;
            match name.as_str() {
                "START" => {
                    i = self.expect_char(i, '<')?;
                    let (j, n) = self.parse_name(i)?;
                    i = self.expect_char(j, '>')?;
                    let sym = self
                        .symtab
                        .lookup(&n, SymbolKind::Nonterminal, TableAction::Insert)
                        .unwrap();
                    self.ast.start = Some(sym);
                }
                "COST" => {
                    let (j, n) = self.parse_int(i)?;
                    self.ast.config.default_cost = n;
                    i = j;
                }
                "CONTEXT" => {
                    let (j, n) = self.parse_int(i)?;
                    self.ast.config.context = n;
                    i = j;
                }
                _ => return self.err(GrammarParserErrorKind::UnknownDefault, at)
            }
            i = self.expect_char(self.skip_ws(i)?, ';')?;
            i = self.skip_ws(i)?;
        }
    }

    fn parse_parser(&mut self, mut i: usize) -> Result<usize, GrammarParserError> {
        loop {
            if i >= self.src.len() {
                return Ok(i);
            }
            i = self.expect_char(i, '<')?;
            let (j, name) = self.parse_name(i)?;
            i = self.expect_char(j, '>')?;
            let lhs = self
                .symtab
                .lookup(&name, SymbolKind::Nonterminal, TableAction::Insert)
                .unwrap();
            i = self.skip_ws(i)?;
            // Accept `=` or a literal `→`.
            if self.src[i..].starts_with('→') {
                i += '→'.len_utf8();
            } else {
                i = self.expect_char(i, '=')?;
            }
            let mut alts = Vec::new();
            loop {
                let (j, alt) = self.parse_rhs(self.skip_ws(i)?)?;
                alts.push(alt);
                i = self.skip_ws(j)?;
                match self.peek(i) {
                    Some(b'|') => i += 1,
                    Some(b';') => {
                        i += 1;
                        break;
                    }
                    _ => return self.err(GrammarParserErrorKind::ExpectedChar(';'), i)
                }
            }
            let tree = Regex::alt(alts);
            match self.ast.prods.iter_mut().find(|&&mut (l, _)| l == lhs) {
                Some(&mut (_, ref mut existing)) => {
                    // A repeated left-hand side extends the first entry's alternation.
                    let old = ::std::mem::replace(existing, Regex::Epsilon);
                    *existing = match old {
                        Regex::Node(RegexOp::Alt, mut children) => {
                            match tree {
                                Regex::Node(RegexOp::Alt, more) => children.extend(more),
                                t => children.push(t)
                            }
                            Regex::Node(RegexOp::Alt, children)
                        }
                        old => match tree {
                            Regex::Node(RegexOp::Alt, mut more) => {
                                more.insert(0, old);
                                Regex::Node(RegexOp::Alt, more)
                            }
                            t => Regex::Node(RegexOp::Alt, vec![old, t])
                        }
                    };
                }
                None => self.ast.prods.push((lhs, tree))
            }
            i = self.skip_ws(i)?;
        }
    }

    fn parse_rhs(&mut self, mut i: usize) -> Result<(usize, Regex), GrammarParserError> {
        let mut items = Vec::new();
        loop {
            match self.peek(i) {
                Some(b'<') => {
                    let (j, name) = self.parse_name(i + 1)?;
                    let j = self.expect_char(j, '>')?;
                    let sym = self
                        .symtab
                        .lookup(&name, SymbolKind::Nonterminal, TableAction::Insert)
                        .unwrap();
                    items.push(Regex::Reference(sym));
                    i = self.skip_ws(j)?;
                }
                Some(b'"') | Some(b'\'') => {
                    let (j, bytes) = self.parse_qstring(i)?;
                    if bytes.is_empty() {
                        items.push(Regex::Epsilon);
                    } else {
                        let name = String::from_utf8_lossy(&bytes).into_owned();
                        let sym = self.terminal_for_literal(&name, bytes);
                        items.push(Regex::Reference(sym));
                    }
                    i = self.skip_ws(j)?;
                }
                Some(b'#') => {
                    let (j, n) = self.parse_int(i + 1)?;
                    items.push(Regex::Semantic(n));
                    i = self.skip_ws(j)?;
                }
                Some(c) if (c as char).is_ascii_alphabetic() => {
                    let at = i;
                    let (j, name) = self.parse_name(i)?;
                    let sym = match self
                        .symtab
                        .lookup(&name, SymbolKind::Terminal, TableAction::Lookup)
                    {
                        Some(s) => s,
                        None => return self.err(GrammarParserErrorKind::UndefinedName, at)
                    };
                    items.push(Regex::Reference(sym));
                    i = self.skip_ws(j)?;
                }
                _ => break
            }
        }
        Ok((i, Regex::cat(items)))
    }

    /// A quoted literal used directly in a production: reuse the declared token if there is
    /// one, otherwise declare it with its spelling as regex.
    fn terminal_for_literal(&mut self, name: &str, bytes: Vec<u8>) -> SymIdx {
        if let Some(sym) = self
            .symtab
            .lookup(name, SymbolKind::Terminal, TableAction::Lookup)
        {
            return sym;
        }
        let sym = self
            .symtab
            .lookup(name, SymbolKind::Terminal, TableAction::Insert)
            .unwrap();
        self.ast.tokens.push(TokenDecl {
            sym,
            regex: Some(Regex::Character(bytes))
        });
        sym
    }

    // Regexes.

    fn parse_regex(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        let (mut i, first) = self.parse_rx_look(i)?;
        let mut alts = vec![first];
        loop {
            i = self.skip_ws(i)?;
            if self.peek(i) != Some(b'|') {
                break;
            }
            let (j, next) = self.parse_rx_look(self.skip_ws(i + 1)?)?;
            alts.push(next);
            i = j;
        }
        Ok((i, Regex::alt(alts)))
    }

    fn parse_rx_look(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        let (mut i, lhs) = self.parse_rx_cat(i)?;
        i = self.skip_ws(i)?;
        if self.peek(i) == Some(b'>') {
            let (j, rhs) = self.parse_rx_cat(self.skip_ws(i + 1)?)?;
            return Ok((j, Regex::Node(RegexOp::Look, vec![lhs, rhs])));
        }
        Ok((i, lhs))
    }

    fn parse_rx_cat(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        let (mut i, first) = self.parse_rx_diff(i)?;
        let mut items = vec![first];
        loop {
            i = self.skip_ws(i)?;
            match self.peek(i) {
                Some(b'(') | Some(b'{') | Some(b'[') | Some(b'~') | Some(b'"') | Some(b'\'') => (),
                Some(c) if (c as char).is_ascii_alphabetic() => (),
                _ => break
            }
            let (j, next) = self.parse_rx_diff(i)?;
            items.push(next);
            i = j;
        }
        Ok((i, Regex::cat(items)))
    }

    fn parse_rx_diff(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        let (mut i, lhs) = self.parse_rx_postfix(i)?;
        i = self.skip_ws(i)?;
        if self.peek(i) == Some(b'-') {
            let (j, rhs) = self.parse_rx_postfix(self.skip_ws(i + 1)?)?;
            return Ok((j, Regex::Node(RegexOp::Diff, vec![lhs, rhs])));
        }
        Ok((i, lhs))
    }

    fn parse_rx_postfix(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        let (mut i, mut re) = self.parse_rx_primary(i)?;
        loop {
            match self.peek(i) {
                Some(b'*') => {
                    re = Regex::Node(RegexOp::Star, vec![re]);
                    i += 1;
                }
                Some(b'+') => {
                    re = Regex::Node(RegexOp::Plus, vec![re]);
                    i += 1;
                }
                Some(b'?') => {
                    re = Regex::Node(RegexOp::Opt, vec![re]);
                    i += 1;
                }
                _ => return Ok((i, re))
            }
        }
    }

    fn parse_rx_primary(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        match self.peek(i) {
            Some(b'(') => {
                let (j, re) = self.parse_regex(self.skip_ws(i + 1)?)?;
                let j = self.expect_char(self.skip_ws(j)?, ')')?;
                Ok((j, re))
            }
            Some(b'{') => {
                // `{ r } m : n` repeats r between m and n times; `{ r } m` exactly m.
                let (j, re) = self.parse_regex(self.skip_ws(i + 1)?)?;
                let j = self.expect_char(self.skip_ws(j)?, '}')?;
                let (j, m) = self.parse_int(self.skip_ws(j)?)?;
                let mut j2 = self.skip_ws(j)?;
                let n;
                if self.peek(j2) == Some(b':') {
                    let (j3, hi) = self.parse_int(self.skip_ws(j2 + 1)?)?;
                    n = hi;
                    j2 = j3;
                } else {
                    n = m;
                }
                if n < m || n == 0 {
                    return self.err(GrammarParserErrorKind::RepeatBounds, i);
                }
                Ok((j2, Regex::Repeat(Box::new(re), m, n)))
            }
            Some(b'[') => self.parse_rx_class(i),
            Some(b'~') => {
                let (j, re) = self.parse_rx_primary(self.skip_ws(i + 1)?)?;
                Ok((j, Regex::Node(RegexOp::Not, vec![re])))
            }
            Some(b'"') | Some(b'\'') => {
                let (j, bytes) = self.parse_qstring(i)?;
                if bytes.is_empty() {
                    Ok((j, Regex::Epsilon))
                } else if bytes == [0] {
                    Ok((j, Regex::ZeroByte))
                } else {
                    Ok((j, Regex::Character(bytes)))
                }
            }
            Some(c) if (c as char).is_ascii_alphabetic() => {
                let at = i;
                let (j, name) = self.parse_name(i)?;
                match self
                    .symtab
                    .lookup(&name, SymbolKind::Definition, TableAction::Lookup)
                {
                    Some(sym) => match self.symtab.sym(sym).data {
                        SymData::Definition(Some(ref re)) => Ok((j, re.copy_tree())),
                        _ => self.err(GrammarParserErrorKind::UndefinedName, at)
                    },
                    None => self.err(GrammarParserErrorKind::UndefinedName, at)
                }
            }
            Some(_) => self.err(GrammarParserErrorKind::IllegalCharacter, i),
            None => self.err(GrammarParserErrorKind::PrematureEnd, i)
        }
    }

    fn parse_rx_class(&mut self, i: usize) -> Result<(usize, Regex), GrammarParserError> {
        use vob::Vob;
        debug_assert_eq!(self.peek(i), Some(b'['));
        let mut v = Vob::from_elem(256, false);
        let mut j = i + 1;
        let mut any = false;
        loop {
            match self.peek(j) {
                None => return self.err(GrammarParserErrorKind::MissingQuote, i),
                Some(b']') => {
                    j += 1;
                    break;
                }
                Some(_) => {
                    let (j2, lo) = self.parse_class_byte(j)?;
                    // A trailing `-` is a literal; otherwise it introduces a range.
                    if self.peek(j2) == Some(b'-') && self.peek(j2 + 1) != Some(b']') {
                        let (j3, hi) = self.parse_class_byte(j2 + 1)?;
                        if hi < lo {
                            return self.err(GrammarParserErrorKind::InvalidRange, j);
                        }
                        for b in lo..=hi {
                            v.set(b as usize, true);
                        }
                        j = j3;
                    } else {
                        v.set(lo as usize, true);
                        j = j2;
                    }
                    any = true;
                }
            }
        }
        if !any {
            return self.err(GrammarParserErrorKind::EmptyClass, i);
        }
        Ok((j, Regex::Class(v)))
    }

    fn parse_class_byte(&self, i: usize) -> Result<(usize, u8), GrammarParserError> {
        match self.peek(i) {
            None => self.err(GrammarParserErrorKind::PrematureEnd, i),
            Some(b'\\') => self.parse_escape(i),
            Some(b) => Ok((i + 1, b))
        }
    }

    fn parse_escape(&self, i: usize) -> Result<(usize, u8), GrammarParserError> {
        debug_assert_eq!(self.peek(i), Some(b'\\'));
        match self.peek(i + 1) {
            Some(b'n') => Ok((i + 2, b'\n')),
            Some(b't') => Ok((i + 2, b'\t')),
            Some(b'r') => Ok((i + 2, b'\r')),
            Some(b'0') => Ok((i + 2, 0)),
            Some(b'\\') => Ok((i + 2, b'\\')),
            Some(b'\'') => Ok((i + 2, b'\'')),
            Some(b'"') => Ok((i + 2, b'"')),
            Some(b'[') => Ok((i + 2, b'[')),
            Some(b']') => Ok((i + 2, b']')),
            Some(b'-') => Ok((i + 2, b'-')),
            _ => self.err(GrammarParserErrorKind::IllegalEscape, i)
        }
    }

    // Low-level helpers.

    fn peek(&self, i: usize) -> Option<u8> {
        self.src.as_bytes().get(i).cloned()
    }

    fn skip_ws(&self, mut i: usize) -> Result<usize, GrammarParserError> {
        let bytes = self.src.as_bytes();
        loop {
            match bytes.get(i) {
                Some(&b) if (b as char).is_whitespace() => i += 1,
                Some(&b'%') => {
                    let start = i;
                    i += 1;
                    loop {
                        match bytes.get(i) {
                            Some(&b'%') => {
                                i += 1;
                                break;
                            }
                            Some(_) => i += 1,
                            None => {
                                return self
                                    .err(GrammarParserErrorKind::UnterminatedComment, start)
                            }
                        }
                    }
                }
                _ => return Ok(i)
            }
        }
    }

    /// Match a word keyword at `i`, requiring a token boundary after it.
    fn keyword(&self, i: usize, kw: &str) -> Option<usize> {
        if self.src[i..].starts_with(kw) {
            match self.peek(i + kw.len()) {
                Some(c) if (c as char).is_ascii_alphanumeric() || c == b'_' => None,
                _ => Some(i + kw.len())
            }
        } else {
            None
        }
    }

    fn expect_keyword(&self, i: usize, kw: &'static str) -> Result<usize, GrammarParserError> {
        match self.keyword(i, kw) {
            Some(j) => Ok(j),
            None => self.err(GrammarParserErrorKind::ExpectedSection(kw), i)
        }
    }

    fn expect_char(&self, i: usize, c: char) -> Result<usize, GrammarParserError> {
        if self.peek(i) == Some(c as u8) {
            Ok(i + 1)
        } else {
            self.err(GrammarParserErrorKind::ExpectedChar(c), i)
        }
    }

    /// Consume `c` if present; some section terminators are optional.
    fn opt_char(&self, i: usize, c: char) -> Result<usize, GrammarParserError> {
        if self.peek(i) == Some(c as u8) {
            Ok(i + 1)
        } else {
            Ok(i)
        }
    }

    fn parse_name(&self, i: usize) -> Result<(usize, String), GrammarParserError> {
        match RE_NAME.find(&self.src[i..]) {
            Some(m) => Ok((i + m.end(), self.src[i..i + m.end()].to_owned())),
            None => self.err(GrammarParserErrorKind::ExpectedIdent, i)
        }
    }

    fn parse_int(&self, i: usize) -> Result<(usize, u32), GrammarParserError> {
        match RE_INT.find(&self.src[i..]) {
            Some(m) => match self.src[i..i + m.end()].parse::<u32>() {
                Ok(n) => Ok((i + m.end(), n)),
                Err(_) => self.err(GrammarParserErrorKind::ExpectedIdent, i)
            },
            None => self.err(GrammarParserErrorKind::ExpectedIdent, i)
        }
    }

    /// A quoted literal. The closing quote must appear on the same line.
    fn parse_qstring(&self, i: usize) -> Result<(usize, Vec<u8>), GrammarParserError> {
        let quote = match self.peek(i) {
            Some(q @ b'"') | Some(q @ b'\'') => q,
            _ => return self.err(GrammarParserErrorKind::MissingQuote, i)
        };
        let mut bytes = Vec::new();
        let mut j = i + 1;
        loop {
            match self.peek(j) {
                None | Some(b'\n') => return self.err(GrammarParserErrorKind::MissingQuote, i),
                Some(b'\\') => {
                    let (j2, b) = self.parse_escape(j)?;
                    bytes.push(b);
                    j = j2;
                }
                Some(q) if q == quote => return Ok((j + 1, bytes)),
                Some(b) => {
                    bytes.push(b);
                    j += 1;
                }
            }
        }
    }

    fn err<T>(&self, kind: GrammarParserErrorKind, off: usize) -> Result<T, GrammarParserError> {
        let (line, col) = self.off_to_line_col(off);
        Err(GrammarParserError { kind, line, col })
    }

    fn off_to_line_col(&self, off: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (i, b) in self.src.as_bytes().iter().enumerate() {
            if i >= off {
                break;
            }
            if *b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

#[cfg(test)]
mod test {
    use super::{parse_grammar, GrammarParserErrorKind};
    use rx::{CharType, Regex, RegexOp};
    use symtab::{SymbolKind, TableAction};

    #[test]
    fn test_sections() {
        let (symtab, ast) = parse_grammar(
            "IDENT calc;
             TITLE \"a calculator\";
             OPTIONS AMBIGUOUS, ERRORREPAIR;
             DEFINE digit = [0-9];
             SCANNER int = digit+, INSTALL; \"+\"; % infix add %
             DEFAULT START = <e>; COST = 3; CONTEXT = 4;
             PARSER <e> = <e> \"+\" int #1 | int;"
        )
        .unwrap();
        assert_eq!(ast.ident, "calc");
        assert_eq!(ast.title.as_ref().unwrap(), "a calculator");
        assert!(ast.config.ambiguous && ast.config.error_repair);
        assert!(!ast.config.split_states);
        assert_eq!(ast.config.default_cost, 3);
        assert_eq!(ast.config.context, 4);
        assert_eq!(ast.tokens.len(), 2);
        assert_eq!(ast.prods.len(), 1);
        assert!(ast.start.is_some());
        // The eof sentinel is interned before everything else.
        let mut symtab = symtab;
        let eof = symtab
            .lookup("$eof", SymbolKind::Terminal, TableAction::Lookup)
            .unwrap();
        assert_eq!(usize::from(eof), 0);
    }

    #[test]
    fn test_regex_repeat_and_class() {
        let (_, ast) = parse_grammar(
            "IDENT t;
             SCANNER run = { [0-9] } 2 : 4;
             PARSER <s> = run;"
        )
        .unwrap();
        match *ast.tokens[0].regex.as_ref().unwrap() {
            Regex::Repeat(ref inner, 2, 4) => {
                assert_eq!(inner.char_type(), CharType::CharacterClass)
            }
            ref t => panic!("{:?}", t)
        }
    }

    #[test]
    fn test_trailing_context_and_postfix() {
        let (_, ast) = parse_grammar(
            "IDENT t;
             SCANNER num = [0-9]+ > '.';
             PARSER <s> = num;"
        )
        .unwrap();
        match *ast.tokens[0].regex.as_ref().unwrap() {
            Regex::Node(RegexOp::Look, ref children) => {
                assert_eq!(children.len(), 2);
                match children[0] {
                    Regex::Node(RegexOp::Plus, _) => (),
                    ref t => panic!("{:?}", t)
                }
            }
            ref t => panic!("{:?}", t)
        }
    }

    #[test]
    fn test_alias() {
        let (mut symtab, ast) = parse_grammar(
            "IDENT t;
             SCANNER \"<\"; \"lt\" = ALIAS \"<\", INSERT=2;
             PARSER <s> = \"<\";"
        )
        .unwrap();
        assert_eq!(ast.tokens.len(), 2);
        let lt = symtab
            .lookup("lt", SymbolKind::Terminal, TableAction::Lookup)
            .unwrap();
        let base = symtab.sym(lt).attrs().unwrap().alias_of.unwrap();
        assert_eq!(symtab.sym(base).name, "<");
    }

    #[test]
    fn test_alias_of_alias_rejected() {
        let e = parse_grammar(
            "IDENT t;
             SCANNER \"<\"; \"lt\" = ALIAS \"<\"; \"le\" = ALIAS \"lt\";
             PARSER <s> = \"<\";"
        )
        .unwrap_err();
        assert_eq!(e.kind, GrammarParserErrorKind::AliasOfAlias);
    }

    #[test]
    fn test_missing_quote_has_position() {
        let e = parse_grammar(
            "IDENT t;
             SCANNER x = 'oops;
             PARSER <s> = x;"
        )
        .unwrap_err();
        assert_eq!(e.kind, GrammarParserErrorKind::MissingQuote);
        assert_eq!(e.line, 2);
    }

    #[test]
    fn test_duplicate_token() {
        let e = parse_grammar(
            "IDENT t;
             SCANNER \"a\"; \"a\";
             PARSER <s> = \"a\";"
        )
        .unwrap_err();
        assert_eq!(e.kind, GrammarParserErrorKind::DuplicateToken);
    }

    #[test]
    fn test_unterminated_comment() {
        let e = parse_grammar("IDENT t; % no end").unwrap_err();
        assert_eq!(e.kind, GrammarParserErrorKind::UnterminatedComment);
    }
}
