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

//! The persisted tables file, in both its layouts. The header line is
//!
//! ```text
//! type tnumber ntokens snumber ntnumber gnumber pnumber context defcost name
//! ```
//!
//! with type 0 (uncompressed: sparse transition/action rows) or 1 (compressed: the
//! default/base/check/next arrays). After the header, integers are whitespace-separated and
//! wrapped at 80 columns:
//!
//!   * tokenindex (snumber+1 cumulative end offsets), tokentable, final, install
//!   * type 0: per scanner state, a count then `col next` pairs; type 1: sdefault, sbase,
//!     scheck length, scheck, snext
//!   * inscost, delcost (tnumber each)
//!   * LHStoken, RHSlength, semantics (gnumber each)
//!   * repair (pnumber)
//!   * stringindex (tnumber+ntnumber+1 cumulative end offsets), then the total name length
//!     followed by one separator byte and the raw concatenated names
//!   * type 0: per parser state, a count then `token action` pairs; type 1: pbase, pcheck
//!     length, pcheck, pnext
//!
//! The runtime loads either layout into the same `Tables` value; `scan_next`/`action` hide
//! which one is live.

use std::fmt;
use std::io::{self, Write};
use std::str;

use sdgrammar::{Grammar, Symbol, TIdx};
use sdlex::{LexTables, EOF_COL};

use compress::{compress_parser, compress_scanner, CompressedParser, CompressedScanner};
use statetable::StateTable;

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScannerRepr {
    /// Per-state 257-column rows.
    Dense(Vec<Vec<u32>>),
    Packed(CompressedScanner)
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParserRepr {
    /// Per-state rows of width `tnumber + ntnumber + 1`.
    Dense(Vec<Vec<i32>>),
    Packed(CompressedParser)
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tables {
    pub name: String,
    pub tnumber: usize,
    pub ntokens: usize,
    pub snumber: usize,
    pub ntnumber: usize,
    pub gnumber: usize,
    pub pnumber: usize,
    pub context: u32,
    pub defcost: u32,
    /// Per scanner state, the sorted tokens whose text ends there.
    pub tokenends: Vec<Vec<u32>>,
    pub finals: Vec<u32>,
    pub install: Vec<bool>,
    pub scanner: ScannerRepr,
    pub inscost: Vec<u32>,
    pub delcost: Vec<u32>,
    pub lhstoken: Vec<u32>,
    pub rhslength: Vec<u32>,
    pub semantics: Vec<u32>,
    pub repair: Vec<i32>,
    /// Terminal then nonterminal names; index 0 unused.
    pub names: Vec<String>,
    pub parser: ParserRepr
}

#[derive(Debug, Eq, PartialEq)]
pub enum TablesErrorKind {
    PrematureEnd,
    BadInt,
    BadHeader
}

#[derive(Debug)]
pub struct TablesError {
    pub kind: TablesErrorKind
}

impl fmt::Display for TablesError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self.kind {
            TablesErrorKind::PrematureEnd => "Tables file ends prematurely",
            TablesErrorKind::BadInt => "Malformed integer in tables file",
            TablesErrorKind::BadHeader => "Malformed tables file header"
        };
        write!(f, "{}", s)
    }
}

impl Tables {
    fn metadata(grm: &Grammar, lex: &LexTables, st: &StateTable) -> Tables {
        let tnumber = grm.tokens_len();
        let ntnumber = grm.rules_len();
        let mut inscost = vec![0u32];
        let mut delcost = vec![0u32];
        let mut names = vec![String::new()];
        for t in grm.iter_tidxs() {
            inscost.push(grm.inscost(t));
            delcost.push(grm.delcost(t));
            names.push(grm.token_name(t).to_owned());
        }
        for r in grm.iter_ridxs() {
            names.push(grm.rule_name(r).to_owned());
        }
        let mut lhstoken = vec![0u32];
        let mut rhslength = vec![0u32];
        let mut semantics = vec![0u32];
        for p in grm.iter_pidxs() {
            let prod = grm.prod(p);
            lhstoken.push(grm.symbol_col(Symbol::Rule(prod.lhs)) as u32);
            rhslength.push(u32::from(prod.efflen));
            semantics.push(prod.semantic);
        }
        Tables {
            name: grm.name.clone(),
            tnumber,
            ntokens: lex.ntokens,
            snumber: lex.snumber,
            ntnumber,
            gnumber: grm.prods_len(),
            pnumber: st.states_len(),
            context: grm.cfg.context,
            defcost: grm.cfg.default_cost,
            tokenends: lex.tokenends.clone(),
            finals: lex.finals.clone(),
            install: (0..lex.snumber + 1).map(|s| lex.install[s]).collect(),
            scanner: ScannerRepr::Dense(lex.trans.clone()),
            inscost,
            delcost,
            lhstoken,
            rhslength,
            semantics,
            repair: st.repair.clone(),
            names,
            parser: ParserRepr::Dense(st.actions.clone())
        }
    }

    pub fn uncompressed(grm: &Grammar, lex: &LexTables, st: &StateTable) -> Tables {
        Tables::metadata(grm, lex, st)
    }

    pub fn compressed(grm: &Grammar, lex: &LexTables, st: &StateTable) -> Tables {
        let mut t = Tables::metadata(grm, lex, st);
        t.scanner = ScannerRepr::Packed(compress_scanner(lex));
        t.parser = ParserRepr::Packed(compress_parser(&st.actions));
        t
    }

    /// The scanner transition out of `st` on input column `col` (0..=256; 256 is eof).
    pub fn scan_next(&self, st: u32, col: usize) -> u32 {
        match self.scanner {
            ScannerRepr::Dense(ref rows) => rows[st as usize][col],
            ScannerRepr::Packed(ref cs) => cs.decode(st, col)
        }
    }

    /// The parser action of state `st` on table column `col`.
    pub fn action(&self, st: u32, col: usize) -> i32 {
        match self.parser {
            ParserRepr::Dense(ref rows) => rows[st as usize][col],
            ParserRepr::Packed(ref cp) => cp.decode(st, col)
        }
    }

    pub fn cols_len(&self) -> usize {
        self.tnumber + self.ntnumber + 1
    }

    pub fn token_col(&self, token: u32) -> usize {
        token as usize
    }

    pub fn eof_token(&self) -> u32 {
        u32::from(TIdx(1))
    }

    pub fn token_name(&self, token: u32) -> &str {
        &self.names[token as usize]
    }

    pub fn write(&self, w: &mut Write) -> io::Result<()> {
        let compressed = match self.scanner {
            ScannerRepr::Dense(_) => false,
            ScannerRepr::Packed(_) => true
        };
        writeln!(
            w,
            "{} {} {} {} {} {} {} {} {} {}",
            if compressed { 1 } else { 0 },
            self.tnumber,
            self.ntokens,
            self.snumber,
            self.ntnumber,
            self.gnumber,
            self.pnumber,
            self.context,
            self.defcost,
            self.name
        )?;
        let mut iw = IntWriter::new(w);

        let mut off = 0i64;
        iw.int(0)?;
        for s in 1..=self.snumber {
            off += self.tokenends[s].len() as i64;
            iw.int(off)?;
        }
        for s in 1..=self.snumber {
            for &t in &self.tokenends[s] {
                iw.int(t as i64)?;
            }
        }
        for s in 1..=self.snumber {
            iw.int(self.finals[s] as i64)?;
        }
        for s in 1..=self.snumber {
            iw.int(if self.install[s] { 1 } else { 0 })?;
        }

        match self.scanner {
            ScannerRepr::Dense(ref rows) => {
                for s in 1..=self.snumber {
                    let nz: Vec<usize> =
                        (0..=EOF_COL).filter(|&c| rows[s][c] != 0).collect();
                    iw.int(nz.len() as i64)?;
                    for c in nz {
                        iw.int(c as i64)?;
                        iw.int(rows[s][c] as i64)?;
                    }
                }
            }
            ScannerRepr::Packed(ref cs) => {
                for s in 1..=self.snumber {
                    iw.int(cs.sdefault[s] as i64)?;
                }
                for s in 1..=self.snumber {
                    iw.int(cs.sbase[s] as i64)?;
                }
                iw.int(cs.check.len() as i64)?;
                for &v in &cs.check {
                    iw.int(v as i64)?;
                }
                for &v in &cs.next {
                    iw.int(v as i64)?;
                }
            }
        }

        for t in 1..=self.tnumber {
            iw.int(self.inscost[t] as i64)?;
        }
        for t in 1..=self.tnumber {
            iw.int(self.delcost[t] as i64)?;
        }
        for p in 1..=self.gnumber {
            iw.int(self.lhstoken[p] as i64)?;
        }
        for p in 1..=self.gnumber {
            iw.int(self.rhslength[p] as i64)?;
        }
        for p in 1..=self.gnumber {
            iw.int(self.semantics[p] as i64)?;
        }
        for s in 1..=self.pnumber {
            iw.int(self.repair[s] as i64)?;
        }

        let mut off = 0i64;
        iw.int(0)?;
        for n in &self.names[1..] {
            off += n.len() as i64;
            iw.int(off)?;
        }
        iw.int(off)?;
        // One separator byte, then the names verbatim: token spellings may contain anything,
        // so the loader reads exactly `off` bytes rather than splitting on whitespace.
        iw.raw_blob(&self.names[1..].concat())?;

        match self.parser {
            ParserRepr::Dense(ref rows) => {
                for s in 1..=self.pnumber {
                    let nz: Vec<usize> =
                        (0..rows[s].len()).filter(|&c| rows[s][c] != 0).collect();
                    iw.int(nz.len() as i64)?;
                    for c in nz {
                        iw.int(c as i64)?;
                        iw.int(rows[s][c] as i64)?;
                    }
                }
            }
            ParserRepr::Packed(ref cp) => {
                for s in 1..=self.pnumber {
                    iw.int(cp.pbase[s] as i64)?;
                }
                iw.int(cp.check.len() as i64)?;
                for &v in &cp.check {
                    iw.int(v as i64)?;
                }
                for &v in &cp.next {
                    iw.int(v as i64)?;
                }
            }
        }
        iw.finish()
    }

    pub fn parse(src: &str) -> Result<Tables, TablesError> {
        let mut cur = Cursor {
            b: src.as_bytes(),
            pos: 0
        };
        let compressed = match cur.int()? {
            0 => false,
            1 => true,
            _ => return Err(TablesError { kind: TablesErrorKind::BadHeader }),
        };
        let tnumber = cur.int()? as usize;
        let ntokens = cur.int()? as usize;
        let snumber = cur.int()? as usize;
        let ntnumber = cur.int()? as usize;
        let gnumber = cur.int()? as usize;
        let pnumber = cur.int()? as usize;
        let context = cur.int()? as u32;
        let defcost = cur.int()? as u32;
        let name = cur.rest_of_line()?;

        let tokenindex = cur.ints(snumber + 1)?;
        let total = *tokenindex.last().unwrap() as usize;
        let tokentable = cur.ints(total)?;
        let mut tokenends = vec![Vec::new(); snumber + 1];
        for s in 1..=snumber {
            let lo = tokenindex[s - 1] as usize;
            let hi = tokenindex[s] as usize;
            tokenends[s] = tokentable[lo..hi].iter().map(|&v| v as u32).collect();
        }
        let finals = {
            let mut v = vec![0u32];
            for x in cur.ints(snumber)? {
                v.push(x as u32);
            }
            v
        };
        let install = {
            let mut v = vec![false];
            for x in cur.ints(snumber)? {
                v.push(x != 0);
            }
            v
        };

        let scanner = if !compressed {
            let mut rows = vec![vec![0u32; EOF_COL + 1]];
            for _ in 1..=snumber {
                let n = cur.int()? as usize;
                let mut row = vec![0u32; EOF_COL + 1];
                for _ in 0..n {
                    let c = cur.int()? as usize;
                    let v = cur.int()? as u32;
                    if c > EOF_COL {
                        return Err(TablesError { kind: TablesErrorKind::BadInt });
                    }
                    row[c] = v;
                }
                rows.push(row);
            }
            ScannerRepr::Dense(rows)
        } else {
            let mut sdefault = vec![0u32];
            for x in cur.ints(snumber)? {
                sdefault.push(x as u32);
            }
            let mut sbase = vec![0u32];
            for x in cur.ints(snumber)? {
                sbase.push(x as u32);
            }
            let clen = cur.int()? as usize;
            let check = cur.ints(clen)?.iter().map(|&v| v as u32).collect();
            let next = cur.ints(clen)?.iter().map(|&v| v as u32).collect();
            ScannerRepr::Packed(CompressedScanner {
                sdefault,
                sbase,
                check,
                next
            })
        };

        let inscost = prefix0(cur.ints(tnumber)?);
        let delcost = prefix0(cur.ints(tnumber)?);
        let lhstoken = prefix0(cur.ints(gnumber)?);
        let rhslength = prefix0(cur.ints(gnumber)?);
        let semantics = prefix0(cur.ints(gnumber)?);
        let repair = {
            let mut v = vec![0i32];
            for x in cur.ints(pnumber)? {
                v.push(x as i32);
            }
            v
        };

        let stringindex = cur.ints(tnumber + ntnumber + 1)?;
        let linewidth = cur.int()? as usize;
        let blob = cur.take(linewidth)?;
        let mut names = vec![String::new()];
        for i in 1..=tnumber + ntnumber {
            let lo = stringindex[i - 1] as usize;
            let hi = stringindex[i] as usize;
            names.push(
                str::from_utf8(&blob[lo..hi])
                    .map_err(|_| TablesError { kind: TablesErrorKind::BadInt })?
                    .to_owned()
            );
        }

        let width = tnumber + ntnumber + 1;
        let parser = if !compressed {
            let mut rows = vec![vec![0i32; width]];
            for _ in 1..=pnumber {
                let n = cur.int()? as usize;
                let mut row = vec![0i32; width];
                for _ in 0..n {
                    let c = cur.int()? as usize;
                    let v = cur.int()? as i32;
                    if c >= width {
                        return Err(TablesError { kind: TablesErrorKind::BadInt });
                    }
                    row[c] = v;
                }
                rows.push(row);
            }
            ParserRepr::Dense(rows)
        } else {
            let mut pbase = vec![0u32];
            for x in cur.ints(pnumber)? {
                pbase.push(x as u32);
            }
            let clen = cur.int()? as usize;
            let check = cur.ints(clen)?.iter().map(|&v| v as u32).collect();
            let next = cur.ints(clen)?.iter().map(|&v| v as i32).collect();
            ParserRepr::Packed(CompressedParser { pbase, check, next })
        };

        Ok(Tables {
            name,
            tnumber,
            ntokens,
            snumber,
            ntnumber,
            gnumber,
            pnumber,
            context,
            defcost,
            tokenends,
            finals,
            install,
            scanner,
            inscost,
            delcost,
            lhstoken,
            rhslength,
            semantics,
            repair,
            names,
            parser
        })
    }
}

fn prefix0(v: Vec<i64>) -> Vec<u32> {
    let mut out = vec![0u32];
    for x in v {
        out.push(x as u32);
    }
    out
}

/// Writes whitespace-separated integers wrapped at 80 columns.
struct IntWriter<'a> {
    w: &'a mut Write,
    col: usize
}

impl<'a> IntWriter<'a> {
    fn new(w: &'a mut Write) -> IntWriter<'a> {
        IntWriter { w, col: 0 }
    }

    fn int(&mut self, v: i64) -> io::Result<()> {
        let s = v.to_string();
        if self.col == 0 {
            write!(self.w, "{}", s)?;
            self.col = s.len();
        } else if self.col + 1 + s.len() > 80 {
            write!(self.w, "\n{}", s)?;
            self.col = s.len();
        } else {
            write!(self.w, " {}", s)?;
            self.col += 1 + s.len();
        }
        Ok(())
    }

    fn raw_blob(&mut self, blob: &str) -> io::Result<()> {
        write!(self.w, " {}\n", blob)?;
        self.col = 0;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.col != 0 {
            writeln!(self.w)?;
        }
        Ok(())
    }
}

struct Cursor<'a> {
    b: &'a [u8],
    pos: usize
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.b.len() && (self.b[self.pos] as char).is_whitespace() {
            self.pos += 1;
        }
    }

    fn int(&mut self) -> Result<i64, TablesError> {
        self.skip_ws();
        if self.pos >= self.b.len() {
            return Err(TablesError { kind: TablesErrorKind::PrematureEnd });
        }
        let start = self.pos;
        if self.b[self.pos] == b'-' {
            self.pos += 1;
        }
        while self.pos < self.b.len() && (self.b[self.pos] as char).is_ascii_digit() {
            self.pos += 1;
        }
        str::from_utf8(&self.b[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(TablesError { kind: TablesErrorKind::BadInt })
    }

    fn ints(&mut self, n: usize) -> Result<Vec<i64>, TablesError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.int()?);
        }
        Ok(out)
    }

    /// Skip exactly one separator byte and take `n` raw bytes.
    fn take(&mut self, n: usize) -> Result<&'a [u8], TablesError> {
        if self.pos + 1 + n > self.b.len() {
            return Err(TablesError { kind: TablesErrorKind::PrematureEnd });
        }
        let out = &self.b[self.pos + 1..self.pos + 1 + n];
        self.pos += 1 + n;
        Ok(out)
    }

    fn rest_of_line(&mut self) -> Result<String, TablesError> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.b.len() && self.b[self.pos] != b'\n' {
            self.pos += 1;
        }
        str::from_utf8(&self.b[start..self.pos])
            .map(|s| s.trim().to_owned())
            .map_err(|_| TablesError { kind: TablesErrorKind::BadInt })
    }
}

#[cfg(test)]
mod test {
    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;
    use sdlex::{LexTables, EOF_COL};

    use super::Tables;
    use from_grammar;

    fn build(src: &str) -> (Tables, Tables) {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let lex = LexTables::new(&grm, &symtab, &ast).unwrap();
        let (_sg, st) = from_grammar(&grm).unwrap();
        (
            Tables::uncompressed(&grm, &lex, &st),
            Tables::compressed(&grm, &lex, &st)
        )
    }

    const SRC: &'static str = "IDENT roundtrip;
         OPTIONS ERRORREPAIR;
         SCANNER \"a\", INSERT=2, DELETE=3; \"b\"; IGNORE = ' '+;
         DEFAULT COST = 7; CONTEXT = 4;
         PARSER <s> = \"a\" <s> \"b\" | \"\";";

    #[test]
    fn test_uncompressed_roundtrip() {
        let (unc, _) = build(SRC);
        let mut buf = Vec::new();
        unc.write(&mut buf).unwrap();
        let reparsed = Tables::parse(&String::from_utf8(buf).unwrap()).unwrap();
        assert_eq!(unc, reparsed);
        assert_eq!(reparsed.name, "roundtrip");
        assert_eq!(reparsed.context, 4);
        assert_eq!(reparsed.defcost, 7);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let (_, comp) = build(SRC);
        let mut buf = Vec::new();
        comp.write(&mut buf).unwrap();
        let reparsed = Tables::parse(&String::from_utf8(buf).unwrap()).unwrap();
        assert_eq!(comp, reparsed);
    }

    #[test]
    fn test_decode_equivalence() {
        let (unc, comp) = build(SRC);
        for s in 1..=unc.snumber {
            for c in 0..=EOF_COL {
                assert_eq!(unc.scan_next(s as u32, c), comp.scan_next(s as u32, c));
            }
        }
        for s in 1..=unc.pnumber {
            for c in 0..unc.cols_len() {
                assert_eq!(unc.action(s as u32, c), comp.action(s as u32, c));
            }
        }
    }

    #[test]
    fn test_costs_and_names() {
        let (unc, _) = build(SRC);
        // Token 1 is eof; "a" and "b" follow in declaration order.
        assert_eq!(unc.names[1], "$eof");
        let a = unc.names.iter().position(|n| n == "a").unwrap();
        assert_eq!(unc.inscost[a], 2);
        assert_eq!(unc.delcost[a], 3);
        let b = unc.names.iter().position(|n| n == "b").unwrap();
        assert_eq!(unc.inscost[b], 7);
        // 80-column wrapping.
        let mut buf = Vec::new();
        unc.write(&mut buf).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.lines().skip(1).all(|l| l.len() <= 81));
    }
}
