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

//! The scanner interpreter. Maximal munch over the (possibly compressed) DFA, rolling the
//! position back to the selected token's last-crossed end marker, which is what makes
//! trailing context work. Matches of ignored regexes (token numbers above the real range)
//! loop silently; an undefined character records a scanner error and resumes one byte on.

use std::io::{self, Read};

use sdlex::EOF_COL;
use sdtable::Tables;

use buffers::{BufferList, Location};
use msgs::MessageQueue;

#[derive(Clone, Debug)]
pub struct ScannedToken {
    pub token: u32,
    /// Start of the token's text.
    pub locus: Location,
    /// One past the end of the token's text.
    pub end: Location,
    /// Captured text of INSTALL-flagged tokens.
    pub symbol: Option<String>
}

pub struct Lexer<'a, R: Read> {
    tables: &'a Tables,
    pub bufs: BufferList<R>,
    pos: Location
}

impl<'a, R: Read> Lexer<'a, R> {
    pub fn new(tables: &'a Tables, reader: R, block: usize) -> Lexer<'a, R> {
        Lexer {
            tables,
            bufs: BufferList::new(reader, block),
            pos: Location::start()
        }
    }

    /// The next real token. Never fails to produce one: at end of input it returns the eof
    /// sentinel over and over.
    pub fn next_token(&mut self, msgs: &mut MessageQueue) -> io::Result<ScannedToken> {
        loop {
            let start = self.bufs.norm(self.pos)?;
            let mut st = 1u32;
            let mut cur = start;
            let mut best: Option<(u32, bool)> = None;
            let mut ends: Vec<Location> = vec![start; self.tables.ntokens + 1];
            loop {
                let (col, next_cur) = match self.bufs.byte(cur)? {
                    Some(b) => (b as usize, self.bufs.advance(cur)?),
                    None => (EOF_COL, cur)
                };
                let nxt = self.tables.scan_next(st, col);
                if nxt == 0 {
                    break;
                }
                st = nxt;
                cur = next_cur;
                for &t in &self.tables.tokenends[st as usize] {
                    ends[t as usize] = cur;
                }
                if self.tables.finals[st as usize] != 0 {
                    best = Some((
                        self.tables.finals[st as usize],
                        self.tables.install[st as usize]
                    ));
                }
                if col == EOF_COL {
                    break;
                }
            }

            let (token, install) = match best {
                Some(b) => b,
                None => {
                    // Undefined character: report it and resume one byte on.
                    let next = self.bufs.advance(start)?;
                    msgs.record_scan_error(start, next);
                    self.pos = next;
                    continue;
                }
            };
            let end = ends[token as usize];
            if token as usize > self.tables.tnumber {
                // An ignored regex; loop without emitting. A zero-length match cannot make
                // progress and is treated like an undefined character.
                if end == start {
                    let next = self.bufs.advance(start)?;
                    msgs.record_scan_error(start, next);
                    self.pos = next;
                } else {
                    self.pos = end;
                }
                continue;
            }
            self.pos = end;
            let symbol = if install {
                let bytes = self.bufs.copy_span(start, end);
                Some(String::from_utf8_lossy(&bytes).into_owned())
            } else {
                None
            };
            return Ok(ScannedToken {
                token,
                locus: start,
                end,
                symbol
            });
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;
    use sdlex::LexTables;
    use sdtable::{from_grammar, Tables};

    use super::Lexer;
    use msgs::MessageQueue;

    fn tables(src: &str) -> Tables {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let lex = LexTables::new(&grm, &symtab, &ast).unwrap();
        let (_, st) = from_grammar(&grm).unwrap();
        Tables::compressed(&grm, &lex, &st)
    }

    fn scan_all(tables: &Tables, input: &str, block: usize) -> (Vec<u32>, usize) {
        let mut msgs = MessageQueue::new();
        let mut lexer = Lexer::new(tables, Cursor::new(input.as_bytes().to_vec()), block);
        let mut toks = Vec::new();
        loop {
            let t = lexer.next_token(&mut msgs).unwrap();
            if t.token == tables.eof_token() {
                break;
            }
            toks.push(t.token);
        }
        (toks, msgs.count)
    }

    const SRC: &'static str = "IDENT t;
         SCANNER int = [0-9]+, INSTALL; \"+\"; IGNORE = ' '+;
         PARSER <e> = <e> \"+\" int | int;";

    #[test]
    fn test_scan_stream() {
        let t = tables(SRC);
        let (toks, errs) = scan_all(&t, "12 + 34+5", 4);
        assert_eq!(toks.len(), 5);
        assert_eq!(errs, 0);
    }

    #[test]
    fn test_undefined_chars_coalesce() {
        let t = tables(SRC);
        let (toks, errs) = scan_all(&t, "1 ?! 2", 4);
        assert_eq!(toks.len(), 2);
        // "?!" is two adjacent undefined characters but one coalesced message.
        assert_eq!(errs, 1);
    }

    #[test]
    fn test_install_across_block_boundary() {
        let t = tables(SRC);
        let mut msgs = MessageQueue::new();
        // A block size of 1 forces every byte into its own buffer.
        let mut lexer = Lexer::new(&t, Cursor::new(b"007".to_vec()), 1);
        let tok = lexer.next_token(&mut msgs).unwrap();
        assert_eq!(tok.symbol.as_ref().unwrap(), "007");
    }
}
