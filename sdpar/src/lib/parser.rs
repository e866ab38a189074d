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

//! The queued-reduce LALR driver. Reduce actions are appended to a queue rather than applied:
//! the parse stack stays exactly as it was before the reduces, and a virtual pointer
//! (`knownptr` plus a simulated state suffix) answers action lookups as if they had run. Only
//! when a terminal is actually shifted (or the input accepts) does the queue drain, firing
//! semantic actions and rewriting the real stack. The payoff is error repair: a syntax error
//! inside a run of reduces is detected before any semantic action has fired, so the repair
//! engine can patch the token queue and resume with no rollback machinery at all.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use sdtable::statetable::{decode_action, Action};
use sdtable::Tables;

use buffers::Location;
use msgs::{Message, MessageQueue};
use repair;
use repair::TokenWindow;
use scanner::{Lexer, ScannedToken};

/// Handed to semantic actions: where the reduce happened, and a way to report semantic
/// errors into the ordinary message queue.
pub struct ActionCtx<'c> {
    msgs: &'c mut MessageQueue,
    /// Location of the construct being reduced.
    pub locus: Location
}

impl<'c> ActionCtx<'c> {
    pub fn record_error(&mut self, loc: Location, msg: String) {
        self.msgs.record(loc, Some(msg));
    }
}

/// User callbacks: one per semantic action number, one per INSTALL-flagged token.
pub trait TranslatorActions {
    fn semantic_action(&mut self, ctx: &mut ActionCtx, action: u32);

    /// Transform (or just observe) an installed token's text; the returned string rides the
    /// parse stack as the token's symbol.
    fn install(&mut self, token: u32, text: &str) -> String {
        let _ = token;
        text.to_owned()
    }
}

/// What a translation run produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Outcome {
    /// False when a syntax error had no repair (the fatal path).
    pub accepted: bool,
    /// Messages reported (scanner errors, repairs, semantic errors).
    pub errors: usize
}

pub struct Translator<'a, A: TranslatorActions + 'a> {
    tables: &'a Tables,
    actions: &'a mut A,
    /// Echo every source line to the output, not just lines carrying messages.
    pub echo: bool,
    /// Input block size; tests shrink it to force tokens across buffer boundaries.
    pub block: usize
}

impl<'a, A: TranslatorActions + 'a> Translator<'a, A> {
    pub fn new(tables: &'a Tables, actions: &'a mut A) -> Translator<'a, A> {
        Translator {
            tables,
            actions,
            echo: false,
            block: 4096
        }
    }

    pub fn translate<R: Read, W: Write>(
        &mut self,
        input: R,
        output: &mut W
    ) -> io::Result<Outcome> {
        let mut driver = Driver {
            tables: self.tables,
            ts: TokenStream {
                lexer: Lexer::new(self.tables, input, self.block),
                tqueue: VecDeque::new(),
                msgs: MessageQueue::new()
            },
            out: output,
            actions: &mut *self.actions,
            echo: self.echo,
            pstack: vec![StackEnt {
                state: 1,
                locus: Location::start(),
                token: 0,
                symbol: None
            }],
            rqueue: Vec::new(),
            sim: Vec::new(),
            knownptr: 1,
            unwritten: Location::start()
        };
        driver.run()
    }
}

struct StackEnt {
    /// 0 marks a fused shift-reduce placeholder whose true state a queued reduce supplies.
    state: u32,
    locus: Location,
    token: u32,
    symbol: Option<String>
}

/// The scanner plus the lookahead queue, which is also the window the repair engine scans.
struct TokenStream<'a, R: Read + 'a> {
    lexer: Lexer<'a, R>,
    tqueue: VecDeque<ScannedToken>,
    msgs: MessageQueue
}

impl<'a, R: Read + 'a> TokenStream<'a, R> {
    fn ensure(&mut self, n: usize) -> io::Result<()> {
        while self.tqueue.len() <= n {
            let eof = {
                let t = self.lexer.next_token(&mut self.msgs)?;
                let eof = t.token == 1;
                self.tqueue.push_back(t);
                eof
            };
            if eof {
                break;
            }
        }
        Ok(())
    }
}

impl<'a, R: Read + 'a> TokenWindow for TokenStream<'a, R> {
    fn tok(&mut self, i: usize) -> io::Result<&ScannedToken> {
        self.ensure(i)?;
        let i = if i < self.tqueue.len() {
            i
        } else {
            self.tqueue.len() - 1
        };
        Ok(&self.tqueue[i])
    }
}

struct Driver<'a, 'w, R: Read + 'a, W: Write + 'w, A: TranslatorActions + 'w> {
    tables: &'a Tables,
    ts: TokenStream<'a, R>,
    out: &'w mut W,
    actions: &'w mut A,
    echo: bool,
    pstack: Vec<StackEnt>,
    /// Queued reduces, FIFO.
    rqueue: Vec<u32>,
    /// Simulated state suffix standing in for `pstack[knownptr..]`.
    sim: Vec<u32>,
    /// Lowest stack index any queued reduce has (virtually) popped.
    knownptr: usize,
    unwritten: Location
}

impl<'a, 'w, R: Read + 'a, W: Write + 'w, A: TranslatorActions + 'w> Driver<'a, 'w, R, W, A> {
    fn vtop(&self) -> u32 {
        match self.sim.last() {
            Some(&s) => s,
            None => self.pstack[self.knownptr - 1].state
        }
    }

    fn run(&mut self) -> io::Result<Outcome> {
        loop {
            self.ts.ensure(0)?;
            let (la_tok, la_loc) = {
                let t = &self.ts.tqueue[0];
                (t.token, t.locus)
            };
            let col = self.tables.token_col(la_tok);
            match decode_action(self.tables.action(self.vtop(), col)) {
                Action::Shift(st) => {
                    self.drain_reduces();
                    self.shift_la(u32::from(st))?;
                }
                Action::ShiftReduce(p) => {
                    self.drain_reduces();
                    self.shift_la(0)?;
                    if self.queue_reduce(u32::from(p)) {
                        return self.finish(true);
                    }
                }
                Action::Reduce(p) => {
                    if self.queue_reduce(u32::from(p)) {
                        // The goto walked onto accept.
                        return self.finish(true);
                    }
                }
                Action::Accept => return self.finish(true),
                Action::Error => {
                    let mut estack: Vec<u32> = self.pstack[..self.knownptr]
                        .iter()
                        .map(|e| e.state)
                        .collect();
                    estack.extend_from_slice(&self.sim);
                    if self.tables.repair[*estack.last().unwrap() as usize] == 0 {
                        self.ts
                            .msgs
                            .record(la_loc, Some("Syntax error".to_owned()));
                        return self.finish(false);
                    }
                    let plan = repair::repair(self.tables, &estack, &mut self.ts)?;
                    match plan {
                        Some(plan) => self.apply_plan(plan),
                        None => {
                            self.ts
                                .msgs
                                .record(la_loc, Some("Syntax error".to_owned()));
                            return self.finish(false);
                        }
                    }
                }
            }
        }
    }

    fn shift_la(&mut self, state: u32) -> io::Result<()> {
        let t = self.ts.tqueue.pop_front().unwrap();
        let symbol = match t.symbol {
            Some(ref s) => Some(self.actions.install(t.token, s)),
            None => None
        };
        self.pstack.push(StackEnt {
            state,
            locus: t.locus,
            token: t.token,
            symbol
        });
        self.knownptr = self.pstack.len();
        let upto = t.locus;
        self.write_lines(upto)
    }

    /// Append a reduce and move the virtual top past it. Returns true on accept.
    fn queue_reduce(&mut self, p: u32) -> bool {
        self.rqueue.push(p);
        let mut pops = self.tables.rhslength[p as usize] as usize;
        while pops > 0 && !self.sim.is_empty() {
            self.sim.pop();
            pops -= 1;
        }
        self.knownptr -= pops;
        let exposed = self.vtop();
        let goto = self
            .tables
            .action(exposed, self.tables.lhstoken[p as usize] as usize);
        match decode_action(goto) {
            Action::Shift(st) => {
                self.sim.push(u32::from(st));
                false
            }
            Action::Accept => true,
            _ => {
                debug_assert!(false, "goto lookup failed during reduce simulation");
                true
            }
        }
    }

    /// Fire every queued reduce for real: semantic actions run, the stack is popped and the
    /// goto state pushed, attributed to the location of the stack top.
    fn drain_reduces(&mut self) -> bool {
        let queued = ::std::mem::replace(&mut self.rqueue, Vec::new());
        let mut accepted = false;
        for p in queued {
            let locus = self.pstack.last().unwrap().locus;
            let sem = self.tables.semantics[p as usize];
            if sem != 0 {
                let mut ctx = ActionCtx {
                    msgs: &mut self.ts.msgs,
                    locus
                };
                self.actions.semantic_action(&mut ctx, sem);
            }
            let efflen = self.tables.rhslength[p as usize] as usize;
            let at = self.pstack.len() - efflen;
            self.pstack.truncate(at);
            let exposed = self.pstack.last().unwrap().state;
            let goto = self
                .tables
                .action(exposed, self.tables.lhstoken[p as usize] as usize);
            match decode_action(goto) {
                Action::Shift(st) => self.pstack.push(StackEnt {
                    state: u32::from(st),
                    locus,
                    token: self.tables.lhstoken[p as usize],
                    symbol: None
                }),
                Action::Accept => {
                    accepted = true;
                    break;
                }
                _ => debug_assert!(false, "goto lookup failed during reduce drain")
            }
        }
        self.sim.clear();
        self.knownptr = self.pstack.len();
        accepted
    }

    fn apply_plan(&mut self, plan: repair::RepairPlan) {
        let mut deleted: Vec<ScannedToken> =
            self.ts.tqueue.drain(..plan.deletions).collect();
        let front_loc = match self.ts.tqueue.front() {
            Some(t) => t.locus,
            None => deleted.last().map(|t| t.end).unwrap_or(Location::start())
        };
        let loc = deleted.first().map(|t| t.locus).unwrap_or(front_loc);
        for &t in plan.insertions.iter().rev() {
            // A deleted token of the same number donates its installed text to the
            // insertion replacing it.
            let symbol = deleted
                .iter_mut()
                .find(|d| d.token == t && d.symbol.is_some())
                .and_then(|d| d.symbol.take());
            self.ts.tqueue.push_front(ScannedToken {
                token: t,
                locus: front_loc,
                end: front_loc,
                symbol
            });
        }

        let del_names: Vec<&str> = deleted
            .iter()
            .map(|t| self.tables.token_name(t.token))
            .collect();
        let ins_names: Vec<&str> = plan
            .insertions
            .iter()
            .map(|&t| self.tables.token_name(t))
            .collect();
        let text = match (del_names.is_empty(), ins_names.is_empty()) {
            (false, true) => format!("Deleted: {}", del_names.join(", ")),
            (true, false) => format!("Inserted: {}", ins_names.join(", ")),
            (false, false) => format!(
                "Replaced: {} with {}",
                del_names.join(", "),
                ins_names.join(", ")
            ),
            (true, true) => "Repaired".to_owned()
        };
        self.ts.msgs.record(loc, Some(text));
    }

    fn finish(&mut self, accepted: bool) -> io::Result<Outcome> {
        if accepted {
            self.drain_reduces();
        }
        self.flush_lines()?;
        Ok(Outcome {
            accepted,
            errors: self.ts.msgs.count
        })
    }

    /// Emit every complete source line lying wholly before `upto`, with any messages carried
    /// on it, then free the buffers behind.
    fn write_lines(&mut self, upto: Location) -> io::Result<()> {
        loop {
            let (line_end, at_eof) = self.line_end()?;
            if at_eof || line_end > upto {
                return Ok(());
            }
            self.emit_line(line_end)?;
            self.unwritten = line_end;
            let un = self.unwritten;
            self.ts.lexer.bufs.drop_to(un);
        }
    }

    fn flush_lines(&mut self) -> io::Result<()> {
        loop {
            let (line_end, at_eof) = self.line_end()?;
            if self.unwritten < line_end {
                self.emit_line(line_end)?;
                self.unwritten = line_end;
            }
            if at_eof {
                break;
            }
        }
        // Anything left (messages at the very end of input) hangs off an <EOF> line.
        if !self.ts.msgs.is_empty() {
            writeln!(self.out, "<EOF>")?;
            let msgs = self.ts.msgs.drain_all();
            for m in msgs {
                self.print_message(&m, self.unwritten)?;
            }
        }
        Ok(())
    }

    /// One past the current line's newline, plus whether input ended first.
    fn line_end(&mut self) -> io::Result<(Location, bool)> {
        let mut loc = self.ts.lexer.bufs.norm(self.unwritten)?;
        loop {
            match self.ts.lexer.bufs.byte(loc)? {
                Some(b'\n') => return Ok((self.ts.lexer.bufs.advance(loc)?, false)),
                Some(_) => loc = self.ts.lexer.bufs.advance(loc)?,
                None => return Ok((loc, true))
            }
        }
    }

    fn emit_line(&mut self, line_end: Location) -> io::Result<()> {
        let msgs = self.ts.msgs.drain_before(line_end);
        if !self.echo && msgs.is_empty() {
            return Ok(());
        }
        let bytes = self.ts.lexer.bufs.copy_span(self.unwritten, line_end);
        let text = String::from_utf8_lossy(&bytes);
        write!(self.out, "{}", text)?;
        if !text.ends_with('\n') {
            writeln!(self.out)?;
        }
        let start = self.unwritten;
        for m in msgs {
            self.print_message(&m, start)?;
        }
        Ok(())
    }

    /// A caret line pointing at the message's column, tab positions preserved.
    fn print_message(&mut self, m: &Message, line_start: Location) -> io::Result<()> {
        let span = self.ts.lexer.bufs.copy_span(line_start, m.loc);
        let mut pad = String::new();
        for &b in &span {
            pad.push(if b == b'\t' { '\t' } else { ' ' });
        }
        let text = match m.text {
            Some(ref t) => t.clone(),
            None => {
                if m.end > self.ts.lexer.bufs.advance(m.loc).unwrap_or(m.end) {
                    "Illegal characters".to_owned()
                } else {
                    "Illegal character".to_owned()
                }
            }
        };
        writeln!(self.out, "{}^ {}", pad, text)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use sdgrammar::parser::parse_grammar;
    use sdgrammar::Grammar;
    use sdlex::LexTables;
    use sdtable::{from_grammar, Tables};

    use super::{Outcome, Translator, TranslatorActions};

    struct TestActions {
        log: Vec<u32>,
        installs: Vec<(u32, String)>
    }

    impl TestActions {
        fn new() -> TestActions {
            TestActions {
                log: Vec::new(),
                installs: Vec::new()
            }
        }
    }

    impl TranslatorActions for TestActions {
        fn semantic_action(&mut self, _ctx: &mut super::ActionCtx, action: u32) {
            self.log.push(action);
        }

        fn install(&mut self, token: u32, text: &str) -> String {
            self.installs.push((token, text.to_owned()));
            text.to_owned()
        }
    }

    pub fn tables(src: &str, compressed: bool) -> Tables {
        let (symtab, ast) = parse_grammar(src).unwrap();
        ast.validate(&symtab).unwrap();
        let grm = Grammar::new(&symtab, &ast);
        let lex = LexTables::new(&grm, &symtab, &ast).unwrap();
        let (_, st) = from_grammar(&grm).unwrap();
        if compressed {
            Tables::compressed(&grm, &lex, &st)
        } else {
            Tables::uncompressed(&grm, &lex, &st)
        }
    }

    fn translate(t: &Tables, input: &str) -> (Outcome, String, TestActions) {
        let mut acts = TestActions::new();
        let outcome;
        let mut out = Vec::new();
        {
            let mut tr = Translator::new(t, &mut acts);
            tr.block = 3;
            outcome = tr
                .translate(Cursor::new(input.as_bytes().to_vec()), &mut out)
                .unwrap();
        }
        (outcome, String::from_utf8(out).unwrap(), acts)
    }

    const ANBN: &'static str = "IDENT t;
         OPTIONS ERRORREPAIR;
         SCANNER \"a\", INSERT=4, DELETE=4; \"b\", INSERT=6, DELETE=6;
                 \"c\", INSERT=5, DELETE=5;
         DEFAULT COST = 10; CONTEXT = 3;
         PARSER <s> = \"a\" <s> \"b\" #2 | \"\" #1;";

    #[test]
    fn test_accepts_balanced() {
        let t = tables(ANBN, true);
        let (outcome, out, acts) = translate(&t, "aabb");
        assert_eq!(
            outcome,
            Outcome {
                accepted: true,
                errors: 0
            }
        );
        assert_eq!(out, "");
        // Innermost ε first, then the two wrapping productions.
        assert_eq!(acts.log, vec![1, 2, 2]);
    }

    #[test]
    fn test_missing_b_is_inserted() {
        let t = tables(ANBN, true);
        let (outcome, out, _) = translate(&t, "aab");
        assert!(outcome.accepted);
        assert_eq!(outcome.errors, 1);
        assert!(out.contains("Inserted: b"), "{}", out);
    }

    #[test]
    fn test_stray_token_is_deleted() {
        let t = tables(ANBN, true);
        let (outcome, out, _) = translate(&t, "acb");
        assert!(outcome.accepted);
        assert_eq!(outcome.errors, 1);
        assert!(out.contains("Deleted: c"), "{}", out);
    }

    #[test]
    fn test_unknown_char_is_scan_error_only() {
        let t = tables(ANBN, true);
        let (outcome, out, _) = translate(&t, "ab?");
        assert!(outcome.accepted);
        assert_eq!(outcome.errors, 1);
        assert!(out.contains("Illegal character"), "{}", out);
    }

    #[test]
    fn test_fatal_without_repair_tables() {
        let src = "IDENT t;
             SCANNER \"a\"; \"b\";
             PARSER <s> = \"a\" <s> \"b\" | \"\";";
        let t = tables(src, true);
        let (outcome, out, _) = translate(&t, "ba");
        assert!(!outcome.accepted);
        assert!(out.contains("Syntax error"), "{}", out);
    }

    #[test]
    fn test_install_reaches_callback() {
        let src = "IDENT t;
             SCANNER int = [0-9]+, INSTALL; \"+\";
             PARSER <e> = <e> \"+\" int | int;";
        let t = tables(src, true);
        // block = 3 forces "1234" across a buffer boundary.
        let (outcome, _, acts) = translate(&t, "12+1234");
        assert!(outcome.accepted);
        let texts: Vec<&str> = acts.installs.iter().map(|&(_, ref s)| s.as_str()).collect();
        assert_eq!(texts, vec!["12", "1234"]);
    }

    #[test]
    fn test_shiftreduce_placeholders_settle() {
        let src = "IDENT t;
             OPTIONS SHIFTREDUCE, ERRORREPAIR;
             SCANNER \"a\", INSERT=4, DELETE=4; \"b\", INSERT=6, DELETE=6;
             DEFAULT COST = 10; CONTEXT = 3;
             PARSER <s> = \"a\" <s> \"b\" #2 | \"\" #1;";
        let t = tables(src, true);
        let (outcome, _, acts) = translate(&t, "aabb");
        assert!(outcome.accepted);
        assert_eq!(acts.log, vec![1, 2, 2]);
        // And repair still works through fused actions.
        let (outcome, out, _) = translate(&t, "aab");
        assert!(outcome.accepted, "{}", out);
        assert!(out.contains("Inserted: b"), "{}", out);
    }

    #[test]
    fn test_no_terminals_after_ignore_filtering() {
        // A grammar whose scanner only ever discards input: the sole real token is eof and
        // the only parse is the empty one.
        let src = "IDENT t;
             SCANNER IGNORE = ' '+;
             PARSER <s> = \"\";";
        let t = tables(src, true);
        let (outcome, _, _) = translate(&t, "   ");
        assert!(outcome.accepted);
        assert_eq!(outcome.errors, 0);
    }

    #[test]
    fn test_semantic_error_reaches_queue() {
        struct Complainer;
        impl TranslatorActions for Complainer {
            fn semantic_action(&mut self, ctx: &mut super::ActionCtx, action: u32) {
                if action == 2 {
                    let loc = ctx.locus;
                    ctx.record_error(loc, "Too deep".to_owned());
                }
            }
        }
        let t = tables(ANBN, true);
        let mut acts = Complainer;
        let mut out = Vec::new();
        let outcome;
        {
            let mut tr = Translator::new(&t, &mut acts);
            outcome = tr
                .translate(::std::io::Cursor::new(b"ab".to_vec()), &mut out)
                .unwrap();
        }
        assert!(outcome.accepted);
        assert_eq!(outcome.errors, 1);
        assert!(String::from_utf8(out).unwrap().contains("Too deep"));
    }

    #[test]
    fn test_echo_lists_lines() {
        let t = tables(ANBN, true);
        let mut acts = TestActions::new();
        let mut out = Vec::new();
        {
            let mut tr = Translator::new(&t, &mut acts);
            tr.echo = true;
            tr.translate(Cursor::new(b"ab\n".to_vec()), &mut out).unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "ab\n");
    }
}
