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

extern crate getopts;
extern crate sdgrammar;
extern crate sdlex;
extern crate sdtable;

use std::env;
use std::fs::File;
use std::io::{stderr, stdin, stdout, Read, Write};
use std::path::Path;
use std::process;

use getopts::Options;

use sdgrammar::firsts::Firsts;
use sdgrammar::parser::parse_grammar;
use sdgrammar::{Grammar, Symbol};
use sdlex::LexTables;
use sdtable::stategraph::is_complete;
use sdtable::{from_grammar, StateGraph, StateTable, Tables};

fn usage(prog: &str, msg: &str) -> ! {
    if !msg.is_empty() {
        writeln!(&mut stderr(), "{}", msg).ok();
    }
    let path = Path::new(prog);
    let leaf = path
        .file_name()
        .map(|x| x.to_str().unwrap_or("nimblegen"))
        .unwrap_or("nimblegen");
    writeln!(
        &mut stderr(),
        "Usage: {} [-glqrtvx] [-d adefgimnps] [-w tables-file] [grammar-file]",
        leaf
    )
    .ok();
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let prog = &args[0];
    let mut opts = Options::new();
    opts.optflag("h", "help", "");
    opts.optflag("g", "", "list the grammar's productions");
    opts.optflag("l", "", "list the scanner's tokens");
    opts.optflag("q", "", "suppress the banner");
    opts.optflag("r", "", "list states and gotos");
    opts.optflag("t", "", "print table statistics");
    opts.optflag("v", "", "verbose: implies -g -l -r -t");
    opts.optflag("x", "", "cross-reference conflicts and repair values");
    opts.optopt("d", "", "debug dumps (any of adefgimnps)", "LETTERS");
    opts.optopt("w", "", "tables file path ('-' for stdout)", "PATH");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => usage(prog, f.to_string().as_str())
    };
    if matches.opt_present("h") {
        usage(prog, "");
    }
    if matches.free.len() > 1 {
        usage(prog, "Too many grammar files");
    }

    let verbose = matches.opt_present("v");
    let list_g = matches.opt_present("g") || verbose;
    let list_l = matches.opt_present("l") || verbose;
    let list_r = matches.opt_present("r") || verbose;
    let list_t = matches.opt_present("t") || verbose;
    let list_x = matches.opt_present("x");
    let quiet = matches.opt_present("q");
    let debug = matches.opt_str("d").unwrap_or_else(String::new);
    let wpath = matches
        .opt_str("w")
        .unwrap_or_else(|| "tables.dat".to_owned());

    let mut src = String::new();
    match matches.free.first() {
        Some(p) => match File::open(p).and_then(|mut f| f.read_to_string(&mut src)) {
            Ok(_) => (),
            Err(e) => {
                writeln!(&mut stderr(), "Can't read {}: {}", p, e).ok();
                process::exit(1);
            }
        },
        None => {
            if stdin().read_to_string(&mut src).is_err() {
                writeln!(&mut stderr(), "Can't read stdin").ok();
                process::exit(1);
            }
        }
    }

    let (symtab, ast) = match parse_grammar(&src) {
        Ok(r) => r,
        Err(e) => {
            report_at(&src, e.line, e.col, &e.to_string());
            process::exit(1);
        }
    };
    if let Err(e) = ast.validate(&symtab) {
        writeln!(&mut stderr(), "{}", e).ok();
        process::exit(1);
    }
    let grm = Grammar::new(&symtab, &ast);
    if !quiet {
        println!("nimblegen: {}", grm.name);
        if let Some(ref t) = grm.title {
            println!("{}", t);
        }
    }

    let lex = match LexTables::new(&grm, &symtab, &ast) {
        Ok(l) => l,
        Err(e) => {
            writeln!(&mut stderr(), "{}", e).ok();
            process::exit(1);
        }
    };

    // A conflict suppresses table emission, but the listings and dumps still run against
    // whatever stategraph the failed build left behind.
    let mut process_tables = true;
    let built = from_grammar(&grm);
    let (sg, st) = match built {
        Ok((sg, st)) => (sg, Some(st)),
        Err(e) => {
            writeln!(&mut stderr(), "{}", e).ok();
            process_tables = false;
            let firsts = Firsts::new(&grm);
            let mut sg = StateGraph::new(&grm);
            sdtable::lookahead::compute_lookaheads(&grm, &firsts, &mut sg);
            (sg, None)
        }
    };

    if list_g {
        list_grammar(&grm);
    }
    if list_l {
        list_tokens(&grm, &lex);
    }
    if list_r {
        list_states(&grm, &sg);
    }
    if list_t {
        if let Some(ref st) = st {
            list_stats(&grm, &lex, st);
        }
    }
    if list_x {
        if let Some(ref st) = st {
            list_repairs(&grm, st);
        }
    }
    for c in debug.chars() {
        dump(c, &grm, &lex, &sg, &st);
    }

    if !process_tables {
        process::exit(1);
    }
    let st = st.unwrap();
    let tables = Tables::compressed(&grm, &lex, &st);
    let r = if wpath == "-" {
        tables.write(&mut stdout())
    } else {
        File::create(&wpath).and_then(|mut f| tables.write(&mut f))
    };
    if let Err(e) = r {
        writeln!(&mut stderr(), "Can't write {}: {}", wpath, e).ok();
        process::exit(1);
    }
}

/// Reprint the offending source line with a caret under the error column.
fn report_at(src: &str, line: usize, col: usize, msg: &str) {
    if let Some(l) = src.lines().nth(line.saturating_sub(1)) {
        writeln!(&mut stderr(), "{}", l).ok();
        let mut pad = String::new();
        for (i, c) in l.chars().enumerate() {
            if i + 1 >= col {
                break;
            }
            pad.push(if c == '\t' { '\t' } else { ' ' });
        }
        writeln!(&mut stderr(), "{}^ {}", pad, msg).ok();
    } else {
        writeln!(&mut stderr(), "{}", msg).ok();
    }
}

fn sym_name(grm: &Grammar, sym: Symbol) -> String {
    match sym {
        Symbol::Token(t) => format!("\"{}\"", grm.token_name(t)),
        Symbol::Rule(r) => format!("<{}>", grm.rule_name(r))
    }
}

fn list_grammar(grm: &Grammar) {
    println!("Productions:");
    for p in grm.iter_pidxs() {
        let prod = grm.prod(p);
        let rhs: Vec<String> = prod.rhs.iter().map(|&s| sym_name(grm, s)).collect();
        let mut line = format!(
            "  {:3}  <{}> = {}",
            u32::from(p),
            grm.rule_name(prod.lhs),
            rhs.join(" ")
        );
        if prod.semantic != 0 {
            line.push_str(&format!(" #{}", prod.semantic));
        }
        println!("{}", line);
    }
}

fn list_tokens(grm: &Grammar, lex: &LexTables) {
    println!("Tokens ({} scanner states):", lex.snumber);
    for t in grm.iter_tidxs() {
        println!(
            "  {:3}  {}  insert={} delete={}",
            u32::from(t),
            grm.token_name(t),
            grm.inscost(t),
            grm.delcost(t)
        );
    }
}

fn list_states(grm: &Grammar, sg: &StateGraph) {
    for (i, state) in sg.states.iter().enumerate().skip(1) {
        println!("State {}:", i);
        for (j, it) in state.items.iter().enumerate() {
            let prod = grm.prod(it.pidx);
            let mut rhs: Vec<String> = prod.rhs.iter().map(|&s| sym_name(grm, s)).collect();
            let dot = ::std::cmp::min(usize::from(it.dot), rhs.len());
            rhs.insert(dot, ".".to_owned());
            let kind = if j < state.kernel_len { " " } else { "+" };
            println!("  {} <{}> = {}", kind, grm.rule_name(prod.lhs), rhs.join(" "));
        }
        for &(sym, tgt) in &state.gotos {
            println!("    {} -> {}", sym_name(grm, sym), usize::from(tgt));
        }
        for &(t, p) in &state.shiftreduces {
            println!(
                "    \"{}\" -> reduce {}",
                grm.token_name(t),
                u32::from(p)
            );
        }
    }
}

fn list_stats(grm: &Grammar, lex: &LexTables, st: &StateTable) {
    let nonzero: usize = st
        .actions
        .iter()
        .map(|row| row.iter().filter(|&&v| v != 0).count())
        .sum();
    println!(
        "{} tokens, {} rules, {} productions",
        grm.tokens_len(),
        grm.rules_len(),
        grm.prods_len()
    );
    println!(
        "{} scanner states, {} parser states, {} actions",
        lex.snumber,
        st.states_len(),
        nonzero
    );
}

fn list_repairs(grm: &Grammar, st: &StateTable) {
    println!("Repair values:");
    for (i, &r) in st.repair.iter().enumerate().skip(1) {
        if r > 0 {
            println!("  {:3}  shift \"{}\"", i, grm.token_name(sdgrammar::TIdx(r as u32)));
        } else if r < 0 {
            println!("  {:3}  reduce {}", i, -r);
        } else {
            println!("  {:3}  none", i);
        }
    }
}

fn dump(c: char, grm: &Grammar, lex: &LexTables, sg: &StateGraph, st: &Option<StateTable>) {
    match c {
        'a' => {
            println!("Ancestors:");
            for (i, state) in sg.states.iter().enumerate().skip(1) {
                for (j, it) in state.items.iter().enumerate() {
                    if !it.ancestors.is_empty() {
                        let a: Vec<String> = it
                            .ancestors
                            .iter()
                            .map(|&(s, k)| format!("{}.{}", usize::from(s), k))
                            .collect();
                        println!("  {}.{} <- {}", i, j, a.join(" "));
                    }
                }
            }
        }
        'd' => {
            println!("DFA: {} states", lex.snumber);
            for s in 1..=lex.snumber {
                let n = (0..=sdlex::EOF_COL)
                    .filter(|&c| lex.trans[s][c] != 0)
                    .count();
                println!("  {:3}  final={} ends={:?} edges={}", s, lex.finals[s], lex.tokenends[s], n);
            }
        }
        'e' => {
            if let Some(ref st) = *st {
                for (i, &r) in st.repair.iter().enumerate().skip(1) {
                    println!("  repair[{}] = {}", i, r);
                }
            }
        }
        'f' => {
            println!("Lookaheads:");
            for (i, state) in sg.states.iter().enumerate().skip(1) {
                for (j, it) in state.items.iter().enumerate() {
                    let toks: Vec<&str> = grm
                        .iter_tidxs()
                        .filter(|&t| it.lookahead[usize::from(t)])
                        .map(|t| grm.token_name(t))
                        .collect();
                    if is_complete(grm, it.pidx, it.dot) {
                        println!("  {}.{} reduce on {{{}}}", i, j, toks.join(" "));
                    }
                }
            }
        }
        'g' => {
            for (i, state) in sg.states.iter().enumerate().skip(1) {
                for &(sym, tgt) in &state.gotos {
                    println!("  goto({}, {}) = {}", i, sym_name(grm, sym), usize::from(tgt));
                }
            }
        }
        'i' => list_states(grm, sg),
        'm' => {
            println!("Scanner: {} minimized states", lex.snumber);
        }
        'n' => {
            println!("Scanner token space: {} of {}", lex.tnumber, lex.ntokens);
        }
        'p' => {
            println!("Propagation:");
            for (i, state) in sg.states.iter().enumerate().skip(1) {
                for (j, it) in state.items.iter().enumerate() {
                    for &(ts, ti) in &it.updates {
                        println!("  {}.{} -> {}.{}", i, j, usize::from(ts), ti);
                    }
                }
            }
        }
        's' => {
            for t in grm.iter_tidxs() {
                println!("  token {} {}", u32::from(t), grm.token_name(t));
            }
            for r in grm.iter_ridxs() {
                println!("  rule {} {}", u32::from(r), grm.rule_name(r));
            }
        }
        _ => ()
    }
}
