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

//! The runtime half of the translator generator: a compressed-table scanner interpreter, a
//! queued-reduce LALR driver, and a locally least-cost error repair engine that inserts and
//! deletes tokens to recover from syntax errors without help from the grammar author. All of
//! it is driven from a [`Tables`](../sdtable/tablefile/struct.Tables.html) value loaded from a
//! tables file, plus two user callbacks: one fired per semantic action number, one handed the
//! text of every INSTALL-flagged token.

extern crate cactus;
extern crate sdgrammar;
extern crate sdlex;
extern crate sdtable;

pub mod buffers;
pub mod msgs;
pub mod parser;
pub mod repair;
pub mod scanner;

pub use buffers::{BufferList, Location};
pub use msgs::MessageQueue;
pub use parser::{ActionCtx, Outcome, Translator, TranslatorActions};
pub use scanner::{Lexer, ScannedToken};
