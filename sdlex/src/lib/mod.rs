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

//! The scanner builder: token regex trees are combined into one NFA, determinized by subset
//! construction, minimized by partition refinement, and emitted as the four scanner tables the
//! runtime drives (`finals`, token-end sets, `install` bits, and the transition matrix).
//! Ignored regexes take part exactly like tokens, but under sentinel numbers above the real
//! token range, which is how the runtime knows to loop silently over their matches.

extern crate fnv;
extern crate sdgrammar;
extern crate vob;

use std::fmt;

pub mod dfa;
pub mod nfa;

pub use dfa::LexTables;
pub use nfa::Nfa;

/// The input column used for end-of-file transitions: one past the 256 byte columns.
pub const EOF_COL: usize = 256;

#[derive(Debug, Eq, PartialEq)]
pub enum LexBuildErrorKind {
    /// `~` or `-` was applied to an operand matching more (or fewer) than single bytes.
    NotSingleByte,
    /// A trailing-context operator somewhere other than the top level of a token regex.
    NestedLookahead,
    /// A leaf that has no meaning inside a scanner regex (a production-only leaf, say).
    IllegalRegex
}

/// An error found while turning a token's regex tree into automaton fragments, tagged with the
/// token's name.
#[derive(Debug)]
pub struct LexBuildError {
    pub kind: LexBuildErrorKind,
    pub token: String
}

impl fmt::Display for LexBuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self.kind {
            LexBuildErrorKind::NotSingleByte => {
                "Complement/difference operand is not a single-byte expression"
            }
            LexBuildErrorKind::NestedLookahead => "Trailing context must be at the top level",
            LexBuildErrorKind::IllegalRegex => "Regex is not valid in a scanner"
        };
        write!(f, "{} (in token '{}')", s, self.token)
    }
}
