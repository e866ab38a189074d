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

//! Regex trees. Both the lexical structure (DEFINE/SCANNER sections) and the context-free
//! syntax (PARSER section) of a grammar file are parsed into trees of this type; the scanner
//! builder turns the former into an NFA, while `Grammar::new` standardizes the latter into a
//! production list. Nodes exclusively own their children, so a deep clone (`copy_tree`) is the
//! only way to share a subtree.

use vob::Vob;

use idxnewtype::SymIdx;

/// Operators of internal regex nodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegexOp {
    /// Concatenation of an ordered child list.
    Cat,
    /// Alternation of an ordered child list.
    Alt,
    /// Zero or more repetitions of a single child.
    Star,
    /// One or more repetitions of a single child.
    Plus,
    /// Zero or one occurrence of a single child.
    Opt,
    /// Byte-set difference of two single-byte children.
    Diff,
    /// Byte-set complement of a single-byte child.
    Not,
    /// Trailing context: the token text is the first child, which must be followed by the
    /// second. Flattening places a `Lookahead` leaf at the cut point.
    Look
}

#[derive(Clone, Debug, PartialEq)]
pub enum Regex {
    /// Matches the empty string.
    Epsilon,
    /// The cut point of a trailing-context regex: scanning continues past it, but the matched
    /// token's text ends here.
    Lookahead,
    /// A reference to a symbol: a terminal (the accept tag at the end of each scanner
    /// alternative) or, in production trees, any grammar symbol.
    Reference(SymIdx),
    /// A literal byte sequence.
    Character(Vec<u8>),
    /// A set of single bytes.
    Class(Vob),
    /// The NUL byte.
    ZeroByte,
    /// End of input.
    EndOfFile,
    /// A semantic action marker.
    Semantic(u32),
    Node(RegexOp, Vec<Regex>),
    /// Bounded repetition `{r} m : n` of the child.
    Repeat(Box<Regex>, u32, u32)
}

/// What kind of single-character matcher a leaf is, for listings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CharType {
    Character,
    CharacterClass,
    Other
}

impl Regex {
    /// Deep-clone this tree. Trees exclusively own their children, so this is the only way to
    /// use one subtree in two places.
    pub fn copy_tree(&self) -> Regex {
        self.clone()
    }

    /// Build a concatenation, collapsing the degenerate cases.
    pub fn cat(mut children: Vec<Regex>) -> Regex {
        match children.len() {
            0 => Regex::Epsilon,
            1 => children.pop().unwrap(),
            _ => Regex::Node(RegexOp::Cat, children)
        }
    }

    /// Build an alternation, collapsing the degenerate cases.
    pub fn alt(mut children: Vec<Regex>) -> Regex {
        match children.len() {
            0 => Regex::Epsilon,
            1 => children.pop().unwrap(),
            _ => Regex::Node(RegexOp::Alt, children)
        }
    }

    /// Append `child` as the new last child. Only meaningful on internal nodes.
    pub fn append_child(&mut self, child: Regex) {
        match *self {
            Regex::Node(_, ref mut children) => children.push(child),
            _ => debug_assert!(false, "append_child on a leaf")
        }
    }

    /// Insert `child` as the new first child. Only meaningful on internal nodes.
    pub fn prefix_child(&mut self, child: Regex) {
        match *self {
            Regex::Node(_, ref mut children) => children.insert(0, child),
            _ => debug_assert!(false, "prefix_child on a leaf")
        }
    }

    /// The tail of the child list, if this is an internal node.
    pub fn last_child(&self) -> Option<&Regex> {
        match *self {
            Regex::Node(_, ref children) => children.last(),
            _ => None
        }
    }

    pub fn char_type(&self) -> CharType {
        match *self {
            Regex::Character(ref bs) if bs.len() == 1 => CharType::Character,
            Regex::ZeroByte => CharType::Character,
            Regex::Class(_) => CharType::CharacterClass,
            Regex::Node(RegexOp::Not, _) | Regex::Node(RegexOp::Diff, _) => {
                CharType::CharacterClass
            }
            _ => CharType::Other
        }
    }

    /// If this subtree matches exactly one byte, the set of bytes it matches. `Diff`, `Not`,
    /// and single-byte alternations fold into plain classes here; the scanner builder relies
    /// on that to turn them into transition edges.
    pub fn byte_set(&self) -> Option<Vob> {
        match *self {
            Regex::Character(ref bs) if bs.len() == 1 => {
                let mut v = Vob::from_elem(256, false);
                v.set(bs[0] as usize, true);
                Some(v)
            }
            Regex::ZeroByte => {
                let mut v = Vob::from_elem(256, false);
                v.set(0, true);
                Some(v)
            }
            Regex::Class(ref v) => Some(v.clone()),
            Regex::Node(RegexOp::Not, ref children) => {
                debug_assert_eq!(children.len(), 1);
                let inner = children[0].byte_set()?;
                let mut v = Vob::from_elem(256, false);
                for b in 0..256 {
                    if !inner[b] {
                        v.set(b, true);
                    }
                }
                Some(v)
            }
            Regex::Node(RegexOp::Diff, ref children) => {
                debug_assert_eq!(children.len(), 2);
                let lhs = children[0].byte_set()?;
                let rhs = children[1].byte_set()?;
                let mut v = Vob::from_elem(256, false);
                for b in 0..256 {
                    if lhs[b] && !rhs[b] {
                        v.set(b, true);
                    }
                }
                Some(v)
            }
            Regex::Node(RegexOp::Alt, ref children) => {
                let mut v = Vob::from_elem(256, false);
                for c in children {
                    let cv = c.byte_set()?;
                    v.or(&cv);
                }
                Some(v)
            }
            _ => None
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CharType, Regex, RegexOp};
    use vob::Vob;

    fn class_of(bytes: &[u8]) -> Regex {
        let mut v = Vob::from_elem(256, false);
        for &b in bytes {
            v.set(b as usize, true);
        }
        Regex::Class(v)
    }

    #[test]
    fn test_char_type() {
        assert_eq!(Regex::Character(vec![b'a']).char_type(), CharType::Character);
        assert_eq!(Regex::Character(vec![b'a', b'b']).char_type(), CharType::Other);
        assert_eq!(class_of(b"0123456789").char_type(), CharType::CharacterClass);
        assert_eq!(Regex::Epsilon.char_type(), CharType::Other);
    }

    #[test]
    fn test_byte_set_diff_not() {
        let diff = Regex::Node(
            RegexOp::Diff,
            vec![class_of(b"abcde"), class_of(b"ace")]
        );
        let v = diff.byte_set().unwrap();
        assert!(v[b'b' as usize] && v[b'd' as usize]);
        assert!(!v[b'a' as usize] && !v[b'c' as usize] && !v[b'e' as usize]);

        let not = Regex::Node(RegexOp::Not, vec![class_of(b"\n")]);
        let v = not.byte_set().unwrap();
        assert!(v[b'x' as usize]);
        assert!(!v[b'\n' as usize]);
    }

    #[test]
    fn test_byte_set_refuses_multibyte() {
        assert!(Regex::Character(vec![b'a', b'b']).byte_set().is_none());
        let cat = Regex::cat(vec![Regex::Character(vec![b'a']), Regex::Character(vec![b'b'])]);
        assert!(cat.byte_set().is_none());
    }

    #[test]
    fn test_append_prefix() {
        let mut n = Regex::Node(RegexOp::Cat, vec![Regex::Character(vec![b'b'])]);
        n.append_child(Regex::Character(vec![b'c']));
        n.prefix_child(Regex::Character(vec![b'a']));
        match n {
            Regex::Node(RegexOp::Cat, ref children) => {
                assert_eq!(children.len(), 3);
                assert_eq!(children[0], Regex::Character(vec![b'a']));
                assert_eq!(n.last_child(), Some(&Regex::Character(vec![b'c'])));
            }
            _ => panic!()
        }
    }
}
