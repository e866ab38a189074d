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

//! The various index types are all unsigned 32 bit integers under the hood, but wrapping them
//! into distinct newtypes means one index class can't silently be used where another was meant.
//! All of them convert infallibly to `usize` for slice indexing.

use std::mem::size_of;

use num_traits;

macro_rules! idx_newtype {
    ($(#[$attr:meta])* $n:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $n(pub u32);

        impl From<$n> for usize {
            fn from($n(v): $n) -> usize {
                debug_assert!(size_of::<usize>() >= size_of::<u32>());
                num_traits::cast(v).unwrap()
            }
        }

        impl From<$n> for u32 {
            fn from($n(v): $n) -> u32 {
                v
            }
        }

        impl From<usize> for $n {
            fn from(v: usize) -> $n {
                debug_assert!(num_traits::cast::<usize, u32>(v).is_some());
                $n(v as u32)
            }
        }
    };
}

idx_newtype!(
    /// A type specifically for token (terminal) numbers. Token number 0 is reserved; the
    /// end-of-file sentinel is `TIdx(1)`.
    TIdx
);
idx_newtype!(
    /// A type specifically for rule (nonterminal) indices. The synthetic goal rule is
    /// `RIdx(1)`.
    RIdx
);
idx_newtype!(
    /// A type specifically for production indices. The synthetic start production is
    /// `PIdx(1)`.
    PIdx
);
idx_newtype!(
    /// A type specifically for symbol positions within a production's right-hand side.
    SIdx
);
idx_newtype!(
    /// A type specifically for symbol table entries. The wrapped value is the symbol's
    /// `order`: it increases monotonically with allocation and is the sort key for symbol
    /// sets.
    SymIdx
);

#[cfg(test)]
mod test {
    use super::{PIdx, SymIdx, TIdx};

    #[test]
    fn test_roundtrip() {
        assert_eq!(usize::from(TIdx(7)), 7);
        assert_eq!(TIdx::from(7usize), TIdx(7));
        assert_eq!(u32::from(PIdx(3)), 3);
    }

    #[test]
    fn test_order_is_sort_key() {
        let mut v = vec![SymIdx(5), SymIdx(1), SymIdx(3)];
        v.sort();
        assert_eq!(v, vec![SymIdx(1), SymIdx(3), SymIdx(5)]);
    }
}
