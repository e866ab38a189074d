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

//! The symbol store. Terminals, nonterminals, and named regex definitions are interned here;
//! identity is the pair (kind, name), so a terminal and a nonterminal may share a spelling.
//! Every allocated symbol receives a monotonically increasing `order` (its `SymIdx`), which is
//! the sort key everywhere symbols are collected into ordered sets. Deleting a symbol removes
//! its name binding but never reuses its `order`.

use indexmap::IndexMap;

use idxnewtype::SymIdx;
use rx::Regex;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SymbolKind {
    Terminal,
    Nonterminal,
    Definition
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Assoc {
    Left,
    Right,
    None
}

/// Token attributes of a terminal. Token numbers are assigned by `Grammar::new`, not here;
/// until then `token` is 0.
#[derive(Clone, Debug)]
pub struct TokenAttrs {
    pub token: u32,
    pub prec: Option<u32>,
    pub assoc: Option<Assoc>,
    /// Insertion cost for error repair; `None` falls back to the DEFAULT COST.
    pub inscost: Option<u32>,
    /// Deletion cost for error repair; `None` falls back to the DEFAULT COST.
    pub delcost: Option<u32>,
    pub install: bool,
    pub caseless: bool,
    pub empty: bool,
    /// Aliases chain to a base terminal and share its token number, but carry their own flags
    /// and costs.
    pub alias_of: Option<SymIdx>
}

impl TokenAttrs {
    pub fn new() -> TokenAttrs {
        TokenAttrs {
            token: 0,
            prec: None,
            assoc: None,
            inscost: None,
            delcost: None,
            install: false,
            caseless: false,
            empty: false,
            alias_of: None
        }
    }
}

#[derive(Clone, Debug)]
pub enum SymData {
    Terminal(TokenAttrs),
    Nonterminal,
    Definition(Option<Regex>)
}

#[derive(Clone, Debug)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub order: SymIdx,
    pub data: SymData
}

impl SymbolEntry {
    /// The token attributes of a terminal entry.
    pub fn attrs(&self) -> Option<&TokenAttrs> {
        match self.data {
            SymData::Terminal(ref a) => Some(a),
            _ => None
        }
    }

    pub fn attrs_mut(&mut self) -> Option<&mut TokenAttrs> {
        match self.data {
            SymData::Terminal(ref mut a) => Some(a),
            _ => None
        }
    }
}

/// What `lookup` should do when the name is (or is not) found.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableAction {
    /// Return the symbol if present.
    Lookup,
    /// Return the symbol, allocating it if absent.
    Insert,
    /// Unbind the name and return the symbol it was bound to. The entry's `order` is never
    /// reused.
    Delete
}

#[derive(Debug)]
pub struct SymbolTable {
    names: IndexMap<(SymbolKind, String), SymIdx>,
    syms: Vec<SymbolEntry>
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            names: IndexMap::new(),
            syms: Vec::new()
        }
    }

    pub fn lookup(&mut self, name: &str, kind: SymbolKind, action: TableAction) -> Option<SymIdx> {
        let found = self.names.get(&(kind, name.to_owned())).cloned();
        match action {
            TableAction::Lookup => found,
            TableAction::Insert => match found {
                Some(i) => Some(i),
                None => Some(self.alloc_symbol(name, kind))
            },
            TableAction::Delete => {
                if found.is_some() {
                    self.names.remove(&(kind, name.to_owned()));
                }
                found
            }
        }
    }

    /// Allocate a fresh symbol with the next `order`, unconditionally binding `name`.
    pub fn alloc_symbol(&mut self, name: &str, kind: SymbolKind) -> SymIdx {
        let order = SymIdx::from(self.syms.len());
        let data = match kind {
            SymbolKind::Terminal => SymData::Terminal(TokenAttrs::new()),
            SymbolKind::Nonterminal => SymData::Nonterminal,
            SymbolKind::Definition => SymData::Definition(None)
        };
        self.syms.push(SymbolEntry {
            name: name.to_owned(),
            kind,
            order,
            data
        });
        self.names.insert((kind, name.to_owned()), order);
        order
    }

    pub fn sym(&self, idx: SymIdx) -> &SymbolEntry {
        &self.syms[usize::from(idx)]
    }

    pub fn sym_mut(&mut self, idx: SymIdx) -> &mut SymbolEntry {
        &mut self.syms[usize::from(idx)]
    }

    /// Resolve an alias chain to its base terminal. Alias-of-alias is rejected at parse time,
    /// so a single hop suffices.
    pub fn base_of(&self, idx: SymIdx) -> SymIdx {
        match self.sym(idx).attrs().and_then(|a| a.alias_of) {
            Some(base) => base,
            None => idx
        }
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    /// All allocated symbols in `order` order, including ones whose names were later deleted.
    pub fn iter(&self) -> ::std::slice::Iter<SymbolEntry> {
        self.syms.iter()
    }
}

#[cfg(test)]
mod test {
    use super::{SymbolKind, SymbolTable, TableAction};

    #[test]
    fn test_insert_lookup() {
        let mut st = SymbolTable::new();
        let a = st
            .lookup("a", SymbolKind::Terminal, TableAction::Insert)
            .unwrap();
        assert_eq!(
            st.lookup("a", SymbolKind::Terminal, TableAction::Lookup),
            Some(a)
        );
        assert_eq!(
            st.lookup("a", SymbolKind::Terminal, TableAction::Insert),
            Some(a)
        );
        assert_eq!(st.lookup("b", SymbolKind::Terminal, TableAction::Lookup), None);
    }

    #[test]
    fn test_kinds_are_distinct_namespaces() {
        let mut st = SymbolTable::new();
        let t = st
            .lookup("x", SymbolKind::Terminal, TableAction::Insert)
            .unwrap();
        let n = st
            .lookup("x", SymbolKind::Nonterminal, TableAction::Insert)
            .unwrap();
        assert!(t != n);
    }

    #[test]
    fn test_delete_keeps_order() {
        let mut st = SymbolTable::new();
        let a = st
            .lookup("a", SymbolKind::Definition, TableAction::Insert)
            .unwrap();
        assert_eq!(
            st.lookup("a", SymbolKind::Definition, TableAction::Delete),
            Some(a)
        );
        assert_eq!(
            st.lookup("a", SymbolKind::Definition, TableAction::Lookup),
            None
        );
        // A re-insert allocates a fresh order.
        let b = st
            .lookup("a", SymbolKind::Definition, TableAction::Insert)
            .unwrap();
        assert!(b > a);
        assert_eq!(st.len(), 2);
    }
}
