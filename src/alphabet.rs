//! Alphabets over which words and automata are defined.
//!
//! A plain [`Alphabet`] is an ordered sequence of distinct symbols. The
//! pushdown variants additionally partition the symbols into internal, call
//! and return classes; the classes must be disjoint, and violating this is a
//! caller error that is rejected on construction.

use std::fmt::Debug;
use std::hash::Hash;

/// A symbol is any small copyable value that can label transitions.
pub trait Symbol: Copy + Eq + Hash + Ord + Debug {}

impl<T: Copy + Eq + Hash + Ord + Debug> Symbol for T {}

/// The class a symbol belongs to in a visibly pushdown alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Internal,
    Call,
    Return,
}

/// An ordered alphabet of distinct symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet<S: Symbol> {
    symbols: Vec<S>,
}

impl<S: Symbol> Alphabet<S> {
    pub fn new(symbols: impl IntoIterator<Item = S>) -> Self {
        let symbols: Vec<S> = symbols.into_iter().collect();
        for (i, sym) in symbols.iter().enumerate() {
            assert!(
                !symbols[..i].contains(sym),
                "alphabet symbols must be distinct, got {sym:?} twice"
            );
        }
        Self { symbols }
    }

    pub fn contains(&self, sym: S) -> bool {
        self.symbols.contains(&sym)
    }

    /// Appends a symbol, used when the alphabet grows mid-learning.
    pub fn push(&mut self, sym: S) {
        assert!(
            !self.contains(sym),
            "symbol {sym:?} is already part of the alphabet"
        );
        self.symbols.push(sym);
    }

    pub fn universe(&self) -> impl Iterator<Item = S> + '_ {
        self.symbols.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A visibly pushdown alphabet: internal, call and return symbols.
///
/// Whether a step pushes, pops or leaves the stack alone is determined purely
/// by the class of the consumed symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpaAlphabet<S: Symbol> {
    internals: Vec<S>,
    calls: Vec<S>,
    returns: Vec<S>,
}

impl<S: Symbol> VpaAlphabet<S> {
    pub fn new(
        internals: impl IntoIterator<Item = S>,
        calls: impl IntoIterator<Item = S>,
        returns: impl IntoIterator<Item = S>,
    ) -> Self {
        let internals: Vec<S> = internals.into_iter().collect();
        let calls: Vec<S> = calls.into_iter().collect();
        let returns: Vec<S> = returns.into_iter().collect();
        let merged = Alphabet::new(
            internals
                .iter()
                .chain(calls.iter())
                .chain(returns.iter())
                .copied(),
        );
        debug_assert_eq!(merged.len(), internals.len() + calls.len() + returns.len());
        Self {
            internals,
            calls,
            returns,
        }
    }

    pub fn classify(&self, sym: S) -> SymbolKind {
        self.try_classify(sym)
            .unwrap_or_else(|| panic!("symbol {sym:?} is not part of the alphabet"))
    }

    pub fn try_classify(&self, sym: S) -> Option<SymbolKind> {
        if self.internals.contains(&sym) {
            Some(SymbolKind::Internal)
        } else if self.calls.contains(&sym) {
            Some(SymbolKind::Call)
        } else if self.returns.contains(&sym) {
            Some(SymbolKind::Return)
        } else {
            None
        }
    }

    pub fn internals(&self) -> impl Iterator<Item = S> + '_ {
        self.internals.iter().copied()
    }

    pub fn calls(&self) -> impl Iterator<Item = S> + '_ {
        self.calls.iter().copied()
    }

    pub fn returns(&self) -> impl Iterator<Item = S> + '_ {
        self.returns.iter().copied()
    }

    /// Appends an internal symbol, used when the alphabet grows mid-learning.
    pub fn push_internal(&mut self, sym: S) {
        assert!(
            self.try_classify(sym).is_none(),
            "symbol {sym:?} is already part of the alphabet"
        );
        self.internals.push(sym);
    }

    /// All symbols in class order: internals, then calls, then returns.
    pub fn universe(&self) -> impl Iterator<Item = S> + '_ {
        self.internals().chain(self.calls()).chain(self.returns())
    }
}

/// The alphabet of a system of procedural automata: internal symbols, one
/// call symbol per procedure, and a single shared return symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaAlphabet<S: Symbol> {
    internals: Vec<S>,
    calls: Vec<S>,
    return_symbol: S,
}

impl<S: Symbol> SpaAlphabet<S> {
    pub fn new(
        internals: impl IntoIterator<Item = S>,
        calls: impl IntoIterator<Item = S>,
        return_symbol: S,
    ) -> Self {
        let internals: Vec<S> = internals.into_iter().collect();
        let calls: Vec<S> = calls.into_iter().collect();
        let merged = Alphabet::new(
            internals
                .iter()
                .chain(calls.iter())
                .chain(std::iter::once(&return_symbol))
                .copied(),
        );
        debug_assert_eq!(merged.len(), internals.len() + calls.len() + 1);
        Self {
            internals,
            calls,
            return_symbol,
        }
    }

    pub fn classify(&self, sym: S) -> SymbolKind {
        self.try_classify(sym)
            .unwrap_or_else(|| panic!("symbol {sym:?} is not part of the alphabet"))
    }

    pub fn try_classify(&self, sym: S) -> Option<SymbolKind> {
        if sym == self.return_symbol {
            Some(SymbolKind::Return)
        } else if self.calls.contains(&sym) {
            Some(SymbolKind::Call)
        } else if self.internals.contains(&sym) {
            Some(SymbolKind::Internal)
        } else {
            None
        }
    }

    pub fn internals(&self) -> impl Iterator<Item = S> + '_ {
        self.internals.iter().copied()
    }

    pub fn calls(&self) -> impl Iterator<Item = S> + '_ {
        self.calls.iter().copied()
    }

    pub fn return_symbol(&self) -> S {
        self.return_symbol
    }

    /// Appends an internal symbol, used when the alphabet grows mid-learning.
    pub fn push_internal(&mut self, sym: S) {
        assert!(
            self.try_classify(sym).is_none(),
            "symbol {sym:?} is already part of the alphabet"
        );
        self.internals.push(sym);
    }

    /// The alphabet a single procedure's DFA is learned over: internal
    /// symbols plus the call symbols, with calls treated as atomic letters.
    pub fn local(&self) -> Alphabet<S> {
        Alphabet::new(self.internals().chain(self.calls()))
    }

    pub fn universe(&self) -> impl Iterator<Item = S> + '_ {
        self.internals()
            .chain(self.calls())
            .chain(std::iter::once(self.return_symbol))
    }
}
