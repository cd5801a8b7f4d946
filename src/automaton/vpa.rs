use std::collections::VecDeque;

use crate::alphabet::{Symbol, SymbolKind, VpaAlphabet};
use crate::math;
use crate::word::Word;
use crate::Error;

use super::{Language, StateId};

/// A configuration of a [`Vpa`]: the current state plus the call stack. Each
/// stack entry remembers the state at the time of the call and the call
/// symbol itself, which together select the return transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VpaConf<S: Symbol> {
    pub state: StateId,
    pub stack: Vec<(StateId, S)>,
}

/// A (1-module single-entry) visibly pushdown automaton.
///
/// Reading a call symbol pushes the current state together with the symbol
/// and resets to state `0`; reading a return symbol pops `(q, c)` and moves
/// along the return transition selected by `(return symbol, q, c)`. A word is
/// accepted if it ends in an accepting state with an empty stack, so words
/// with unmatched calls are rejected and an unmatched return leads to an
/// absorbing sink (represented as `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpa<S: Symbol> {
    alphabet: VpaAlphabet<S>,
    accepting: Vec<bool>,
    internals: Vec<math::Map<S, StateId>>,
    returns: Vec<math::Map<(S, StateId, S), StateId>>,
}

impl<S: Symbol> Vpa<S> {
    pub fn new(alphabet: VpaAlphabet<S>) -> Self {
        Self {
            alphabet,
            accepting: Vec::new(),
            internals: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn alphabet(&self) -> &VpaAlphabet<S> {
        &self.alphabet
    }

    pub fn add_state(&mut self, accepting: bool) -> StateId {
        self.accepting.push(accepting);
        self.internals.push(math::Map::default());
        self.returns.push(math::Map::default());
        (self.accepting.len() - 1) as StateId
    }

    pub fn size(&self) -> usize {
        self.accepting.len()
    }

    pub fn is_accepting(&self, state: StateId) -> bool {
        self.accepting[state as usize]
    }

    pub fn set_internal(&mut self, from: StateId, sym: S, to: StateId) {
        debug_assert_eq!(self.alphabet.classify(sym), SymbolKind::Internal);
        self.internals[from as usize].insert(sym, to);
    }

    pub fn set_return(&mut self, from: StateId, ret: S, saved: StateId, call: S, to: StateId) {
        debug_assert_eq!(self.alphabet.classify(ret), SymbolKind::Return);
        debug_assert_eq!(self.alphabet.classify(call), SymbolKind::Call);
        self.returns[from as usize].insert((ret, saved, call), to);
    }

    pub fn initial_conf(&self) -> VpaConf<S> {
        VpaConf {
            state: 0,
            stack: Vec::new(),
        }
    }

    /// Steps one symbol; `None` is the absorbing sink reached by an
    /// unmatched return.
    pub fn step(&self, conf: VpaConf<S>, sym: S) -> Option<VpaConf<S>> {
        let VpaConf { state, mut stack } = conf;
        match self.alphabet.classify(sym) {
            SymbolKind::Internal => {
                let next = *self.internals[state as usize].get(&sym).unwrap_or_else(|| {
                    panic!("BUG: hypothesis lacks internal transition ({state}, {sym:?})")
                });
                Some(VpaConf { state: next, stack })
            }
            SymbolKind::Call => {
                stack.push((state, sym));
                Some(VpaConf { state: 0, stack })
            }
            SymbolKind::Return => {
                let (saved, call) = stack.pop()?;
                let next = *self.returns[state as usize]
                    .get(&(sym, saved, call))
                    .unwrap_or_else(|| {
                        panic!(
                            "BUG: hypothesis lacks return transition ({state}, {sym:?}, {saved}, {call:?})"
                        )
                    });
                Some(VpaConf { state: next, stack })
            }
        }
    }

    pub fn run(&self, word: &[S]) -> Option<VpaConf<S>> {
        let mut conf = self.initial_conf();
        for &sym in word {
            conf = self.step(conf, sym)?;
        }
        Some(conf)
    }

    pub fn accepts(&self, word: &[S]) -> bool {
        match self.run(word) {
            Some(conf) => conf.stack.is_empty() && self.is_accepting(conf.state),
            None => false,
        }
    }

    /// Breadth-first search for a word of at most `depth` symbols on which
    /// the two automata disagree, deduplicating joint configurations. Exact
    /// VPA equivalence checking is out of scope, so this is bounded.
    pub fn find_separating_word(
        &self,
        other: &Self,
        depth: usize,
    ) -> Result<Option<Word<S>>, Error> {
        if self.alphabet != other.alphabet {
            return Err(Error::AlphabetMismatch);
        }
        let accept = |conf: &Option<VpaConf<S>>, vpa: &Self| match conf {
            Some(c) => c.stack.is_empty() && vpa.is_accepting(c.state),
            None => false,
        };
        let start = (Some(self.initial_conf()), Some(other.initial_conf()));
        let mut seen = math::Set::default();
        seen.insert(start.clone());
        let mut queue = VecDeque::from([(start, Vec::new())]);
        while let Some(((left, right), word)) = queue.pop_front() {
            if accept(&left, self) != accept(&right, other) {
                return Ok(Some(word));
            }
            if word.len() == depth {
                continue;
            }
            for sym in self.alphabet.universe() {
                let next = (
                    left.clone().and_then(|c| self.step(c, sym)),
                    right.clone().and_then(|c| other.step(c, sym)),
                );
                if seen.insert(next.clone()) {
                    let mut extended = word.clone();
                    extended.push(sym);
                    queue.push_back((next, extended));
                }
            }
        }
        Ok(None)
    }
}

impl<S: Symbol> Language<S> for Vpa<S> {
    type Output = bool;

    fn word_output(&self, word: &[S]) -> bool {
        self.accepts(word)
    }
}
