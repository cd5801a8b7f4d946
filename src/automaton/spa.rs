use std::collections::VecDeque;

use crate::alphabet::{SpaAlphabet, Symbol, SymbolKind};
use crate::math;
use crate::word::Word;
use crate::Error;

use super::{Dfa, Language, StateId};

/// A configuration of an [`Spa`]: a linked chain of active procedure frames
/// mirroring the call stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpaConf<S: Symbol> {
    /// Before the first symbol; only a call can leave this configuration.
    Init,
    /// The outermost procedure has returned; nothing may follow.
    Term,
    /// Absorbing reject configuration.
    Sink,
    /// Inside procedure `proc`, with its local DFA in `state`; `prev` is the
    /// configuration to resume once this procedure returns.
    Call {
        prev: Box<SpaConf<S>>,
        proc: S,
        state: StateId,
    },
}

/// A system of procedural automata: one DFA per procedure over the local
/// alphabet (internal plus call symbols), composed through the shared return
/// symbol. A word is accepted if it is a complete run of some procedure,
/// i.e. the final configuration is [`SpaConf::Term`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spa<S: Symbol> {
    alphabet: SpaAlphabet<S>,
    procs: math::Map<S, Dfa<S>>,
}

impl<S: Symbol> Spa<S> {
    pub fn from_parts(alphabet: SpaAlphabet<S>, procs: math::Map<S, Dfa<S>>) -> Self {
        Self { alphabet, procs }
    }

    pub fn alphabet(&self) -> &SpaAlphabet<S> {
        &self.alphabet
    }

    pub fn proc(&self, call: S) -> Option<&Dfa<S>> {
        self.procs.get(&call)
    }

    pub fn procs(&self) -> impl Iterator<Item = (S, &Dfa<S>)> + '_ {
        self.procs.iter().map(|(call, dfa)| (*call, dfa))
    }

    /// Total number of local states across all procedures.
    pub fn size(&self) -> usize {
        self.procs.values().map(|dfa| dfa.size()).sum()
    }

    pub fn initial_conf(&self) -> SpaConf<S> {
        SpaConf::Init
    }

    pub fn step(&self, conf: SpaConf<S>, sym: S) -> SpaConf<S> {
        match conf {
            SpaConf::Sink | SpaConf::Term => SpaConf::Sink,
            SpaConf::Init => match self.alphabet.try_classify(sym) {
                Some(SymbolKind::Call) if self.procs.contains_key(&sym) => SpaConf::Call {
                    prev: Box::new(SpaConf::Term),
                    proc: sym,
                    state: 0,
                },
                _ => SpaConf::Sink,
            },
            SpaConf::Call { prev, proc, state } => {
                let dfa = &self.procs[&proc];
                match self.alphabet.try_classify(sym) {
                    Some(SymbolKind::Internal) => SpaConf::Call {
                        prev,
                        proc,
                        state: dfa.successor(state, sym),
                    },
                    Some(SymbolKind::Call) if self.procs.contains_key(&sym) => {
                        // resume at the local successor once the callee returns
                        let resume = dfa.successor(state, sym);
                        SpaConf::Call {
                            prev: Box::new(SpaConf::Call {
                                prev,
                                proc,
                                state: resume,
                            }),
                            proc: sym,
                            state: 0,
                        }
                    }
                    Some(SymbolKind::Return) if *dfa.output(state) => *prev,
                    _ => SpaConf::Sink,
                }
            }
        }
    }

    pub fn run(&self, word: &[S]) -> SpaConf<S> {
        let mut conf = self.initial_conf();
        for &sym in word {
            conf = self.step(conf, sym);
        }
        conf
    }

    pub fn accepts(&self, word: &[S]) -> bool {
        self.run(word) == SpaConf::Term
    }

    /// Bounded breadth-first search for a word on which the two systems
    /// disagree, deduplicating joint configurations.
    pub fn find_separating_word(
        &self,
        other: &Self,
        depth: usize,
    ) -> Result<Option<Word<S>>, Error> {
        if self.alphabet != other.alphabet {
            return Err(Error::AlphabetMismatch);
        }
        let start = (self.initial_conf(), other.initial_conf());
        let mut seen = math::Set::default();
        seen.insert(start.clone());
        let mut queue = VecDeque::from([(start, Vec::new())]);
        while let Some(((left, right), word)) = queue.pop_front() {
            if (left == SpaConf::Term) != (right == SpaConf::Term) {
                return Ok(Some(word));
            }
            if word.len() == depth {
                continue;
            }
            for sym in self.alphabet.universe() {
                let next = (self.step(left.clone(), sym), other.step(right.clone(), sym));
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

impl<S: Symbol> Language<S> for Spa<S> {
    type Output = bool;

    fn word_output(&self, word: &[S]) -> bool {
        self.accepts(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One procedure `F` that accepts local words `x*` and may recurse once
    /// into itself: local language is `x* (F x*)?`.
    fn simple_spa() -> Spa<char> {
        let alphabet = SpaAlphabet::new(['x'], ['F'], 'r');
        let mut dfa = Dfa::new();
        let start = dfa.add_state(true);
        let called = dfa.add_state(true);
        let sink = dfa.add_state(false);
        dfa.add_transition(start, 'x', start);
        dfa.add_transition(start, 'F', called);
        dfa.add_transition(called, 'x', called);
        dfa.add_transition(called, 'F', sink);
        dfa.add_transition(sink, 'x', sink);
        dfa.add_transition(sink, 'F', sink);
        let mut procs = math::Map::default();
        procs.insert('F', dfa);
        Spa::from_parts(alphabet, procs)
    }

    #[test]
    fn accepts_complete_procedure_runs() {
        let spa = simple_spa();
        assert!(spa.accepts(&['F', 'r']));
        assert!(spa.accepts(&['F', 'x', 'x', 'r']));
        assert!(spa.accepts(&['F', 'x', 'F', 'r', 'r']));
        assert!(!spa.accepts(&[]));
        assert!(!spa.accepts(&['F']));
        assert!(!spa.accepts(&['F', 'r', 'x']));
        assert!(!spa.accepts(&['x', 'r']));
        // the local DFA allows at most one nested call per body
        assert!(!spa.accepts(&['F', 'F', 'r', 'F', 'r', 'r']));
    }
}
