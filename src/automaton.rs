//! The hypothesis automata produced by the learners.
//!
//! All kinds are deterministic transition systems over dense `u32` states
//! with state `0` as the initial state. The per-kind configuration types
//! mirror what a run needs to remember: a bare state for the finite-state
//! kinds, a state plus a call stack for [`Vpa`], and a linked chain of
//! active procedure frames for [`Spa`].

use crate::alphabet::Symbol;
use crate::word::Word;
use crate::{Error, Observation};

mod moore;
pub use moore::{Dfa, Moore};

mod mealy;
pub use mealy::Mealy;

mod vpa;
pub use vpa::{Vpa, VpaConf};

mod spa;
pub use spa::{Spa, SpaConf};

/// Identifier of an automaton state. States are dense and `0` is initial.
pub type StateId = u32;

/// A complete hypothesis assigns every word an output. For acceptors the
/// output is `bool`, for Moore and Mealy machines it is the machine's output
/// type. Mealy machines have no output for the empty word, which
/// [`Language::HAS_EMPTY_OUTPUT`] records.
pub trait Language<S: Symbol> {
    type Output: Observation;

    const HAS_EMPTY_OUTPUT: bool = true;

    fn word_output(&self, word: &[S]) -> Self::Output;
}

/// The closed sum over every automaton kind this crate can learn.
///
/// The learners construct the concrete types directly; this enum exists for
/// the few places where behavior is dispatched on the kind, most prominently
/// differential testing of two independently learned automata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Automaton<S: Symbol, O: Observation = bool> {
    Dfa(Dfa<S>),
    Moore(Moore<S, O>),
    Mealy(Mealy<S, O>),
    Vpa(Vpa<S>),
    Spa(Spa<S>),
}

/// The output of running a word through an [`Automaton`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output<O> {
    Accept(bool),
    Observe(O),
}

impl<S: Symbol, O: Observation> Automaton<S, O> {
    pub fn kind(&self) -> &'static str {
        match self {
            Automaton::Dfa(_) => "dfa",
            Automaton::Moore(_) => "moore",
            Automaton::Mealy(_) => "mealy",
            Automaton::Vpa(_) => "vpa",
            Automaton::Spa(_) => "spa",
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Automaton::Dfa(a) => a.size(),
            Automaton::Moore(a) => a.size(),
            Automaton::Mealy(a) => a.size(),
            Automaton::Vpa(a) => a.size(),
            Automaton::Spa(a) => a.size(),
        }
    }

    pub fn word_output(&self, word: &[S]) -> Output<O> {
        match self {
            Automaton::Dfa(a) => Output::Accept(a.word_output(word)),
            Automaton::Moore(a) => Output::Observe(a.word_output(word)),
            Automaton::Mealy(a) => Output::Observe(a.word_output(word)),
            Automaton::Vpa(a) => Output::Accept(a.accepts(word)),
            Automaton::Spa(a) => Output::Accept(a.accepts(word)),
        }
    }

    /// Searches for a word on which `self` and `other` disagree, for
    /// differential testing of two learned automata.
    ///
    /// Returns `Ok(None)` if no separating word exists (exactly, for the
    /// finite-state kinds) or none was found up to `depth` symbols (for the
    /// pushdown kinds, whose exact equivalence check is out of scope).
    /// Comparing different kinds is a configuration error.
    pub fn find_separating_word(
        &self,
        other: &Self,
        depth: usize,
    ) -> Result<Option<Word<S>>, Error> {
        match (self, other) {
            (Automaton::Dfa(a), Automaton::Dfa(b)) => Ok(a.find_separating_word(b)),
            (Automaton::Moore(a), Automaton::Moore(b)) => Ok(a.find_separating_word(b)),
            (Automaton::Mealy(a), Automaton::Mealy(b)) => Ok(a.find_separating_word(b)),
            (Automaton::Vpa(a), Automaton::Vpa(b)) => a.find_separating_word(b, depth),
            (Automaton::Spa(a), Automaton::Spa(b)) => a.find_separating_word(b, depth),
            (left, right) => Err(Error::KindMismatch {
                left: left.kind(),
                right: right.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::VpaAlphabet;

    #[test]
    fn separating_words_for_equal_and_differing_acceptors() {
        // two parsers over {a, b}: both require an even number of a's,
        // the second additionally rejects the empty word
        let mut even: Dfa<char> = Dfa::new();
        let e0 = even.add_state(true);
        let e1 = even.add_state(false);
        even.add_transition(e0, 'a', e1);
        even.add_transition(e0, 'b', e0);
        even.add_transition(e1, 'a', e0);
        even.add_transition(e1, 'b', e1);

        let mut strict: Dfa<char> = Dfa::new();
        let s0 = strict.add_state(false);
        let s1 = strict.add_state(false);
        let s2 = strict.add_state(true);
        strict.add_transition(s0, 'a', s1);
        strict.add_transition(s0, 'b', s2);
        strict.add_transition(s1, 'a', s2);
        strict.add_transition(s1, 'b', s1);
        strict.add_transition(s2, 'a', s1);
        strict.add_transition(s2, 'b', s2);

        let left: Automaton<char> = Automaton::Dfa(even);
        let right: Automaton<char> = Automaton::Dfa(strict);
        assert_eq!(left.find_separating_word(&left.clone(), 5), Ok(None));
        assert_eq!(right.find_separating_word(&right.clone(), 5), Ok(None));

        let word = left
            .find_separating_word(&right, 5)
            .unwrap()
            .expect("the parsers differ on the empty word");
        assert_ne!(left.word_output(&word), right.word_output(&word));
    }

    #[test]
    fn comparing_different_kinds_is_an_error() {
        let mut dfa: Dfa<char> = Dfa::new();
        let q = dfa.add_state(true);
        dfa.add_transition(q, 'a', q);
        let alphabet = VpaAlphabet::new(['a'], ['('], [')']);
        let vpa = Vpa::new(alphabet);
        let left: Automaton<char> = Automaton::Dfa(dfa);
        let right: Automaton<char> = Automaton::Vpa(vpa);
        assert_eq!(
            left.find_separating_word(&right, 5),
            Err(Error::KindMismatch {
                left: "dfa",
                right: "vpa"
            })
        );
    }
}
