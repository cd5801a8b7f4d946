//! Equivalence oracles.
//!
//! An oracle answers equivalence queries: given a hypothesis, it either
//! certifies agreement with the SUL or produces a counterexample word. All
//! counterexample-processing code assumes *minimal* counterexamples (no
//! strict prefix of the returned word already disagrees); both oracles here
//! search shortest-first, which guarantees this.
//!
//! Richer search strategies (random walk, random well-matched words, ...)
//! plug in through the same [`Oracle`] trait.

use std::collections::VecDeque;
use std::marker::PhantomData;

use tracing::debug;

use crate::alphabet::Symbol;
use crate::automaton::{Language, Mealy, Moore};
use crate::sul::{CachedSul, Sul};
use crate::word::{show, Word};
use crate::Observation;

pub trait Oracle<S: Symbol> {
    type Hypothesis;

    /// Searches for a word on which the hypothesis and the SUL disagree.
    fn find_cex(&mut self, hypothesis: &Self::Hypothesis) -> Option<Word<S>>;
}

/// Exhaustively compares the hypothesis against a SUL on every word up to a
/// depth, shortest first. Complete for finite targets when the depth covers
/// the state space; the workhorse oracle of the test suite.
///
/// The oracle owns its own SUL instance; oracles and learners must not share
/// a SUL within one learning session.
pub struct BreadthFirstOracle<U: Sul, H> {
    sul: CachedSul<U>,
    symbols: Vec<U::Symbol>,
    depth: usize,
    _marker: PhantomData<H>,
}

impl<U: Sul, H> BreadthFirstOracle<U, H>
where
    H: Language<U::Symbol, Output = U::Output>,
{
    pub fn new(sul: U, symbols: impl IntoIterator<Item = U::Symbol>, depth: usize) -> Self {
        Self {
            sul: CachedSul::new(sul),
            symbols: symbols.into_iter().collect(),
            depth,
            _marker: PhantomData,
        }
    }
}

impl<U: Sul, H> Oracle<U::Symbol> for BreadthFirstOracle<U, H>
where
    H: Language<U::Symbol, Output = U::Output>,
{
    type Hypothesis = H;

    fn find_cex(&mut self, hypothesis: &H) -> Option<Word<U::Symbol>> {
        let mut queue = VecDeque::new();
        if H::HAS_EMPTY_OUTPUT {
            queue.push_back(Vec::new());
        } else {
            queue.extend(self.symbols.iter().map(|&sym| vec![sym]));
        }
        while let Some(word) = queue.pop_front() {
            if self.sul.query(&word) != hypothesis.word_output(&word) {
                debug!("found counterexample {}", show(&word));
                return Some(word);
            }
            if word.len() < self.depth {
                for &sym in &self.symbols {
                    let mut extended = word.clone();
                    extended.push(sym);
                    queue.push_back(extended);
                }
            }
        }
        None
    }
}

/// An oracle that knows the target as an automaton and decides equivalence
/// exactly through a product-based separating-word search.
pub struct SimulatorOracle<M> {
    target: M,
}

impl<M> SimulatorOracle<M> {
    pub fn new(target: M) -> Self {
        Self { target }
    }
}

impl<S: Symbol, O: Observation> Oracle<S> for SimulatorOracle<Moore<S, O>> {
    type Hypothesis = Moore<S, O>;

    fn find_cex(&mut self, hypothesis: &Moore<S, O>) -> Option<Word<S>> {
        self.target.find_separating_word(hypothesis)
    }
}

impl<S: Symbol, O: Observation> Oracle<S> for SimulatorOracle<Mealy<S, O>> {
    type Hypothesis = Mealy<S, O>;

    fn find_cex(&mut self, hypothesis: &Mealy<S, O>) -> Option<Word<S>> {
        self.target.find_separating_word(hypothesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::Dfa;
    use crate::sul::FnSul;

    fn even_ones() -> Dfa<char> {
        let mut dfa = Dfa::new();
        let even = dfa.add_state(true);
        let odd = dfa.add_state(false);
        dfa.add_transition(even, '1', odd);
        dfa.add_transition(odd, '1', even);
        dfa
    }

    #[test]
    fn breadth_first_oracle_finds_minimal_cex() {
        let sul = FnSul::new(|word: &[char]| word.len() % 3 == 0);
        let mut oracle: BreadthFirstOracle<_, Dfa<char>> = BreadthFirstOracle::new(sul, ['1'], 6);
        let hypothesis = even_ones();
        let cex = oracle.find_cex(&hypothesis).expect("languages differ");
        // shortest disagreement: "11" is accepted by the hypothesis only
        assert_eq!(cex, vec!['1', '1']);
    }

    #[test]
    fn breadth_first_oracle_accepts_equivalent_hypothesis() {
        let sul = FnSul::new(|word: &[char]| word.len() % 2 == 0);
        let mut oracle: BreadthFirstOracle<_, Dfa<char>> = BreadthFirstOracle::new(sul, ['1'], 6);
        assert_eq!(oracle.find_cex(&even_ones()), None);
    }
}
