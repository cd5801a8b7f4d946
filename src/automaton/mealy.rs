use fixedbitset::FixedBitSet;

use crate::alphabet::Symbol;
use crate::math;
use crate::word::Word;
use crate::Observation;

use super::{Language, StateId};

/// A deterministic Mealy machine: outputs are attached to transitions, the
/// output of a (non-empty) word is the output of the last transition taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mealy<S: Symbol, O: Observation> {
    transitions: Vec<math::Map<S, (O, StateId)>>,
}

impl<S: Symbol, O: Observation> Default for Mealy<S, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol, O: Observation> Mealy<S, O> {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    pub fn add_state(&mut self) -> StateId {
        self.transitions.push(math::Map::default());
        (self.transitions.len() - 1) as StateId
    }

    pub fn add_transition(&mut self, from: StateId, sym: S, output: O, to: StateId) {
        assert!((to as usize) < self.transitions.len(), "unknown target state");
        let previous = self.transitions[from as usize].insert(sym, (output, to));
        assert!(previous.is_none(), "transition ({from}, {sym:?}) added twice");
    }

    pub fn size(&self) -> usize {
        self.transitions.len()
    }

    pub fn initial_conf(&self) -> StateId {
        0
    }

    pub fn step(&self, conf: StateId, sym: S) -> (O, StateId) {
        self.transitions[conf as usize]
            .get(&sym)
            .cloned()
            .unwrap_or_else(|| panic!("BUG: hypothesis lacks transition ({conf}, {sym:?})"))
    }

    pub fn run(&self, word: &[S]) -> (Vec<O>, StateId) {
        let mut conf = self.initial_conf();
        let mut outputs = Vec::with_capacity(word.len());
        for &sym in word {
            let (out, next) = self.step(conf, sym);
            outputs.push(out);
            conf = next;
        }
        (outputs, conf)
    }

    pub fn state_after(&self, word: &[S]) -> StateId {
        self.run(word).1
    }

    fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        self.transitions
            .first()
            .into_iter()
            .flat_map(|row| row.keys().copied())
    }

    /// Searches for a shortest word on which the last-transition outputs of
    /// `self` and `other` differ.
    pub fn find_separating_word(&self, other: &Self) -> Option<Word<S>> {
        let mut visited = FixedBitSet::with_capacity(self.size() * other.size());
        let mut back: math::Map<(StateId, StateId), ((StateId, StateId), S)> = math::Map::default();
        let mut queue = std::collections::VecDeque::from([(0, 0)]);
        visited.insert(0);
        while let Some((left, right)) = queue.pop_front() {
            for sym in self.symbols() {
                let (out_left, next_left) = self.step(left, sym);
                let (out_right, next_right) = other.step(right, sym);
                if out_left != out_right {
                    let mut word = super::moore::reconstruct_path(&back, (left, right));
                    word.push(sym);
                    return Some(word);
                }
                let next = (next_left, next_right);
                let slot = next.0 as usize * other.size() + next.1 as usize;
                if !visited.contains(slot) {
                    visited.insert(slot);
                    back.insert(next, ((left, right), sym));
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

impl<S: Symbol, O: Observation> Language<S> for Mealy<S, O> {
    type Output = O;

    const HAS_EMPTY_OUTPUT: bool = false;

    fn word_output(&self, word: &[S]) -> O {
        assert!(!word.is_empty(), "a Mealy machine has no empty-word output");
        let (outputs, _) = self.run(word);
        outputs
            .last()
            .cloned()
            .expect("BUG: a run over a nonempty word produced no outputs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle() -> Mealy<char, u8> {
        let mut m = Mealy::new();
        let a = m.add_state();
        let b = m.add_state();
        m.add_transition(a, 'x', 0, b);
        m.add_transition(a, 'y', 1, a);
        m.add_transition(b, 'x', 1, a);
        m.add_transition(b, 'y', 0, b);
        m
    }

    #[test]
    fn last_output() {
        let m = toggle();
        assert_eq!(m.word_output(&['x']), 0);
        assert_eq!(m.word_output(&['x', 'x']), 1);
        assert_eq!(m.word_output(&['x', 'y', 'x']), 1);
    }

    #[test]
    fn separating_word_compares_transition_outputs() {
        let a = toggle();
        let mut b = toggle();
        b.transitions[1].insert('y', (1, 1));
        let word = a.find_separating_word(&b).expect("machines differ");
        assert_ne!(a.word_output(&word), b.word_output(&word));
    }
}
