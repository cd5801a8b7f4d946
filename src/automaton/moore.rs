use fixedbitset::FixedBitSet;

use crate::alphabet::Symbol;
use crate::math;
use crate::word::Word;
use crate::Observation;

use super::{Language, StateId};

/// A deterministic Moore machine: every state carries an output, the output
/// of a word is the output of the state it reaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moore<S: Symbol, O: Observation> {
    transitions: Vec<math::Map<S, StateId>>,
    outputs: Vec<O>,
}

/// A DFA is a Moore machine with boolean state outputs.
pub type Dfa<S> = Moore<S, bool>;

impl<S: Symbol, O: Observation> Default for Moore<S, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol, O: Observation> Moore<S, O> {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_state(&mut self, output: O) -> StateId {
        self.transitions.push(math::Map::default());
        self.outputs.push(output);
        (self.outputs.len() - 1) as StateId
    }

    pub fn add_transition(&mut self, from: StateId, sym: S, to: StateId) {
        assert!((to as usize) < self.outputs.len(), "unknown target state");
        let previous = self.transitions[from as usize].insert(sym, to);
        assert!(previous.is_none(), "transition ({from}, {sym:?}) added twice");
    }

    pub fn size(&self) -> usize {
        self.outputs.len()
    }

    pub fn output(&self, state: StateId) -> &O {
        &self.outputs[state as usize]
    }

    pub fn successor(&self, state: StateId, sym: S) -> StateId {
        *self.transitions[state as usize]
            .get(&sym)
            .unwrap_or_else(|| panic!("BUG: hypothesis lacks transition ({state}, {sym:?})"))
    }

    pub fn initial_conf(&self) -> StateId {
        0
    }

    pub fn step(&self, conf: StateId, sym: S) -> (O, StateId) {
        let next = self.successor(conf, sym);
        (self.outputs[next as usize].clone(), next)
    }

    /// Runs the word from the initial state, returning the output observed
    /// after every symbol together with the final configuration.
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

    /// The symbols this machine is complete over.
    fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        self.transitions
            .first()
            .into_iter()
            .flat_map(|row| row.keys().copied())
    }

    /// Searches for a shortest word on which `self` and `other` produce a
    /// different output, by breadth-first search over the product.
    pub fn find_separating_word(&self, other: &Self) -> Option<Word<S>> {
        if self.output(0) != other.output(0) {
            return Some(Vec::new());
        }
        let mut visited = FixedBitSet::with_capacity(self.size() * other.size());
        let mut back: math::Map<(StateId, StateId), ((StateId, StateId), S)> = math::Map::default();
        let mut queue = std::collections::VecDeque::from([(0, 0)]);
        visited.insert(0);
        while let Some((left, right)) = queue.pop_front() {
            for sym in self.symbols() {
                let next = (self.successor(left, sym), other.successor(right, sym));
                let slot = next.0 as usize * other.size() + next.1 as usize;
                if visited.contains(slot) {
                    continue;
                }
                visited.insert(slot);
                back.insert(next, ((left, right), sym));
                if self.output(next.0) != other.output(next.1) {
                    return Some(reconstruct_path(&back, next));
                }
                queue.push_back(next);
            }
        }
        None
    }
}

pub(super) fn reconstruct_path<S: Symbol>(
    back: &math::Map<(StateId, StateId), ((StateId, StateId), S)>,
    mut pair: (StateId, StateId),
) -> Word<S> {
    let mut word = Vec::new();
    while let Some((prev, sym)) = back.get(&pair) {
        word.push(*sym);
        pair = *prev;
    }
    word.reverse();
    word
}

impl<S: Symbol, O: Observation> Language<S> for Moore<S, O> {
    type Output = O;

    fn word_output(&self, word: &[S]) -> O {
        let (_, conf) = self.run(word);
        self.outputs[conf as usize].clone()
    }
}

impl<S: Symbol> Dfa<S> {
    pub fn accepts(&self, word: &[S]) -> bool {
        self.word_output(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mod_two_ones() -> Dfa<char> {
        let mut dfa = Dfa::new();
        let even = dfa.add_state(true);
        let odd = dfa.add_state(false);
        dfa.add_transition(even, '0', even);
        dfa.add_transition(even, '1', odd);
        dfa.add_transition(odd, '0', odd);
        dfa.add_transition(odd, '1', even);
        dfa
    }

    #[test]
    fn run_and_accept() {
        let dfa = mod_two_ones();
        assert!(dfa.accepts(&[]));
        assert!(dfa.accepts(&['1', '0', '1']));
        assert!(!dfa.accepts(&['1', '0', '0']));
    }

    #[test]
    fn separating_word_of_equivalent_machines_is_none() {
        let a = mod_two_ones();
        let b = mod_two_ones();
        assert_eq!(a.find_separating_word(&b), None);
    }

    #[test]
    fn separating_word_is_found_and_reproducible() {
        let a = mod_two_ones();
        let mut b = mod_two_ones();
        // flip one transition: from odd, reading '0' resets to even
        let odd = 1;
        *b.transitions[odd as usize].get_mut(&'0').unwrap() = 0;
        let word = a.find_separating_word(&b).expect("machines differ");
        assert_ne!(a.accepts(&word), b.accepts(&word));
    }
}
