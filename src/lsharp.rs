//! The L# learner, built on an observation tree and apartness.
//!
//! Every query made to the target is stored in a prefix tree whose nodes
//! carry the observed outputs. Two nodes are *apart* when the tree already
//! contains a common continuation on which their outputs differ; apartness
//! is witnessed, and a witness stays valid forever because the tree only
//! grows. The basis is a set of pairwise-apart nodes that become hypothesis
//! states; the frontier (children of basis nodes outside the basis) is
//! driven into shape by three rules: complete every basis node with every
//! symbol, promote a frontier node apart from the whole basis, and extend a
//! frontier node that is still compatible with several basis nodes along a
//! witness separating two of its candidates.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::acex::{find_flip, CachedAcex, CexSearch};
use crate::alphabet::{Alphabet, Symbol};
use crate::automaton::{Moore, StateId};
use crate::learner::Learner;
use crate::math;
use crate::sul::{CachedSul, Sul};
use crate::word::{show, Word};

type NodeId = usize;

#[derive(Debug, Clone)]
struct TreeNode<S: Symbol, O> {
    parent: Option<(NodeId, S)>,
    children: math::Map<S, NodeId>,
    output: O,
}

/// An implementation of the L# algorithm.
pub struct LSharp<S: Symbol, U: Sul<Symbol = S>> {
    alphabet: Alphabet<S>,
    sul: CachedSul<U>,
    cex_search: CexSearch,
    nodes: Vec<TreeNode<S, U::Output>>,
    basis: Vec<NodeId>,
    // only positive apartness results are cached; witnesses never expire
    witnesses: math::Map<(NodeId, NodeId), Word<S>>,
}

impl<S, U> LSharp<S, U>
where
    S: Symbol,
    U: Sul<Symbol = S>,
{
    pub fn new(alphabet: Alphabet<S>, sul: U, cex_search: CexSearch) -> Self {
        let mut sul = CachedSul::new(sul);
        let root = TreeNode {
            parent: None,
            children: math::Map::default(),
            output: sul.query_empty(),
        };
        Self {
            alphabet,
            sul,
            cex_search,
            nodes: vec![root],
            basis: vec![0],
            witnesses: math::Map::default(),
        }
    }

    fn access(&self, mut node: NodeId) -> Word<S> {
        let mut word = Vec::new();
        while let Some((parent, sym)) = self.nodes[node].parent {
            word.push(sym);
            node = parent;
        }
        word.reverse();
        word
    }

    /// Walks `word` from the root, querying the target for the output of
    /// every prefix that is new to the tree. Returns the node of `word`.
    fn observe(&mut self, word: &[S]) -> NodeId {
        let mut node = 0;
        for (i, &sym) in word.iter().enumerate() {
            node = match self.nodes[node].children.get(&sym) {
                Some(&child) => child,
                None => {
                    let output = self.sul.query(&word[..=i]);
                    let child = self.nodes.len();
                    self.nodes.push(TreeNode {
                        parent: Some((node, sym)),
                        children: math::Map::default(),
                        output,
                    });
                    self.nodes[node].children.insert(sym, child);
                    trace!("tree grows to {} nodes at {}", child + 1, show(&word[..=i]));
                    child
                }
            };
        }
        node
    }

    /// Searches the tree for a common continuation of `left` and `right` on
    /// which their outputs differ. The shortest witness is found first and
    /// cached under both orientations.
    fn apart(&mut self, left: NodeId, right: NodeId) -> Option<Word<S>> {
        if left == right {
            return None;
        }
        if let Some(witness) = self.witnesses.get(&(left, right)) {
            return Some(witness.clone());
        }
        let mut queue = VecDeque::from([(left, right, Vec::new())]);
        while let Some((a, b, word)) = queue.pop_front() {
            if self.nodes[a].output != self.nodes[b].output {
                self.witnesses.insert((left, right), word.clone());
                self.witnesses.insert((right, left), word.clone());
                return Some(word);
            }
            for (&sym, &ca) in &self.nodes[a].children {
                if let Some(&cb) = self.nodes[b].children.get(&sym) {
                    let mut extended = word.clone();
                    extended.push(sym);
                    queue.push_back((ca, cb, extended));
                }
            }
        }
        None
    }

    fn frontier(&self) -> Vec<NodeId> {
        self.basis
            .iter()
            .flat_map(|&b| self.nodes[b].children.values().copied())
            .filter(|child| !self.basis.contains(child))
            .collect()
    }

    /// Runs the completion, promotion and identification rules until the
    /// basis is closed and every frontier node has at least one compatible
    /// basis node.
    fn close(&mut self) {
        loop {
            let mut changed = false;

            for i in 0..self.basis.len() {
                let access = self.access(self.basis[i]);
                for sym in self.alphabet.universe().collect::<Vec<_>>() {
                    if !self.nodes[self.basis[i]].children.contains_key(&sym) {
                        let mut word = access.clone();
                        word.push(sym);
                        self.observe(&word);
                        changed = true;
                    }
                }
            }

            for node in self.frontier() {
                let all_apart = self
                    .basis
                    .clone()
                    .into_iter()
                    .all(|b| self.apart(node, b).is_some());
                if all_apart {
                    debug!("promoting {} to the basis", show(&self.access(node)));
                    self.basis.push(node);
                    changed = true;
                }
            }

            for node in self.frontier() {
                let candidates: Vec<NodeId> = self
                    .basis
                    .clone()
                    .into_iter()
                    .filter(|&b| self.apart(node, b).is_none())
                    .collect();
                if candidates.len() >= 2 {
                    let witness = self
                        .apart(candidates[0], candidates[1])
                        .expect("BUG: distinct basis nodes must be apart");
                    let mut word = self.access(node);
                    word.extend_from_slice(&witness);
                    self.observe(&word);
                    changed = true;
                }
            }

            if !changed {
                return;
            }
        }
    }

    /// Reads a hypothesis off the closed tree. Each frontier node is merged
    /// into the first basis node it is compatible with.
    fn assemble(&mut self) -> (Moore<S, U::Output>, Vec<Word<S>>) {
        let basis = self.basis.clone();
        let mut hypothesis = Moore::new();
        for &b in &basis {
            hypothesis.add_state(self.nodes[b].output.clone());
        }
        for (state, &b) in basis.iter().enumerate() {
            for sym in self.alphabet.universe().collect::<Vec<_>>() {
                let child = *self.nodes[b].children.get(&sym).expect("BUG: basis node incomplete");
                let target = match basis.iter().position(|&x| x == child) {
                    Some(id) => id,
                    None => (0..basis.len())
                        .find(|&id| self.apart(child, basis[id]).is_none())
                        .expect("BUG: frontier node apart from the whole basis"),
                };
                hypothesis.add_transition(state as StateId, sym, target as StateId);
            }
        }
        let prefixes = basis.iter().map(|&b| self.access(b)).collect();
        (hypothesis, prefixes)
    }

    /// Compares the tree against the hypothesis and returns the access word
    /// of a node whose recorded output disagrees, if any.
    fn find_inconsistency(&self, hypothesis: &Moore<S, U::Output>) -> Option<Word<S>> {
        let mut queue = VecDeque::from([(0usize, 0 as StateId)]);
        while let Some((node, state)) = queue.pop_front() {
            if self.nodes[node].output != *hypothesis.output(state) {
                return Some(self.access(node));
            }
            for (&sym, &child) in &self.nodes[node].children {
                queue.push_back((child, hypothesis.successor(state, sym)));
            }
        }
        None
    }

    /// Locates the flip of a counterexample and grows the tree so that the
    /// offending transition target becomes apart from the state it was
    /// merged with.
    fn process_cex(
        &mut self,
        cex: &[S],
        hypothesis: &Moore<S, U::Output>,
        prefixes: &[Word<S>],
    ) {
        let expected = self.sul.query(cex);
        let sul = &mut self.sul;
        let mut acex = CachedAcex::new(cex.len() + 1, |i| {
            let state = hypothesis.state_after(&cex[..i]);
            let mut replaced = prefixes[state as usize].clone();
            replaced.extend_from_slice(&cex[i..]);
            sul.query(&replaced) == expected
        });
        let flip = find_flip(&mut acex, self.cex_search);

        let source = hypothesis.state_after(&cex[..flip]);
        let merged = hypothesis.state_after(&cex[..=flip]);
        let suffix = &cex[flip + 1..];
        let mut separated = prefixes[source as usize].clone();
        separated.push(cex[flip]);
        separated.extend_from_slice(suffix);
        let mut witness_side = prefixes[merged as usize].clone();
        witness_side.extend_from_slice(suffix);
        debug!(
            "separating {} from state {merged} after flip {flip}",
            show(&separated)
        );
        self.observe(&separated);
        self.observe(&witness_side);
    }
}

impl<S, U> Learner<S> for LSharp<S, U>
where
    S: Symbol,
    U: Sul<Symbol = S>,
{
    type Hypothesis = Moore<S, U::Output>;
    type StateMap = Vec<Word<S>>;

    /// Closes the tree, assembles a hypothesis and repeats until the
    /// hypothesis agrees with every observation already in the tree.
    fn build_hypothesis(&mut self) -> (Moore<S, U::Output>, Vec<Word<S>>) {
        loop {
            self.close();
            let (hypothesis, prefixes) = self.assemble();
            let Some(cex) = self.find_inconsistency(&hypothesis) else {
                debug!("hypothesis with {} states is tree-consistent", prefixes.len());
                return (hypothesis, prefixes);
            };
            trace!("tree disagrees with hypothesis on {}", show(&cex));
            self.process_cex(&cex, &hypothesis, &prefixes);
        }
    }

    fn refine_hypothesis(
        &mut self,
        cex: &[S],
        hypothesis: &Moore<S, U::Output>,
        prefixes: &Vec<Word<S>>,
    ) {
        self.observe(cex);
        self.process_cex(cex, hypothesis, prefixes);
    }

    fn add_alphabet_symbol(&mut self, sym: S) {
        self.alphabet.push(sym);
        // completion picks up the new symbol on the next closure pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::BreadthFirstOracle;
    use crate::sul::FnSul;

    fn ones_mod_four(word: &[char]) -> bool {
        word.iter().filter(|&&sym| sym == '1').count() % 4 == 3
    }

    #[test_log::test]
    fn lsharp_learns_mod_four_counter() {
        let alphabet = Alphabet::new(['0', '1']);
        let mut learner = LSharp::new(alphabet, FnSul::new(ones_mod_four), CexSearch::Binary);
        let mut oracle = BreadthFirstOracle::new(FnSul::new(ones_mod_four), ['0', '1'], 8);
        let dfa = learner.infer(&mut oracle, None);
        assert_eq!(dfa.size(), 4);
        assert!(dfa.accepts(&['1', '1', '1']));
        assert!(!dfa.accepts(&['1', '1', '1', '1']));
    }

    #[test_log::test]
    fn rebuilding_without_refinement_is_stable() {
        let alphabet = Alphabet::new(['0', '1']);
        let mut learner = LSharp::new(alphabet, FnSul::new(ones_mod_four), CexSearch::Binary);
        let (hypothesis, prefixes) = learner.build_hypothesis();
        learner.refine_hypothesis(&['1', '1', '1'], &hypothesis, &prefixes);

        // closure re-runs on every build; without new observations it must
        // settle on the same basis and the same machine
        let first = learner.build_hypothesis();
        let queries = learner.sul.distinct_queries();
        let second = learner.build_hypothesis();
        assert_eq!(first, second);
        assert_eq!(learner.sul.distinct_queries(), queries);
    }

    #[test_log::test]
    fn apartness_is_symmetric_and_witnessed() {
        let alphabet = Alphabet::new(['a', 'b']);
        let target = |word: &[char]| word.last() == Some(&'b');
        let mut learner = LSharp::new(alphabet, FnSul::new(target), CexSearch::Linear);
        let with_b = learner.observe(&['b']);
        let without = learner.observe(&['a']);
        learner.observe(&['a', 'b']);
        learner.observe(&['b', 'b']);

        // 'a' and 'b' differ already on the empty continuation
        assert_eq!(learner.apart(with_b, without), Some(vec![]));
        assert_eq!(learner.apart(without, with_b), Some(vec![]));
        // the root and 'b' differ on the empty continuation as well
        assert!(learner.apart(0, with_b).is_some());
        // the root and 'a' agree on everything observed so far
        assert_eq!(learner.apart(0, without), None);
    }

    #[test_log::test]
    fn basis_nodes_stay_pairwise_apart() {
        let alphabet = Alphabet::new(['0', '1']);
        let mut learner = LSharp::new(alphabet, FnSul::new(ones_mod_four), CexSearch::Binary);
        let mut oracle = BreadthFirstOracle::new(FnSul::new(ones_mod_four), ['0', '1'], 8);
        learner.infer(&mut oracle, None);
        let basis = learner.basis.clone();
        for (i, &a) in basis.iter().enumerate() {
            for &b in &basis[i + 1..] {
                assert!(learner.apart(a, b).is_some());
            }
        }
    }

    #[test_log::test]
    fn moore_outputs_beyond_booleans() {
        // outputs count trailing 'a's, capped at two
        let target = |word: &[char]| {
            word.iter().rev().take_while(|&&sym| sym == 'a').count().min(2) as u8
        };
        let alphabet = Alphabet::new(['a', 'b']);
        let mut learner = LSharp::new(alphabet, FnSul::new(target), CexSearch::Exponential);
        let mut oracle = BreadthFirstOracle::new(FnSul::new(target), ['a', 'b'], 6);
        let moore = learner.infer(&mut oracle, None);
        assert_eq!(moore.size(), 3);
        assert_eq!(*moore.output(moore.state_after(&['b'])), 0);
        assert_eq!(*moore.output(moore.state_after(&['a'])), 1);
        assert_eq!(*moore.output(moore.state_after(&['a', 'a', 'a'])), 2);
    }
}
