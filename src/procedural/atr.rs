//! Access, terminating and return sequences for procedural learning.
//!
//! A membership query for a single procedure only makes sense embedded in a
//! global word: something must reach an invocation of the procedure
//! (access), every nested call inside the queried body must be completed
//! (terminating) and the run must be driven to acceptance afterwards
//! (return). This manager extracts such sequences from accepted global
//! words and keeps them as short as it can.
//!
//! Terminating sequences of the same procedure are interchangeable: any of
//! them completes an invocation regardless of the surrounding context. That
//! is what makes it sound to shorten them after the fact while cached local
//! queries stay valid.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use fixedbitset::FixedBitSet;
use tracing::{debug, trace};

use crate::alphabet::{SpaAlphabet, Symbol, SymbolKind};
use crate::automaton::{Dfa, StateId};
use crate::math;
use crate::word::{show, Word};

pub struct AtrManager<S: Symbol> {
    alphabet: SpaAlphabet<S>,
    // access ends with the call symbol, return starts with the return symbol
    access: math::Map<S, Word<S>>,
    terminating: math::Map<S, Word<S>>,
    returning: math::Map<S, Word<S>>,
}

impl<S: Symbol> AtrManager<S> {
    pub fn new(alphabet: SpaAlphabet<S>) -> Self {
        Self {
            alphabet,
            access: math::Map::default(),
            terminating: math::Map::default(),
            returning: math::Map::default(),
        }
    }

    pub fn alphabet(&self) -> &SpaAlphabet<S> {
        &self.alphabet
    }

    pub fn add_internal(&mut self, sym: S) {
        self.alphabet.push_internal(sym);
    }

    pub fn terminating(&self, proc: S) -> Option<&Word<S>> {
        self.terminating.get(&proc)
    }

    /// The index of the return symbol closing the call at `call`, if the
    /// word is balanced from there.
    pub fn matching_return(&self, word: &[S], call: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, &sym) in word.iter().enumerate().skip(call + 1) {
            match self.alphabet.try_classify(sym)? {
                SymbolKind::Internal => {}
                SymbolKind::Call => depth += 1,
                SymbolKind::Return if depth == 0 => return Some(i),
                SymbolKind::Return => depth -= 1,
            }
        }
        None
    }

    /// All completed invocations in `word` as `(procedure, body start,
    /// return index)`, ordered by return index so innermost calls come
    /// first.
    pub fn invocations(&self, word: &[S]) -> Vec<(S, usize, usize)> {
        let mut found = Vec::new();
        for (i, &sym) in word.iter().enumerate() {
            if self.alphabet.try_classify(sym) == Some(SymbolKind::Call) {
                if let Some(ret) = self.matching_return(word, i) {
                    found.push((sym, i + 1, ret));
                }
            }
        }
        found.sort_by_key(|&(_, _, ret)| ret);
        found
    }

    /// Harvests sequences from an accepted global word. Every completed
    /// invocation yields a candidate access, terminating and return
    /// sequence; shorter candidates replace longer stored ones, never the
    /// other way around. Returns the procedures seen for the first time.
    pub fn scan_positive_cex(&mut self, word: &[S]) -> Vec<S> {
        let mut discovered = Vec::new();
        for (proc, start, ret) in self.invocations(word) {
            if !self.access.contains_key(&proc) {
                debug!("discovered procedure {proc:?} in {}", show(word));
                discovered.push(proc);
            }
            keep_shorter(&mut self.access, proc, word[..start].to_vec());
            keep_shorter(&mut self.terminating, proc, word[start..ret].to_vec());
            keep_shorter(&mut self.returning, proc, word[ret..].to_vec());
        }
        discovered
    }

    /// Collapses a balanced body to the local alphabet: every nested
    /// invocation becomes just its call symbol.
    pub fn project(&self, body: &[S]) -> Word<S> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let sym = body[i];
            match self.alphabet.classify(sym) {
                SymbolKind::Internal => {
                    out.push(sym);
                    i += 1;
                }
                SymbolKind::Call => {
                    out.push(sym);
                    let ret = self
                        .matching_return(body, i)
                        .expect("BUG: projecting an unbalanced body");
                    i = ret + 1;
                }
                SymbolKind::Return => panic!("BUG: projecting an unbalanced body"),
            }
        }
        out
    }

    /// Inverse of [`AtrManager::project`]: every call symbol is completed
    /// with the known terminating sequence of its procedure. `None` while
    /// some called procedure has no terminating sequence yet.
    pub fn expand(&self, local: &[S]) -> Option<Word<S>> {
        let mut out = Vec::new();
        for &sym in local {
            match self.alphabet.classify(sym) {
                SymbolKind::Internal => out.push(sym),
                SymbolKind::Call => {
                    out.push(sym);
                    out.extend_from_slice(self.terminating.get(&sym)?);
                    out.push(self.alphabet.return_symbol());
                }
                SymbolKind::Return => panic!("BUG: local words never contain the return symbol"),
            }
        }
        Some(out)
    }

    /// Embeds a local query for `proc` into a global word.
    pub fn embed(&self, proc: S, local: &[S]) -> Option<Word<S>> {
        let mut out = self.access.get(&proc)?.clone();
        out.extend(self.expand(local)?);
        out.extend_from_slice(self.returning.get(&proc)?);
        Some(out)
    }

    /// The number of global symbols `sym` contributes once expanded.
    fn symbol_cost(&self, sym: S) -> Option<usize> {
        match self.alphabet.classify(sym) {
            SymbolKind::Internal => Some(1),
            SymbolKind::Call => self.terminating.get(&sym).map(|ts| ts.len() + 2),
            SymbolKind::Return => None,
        }
    }

    /// Recomputes terminating sequences from the current procedural
    /// hypotheses, to a fixpoint: shortening one procedure's sequence can
    /// make a caller's sequence cheaper in turn.
    pub fn minify_all(&mut self, procs: &math::Map<S, Dfa<S>>) {
        loop {
            let mut changed = false;
            for (&proc, dfa) in procs {
                let Some(local) = self.shortest_terminating_local(dfa) else {
                    continue;
                };
                let expanded = self
                    .expand(&local)
                    .expect("BUG: a finite-cost word must be expandable");
                let better = match self.terminating.get(&proc) {
                    None => true,
                    Some(current) => expanded.len() < current.len(),
                };
                if better {
                    trace!(
                        "terminating sequence of {proc:?} shrinks to {}",
                        show(&expanded)
                    );
                    self.terminating.insert(proc, expanded);
                    changed = true;
                }
            }
            if !changed {
                return;
            }
        }
    }

    /// Dijkstra over the procedure's DFA for the accepted local word with
    /// the cheapest expansion. Call symbols without a terminating sequence
    /// are unusable and skipped.
    fn shortest_terminating_local(&self, dfa: &Dfa<S>) -> Option<Word<S>> {
        let local = self.alphabet.local();
        let symbols: Vec<S> = local.universe().collect();
        let size = dfa.size();
        let mut dist = vec![usize::MAX; size];
        let mut prev: Vec<Option<(StateId, S)>> = vec![None; size];
        let mut settled = FixedBitSet::with_capacity(size);
        let mut heap = BinaryHeap::new();
        dist[0] = 0;
        heap.push(Reverse((0usize, 0 as StateId)));
        while let Some(Reverse((cost, state))) = heap.pop() {
            if settled.contains(state as usize) {
                continue;
            }
            settled.insert(state as usize);
            for &sym in &symbols {
                let Some(step) = self.symbol_cost(sym) else {
                    continue;
                };
                let next = dfa.successor(state, sym);
                let total = cost + step;
                if total < dist[next as usize] {
                    dist[next as usize] = total;
                    prev[next as usize] = Some((state, sym));
                    heap.push(Reverse((total, next)));
                }
            }
        }
        let best = (0..size)
            .filter(|&state| *dfa.output(state as StateId) && dist[state] != usize::MAX)
            .min_by_key(|&state| dist[state])?;
        let mut word = Vec::new();
        let mut state = best as StateId;
        while let Some((parent, sym)) = prev[state as usize] {
            word.push(sym);
            state = parent;
        }
        word.reverse();
        Some(word)
    }
}

fn keep_shorter<S: Symbol>(store: &mut math::Map<S, Word<S>>, proc: S, candidate: Word<S>) {
    match store.get(&proc) {
        Some(current) if current.len() <= candidate.len() => {}
        _ => {
            store.insert(proc, candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AtrManager<char> {
        AtrManager::new(SpaAlphabet::new(['a', 'b'], ['F', 'G'], 'r'))
    }

    #[test]
    fn scanning_extracts_sequences_for_every_invocation() {
        let mut atr = manager();
        let word = ['F', 'a', 'G', 'b', 'r', 'a', 'r'];
        let discovered = atr.scan_positive_cex(&word);
        assert_eq!(discovered, vec!['G', 'F']);
        assert_eq!(atr.embed('F', &[]).unwrap(), vec!['F', 'r']);
        assert_eq!(
            atr.embed('G', &[]).unwrap(),
            vec!['F', 'a', 'G', 'r', 'a', 'r']
        );
        assert_eq!(atr.terminating('F').unwrap(), &['a', 'G', 'b', 'r', 'a']);
        assert_eq!(atr.terminating('G').unwrap(), &['b']);
    }

    #[test]
    fn rescanning_never_lengthens_sequences() {
        let mut atr = manager();
        atr.scan_positive_cex(&['F', 'a', 'a', 'r']);
        assert_eq!(atr.terminating('F').unwrap().len(), 2);
        atr.scan_positive_cex(&['F', 'a', 'a', 'a', 'r']);
        assert_eq!(atr.terminating('F').unwrap().len(), 2);
        atr.scan_positive_cex(&['F', 'a', 'r']);
        assert_eq!(atr.terminating('F').unwrap(), &['a']);
    }

    #[test]
    fn project_collapses_nested_invocations() {
        let atr = manager();
        let body = ['a', 'G', 'b', 'r', 'a', 'F', 'r', 'b'];
        assert_eq!(atr.project(&body), vec!['a', 'G', 'a', 'F', 'b']);
    }

    #[test]
    fn expand_round_trips_through_terminating_sequences() {
        let mut atr = manager();
        atr.scan_positive_cex(&['F', 'G', 'b', 'r', 'r']);
        let expanded = atr.expand(&['a', 'G']).unwrap();
        assert_eq!(expanded, vec!['a', 'G', 'b', 'r']);
        assert_eq!(atr.project(&expanded), vec!['a', 'G']);
        // 'F' itself has a terminating sequence containing the call to 'G'
        assert_eq!(atr.expand(&['F']).unwrap(), vec!['F', 'G', 'b', 'r', 'r']);
    }

    #[test]
    fn minify_prefers_an_expansion_free_path() {
        let mut atr = manager();
        // scanned from a wasteful witness: F terminates via a G call
        atr.scan_positive_cex(&['F', 'G', 'b', 'b', 'r', 'r']);
        assert_eq!(atr.terminating('F').unwrap().len(), 4);

        // the hypothesis shows F also terminates on a lone 'a'
        let mut dfa = Dfa::new();
        let start = dfa.add_state(false);
        let done = dfa.add_state(true);
        for sym in ['a', 'b', 'F', 'G'] {
            dfa.add_transition(done, sym, done);
        }
        dfa.add_transition(start, 'a', done);
        dfa.add_transition(start, 'b', start);
        dfa.add_transition(start, 'F', start);
        dfa.add_transition(start, 'G', done);
        let mut procs = math::Map::default();
        procs.insert('F', dfa);
        atr.minify_all(&procs);
        assert_eq!(atr.terminating('F').unwrap(), &['a']);
    }
}
