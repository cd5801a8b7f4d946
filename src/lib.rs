//! A library for actively learning automata from a black-box system.
//!
//! The system under learning (SUL) answers *membership queries* (what is the
//! output of this word?) and an oracle answers *equivalence queries* (is this
//! hypothesis automaton equivalent to the SUL, and if not, on which word do
//! they disagree?). From these two primitives the learners in this crate
//! infer a minimal automaton through iterative hypothesis refinement.
//!
//! Four learning algorithms are provided:
//! - [`lstar::LStar`], the classic observation-table algorithm, able to
//!   produce [`automaton::Moore`] (and thereby [`automaton::Dfa`]) as well as
//!   [`automaton::Mealy`] hypotheses,
//! - [`kearns_vazirani::KearnsVazirani`], which classifies access words in a
//!   binary discrimination tree,
//! - [`kearns_vazirani_vpa::KearnsVaziraniVpa`], its variant for visibly
//!   pushdown languages producing a [`automaton::Vpa`],
//! - [`lsharp::LSharp`], which grows an observation tree and separates
//!   states through an apartness relation,
//!
//! plus [`procedural::ProceduralLearner`], which composes one sub-learner
//! per discovered procedure into a system of procedural automata
//! ([`automaton::Spa`]).

use std::fmt::Debug;
use std::hash::Hash;

pub mod math;

pub mod word;

pub mod alphabet;

pub mod automaton;

pub mod sul;

pub mod oracle;

pub mod acex;

pub mod learner;

pub mod lstar;

pub mod kearns_vazirani;

pub mod kearns_vazirani_vpa;

pub mod lsharp;

pub mod procedural;

mod error;
pub use error::Error;

/// An observation is anything a membership query can produce: a boolean for
/// acceptors, or an arbitrary output value for Moore and Mealy machines.
pub trait Observation: Clone + Eq + Hash + Debug {}

impl<T: Clone + Eq + Hash + Debug> Observation for T {}

pub mod prelude {
    //! Re-exports the types needed for most uses of the crate.
    pub use crate::acex::{Acex, CachedAcex, CexSearch};
    pub use crate::alphabet::{Alphabet, SpaAlphabet, Symbol, SymbolKind, VpaAlphabet};
    pub use crate::automaton::{
        Automaton, Dfa, Language, Mealy, Moore, Spa, SpaConf, StateId, Vpa, VpaConf,
    };
    pub use crate::kearns_vazirani::KearnsVazirani;
    pub use crate::kearns_vazirani_vpa::KearnsVaziraniVpa;
    pub use crate::learner::Learner;
    pub use crate::lsharp::LSharp;
    pub use crate::lstar::LStar;
    pub use crate::lstar::TableHypothesis;
    pub use crate::oracle::{BreadthFirstOracle, Oracle, SimulatorOracle};
    pub use crate::procedural::{
        AtrManager, ProceduralLearner, ProcedureLearnerKind, ProcedureSul,
    };
    pub use crate::sul::{CachedSul, FnSul, Sul};
    pub use crate::word::Word;
    pub use crate::{math, Error, Observation};
}
