pub mod ordering;
pub mod subst;
pub mod symbol;
pub mod term;
pub mod unify;

pub use ordering::{less_eq, less_in, less_than, Model, Strictness};
pub use subst::{Subst, SubstBuilder};
pub use symbol::{FunctionData, FunctionId, Labeller, Signature, Symbol, VariableId};
pub use term::{canonicalise, Path, Term, TermBuilder, TermListRef, TermRef};
pub use unify::{match_into, match_terms, unify};
