use std::cmp::Ordering;

use crate::kernel::symbol::{FunctionId, Signature, VariableId};
use crate::kernel::term::{Term, TermRef};
use crate::kernel::unify::unify;

/// How strongly one term sits below another in a model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strictness {
    Strict,
    Nonstrict,
}

/// The variable weight: every variable ranges over ground terms, and the
/// lightest ground term is the minimal constant, so that is its weight.
fn variable_weight(sig: &Signature) -> i64 {
    match sig.minimal() {
        Some(m) => sig.weight(m),
        None => 1,
    }
}

/// Computes the KBO weight of a term and counts variable occurrences into
/// `refcounts`, indexed by variable id.
fn weigh(sig: &Signature, t: TermRef, refcounts: &mut Vec<u32>) -> i64 {
    let var_weight = variable_weight(sig);
    let mut weight = 0;
    for &s in t.as_slice() {
        if s.is_function() {
            weight += sig.weight(s.index());
        } else {
            weight += var_weight;
            let i = s.index() as usize;
            while refcounts.len() <= i {
                refcounts.push(0);
            }
            refcounts[i] += 1;
        }
    }
    weight
}

/// Whether every variable occurs in `a` at least as often as in `b`.
fn dominates(a: &[u32], b: &[u32]) -> bool {
    if b.len() > a.len() && b[a.len()..].iter().any(|&n| n > 0) {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| x >= y)
}

/// The total precedence on function symbols. The configured rank decides;
/// ids break ties so the order is total even on sloppy input.
fn precedence_cmp(sig: &Signature, f: FunctionId, g: FunctionId) -> Ordering {
    (sig.precedence(f), f).cmp(&(sig.precedence(g), g))
}

/// Whether `s <= t` holds for every ground instance.
///
/// Knuth-Bendix with the minimal-constant extension: the minimal constant
/// sits below everything, so `f(0) <= f(x)` holds even though the strict
/// comparison does not. Stable under substitution.
pub fn less_eq(sig: &Signature, s: TermRef, t: TermRef) -> bool {
    if s == t {
        return true;
    }
    match (s.as_variable(), t.as_variable()) {
        // Distinct variables can be instantiated either way around.
        (Some(_), Some(_)) => false,
        // x <= t exactly when t contains x: function weights are positive,
        // so any term properly containing x is heavier than x.
        (Some(x), None) => t.contains_var(x),
        // s <= y for every instance of y only if s is the bottom element.
        (None, Some(_)) => is_minimal_term(sig, s),
        (None, None) => {
            let mut s_refcounts = vec![];
            let s_weight = weigh(sig, s, &mut s_refcounts);
            let mut t_refcounts = vec![];
            let t_weight = weigh(sig, t, &mut t_refcounts);
            if !dominates(&t_refcounts, &s_refcounts) {
                return false;
            }
            if s_weight != t_weight {
                return s_weight < t_weight;
            }
            let f = s.root().index();
            let g = t.root().index();
            match precedence_cmp(sig, f, g) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => {
                    let ss: Vec<TermRef> = s.args().iter().collect();
                    let ts: Vec<TermRef> = t.args().iter().collect();
                    lex_less_eq(sig, &ss, &ts)
                }
            }
        }
    }
}

fn is_minimal_term(sig: &Signature, t: TermRef) -> bool {
    match t.head() {
        Some(f) => t.len() == 1 && sig.is_minimal(f),
        None => false,
    }
}

/// Lexicographic comparison of equal-length argument lists under the
/// nonstrict ordering. When a pair can coincide (the sides unify), the
/// remaining arguments are compared under that unifier, because the tail
/// only matters on instances where the pair is equal.
fn lex_less_eq(sig: &Signature, ss: &[TermRef], ts: &[TermRef]) -> bool {
    for i in 0..ss.len() {
        let a = ss[i];
        let b = ts[i];
        if a == b {
            continue;
        }
        if !less_eq(sig, a, b) {
            return false;
        }
        return match unify(a, b) {
            None => true,
            Some(mgu) => {
                let rest_s: Vec<Term> = ss[i + 1..].iter().map(|t| mgu.apply(*t)).collect();
                let rest_t: Vec<Term> = ts[i + 1..].iter().map(|t| mgu.apply(*t)).collect();
                let rest_s_refs: Vec<TermRef> = rest_s.iter().map(|t| t.as_ref()).collect();
                let rest_t_refs: Vec<TermRef> = rest_t.iter().map(|t| t.as_ref()).collect();
                lex_less_eq(sig, &rest_s_refs, &rest_t_refs)
            }
        };
    }
    true
}

/// Whether `s < t` holds for every ground instance: `s <= t` and no
/// instance makes them equal, which is exactly non-unifiability.
pub fn less_than(sig: &Signature, s: TermRef, t: TermRef) -> bool {
    less_eq(sig, s, t) && unify(s, t).is_none()
}

/// A model: a total order on a finite set of variables.
///
/// The model reads each listed variable as a distinct unknown value sitting
/// strictly above the minimal constant and below every other ground term,
/// ordered among themselves by their position in the list. Variables not in
/// the list are unconstrained.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Model {
    /// Variables in increasing order: order[0] is the least.
    order: Vec<VariableId>,
}

impl Model {
    pub fn empty() -> Model {
        Model { order: vec![] }
    }

    /// The model in which the given variables are ordered exactly as listed.
    pub fn from_order(order: Vec<VariableId>) -> Model {
        Model { order }
    }

    pub fn rank(&self, v: VariableId) -> Option<usize> {
        self.order.iter().position(|&w| w == v)
    }

    pub fn vars(&self) -> &[VariableId] {
        &self.order
    }

    /// Enumerates strictly coarser models: each drops one constraint by
    /// removing one variable from the order. Used to shrink witnesses.
    pub fn weaken(&self) -> Vec<Model> {
        (0..self.order.len())
            .map(|i| {
                let mut order = self.order.clone();
                order.remove(i);
                Model { order }
            })
            .collect()
    }
}

/// Compares `s` and `t` under the model. Returns None when the model does
/// not decide `s <= t`.
pub fn less_in(sig: &Signature, model: &Model, s: TermRef, t: TermRef) -> Option<Strictness> {
    if s == t {
        return Some(Strictness::Nonstrict);
    }
    if less_than(sig, s, t) {
        return Some(Strictness::Strict);
    }
    if model_less(sig, model, s, t)? {
        Some(Strictness::Strict)
    } else {
        None
    }
}

/// Strict model comparison: Some(true) if s < t under the model,
/// Some(false) if decided otherwise, None if some variable is unconstrained.
fn model_less(sig: &Signature, model: &Model, s: TermRef, t: TermRef) -> Option<bool> {
    for v in s.vars().chain(t.vars()) {
        if model.rank(v).is_none() {
            return None;
        }
    }
    Some(model_less_total(sig, model, s, t) == Ordering::Less)
}

/// Total comparison of two terms all of whose variables the model ranks.
/// Weights first; ties by atom order (minimal constant, then model
/// variables by rank, then other functions by precedence); then arguments.
fn model_less_total(sig: &Signature, model: &Model, s: TermRef, t: TermRef) -> Ordering {
    let mut ignored = vec![];
    let s_weight = weigh(sig, s, &mut ignored);
    let t_weight = weigh(sig, t, &mut ignored);
    match s_weight.cmp(&t_weight) {
        Ordering::Equal => {}
        other => return other,
    }
    match atom_cmp(sig, model, s, t) {
        Ordering::Equal => {}
        other => return other,
    }
    for (a, b) in s.args().iter().zip(t.args().iter()) {
        match model_less_total(sig, model, a, b) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Orders root atoms under the model-constant reading.
/// Rank classes: minimal constant < model variables < other functions.
fn atom_cmp(sig: &Signature, model: &Model, s: TermRef, t: TermRef) -> Ordering {
    #[derive(Eq, Ord, PartialEq, PartialOrd)]
    enum Class {
        Minimal,
        Variable(usize),
        Function(u32, FunctionId),
    }
    let classify = |r: TermRef| match r.head() {
        Some(f) if sig.is_minimal(f) => Class::Minimal,
        Some(f) => Class::Function(sig.precedence(f), f),
        None => match model.rank(r.root().index()) {
            Some(rank) => Class::Variable(rank),
            None => panic!("model comparison on an unconstrained variable"),
        },
    };
    classify(s).cmp(&classify(t))
}
