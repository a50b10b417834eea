// Critical pairs: overlap two rules by unifying one lhs with a
// non-variable subterm of the other, and carry enough proof structure to
// replay the derivation later.

use serde::{Deserialize, Serialize};

use crate::kernel::subst::SubstBuilder;
use crate::kernel::symbol::{Signature, Symbol, VariableId};
use crate::kernel::term::{Term, TermRef};
use crate::kernel::unify::unify;
use crate::kernel::Subst;
use crate::proof::Derivation;
use crate::rewrite::{normalise_with, rewrite_decreasing};
use crate::rule::{ActiveId, ActiveRule, Equation, RuleId, Rules};

/// An equation waiting to be turned into a rule, with its provenance.
#[derive(Clone, Debug)]
pub struct CriticalPair {
    pub eqn: Equation,

    /// One more than the maximum depth of the parent rules; axioms are 0.
    pub depth: u32,

    /// The term both sides of the overlap came from, for proof context.
    pub top: Option<Term>,

    /// A derivation of `eqn` from axioms and existing rules.
    pub proof: Derivation,
}

/// A reconstructed overlap between two rules.
#[derive(Clone, Debug)]
pub struct Overlap {
    /// The outer rule: the position lives in its lhs.
    pub rule1: RuleId,
    /// The inner rule, unified into that position.
    pub rule2: RuleId,
    pub pos: u32,
    pub eqn: Equation,
    pub top: Term,
    pub proof: Derivation,
}

/// The lemma node for one rule application under a substitution,
/// respecting the direction of the view.
fn rule_lemma(rule: &ActiveRule, subst: Subst) -> Derivation {
    let lemma = Derivation::Lemma {
        lemma: rule.active_id,
        subst,
    };
    if rule.backwards {
        Derivation::symm(lemma)
    } else {
        lemma
    }
}

/// Wraps a derivation in congruence nodes so it applies at `path` inside
/// `t` instead of at the root.
fn lift_derivation(t: TermRef, path: &[u32], derivation: Derivation) -> Derivation {
    match path.split_first() {
        None => derivation,
        Some((&i, rest)) => {
            let f = match t.head() {
                Some(f) => f,
                None => panic!("path into a variable"),
            };
            let args = t
                .args()
                .iter()
                .enumerate()
                .map(|(j, child)| {
                    if j == i as usize {
                        lift_derivation(child, rest, derivation.clone())
                    } else {
                        Derivation::Refl {
                            term: child.to_owned(),
                        }
                    }
                })
                .collect();
            Derivation::Cong { f, args }
        }
    }
}

/// Renames the variables of a term apart by adding an offset.
fn shift_vars(t: TermRef, offset: VariableId) -> Term {
    let symbols: Vec<Symbol> = t
        .as_slice()
        .iter()
        .map(|&s| {
            if s.is_variable() {
                Symbol::variable(s.index() + offset)
            } else {
                s
            }
        })
        .collect();
    // The shift preserves sizes, so the slice is still well formed.
    Term::from_symbols(symbols)
}

/// Attempts the overlap of `inner` into position `pos` of `outer`'s lhs.
///
/// On success the equation is
/// `subst(outer.lhs[pos <- inner.rhs]) = subst(outer.rhs)`, where the
/// inner rule's variables have been renamed apart first.
pub fn make_overlap(outer: &ActiveRule, inner: &ActiveRule, pos: u32) -> Option<Overlap> {
    let outer_lhs = outer.rule.lhs.as_ref();
    if pos as usize >= outer_lhs.len() {
        return None;
    }
    let sub = outer_lhs.subterm_at(pos as usize);
    if sub.is_variable() {
        return None;
    }

    // Rename the inner rule apart from the outer one.
    let offset = outer_lhs
        .vars()
        .chain(outer.rule.rhs.as_ref().vars())
        .max()
        .map_or(0, |v| v + 1);
    let inner_lhs = shift_vars(inner.rule.lhs.as_ref(), offset);
    let inner_rhs = shift_vars(inner.rule.rhs.as_ref(), offset);

    let subst = unify(sub, inner_lhs.as_ref())?;

    // The unifier comes back closed, so one application is enough.
    let top = subst.apply(outer_lhs);
    let replaced = outer_lhs.replace_at(pos as usize, inner_rhs.as_ref());
    let lhs = subst.apply(replaced.as_ref());
    let rhs = subst.apply(outer.rule.rhs.as_ref());

    // The inner lemma speaks about the inner rule's original variables, so
    // its instance composes the shift with the unifier.
    let mut inner_subst = SubstBuilder::new();
    let mut inner_vars = inner.rule.lhs.as_ref().var_set();
    for v in inner.rule.rhs.as_ref().var_set() {
        if !inner_vars.contains(&v) {
            inner_vars.push(v);
        }
    }
    for v in inner_vars {
        let shifted = Term::variable(v + offset);
        inner_subst.bind(v, subst.apply(shifted.as_ref()));
    }
    let inner_subst = inner_subst.freeze();

    // top rewrites to lhs below the root and to rhs at the root; the
    // critical pair equates the two results.
    let path = outer_lhs.position_to_path(pos as usize);
    let down = lift_derivation(top.as_ref(), &path, rule_lemma(inner, inner_subst));
    let across = rule_lemma(outer, subst.clone());
    let proof = Derivation::trans(Derivation::symm(down), across);

    Some(Overlap {
        rule1: outer.rule_id,
        rule2: inner.rule_id,
        pos,
        eqn: Equation::new(lhs, rhs),
        top,
        proof,
    })
}

/// Enumerates all overlaps between `new_rule` and the current rules, in
/// both directions, within the depth budget. The new rule also overlaps
/// with itself.
pub fn overlaps(
    max_depth: u32,
    rules: &Rules,
    new_rule: &ActiveRule,
    depth_of: impl Fn(ActiveId) -> u32,
) -> Vec<(Overlap, u32)> {
    let mut out = vec![];
    let mut consider = |outer: &ActiveRule, inner: &ActiveRule| {
        let depth = 1 + depth_of(outer.active_id).max(depth_of(inner.active_id));
        if depth > max_depth {
            return;
        }
        for &pos in &outer.positions {
            if let Some(overlap) = make_overlap(outer, inner, pos) {
                out.push((overlap, depth));
            }
        }
    };
    for old in rules.iter() {
        consider(new_rule, old);
        if old.rule_id != new_rule.rule_id {
            consider(old, new_rule);
        }
    }
    out
}

/// The knobs of the passive scoring function. Smaller scores are better.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CpWeights {
    /// Cost of each function symbol in the critical pair.
    pub fun_weight: u32,

    /// Cost of each variable occurrence in the critical pair.
    pub var_weight: u32,

    /// Cost per unit of derivation depth.
    pub depth_weight: u32,
}

impl Default for CpWeights {
    fn default() -> Self {
        CpWeights {
            fun_weight: 4,
            var_weight: 1,
            depth_weight: 3,
        }
    }
}

/// Scores an overlap: cheap, shallow critical pairs come out first.
pub fn score(weights: &CpWeights, eqn: &Equation, depth: u32) -> u32 {
    let mut total = weights.depth_weight * depth;
    for t in [&eqn.lhs, &eqn.rhs] {
        for &s in t.as_ref().as_slice() {
            total += if s.is_function() {
                weights.fun_weight
            } else {
                weights.var_weight
            };
        }
    }
    total
}

/// The outcome of normalising a critical pair against the current rules.
pub enum Split {
    /// Both sides reduced to the same term.
    Joinable,

    /// What is left to consider after normalisation.
    Residual(Vec<CriticalPair>),
}

/// Normalises the two sides of a critical pair against the current rules
/// and drops it if they meet; otherwise returns the irreducible residual
/// with its proof re-rooted at the normal forms.
pub fn split(sig: &Signature, rules: &Rules, cp: CriticalPair) -> Split {
    if cp.eqn.is_trivial() {
        return Split::Joinable;
    }
    let strat = rewrite_decreasing(sig, rules);
    let lhs = normalise_with(|_| true, &strat, cp.eqn.lhs.as_ref());
    let rhs = normalise_with(|_| true, &strat, cp.eqn.rhs.as_ref());
    if lhs.result == rhs.result {
        return Split::Joinable;
    }
    // lhs' = lhs = rhs = rhs'
    let proof = Derivation::trans(
        Derivation::symm(lhs.reduction.derivation()),
        Derivation::trans(cp.proof, rhs.reduction.derivation()),
    );
    Split::Residual(vec![CriticalPair {
        eqn: Equation::new(lhs.result, rhs.result),
        depth: cp.depth,
        top: cp.top,
        proof,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::symbol::{FunctionData, FunctionId};
    use crate::proof::{certify, Lemmas};
    use crate::rule::orient;

    fn group_free_setup() -> (Signature, Rules, Lemmas, FunctionId, FunctionId) {
        let sig = Signature::new();
        let zero = sig.add(FunctionData::minimal_constant("0"));
        let times = sig.add(FunctionData::new("*", 2, 1, 1));
        let mut rules = Rules::new();
        let mut lemmas = Lemmas::new();
        for (i, (lhs, rhs)) in [
            (
                Term::fun(times, &[Term::variable(0), Term::constant(zero)]),
                Term::variable(0),
            ),
            (
                Term::fun(times, &[Term::constant(zero), Term::variable(0)]),
                Term::variable(0),
            ),
        ]
        .into_iter()
        .enumerate()
        {
            let eqn = Equation::new(lhs, rhs);
            let axiom = lemmas.add_axiom(&format!("ax{}", i), eqn.clone());
            lemmas.add_lemma(
                i as u32,
                Derivation::Axiom {
                    axiom,
                    subst: Subst::empty(),
                },
            );
            let rule = orient(&sig, &eqn).unwrap();
            rules.insert(ActiveRule::new(i as u32, i as u32, rule, false));
        }
        (sig, rules, lemmas, zero, times)
    }

    #[test]
    fn overlap_of_the_unit_rules() {
        let (_sig, rules, lemmas, zero, times) = group_free_setup();
        // Root overlap: *(x0, 0) unified with the renamed *(0, x1) forces
        // x0 -> 0 and x1 -> 0, so both sides of the pair collapse to 0.
        let r1 = rules.get(0).unwrap();
        let r2 = rules.get(1).unwrap();
        let overlap = make_overlap(r1, r2, 0).unwrap();
        assert_eq!(overlap.eqn.lhs, Term::constant(zero));
        assert_eq!(overlap.eqn.rhs, Term::constant(zero));
        assert_eq!(
            overlap.top,
            Term::fun(times, &[Term::constant(zero), Term::constant(zero)])
        );
        // The proof is a genuine derivation of the equation.
        let certified = certify(&lemmas, &overlap.proof).unwrap();
        assert_eq!(certified.equation, overlap.eqn);
    }

    #[test]
    fn overlaps_enumerates_both_directions() {
        let (_sig, rules, _lemmas, _zero, _times) = group_free_setup();
        let new_rule = rules.get(1).unwrap().clone();
        let found = overlaps(u32::MAX, &rules, &new_rule, |_| 0);
        // The new rule overlaps itself at the root and rule 0 in both
        // orders at the root; nested positions of these lhs patterns are
        // the constant 0, which cannot unify with a product.
        assert!(found.len() >= 3);
        for (overlap, depth) in &found {
            assert_eq!(*depth, 1);
            let _ = overlap;
        }
    }

    #[test]
    fn depth_budget_prunes_overlaps() {
        let (_sig, rules, _lemmas, _zero, _times) = group_free_setup();
        let new_rule = rules.get(1).unwrap().clone();
        let found = overlaps(0, &rules, &new_rule, |_| 0);
        assert!(found.is_empty());
    }

    #[test]
    fn score_prefers_small_shallow_pairs() {
        let weights = CpWeights::default();
        let small = Equation::new(Term::variable(0), Term::constant(0));
        let big = Equation::new(
            Term::fun(1, &[Term::constant(0), Term::constant(0)]),
            Term::fun(1, &[Term::constant(0), Term::constant(0)]),
        );
        assert!(score(&weights, &small, 0) < score(&weights, &big, 0));
        assert!(score(&weights, &small, 0) < score(&weights, &small, 5));
    }

    #[test]
    fn split_joins_a_pair_that_normalises_together() {
        let (sig, rules, _lemmas, zero, times) = group_free_setup();
        // *(0, x0) = *(x0, 0): both normalise to x0.
        let cp = CriticalPair {
            eqn: Equation::new(
                Term::fun(times, &[Term::constant(zero), Term::variable(0)]),
                Term::fun(times, &[Term::variable(0), Term::constant(zero)]),
            ),
            depth: 1,
            top: None,
            proof: Derivation::Refl {
                term: Term::variable(0),
            },
        };
        assert!(matches!(split(&sig, &rules, cp), Split::Joinable));
    }
}
