// Rewriting: proof-carrying reduction objects, composable strategies, and
// the proof-free simplifier that normalises against oriented rules only.

use std::collections::HashMap;

use crate::kernel::symbol::{FunctionId, Signature};
use crate::kernel::term::{Term, TermBuilder, TermRef};
use crate::kernel::Subst;
use crate::proof::Derivation;
use crate::rule::{ActiveId, Rule, RuleId, Rules};

/// How many parallel rounds `normalise_with` runs before concluding the
/// rewrite system loops. Tripping this is a bug indicator, not an input
/// error.
const MAX_REWRITE_ROUNDS: usize = 1000;

/// A rewrite with enough structure to replay it as a proof.
#[derive(Clone, Debug)]
pub enum Reduction {
    /// The empty reduction of a term to itself.
    Refl { term: Term },

    /// One rule application at the root.
    Step {
        rule_id: RuleId,
        active_id: ActiveId,
        /// Whether the rule view is the reversed direction of its Active.
        backwards: bool,
        rule: Rule,
        subst: Subst,
    },

    /// Sequential composition.
    Trans(Box<Reduction>, Box<Reduction>),

    /// One independent reduction per argument.
    Cong { f: FunctionId, args: Vec<Reduction> },
}

impl Reduction {
    pub fn refl(term: Term) -> Reduction {
        Reduction::Refl { term }
    }

    /// Smart transitivity: collapses Refl and left-associates so the final
    /// term stays one hop from the top.
    pub fn trans(p: Reduction, q: Reduction) -> Reduction {
        match (p, q) {
            (Reduction::Refl { .. }, q) => q,
            (p, Reduction::Refl { .. }) => p,
            (p, Reduction::Trans(q1, q2)) => Reduction::Trans(Box::new(Reduction::trans(p, *q1)), q2),
            (p, q) => Reduction::Trans(Box::new(p), Box::new(q)),
        }
    }

    /// Smart congruence: collapses to Refl when no argument moves.
    pub fn cong(f: FunctionId, args: Vec<Reduction>) -> Reduction {
        if args.iter().all(|r| matches!(r, Reduction::Refl { .. })) {
            let mut builder = TermBuilder::new();
            builder.emit_fun(f, |b| {
                for r in &args {
                    if let Reduction::Refl { term } = r {
                        b.emit_term(term.as_ref());
                    }
                }
            });
            Reduction::Refl {
                term: builder.finish(),
            }
        } else {
            Reduction::Cong { f, args }
        }
    }

    /// The term this reduction ends at.
    pub fn result(&self) -> Term {
        match self {
            Reduction::Refl { term } => term.clone(),
            Reduction::Step { rule, subst, .. } => subst.apply(rule.rhs.as_ref()),
            Reduction::Trans(_, q) => q.result(),
            Reduction::Cong { f, args } => {
                let results: Vec<Term> = args.iter().map(|r| r.result()).collect();
                Term::fun(*f, &results)
            }
        }
    }

    /// The term this reduction starts from.
    pub fn initial(&self) -> Term {
        match self {
            Reduction::Refl { term } => term.clone(),
            Reduction::Step { rule, subst, .. } => subst.apply(rule.lhs.as_ref()),
            Reduction::Trans(p, _) => p.initial(),
            Reduction::Cong { f, args } => {
                let initials: Vec<Term> = args.iter().map(|r| r.initial()).collect();
                Term::fun(*f, &initials)
            }
        }
    }

    /// Replays the reduction as a derivation, referencing rules as lemmas.
    pub fn derivation(&self) -> Derivation {
        match self {
            Reduction::Refl { term } => Derivation::Refl { term: term.clone() },
            Reduction::Step {
                active_id,
                backwards,
                subst,
                ..
            } => {
                let lemma = Derivation::Lemma {
                    lemma: *active_id,
                    subst: subst.clone(),
                };
                if *backwards {
                    Derivation::symm(lemma)
                } else {
                    lemma
                }
            }
            Reduction::Trans(p, q) => Derivation::trans(p.derivation(), q.derivation()),
            Reduction::Cong { f, args } => {
                Derivation::cong(*f, args.iter().map(|r| r.derivation()).collect())
            }
        }
    }
}

/// A reduction with its final term cached, so reductions can be compared
/// and deduplicated by where they end up.
#[derive(Clone, Debug)]
pub struct Resulting {
    pub reduction: Reduction,
    pub result: Term,
}

impl Resulting {
    pub fn new(reduction: Reduction) -> Resulting {
        let result = reduction.result();
        Resulting { reduction, result }
    }
}

impl PartialEq for Resulting {
    fn eq(&self, other: &Resulting) -> bool {
        self.result == other.result
    }
}

impl Eq for Resulting {}

/// A rewriting strategy: all the single reductions it offers at a term.
pub trait Strategy {
    fn apply(&self, t: TermRef) -> Vec<Reduction>;
}

impl<S: Strategy + ?Sized> Strategy for &S {
    fn apply(&self, t: TermRef) -> Vec<Reduction> {
        (**self).apply(t)
    }
}

/// Root steps from the rule index, filtered by an eligibility predicate.
pub struct Rewrite<'a, P> {
    pub sig: &'a Signature,
    pub rules: &'a Rules,
    pub pred: P,
}

impl<'a, P: Fn(&crate::rule::ActiveRule, &Subst) -> bool> Strategy for Rewrite<'a, P> {
    fn apply(&self, t: TermRef) -> Vec<Reduction> {
        let mut out = vec![];
        for (subst, _, &rule_id) in self.rules.index.all.matches(t) {
            let rule = match self.rules.get(rule_id) {
                Some(rule) => rule,
                None => panic!("rule {} is indexed but not stored", rule_id),
            };
            if !(self.pred)(rule, &subst) {
                continue;
            }
            out.push(Reduction::Step {
                rule_id,
                active_id: rule.active_id,
                backwards: rule.backwards,
                rule: rule.rule.clone(),
                subst,
            });
        }
        out
    }
}

/// A `Rewrite` whose predicate is the rule's own reduction-eligibility
/// test: oriented rules always fire, the other kinds only when the
/// instance decreases.
pub fn rewrite_decreasing<'a>(
    sig: &'a Signature,
    rules: &'a Rules,
) -> Rewrite<'a, impl Fn(&crate::rule::ActiveRule, &Subst) -> bool + 'a> {
    Rewrite {
        sig,
        rules,
        pred: move |rule: &crate::rule::ActiveRule, subst: &Subst| {
            rule.rule.reduces(sig, subst)
        },
    }
}

/// Lifts a reduction of the subterm at `pos` to a reduction of the whole
/// term, wrapping it in congruence nodes along the path.
fn lift(t: TermRef, pos: usize, reduction: Reduction) -> Reduction {
    if pos == 0 {
        return reduction;
    }
    let f = match t.head() {
        Some(f) => f,
        None => panic!("position {} inside a variable", pos),
    };
    let mut args = vec![];
    let mut offset = 1;
    for child in t.args().iter() {
        if pos >= offset && pos < offset + child.len() {
            args.push(lift(child, pos - offset, reduction.clone()));
        } else {
            args.push(Reduction::refl(child.to_owned()));
        }
        offset += child.len();
    }
    Reduction::Cong { f, args }
}

/// The disjoint union of a strategy at every position, root first.
pub struct Anywhere<S>(pub S);

impl<S: Strategy> Strategy for Anywhere<S> {
    fn apply(&self, t: TermRef) -> Vec<Reduction> {
        let mut out = vec![];
        for (pos, sub) in t.subterms() {
            for reduction in self.0.apply(sub) {
                out.push(lift(t, pos, reduction));
            }
        }
        out
    }
}

/// A strategy applied only inside arguments, never at the root.
pub struct Nested<S>(pub S);

impl<S: Strategy> Strategy for Nested<S> {
    fn apply(&self, t: TermRef) -> Vec<Reduction> {
        let mut out = vec![];
        for (pos, sub) in t.subterms().skip(1) {
            for reduction in self.0.apply(sub) {
                out.push(lift(t, pos, reduction));
            }
        }
        out
    }
}

/// The leftmost innermost parallel step: every argument reduces where it
/// can; the root is only tried when no argument moves.
pub struct Parallel<S>(pub S);

impl<S: Strategy> Parallel<S> {
    pub fn step(&self, t: TermRef) -> Option<Reduction> {
        if let Some(f) = t.head() {
            let children: Vec<TermRef> = t.args().iter().collect();
            let child_steps: Vec<Option<Reduction>> =
                children.iter().map(|c| self.step(*c)).collect();
            if child_steps.iter().any(|s| s.is_some()) {
                let args = children
                    .iter()
                    .zip(child_steps)
                    .map(|(c, s)| s.unwrap_or_else(|| Reduction::refl(c.to_owned())))
                    .collect();
                return Some(Reduction::Cong { f, args });
            }
        }
        self.0.apply(t).into_iter().next()
    }
}

impl<S: Strategy> Strategy for Parallel<S> {
    fn apply(&self, t: TermRef) -> Vec<Reduction> {
        self.step(t).into_iter().collect()
    }
}

/// Iterates parallel steps from `t`, composing the full reduction, until
/// no step applies or the predicate rejects the next term.
///
/// Runs of more than MAX_REWRITE_ROUNDS rounds mean the rewrite system is
/// effectively non-terminating, which is fatal.
pub fn normalise_with<S: Strategy>(
    pred: impl Fn(TermRef) -> bool,
    strat: S,
    t: TermRef,
) -> Resulting {
    let parallel = Parallel(strat);
    let mut reduction = Reduction::refl(t.to_owned());
    let mut current = t.to_owned();
    for _ in 0..MAX_REWRITE_ROUNDS {
        let step = match parallel.step(current.as_ref()) {
            Some(step) => step,
            None => {
                return Resulting {
                    reduction,
                    result: current,
                }
            }
        };
        let next = step.result();
        if !pred(next.as_ref()) {
            return Resulting {
                reduction,
                result: current,
            };
        }
        reduction = Reduction::trans(reduction, step);
        current = next;
    }
    panic!(
        "rewriting {:?} did not terminate after {} rounds",
        t, MAX_REWRITE_ROUNDS
    );
}

/// All terms reachable from `ts`, each with a reduction from its origin.
pub fn successors<S: Strategy>(strat: &S, ts: &[Term]) -> HashMap<Term, Reduction> {
    let anywhere = Anywhere(strat);
    let mut seen: HashMap<Term, Reduction> = HashMap::new();
    let mut queue: Vec<(Term, Reduction)> = ts
        .iter()
        .map(|t| (t.clone(), Reduction::refl(t.clone())))
        .collect();
    while let Some((t, reduction)) = queue.pop() {
        if seen.contains_key(&t) {
            continue;
        }
        for step in anywhere.apply(t.as_ref()) {
            let next = step.result();
            if !seen.contains_key(&next) {
                queue.push((next, Reduction::trans(reduction.clone(), step)));
            }
        }
        seen.insert(t, reduction);
    }
    seen
}

/// The irreducible descendants of `ts`.
pub fn normal_forms<S: Strategy>(strat: &S, ts: &[Term]) -> HashMap<Term, Reduction> {
    let anywhere = Anywhere(strat);
    successors(strat, ts)
        .into_iter()
        .filter(|(t, _)| anywhere.apply(t.as_ref()).is_empty())
        .collect()
}

/// Pure normalisation against oriented rules only: no proof output, a
/// single rewrite at the leftmost applicable position until fixpoint.
/// This is the hot path.
pub fn simplify(sig: &Signature, rules: &Rules, t: TermRef) -> Term {
    let mut current = t.to_owned();
    loop {
        match simple_rewrite(sig, rules, current.as_ref()) {
            Some(next) => current = next,
            None => return current,
        }
    }
}

/// One oriented, KBO-valid rewrite at the leftmost applicable position.
fn simple_rewrite(_sig: &Signature, rules: &Rules, t: TermRef) -> Option<Term> {
    for (pos, sub) in t.subterms() {
        if sub.is_variable() {
            continue;
        }
        for (subst, _, &rule_id) in rules.index.oriented.matches(sub) {
            let rule = rules
                .get(rule_id)
                .unwrap_or_else(|| panic!("rule {} is indexed but not stored", rule_id));
            let image = subst.apply(rule.rule.rhs.as_ref());
            return Some(t.replace_at(pos, image.as_ref()));
        }
    }
    None
}
