use std::fmt;

use serde::{Deserialize, Serialize};

use crate::index::TermIndex;
use crate::kernel::ordering::{less_eq, less_in, less_than, Model, Strictness};
use crate::kernel::symbol::{FunctionId, Signature, VariableId};
use crate::kernel::term::{canonicalise, Term, TermRef};
use crate::kernel::unify::unify;
use crate::kernel::Subst;
use crate::proof::Derivation;

pub type ActiveId = u32;
pub type RuleId = u32;

/// An unordered pair of terms. Everything the engine consumes starts as one
/// of these, and `unorient` gets back to one.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub lhs: Term,
    pub rhs: Term,
}

impl Equation {
    pub fn new(lhs: Term, rhs: Term) -> Equation {
        Equation { lhs, rhs }
    }

    pub fn is_trivial(&self) -> bool {
        self.lhs == self.rhs
    }

    pub fn flipped(&self) -> Equation {
        Equation {
            lhs: self.rhs.clone(),
            rhs: self.lhs.clone(),
        }
    }

    /// Renumbers variables by first occurrence, shared across both sides.
    pub fn canonicalised(&self) -> Equation {
        let mut out = canonicalise(&[self.lhs.as_ref(), self.rhs.as_ref()]);
        let rhs = out.pop().unwrap();
        let lhs = out.pop().unwrap();
        Equation { lhs, rhs }
    }

    /// Puts the weakly-larger side first. Flipping on the nonstrict
    /// comparison matters: a side that is only weakly below the other
    /// (they coincide at the minimal constant) must still end up on the
    /// right for `orient` to see the weakly-oriented case. Sound for
    /// distinct terms by antisymmetry.
    pub fn ordered(&self, sig: &Signature) -> Equation {
        if !self.is_trivial() && less_eq(sig, self.lhs.as_ref(), self.rhs.as_ref()) {
            self.flipped()
        } else {
            self.clone()
        }
    }

    /// The distinct variables of both sides, in order of first occurrence.
    pub fn vars(&self) -> Vec<VariableId> {
        let mut vars = self.lhs.as_ref().var_set();
        for v in self.rhs.as_ref().var_set() {
            if !vars.contains(&v) {
                vars.push(v);
            }
        }
        vars
    }

    pub fn size(&self) -> usize {
        self.lhs.len().max(self.rhs.len())
    }

    /// Renders the equation with real function names.
    pub fn display<'a>(&'a self, sig: &'a Signature) -> DisplayEquation<'a> {
        DisplayEquation { eqn: self, sig }
    }
}

pub struct DisplayEquation<'a> {
    eqn: &'a Equation,
    sig: &'a Signature,
}

impl fmt::Display for DisplayEquation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} = {}",
            self.eqn.lhs.as_ref().display(self.sig),
            self.eqn.rhs.as_ref().display(self.sig)
        )
    }
}

/// The directional usage policy of a rewrite rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Orientation {
    /// Usable left to right, always.
    Oriented,

    /// Oriented, but only usable when some variable in `vars` is
    /// instantiated to something other than the minimal constant.
    WeaklyOriented {
        minimal: FunctionId,
        vars: Vec<VariableId>,
    },

    /// The two sides are variable renamings of each other. Usable with a
    /// substitution iff the image of the pair list lexicographically
    /// decreases.
    Permutative {
        pairs: Vec<(VariableId, VariableId)>,
    },

    /// Neither side is universally bigger. Usable with a substitution iff
    /// the instantiated rhs is strictly below the instantiated lhs.
    Unoriented,
}

impl Orientation {
    pub fn is_oriented(&self) -> bool {
        matches!(self, Orientation::Oriented | Orientation::WeaklyOriented { .. })
    }
}

/// A rewrite rule: an equation plus its orientation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule {
    pub lhs: Term,
    pub rhs: Term,
    pub orientation: Orientation,
}

impl Rule {
    /// Forgets the orientation.
    pub fn unorient(&self) -> Equation {
        Equation::new(self.lhs.clone(), self.rhs.clone())
    }

    /// Flips a bidirectional rule. Calling this on an oriented rule is a
    /// programming error.
    pub fn backwards(&self) -> Rule {
        let orientation = match &self.orientation {
            Orientation::Unoriented => Orientation::Unoriented,
            Orientation::Permutative { pairs } => Orientation::Permutative {
                pairs: pairs.iter().map(|&(u, v)| (v, u)).collect(),
            },
            _ => panic!("backwards on an oriented rule: {:?}", self),
        };
        Rule {
            lhs: self.rhs.clone(),
            rhs: self.lhs.clone(),
            orientation,
        }
    }

    /// Whether the rule may rewrite under the given substitution.
    pub fn reduces(&self, sig: &Signature, subst: &Subst) -> bool {
        match &self.orientation {
            Orientation::Oriented => true,
            Orientation::WeaklyOriented { minimal, vars } => vars.iter().any(|&v| {
                match subst.get(v) {
                    Some(image) => !image.is_constant(*minimal),
                    // An unbound variable is itself not the minimal constant.
                    None => true,
                }
            }),
            Orientation::Permutative { pairs } => {
                for &(u, v) in pairs {
                    let su = subst.apply(Term::variable(u).as_ref());
                    let sv = subst.apply(Term::variable(v).as_ref());
                    if su == sv {
                        continue;
                    }
                    return less_than(sig, sv.as_ref(), su.as_ref());
                }
                false
            }
            Orientation::Unoriented => {
                let lhs = subst.apply(self.lhs.as_ref());
                let rhs = subst.apply(self.rhs.as_ref());
                less_than(sig, rhs.as_ref(), lhs.as_ref())
            }
        }
    }

    /// Whether the rule may rewrite under the substitution in a model.
    pub fn reduces_in_model(&self, sig: &Signature, model: &Model, subst: &Subst) -> bool {
        let lhs = subst.apply(self.lhs.as_ref());
        let rhs = subst.apply(self.rhs.as_ref());
        less_in(sig, model, rhs.as_ref(), lhs.as_ref()) == Some(Strictness::Strict)
    }

    /// Renders the rule with an arrow matching its orientation.
    pub fn display<'a>(&'a self, sig: &'a Signature) -> DisplayRule<'a> {
        DisplayRule { rule: self, sig }
    }
}

pub struct DisplayRule<'a> {
    rule: &'a Rule,
    sig: &'a Signature,
}

impl fmt::Display for DisplayRule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let arrow = if self.rule.orientation.is_oriented() {
            "->"
        } else {
            "<->"
        };
        write!(
            f,
            "{} {} {}",
            self.rule.lhs.as_ref().display(self.sig),
            arrow,
            self.rule.rhs.as_ref().display(self.sig)
        )
    }
}

/// Why an equation could not be turned into a rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrientError {
    /// The two sides are identical.
    Trivial,
    /// The right-hand side is universally bigger than the left.
    RhsGreater,
    /// The right-hand side has a variable the left does not bind.
    UnboundVariable,
}

impl fmt::Display for OrientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrientError::Trivial => write!(f, "trivial equation"),
            OrientError::RhsGreater => write!(f, "rhs > lhs"),
            OrientError::UnboundVariable => write!(f, "unbound variable in rhs"),
        }
    }
}

/// Selects an orientation for `lhs = rhs`.
///
/// The caller passes the intended direction; an equation whose rhs is
/// universally bigger is rejected rather than silently flipped.
pub fn orient(sig: &Signature, eqn: &Equation) -> Result<Rule, OrientError> {
    let lhs = eqn.lhs.as_ref();
    let rhs = eqn.rhs.as_ref();
    if eqn.is_trivial() {
        return Err(OrientError::Trivial);
    }

    if less_eq(sig, rhs, lhs) {
        // Oriented, unless the two sides collapse when every variable is
        // the minimal constant; then the rule only decreases elsewhere.
        if let (Some(minimal), Some(mgu)) = (sig.minimal(), unify(lhs, rhs)) {
            let vars: Vec<VariableId> = mgu.domain().collect();
            let all_minimal = !vars.is_empty()
                && vars
                    .iter()
                    .all(|&v| mgu.get(v).map_or(false, |t| t.is_constant(minimal)));
            if all_minimal {
                return Ok(Rule {
                    lhs: eqn.lhs.clone(),
                    rhs: eqn.rhs.clone(),
                    orientation: Orientation::WeaklyOriented { minimal, vars },
                });
            }
        }
        return Ok(Rule {
            lhs: eqn.lhs.clone(),
            rhs: eqn.rhs.clone(),
            orientation: Orientation::Oriented,
        });
    }

    if less_eq(sig, lhs, rhs) {
        return Err(OrientError::RhsGreater);
    }

    let lhs_vars = lhs.var_set();
    for v in rhs.var_set() {
        if !lhs_vars.contains(&v) {
            return Err(OrientError::UnboundVariable);
        }
    }

    if let Some(pairs) = permutation_witness(lhs, rhs) {
        return Ok(Rule {
            lhs: eqn.lhs.clone(),
            rhs: eqn.rhs.clone(),
            orientation: Orientation::Permutative { pairs },
        });
    }

    Ok(Rule {
        lhs: eqn.lhs.clone(),
        rhs: eqn.rhs.clone(),
        orientation: Orientation::Unoriented,
    })
}

/// If the two sides are the same term up to a permutation of variables,
/// returns the list of variable pairs where they differ, in occurrence
/// order. The mapping must be injective; together with the unbound-variable
/// check it is then a genuine permutation of the left side's variables.
fn permutation_witness(
    lhs: TermRef,
    rhs: TermRef,
) -> Option<Vec<(VariableId, VariableId)>> {
    if lhs.len() != rhs.len() {
        return None;
    }
    let mut forward: Vec<(VariableId, VariableId)> = vec![];
    for (&a, &b) in lhs.as_slice().iter().zip(rhs.as_slice().iter()) {
        if a.is_function() != b.is_function() {
            return None;
        }
        if a.is_function() {
            if a.index() != b.index() {
                return None;
            }
            continue;
        }
        let (u, v) = (a.index(), b.index());
        match forward.iter().find(|(w, _)| *w == u) {
            Some(&(_, mapped)) if mapped != v => return None,
            Some(_) => {}
            None => {
                // The mapping must stay injective to be a permutation.
                if forward.iter().any(|&(_, mapped)| mapped == v) {
                    return None;
                }
                forward.push((u, v));
            }
        }
    }
    let pairs: Vec<(VariableId, VariableId)> =
        forward.into_iter().filter(|&(u, v)| u != v).collect();
    if pairs.is_empty() {
        return None;
    }
    Some(pairs)
}

/// A rule as it participates in rewriting: one direction of an Active, with
/// its own id and the cached non-variable positions of its lhs.
#[derive(Clone, Debug)]
pub struct ActiveRule {
    pub rule_id: RuleId,
    pub active_id: ActiveId,
    pub rule: Rule,

    /// Whether this view is the reversed direction of its Active's rule.
    pub backwards: bool,

    /// Non-variable positions of the lhs, in pre-order.
    pub positions: Vec<u32>,
}

impl ActiveRule {
    pub fn new(rule_id: RuleId, active_id: ActiveId, rule: Rule, backwards: bool) -> ActiveRule {
        let positions = rule.lhs.as_ref().nonvar_positions();
        ActiveRule {
            rule_id,
            active_id,
            rule,
            backwards,
            positions,
        }
    }
}

/// A rule as inserted into the engine.
#[derive(Clone, Debug)]
pub struct Active {
    pub id: ActiveId,

    /// One more than the maximum depth of the parents.
    pub depth: u32,

    pub rule: Rule,

    /// The top term of the overlap this rule came from, for proof context.
    pub top: Option<Term>,

    /// How the rule's equation was derived from the axioms.
    pub proof: Derivation,

    /// The model that witnessed the orientation.
    pub model: Model,

    /// The ids of this Active's one or two directional views.
    pub rule_ids: Vec<RuleId>,
}

/// Two term indices side by side: `oriented` holds only rules that always
/// decrease and backs the fast simplifier; `all` holds every usable
/// direction and backs full rewriting.
pub struct RuleIndex {
    pub oriented: TermIndex<RuleId>,
    pub all: TermIndex<RuleId>,
}

impl RuleIndex {
    pub fn new() -> RuleIndex {
        RuleIndex {
            oriented: TermIndex::new(),
            all: TermIndex::new(),
        }
    }

    pub fn insert(&mut self, rule: &ActiveRule) {
        self.all.insert(rule.rule.lhs.as_ref(), rule.rule_id);
        if rule.rule.orientation == Orientation::Oriented {
            self.oriented.insert(rule.rule.lhs.as_ref(), rule.rule_id);
        }
    }

    pub fn remove(&mut self, rule: &ActiveRule) {
        self.all.remove(rule.rule.lhs.as_ref(), &rule.rule_id);
        if rule.rule.orientation == Orientation::Oriented {
            self.oriented.remove(rule.rule.lhs.as_ref(), &rule.rule_id);
        }
    }
}

impl Default for RuleIndex {
    fn default() -> Self {
        RuleIndex::new()
    }
}

/// The live rule collection: the index plus lookup by rule id.
/// Rewriting strategies read this; the engine mutates it.
pub struct Rules {
    pub index: RuleIndex,
    by_rule_id: std::collections::HashMap<RuleId, ActiveRule>,
}

impl Rules {
    pub fn new() -> Rules {
        Rules {
            index: RuleIndex::new(),
            by_rule_id: std::collections::HashMap::new(),
        }
    }

    pub fn insert(&mut self, rule: ActiveRule) {
        self.index.insert(&rule);
        self.by_rule_id.insert(rule.rule_id, rule);
    }

    pub fn remove(&mut self, rule_id: RuleId) -> Option<ActiveRule> {
        let rule = self.by_rule_id.remove(&rule_id)?;
        self.index.remove(&rule);
        Some(rule)
    }

    pub fn get(&self, rule_id: RuleId) -> Option<&ActiveRule> {
        self.by_rule_id.get(&rule_id)
    }

    pub fn len(&self) -> usize {
        self.by_rule_id.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveRule> {
        self.by_rule_id.values()
    }
}

impl Default for Rules {
    fn default() -> Self {
        Rules::new()
    }
}
