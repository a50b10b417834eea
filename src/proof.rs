use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kernel::symbol::{FunctionId, Signature};
use crate::kernel::term::{Term, TermBuilder};
use crate::kernel::Subst;
use crate::rule::Equation;

/// Identifies an axiom as given to the engine.
pub type AxiomId = u32;

/// Identifies a lemma: the equation of an active rule, content-addressed by
/// the active's id so a rule used many times shares one proof substructure.
pub type LemmaId = u32;

/// A node in the derivation DAG. Everything the engine proves is a chain of
/// these from the axioms.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Derivation {
    /// An instance of an axiom.
    Axiom { axiom: AxiomId, subst: Subst },

    /// The trivial proof of t = t.
    Refl { term: Term },

    /// An instance of a previously proven rule.
    Lemma { lemma: LemmaId, subst: Subst },

    /// Transitivity: a = b and b = c gives a = c.
    Trans(Box<Derivation>, Box<Derivation>),

    /// Congruence: proofs of the arguments give a proof of the application.
    Cong { f: FunctionId, args: Vec<Derivation> },

    /// Symmetry: a = b gives b = a.
    Symm(Box<Derivation>),
}

impl Derivation {
    /// Smart transitivity: drops Refl on either side and left-associates so
    /// the rightmost step stays shallow.
    pub fn trans(p: Derivation, q: Derivation) -> Derivation {
        match (p, q) {
            (Derivation::Refl { .. }, q) => q,
            (p, Derivation::Refl { .. }) => p,
            (p, Derivation::Trans(q1, q2)) => {
                Derivation::Trans(Box::new(Derivation::trans(p, *q1)), q2)
            }
            (p, q) => Derivation::Trans(Box::new(p), Box::new(q)),
        }
    }

    /// Smart symmetry: an involution that leaves Refl alone.
    pub fn symm(p: Derivation) -> Derivation {
        match p {
            Derivation::Refl { term } => Derivation::Refl { term },
            Derivation::Symm(q) => *q,
            p => Derivation::Symm(Box::new(p)),
        }
    }

    /// Smart congruence: collapses to Refl when every child is Refl.
    pub fn cong(f: FunctionId, args: Vec<Derivation>) -> Derivation {
        if args.iter().all(|p| matches!(p, Derivation::Refl { .. })) {
            let mut builder = TermBuilder::new();
            builder.emit_fun(f, |b| {
                for p in &args {
                    if let Derivation::Refl { term } = p {
                        b.emit_term(term.as_ref());
                    }
                }
            });
            Derivation::Refl {
                term: builder.finish(),
            }
        } else {
            Derivation::Cong { f, args }
        }
    }
}

/// The proof context: axioms by id and lemmas by content address.
pub struct Lemmas {
    axioms: Vec<(String, Equation)>,
    lemmas: HashMap<LemmaId, Derivation>,
}

impl Lemmas {
    pub fn new() -> Lemmas {
        Lemmas {
            axioms: vec![],
            lemmas: HashMap::new(),
        }
    }

    pub fn add_axiom(&mut self, name: &str, eqn: Equation) -> AxiomId {
        let id = self.axioms.len() as AxiomId;
        self.axioms.push((name.to_string(), eqn));
        id
    }

    pub fn axiom(&self, id: AxiomId) -> Option<&(String, Equation)> {
        self.axioms.get(id as usize)
    }

    /// Registers the derivation that proves a lemma's equation.
    /// Re-registering the same id is fine as long as the derivation agrees.
    pub fn add_lemma(&mut self, id: LemmaId, derivation: Derivation) {
        self.lemmas.insert(id, derivation);
    }

    pub fn lemma(&self, id: LemmaId) -> Option<&Derivation> {
        self.lemmas.get(&id)
    }
}

impl Default for Lemmas {
    fn default() -> Self {
        Lemmas::new()
    }
}

/// Why certification failed. Any of these indicates a bug in proof
/// construction, not in the input problem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertifyError {
    UnknownAxiom(AxiomId),
    UnknownLemma(LemmaId),
    /// The two halves of a Trans do not meet: left ends at the first term,
    /// right starts at the second.
    BrokenChain(Term, Term),
}

impl fmt::Display for CertifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CertifyError::UnknownAxiom(id) => write!(f, "unknown axiom {}", id),
            CertifyError::UnknownLemma(id) => write!(f, "unknown lemma {}", id),
            CertifyError::BrokenChain(a, b) => {
                write!(f, "transitivity mismatch: {:?} vs {:?}", a, b)
            }
        }
    }
}

/// A derivation together with the equation it proves.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certified {
    pub equation: Equation,
}

/// Checks that every step's conclusion matches the composition of its
/// premises, walking the DAG once and memoising lemma conclusions.
pub fn certify(lemmas: &Lemmas, derivation: &Derivation) -> Result<Certified, CertifyError> {
    let mut memo = HashMap::new();
    let equation = conclusion(lemmas, derivation, &mut memo)?;
    Ok(Certified { equation })
}

fn conclusion(
    lemmas: &Lemmas,
    derivation: &Derivation,
    memo: &mut HashMap<LemmaId, Equation>,
) -> Result<Equation, CertifyError> {
    match derivation {
        Derivation::Axiom { axiom, subst } => {
            let (_, eqn) = lemmas
                .axiom(*axiom)
                .ok_or(CertifyError::UnknownAxiom(*axiom))?;
            Ok(Equation::new(
                subst.apply(eqn.lhs.as_ref()),
                subst.apply(eqn.rhs.as_ref()),
            ))
        }
        Derivation::Refl { term } => Ok(Equation::new(term.clone(), term.clone())),
        Derivation::Lemma { lemma, subst } => {
            let eqn = match memo.get(lemma) {
                Some(eqn) => eqn.clone(),
                None => {
                    let proof = lemmas
                        .lemma(*lemma)
                        .ok_or(CertifyError::UnknownLemma(*lemma))?;
                    let eqn = conclusion(lemmas, proof, memo)?;
                    memo.insert(*lemma, eqn.clone());
                    eqn
                }
            };
            Ok(Equation::new(
                subst.apply(eqn.lhs.as_ref()),
                subst.apply(eqn.rhs.as_ref()),
            ))
        }
        Derivation::Trans(p, q) => {
            let left = conclusion(lemmas, p, memo)?;
            let right = conclusion(lemmas, q, memo)?;
            if left.rhs != right.lhs {
                return Err(CertifyError::BrokenChain(left.rhs, right.lhs));
            }
            Ok(Equation::new(left.lhs, right.rhs))
        }
        Derivation::Cong { f, args } => {
            let mut lhs = TermBuilder::new();
            let mut rhs = TermBuilder::new();
            let mut conclusions = vec![];
            for p in args {
                conclusions.push(conclusion(lemmas, p, memo)?);
            }
            lhs.emit_fun(*f, |b| {
                for c in &conclusions {
                    b.emit_term(c.lhs.as_ref());
                }
            });
            rhs.emit_fun(*f, |b| {
                for c in &conclusions {
                    b.emit_term(c.rhs.as_ref());
                }
            });
            Ok(Equation::new(lhs.finish(), rhs.finish()))
        }
        Derivation::Symm(p) => {
            let eqn = conclusion(lemmas, p, memo)?;
            Ok(eqn.flipped())
        }
    }
}

/// A flat, serialisable listing of a certified proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Certificate {
    pub goal: String,
    pub conclusion: String,
    pub steps: Vec<String>,
}

impl Certificate {
    /// Renders a certified derivation as readable lines, one per node, with
    /// lemma bodies listed once.
    pub fn new(
        goal: &str,
        sig: &Signature,
        lemmas: &Lemmas,
        derivation: &Derivation,
        certified: &Certified,
    ) -> Certificate {
        let mut steps = vec![];
        let mut listed = vec![];
        render(sig, lemmas, derivation, &mut steps, &mut listed, 0);
        Certificate {
            goal: goal.to_string(),
            conclusion: format!(
                "{} = {}",
                certified.equation.lhs.as_ref().display(sig),
                certified.equation.rhs.as_ref().display(sig)
            ),
            steps,
        }
    }
}

fn render(
    sig: &Signature,
    lemmas: &Lemmas,
    derivation: &Derivation,
    steps: &mut Vec<String>,
    listed: &mut Vec<LemmaId>,
    depth: usize,
) {
    let indent = "  ".repeat(depth);
    match derivation {
        Derivation::Axiom { axiom, .. } => {
            let name = lemmas
                .axiom(*axiom)
                .map(|(name, _)| name.as_str())
                .unwrap_or("?");
            steps.push(format!("{}axiom {}", indent, name));
        }
        Derivation::Refl { term } => {
            steps.push(format!("{}refl {}", indent, term.as_ref().display(sig)));
        }
        Derivation::Lemma { lemma, .. } => {
            steps.push(format!("{}lemma {}", indent, lemma));
            if !listed.contains(lemma) {
                listed.push(*lemma);
                if let Some(proof) = lemmas.lemma(*lemma) {
                    render(sig, lemmas, proof, steps, listed, depth + 1);
                }
            }
        }
        Derivation::Trans(p, q) => {
            render(sig, lemmas, p, steps, listed, depth);
            render(sig, lemmas, q, steps, listed, depth);
        }
        Derivation::Cong { f, args } => {
            steps.push(format!("{}cong {}", indent, sig.name(*f)));
            for p in args {
                render(sig, lemmas, p, steps, listed, depth + 1);
            }
        }
        Derivation::Symm(p) => {
            steps.push(format!("{}symm", indent));
            render(sig, lemmas, p, steps, listed, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::subst::SubstBuilder;
    use crate::kernel::symbol::FunctionData;

    fn setup() -> (Signature, Lemmas, AxiomId) {
        let sig = Signature::new();
        let zero = sig.add(FunctionData::minimal_constant("0"));
        let f = sig.add(FunctionData::new("*", 2, 1, 1));
        let mut lemmas = Lemmas::new();
        // axiom: *(x0, 0) = x0
        let axiom = lemmas.add_axiom(
            "right_unit",
            Equation::new(
                Term::fun(f, &[Term::variable(0), Term::constant(zero)]),
                Term::variable(0),
            ),
        );
        (sig, lemmas, axiom)
    }

    #[test]
    fn certify_axiom_instance() {
        let (_sig, lemmas, axiom) = setup();
        let mut subst = SubstBuilder::new();
        subst.bind(0, Term::constant(0));
        let d = Derivation::Axiom {
            axiom,
            subst: subst.freeze(),
        };
        let certified = certify(&lemmas, &d).unwrap();
        assert_eq!(certified.equation.rhs, Term::constant(0));
    }

    #[test]
    fn trans_requires_matching_endpoints() {
        let (_sig, lemmas, axiom) = setup();
        let instance = |c: u32| {
            let mut subst = SubstBuilder::new();
            subst.bind(0, Term::constant(c));
            Derivation::Axiom {
                axiom,
                subst: subst.freeze(),
            }
        };
        // *(0,0) = 0 then 0 = *(0,0) composes; the unflipped pair does not.
        let good = Derivation::Trans(
            Box::new(instance(0)),
            Box::new(Derivation::symm(instance(0))),
        );
        assert!(certify(&lemmas, &good).is_ok());

        let bad = Derivation::Trans(Box::new(instance(0)), Box::new(instance(0)));
        assert!(matches!(
            certify(&lemmas, &bad),
            Err(CertifyError::BrokenChain(_, _))
        ));
    }

    #[test]
    fn smart_constructors_collapse_refl() {
        let t = Term::constant(0);
        let refl = Derivation::Refl { term: t.clone() };
        let p = Derivation::trans(refl.clone(), refl.clone());
        assert_eq!(p, refl);
        assert_eq!(Derivation::symm(Derivation::symm(refl.clone())), refl);
        let c = Derivation::cong(1, vec![refl.clone(), refl]);
        match c {
            Derivation::Refl { term } => {
                assert_eq!(term, Term::fun(1, &[t.clone(), t]));
            }
            other => panic!("expected Refl, got {:?}", other),
        }
    }

    #[test]
    fn lemmas_are_shared_not_duplicated() {
        let (sig, mut lemmas, axiom) = setup();
        let d = Derivation::Axiom {
            axiom,
            subst: Subst::empty(),
        };
        lemmas.add_lemma(5, d);
        let use_twice = Derivation::trans(
            Derivation::Lemma {
                lemma: 5,
                subst: Subst::empty(),
            },
            Derivation::symm(Derivation::Lemma {
                lemma: 5,
                subst: Subst::empty(),
            }),
        );
        let certified = certify(&lemmas, &use_twice).unwrap();
        assert_eq!(certified.equation.lhs, certified.equation.rhs);
        let cert = Certificate::new("goal", &sig, &lemmas, &use_twice, &certified);
        // The lemma body is rendered once even though it is used twice.
        let bodies = cert.steps.iter().filter(|s| s.contains("axiom")).count();
        assert_eq!(bodies, 1);
    }
}
