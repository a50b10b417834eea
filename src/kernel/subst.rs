use std::fmt;

use crate::kernel::symbol::VariableId;
use crate::kernel::term::{Term, TermBuilder, TermRef};

/// An append-only accumulator of variable bindings.
/// Matching and unification build one of these, then freeze it into a Subst
/// for indexed lookup.
#[derive(Clone, Debug, Default)]
pub struct SubstBuilder {
    pairs: Vec<(VariableId, Term)>,
}

impl SubstBuilder {
    pub fn new() -> SubstBuilder {
        SubstBuilder { pairs: vec![] }
    }

    /// Appends a binding. The caller is responsible for not binding the same
    /// variable twice; matching checks for conflicts before calling this.
    pub fn bind(&mut self, v: VariableId, t: Term) {
        debug_assert!(
            self.lookup(v).is_none(),
            "variable x{} bound twice in builder",
            v
        );
        self.pairs.push((v, t));
    }

    pub fn lookup(&self, v: VariableId) -> Option<TermRef> {
        self.pairs
            .iter()
            .find(|(w, _)| *w == v)
            .map(|(_, t)| t.as_ref())
    }

    pub fn freeze(self) -> Subst {
        let mut bindings = vec![];
        for (v, t) in self.pairs {
            let idx = v as usize;
            if idx >= bindings.len() {
                bindings.resize(idx + 1, None);
            }
            bindings[idx] = Some(t);
        }
        Subst { bindings }
    }
}

/// A frozen substitution: an indexed lookup table from variable to term.
#[derive(Clone, Eq, PartialEq)]
pub struct Subst {
    bindings: Vec<Option<Term>>,
}

impl Subst {
    pub fn empty() -> Subst {
        Subst { bindings: vec![] }
    }

    pub fn get(&self, v: VariableId) -> Option<TermRef> {
        self.bindings
            .get(v as usize)
            .and_then(|b| b.as_ref())
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.iter().all(|b| b.is_none())
    }

    /// The bound variables, in index order.
    pub fn domain(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_some())
            .map(|(v, _)| v as VariableId)
    }

    /// Applies the substitution once: each variable occurrence is replaced by
    /// its image exactly one time.
    pub fn apply(&self, t: TermRef) -> Term {
        let mut builder = TermBuilder::new();
        self.emit_applied(t, &mut builder);
        builder.finish()
    }

    fn emit_applied(&self, t: TermRef, builder: &mut TermBuilder) {
        if let Some(v) = t.as_variable() {
            match self.get(v) {
                Some(image) => builder.emit_term(image),
                None => builder.emit_var(v),
            }
        } else {
            // Function headers are rebuilt so the size patching accounts
            // for whatever the variable sites expand to.
            builder.emit_fun(t.root().index(), |b| {
                for arg in t.args().iter() {
                    self.emit_applied(arg, b);
                }
            });
        }
    }

    /// Applies the substitution repeatedly at variable sites until no bound
    /// variable remains in the result. Terminates for triangular
    /// substitutions; anything cyclic is a programming error.
    pub fn apply_iter(&self, t: TermRef) -> Term {
        let mut current = self.apply(t);
        let mut rounds = self.bindings.len() + 1;
        while current.as_ref().vars().any(|v| self.get(v).is_some()) {
            if rounds == 0 {
                panic!("substitution is cyclic: {:?}", self);
            }
            rounds -= 1;
            current = self.apply(current.as_ref());
        }
        current
    }

    /// Composition: first this substitution, then `other`.
    /// Every image of self gets `other` applied, then bindings of `other`
    /// outside self's domain are appended.
    pub fn compose(&self, other: &Subst) -> Subst {
        let len = self.bindings.len().max(other.bindings.len());
        let mut bindings = vec![None; len];
        for (i, b) in self.bindings.iter().enumerate() {
            if let Some(t) = b {
                bindings[i] = Some(other.apply(t.as_ref()));
            }
        }
        for (i, b) in other.bindings.iter().enumerate() {
            if bindings[i].is_none() {
                bindings[i] = b.clone();
            }
        }
        Subst { bindings }
    }

    /// Whether no image contains a variable of the domain.
    pub fn is_idempotent(&self) -> bool {
        self.bindings.iter().flatten().all(|t| {
            t.as_ref().vars().all(|v| self.get(v).is_none())
        })
    }

    /// Closes a triangular substitution by iterated self-composition.
    pub fn close(self) -> Subst {
        let mut current = self;
        let mut rounds = current.bindings.len() + 1;
        while !current.is_idempotent() {
            if rounds == 0 {
                panic!("substitution cannot be closed: {:?}", current);
            }
            rounds -= 1;
            current = current.compose(&current);
        }
        current
    }

    /// The restriction to the given variables.
    pub fn restrict(&self, vars: &[VariableId]) -> Subst {
        let mut bindings = vec![None; self.bindings.len()];
        for &v in vars {
            if let Some(t) = self.get(v) {
                bindings[v as usize] = Some(t.to_owned());
            }
        }
        Subst { bindings }
    }
}

impl fmt::Debug for Subst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for v in self.domain() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "x{} -> {:?}", v, self.get(v).unwrap())?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replaces_each_variable_once() {
        // {x0 -> f1, x1 -> f0(x0, x0)} applied to f0(x0, x1)
        let mut builder = SubstBuilder::new();
        builder.bind(0, Term::constant(1));
        builder.bind(1, Term::fun(0, &[Term::variable(0), Term::variable(0)]));
        let subst = builder.freeze();

        let t = Term::fun(0, &[Term::variable(0), Term::variable(1)]);
        let applied = subst.apply(t.as_ref());
        assert_eq!(
            applied,
            Term::fun(
                0,
                &[
                    Term::constant(1),
                    Term::fun(0, &[Term::variable(0), Term::variable(0)])
                ]
            )
        );
        assert!(applied.as_ref().well_formed());
    }

    #[test]
    fn apply_iter_reaches_a_fixed_point() {
        // Triangular: {x0 -> f0(x1, x1), x1 -> f1}
        let mut builder = SubstBuilder::new();
        builder.bind(0, Term::fun(0, &[Term::variable(1), Term::variable(1)]));
        builder.bind(1, Term::constant(1));
        let subst = builder.freeze();

        let closed = subst.apply_iter(Term::variable(0).as_ref());
        assert_eq!(closed, Term::fun(0, &[Term::constant(1), Term::constant(1)]));
    }

    #[test]
    fn close_makes_triangular_substitutions_idempotent() {
        let mut builder = SubstBuilder::new();
        builder.bind(0, Term::variable(1));
        builder.bind(1, Term::constant(2));
        let subst = builder.freeze();
        assert!(!subst.is_idempotent());
        let closed = subst.close();
        assert!(closed.is_idempotent());
        assert_eq!(closed.get(0).unwrap().to_owned(), Term::constant(2));
    }

    #[test]
    fn compose_is_idempotent_on_disjoint_idempotent_inputs() {
        let mut a = SubstBuilder::new();
        a.bind(0, Term::constant(1));
        let a = a.freeze();
        let mut b = SubstBuilder::new();
        b.bind(2, Term::constant(3));
        let b = b.freeze();
        let c = a.compose(&b);
        assert!(c.is_idempotent());
        assert_eq!(c.get(0).unwrap().to_owned(), Term::constant(1));
        assert_eq!(c.get(2).unwrap().to_owned(), Term::constant(3));
    }
}
