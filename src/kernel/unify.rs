use crate::kernel::subst::{Subst, SubstBuilder};
use crate::kernel::symbol::VariableId;
use crate::kernel::term::{Term, TermRef};

/// Finds the unique substitution with `subst(pattern) == target`, or None.
///
/// Fails on a function mismatch or when one pattern variable would need two
/// different images. Total on well-formed inputs.
pub fn match_terms(pattern: TermRef, target: TermRef) -> Option<Subst> {
    let mut builder = SubstBuilder::new();
    if match_into(pattern, target, &mut builder) {
        Some(builder.freeze())
    } else {
        None
    }
}

/// Like `match_terms`, but accumulates into an existing builder so a caller
/// can match several pattern/target pairs under one substitution.
pub fn match_into(pattern: TermRef, target: TermRef, builder: &mut SubstBuilder) -> bool {
    let ps = pattern.as_slice();
    let ts = target.as_slice();
    let mut pi = 0;
    let mut ti = 0;
    while pi < ps.len() {
        if ti >= ts.len() {
            return false;
        }
        let p = ps[pi];
        if p.is_function() {
            let t = ts[ti];
            if t.is_variable() || t.index() != p.index() {
                return false;
            }
            pi += 1;
            ti += 1;
        } else {
            let image = target.subterm_at(ti);
            match builder.lookup(p.index()) {
                Some(prev) => {
                    if prev != image {
                        return false;
                    }
                }
                None => builder.bind(p.index(), image.to_owned()),
            }
            pi += 1;
            ti += image.len();
        }
    }
    ti == ts.len()
}

/// Robinson unification with an occurs check.
///
/// The solver accumulates a triangular substitution, then closes it by
/// iterated self-composition, so the result is idempotent and
/// `subst(s) == subst(t)` holds.
pub fn unify(s: TermRef, t: TermRef) -> Option<Subst> {
    let mut solver = Solver::new();
    if !solver.solve(s, t) {
        return None;
    }
    Some(solver.finish())
}

struct Solver {
    bindings: Vec<Option<Term>>,
}

impl Solver {
    fn new() -> Solver {
        Solver { bindings: vec![] }
    }

    fn get(&self, v: VariableId) -> Option<TermRef> {
        self.bindings
            .get(v as usize)
            .and_then(|b| b.as_ref())
            .map(|t| t.as_ref())
    }

    fn bind(&mut self, v: VariableId, t: Term) {
        let idx = v as usize;
        if idx >= self.bindings.len() {
            self.bindings.resize(idx + 1, None);
        }
        self.bindings[idx] = Some(t);
    }

    /// Chases variable-to-variable bindings so we always work with a
    /// representative.
    fn walk<'a>(&'a self, mut t: TermRef<'a>) -> TermRef<'a> {
        while let Some(v) = t.as_variable() {
            match self.get(v) {
                Some(image) => t = image,
                None => break,
            }
        }
        t
    }

    /// Whether `v` occurs in `t` once the current bindings are expanded.
    fn occurs(&self, v: VariableId, t: TermRef) -> bool {
        for w in t.vars() {
            if w == v {
                return true;
            }
            if let Some(image) = self.get(w) {
                if self.occurs(v, image) {
                    return true;
                }
            }
        }
        false
    }

    fn solve(&mut self, s: TermRef, t: TermRef) -> bool {
        let s = self.walk(s);
        let t = self.walk(t);
        if s == t {
            return true;
        }
        match (s.as_variable(), t.as_variable()) {
            (Some(v), _) => {
                if self.occurs(v, t) {
                    return false;
                }
                self.bind(v, t.to_owned());
                true
            }
            (None, Some(v)) => {
                if self.occurs(v, s) {
                    return false;
                }
                self.bind(v, s.to_owned());
                true
            }
            (None, None) => {
                if s.root().index() != t.root().index() {
                    return false;
                }
                // The slices may alias the solver's own storage after
                // walking, so copy the argument pairs out first.
                let pairs: Vec<(Term, Term)> = s
                    .args()
                    .iter()
                    .zip(t.args().iter())
                    .map(|(a, b)| (a.to_owned(), b.to_owned()))
                    .collect();
                for (a, b) in pairs {
                    if !self.solve(a.as_ref(), b.as_ref()) {
                        return false;
                    }
                }
                true
            }
        }
    }

    fn finish(self) -> Subst {
        let mut builder = SubstBuilder::new();
        for (v, b) in self.bindings.into_iter().enumerate() {
            if let Some(t) = b {
                builder.bind(v as VariableId, t);
            }
        }
        builder.freeze().close()
    }
}
