use crate::engine::{Config, Engine};
use crate::kernel::symbol::{FunctionData, FunctionId};
use crate::kernel::term::Term;

/// A problem over the scenario signature: `0` is the minimal constant and
/// `1` is a binary function.
pub struct UnitProblem {
    pub engine: Engine,
    pub zero: FunctionId,
    pub times: FunctionId,
}

pub fn unit_problem(config: Config) -> UnitProblem {
    let engine = Engine::new(config);
    let zero = engine.add_function(FunctionData::minimal_constant("0"));
    let times = engine.add_function(FunctionData::new("1", 2, 1, 1));
    UnitProblem { engine, zero, times }
}

/// The signature of group theory: identity (minimal), inverse, product.
pub struct GroupProblem {
    pub engine: Engine,
    pub e: FunctionId,
    pub i: FunctionId,
    pub times: FunctionId,
}

pub fn group_problem(config: Config) -> GroupProblem {
    let engine = Engine::new(config);
    let e = engine.add_function(FunctionData::minimal_constant("e"));
    let times = engine.add_function(FunctionData::new("*", 2, 1, 1));
    let i = engine.add_function(FunctionData::new("i", 1, 1, 2));
    GroupProblem { engine, e, i, times }
}

pub fn v(n: u32) -> Term {
    Term::variable(n)
}

pub fn app(f: FunctionId, args: &[Term]) -> Term {
    Term::fun(f, args)
}

pub fn constant(f: FunctionId) -> Term {
    Term::constant(f)
}
