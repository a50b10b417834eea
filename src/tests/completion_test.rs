use super::common::*;
use crate::engine::{Config, Message, Outcome};
use crate::kernel::symbol::FunctionData;
use crate::rule::{orient, Equation, OrientError, Orientation};

// Scenario: left and right unit laws decide 1(1(0,x),0) = x.
#[test]
fn unit_laws_solve_a_nested_instance() {
    let UnitProblem {
        mut engine,
        zero,
        times,
    } = unit_problem(Config::default());
    engine
        .add_axiom(
            "right_unit",
            Equation::new(app(times, &[v(0), constant(zero)]), v(0)),
        )
        .unwrap();
    engine
        .add_axiom(
            "left_unit",
            Equation::new(app(times, &[constant(zero), v(0)]), v(0)),
        )
        .unwrap();
    engine.add_goal(
        "goal",
        Equation::new(
            app(
                times,
                &[app(times, &[constant(zero), v(0)]), constant(zero)],
            ),
            v(0),
        ),
    );

    let outcome = engine.complete();
    assert_eq!(outcome, Outcome::Solved);
    assert_eq!(engine.solutions().len(), 1);
    // The rule set is exactly the two unit rules.
    assert_eq!(engine.stats().actives, 2);
}

// Scenario: commutativity alone proves 1(a,b) = 1(b,a), through the single
// permutative rule. Needs a > b in the precedence.
#[test]
fn commutativity_solves_a_swapped_instance() {
    let UnitProblem {
        mut engine, times, ..
    } = unit_problem(Config::default());
    let b = engine.add_function(FunctionData::new("b", 0, 1, 5));
    let a = engine.add_function(FunctionData::new("a", 0, 1, 6));
    engine
        .add_axiom(
            "comm",
            Equation::new(app(times, &[v(0), v(1)]), app(times, &[v(1), v(0)])),
        )
        .unwrap();

    // The lone active is the permutative rule.
    assert_eq!(engine.stats().actives, 1);
    let messages = engine.take_messages();
    let permutative = messages.iter().any(|m| match m {
        Message::NewActive(active) => {
            matches!(active.rule.orientation, Orientation::Permutative { .. })
        }
        _ => false,
    });
    assert!(permutative);

    engine.add_goal(
        "goal",
        Equation::new(
            app(times, &[constant(a), constant(b)]),
            app(times, &[constant(b), constant(a)]),
        ),
    );
    assert_eq!(engine.complete(), Outcome::Solved);
}

// Scenario: associativity alone is confluent; completion adds nothing.
#[test]
fn associativity_needs_no_new_rules() {
    let UnitProblem {
        mut engine, times, ..
    } = unit_problem(Config::default());
    engine
        .add_axiom(
            "assoc",
            Equation::new(
                app(times, &[app(times, &[v(0), v(1)]), v(2)]),
                app(times, &[v(0), app(times, &[v(1), v(2)])]),
            ),
        )
        .unwrap();

    let outcome = engine.complete();
    assert_eq!(outcome, Outcome::Exhausted);
    assert_eq!(engine.stats().actives, 1);
}

// Scenario: a zero critical-pair budget halts the loop cleanly.
#[test]
fn zero_budget_halts_without_progress() {
    let config = Config {
        max_critical_pairs: 0,
        ..Config::default()
    };
    let UnitProblem {
        mut engine,
        zero,
        times,
    } = unit_problem(config);
    engine
        .add_axiom(
            "right_unit",
            Equation::new(app(times, &[v(0), constant(zero)]), v(0)),
        )
        .unwrap();

    assert_eq!(engine.complete(), Outcome::Constrained);
    assert!(engine.solutions().is_empty());
    assert_eq!(engine.stats().considered, 0);
}

// Scenario: x = 1(x,x) cannot be oriented; the growing side wins.
#[test]
fn self_growing_equation_is_rejected() {
    let UnitProblem { engine, times, .. } = unit_problem(Config::default());
    let eqn = Equation::new(v(0), app(times, &[v(0), v(0)]));
    assert_eq!(
        orient(engine.signature(), &eqn),
        Err(OrientError::RhsGreater)
    );
}

// The same axiom through the engine: intake keeps the written direction
// instead of rescuing it by flipping, so loading fails outright.
#[test]
fn self_growing_axiom_is_a_fatal_input_error() {
    let UnitProblem {
        mut engine, times, ..
    } = unit_problem(Config::default());
    let result = engine.add_axiom(
        "growing",
        Equation::new(v(0), app(times, &[v(0), v(0)])),
    );
    assert!(result.is_err());
    assert_eq!(engine.stats().actives, 0);
}

// Every reported solution passes certification from scratch.
#[test]
fn solutions_carry_certified_proofs() {
    let UnitProblem {
        mut engine,
        zero,
        times,
    } = unit_problem(Config::default());
    engine
        .add_axiom(
            "right_unit",
            Equation::new(app(times, &[v(0), constant(zero)]), v(0)),
        )
        .unwrap();
    engine.add_goal(
        "goal",
        Equation::new(app(times, &[v(0), constant(zero)]), v(0)),
    );
    assert_eq!(engine.complete(), Outcome::Solved);

    for solution in engine.solutions() {
        let certified = engine.certify(&solution.derivation).unwrap();
        assert_eq!(certified.equation, solution.equation);
        assert!(!solution.certificate.steps.is_empty());
    }
}

// Messages arrive in emission order and include the maintenance markers
// once the loop has run long enough.
#[test]
fn message_stream_reports_new_actives_first() {
    let UnitProblem {
        mut engine,
        zero,
        times,
    } = unit_problem(Config::default());
    engine
        .add_axiom(
            "right_unit",
            Equation::new(app(times, &[v(0), constant(zero)]), v(0)),
        )
        .unwrap();
    let messages = engine.take_messages();
    assert!(matches!(messages.first(), Some(Message::NewActive(_))));
}
