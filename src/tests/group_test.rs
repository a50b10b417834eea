use super::common::*;
use crate::engine::{Config, Outcome};
use crate::rule::Equation;

// Scenario: from the left-identity, left-inverse and associativity axioms,
// completion derives the right identity as a consequence.
#[test]
fn group_theory_derives_the_right_identity() {
    let GroupProblem {
        mut engine,
        e,
        i,
        times,
    } = group_problem(Config::default());

    engine
        .add_axiom(
            "left_identity",
            Equation::new(app(times, &[constant(e), v(0)]), v(0)),
        )
        .unwrap();
    engine
        .add_axiom(
            "left_inverse",
            Equation::new(app(times, &[app(i, &[v(0)]), v(0)]), constant(e)),
        )
        .unwrap();
    engine
        .add_axiom(
            "associativity",
            Equation::new(
                app(times, &[app(times, &[v(0), v(1)]), v(2)]),
                app(times, &[v(0), app(times, &[v(1), v(2)])]),
            ),
        )
        .unwrap();

    engine.add_goal(
        "right_identity",
        Equation::new(app(times, &[v(0), constant(e)]), v(0)),
    );

    let outcome = engine.complete();
    assert_eq!(outcome, Outcome::Solved);

    let solution = &engine.solutions()[0];
    assert_eq!(solution.name, "right_identity");
    let certified = engine.certify(&solution.derivation).unwrap();
    assert_eq!(certified.equation, solution.equation);
}

// The inverse of the identity collapses along the way; prove it directly.
#[test]
fn group_theory_derives_inverse_of_identity() {
    let GroupProblem {
        mut engine,
        e,
        i,
        times,
    } = group_problem(Config::default());

    engine
        .add_axiom(
            "left_identity",
            Equation::new(app(times, &[constant(e), v(0)]), v(0)),
        )
        .unwrap();
    engine
        .add_axiom(
            "left_inverse",
            Equation::new(app(times, &[app(i, &[v(0)]), v(0)]), constant(e)),
        )
        .unwrap();
    engine
        .add_axiom(
            "associativity",
            Equation::new(
                app(times, &[app(times, &[v(0), v(1)]), v(2)]),
                app(times, &[v(0), app(times, &[v(1), v(2)])]),
            ),
        )
        .unwrap();

    engine.add_goal(
        "inverse_of_identity",
        Equation::new(app(i, &[constant(e)]), constant(e)),
    );

    assert_eq!(engine.complete(), Outcome::Solved);
}
