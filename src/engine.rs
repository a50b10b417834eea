// The saturation engine: a single-threaded completion loop over the term,
// ordering, index and queue machinery. One State value is threaded through
// everything; messages buffer in the state and drain to the embedder in
// emission order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::critical_pair::{make_overlap, overlaps, score, split, CpWeights, CriticalPair, Split};
use crate::index::TermIndex;
use crate::join::{join_critical_pair, subsumed, JoinConfig, JoinResult};
use crate::kernel::ordering::Model;
use crate::kernel::symbol::{FunctionData, FunctionId, Signature};
use crate::kernel::term::Term;
use crate::passive::{Passive, PassiveQueue};
use crate::proof::{certify, Certificate, Derivation, Lemmas};
use crate::rewrite::{rewrite_decreasing, Anywhere, Reduction, Strategy};
use crate::rule::{orient, Active, ActiveId, ActiveRule, Equation, OrientError, Rule, RuleId, Rules};

/// Everything the embedder can tune. Field names match the option names
/// the loader exposes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Drop critical pairs whose either side exceeds this symbol count.
    pub max_term_size: usize,

    /// Stop once this many critical pairs have been considered.
    pub max_critical_pairs: u64,

    /// Drop overlaps whose derivation depth exceeds this.
    pub max_cp_depth: u32,

    /// Whether to run periodic interreduction.
    pub simplify: bool,

    /// Percentage of the critical-pair budget between queue-simplification
    /// passes.
    pub renormalise_percent: u64,

    pub cp_weights: CpWeights,

    pub join: JoinConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_term_size: 200,
            max_critical_pairs: 100_000,
            max_cp_depth: u32::MAX,
            simplify: true,
            renormalise_percent: 5,
            cp_weights: CpWeights::default(),
            join: JoinConfig::default(),
        }
    }
}

/// A fatal problem with the input.
#[derive(Clone, Debug)]
pub enum Error {
    Input(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Input(msg) => write!(f, "input error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// What the embedder observes, in emission order.
#[derive(Clone, Debug)]
pub enum Message {
    /// A rule has been added.
    NewActive(Box<Active>),

    /// A joinable equation was recorded.
    NewEquation(Equation),

    /// A rule was retired by interreduction.
    DeleteActive(Box<Active>),

    /// Maintenance markers.
    SimplifyQueue,
    Interreduce,

    /// A goal was proven; the payload carries the certified proof.
    ProvedGoal(Box<ProvedGoal>),
}

/// A sink for the message stream. The engine never assumes anything about
/// the sink's latency.
pub trait Output {
    fn emit(&mut self, message: Message);
}

impl Output for Vec<Message> {
    fn emit(&mut self, message: Message) {
        self.push(message);
    }
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Some goal was proven.
    Solved,

    /// The passive queue ran dry: the rule set is complete.
    Exhausted,

    /// A resource bound tripped; the state is consistent but incomplete.
    Constrained,

    /// The cancellation token fired.
    Interrupted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Solved => write!(f, "Solved"),
            Outcome::Exhausted => write!(f, "Exhausted"),
            Outcome::Constrained => write!(f, "Constrained"),
            Outcome::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// An equational conjecture and the reachable forms of its two sides.
/// The goal is solved when the two sets intersect.
pub struct Goal {
    pub name: String,
    pub number: u32,
    pub eqn: Equation,
    lhs_forms: HashMap<Term, Reduction>,
    rhs_forms: HashMap<Term, Reduction>,
    solved: bool,
}

impl Goal {
    fn new(name: &str, number: u32, eqn: Equation) -> Goal {
        let mut lhs_forms = HashMap::new();
        lhs_forms.insert(eqn.lhs.clone(), Reduction::refl(eqn.lhs.clone()));
        let mut rhs_forms = HashMap::new();
        rhs_forms.insert(eqn.rhs.clone(), Reduction::refl(eqn.rhs.clone()));
        Goal {
            name: name.to_string(),
            number,
            eqn,
            lhs_forms,
            rhs_forms,
            solved: false,
        }
    }
}

/// A solved goal with its certified proof.
#[derive(Clone, Debug)]
pub struct ProvedGoal {
    pub name: String,
    pub number: u32,
    pub equation: Equation,
    pub derivation: Derivation,
    pub certificate: Certificate,
}

/// A cooperative maintenance task handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskId(usize);

struct Task {
    period: u64,
    elapsed: u64,
}

/// Cooperative scheduling of periodic maintenance: the loop calls
/// `check_task` once per iteration and runs the task when it comes due.
/// No threads, no timers.
pub struct Ticker {
    tasks: Vec<Task>,
}

impl Ticker {
    pub fn new() -> Ticker {
        Ticker { tasks: vec![] }
    }

    /// Registers a task firing every `period` work units, scaled by how
    /// expensive the task is relative to one unit of main-loop work.
    pub fn new_task(&mut self, period: u64, cost_ratio: f64) -> TaskId {
        let effective = ((period as f64) * cost_ratio).max(1.0) as u64;
        self.tasks.push(Task {
            period: effective,
            elapsed: 0,
        });
        TaskId(self.tasks.len() - 1)
    }

    /// Advances the task's clock by one unit; true when it comes due.
    pub fn check_task(&mut self, id: TaskId) -> bool {
        let task = &mut self.tasks[id.0];
        task.elapsed += 1;
        if task.elapsed >= task.period {
            task.elapsed = 0;
            true
        } else {
            false
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Ticker::new()
    }
}

/// The engine state: rules, actives, the joinable-equation index, goals,
/// the passive queue, counters, and pending messages.
pub struct State {
    pub rules: Rules,
    actives: HashMap<ActiveId, Active>,
    joinable: TermIndex<Term>,
    goals: Vec<Goal>,
    queue: PassiveQueue,
    next_active: ActiveId,
    next_rule: RuleId,
    considered: u64,
    lemmas: Lemmas,
    messages: Vec<Message>,
    solutions: Vec<ProvedGoal>,
}

impl State {
    fn new() -> State {
        State {
            rules: Rules::new(),
            actives: HashMap::new(),
            joinable: TermIndex::new(),
            goals: vec![],
            queue: PassiveQueue::new(),
            next_active: 0,
            next_rule: 0,
            considered: 0,
            lemmas: Lemmas::new(),
            messages: vec![],
            solutions: vec![],
        }
    }
}

/// Summary counters, for reporting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stats {
    pub considered: u64,
    pub actives: usize,
    pub queue: usize,
}

pub struct Engine {
    sig: Signature,
    config: Config,
    state: State,
    ticker: Ticker,
    simplify_task: TaskId,
    interreduce_task: TaskId,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(config: Config) -> Engine {
        let mut ticker = Ticker::new();
        // Queue simplification every renormalise_percent of the budget;
        // interreduction every quarter of a hundred-iteration unit.
        let simplify_period = (config
            .renormalise_percent
            .saturating_mul(config.max_critical_pairs)
            / 100)
            .max(1);
        let simplify_task = ticker.new_task(simplify_period, 1.0);
        let interreduce_task = ticker.new_task(25, 1.0);
        Engine {
            sig: Signature::new(),
            config,
            state: State::new(),
            ticker,
            simplify_task,
            interreduce_task,
            cancel: CancellationToken::new(),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// A token the embedder can fire to abort the loop between iterations.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn add_function(&self, data: FunctionData) -> FunctionId {
        self.sig.add(data)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            considered: self.state.considered,
            actives: self.state.actives.len(),
            queue: self.state.queue.len(),
        }
    }

    pub fn solutions(&self) -> &[ProvedGoal] {
        &self.state.solutions
    }

    /// Re-checks a derivation against this engine's axioms and lemmas.
    pub fn certify(
        &self,
        derivation: &Derivation,
    ) -> Result<crate::proof::Certified, crate::proof::CertifyError> {
        certify(&self.state.lemmas, derivation)
    }

    /// Drains the pending messages, in emission order.
    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.state.messages)
    }

    /// Drains the pending messages into a sink.
    pub fn flush_messages(&mut self, out: &mut dyn Output) {
        for message in self.take_messages() {
            out.emit(message);
        }
    }

    fn emit(&mut self, message: Message) {
        self.state.messages.push(message);
    }

    /// Loads an axiom. The equation becomes a depth-0 critical pair and is
    /// considered immediately.
    ///
    /// An axiom keeps the direction it was written in: one whose right
    /// side is universally at least its left is rejected here as a fatal
    /// input error rather than silently flipped.
    pub fn add_axiom(&mut self, name: &str, eqn: Equation) -> Result<(), Error> {
        if !eqn.is_trivial() {
            if let Err(e) = orient(&self.sig, &eqn) {
                return Err(Error::Input(format!("axiom {}: {}", name, e)));
            }
        }
        let axiom = self.state.lemmas.add_axiom(name, eqn.clone());
        let proof = Derivation::Axiom {
            axiom,
            subst: crate::kernel::Subst::empty(),
        };
        let cp = CriticalPair {
            eqn,
            depth: 0,
            top: None,
            proof,
        };
        match self.consider_inner(None, cp, true) {
            Ok(()) => {
                self.check_goals();
                Ok(())
            }
            Err(e) => Err(Error::Input(format!("axiom {}: {}", name, e))),
        }
    }

    /// Registers a conjecture to prove.
    pub fn add_goal(&mut self, name: &str, eqn: Equation) {
        let number = self.state.goals.len() as u32 + 1;
        self.state.goals.push(Goal::new(name, number, eqn));
        self.check_goals();
    }

    /// Runs the loop to its natural end.
    pub fn complete(&mut self) -> Outcome {
        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Interrupted;
            }
            if !self.state.solutions.is_empty() {
                return Outcome::Solved;
            }
            if !self.complete1() {
                if !self.state.solutions.is_empty() {
                    return Outcome::Solved;
                }
                if self.state.considered >= self.config.max_critical_pairs {
                    return Outcome::Constrained;
                }
                return Outcome::Exhausted;
            }
        }
    }

    /// One iteration: dequeue the best passive, consider it, run whatever
    /// maintenance is due, and refresh the goals. False means no progress
    /// is possible.
    pub fn complete1(&mut self) -> bool {
        if self.state.considered >= self.config.max_critical_pairs {
            return false;
        }
        if !self.state.solutions.is_empty() {
            return false;
        }
        let cp = match self.dequeue() {
            Some(cp) => cp,
            None => return false,
        };
        self.consider(cp);

        if self.ticker.check_task(self.simplify_task) {
            self.emit(Message::SimplifyQueue);
            self.simplify_queue();
        }
        if self.config.simplify && self.ticker.check_task(self.interreduce_task) {
            self.emit(Message::Interreduce);
            self.interreduce();
        }

        self.check_goals();
        true
    }

    /// Pops passives until one reconstructs into a usable critical pair.
    /// Orphans and oversized overlaps count as considered and are
    /// discarded.
    fn dequeue(&mut self) -> Option<CriticalPair> {
        loop {
            let passive = self.state.queue.remove_min()?;
            self.state.considered += 1;
            let (overlap, depth) = {
                let rule1 = match self.state.rules.get(passive.rule1) {
                    Some(rule) => rule,
                    None => continue,
                };
                let rule2 = match self.state.rules.get(passive.rule2) {
                    Some(rule) => rule,
                    None => continue,
                };
                let overlap = match make_overlap(rule1, rule2, passive.pos) {
                    Some(overlap) => overlap,
                    None => continue,
                };
                let depth = 1 + self
                    .depth_of(rule1.active_id)
                    .max(self.depth_of(rule2.active_id));
                (overlap, depth)
            };
            if overlap.eqn.lhs.len() > self.config.max_term_size
                || overlap.eqn.rhs.len() > self.config.max_term_size
            {
                continue;
            }
            return Some(CriticalPair {
                eqn: overlap.eqn,
                depth,
                top: Some(overlap.top),
                proof: overlap.proof,
            });
        }
    }

    fn depth_of(&self, id: ActiveId) -> u32 {
        match self.state.actives.get(&id) {
            Some(active) => active.depth,
            None => 0,
        }
    }

    /// Feeds one critical pair through join, recording joinable equations
    /// and turning the rest into rules.
    fn consider(&mut self, cp: CriticalPair) {
        // Derived pairs that fail to orient are silently dropped.
        let _ = self.consider_inner(None, cp, false);
    }

    fn consider_inner(
        &mut self,
        model: Option<&Model>,
        cp: CriticalPair,
        strict: bool,
    ) -> Result<(), OrientError> {
        let result = join_critical_pair(
            &self.config.join,
            &self.sig,
            &self.state.joinable,
            &self.state.rules,
            model,
            cp,
        );
        match result {
            JoinResult::Joined { equation, sub_cps } => {
                for sub in sub_cps {
                    self.consider_inner(None, sub, false).ok();
                }
                if let Some(eqn) = equation {
                    self.state
                        .joinable
                        .insert(eqn.lhs.as_ref(), eqn.rhs.clone());
                    self.emit(Message::NewEquation(eqn));
                }
                Ok(())
            }
            JoinResult::Failed { cp, model } => match split(&self.sig, &self.state.rules, cp) {
                Split::Joinable => Ok(()),
                Split::Residual(residuals) => {
                    for residual in residuals {
                        self.add_cp(&model, residual, strict)?;
                    }
                    Ok(())
                }
            },
        }
    }

    /// Orients a residual critical pair and installs it as an active rule.
    fn add_cp(
        &mut self,
        model: &Model,
        cp: CriticalPair,
        strict: bool,
    ) -> Result<(), OrientError> {
        let ordered = cp.eqn.ordered(&self.sig);
        let proof = if ordered.lhs == cp.eqn.lhs {
            cp.proof
        } else {
            Derivation::symm(cp.proof)
        };
        match orient(&self.sig, &ordered) {
            Ok(rule) => {
                self.add_active(model.clone(), cp.depth, cp.top, proof, rule);
                Ok(())
            }
            Err(e) if strict => Err(e),
            Err(_) => Ok(()),
        }
    }

    /// Allocates ids, builds the directional views, checks subsumption,
    /// and enqueues every overlap the new rule makes with the rule set.
    fn add_active(
        &mut self,
        model: Model,
        depth: u32,
        top: Option<Term>,
        proof: Derivation,
        rule: Rule,
    ) {
        if subsumed(&self.state.joinable, &self.state.rules, &rule.unorient()) {
            return;
        }

        let id = self.state.next_active;
        self.state.next_active += 1;
        let mut rule_ids = vec![self.state.next_rule];
        self.state.next_rule += 1;
        if !rule.orientation.is_oriented() {
            rule_ids.push(self.state.next_rule);
            self.state.next_rule += 1;
        }

        let active = Active {
            id,
            depth,
            rule: rule.clone(),
            top,
            proof: proof.clone(),
            model,
            rule_ids: rule_ids.clone(),
        };
        self.state.lemmas.add_lemma(id, proof);
        self.state.actives.insert(id, active.clone());

        let mut views = vec![ActiveRule::new(rule_ids[0], id, rule.clone(), false)];
        if rule_ids.len() == 2 {
            views.push(ActiveRule::new(rule_ids[1], id, rule.backwards(), true));
        }
        for view in &views {
            self.state.rules.insert(view.clone());
        }
        self.emit(Message::NewActive(Box::new(active)));

        let mut passives = vec![];
        for view in &views {
            passives.extend(self.make_passives(view));
        }
        self.state.queue.insert(passives);
    }

    /// Scores and packs every overlap between one rule view and the
    /// current rule set.
    fn make_passives(&self, view: &ActiveRule) -> Vec<Passive> {
        let actives = &self.state.actives;
        overlaps(self.config.max_cp_depth, &self.state.rules, view, |aid| {
            actives.get(&aid).map_or(0, |a| a.depth)
        })
        .into_iter()
        .map(|(overlap, depth)| Passive {
            score: score(&self.config.cp_weights, &overlap.eqn, depth),
            rule1: overlap.rule1,
            rule2: overlap.rule2,
            pos: overlap.pos,
        })
        .collect()
    }

    /// Rescues every queued passive whose overlap still exists, rescoring
    /// it; orphans disappear.
    fn simplify_queue(&mut self) {
        let rules = &self.state.rules;
        let actives = &self.state.actives;
        let weights = &self.config.cp_weights;
        self.state.queue.map_maybe(|passive| {
            let rule1 = rules.get(passive.rule1)?;
            let rule2 = rules.get(passive.rule2)?;
            let overlap = make_overlap(rule1, rule2, passive.pos)?;
            let depth = 1 + actives
                .get(&rule1.active_id)
                .map_or(0, |a| a.depth)
                .max(actives.get(&rule2.active_id).map_or(0, |a| a.depth));
            Some(Passive {
                score: score(weights, &overlap.eqn, depth),
                ..passive
            })
        });
    }

    /// Revisits every active and tries to join its equation against the
    /// other rules. Redundant actives are retired; simplified ones are
    /// re-queued as fresh critical pairs; a changed witness model is
    /// recorded in place.
    fn interreduce(&mut self) {
        let mut ids: Vec<ActiveId> = self.state.actives.keys().copied().collect();
        ids.sort();
        for id in ids {
            let (cp, model, rule_ids, eqn) = match self.state.actives.get(&id) {
                Some(active) => (
                    CriticalPair {
                        eqn: active.rule.unorient(),
                        depth: active.depth,
                        top: active.top.clone(),
                        proof: active.proof.clone(),
                    },
                    active.model.clone(),
                    active.rule_ids.clone(),
                    active.rule.unorient(),
                ),
                None => continue,
            };

            // Judge the rule without letting it rewrite itself.
            let mut views = vec![];
            for rule_id in &rule_ids {
                if let Some(view) = self.state.rules.remove(*rule_id) {
                    views.push(view);
                }
            }

            let result = join_critical_pair(
                &self.config.join,
                &self.sig,
                &self.state.joinable,
                &self.state.rules,
                Some(&model),
                cp,
            );
            match result {
                JoinResult::Joined { equation, sub_cps } => {
                    let active = self.state.actives.remove(&id).unwrap();
                    self.emit(Message::DeleteActive(Box::new(active)));
                    for sub in sub_cps {
                        self.consider(sub);
                    }
                    if let Some(eqn) = equation {
                        self.state
                            .joinable
                            .insert(eqn.lhs.as_ref(), eqn.rhs.clone());
                        self.emit(Message::NewEquation(eqn));
                    }
                }
                JoinResult::Failed {
                    cp,
                    model: new_model,
                } => {
                    if cp.eqn != eqn {
                        // The rule simplified to something new: retire it
                        // and let the residual re-enter as a critical pair.
                        let active = self.state.actives.remove(&id).unwrap();
                        self.emit(Message::DeleteActive(Box::new(active)));
                        let _ = self.add_cp(&new_model, cp, false);
                    } else if new_model != model {
                        if let Some(active) = self.state.actives.get_mut(&id) {
                            active.model = new_model;
                        }
                        for view in views.drain(..) {
                            self.state.rules.insert(view);
                        }
                    } else {
                        for view in views.drain(..) {
                            self.state.rules.insert(view);
                        }
                    }
                }
            }
        }
    }

    /// Extends each goal's reachable sets under the current rules and
    /// certifies a proof when the two sides meet.
    fn check_goals(&mut self) {
        let sig = &self.sig;
        let rules = &self.state.rules;
        let lemmas = &self.state.lemmas;
        let strat = rewrite_decreasing(sig, rules);
        let mut proved = vec![];
        for goal in &mut self.state.goals {
            if goal.solved {
                continue;
            }
            expand_forms(&strat, &mut goal.lhs_forms);
            expand_forms(&strat, &mut goal.rhs_forms);

            let mut meet: Option<Term> = None;
            for t in goal.lhs_forms.keys() {
                if goal.rhs_forms.contains_key(t) {
                    meet = Some(t.clone());
                    break;
                }
            }
            let meet = match meet {
                Some(meet) => meet,
                None => continue,
            };
            let lhs_red = goal.lhs_forms[&meet].clone();
            let rhs_red = goal.rhs_forms[&meet].clone();
            let derivation = Derivation::trans(
                lhs_red.derivation(),
                Derivation::symm(rhs_red.derivation()),
            );
            let certified = match certify(lemmas, &derivation) {
                Ok(certified) => certified,
                Err(e) => panic!("goal {} produced an uncertifiable proof: {}", goal.name, e),
            };
            assert_eq!(
                certified.equation, goal.eqn,
                "certified conclusion does not match goal {}",
                goal.name
            );
            let certificate =
                Certificate::new(&goal.name, sig, lemmas, &derivation, &certified);
            goal.solved = true;
            proved.push(ProvedGoal {
                name: goal.name.clone(),
                number: goal.number,
                equation: certified.equation,
                derivation,
                certificate,
            });
        }
        for p in proved {
            self.state.messages.push(Message::ProvedGoal(Box::new(p.clone())));
            self.state.solutions.push(p);
        }
    }
}

/// Grows a reachability set in place: every known form is stepped with the
/// strategy until nothing new appears, composing reductions from the
/// original term.
fn expand_forms<S: Strategy>(strat: &S, forms: &mut HashMap<Term, Reduction>) {
    let anywhere = Anywhere(strat);
    let mut queue: Vec<Term> = forms.keys().cloned().collect();
    while let Some(t) = queue.pop() {
        let reduction = forms[&t].clone();
        for step in anywhere.apply(t.as_ref()) {
            let next = step.result();
            if !forms.contains_key(&next) {
                forms.insert(
                    next.clone(),
                    Reduction::trans(reduction.clone(), step),
                );
                queue.push(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_fires_on_period() {
        let mut ticker = Ticker::new();
        let task = ticker.new_task(3, 1.0);
        assert!(!ticker.check_task(task));
        assert!(!ticker.check_task(task));
        assert!(ticker.check_task(task));
        assert!(!ticker.check_task(task));
    }

    #[test]
    fn config_defaults_are_sane() {
        let config = Config::default();
        assert!(config.simplify);
        assert!(config.max_term_size > 0);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_term_size, config.max_term_size);
    }
}
