//! Solver-independent MILP model and the solver seam.
//!
//! Schedulers build a [`MilpModel`] (variables, linear constraints, a linear
//! objective to minimise) and hand it to any [`MilpSolver`]. The bundled
//! [`MicroLpSolver`] translates the model to `good_lp` and runs the pure-Rust
//! `microlp` backend on a worker thread so a deadline can be enforced.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    variable,
};
use tracing::{debug, warn};

use crate::error::{SchedError, SchedResult};

/// Handle to a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Domain of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

/// A model variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub kind: VarKind,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Constraint sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl Sense {
    fn lp_symbol(self) -> &'static str {
        match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        }
    }
}

/// `Σ coef * var (sense) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

/// A mixed-integer linear program in minimisation form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilpModel {
    pub name: String,
    pub vars: Vec<VarDef>,
    pub constraints: Vec<LinearConstraint>,
    pub objective: Vec<(VarId, f64)>,
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

impl MilpModel {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn add_var(
        &mut self,
        name: &str,
        kind: VarKind,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            name: sanitize(name),
            kind,
            lower,
            upper,
        });
        id
    }

    /// Add a 0/1 variable.
    pub fn add_binary(&mut self, name: &str) -> VarId {
        self.add_var(name, VarKind::Binary, Some(0.0), Some(1.0))
    }

    /// Add a bounded continuous variable.
    pub fn add_continuous(&mut self, name: &str, lower: f64, upper: Option<f64>) -> VarId {
        self.add_var(name, VarKind::Continuous, Some(lower), upper)
    }

    /// Add a bounded integer variable.
    pub fn add_integer(&mut self, name: &str, lower: f64, upper: Option<f64>) -> VarId {
        self.add_var(name, VarKind::Integer, Some(lower), upper)
    }

    /// Add a linear constraint.
    pub fn add_constraint(
        &mut self,
        name: impl AsRef<str>,
        terms: Vec<(VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: sanitize(name.as_ref()),
            terms,
            sense,
            rhs,
        });
    }

    /// Set the objective to minimise.
    pub fn minimise(&mut self, objective: Vec<(VarId, f64)>) {
        self.objective = objective;
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Number of 0/1 variables.
    pub fn num_binaries(&self) -> usize {
        self.vars
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .count()
    }

    fn write_expr(&self, out: &mut String, terms: &[(VarId, f64)]) {
        if terms.is_empty() {
            out.push_str(" 0");
            return;
        }
        for (i, (var, coef)) in terms.iter().enumerate() {
            let name = &self.vars[var.0].name;
            let _ = match (i, *coef < 0.0) {
                (_, true) => write!(out, " - {} {name}", coef.abs()),
                (0, false) => write!(out, " {coef} {name}"),
                (_, false) => write!(out, " + {coef} {name}"),
            };
        }
    }

    /// Render the model in CPLEX LP format.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\\ Problem: {}", self.name);
        out.push_str("Minimize\n obj:");
        self.write_expr(&mut out, &self.objective);
        out.push_str("\nSubject To\n");
        for c in &self.constraints {
            let _ = write!(out, " {}:", c.name);
            self.write_expr(&mut out, &c.terms);
            let _ = writeln!(out, " {} {}", c.sense.lp_symbol(), c.rhs);
        }

        out.push_str("Bounds\n");
        for v in self.vars.iter().filter(|v| v.kind != VarKind::Binary) {
            match (v.lower, v.upper) {
                (Some(lo), Some(hi)) => {
                    let _ = writeln!(out, " {lo} <= {} <= {hi}", v.name);
                }
                (Some(lo), None) => {
                    let _ = writeln!(out, " {} >= {lo}", v.name);
                }
                (None, Some(hi)) => {
                    let _ = writeln!(out, " -inf <= {} <= {hi}", v.name);
                }
                (None, None) => {
                    let _ = writeln!(out, " {} free", v.name);
                }
            }
        }

        let generals: Vec<&str> = self
            .vars
            .iter()
            .filter(|v| v.kind == VarKind::Integer)
            .map(|v| v.name.as_str())
            .collect();
        if !generals.is_empty() {
            let _ = writeln!(out, "Generals\n {}", generals.join(" "));
        }
        let binaries: Vec<&str> = self
            .vars
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .map(|v| v.name.as_str())
            .collect();
        if !binaries.is_empty() {
            let _ = writeln!(out, "Binaries\n {}", binaries.join(" "));
        }
        out.push_str("End\n");
        out
    }

    /// Write the model to `path` in CPLEX LP format.
    pub fn write_lp(&self, path: impl AsRef<Path>) -> SchedResult<()> {
        std::fs::write(path.as_ref(), self.to_lp_string())?;
        debug!("Wrote LP model {} to {}", self.name, path.as_ref().display());
        Ok(())
    }
}

/// Variable values of a solved model.
#[derive(Debug, Clone, PartialEq)]
pub struct MilpSolution {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl MilpSolution {
    /// Value of a variable.
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    /// Whether a binary variable is set.
    pub fn is_set(&self, var: VarId) -> bool {
        self.value(var) > 0.5
    }
}

/// Outcome of a solver call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// Proven optimal solution.
    Optimal(MilpSolution),
    /// Deadline reached; carries the incumbent if the solver exposes one.
    TimedOut(Option<MilpSolution>),
    /// The model has no feasible solution.
    Infeasible,
}

/// A MILP solver.
pub trait MilpSolver: Send + Sync {
    /// Solver name for logs.
    fn name(&self) -> &str;

    /// Solve `model`, giving up after `time_limit` if set.
    fn solve(&self, model: &MilpModel, time_limit: Option<Duration>) -> SchedResult<SolveOutcome>;
}

/// Branch-and-bound solver backed by `good_lp`'s `microlp` backend.
///
/// With a time limit the solve runs on a `qsched-milp` worker thread. `microlp`
/// cannot be interrupted, so after a timeout that worker keeps running until
/// the search ends and its result is dropped. Callers that solve many hard
/// models in a loop should size the limit accordingly or solve without one.
#[derive(Debug, Clone, Default)]
pub struct MicroLpSolver;

impl MicroLpSolver {
    /// Create the solver.
    pub fn new() -> Self {
        Self
    }

    fn solve_blocking(model: &MilpModel) -> SchedResult<SolveOutcome> {
        let mut problem_vars = ProblemVariables::new();
        let handles: Vec<Variable> = model
            .vars
            .iter()
            .map(|v| {
                let mut def = variable().name(v.name.clone());
                def = match v.kind {
                    VarKind::Binary => def.binary(),
                    VarKind::Integer => def.integer(),
                    VarKind::Continuous => def,
                };
                if let Some(lo) = v.lower {
                    def = def.min(lo);
                }
                if let Some(hi) = v.upper {
                    def = def.max(hi);
                }
                problem_vars.add(def)
            })
            .collect();

        let expression = |terms: &[(VarId, f64)]| -> Expression {
            terms
                .iter()
                .map(|(var, coef)| *coef * handles[var.0])
                .sum()
        };

        let mut problem = problem_vars
            .minimise(expression(&model.objective))
            .using(good_lp::microlp);
        for c in &model.constraints {
            let lhs = expression(&c.terms);
            problem = problem.with(match c.sense {
                Sense::Le => constraint::leq(lhs, c.rhs),
                Sense::Ge => constraint::geq(lhs, c.rhs),
                Sense::Eq => constraint::eq(lhs, c.rhs),
            });
        }

        match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = handles.iter().map(|h| solution.value(*h)).collect();
                let objective = model
                    .objective
                    .iter()
                    .map(|(var, coef)| coef * values[var.0])
                    .sum();
                Ok(SolveOutcome::Optimal(MilpSolution { values, objective }))
            }
            Err(ResolutionError::Infeasible) => Ok(SolveOutcome::Infeasible),
            Err(e) => Err(SchedError::Solver(e.to_string())),
        }
    }
}

impl MilpSolver for MicroLpSolver {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, model: &MilpModel, time_limit: Option<Duration>) -> SchedResult<SolveOutcome> {
        debug!(
            "Solving {} with microlp: {} vars ({} binary), {} constraints",
            model.name,
            model.num_vars(),
            model.num_binaries(),
            model.constraints.len()
        );

        let Some(limit) = time_limit else {
            return Self::solve_blocking(model);
        };

        let owned = model.clone();
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("qsched-milp".to_string())
            .spawn(move || {
                // The receiver may be gone after a timeout.
                let _ = tx.send(Self::solve_blocking(&owned));
            })?;

        match rx.recv_timeout(limit) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // microlp exposes no incumbent; the worker finishes detached.
                warn!(
                    "microlp hit the {:?} limit on {} without a solution",
                    limit, model.name
                );
                Ok(SolveOutcome::TimedOut(None))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SchedError::Solver(
                "solver thread exited without a result".to_string(),
            )),
        }
    }
}
