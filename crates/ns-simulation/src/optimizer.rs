//! Box-constrained L-BFGS minimisation through argmin.
//!
//! Used to refit auxiliary densities: the objective is a negative weighted
//! log-likelihood over the active parameters, bounds are enforced by clamping
//! every trial point and projecting the gradient at active bounds.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ns_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// L-BFGS settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Iteration cap (default 1000).
    pub max_iter: u64,
    /// Gradient-norm tolerance (default 1e-6). The cost tolerance is a tenth of it.
    pub tol: f64,
    /// History length of the inverse-Hessian approximation (default 10).
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

impl OptimizerConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(Error::Validation("optimizer max_iter must be > 0".into()));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(Error::Validation(format!(
                "optimizer tol must be finite and >= 0, got {}",
                self.tol
            )));
        }
        if self.m == 0 {
            return Err(Error::Validation("optimizer history length m must be > 0".into()));
        }
        Ok(())
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best point, inside the bounds.
    pub parameters: Vec<f64>,
    /// Objective at `parameters`.
    pub fval: f64,
    /// Iterations performed.
    pub n_iter: u64,
    /// Objective evaluations.
    pub n_fev: usize,
    /// Gradient evaluations.
    pub n_gev: usize,
    /// `true` when the solver met its tolerances.
    pub converged: bool,
    /// Termination status as reported by argmin.
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fval={:.6} iter={} fev={} gev={} converged={}",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// A scalar function to minimise.
pub trait ObjectiveFunction: Send + Sync {
    /// Value at `params`.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`; central differences unless overridden.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        let mut x = params.to_vec();
        for i in 0..params.len() {
            let h = 1e-8 * params[i].abs().max(1.0);
            x[i] = params[i] + h;
            let up = self.eval(&x)?;
            x[i] = params[i] - h;
            let down = self.eval(&x)?;
            x[i] = params[i];
            grad[i] = (up - down) / (2.0 * h);
        }
        Ok(grad)
    }
}

fn clamp_to(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

#[derive(Default)]
struct EvalCounts {
    fev: AtomicUsize,
    gev: AtomicUsize,
}

struct BoundedProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    counts: &'a EvalCounts,
}

fn to_argmin(e: Error) -> argmin::core::Error {
    argmin::core::Error::msg(e.to_string())
}

impl CostFunction for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<f64, argmin::core::Error> {
        self.counts.fev.fetch_add(1, Ordering::Relaxed);
        self.objective.eval(&clamp_to(params, self.bounds)).map_err(to_argmin)
    }
}

impl Gradient for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        self.counts.gev.fetch_add(1, Ordering::Relaxed);
        let x = clamp_to(params, self.bounds);
        let mut g = self.objective.gradient(&x).map_err(to_argmin)?;
        // Projected gradient: drop components pushing out of an active bound.
        for ((gi, &xi), &(lo, hi)) in g.iter_mut().zip(&x).zip(self.bounds) {
            if (xi <= lo + 1e-12 && *gi > 0.0) || (xi >= hi - 1e-12 && *gi < 0.0) {
                *gi = 0.0;
            }
        }
        Ok(g)
    }
}

/// L-BFGS with box constraints.
#[derive(Debug, Clone, Default)]
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Optimizer with the given settings.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimise `objective` from `init` inside `bounds` (one `(lo, hi)` per parameter).
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        self.config.validate()?;
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "{} parameters but {} bounds",
                init.len(),
                bounds.len()
            )));
        }
        if let Some((i, _)) = bounds.iter().enumerate().find(|(_, (lo, hi))| !(lo <= hi)) {
            return Err(Error::Validation(format!("empty bound interval for parameter {}", i)));
        }

        let counts = EvalCounts::default();
        let problem = BoundedProblem { objective, bounds, counts: &counts };
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerance: {}", e)))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(clamp_to(init, bounds)).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("L-BFGS failed: {}", e)))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("L-BFGS produced no parameters".into()))?;
        let converged = matches!(
            state.get_termination_status(),
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );
        let out = OptimizationResult {
            parameters: clamp_to(best, bounds),
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_fev: counts.fev.load(Ordering::Relaxed),
            n_gev: counts.gev.load(Ordering::Relaxed),
            converged,
            message: state.get_termination_status().to_string(),
        };
        log::debug!("L-BFGS: {}", out);
        Ok(out)
    }
}
