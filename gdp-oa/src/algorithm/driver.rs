//! GDPopt solver driver.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use gdp_core::{ConstraintId, DisjunctId, GdpModel, VarId};

use super::init;
use super::log_guard::LogLevelGuard;
use super::termination::SolverState;
use super::IterationState;
use crate::bounds::BoundTracker;
use crate::cuts::{
    no_good_cut, AffineCutGenerator, CutContext, CutGenerator, NoGoodOutcome,
    OuterApproximationGenerator,
};
use crate::error::{GdpError, GdpResult};
use crate::master::{
    CutOutcome, CutSource, LinearCut, MasterProblem, MasterSolve, MipOracle, MipStatus,
};
use crate::model::{IncumbentTracker, SolveResults, TerminationCondition, UtilBlock};
use crate::oracle::{CuttingPlaneNlp, NlpOracle, NlpStatus, Subproblem};
use crate::search::BranchAndBoundMilp;
use crate::settings::{GdpSettings, MipSolverChoice, NlpSolverChoice, Strategy};
use crate::tighten::tighten_disjunct_bounds;
use crate::timing::Phase;

/// LOA/GLOA solver with its MILP and NLP oracles.
///
/// # Example
///
/// ```
/// use gdp_core::{Expr, GdpModel, Relation};
/// use gdp_oa::{GdpSettings, GdpoptSolver, TerminationCondition};
///
/// let mut model = GdpModel::new("unit");
/// let x = model.add_continuous("x", Some(0.0), Some(8.0));
/// let low = model.add_disjunct("low");
/// model.add_disjunct_constraint(low, "x_low", Expr::from(x), Relation::Le(2.0));
/// let high = model.add_disjunct("high");
/// model.add_disjunct_constraint(high, "x_high", Expr::from(x), Relation::Ge(5.0));
/// model.add_disjunction("size", &[low, high], true);
/// model.minimize((Expr::from(x) - 4.0).powi(2));
///
/// let mut solver = GdpoptSolver::new(GdpSettings::default());
/// let results = solver.solve(&mut model).unwrap();
/// assert_eq!(results.termination, TerminationCondition::Converged);
/// assert!((results.primal_bound - 1.0).abs() < 1e-4);
/// ```
pub struct GdpoptSolver {
    settings: GdpSettings,
    mip: Box<dyn MipOracle>,
    nlp: Box<dyn NlpOracle>,
}

impl GdpoptSolver {
    /// Solver with the oracles selected in `settings`.
    pub fn new(settings: GdpSettings) -> Self {
        let mip: Box<dyn MipOracle> = match settings.mip_solver {
            MipSolverChoice::BranchAndBound => {
                Box::new(BranchAndBoundMilp::new(settings.mip_solver_args.clone()))
            }
        };
        let nlp: Box<dyn NlpOracle> = match settings.nlp_solver {
            NlpSolverChoice::CuttingPlane => {
                Box::new(CuttingPlaneNlp::new(settings.nlp_solver_args.clone()))
            }
        };
        Self { settings, mip, nlp }
    }

    /// Replace the MILP oracle.
    pub fn with_mip_oracle(mut self, oracle: impl MipOracle + 'static) -> Self {
        self.mip = Box::new(oracle);
        self
    }

    /// Replace the NLP oracle.
    pub fn with_nlp_oracle(mut self, oracle: impl NlpOracle + 'static) -> Self {
        self.nlp = Box::new(oracle);
        self
    }

    /// Solver settings.
    pub fn settings(&self) -> &GdpSettings {
        &self.settings
    }

    /// Solve `model`.
    ///
    /// On return the incumbent (if any) is loaded into the model's variable
    /// values, except when the model was proven infeasible, in which case the
    /// model is left untouched. Oracle failures abort with
    /// [`GdpError::SolverFailure`] unless `nonfatal_oracle_errors` is set.
    pub fn solve(&mut self, model: &mut GdpModel) -> GdpResult<SolveResults> {
        self.settings.validate()?;
        let _log_guard = LogLevelGuard::new(self.settings.tee);
        let start = Instant::now();

        let block = UtilBlock::build(model)?;
        let master = MasterProblem::build(model, &block, &self.settings)?;
        log::info!(
            "GDPopt {}: {} variables, {} disjuncts, {} nonlinear constraints; MIP oracle '{}', NLP oracle '{}'",
            self.settings.strategy,
            block.num_vars(),
            block.disjuncts.len(),
            block.nonlinear_constraints.len(),
            self.mip.name(),
            self.nlp.name(),
        );

        let mut run = SolveLoop {
            settings: &self.settings,
            subproblem: Subproblem::new(model),
            bounds: BoundTracker::new(block.sense, self.settings.primal_improvement_tol),
            incumbent: IncumbentTracker::new(block.sense),
            results: SolveResults::new(self.settings.strategy, block.sense),
            block,
            master,
            oa: OuterApproximationGenerator::new(),
            affine: AffineCutGenerator::new(),
            mip: self.mip.as_mut(),
            nlp: self.nlp.as_mut(),
            start,
            iteration: 0,
            mip_iteration: 0,
            nlp_iteration: 0,
            state: SolverState::Running,
        };
        let condition = run.run()?;
        let results = run.finish(condition);

        if condition != TerminationCondition::Infeasible {
            if let Some(x) = &results.incumbent {
                model.set_values(x)?;
            }
        }

        log::info!(
            "GDPopt finished ({}): primal {:.8e}, dual {:.8e}, {} iterations, {:.2}s",
            results.termination,
            results.primal_bound,
            results.dual_bound,
            results.iterations,
            results.timing.seconds(Phase::Total),
        );
        Ok(results)
    }
}

/// How a master solve ended, as far as the loop is concerned.
#[derive(Debug, Clone, Copy)]
pub(super) enum MasterOutcome {
    /// A master point is available.
    Point(MasterSolve),
    /// Proven infeasible (or an oracle failure tolerated as such).
    Infeasible,
    /// Stopped by the time limit without a point.
    TimeLimit,
    /// Stopped without a point or a proof.
    NoPoint(MipStatus),
}

/// Result of one subproblem solve.
enum SubproblemOutcome {
    Feasible {
        x: Vec<f64>,
        duals: Option<BTreeMap<ConstraintId, f64>>,
        active: Vec<DisjunctId>,
        improved: bool,
    },
    Infeasible(NlpStatus),
    Failed(String),
}

/// State of one solve call.
pub(super) struct SolveLoop<'a> {
    pub(super) settings: &'a GdpSettings,
    pub(super) block: UtilBlock,
    pub(super) master: MasterProblem,
    pub(super) subproblem: Subproblem,
    pub(super) bounds: BoundTracker,
    pub(super) incumbent: IncumbentTracker,
    pub(super) results: SolveResults,
    oa: OuterApproximationGenerator,
    affine: AffineCutGenerator,
    mip: &'a mut dyn MipOracle,
    nlp: &'a mut dyn NlpOracle,
    start: Instant,
    iteration: usize,
    mip_iteration: usize,
    nlp_iteration: usize,
    state: SolverState,
}

impl SolveLoop<'_> {
    fn run(&mut self) -> GdpResult<TerminationCondition> {
        if self.settings.calc_disjunctive_bounds {
            self.tighten()?;
        }

        let init_start = Instant::now();
        init::initialize(self)?;
        self.results.timing.record(Phase::Initialization, init_start);

        while self.state.is_running() {
            self.iterate()?;
        }
        Ok(self.state.condition().unwrap_or(TerminationCondition::Error))
    }

    /// One master iteration.
    fn iterate(&mut self) -> GdpResult<()> {
        self.iteration += 1;
        self.mip_iteration = 0;
        self.nlp_iteration = 0;
        self.master.set_iteration(self.iteration);

        match self.solve_master(None, &[])? {
            MasterOutcome::Point(solve) => {
                if self.bounds.update_after_master_solve(true, solve.bound) {
                    self.log_progress("master");
                }
                if let Some(cb) = &self.settings.call_after_master_solve {
                    (cb.0)(&self.master, &self.iteration_state());
                }
            }
            MasterOutcome::Infeasible => {
                self.bounds.update_after_master_solve(false, f64::NAN);
            }
            MasterOutcome::TimeLimit => {
                self.state.terminate(TerminationCondition::TimeLimit);
                return Ok(());
            }
            MasterOutcome::NoPoint(MipStatus::Error) => {
                let message = format!("{} reported a numerical error", self.mip.name());
                self.oracle_error("mip", message)?;
                self.bounds.update_after_master_solve(false, f64::NAN);
            }
            MasterOutcome::NoPoint(status) => {
                log::warn!(
                    "Master stopped with status {:?} and no point; treated as infeasible",
                    status
                );
                self.bounds.update_after_master_solve(false, f64::NAN);
            }
        }
        if self.check_termination() {
            return Ok(());
        }

        let master_x = self.master_point()?;
        self.solve_subproblem(&master_x)?;
        if !self.exclude_assignment(&master_x)? {
            log::info!("All discrete assignments have been explored");
            self.bounds.set_dual_infeasible();
        }
        self.check_termination();
        Ok(())
    }

    /// Solve the master, optionally with a replacement objective and fixed
    /// variables.
    pub(super) fn solve_master(
        &mut self,
        costs: Option<&[f64]>,
        fixed: &[(VarId, f64)],
    ) -> GdpResult<MasterOutcome> {
        let start = Instant::now();
        let remaining = self.remaining_ms();
        self.results.mip_solves += 1;
        self.mip_iteration += 1;
        let outcome = if costs.is_none() && fixed.is_empty() {
            self.master.solve(&mut *self.mip, remaining)
        } else {
            self.master
                .solve_restricted(&mut *self.mip, costs, fixed, remaining)
        };
        self.results.timing.record(Phase::Mip, start);

        match outcome {
            Ok(solve) if solve.feasible => Ok(MasterOutcome::Point(solve)),
            Ok(solve) => Ok(match solve.status {
                MipStatus::Infeasible => MasterOutcome::Infeasible,
                MipStatus::TimeLimit => MasterOutcome::TimeLimit,
                status => MasterOutcome::NoPoint(status),
            }),
            Err(e) => {
                self.oracle_error("mip", e.to_string())?;
                Ok(MasterOutcome::Infeasible)
            }
        }
    }

    /// Last master point; model variables lead, indexed by id.
    pub(super) fn master_point(&self) -> GdpResult<Vec<f64>> {
        self.master
            .solution()
            .map(<[f64]>::to_vec)
            .ok_or_else(|| GdpError::Internal("master has no solution to fix".to_string()))
    }

    /// Solve the subproblem for the assignment in `master_x`, update the
    /// bounds and add cuts. Returns the active disjuncts if feasible.
    pub(super) fn solve_subproblem(
        &mut self,
        master_x: &[f64],
    ) -> GdpResult<Option<Vec<DisjunctId>>> {
        let settings = self.settings;
        let remaining = self.remaining_ms();
        let start = Instant::now();

        let outcome = {
            let mut fixed = self
                .subproblem
                .fix_master_solution(&self.block, master_x, settings)?;
            let problem = fixed.nlp_problem(&self.block);
            self.results.nlp_solves += 1;
            self.nlp_iteration += 1;
            let solved = self.nlp.solve(&problem, remaining);
            self.results.timing.record(Phase::Nlp, start);

            match solved {
                Ok(result) if result.status.is_feasible() && !result.x.is_empty() => {
                    let obj = self.block.objective.eval(&result.x);
                    fixed.load_solution(&result.x);
                    let improved = self.bounds.update_primal(obj);
                    if improved {
                        self.incumbent.replace(&result.x, obj);
                    }
                    if let Some(cb) = &settings.call_after_subproblem_feasible {
                        let state = IterationState {
                            master_iteration: self.iteration,
                            mip_iteration: self.mip_iteration,
                            nlp_iteration: self.nlp_iteration,
                            primal_bound: self.bounds.primal(),
                            dual_bound: self.bounds.dual(),
                            elapsed: self.start.elapsed(),
                        };
                        (cb.0)(fixed.model(), &state);
                    }
                    SubproblemOutcome::Feasible {
                        x: result.x,
                        duals: result.duals,
                        active: fixed.active_disjuncts().to_vec(),
                        improved,
                    }
                }
                Ok(result) if result.status == NlpStatus::Error => SubproblemOutcome::Failed(
                    format!("{} reported a numerical error", self.nlp.name()),
                ),
                Ok(result) => SubproblemOutcome::Infeasible(result.status),
                Err(e) => SubproblemOutcome::Failed(e.to_string()),
            }
        };

        match outcome {
            SubproblemOutcome::Feasible {
                x,
                duals,
                active,
                improved,
            } => {
                if improved {
                    self.log_progress("subproblem");
                }
                self.add_subproblem_cuts(&x, duals.as_ref(), &active)?;
                Ok(Some(active))
            }
            SubproblemOutcome::Infeasible(status) => {
                log::debug!("Subproblem not feasible ({:?})", status);
                Ok(None)
            }
            SubproblemOutcome::Failed(message) => {
                self.oracle_error("nlp", message)?;
                Ok(None)
            }
        }
    }

    fn add_subproblem_cuts(
        &mut self,
        point: &[f64],
        duals: Option<&BTreeMap<ConstraintId, f64>>,
        active: &[DisjunctId],
    ) -> GdpResult<()> {
        if self.settings.strategy == Strategy::Gloa && self.settings.calc_disjunctive_bounds {
            // The master has gained cuts since the last pass.
            self.tighten()?;
        }

        let start = Instant::now();
        let (phase, name, cuts) = {
            let ctx = CutContext {
                model: self.subproblem.model(),
                block: &self.block,
                master: &self.master,
                point,
                duals,
                active_disjuncts: active,
                settings: self.settings,
            };
            match self.settings.strategy {
                Strategy::Loa => (Phase::OaCutGeneration, self.oa.name(), self.oa.generate(&ctx)?),
                Strategy::Gloa => (
                    Phase::AffineCutGeneration,
                    self.affine.name(),
                    self.affine.generate(&ctx)?,
                ),
            }
        };

        let generated = cuts.len();
        let mut added = 0;
        for cut in cuts {
            if self.add_cut(cut)? {
                added += 1;
            }
        }
        self.results.timing.record(phase, start);
        log::debug!("{} {} cuts generated, {} added", generated, name, added);
        Ok(())
    }

    /// Add a cut to the master and count it. Returns true if it was added.
    pub(super) fn add_cut(&mut self, cut: LinearCut) -> GdpResult<bool> {
        let source = cut.source;
        match self.master.add_cut(cut)? {
            CutOutcome::Added(_) => {
                let counts = &mut self.results.cuts;
                match source {
                    s if s.is_outer_approximation() => counts.outer_approximation += 1,
                    s if s.is_affine() => counts.affine += 1,
                    CutSource::NoGood => counts.no_good += 1,
                    _ => {}
                }
                Ok(true)
            }
            outcome => {
                log::trace!("{:?} cut not added: {:?}", source, outcome);
                Ok(false)
            }
        }
    }

    /// Exclude the discrete assignment of `master_x` from the master.
    ///
    /// Returns false if nothing could be excluded: there are no binaries left
    /// to vary, or the same assignment was already cut off.
    pub(super) fn exclude_assignment(&mut self, master_x: &[f64]) -> GdpResult<bool> {
        let start = Instant::now();
        let binaries = self.block.binary_vars(self.subproblem.model());
        let columns = self.master.no_good_columns(&binaries);
        let added = match no_good_cut(&columns, master_x, self.settings.integer_tolerance)? {
            NoGoodOutcome::Cut(cut) => self.add_cut(cut)?,
            NoGoodOutcome::Exhausted => false,
        };
        self.results.timing.record(Phase::IntegerCutGeneration, start);
        Ok(added)
    }

    fn tighten(&mut self) -> GdpResult<()> {
        let start = Instant::now();
        let stats = tighten_disjunct_bounds(
            self.subproblem.model(),
            &self.block,
            &mut self.master,
            self.settings,
        )?;
        if stats.infeasible > 0 {
            let dead: Vec<VarId> = self
                .block
                .disjuncts
                .iter()
                .filter(|&&d| self.master.disjunct_bounds(d).is_some_and(|b| b.infeasible))
                .map(|&d| self.subproblem.model().disjunct(d).indicator)
                .collect();
            for indicator in dead {
                let cut = LinearCut::new(vec![(indicator.0, 1.0)], 0.0, CutSource::User)
                    .with_name("infeasible_disjunct");
                self.add_cut(cut)?;
            }
        }
        self.results.tightening_passes += 1;
        self.results.timing.record(Phase::DisjunctiveBounding, start);
        Ok(())
    }

    /// Apply the oracle-error policy: abort, or log and continue.
    fn oracle_error(&self, phase: &'static str, message: String) -> GdpResult<()> {
        if self.settings.nonfatal_oracle_errors {
            log::warn!(
                "{} oracle failed: {}; treating this solve as infeasible",
                phase,
                message
            );
            return Ok(());
        }
        log::error!("{} oracle failed: {}", phase, message);
        let mut results = self.snapshot(TerminationCondition::Error);
        results.message = Some(message.clone());
        Err(GdpError::SolverFailure {
            phase,
            message,
            results: Box::new(results),
        })
    }

    fn check_termination(&mut self) -> bool {
        if let Some(cond) =
            self.bounds
                .check_termination(self.iteration, self.start.elapsed(), self.settings)
        {
            self.state.terminate(cond);
        }
        !self.state.is_running()
    }

    pub(super) fn remaining_ms(&self) -> Option<u64> {
        self.settings
            .time_limit_ms
            .map(|limit| limit.saturating_sub(self.start.elapsed().as_millis() as u64))
    }

    pub(super) fn time_limit_exceeded(&self) -> bool {
        self.settings
            .time_limit_ms
            .is_some_and(|limit| self.start.elapsed() >= Duration::from_millis(limit))
    }

    pub(super) fn iteration_state(&self) -> IterationState {
        IterationState {
            master_iteration: self.iteration,
            mip_iteration: self.mip_iteration,
            nlp_iteration: self.nlp_iteration,
            primal_bound: self.bounds.primal(),
            dual_bound: self.bounds.dual(),
            elapsed: self.start.elapsed(),
        }
    }

    pub(super) fn log_progress(&self, event: &str) {
        log::info!(
            "Iter: {} | {} | Dual: {:.6e} | Primal: {:.6e} | Gap: {:.2}% | Time: {:.2}s",
            self.iteration,
            event,
            self.bounds.dual(),
            self.bounds.primal(),
            crate::model::relative_gap(self.bounds.primal(), self.bounds.dual()) * 100.0,
            self.start.elapsed().as_secs_f64(),
        );
    }

    fn snapshot(&self, condition: TerminationCondition) -> SolveResults {
        let mut results = self.results.clone();
        results.termination = condition;
        results.primal_bound = self.bounds.primal();
        results.dual_bound = self.bounds.dual();
        results.iterations = self.iteration;
        results.incumbent = self.incumbent.solution.clone();
        results.bound_history = self.bounds.history().to_vec();
        results.timing.add(Phase::Total, self.start.elapsed());
        results
    }

    fn finish(self, condition: TerminationCondition) -> SolveResults {
        self.snapshot(condition)
    }
}
