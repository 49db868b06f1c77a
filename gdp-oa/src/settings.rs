//! Configuration settings for the GDPopt solver.

use std::fmt;
use std::sync::Arc;

use gdp_core::{DisjunctId, GdpModel, LpSettings};

use crate::algorithm::IterationState;
use crate::error::{GdpError, GdpResult};
use crate::master::MasterProblem;

/// Decomposition algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Logic-based outer approximation: first-order OA cuts.
    #[default]
    Loa,
    /// Global LOA: affine McCormick cuts valid over each disjunct.
    Gloa,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Loa => f.write_str("LOA"),
            Strategy::Gloa => f.write_str("GLOA"),
        }
    }
}

/// How the master problem is seeded before the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStrategy {
    /// Start the main loop on the bare master.
    NoInit,
    /// Solve covering MILPs until every disjunct has appeared in a feasible subproblem.
    #[default]
    SetCovering,
    /// One MILP maximizing the number of active binaries.
    MaxBinary,
    /// Use the indicator values currently stored on the model.
    FixDisjuncts,
    /// Use the user-supplied `custom_init_disjuncts` lists.
    CustomDisjuncts,
}

/// Node selection strategy for the built-in branch-and-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelection {
    /// Always select node with best (lowest) dual bound.
    #[default]
    BestBound,

    /// Depth-first search (helps find feasible solutions quickly).
    DepthFirst,
}

/// Settings for the built-in branch-and-bound MILP oracle.
#[derive(Debug, Clone)]
pub struct MilpSettings {
    /// Maximum number of nodes to explore.
    pub max_nodes: u64,

    /// Time limit in milliseconds (None = unlimited).
    pub time_limit_ms: Option<u64>,

    /// Relative optimality gap tolerance.
    pub gap_tol: f64,

    /// Absolute optimality gap tolerance.
    pub gap_abs_tol: f64,

    /// Integer feasibility tolerance.
    pub int_feas_tol: f64,

    /// Node selection strategy.
    pub node_selection: NodeSelection,

    /// Settings for node LP solves.
    pub lp_settings: LpSettings,

    /// Print progress information.
    pub verbose: bool,

    /// Log frequency (print every N nodes).
    pub log_freq: u64,
}

impl Default for MilpSettings {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            time_limit_ms: None,
            gap_tol: 1e-9,
            gap_abs_tol: 1e-9,
            int_feas_tol: 1e-6,
            node_selection: NodeSelection::BestBound,
            lp_settings: LpSettings::default(),
            verbose: false,
            log_freq: 100,
        }
    }
}

/// Settings for the built-in cutting-plane NLP oracle.
#[derive(Debug, Clone)]
pub struct CuttingPlaneSettings {
    /// Maximum number of linearization rounds.
    pub max_iter: usize,
    /// Nonlinear constraint feasibility tolerance.
    pub feas_tol: f64,
    /// Relative objective tolerance between model and epigraph value.
    pub opt_tol: f64,
    /// Finite box substituted for infinite variable bounds.
    pub bound_clamp: f64,
    /// Settings for inner MILP solves (used when integers remain unfixed).
    pub milp: MilpSettings,
}

impl Default for CuttingPlaneSettings {
    fn default() -> Self {
        Self {
            max_iter: 500,
            feas_tol: 1e-7,
            opt_tol: 1e-6,
            bound_clamp: 1e6,
            milp: MilpSettings::default(),
        }
    }
}

/// MILP oracle selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MipSolverChoice {
    /// Built-in LP-based branch-and-bound.
    #[default]
    BranchAndBound,
}

/// NLP oracle selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NlpSolverChoice {
    /// Built-in Kelley cutting-plane method (convex subproblems).
    #[default]
    CuttingPlane,
}

/// Signature of the post-master-solve hook.
pub type MasterCallbackFn = dyn Fn(&MasterProblem, &IterationState) + Send + Sync;

/// Signature of the post-feasible-subproblem hook.
pub type SubproblemCallbackFn = dyn Fn(&GdpModel, &IterationState) + Send + Sync;

/// Hook invoked after every master solve.
#[derive(Clone)]
pub struct MasterCallback(pub Arc<MasterCallbackFn>);

/// Hook invoked after every feasible subproblem.
#[derive(Clone)]
pub struct SubproblemCallback(pub Arc<SubproblemCallbackFn>);

impl MasterCallback {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&MasterProblem, &IterationState) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl SubproblemCallback {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&GdpModel, &IterationState) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for MasterCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterCallback(..)")
    }
}

impl fmt::Debug for SubproblemCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubproblemCallback(..)")
    }
}

/// Value for keyword-style configuration.
#[derive(Debug, Clone)]
pub enum OptionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String selector.
    Str(String),
    /// Lists of disjuncts (for `custom_init_disjuncts`).
    DisjunctLists(Vec<Vec<DisjunctId>>),
    /// Post-master-solve hook.
    MasterCallback(MasterCallback),
    /// Post-feasible-subproblem hook.
    SubproblemCallback(SubproblemCallback),
}

impl OptionValue {
    fn kind(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Str(_) => "string",
            OptionValue::DisjunctLists(_) => "disjunct lists",
            OptionValue::MasterCallback(_) => "master callback",
            OptionValue::SubproblemCallback(_) => "subproblem callback",
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

/// GDPopt solver settings.
#[derive(Debug, Clone)]
pub struct GdpSettings {
    // === Algorithm ===
    /// LOA or GLOA.
    pub strategy: Strategy,

    /// Master initialization strategy.
    pub init_strategy: InitStrategy,

    /// Maximum set-covering iterations during initialization.
    pub set_cover_iterlim: usize,

    /// Disjunct lists forced true, one initialization subproblem per list.
    pub custom_init_disjuncts: Vec<Vec<DisjunctId>>,

    // === Termination criteria ===
    /// Maximum number of master iterations.
    pub iteration_limit: usize,

    /// Time limit in milliseconds (None = unlimited).
    pub time_limit_ms: Option<u64>,

    /// Absolute gap tolerance between primal and dual bound.
    pub gap_abs_tol: f64,

    /// Relative gap tolerance between primal and dual bound.
    pub gap_rel_tol: f64,

    /// Minimum improvement for a primal bound to count as better.
    pub primal_improvement_tol: f64,

    // === Tolerances ===
    /// A master value is integral if within this distance of an integer.
    pub integer_tolerance: f64,

    /// Tolerance for deciding which side of a ranged constraint is active.
    pub constraint_tolerance: f64,

    /// Multipliers below this magnitude carry no side information.
    pub small_dual_tolerance: f64,

    // === Subproblem ===
    /// Also fix non-indicator discrete variables, making the subproblem an NLP.
    pub force_subproblem_nlp: bool,

    /// Round master discrete values before fixing them.
    pub round_discrete_vars: bool,

    // === Cuts ===
    /// Add a slack to every OA cut and penalize slacks in the master objective (LOA only).
    pub add_slack: bool,

    /// Upper bound of each OA slack.
    pub max_slack: f64,

    /// Weight of the slack penalty in the master objective.
    pub oa_penalty_factor: f64,

    /// Tighten variable bounds per disjunct before affine cut generation (GLOA).
    pub calc_disjunctive_bounds: bool,

    /// Use LP-based bound tightening instead of propagation.
    pub obbt_disjunctive_bounds: bool,

    /// Bound on the master objective when it is unbounded.
    pub obj_bound: f64,

    // === Oracles ===
    /// MILP oracle selector.
    pub mip_solver: MipSolverChoice,

    /// Arguments for the MILP oracle.
    pub mip_solver_args: MilpSettings,

    /// NLP oracle selector.
    pub nlp_solver: NlpSolverChoice,

    /// Arguments for the NLP oracle.
    pub nlp_solver_args: CuttingPlaneSettings,

    /// Treat oracle errors as "infeasible this iteration" instead of aborting.
    pub nonfatal_oracle_errors: bool,

    // === Hooks ===
    /// Called after every master solve.
    pub call_after_master_solve: Option<MasterCallback>,

    /// Called after every feasible subproblem.
    pub call_after_subproblem_feasible: Option<SubproblemCallback>,

    // === Output ===
    /// Raise the log level to Info for the duration of the solve.
    pub tee: bool,
}

impl Default for GdpSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Loa,
            init_strategy: InitStrategy::SetCovering,
            set_cover_iterlim: 8,
            custom_init_disjuncts: Vec::new(),
            iteration_limit: 100,
            time_limit_ms: None,
            gap_abs_tol: 1e-6,
            gap_rel_tol: 1e-4,
            primal_improvement_tol: 1e-9,
            integer_tolerance: 1e-5,
            constraint_tolerance: 1e-6,
            small_dual_tolerance: 1e-8,
            force_subproblem_nlp: false,
            round_discrete_vars: true,
            add_slack: false,
            max_slack: 1000.0,
            oa_penalty_factor: 1000.0,
            calc_disjunctive_bounds: false,
            obbt_disjunctive_bounds: false,
            obj_bound: 1e8,
            mip_solver: MipSolverChoice::BranchAndBound,
            mip_solver_args: MilpSettings::default(),
            nlp_solver: NlpSolverChoice::CuttingPlane,
            nlp_solver_args: CuttingPlaneSettings::default(),
            nonfatal_oracle_errors: false,
            call_after_master_solve: None,
            call_after_subproblem_feasible: None,
            tee: false,
        }
    }
}

impl GdpSettings {
    /// Settings for the given strategy with all other options at default.
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Set the master iteration limit.
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit;
        self
    }

    /// Set time limit.
    pub fn with_time_limit(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    /// Set absolute and relative gap tolerances.
    pub fn with_gap_tol(mut self, abs_tol: f64, rel_tol: f64) -> Self {
        self.gap_abs_tol = abs_tol;
        self.gap_rel_tol = rel_tol;
        self
    }

    /// Set the initialization strategy.
    pub fn with_init_strategy(mut self, init: InitStrategy) -> Self {
        self.init_strategy = init;
        self
    }

    /// Install the post-master-solve hook.
    pub fn with_master_callback(
        mut self,
        f: impl Fn(&MasterProblem, &IterationState) + Send + Sync + 'static,
    ) -> Self {
        self.call_after_master_solve = Some(MasterCallback::new(f));
        self
    }

    /// Install the post-feasible-subproblem hook.
    pub fn with_subproblem_callback(
        mut self,
        f: impl Fn(&GdpModel, &IterationState) + Send + Sync + 'static,
    ) -> Self {
        self.call_after_subproblem_feasible = Some(SubproblemCallback::new(f));
        self
    }

    /// Enable verbose output.
    pub fn verbose(mut self) -> Self {
        self.tee = true;
        self
    }

    /// Build settings from keyword options on top of the defaults.
    pub fn from_options<K, I>(options: I) -> GdpResult<Self>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, OptionValue)>,
    {
        let mut settings = Self::default();
        for (key, value) in options {
            settings.apply_option(key.as_ref(), value)?;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Set one option by name.
    ///
    /// Unknown keys and values of the wrong type are configuration errors.
    pub fn apply_option(&mut self, key: &str, value: OptionValue) -> GdpResult<()> {
        let mismatch = |expected: &str, value: &OptionValue| {
            GdpError::Configuration(format!(
                "Option '{}' expects {}, got {}",
                key,
                expected,
                value.kind()
            ))
        };
        let as_bool = |v: &OptionValue| match v {
            OptionValue::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        };
        let as_float = |v: &OptionValue| match v {
            OptionValue::Float(f) => Ok(*f),
            OptionValue::Int(i) => Ok(*i as f64),
            other => Err(mismatch("number", other)),
        };
        let as_count = |v: &OptionValue| match v {
            OptionValue::Int(i) if *i >= 0 => Ok(*i as usize),
            other => Err(mismatch("non-negative int", other)),
        };
        let as_str = |v: &OptionValue| match v {
            OptionValue::Str(s) => Ok(s.to_ascii_lowercase()),
            other => Err(mismatch("string", other)),
        };

        match key {
            "strategy" => {
                self.strategy = match as_str(&value)?.as_str() {
                    "loa" => Strategy::Loa,
                    "gloa" => Strategy::Gloa,
                    other => {
                        return Err(GdpError::Configuration(format!(
                            "Unknown strategy '{}'",
                            other
                        )))
                    }
                }
            }
            "init_strategy" => {
                self.init_strategy = match as_str(&value)?.as_str() {
                    "no_init" => InitStrategy::NoInit,
                    "set_covering" => InitStrategy::SetCovering,
                    "max_binary" => InitStrategy::MaxBinary,
                    "fix_disjuncts" => InitStrategy::FixDisjuncts,
                    "custom_disjuncts" => InitStrategy::CustomDisjuncts,
                    other => {
                        return Err(GdpError::Configuration(format!(
                            "Unknown init_strategy '{}'",
                            other
                        )))
                    }
                }
            }
            "set_cover_iterlim" => self.set_cover_iterlim = as_count(&value)?,
            "custom_init_disjuncts" => match value {
                OptionValue::DisjunctLists(lists) => self.custom_init_disjuncts = lists,
                other => return Err(mismatch("disjunct lists", &other)),
            },
            "iterlim" | "iteration_limit" => self.iteration_limit = as_count(&value)?,
            "time_limit" => {
                let secs = as_float(&value)?;
                if secs < 0.0 {
                    return Err(GdpError::Configuration(
                        "time_limit must be non-negative".into(),
                    ));
                }
                self.time_limit_ms = Some((secs * 1000.0).round() as u64);
            }
            "bound_tolerance" | "gap_abs_tol" => self.gap_abs_tol = as_float(&value)?,
            "gap_rel_tol" => self.gap_rel_tol = as_float(&value)?,
            "primal_improvement_tol" => self.primal_improvement_tol = as_float(&value)?,
            "integer_tolerance" => self.integer_tolerance = as_float(&value)?,
            "constraint_tolerance" => self.constraint_tolerance = as_float(&value)?,
            "small_dual_tolerance" => self.small_dual_tolerance = as_float(&value)?,
            "force_subproblem_nlp" => self.force_subproblem_nlp = as_bool(&value)?,
            "round_discrete_vars" => self.round_discrete_vars = as_bool(&value)?,
            "add_slack" => self.add_slack = as_bool(&value)?,
            "max_slack" => self.max_slack = as_float(&value)?,
            "OA_penalty_factor" | "oa_penalty_factor" => {
                self.oa_penalty_factor = as_float(&value)?
            }
            "calc_disjunctive_bounds" => self.calc_disjunctive_bounds = as_bool(&value)?,
            "obbt_disjunctive_bounds" => self.obbt_disjunctive_bounds = as_bool(&value)?,
            "obj_bound" => self.obj_bound = as_float(&value)?,
            "mip_solver" => {
                self.mip_solver = match as_str(&value)?.as_str() {
                    "bnb" | "branch_and_bound" => MipSolverChoice::BranchAndBound,
                    other => {
                        return Err(GdpError::Configuration(format!(
                            "Unknown mip_solver '{}'",
                            other
                        )))
                    }
                }
            }
            "nlp_solver" => {
                self.nlp_solver = match as_str(&value)?.as_str() {
                    "cutting_plane" | "kelley" => NlpSolverChoice::CuttingPlane,
                    other => {
                        return Err(GdpError::Configuration(format!(
                            "Unknown nlp_solver '{}'",
                            other
                        )))
                    }
                }
            }
            "mip_max_nodes" => self.mip_solver_args.max_nodes = as_count(&value)? as u64,
            "nlp_max_iter" => self.nlp_solver_args.max_iter = as_count(&value)?,
            "nonfatal_oracle_errors" => self.nonfatal_oracle_errors = as_bool(&value)?,
            "call_after_master_solve" => match value {
                OptionValue::MasterCallback(cb) => self.call_after_master_solve = Some(cb),
                other => return Err(mismatch("master callback", &other)),
            },
            "call_after_subproblem_feasible" => match value {
                OptionValue::SubproblemCallback(cb) => {
                    self.call_after_subproblem_feasible = Some(cb)
                }
                other => return Err(mismatch("subproblem callback", &other)),
            },
            "tee" => self.tee = as_bool(&value)?,
            _ => {
                return Err(GdpError::Configuration(format!(
                    "Unknown option '{}'",
                    key
                )))
            }
        }
        Ok(())
    }

    /// Reject invalid option combinations.
    pub fn validate(&self) -> GdpResult<()> {
        let fail = |msg: &str| Err(GdpError::Configuration(msg.to_string()));

        if self.iteration_limit == 0 {
            return fail("iteration_limit must be at least 1");
        }
        if self.add_slack && self.strategy == Strategy::Gloa {
            return fail("add_slack is only supported by the LOA strategy");
        }
        if self.obbt_disjunctive_bounds && !self.calc_disjunctive_bounds {
            return fail("obbt_disjunctive_bounds requires calc_disjunctive_bounds");
        }
        if self.init_strategy == InitStrategy::CustomDisjuncts
            && self.custom_init_disjuncts.is_empty()
        {
            return fail("init_strategy custom_disjuncts requires custom_init_disjuncts");
        }
        let tolerances = [
            self.gap_abs_tol,
            self.gap_rel_tol,
            self.primal_improvement_tol,
            self.integer_tolerance,
            self.constraint_tolerance,
            self.small_dual_tolerance,
        ];
        if tolerances.iter().any(|t| !(*t >= 0.0)) {
            return fail("tolerances must be non-negative");
        }
        if !(self.max_slack > 0.0) || !(self.oa_penalty_factor >= 0.0) {
            return fail("max_slack must be positive and OA_penalty_factor non-negative");
        }
        if !(self.obj_bound > 0.0) {
            return fail("obj_bound must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let s = GdpSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.strategy, Strategy::Loa);
        assert_eq!(s.init_strategy, InitStrategy::SetCovering);
        assert_eq!(s.iteration_limit, 100);
    }

    #[test]
    fn test_apply_options() {
        let s = GdpSettings::from_options(vec![
            ("strategy", OptionValue::from("GLOA")),
            ("iterlim", OptionValue::Int(7)),
            ("time_limit", OptionValue::Float(2.5)),
            ("calc_disjunctive_bounds", OptionValue::Bool(true)),
        ])
        .unwrap();
        assert_eq!(s.strategy, Strategy::Gloa);
        assert_eq!(s.iteration_limit, 7);
        assert_eq!(s.time_limit_ms, Some(2500));
        assert!(s.calc_disjunctive_bounds);
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut s = GdpSettings::default();
        let err = s.apply_option("no_such_option", OptionValue::Bool(true));
        assert!(matches!(err, Err(GdpError::Configuration(_))));

        let err = s.apply_option("iterlim", OptionValue::Str("ten".into()));
        assert!(matches!(err, Err(GdpError::Configuration(_))));
    }

    #[test]
    fn test_invalid_combinations() {
        let mut s = GdpSettings::with_strategy(Strategy::Gloa);
        s.add_slack = true;
        assert!(s.validate().is_err());

        let mut s = GdpSettings::default();
        s.obbt_disjunctive_bounds = true;
        assert!(s.validate().is_err());

        let s = GdpSettings::default().with_init_strategy(InitStrategy::CustomDisjuncts);
        assert!(s.validate().is_err());

        let s = GdpSettings::default().with_iteration_limit(0);
        assert!(s.validate().is_err());
    }
}
