//! Master MILP relaxation.
//!
//! Column layout:
//!
//! ```text
//! [ model variables (by VarId) | eta (nonlinear objective only) | digits | OA slacks ]
//! ```
//!
//! Digit columns exist only with `force_subproblem_nlp`: each general integer
//! `n` in `[lo, hi]` gets binaries with `n = lo + sum(2^k b_k)`, so no-good
//! cuts over binaries also exclude the integer values a subproblem fixed.
//!
//! Rows are the linear global constraints, big-M relaxations of the linear
//! disjunct constraints, one row per disjunction, and every cut added during
//! the solve. The master is stored as a minimization: the model objective is
//! multiplied by `sense.sign()`. Nonlinear constraints and a nonlinear
//! objective only enter through cuts.

use std::collections::BTreeMap;
use std::time::Instant;

use gdp_core::{DisjunctId, GdpModel, LinearProgram, LinearRow, Sense, VarId, VarType};

use super::{LinearCut, MipOracle, MipSolveResult, MipStatus};
use crate::cuts::CutPool;
use crate::error::{GdpError, GdpResult};
use crate::model::UtilBlock;
use crate::settings::GdpSettings;

/// Below this big-M value a relaxed row can never be violated.
const BIG_M_TOL: f64 = 1e-9;

/// Variable box valid whenever one disjunct is selected.
#[derive(Debug, Clone, PartialEq)]
pub struct DisjunctBox {
    /// Lower bounds of the master columns.
    pub lower: Vec<f64>,
    /// Upper bounds of the master columns.
    pub upper: Vec<f64>,
    /// The disjunct cannot be selected.
    pub infeasible: bool,
}

/// What happened to a cut handed to [`MasterProblem::add_cut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOutcome {
    /// Added as a new master row.
    Added(usize),
    /// A parallel duplicate is already in the master.
    Duplicate,
    /// The cut cannot be violated over the column bounds.
    Redundant,
    /// The cut is invalid or cannot be relaxed with a finite big-M.
    Skipped,
}

impl CutOutcome {
    /// True if the master gained a row.
    pub fn is_added(self) -> bool {
        matches!(self, CutOutcome::Added(_))
    }
}

/// Interpreted outcome of one master solve.
#[derive(Debug, Clone, Copy)]
pub struct MasterSolve {
    /// Oracle status.
    pub status: MipStatus,
    /// A master point is available.
    pub feasible: bool,
    /// Objective value at the master point, in the model's sense.
    pub objective: f64,
    /// Valid relaxation bound in the model's sense (unbounded value if unknown).
    pub bound: f64,
}

#[derive(Debug, Clone, Copy)]
struct SlackPenalty {
    max_slack: f64,
    factor: f64,
}

/// Master MILP with its cut pool.
#[derive(Debug, Clone)]
pub struct MasterProblem {
    sense: Sense,
    num_model_vars: usize,
    eta: Option<usize>,
    digit_cols: Vec<usize>,
    col_lower: Vec<f64>,
    col_upper: Vec<f64>,
    col_types: Vec<VarType>,
    costs: Vec<f64>,
    cost_offset: f64,
    base_rows: Vec<LinearRow>,
    cut_rows: Vec<LinearRow>,
    pool: CutPool,
    slack_cols: Vec<usize>,
    slack: Option<SlackPenalty>,
    obj_bound: f64,
    bound_objective: bool,
    disjunct_bounds: BTreeMap<DisjunctId, DisjunctBox>,
    solution: Option<Vec<f64>>,
    objective_value: f64,
}

impl MasterProblem {
    /// Derive the master relaxation of `model`.
    pub fn build(model: &GdpModel, block: &UtilBlock, settings: &GdpSettings) -> GdpResult<Self> {
        let n = block.num_vars();
        let mut col_lower = model.lower_bounds();
        let mut col_upper = model.upper_bounds();
        let mut col_types: Vec<VarType> = model.vars.iter().map(|v| v.var_type).collect();

        let mut base_rows = Vec::new();
        for &cid in &block.constraints {
            let con = model.constraint(cid);
            let lin = match con.body.linear_part() {
                Some(lin) => lin,
                None => continue,
            };
            let terms: Vec<(usize, f64)> = lin.terms.iter().map(|(v, &a)| (v.0, a)).collect();
            let lower = con.lower.map_or(f64::NEG_INFINITY, |l| l - lin.constant);
            let upper = con.upper.map_or(f64::INFINITY, |u| u - lin.constant);

            let indicator = match con.owner {
                None => {
                    base_rows.push(LinearRow {
                        terms,
                        lower,
                        upper,
                    });
                    continue;
                }
                Some(d) => model.disjunct(d).indicator,
            };

            let (min_act, max_act) = activity_range(&terms, &col_lower, &col_upper);
            if upper.is_finite() {
                let m = max_act - upper;
                if !m.is_finite() {
                    log::warn!(
                        "Constraint '{}' has no finite big-M for its upper side; left to the subproblem",
                        con.name
                    );
                } else if m > BIG_M_TOL {
                    let mut row = terms.clone();
                    row.push((indicator.0, m));
                    base_rows.push(LinearRow::le(row, upper + m));
                }
            }
            if lower.is_finite() {
                let m = lower - min_act;
                if !m.is_finite() {
                    log::warn!(
                        "Constraint '{}' has no finite big-M for its lower side; left to the subproblem",
                        con.name
                    );
                } else if m > BIG_M_TOL {
                    let mut row = terms;
                    row.push((indicator.0, -m));
                    base_rows.push(LinearRow::ge(row, lower - m));
                }
            }
        }

        for disjunction in &model.disjunctions {
            let terms: Vec<(usize, f64)> = disjunction
                .disjuncts
                .iter()
                .map(|&d| (model.disjunct(d).indicator.0, 1.0))
                .collect();
            if disjunction.xor {
                base_rows.push(LinearRow::eq(terms, 1.0));
            } else {
                base_rows.push(LinearRow::ge(terms, 1.0));
            }
        }

        let sign = block.sense.sign();
        let mut costs = vec![0.0; n];
        let mut cost_offset = 0.0;
        let mut eta = None;
        match block.objective.linear_part() {
            Some(lin) => {
                for (v, &a) in &lin.terms {
                    costs[v.0] += sign * a;
                }
                cost_offset = sign * lin.constant;
            }
            None => {
                let bound = settings.obj_bound;
                let (lo, hi) = match block.objective.interval(&col_lower, &col_upper) {
                    Ok(iv) if iv.lo.max(-bound) <= iv.hi.min(bound) => {
                        (iv.lo.max(-bound), iv.hi.min(bound))
                    }
                    _ => (-bound, bound),
                };
                eta = Some(n);
                col_lower.push(lo);
                col_upper.push(hi);
                col_types.push(VarType::Continuous);
                costs.push(sign);
            }
        }

        let mut digit_cols = Vec::new();
        if settings.force_subproblem_nlp {
            for &var in &block.discrete_vars {
                let v = model.var(var);
                if v.var_type == VarType::Binary {
                    continue;
                }
                let lo = col_lower[var.0].ceil();
                let hi = col_upper[var.0].floor();
                if !lo.is_finite() || !hi.is_finite() {
                    return Err(GdpError::Configuration(format!(
                        "Integer variable '{}' needs finite bounds when force_subproblem_nlp is set",
                        v.name
                    )));
                }
                let mut row = vec![(var.0, 1.0)];
                let mut weight = 1.0;
                while weight - 1.0 < hi - lo {
                    let col = col_lower.len();
                    col_lower.push(0.0);
                    col_upper.push(1.0);
                    col_types.push(VarType::Binary);
                    costs.push(0.0);
                    digit_cols.push(col);
                    row.push((col, -weight));
                    weight *= 2.0;
                }
                if row.len() > 1 {
                    base_rows.push(LinearRow::eq(row, lo));
                }
            }
        }

        let slack = settings.add_slack.then_some(SlackPenalty {
            max_slack: settings.max_slack,
            factor: settings.oa_penalty_factor,
        });

        log::debug!(
            "Master problem: {} columns, {} base rows, epigraph column: {}, {} digit columns",
            col_lower.len(),
            base_rows.len(),
            eta.is_some(),
            digit_cols.len()
        );

        Ok(Self {
            sense: block.sense,
            num_model_vars: n,
            eta,
            digit_cols,
            col_lower,
            col_upper,
            col_types,
            costs,
            cost_offset,
            base_rows,
            cut_rows: Vec::new(),
            pool: CutPool::new(),
            slack_cols: Vec::new(),
            slack,
            obj_bound: settings.obj_bound,
            bound_objective: false,
            disjunct_bounds: BTreeMap::new(),
            solution: None,
            objective_value: f64::NAN,
        })
    }

    /// Objective sense of the model.
    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Number of master columns.
    pub fn num_cols(&self) -> usize {
        self.col_lower.len()
    }

    /// Number of model variables (leading columns).
    pub fn num_model_vars(&self) -> usize {
        self.num_model_vars
    }

    /// Column of the objective epigraph variable, if the objective is nonlinear.
    pub fn eta_column(&self) -> Option<usize> {
        self.eta
    }

    /// Columns a no-good cut must cover: `binaries` followed by the integer
    /// digit columns.
    pub fn no_good_columns(&self, binaries: &[VarId]) -> Vec<usize> {
        binaries
            .iter()
            .map(|v| v.0)
            .chain(self.digit_cols.iter().copied())
            .collect()
    }

    /// Columns of OA slack variables.
    pub fn slack_columns(&self) -> &[usize] {
        &self.slack_cols
    }

    /// Column lower bounds.
    pub fn col_lower(&self) -> &[f64] {
        &self.col_lower
    }

    /// Column upper bounds.
    pub fn col_upper(&self) -> &[f64] {
        &self.col_upper
    }

    /// Column types.
    pub fn col_types(&self) -> &[VarType] {
        &self.col_types
    }

    /// Base rows followed by cut rows.
    pub fn rows(&self) -> impl Iterator<Item = &LinearRow> {
        self.base_rows.iter().chain(self.cut_rows.iter())
    }

    /// Number of base rows (constraints and disjunctions).
    pub fn num_base_rows(&self) -> usize {
        self.base_rows.len()
    }

    /// Number of cuts in the master.
    pub fn num_cuts(&self) -> usize {
        self.cut_rows.len()
    }

    /// Cut pool.
    pub fn pool(&self) -> &CutPool {
        &self.pool
    }

    /// Record the master iteration on subsequently added cuts.
    pub fn set_iteration(&mut self, iteration: usize) {
        self.pool.set_iteration(iteration);
    }

    /// Last master point (all columns), if any.
    pub fn solution(&self) -> Option<&[f64]> {
        self.solution.as_deref()
    }

    /// Objective value of the last master point, in the model's sense.
    pub fn objective_value(&self) -> f64 {
        self.objective_value
    }

    /// Tightened box for `disjunct`, if bound tightening ran.
    pub fn disjunct_bounds(&self, disjunct: DisjunctId) -> Option<&DisjunctBox> {
        self.disjunct_bounds.get(&disjunct)
    }

    /// Store a tightened box for `disjunct`.
    pub fn set_disjunct_bounds(&mut self, disjunct: DisjunctId, bounds: DisjunctBox) {
        self.disjunct_bounds.insert(disjunct, bounds);
    }

    /// Add a cut, relaxing it with big-M when it has an activation variable.
    pub fn add_cut(&mut self, cut: LinearCut) -> GdpResult<CutOutcome> {
        if !cut.is_valid() {
            log::debug!("Skipping invalid cut {:?}", cut.name);
            return Ok(CutOutcome::Skipped);
        }

        let mut terms = cut.terms.clone();
        let mut rhs = cut.rhs;
        let (_, max_act) = activity_range(&terms, &self.col_lower, &self.col_upper);
        if max_act <= rhs + BIG_M_TOL {
            return Ok(CutOutcome::Redundant);
        }

        if let Some(indicator) = cut.activation {
            let m = max_act - rhs;
            if !m.is_finite() {
                log::warn!(
                    "Cut {} cannot be relaxed with a finite big-M; skipped",
                    cut.name.as_deref().unwrap_or("<unnamed>")
                );
                return Ok(CutOutcome::Skipped);
            }
            terms.push((indicator.0, m));
            rhs += m;
        }

        let source = cut.source;
        let (id, duplicate) = self.pool.add(cut);
        if duplicate {
            return Ok(CutOutcome::Duplicate);
        }

        if let (Some(penalty), true) = (self.slack, source.is_outer_approximation()) {
            let col = self.col_lower.len();
            self.col_lower.push(0.0);
            self.col_upper.push(penalty.max_slack);
            self.col_types.push(VarType::Continuous);
            self.costs.push(0.0);
            self.slack_cols.push(col);
            terms.push((col, -1.0));
        }

        self.cut_rows.push(LinearRow::le(terms, rhs));
        Ok(CutOutcome::Added(id))
    }

    /// Minimization LP handed to the MILP oracle.
    ///
    /// With OA slacks enabled, the penalty `factor * sum(slacks)` is added to
    /// the objective; it is rebuilt on every call since slacks accumulate.
    pub fn to_linear_program(&self) -> LinearProgram {
        let mut costs = self.costs.clone();
        if let Some(penalty) = self.slack {
            for &col in &self.slack_cols {
                costs[col] += penalty.factor;
            }
        }

        let mut rows: Vec<LinearRow> = self.rows().cloned().collect();
        if self.bound_objective {
            let terms = costs
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c != 0.0)
                .map(|(j, &c)| (j, c))
                .collect();
            rows.push(LinearRow::ge(terms, -self.obj_bound - self.cost_offset));
        }

        let mut lp = LinearProgram::from_rows(
            costs,
            &rows,
            self.col_lower.clone(),
            self.col_upper.clone(),
        )
        .with_integrality(self.col_types.clone());
        lp.objective_offset = self.cost_offset;
        lp
    }

    /// Same rows and columns with a replacement objective over model variables.
    pub fn to_linear_program_with(&self, model_costs: &[f64]) -> LinearProgram {
        let mut costs = vec![0.0; self.num_cols()];
        costs[..model_costs.len()].copy_from_slice(model_costs);
        let rows: Vec<LinearRow> = self.rows().cloned().collect();
        LinearProgram::from_rows(costs, &rows, self.col_lower.clone(), self.col_upper.clone())
            .with_integrality(self.col_types.clone())
    }

    /// Solve the master; an unbounded master is re-solved once with the
    /// objective bounded at `obj_bound`.
    pub fn solve(
        &mut self,
        oracle: &mut dyn MipOracle,
        time_limit_ms: Option<u64>,
    ) -> GdpResult<MasterSolve> {
        let start = Instant::now();
        let mut result = oracle.solve(&self.to_linear_program(), time_limit_ms)?;
        if result.status == MipStatus::Unbounded && !self.bound_objective {
            log::warn!(
                "Master problem unbounded; bounding the objective at {:.1e} and re-solving",
                self.obj_bound
            );
            self.bound_objective = true;
            let remaining =
                time_limit_ms.map(|ms| ms.saturating_sub(start.elapsed().as_millis() as u64));
            result = oracle.solve(&self.to_linear_program(), remaining)?;
        }
        Ok(self.interpret(result, self.sense.sign()))
    }

    /// Solve the master with some variables held at fixed values and,
    /// optionally, a replacement objective over model variables.
    ///
    /// The restriction applies to this solve only. Its bound is not a valid
    /// bound on the model.
    pub fn solve_restricted(
        &mut self,
        oracle: &mut dyn MipOracle,
        model_costs: Option<&[f64]>,
        fixed: &[(VarId, f64)],
        time_limit_ms: Option<u64>,
    ) -> GdpResult<MasterSolve> {
        let (mut lp, sign) = match model_costs {
            Some(costs) => (self.to_linear_program_with(costs), 1.0),
            None => (self.to_linear_program(), self.sense.sign()),
        };
        for &(var, value) in fixed {
            lp.col_lower[var.0] = value;
            lp.col_upper[var.0] = value;
        }
        let result = oracle.solve(&lp, time_limit_ms)?;
        Ok(self.interpret(result, sign))
    }

    fn interpret(&mut self, result: MipSolveResult, sign: f64) -> MasterSolve {
        if result.has_solution() && result.x.len() == self.num_cols() {
            let objective = sign * result.obj_val;
            let proven = result.status == MipStatus::Optimal || result.bound.is_finite();
            let raw_bound = if result.bound.is_finite() {
                result.bound
            } else {
                result.obj_val
            };
            let bound = if proven {
                sign * raw_bound
            } else {
                -sign * f64::INFINITY
            };
            self.solution = Some(result.x);
            self.objective_value = objective;
            return MasterSolve {
                status: result.status,
                feasible: true,
                objective,
                bound,
            };
        }

        if result.status != MipStatus::Infeasible {
            log::warn!(
                "Master solve ended with status {:?} and no usable point; treated as infeasible",
                result.status
            );
        }
        self.solution = None;
        self.objective_value = f64::NAN;
        MasterSolve {
            status: result.status,
            feasible: false,
            objective: f64::NAN,
            bound: f64::NAN,
        }
    }
}

/// Minimum and maximum of `sum(a_j x_j)` over the column box.
fn activity_range(terms: &[(usize, f64)], lower: &[f64], upper: &[f64]) -> (f64, f64) {
    let mut min_act = 0.0;
    let mut max_act = 0.0;
    for &(j, a) in terms {
        if a == 0.0 {
            continue;
        }
        let (lo, hi) = if a > 0.0 {
            (a * lower[j], a * upper[j])
        } else {
            (a * upper[j], a * lower[j])
        };
        min_act += lo;
        max_act += hi;
    }
    (min_act, max_act)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::{Expr, Relation};

    use crate::master::CutSource;

    fn two_unit_model() -> GdpModel {
        let mut m = GdpModel::new("two_units");
        let x = m.add_continuous("x", Some(0.0), Some(8.0));
        let low = m.add_disjunct("low");
        m.add_disjunct_constraint(low, "x_low", Expr::from(x), Relation::Le(2.0));
        let high = m.add_disjunct("high");
        m.add_disjunct_constraint(high, "x_high", Expr::from(x), Relation::Ge(5.0));
        m.add_disjunction("unit", &[low, high], true);
        m.minimize((Expr::from(x) - 4.0).powi(2));
        m
    }

    #[test]
    fn test_master_layout() {
        let m = two_unit_model();
        let block = UtilBlock::build(&m).unwrap();
        let master = MasterProblem::build(&m, &block, &GdpSettings::default()).unwrap();

        // x, two indicators, eta
        assert_eq!(master.num_cols(), 4);
        assert_eq!(master.eta_column(), Some(3));
        // two big-M rows, one disjunction row
        assert_eq!(master.num_base_rows(), 3);
        // (x - 4)^2 over [0, 8] lies in [0, 16]
        assert_eq!(master.col_lower()[3], 0.0);
        assert_eq!(master.col_upper()[3], 16.0);

        let lp = master.to_linear_program();
        // low selected, x = 2 feasible
        assert!(lp.is_feasible(&[2.0, 1.0, 0.0, 4.0], 1e-9));
        // low selected, x = 3 violates x <= 2
        assert!(!lp.is_feasible(&[3.0, 1.0, 0.0, 1.0], 1e-9));
        // high selected, x = 3 violates x >= 5
        assert!(!lp.is_feasible(&[3.0, 0.0, 1.0, 1.0], 1e-9));
    }

    #[test]
    fn test_add_cut_outcomes() {
        let m = two_unit_model();
        let block = UtilBlock::build(&m).unwrap();
        let mut master = MasterProblem::build(&m, &block, &GdpSettings::default()).unwrap();

        // x <= 100 can never be violated
        let redundant = LinearCut::new(vec![(0, 1.0)], 100.0, CutSource::User);
        assert_eq!(master.add_cut(redundant).unwrap(), CutOutcome::Redundant);

        let cut = LinearCut::new(vec![(0, 1.0)], 6.0, CutSource::User)
            .with_activation(Some(VarId(2)));
        assert!(master.add_cut(cut.clone()).unwrap().is_added());
        assert_eq!(master.add_cut(cut).unwrap(), CutOutcome::Duplicate);
        assert_eq!(master.num_cuts(), 1);

        let lp = master.to_linear_program();
        // high selected with x = 7 violates the activated cut
        assert!(!lp.is_feasible(&[7.0, 0.0, 1.0, 9.0], 1e-9));
        // low selected: the cut is relaxed; x = 2
        assert!(lp.is_feasible(&[2.0, 1.0, 0.0, 4.0], 1e-9));
    }

    #[test]
    fn test_slacks_only_on_oa_cuts() {
        let m = two_unit_model();
        let block = UtilBlock::build(&m).unwrap();
        let mut settings = GdpSettings::default();
        settings.add_slack = true;
        let mut master = MasterProblem::build(&m, &block, &settings).unwrap();

        let oa = LinearCut::new(
            vec![(0, -2.0), (3, -1.0)],
            -12.0,
            CutSource::ObjectiveOuterApproximation,
        );
        master.add_cut(oa).unwrap();
        let ng = LinearCut::new(vec![(1, 1.0), (2, -1.0)], 0.0, CutSource::NoGood);
        master.add_cut(ng).unwrap();

        assert_eq!(master.slack_columns(), &[4]);
        let lp = master.to_linear_program();
        assert_eq!(lp.objective[4], settings.oa_penalty_factor);
    }

    #[test]
    fn test_integer_digits_with_forced_nlp() {
        let mut m = GdpModel::new("digits");
        let x = m.add_continuous("x", Some(0.0), Some(3.0));
        let n = m.add_integer("n", Some(1.0), Some(6.0));
        m.add_constraint("link", Expr::from(x) - Expr::from(n), Relation::Le(0.0));
        m.minimize(Expr::from(x));
        let block = UtilBlock::build(&m).unwrap();

        let plain = MasterProblem::build(&m, &block, &GdpSettings::default()).unwrap();
        assert_eq!(plain.no_good_columns(&[]), Vec::<usize>::new());

        let mut settings = GdpSettings::default();
        settings.force_subproblem_nlp = true;
        let master = MasterProblem::build(&m, &block, &settings).unwrap();
        // n - 1 in [0, 5] needs three digits
        assert_eq!(master.num_cols(), 5);
        assert_eq!(master.no_good_columns(&[]), vec![2, 3, 4]);
        assert!(master.col_types()[2..].iter().all(|t| *t == VarType::Binary));

        let lp = master.to_linear_program();
        // n = 1 + 1 + 4
        assert!(lp.is_feasible(&[0.0, 6.0, 1.0, 0.0, 1.0], 1e-9));
        assert!(!lp.is_feasible(&[0.0, 5.0, 1.0, 0.0, 1.0], 1e-9));
    }

    #[test]
    fn test_unbounded_integer_rejected_with_forced_nlp() {
        let mut m = GdpModel::new("open");
        let n = m.add_integer("n", Some(0.0), None);
        m.minimize(Expr::from(n));
        let block = UtilBlock::build(&m).unwrap();
        let mut settings = GdpSettings::default();
        settings.force_subproblem_nlp = true;
        assert!(matches!(
            MasterProblem::build(&m, &block, &settings),
            Err(GdpError::Configuration(_))
        ));
    }
}
