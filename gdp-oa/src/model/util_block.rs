//! Canonical component lists shared by the master and the subproblem.
//!
//! Built once at solve start. The master and the subproblem are independent
//! derivations of the original model but agree on identifiers, so every list
//! here is valid in both. Lists are never reordered after creation.

use gdp_core::{ConstraintId, DisjunctId, Expr, GdpModel, Sense, VarId, VarType};

use crate::error::{GdpError, GdpResult};

/// Canonical ordered component lists of the original model.
#[derive(Debug, Clone)]
pub struct UtilBlock {
    /// All disjuncts.
    pub disjuncts: Vec<DisjunctId>,
    /// Indicator variable of each disjunct (same order as `disjuncts`).
    pub indicator_vars: Vec<VarId>,
    /// Discrete variables that are not indicators.
    pub discrete_vars: Vec<VarId>,
    /// Continuous variables.
    pub continuous_vars: Vec<VarId>,
    /// All variables, in id order.
    pub variables: Vec<VarId>,
    /// Active constraints, in id order.
    pub constraints: Vec<ConstraintId>,
    /// Active nonlinear constraints.
    pub nonlinear_constraints: Vec<ConstraintId>,
    /// Copy of the active objective expression.
    pub objective: Expr,
    /// Objective sense.
    pub sense: Sense,
    /// True if the objective is affine.
    pub objective_is_linear: bool,
}

impl UtilBlock {
    /// Record the component lists of `model`.
    pub fn build(model: &GdpModel) -> GdpResult<Self> {
        model.validate()?;
        let objective = model.active_objective().map_err(|e| {
            GdpError::Configuration(format!("Model has no usable objective: {}", e))
        })?;

        let disjuncts: Vec<DisjunctId> = model.disjunct_ids().collect();
        let indicator_vars: Vec<VarId> = disjuncts
            .iter()
            .map(|&d| model.disjunct(d).indicator)
            .collect();

        let mut discrete_vars = Vec::new();
        let mut continuous_vars = Vec::new();
        for id in model.var_ids() {
            let var = model.var(id);
            if var.var_type == VarType::Continuous {
                continuous_vars.push(id);
            } else if !indicator_vars.contains(&id) {
                discrete_vars.push(id);
            }
        }

        let constraints: Vec<ConstraintId> = model.active_constraint_ids().collect();
        let nonlinear_constraints = constraints
            .iter()
            .copied()
            .filter(|&c| !model.constraint(c).is_linear())
            .collect();

        Ok(Self {
            disjuncts,
            indicator_vars,
            discrete_vars,
            continuous_vars,
            variables: model.var_ids().collect(),
            constraints,
            nonlinear_constraints,
            objective_is_linear: objective.expr.is_linear(),
            objective: objective.expr.clone(),
            sense: objective.sense,
        })
    }

    /// Number of model variables.
    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    /// Binary variables that take part in no-good cuts: indicators first,
    /// then other binaries.
    pub fn binary_vars(&self, model: &GdpModel) -> Vec<VarId> {
        let mut vars = self.indicator_vars.clone();
        vars.extend(
            self.discrete_vars
                .iter()
                .copied()
                .filter(|&v| model.var(v).var_type == VarType::Binary),
        );
        vars
    }

    /// Position of `disjunct` in the canonical list.
    pub fn disjunct_position(&self, disjunct: DisjunctId) -> Option<usize> {
        self.disjuncts.iter().position(|&d| d == disjunct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdp_core::Relation;

    #[test]
    fn test_lists() {
        let mut m = GdpModel::new("m");
        let x = m.add_continuous("x", Some(0.0), Some(4.0));
        let z = m.add_binary("z");
        let n = m.add_integer("n", Some(0.0), Some(3.0));
        let d = m.add_disjunct("d");
        m.add_disjunct_constraint(d, "c", Expr::from(x).powi(2), Relation::Le(2.0));
        m.add_constraint("lin", Expr::from(x) + Expr::from(n), Relation::Le(5.0));
        m.add_disjunction("dj", &[d], true);
        m.minimize(Expr::from(x) + Expr::from(z));

        let block = UtilBlock::build(&m).unwrap();
        assert_eq!(block.indicator_vars, vec![VarId(3)]);
        assert_eq!(block.discrete_vars, vec![z, n]);
        assert_eq!(block.continuous_vars, vec![x]);
        assert_eq!(block.nonlinear_constraints.len(), 1);
        assert!(block.objective_is_linear);
        assert_eq!(block.binary_vars(&m), vec![VarId(3), z]);
    }

    #[test]
    fn test_missing_objective_is_configuration_error() {
        let mut m = GdpModel::new("m");
        m.add_continuous("x", Some(0.0), Some(1.0));
        assert!(matches!(
            UtilBlock::build(&m),
            Err(GdpError::Configuration(_))
        ));
    }
}
