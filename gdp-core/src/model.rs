//! Disjunctive model representation.
//!
//! A [`GdpModel`] is an algebraic program with either/or structure:
//!
//! ```text
//! minimize / maximize   f(x)
//! subject to            g_i(x) in [l_i, u_i]                 (global constraints)
//!                       OR_{k in D_j} [ Y_k : h_k(x) in [..] ]   (one per disjunction j)
//!                       x_lb <= x <= x_ub,  some x integer / binary
//! ```
//!
//! Every disjunct owns a binary indicator variable. Components are addressed by
//! the index they were created with; a cloned model keeps those indices, which
//! is how working copies stay in correspondence with the original.

use std::fmt;

use crate::error::ModelError;
use crate::expr::Expr;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            /// Position of the component in its owning list.
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a variable (also its column in every derived LP).
    VarId
);
id_type!(
    /// Identifier of a constraint.
    ConstraintId
);
id_type!(
    /// Identifier of a disjunct.
    DisjunctId
);
id_type!(
    /// Identifier of a disjunction.
    DisjunctionId
);

/// Variable type for mixed-integer problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary variable (0 or 1)
    Binary,
}

impl VarType {
    /// Returns true for integer and binary variables.
    pub fn is_discrete(self) -> bool {
        !matches!(self, VarType::Continuous)
    }
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sense {
    /// Minimize the objective.
    #[default]
    Minimize,
    /// Maximize the objective.
    Maximize,
}

impl Sense {
    /// +1 for minimization, -1 for maximization.
    ///
    /// Multiplying an objective by this turns every problem into a minimization.
    pub fn sign(self) -> f64 {
        match self {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        }
    }

    /// Value of the objective when no feasible point exists (+inf / -inf).
    pub fn infeasible_value(self) -> f64 {
        self.sign() * f64::INFINITY
    }

    /// Value of an unrestricted relaxation bound (-inf / +inf).
    pub fn unbounded_value(self) -> f64 {
        -self.sign() * f64::INFINITY
    }

    /// True if `a` is strictly better than `b` by more than `tol`.
    pub fn improves(self, a: f64, b: f64, tol: f64) -> bool {
        match self {
            Sense::Minimize => a < b - tol,
            Sense::Maximize => a > b + tol,
        }
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Minimize => write!(f, "minimize"),
            Sense::Maximize => write!(f, "maximize"),
        }
    }
}

/// Right-hand side of a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relation {
    /// body <= value
    Le(f64),
    /// body >= value
    Ge(f64),
    /// body == value
    Eq(f64),
    /// lower <= body <= upper
    Range(f64, f64),
}

impl Relation {
    /// (lower, upper) bounds of the relation.
    pub fn bounds(self) -> (Option<f64>, Option<f64>) {
        match self {
            Relation::Le(u) => (None, Some(u)),
            Relation::Ge(l) => (Some(l), None),
            Relation::Eq(v) => (Some(v), Some(v)),
            Relation::Range(l, u) => (Some(l), Some(u)),
        }
    }
}

/// A decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Name, used for logging only.
    pub name: String,
    /// Domain of the variable.
    pub var_type: VarType,
    /// Lower bound (None = -inf).
    pub lower: Option<f64>,
    /// Upper bound (None = +inf).
    pub upper: Option<f64>,
    /// Current value, if any.
    pub value: Option<f64>,
    /// Fixed variables are held at `value`.
    pub fixed: bool,
}

impl Variable {
    /// Bounds as finite-or-infinite floats, with binary domains and fixing applied.
    pub fn bounds(&self) -> (f64, f64) {
        if self.fixed {
            if let Some(v) = self.value {
                return (v, v);
            }
        }
        let mut lb = self.lower.unwrap_or(f64::NEG_INFINITY);
        let mut ub = self.upper.unwrap_or(f64::INFINITY);
        if self.var_type == VarType::Binary {
            lb = lb.max(0.0);
            ub = ub.min(1.0);
        }
        (lb, ub)
    }

    /// Current value, or the point of the domain closest to zero.
    pub fn value_or_default(&self) -> f64 {
        let (lb, ub) = self.bounds();
        self.value.unwrap_or_else(|| 0.0_f64.max(lb).min(ub))
    }
}

/// A constraint `lower <= body <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Name, used for logging only.
    pub name: String,
    /// Constraint body.
    pub body: Expr,
    /// Lower bound (None = -inf).
    pub lower: Option<f64>,
    /// Upper bound (None = +inf).
    pub upper: Option<f64>,
    /// Inactive constraints are ignored by every derived problem.
    pub active: bool,
    /// Disjunct this constraint belongs to (None = global).
    pub owner: Option<DisjunctId>,
}

impl Constraint {
    /// True if lower and upper bounds coincide.
    pub fn is_equality(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l == u)
    }

    /// True if the body is affine.
    pub fn is_linear(&self) -> bool {
        self.body.linear_part().is_some()
    }

    /// Amount by which `x` violates the constraint (0 if satisfied).
    pub fn violation(&self, x: &[f64]) -> f64 {
        let v = self.body.eval(x);
        let mut viol: f64 = 0.0;
        if let Some(u) = self.upper {
            viol = viol.max(v - u);
        }
        if let Some(l) = self.lower {
            viol = viol.max(l - v);
        }
        viol
    }
}

/// One alternative of a disjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct Disjunct {
    /// Name, used for logging only.
    pub name: String,
    /// Binary indicator: 1 means the disjunct's constraints are enforced.
    pub indicator: VarId,
    /// Constraints enforced when the disjunct is selected.
    pub constraints: Vec<ConstraintId>,
}

/// An either/or choice among disjuncts.
#[derive(Debug, Clone, PartialEq)]
pub struct Disjunction {
    /// Name, used for logging only.
    pub name: String,
    /// Alternatives.
    pub disjuncts: Vec<DisjunctId>,
    /// Exactly one disjunct is selected (otherwise at least one).
    pub xor: bool,
}

/// Objective function.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// Name, used for logging only.
    pub name: String,
    /// Objective expression.
    pub expr: Expr,
    /// Optimization direction.
    pub sense: Sense,
    /// Only active objectives are optimized.
    pub active: bool,
}

/// A generalized disjunctive program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdpModel {
    /// Model name.
    pub name: String,
    /// Variables, indexed by [`VarId`].
    pub vars: Vec<Variable>,
    /// Constraints, indexed by [`ConstraintId`].
    pub constraints: Vec<Constraint>,
    /// Disjuncts, indexed by [`DisjunctId`].
    pub disjuncts: Vec<Disjunct>,
    /// Disjunctions, indexed by [`DisjunctionId`].
    pub disjunctions: Vec<Disjunction>,
    /// Objectives (exactly one must be active when solving).
    pub objectives: Vec<Objective>,
}

impl GdpModel {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a variable.
    pub fn add_var(
        &mut self,
        name: impl Into<String>,
        var_type: VarType,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Variable {
            name: name.into(),
            var_type,
            lower,
            upper,
            value: None,
            fixed: false,
        });
        id
    }

    /// Add a continuous variable.
    pub fn add_continuous(
        &mut self,
        name: impl Into<String>,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> VarId {
        self.add_var(name, VarType::Continuous, lower, upper)
    }

    /// Add a binary variable.
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarType::Binary, Some(0.0), Some(1.0))
    }

    /// Add an integer variable.
    pub fn add_integer(
        &mut self,
        name: impl Into<String>,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> VarId {
        self.add_var(name, VarType::Integer, lower, upper)
    }

    /// Add a global constraint.
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        body: impl Into<Expr>,
        relation: Relation,
    ) -> ConstraintId {
        self.push_constraint(name.into(), body.into(), relation, None)
    }

    /// Add a disjunct together with its binary indicator variable.
    pub fn add_disjunct(&mut self, name: impl Into<String>) -> DisjunctId {
        let name = name.into();
        let indicator = self.add_binary(format!("{}.indicator_var", name));
        let id = DisjunctId(self.disjuncts.len());
        self.disjuncts.push(Disjunct {
            name,
            indicator,
            constraints: Vec::new(),
        });
        id
    }

    /// Add a constraint enforced only when `disjunct` is selected.
    pub fn add_disjunct_constraint(
        &mut self,
        disjunct: DisjunctId,
        name: impl Into<String>,
        body: impl Into<Expr>,
        relation: Relation,
    ) -> ConstraintId {
        let id = self.push_constraint(name.into(), body.into(), relation, Some(disjunct));
        self.disjuncts[disjunct.0].constraints.push(id);
        id
    }

    fn push_constraint(
        &mut self,
        name: String,
        body: Expr,
        relation: Relation,
        owner: Option<DisjunctId>,
    ) -> ConstraintId {
        let (lower, upper) = relation.bounds();
        let id = ConstraintId(self.constraints.len());
        self.constraints.push(Constraint {
            name,
            body,
            lower,
            upper,
            active: true,
            owner,
        });
        id
    }

    /// Add a disjunction over existing disjuncts.
    pub fn add_disjunction(
        &mut self,
        name: impl Into<String>,
        disjuncts: &[DisjunctId],
        xor: bool,
    ) -> DisjunctionId {
        let id = DisjunctionId(self.disjunctions.len());
        self.disjunctions.push(Disjunction {
            name: name.into(),
            disjuncts: disjuncts.to_vec(),
            xor,
        });
        id
    }

    /// Add an active objective.
    pub fn add_objective(&mut self, name: impl Into<String>, expr: impl Into<Expr>, sense: Sense) {
        self.objectives.push(Objective {
            name: name.into(),
            expr: expr.into(),
            sense,
            active: true,
        });
    }

    /// Add an active minimization objective named `obj`.
    pub fn minimize(&mut self, expr: impl Into<Expr>) {
        self.add_objective("obj", expr, Sense::Minimize);
    }

    /// Add an active maximization objective named `obj`.
    pub fn maximize(&mut self, expr: impl Into<Expr>) {
        self.add_objective("obj", expr, Sense::Maximize);
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Variable by id.
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    /// Mutable variable by id.
    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0]
    }

    /// Constraint by id.
    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.0]
    }

    /// Disjunct by id.
    pub fn disjunct(&self, id: DisjunctId) -> &Disjunct {
        &self.disjuncts[id.0]
    }

    /// Ids of all variables, in creation order.
    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(VarId)
    }

    /// Ids of all disjuncts, in creation order.
    pub fn disjunct_ids(&self) -> impl Iterator<Item = DisjunctId> {
        (0..self.disjuncts.len()).map(DisjunctId)
    }

    /// Ids of all active constraints, in creation order.
    pub fn active_constraint_ids(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active)
            .map(|(i, _)| ConstraintId(i))
    }

    /// The single active objective.
    pub fn active_objective(&self) -> Result<&Objective, ModelError> {
        let mut active = self.objectives.iter().filter(|o| o.active);
        match (active.next(), active.next()) {
            (Some(obj), None) => Ok(obj),
            _ => Err(ModelError::ObjectiveCount(
                self.objectives.iter().filter(|o| o.active).count(),
            )),
        }
    }

    /// True if `var` is the indicator of some disjunct.
    pub fn is_indicator(&self, var: VarId) -> bool {
        self.disjuncts.iter().any(|d| d.indicator == var)
    }

    /// Lower bounds of all variables (binary domains and fixing applied).
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.vars.iter().map(|v| v.bounds().0).collect()
    }

    /// Upper bounds of all variables (binary domains and fixing applied).
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.vars.iter().map(|v| v.bounds().1).collect()
    }

    /// Current values of all variables (unset values default into the domain).
    pub fn values(&self) -> Vec<f64> {
        self.vars.iter().map(Variable::value_or_default).collect()
    }

    /// Overwrite the values of all variables.
    pub fn set_values(&mut self, values: &[f64]) -> Result<(), ModelError> {
        if values.len() != self.vars.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.vars.len(),
                got: values.len(),
            });
        }
        for (var, &v) in self.vars.iter_mut().zip(values) {
            var.value = Some(v);
        }
        Ok(())
    }

    /// Fix a variable at a value.
    pub fn fix(&mut self, var: VarId, value: f64) {
        let v = self.var_mut(var);
        v.value = Some(value);
        v.fixed = true;
    }

    /// Release a fixed variable (its value is kept).
    pub fn unfix(&mut self, var: VarId) {
        self.var_mut(var).fixed = false;
    }

    /// Validate ids, bounds and disjunctive structure.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.vars.len();

        for var in &self.vars {
            if let (Some(l), Some(u)) = (var.lower, var.upper) {
                if l > u {
                    return Err(ModelError::InvalidBounds {
                        name: var.name.clone(),
                        lower: l,
                        upper: u,
                    });
                }
            }
        }

        let check_expr = |expr: &Expr| -> Result<(), ModelError> {
            match expr.variables().into_iter().find(|v| v.0 >= n) {
                Some(v) => Err(ModelError::UnknownId {
                    kind: "variable",
                    index: v.0,
                }),
                None => Ok(()),
            }
        };

        for con in &self.constraints {
            check_expr(&con.body)?;
            match (con.lower, con.upper) {
                (None, None) => return Err(ModelError::InvalidConstraint(con.name.clone())),
                (Some(l), Some(u)) if l > u => {
                    return Err(ModelError::InvalidConstraint(con.name.clone()))
                }
                _ => {}
            }
            if let Some(owner) = con.owner {
                if owner.0 >= self.disjuncts.len() {
                    return Err(ModelError::UnknownId {
                        kind: "disjunct",
                        index: owner.0,
                    });
                }
            }
        }

        for disjunct in &self.disjuncts {
            if disjunct.indicator.0 >= n {
                return Err(ModelError::UnknownId {
                    kind: "variable",
                    index: disjunct.indicator.0,
                });
            }
            if self.var(disjunct.indicator).var_type != VarType::Binary {
                return Err(ModelError::IndicatorNotBinary(disjunct.name.clone()));
            }
            if let Some(c) = disjunct
                .constraints
                .iter()
                .find(|c| c.0 >= self.constraints.len())
            {
                return Err(ModelError::UnknownId {
                    kind: "constraint",
                    index: c.0,
                });
            }
        }

        for disjunction in &self.disjunctions {
            if disjunction.disjuncts.is_empty() {
                return Err(ModelError::EmptyDisjunction(disjunction.name.clone()));
            }
            if let Some(d) = disjunction
                .disjuncts
                .iter()
                .find(|d| d.0 >= self.disjuncts.len())
            {
                return Err(ModelError::UnknownId {
                    kind: "disjunct",
                    index: d.0,
                });
            }
        }

        for obj in &self.objectives {
            check_expr(&obj.expr)?;
        }

        Ok(())
    }
}
