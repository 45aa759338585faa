//! Step definitions: one declared validation rule each.

use crate::core::expr::{col, CompareOp, Literal, Operand, Predicate};
use crate::core::schema::{Schema, TypeClass};
use crate::core::thresholds::Thresholds;
use crate::error::{Result, StepcheckError};
use crate::security::InputSecurity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The operation a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ColValsGt,
    ColValsLt,
    ColValsEq,
    ColValsNe,
    ColValsGe,
    ColValsLe,
    ColValsBetween,
    ColValsOutside,
    ColValsInSet,
    ColValsNotInSet,
    ColValsNull,
    ColValsNotNull,
    ColValsRegex,
    ColValsExpr,
    ColExists,
    RowCountMatch,
    ColSchemaMatch,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ColValsGt => "col_vals_gt",
            Self::ColValsLt => "col_vals_lt",
            Self::ColValsEq => "col_vals_eq",
            Self::ColValsNe => "col_vals_ne",
            Self::ColValsGe => "col_vals_ge",
            Self::ColValsLe => "col_vals_le",
            Self::ColValsBetween => "col_vals_between",
            Self::ColValsOutside => "col_vals_outside",
            Self::ColValsInSet => "col_vals_in_set",
            Self::ColValsNotInSet => "col_vals_not_in_set",
            Self::ColValsNull => "col_vals_null",
            Self::ColValsNotNull => "col_vals_not_null",
            Self::ColValsRegex => "col_vals_regex",
            Self::ColValsExpr => "col_vals_expr",
            Self::ColExists => "col_exists",
            Self::RowCountMatch => "row_count_match",
            Self::ColSchemaMatch => "col_schema_match",
        }
    }

    /// Steps whose units are rows, and which therefore support extraction.
    pub fn is_row_based(&self) -> bool {
        !matches!(
            self,
            Self::ColExists | Self::RowCountMatch | Self::ColSchemaMatch
        )
    }

    /// Steps that evaluate one result per target column.
    pub fn requires_columns(&self) -> bool {
        !matches!(
            self,
            Self::ColValsExpr | Self::RowCountMatch | Self::ColSchemaMatch
        )
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self {
            Self::ColValsGt => Some(CompareOp::Gt),
            Self::ColValsLt => Some(CompareOp::Lt),
            Self::ColValsEq => Some(CompareOp::Eq),
            Self::ColValsNe => Some(CompareOp::NotEq),
            Self::ColValsGe => Some(CompareOp::GtEq),
            Self::ColValsLe => Some(CompareOp::LtEq),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The comparison operand(s) of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepValues {
    None,
    Single(Operand),
    Range { left: Operand, right: Operand },
    Set(Vec<Literal>),
    Pattern(String),
    Expr(Predicate),
    Count(u64),
    Schema(Schema),
}

impl fmt::Display for StepValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Single(op) => write!(f, "{op}"),
            Self::Range { left, right } => write!(f, "[{left}, {right}]"),
            Self::Set(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Pattern(p) => write!(f, "{p}"),
            Self::Expr(p) => write!(f, "{p}"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Schema(s) => write!(f, "{s}"),
        }
    }
}

/// Target columns of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Columns(Vec<String>);

impl Columns {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for Columns {
    fn from(c: &str) -> Self {
        Self(vec![c.to_string()])
    }
}

impl From<String> for Columns {
    fn from(c: String) -> Self {
        Self(vec![c])
    }
}

impl From<Vec<String>> for Columns {
    fn from(c: Vec<String>) -> Self {
        Self(c)
    }
}

impl From<Vec<&str>> for Columns {
    fn from(c: Vec<&str>) -> Self {
        Self(c.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Columns {
    fn from(c: [&str; N]) -> Self {
        Self(c.into_iter().map(String::from).collect())
    }
}

/// An immutable validation rule.
///
/// Definitions are assembled with the `with_*` methods and then handed to a
/// plan, which assigns the ordinal id and freezes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    id: usize,
    kind: StepKind,
    columns: Vec<String>,
    values: StepValues,
    na_pass: bool,
    inclusive: (bool, bool),
    precondition: Option<Predicate>,
    thresholds: Option<Thresholds>,
    label: Option<String>,
    brief: Option<String>,
    active: bool,
}

impl StepDefinition {
    pub fn new(kind: StepKind, columns: impl Into<Columns>, values: StepValues) -> Self {
        Self {
            id: 0,
            kind,
            columns: columns.into().0,
            values,
            na_pass: false,
            inclusive: (true, true),
            precondition: None,
            thresholds: None,
            label: None,
            brief: None,
            active: true,
        }
    }

    pub fn with_na_pass(mut self, na_pass: bool) -> Self {
        self.na_pass = na_pass;
        self
    }

    pub fn with_inclusive(mut self, left: bool, right: bool) -> Self {
        self.inclusive = (left, right);
        self
    }

    pub fn with_precondition(mut self, precondition: Predicate) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = Some(brief.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub(crate) fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn inherit_thresholds(mut self, defaults: &Thresholds) -> Self {
        if self.thresholds.is_none() && !defaults.is_empty() {
            self.thresholds = Some(*defaults);
        }
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &StepValues {
        &self.values
    }

    pub fn na_pass(&self) -> bool {
        self.na_pass
    }

    pub fn inclusive(&self) -> (bool, bool) {
        self.inclusive
    }

    pub fn precondition(&self) -> Option<&Predicate> {
        self.precondition.as_ref()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds.unwrap_or_default()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn brief(&self) -> Option<&str> {
        self.brief.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// SHA-256 over the definition's semantic fields, hex encoded.
    ///
    /// Two definitions with the same fingerprint check the same thing; the
    /// ordinal id and label do not participate.
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::json!({
            "kind": self.kind,
            "columns": self.columns,
            "values": self.values,
            "na_pass": self.na_pass,
            "inclusive": self.inclusive,
            "precondition": self.precondition,
            "thresholds": self.thresholds,
            "active": self.active,
        });
        hex::encode(Sha256::digest(payload.to_string().as_bytes()))
    }

    /// Checks the definition for configuration errors. No data is touched.
    ///
    /// Rejected identifiers and patterns are reported as
    /// [`StepcheckError::Configuration`] like every other malformed step.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(|e| match e {
            StepcheckError::SecurityError(message) => config(self.kind, &message),
            other => other,
        })
    }

    fn check(&self) -> Result<()> {
        let kind = self.kind;

        if kind.requires_columns() && self.columns.is_empty() {
            return Err(config(kind, "requires at least one column"));
        }
        if !kind.requires_columns() && !self.columns.is_empty() {
            return Err(config(kind, "is a table-level check and takes no columns"));
        }
        for (i, column) in self.columns.iter().enumerate() {
            InputSecurity::validate_column_name(column)?;
            if self.columns[..i].contains(column) {
                return Err(config(kind, &format!("lists column '{column}' twice")));
            }
        }

        if self.precondition.is_some()
            && matches!(kind, StepKind::ColExists | StepKind::ColSchemaMatch)
        {
            return Err(config(kind, "does not accept a precondition"));
        }

        match (&self.values, kind) {
            (StepValues::Single(_), k) if k.compare_op().is_some() => Ok(()),
            (StepValues::Range { left, right }, StepKind::ColValsBetween | StepKind::ColValsOutside) => {
                validate_range(kind, left, right)
            }
            (StepValues::Set(values), StepKind::ColValsInSet | StepKind::ColValsNotInSet) => {
                validate_set(kind, values)
            }
            (StepValues::Pattern(pattern), StepKind::ColValsRegex) => {
                InputSecurity::validate_regex_pattern(pattern).map(|_| ())
            }
            (
                StepValues::None,
                StepKind::ColValsNull | StepKind::ColValsNotNull | StepKind::ColExists,
            ) => Ok(()),
            (StepValues::Expr(_), StepKind::ColValsExpr) => Ok(()),
            (StepValues::Count(_), StepKind::RowCountMatch) => Ok(()),
            (StepValues::Schema(_), StepKind::ColSchemaMatch) => Ok(()),
            (values, kind) => Err(config(
                kind,
                &format!("cannot take operand '{values}'"),
            )),
        }?;

        if let Some(p) = &self.precondition {
            validate_predicate_patterns(p)?;
        }
        if let StepValues::Expr(p) = &self.values {
            validate_predicate_patterns(p)?;
        }

        Ok(())
    }

    /// Per-row pass predicate for one expanded column, NULL collapsed to false.
    ///
    /// Returns `None` for table-level steps.
    pub(crate) fn pass_predicate(&self, column: Option<&str>) -> Option<Predicate> {
        if let (StepKind::ColValsExpr, StepValues::Expr(p)) = (self.kind, &self.values) {
            return Some(p.clone().is_true());
        }
        if !self.kind.is_row_based() {
            return None;
        }
        let target = col(column?);

        let (check, operands): (Predicate, Vec<&Operand>) = match (self.kind, &self.values) {
            (StepKind::ColValsNull, _) => return Some(target.is_null()),
            (StepKind::ColValsNotNull, _) => return Some(target.is_not_null()),
            (k, StepValues::Single(op)) => {
                let cmp = k.compare_op()?;
                (
                    Predicate::Compare {
                        left: target.clone(),
                        op: cmp,
                        right: op.clone(),
                    },
                    vec![op],
                )
            }
            (StepKind::ColValsBetween, StepValues::Range { left, right }) => {
                let lower = if self.inclusive.0 {
                    target.clone().gt_eq(left.clone())
                } else {
                    target.clone().gt(left.clone())
                };
                let upper = if self.inclusive.1 {
                    target.clone().lt_eq(right.clone())
                } else {
                    target.clone().lt(right.clone())
                };
                (lower.and(upper), vec![left, right])
            }
            (StepKind::ColValsOutside, StepValues::Range { left, right }) => {
                // An inclusive bound belongs to the range, so landing on it fails.
                let lower = if self.inclusive.0 {
                    target.clone().lt(left.clone())
                } else {
                    target.clone().lt_eq(left.clone())
                };
                let upper = if self.inclusive.1 {
                    target.clone().gt(right.clone())
                } else {
                    target.clone().gt_eq(right.clone())
                };
                (lower.or(upper), vec![left, right])
            }
            (StepKind::ColValsInSet, StepValues::Set(values)) => {
                (target.clone().in_set(values.clone()), vec![])
            }
            (StepKind::ColValsNotInSet, StepValues::Set(values)) => {
                (target.clone().not_in_set(values.clone()), vec![])
            }
            (StepKind::ColValsRegex, StepValues::Pattern(p)) => {
                (target.clone().matches(p.clone()), vec![])
            }
            _ => return None,
        };

        let pass = check.is_true();
        if !self.na_pass {
            return Some(pass);
        }
        let nulls = operands
            .into_iter()
            .filter(|op| op.column_name().is_some())
            .fold(target.is_null(), |acc, op| acc.or(op.clone().is_null()));
        Some(nulls.or(pass))
    }

    /// Row restriction from the precondition, NULL collapsed to false.
    pub(crate) fn applicable_predicate(&self) -> Option<Predicate> {
        self.precondition.clone().map(Predicate::is_true)
    }
}

fn config(kind: StepKind, message: &str) -> StepcheckError {
    StepcheckError::configuration(format!("Step '{kind}' {message}"))
}

fn literal_class(operand: &Operand) -> Option<TypeClass> {
    match operand {
        Operand::Literal(lit) => Some(lit.type_class()),
        Operand::Column(_) => None,
    }
}

fn validate_range(kind: StepKind, left: &Operand, right: &Operand) -> Result<()> {
    if let (Some(l), Some(r)) = (literal_class(left), literal_class(right)) {
        if l != r {
            return Err(config(
                kind,
                &format!("has bounds of different types ({l} and {r})"),
            ));
        }
    }
    if let (Operand::Literal(l), Operand::Literal(r)) = (left, right) {
        let ordered = match (l, r) {
            (Literal::Utf8(a), Literal::Utf8(b)) => a <= b,
            (Literal::Date(a), Literal::Date(b)) => a <= b,
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => a <= b,
                _ => true,
            },
        };
        if !ordered {
            return Err(config(
                kind,
                &format!("has a left bound {l} above the right bound {r}"),
            ));
        }
    }
    Ok(())
}

fn validate_set(kind: StepKind, values: &[Literal]) -> Result<()> {
    let Some(first) = values.first() else {
        return Err(config(kind, "requires a non-empty set of values"));
    };
    let class = first.type_class();
    if values.iter().any(|v| v.type_class() != class) {
        return Err(config(kind, "has set values of mixed types"));
    }
    Ok(())
}

fn validate_predicate_patterns(p: &Predicate) -> Result<()> {
    match p {
        Predicate::Regex { pattern, .. } => InputSecurity::validate_regex_pattern(pattern).map(|_| ()),
        Predicate::InSet { values, .. } if values.is_empty() => Err(StepcheckError::configuration(
            "Set membership needs at least one value",
        )),
        Predicate::And(a, b) | Predicate::Or(a, b) => {
            validate_predicate_patterns(a)?;
            validate_predicate_patterns(b)
        }
        Predicate::Not(inner) | Predicate::IsTrue(inner) => validate_predicate_patterns(inner),
        _ => Ok(()),
    }
}
