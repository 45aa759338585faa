//! Backend-agnostic row predicates.
//!
//! A [`Predicate`] describes a per-row boolean test without committing to an
//! execution model. Adapters compile it into a boolean mask (eager) or a
//! DataFusion expression (deferred). Comparisons follow SQL three-valued
//! logic: a comparison involving NULL is NULL, and [`Predicate::is_true`]
//! collapses NULL to false.

use crate::core::schema::{SchemaSnapshot, TypeClass};
use crate::error::{Result, StepcheckError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Utf8(String),
    Boolean(bool),
    Date(NaiveDate),
}

impl Literal {
    pub fn type_class(&self) -> TypeClass {
        match self {
            Self::Int(_) | Self::Float(_) => TypeClass::Numeric,
            Self::Utf8(_) => TypeClass::String,
            Self::Boolean(_) => TypeClass::Boolean,
            Self::Date(_) => TypeClass::Temporal,
        }
    }

    /// Returns the value as `f64` for numeric literals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "'{v}'"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "DATE '{v}'"),
        }
    }
}

macro_rules! literal_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Literal {
                fn from(v: $t) -> Self {
                    Literal::$variant(v.into())
                }
            }

            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Literal(v.into())
                }
            }
        )*
    };
}

literal_from!(
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    f32 => Float,
    bool => Boolean,
    String => Utf8,
    &str => Utf8,
    NaiveDate => Date,
);

/// One side of a comparison: a column reference or a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    Column(String),
    Literal(Literal),
}

impl From<Literal> for Operand {
    fn from(v: Literal) -> Self {
        Operand::Literal(v)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => write!(f, "{name}"),
            Self::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

/// References a column by name.
pub fn col(name: impl Into<String>) -> Operand {
    Operand::Column(name.into())
}

/// Wraps a constant.
pub fn lit(value: impl Into<Literal>) -> Operand {
    Operand::Literal(value.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    GtEq,
    Lt,
    LtEq,
    Eq,
    NotEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Eq => "=",
            Self::NotEq => "!=",
        }
    }
}

/// A per-row boolean test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    IsNull(Operand),
    IsNotNull(Operand),
    InSet {
        operand: Operand,
        values: Vec<Literal>,
        negated: bool,
    },
    Regex {
        operand: Operand,
        pattern: String,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    /// True only where the inner predicate is true; NULL becomes false.
    IsTrue(Box<Predicate>),
    Const(bool),
}

impl Operand {
    fn compare(self, op: CompareOp, other: impl Into<Operand>) -> Predicate {
        Predicate::Compare {
            left: self,
            op,
            right: other.into(),
        }
    }

    pub fn gt(self, other: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Gt, other)
    }

    pub fn gt_eq(self, other: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::GtEq, other)
    }

    pub fn lt(self, other: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Lt, other)
    }

    pub fn lt_eq(self, other: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::LtEq, other)
    }

    pub fn eq(self, other: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Eq, other)
    }

    pub fn not_eq(self, other: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::NotEq, other)
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull(self)
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNotNull(self)
    }

    pub fn in_set<L: Into<Literal>>(self, values: impl IntoIterator<Item = L>) -> Predicate {
        Predicate::InSet {
            operand: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_set<L: Into<Literal>>(self, values: impl IntoIterator<Item = L>) -> Predicate {
        Predicate::InSet {
            operand: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn matches(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Regex {
            operand: self,
            pattern: pattern.into(),
        }
    }

    pub fn column_name(&self) -> Option<&str> {
        match self {
            Self::Column(name) => Some(name),
            Self::Literal(_) => None,
        }
    }

    fn type_class(&self, schema: &SchemaSnapshot) -> Result<TypeClass> {
        match self {
            Self::Column(name) => Ok(TypeClass::of(schema.data_type(name)?)),
            Self::Literal(lit) => Ok(lit.type_class()),
        }
    }
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn is_true(self) -> Predicate {
        match self {
            already @ Predicate::IsTrue(_) => already,
            other => Predicate::IsTrue(Box::new(other)),
        }
    }

    /// Column names referenced anywhere in the predicate, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        fn push<'a>(out: &mut Vec<&'a str>, operand: &'a Operand) {
            if let Some(name) = operand.column_name() {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        match self {
            Predicate::Compare { left, right, .. } => {
                push(out, left);
                push(out, right);
            }
            Predicate::IsNull(o) | Predicate::IsNotNull(o) => push(out, o),
            Predicate::InSet { operand, .. } | Predicate::Regex { operand, .. } => {
                push(out, operand)
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Predicate::Not(p) | Predicate::IsTrue(p) => p.collect_columns(out),
            Predicate::Const(_) => {}
        }
    }

    /// Checks column existence and operand compatibility against a schema.
    ///
    /// Fails with `ColumnNotFound` or `TypeMismatch`; never coerces across
    /// type classes.
    pub fn check_types(&self, schema: &SchemaSnapshot) -> Result<()> {
        match self {
            Predicate::Compare { left, right, .. } => {
                let l = left.type_class(schema)?;
                let r = right.type_class(schema)?;
                if l == TypeClass::Other || l != r {
                    return Err(mismatch(left, l, right, r));
                }
                Ok(())
            }
            Predicate::IsNull(o) | Predicate::IsNotNull(o) => o.type_class(schema).map(|_| ()),
            Predicate::InSet {
                operand, values, ..
            } => {
                let class = operand.type_class(schema)?;
                for value in values {
                    let v = value.type_class();
                    if class == TypeClass::Other || v != class {
                        return Err(StepcheckError::type_mismatch(
                            format!("{v} value for {operand}"),
                            class.as_str(),
                        ));
                    }
                }
                Ok(())
            }
            Predicate::Regex { operand, .. } => {
                let class = operand.type_class(schema)?;
                if class != TypeClass::String {
                    return Err(StepcheckError::type_mismatch(
                        format!("string column for regex on {operand}"),
                        class.as_str(),
                    ));
                }
                Ok(())
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.check_types(schema)?;
                b.check_types(schema)
            }
            Predicate::Not(p) | Predicate::IsTrue(p) => p.check_types(schema),
            Predicate::Const(_) => Ok(()),
        }
    }
}

fn mismatch(left: &Operand, l: TypeClass, right: &Operand, r: TypeClass) -> StepcheckError {
    StepcheckError::type_mismatch(format!("{l} operand for {left}"), format!("{r} ({right})"))
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Predicate::IsNull(o) => write!(f, "{o} IS NULL"),
            Predicate::IsNotNull(o) => write!(f, "{o} IS NOT NULL"),
            Predicate::InSet {
                operand,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{operand} {not}IN ({})", list.join(", "))
            }
            Predicate::Regex { operand, pattern } => write!(f, "{operand} ~ '{pattern}'"),
            Predicate::And(a, b) => write!(f, "({a} AND {b})"),
            Predicate::Or(a, b) => write!(f, "({a} OR {b})"),
            Predicate::Not(p) => write!(f, "NOT ({p})"),
            Predicate::IsTrue(p) => write!(f, "({p}) IS TRUE"),
            Predicate::Const(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::from_arrow(&Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
            Field::new("c", DataType::Float64, true),
            Field::new("day", DataType::Date32, true),
        ]))
    }

    #[test]
    fn test_builders_and_display() {
        let p = col("a").gt(100).and(col("b").matches("^x"));
        assert_eq!(p.to_string(), "(a > 100 AND b ~ '^x')");
        assert_eq!(p.columns(), vec!["a", "b"]);

        let p = !col("b").in_set(["x", "y"]);
        assert_eq!(p.to_string(), "NOT (b IN ('x', 'y'))");
    }

    #[test]
    fn test_numeric_classes_are_comparable() {
        let schema = snapshot();
        assert!(col("a").gt(1.5).check_types(&schema).is_ok());
        assert!(col("c").lt_eq(3).check_types(&schema).is_ok());
        assert!(col("a").eq(col("c")).check_types(&schema).is_ok());
    }

    #[test]
    fn test_cross_class_comparison_is_mismatch() {
        let schema = snapshot();
        let date_vs_string = col("day").gt("2024-01-01");
        assert!(matches!(
            date_vs_string.check_types(&schema),
            Err(StepcheckError::TypeMismatch { .. })
        ));

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(col("day").gt(date).check_types(&schema).is_ok());

        assert!(col("a").matches("x").check_types(&schema).is_err());
        assert!(col("b").in_set([1, 2]).check_types(&schema).is_err());
    }

    #[test]
    fn test_missing_column() {
        let schema = snapshot();
        assert!(matches!(
            col("zzz").is_null().check_types(&schema),
            Err(StepcheckError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_is_true_is_idempotent() {
        let p = col("a").gt(1).is_true().is_true();
        assert_eq!(p.to_string(), "(a > 1) IS TRUE");
    }
}
