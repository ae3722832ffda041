//! Expression algebra for Quill logical plans.
//!
//! Expressions are immutable trees with `Arc`-shared children. Rewrites
//! return a new tree that reuses every unchanged subtree, so convergence
//! checks can use pointer equality as a fast path before falling back to
//! structural comparison.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arrow_schema::DataType;
use quill_common::{AttrId, Result};
use serde::{Deserialize, Serialize};

/// Compile-time scalar values carried by literals and produced by folding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// The distinguished null marker. Its type lives on the enclosing literal.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
}

impl LiteralValue {
    /// Natural datatype of the value. Null reports [`DataType::Null`]; the
    /// enclosing literal may carry a more specific type.
    pub fn data_type(&self) -> DataType {
        match self {
            LiteralValue::Null => DataType::Null,
            LiteralValue::Boolean(_) => DataType::Boolean,
            LiteralValue::Int32(_) => DataType::Int32,
            LiteralValue::Int64(_) => DataType::Int64,
            LiteralValue::Float64(_) => DataType::Float64,
            LiteralValue::Utf8(_) => DataType::Utf8,
        }
    }

    /// Whether this value is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, LiteralValue::Null)
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => write!(f, "NULL"),
            LiteralValue::Boolean(v) => write!(f, "{v}"),
            LiteralValue::Int32(v) => write!(f, "{v}"),
            LiteralValue::Int64(v) => write!(f, "{v}"),
            LiteralValue::Float64(v) => write!(f, "{v}"),
            LiteralValue::Utf8(v) => write!(f, "'{v}'"),
        }
    }
}

/// A named, typed column produced by a plan node.
///
/// Identity is the [`AttrId`], not the name: alias substitution and
/// self-join detection key off ids, and renames mint a fresh id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Display name.
    pub name: String,
    /// Column datatype.
    pub data_type: DataType,
    /// Whether the column may hold null.
    pub nullable: bool,
    /// Stable identity stamped at first resolution.
    pub id: AttrId,
}

impl Attribute {
    /// Create an attribute with a freshly stamped id.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            id: AttrId::next(),
        }
    }

    /// Reference this attribute from an expression.
    pub fn to_column(&self) -> Expr {
        Expr::ColumnRef(self.clone())
    }

    /// Same attribute with nullability overridden (outer-join schemas).
    pub fn with_nullable(&self, nullable: bool) -> Attribute {
        Attribute {
            nullable,
            ..self.clone()
        }
    }
}

/// Binary operator kinds shared by comparisons and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl BinaryOp {
    /// Whether this operator yields a boolean.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Whether this operator yields a numeric result.
    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison()
    }

    /// The comparison with inverted truth table, if any.
    pub fn negated(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::NotEq),
            BinaryOp::NotEq => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::GtEq),
            BinaryOp::LtEq => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::LtEq),
            BinaryOp::GtEq => Some(BinaryOp::Lt),
            _ => None,
        }
    }

    /// Operator symbol for plan rendering.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }
}

/// A logical expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Constant value. `data_type` may be more specific than the value's
    /// natural type (a typed null).
    Literal {
        /// The value, possibly the null marker.
        value: LiteralValue,
        /// Declared datatype of the literal.
        data_type: DataType,
    },
    /// Unresolved column name, as produced by the parser.
    Column(String),
    /// Resolved reference to a concrete attribute.
    ColumnRef(Attribute),
    /// Unresolved `*` projection; expanded by analysis.
    Star,
    /// Renaming. The alias produces a new attribute carrying `id`.
    Alias {
        /// Renamed expression.
        child: Arc<Expr>,
        /// New display name.
        name: String,
        /// Identity of the attribute this alias produces.
        id: AttrId,
    },
    /// Explicit type conversion.
    Cast {
        /// Converted expression.
        child: Arc<Expr>,
        /// Target datatype.
        to_type: DataType,
    },
    /// Logical negation.
    Not(Arc<Expr>),
    /// Logical conjunction (Kleene three-valued).
    And(Arc<Expr>, Arc<Expr>),
    /// Logical disjunction (Kleene three-valued).
    Or(Arc<Expr>, Arc<Expr>),
    /// Binary comparison or arithmetic.
    BinaryOp {
        /// Left operand.
        left: Arc<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Arc<Expr>,
    },
    /// Conditional. A null condition selects the `otherwise` branch.
    If {
        /// Boolean condition.
        cond: Arc<Expr>,
        /// Value when the condition is true.
        then: Arc<Expr>,
        /// Value when the condition is false or null.
        otherwise: Arc<Expr>,
    },
    /// First non-null argument.
    Coalesce(Vec<Arc<Expr>>),
    /// Null test; never yields null itself.
    IsNull(Arc<Expr>),
    /// Non-null test; never yields null itself.
    IsNotNull(Arc<Expr>),
}

/// Partial expression rewriter: `None` means "no match, keep the node".
pub type ExprRewriter<'a> = &'a dyn Fn(&Arc<Expr>) -> Option<Arc<Expr>>;

/// Fallible partial expression rewriter.
pub type TryExprRewriter<'a> = &'a dyn Fn(&Arc<Expr>) -> Result<Option<Arc<Expr>>>;

impl Expr {
    /// Literal with its natural datatype.
    pub fn literal(value: LiteralValue) -> Expr {
        let data_type = value.data_type();
        Expr::Literal { value, data_type }
    }

    /// Boolean literal.
    pub fn boolean(value: bool) -> Expr {
        Expr::literal(LiteralValue::Boolean(value))
    }

    /// Int64 literal.
    pub fn int64(value: i64) -> Expr {
        Expr::literal(LiteralValue::Int64(value))
    }

    /// Null literal declared with a concrete datatype.
    pub fn typed_null(data_type: DataType) -> Expr {
        Expr::Literal {
            value: LiteralValue::Null,
            data_type,
        }
    }

    /// Alias with a freshly stamped attribute id.
    pub fn alias(child: Arc<Expr>, name: impl Into<String>) -> Expr {
        Expr::Alias {
            child,
            name: name.into(),
            id: AttrId::next(),
        }
    }

    /// Declared datatype of the expression.
    ///
    /// Unresolved nodes report [`DataType::Null`]; callers gate on
    /// [`Expr::resolved`] before trusting the answer.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Literal { data_type, .. } => data_type.clone(),
            Expr::Column(_) | Expr::Star => DataType::Null,
            Expr::ColumnRef(attr) => attr.data_type.clone(),
            Expr::Alias { child, .. } => child.data_type(),
            Expr::Cast { to_type, .. } => to_type.clone(),
            Expr::Not(_) | Expr::And(..) | Expr::Or(..) => DataType::Boolean,
            Expr::BinaryOp { left, op, .. } => {
                if op.is_comparison() {
                    DataType::Boolean
                } else {
                    left.data_type()
                }
            }
            Expr::If { then, .. } => then.data_type(),
            Expr::Coalesce(args) => args
                .first()
                .map(|a| a.data_type())
                .unwrap_or(DataType::Null),
            Expr::IsNull(_) | Expr::IsNotNull(_) => DataType::Boolean,
        }
    }

    /// Whether the expression may evaluate to null.
    pub fn nullable(&self) -> bool {
        match self {
            Expr::Literal { value, .. } => value.is_null(),
            Expr::Column(_) | Expr::Star => true,
            Expr::ColumnRef(attr) => attr.nullable,
            Expr::Alias { child, .. } | Expr::Cast { child, .. } => child.nullable(),
            Expr::Not(child) => child.nullable(),
            Expr::And(l, r) | Expr::Or(l, r) => l.nullable() || r.nullable(),
            Expr::BinaryOp { left, right, .. } => left.nullable() || right.nullable(),
            Expr::If {
                then, otherwise, ..
            } => then.nullable() || otherwise.nullable(),
            Expr::Coalesce(args) => args.iter().all(|a| a.nullable()),
            Expr::IsNull(_) | Expr::IsNotNull(_) => false,
        }
    }

    /// Whether the value is determined at compile time (all leaves literal).
    pub fn foldable(&self) -> bool {
        match self {
            Expr::Literal { .. } => true,
            Expr::Column(_) | Expr::ColumnRef(_) | Expr::Star => false,
            Expr::Coalesce(args) => !args.is_empty() && args.iter().all(|a| a.foldable()),
            other => {
                let children = other.children();
                !children.is_empty() && children.iter().all(|c| c.foldable())
            }
        }
    }

    /// Whether the subtree is free of unresolved names and stars.
    pub fn resolved(&self) -> bool {
        match self {
            Expr::Column(_) | Expr::Star => false,
            Expr::Literal { .. } | Expr::ColumnRef(_) => true,
            other => other.children().iter().all(|c| c.resolved()),
        }
    }

    /// Whether the subtree is resolved and every operator signature is
    /// satisfied by its child datatypes, with casts explicit.
    pub fn strictly_typed(&self) -> bool {
        if !self.children().iter().all(|c| c.strictly_typed()) {
            return false;
        }
        match self {
            Expr::Column(_) | Expr::Star => false,
            Expr::Literal { value, data_type } => {
                value.is_null() || value.data_type() == *data_type
            }
            Expr::ColumnRef(_) | Expr::Alias { .. } | Expr::Cast { .. } => true,
            Expr::Not(child) => child.data_type() == DataType::Boolean,
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.data_type() == DataType::Boolean && r.data_type() == DataType::Boolean
            }
            Expr::BinaryOp { left, op, right } => {
                let (lt, rt) = (left.data_type(), right.data_type());
                if op.is_arithmetic() {
                    lt == rt && is_numeric(&lt)
                } else {
                    lt == rt
                }
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.data_type() == DataType::Boolean
                    && then.data_type() == otherwise.data_type()
            }
            Expr::Coalesce(args) => match args.split_first() {
                Some((head, rest)) => {
                    let dt = head.data_type();
                    rest.iter().all(|a| a.data_type() == dt)
                }
                None => false,
            },
            Expr::IsNull(_) | Expr::IsNotNull(_) => true,
        }
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<Arc<Expr>> {
        match self {
            Expr::Literal { .. } | Expr::Column(_) | Expr::ColumnRef(_) | Expr::Star => vec![],
            Expr::Alias { child, .. }
            | Expr::Cast { child, .. }
            | Expr::Not(child)
            | Expr::IsNull(child)
            | Expr::IsNotNull(child) => vec![Arc::clone(child)],
            Expr::And(l, r) | Expr::Or(l, r) => vec![Arc::clone(l), Arc::clone(r)],
            Expr::BinaryOp { left, right, .. } => vec![Arc::clone(left), Arc::clone(right)],
            Expr::If {
                cond,
                then,
                otherwise,
            } => vec![Arc::clone(cond), Arc::clone(then), Arc::clone(otherwise)],
            Expr::Coalesce(args) => args.iter().map(Arc::clone).collect(),
        }
    }

    /// Ids of every attribute the expression reads.
    pub fn references(&self) -> HashSet<AttrId> {
        let mut out = HashSet::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut HashSet<AttrId>) {
        if let Expr::ColumnRef(attr) = self {
            out.insert(attr.id);
        }
        for child in self.children() {
            child.collect_references(out);
        }
    }

    /// The attribute this expression produces when used as a projection.
    ///
    /// Only column references and aliases are named; analysis wraps anything
    /// else in an implicit alias before the output schema is consulted.
    pub fn to_attribute(&self) -> Option<Attribute> {
        match self {
            Expr::ColumnRef(attr) => Some(attr.clone()),
            Expr::Alias { child, name, id } => Some(Attribute {
                name: name.clone(),
                data_type: child.data_type(),
                nullable: child.nullable(),
                id: *id,
            }),
            _ => None,
        }
    }

    /// Structural equality modulo alias naming. Attributes compare by id.
    pub fn same_or_equal(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Alias { child, .. }, _) => child.same_or_equal(other),
            (_, Expr::Alias { child, .. }) => self.same_or_equal(child),
            (Expr::ColumnRef(a), Expr::ColumnRef(b)) => a.id == b.id,
            (
                Expr::Literal {
                    value: v1,
                    data_type: t1,
                },
                Expr::Literal {
                    value: v2,
                    data_type: t2,
                },
            ) => v1 == v2 && t1 == t2,
            (Expr::Column(a), Expr::Column(b)) => a == b,
            (Expr::Star, Expr::Star) => true,
            (
                Expr::Cast {
                    child: c1,
                    to_type: t1,
                },
                Expr::Cast {
                    child: c2,
                    to_type: t2,
                },
            ) => t1 == t2 && c1.same_or_equal(c2),
            (Expr::Not(a), Expr::Not(b))
            | (Expr::IsNull(a), Expr::IsNull(b))
            | (Expr::IsNotNull(a), Expr::IsNotNull(b)) => a.same_or_equal(b),
            (Expr::And(l1, r1), Expr::And(l2, r2))
            | (Expr::Or(l1, r1), Expr::Or(l2, r2)) => {
                l1.same_or_equal(l2) && r1.same_or_equal(r2)
            }
            (
                Expr::BinaryOp {
                    left: l1,
                    op: o1,
                    right: r1,
                },
                Expr::BinaryOp {
                    left: l2,
                    op: o2,
                    right: r2,
                },
            ) => o1 == o2 && l1.same_or_equal(l2) && r1.same_or_equal(r2),
            (
                Expr::If {
                    cond: c1,
                    then: t1,
                    otherwise: e1,
                },
                Expr::If {
                    cond: c2,
                    then: t2,
                    otherwise: e2,
                },
            ) => c1.same_or_equal(c2) && t1.same_or_equal(t2) && e1.same_or_equal(e2),
            (Expr::Coalesce(a), Expr::Coalesce(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.same_or_equal(y))
            }
            _ => false,
        }
    }

    /// Compile-time value of the expression under three-valued logic.
    ///
    /// Meaningful only when [`Expr::foldable`] holds. Returns `None` when
    /// the value cannot be computed at compile time (non-literal leaves,
    /// overflow, division by zero, unsupported casts); folding then keeps
    /// the expression as written.
    pub fn evaluate(&self) -> Option<LiteralValue> {
        match self {
            Expr::Literal { value, .. } => Some(value.clone()),
            Expr::Alias { child, .. } => child.evaluate(),
            Expr::Cast { child, to_type } => eval_cast(&child.evaluate()?, to_type),
            Expr::Not(child) => match child.evaluate()? {
                LiteralValue::Null => Some(LiteralValue::Null),
                LiteralValue::Boolean(b) => Some(LiteralValue::Boolean(!b)),
                _ => None,
            },
            Expr::And(l, r) => eval_and(l.evaluate()?, r.evaluate()?),
            Expr::Or(l, r) => eval_or(l.evaluate()?, r.evaluate()?),
            Expr::BinaryOp { left, op, right } => {
                let (lv, rv) = (left.evaluate()?, right.evaluate()?);
                if lv.is_null() || rv.is_null() {
                    return Some(LiteralValue::Null);
                }
                eval_binary(&lv, *op, &rv)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => match cond.evaluate()? {
                LiteralValue::Boolean(true) => then.evaluate(),
                LiteralValue::Boolean(false) | LiteralValue::Null => otherwise.evaluate(),
                _ => None,
            },
            Expr::Coalesce(args) => {
                for arg in args {
                    let v = arg.evaluate()?;
                    if !v.is_null() {
                        return Some(v);
                    }
                }
                Some(LiteralValue::Null)
            }
            Expr::IsNull(child) => Some(LiteralValue::Boolean(child.evaluate()?.is_null())),
            Expr::IsNotNull(child) => Some(LiteralValue::Boolean(!child.evaluate()?.is_null())),
            Expr::Column(_) | Expr::ColumnRef(_) | Expr::Star => None,
        }
    }

    /// Rebuild this node with each child mapped through `f`, reusing the
    /// original allocation when nothing changed.
    pub fn map_children(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<Expr>) -> Arc<Expr>,
    ) -> Arc<Expr> {
        self.try_map_children(&mut |c| Ok(f(c)))
            .unwrap_or_else(|_| Arc::clone(self))
    }

    /// Fallible form of [`Expr::map_children`].
    pub fn try_map_children(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<Expr>) -> Result<Arc<Expr>>,
    ) -> Result<Arc<Expr>> {
        match self.as_ref() {
            Expr::Literal { .. } | Expr::Column(_) | Expr::ColumnRef(_) | Expr::Star => {
                Ok(Arc::clone(self))
            }
            Expr::Alias { child, name, id } => {
                let new = f(child)?;
                if Arc::ptr_eq(&new, child) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::Alias {
                        child: new,
                        name: name.clone(),
                        id: *id,
                    }))
                }
            }
            Expr::Cast { child, to_type } => {
                let new = f(child)?;
                if Arc::ptr_eq(&new, child) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::Cast {
                        child: new,
                        to_type: to_type.clone(),
                    }))
                }
            }
            Expr::Not(child) => {
                let new = f(child)?;
                if Arc::ptr_eq(&new, child) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::Not(new)))
                }
            }
            Expr::IsNull(child) => {
                let new = f(child)?;
                if Arc::ptr_eq(&new, child) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::IsNull(new)))
                }
            }
            Expr::IsNotNull(child) => {
                let new = f(child)?;
                if Arc::ptr_eq(&new, child) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::IsNotNull(new)))
                }
            }
            Expr::And(l, r) => {
                let (nl, nr) = (f(l)?, f(r)?);
                if Arc::ptr_eq(&nl, l) && Arc::ptr_eq(&nr, r) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::And(nl, nr)))
                }
            }
            Expr::Or(l, r) => {
                let (nl, nr) = (f(l)?, f(r)?);
                if Arc::ptr_eq(&nl, l) && Arc::ptr_eq(&nr, r) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::Or(nl, nr)))
                }
            }
            Expr::BinaryOp { left, op, right } => {
                let (nl, nr) = (f(left)?, f(right)?);
                if Arc::ptr_eq(&nl, left) && Arc::ptr_eq(&nr, right) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::BinaryOp {
                        left: nl,
                        op: *op,
                        right: nr,
                    }))
                }
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let (nc, nt, ne) = (f(cond)?, f(then)?, f(otherwise)?);
                if Arc::ptr_eq(&nc, cond)
                    && Arc::ptr_eq(&nt, then)
                    && Arc::ptr_eq(&ne, otherwise)
                {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(Expr::If {
                        cond: nc,
                        then: nt,
                        otherwise: ne,
                    }))
                }
            }
            Expr::Coalesce(args) => {
                let mut changed = false;
                let mut new_args = Vec::with_capacity(args.len());
                for arg in args {
                    let new = f(arg)?;
                    changed |= !Arc::ptr_eq(&new, arg);
                    new_args.push(new);
                }
                if changed {
                    Ok(Arc::new(Expr::Coalesce(new_args)))
                } else {
                    Ok(Arc::clone(self))
                }
            }
        }
    }

    /// Pre-order rewrite: apply `f` at this node, then recurse into the
    /// children of the result.
    pub fn transform_down(self: &Arc<Self>, f: ExprRewriter<'_>) -> Arc<Expr> {
        let node = f(self).unwrap_or_else(|| Arc::clone(self));
        node.map_children(&mut |c| c.transform_down(f))
    }

    /// Post-order rewrite: recurse into children first, then apply `f`.
    pub fn transform_up(self: &Arc<Self>, f: ExprRewriter<'_>) -> Arc<Expr> {
        let node = self.map_children(&mut |c| c.transform_up(f));
        f(&node).unwrap_or(node)
    }

    /// Fallible post-order rewrite.
    pub fn try_transform_up(self: &Arc<Self>, f: TryExprRewriter<'_>) -> Result<Arc<Expr>> {
        let node = self.try_map_children(&mut |c| c.try_transform_up(f))?;
        Ok(f(&node)?.unwrap_or(node))
    }
}

/// Whether the type participates in the numeric promotion lattice.
pub fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn numeric_rank(dt: &DataType) -> Option<u8> {
    Some(match dt {
        DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 => 3,
        DataType::Int64 | DataType::UInt64 => 4,
        DataType::Float32 => 5,
        DataType::Float64 => 6,
        _ => return None,
    })
}

/// The wider of two numeric types along the promotion lattice.
pub fn wider_numeric(a: &DataType, b: &DataType) -> Option<DataType> {
    let ra = numeric_rank(a)?;
    let rb = numeric_rank(b)?;
    if ra >= rb {
        Some(a.clone())
    } else {
        Some(b.clone())
    }
}

fn eval_and(l: LiteralValue, r: LiteralValue) -> Option<LiteralValue> {
    use LiteralValue::{Boolean, Null};
    match (l, r) {
        (Boolean(false), _) | (_, Boolean(false)) => Some(Boolean(false)),
        (Boolean(true), Boolean(true)) => Some(Boolean(true)),
        (Boolean(true), Null) | (Null, Boolean(true)) | (Null, Null) => Some(Null),
        _ => None,
    }
}

fn eval_or(l: LiteralValue, r: LiteralValue) -> Option<LiteralValue> {
    use LiteralValue::{Boolean, Null};
    match (l, r) {
        (Boolean(true), _) | (_, Boolean(true)) => Some(Boolean(true)),
        (Boolean(false), Boolean(false)) => Some(Boolean(false)),
        (Boolean(false), Null) | (Null, Boolean(false)) | (Null, Null) => Some(Null),
        _ => None,
    }
}

fn eval_binary(l: &LiteralValue, op: BinaryOp, r: &LiteralValue) -> Option<LiteralValue> {
    use LiteralValue::{Boolean, Float64, Int32, Int64, Utf8};
    match (l, r) {
        (Int32(a), Int32(b)) => eval_int(i64::from(*a), op, i64::from(*b), |v| {
            i32::try_from(v).ok().map(Int32)
        }),
        (Int64(a), Int64(b)) => eval_int(*a, op, *b, |v| Some(Int64(v))),
        (Float64(a), Float64(b)) => Some(match op {
            BinaryOp::Plus => Float64(a + b),
            BinaryOp::Minus => Float64(a - b),
            BinaryOp::Multiply => Float64(a * b),
            BinaryOp::Divide => {
                if *b == 0.0 {
                    return None;
                }
                Float64(a / b)
            }
            BinaryOp::Eq => Boolean(a == b),
            BinaryOp::NotEq => Boolean(a != b),
            BinaryOp::Lt => Boolean(a < b),
            BinaryOp::LtEq => Boolean(a <= b),
            BinaryOp::Gt => Boolean(a > b),
            BinaryOp::GtEq => Boolean(a >= b),
        }),
        (Utf8(a), Utf8(b)) => Some(match op {
            BinaryOp::Eq => Boolean(a == b),
            BinaryOp::NotEq => Boolean(a != b),
            BinaryOp::Lt => Boolean(a < b),
            BinaryOp::LtEq => Boolean(a <= b),
            BinaryOp::Gt => Boolean(a > b),
            BinaryOp::GtEq => Boolean(a >= b),
            _ => return None,
        }),
        (Boolean(a), Boolean(b)) => Some(match op {
            BinaryOp::Eq => Boolean(a == b),
            BinaryOp::NotEq => Boolean(a != b),
            _ => return None,
        }),
        _ => None,
    }
}

fn eval_int(
    a: i64,
    op: BinaryOp,
    b: i64,
    wrap: impl Fn(i64) -> Option<LiteralValue>,
) -> Option<LiteralValue> {
    use LiteralValue::Boolean;
    match op {
        BinaryOp::Plus => wrap(a.checked_add(b)?),
        BinaryOp::Minus => wrap(a.checked_sub(b)?),
        BinaryOp::Multiply => wrap(a.checked_mul(b)?),
        BinaryOp::Divide => wrap(a.checked_div(b)?),
        BinaryOp::Eq => Some(Boolean(a == b)),
        BinaryOp::NotEq => Some(Boolean(a != b)),
        BinaryOp::Lt => Some(Boolean(a < b)),
        BinaryOp::LtEq => Some(Boolean(a <= b)),
        BinaryOp::Gt => Some(Boolean(a > b)),
        BinaryOp::GtEq => Some(Boolean(a >= b)),
    }
}

fn eval_cast(v: &LiteralValue, to: &DataType) -> Option<LiteralValue> {
    use LiteralValue::{Boolean, Float64, Int32, Int64, Null, Utf8};
    if v.is_null() {
        return Some(Null);
    }
    match (v, to) {
        (Int32(x), DataType::Int32) => Some(Int32(*x)),
        (Int32(x), DataType::Int64) => Some(Int64(i64::from(*x))),
        (Int32(x), DataType::Float64) => Some(Float64(f64::from(*x))),
        (Int64(x), DataType::Int64) => Some(Int64(*x)),
        (Int64(x), DataType::Float64) => Some(Float64(*x as f64)),
        (Float64(x), DataType::Float64) => Some(Float64(*x)),
        (Boolean(x), DataType::Boolean) => Some(Boolean(*x)),
        (Utf8(x), DataType::Utf8) => Some(Utf8(x.clone())),
        _ => None,
    }
}
