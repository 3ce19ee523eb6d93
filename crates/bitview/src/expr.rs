//! Predicate and computed-field expressions, as handed over by a layout front end.
//!
//! Fields are referenced by name here; [crate::layout::Layout::compile] resolves
//! names to field ids and checks types.
//!
//! ```
//! use bitview::expr::{field, int, this};
//!
//! // 0 <= this <= 5 || 15 <= this <= 20
//! let disjoint = this().in_ranges([(0, 5), (15, 20)]);
//! // zero_through_nine + 10 == ten_through_twenty
//! let related = (field("zero_through_nine") + int(10)).equals(field("ten_through_twenty"));
//! # let _ = (disjoint, related);
//! ```

use std::ops::{Add, Mul, Not, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Expr {
    /// Value of the field the predicate is attached to.
    This,
    Field(String),
    Int(i128),
    Bool(bool),
    Enumerator { ty: String, name: String },
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Membership in a union of inclusive integer ranges.
    InRanges(Box<Expr>, Vec<(i128, i128)>),
    /// Membership in a set of values of the operand's type.
    OneOf(Box<Expr>, Vec<Expr>),
}

pub fn this() -> Expr {
    Expr::This
}

pub fn field(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

pub fn int(value: i128) -> Expr {
    Expr::Int(value)
}

pub fn boolean(value: bool) -> Expr {
    Expr::Bool(value)
}

pub fn enumerator(ty: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Enumerator {
        ty: ty.into(),
        name: name.into(),
    }
}

impl Expr {
    pub fn binary(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(self), Box::new(rhs))
    }

    pub fn equals(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    /// `lo <= self <= hi`.
    pub fn in_range(self, lo: i128, hi: i128) -> Expr {
        Expr::InRanges(Box::new(self), vec![(lo, hi)])
    }

    pub fn in_ranges(self, ranges: impl IntoIterator<Item = (i128, i128)>) -> Expr {
        Expr::InRanges(Box::new(self), ranges.into_iter().collect())
    }

    pub fn one_of(self, values: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::OneOf(Box::new(self), values.into_iter().collect())
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}
