//! Definition of fields used to build a [crate::layout::Structure].

use std::sync::Arc;

use crate::{
    expr::Expr,
    value::{EnumType, FieldType},
};

/// A single named field: stored bits, an alias of another field, or a computed value.
#[derive(Debug, Clone)]
pub struct Field {
    /// Name used to look the field up on a view.
    pub name: String,
    pub kind: FieldKind,
    /// Type-level restriction, enforced by `write`. May only reference `this`.
    pub domain: Option<Expr>,
    /// Soft correctness predicate, reported through `ok`.
    pub requires: Option<Expr>,
    /// Existence condition; the field is unconditional when `None`.
    pub exists_if: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    /// `width_bits` bits starting at `offset_bits`, decoded as `ty`.
    Bits {
        offset_bits: usize,
        width_bits: usize,
        ty: FieldType,
    },
    /// Same bits and type as an earlier field.
    Alias { target: String },
    /// Read-only value of an expression over earlier fields.
    Computed { expr: Expr },
}

impl Field {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: name.into(),
            kind,
            domain: None,
            requires: None,
            exists_if: None,
        }
    }

    pub fn bits(name: impl Into<String>, offset_bits: usize, width_bits: usize, ty: FieldType) -> Self {
        Self::with_kind(
            name,
            FieldKind::Bits {
                offset_bits,
                width_bits,
                ty,
            },
        )
    }

    pub fn uint(name: impl Into<String>, offset_bits: usize, width_bits: usize) -> Self {
        Self::bits(name, offset_bits, width_bits, FieldType::UInt)
    }

    /// One-bit boolean.
    pub fn flag(name: impl Into<String>, offset_bits: usize) -> Self {
        Self::bits(name, offset_bits, 1, FieldType::Bool)
    }

    pub fn enumeration(
        name: impl Into<String>,
        offset_bits: usize,
        width_bits: usize,
        ty: &Arc<EnumType>,
    ) -> Self {
        Self::bits(name, offset_bits, width_bits, FieldType::Enum(ty.clone()))
    }

    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Alias {
                target: target.into(),
            },
        )
    }

    pub fn computed(name: impl Into<String>, expr: Expr) -> Self {
        Self::with_kind(name, FieldKind::Computed { expr })
    }

    pub fn domain(mut self, expr: Expr) -> Self {
        self.domain = Some(expr);
        self
    }

    pub fn requires(mut self, expr: Expr) -> Self {
        self.requires = Some(expr);
        self
    }

    pub fn exists_if(mut self, expr: Expr) -> Self {
        self.exists_if = Some(expr);
        self
    }
}
