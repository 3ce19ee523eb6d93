//! Serializable layout description.
//!
//! These types describe a structure the way a schema compiler front end hands
//! it over: fields with their bit ranges, types and predicates, the enum types
//! they use, and structure-level predicates. Build them from JSON (or any
//! serde format), then compile with `Layout::try_from`.
//!
//! ```json
//! {
//!   "name": "RequiresIntegers",
//!   "fields": [
//!     {
//!       "name": "zero_through_nine",
//!       "kind": { "bits": { "offset_bits": 0, "width_bits": 8, "ty": "uint" } },
//!       "requires": { "in_ranges": ["this", [[0, 9]]] }
//!     }
//!   ]
//! }
//! ```

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    bits::BitOrder,
    errors::CompileError,
    expr::Expr,
    field::{Field, FieldKind},
    layout::{Layout, Structure},
    value::{EnumType, FieldType},
};

/// Top-level description of one structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LayoutDef {
    pub name: String,
    #[serde(default)]
    pub bit_order: BitOrder,
    /// Enum types referenced by name from field types.
    #[serde(default)]
    pub enums: Vec<EnumDef>,
    pub fields: Vec<FieldDef>,
    /// Predicates over several fields with no owning field.
    #[serde(default)]
    pub requires: Vec<Expr>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnumDef {
    pub name: String,
    pub enumerators: Vec<EnumeratorDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnumeratorDef {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKindDef,
    /// Type-level restriction; writes outside it are fatal.
    #[serde(default)]
    pub domain: Option<Expr>,
    #[serde(default)]
    pub requires: Option<Expr>,
    #[serde(default)]
    pub exists_if: Option<Expr>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum FieldKindDef {
    Bits {
        offset_bits: usize,
        width_bits: usize,
        ty: TypeDef,
    },
    Alias {
        target: String,
    },
    Computed {
        expr: Expr,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub enum TypeDef {
    #[serde(rename = "uint")]
    UInt,
    #[serde(rename = "bool")]
    Bool,
    /// Name of an enum declared in [LayoutDef::enums].
    #[serde(rename = "enum")]
    Enum(String),
}

impl From<&EnumDef> for EnumType {
    fn from(value: &EnumDef) -> Self {
        EnumType {
            name: value.name.clone(),
            enumerators: value
                .enumerators
                .iter()
                .map(|e| (e.name.clone(), e.value))
                .collect(),
        }
    }
}

impl TryFrom<LayoutDef> for Structure {
    type Error = CompileError;

    fn try_from(value: LayoutDef) -> Result<Self, Self::Error> {
        let declared: Vec<Arc<EnumType>> = value
            .enums
            .iter()
            .map(|def| Arc::new(EnumType::from(def)))
            .collect();

        // Same-named duplicates are kept in `declared` so compilation can reject them.
        let mut enums: BTreeMap<String, Arc<EnumType>> = BTreeMap::new();
        for ty in &declared {
            enums.entry(ty.name.clone()).or_insert_with(|| ty.clone());
        }

        let fields = value
            .fields
            .into_iter()
            .map(|def| field_def_to_field(def, &enums))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Structure {
            name: value.name,
            bit_order: value.bit_order,
            fields,
            requires: value.requires,
            enums: declared,
        })
    }
}

impl TryFrom<LayoutDef> for Layout {
    type Error = CompileError;

    fn try_from(value: LayoutDef) -> Result<Self, Self::Error> {
        Layout::compile(&Structure::try_from(value)?)
    }
}

fn field_def_to_field(
    def: FieldDef,
    enums: &BTreeMap<String, Arc<EnumType>>,
) -> Result<Field, CompileError> {
    let kind = match def.kind {
        FieldKindDef::Bits {
            offset_bits,
            width_bits,
            ty,
        } => FieldKind::Bits {
            offset_bits,
            width_bits,
            ty: match ty {
                TypeDef::UInt => FieldType::UInt,
                TypeDef::Bool => FieldType::Bool,
                TypeDef::Enum(name) => FieldType::Enum(
                    enums
                        .get(&name)
                        .cloned()
                        .ok_or(CompileError::UnknownEnumType(name))?,
                ),
            },
        },
        FieldKindDef::Alias { target } => FieldKind::Alias { target },
        FieldKindDef::Computed { expr } => FieldKind::Computed { expr },
    };

    Ok(Field {
        name: def.name,
        kind,
        domain: def.domain,
        requires: def.requires,
        exists_if: def.exists_if,
    })
}
