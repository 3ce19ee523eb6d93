//! Layout: compiled set of fields and structure-level predicates, bound to buffers by views.

use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    bits::{BitOrder, max_value},
    compiled::{BitRange, CompiledExpr, CompiledField, CompiledFieldKind, FieldId, Resolver},
    errors::CompileError,
    expr::{BinaryOp, Expr},
    field::{Field, FieldKind},
    value::{EnumType, FieldType, ValueType},
};

/// Uncompiled description of a structure: its fields in declaration order and
/// the predicates that belong to the structure as a whole.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    pub name: String,
    pub bit_order: BitOrder,
    pub fields: Vec<Field>,
    pub requires: Vec<Expr>,
    /// Enum types available to enumerator literals, in addition to those of enum fields.
    pub enums: Vec<Arc<EnumType>>,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Structure {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn bit_order(mut self, order: BitOrder) -> Self {
        self.bit_order = order;
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn requires(mut self, expr: Expr) -> Self {
        self.requires.push(expr);
        self
    }

    pub fn enum_type(mut self, ty: Arc<EnumType>) -> Self {
        self.enums.push(ty);
        self
    }
}

/// A compiled, immutable layout. Use [Layout::compile] to build one from a
/// [Structure], then bind it with [crate::view::StructureView::new].
#[derive(Debug, Clone)]
pub struct Layout {
    name: String,
    bit_order: BitOrder,
    total_bits: usize,
    ids: BTreeMap<String, FieldId>,
    /// Compiled fields in declaration order, indexed by [FieldId].
    pub fields: Vec<CompiledField>,
    /// Predicates owned by the structure rather than by any field.
    pub requires: Vec<CompiledExpr>,
}

impl Layout {
    /// Compiles a [Structure]. Fails if any field or predicate is invalid.
    pub fn compile(structure: &Structure) -> Result<Self, CompileError> {
        let ids = index_fields(&structure.fields)?;
        let enums = collect_enums(structure)?;

        let mut fields: Vec<CompiledField> = Vec::with_capacity(structure.fields.len());
        let mut types: Vec<ValueType> = Vec::with_capacity(structure.fields.len());
        let mut bounds: Vec<Option<(i128, i128)>> = Vec::with_capacity(structure.fields.len());

        // Storage and computed values first, in order: a computed field or
        // alias may only look at fields declared before it.
        for field in &structure.fields {
            let (kind, value_type, alias_of, field_bounds) = match &field.kind {
                FieldKind::Bits {
                    offset_bits,
                    width_bits,
                    ty,
                } => {
                    let range = BitRange {
                        offset_bits: *offset_bits,
                        width_bits: *width_bits,
                    };
                    check_storage(&field.name, range, ty)?;
                    let field_bounds = matches!(ty, FieldType::UInt)
                        .then(|| (0, i128::from(max_value(range.width_bits))));
                    (
                        CompiledFieldKind::Bits {
                            range,
                            ty: ty.clone(),
                        },
                        ValueType::from(ty),
                        None,
                        field_bounds,
                    )
                }
                FieldKind::Alias { target } => {
                    let id = *ids
                        .get(target)
                        .ok_or_else(|| CompileError::UnknownField(target.clone()))?;
                    let aliased = fields.get(id.0).ok_or_else(|| CompileError::ForwardReference {
                        field: field.name.clone(),
                        target: target.clone(),
                    })?;
                    let kind = match &aliased.kind {
                        CompiledFieldKind::Bits { range, ty } => CompiledFieldKind::Bits {
                            range: *range,
                            ty: ty.clone(),
                        },
                        CompiledFieldKind::Computed(_) => {
                            CompiledFieldKind::Computed(CompiledExpr::Field(id))
                        }
                    };
                    (kind, aliased.value_type.clone(), Some(id), bounds[id.0])
                }
                FieldKind::Computed { expr } => {
                    let resolver = Resolver {
                        ids: &ids,
                        types: &types,
                        enums: &enums,
                        owner: None,
                        context: &field.name,
                    };
                    let (expr, ty) = resolver.compile(expr)?;
                    let field_bounds = expr
                        .bounds(&bounds)
                        .map_err(|_| CompileError::MayOverflow(field.name.clone()))?;
                    (CompiledFieldKind::Computed(expr), ty, None, field_bounds)
                }
            };

            types.push(value_type.clone());
            bounds.push(field_bounds);
            fields.push(CompiledField {
                name: field.name.clone(),
                kind,
                value_type,
                alias_of,
                domain: None,
                requires: None,
                exists_if: None,
            });
        }

        // Predicates may reference any field.
        for (i, field) in structure.fields.iter().enumerate() {
            let id = FieldId(i);
            let (earlier, rest) = fields.split_at_mut(i);
            let compiled = &mut rest[0];
            let own = Resolver {
                ids: &ids,
                types: &types,
                enums: &enums,
                owner: Some(id),
                context: &field.name,
            };

            if let Some(domain) = &field.domain {
                if compiled.is_computed() {
                    return Err(CompileError::DomainOnComputed(field.name.clone()));
                }
                let domain = own.predicate(domain)?;
                if !domain.is_self_contained(id) {
                    return Err(CompileError::DomainNotSelfContained(field.name.clone()));
                }
                compiled.domain = Some(domain);
            }

            if let Some(requires) = &field.requires {
                compiled.requires = Some(own.predicate(requires)?);
            }

            let own_exists_if = match &field.exists_if {
                Some(exists_if) => {
                    let outer = Resolver { owner: None, ..own };
                    Some(outer.predicate(exists_if)?)
                }
                None => None,
            };
            compiled.exists_if = inherited_existence(compiled, earlier)
                .into_iter()
                .chain(own_exists_if)
                .reduce(and);
        }

        let context = format!("{} requires", structure.name);
        let outer = Resolver {
            ids: &ids,
            types: &types,
            enums: &enums,
            owner: None,
            context: &context,
        };
        let requires = structure
            .requires
            .iter()
            .map(|expr| outer.predicate(expr))
            .collect::<Result<Vec<_>, _>>()?;

        let total_bits = fields
            .iter()
            .filter_map(CompiledField::range)
            .map(|range| range.end_bits())
            .max()
            .unwrap_or(0);

        debug!(
            structure = %structure.name,
            fields = fields.len(),
            structure_predicates = requires.len(),
            total_bits,
            "compiled layout"
        );

        Ok(Self {
            name: structure.name.clone(),
            bit_order: structure.bit_order,
            total_bits,
            ids,
            fields,
            requires,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bit_order(&self) -> BitOrder {
        self.bit_order
    }

    /// Highest bit end over all stored fields.
    pub fn total_bits(&self) -> usize {
        self.total_bits
    }

    /// Smallest buffer length, in bytes, this layout can be bound to.
    pub fn min_size_bytes(&self) -> usize {
        self.total_bits.div_ceil(8)
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.ids.get(name).copied()
    }

    pub fn field(&self, id: FieldId) -> &CompiledField {
        &self.fields[id.0]
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len()).map(FieldId)
    }
}

fn index_fields(fields: &[Field]) -> Result<BTreeMap<String, FieldId>, CompileError> {
    let mut ids = BTreeMap::new();

    for (i, field) in fields.iter().enumerate() {
        if field.name.trim().is_empty() || ids.insert(field.name.clone(), FieldId(i)).is_some() {
            return Err(CompileError::InvalidFieldName(field.name.clone()));
        }
    }

    Ok(ids)
}

fn collect_enums(structure: &Structure) -> Result<BTreeMap<String, Arc<EnumType>>, CompileError> {
    let mut enums: BTreeMap<String, Arc<EnumType>> = BTreeMap::new();
    let used = structure.fields.iter().filter_map(|field| match &field.kind {
        FieldKind::Bits {
            ty: FieldType::Enum(ty),
            ..
        } => Some(ty),
        _ => None,
    });

    for ty in structure.enums.iter().chain(used) {
        match enums.get(&ty.name) {
            Some(known) if **known != **ty => {
                return Err(CompileError::DuplicateEnumType(ty.name.clone()));
            }
            Some(_) => {}
            None => {
                enums.insert(ty.name.clone(), ty.clone());
            }
        }
    }

    Ok(enums)
}

/// Existence condition a field takes over from the fields its value comes
/// from: the target of an alias, or every field a computed expression reads.
fn inherited_existence(field: &CompiledField, earlier: &[CompiledField]) -> Option<CompiledExpr> {
    let mut sources = Vec::new();
    match (field.alias_of, &field.kind) {
        (Some(target), _) => sources.push(target),
        (None, CompiledFieldKind::Computed(expr)) => expr.references(&mut sources),
        (None, CompiledFieldKind::Bits { .. }) => {}
    }
    sources.sort();
    sources.dedup();

    sources
        .iter()
        .filter_map(|id| earlier.get(id.0).and_then(|f| f.exists_if.clone()))
        .reduce(and)
}

fn and(lhs: CompiledExpr, rhs: CompiledExpr) -> CompiledExpr {
    CompiledExpr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs))
}

fn check_storage(name: &str, range: BitRange, ty: &FieldType) -> Result<(), CompileError> {
    if range.width_bits == 0 || range.width_bits > 64 {
        return Err(CompileError::InvalidFieldSize(name.to_string()));
    }

    if range.offset_bits.checked_add(range.width_bits).is_none() {
        return Err(CompileError::InvalidFieldSize(name.to_string()));
    }

    if let FieldType::Enum(ty) = ty {
        if let Some((enumerator, _)) = ty
            .enumerators
            .iter()
            .find(|(_, raw)| *raw > max_value(range.width_bits))
        {
            return Err(CompileError::EnumeratorTooWide {
                field: name.to_string(),
                name: enumerator.clone(),
            });
        }
    }

    Ok(())
}
