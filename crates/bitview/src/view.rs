//! Views binding a [Layout] to a caller-owned buffer.
//!
//! Views are `Copy` and hold nothing but references, so they can be recreated
//! at will. Every query re-reads the buffer; nothing is cached, and a write
//! through one field (or alias) is visible through every other view at once.
//!
//! Two kinds of failure are fatal and panic:
//!
//! - a range fault, i.e. a field whose bits lie outside the buffer. Binding
//!   checks this up front, so reaching it means the layout and buffer disagree.
//! - a write-domain contract violation: writing a value the field cannot
//!   represent, one rejected by its domain predicate, or any write to a
//!   computed field. The buffer is left untouched.
//!
//! Everything else, including violated requires predicates, is reported only
//! through [FieldView::ok], [FieldView::could_write_value] and [StructureView::ok].

use std::cell::Cell;

use tracing::{debug, error};

use crate::{
    buffer::BitBuffer,
    compiled::{BitRange, CompiledField, CompiledFieldKind, FieldId, Scope},
    errors::{BindError, EvalError},
    layout::Layout,
    value::{FieldType, Value},
};

#[derive(Debug, Clone, Copy)]
pub struct StructureView<'a> {
    layout: &'a Layout,
    buffer: BitBuffer<'a>,
}

impl<'a> StructureView<'a> {
    /// Binds `layout` to `data`. Fails if `data` cannot hold every field.
    pub fn new(layout: &'a Layout, data: &'a mut [u8]) -> Result<Self, BindError> {
        Self::bind(layout, BitBuffer::new(data, layout.bit_order()))
    }

    /// Binds `layout` to bytes that are already shared as cells, so the caller
    /// can keep touching the raw bytes while views exist.
    pub fn from_cells(layout: &'a Layout, cells: &'a [Cell<u8>]) -> Result<Self, BindError> {
        Self::bind(layout, BitBuffer::from_cells(cells, layout.bit_order()))
    }

    fn bind(layout: &'a Layout, buffer: BitBuffer<'a>) -> Result<Self, BindError> {
        if buffer.len_bits() < layout.total_bits() {
            return Err(BindError::BufferTooShort {
                needed_bits: layout.total_bits(),
                available_bits: buffer.len_bits(),
            });
        }

        debug!(
            structure = layout.name(),
            buffer_bits = buffer.len_bits(),
            "bound view"
        );

        Ok(Self { layout, buffer })
    }

    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    pub fn field(&self, name: &str) -> Option<FieldView<'a>> {
        self.layout.field_id(name).map(|id| self.field_by_id(id))
    }

    pub fn field_by_id(&self, id: FieldId) -> FieldView<'a> {
        FieldView {
            layout: self.layout,
            buffer: self.buffer,
            id,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldView<'a>> + '_ {
        self.layout.field_ids().map(|id| self.field_by_id(id))
    }

    /// Existence of the named field; `None` if there is no such field.
    pub fn has(&self, name: &str) -> Option<bool> {
        self.field(name).map(|f| f.has())
    }

    /// Every present field is ok and every structure-level predicate holds.
    ///
    /// A field whose existence condition is false counts as ok whatever its bits.
    pub fn ok(&self) -> bool {
        let live = Live::new(self.layout, self.buffer);

        self.fields().all(|f| !f.has() || f.ok())
            && self.layout.requires.iter().all(|p| p.holds(&live))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    layout: &'a Layout,
    buffer: BitBuffer<'a>,
    id: FieldId,
}

impl<'a> FieldView<'a> {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.descriptor().name
    }

    pub fn descriptor(&self) -> &'a CompiledField {
        self.layout.field(self.id)
    }

    pub fn is_computed(&self) -> bool {
        self.descriptor().is_computed()
    }

    /// Current value of the field.
    ///
    /// Computed fields are bounds-checked when the layout is compiled, so
    /// evaluating them cannot overflow. Should evaluation still fail this
    /// panics; [FieldView::try_read] returns the error instead.
    pub fn read(&self) -> Value {
        match self.try_read() {
            Ok(value) => value,
            Err(e) => {
                error!(field = self.name(), error = %e, "computed field failed to evaluate");
                panic!("computed field `{}` failed to evaluate: {e}", self.name())
            }
        }
    }

    pub fn try_read(&self) -> Result<Value, EvalError> {
        self.live().value_of(self.id)
    }

    /// Name of the enumerator currently stored, if the field is an enum and
    /// the raw value is a known enumerator.
    pub fn enumerator_name(&self) -> Option<&'a str> {
        let CompiledFieldKind::Bits {
            ty: FieldType::Enum(ty),
            ..
        } = &self.descriptor().kind
        else {
            return None;
        };

        self.try_read().ok()?.as_enum().and_then(|raw| ty.name_of(raw))
    }

    /// Stores `value`.
    ///
    /// Only the storage domain and the domain predicate are enforced; the
    /// value is stored even if it leaves a requires predicate (this field's
    /// or a sibling's) unsatisfied.
    ///
    /// # Panics
    ///
    /// If the field is computed, `value` is not representable in the field,
    /// or the domain predicate rejects it. The buffer is not modified.
    pub fn write(&self, value: impl Into<Value>) {
        let value = value.into();
        let field = self.descriptor();

        let CompiledFieldKind::Bits { range, ty } = &field.kind else {
            contract_violation(field, &value, "field is computed");
        };

        let Some(raw) = CompiledField::encode(ty, *range, &value) else {
            contract_violation(field, &value, "value is outside the storage domain");
        };

        if let Some(domain) = &field.domain {
            if !self.with_candidate(*range, raw, |scope| domain.holds(scope)) {
                contract_violation(field, &value, "value is outside the field's domain");
            }
        }

        store(field, self.buffer, *range, raw);
    }

    /// Writes `value` if [FieldView::could_write_value] allows it. Returns whether it wrote.
    pub fn try_write(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if !self.could_write_value(value) {
            return false;
        }

        self.write(value);
        true
    }

    /// Domain and requires predicates hold against the live buffer.
    pub fn ok(&self) -> bool {
        let field = self.descriptor();
        let live = self.live();

        field.domain.as_ref().is_none_or(|p| p.holds(&live))
            && field.requires.as_ref().is_none_or(|p| p.holds(&live))
    }

    /// Whether `candidate` is representable and satisfies this field's
    /// predicates, with every other field at its current value.
    ///
    /// The candidate is seen through every field sharing its bits, so a
    /// predicate reading an alias or an overlapping field sees it too.
    ///
    /// This is local feasibility only: a cross-field predicate elsewhere may
    /// still fail after the write.
    pub fn could_write_value(&self, candidate: impl Into<Value>) -> bool {
        let candidate = candidate.into();
        let field = self.descriptor();

        let CompiledFieldKind::Bits { range, ty } = &field.kind else {
            return false;
        };

        let Some(raw) = CompiledField::encode(ty, *range, &candidate) else {
            return false;
        };

        self.with_candidate(*range, raw, |scope| {
            field.domain.as_ref().is_none_or(|p| p.holds(scope))
                && field.requires.as_ref().is_none_or(|p| p.holds(scope))
        })
    }

    /// Existence condition; always true for unconditional fields.
    ///
    /// An alias also requires its target to exist, and a computed field every
    /// field it reads.
    pub fn has(&self) -> bool {
        self.descriptor()
            .exists_if
            .as_ref()
            .is_none_or(|p| p.holds(&self.live()))
    }

    fn live(&self) -> Live<'a> {
        Live::new(self.layout, self.buffer)
    }

    /// Runs `f` against a scratch copy of the buffer holding `raw` in `range`.
    fn with_candidate<R>(&self, range: BitRange, raw: u64, f: impl FnOnce(&Live<'_>) -> R) -> R {
        let scratch = self.buffer.snapshot();
        let buffer = BitBuffer::from_cells(&scratch, self.buffer.order());
        store(self.descriptor(), buffer, range, raw);

        f(&Live::new(self.layout, buffer))
    }
}

/// Evaluation scope reading field values from a buffer.
struct Live<'a> {
    layout: &'a Layout,
    buffer: BitBuffer<'a>,
}

impl<'a> Live<'a> {
    fn new(layout: &'a Layout, buffer: BitBuffer<'a>) -> Self {
        Live { layout, buffer }
    }
}

impl Scope for Live<'_> {
    fn value_of(&self, id: FieldId) -> Result<Value, EvalError> {
        let field = self.layout.field(id);
        match &field.kind {
            CompiledFieldKind::Bits { range, ty } => {
                match self.buffer.read_bits(range.offset_bits, range.width_bits) {
                    Ok(raw) => Ok(CompiledField::decode(ty, raw)),
                    Err(e) => {
                        error!(field = %field.name, error = %e, "range fault");
                        panic!("range fault reading field `{}`: {e}", field.name)
                    }
                }
            }
            CompiledFieldKind::Computed(expr) => expr.eval(self),
        }
    }
}

fn store(field: &CompiledField, buffer: BitBuffer<'_>, range: BitRange, raw: u64) {
    if let Err(e) = buffer.write_bits(range.offset_bits, range.width_bits, raw) {
        error!(field = %field.name, error = %e, "range fault");
        panic!("range fault writing field `{}`: {e}", field.name);
    }
}

fn contract_violation(field: &CompiledField, value: &Value, reason: &str) -> ! {
    error!(field = %field.name, ?value, reason, "write contract violation");
    panic!(
        "contract violation: cannot write {value:?} to field `{}`: {reason}",
        field.name
    )
}
