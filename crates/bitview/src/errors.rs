//! Error types for layout compilation, buffer binding and bit access.

use thiserror::Error;

/// Errors produced when compiling a [crate::layout::Structure] into a [crate::layout::Layout].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Field width is 0 or greater than 64 bits.
    #[error("field `{0}` has an invalid width")]
    InvalidFieldSize(String),
    /// Field name is empty or already used in the structure.
    #[error("field name `{0}` is empty or duplicated")]
    InvalidFieldName(String),
    /// A field expression or alias names a field that does not exist.
    #[error("unknown field `{0}`")]
    UnknownField(String),
    /// A computed field or alias refers to a field declared after it.
    #[error("field `{field}` refers to `{target}`, which is not declared before it")]
    ForwardReference { field: String, target: String },
    /// An enumerator literal names an unknown enum type or enumerator.
    #[error("unknown enumerator `{ty}::{name}`")]
    UnknownEnumerator { ty: String, name: String },
    /// An enum type has an enumerator that does not fit the field width.
    #[error("enumerator `{name}` of field `{field}` does not fit in the field width")]
    EnumeratorTooWide { field: String, name: String },
    /// Operand types of an expression do not match.
    #[error("type mismatch in `{0}`")]
    TypeMismatch(String),
    /// A predicate, condition or range bound has the wrong shape.
    #[error("invalid range in `{0}`")]
    InvalidRange(String),
    /// `this` used outside of a field predicate.
    #[error("`this` is only valid in field predicates (in `{0}`)")]
    ThisOutsideField(String),
    /// A domain predicate references something other than the field itself.
    #[error("domain predicate of `{0}` must only reference the field itself")]
    DomainNotSelfContained(String),
    /// Computed fields have no storage to restrict.
    #[error("computed field `{0}` cannot carry a domain predicate")]
    DomainOnComputed(String),
    /// Enum type referenced by a serialized field is not declared.
    #[error("unknown enum type `{0}`")]
    UnknownEnumType(String),
    /// Two different enum types share a name.
    #[error("enum type `{0}` is declared more than once with different enumerators")]
    DuplicateEnumType(String),
    /// A computed field's arithmetic can leave the `i128` range for some buffer contents.
    #[error("computed field `{0}` may overflow")]
    MayOverflow(String),
}

/// Errors produced when binding a [crate::layout::Layout] to a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Buffer is shorter than the layout's total bit length.
    #[error("buffer holds {available_bits} bits but the layout needs {needed_bits}")]
    BufferTooShort {
        needed_bits: usize,
        available_bits: usize,
    },
}

/// Errors produced when reading bits from a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Requested bit range is beyond the end of the data.
    #[error("bit range is out of bounds")]
    OutOfBounds,
    /// More than 64 bits were requested in a single read.
    #[error("more than 64 bits requested")]
    TooManyBitsRead,
}

/// Errors produced when writing bits into a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Buffer is too short to write the value.
    #[error("bit range is out of bounds")]
    OutOfBounds,
    /// More than 64 bits were requested in a single write.
    #[error("more than 64 bits requested")]
    TooManyBitsWritten,
    /// Value does not fit in the requested number of bits.
    #[error("value does not fit in {0} bits")]
    InvalidValue(usize),
}

/// Errors produced while evaluating a compiled expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Integer arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,
    /// Operand kinds did not match the operator.
    #[error("operand type mismatch")]
    TypeMismatch,
}
