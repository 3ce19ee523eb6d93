//! Semantic types of fields and the values they decode to.

use std::sync::Arc;

/// A decoded field value or an intermediate expression result.
///
/// Integers are held as `i128` so that sums and differences of 64-bit fields
/// never wrap, and negative candidates can be expressed and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Value {
    Int(i128),
    Bool(bool),
    /// Raw encoding of an enumeration, known enumerator or not.
    Enum(u64),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_int().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<u64> {
        match self {
            Value::Enum(raw) => Some(*raw),
            _ => None,
        }
    }
}

macro_rules! int_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::Int(value as i128)
            }
        })*
    };
}

int_value_from!(u8, u16, u32, u64, usize, i8, i16, i32, i64, i128);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// A named enumeration with its known enumerators.
///
/// Storage is open-world: any raw value that fits the field width can be
/// stored and read back, named or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub enumerators: Vec<(String, u64)>,
}

impl EnumType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enumerators: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, raw: u64) -> Self {
        self.enumerators.push((name.into(), raw));
        self
    }

    /// Value of the enumerator called `name`.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.raw_of(name).map(Value::Enum)
    }

    pub fn raw_of(&self, name: &str) -> Option<u64> {
        self.enumerators
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, raw)| *raw)
    }

    /// Name of the first enumerator encoded as `raw`.
    pub fn name_of(&self, raw: u64) -> Option<&str> {
        self.enumerators
            .iter()
            .find(|(_, r)| *r == raw)
            .map(|(n, _)| n.as_str())
    }

    pub fn is_known(&self, raw: u64) -> bool {
        self.name_of(raw).is_some()
    }
}

/// Semantic type of a stored field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    UInt,
    Bool,
    Enum(Arc<EnumType>),
}

/// Static type of a field value or expression, checked when a layout is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Bool,
    Enum(Arc<EnumType>),
}

impl From<&FieldType> for ValueType {
    fn from(value: &FieldType) -> Self {
        match value {
            FieldType::UInt => ValueType::Int,
            FieldType::Bool => ValueType::Bool,
            FieldType::Enum(ty) => ValueType::Enum(ty.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_lookup() {
        let ty = EnumType::new("Enum").with("EN0", 0).with("EN1", 1);
        assert_eq!(ty.value("EN1"), Some(Value::Enum(1)));
        assert_eq!(ty.value("EN9"), None);
        assert_eq!(ty.name_of(0), Some("EN0"));
        assert!(!ty.is_known(7));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(-1i32), Value::Int(-1));
        assert_eq!(Value::from(7u64).as_u64(), Some(7));
        assert_eq!(Value::from(-1i64).as_u64(), None);
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::Enum(3).as_int(), None);
    }
}
