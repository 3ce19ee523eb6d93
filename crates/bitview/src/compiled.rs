use std::{collections::BTreeMap, ops::RangeInclusive, sync::Arc};

use crate::{
    bits::max_value,
    errors::{CompileError, EvalError},
    expr::{BinaryOp, Expr},
    value::{EnumType, FieldType, Value, ValueType},
};

/// Index of a field in its layout's field arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub usize);

/// Bit range occupied by a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    pub offset_bits: usize,
    pub width_bits: usize,
}

impl BitRange {
    pub fn end_bits(&self) -> usize {
        self.offset_bits + self.width_bits
    }
}

#[derive(Debug, Clone)]
pub enum CompiledFieldKind {
    Bits { range: BitRange, ty: FieldType },
    Computed(CompiledExpr),
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub kind: CompiledFieldKind,
    pub value_type: ValueType,
    /// Field this one was declared as an alias of.
    pub alias_of: Option<FieldId>,
    pub domain: Option<CompiledExpr>,
    pub requires: Option<CompiledExpr>,
    pub exists_if: Option<CompiledExpr>,
}

impl CompiledField {
    pub fn range(&self) -> Option<BitRange> {
        match &self.kind {
            CompiledFieldKind::Bits { range, .. } => Some(*range),
            CompiledFieldKind::Computed(_) => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.kind, CompiledFieldKind::Computed(_))
    }

    /// Decodes raw storage bits. Booleans are true for any nonzero pattern.
    pub fn decode(ty: &FieldType, raw: u64) -> Value {
        match ty {
            FieldType::UInt => Value::Int(raw as i128),
            FieldType::Bool => Value::Bool(raw != 0),
            FieldType::Enum(_) => Value::Enum(raw),
        }
    }

    /// Raw encoding of `value`, or `None` if it lies outside the storage domain.
    pub fn encode(ty: &FieldType, range: BitRange, value: &Value) -> Option<u64> {
        let raw = match (ty, value) {
            (FieldType::UInt, Value::Int(v)) => u64::try_from(*v).ok()?,
            (FieldType::Bool, Value::Bool(b)) => u64::from(*b),
            (FieldType::Enum(_), Value::Enum(raw)) => *raw,
            _ => return None,
        };

        (raw <= max_value(range.width_bits)).then_some(raw)
    }
}

/// Compiled expression: names resolved to [FieldId]s, enumerators to raw values.
#[derive(Debug, Clone)]
pub enum CompiledExpr {
    Field(FieldId),
    Const(Value),
    Not(Box<CompiledExpr>),
    Binary(BinaryOp, Box<CompiledExpr>, Box<CompiledExpr>),
    InRanges(Box<CompiledExpr>, Vec<RangeInclusive<i128>>),
    OneOf(Box<CompiledExpr>, Vec<CompiledExpr>),
}

/// Source of field values during evaluation.
pub trait Scope {
    fn value_of(&self, id: FieldId) -> Result<Value, EvalError>;
}

impl CompiledExpr {
    pub fn eval<S: Scope + ?Sized>(&self, scope: &S) -> Result<Value, EvalError> {
        match self {
            CompiledExpr::Field(id) => scope.value_of(*id),
            CompiledExpr::Const(v) => Ok(*v),
            CompiledExpr::Not(inner) => Ok(Value::Bool(!as_bool(inner.eval(scope)?)?)),
            CompiledExpr::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(Value::Bool(as_bool(lhs.eval(scope)?)? && as_bool(rhs.eval(scope)?)?))
            }
            CompiledExpr::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(Value::Bool(as_bool(lhs.eval(scope)?)? || as_bool(rhs.eval(scope)?)?))
            }
            CompiledExpr::Binary(op, lhs, rhs) => apply(*op, lhs.eval(scope)?, rhs.eval(scope)?),
            CompiledExpr::InRanges(inner, ranges) => {
                let v = as_int(inner.eval(scope)?)?;
                Ok(Value::Bool(ranges.iter().any(|r| r.contains(&v))))
            }
            CompiledExpr::OneOf(inner, values) => {
                let v = inner.eval(scope)?;
                for candidate in values {
                    if candidate.eval(scope)? == v {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
        }
    }

    /// True iff the expression evaluates to `true`. Evaluation errors count as not holding.
    pub fn holds<S: Scope + ?Sized>(&self, scope: &S) -> bool {
        matches!(self.eval(scope), Ok(Value::Bool(true)))
    }

    pub fn references(&self, out: &mut Vec<FieldId>) {
        match self {
            CompiledExpr::Field(id) => out.push(*id),
            CompiledExpr::Const(_) => {}
            CompiledExpr::Not(inner) | CompiledExpr::InRanges(inner, _) => inner.references(out),
            CompiledExpr::Binary(_, lhs, rhs) => {
                lhs.references(out);
                rhs.references(out);
            }
            CompiledExpr::OneOf(inner, values) => {
                inner.references(out);
                for v in values {
                    v.references(out);
                }
            }
        }
    }

    /// Inclusive bounds of an integer expression, given the bounds of each
    /// integer field (`None` for other types). Non-integer expressions have
    /// no bounds, but their operands are still checked.
    ///
    /// Fails with [EvalError::Overflow] if some arithmetic step can leave `i128`.
    pub fn bounds(&self, fields: &[Option<(i128, i128)>]) -> Result<Option<(i128, i128)>, EvalError> {
        match self {
            CompiledExpr::Field(id) => Ok(fields.get(id.0).copied().flatten()),
            CompiledExpr::Const(v) => Ok(v.as_int().map(|v| (v, v))),
            CompiledExpr::Not(inner) | CompiledExpr::InRanges(inner, _) => {
                inner.bounds(fields)?;
                Ok(None)
            }
            CompiledExpr::OneOf(inner, values) => {
                inner.bounds(fields)?;
                for v in values {
                    v.bounds(fields)?;
                }
                Ok(None)
            }
            CompiledExpr::Binary(op, lhs, rhs) => {
                let (Some((a, b)), Some((c, d))) = (lhs.bounds(fields)?, rhs.bounds(fields)?) else {
                    return Ok(None);
                };
                let checked = |v: Option<i128>| v.ok_or(EvalError::Overflow);

                match op {
                    BinaryOp::Add => Ok(Some((checked(a.checked_add(c))?, checked(b.checked_add(d))?))),
                    BinaryOp::Sub => Ok(Some((checked(a.checked_sub(d))?, checked(b.checked_sub(c))?))),
                    BinaryOp::Mul => {
                        let products = [
                            checked(a.checked_mul(c))?,
                            checked(a.checked_mul(d))?,
                            checked(b.checked_mul(c))?,
                            checked(b.checked_mul(d))?,
                        ];
                        let lo = products.iter().copied().fold(i128::MAX, i128::min);
                        let hi = products.iter().copied().fold(i128::MIN, i128::max);
                        Ok(Some((lo, hi)))
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    /// Whether every field reference is `id` itself.
    pub fn is_self_contained(&self, id: FieldId) -> bool {
        let mut refs = Vec::new();
        self.references(&mut refs);
        refs.iter().all(|r| *r == id)
    }
}

fn as_bool(v: Value) -> Result<bool, EvalError> {
    v.as_bool().ok_or(EvalError::TypeMismatch)
}

fn as_int(v: Value) -> Result<i128, EvalError> {
    v.as_int().ok_or(EvalError::TypeMismatch)
}

fn apply(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let int = |f: fn(i128, i128) -> Option<i128>| -> Result<Value, EvalError> {
        f(as_int(lhs)?, as_int(rhs)?)
            .map(Value::Int)
            .ok_or(EvalError::Overflow)
    };
    let cmp = |f: fn(&i128, &i128) -> bool| -> Result<Value, EvalError> {
        Ok(Value::Bool(f(&as_int(lhs)?, &as_int(rhs)?)))
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::And => Ok(Value::Bool(as_bool(lhs)? && as_bool(rhs)?)),
        BinaryOp::Or => Ok(Value::Bool(as_bool(lhs)? || as_bool(rhs)?)),
        BinaryOp::Add => int(i128::checked_add),
        BinaryOp::Sub => int(i128::checked_sub),
        BinaryOp::Mul => int(i128::checked_mul),
        BinaryOp::Lt => cmp(i128::lt),
        BinaryOp::Le => cmp(i128::le),
        BinaryOp::Gt => cmp(i128::gt),
        BinaryOp::Ge => cmp(i128::ge),
    }
}

/// Resolves names and checks types of [Expr]s against the fields compiled so far.
pub struct Resolver<'a> {
    pub ids: &'a BTreeMap<String, FieldId>,
    /// Value types of the fields visible to the expression, indexed by id.
    pub types: &'a [ValueType],
    pub enums: &'a BTreeMap<String, Arc<EnumType>>,
    /// Field that `this` refers to, if any.
    pub owner: Option<FieldId>,
    /// Where the expression lives, for error messages.
    pub context: &'a str,
}

impl Resolver<'_> {
    pub fn compile(&self, expr: &Expr) -> Result<(CompiledExpr, ValueType), CompileError> {
        match expr {
            Expr::This => match self.owner {
                Some(id) => Ok((CompiledExpr::Field(id), self.types[id.0].clone())),
                None => Err(CompileError::ThisOutsideField(self.context.to_string())),
            },
            Expr::Field(name) => {
                let id = *self
                    .ids
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownField(name.clone()))?;
                let ty = self
                    .types
                    .get(id.0)
                    .ok_or_else(|| CompileError::ForwardReference {
                        field: self.context.to_string(),
                        target: name.clone(),
                    })?;
                Ok((CompiledExpr::Field(id), ty.clone()))
            }
            Expr::Int(v) => Ok((CompiledExpr::Const(Value::Int(*v)), ValueType::Int)),
            Expr::Bool(b) => Ok((CompiledExpr::Const(Value::Bool(*b)), ValueType::Bool)),
            Expr::Enumerator { ty, name } => {
                let unknown = || CompileError::UnknownEnumerator {
                    ty: ty.clone(),
                    name: name.clone(),
                };
                let enum_type = self.enums.get(ty).ok_or_else(unknown)?;
                let raw = enum_type.raw_of(name).ok_or_else(unknown)?;
                Ok((
                    CompiledExpr::Const(Value::Enum(raw)),
                    ValueType::Enum(enum_type.clone()),
                ))
            }
            Expr::Not(inner) => {
                let inner = self.expect(inner, &ValueType::Bool)?;
                Ok((CompiledExpr::Not(Box::new(inner)), ValueType::Bool))
            }
            Expr::Binary(op, lhs, rhs) => self.compile_binary(*op, lhs, rhs),
            Expr::InRanges(inner, ranges) => {
                let inner = self.expect(inner, &ValueType::Int)?;
                if ranges.iter().any(|(lo, hi)| lo > hi) {
                    return Err(CompileError::InvalidRange(self.context.to_string()));
                }
                let ranges = ranges.iter().map(|(lo, hi)| *lo..=*hi).collect();
                Ok((CompiledExpr::InRanges(Box::new(inner), ranges), ValueType::Bool))
            }
            Expr::OneOf(inner, values) => {
                let (inner, ty) = self.compile(inner)?;
                let values = values
                    .iter()
                    .map(|v| self.expect(v, &ty))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((CompiledExpr::OneOf(Box::new(inner), values), ValueType::Bool))
            }
        }
    }

    /// Compiles a predicate, which must be boolean.
    pub fn predicate(&self, expr: &Expr) -> Result<CompiledExpr, CompileError> {
        self.expect(expr, &ValueType::Bool)
    }

    fn expect(&self, expr: &Expr, ty: &ValueType) -> Result<CompiledExpr, CompileError> {
        let (compiled, actual) = self.compile(expr)?;
        if &actual != ty {
            return Err(CompileError::TypeMismatch(self.context.to_string()));
        }
        Ok(compiled)
    }

    fn compile_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<(CompiledExpr, ValueType), CompileError> {
        let (operand, result) = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => (Some(ValueType::Int), ValueType::Int),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                (Some(ValueType::Int), ValueType::Bool)
            }
            BinaryOp::And | BinaryOp::Or => (Some(ValueType::Bool), ValueType::Bool),
            // Any type, as long as both sides agree.
            BinaryOp::Eq | BinaryOp::Ne => (None, ValueType::Bool),
        };

        let (l, lty) = self.compile(lhs)?;
        let (r, rty) = self.compile(rhs)?;

        let mismatch = match &operand {
            Some(ty) => &lty != ty || &rty != ty,
            None => lty != rty,
        };
        if mismatch {
            return Err(CompileError::TypeMismatch(format!(
                "{}: {}",
                self.context,
                op.symbol()
            )));
        }

        Ok((CompiledExpr::Binary(op, Box::new(l), Box::new(r)), result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{boolean, enumerator, field, int, this};

    struct Fixed(Vec<Value>);

    impl Scope for Fixed {
        fn value_of(&self, id: FieldId) -> Result<Value, EvalError> {
            Ok(self.0[id.0])
        }
    }

    fn fixture() -> (BTreeMap<String, FieldId>, Vec<ValueType>, BTreeMap<String, Arc<EnumType>>) {
        let color = Arc::new(EnumType::new("Color").with("RED", 0).with("GREEN", 1));
        let ids = BTreeMap::from([
            ("a".to_string(), FieldId(0)),
            ("b".to_string(), FieldId(1)),
            ("flag".to_string(), FieldId(2)),
            ("color".to_string(), FieldId(3)),
        ]);
        let types = vec![
            ValueType::Int,
            ValueType::Int,
            ValueType::Bool,
            ValueType::Enum(color.clone()),
        ];
        let enums = BTreeMap::from([("Color".to_string(), color)]);
        (ids, types, enums)
    }

    fn compile_with(
        expr: &Expr,
        owner: Option<FieldId>,
    ) -> Result<(CompiledExpr, ValueType), CompileError> {
        let (ids, types, enums) = fixture();
        let resolver = Resolver {
            ids: &ids,
            types: &types,
            enums: &enums,
            owner,
            context: "test",
        };
        resolver.compile(expr)
    }

    #[test]
    fn test_eval_arithmetic_and_ranges() {
        let expr = (field("a") + field("b")).in_range(10, 29);
        let (compiled, ty) = compile_with(&expr, None).unwrap();
        assert_eq!(ty, ValueType::Bool);

        let scope = Fixed(vec![Value::Int(0), Value::Int(0), Value::Bool(false), Value::Enum(0)]);
        assert!(!compiled.holds(&scope));

        let scope = Fixed(vec![Value::Int(2), Value::Int(10), Value::Bool(false), Value::Enum(0)]);
        assert!(compiled.holds(&scope));
    }

    #[test]
    fn test_eval_disjoint_ranges() {
        let expr = this().in_ranges([(0, 5), (15, 20)]);
        let (compiled, _) = compile_with(&expr, Some(FieldId(0))).unwrap();

        for (v, expected) in [(0, true), (5, true), (6, false), (14, false), (15, true), (21, false)] {
            let scope = Fixed(vec![Value::Int(v), Value::Int(0), Value::Bool(false), Value::Enum(0)]);
            assert_eq!(compiled.holds(&scope), expected, "value {v}");
        }
    }

    #[test]
    fn test_enum_set_membership() {
        let expr = field("color").one_of([enumerator("Color", "RED"), enumerator("Color", "GREEN")]);
        let (compiled, _) = compile_with(&expr, None).unwrap();

        let ok = Fixed(vec![Value::Int(0), Value::Int(0), Value::Bool(false), Value::Enum(1)]);
        let unknown = Fixed(vec![Value::Int(0), Value::Int(0), Value::Bool(false), Value::Enum(9)]);
        assert!(compiled.holds(&ok));
        assert!(!compiled.holds(&unknown));
    }

    #[test]
    fn test_short_circuit_and_not() {
        let expr = field("flag").or(!field("flag"));
        let (compiled, _) = compile_with(&expr, None).unwrap();
        let scope = Fixed(vec![Value::Int(0), Value::Int(0), Value::Bool(false), Value::Enum(0)]);
        assert!(compiled.holds(&scope));
    }

    #[test]
    fn test_overflow_does_not_hold() {
        let expr = (int(i128::MAX) + field("a")).gt(int(0));
        let (compiled, _) = compile_with(&expr, None).unwrap();
        let scope = Fixed(vec![Value::Int(1), Value::Int(0), Value::Bool(false), Value::Enum(0)]);
        assert_eq!(compiled.eval(&scope), Err(EvalError::Overflow));
        assert!(!compiled.holds(&scope));
    }

    #[test]
    fn test_bounds() {
        let nibbles = [Some((0, 15)), Some((0, 15)), None, None];

        let (diff, _) = compile_with(&(field("a") - field("b")), None).unwrap();
        assert_eq!(diff.bounds(&nibbles), Ok(Some((-15, 15))));

        let (scaled, _) = compile_with(&((field("a") - int(20)) * field("b")), None).unwrap();
        assert_eq!(scaled.bounds(&nibbles), Ok(Some((-300, 0))));

        let (cmp, _) = compile_with(&(field("a") * int(2)).gt(field("b")), None).unwrap();
        assert_eq!(cmp.bounds(&nibbles), Ok(None));

        let wide = [Some((0, u64::MAX as i128)), Some((0, u64::MAX as i128)), None, None];
        let (square, _) = compile_with(&(field("a") * field("b")), None).unwrap();
        assert_eq!(square.bounds(&wide), Err(EvalError::Overflow));

        let (hidden, _) = compile_with(&(field("a") * field("b")).gt(int(0)), None).unwrap();
        assert_eq!(hidden.bounds(&wide), Err(EvalError::Overflow));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(
            compile_with(&(field("a") + field("flag")), None),
            Err(CompileError::TypeMismatch(_))
        ));
        assert!(matches!(
            compile_with(&field("color").equals(int(1)), None),
            Err(CompileError::TypeMismatch(_))
        ));
        assert!(matches!(
            compile_with(&field("flag").in_range(0, 1), None),
            Err(CompileError::TypeMismatch(_))
        ));
        assert!(matches!(
            compile_with(&field("a").and(boolean(true)), None),
            Err(CompileError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_resolution_errors() {
        assert_eq!(
            compile_with(&field("missing"), None).unwrap_err(),
            CompileError::UnknownField("missing".to_string())
        );
        assert_eq!(
            compile_with(&this(), None).unwrap_err(),
            CompileError::ThisOutsideField("test".to_string())
        );
        assert_eq!(
            compile_with(&enumerator("Color", "BLUE"), None).unwrap_err(),
            CompileError::UnknownEnumerator {
                ty: "Color".to_string(),
                name: "BLUE".to_string()
            }
        );
        assert_eq!(
            compile_with(&field("a").in_range(5, 1), None).unwrap_err(),
            CompileError::InvalidRange("test".to_string())
        );
    }

    #[test]
    fn test_forward_reference() {
        let (ids, types, enums) = fixture();
        let resolver = Resolver {
            ids: &ids,
            types: &types[..1],
            enums: &enums,
            owner: None,
            context: "sum",
        };
        assert_eq!(
            resolver.compile(&field("b")).unwrap_err(),
            CompileError::ForwardReference {
                field: "sum".to_string(),
                target: "b".to_string()
            }
        );
    }

    #[test]
    fn test_self_contained() {
        let (compiled, _) = compile_with(&this().equals(boolean(true)), Some(FieldId(2))).unwrap();
        assert!(compiled.is_self_contained(FieldId(2)));

        let (compiled, _) = compile_with(&this().equals(field("b")), Some(FieldId(0))).unwrap();
        assert!(!compiled.is_self_contained(FieldId(0)));
    }

    #[test]
    fn test_encode_decode_domain() {
        let range = BitRange {
            offset_bits: 0,
            width_bits: 4,
        };
        assert_eq!(CompiledField::encode(&FieldType::UInt, range, &Value::Int(15)), Some(15));
        assert_eq!(CompiledField::encode(&FieldType::UInt, range, &Value::Int(16)), None);
        assert_eq!(CompiledField::encode(&FieldType::UInt, range, &Value::Int(-1)), None);
        assert_eq!(CompiledField::encode(&FieldType::UInt, range, &Value::Bool(true)), None);
        assert_eq!(CompiledField::encode(&FieldType::Bool, range, &Value::Bool(true)), Some(1));
        assert_eq!(CompiledField::decode(&FieldType::Bool, 6), Value::Bool(true));
    }
}
