use std::fmt::Display;

use thiserror::Error;

use crate::vm::value::{format_float, Number};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    Pointer,
    Void,
    AmbiguousSignedInt,
    AmbiguousInt,
    AmbiguousFloat,
    Uninitialized,
    TypeError,
}

impl Primitive {
    pub const CONCRETE_NUMERIC: &'static [Primitive] = &[
        Primitive::Int8,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Int64,
        Primitive::UInt8,
        Primitive::UInt16,
        Primitive::UInt32,
        Primitive::UInt64,
        Primitive::Float32,
        Primitive::Float64,
    ];

    pub fn from_keyword(keyword: &str) -> Option<Primitive> {
        Some(match keyword {
            "int8" => Primitive::Int8,
            "int16" => Primitive::Int16,
            "int32" => Primitive::Int32,
            "int64" => Primitive::Int64,
            "uint8" => Primitive::UInt8,
            "uint16" => Primitive::UInt16,
            "uint32" => Primitive::UInt32,
            "uint64" => Primitive::UInt64,
            "float32" => Primitive::Float32,
            "float64" => Primitive::Float64,
            "bool" => Primitive::Bool,
            "string" => Primitive::String,
            "void" => Primitive::Void,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::UInt8 => "uint8",
            Primitive::UInt16 => "uint16",
            Primitive::UInt32 => "uint32",
            Primitive::UInt64 => "uint64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Bool => "bool",
            Primitive::String => "string",
            Primitive::Pointer => "pointer",
            Primitive::Void => "void",
            Primitive::AmbiguousSignedInt => "signed integer",
            Primitive::AmbiguousInt => "integer",
            Primitive::AmbiguousFloat => "floating point",
            Primitive::Uninitialized => "uninitialized",
            Primitive::TypeError => "invalid type",
        }
    }

    pub fn is_ambiguous(self) -> bool {
        matches!(
            self,
            Primitive::AmbiguousSignedInt | Primitive::AmbiguousInt | Primitive::AmbiguousFloat
        )
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            Primitive::UInt8 | Primitive::UInt16 | Primitive::UInt32 | Primitive::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::Float32 | Primitive::Float64)
    }

    /// Concrete or ambiguous integer.
    pub fn is_integer(self) -> bool {
        self.is_signed_integer()
            || self.is_unsigned_integer()
            || matches!(self, Primitive::AmbiguousSignedInt | Primitive::AmbiguousInt)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self == Primitive::AmbiguousFloat
    }

    /// Kinds that can be stored, passed to the host, or emitted as bytecode.
    pub fn is_concrete(self) -> bool {
        self.is_signed_integer()
            || self.is_unsigned_integer()
            || self.is_float()
            || matches!(self, Primitive::Bool | Primitive::String | Primitive::Pointer)
    }

    /// Width in bits of an integer kind.
    pub fn bits(self) -> u32 {
        match self {
            Primitive::Int8 | Primitive::UInt8 => 8,
            Primitive::Int16 | Primitive::UInt16 => 16,
            Primitive::Int32 | Primitive::UInt32 | Primitive::Float32 => 32,
            _ => 64,
        }
    }

    /// Bytes occupied in the primitive memory region. Strings live in the string table.
    pub fn byte_size(self) -> u16 {
        match self {
            Primitive::Int8 | Primitive::UInt8 | Primitive::Bool => 1,
            Primitive::Int16 | Primitive::UInt16 => 2,
            Primitive::Int32 | Primitive::UInt32 | Primitive::Float32 => 4,
            Primitive::Int64 | Primitive::UInt64 | Primitive::Float64 | Primitive::Pointer => 8,
            _ => 0,
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Combines the operand kinds of a binary operator into the kind of its result.
///
/// Returns `None` when the two kinds cannot be combined.
pub fn reconcile(left: Primitive, right: Primitive) -> Option<Primitive> {
    if left == right {
        return Some(left);
    }
    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }
    match (left.is_ambiguous(), right.is_ambiguous()) {
        (true, true) => {
            if left == Primitive::AmbiguousFloat || right == Primitive::AmbiguousFloat {
                Some(Primitive::AmbiguousFloat)
            } else {
                Some(Primitive::AmbiguousSignedInt)
            }
        }
        (false, false) => None,
        _ => {
            let (concrete, ambiguous) = if left.is_ambiguous() {
                (right, left)
            } else {
                (left, right)
            };
            if concrete.is_float() {
                Some(concrete)
            } else if concrete.is_signed_integer() {
                (ambiguous != Primitive::AmbiguousFloat).then_some(concrete)
            } else {
                (ambiguous == Primitive::AmbiguousInt).then_some(concrete)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub primitive: Primitive,
    /// Name of the declared type for pointers. `None` on a pointer means the `NULL` literal.
    pub pointer_type: Option<String>,
}

impl Type {
    pub fn pointer(name: impl Into<String>) -> Self {
        Self {
            primitive: Primitive::Pointer,
            pointer_type: Some(name.into()),
        }
    }

    pub fn null() -> Self {
        Self {
            primitive: Primitive::Pointer,
            pointer_type: None,
        }
    }

    pub fn error() -> Self {
        Primitive::TypeError.into()
    }

    pub fn is_error(&self) -> bool {
        self.primitive == Primitive::TypeError
    }

    pub fn is_null(&self) -> bool {
        self.primitive == Primitive::Pointer && self.pointer_type.is_none()
    }
}

impl From<Primitive> for Type {
    fn from(primitive: Primitive) -> Self {
        Self {
            primitive,
            pointer_type: None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.primitive, &self.pointer_type) {
            (Primitive::Pointer, Some(name)) => f.write_str(name),
            (Primitive::Pointer, None) => f.write_str("NULL"),
            (primitive, _) => f.write_str(primitive.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    #[error("A value of {value} is outside the range of numbers that can be represented by a {bits}-bit {signedness} integer.")]
    OutOfRange {
        value: String,
        bits: u32,
        signedness: &'static str,
    },
    #[error("A value of type {from} cannot be converted to {to}.")]
    Incompatible { from: Primitive, to: Primitive },
}

/// A compile-time value. Ambiguous variants carry untyped literals until context fixes
/// their kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Null,
    AmbiguousSignedInt(i64),
    AmbiguousInt(u64),
    AmbiguousFloat(f64),
}

impl Literal {
    pub fn primitive(&self) -> Primitive {
        match self {
            Literal::Int8(_) => Primitive::Int8,
            Literal::Int16(_) => Primitive::Int16,
            Literal::Int32(_) => Primitive::Int32,
            Literal::Int64(_) => Primitive::Int64,
            Literal::UInt8(_) => Primitive::UInt8,
            Literal::UInt16(_) => Primitive::UInt16,
            Literal::UInt32(_) => Primitive::UInt32,
            Literal::UInt64(_) => Primitive::UInt64,
            Literal::Float32(_) => Primitive::Float32,
            Literal::Float64(_) => Primitive::Float64,
            Literal::Bool(_) => Primitive::Bool,
            Literal::String(_) => Primitive::String,
            Literal::Null => Primitive::Pointer,
            Literal::AmbiguousSignedInt(_) => Primitive::AmbiguousSignedInt,
            Literal::AmbiguousInt(_) => Primitive::AmbiguousInt,
            Literal::AmbiguousFloat(_) => Primitive::AmbiguousFloat,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Literal::Null => Type::null(),
            other => other.primitive().into(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn number(&self) -> Option<Number> {
        Some(match *self {
            Literal::Int8(v) => Number::Signed(v.into()),
            Literal::Int16(v) => Number::Signed(v.into()),
            Literal::Int32(v) => Number::Signed(v.into()),
            Literal::Int64(v) | Literal::AmbiguousSignedInt(v) => Number::Signed(v),
            Literal::UInt8(v) => Number::Unsigned(v.into()),
            Literal::UInt16(v) => Number::Unsigned(v.into()),
            Literal::UInt32(v) => Number::Unsigned(v.into()),
            Literal::UInt64(v) | Literal::AmbiguousInt(v) => Number::Unsigned(v),
            Literal::Float32(v) => Number::Float(v.into()),
            Literal::Float64(v) | Literal::AmbiguousFloat(v) => Number::Float(v),
            Literal::Bool(b) => Number::Unsigned(b.into()),
            _ => return None,
        })
    }

    /// Text produced by a cast to `string`, matching what the VM produces at runtime.
    pub fn to_text(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => format!("{:#018x}", 0),
            Literal::Float32(v) => format_float((*v).into()),
            Literal::Float64(v) | Literal::AmbiguousFloat(v) => format_float(*v),
            Literal::Int8(v) => v.to_string(),
            Literal::Int16(v) => v.to_string(),
            Literal::Int32(v) => v.to_string(),
            Literal::Int64(v) | Literal::AmbiguousSignedInt(v) => v.to_string(),
            Literal::UInt8(v) => v.to_string(),
            Literal::UInt16(v) => v.to_string(),
            Literal::UInt32(v) => v.to_string(),
            Literal::UInt64(v) | Literal::AmbiguousInt(v) => v.to_string(),
        }
    }

    pub fn cast(&self, to: Primitive) -> Result<Literal, CastError> {
        let from = self.primitive();
        if from == to {
            return Ok(self.clone());
        }
        let incompatible = CastError::Incompatible { from, to };
        match to {
            Primitive::String => return Ok(Literal::String(self.to_text())),
            Primitive::Bool => {
                return match self {
                    Literal::String(s) => Ok(Literal::Bool(s == "true")),
                    other => other
                        .number()
                        .map(|n| Literal::Bool(n.is_nonzero()))
                        .ok_or(incompatible),
                }
            }
            _ => {}
        }

        let number = match self {
            Literal::String(s) => Number::parse(s),
            other => other.number().ok_or(incompatible.clone())?,
        };
        Ok(match to {
            Primitive::Int8 => Literal::Int8(signed(number, 8)? as i8),
            Primitive::Int16 => Literal::Int16(signed(number, 16)? as i16),
            Primitive::Int32 => Literal::Int32(signed(number, 32)? as i32),
            Primitive::Int64 => Literal::Int64(signed(number, 64)? as i64),
            Primitive::UInt8 => Literal::UInt8(unsigned(number, 8)? as u8),
            Primitive::UInt16 => Literal::UInt16(unsigned(number, 16)? as u16),
            Primitive::UInt32 => Literal::UInt32(unsigned(number, 32)? as u32),
            Primitive::UInt64 => Literal::UInt64(unsigned(number, 64)? as u64),
            Primitive::Float32 => Literal::Float32(number.as_f64() as f32),
            Primitive::Float64 => Literal::Float64(number.as_f64()),
            Primitive::AmbiguousSignedInt => Literal::AmbiguousSignedInt(signed(number, 64)? as i64),
            Primitive::AmbiguousInt => Literal::AmbiguousInt(unsigned(number, 64)? as u64),
            Primitive::AmbiguousFloat => Literal::AmbiguousFloat(number.as_f64()),
            _ => return Err(incompatible),
        })
    }
}

fn signed(number: Number, bits: u32) -> Result<i128, CastError> {
    let value = number.as_i128();
    let max = (1i128 << (bits - 1)) - 1;
    let min = -(1i128 << (bits - 1));
    if value < min || value > max {
        return Err(CastError::OutOfRange {
            value: value.to_string(),
            bits,
            signedness: "signed",
        });
    }
    Ok(value)
}

fn unsigned(number: Number, bits: u32) -> Result<i128, CastError> {
    let value = number.as_i128();
    let max = (1i128 << bits) - 1;
    if value < 0 || value > max {
        return Err(CastError::OutOfRange {
            value: value.to_string(),
            bits,
            signedness: "unsigned",
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMBIGUOUS: &[Primitive] = &[
        Primitive::AmbiguousSignedInt,
        Primitive::AmbiguousInt,
        Primitive::AmbiguousFloat,
    ];

    #[test]
    fn reconcile_is_commutative_and_total() {
        let all: Vec<Primitive> = Primitive::CONCRETE_NUMERIC
            .iter()
            .chain(AMBIGUOUS)
            .copied()
            .collect();
        for &left in Primitive::CONCRETE_NUMERIC {
            for &right in &all {
                let forward = reconcile(left, right);
                assert_eq!(forward, reconcile(right, left), "{left} vs {right}");
                if let Some(result) = forward {
                    assert!(result.is_concrete(), "{left} vs {right} gave {result}");
                }
            }
        }
    }

    #[test]
    fn reconcile_absorbs_ambiguity() {
        use Primitive::*;
        assert_eq!(reconcile(Int32, AmbiguousInt), Some(Int32));
        assert_eq!(reconcile(Int32, AmbiguousSignedInt), Some(Int32));
        assert_eq!(reconcile(Int32, AmbiguousFloat), None);
        assert_eq!(reconcile(UInt16, AmbiguousInt), Some(UInt16));
        assert_eq!(reconcile(UInt16, AmbiguousSignedInt), None);
        assert_eq!(reconcile(Float32, AmbiguousFloat), Some(Float32));
        assert_eq!(reconcile(AmbiguousInt, AmbiguousSignedInt), Some(AmbiguousSignedInt));
        assert_eq!(reconcile(AmbiguousInt, AmbiguousFloat), Some(AmbiguousFloat));
        assert_eq!(reconcile(Int32, Int64), None);
        assert_eq!(reconcile(String, String), Some(String));
        assert_eq!(reconcile(String, Int32), None);
    }

    #[test]
    fn casts_check_range() {
        assert_eq!(
            Literal::AmbiguousInt(255).cast(Primitive::UInt8),
            Ok(Literal::UInt8(255))
        );
        assert_eq!(
            Literal::AmbiguousInt(256).cast(Primitive::UInt8),
            Err(CastError::OutOfRange {
                value: "256".into(),
                bits: 8,
                signedness: "unsigned"
            })
        );
        assert_eq!(
            Literal::AmbiguousSignedInt(-129).cast(Primitive::Int8).map_err(|e| e.to_string()),
            Err("A value of -129 is outside the range of numbers that can be represented by a 8-bit signed integer.".to_string())
        );
        assert!(Literal::AmbiguousSignedInt(-1).cast(Primitive::UInt32).is_err());
    }

    #[test]
    fn casts_to_and_from_text() {
        assert_eq!(
            Literal::String("42".into()).cast(Primitive::Int32),
            Ok(Literal::Int32(42))
        );
        assert_eq!(
            Literal::String("nope".into()).cast(Primitive::Int32),
            Ok(Literal::Int32(0))
        );
        assert_eq!(
            Literal::Float64(1.5).cast(Primitive::String),
            Ok(Literal::String("1.5".into()))
        );
        assert_eq!(
            Literal::Null.cast(Primitive::String),
            Ok(Literal::String("0x0000000000000000".into()))
        );
        assert_eq!(
            Literal::String("true".into()).cast(Primitive::Bool),
            Ok(Literal::Bool(true))
        );
        assert_eq!(Literal::Int8(0).cast(Primitive::Bool), Ok(Literal::Bool(false)));
        assert_eq!(Literal::Bool(true).cast(Primitive::UInt8), Ok(Literal::UInt8(1)));
        assert!(Literal::Int8(1).cast(Primitive::Pointer).is_err());
    }

    #[test]
    fn displays_types() {
        assert_eq!(Type::pointer("Node").to_string(), "Node");
        assert_eq!(Type::null().to_string(), "NULL");
        assert_eq!(Type::from(Primitive::AmbiguousFloat).to_string(), "floating point");
    }
}
