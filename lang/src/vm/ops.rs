use std::cmp::Ordering;

use super::value::{Number, Parameter};
use crate::bytecode::Opcode;

/// Arithmetic and bitwise operators on two values of the same kind. Integer arithmetic
/// wraps. Callers must rule out integer division by zero first.
pub fn binary<'a>(opcode: Opcode, left: Parameter<'a>, right: Parameter<'a>) -> Option<Parameter<'a>> {
    macro_rules! float {
        ($a:expr, $b:expr) => {
            match opcode {
                Opcode::Add => $a + $b,
                Opcode::Subtract => $a - $b,
                Opcode::Multiply => $a * $b,
                Opcode::Divide => $a / $b,
                Opcode::Modulo => $a % $b,
                _ => return None,
            }
        };
    }
    macro_rules! integers {
        ($($variant:ident),*) => {
            match (left, right) {
                $((Parameter::$variant(a), Parameter::$variant(b)) => Parameter::$variant(match opcode {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Subtract => a.wrapping_sub(b),
                    Opcode::Multiply => a.wrapping_mul(b),
                    Opcode::Divide => a.wrapping_div(b),
                    Opcode::Modulo => a.wrapping_rem(b),
                    Opcode::BitwiseAnd => a & b,
                    Opcode::BitwiseOr => a | b,
                    Opcode::BitwiseXor => a ^ b,
                    Opcode::BitwiseShiftLeft => a.wrapping_shl(b as u32),
                    Opcode::BitwiseShiftRight => a.wrapping_shr(b as u32),
                    _ => return None,
                }),)*
                (Parameter::Float32(a), Parameter::Float32(b)) => Parameter::Float32(float!(a, b)),
                (Parameter::Float64(a), Parameter::Float64(b)) => Parameter::Float64(float!(a, b)),
                _ => return None,
            }
        };
    }
    Some(integers!(Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32, UInt64))
}

pub fn is_integer_zero(value: &Parameter) -> bool {
    value.data_type().is_some_and(|t| t.is_integer())
        && !value.number().is_some_and(Number::is_nonzero)
}

pub fn negate(value: Parameter) -> Option<Parameter> {
    Some(match value {
        Parameter::Int8(v) => Parameter::Int8(v.wrapping_neg()),
        Parameter::Int16(v) => Parameter::Int16(v.wrapping_neg()),
        Parameter::Int32(v) => Parameter::Int32(v.wrapping_neg()),
        Parameter::Int64(v) => Parameter::Int64(v.wrapping_neg()),
        Parameter::UInt8(v) => Parameter::UInt8(v.wrapping_neg()),
        Parameter::UInt16(v) => Parameter::UInt16(v.wrapping_neg()),
        Parameter::UInt32(v) => Parameter::UInt32(v.wrapping_neg()),
        Parameter::UInt64(v) => Parameter::UInt64(v.wrapping_neg()),
        Parameter::Float32(v) => Parameter::Float32(-v),
        Parameter::Float64(v) => Parameter::Float64(-v),
        _ => return None,
    })
}

pub fn bitwise_not(value: Parameter) -> Option<Parameter> {
    Some(match value {
        Parameter::Int8(v) => Parameter::Int8(!v),
        Parameter::Int16(v) => Parameter::Int16(!v),
        Parameter::Int32(v) => Parameter::Int32(!v),
        Parameter::Int64(v) => Parameter::Int64(!v),
        Parameter::UInt8(v) => Parameter::UInt8(!v),
        Parameter::UInt16(v) => Parameter::UInt16(!v),
        Parameter::UInt32(v) => Parameter::UInt32(!v),
        Parameter::UInt64(v) => Parameter::UInt64(!v),
        _ => return None,
    })
}

/// Equality and ordering. `None` when the operands are not comparable.
pub fn compare(opcode: Opcode, left: &Parameter, right: &Parameter) -> Option<bool> {
    macro_rules! ordering {
        ($($variant:ident),*) => {
            match (left, right) {
                $((Parameter::$variant(a), Parameter::$variant(b)) => a.partial_cmp(b),)*
                _ => return None,
            }
        };
    }
    let ordering = ordering!(
        Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32, UInt64, Float32, Float64, Bool, String,
        Pointer
    );
    Some(match opcode {
        Opcode::LogicalEquality => ordering == Some(Ordering::Equal),
        Opcode::LogicalInequality => ordering != Some(Ordering::Equal),
        Opcode::LessThan => ordering == Some(Ordering::Less),
        Opcode::LessThanOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Opcode::GreaterThan => ordering == Some(Ordering::Greater),
        Opcode::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(
            binary(Opcode::Add, Parameter::UInt8(250), Parameter::UInt8(10)),
            Some(Parameter::UInt8(4))
        );
        assert_eq!(
            binary(Opcode::Divide, Parameter::Int32(i32::MIN), Parameter::Int32(-1)),
            Some(Parameter::Int32(i32::MIN))
        );
        assert_eq!(
            binary(Opcode::BitwiseShiftLeft, Parameter::Int16(1), Parameter::Int16(4)),
            Some(Parameter::Int16(16))
        );
        assert_eq!(
            binary(Opcode::Modulo, Parameter::Float64(7.5), Parameter::Float64(2.0)),
            Some(Parameter::Float64(1.5))
        );
        assert_eq!(binary(Opcode::Add, Parameter::Int8(1), Parameter::Int16(1)), None);
        assert_eq!(
            binary(Opcode::BitwiseAnd, Parameter::Float32(1.0), Parameter::Float32(1.0)),
            None
        );
    }

    #[test]
    fn compares_same_kinds() {
        assert_eq!(
            compare(Opcode::LessThan, &Parameter::Int64(-3), &Parameter::Int64(2)),
            Some(true)
        );
        assert_eq!(
            compare(Opcode::LogicalEquality, &Parameter::from("a"), &Parameter::from(String::from("a"))),
            Some(true)
        );
        assert_eq!(
            compare(
                Opcode::LogicalInequality,
                &Parameter::Float64(f64::NAN),
                &Parameter::Float64(f64::NAN)
            ),
            Some(true)
        );
        assert_eq!(
            compare(Opcode::LogicalEquality, &Parameter::Int8(1), &Parameter::Bool(true)),
            None
        );
    }

    #[test]
    fn detects_integer_zero() {
        assert!(is_integer_zero(&Parameter::UInt16(0)));
        assert!(!is_integer_zero(&Parameter::UInt16(3)));
        assert!(!is_integer_zero(&Parameter::Float64(0.0)));
    }
}
