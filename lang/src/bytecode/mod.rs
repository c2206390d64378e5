use derive_more::derive::{From, Into};

use crate::types::Primitive;

pub mod buffer;

pub use buffer::{Annotation, AnnotationKind, Buffer};

/// `[primitive memory size: u16][string table size: u16]`
pub const HEADER_SIZE: usize = 4;

/// Largest byte stream a 16-bit cursor can address.
pub const MAX_BYTECODE_LENGTH: usize = u16::MAX as usize + 1;

macro_rules! opcodes {
    {
        $(($ident:ident, $value:literal, $name:literal),)*
    } => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($ident = $value,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[
                $(Opcode::$ident,)*
            ];

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$ident => $name,)*
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, u8> {
                match byte {
                    $($value => Ok(Opcode::$ident),)*
                    other => Err(other),
                }
            }
        }
    };
}

opcodes! {
    (Placeholder, 0, "placeholder"),
    (NoOp, 1, "no_op"),

    (Literal, 2, "literal"),
    (LiteralTrue, 3, "literal_true"),
    (LiteralFalse, 4, "literal_false"),
    (LiteralNull, 5, "literal_null"),
    (Variable, 6, "variable"),

    (Add, 7, "add"),
    (Subtract, 8, "subtract"),
    (Multiply, 9, "multiply"),
    (Divide, 10, "divide"),
    (Modulo, 11, "modulo"),
    (NumericNegation, 12, "numeric_negation"),
    (Concat, 13, "concat"),

    (BitwiseAnd, 14, "bitwise_and"),
    (BitwiseOr, 15, "bitwise_or"),
    (BitwiseXor, 16, "bitwise_xor"),
    (BitwiseNegation, 17, "bitwise_negation"),
    (BitwiseShiftLeft, 18, "bitwise_shift_left"),
    (BitwiseShiftRight, 19, "bitwise_shift_right"),

    (LogicalAnd, 20, "logical_and"),
    (LogicalOr, 21, "logical_or"),
    (LogicalNegation, 22, "logical_negation"),
    (LogicalEquality, 23, "logical_equality"),
    (LogicalInequality, 24, "logical_inequality"),
    (LessThan, 25, "less_than"),
    (LessThanOrEqual, 26, "less_than_or_equal"),
    (GreaterThan, 27, "greater_than"),
    (GreaterThanOrEqual, 28, "greater_than_or_equal"),

    (TernaryConditional, 29, "ternary_conditional"),
    (NullCoalescing, 30, "null_coalescing"),
    (Typecast, 31, "typecast"),

    (FunctionInvocation, 32, "function_invocation"),
    (UnusedReturnFunctionInvocation, 33, "unused_return_function_invocation"),
    (SubscriptInvocation, 34, "subscript_invocation"),

    (Assign, 35, "assign"),
    (AssignProperty, 36, "assign_property"),
    (AssignSubscript, 37, "assign_subscript"),

    (Conditional, 38, "conditional"),
    (CursorMoveForward, 39, "cursor_move_forward"),
    (CursorMoveBack, 40, "cursor_move_back"),
    (ProgramExit, 41, "program_exit"),

    (Metadata, 42, "metadata"),
    (DebugLine, 43, "debug_line"),
    (DebugUpdateVariable, 44, "debug_update_variable"),
    (DebugDeleteVariable, 45, "debug_delete_variable"),
}

/// Runtime kind of a value, written as a one-byte operand wherever the consuming context
/// does not already determine it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Int8 = 1,
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
}

impl DataType {
    pub fn from_primitive(primitive: Primitive) -> Option<DataType> {
        Some(match primitive {
            Primitive::Int8 => DataType::Int8,
            Primitive::Int16 => DataType::Int16,
            Primitive::Int32 => DataType::Int32,
            Primitive::Int64 => DataType::Int64,
            Primitive::UInt8 => DataType::UInt8,
            Primitive::UInt16 => DataType::UInt16,
            Primitive::UInt32 => DataType::UInt32,
            Primitive::UInt64 => DataType::UInt64,
            Primitive::Float32 => DataType::Float32,
            Primitive::Float64 => DataType::Float64,
            Primitive::Bool => DataType::Bool,
            Primitive::String => DataType::String,
            Primitive::Pointer => DataType::Pointer,
            _ => return None,
        })
    }

    pub fn primitive(self) -> Primitive {
        match self {
            DataType::Int8 => Primitive::Int8,
            DataType::Int16 => Primitive::Int16,
            DataType::Int32 => Primitive::Int32,
            DataType::Int64 => Primitive::Int64,
            DataType::UInt8 => Primitive::UInt8,
            DataType::UInt16 => Primitive::UInt16,
            DataType::UInt32 => Primitive::UInt32,
            DataType::UInt64 => Primitive::UInt64,
            DataType::Float32 => Primitive::Float32,
            DataType::Float64 => Primitive::Float64,
            DataType::Bool => Primitive::Bool,
            DataType::String => Primitive::String,
            DataType::Pointer => Primitive::Pointer,
        }
    }

    pub fn byte_size(self) -> usize {
        self.primitive().byte_size().into()
    }

    pub fn is_integer(self) -> bool {
        let primitive = self.primitive();
        primitive.is_signed_integer() || primitive.is_unsigned_integer()
    }
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Ok(match byte {
            1 => DataType::Int8,
            2 => DataType::Int16,
            3 => DataType::Int32,
            4 => DataType::Int64,
            5 => DataType::UInt8,
            6 => DataType::UInt16,
            7 => DataType::UInt32,
            8 => DataType::UInt64,
            9 => DataType::Float32,
            10 => DataType::Float64,
            11 => DataType::Bool,
            12 => DataType::String,
            13 => DataType::Pointer,
            other => return Err(other),
        })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.primitive().name())
    }
}

/// Numeric ID the host uses to identify a function or property.
#[derive(From, Into, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_round_trip_through_bytes() {
        for &opcode in Opcode::ALL {
            assert_eq!(Opcode::try_from(opcode as u8), Ok(opcode), "{}", opcode.name());
        }
        assert_eq!(Opcode::try_from(200), Err(200));
    }

    #[test]
    fn data_types_cover_concrete_primitives() {
        for byte in 1..=13u8 {
            let data_type = DataType::try_from(byte).unwrap();
            assert_eq!(data_type as u8, byte);
            assert!(data_type.primitive().is_concrete());
            assert_eq!(DataType::from_primitive(data_type.primitive()), Some(data_type));
        }
        assert_eq!(DataType::from_primitive(Primitive::AmbiguousInt), None);
        assert_eq!(DataType::try_from(0), Err(0));
    }
}
