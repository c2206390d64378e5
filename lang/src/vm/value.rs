use std::{fmt::Display, ops::Deref};

use derive_more::derive::{From, Into};

use crate::bytecode::DataType;

/// Opaque host object handle. Zero is `NULL`.
#[derive(From, Into, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pointer(u64);

impl Pointer {
    pub const NULL: Pointer = Pointer(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A string-table slot. Borrowed text points into the bytecode or at host-owned data and is
/// never freed by the VM; owned text is produced by the VM and dropped with the slot.
#[derive(Debug, Clone)]
pub enum ScriptString<'a> {
    Borrowed(&'a str),
    Owned(String),
}

impl<'a> ScriptString<'a> {
    pub fn as_str(&self) -> &str {
        match self {
            ScriptString::Borrowed(s) => s,
            ScriptString::Owned(s) => s,
        }
    }
}

impl Default for ScriptString<'_> {
    fn default() -> Self {
        ScriptString::Borrowed("")
    }
}

impl Deref for ScriptString<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for ScriptString<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ScriptString<'_> {}

impl PartialOrd for ScriptString<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.as_str().cmp(other.as_str()))
    }
}

impl<'a> From<&'a str> for ScriptString<'a> {
    fn from(value: &'a str) -> Self {
        ScriptString::Borrowed(value)
    }
}

impl From<String> for ScriptString<'_> {
    fn from(value: String) -> Self {
        ScriptString::Owned(value)
    }
}

impl Display for ScriptString<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value crossing the boundary between the VM and the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Parameter<'a> {
    /// Returned by hosts for `void` functions.
    #[default]
    Uninitialized,
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
    String(ScriptString<'a>),
    Pointer(Pointer),
}

impl<'a> Parameter<'a> {
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Parameter::Uninitialized => return None,
            Parameter::Int8(_) => DataType::Int8,
            Parameter::Int16(_) => DataType::Int16,
            Parameter::Int32(_) => DataType::Int32,
            Parameter::Int64(_) => DataType::Int64,
            Parameter::UInt8(_) => DataType::UInt8,
            Parameter::UInt16(_) => DataType::UInt16,
            Parameter::UInt32(_) => DataType::UInt32,
            Parameter::UInt64(_) => DataType::UInt64,
            Parameter::Float32(_) => DataType::Float32,
            Parameter::Float64(_) => DataType::Float64,
            Parameter::Bool(_) => DataType::Bool,
            Parameter::String(_) => DataType::String,
            Parameter::Pointer(_) => DataType::Pointer,
        })
    }

    /// The value an unassigned variable of this kind holds.
    pub fn zero(data_type: DataType) -> Parameter<'a> {
        match data_type {
            DataType::Int8 => Parameter::Int8(0),
            DataType::Int16 => Parameter::Int16(0),
            DataType::Int32 => Parameter::Int32(0),
            DataType::Int64 => Parameter::Int64(0),
            DataType::UInt8 => Parameter::UInt8(0),
            DataType::UInt16 => Parameter::UInt16(0),
            DataType::UInt32 => Parameter::UInt32(0),
            DataType::UInt64 => Parameter::UInt64(0),
            DataType::Float32 => Parameter::Float32(0.0),
            DataType::Float64 => Parameter::Float64(0.0),
            DataType::Bool => Parameter::Bool(false),
            DataType::String => Parameter::String(ScriptString::default()),
            DataType::Pointer => Parameter::Pointer(Pointer::NULL),
        }
    }

    pub(crate) fn number(&self) -> Option<Number> {
        Some(match *self {
            Parameter::Int8(v) => Number::Signed(v.into()),
            Parameter::Int16(v) => Number::Signed(v.into()),
            Parameter::Int32(v) => Number::Signed(v.into()),
            Parameter::Int64(v) => Number::Signed(v),
            Parameter::UInt8(v) => Number::Unsigned(v.into()),
            Parameter::UInt16(v) => Number::Unsigned(v.into()),
            Parameter::UInt32(v) => Number::Unsigned(v.into()),
            Parameter::UInt64(v) => Number::Unsigned(v),
            Parameter::Float32(v) => Number::Float(v.into()),
            Parameter::Float64(v) => Number::Float(v),
            Parameter::Bool(b) => Number::Unsigned(b.into()),
            _ => return None,
        })
    }

    /// Text produced by a cast to `string`.
    pub fn to_text(&self) -> String {
        match self {
            Parameter::Uninitialized => String::new(),
            Parameter::String(s) => s.to_string(),
            Parameter::Bool(b) => b.to_string(),
            Parameter::Pointer(p) => format!("{:#018x}", p.0),
            Parameter::Float32(v) => format_float((*v).into()),
            Parameter::Float64(v) => format_float(*v),
            other => match other.number() {
                Some(Number::Signed(v)) => v.to_string(),
                Some(Number::Unsigned(v)) => v.to_string(),
                Some(Number::Float(v)) => format_float(v),
                None => String::new(),
            },
        }
    }

    /// Converts between kinds the way the `Typecast` opcode does. Integer narrowing wraps
    /// and float to integer saturates, unlike compile-time literal casts, which reject
    /// values out of range.
    pub fn cast(self, to: DataType) -> Parameter<'a> {
        if self.data_type() == Some(to) {
            return self;
        }
        match to {
            DataType::String => return Parameter::String(self.to_text().into()),
            DataType::Bool => {
                return Parameter::Bool(match &self {
                    Parameter::String(s) => s.as_str() == "true",
                    other => other.number().is_some_and(Number::is_nonzero),
                })
            }
            DataType::Pointer => return Parameter::zero(to),
            _ => {}
        }
        let number = match &self {
            Parameter::String(s) => Number::parse(s),
            other => other.number().unwrap_or(Number::Signed(0)),
        };
        macro_rules! convert {
            ($variant:ident, $t:ty) => {
                Parameter::$variant(match number {
                    Number::Signed(v) => v as $t,
                    Number::Unsigned(v) => v as $t,
                    Number::Float(v) => v as $t,
                })
            };
        }
        match to {
            DataType::Int8 => convert!(Int8, i8),
            DataType::Int16 => convert!(Int16, i16),
            DataType::Int32 => convert!(Int32, i32),
            DataType::Int64 => convert!(Int64, i64),
            DataType::UInt8 => convert!(UInt8, u8),
            DataType::UInt16 => convert!(UInt16, u16),
            DataType::UInt32 => convert!(UInt32, u32),
            DataType::UInt64 => convert!(UInt64, u64),
            DataType::Float32 => convert!(Float32, f32),
            DataType::Float64 => convert!(Float64, f64),
            DataType::Bool | DataType::String | DataType::Pointer => Parameter::zero(to),
        }
    }
}

macro_rules! parameter_from {
    ($($t:ty => $variant:ident,)*) => {
        $(
            impl From<$t> for Parameter<'_> {
                fn from(value: $t) -> Self {
                    Parameter::$variant(value)
                }
            }
        )*
    };
}

parameter_from! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    Pointer => Pointer,
}

impl<'a> From<&'a str> for Parameter<'a> {
    fn from(value: &'a str) -> Self {
        Parameter::String(value.into())
    }
}

impl From<String> for Parameter<'_> {
    fn from(value: String) -> Self {
        Parameter::String(value.into())
    }
}

impl Display for Parameter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Numeric view used by casts, shared with compile-time constant folding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Number {
    /// Text that is not a number reads as zero.
    pub fn parse(text: &str) -> Number {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            Number::Signed(v)
        } else if let Ok(v) = text.parse::<u64>() {
            Number::Unsigned(v)
        } else if let Ok(v) = text.parse::<f64>() {
            Number::Float(v)
        } else {
            Number::Signed(0)
        }
    }

    pub fn is_nonzero(self) -> bool {
        match self {
            Number::Signed(v) => v != 0,
            Number::Unsigned(v) => v != 0,
            Number::Float(v) => v != 0.0,
        }
    }

    pub fn as_i128(self) -> i128 {
        match self {
            Number::Signed(v) => v.into(),
            Number::Unsigned(v) => v.into(),
            Number::Float(v) => v as i128,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Signed(v) => v as f64,
            Number::Unsigned(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

/// Formats like C's `%g`: six significant digits, trailing zeros removed, exponent notation
/// for very large or small magnitudes.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.into();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.into();
    }
    let scientific = format!("{value:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
