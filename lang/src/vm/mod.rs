use tracing::{trace, warn};

use crate::bytecode::{DataType, Opcode, Symbol, HEADER_SIZE};

mod callbacks;
mod ops;
pub mod value;

pub use callbacks::*;
pub use value::{Parameter, Pointer, ScriptString};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("malformed bytecode at byte {position}: {reason}")]
    MalformedBytecode { position: usize, reason: String },

    #[error("return value type mismatch: expected {expected}, got {found}")]
    ReturnValueTypeMismatch { expected: DataType, found: String },

    #[error("missing callback: {0}")]
    MissingCallback(&'static str),

    #[error("subscript invoked on NULL")]
    SubscriptInvokedOnNull,

    #[error("function or property invoked on NULL")]
    InvocationOnNullPointer,

    #[error("integer division by zero")]
    DivisionByZero,
}

pub enum StepResult {
    Exit,
    Continue,
}

/// Runs a compiled script to completion.
///
/// A runtime error halts the script. It is reported once through [`Callbacks::error`] and
/// also returned.
pub fn execute<'a>(bytecode: &'a [u8], callbacks: &mut Callbacks<'a>) -> Result<(), RuntimeError> {
    let result = Vm::new(bytecode, callbacks).and_then(|mut vm| vm.run());
    if let Err(error) = &result {
        warn!(%error, "script halted");
        if let Some(on_error) = callbacks.error.as_mut() {
            on_error(error);
        }
    }
    result
}

fn malformed(position: usize, reason: impl Into<String>) -> RuntimeError {
    RuntimeError::MalformedBytecode {
        position,
        reason: reason.into(),
    }
}

pub struct Vm<'a, 'c> {
    bytecode: &'a [u8],
    cursor: usize,
    memory: Vec<u8>,
    strings: Vec<ScriptString<'a>>,
    callbacks: &'c mut Callbacks<'a>,
    /// Set while evaluating a branch whose value is discarded. Host calls are skipped and
    /// zero values produced instead.
    dead: bool,
}

impl<'a, 'c> Vm<'a, 'c> {
    pub fn new(bytecode: &'a [u8], callbacks: &'c mut Callbacks<'a>) -> Result<Self, RuntimeError> {
        if bytecode.len() < HEADER_SIZE {
            return Err(malformed(0, "missing header"));
        }
        let primitive_size = u16::from_le_bytes([bytecode[0], bytecode[1]]);
        let string_count = u16::from_le_bytes([bytecode[2], bytecode[3]]);
        Ok(Vm {
            bytecode,
            cursor: HEADER_SIZE,
            memory: vec![0; primitive_size.into()],
            strings: vec![ScriptString::default(); string_count.into()],
            callbacks,
            dead: false,
        })
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.cursor < self.bytecode.len() {
            if let StepResult::Exit = self.step()? {
                break;
            }
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let Some(&byte) = self.bytecode.get(self.cursor) else {
            return Err(malformed(self.cursor, "unexpected end of bytecode"));
        };
        self.cursor += 1;
        Ok(byte)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], RuntimeError> {
        let Some(slice) = self.bytecode.get(self.cursor..self.cursor + N) else {
            return Err(malformed(self.cursor, "unexpected end of bytecode"));
        };
        let mut bytes = [0; N];
        bytes.copy_from_slice(slice);
        self.cursor += N;
        Ok(bytes)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_opcode(&mut self) -> Result<Opcode, RuntimeError> {
        let byte = self.read_u8()?;
        Opcode::try_from(byte)
            .map_err(|byte| malformed(self.cursor - 1, format!("unrecognized opcode {byte}")))
    }

    fn read_data_type(&mut self) -> Result<DataType, RuntimeError> {
        let byte = self.read_u8()?;
        DataType::try_from(byte)
            .map_err(|byte| malformed(self.cursor - 1, format!("unrecognized data type {byte}")))
    }

    fn read_str(&mut self) -> Result<&'a str, RuntimeError> {
        let bytecode: &'a [u8] = self.bytecode;
        let rest = &bytecode[self.cursor.min(bytecode.len())..];
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(malformed(self.cursor, "unterminated string"));
        };
        let text = std::str::from_utf8(&rest[..end])
            .map_err(|e| malformed(self.cursor, format!("invalid string: {e}")))?;
        self.cursor += end + 1;
        Ok(text)
    }

    fn peek_no_op(&mut self) -> bool {
        if self.bytecode.get(self.cursor) == Some(&(Opcode::NoOp as u8)) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn decode(&mut self, data_type: DataType) -> Result<Parameter<'a>, RuntimeError> {
        Ok(match data_type {
            DataType::Int8 => Parameter::Int8(i8::from_le_bytes(self.read_array()?)),
            DataType::Int16 => Parameter::Int16(i16::from_le_bytes(self.read_array()?)),
            DataType::Int32 => Parameter::Int32(i32::from_le_bytes(self.read_array()?)),
            DataType::Int64 => Parameter::Int64(i64::from_le_bytes(self.read_array()?)),
            DataType::UInt8 => Parameter::UInt8(u8::from_le_bytes(self.read_array()?)),
            DataType::UInt16 => Parameter::UInt16(u16::from_le_bytes(self.read_array()?)),
            DataType::UInt32 => Parameter::UInt32(u32::from_le_bytes(self.read_array()?)),
            DataType::UInt64 => Parameter::UInt64(u64::from_le_bytes(self.read_array()?)),
            DataType::Float32 => Parameter::Float32(f32::from_le_bytes(self.read_array()?)),
            DataType::Float64 => Parameter::Float64(f64::from_le_bytes(self.read_array()?)),
            DataType::Bool => Parameter::Bool(self.read_u8()? != 0),
            DataType::String => Parameter::String(ScriptString::Borrowed(self.read_str()?)),
            DataType::Pointer => {
                Parameter::Pointer(Pointer::from(u64::from_le_bytes(self.read_array()?)))
            }
        })
    }

    fn load(&self, address: u16, data_type: DataType) -> Result<Parameter<'a>, RuntimeError> {
        let position = self.cursor;
        if data_type == DataType::String {
            return self
                .strings
                .get(usize::from(address))
                .cloned()
                .map(Parameter::String)
                .ok_or_else(|| malformed(position, format!("string index {address} out of range")));
        }
        let start = usize::from(address);
        let Some(bytes) = self.memory.get(start..start + data_type.byte_size()) else {
            return Err(malformed(position, format!("address {address} out of range")));
        };
        macro_rules! read {
            ($t:ty) => {{
                let mut raw = [0; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }};
        }
        Ok(match data_type {
            DataType::Int8 => Parameter::Int8(read!(i8)),
            DataType::Int16 => Parameter::Int16(read!(i16)),
            DataType::Int32 => Parameter::Int32(read!(i32)),
            DataType::Int64 => Parameter::Int64(read!(i64)),
            DataType::UInt8 => Parameter::UInt8(read!(u8)),
            DataType::UInt16 => Parameter::UInt16(read!(u16)),
            DataType::UInt32 => Parameter::UInt32(read!(u32)),
            DataType::UInt64 => Parameter::UInt64(read!(u64)),
            DataType::Float32 => Parameter::Float32(read!(f32)),
            DataType::Float64 => Parameter::Float64(read!(f64)),
            DataType::Bool => Parameter::Bool(read!(u8) != 0),
            DataType::Pointer => Parameter::Pointer(Pointer::from(read!(u64))),
            DataType::String => Parameter::zero(DataType::String),
        })
    }

    fn store(&mut self, address: u16, value: Parameter<'a>) -> Result<(), RuntimeError> {
        let position = self.cursor;
        let start = usize::from(address);
        if let Parameter::String(text) = value {
            let Some(slot) = self.strings.get_mut(start) else {
                return Err(malformed(position, format!("string index {address} out of range")));
            };
            *slot = text;
            return Ok(());
        }
        macro_rules! put {
            ($v:expr) => {{
                let raw = $v.to_le_bytes();
                let Some(slot) = self.memory.get_mut(start..start + raw.len()) else {
                    return Err(malformed(position, format!("address {address} out of range")));
                };
                slot.copy_from_slice(&raw);
            }};
        }
        match value {
            Parameter::Int8(v) => put!(v),
            Parameter::Int16(v) => put!(v),
            Parameter::Int32(v) => put!(v),
            Parameter::Int64(v) => put!(v),
            Parameter::UInt8(v) => put!(v),
            Parameter::UInt16(v) => put!(v),
            Parameter::UInt32(v) => put!(v),
            Parameter::UInt64(v) => put!(v),
            Parameter::Float32(v) => put!(v),
            Parameter::Float64(v) => put!(v),
            Parameter::Bool(v) => put!(u8::from(v)),
            Parameter::Pointer(v) => put!(u64::from(v)),
            Parameter::String(_) | Parameter::Uninitialized => {
                return Err(malformed(position, "cannot store an uninitialized value"))
            }
        }
        Ok(())
    }

    fn evaluate_bool(&mut self) -> Result<bool, RuntimeError> {
        let position = self.cursor;
        match self.evaluate(DataType::Bool)? {
            Parameter::Bool(b) => Ok(b),
            other => Err(malformed(position, format!("expected bool, got {other:?}"))),
        }
    }

    fn evaluate_pointer(&mut self) -> Result<Pointer, RuntimeError> {
        let position = self.cursor;
        match self.evaluate(DataType::Pointer)? {
            Parameter::Pointer(p) => Ok(p),
            other => Err(malformed(position, format!("expected pointer, got {other:?}"))),
        }
    }

    /// Evaluates an expression only to move past it.
    fn skip(&mut self, data_type: DataType) -> Result<(), RuntimeError> {
        let was_dead = std::mem::replace(&mut self.dead, true);
        let result = self.evaluate(data_type);
        self.dead = was_dead;
        result.map(|_| ())
    }

    fn evaluate(&mut self, data_type: DataType) -> Result<Parameter<'a>, RuntimeError> {
        let position = self.cursor;
        let opcode = self.read_opcode()?;
        match opcode {
            Opcode::Literal => self.decode(data_type),
            Opcode::LiteralTrue => Ok(Parameter::Bool(true)),
            Opcode::LiteralFalse => Ok(Parameter::Bool(false)),
            Opcode::LiteralNull => Ok(Parameter::Pointer(Pointer::NULL)),
            Opcode::Variable => {
                let address = self.read_u16()?;
                self.load(address, data_type)
            }
            Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Divide
            | Opcode::Modulo
            | Opcode::BitwiseAnd
            | Opcode::BitwiseOr
            | Opcode::BitwiseXor
            | Opcode::BitwiseShiftLeft
            | Opcode::BitwiseShiftRight => {
                let left = self.evaluate(data_type)?;
                let right = self.evaluate(data_type)?;
                self.combine(opcode, data_type, left, right, position)
            }
            Opcode::Concat => {
                let left = self.evaluate(DataType::String)?;
                let right = self.evaluate(DataType::String)?;
                self.combine(opcode, data_type, left, right, position)
            }
            Opcode::NumericNegation => ops::negate(self.evaluate(data_type)?)
                .ok_or_else(|| malformed(position, "negation of a non-numeric value")),
            Opcode::BitwiseNegation => ops::bitwise_not(self.evaluate(data_type)?)
                .ok_or_else(|| malformed(position, "bitwise negation of a non-integer value")),
            Opcode::LogicalNegation => Ok(Parameter::Bool(!self.evaluate_bool()?)),
            Opcode::LogicalAnd => {
                if self.evaluate_bool()? {
                    Ok(Parameter::Bool(self.evaluate_bool()?))
                } else {
                    self.skip(DataType::Bool)?;
                    Ok(Parameter::Bool(false))
                }
            }
            Opcode::LogicalOr => {
                if self.evaluate_bool()? {
                    self.skip(DataType::Bool)?;
                    Ok(Parameter::Bool(true))
                } else {
                    Ok(Parameter::Bool(self.evaluate_bool()?))
                }
            }
            Opcode::LogicalEquality
            | Opcode::LogicalInequality
            | Opcode::LessThan
            | Opcode::LessThanOrEqual
            | Opcode::GreaterThan
            | Opcode::GreaterThanOrEqual => {
                let operand_type = self.read_data_type()?;
                let left = self.evaluate(operand_type)?;
                let right = self.evaluate(operand_type)?;
                ops::compare(opcode, &left, &right)
                    .map(Parameter::Bool)
                    .ok_or_else(|| malformed(position, format!("cannot compare {operand_type}")))
            }
            Opcode::TernaryConditional => {
                if self.evaluate_bool()? {
                    let value = self.evaluate(data_type)?;
                    self.skip(data_type)?;
                    Ok(value)
                } else {
                    self.skip(data_type)?;
                    self.evaluate(data_type)
                }
            }
            Opcode::NullCoalescing => {
                let left = self.evaluate(data_type)?;
                if matches!(left, Parameter::Pointer(p) if !p.is_null()) {
                    self.skip(data_type)?;
                    Ok(left)
                } else {
                    self.evaluate(data_type)
                }
            }
            Opcode::Typecast => {
                let from = self.read_data_type()?;
                Ok(self.evaluate(from)?.cast(data_type))
            }
            Opcode::FunctionInvocation => self.invoke_function(Some(data_type)),
            Opcode::SubscriptInvocation => self.invoke_subscript(data_type),
            other => Err(malformed(
                position,
                format!("{} is not an expression", other.name()),
            )),
        }
    }

    fn combine(
        &self,
        opcode: Opcode,
        data_type: DataType,
        left: Parameter<'a>,
        right: Parameter<'a>,
        position: usize,
    ) -> Result<Parameter<'a>, RuntimeError> {
        if opcode == Opcode::Concat {
            return Ok(Parameter::String(format!("{left}{right}").into()));
        }
        if matches!(opcode, Opcode::Divide | Opcode::Modulo) && ops::is_integer_zero(&right) {
            return if self.dead {
                Ok(Parameter::zero(data_type))
            } else {
                Err(RuntimeError::DivisionByZero)
            };
        }
        ops::binary(opcode, left, right).ok_or_else(|| {
            malformed(
                position,
                format!("{} cannot be applied to {data_type}", opcode.name()),
            )
        })
    }

    /// Reads the target of a function or property access. `None` means global.
    fn invocation_target(&mut self) -> Result<Option<Pointer>, RuntimeError> {
        if self.peek_no_op() {
            Ok(None)
        } else {
            self.evaluate_pointer().map(Some)
        }
    }

    fn require_target(&self, target: Option<Pointer>) -> Result<Pointer, RuntimeError> {
        match target {
            Some(pointer) if pointer.is_null() => Err(RuntimeError::InvocationOnNullPointer),
            Some(pointer) => Ok(pointer),
            None => Ok(Pointer::NULL),
        }
    }

    fn check_return(
        expected: Option<DataType>,
        value: Parameter<'a>,
    ) -> Result<Parameter<'a>, RuntimeError> {
        match expected {
            Some(expected) if value.data_type() != Some(expected) => {
                Err(RuntimeError::ReturnValueTypeMismatch {
                    expected,
                    found: value
                        .data_type()
                        .map_or_else(|| "nothing".to_string(), |t| t.to_string()),
                })
            }
            _ => Ok(value),
        }
    }

    fn call_function(
        &mut self,
        target: Pointer,
        symbol: Symbol,
        arguments: &[Parameter<'a>],
        expected: Option<DataType>,
    ) -> Result<Parameter<'a>, RuntimeError> {
        let Some(invoke) = self.callbacks.invoke_function.as_mut() else {
            return Err(RuntimeError::MissingCallback("invoke_function"));
        };
        trace!(?target, ?symbol, "invoke function");
        Self::check_return(expected, invoke(target, symbol, arguments))
    }

    fn call_subscript(
        &mut self,
        target: Pointer,
        index: Parameter<'a>,
        expected: DataType,
    ) -> Result<Parameter<'a>, RuntimeError> {
        if target.is_null() {
            return Err(RuntimeError::SubscriptInvokedOnNull);
        }
        let Some(invoke) = self.callbacks.invoke_subscript.as_mut() else {
            return Err(RuntimeError::MissingCallback("invoke_subscript"));
        };
        Self::check_return(Some(expected), invoke(target, index))
    }

    fn invoke_function(&mut self, expected: Option<DataType>) -> Result<Parameter<'a>, RuntimeError> {
        let target = self.invocation_target()?;
        let symbol = Symbol::from(self.read_u16()?);
        let count = self.read_u8()?;
        let mut arguments = Vec::with_capacity(count.into());
        for _ in 0..count {
            let data_type = self.read_data_type()?;
            arguments.push(self.evaluate(data_type)?);
        }
        if self.dead {
            return Ok(expected.map_or(Parameter::Uninitialized, Parameter::zero));
        }
        let target = self.require_target(target)?;
        self.call_function(target, symbol, &arguments, expected)
    }

    fn invoke_subscript(&mut self, expected: DataType) -> Result<Parameter<'a>, RuntimeError> {
        let target = self.evaluate_pointer()?;
        let index_type = self.read_data_type()?;
        let index = self.evaluate(index_type)?;
        if self.dead {
            return Ok(Parameter::zero(expected));
        }
        self.call_subscript(target, index, expected)
    }

    /// Operator byte of a compound assignment. `None` for plain `=`.
    fn read_assign_operator(&mut self) -> Result<Option<Opcode>, RuntimeError> {
        match self.read_opcode()? {
            Opcode::NoOp => Ok(None),
            opcode => Ok(Some(opcode)),
        }
    }

    pub fn step(&mut self) -> Result<StepResult, RuntimeError> {
        let position = self.cursor;
        let opcode = self.read_opcode()?;
        trace!(position, opcode = opcode.name(), "step");
        match opcode {
            Opcode::NoOp => {}
            Opcode::Assign => {
                let data_type = self.read_data_type()?;
                let address = self.read_u16()?;
                let value = self.evaluate(data_type)?;
                self.store(address, value)?;
            }
            Opcode::AssignProperty => {
                let data_type = self.read_data_type()?;
                let target = self.invocation_target()?;
                let symbol = Symbol::from(self.read_u16()?);
                let operator = self.read_assign_operator()?;
                let mut value = self.evaluate(data_type)?;
                let target = self.require_target(target)?;
                if let Some(operator) = operator {
                    let current = self.call_function(target, symbol, &[], Some(data_type))?;
                    value = self.combine(operator, data_type, current, value, position)?;
                }
                let Some(assign) = self.callbacks.assign_property.as_mut() else {
                    return Err(RuntimeError::MissingCallback("assign_property"));
                };
                assign(target, symbol, value);
            }
            Opcode::AssignSubscript => {
                let data_type = self.read_data_type()?;
                let target = self.evaluate_pointer()?;
                let index_type = self.read_data_type()?;
                let index = self.evaluate(index_type)?;
                let operator = self.read_assign_operator()?;
                let mut value = self.evaluate(data_type)?;
                if target.is_null() {
                    return Err(RuntimeError::SubscriptInvokedOnNull);
                }
                if let Some(operator) = operator {
                    let current = self.call_subscript(target, index.clone(), data_type)?;
                    value = self.combine(operator, data_type, current, value, position)?;
                }
                let Some(assign) = self.callbacks.assign_subscript.as_mut() else {
                    return Err(RuntimeError::MissingCallback("assign_subscript"));
                };
                assign(target, index, value);
            }
            Opcode::UnusedReturnFunctionInvocation => {
                self.invoke_function(None)?;
            }
            Opcode::Conditional => {
                let condition = self.evaluate_bool()?;
                let skip = self.read_u16()?;
                if !condition {
                    self.cursor += usize::from(skip);
                }
            }
            Opcode::CursorMoveForward => {
                let distance = self.read_u16()?;
                self.cursor += usize::from(distance);
            }
            Opcode::CursorMoveBack => {
                let distance = self.read_u16()?;
                self.cursor = self
                    .cursor
                    .checked_sub(usize::from(distance))
                    .filter(|&cursor| cursor >= HEADER_SIZE)
                    .ok_or_else(|| malformed(position, "jump before start of program"))?;
            }
            Opcode::ProgramExit => return Ok(StepResult::Exit),
            Opcode::Metadata => {
                let text = self.read_str()?;
                if let Some(metadata) = self.callbacks.metadata.as_mut() {
                    metadata(text);
                }
            }
            Opcode::DebugLine => {
                let line = self.read_u16()?;
                if let Some(debug_line) = self.callbacks.debug_line.as_mut() {
                    debug_line(line);
                }
            }
            Opcode::DebugUpdateVariable => {
                let name = self.read_str()?;
                let data_type = self.read_data_type()?;
                let value = self.evaluate(data_type)?;
                if let Some(update) = self.callbacks.debug_variable_update.as_mut() {
                    update(name, &value);
                }
            }
            Opcode::DebugDeleteVariable => {
                let name = self.read_str()?;
                if let Some(delete) = self.callbacks.debug_variable_delete.as_mut() {
                    delete(name);
                }
            }
            other => {
                return Err(malformed(
                    position,
                    format!("{} is not a statement", other.name()),
                ))
            }
        }
        Ok(StepResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::bytecode::Buffer;

    fn program(primitive_size: u16, string_count: u16, body: Buffer) -> Vec<u8> {
        let mut bytes = primitive_size.to_le_bytes().to_vec();
        bytes.extend_from_slice(&string_count.to_le_bytes());
        bytes.extend_from_slice(body.bytes());
        bytes
    }

    fn global_call(body: &mut Buffer, symbol: u16, arguments: &[(DataType, crate::types::Literal)]) {
        body.push_opcode(Opcode::UnusedReturnFunctionInvocation);
        body.push_opcode(Opcode::NoOp);
        body.push_u16(symbol);
        body.push_u8(arguments.len() as u8);
        for (data_type, literal) in arguments {
            body.push_data_type(*data_type);
            body.push_literal(literal);
        }
    }

    #[test]
    fn missing_invoke_function_reports_error_once() {
        use crate::types::Literal;

        let mut body = Buffer::new();
        global_call(&mut body, 1, &[(DataType::Int32, Literal::Int32(5))]);
        let bytecode = program(0, 0, body);

        let errors = Rc::new(RefCell::new(vec![]));
        let sink = errors.clone();
        let mut callbacks = Callbacks::new().on_error(move |e| sink.borrow_mut().push(e.clone()));

        let result = execute(&bytecode, &mut callbacks);

        assert_eq!(result, Err(RuntimeError::MissingCallback("invoke_function")));
        assert_eq!(
            *errors.borrow(),
            vec![RuntimeError::MissingCallback("invoke_function")]
        );
        assert_eq!(errors.borrow()[0].to_string(), "missing callback: invoke_function");
    }

    #[test]
    fn runs_a_counting_loop() {
        use crate::types::Literal;

        // uint8 i = 0; while (i < 3) { f(i); i = i + 1; }
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Assign);
        body.push_data_type(DataType::UInt8);
        body.push_u16(0);
        body.push_literal(&Literal::UInt8(0));

        let mut scope = Buffer::new();
        scope.push_opcode(Opcode::UnusedReturnFunctionInvocation);
        scope.push_opcode(Opcode::NoOp);
        scope.push_u16(9);
        scope.push_u8(1);
        scope.push_data_type(DataType::UInt8);
        scope.push_opcode(Opcode::Variable);
        scope.push_u16(0);
        scope.push_opcode(Opcode::Assign);
        scope.push_data_type(DataType::UInt8);
        scope.push_u16(0);
        scope.push_opcode(Opcode::Add);
        scope.push_opcode(Opcode::Variable);
        scope.push_u16(0);
        scope.push_literal(&Literal::UInt8(1));

        let mut looped = Buffer::new();
        looped.push_opcode(Opcode::Conditional);
        looped.push_opcode(Opcode::LessThan);
        looped.push_data_type(DataType::UInt8);
        looped.push_opcode(Opcode::Variable);
        looped.push_u16(0);
        looped.push_literal(&Literal::UInt8(3));
        looped.push_distance(scope.len() + 3);
        looped.append(scope, 0, 0);
        let back = looped.len() + 3;
        looped.push_opcode(Opcode::CursorMoveBack);
        looped.push_distance(back);
        body.append(looped, 0, 0);

        let bytecode = program(1, 0, body);
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let mut callbacks = Callbacks::new().on_invoke_function(move |target, symbol, args| {
            assert!(target.is_null());
            assert_eq!(symbol, Symbol::from(9));
            sink.borrow_mut().push(args[0].clone());
            Parameter::Uninitialized
        });

        execute(&bytecode, &mut callbacks).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![Parameter::UInt8(0), Parameter::UInt8(1), Parameter::UInt8(2)]
        );
    }

    #[test]
    fn wrong_return_type_halts() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Assign);
        body.push_data_type(DataType::Int32);
        body.push_u16(0);
        body.push_opcode(Opcode::FunctionInvocation);
        body.push_opcode(Opcode::NoOp);
        body.push_u16(1);
        body.push_u8(0);
        let bytecode = program(4, 0, body);

        let mut callbacks = Callbacks::new().on_invoke_function(|_, _, _| Parameter::from("nope"));
        assert_eq!(
            execute(&bytecode, &mut callbacks),
            Err(RuntimeError::ReturnValueTypeMismatch {
                expected: DataType::Int32,
                found: "string".into()
            })
        );
    }

    #[test]
    fn dead_branches_skip_host_calls() {
        // int32 x = true ? 7 : f();
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Assign);
        body.push_data_type(DataType::Int32);
        body.push_u16(0);
        body.push_opcode(Opcode::TernaryConditional);
        body.push_opcode(Opcode::LiteralTrue);
        body.push_literal(&crate::types::Literal::Int32(7));
        body.push_opcode(Opcode::FunctionInvocation);
        body.push_opcode(Opcode::NoOp);
        body.push_u16(1);
        body.push_u8(0);
        body.push_opcode(Opcode::DebugUpdateVariable);
        body.push_string("x");
        body.push_data_type(DataType::Int32);
        body.push_opcode(Opcode::Variable);
        body.push_u16(0);
        let bytecode = program(4, 0, body);

        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let mut callbacks = Callbacks::new().on_debug_variable_update(move |name, value| {
            sink.borrow_mut().push((name.to_string(), value.to_text()))
        });
        execute(&bytecode, &mut callbacks).unwrap();
        assert_eq!(*seen.borrow(), vec![("x".to_string(), "7".to_string())]);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Assign);
        body.push_data_type(DataType::UInt16);
        body.push_u16(0);
        body.push_opcode(Opcode::Divide);
        body.push_literal(&crate::types::Literal::UInt16(4));
        body.push_opcode(Opcode::Variable);
        body.push_u16(0);
        let bytecode = program(2, 0, body);
        assert_eq!(
            execute(&bytecode, &mut Callbacks::new()),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn strings_concatenate_into_owned_slots() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Assign);
        body.push_data_type(DataType::String);
        body.push_u16(0);
        body.push_opcode(Opcode::Concat);
        body.push_literal(&crate::types::Literal::String("a".into()));
        body.push_opcode(Opcode::Typecast);
        body.push_data_type(DataType::Float64);
        body.push_literal(&crate::types::Literal::Float64(0.5));
        body.push_opcode(Opcode::Metadata);
        body.push_string("done");
        body.push_opcode(Opcode::DebugUpdateVariable);
        body.push_string("s");
        body.push_data_type(DataType::String);
        body.push_opcode(Opcode::Variable);
        body.push_u16(0);
        let bytecode = program(0, 1, body);

        let seen = Rc::new(RefCell::new(vec![]));
        let updates = seen.clone();
        let metadata = seen.clone();
        let mut callbacks = Callbacks::new()
            .on_metadata(move |text| metadata.borrow_mut().push(text.to_string()))
            .on_debug_variable_update(move |_, value| updates.borrow_mut().push(value.to_text()));
        execute(&bytecode, &mut callbacks).unwrap();
        assert_eq!(*seen.borrow(), vec!["done".to_string(), "a0.5".to_string()]);
    }

    #[test]
    fn unknown_opcode_is_malformed() {
        let bytecode = program(0, 0, {
            let mut body = Buffer::new();
            body.push_u8(250);
            body
        });
        assert!(matches!(
            execute(&bytecode, &mut Callbacks::new()),
            Err(RuntimeError::MalformedBytecode { position: 4, .. })
        ));
    }

    #[test]
    fn exit_stops_execution() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::ProgramExit);
        body.push_u8(250);
        assert_eq!(execute(&program(0, 0, body), &mut Callbacks::new()), Ok(()));
    }
}
