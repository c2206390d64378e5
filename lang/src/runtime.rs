//! A console host for running scripts from the command line.
//!
//! Scripts reach the console through a small global API, which they declare themselves
//! (or import from a file containing [`CONSOLE_API`]):
//!
//! ```text
//! #global {
//!     void print(...);
//!     string readLine();
//! }
//! ```

use std::{
    cell::RefCell,
    collections::BTreeMap,
    io::{self, BufRead, Write},
};

use itertools::Itertools;
use tracing::warn;

use crate::{
    bytecode::Symbol,
    vm::{self, Callbacks, Parameter, Pointer, RuntimeError, ScriptString},
};

pub const CONSOLE_API: &str = "#global {\n    void print(...);\n    string readLine();\n}\n";

const PRINT: &str = "GLOBAL_print_VARIADIC";
const READ_LINE: &str = "GLOBAL_readLine";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("script halted: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// What a running script has asked the console to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Print,
    ReadLine,
}

struct Console<R, W> {
    reader: R,
    writer: W,
    /// First write or read failure. Later output is dropped.
    failure: Option<io::Error>,
}

impl<R: BufRead, W: Write> Console<R, W> {
    fn emit(&mut self, text: std::fmt::Arguments) {
        if self.failure.is_some() {
            return;
        }
        if let Err(error) = self.writer.write_fmt(text) {
            self.failure = Some(error);
        }
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        if self.failure.is_none() {
            if let Err(error) = self.reader.read_line(&mut line) {
                self.failure = Some(error);
            }
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        line
    }
}

/// Executes `bytecode` with `print` writing to `writer` and `readLine` reading from
/// `reader`. With `debug`, metadata and debug events are written as they happen.
pub fn run<R: BufRead, W: Write>(
    bytecode: &[u8],
    symbols: &BTreeMap<String, Symbol>,
    debug: bool,
    reader: R,
    writer: W,
) -> Result<(), Error> {
    let builtins: BTreeMap<Symbol, Builtin> = [(PRINT, Builtin::Print), (READ_LINE, Builtin::ReadLine)]
        .into_iter()
        .filter_map(|(descriptor, builtin)| Some((*symbols.get(descriptor)?, builtin)))
        .collect();
    let console = RefCell::new(Console {
        reader,
        writer,
        failure: None,
    });

    let mut callbacks = Callbacks::new()
        .on_invoke_function(|target: Pointer, symbol, args| {
            if !target.is_null() {
                warn!(?symbol, "console has no objects");
                return Parameter::Uninitialized;
            }
            match builtins.get(&symbol) {
                Some(Builtin::Print) => {
                    let text = args.iter().map(Parameter::to_text).join(" ");
                    console.borrow_mut().emit(format_args!("{text}\n"));
                    Parameter::Uninitialized
                }
                Some(Builtin::ReadLine) => {
                    Parameter::String(ScriptString::Owned(console.borrow_mut().read_line()))
                }
                None => {
                    warn!(?symbol, "unknown console function");
                    Parameter::Uninitialized
                }
            }
        })
        .on_metadata(|text| console.borrow_mut().emit(format_args!("<?{text}?>\n")));
    if debug {
        callbacks = callbacks
            .on_debug_line(|line| console.borrow_mut().emit(format_args!("[line {line}]\n")))
            .on_debug_variable_update(|name, value| {
                console
                    .borrow_mut()
                    .emit(format_args!("[set {name} = {}]\n", value.to_text()))
            })
            .on_debug_variable_delete(|name| {
                console.borrow_mut().emit(format_args!("[drop {name}]\n"))
            });
    }

    let result = vm::execute(bytecode, &mut callbacks);
    drop(callbacks);
    let mut console = console.into_inner();
    if let Some(error) = console.failure.take() {
        return Err(error.into());
    }
    console.writer.flush()?;
    result.map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{Buffer, DataType, Opcode},
        types::Literal,
    };

    fn program(body: Buffer, allocated: u16) -> Vec<u8> {
        let mut bytes = vec![0, 0];
        bytes.extend_from_slice(&allocated.to_le_bytes());
        bytes.extend_from_slice(body.bytes());
        bytes
    }

    fn symbols() -> BTreeMap<String, Symbol> {
        BTreeMap::from([
            (PRINT.to_string(), Symbol::from(1)),
            (READ_LINE.to_string(), Symbol::from(2)),
        ])
    }

    #[test]
    fn echoes_a_line() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Metadata);
        body.push_string("hello");
        body.push_opcode(Opcode::UnusedReturnFunctionInvocation);
        body.push_opcode(Opcode::NoOp);
        body.push_u16(1);
        body.push_u8(2);
        body.push_data_type(DataType::String);
        body.push_literal(&Literal::String("got".into()));
        body.push_data_type(DataType::String);
        body.push_opcode(Opcode::FunctionInvocation);
        body.push_opcode(Opcode::NoOp);
        body.push_u16(2);
        body.push_u8(0);

        let mut out = vec![];
        run(&program(body, 0), &symbols(), false, "typed\nignored\n".as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<?hello?>\ngot typed\n");
    }

    #[test]
    fn debug_events_are_written_when_enabled() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::DebugLine);
        body.push_u16(7);
        body.push_opcode(Opcode::DebugDeleteVariable);
        body.push_string("x");

        let mut quiet = vec![];
        run(&program(body.clone(), 0), &symbols(), false, io::empty(), &mut quiet).unwrap();
        assert!(quiet.is_empty());

        let mut out = vec![];
        run(&program(body, 0), &symbols(), true, io::empty(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[line 7]\n[drop x]\n");
    }

    #[test]
    fn runtime_errors_are_returned() {
        let mut body = Buffer::new();
        body.push_opcode(Opcode::Placeholder);
        body.push_u16(0);
        let result = run(&program(body, 0), &symbols(), false, io::empty(), io::sink());
        assert!(matches!(
            result,
            Err(Error::Runtime(RuntimeError::MalformedBytecode { .. }))
        ));
    }
}
