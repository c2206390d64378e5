//! Turns `.skn` scripts into relocatable bytecode.

use std::{
    collections::BTreeMap,
    fmt::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    bytecode::{Symbol, MAX_BYTECODE_LENGTH},
    source::{FileSpan, Location, Sources},
};

mod codegen;
mod constant;
mod declarations;
mod expression;
pub mod resolver;
mod session;
pub mod variables;

pub use constant::evaluate;
pub use session::Session;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{location}: {message}")]
    At { location: Location, message: String },

    #[error("{}: {message}", path.display())]
    InFile { path: PathBuf, message: String },

    #[error("{message}")]
    General { message: String },
}

impl Error {
    pub fn message(&self) -> &str {
        match self {
            Error::At { message, .. } | Error::InFile { message, .. } | Error::General { message } => {
                message
            }
        }
    }
}

/// Collects the problems found while compiling one file, in the order they are found.
#[derive(Debug, Default)]
pub struct Diagnostics {
    reports: Vec<(FileSpan, String)>,
}

impl Diagnostics {
    pub fn report(&mut self, span: FileSpan, message: impl Into<String>) {
        let message = message.into();
        debug!(start = span.start, %message, "diagnostic");
        // Expressions are type checked more than once on some paths.
        if self.reports.iter().any(|(s, m)| *s == span && *m == message) {
            return;
        }
        self.reports.push((span, message));
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn into_errors(self, sources: &Sources) -> Vec<Error> {
        self.reports
            .into_iter()
            .map(|(span, message)| Error::At {
                location: span.location(sources),
                message,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Emit `DebugLine` and variable tracking instructions for the root files.
    pub include_debug_bytes: bool,
    /// Name of the module in the generated symbol table.
    pub symbols_prefix: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_debug_bytes: false,
            symbols_prefix: "symbols".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CompileResult {
    /// Rust source declaring one constant per symbol.
    pub symbol_table: String,
    pub symbols: BTreeMap<String, Symbol>,
    /// Bytecode for each root path, header included. Empty when `errors` is not.
    pub compiled_files: BTreeMap<PathBuf, Vec<u8>>,
    pub errors: Vec<Error>,
}

impl CompileResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compiles each script in `paths` along with everything it imports.
pub fn compile(paths: &[PathBuf], options: &CompileOptions) -> CompileResult {
    let mut session = Session::new(options);
    let mut errors = vec![];
    let mut roots = vec![];
    for path in paths {
        if !path.is_absolute() {
            errors.push(Error::General {
                message: format!(
                    "Path '{}' must be specified as an absolute path.",
                    path.display()
                ),
            });
            continue;
        }
        let file_idx = session.load(path);
        session.compile_if_needed(file_idx);
        roots.push(file_idx);
    }
    errors.extend(session.errors());

    let symbols = session.symbols();
    let mut compiled_files = BTreeMap::new();
    if errors.is_empty() {
        for file_idx in roots {
            let path = session.sources().path(file_idx).to_path_buf();
            let Some(bytes) = session.bytecode(file_idx, &symbols) else {
                continue;
            };
            if bytes.len() > MAX_BYTECODE_LENGTH {
                errors.push(size_error(&path, bytes.len()));
                continue;
            }
            debug!(path = %path.display(), bytes = bytes.len(), "compiled");
            compiled_files.insert(path, bytes);
        }
    }
    if !errors.is_empty() {
        compiled_files.clear();
    }

    CompileResult {
        symbol_table: symbol_table(&options.symbols_prefix, &symbols),
        symbols,
        compiled_files,
        errors,
    }
}

fn size_error(path: &Path, len: usize) -> Error {
    Error::InFile {
        path: path.to_path_buf(),
        message: format!(
            "Compiled bytecode is {len} bytes, which exceeds the {MAX_BYTECODE_LENGTH} bytes a 16-bit cursor can address."
        ),
    }
}

/// Renders the symbol IDs as a Rust module for host applications to include.
pub fn symbol_table(prefix: &str, symbols: &BTreeMap<String, Symbol>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#[allow(non_upper_case_globals)]");
    let _ = writeln!(out, "pub mod {prefix} {{");
    for (descriptor, symbol) in symbols {
        let _ = writeln!(out, "    pub const {descriptor}: u16 = {};", u16::from(*symbol));
    }
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn relative_paths_are_rejected() {
        let result = compile(&[PathBuf::from("relative.skn")], &CompileOptions::default());
        assert_eq!(
            result.errors,
            vec![Error::General {
                message: "Path 'relative.skn' must be specified as an absolute path.".into()
            }]
        );
        assert!(result.compiled_files.is_empty());
    }

    #[test]
    fn symbol_table_lists_constants_in_order() {
        let symbols = BTreeMap::from([
            ("GLOBAL_b".to_string(), Symbol::from(2)),
            ("GLOBAL_a".to_string(), Symbol::from(1)),
        ]);
        assert_eq!(
            symbol_table("api", &symbols),
            "#[allow(non_upper_case_globals)]\npub mod api {\n    pub const GLOBAL_a: u16 = 1;\n    pub const GLOBAL_b: u16 = 2;\n}\n"
        );
    }

    #[test]
    fn compiles_a_file_with_an_import() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("api.skn"),
            "#global { void print(...); int32 limit; }",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.skn"),
            "#import \"api.skn\"\nint32 x = limit;\nprint(x);",
        )
        .unwrap();
        let main = dir.path().join("main.skn");

        let result = compile(&[main.clone()], &CompileOptions::default());

        assert_eq!(result.errors, vec![]);
        assert_eq!(
            result.symbols.keys().collect::<Vec<_>>(),
            vec!["GLOBAL_limit", "GLOBAL_print_VARIADIC"]
        );
        assert_eq!(result.symbols["GLOBAL_limit"], Symbol::from(1));
        let bytes = &result.compiled_files[&main];
        assert_eq!(&bytes[..4], &[4, 0, 0, 0]);
    }

    #[test]
    fn errors_carry_locations() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.skn");
        fs::write(&main, "int32 x = 1;\nbool y = x;").unwrap();

        let result = compile(&[main.clone()], &CompileOptions::default());

        assert!(result.compiled_files.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].to_string(),
            format!(
                "{}:2:10: Expression is required to be of type bool, but was int32 instead.",
                main.display()
            )
        );
    }
}
