//! Loads script files and their imports, and compiles each file at most once.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use itertools::Itertools;
use tracing::{debug, warn};
use typed_index_collections::TiVec;

use super::{
    codegen::FileCompiler,
    resolver::{self, Resolver},
    variables::VariableStack,
    CompileOptions, Error,
};
use crate::{
    ast::{ApiMember, Program},
    bytecode::{Buffer, Symbol},
    parser,
    source::{normalize, FileIndex, Location, Sources},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Loaded,
    Compiling,
    Compiled,
}

#[derive(Debug)]
struct Unit {
    /// `None` when the file could not be read or parsed.
    program: Option<Program>,
    dependencies: Vec<FileIndex>,
    state: State,
    errors: Vec<Error>,
    /// Code for the file and everything it imports, with its global variables. `None`
    /// when compilation was abandoned.
    compiled: Option<(Buffer, VariableStack)>,
}

pub struct Session {
    include_debug_bytes: bool,
    sources: Sources,
    units: TiVec<FileIndex, Unit>,
}

impl Session {
    pub fn new(options: &CompileOptions) -> Self {
        Self {
            include_debug_bytes: options.include_debug_bytes,
            sources: Sources::default(),
            units: TiVec::new(),
        }
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Reads and parses the file at `path` and, recursively, everything it imports.
    /// Loading a path twice returns the same index.
    pub fn load(&mut self, path: &Path) -> FileIndex {
        let path = normalize(path);
        if let Some(file_idx) = self.sources.find(&path) {
            return file_idx;
        }
        debug!(path = %path.display(), "loading");
        let (source, read_error) = match fs::read_to_string(&path) {
            Ok(source) => (source, None),
            Err(error) => {
                debug!(path = %path.display(), %error, "unreadable");
                let error = Error::InFile {
                    path: path.clone(),
                    message: "Unable to read script file.".to_string(),
                };
                (String::new(), Some(error))
            }
        };
        let file_idx = self.sources.add(path.clone(), source);
        let mut unit = Unit {
            program: None,
            dependencies: vec![],
            state: State::Loaded,
            errors: read_error.into_iter().collect(),
            compiled: None,
        };
        if unit.errors.is_empty() {
            match parser::parse(file_idx, &self.sources.files[file_idx].source) {
                Ok(program) => unit.program = Some(program),
                Err(error) => unit.errors.push(self.parse_error(file_idx, error)),
            }
        }
        let imports = unit
            .program
            .iter()
            .flat_map(|p| p.imports())
            .map(|import| import.path.clone())
            .collect_vec();
        self.units.push(unit);

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let dependencies = imports
            .into_iter()
            .map(|import| self.load(&directory.join(import)))
            .collect();
        self.units[file_idx].dependencies = dependencies;
        file_idx
    }

    fn parse_error(&self, file_idx: FileIndex, error: parser::Error) -> Error {
        let location = match error.position {
            parser::Position::LineCol { line, col } => Location {
                file: self.sources.path(file_idx).to_path_buf(),
                line,
                col,
            },
            parser::Position::Span(span) => span.location(&self.sources),
        };
        Error::At {
            location,
            message: error.message,
        }
    }

    pub fn compile_if_needed(&mut self, file_idx: FileIndex) {
        if self.units[file_idx].state != State::Loaded {
            return;
        }
        self.units[file_idx].state = State::Compiling;
        self.compile(file_idx);
        self.units[file_idx].state = State::Compiled;
    }

    /// The file followed by everything it imports, depth first, each once.
    fn visible(&self, file_idx: FileIndex) -> Vec<FileIndex> {
        let mut order = vec![];
        let mut stack = vec![file_idx];
        while let Some(idx) = stack.pop() {
            if order.contains(&idx) {
                continue;
            }
            order.push(idx);
            stack.extend(self.units[idx].dependencies.iter().rev().copied());
        }
        order
    }

    /// A file reachable along more than one import path, or through an import cycle.
    fn duplicate_dependency(&self, file_idx: FileIndex) -> Option<FileIndex> {
        let mut seen = BTreeSet::from([file_idx]);
        let mut stack = self.units[file_idx].dependencies.clone();
        while let Some(idx) = stack.pop() {
            if !seen.insert(idx) {
                return Some(idx);
            }
            stack.extend(self.units[idx].dependencies.iter().copied());
        }
        None
    }

    fn inheritance_cycle(&self, file_idx: FileIndex) -> Option<Error> {
        let program = self.units[file_idx].program.as_ref()?;
        let visible = self.visible(file_idx);
        let resolver = Resolver::new(
            visible
                .iter()
                .filter_map(|&idx| self.units[idx].program.as_ref())
                .collect(),
        );
        program.types().find_map(|ty| {
            let cycle = resolver.find_inheritance_cycle(&ty.name.name)?;
            let first = cycle.first()?;
            Some(Error::At {
                location: ty.name.span.location(&self.sources),
                message: format!(
                    "Type inheritance forms a cycle: {} -> {first}.",
                    cycle.iter().join(" -> ")
                ),
            })
        })
    }

    fn compile(&mut self, file_idx: FileIndex) {
        if self.units[file_idx].program.is_none() {
            return;
        }
        if let Some(error) = self.inheritance_cycle(file_idx) {
            self.units[file_idx].errors.push(error);
            return;
        }
        if let Some(duplicate) = self.duplicate_dependency(file_idx) {
            let path = self.sources.path(file_idx).to_path_buf();
            let message = format!(
                "File at path '{}' exists more than once in the dependency graph.",
                self.sources.path(duplicate).display()
            );
            self.units[file_idx].errors.push(Error::InFile { path, message });
            return;
        }

        let mut buffer = Buffer::new();
        let mut variables = VariableStack::new();
        let mut conflicts = vec![];
        for dependency in self.units[file_idx].dependencies.clone() {
            self.compile_if_needed(dependency);
            let Some((dependency_buffer, dependency_variables)) = &self.units[dependency].compiled
            else {
                debug!(?dependency, "dependency failed to compile");
                return;
            };
            let primitive_base = u16::try_from(variables.max_primitive()).unwrap_or(u16::MAX);
            let allocated_base = u16::try_from(variables.max_allocated()).unwrap_or(u16::MAX);
            buffer.append(dependency_buffer.clone(), primitive_base, allocated_base);
            conflicts.extend(variables.append(dependency_variables));
        }
        buffer.zero_debug_lines();

        let mut errors = conflicts
            .into_iter()
            .map(|(name, variable)| Error::At {
                location: variable.span.location(&self.sources),
                message: format!(
                    "Variable '{name}' conflicts with a previously-declared variable of the same name."
                ),
            })
            .collect_vec();
        let (buffer, variables, diagnostics) = {
            let Some(program) = self.units[file_idx].program.as_ref() else {
                return;
            };
            let visible = self.visible(file_idx);
            let resolver = Resolver::new(
                visible
                    .iter()
                    .filter_map(|&idx| self.units[idx].program.as_ref())
                    .collect(),
            );
            let compiler = FileCompiler::new(
                &self.sources,
                &resolver,
                self.include_debug_bytes,
                variables,
            );
            compiler.compile(program, buffer)
        };
        debug!(
            path = %self.sources.path(file_idx).display(),
            bytes = buffer.len(),
            errors = diagnostics.len(),
            "compiled file"
        );
        errors.extend(diagnostics.into_errors(&self.sources));
        let unit = &mut self.units[file_idx];
        unit.errors.extend(errors);
        unit.compiled = Some((buffer, variables));
    }

    /// Every error reported so far, grouped by file in load order.
    pub fn errors(&self) -> Vec<Error> {
        self.units
            .iter()
            .flat_map(|unit| unit.errors.iter().cloned())
            .collect()
    }

    /// IDs for every function and property declared in any loaded file, numbered from 1
    /// in descriptor order.
    pub fn symbols(&self) -> BTreeMap<String, Symbol> {
        let mut descriptors = BTreeSet::new();
        for program in self.units.iter().filter_map(|unit| unit.program.as_ref()) {
            let members = program.globals().map(|m| (None, m)).chain(
                program
                    .types()
                    .flat_map(|t| t.members.iter().map(|m| (Some(t.name.name.as_str()), m))),
            );
            for (owner, member) in members {
                match member {
                    ApiMember::Function(function) => {
                        descriptors.insert(resolver::function_descriptor(owner, function));
                    }
                    ApiMember::Property(property) => {
                        descriptors.insert(resolver::property_descriptor(owner, property));
                    }
                    ApiMember::Subscript(_) => {}
                }
            }
        }
        descriptors
            .into_iter()
            .zip(1u16..)
            .map(|(descriptor, id)| (descriptor, Symbol::from(id)))
            .collect()
    }

    /// Final bytecode for a compiled file: the memory header followed by its code with
    /// symbol IDs filled in.
    pub fn bytecode(&self, file_idx: FileIndex, symbols: &BTreeMap<String, Symbol>) -> Option<Vec<u8>> {
        let (buffer, variables) = self.units[file_idx].compiled.as_ref()?;
        let mut buffer = buffer.clone();
        let missing = buffer.resolve_symbols(symbols);
        if !missing.is_empty() {
            warn!(?missing, "unresolved symbols");
            return None;
        }
        let primitive = u16::try_from(variables.max_primitive()).ok()?;
        let allocated = u16::try_from(variables.max_allocated()).ok()?;
        let mut header = Vec::with_capacity(4);
        header.extend_from_slice(&primitive.to_le_bytes());
        header.extend_from_slice(&allocated.to_le_bytes());
        buffer.prepend(&header);
        Some(buffer.into_bytes())
    }
}
