use std::{
    fmt::Display,
    path::{Component, Path, PathBuf},
};

use derive_more::derive::{From, Into};
use typed_index_collections::TiVec;

#[derive(From, Into, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIndex(usize);

#[derive(Default, Debug)]
pub struct Sources {
    pub files: TiVec<FileIndex, File>,
}

impl Sources {
    pub fn find(&self, path: &Path) -> Option<FileIndex> {
        self.files
            .iter_enumerated()
            .find(|(_, f)| f.path == path)
            .map(|(idx, _)| idx)
    }

    pub fn add(&mut self, path: PathBuf, source: String) -> FileIndex {
        self.files.push_and_get_key(File { path, source })
    }

    pub fn path(&self, file_idx: FileIndex) -> &Path {
        &self.files[file_idx].path
    }
}

#[derive(Default, Debug)]
pub struct File {
    pub path: PathBuf,
    pub source: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileSpan {
    pub file_idx: FileIndex,
    pub start: usize,
    pub end: usize,
}

impl FileSpan {
    pub fn from_ast(file_idx: FileIndex, span: pest::Span) -> Self {
        Self {
            file_idx,
            start: span.start(),
            end: span.end(),
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: FileSpan) -> Self {
        Self {
            file_idx: self.file_idx,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn as_str(self, sources: &Sources) -> &str {
        self.as_pest(sources).map_or("", |s| s.as_str())
    }

    pub fn as_pest(self, sources: &Sources) -> Option<pest::Span> {
        pest::Span::new(&sources.files[self.file_idx].source, self.start, self.end)
    }

    pub fn line(self, sources: &Sources) -> usize {
        self.location(sources).line
    }

    pub fn location(self, sources: &Sources) -> Location {
        let (line, col) = self
            .as_pest(sources)
            .map_or((0, 0), |s| s.start_pos().line_col());
        Location {
            file: sources.files[self.file_idx].path.clone(),
            line,
            col,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
    pub col: usize,
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}:{}:{}",
            self.file.display(),
            self.line,
            self.col
        ))
    }
}

/// Resolves `.` and `..` components without touching the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() && !result.has_root() {
                    result.push(component);
                }
            }
            other => result.push(other),
        }
    }
    result
}
