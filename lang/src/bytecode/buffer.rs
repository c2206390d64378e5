//! Append-only bytecode sink with a side table of locations that get rewritten once the
//! final layout is known.

use std::collections::BTreeMap;

use super::{DataType, Opcode, Symbol};
use crate::types::Literal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Placeholder jump emitted by `break`. Points at the opcode.
    Break,
    /// Placeholder jump emitted by `continue`. Points at the opcode.
    Continue,
    /// u16 byte address into the primitive memory region.
    PrimitiveVariableAddress,
    /// u16 index into the string table.
    AllocatedVariableIndex,
    /// u16 symbol ID, looked up by descriptor once every file is compiled.
    FunctionSymbol(String),
    /// u16 source line.
    DebugLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub location: usize,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    bytes: Vec<u8>,
    annotations: Vec<Annotation>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn push_opcode(&mut self, opcode: Opcode) {
        self.bytes.push(opcode as u8);
    }

    pub fn push_data_type(&mut self, data_type: DataType) {
        self.bytes.push(data_type as u8);
    }

    pub fn push_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn push_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u16 distance. Oversized distances saturate; the total length check rejects
    /// any program large enough to produce one.
    pub fn push_distance(&mut self, distance: usize) {
        self.push_u16(u16::try_from(distance).unwrap_or(u16::MAX));
    }

    /// Null-terminated string.
    pub fn push_string(&mut self, value: &str) {
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
    }

    /// `Literal` opcode followed by the value's little-endian bytes. Booleans and `NULL`
    /// have dedicated opcodes. Ambiguous literals are written at 64-bit width.
    pub fn push_literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Bool(true) => return self.push_opcode(Opcode::LiteralTrue),
            Literal::Bool(false) => return self.push_opcode(Opcode::LiteralFalse),
            Literal::Null => return self.push_opcode(Opcode::LiteralNull),
            _ => {}
        }
        self.push_opcode(Opcode::Literal);
        match literal {
            Literal::Int8(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::Int16(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::Int32(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::Int64(v) | Literal::AmbiguousSignedInt(v) => {
                self.bytes.extend_from_slice(&v.to_le_bytes())
            }
            Literal::UInt8(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::UInt16(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::UInt32(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::UInt64(v) | Literal::AmbiguousInt(v) => {
                self.bytes.extend_from_slice(&v.to_le_bytes())
            }
            Literal::Float32(v) => self.bytes.extend_from_slice(&v.to_le_bytes()),
            Literal::Float64(v) | Literal::AmbiguousFloat(v) => {
                self.bytes.extend_from_slice(&v.to_le_bytes())
            }
            Literal::String(s) => self.push_string(s),
            Literal::Bool(_) | Literal::Null => {}
        }
    }

    /// Records an annotation at the current end of the buffer.
    pub fn annotate(&mut self, kind: AnnotationKind) {
        self.annotations.push(Annotation {
            location: self.bytes.len(),
            kind,
        });
    }

    pub fn overwrite_u16(&mut self, location: usize, value: u16) {
        self.bytes[location..location + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn read_u16(&self, location: usize) -> u16 {
        u16::from_le_bytes([self.bytes[location], self.bytes[location + 1]])
    }

    pub fn prepend(&mut self, bytes: &[u8]) {
        self.bytes.splice(0..0, bytes.iter().copied());
        for annotation in self.annotations.iter_mut() {
            annotation.location += bytes.len();
        }
    }

    /// Consumes `other`, appending its bytes and annotations. Variable addresses and string
    /// indices inside `other` are shifted by the given bases so they land above any storage
    /// already claimed by `self`.
    pub fn append(&mut self, mut other: Buffer, primitive_base: u16, allocated_base: u16) {
        let relocations = other
            .annotations
            .iter()
            .filter_map(|annotation| match annotation.kind {
                AnnotationKind::PrimitiveVariableAddress => Some((annotation.location, primitive_base)),
                AnnotationKind::AllocatedVariableIndex => Some((annotation.location, allocated_base)),
                _ => None,
            })
            .filter(|&(_, base)| base != 0)
            .collect::<Vec<_>>();
        for (location, base) in relocations {
            let shifted = other.read_u16(location).wrapping_add(base);
            other.overwrite_u16(location, shifted);
        }
        let offset = self.bytes.len();
        self.bytes.append(&mut other.bytes);
        self.annotations
            .extend(other.annotations.into_iter().map(|annotation| Annotation {
                location: annotation.location + offset,
                kind: annotation.kind,
            }));
    }

    /// Rewrites every `Break` or `Continue` placeholder into a cursor move, either forward to
    /// the end of the buffer or back to its start.
    pub fn resolve_control_flow(&mut self, kind: AnnotationKind, to_end: bool) {
        let len = self.bytes.len();
        for idx in (0..self.annotations.len()).rev() {
            if self.annotations[idx].kind != kind {
                continue;
            }
            let location = self.annotations[idx].location;
            let end = location + 3;
            let (opcode, distance) = if to_end {
                (Opcode::CursorMoveForward, len - end)
            } else {
                (Opcode::CursorMoveBack, end)
            };
            self.bytes[location] = opcode as u8;
            self.overwrite_u16(location + 1, u16::try_from(distance).unwrap_or(u16::MAX));
            self.annotations.remove(idx);
        }
    }

    /// Writes final symbol IDs. Returns the descriptors that had no entry in `symbols`.
    pub fn resolve_symbols(&mut self, symbols: &BTreeMap<String, Symbol>) -> Vec<String> {
        let mut missing = vec![];
        let annotations = std::mem::take(&mut self.annotations);
        for annotation in annotations {
            match &annotation.kind {
                AnnotationKind::FunctionSymbol(descriptor) => match symbols.get(descriptor) {
                    Some(symbol) => self.overwrite_u16(annotation.location, (*symbol).into()),
                    None => missing.push(descriptor.clone()),
                },
                _ => self.annotations.push(annotation),
            }
        }
        missing
    }

    /// Sets every debug line operand to zero without changing the buffer's length.
    pub fn zero_debug_lines(&mut self) {
        let annotations = std::mem::take(&mut self.annotations);
        for annotation in annotations {
            if annotation.kind == AnnotationKind::DebugLine {
                self.overwrite_u16(annotation.location, 0);
            } else {
                self.annotations.push(annotation);
            }
        }
    }
}
