use crate::{
    source::FileSpan,
    types::{Primitive, Type},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub ty: Type,
    /// Byte address in primitive memory, or string-table index for strings.
    pub address: u16,
    pub span: FileSpan,
}

impl Variable {
    pub fn is_allocated(&self) -> bool {
        self.ty.primitive == Primitive::String
    }
}

#[derive(Debug, Clone, Default)]
struct Frame {
    variables: Vec<(String, Variable)>,
    primitive_cursor: usize,
    allocated_cursor: usize,
}

/// Lexical scopes of a single file. Each declaration takes the next free slot above
/// everything visible, and popping a frame releases its slots for reuse.
#[derive(Debug, Clone)]
pub struct VariableStack {
    frames: Vec<Frame>,
    primitive_cursor: usize,
    allocated_cursor: usize,
    max_primitive: usize,
    max_allocated: usize,
}

impl Default for VariableStack {
    fn default() -> Self {
        Self {
            frames: vec![Frame::default()],
            primitive_cursor: 0,
            allocated_cursor: 0,
            max_primitive: 0,
            max_allocated: 0,
        }
    }
}

impl VariableStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of primitive memory a script needs.
    pub fn max_primitive(&self) -> usize {
        self.max_primitive
    }

    /// Entries of the string table a script needs.
    pub fn max_allocated(&self) -> usize {
        self.max_allocated
    }

    pub fn push(&mut self) {
        self.frames.push(Frame {
            variables: vec![],
            primitive_cursor: self.primitive_cursor,
            allocated_cursor: self.allocated_cursor,
        });
    }

    /// Discards the innermost frame and returns what it declared. The global frame is
    /// never popped.
    pub fn pop(&mut self) -> Vec<(String, Variable)> {
        if self.frames.len() == 1 {
            return vec![];
        }
        let Some(frame) = self.frames.pop() else {
            return vec![];
        };
        self.primitive_cursor = frame.primitive_cursor;
        self.allocated_cursor = frame.allocated_cursor;
        frame.variables
    }

    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.variables.iter())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Claims storage for a new variable in the innermost frame and returns its address.
    pub fn declare(&mut self, name: &str, ty: Type, span: FileSpan) -> Result<u16, String> {
        if self.find(name).is_some() {
            return Err(format!(
                "Variable '{name}' conflicts with a previously-declared variable of the same name."
            ));
        }
        let (cursor, size) = if ty.primitive == Primitive::String {
            (&mut self.allocated_cursor, 1)
        } else {
            (&mut self.primitive_cursor, usize::from(ty.primitive.byte_size()))
        };
        let address = u16::try_from(*cursor)
            .ok()
            .filter(|_| *cursor + size <= usize::from(u16::MAX))
            .ok_or_else(|| {
                "Variables in this script exceed the memory a script can address.".to_string()
            })?;
        *cursor += size;
        self.max_primitive = self.max_primitive.max(self.primitive_cursor);
        self.max_allocated = self.max_allocated.max(self.allocated_cursor);
        self.top().variables.push((
            name.to_string(),
            Variable { ty, address, span },
        ));
        Ok(address)
    }

    fn top(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Makes the globals of a compiled dependency visible, relocated above everything this
    /// stack has used so far. Returns the dependency's variables whose names were already
    /// taken.
    pub fn append(&mut self, other: &VariableStack) -> Vec<(String, Variable)> {
        let primitive_base = self.max_primitive;
        let allocated_base = self.max_allocated;
        let mut conflicts = vec![];
        for (name, variable) in other.frames.iter().take(1).flat_map(|f| f.variables.iter()) {
            if self.find(name).is_some() {
                conflicts.push((name.clone(), variable.clone()));
                continue;
            }
            let base = if variable.is_allocated() {
                allocated_base
            } else {
                primitive_base
            };
            let address = (usize::from(variable.address) + base).min(usize::from(u16::MAX));
            self.top().variables.push((
                name.clone(),
                Variable {
                    address: address as u16,
                    ..variable.clone()
                },
            ));
        }
        self.primitive_cursor = primitive_base + other.max_primitive;
        self.allocated_cursor = allocated_base + other.max_allocated;
        self.max_primitive = self.max_primitive.max(self.primitive_cursor);
        self.max_allocated = self.max_allocated.max(self.allocated_cursor);
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileIndex;

    fn span() -> FileSpan {
        FileSpan {
            file_idx: FileIndex::from(0),
            start: 0,
            end: 0,
        }
    }

    #[test]
    fn sibling_scopes_reuse_memory() {
        let mut stack = VariableStack::new();
        assert_eq!(stack.declare("a", Primitive::Int32.into(), span()), Ok(0));
        stack.push();
        assert_eq!(stack.declare("b", Primitive::Int64.into(), span()), Ok(4));
        assert_eq!(stack.declare("s", Primitive::String.into(), span()), Ok(0));
        let popped: Vec<_> = stack.pop().into_iter().map(|(n, _)| n).collect();
        assert_eq!(popped, vec!["b", "s"]);
        stack.push();
        assert_eq!(stack.declare("c", Primitive::UInt8.into(), span()), Ok(4));
        stack.pop();
        assert_eq!(stack.max_primitive(), 12);
        assert_eq!(stack.max_allocated(), 1);
        assert!(stack.find("b").is_none());
    }

    #[test]
    fn names_are_unique_across_frames() {
        let mut stack = VariableStack::new();
        stack.declare("x", Primitive::Bool.into(), span()).unwrap();
        stack.push();
        assert_eq!(
            stack.declare("x", Primitive::Int8.into(), span()),
            Err("Variable 'x' conflicts with a previously-declared variable of the same name.".into())
        );
    }

    #[test]
    fn appended_globals_move_above_existing_storage() {
        let mut dependency = VariableStack::new();
        dependency.declare("d", Primitive::Int16.into(), span()).unwrap();
        dependency.declare("t", Primitive::String.into(), span()).unwrap();
        dependency.push();
        dependency.declare("scoped", Primitive::Int64.into(), span()).unwrap();
        dependency.pop();

        let mut stack = VariableStack::new();
        stack.declare("mine", Primitive::Float64.into(), span()).unwrap();
        stack.declare("text", Primitive::String.into(), span()).unwrap();
        assert!(stack.append(&dependency).is_empty());

        assert_eq!(stack.find("d").map(|v| v.address), Some(8));
        assert_eq!(stack.find("t").map(|v| v.address), Some(1));
        assert!(stack.find("scoped").is_none());
        assert_eq!(stack.max_primitive(), 8 + 10);
        assert_eq!(stack.declare("next", Primitive::UInt8.into(), span()), Ok(18));
    }

    #[test]
    fn appending_reports_conflicts() {
        let mut dependency = VariableStack::new();
        dependency.declare("x", Primitive::Int8.into(), span()).unwrap();
        let mut stack = VariableStack::new();
        stack.declare("x", Primitive::Int8.into(), span()).unwrap();
        let conflicts = stack.append(&dependency);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].0, "x");
    }
}
