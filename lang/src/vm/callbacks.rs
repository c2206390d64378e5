use super::{
    value::{Parameter, Pointer},
    RuntimeError,
};
use crate::bytecode::Symbol;

pub type InvokeFunction<'a> = dyn FnMut(Pointer, Symbol, &[Parameter<'a>]) -> Parameter<'a> + 'a;
pub type InvokeSubscript<'a> = dyn FnMut(Pointer, Parameter<'a>) -> Parameter<'a> + 'a;
pub type AssignProperty<'a> = dyn FnMut(Pointer, Symbol, Parameter<'a>) + 'a;
pub type AssignSubscript<'a> = dyn FnMut(Pointer, Parameter<'a>, Parameter<'a>) + 'a;

/// How a running script reaches the host. `invoke_function`, `invoke_subscript`,
/// `assign_property` and `assign_subscript` are required by any script that uses them;
/// the remaining hooks are optional and their events are dropped when absent.
///
/// Global functions and properties are invoked with [`Pointer::NULL`].
#[derive(Default)]
pub struct Callbacks<'a> {
    pub invoke_function: Option<Box<InvokeFunction<'a>>>,
    pub invoke_subscript: Option<Box<InvokeSubscript<'a>>>,
    pub assign_property: Option<Box<AssignProperty<'a>>>,
    pub assign_subscript: Option<Box<AssignSubscript<'a>>>,
    pub metadata: Option<Box<dyn FnMut(&str) + 'a>>,
    pub debug_line: Option<Box<dyn FnMut(u16) + 'a>>,
    pub debug_variable_update: Option<Box<dyn FnMut(&str, &Parameter<'a>) + 'a>>,
    pub debug_variable_delete: Option<Box<dyn FnMut(&str) + 'a>>,
    pub error: Option<Box<dyn FnMut(&RuntimeError) + 'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_invoke_function(
        mut self,
        f: impl FnMut(Pointer, Symbol, &[Parameter<'a>]) -> Parameter<'a> + 'a,
    ) -> Self {
        self.invoke_function = Some(Box::new(f));
        self
    }

    pub fn on_invoke_subscript(
        mut self,
        f: impl FnMut(Pointer, Parameter<'a>) -> Parameter<'a> + 'a,
    ) -> Self {
        self.invoke_subscript = Some(Box::new(f));
        self
    }

    pub fn on_assign_property(mut self, f: impl FnMut(Pointer, Symbol, Parameter<'a>) + 'a) -> Self {
        self.assign_property = Some(Box::new(f));
        self
    }

    pub fn on_assign_subscript(
        mut self,
        f: impl FnMut(Pointer, Parameter<'a>, Parameter<'a>) + 'a,
    ) -> Self {
        self.assign_subscript = Some(Box::new(f));
        self
    }

    pub fn on_metadata(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.metadata = Some(Box::new(f));
        self
    }

    pub fn on_debug_line(mut self, f: impl FnMut(u16) + 'a) -> Self {
        self.debug_line = Some(Box::new(f));
        self
    }

    pub fn on_debug_variable_update(mut self, f: impl FnMut(&str, &Parameter<'a>) + 'a) -> Self {
        self.debug_variable_update = Some(Box::new(f));
        self
    }

    pub fn on_debug_variable_delete(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.debug_variable_delete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&RuntimeError) + 'a) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}
