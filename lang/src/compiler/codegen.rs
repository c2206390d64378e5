//! Statement code generation for one file.

use tracing::trace;

use super::{
    constant::evaluate, expression::binary_opcode, resolver::Resolver, variables::Variable,
    variables::VariableStack, Diagnostics,
};
use crate::{
    ast::{
        Assignment, BinaryOp, Conditional, DoWhileLoop, Else, Expression, ForLoop, Imperative,
        ImperativeKind, ObjectExpression, ObjectKind, Program, Scope, Statement,
        VariableDeclaration, WhileLoop,
    },
    bytecode::{AnnotationKind, Buffer, DataType, Opcode},
    source::{FileSpan, Sources},
    types::{Literal, Primitive, Type},
};

/// The value written by an assignment-like statement.
enum Update<'e> {
    Assign {
        operator: Option<BinaryOp>,
        value: &'e Expression,
    },
    Step {
        decrement: bool,
    },
}

impl Update<'_> {
    fn operator(&self) -> Option<BinaryOp> {
        match self {
            Update::Assign { operator, .. } => *operator,
            Update::Step { decrement: false } => Some(BinaryOp::Add),
            Update::Step { decrement: true } => Some(BinaryOp::Subtract),
        }
    }
}

pub(super) struct FileCompiler<'a> {
    pub(super) sources: &'a Sources,
    pub(super) resolver: &'a Resolver<'a>,
    pub(super) include_debug_bytes: bool,
    pub(super) variables: VariableStack,
    pub(super) diagnostics: Diagnostics,
    loop_depth: usize,
    scope_depth: usize,
}

impl<'a> FileCompiler<'a> {
    pub(super) fn new(
        sources: &'a Sources,
        resolver: &'a Resolver<'a>,
        include_debug_bytes: bool,
        variables: VariableStack,
    ) -> Self {
        Self {
            sources,
            resolver,
            include_debug_bytes,
            variables,
            diagnostics: Diagnostics::default(),
            loop_depth: 0,
            scope_depth: 0,
        }
    }

    /// Appends the code for `program` to `buffer`, which already holds the code of its
    /// dependencies.
    pub(super) fn compile(
        mut self,
        program: &Program,
        mut buffer: Buffer,
    ) -> (Buffer, VariableStack, Diagnostics) {
        self.statements(&program.statements, &mut buffer);
        (buffer, self.variables, self.diagnostics)
    }

    fn statements(&mut self, statements: &[Statement], buffer: &mut Buffer) {
        for statement in statements {
            self.statement(statement, buffer);
        }
    }

    fn statement(&mut self, statement: &Statement, buffer: &mut Buffer) {
        match statement {
            Statement::Import(import) => self.top_level_only(import.span),
            Statement::Global(global) => {
                self.top_level_only(global.span);
                self.api_global(global);
            }
            Statement::Type(ty) => {
                self.top_level_only(ty.span);
                self.api_type(ty);
            }
            Statement::Metadata(metadata) => {
                buffer.push_opcode(Opcode::Metadata);
                buffer.push_string(&metadata.text);
            }
            Statement::Scope(scope) => self.scope(scope, buffer),
            Statement::While(while_loop) => self.while_loop(while_loop, buffer),
            Statement::For(for_loop) => self.for_loop(for_loop, buffer),
            Statement::DoWhile(do_while) => self.do_while_loop(do_while, buffer),
            Statement::Conditional(conditional) => self.conditional(conditional, buffer),
            Statement::Imperative(imperative) => self.imperative(imperative, buffer),
        }
    }

    fn top_level_only(&mut self, span: FileSpan) {
        if self.scope_depth > 0 {
            self.diagnostics.report(
                span,
                "Imports and API declarations can only appear at the top level of a file.",
            );
        }
    }

    fn scope(&mut self, scope: &Scope, buffer: &mut Buffer) {
        self.variables.push();
        self.scope_depth += 1;
        self.statements(&scope.statements, buffer);
        self.scope_depth -= 1;
        self.pop_frame(buffer);
    }

    fn pop_frame(&mut self, buffer: &mut Buffer) {
        let popped = self.variables.pop();
        if !self.include_debug_bytes {
            return;
        }
        for (name, _) in popped {
            buffer.push_opcode(Opcode::DebugDeleteVariable);
            buffer.push_string(&name);
        }
    }

    fn loop_body(&mut self, scope: &Scope) -> Buffer {
        let mut body = Buffer::new();
        self.loop_depth += 1;
        self.scope(scope, &mut body);
        self.loop_depth -= 1;
        body
    }

    fn constant_condition(&mut self, condition: &Expression) -> Option<bool> {
        evaluate(condition, &mut self.diagnostics).and_then(|literal| literal.as_bool())
    }

    /// Wraps `body` in the condition check and the jump back to the top. `condition` is
    /// `None` for loops that only end through `break` or `exit`.
    fn close_loop(&mut self, condition: Option<&Expression>, body: Buffer) -> Buffer {
        let mut looped = Buffer::new();
        if let Some(condition) = condition {
            looped.push_opcode(Opcode::Conditional);
            self.expression(condition, &Primitive::Bool.into(), &mut looped);
            looped.push_distance(body.len() + 3);
        }
        looped.append(body, 0, 0);
        looped.push_opcode(Opcode::CursorMoveBack);
        looped.push_distance(looped.len() + 2);
        looped
    }

    fn while_loop(&mut self, while_loop: &WhileLoop, buffer: &mut Buffer) {
        let constant = self.constant_condition(&while_loop.condition);
        if constant == Some(false) {
            trace!("eliding while loop with a false condition");
            return;
        }
        let body = self.loop_body(&while_loop.body);
        let condition = (constant != Some(true)).then_some(&while_loop.condition);
        let mut looped = self.close_loop(condition, body);
        looped.resolve_control_flow(AnnotationKind::Break, true);
        looped.resolve_control_flow(AnnotationKind::Continue, false);
        buffer.append(looped, 0, 0);
    }

    fn for_loop(&mut self, for_loop: &ForLoop, buffer: &mut Buffer) {
        self.variables.push();
        if let Some(init) = &for_loop.init {
            self.imperative(init, buffer);
        }
        let constant = match &for_loop.condition {
            Some(condition) => self.constant_condition(condition),
            None => Some(true),
        };
        if constant != Some(false) {
            let mut body = self.loop_body(&for_loop.body);
            body.resolve_control_flow(AnnotationKind::Continue, true);
            if let Some(step) = &for_loop.step {
                self.imperative(step, &mut body);
            }
            let condition = for_loop
                .condition
                .as_ref()
                .filter(|_| constant != Some(true));
            let mut looped = self.close_loop(condition, body);
            looped.resolve_control_flow(AnnotationKind::Break, true);
            buffer.append(looped, 0, 0);
        }
        self.pop_frame(buffer);
    }

    fn do_while_loop(&mut self, do_while: &DoWhileLoop, buffer: &mut Buffer) {
        let mut looped = self.loop_body(&do_while.body);
        looped.resolve_control_flow(AnnotationKind::Continue, true);
        match self.constant_condition(&do_while.condition) {
            Some(false) => {}
            constant => {
                if constant.is_none() {
                    looped.push_opcode(Opcode::Conditional);
                    self.expression(&do_while.condition, &Primitive::Bool.into(), &mut looped);
                    looped.push_u16(3);
                }
                looped.push_opcode(Opcode::CursorMoveBack);
                looped.push_distance(looped.len() + 2);
            }
        }
        looped.resolve_control_flow(AnnotationKind::Break, true);
        buffer.append(looped, 0, 0);
    }

    fn otherwise(&mut self, otherwise: &Option<Else>, buffer: &mut Buffer) {
        match otherwise {
            Some(Else::If(conditional)) => self.conditional(conditional, buffer),
            Some(Else::Scope(scope)) => self.scope(scope, buffer),
            None => {}
        }
    }

    fn conditional(&mut self, conditional: &Conditional, buffer: &mut Buffer) {
        match self.constant_condition(&conditional.condition) {
            Some(true) => return self.scope(&conditional.body, buffer),
            Some(false) => return self.otherwise(&conditional.otherwise, buffer),
            None => {}
        }
        let mut condition = Buffer::new();
        self.expression(&conditional.condition, &Primitive::Bool.into(), &mut condition);
        let mut body = Buffer::new();
        self.scope(&conditional.body, &mut body);
        let mut otherwise = Buffer::new();
        self.otherwise(&conditional.otherwise, &mut otherwise);
        if !otherwise.is_empty() {
            body.push_opcode(Opcode::CursorMoveForward);
            body.push_distance(otherwise.len());
        }

        buffer.push_opcode(Opcode::Conditional);
        buffer.append(condition, 0, 0);
        buffer.push_distance(body.len());
        buffer.append(body, 0, 0);
        buffer.append(otherwise, 0, 0);
    }

    fn imperative(&mut self, imperative: &Imperative, buffer: &mut Buffer) {
        let span = imperative.span;
        if self.include_debug_bytes {
            let line = u16::try_from(span.line(self.sources)).unwrap_or(u16::MAX);
            buffer.push_opcode(Opcode::DebugLine);
            buffer.annotate(AnnotationKind::DebugLine);
            buffer.push_u16(line);
        }
        match &imperative.kind {
            ImperativeKind::Declaration(declaration) => self.declaration(declaration, buffer),
            ImperativeKind::Assignment(Assignment {
                target,
                operator,
                value,
            }) => self.update(
                target,
                Update::Assign {
                    operator: *operator,
                    value,
                },
                span,
                buffer,
            ),
            ImperativeKind::Increment { target, decrement } => self.update(
                target,
                Update::Step {
                    decrement: *decrement,
                },
                span,
                buffer,
            ),
            ImperativeKind::Call(object) => {
                let terminal = object.terminal();
                if !matches!(terminal.kind, ObjectKind::Invocation { .. }) {
                    self.diagnostics
                        .report(terminal.span, "This expression has no effect.");
                    return;
                }
                self.object_expression(object, None, buffer);
            }
            ImperativeKind::Break => self.jump(AnnotationKind::Break, span, buffer),
            ImperativeKind::Continue => self.jump(AnnotationKind::Continue, span, buffer),
            ImperativeKind::Exit => buffer.push_opcode(Opcode::ProgramExit),
        }
    }

    fn jump(&mut self, kind: AnnotationKind, span: FileSpan, buffer: &mut Buffer) {
        if self.loop_depth == 0 {
            let message = match kind {
                AnnotationKind::Break => "Break statements can only be used within loops.",
                _ => "Continue statements can only be used within loops.",
            };
            self.diagnostics.report(span, message);
            return;
        }
        buffer.annotate(kind);
        buffer.push_opcode(Opcode::Placeholder);
        buffer.push_u16(0);
    }

    fn declaration(&mut self, declaration: &VariableDeclaration, buffer: &mut Buffer) {
        let name = &declaration.name;
        let ty = &declaration.ty;
        if self.resolver.find_property(None, &name.name, None).is_some() {
            self.diagnostics.report(
                name.span,
                format!(
                    "Variable with name '{}' conflicts with global property of the same name.",
                    name.name
                ),
            );
        }
        if !self.resolver.type_exists(&ty.ty) {
            self.missing_type(&ty.ty, ty.span);
        }
        let Some(data_type) = DataType::from_primitive(ty.ty.primitive) else {
            self.diagnostics
                .report(ty.span, format!("Variables cannot be of type {}.", ty.ty));
            return;
        };

        // The value cannot see the variable it initializes.
        let mut value = Buffer::new();
        if let Some(expression) = &declaration.value {
            self.expression(expression, &ty.ty, &mut value);
        }
        let address = match self.variables.declare(&name.name, ty.ty.clone(), name.span) {
            Ok(address) => address,
            Err(message) => {
                self.diagnostics.report(name.span, message);
                return;
            }
        };
        if declaration.value.is_none() {
            return;
        }
        let variable = Variable {
            ty: ty.ty.clone(),
            address,
            span: name.span,
        };
        buffer.push_opcode(Opcode::Assign);
        buffer.push_data_type(data_type);
        push_variable_address(&variable, buffer);
        buffer.append(value, 0, 0);
        self.debug_update(&name.name, &variable, buffer);
    }

    fn debug_update(&mut self, name: &str, variable: &Variable, buffer: &mut Buffer) {
        if !self.include_debug_bytes {
            return;
        }
        let Some(data_type) = DataType::from_primitive(variable.ty.primitive) else {
            return;
        };
        buffer.push_opcode(Opcode::DebugUpdateVariable);
        buffer.push_string(name);
        buffer.push_data_type(data_type);
        buffer.push_opcode(Opcode::Variable);
        push_variable_address(variable, buffer);
    }

    /// Reports operators that do not apply to values of type `ty`.
    fn check_operator(&mut self, update: &Update, ty: &Type, span: FileSpan) -> bool {
        let Some(operator) = update.operator() else {
            return true;
        };
        let primitive = ty.primitive;
        let message = match (update, operator) {
            (Update::Step { .. }, _) if !primitive.is_numeric() => {
                "This operator can only be used on numeric expressions."
            }
            (Update::Assign { .. }, BinaryOp::Add)
                if !primitive.is_numeric() && primitive != Primitive::String =>
            {
                "This operator can only be used on numeric or string expressions."
            }
            (Update::Assign { .. }, op)
                if op.is_arithmetic() && op != BinaryOp::Add && !primitive.is_numeric() =>
            {
                "This operator can only be used on numeric expressions."
            }
            (_, op) if op.is_bitwise() && !primitive.is_integer() => {
                "This operator can only be used on integral expressions."
            }
            _ => return true,
        };
        self.diagnostics.report(span, message);
        false
    }

    fn assign_operator(update: &Update, ty: &Type) -> Opcode {
        match update.operator() {
            None => Opcode::NoOp,
            Some(BinaryOp::Add) if ty.primitive == Primitive::String => Opcode::Concat,
            Some(op) => binary_opcode(op),
        }
    }

    fn update_value(&mut self, update: &Update, ty: &Type, buffer: &mut Buffer) {
        match update {
            Update::Assign { value, .. } => self.expression(value, ty, buffer),
            Update::Step { .. } => {
                if let Ok(one) = Literal::AmbiguousInt(1).cast(ty.primitive) {
                    buffer.push_literal(&one);
                }
            }
        }
    }

    /// Assignment, compound assignment, increment or decrement of `target`.
    fn update(
        &mut self,
        target: &ObjectExpression,
        update: Update,
        span: FileSpan,
        buffer: &mut Buffer,
    ) {
        if let ObjectKind::Name(name) = &target.kind {
            if let Some(variable) = self.variables.find(&name.name).cloned() {
                return self.update_variable(&name.name, &variable, update, span, buffer);
            }
        }
        let terminal = target.terminal();
        if matches!(terminal.kind, ObjectKind::Invocation { .. }) {
            self.diagnostics.report(
                terminal.span,
                "Attempted to assign a value to a read-only expression.",
            );
            return;
        }
        let ty = self.object_type(target, None);
        if ty.is_error() {
            return;
        }
        let Some(data_type) = DataType::from_primitive(ty.primitive) else {
            return;
        };

        match &target.kind {
            ObjectKind::Subscript { prefix, index } => {
                let prefix_type = self.object_type(prefix, None);
                let Some(owner) =
                    self.pointer_target(&prefix_type, target.span, "The subscript operator")
                else {
                    return;
                };
                let index_type = self.data_type(index);
                let Some(subscript) = self.find_subscript(&owner, &index_type, target.span)
                else {
                    return;
                };
                if subscript.readonly {
                    self.diagnostics.report(
                        target.span,
                        "Attempted to assign a value to a read-only expression.",
                    );
                    return;
                }
                if !self.check_operator(&update, &ty, span) {
                    return;
                }
                let index_ty = subscript.index_type.ty.clone();
                let Some(index_data_type) = DataType::from_primitive(index_ty.primitive) else {
                    return;
                };
                buffer.push_opcode(Opcode::AssignSubscript);
                buffer.push_data_type(data_type);
                self.object_expression(prefix, Some(&prefix_type), buffer);
                buffer.push_data_type(index_data_type);
                self.expression(index, &index_ty, buffer);
                buffer.push_opcode(Self::assign_operator(&update, &ty));
                self.update_value(&update, &ty, buffer);
            }
            ObjectKind::Name(name) => {
                self.update_property(None, name, &ty, data_type, update, span, buffer)
            }
            ObjectKind::Member { prefix, member } => {
                if let ObjectKind::Name(name) = &member.kind {
                    self.update_property(Some(prefix), name, &ty, data_type, update, span, buffer)
                }
            }
            ObjectKind::Invocation { .. } => {}
        }
    }

    fn update_variable(
        &mut self,
        name: &str,
        variable: &Variable,
        update: Update,
        span: FileSpan,
        buffer: &mut Buffer,
    ) {
        let ty = &variable.ty;
        if !self.check_operator(&update, ty, span) {
            return;
        }
        let Some(data_type) = DataType::from_primitive(ty.primitive) else {
            return;
        };
        buffer.push_opcode(Opcode::Assign);
        buffer.push_data_type(data_type);
        push_variable_address(variable, buffer);
        if update.operator().is_some() {
            // `x op= v` is stored as `x = x op v`.
            buffer.push_opcode(Self::assign_operator(&update, ty));
            buffer.push_opcode(Opcode::Variable);
            push_variable_address(variable, buffer);
        }
        self.update_value(&update, ty, buffer);
        self.debug_update(name, variable, buffer);
    }

    #[allow(clippy::too_many_arguments)]
    fn update_property(
        &mut self,
        prefix: Option<&ObjectExpression>,
        name: &crate::ast::Identifier,
        ty: &Type,
        data_type: DataType,
        update: Update,
        span: FileSpan,
        buffer: &mut Buffer,
    ) {
        let Some(owner) = self.member_owner(prefix) else {
            return;
        };
        let Some(property) = self
            .resolver
            .find_property(owner.as_deref(), &name.name, None)
        else {
            return;
        };
        if property.api.readonly {
            self.diagnostics.report(
                name.span,
                "Attempted to assign a value to a read-only expression.",
            );
            return;
        }
        if !self.check_operator(&update, ty, span) {
            return;
        }
        buffer.push_opcode(Opcode::AssignProperty);
        buffer.push_data_type(data_type);
        self.invocation_target(prefix, buffer);
        buffer.annotate(AnnotationKind::FunctionSymbol(property.descriptor()));
        buffer.push_u16(0);
        buffer.push_opcode(Self::assign_operator(&update, ty));
        self.update_value(&update, ty, buffer);
    }
}

fn push_variable_address(variable: &Variable, buffer: &mut Buffer) {
    buffer.annotate(if variable.is_allocated() {
        AnnotationKind::AllocatedVariableIndex
    } else {
        AnnotationKind::PrimitiveVariableAddress
    });
    buffer.push_u16(variable.address);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser, source::FileIndex};

    struct Compiled {
        buffer: Buffer,
        errors: Vec<String>,
    }

    fn compile_with(source: &str, include_debug_bytes: bool) -> Compiled {
        let mut sources = Sources::default();
        let file_idx = sources.add("/test/main.skn".into(), source.to_string());
        let program = parser::parse(file_idx, source).unwrap();
        let resolver = Resolver::new(vec![&program]);
        let compiler =
            FileCompiler::new(&sources, &resolver, include_debug_bytes, VariableStack::new());
        let (buffer, _, diagnostics) = compiler.compile(&program, Buffer::new());
        Compiled {
            buffer,
            errors: diagnostics
                .into_errors(&sources)
                .into_iter()
                .map(|e| e.message().to_string())
                .collect(),
        }
    }

    fn compile(source: &str) -> Compiled {
        compile_with(source, false)
    }

    fn bytes(build: impl FnOnce(&mut Buffer)) -> Vec<u8> {
        let mut buffer = Buffer::new();
        build(&mut buffer);
        buffer.into_bytes()
    }

    #[test]
    fn declarations_fold_constant_values() {
        let compiled = compile("int32 x = 3 + 4;");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int32);
            b.push_u16(0);
            b.push_literal(&Literal::Int32(7));
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());
        assert_eq!(
            compiled.buffer.annotations()[0].kind,
            AnnotationKind::PrimitiveVariableAddress
        );
    }

    #[test]
    fn ternary_pointers_need_a_single_mutual_ancestor() {
        let api = "#type Base {} #type Mid : Base {} #type A : Mid {} #type B : Mid {} #type Loner {}
                   #type Pet {} #type Dog : Pet {} #type Cat : Pet {}
                   #global { A a; B b; Loner loner; Dog dog; Cat cat; bool c; }";
        let prefix = "The return type of this operator is ambiguous and cannot be determined. \
                      Expressions in both branches of the conditional must have a matching type.";

        let compiled = compile(&format!("{api} Base m = c ? a : b;"));
        assert_eq!(
            compiled.errors,
            vec![format!("{prefix} The possible ancestor types for 'A' and 'B' are 'Mid', 'Base'.")]
        );

        let compiled = compile(&format!("{api} Base m = c ? a : loner;"));
        assert_eq!(
            compiled.errors,
            vec![format!("{prefix} There are no common ancestors for the types 'A' and 'Loner'.")]
        );

        let compiled = compile(&format!("{api} Pet p = c ? dog : cat;"));
        assert_eq!(compiled.errors, Vec::<String>::new());
    }

    #[test]
    fn false_loops_emit_nothing() {
        let compiled = compile("#global { void print(...); } while (false) { print(\"never\"); }");
        assert_eq!(compiled.errors, Vec::<String>::new());
        assert!(compiled.buffer.is_empty());
    }

    #[test]
    fn while_loop_jumps_back_to_its_condition() {
        let compiled = compile("bool go = true; while (go) { go = false; }");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Bool);
            b.push_u16(0);
            b.push_opcode(Opcode::LiteralTrue);

            b.push_opcode(Opcode::Conditional);
            b.push_opcode(Opcode::Variable);
            b.push_u16(0);
            b.push_u16(5 + 3);
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Bool);
            b.push_u16(0);
            b.push_opcode(Opcode::LiteralFalse);
            b.push_opcode(Opcode::CursorMoveBack);
            b.push_u16(6 + 5 + 3);
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());
    }

    #[test]
    fn break_resolves_past_the_loop() {
        let compiled = compile("while (true) { break; }");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::CursorMoveForward);
            b.push_u16(3);
            b.push_opcode(Opcode::CursorMoveBack);
            b.push_u16(6);
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());
        assert!(compiled.buffer.annotations().is_empty());
    }

    #[test]
    fn else_branches_are_skipped_after_the_body() {
        let compiled = compile("bool b = true; int8 x; if (b) { x = 1; } else { x = 2; }");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Bool);
            b.push_u16(0);
            b.push_opcode(Opcode::LiteralTrue);

            b.push_opcode(Opcode::Conditional);
            b.push_opcode(Opcode::Variable);
            b.push_u16(0);
            b.push_u16(6 + 3);
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int8);
            b.push_u16(1);
            b.push_literal(&Literal::Int8(1));
            b.push_opcode(Opcode::CursorMoveForward);
            b.push_u16(6);
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int8);
            b.push_u16(1);
            b.push_literal(&Literal::Int8(2));
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());
    }

    #[test]
    fn constant_conditions_keep_only_the_live_branch() {
        let compiled = compile("int8 x; if (1 > 2) { x = 1; } else { x = 2; }");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int8);
            b.push_u16(0);
            b.push_literal(&Literal::Int8(2));
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());
    }

    #[test]
    fn compound_assignment_reads_the_variable() {
        let compiled = compile("string s = \"a\"; s += \"b\"; int16 n = 1; n <<= 2; n++;");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::String);
            b.push_u16(0);
            b.push_literal(&Literal::String("a".into()));
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::String);
            b.push_u16(0);
            b.push_opcode(Opcode::Concat);
            b.push_opcode(Opcode::Variable);
            b.push_u16(0);
            b.push_literal(&Literal::String("b".into()));

            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int16);
            b.push_u16(0);
            b.push_literal(&Literal::Int16(1));
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int16);
            b.push_u16(0);
            b.push_opcode(Opcode::BitwiseShiftLeft);
            b.push_opcode(Opcode::Variable);
            b.push_u16(0);
            b.push_literal(&Literal::Int16(2));
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int16);
            b.push_u16(0);
            b.push_opcode(Opcode::Add);
            b.push_opcode(Opcode::Variable);
            b.push_u16(0);
            b.push_literal(&Literal::Int16(1));
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());
    }

    #[test]
    fn property_assignment_uses_symbols() {
        let compiled = compile("#type Node { int32 size; } #global { Node root; } root.size += 2;");
        assert_eq!(compiled.errors, Vec::<String>::new());
        let kinds: Vec<_> = compiled
            .buffer
            .annotations()
            .iter()
            .map(|a| a.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                AnnotationKind::FunctionSymbol("GLOBAL_root".into()),
                AnnotationKind::FunctionSymbol("Node_size".into()),
            ]
        );
        assert_eq!(compiled.buffer.bytes()[0], Opcode::AssignProperty as u8);
    }

    #[test]
    fn reports_statement_errors() {
        let compiled = compile(
            "#global { readonly int32 count; void f(int32 a); void f(uint32 a); int32 g(); }
             break;
             count = 3;
             g() = 4;
             bool b; b += true;
             f(1);
             count;
             int32 count = 2;",
        );
        assert_eq!(
            compiled.errors,
            vec![
                "Break statements can only be used within loops.".to_string(),
                "Attempted to assign a value to a read-only expression.".to_string(),
                "Attempted to assign a value to a read-only expression.".to_string(),
                "This operator can only be used on numeric or string expressions.".to_string(),
                "This function invocation is ambiguous between global functions 'f(int32)' and 'f(uint32)'. This ambiguity might be resolved by renaming these APIs, or by adding a typecast to explicitly describe the type of any literal parameters.".to_string(),
                "This expression has no effect.".to_string(),
                "Variable with name 'count' conflicts with global property of the same name.".to_string(),
            ]
        );
    }

    #[test]
    fn reports_declaration_conflicts() {
        let compiled = compile(
            "#type A {} #type A {}
             #type B : Missing { void f(); void f(); int8 p; int8 p; int8 [int32 i]; int8 [int32 j]; }
             #type Base {} #type Left : Base {} #type Right : Base {} #type Both : Left, Right {}",
        );
        assert!(compiled
            .errors
            .contains(&"Type name 'A' conflicts with another type of the same name.".to_string()));
        assert!(compiled
            .errors
            .contains(&"Unable to find the type declaration for 'Missing'.".to_string()));
        assert!(compiled.errors.contains(
            &"Function 'f()' conflicts with another function with the same name and parameters in type 'B' or one of its parent types.".to_string()
        ));
        assert!(compiled.errors.contains(
            &"Property name 'p' conflicts with another property with the same name in type 'B' or one of its parent types.".to_string()
        ));
        assert!(compiled.errors.contains(
            &"Subscript indexed by int32 conflicts with another subscript in type 'B' or one of its parent types.".to_string()
        ));
        assert!(compiled.errors.contains(
            &"The type 'Base' is inherited more than once by the same type, forming an 'inheritance diamond'.".to_string()
        ));
    }

    #[test]
    fn debug_bytes_track_lines_and_variables() {
        let compiled = compile_with("{\n  int8 x = 1;\n}", true);
        assert_eq!(compiled.errors, Vec::<String>::new());
        let expected = bytes(|b| {
            b.push_opcode(Opcode::DebugLine);
            b.push_u16(2);
            b.push_opcode(Opcode::Assign);
            b.push_data_type(DataType::Int8);
            b.push_u16(0);
            b.push_literal(&Literal::Int8(1));
            b.push_opcode(Opcode::DebugUpdateVariable);
            b.push_string("x");
            b.push_data_type(DataType::Int8);
            b.push_opcode(Opcode::Variable);
            b.push_u16(0);
            b.push_opcode(Opcode::DebugDeleteVariable);
            b.push_string("x");
        });
        assert_eq!(compiled.buffer.bytes(), expected.as_slice());

        let release = compile("{\n  int8 x = 1;\n}");
        assert!(!release
            .buffer
            .annotations()
            .iter()
            .any(|a| a.kind == AnnotationKind::DebugLine));
    }
}
