//! Type inference and code generation for expressions and object chains.

use itertools::Itertools;

use super::{
    codegen::FileCompiler,
    constant::evaluate,
    resolver::{self, ParameterStrategy},
};
use crate::{
    ast::{
        ApiSubscript, BinaryOp, Expression, ExpressionKind, ObjectExpression, ObjectKind, UnaryOp,
    },
    bytecode::{AnnotationKind, Buffer, DataType, Opcode},
    source::FileSpan,
    types::{reconcile, Primitive, Type},
};

pub(super) fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Subtract => Opcode::Subtract,
        BinaryOp::Multiply => Opcode::Multiply,
        BinaryOp::Divide => Opcode::Divide,
        BinaryOp::Modulo => Opcode::Modulo,
        BinaryOp::BitwiseAnd => Opcode::BitwiseAnd,
        BinaryOp::BitwiseOr => Opcode::BitwiseOr,
        BinaryOp::BitwiseXor => Opcode::BitwiseXor,
        BinaryOp::ShiftLeft => Opcode::BitwiseShiftLeft,
        BinaryOp::ShiftRight => Opcode::BitwiseShiftRight,
        BinaryOp::LogicalAnd => Opcode::LogicalAnd,
        BinaryOp::LogicalOr => Opcode::LogicalOr,
        BinaryOp::Equal => Opcode::LogicalEquality,
        BinaryOp::NotEqual => Opcode::LogicalInequality,
        BinaryOp::Less => Opcode::LessThan,
        BinaryOp::LessOrEqual => Opcode::LessThanOrEqual,
        BinaryOp::Greater => Opcode::GreaterThan,
        BinaryOp::GreaterOrEqual => Opcode::GreaterThanOrEqual,
        BinaryOp::NullCoalescing => Opcode::NullCoalescing,
    }
}

fn mismatch(left: &Type, right: &Type) -> String {
    format!("Type mismatch. Cannot combine {left} and {right} types in this way.")
}

fn ambiguous_literal(primitive: Primitive) -> String {
    let candidates: &[Primitive] = match primitive {
        Primitive::AmbiguousInt => &[
            Primitive::UInt8,
            Primitive::UInt16,
            Primitive::UInt32,
            Primitive::UInt64,
            Primitive::Int8,
            Primitive::Int16,
            Primitive::Int32,
            Primitive::Int64,
            Primitive::Float32,
            Primitive::Float64,
        ],
        Primitive::AmbiguousSignedInt => &[
            Primitive::Int8,
            Primitive::Int16,
            Primitive::Int32,
            Primitive::Int64,
            Primitive::Float32,
            Primitive::Float64,
        ],
        _ => &[Primitive::Float32, Primitive::Float64],
    };
    format!(
        "This expression contains numeric literals whose type is ambiguous. An explicit cast must be added to distinguish between: {}.",
        candidates.iter().join(", ")
    )
}

impl<'a> FileCompiler<'a> {
    /// The type `expression` evaluates to, or [`Type::error`] after reporting why it has
    /// none.
    pub(super) fn data_type(&mut self, expression: &Expression) -> Type {
        let span = expression.span;
        match &expression.kind {
            ExpressionKind::Literal(literal) => literal.ty(),
            ExpressionKind::Parenthesized(inner) => self.data_type(inner),
            ExpressionKind::Object(object) => self.object_type(object, None),
            ExpressionKind::Typecast { ty, .. } => {
                if self.resolver.type_exists(&ty.ty) {
                    ty.ty.clone()
                } else {
                    self.missing_type(&ty.ty, ty.span);
                    Type::error()
                }
            }
            ExpressionKind::Unary { op, operand } => {
                let ty = self.data_type(operand);
                if ty.is_error() {
                    return ty;
                }
                match op {
                    UnaryOp::LogicalNot => Primitive::Bool.into(),
                    UnaryOp::Negate if ty.primitive.is_unsigned_integer() => {
                        self.error(span, "Unsigned integers cannot be negated.")
                    }
                    UnaryOp::Negate if ty.primitive == Primitive::AmbiguousInt => {
                        Primitive::AmbiguousSignedInt.into()
                    }
                    UnaryOp::Negate if ty.primitive.is_numeric() => ty,
                    UnaryOp::Negate => self.error(
                        span,
                        "Numeric negation can only be applied to numeric data types.",
                    ),
                    UnaryOp::BitwiseNot if ty.primitive.is_integer() => ty,
                    UnaryOp::BitwiseNot => self.error(
                        span,
                        "Bitwise negation can only be applied to integer data types.",
                    ),
                }
            }
            ExpressionKind::Binary { op, left, right } => self.binary_type(*op, left, right, span),
            ExpressionKind::Ternary {
                then, otherwise, ..
            } => {
                let then = self.data_type(then);
                let otherwise = self.data_type(otherwise);
                self.reconcile_branches(then, otherwise, span)
            }
        }
    }

    fn error(&mut self, span: FileSpan, message: impl Into<String>) -> Type {
        self.diagnostics.report(span, message);
        Type::error()
    }

    fn binary_type(&mut self, op: BinaryOp, left: &Expression, right: &Expression, span: FileSpan) -> Type {
        if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
            return Primitive::Bool.into();
        }
        if op.is_comparison() {
            return match self.comparison_operands(op, left, right, span) {
                Some(_) => Primitive::Bool.into(),
                None => Type::error(),
            };
        }
        let l = self.data_type(left);
        let r = self.data_type(right);
        if l.is_error() || r.is_error() {
            return Type::error();
        }
        let numeric = l.primitive.is_numeric() && r.primitive.is_numeric();
        let reconciled = |this: &mut Self| match reconcile(l.primitive, r.primitive) {
            Some(p) => p.into(),
            None => this.error(span, mismatch(&l, &r)),
        };
        match op {
            BinaryOp::Add if l.primitive == Primitive::String && r.primitive == Primitive::String => {
                Primitive::String.into()
            }
            BinaryOp::Add if numeric => reconciled(self),
            BinaryOp::Add => self.error(
                span,
                "Both operands must be either string (concatenation) or numeric (addition).",
            ),
            _ if op.is_arithmetic() && numeric => reconciled(self),
            _ if op.is_arithmetic() => self.error(span, "Both operands must be numeric."),
            _ if op.is_bitwise() && l.primitive.is_integer() && r.primitive.is_integer() => {
                reconciled(self)
            }
            _ if op.is_bitwise() => self.error(span, "Both operands must be integers."),
            _ if l.primitive != Primitive::Pointer => self.error(
                span,
                "NULL coalescing operator can only be applied to expressions which return a pointer.",
            ),
            _ => self.reconcile_branches(l.clone(), r.clone(), span),
        }
    }

    /// The type both sides of a comparison are evaluated as.
    fn comparison_operands(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        span: FileSpan,
    ) -> Option<Type> {
        let l = self.data_type(left);
        let r = self.data_type(right);
        if l.is_error() || r.is_error() {
            return None;
        }
        let ordering = !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual);
        if l.primitive == Primitive::Pointer && r.primitive == Primitive::Pointer {
            if ordering {
                self.diagnostics.report(span, "Both operands must be numeric.");
                return None;
            }
            return Some(Type::null());
        }
        let Some(kind) = reconcile(l.primitive, r.primitive) else {
            self.diagnostics.report(span, mismatch(&l, &r));
            return None;
        };
        if ordering && !kind.is_numeric() {
            self.diagnostics.report(span, "Both operands must be numeric.");
            return None;
        }
        Some(kind.into())
    }

    /// Result type of an operator whose value comes from one of two branches.
    fn reconcile_branches(&mut self, left: Type, right: Type, span: FileSpan) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        if left == right {
            return left;
        }
        if left.primitive == Primitive::Pointer && right.primitive == Primitive::Pointer {
            let (l, r) = match (&left.pointer_type, &right.pointer_type) {
                (None, _) => return right,
                (_, None) => return left,
                (Some(l), Some(r)) => (l, r),
            };
            let ancestors = self.resolver.mutual_ancestors(l, r);
            if let Ok(ancestor) = ancestors.iter().exactly_one() {
                return Type::pointer(*ancestor);
            }
            let suffix = if ancestors.is_empty() {
                format!("There are no common ancestors for the types '{l}' and '{r}'.")
            } else {
                format!(
                    "The possible ancestor types for '{l}' and '{r}' are {}.",
                    ancestors.iter().map(|a| format!("'{a}'")).join(", ")
                )
            };
            return self.error(
                span,
                format!("The return type of this operator is ambiguous and cannot be determined. Expressions in both branches of the conditional must have a matching type. {suffix}"),
            );
        }
        match reconcile(left.primitive, right.primitive) {
            Some(p) => p.into(),
            None => self.error(span, mismatch(&left, &right)),
        }
    }

    /// Type of an object chain. `invoked_on` names the pointer type a member is accessed
    /// through, `None` at the root of a chain.
    pub(super) fn object_type(&mut self, object: &ObjectExpression, invoked_on: Option<&str>) -> Type {
        let span = object.span;
        match &object.kind {
            ObjectKind::Name(name) => {
                if invoked_on.is_none() {
                    if let Some(variable) = self.variables.find(&name.name) {
                        return variable.ty.clone();
                    }
                }
                match self.resolver.find_property(invoked_on, &name.name, None) {
                    Some(property) => property.api.ty.ty.clone(),
                    None => match invoked_on {
                        None => self.error(
                            name.span,
                            format!("Unable to find a variable or global property named '{}'.", name.name),
                        ),
                        Some(owner) => self.error(
                            name.span,
                            format!("Unable to find a '{}' property on type '{owner}'.", name.name),
                        ),
                    },
                }
            }
            ObjectKind::Invocation { name, args } => {
                let params = args.iter().map(|a| self.data_type(a)).collect_vec();
                if params.iter().any(Type::is_error) {
                    return Type::error();
                }
                let Some(function) = self.resolver.find_function(
                    invoked_on,
                    &name.name,
                    &params,
                    false,
                    ParameterStrategy::Flexible,
                    None,
                ) else {
                    let signature = resolver::signature(None, &name.name, &params, false);
                    return match invoked_on {
                        None => self.error(
                            name.span,
                            format!("Unable to find a global '{signature}' function."),
                        ),
                        Some(owner) => self.error(
                            name.span,
                            format!("Unable to find a '{signature}' function on type '{owner}'."),
                        ),
                    };
                };
                if let Some(conflict) = self.resolver.find_function(
                    invoked_on,
                    &name.name,
                    &params,
                    false,
                    ParameterStrategy::Flexible,
                    Some(function.api.span),
                ) {
                    let suffix = "This ambiguity might be resolved by renaming these APIs, or by adding a typecast to explicitly describe the type of any literal parameters.";
                    let (a, b) = (function.signature(), conflict.signature());
                    return match invoked_on {
                        None => self.error(
                            name.span,
                            format!("This function invocation is ambiguous between global functions '{a}' and '{b}'. {suffix}"),
                        ),
                        Some(owner) => self.error(
                            name.span,
                            format!("This function invocation is ambiguous between functions '{a}' and '{b}' in type '{owner}'. {suffix}"),
                        ),
                    };
                }
                function.api.return_type.ty.clone()
            }
            ObjectKind::Member { prefix, member } => {
                let prefix_type = self.object_type(prefix, invoked_on);
                match self.pointer_target(&prefix_type, span, "The '.' operator") {
                    Some(owner) => self.object_type(member, Some(&owner)),
                    None => Type::error(),
                }
            }
            ObjectKind::Subscript { prefix, index } => {
                let prefix_type = self.object_type(prefix, invoked_on);
                let Some(owner) = self.pointer_target(&prefix_type, span, "The subscript operator")
                else {
                    return Type::error();
                };
                let index_type = self.data_type(index);
                if index_type.is_error() {
                    return index_type;
                }
                match self.find_subscript(&owner, &index_type, span) {
                    Some(subscript) => subscript.return_type.ty.clone(),
                    None => Type::error(),
                }
            }
        }
    }

    /// Name of the type a pointer-valued prefix points to.
    pub(super) fn pointer_target(&mut self, prefix: &Type, span: FileSpan, operator: &str) -> Option<String> {
        if prefix.is_error() {
            return None;
        }
        match (prefix.primitive, &prefix.pointer_type) {
            (Primitive::Pointer, Some(owner)) => Some(owner.clone()),
            _ => {
                self.diagnostics.report(
                    span,
                    format!("{operator} cannot be invoked on {prefix}, it can only be invoked on pointers."),
                );
                None
            }
        }
    }

    pub(super) fn find_subscript(
        &mut self,
        owner: &str,
        index: &Type,
        span: FileSpan,
    ) -> Option<&'a ApiSubscript> {
        let Some(subscript) =
            self.resolver
                .find_subscript(owner, index, ParameterStrategy::Flexible, None)
        else {
            self.diagnostics.report(
                span,
                format!("Unable to find a subscript on type '{owner}' with an index parameter of type {index}."),
            );
            return None;
        };
        if let Some(conflict) = self.resolver.find_subscript(
            owner,
            index,
            ParameterStrategy::Flexible,
            Some(subscript.api.span),
        ) {
            self.diagnostics.report(
                span,
                format!(
                    "This subscript invocation is ambiguous between index types '{}' and '{}' in type '{owner}'. This ambiguity can be resolved by adding a typecast to explicitly describe the type of the index.",
                    subscript.api.index_type.ty, conflict.api.index_type.ty
                ),
            );
            return None;
        }
        Some(subscript.api)
    }

    /// Emits `expression` as a value of type `expected`.
    pub(super) fn expression(&mut self, expression: &Expression, expected: &Type, buffer: &mut Buffer) {
        let span = expression.span;
        if DataType::from_primitive(expected.primitive).is_none() {
            self.diagnostics.report(
                span,
                "Internal compiler error. No concrete expected type for expression.",
            );
            return;
        }
        let actual = self.data_type(expression);
        if actual.is_error() {
            return;
        }
        if !self.resolver.is_assignable(&actual, expected) {
            self.diagnostics.report(
                span,
                format!("Expression is required to be of type {expected}, but was {actual} instead."),
            );
            return;
        }
        if let Some(literal) = evaluate(expression, &mut self.diagnostics) {
            match literal.cast(expected.primitive) {
                Ok(literal) => buffer.push_literal(&literal),
                Err(error) => self.diagnostics.report(span, error.to_string()),
            }
            return;
        }

        match &expression.kind {
            ExpressionKind::Literal(_) => {}
            ExpressionKind::Parenthesized(inner) => self.expression(inner, expected, buffer),
            ExpressionKind::Object(object) => self.object_expression(object, Some(expected), buffer),
            ExpressionKind::Typecast { operand, .. } => self.typecast(operand, actual, span, buffer),
            ExpressionKind::Unary { op, operand } => match op {
                UnaryOp::Negate => {
                    buffer.push_opcode(Opcode::NumericNegation);
                    self.expression(operand, expected, buffer);
                }
                UnaryOp::BitwiseNot => {
                    buffer.push_opcode(Opcode::BitwiseNegation);
                    self.expression(operand, expected, buffer);
                }
                UnaryOp::LogicalNot => {
                    buffer.push_opcode(Opcode::LogicalNegation);
                    self.expression(operand, &Primitive::Bool.into(), buffer);
                }
            },
            ExpressionKind::Binary { op, left, right } => {
                self.binary(*op, left, right, expected, span, buffer)
            }
            ExpressionKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                match evaluate(condition, &mut self.diagnostics).and_then(|c| c.as_bool()) {
                    Some(true) => self.expression(then, expected, buffer),
                    Some(false) => self.expression(otherwise, expected, buffer),
                    None => {
                        buffer.push_opcode(Opcode::TernaryConditional);
                        self.expression(condition, &Primitive::Bool.into(), buffer);
                        self.expression(then, expected, buffer);
                        self.expression(otherwise, expected, buffer);
                    }
                }
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        expected: &Type,
        span: FileSpan,
        buffer: &mut Buffer,
    ) {
        if op.is_comparison() {
            let Some(operands) = self.comparison_operands(op, left, right, span) else {
                return;
            };
            if operands.primitive.is_ambiguous() {
                self.diagnostics.report(span, ambiguous_literal(operands.primitive));
                return;
            }
            let Some(data_type) = DataType::from_primitive(operands.primitive) else {
                return;
            };
            buffer.push_opcode(binary_opcode(op));
            buffer.push_data_type(data_type);
            if operands.primitive == Primitive::Pointer {
                let (l, r) = (self.data_type(left), self.data_type(right));
                self.expression(left, &l, buffer);
                self.expression(right, &r, buffer);
            } else {
                self.expression(left, &operands, buffer);
                self.expression(right, &operands, buffer);
            }
            return;
        }
        let operands = match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => Primitive::Bool.into(),
            _ => expected.clone(),
        };
        if op == BinaryOp::Add && expected.primitive == Primitive::String {
            buffer.push_opcode(Opcode::Concat);
        } else {
            buffer.push_opcode(binary_opcode(op));
        }
        self.expression(left, &operands, buffer);
        self.expression(right, &operands, buffer);
    }

    fn typecast(&mut self, operand: &Expression, cast: Type, span: FileSpan, buffer: &mut Buffer) {
        let actual = self.data_type(operand);
        if actual.is_error() {
            return;
        }
        if actual.primitive == cast.primitive {
            if let (Some(from), Some(to)) = (&actual.pointer_type, &cast.pointer_type) {
                if !self.resolver.inherits(to, from) && !self.resolver.inherits(from, to) {
                    self.diagnostics.report(
                        span,
                        format!("Cast attempted between incompatible pointers. The types '{to}' and '{from}' have no child/ancestor relationship."),
                    );
                    return;
                }
            }
            self.expression(operand, &actual, buffer);
            return;
        }
        if cast.primitive == Primitive::Pointer {
            self.diagnostics.report(
                span,
                format!("Cannot cast primitive {actual} type to pointer type {cast}."),
            );
            return;
        }
        if actual.primitive == Primitive::Pointer && cast.primitive != Primitive::String {
            self.diagnostics.report(
                span,
                format!("Pointer types, like {actual}, can only be cast to other pointer types with a child/ancestor relationship or 'string'."),
            );
            return;
        }
        if actual.primitive.is_ambiguous() {
            if self.resolver.is_assignable(&actual, &cast) {
                self.expression(operand, &cast, buffer);
            } else {
                self.diagnostics.report(span, ambiguous_literal(actual.primitive));
            }
            return;
        }
        let Some(from) = DataType::from_primitive(actual.primitive) else {
            return;
        };
        buffer.push_opcode(Opcode::Typecast);
        buffer.push_data_type(from);
        self.expression(operand, &actual, buffer);
    }

    /// Emits a variable read or a host call. `expected` is `None` when the result is
    /// discarded.
    pub(super) fn object_expression(
        &mut self,
        object: &ObjectExpression,
        expected: Option<&Type>,
        buffer: &mut Buffer,
    ) {
        match &object.kind {
            ObjectKind::Name(name) => {
                if let Some(variable) = self.variables.find(&name.name) {
                    let kind = if variable.is_allocated() {
                        AnnotationKind::AllocatedVariableIndex
                    } else {
                        AnnotationKind::PrimitiveVariableAddress
                    };
                    let address = variable.address;
                    buffer.push_opcode(Opcode::Variable);
                    buffer.annotate(kind);
                    buffer.push_u16(address);
                } else {
                    self.member_invocation(None, object, expected, buffer);
                }
            }
            ObjectKind::Invocation { .. } => self.member_invocation(None, object, expected, buffer),
            ObjectKind::Member { prefix, member } => {
                self.member_invocation(Some(prefix), member, expected, buffer)
            }
            ObjectKind::Subscript { prefix, index } => {
                let prefix_type = self.object_type(prefix, None);
                let Some(owner) = self.pointer_target(&prefix_type, object.span, "The subscript operator")
                else {
                    return;
                };
                let index_type = self.data_type(index);
                if index_type.is_error() {
                    return;
                }
                let Some(subscript) = self.find_subscript(&owner, &index_type, object.span) else {
                    return;
                };
                let Some(data_type) = DataType::from_primitive(subscript.index_type.ty.primitive) else {
                    return;
                };
                buffer.push_opcode(Opcode::SubscriptInvocation);
                self.object_expression(prefix, Some(&prefix_type), buffer);
                buffer.push_data_type(data_type);
                self.expression(index, &subscript.index_type.ty, buffer);
            }
        }
    }

    /// Type that owns the members accessed through `prefix`. `Some(None)` for the global
    /// API, `None` after reporting a prefix that is not a pointer.
    pub(super) fn member_owner(&mut self, prefix: Option<&ObjectExpression>) -> Option<Option<String>> {
        let Some(prefix) = prefix else {
            return Some(None);
        };
        let prefix_type = self.object_type(prefix, None);
        self.pointer_target(&prefix_type, prefix.span, "The '.' operator")
            .map(Some)
    }

    /// Emits the pointer a member is accessed through, or `NoOp` for globals.
    pub(super) fn invocation_target(&mut self, prefix: Option<&ObjectExpression>, buffer: &mut Buffer) {
        match prefix {
            Some(prefix) => {
                let prefix_type = self.object_type(prefix, None);
                self.object_expression(prefix, Some(&prefix_type), buffer);
            }
            None => buffer.push_opcode(Opcode::NoOp),
        }
    }

    /// Property read or function call on `prefix`, or on the global API when `prefix` is
    /// `None`.
    fn member_invocation(
        &mut self,
        prefix: Option<&ObjectExpression>,
        member: &ObjectExpression,
        expected: Option<&Type>,
        buffer: &mut Buffer,
    ) {
        let Some(owner) = self.member_owner(prefix) else {
            return;
        };
        if self.object_type(member, owner.as_deref()).is_error() {
            return;
        }
        match &member.kind {
            ObjectKind::Name(name) => {
                let Some(property) = self.resolver.find_property(owner.as_deref(), &name.name, None)
                else {
                    return;
                };
                buffer.push_opcode(Opcode::FunctionInvocation);
                self.invocation_target(prefix, buffer);
                buffer.annotate(AnnotationKind::FunctionSymbol(property.descriptor()));
                buffer.push_u16(0);
                buffer.push_u8(0);
            }
            ObjectKind::Invocation { name, args } => {
                let params = args.iter().map(|a| self.data_type(a)).collect_vec();
                let Some(function) = self.resolver.find_function(
                    owner.as_deref(),
                    &name.name,
                    &params,
                    false,
                    ParameterStrategy::Flexible,
                    None,
                ) else {
                    return;
                };
                let Ok(count) = u8::try_from(args.len()) else {
                    self.diagnostics.report(
                        member.span,
                        "Function invocations are limited to 255 arguments.",
                    );
                    return;
                };
                buffer.push_opcode(match expected {
                    Some(_) => Opcode::FunctionInvocation,
                    None => Opcode::UnusedReturnFunctionInvocation,
                });
                self.invocation_target(prefix, buffer);
                buffer.annotate(AnnotationKind::FunctionSymbol(function.descriptor()));
                buffer.push_u16(0);
                buffer.push_u8(count);
                let declared = function.api.param_types().collect_vec();
                for (idx, (arg, actual)) in args.iter().zip(&params).enumerate() {
                    let param = match declared.get(idx) {
                        Some(&declared) => declared.clone(),
                        None if actual.primitive.is_ambiguous() => {
                            self.diagnostics.report(
                                arg.span,
                                "Variadic parameters cannot be ambiguous literals. Add a typecast to specify the type.",
                            );
                            return;
                        }
                        None if actual.primitive == Primitive::Void => {
                            self.diagnostics.report(
                                arg.span,
                                "Variadic parameters cannot be void expressions.",
                            );
                            return;
                        }
                        None => actual.clone(),
                    };
                    let Some(data_type) = DataType::from_primitive(param.primitive) else {
                        return;
                    };
                    buffer.push_data_type(data_type);
                    self.expression(arg, &param, buffer);
                }
            }
            _ => {}
        }
    }

    pub(super) fn missing_type(&mut self, ty: &Type, span: FileSpan) {
        self.diagnostics.report(
            span,
            format!("Unable to find the type declaration for '{ty}'."),
        );
    }
}
