use crate::{
    source::FileSpan,
    types::{Literal, Type},
};

#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: String,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct TypeRef {
    pub ty: Type,
    pub span: FileSpan,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Import(import) => Some(import),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &ApiType> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Type(ty) => Some(ty),
            _ => None,
        })
    }

    /// Members of every `#global` block.
    pub fn globals(&self) -> impl Iterator<Item = &ApiMember> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Statement::Global(global) => Some(global.members.iter()),
                _ => None,
            })
            .flatten()
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    Import(Import),
    Global(ApiGlobal),
    Type(ApiType),
    Metadata(Metadata),
    Scope(Scope),
    While(WhileLoop),
    For(ForLoop),
    DoWhile(DoWhileLoop),
    Conditional(Conditional),
    Imperative(Imperative),
}

#[derive(Debug, Clone)]
pub struct Import {
    pub path: String,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub text: String,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct ApiGlobal {
    pub members: Vec<ApiMember>,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct ApiType {
    pub name: Identifier,
    pub ancestors: Vec<Identifier>,
    pub members: Vec<ApiMember>,
    pub span: FileSpan,
}

impl ApiType {
    pub fn functions(&self) -> impl Iterator<Item = &ApiFunction> {
        self.members.iter().filter_map(|m| match m {
            ApiMember::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn properties(&self) -> impl Iterator<Item = &ApiProperty> {
        self.members.iter().filter_map(|m| match m {
            ApiMember::Property(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscripts(&self) -> impl Iterator<Item = &ApiSubscript> {
        self.members.iter().filter_map(|m| match m {
            ApiMember::Subscript(s) => Some(s),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum ApiMember {
    Function(ApiFunction),
    Property(ApiProperty),
    Subscript(ApiSubscript),
}

#[derive(Debug, Clone)]
pub struct ApiFunction {
    pub return_type: TypeRef,
    pub name: Identifier,
    pub params: Vec<ApiParam>,
    pub variadic: bool,
    pub span: FileSpan,
}

impl ApiFunction {
    pub fn param_types(&self) -> impl Iterator<Item = &Type> {
        self.params.iter().map(|p| &p.ty.ty)
    }
}

#[derive(Debug, Clone)]
pub struct ApiParam {
    pub ty: TypeRef,
    pub name: Identifier,
}

#[derive(Debug, Clone)]
pub struct ApiProperty {
    pub readonly: bool,
    pub ty: TypeRef,
    pub name: Identifier,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct ApiSubscript {
    pub readonly: bool,
    pub return_type: TypeRef,
    pub index_type: TypeRef,
    pub index_name: Identifier,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub statements: Vec<Statement>,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub struct WhileLoop {
    pub condition: Expression,
    pub body: Scope,
}

#[derive(Debug, Clone)]
pub struct ForLoop {
    pub init: Option<Imperative>,
    pub condition: Option<Expression>,
    pub step: Option<Imperative>,
    pub body: Scope,
}

#[derive(Debug, Clone)]
pub struct DoWhileLoop {
    pub body: Scope,
    pub condition: Expression,
}

#[derive(Debug, Clone)]
pub struct Conditional {
    pub condition: Expression,
    pub body: Scope,
    pub otherwise: Option<Else>,
}

#[derive(Debug, Clone)]
pub enum Else {
    If(Box<Conditional>),
    Scope(Scope),
}

#[derive(Debug, Clone)]
pub struct Imperative {
    pub kind: ImperativeKind,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub enum ImperativeKind {
    Declaration(VariableDeclaration),
    Assignment(Assignment),
    Increment { target: ObjectExpression, decrement: bool },
    Call(ObjectExpression),
    Break,
    Continue,
    Exit,
}

#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub ty: TypeRef,
    pub name: Identifier,
    pub value: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: ObjectExpression,
    /// `None` for plain `=`.
    pub operator: Option<BinaryOp>,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitwiseNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    NullCoalescing,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitwiseAnd
                | BinaryOp::BitwiseOr
                | BinaryOp::BitwiseXor
                | BinaryOp::ShiftLeft
                | BinaryOp::ShiftRight
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessOrEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterOrEqual
        )
    }
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Literal(Literal),
    Object(ObjectExpression),
    Parenthesized(Box<Expression>),
    Typecast {
        ty: TypeRef,
        operand: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Ternary {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
}

/// Variable, property, function call or subscript, possibly chained with `.` and `[]`.
#[derive(Debug, Clone)]
pub struct ObjectExpression {
    pub kind: ObjectKind,
    pub span: FileSpan,
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Name(Identifier),
    Invocation {
        name: Identifier,
        args: Vec<Expression>,
    },
    /// `prefix.member` where `member` is a `Name` or `Invocation`.
    Member {
        prefix: Box<ObjectExpression>,
        member: Box<ObjectExpression>,
    },
    Subscript {
        prefix: Box<ObjectExpression>,
        index: Box<Expression>,
    },
}

impl ObjectExpression {
    /// The expression the chain is invoked on, if any.
    pub fn prefix(&self) -> Option<&ObjectExpression> {
        match &self.kind {
            ObjectKind::Member { prefix, .. } | ObjectKind::Subscript { prefix, .. } => {
                Some(prefix)
            }
            _ => None,
        }
    }

    /// The last link of the chain: what actually gets read, assigned or called.
    pub fn terminal(&self) -> &ObjectExpression {
        match &self.kind {
            ObjectKind::Member { member, .. } => member,
            _ => self,
        }
    }
}
