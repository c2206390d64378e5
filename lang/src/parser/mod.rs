use std::sync::OnceLock;

use itertools::Itertools;
use pest::{
    error::LineColLocation,
    iterators::{Pair, Pairs},
    pratt_parser::{Assoc, Op, PrattParser},
    Parser,
};
use pest_derive::Parser;

use crate::{
    ast::*,
    source::{FileIndex, FileSpan},
    types::{Literal, Primitive, Type},
};

#[derive(Parser)]
#[grammar = "parser/skein.pest"]
struct SkeinParser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    LineCol { line: usize, col: usize },
    Span(FileSpan),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    pub position: Position,
    pub message: String,
}

impl Error {
    fn at(span: FileSpan, message: impl Into<String>) -> Self {
        Error {
            position: Position::Span(span),
            message: message.into(),
        }
    }
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(error: pest::error::Error<Rule>) -> Self {
        let (line, col) = match error.line_col {
            LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
        };
        Error {
            position: Position::LineCol { line, col },
            message: format!("Syntax error: {}.", error.variant.message()),
        }
    }
}

pub fn parse(file_idx: FileIndex, source: &str) -> Result<Program, Error> {
    let mut pairs = SkeinParser::parse(Rule::program, source)?;
    let Some(program) = pairs.next() else {
        return Ok(Program::default());
    };
    Factory(file_idx).program(program)
}

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::null_coalescing, Assoc::Left))
            .op(Op::infix(Rule::logical_or, Assoc::Left))
            .op(Op::infix(Rule::logical_and, Assoc::Left))
            .op(Op::infix(Rule::bitwise_or, Assoc::Left))
            .op(Op::infix(Rule::bitwise_xor, Assoc::Left))
            .op(Op::infix(Rule::bitwise_and, Assoc::Left))
            .op(Op::infix(Rule::equal, Assoc::Left) | Op::infix(Rule::not_equal, Assoc::Left))
            .op(Op::infix(Rule::less, Assoc::Left)
                | Op::infix(Rule::less_equal, Assoc::Left)
                | Op::infix(Rule::greater, Assoc::Left)
                | Op::infix(Rule::greater_equal, Assoc::Left))
            .op(Op::infix(Rule::shift_left, Assoc::Left) | Op::infix(Rule::shift_right, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::subtract, Assoc::Left))
            .op(Op::infix(Rule::multiply, Assoc::Left)
                | Op::infix(Rule::divide, Assoc::Left)
                | Op::infix(Rule::modulo, Assoc::Left))
            .op(Op::prefix(Rule::typecast)
                | Op::prefix(Rule::negate)
                | Op::prefix(Rule::logical_not)
                | Op::prefix(Rule::bitwise_not))
    })
}

/// The only child of a rule the grammar gives exactly one.
fn single(p: Pair<Rule>) -> Pair<Rule> {
    let rule = p.as_rule();
    p.into_inner()
        .exactly_one()
        .unwrap_or_else(|_| unreachable!("{rule:?} has exactly one child"))
}

/// The next child of a rule the grammar guarantees to have one more.
fn next<'i>(pairs: &mut Pairs<'i, Rule>) -> Pair<'i, Rule> {
    pairs
        .next()
        .unwrap_or_else(|| unreachable!("grammar guarantees another child"))
}

struct Factory(FileIndex);

impl Factory {
    fn span(&self, p: &Pair<Rule>) -> FileSpan {
        FileSpan::from_ast(self.0, p.as_span())
    }

    fn program(&self, p: Pair<Rule>) -> Result<Program, Error> {
        assert_eq!(p.as_rule(), Rule::program);
        let statements = self.statements(p.into_inner().filter(|p| p.as_rule() != Rule::EOI))?;
        Ok(Program { statements })
    }

    fn statements<'i>(
        &self,
        pairs: impl Iterator<Item = Pair<'i, Rule>>,
    ) -> Result<Vec<Statement>, Error> {
        pairs.map(|p| self.statement(p)).collect()
    }

    fn statement(&self, p: Pair<Rule>) -> Result<Statement, Error> {
        Ok(match p.as_rule() {
            Rule::api_import => Statement::Import(Import {
                span: self.span(&p),
                path: self.string(single(single(p)))?,
            }),
            Rule::api_global => Statement::Global(self.api_global(p)?),
            Rule::api_type => Statement::Type(self.api_type(p)?),
            Rule::metadata => Statement::Metadata(Metadata {
                span: self.span(&p),
                text: single(p).as_str().to_string(),
            }),
            Rule::scope => Statement::Scope(self.scope(p)?),
            Rule::while_loop => {
                let (condition, body) = p.into_inner().collect_tuple().unwrap_or_else(|| unreachable!());
                Statement::While(WhileLoop {
                    condition: self.expression(condition)?,
                    body: self.scope(body)?,
                })
            }
            Rule::for_loop => Statement::For(self.for_loop(p)?),
            Rule::do_while_loop => {
                let (body, condition) = p.into_inner().collect_tuple().unwrap_or_else(|| unreachable!());
                Statement::DoWhile(DoWhileLoop {
                    body: self.scope(body)?,
                    condition: self.expression(condition)?,
                })
            }
            Rule::conditional => Statement::Conditional(self.conditional(p)?),
            Rule::imperative => Statement::Imperative(self.imperative(p)?),
            _ => unreachable!("invalid statement: {:?}", p.as_rule()),
        })
    }

    fn identifier(&self, p: Pair<Rule>) -> Identifier {
        assert_eq!(p.as_rule(), Rule::identifier);
        Identifier {
            name: p.as_str().to_string(),
            span: self.span(&p),
        }
    }

    /// A `primitive_type` or `identifier` pair.
    fn simple_type(&self, p: Pair<Rule>) -> TypeRef {
        let span = self.span(&p);
        let ty = match p.as_rule() {
            Rule::primitive_type | Rule::void_type => Primitive::from_keyword(p.as_str())
                .map(Type::from)
                .unwrap_or_else(|| unreachable!("unknown primitive {}", p.as_str())),
            Rule::identifier => Type::pointer(p.as_str()),
            _ => unreachable!("invalid type: {:?}", p.as_rule()),
        };
        TypeRef { ty, span }
    }

    fn type_name(&self, p: Pair<Rule>) -> TypeRef {
        assert!(matches!(p.as_rule(), Rule::type_name | Rule::return_type));
        let inner = single(p);
        match inner.as_rule() {
            Rule::type_name => self.type_name(inner),
            _ => self.simple_type(inner),
        }
    }

    fn api_global(&self, p: Pair<Rule>) -> Result<ApiGlobal, Error> {
        assert_eq!(p.as_rule(), Rule::api_global);
        let span = self.span(&p);
        let members = p.into_inner().map(|p| self.api_member(p)).collect::<Result<_, _>>()?;
        Ok(ApiGlobal { members, span })
    }

    fn api_type(&self, p: Pair<Rule>) -> Result<ApiType, Error> {
        assert_eq!(p.as_rule(), Rule::api_type);
        let span = self.span(&p);
        let mut inner = p.into_inner();
        let name = self.identifier(next(&mut inner));
        let mut ancestors = vec![];
        let mut members = vec![];
        for pair in inner {
            match pair.as_rule() {
                Rule::api_ancestors => {
                    ancestors.extend(pair.into_inner().map(|p| self.identifier(p)))
                }
                _ => members.push(self.api_member(pair)?),
            }
        }
        Ok(ApiType {
            name,
            ancestors,
            members,
            span,
        })
    }

    fn api_member(&self, p: Pair<Rule>) -> Result<ApiMember, Error> {
        let span = self.span(&p);
        Ok(match p.as_rule() {
            Rule::api_function => {
                let mut inner = p.into_inner();
                let return_type = self.type_name(next(&mut inner));
                let name = self.identifier(next(&mut inner));
                let mut params = vec![];
                let mut variadic = false;
                for param in inner.flat_map(|params| params.into_inner()) {
                    match param.as_rule() {
                        Rule::variadic => variadic = true,
                        _ => {
                            let (ty, name) =
                                param.into_inner().collect_tuple().unwrap_or_else(|| unreachable!());
                            params.push(ApiParam {
                                ty: self.type_name(ty),
                                name: self.identifier(name),
                            });
                        }
                    }
                }
                ApiMember::Function(ApiFunction {
                    return_type,
                    name,
                    params,
                    variadic,
                    span,
                })
            }
            Rule::api_property => {
                let mut inner = p.into_inner().peekable();
                let readonly = inner.next_if(|p| p.as_rule() == Rule::readonly).is_some();
                let (ty, name) = inner.collect_tuple().unwrap_or_else(|| unreachable!());
                ApiMember::Property(ApiProperty {
                    readonly,
                    ty: self.type_name(ty),
                    name: self.identifier(name),
                    span,
                })
            }
            Rule::api_subscript => {
                let mut inner = p.into_inner().peekable();
                let readonly = inner.next_if(|p| p.as_rule() == Rule::readonly).is_some();
                let (return_type, index_type, index_name) =
                    inner.collect_tuple().unwrap_or_else(|| unreachable!());
                ApiMember::Subscript(ApiSubscript {
                    readonly,
                    return_type: self.type_name(return_type),
                    index_type: self.type_name(index_type),
                    index_name: self.identifier(index_name),
                    span,
                })
            }
            _ => unreachable!("invalid api member: {:?}", p.as_rule()),
        })
    }

    fn scope(&self, p: Pair<Rule>) -> Result<Scope, Error> {
        assert_eq!(p.as_rule(), Rule::scope);
        let span = self.span(&p);
        Ok(Scope {
            statements: self.statements(p.into_inner())?,
            span,
        })
    }

    fn for_loop(&self, p: Pair<Rule>) -> Result<ForLoop, Error> {
        assert_eq!(p.as_rule(), Rule::for_loop);
        let (init, condition, step, body) =
            p.into_inner().collect_tuple().unwrap_or_else(|| unreachable!());
        Ok(ForLoop {
            init: init.into_inner().next().map(|p| self.imperative(p)).transpose()?,
            condition: condition.into_inner().next().map(|p| self.expression(p)).transpose()?,
            step: step.into_inner().next().map(|p| self.imperative(p)).transpose()?,
            body: self.scope(body)?,
        })
    }

    fn conditional(&self, p: Pair<Rule>) -> Result<Conditional, Error> {
        assert_eq!(p.as_rule(), Rule::conditional);
        let mut inner = p.into_inner();
        let condition = self.expression(next(&mut inner))?;
        let body = self.scope(next(&mut inner))?;
        let otherwise = match inner.next() {
            Some(otherwise) => {
                let otherwise = single(otherwise);
                Some(match otherwise.as_rule() {
                    Rule::conditional => Else::If(Box::new(self.conditional(otherwise)?)),
                    _ => Else::Scope(self.scope(otherwise)?),
                })
            }
            None => None,
        };
        Ok(Conditional {
            condition,
            body,
            otherwise,
        })
    }

    fn imperative(&self, p: Pair<Rule>) -> Result<Imperative, Error> {
        assert_eq!(p.as_rule(), Rule::imperative);
        let span = self.span(&p);
        let inner = single(p);
        let kind = match inner.as_rule() {
            Rule::break_statement => ImperativeKind::Break,
            Rule::continue_statement => ImperativeKind::Continue,
            Rule::exit_statement => ImperativeKind::Exit,
            Rule::variable_declaration => {
                let mut parts = inner.into_inner();
                let ty = self.type_name(next(&mut parts));
                let name = self.identifier(next(&mut parts));
                let value = parts.next().map(|p| self.expression(p)).transpose()?;
                ImperativeKind::Declaration(VariableDeclaration { ty, name, value })
            }
            Rule::assignment => {
                let (target, operator, value) =
                    inner.into_inner().collect_tuple().unwrap_or_else(|| unreachable!());
                let operator = match operator.as_str() {
                    "=" => None,
                    "+=" => Some(BinaryOp::Add),
                    "-=" => Some(BinaryOp::Subtract),
                    "*=" => Some(BinaryOp::Multiply),
                    "/=" => Some(BinaryOp::Divide),
                    "%=" => Some(BinaryOp::Modulo),
                    "&=" => Some(BinaryOp::BitwiseAnd),
                    "|=" => Some(BinaryOp::BitwiseOr),
                    "^=" => Some(BinaryOp::BitwiseXor),
                    "<<=" => Some(BinaryOp::ShiftLeft),
                    ">>=" => Some(BinaryOp::ShiftRight),
                    other => unreachable!("invalid assignment operator {other}"),
                };
                ImperativeKind::Assignment(Assignment {
                    target: self.object_expression(target)?,
                    operator,
                    value: self.expression(value)?,
                })
            }
            Rule::increment => {
                let (target, operator) =
                    inner.into_inner().collect_tuple().unwrap_or_else(|| unreachable!());
                ImperativeKind::Increment {
                    target: self.object_expression(target)?,
                    decrement: operator.as_str() == "--",
                }
            }
            Rule::object_expression => ImperativeKind::Call(self.object_expression(inner)?),
            _ => unreachable!("invalid imperative statement: {:?}", inner.as_rule()),
        };
        Ok(Imperative { kind, span })
    }

    fn expression(&self, p: Pair<Rule>) -> Result<Expression, Error> {
        assert_eq!(p.as_rule(), Rule::expression);
        let span = self.span(&p);
        let mut inner = p.into_inner();
        let condition = self.binary(next(&mut inner))?;
        let Some(then) = inner.next() else {
            return Ok(condition);
        };
        let otherwise = next(&mut inner);
        Ok(Expression {
            kind: ExpressionKind::Ternary {
                condition: Box::new(condition),
                then: Box::new(self.expression(then)?),
                otherwise: Box::new(self.expression(otherwise)?),
            },
            span,
        })
    }

    fn binary(&self, p: Pair<Rule>) -> Result<Expression, Error> {
        assert_eq!(p.as_rule(), Rule::binary);
        pratt()
            .map_primary(|primary| self.primary(primary))
            .map_prefix(|op, operand| {
                let operand = Box::new(operand?);
                let span = self.span(&op).join(operand.span);
                let kind = match op.as_rule() {
                    Rule::typecast => ExpressionKind::Typecast {
                        ty: self.simple_type(single(op)),
                        operand,
                    },
                    Rule::negate => ExpressionKind::Unary {
                        op: UnaryOp::Negate,
                        operand,
                    },
                    Rule::logical_not => ExpressionKind::Unary {
                        op: UnaryOp::LogicalNot,
                        operand,
                    },
                    Rule::bitwise_not => ExpressionKind::Unary {
                        op: UnaryOp::BitwiseNot,
                        operand,
                    },
                    _ => unreachable!("invalid prefix operator: {:?}", op.as_rule()),
                };
                Ok(Expression { kind, span })
            })
            .map_infix(|left, op, right| {
                let (left, right) = (left?, right?);
                let op = match op.as_rule() {
                    Rule::null_coalescing => BinaryOp::NullCoalescing,
                    Rule::logical_or => BinaryOp::LogicalOr,
                    Rule::logical_and => BinaryOp::LogicalAnd,
                    Rule::bitwise_or => BinaryOp::BitwiseOr,
                    Rule::bitwise_xor => BinaryOp::BitwiseXor,
                    Rule::bitwise_and => BinaryOp::BitwiseAnd,
                    Rule::equal => BinaryOp::Equal,
                    Rule::not_equal => BinaryOp::NotEqual,
                    Rule::less => BinaryOp::Less,
                    Rule::less_equal => BinaryOp::LessOrEqual,
                    Rule::greater => BinaryOp::Greater,
                    Rule::greater_equal => BinaryOp::GreaterOrEqual,
                    Rule::shift_left => BinaryOp::ShiftLeft,
                    Rule::shift_right => BinaryOp::ShiftRight,
                    Rule::add => BinaryOp::Add,
                    Rule::subtract => BinaryOp::Subtract,
                    Rule::multiply => BinaryOp::Multiply,
                    Rule::divide => BinaryOp::Divide,
                    Rule::modulo => BinaryOp::Modulo,
                    _ => unreachable!("invalid infix operator: {:?}", op.as_rule()),
                };
                Ok(Expression {
                    span: left.span.join(right.span),
                    kind: ExpressionKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                })
            })
            .parse(p.into_inner())
    }

    fn primary(&self, p: Pair<Rule>) -> Result<Expression, Error> {
        let span = self.span(&p);
        let kind = match p.as_rule() {
            Rule::int_literal => {
                let value = p.as_str().parse::<u64>().map_err(|_| {
                    Error::at(
                        span,
                        format!("Integer literal '{}' is too large.", p.as_str()),
                    )
                })?;
                ExpressionKind::Literal(Literal::AmbiguousInt(value))
            }
            Rule::float_literal => {
                let value = p.as_str().parse::<f64>().map_err(|_| {
                    Error::at(span, format!("Invalid number '{}'.", p.as_str()))
                })?;
                ExpressionKind::Literal(Literal::AmbiguousFloat(value))
            }
            Rule::string_literal => ExpressionKind::Literal(Literal::String(self.string(single(p))?)),
            Rule::true_literal => ExpressionKind::Literal(Literal::Bool(true)),
            Rule::false_literal => ExpressionKind::Literal(Literal::Bool(false)),
            Rule::null_literal => ExpressionKind::Literal(Literal::Null),
            Rule::parenthesized => {
                ExpressionKind::Parenthesized(Box::new(self.expression(single(p))?))
            }
            Rule::object_expression => ExpressionKind::Object(self.object_expression(p)?),
            _ => unreachable!("invalid primary expression: {:?}", p.as_rule()),
        };
        Ok(Expression { kind, span })
    }

    /// Contents of a string literal with escape sequences replaced.
    fn string(&self, p: Pair<Rule>) -> Result<String, Error> {
        assert_eq!(p.as_rule(), Rule::string_content);
        let mut result = String::with_capacity(p.as_str().len());
        let mut chars = p.as_str().chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            result.push(match chars.next() {
                Some('a') => '\x07',
                Some('b') => '\x08',
                Some('e') => '\x1b',
                Some('f') => '\x0c',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some('v') => '\x0b',
                Some('"') => '"',
                Some('\\') => '\\',
                other => {
                    return Err(Error::at(
                        self.span(&p),
                        format!(
                            "Invalid escape sequence '\\{}'.",
                            other.map(String::from).unwrap_or_default()
                        ),
                    ))
                }
            });
        }
        Ok(result)
    }

    fn object_expression(&self, p: Pair<Rule>) -> Result<ObjectExpression, Error> {
        assert_eq!(p.as_rule(), Rule::object_expression);
        let mut inner = p.into_inner();
        let mut result = self.object_root(next(&mut inner))?;
        for suffix in inner {
            let span = result.span.join(self.span(&suffix));
            let kind = match suffix.as_rule() {
                Rule::member_suffix => ObjectKind::Member {
                    prefix: Box::new(result),
                    member: Box::new(self.object_root(single(suffix))?),
                },
                Rule::subscript_suffix => ObjectKind::Subscript {
                    prefix: Box::new(result),
                    index: Box::new(self.expression(single(suffix))?),
                },
                _ => unreachable!("invalid object suffix: {:?}", suffix.as_rule()),
            };
            result = ObjectExpression { kind, span };
        }
        Ok(result)
    }

    fn object_root(&self, p: Pair<Rule>) -> Result<ObjectExpression, Error> {
        let span = self.span(&p);
        let kind = match p.as_rule() {
            Rule::name => ObjectKind::Name(self.identifier(single(p))),
            Rule::invocation => {
                let mut inner = p.into_inner();
                let name = self.identifier(next(&mut inner));
                let args = match inner.next() {
                    Some(args) => args
                        .into_inner()
                        .map(|p| self.expression(p))
                        .collect::<Result<_, _>>()?,
                    None => vec![],
                };
                ObjectKind::Invocation { name, args }
            }
            _ => unreachable!("invalid object expression: {:?}", p.as_rule()),
        };
        Ok(ObjectExpression { kind, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(source: &str) -> Program {
        parse(FileIndex::from(0), source).unwrap()
    }

    fn single_expression(source: &str) -> Expression {
        let program = parse_source(&format!("int32 x = {source};"));
        let Some(Statement::Imperative(Imperative {
            kind: ImperativeKind::Declaration(declaration),
            ..
        })) = program.statements.into_iter().next()
        else {
            panic!("expected a declaration")
        };
        declaration.value.unwrap()
    }

    #[test]
    fn parses_api_declarations() {
        let program = parse_source(
            r#"
            #import "other.skn"
            #global {
                void print(string s, ...);
                readonly Node root;
            }
            #type Node : Base, Other {
                Node child(int32 i);
                readonly string name;
                Node [uint8 idx];
            }
            "#,
        );
        let imports: Vec<_> = program.imports().map(|i| i.path.as_str()).collect();
        assert_eq!(imports, vec!["other.skn"]);

        let globals: Vec<_> = program.globals().collect();
        let ApiMember::Function(print) = globals[0] else { panic!() };
        assert_eq!(print.name.name, "print");
        assert!(print.variadic);
        assert_eq!(print.return_type.ty, Type::from(Primitive::Void));
        assert_eq!(print.params[0].ty.ty, Type::from(Primitive::String));
        let ApiMember::Property(root) = globals[1] else { panic!() };
        assert!(root.readonly);
        assert_eq!(root.ty.ty, Type::pointer("Node"));

        let node = program.types().next().unwrap();
        assert_eq!(node.name.name, "Node");
        let ancestors: Vec<_> = node.ancestors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(ancestors, vec!["Base", "Other"]);
        assert_eq!(node.functions().count(), 1);
        assert_eq!(node.properties().count(), 1);
        let subscript = node.subscripts().next().unwrap();
        assert_eq!(subscript.index_type.ty, Type::from(Primitive::UInt8));
        assert!(!subscript.readonly);
    }

    #[test]
    fn respects_precedence() {
        let expression = single_expression("1 + 2 * 3 == 7 && !b");
        let ExpressionKind::Binary { op: BinaryOp::LogicalAnd, left, right } = expression.kind else {
            panic!("{expression:?}")
        };
        assert!(matches!(right.kind, ExpressionKind::Unary { op: UnaryOp::LogicalNot, .. }));
        let ExpressionKind::Binary { op: BinaryOp::Equal, left, .. } = left.kind else { panic!() };
        let ExpressionKind::Binary { op: BinaryOp::Add, right, .. } = left.kind else { panic!() };
        assert!(matches!(right.kind, ExpressionKind::Binary { op: BinaryOp::Multiply, .. }));
    }

    #[test]
    fn ternary_is_right_associative() {
        let expression = single_expression("a ? 1 : b ? 2 : 3");
        let ExpressionKind::Ternary { otherwise, .. } = expression.kind else { panic!() };
        assert!(matches!(otherwise.kind, ExpressionKind::Ternary { .. }));
    }

    #[test]
    fn distinguishes_casts_from_parentheses() {
        let cast = single_expression("(int8)x");
        assert!(matches!(cast.kind, ExpressionKind::Typecast { .. }));
        let pointer_cast = single_expression("(Node)n");
        assert!(matches!(pointer_cast.kind, ExpressionKind::Typecast { .. }));
        let subtraction = single_expression("(x) - 1");
        assert!(matches!(
            subtraction.kind,
            ExpressionKind::Binary { op: BinaryOp::Subtract, .. }
        ));
    }

    #[test]
    fn parses_object_chains() {
        let expression = single_expression("a.b(1)[2].c");
        let ExpressionKind::Object(object) = expression.kind else { panic!() };
        let ObjectKind::Member { prefix, member } = &object.kind else { panic!() };
        assert!(matches!(&member.kind, ObjectKind::Name(n) if n.name == "c"));
        let ObjectKind::Subscript { prefix, .. } = &prefix.kind else { panic!() };
        let ObjectKind::Member { member, .. } = &prefix.kind else { panic!() };
        assert!(matches!(&member.kind, ObjectKind::Invocation { args, .. } if args.len() == 1));
    }

    #[test]
    fn parses_control_flow() {
        let program = parse_source(
            r#"
            for (int32 i = 0; i < 10; i++) { if (i == 2) { continue; } else if (i == 3) { break; } else { f(i); } }
            while (true) { exit; }
            do { x -= 1; } while (x > 0);
            <? some metadata ?>
            "#,
        );
        assert!(matches!(program.statements[0], Statement::For(ForLoop { init: Some(_), condition: Some(_), step: Some(_), .. })));
        assert!(matches!(program.statements[1], Statement::While(_)));
        assert!(matches!(program.statements[2], Statement::DoWhile(_)));
        let Statement::Metadata(metadata) = &program.statements[3] else { panic!() };
        assert_eq!(metadata.text, " some metadata ");
    }

    #[test]
    fn unescapes_strings() {
        let expression = single_expression(r#""a\tb\"c\\""#);
        let ExpressionKind::Literal(Literal::String(s)) = expression.kind else { panic!() };
        assert_eq!(s, "a\tb\"c\\");

        let error = parse(FileIndex::from(0), r#"string s = "\q";"#).unwrap_err();
        assert_eq!(error.message, "Invalid escape sequence '\\q'.");
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert!(parse(FileIndex::from(0), "int32 while = 1;").is_err());
        let program = parse_source("int32 done = 1; whilst();");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn reports_syntax_errors_with_position() {
        let error = parse(FileIndex::from(0), "int32 x = ;").unwrap_err();
        assert_eq!(error.position, Position::LineCol { line: 1, col: 11 });
        assert!(error.message.starts_with("Syntax error"));
    }
}
