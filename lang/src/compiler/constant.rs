//! Compile-time evaluation of expressions built only from literals.

use std::cmp::Ordering;

use super::Diagnostics;
use crate::{
    ast::{BinaryOp, Expression, ExpressionKind, UnaryOp},
    source::FileSpan,
    types::{reconcile, Literal, Primitive},
};

/// Folds `expression` to a literal. `None` when any part of it depends on runtime values
/// or cannot be folded; problems such as an out of range cast are reported as they are
/// found.
pub fn evaluate(expression: &Expression, diagnostics: &mut Diagnostics) -> Option<Literal> {
    let span = expression.span;
    match &expression.kind {
        ExpressionKind::Literal(literal) => Some(literal.clone()),
        ExpressionKind::Parenthesized(inner) => evaluate(inner, diagnostics),
        ExpressionKind::Object(_) => None,
        ExpressionKind::Typecast { ty, operand } => {
            let value = evaluate(operand, diagnostics)?;
            if value.primitive() == Primitive::Pointer || ty.ty.primitive == Primitive::Pointer {
                return None;
            }
            value
                .cast(ty.ty.primitive)
                .map_err(|error| diagnostics.report(span, error.to_string()))
                .ok()
        }
        ExpressionKind::Unary { op, operand } => unary(*op, evaluate(operand, diagnostics)?),
        ExpressionKind::Binary { op, left, right } => match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                let short_circuit = *op == BinaryOp::LogicalOr;
                let left = evaluate(left, diagnostics).and_then(|l| l.as_bool());
                if left == Some(short_circuit) {
                    return Some(Literal::Bool(short_circuit));
                }
                let right = evaluate(right, diagnostics).and_then(|r| r.as_bool());
                if right == Some(short_circuit) {
                    return Some(Literal::Bool(short_circuit));
                }
                left.zip(right).map(|_| Literal::Bool(!short_circuit))
            }
            BinaryOp::NullCoalescing => {
                let left = evaluate(left, diagnostics)?;
                let right = evaluate(right, diagnostics)?;
                (left == Literal::Null).then_some(right)
            }
            _ => {
                let left = evaluate(left, diagnostics)?;
                let right = evaluate(right, diagnostics)?;
                binary(*op, left, right, span, diagnostics)
            }
        },
        ExpressionKind::Ternary {
            condition,
            then,
            otherwise,
        } => {
            if evaluate(condition, diagnostics)?.as_bool()? {
                evaluate(then, diagnostics)
            } else {
                evaluate(otherwise, diagnostics)
            }
        }
    }
}

fn unary(op: UnaryOp, value: Literal) -> Option<Literal> {
    Some(match (op, value) {
        (UnaryOp::LogicalNot, Literal::Bool(b)) => Literal::Bool(!b),
        (UnaryOp::Negate, Literal::Int8(v)) => Literal::Int8(v.wrapping_neg()),
        (UnaryOp::Negate, Literal::Int16(v)) => Literal::Int16(v.wrapping_neg()),
        (UnaryOp::Negate, Literal::Int32(v)) => Literal::Int32(v.wrapping_neg()),
        (UnaryOp::Negate, Literal::Int64(v)) => Literal::Int64(v.wrapping_neg()),
        (UnaryOp::Negate, Literal::Float32(v)) => Literal::Float32(-v),
        (UnaryOp::Negate, Literal::Float64(v)) => Literal::Float64(-v),
        (UnaryOp::Negate, Literal::AmbiguousFloat(v)) => Literal::AmbiguousFloat(-v),
        (UnaryOp::Negate, Literal::AmbiguousSignedInt(v)) => {
            Literal::AmbiguousSignedInt(v.checked_neg()?)
        }
        (UnaryOp::Negate, Literal::AmbiguousInt(v)) => {
            Literal::AmbiguousSignedInt(i64::try_from(-i128::from(v)).ok()?)
        }
        (UnaryOp::BitwiseNot, Literal::Int8(v)) => Literal::Int8(!v),
        (UnaryOp::BitwiseNot, Literal::Int16(v)) => Literal::Int16(!v),
        (UnaryOp::BitwiseNot, Literal::Int32(v)) => Literal::Int32(!v),
        (UnaryOp::BitwiseNot, Literal::Int64(v)) => Literal::Int64(!v),
        (UnaryOp::BitwiseNot, Literal::UInt8(v)) => Literal::UInt8(!v),
        (UnaryOp::BitwiseNot, Literal::UInt16(v)) => Literal::UInt16(!v),
        (UnaryOp::BitwiseNot, Literal::UInt32(v)) => Literal::UInt32(!v),
        (UnaryOp::BitwiseNot, Literal::UInt64(v)) => Literal::UInt64(!v),
        (UnaryOp::BitwiseNot, Literal::AmbiguousSignedInt(v)) => Literal::AmbiguousSignedInt(!v),
        _ => return None,
    })
}

fn binary(
    op: BinaryOp,
    left: Literal,
    right: Literal,
    span: FileSpan,
    diagnostics: &mut Diagnostics,
) -> Option<Literal> {
    if let (BinaryOp::Add, Literal::String(l), Literal::String(r)) = (op, &left, &right) {
        return Some(Literal::String(format!("{l}{r}")));
    }
    let kind = reconcile(left.primitive(), right.primitive())?;
    let cast = |literal: Literal| {
        literal
            .cast(kind)
            .map_err(|error| error.to_string())
    };
    let (left, right) = match (cast(left), cast(right)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(message), _) | (_, Err(message)) => {
            diagnostics.report(span, message);
            return None;
        }
    };

    if op.is_comparison() {
        let ordering = compare(&left, &right);
        return Some(Literal::Bool(match op {
            BinaryOp::Equal => ordering == Some(Ordering::Equal),
            BinaryOp::NotEqual => ordering != Some(Ordering::Equal),
            _ if !kind.is_numeric() => return None,
            BinaryOp::Less => ordering == Some(Ordering::Less),
            BinaryOp::LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            BinaryOp::Greater => ordering == Some(Ordering::Greater),
            _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }));
    }
    if !op.is_arithmetic() && !op.is_bitwise() {
        return None;
    }
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo)
        && kind.is_integer()
        && right.cast(Primitive::Bool) == Ok(Literal::Bool(false))
    {
        diagnostics.report(span, "Division by zero in a constant expression.");
        return None;
    }
    if matches!(kind, Primitive::AmbiguousInt | Primitive::AmbiguousSignedInt) {
        return ambiguous_integer(op, &left, &right, span, diagnostics);
    }
    arithmetic(op, left, right)
}

fn compare(left: &Literal, right: &Literal) -> Option<Ordering> {
    macro_rules! ordering {
        ($($variant:ident),*) => {
            match (left, right) {
                $((Literal::$variant(a), Literal::$variant(b)) => a.partial_cmp(b),)*
                (Literal::Null, Literal::Null) => Some(Ordering::Equal),
                _ => None,
            }
        };
    }
    ordering!(
        Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32, UInt64, Float32, Float64, Bool, String,
        AmbiguousSignedInt, AmbiguousInt, AmbiguousFloat
    )
}

/// Same semantics as the VM: integers wrap at their width.
fn arithmetic(op: BinaryOp, left: Literal, right: Literal) -> Option<Literal> {
    macro_rules! float {
        ($a:expr, $b:expr) => {
            match op {
                BinaryOp::Add => $a + $b,
                BinaryOp::Subtract => $a - $b,
                BinaryOp::Multiply => $a * $b,
                BinaryOp::Divide => $a / $b,
                BinaryOp::Modulo => $a % $b,
                _ => return None,
            }
        };
    }
    macro_rules! integers {
        ($($variant:ident),*) => {
            match (left, right) {
                $((Literal::$variant(a), Literal::$variant(b)) => Literal::$variant(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Subtract => a.wrapping_sub(b),
                    BinaryOp::Multiply => a.wrapping_mul(b),
                    BinaryOp::Divide => a.wrapping_div(b),
                    BinaryOp::Modulo => a.wrapping_rem(b),
                    BinaryOp::BitwiseAnd => a & b,
                    BinaryOp::BitwiseOr => a | b,
                    BinaryOp::BitwiseXor => a ^ b,
                    BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
                    BinaryOp::ShiftRight => a.wrapping_shr(b as u32),
                    _ => return None,
                }),)*
                (Literal::Float32(a), Literal::Float32(b)) => Literal::Float32(float!(a, b)),
                (Literal::Float64(a), Literal::Float64(b)) => Literal::Float64(float!(a, b)),
                (Literal::AmbiguousFloat(a), Literal::AmbiguousFloat(b)) => {
                    Literal::AmbiguousFloat(float!(a, b))
                }
                _ => return None,
            }
        };
    }
    Some(integers!(Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32, UInt64))
}

/// Untyped integer literals compute exactly and stay untyped. A negative result becomes a
/// signed literal.
fn ambiguous_integer(
    op: BinaryOp,
    left: &Literal,
    right: &Literal,
    span: FileSpan,
    diagnostics: &mut Diagnostics,
) -> Option<Literal> {
    let value = |literal: &Literal| match *literal {
        Literal::AmbiguousInt(v) => Some(i128::from(v)),
        Literal::AmbiguousSignedInt(v) => Some(i128::from(v)),
        _ => None,
    };
    let (a, b) = (value(left)?, value(right)?);
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        BinaryOp::BitwiseAnd => Some(a & b),
        BinaryOp::BitwiseOr => Some(a | b),
        BinaryOp::BitwiseXor => Some(a ^ b),
        BinaryOp::ShiftLeft => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)),
        BinaryOp::ShiftRight => u32::try_from(b).ok().and_then(|b| a.checked_shr(b)),
        _ => return None,
    };
    let literal = result.and_then(|r| {
        if r < 0 {
            i64::try_from(r).ok().map(Literal::AmbiguousSignedInt)
        } else {
            u64::try_from(r).ok().map(Literal::AmbiguousInt)
        }
    });
    if literal.is_none() {
        diagnostics.report(
            span,
            "The result of this constant expression is outside the range of a 64-bit integer.",
        );
    }
    literal
}
