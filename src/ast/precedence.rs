//! Operator precedence of expression nodes.

use strum::{Display, EnumIter};

use crate::ast::{
    node::{AstKind, BinaryOperator, UnaryOperator},
    tree::{AstId, SyntaxTree, TreeState},
};

/// Binding strength of an expression, lowest first.
///
/// The order is total: comparing two levels decides whether an operand needs parentheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum PrecedenceLevel {
    /// `=`, `+=`, ... and lambdas as operands
    Assignment,
    /// `?:`
    Conditional,
    /// `??`
    NullCoalescing,
    /// `||`
    ConditionalOr,
    /// `&&`
    ConditionalAnd,
    /// `|`
    BitwiseOr,
    /// `^`
    ExclusiveOr,
    /// `&`
    BitwiseAnd,
    /// `==`, `!=`
    Equality,
    /// `<`, `>`, `<=`, `>=`, `is`, `as`
    RelationalAndTypeTesting,
    /// `<<`, `>>`
    Shift,
    /// `+`, `-`
    Additive,
    /// `*`, `/`, `%`
    Multiplicative,
    /// `e switch { ... }`
    Switch,
    /// `a..b`
    Range,
    /// Prefix operators, casts and negative literals
    Unary,
    /// Query and lambda expressions
    QueryOrLambda,
    /// The end of a null-conditional chain
    NullableRewrap,
    /// Names, literals, member access, calls, parenthesized expressions
    Primary,
}

impl PrecedenceLevel {
    /// The next stronger level; `Primary` stays `Primary`.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            PrecedenceLevel::Assignment => PrecedenceLevel::Conditional,
            PrecedenceLevel::Conditional => PrecedenceLevel::NullCoalescing,
            PrecedenceLevel::NullCoalescing => PrecedenceLevel::ConditionalOr,
            PrecedenceLevel::ConditionalOr => PrecedenceLevel::ConditionalAnd,
            PrecedenceLevel::ConditionalAnd => PrecedenceLevel::BitwiseOr,
            PrecedenceLevel::BitwiseOr => PrecedenceLevel::ExclusiveOr,
            PrecedenceLevel::ExclusiveOr => PrecedenceLevel::BitwiseAnd,
            PrecedenceLevel::BitwiseAnd => PrecedenceLevel::Equality,
            PrecedenceLevel::Equality => PrecedenceLevel::RelationalAndTypeTesting,
            PrecedenceLevel::RelationalAndTypeTesting => PrecedenceLevel::Shift,
            PrecedenceLevel::Shift => PrecedenceLevel::Additive,
            PrecedenceLevel::Additive => PrecedenceLevel::Multiplicative,
            PrecedenceLevel::Multiplicative => PrecedenceLevel::Switch,
            PrecedenceLevel::Switch => PrecedenceLevel::Range,
            PrecedenceLevel::Range => PrecedenceLevel::Unary,
            PrecedenceLevel::Unary => PrecedenceLevel::QueryOrLambda,
            PrecedenceLevel::QueryOrLambda => PrecedenceLevel::NullableRewrap,
            PrecedenceLevel::NullableRewrap | PrecedenceLevel::Primary => PrecedenceLevel::Primary,
        }
    }
}

/// Level of a binary operator.
#[must_use]
pub fn binary_precedence(operator: BinaryOperator) -> PrecedenceLevel {
    match operator {
        BinaryOperator::Range => PrecedenceLevel::Range,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulus => {
            PrecedenceLevel::Multiplicative
        }
        BinaryOperator::Add | BinaryOperator::Subtract => PrecedenceLevel::Additive,
        BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight => PrecedenceLevel::Shift,
        BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual => PrecedenceLevel::RelationalAndTypeTesting,
        BinaryOperator::Equality | BinaryOperator::InEquality => PrecedenceLevel::Equality,
        BinaryOperator::BitwiseAnd => PrecedenceLevel::BitwiseAnd,
        BinaryOperator::ExclusiveOr => PrecedenceLevel::ExclusiveOr,
        BinaryOperator::BitwiseOr => PrecedenceLevel::BitwiseOr,
        BinaryOperator::ConditionalAnd => PrecedenceLevel::ConditionalAnd,
        BinaryOperator::ConditionalOr => PrecedenceLevel::ConditionalOr,
        BinaryOperator::NullCoalescing => PrecedenceLevel::NullCoalescing,
    }
}

/// Classifies an expression node.
///
/// Negative numeric literals are `Unary`: they print with a leading minus.
#[must_use]
pub fn get_precedence<S: TreeState>(tree: &SyntaxTree<S>, expr: AstId) -> PrecedenceLevel {
    match tree.kind(expr) {
        AstKind::Query { .. } | AstKind::Lambda { .. } => PrecedenceLevel::QueryOrLambda,
        AstKind::Unary { operator } => match operator {
            UnaryOperator::PostIncrement
            | UnaryOperator::PostDecrement
            | UnaryOperator::NullConditional => PrecedenceLevel::Primary,
            UnaryOperator::NullConditionalRewrap => PrecedenceLevel::NullableRewrap,
            _ => PrecedenceLevel::Unary,
        },
        AstKind::Cast => PrecedenceLevel::Unary,
        AstKind::Primitive(literal) if literal.is_negative() => PrecedenceLevel::Unary,
        AstKind::Binary { operator } => binary_precedence(*operator),
        AstKind::SwitchExpression => PrecedenceLevel::Switch,
        AstKind::Is | AstKind::As => PrecedenceLevel::RelationalAndTypeTesting,
        AstKind::Conditional | AstKind::Direction { .. } => PrecedenceLevel::Conditional,
        AstKind::Assignment { .. } => PrecedenceLevel::Assignment,
        // Both carry their own parentheses
        AstKind::Checked | AstKind::Parenthesized => PrecedenceLevel::Primary,
        _ => PrecedenceLevel::Primary,
    }
}
