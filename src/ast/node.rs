//! Syntax node kinds, operators and child roles.

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

/// A literal value of a [`AstKind::Primitive`] expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Any integer constant
    Int(i64),
    /// An integer constant of an unsigned type, printed with a `u` suffix
    UInt(u64),
    /// A `double` constant
    Float(f64),
    /// A `float` constant, printed with an `f` suffix
    Float32(f32),
    /// `true` / `false`
    Bool(bool),
    /// A string constant
    String(String),
    /// `null`
    Null,
}

impl Literal {
    /// Returns true if the literal prints with a leading minus sign.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        match self {
            Literal::Int(value) => *value < 0,
            Literal::Float(value) => value.is_finite() && *value < 0.0,
            Literal::Float32(value) => value.is_finite() && *value < 0.0,
            _ => false,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Float(value) if value.is_nan() => write!(f, "double.NaN"),
            Literal::Float(value) if value.is_infinite() => {
                if *value > 0.0 {
                    write!(f, "double.PositiveInfinity")
                } else {
                    write!(f, "double.NegativeInfinity")
                }
            }
            Literal::Float(value) => write!(f, "{value:?}"),
            Literal::UInt(value) => write!(f, "{value}u"),
            Literal::Float32(value) if value.is_nan() => write!(f, "float.NaN"),
            Literal::Float32(value) if value.is_infinite() => {
                if *value > 0.0 {
                    write!(f, "float.PositiveInfinity")
                } else {
                    write!(f, "float.NegativeInfinity")
                }
            }
            Literal::Float32(value) => write!(f, "{value:?}f"),
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::String(value) => {
                f.write_str("\"")?;
                for ch in value.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        '\0' => f.write_str("\\0")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
            Literal::Null => write!(f, "null"),
        }
    }
}

/// Operators of [`AstKind::Unary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum UnaryOperator {
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `-x`
    Minus,
    /// `+x`
    Plus,
    /// `++x`
    Increment,
    /// `--x`
    Decrement,
    /// `x++`
    PostIncrement,
    /// `x--`
    PostDecrement,
    /// `*x`
    Dereference,
    /// `&x`
    AddressOf,
    /// `x?` as the start of a null-conditional access chain
    NullConditional,
    /// End of a null-conditional chain; prints as its operand
    NullConditionalRewrap,
}

impl UnaryOperator {
    /// Source token.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::BitNot => "~",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Increment | UnaryOperator::PostIncrement => "++",
            UnaryOperator::Decrement | UnaryOperator::PostDecrement => "--",
            UnaryOperator::Dereference => "*",
            UnaryOperator::AddressOf => "&",
            UnaryOperator::NullConditional => "?",
            UnaryOperator::NullConditionalRewrap => "",
        }
    }

    /// Returns true if the token follows the operand.
    #[must_use]
    pub fn is_postfix(self) -> bool {
        matches!(
            self,
            UnaryOperator::PostIncrement
                | UnaryOperator::PostDecrement
                | UnaryOperator::NullConditional
                | UnaryOperator::NullConditionalRewrap
        )
    }
}

/// Operators of [`AstKind::Binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum BinaryOperator {
    /// `&`
    BitwiseAnd,
    /// `|`
    BitwiseOr,
    /// `^`
    ExclusiveOr,
    /// `&&`
    ConditionalAnd,
    /// `||`
    ConditionalOr,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `==`
    Equality,
    /// `!=`
    InEquality,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulus,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `??`
    NullCoalescing,
    /// `..`
    Range,
}

impl BinaryOperator {
    /// Source token.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
            BinaryOperator::ExclusiveOr => "^",
            BinaryOperator::ConditionalAnd => "&&",
            BinaryOperator::ConditionalOr => "||",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Equality => "==",
            BinaryOperator::InEquality => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulus => "%",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
            BinaryOperator::NullCoalescing => "??",
            BinaryOperator::Range => "..",
        }
    }

    /// `&`, `|` and `^`.
    #[must_use]
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOperator::BitwiseAnd | BinaryOperator::BitwiseOr | BinaryOperator::ExclusiveOr
        )
    }
}

/// Operators of [`AstKind::Assignment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum AssignmentOperator {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Subtract,
    /// `*=`
    Multiply,
    /// `/=`
    Divide,
    /// `%=`
    Modulus,
    /// `<<=`
    ShiftLeft,
    /// `>>=`
    ShiftRight,
    /// `&=`
    BitwiseAnd,
    /// `|=`
    BitwiseOr,
    /// `^=`
    ExclusiveOr,
}

impl AssignmentOperator {
    /// Source token.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            AssignmentOperator::Assign => "=",
            AssignmentOperator::Add => "+=",
            AssignmentOperator::Subtract => "-=",
            AssignmentOperator::Multiply => "*=",
            AssignmentOperator::Divide => "/=",
            AssignmentOperator::Modulus => "%=",
            AssignmentOperator::ShiftLeft => "<<=",
            AssignmentOperator::ShiftRight => ">>=",
            AssignmentOperator::BitwiseAnd => "&=",
            AssignmentOperator::BitwiseOr => "|=",
            AssignmentOperator::ExclusiveOr => "^=",
        }
    }
}

/// Passing mode of a [`AstKind::Direction`] argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FieldDirection {
    /// `ref x`
    #[strum(serialize = "ref")]
    Ref,
    /// `out x`
    #[strum(serialize = "out")]
    Out,
    /// `in x`
    #[strum(serialize = "in")]
    In,
}

/// Payload of a syntax node.
///
/// Children are not part of the payload; each child sits under a [`Role`] listed in the
/// variant docs. `?` marks an optional child, `*` a repeated one.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum AstKind {
    // ========================================================================
    // Types
    // ========================================================================
    /// `int`, `string`, `void`, ...
    PrimitiveType {
        /// Keyword
        keyword: String,
    },
    /// A type named by a single identifier
    SimpleType {
        /// Type name
        name: String,
    },
    /// `Target.Name` or `Target::Name`; children: `BaseType`
    MemberType {
        /// Member name
        name: String,
        /// Uses `::` (an alias qualifier) instead of `.`
        is_double_colon: bool,
    },
    /// Pointer, array, nullable and by-ref decorations; children: `BaseType`
    ComposedType {
        /// Number of `*`
        pointer_rank: u32,
        /// Number of `[]`
        array_rank: u32,
        /// Trailing `?`
        is_nullable: bool,
        /// Leading `ref`
        is_ref: bool,
    },

    // ========================================================================
    // Expressions
    // ========================================================================
    /// A local, parameter or other simple name
    Identifier {
        /// Name
        name: String,
    },
    /// A literal constant
    Primitive(Literal),
    /// `this`
    This,
    /// `(e)`; children: `Expression`
    Parenthesized,
    /// children: `Expression`
    Unary {
        /// Operator
        operator: UnaryOperator,
    },
    /// children: `Left`, `Right`
    Binary {
        /// Operator
        operator: BinaryOperator,
    },
    /// children: `Left`, `Right`
    Assignment {
        /// Operator
        operator: AssignmentOperator,
    },
    /// `c ? t : f`; children: `Condition`, `TrueExpression`, `FalseExpression`
    Conditional,
    /// `(T)e`; children: `Type`, `Expression`
    Cast,
    /// `e is T`; children: `Expression`, `Type`
    Is,
    /// `e as T`; children: `Expression`, `Type`
    As,
    /// `f(args)`; children: `Target`, `Argument*`
    Invocation,
    /// `e.Name`; children: `Target`
    MemberReference {
        /// Member name
        name: String,
    },
    /// A type used as the target of a static member access; children: `Type`
    TypeReference,
    /// `e[args]`; children: `Target`, `Argument*`
    Indexer,
    /// `new T(args)`; children: `Type`, `Argument*`
    ObjectCreate,
    /// `new T[sizes]`; children: `Type`, `Argument*`
    ArrayCreate,
    /// `default(T)`; children: `Type`
    Default,
    /// `sizeof(T)`; children: `Type`
    SizeOf,
    /// `ref e`, `out e`, `in e`; children: `Expression`
    Direction {
        /// Passing mode
        direction: FieldDirection,
    },
    /// `(a, b) => body`; children: `Body`
    Lambda {
        /// Parameter names
        parameters: Vec<String>,
    },
    /// `from v in source select e`; children: `Target`, `Expression`
    Query {
        /// Range variable
        variable: String,
    },
    /// `e switch { arms }`; children: `Expression`, `Arm*`
    SwitchExpression,
    /// `pattern => body`; children: `Pattern`, `Body`
    SwitchExpressionArm,
    /// `checked(e)`; children: `Expression`
    Checked,

    // ========================================================================
    // Statements
    // ========================================================================
    /// `{ ... }`; children: `Statement*`
    Block,
    /// `e;`; children: `Expression`
    ExpressionStatement,
    /// `T name = init;`; children: `Type`, `Initializer?`
    VariableDeclaration {
        /// Variable name
        name: String,
    },
    /// children: `Condition`, `TrueStatement`, `FalseStatement?`
    IfElse,
    /// children: `Condition`, `EmbeddedStatement`
    While,
    /// children: `Expression`, `SwitchSection*`
    Switch,
    /// children: `CaseLabel*`, `Statement*`
    SwitchSection,
    /// `case e:` or, without a child, `default:`; children: `Expression?`
    CaseLabel,
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `goto label;`
    Goto {
        /// Target label
        label: String,
    },
    /// `label:`
    Label {
        /// Label name
        label: String,
    },
    /// children: `Expression?`
    Return,
    /// children: `Expression?`
    Throw,
    /// `checked { ... }`; children: `Body`
    CheckedStatement,
    /// children: `TryBlock`, `CatchClause*`, `FinallyBlock?`
    Try,
    /// `catch (T name) when (c) { ... }`; children: `Type?`, `Condition?`, `Body`
    CatchClause {
        /// Name of the exception variable, `None` when the handler never reads it
        variable: Option<String>,
    },
    /// `lock (e) { ... }`; children: `Expression`, `EmbeddedStatement`
    Lock,
    /// `using (T v = e) { ... }`; children: `ResourceAcquisition`, `EmbeddedStatement`
    Using {
        /// `await using`
        is_async: bool,
    },

    // ========================================================================
    // Declarations
    // ========================================================================
    /// children: `ReturnType`, `Parameter*`, `Body`
    Method {
        /// Method name
        name: String,
        /// Declared `static`
        is_static: bool,
    },
    /// children: `Type`
    Parameter {
        /// Parameter name
        name: String,
    },
}

impl AstKind {
    /// Variant name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Returns true for type nodes.
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            AstKind::PrimitiveType { .. }
                | AstKind::SimpleType { .. }
                | AstKind::MemberType { .. }
                | AstKind::ComposedType { .. }
        )
    }

    /// Returns true for statement nodes.
    #[must_use]
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            AstKind::Block
                | AstKind::ExpressionStatement
                | AstKind::VariableDeclaration { .. }
                | AstKind::IfElse
                | AstKind::While
                | AstKind::Switch
                | AstKind::Break
                | AstKind::Continue
                | AstKind::Goto { .. }
                | AstKind::Label { .. }
                | AstKind::Return
                | AstKind::Throw
                | AstKind::CheckedStatement
                | AstKind::Try
                | AstKind::Lock
                | AstKind::Using { .. }
        )
    }

    /// Returns true for expression nodes.
    #[must_use]
    pub fn is_expression(&self) -> bool {
        !self.is_type()
            && !self.is_statement()
            && !matches!(
                self,
                AstKind::SwitchSection
                    | AstKind::CaseLabel
                    | AstKind::SwitchExpressionArm
                    | AstKind::CatchClause { .. }
                    | AstKind::Method { .. }
                    | AstKind::Parameter { .. }
            )
    }
}

/// The position a child occupies in its parent.
///
/// Every role accepts only a category of node kinds; [`crate::ast::SyntaxTree`] refuses to
/// attach a child under a role that rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum Role {
    /// The tree root; accepts any node
    Root,
    /// A type operand
    Type,
    /// The declared return type of a method
    ReturnType,
    /// The decorated or qualified type of a composed or member type
    BaseType,
    /// The receiver of a member access, call, indexer or query source
    Target,
    /// A call, indexer or creation argument
    Argument,
    /// A generic expression slot
    Expression,
    /// Left operand
    Left,
    /// Right operand
    Right,
    /// Condition of `if`, `while` and `?:`
    Condition,
    /// `?:` true arm
    TrueExpression,
    /// `?:` false arm
    FalseExpression,
    /// Initial value of a declaration
    Initializer,
    /// Body of a method, lambda, switch-expression arm, `catch` or `checked` block
    Body,
    /// A statement in a block or switch section
    Statement,
    /// Body of a loop
    EmbeddedStatement,
    /// `if` body
    TrueStatement,
    /// `else` body
    FalseStatement,
    /// A section of a switch statement
    SwitchSection,
    /// A label of a switch section
    CaseLabel,
    /// An arm of a switch expression
    Arm,
    /// The pattern of a switch-expression arm
    Pattern,
    /// A method parameter
    Parameter,
    /// The guarded block of a `try`
    TryBlock,
    /// A `catch` clause of a `try`
    CatchClause,
    /// The `finally` block of a `try`
    FinallyBlock,
    /// The declaration or expression a `using` disposes
    ResourceAcquisition,
}

impl Role {
    /// Returns true if a node of `kind` may occupy this role.
    #[must_use]
    pub fn is_valid(self, kind: &AstKind) -> bool {
        match self {
            Role::Root => true,
            Role::Type | Role::ReturnType | Role::BaseType => kind.is_type(),
            Role::Target
            | Role::Argument
            | Role::Expression
            | Role::Left
            | Role::Right
            | Role::Condition
            | Role::TrueExpression
            | Role::FalseExpression
            | Role::Initializer
            | Role::Pattern => kind.is_expression(),
            Role::Body => *kind == AstKind::Block || kind.is_expression(),
            Role::TryBlock | Role::FinallyBlock => *kind == AstKind::Block,
            Role::CatchClause => matches!(kind, AstKind::CatchClause { .. }),
            Role::ResourceAcquisition => {
                matches!(kind, AstKind::VariableDeclaration { .. }) || kind.is_expression()
            }
            Role::Statement
            | Role::EmbeddedStatement
            | Role::TrueStatement
            | Role::FalseStatement => kind.is_statement(),
            Role::SwitchSection => *kind == AstKind::SwitchSection,
            Role::CaseLabel => *kind == AstKind::CaseLabel,
            Role::Arm => *kind == AstKind::SwitchExpressionArm,
            Role::Parameter => matches!(kind, AstKind::Parameter { .. }),
        }
    }

    /// Role name, for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_categories_are_disjoint() {
        let samples = [
            AstKind::SimpleType { name: "T".into() },
            AstKind::Identifier { name: "x".into() },
            AstKind::Primitive(Literal::Int(1)),
            AstKind::Return,
            AstKind::Block,
            AstKind::CaseLabel,
            AstKind::Checked,
            AstKind::Try,
            AstKind::CatchClause { variable: None },
        ];
        for kind in &samples {
            let categories = [kind.is_type(), kind.is_expression(), kind.is_statement()];
            assert!(categories.iter().filter(|&&c| c).count() <= 1, "{kind:?}");
        }
        assert!(!AstKind::CaseLabel.is_expression());
        assert!(AstKind::Checked.is_expression());
        assert!(AstKind::CheckedStatement.is_statement());
        assert!(!AstKind::CatchClause { variable: None }.is_expression());
    }

    #[test]
    fn test_role_validity() {
        let ident = AstKind::Identifier { name: "x".into() };
        let ty = AstKind::PrimitiveType { keyword: "int".into() };
        assert!(Role::Left.is_valid(&ident));
        assert!(!Role::Left.is_valid(&ty));
        assert!(Role::Type.is_valid(&ty));
        assert!(!Role::Statement.is_valid(&ident));
        assert!(Role::Body.is_valid(&AstKind::Block));
        assert!(Role::Body.is_valid(&ident));
        assert!(!Role::SwitchSection.is_valid(&AstKind::Block));
        assert!(Role::Root.is_valid(&AstKind::Break));
        assert!(Role::TryBlock.is_valid(&AstKind::Block));
        assert!(!Role::FinallyBlock.is_valid(&AstKind::Break));
        assert!(Role::ResourceAcquisition.is_valid(&AstKind::VariableDeclaration { name: "r".into() }));
        assert!(!Role::CatchClause.is_valid(&AstKind::Block));
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Int(-5).to_string(), "-5");
        assert_eq!(Literal::Float(1.0).to_string(), "1.0");
        assert_eq!(Literal::String("a\"b\n".into()).to_string(), "\"a\\\"b\\n\"");
        assert_eq!(Literal::Null.to_string(), "null");
        assert!(Literal::Float(-0.5).is_negative());
        assert!(!Literal::Float(f64::NEG_INFINITY).is_negative());
        assert_eq!(Literal::Float32(0.1).to_string(), "0.1f");
        assert_eq!(Literal::Float32(f32::NAN).to_string(), "float.NaN");
        assert!(Literal::Float32(-2.5).is_negative());
        assert_eq!(Literal::UInt(4_294_967_295).to_string(), "4294967295u");
    }
}
