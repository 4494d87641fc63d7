//! Convenience constructors for common syntax shapes.
//!
//! Each constructor creates the parent node, attaches the given (detached) children under
//! their roles and returns the new node, detached.

use crate::{
    ast::{
        node::{
            AssignmentOperator, AstKind, BinaryOperator, FieldDirection, Literal, Role,
            UnaryOperator,
        },
        tree::{AstId, Mutable, SyntaxTree},
    },
    Result,
};

impl SyntaxTree<Mutable> {
    /// Creates `kind` with `children` attached under their roles.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn make(&mut self, kind: AstKind, children: &[(Role, AstId)]) -> Result<AstId> {
        let node = self.create(kind);
        for &(role, child) in children {
            self.add_child(node, role, child)?;
        }
        Ok(node)
    }

    // ============================================================================================
    // Types
    // ============================================================================================

    /// `int`, `void`, ...
    pub fn primitive_type(&mut self, keyword: &str) -> AstId {
        self.create(AstKind::PrimitiveType {
            keyword: keyword.to_string(),
        })
    }

    /// A single-identifier type.
    pub fn simple_type(&mut self, name: &str) -> AstId {
        self.create(AstKind::SimpleType {
            name: name.to_string(),
        })
    }

    /// `target.name`, or `target::name` with `is_double_colon`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn member_type(&mut self, target: AstId, name: &str, is_double_colon: bool) -> Result<AstId> {
        self.make(
            AstKind::MemberType {
                name: name.to_string(),
                is_double_colon,
            },
            &[(Role::BaseType, target)],
        )
    }

    /// A dotted type name as a chain of member types.
    pub fn named_type(&mut self, full_name: &str) -> Result<AstId> {
        let mut parts = full_name.split('.');
        let first = parts.next().unwrap_or(full_name);
        let mut ty = self.simple_type(first);
        for part in parts {
            ty = self.member_type(ty, part, false)?;
        }
        Ok(ty)
    }

    /// Decorates `base` with pointer, array, nullable or by-ref modifiers.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn composed_type(
        &mut self,
        base: AstId,
        pointer_rank: u32,
        array_rank: u32,
        is_nullable: bool,
        is_ref: bool,
    ) -> Result<AstId> {
        self.make(
            AstKind::ComposedType {
                pointer_rank,
                array_rank,
                is_nullable,
                is_ref,
            },
            &[(Role::BaseType, base)],
        )
    }

    // ============================================================================================
    // Expressions
    // ============================================================================================

    /// A simple name.
    pub fn identifier(&mut self, name: &str) -> AstId {
        self.create(AstKind::Identifier {
            name: name.to_string(),
        })
    }

    /// A literal.
    pub fn literal(&mut self, value: Literal) -> AstId {
        self.create(AstKind::Primitive(value))
    }

    /// `op operand` or `operand op`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn unary(&mut self, operator: UnaryOperator, operand: AstId) -> Result<AstId> {
        self.make(AstKind::Unary { operator }, &[(Role::Expression, operand)])
    }

    /// `left op right`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn binary(&mut self, left: AstId, operator: BinaryOperator, right: AstId) -> Result<AstId> {
        self.make(
            AstKind::Binary { operator },
            &[(Role::Left, left), (Role::Right, right)],
        )
    }

    /// `left op= right`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn assign(&mut self, left: AstId, operator: AssignmentOperator, right: AstId) -> Result<AstId> {
        self.make(
            AstKind::Assignment { operator },
            &[(Role::Left, left), (Role::Right, right)],
        )
    }

    /// `condition ? when_true : when_false`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn conditional(&mut self, condition: AstId, when_true: AstId, when_false: AstId) -> Result<AstId> {
        self.make(
            AstKind::Conditional,
            &[
                (Role::Condition, condition),
                (Role::TrueExpression, when_true),
                (Role::FalseExpression, when_false),
            ],
        )
    }

    /// `(ty)expr`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn cast(&mut self, ty: AstId, expr: AstId) -> Result<AstId> {
        self.make(AstKind::Cast, &[(Role::Type, ty), (Role::Expression, expr)])
    }

    /// `expr is ty`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn is_type(&mut self, expr: AstId, ty: AstId) -> Result<AstId> {
        self.make(AstKind::Is, &[(Role::Expression, expr), (Role::Type, ty)])
    }

    /// `expr as ty`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn as_type(&mut self, expr: AstId, ty: AstId) -> Result<AstId> {
        self.make(AstKind::As, &[(Role::Expression, expr), (Role::Type, ty)])
    }

    /// `checked(expr)`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn checked(&mut self, expr: AstId) -> Result<AstId> {
        self.make(AstKind::Checked, &[(Role::Expression, expr)])
    }

    /// `target.name`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn member(&mut self, target: AstId, name: &str) -> Result<AstId> {
        self.make(
            AstKind::MemberReference {
                name: name.to_string(),
            },
            &[(Role::Target, target)],
        )
    }

    /// A type used as an expression, e.g. the target of a static call.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn type_reference(&mut self, ty: AstId) -> Result<AstId> {
        self.make(AstKind::TypeReference, &[(Role::Type, ty)])
    }

    fn with_arguments(&mut self, kind: AstKind, first: (Role, AstId), arguments: &[AstId]) -> Result<AstId> {
        let node = self.make(kind, &[first])?;
        for &argument in arguments {
            self.add_child(node, Role::Argument, argument)?;
        }
        Ok(node)
    }

    /// `target(arguments)`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn invocation(&mut self, target: AstId, arguments: &[AstId]) -> Result<AstId> {
        self.with_arguments(AstKind::Invocation, (Role::Target, target), arguments)
    }

    /// `target[arguments]`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn indexer(&mut self, target: AstId, arguments: &[AstId]) -> Result<AstId> {
        self.with_arguments(AstKind::Indexer, (Role::Target, target), arguments)
    }

    /// `new ty(arguments)`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn object_create(&mut self, ty: AstId, arguments: &[AstId]) -> Result<AstId> {
        self.with_arguments(AstKind::ObjectCreate, (Role::Type, ty), arguments)
    }

    /// `new element[sizes]`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn array_create(&mut self, element: AstId, sizes: &[AstId]) -> Result<AstId> {
        self.with_arguments(AstKind::ArrayCreate, (Role::Type, element), sizes)
    }

    /// `ref expr`, `out expr` or `in expr`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn direction(&mut self, direction: FieldDirection, expr: AstId) -> Result<AstId> {
        self.make(AstKind::Direction { direction }, &[(Role::Expression, expr)])
    }

    /// `(parameters) => body`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn lambda(&mut self, parameters: &[&str], body: AstId) -> Result<AstId> {
        self.make(
            AstKind::Lambda {
                parameters: parameters.iter().map(|p| (*p).to_string()).collect(),
            },
            &[(Role::Body, body)],
        )
    }

    /// `from variable in source select selection`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn query(&mut self, variable: &str, source: AstId, selection: AstId) -> Result<AstId> {
        self.make(
            AstKind::Query {
                variable: variable.to_string(),
            },
            &[(Role::Target, source), (Role::Expression, selection)],
        )
    }

    // ============================================================================================
    // Statements
    // ============================================================================================

    /// `{ statements }`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn block_statement(&mut self, statements: &[AstId]) -> Result<AstId> {
        let block = self.create(AstKind::Block);
        for &statement in statements {
            self.add_child(block, Role::Statement, statement)?;
        }
        Ok(block)
    }

    /// `expr;`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn expression_statement(&mut self, expr: AstId) -> Result<AstId> {
        self.make(AstKind::ExpressionStatement, &[(Role::Expression, expr)])
    }

    /// `if (condition) then else otherwise`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn if_else(&mut self, condition: AstId, then: AstId, otherwise: Option<AstId>) -> Result<AstId> {
        let node = self.make(
            AstKind::IfElse,
            &[(Role::Condition, condition), (Role::TrueStatement, then)],
        )?;
        self.add_optional(node, Role::FalseStatement, otherwise)?;
        Ok(node)
    }

    /// `T name = init;`, or `T name;` without an initializer.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn variable_declaration(&mut self, name: &str, ty: AstId, init: Option<AstId>) -> Result<AstId> {
        let node = self.make(
            AstKind::VariableDeclaration {
                name: name.to_string(),
            },
            &[(Role::Type, ty)],
        )?;
        self.add_optional(node, Role::Initializer, init)?;
        Ok(node)
    }

    /// `try { body } catch ... finally { finally }`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn try_statement(&mut self, body: AstId, catches: &[AstId], finally: Option<AstId>) -> Result<AstId> {
        let node = self.make(AstKind::Try, &[(Role::TryBlock, body)])?;
        for &clause in catches {
            self.add_child(node, Role::CatchClause, clause)?;
        }
        self.add_optional(node, Role::FinallyBlock, finally)?;
        Ok(node)
    }

    /// `return expr;`.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors.
    pub fn return_statement(&mut self, value: Option<AstId>) -> Result<AstId> {
        let node = self.create(AstKind::Return);
        self.add_optional(node, Role::Expression, value)?;
        Ok(node)
    }
}
