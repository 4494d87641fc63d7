//! Parenthesis insertion.
//!
//! [`InsertParenthesesVisitor`] runs once over a finished syntax tree and wraps every
//! operand whose precedence is too low for its position in a
//! [`AstKind::Parenthesized`] node. Each node first fixes its own operands and then the
//! walk descends into the (possibly wrapped) children, so a single top-down pass
//! suffices. A second pass finds nothing to do: parenthesized nodes are `Primary`.
//!
//! # Modes
//!
//! - **Minimal** - only what the grammar needs to parse the output back into the same tree
//! - **Readability** - additionally parenthesizes operands a reader would otherwise have to
//!   look up: `?:` arms, `is`/`as` operands, mixed bitwise/equality chains, casts of
//!   non-primary expressions and lambdas or queries inside operators
//!
//! # Grammar special cases
//!
//! - `(T)-x` parses as a subtraction when `T` could be an expression (a simple type or a
//!   member type written with `.`), so the operand of such a cast is wrapped when it is a
//!   prefix operator other than `!`/`~` or a negative literal
//! - `??` is right-associative
//! - Queries and lambdas extend as far right as possible and are wrapped when they are
//!   the left operand of a binary operator or the operand of `is`/`as`

use crate::{
    ast::{
        node::{AstKind, BinaryOperator, Role, UnaryOperator},
        precedence::{get_precedence, PrecedenceLevel},
        tree::{AstId, Mutable, SyntaxTree, TreeState},
    },
    settings::DecompilerSettings,
    Result,
};

/// Inserts the parentheses a syntax tree needs to print correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertParenthesesVisitor {
    insert_parentheses_for_readability: bool,
}

impl InsertParenthesesVisitor {
    /// Creates a visitor; `readability` selects the readability mode.
    #[must_use]
    pub fn new(readability: bool) -> Self {
        Self {
            insert_parentheses_for_readability: readability,
        }
    }

    /// A visitor inserting only required parentheses.
    #[must_use]
    pub fn minimal() -> Self {
        Self::new(false)
    }

    /// A visitor inserting readability parentheses as well.
    #[must_use]
    pub fn readability() -> Self {
        Self::new(true)
    }

    /// A visitor in the mode selected by `settings`.
    #[must_use]
    pub fn from_settings(settings: &DecompilerSettings) -> Self {
        Self::new(settings.insert_parentheses_for_readability)
    }

    /// Processes the whole tree from its root.
    ///
    /// Returns the number of parentheses inserted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the tree's role invariants are broken.
    pub fn run(&self, tree: &mut SyntaxTree<Mutable>) -> Result<usize> {
        match tree.root() {
            Some(root) => self.visit(tree, root),
            None => Ok(0),
        }
    }

    /// Processes the subtree rooted at `node`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the tree's role invariants are broken.
    pub fn visit(&self, tree: &mut SyntaxTree<Mutable>, node: AstId) -> Result<usize> {
        let mut inserted = self.visit_node(tree, node)?;
        for child in tree.children(node).to_vec() {
            inserted += self.visit(tree, child)?;
        }
        Ok(inserted)
    }

    fn visit_node(&self, tree: &mut SyntaxTree<Mutable>, node: AstId) -> Result<usize> {
        let mut pass = Pass {
            tree,
            inserted: 0,
            readability: self.insert_parentheses_for_readability,
        };
        match pass.tree.kind(node).clone() {
            AstKind::MemberReference { .. } | AstKind::Invocation => {
                pass.require_child(node, Role::Target, PrecedenceLevel::Primary)?;
            }
            AstKind::Indexer => pass.visit_indexer(node)?,
            AstKind::Unary { .. } => pass.visit_unary(node)?,
            AstKind::Cast => pass.visit_cast(node)?,
            AstKind::Binary { operator } => pass.visit_binary(node, operator)?,
            AstKind::Is | AstKind::As => {
                let minimum = if pass.readability {
                    PrecedenceLevel::NullableRewrap
                } else {
                    PrecedenceLevel::RelationalAndTypeTesting
                };
                pass.require_child(node, Role::Expression, minimum)?;
            }
            AstKind::Conditional => pass.visit_conditional(node)?,
            AstKind::Assignment { .. } => {
                pass.require_child(node, Role::Left, PrecedenceLevel::Assignment.next())?;
                if let Some(right) = pass.tree.child(node, Role::Right) {
                    pass.assignment_rhs(right)?;
                }
            }
            AstKind::VariableDeclaration { .. } => {
                if let Some(init) = pass.tree.child(node, Role::Initializer) {
                    pass.assignment_rhs(init)?;
                }
            }
            AstKind::Query { .. } | AstKind::Lambda { .. } => pass.lambda_or_query(node)?,
            AstKind::SwitchExpression => {
                pass.require_child(node, Role::Expression, PrecedenceLevel::Switch.next())?;
            }
            _ => {}
        }
        Ok(pass.inserted)
    }
}

impl Default for InsertParenthesesVisitor {
    fn default() -> Self {
        Self::readability()
    }
}

struct Pass<'t> {
    tree: &'t mut SyntaxTree<Mutable>,
    inserted: usize,
    readability: bool,
}

impl Pass<'_> {
    fn parenthesize(&mut self, expr: AstId) -> Result<()> {
        self.tree.wrap_in_parentheses(expr)?;
        self.inserted += 1;
        Ok(())
    }

    fn parenthesize_if_required(&mut self, expr: AstId, minimum: PrecedenceLevel) -> Result<()> {
        if get_precedence(&*self.tree, expr) < minimum {
            self.parenthesize(expr)?;
        }
        Ok(())
    }

    fn require_child(&mut self, node: AstId, role: Role, minimum: PrecedenceLevel) -> Result<()> {
        match self.tree.child(node, role) {
            Some(child) => self.parenthesize_if_required(child, minimum),
            None => Ok(()),
        }
    }

    fn visit_indexer(&mut self, node: AstId) -> Result<()> {
        self.require_child(node, Role::Target, PrecedenceLevel::Primary)?;
        // `new int[1][0]` declares a jagged array
        if let Some(target) = self.tree.child(node, Role::Target) {
            if *self.tree.kind(target) == AstKind::ArrayCreate {
                self.parenthesize(target)?;
            }
        }
        Ok(())
    }

    fn visit_unary(&mut self, node: AstId) -> Result<()> {
        let own = get_precedence(&*self.tree, node);
        self.require_child(node, Role::Expression, own)?;
        if self.readability {
            if let Some(operand) = self.tree.child(node, Role::Expression) {
                if matches!(self.tree.kind(operand), AstKind::Unary { .. }) {
                    self.parenthesize(operand)?;
                }
            }
        }
        Ok(())
    }

    fn visit_cast(&mut self, node: AstId) -> Result<()> {
        let Some(operand) = self.tree.child(node, Role::Expression) else {
            return Ok(());
        };
        // Casts of casts stay bare even for readability
        if *self.tree.kind(operand) != AstKind::Cast {
            let minimum = if self.readability {
                PrecedenceLevel::NullableRewrap
            } else {
                PrecedenceLevel::Unary
            };
            self.parenthesize_if_required(operand, minimum)?;
        }

        let ambiguous = self
            .tree
            .child(node, Role::Type)
            .is_some_and(|ty| type_can_be_misinterpreted_as_expression(&*self.tree, ty));
        if !ambiguous {
            return Ok(());
        }
        let Some(operand) = self.tree.child(node, Role::Expression) else {
            return Ok(());
        };
        let needs_parentheses = match self.tree.kind(operand) {
            AstKind::Unary { operator } => {
                !matches!(operator, UnaryOperator::BitNot | UnaryOperator::Not)
            }
            AstKind::Primitive(literal) => literal.is_negative(),
            _ => false,
        };
        if needs_parentheses {
            self.parenthesize(operand)?;
        }
        Ok(())
    }

    fn visit_binary(&mut self, node: AstId, operator: BinaryOperator) -> Result<()> {
        let precedence = get_precedence(&*self.tree, node);
        let (Some(left), Some(right)) = (
            self.tree.child(node, Role::Left),
            self.tree.child(node, Role::Right),
        ) else {
            return Ok(());
        };
        if operator == BinaryOperator::NullCoalescing {
            if self.readability {
                self.parenthesize_if_required(left, PrecedenceLevel::NullableRewrap)?;
                if binary_operator(&*self.tree, right) == Some(BinaryOperator::NullCoalescing) {
                    self.parenthesize_if_required(right, precedence)?;
                } else {
                    self.parenthesize_if_required(right, PrecedenceLevel::NullableRewrap)?;
                }
            } else {
                // `??` is right-associative
                self.parenthesize_if_required(left, precedence.next())?;
                self.parenthesize_if_required(right, precedence)?;
            }
        } else if self.readability && precedence < PrecedenceLevel::Equality {
            let boost_to = if operator.is_bitwise() {
                PrecedenceLevel::Unary
            } else {
                PrecedenceLevel::Equality
            };
            if binary_operator(&*self.tree, left) == Some(operator) {
                self.parenthesize_if_required(left, precedence)?;
            } else {
                self.parenthesize_if_required(left, boost_to)?;
            }
            self.parenthesize_if_required(right, boost_to)?;
        } else {
            // All other binary operators are left-associative
            self.parenthesize_if_required(left, precedence)?;
            self.parenthesize_if_required(right, precedence.next())?;
        }
        Ok(())
    }

    fn visit_conditional(&mut self, node: AstId) -> Result<()> {
        let condition = self.tree.child(node, Role::Condition);
        let when_true = self.tree.child(node, Role::TrueExpression);
        let when_false = self.tree.child(node, Role::FalseExpression);
        let is_ref_conditional = [when_true, when_false]
            .into_iter()
            .flatten()
            .any(|arm| matches!(self.tree.kind(arm), AstKind::Direction { .. }));

        // a ? b : c ? d : e is a ? b : (c ? d : e); only a condition that is itself a
        // conditional needs parentheses in minimal mode
        let (condition_minimum, arm_minimum) = if self.readability && !is_ref_conditional {
            (PrecedenceLevel::NullableRewrap, PrecedenceLevel::NullableRewrap)
        } else {
            (PrecedenceLevel::Conditional.next(), PrecedenceLevel::Conditional)
        };
        if let Some(condition) = condition {
            self.parenthesize_if_required(condition, condition_minimum)?;
        }
        for arm in [when_true, when_false].into_iter().flatten() {
            self.parenthesize_if_required(arm, arm_minimum)?;
        }
        Ok(())
    }

    fn assignment_rhs(&mut self, expr: AstId) -> Result<()> {
        let is_direction = matches!(self.tree.kind(expr), AstKind::Direction { .. });
        if self.readability && !is_direction {
            self.parenthesize_if_required(expr, PrecedenceLevel::Conditional.next())
        } else {
            self.parenthesize_if_required(expr, PrecedenceLevel::Assignment)
        }
    }

    fn lambda_or_query(&mut self, expr: AstId) -> Result<()> {
        let role = self.tree.role(expr);
        let parent_kind = self.tree.parent(expr).map(|p| self.tree.kind(p).clone());
        let in_operator = matches!(
            parent_kind,
            Some(AstKind::Unary { .. } | AstKind::Binary { .. })
        );
        let in_type_test = matches!(parent_kind, Some(AstKind::Is | AstKind::As));
        let left_of_binary = role == Role::Left && matches!(parent_kind, Some(AstKind::Binary { .. }));
        if left_of_binary || in_type_test || (self.readability && in_operator) {
            self.parenthesize(expr)?;
        }
        Ok(())
    }
}

fn binary_operator<S: TreeState>(tree: &SyntaxTree<S>, expr: AstId) -> Option<BinaryOperator> {
    match tree.kind(expr) {
        AstKind::Binary { operator } => Some(*operator),
        _ => None,
    }
}

/// Simple types read as identifiers and `.`-qualified member types as member accesses.
/// Primitive and composed types never parse as expressions.
fn type_can_be_misinterpreted_as_expression<S: TreeState>(tree: &SyntaxTree<S>, ty: AstId) -> bool {
    match tree.kind(ty) {
        AstKind::MemberType {
            is_double_colon, ..
        } => !is_double_colon,
        AstKind::SimpleType { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{node::Literal, printer::print_expression};

    fn finish(tree: &mut SyntaxTree, root: AstId, visitor: InsertParenthesesVisitor) -> Result<String> {
        tree.set_root(root)?;
        visitor.run(tree)?;
        let root = tree.root().ok_or(crate::Error::ForeignNode)?;
        Ok(print_expression(tree, root))
    }

    #[test]
    fn test_multiplication_of_sum() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let c = tree.identifier("c");
        let sum = tree.binary(a, BinaryOperator::Add, b)?;
        let product = tree.binary(sum, BinaryOperator::Multiply, c)?;
        assert_eq!(finish(&mut tree, product, InsertParenthesesVisitor::minimal())?, "(a + b) * c");
        Ok(())
    }

    #[test]
    fn test_left_associative_subtraction() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let c = tree.identifier("c");
        let inner = tree.binary(b, BinaryOperator::Subtract, c)?;
        let outer = tree.binary(a, BinaryOperator::Subtract, inner)?;
        assert_eq!(finish(&mut tree, outer, InsertParenthesesVisitor::minimal())?, "a - (b - c)");
        Ok(())
    }

    #[test]
    fn test_null_coalescing_is_right_associative() -> Result<()> {
        for visitor in [InsertParenthesesVisitor::minimal(), InsertParenthesesVisitor::readability()] {
            let mut tree = SyntaxTree::new();
            let a = tree.identifier("a");
            let b = tree.identifier("b");
            let c = tree.identifier("c");
            let inner = tree.binary(b, BinaryOperator::NullCoalescing, c)?;
            let chain = tree.binary(a, BinaryOperator::NullCoalescing, inner)?;
            assert_eq!(finish(&mut tree, chain, visitor)?, "a ?? b ?? c");

            let mut tree = SyntaxTree::new();
            let a = tree.identifier("a");
            let b = tree.identifier("b");
            let c = tree.identifier("c");
            let inner = tree.binary(a, BinaryOperator::NullCoalescing, b)?;
            let chain = tree.binary(inner, BinaryOperator::NullCoalescing, c)?;
            assert_eq!(finish(&mut tree, chain, visitor)?, "(a ?? b) ?? c");
        }
        Ok(())
    }

    #[test]
    fn test_readability_mixed_bitwise_and_equality() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let zero = tree.literal(Literal::Int(0));
        let mask = tree.binary(a, BinaryOperator::BitwiseAnd, b)?;
        let test = tree.binary(mask, BinaryOperator::InEquality, zero)?;
        assert_eq!(finish(&mut tree, test, InsertParenthesesVisitor::minimal())?, "(a & b) != 0");

        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let c = tree.identifier("c");
        let d = tree.identifier("d");
        let left = tree.binary(a, BinaryOperator::Equality, b)?;
        let right = tree.binary(c, BinaryOperator::Equality, d)?;
        let both = tree.binary(left, BinaryOperator::ConditionalAnd, right)?;
        assert_eq!(
            finish(&mut tree, both, InsertParenthesesVisitor::minimal())?,
            "a == b && c == d"
        );

        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let c = tree.identifier("c");
        let d = tree.identifier("d");
        let left = tree.binary(a, BinaryOperator::BitwiseOr, b)?;
        let right = tree.binary(c, BinaryOperator::BitwiseAnd, d)?;
        let both = tree.binary(left, BinaryOperator::BitwiseOr, right)?;
        assert_eq!(
            finish(&mut tree, both, InsertParenthesesVisitor::readability())?,
            "a | b | (c & d)"
        );
        Ok(())
    }

    #[test]
    fn test_conditional_condition() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let [a, b, c, d, e] = ["a", "b", "c", "d", "e"].map(|n| tree.identifier(n));
        let inner = tree.conditional(a, b, c)?;
        let outer = tree.conditional(inner, d, e)?;
        assert_eq!(
            finish(&mut tree, outer, InsertParenthesesVisitor::minimal())?,
            "(a ? b : c) ? d : e"
        );

        let mut tree = SyntaxTree::new();
        let [a, b, c, d, e] = ["a", "b", "c", "d", "e"].map(|n| tree.identifier(n));
        let inner = tree.conditional(c, d, e)?;
        let outer = tree.conditional(a, b, inner)?;
        assert_eq!(
            finish(&mut tree, outer, InsertParenthesesVisitor::minimal())?,
            "a ? b : c ? d : e"
        );
        Ok(())
    }

    #[test]
    fn test_readability_wraps_nested_unary() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let x = tree.identifier("x");
        let inner = tree.unary(UnaryOperator::Minus, x)?;
        let outer = tree.unary(UnaryOperator::Minus, inner)?;
        assert_eq!(finish(&mut tree, outer, InsertParenthesesVisitor::readability())?, "-(-x)");

        let mut tree = SyntaxTree::new();
        let x = tree.identifier("x");
        let inner = tree.unary(UnaryOperator::Minus, x)?;
        let outer = tree.unary(UnaryOperator::Minus, inner)?;
        assert_eq!(finish(&mut tree, outer, InsertParenthesesVisitor::minimal())?, "- -x");
        Ok(())
    }

    #[test]
    fn test_second_run_inserts_nothing() -> Result<()> {
        for visitor in [InsertParenthesesVisitor::minimal(), InsertParenthesesVisitor::readability()] {
            let mut tree = SyntaxTree::new();
            let a = tree.identifier("a");
            let b = tree.identifier("b");
            let c = tree.identifier("c");
            let sum = tree.binary(a, BinaryOperator::Add, b)?;
            let body = tree.identifier("y");
            let lambda = tree.lambda(&["y"], body)?;
            let test = tree.binary(lambda, BinaryOperator::Equality, c)?;
            let product = tree.binary(sum, BinaryOperator::Multiply, test)?;
            tree.set_root(product)?;
            assert!(visitor.run(&mut tree)? > 0);
            let once = print_expression(&tree, tree.root().ok_or(crate::Error::ForeignNode)?);
            assert_eq!(visitor.run(&mut tree)?, 0);
            let twice = print_expression(&tree, tree.root().ok_or(crate::Error::ForeignNode)?);
            assert_eq!(once, twice);
        }
        Ok(())
    }
}
