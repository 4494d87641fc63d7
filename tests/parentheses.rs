//! Parenthesization of casts, negative operands and operator chains.

use cildecomp::{
    ast::{BinaryOperator, Literal, UnaryOperator},
    prelude::*,
};

/// Runs `visitor` over a tree whose root is `root` and prints the root.
fn render(
    mut tree: SyntaxTree<Mutable>,
    root: AstId,
    visitor: InsertParenthesesVisitor,
) -> Result<String> {
    tree.set_root(root)?;
    visitor.run(&mut tree)?;
    let frozen = tree.freeze();
    let root = frozen.root().ok_or(Error::ForeignNode)?;
    Ok(print_expression(&frozen, root))
}

/// `(ty)operand` where `operand` is built by `make_operand`.
fn cast_of(
    make_type: impl FnOnce(&mut SyntaxTree<Mutable>) -> Result<AstId>,
    make_operand: impl FnOnce(&mut SyntaxTree<Mutable>) -> Result<AstId>,
) -> Result<String> {
    let mut tree = SyntaxTree::new();
    let ty = make_type(&mut tree)?;
    let operand = make_operand(&mut tree)?;
    let cast = tree.cast(ty, operand)?;
    render(tree, cast, InsertParenthesesVisitor::minimal())
}

fn negated_x(tree: &mut SyntaxTree<Mutable>) -> Result<AstId> {
    let x = tree.identifier("x");
    tree.unary(UnaryOperator::Minus, x)
}

fn minus_five(tree: &mut SyntaxTree<Mutable>) -> Result<AstId> {
    Ok(tree.literal(Literal::Int(-5)))
}

fn simple_t(tree: &mut SyntaxTree<Mutable>) -> Result<AstId> {
    Ok(tree.simple_type("T"))
}

fn int_keyword(tree: &mut SyntaxTree<Mutable>) -> Result<AstId> {
    Ok(tree.primitive_type("int"))
}

fn int_pointer(tree: &mut SyntaxTree<Mutable>) -> Result<AstId> {
    let int = tree.primitive_type("int");
    tree.composed_type(int, 1, 0, false, false)
}

#[test]
fn test_cast_of_negation_to_simple_type() -> Result<()> {
    assert_eq!(cast_of(simple_t, negated_x)?, "(T)(-x)");
    assert_eq!(cast_of(simple_t, minus_five)?, "(T)(-5)");
    Ok(())
}

#[test]
fn test_cast_of_negation_to_keyword_or_composed_type() -> Result<()> {
    assert_eq!(cast_of(int_keyword, negated_x)?, "(int)-x");
    assert_eq!(cast_of(int_keyword, minus_five)?, "(int)-5");
    assert_eq!(cast_of(int_pointer, negated_x)?, "(int*)-x");
    Ok(())
}

#[test]
fn test_cast_of_complement_to_simple_type_stays_bare() -> Result<()> {
    let complement = |tree: &mut SyntaxTree<Mutable>| {
        let x = tree.identifier("x");
        tree.unary(UnaryOperator::BitNot, x)
    };
    assert_eq!(cast_of(simple_t, complement)?, "(T)~x");
    Ok(())
}

#[test]
fn test_dotted_type_is_ambiguous_too() -> Result<()> {
    let dotted = |tree: &mut SyntaxTree<Mutable>| tree.named_type("System.Int32");
    assert_eq!(cast_of(dotted, negated_x)?, "(System.Int32)(-x)");
    Ok(())
}

#[test]
fn test_cast_binds_tighter_than_addition() -> Result<()> {
    let mut tree = SyntaxTree::new();
    let ty = tree.primitive_type("long");
    let a = tree.identifier("a");
    let b = tree.identifier("b");
    let sum = tree.binary(a, BinaryOperator::Add, b)?;
    let cast = tree.cast(ty, sum)?;
    assert_eq!(
        render(tree, cast, InsertParenthesesVisitor::minimal())?,
        "(long)(a + b)"
    );
    Ok(())
}

#[test]
fn test_readability_mode_groups_mixed_operators() -> Result<()> {
    // a + b * c == d && !e
    let build = || -> Result<(SyntaxTree<Mutable>, AstId)> {
        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let c = tree.identifier("c");
        let d = tree.identifier("d");
        let e = tree.identifier("e");
        let product = tree.binary(b, BinaryOperator::Multiply, c)?;
        let sum = tree.binary(a, BinaryOperator::Add, product)?;
        let eq = tree.binary(sum, BinaryOperator::Equality, d)?;
        let not = tree.unary(UnaryOperator::Not, e)?;
        let and = tree.binary(eq, BinaryOperator::ConditionalAnd, not)?;
        Ok((tree, and))
    };
    let (tree, root) = build()?;
    assert_eq!(
        render(tree, root, InsertParenthesesVisitor::minimal())?,
        "a + b * c == d && !e"
    );
    let (tree, root) = build()?;
    assert_eq!(
        render(tree, root, InsertParenthesesVisitor::readability())?,
        "a + b * c == d && !e"
    );
    Ok(())
}

#[test]
fn test_second_run_inserts_nothing() -> Result<()> {
    let mut tree = SyntaxTree::new();
    let a = tree.identifier("a");
    let b = tree.identifier("b");
    let c = tree.identifier("c");
    let inner = tree.binary(b, BinaryOperator::Subtract, c)?;
    let outer = tree.binary(a, BinaryOperator::Subtract, inner)?;
    tree.set_root(outer)?;
    let visitor = InsertParenthesesVisitor::readability();
    assert_eq!(visitor.run(&mut tree)?, 1);
    assert_eq!(visitor.run(&mut tree)?, 0);
    assert_eq!(print_expression(&tree, outer), "a - (b - c)");
    Ok(())
}
