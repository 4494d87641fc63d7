//! Output syntax tree: node model, construction from IL, parenthesization and printing.
//!
//! A [`SyntaxTree`] is an arena of [`AstKind`] nodes linked by [`Role`]-labelled edges.
//! Trees start out [`Mutable`]; once every rewrite has run they are frozen into
//! [`Frozen`] trees, which only expose reads. Mutating a frozen tree does not compile.
//!
//! # Architecture
//!
//! - [`build_method`] - turns a transformed [`crate::il::ILFunction`] into a method declaration
//! - [`InsertParenthesesVisitor`] - adds the parentheses the operator precedence of
//!   [`get_precedence`] requires, plus optional readability parentheses
//! - [`printer`] - renders expressions and statements as C# text
//!
//! # Usage
//!
//! ```rust
//! use cildecomp::ast::{print_expression, BinaryOperator, InsertParenthesesVisitor, SyntaxTree};
//!
//! # fn main() -> cildecomp::Result<()> {
//! let mut tree = SyntaxTree::new();
//! let a = tree.identifier("a");
//! let b = tree.identifier("b");
//! let c = tree.identifier("c");
//! let sum = tree.binary(a, BinaryOperator::Add, b)?;
//! let product = tree.binary(sum, BinaryOperator::Multiply, c)?;
//! tree.set_root(product)?;
//!
//! InsertParenthesesVisitor::minimal().run(&mut tree)?;
//! assert_eq!(print_expression(&tree, product), "(a + b) * c");
//! # Ok(())
//! # }
//! ```

mod builder;
mod construct;
mod node;
mod parentheses;
mod precedence;
pub mod printer;
mod tree;

pub use builder::build_method;
pub use node::{
    AssignmentOperator, AstKind, BinaryOperator, FieldDirection, Literal, Role, UnaryOperator,
};
pub use parentheses::InsertParenthesesVisitor;
pub use precedence::{binary_precedence, get_precedence, PrecedenceLevel};
pub use printer::{print_expression, print_node};
pub use tree::{AstId, Frozen, Mutable, SyntaxTree, TreeState};
