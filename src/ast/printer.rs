//! Text rendering of syntax trees.
//!
//! The printer adds no parentheses of its own: whatever [`AstKind::Parenthesized`] nodes
//! the tree contains are printed, nothing else. Run
//! [`crate::ast::InsertParenthesesVisitor`] first.
//!
//! Statements use four-space indentation and braces on the line of their header.

use crate::ast::{
    node::{AstKind, Role},
    tree::{AstId, SyntaxTree, TreeState},
};

const INDENT: &str = "    ";

/// Renders an expression or type.
#[must_use]
pub fn print_expression<S: TreeState>(tree: &SyntaxTree<S>, expr: AstId) -> String {
    Printer { tree, out: String::new(), depth: 0 }.expression(expr)
}

/// Renders any node: declarations and statements on their own lines, expressions inline.
#[must_use]
pub fn print_node<S: TreeState>(tree: &SyntaxTree<S>, node: AstId) -> String {
    let kind = tree.kind(node);
    if kind.is_expression() || kind.is_type() {
        return print_expression(tree, node);
    }
    let mut printer = Printer { tree, out: String::new(), depth: 0 };
    printer.statement(node);
    printer.out
}

impl<S: TreeState> SyntaxTree<S> {
    /// Renders the tree from its root; empty if no root is set.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.root().map(|root| print_node(self, root)).unwrap_or_default()
    }
}

struct Printer<'t, S: TreeState> {
    tree: &'t SyntaxTree<S>,
    out: String,
    depth: usize,
}

impl<S: TreeState> Printer<'_, S> {
    fn child_text(&self, node: AstId, role: Role) -> String {
        self.tree
            .child(node, role)
            .map(|child| self.expression(child))
            .unwrap_or_default()
    }

    fn arguments(&self, node: AstId) -> String {
        self.tree
            .children_with_role(node, Role::Argument)
            .into_iter()
            .map(|arg| self.expression(arg))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn expression(&self, node: AstId) -> String {
        let tree = self.tree;
        match tree.kind(node) {
            AstKind::PrimitiveType { keyword } => keyword.clone(),
            AstKind::SimpleType { name } | AstKind::Identifier { name } => name.clone(),
            AstKind::MemberType {
                name,
                is_double_colon,
            } => {
                let separator = if *is_double_colon { "::" } else { "." };
                format!("{}{separator}{name}", self.child_text(node, Role::BaseType))
            }
            AstKind::ComposedType {
                pointer_rank,
                array_rank,
                is_nullable,
                is_ref,
            } => {
                let mut text = String::new();
                if *is_ref {
                    text.push_str("ref ");
                }
                text.push_str(&self.child_text(node, Role::BaseType));
                if *is_nullable {
                    text.push('?');
                }
                for _ in 0..*pointer_rank {
                    text.push('*');
                }
                for _ in 0..*array_rank {
                    text.push_str("[]");
                }
                text
            }
            AstKind::Primitive(literal) => literal.to_string(),
            AstKind::This => "this".to_string(),
            AstKind::Parenthesized => format!("({})", self.child_text(node, Role::Expression)),
            AstKind::Checked => format!("checked({})", self.child_text(node, Role::Expression)),
            AstKind::Unary { operator } => {
                let operand = self.child_text(node, Role::Expression);
                let symbol = operator.symbol();
                if operator.is_postfix() {
                    return format!("{operand}{symbol}");
                }
                // `- -x` and `+ +x` must not fuse into `--x` / `++x`
                let fuses = match (symbol.chars().last(), operand.chars().next()) {
                    (Some(last), Some(first)) => last == first && matches!(first, '-' | '+' | '&'),
                    _ => false,
                };
                if fuses {
                    format!("{symbol} {operand}")
                } else {
                    format!("{symbol}{operand}")
                }
            }
            AstKind::Binary { operator } => {
                let left = self.child_text(node, Role::Left);
                let right = self.child_text(node, Role::Right);
                if *operator == crate::ast::node::BinaryOperator::Range {
                    format!("{left}..{right}")
                } else {
                    format!("{left} {} {right}", operator.symbol())
                }
            }
            AstKind::Assignment { operator } => format!(
                "{} {} {}",
                self.child_text(node, Role::Left),
                operator.symbol(),
                self.child_text(node, Role::Right)
            ),
            AstKind::Conditional => format!(
                "{} ? {} : {}",
                self.child_text(node, Role::Condition),
                self.child_text(node, Role::TrueExpression),
                self.child_text(node, Role::FalseExpression)
            ),
            AstKind::Cast => format!(
                "({}){}",
                self.child_text(node, Role::Type),
                self.child_text(node, Role::Expression)
            ),
            AstKind::Is => format!(
                "{} is {}",
                self.child_text(node, Role::Expression),
                self.child_text(node, Role::Type)
            ),
            AstKind::As => format!(
                "{} as {}",
                self.child_text(node, Role::Expression),
                self.child_text(node, Role::Type)
            ),
            AstKind::Invocation => format!(
                "{}({})",
                self.child_text(node, Role::Target),
                self.arguments(node)
            ),
            AstKind::MemberReference { name } => {
                format!("{}.{name}", self.child_text(node, Role::Target))
            }
            AstKind::TypeReference => self.child_text(node, Role::Type),
            AstKind::Indexer => format!(
                "{}[{}]",
                self.child_text(node, Role::Target),
                self.arguments(node)
            ),
            AstKind::ObjectCreate => format!(
                "new {}({})",
                self.child_text(node, Role::Type),
                self.arguments(node)
            ),
            AstKind::ArrayCreate => format!(
                "new {}[{}]",
                self.child_text(node, Role::Type),
                self.arguments(node)
            ),
            AstKind::Default => format!("default({})", self.child_text(node, Role::Type)),
            AstKind::SizeOf => format!("sizeof({})", self.child_text(node, Role::Type)),
            AstKind::Direction { direction } => {
                format!("{direction} {}", self.child_text(node, Role::Expression))
            }
            AstKind::Lambda { parameters } => {
                let params = match parameters.as_slice() {
                    [single] => single.clone(),
                    many => format!("({})", many.join(", ")),
                };
                let body = match tree.child(node, Role::Body) {
                    Some(body) if *tree.kind(body) == AstKind::Block => {
                        let statements: Vec<String> = tree
                            .children(body)
                            .iter()
                            .map(|&s| print_node(tree, s).trim().to_string())
                            .collect();
                        format!("{{ {} }}", statements.join(" "))
                    }
                    Some(body) => self.expression(body),
                    None => String::new(),
                };
                format!("{params} => {body}")
            }
            AstKind::Query { variable } => format!(
                "from {variable} in {} select {}",
                self.child_text(node, Role::Target),
                self.child_text(node, Role::Expression)
            ),
            AstKind::SwitchExpression => {
                let arms: Vec<String> = tree
                    .children_with_role(node, Role::Arm)
                    .into_iter()
                    .map(|arm| self.expression(arm))
                    .collect();
                format!(
                    "{} switch {{ {} }}",
                    self.child_text(node, Role::Expression),
                    arms.join(", ")
                )
            }
            AstKind::SwitchExpressionArm => format!(
                "{} => {}",
                self.child_text(node, Role::Pattern),
                self.child_text(node, Role::Body)
            ),
            other => format!("/* {} */", other.name()),
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Prints `header {`, the statements of `body` and the closing brace.
    fn braced(&mut self, header: &str, body: Option<AstId>) {
        self.line(&format!("{header} {{"));
        self.depth += 1;
        if let Some(body) = body {
            self.embedded(body);
        }
        self.depth -= 1;
        self.line("}");
    }

    /// The statements of `body` one level deeper.
    fn indented(&mut self, body: Option<AstId>) {
        self.depth += 1;
        if let Some(body) = body {
            self.embedded(body);
        }
        self.depth -= 1;
    }

    /// Statements of a block, or a single statement.
    fn embedded(&mut self, body: AstId) {
        if *self.tree.kind(body) == AstKind::Block {
            for &statement in self.tree.children(body) {
                self.statement(statement);
            }
        } else {
            self.statement(body);
        }
    }

    fn statement(&mut self, node: AstId) {
        let tree = self.tree;
        match tree.kind(node) {
            AstKind::Block => {
                self.line("{");
                self.depth += 1;
                self.embedded(node);
                self.depth -= 1;
                self.line("}");
            }
            AstKind::ExpressionStatement => {
                let text = self.child_text(node, Role::Expression);
                self.line(&format!("{text};"));
            }
            AstKind::VariableDeclaration { .. } => {
                let text = self.declaration(node);
                self.line(&format!("{text};"));
            }
            AstKind::IfElse => self.if_else(node, ""),
            AstKind::While => {
                let header = format!("while ({})", self.child_text(node, Role::Condition));
                self.braced(&header, tree.child(node, Role::EmbeddedStatement));
            }
            AstKind::Switch => {
                let header = format!("switch ({})", self.child_text(node, Role::Expression));
                self.line(&format!("{header} {{"));
                self.depth += 1;
                for section in tree.children_with_role(node, Role::SwitchSection) {
                    self.switch_section(section);
                }
                self.depth -= 1;
                self.line("}");
            }
            AstKind::SwitchSection => self.switch_section(node),
            AstKind::CaseLabel => {
                let label = self.case_label(node);
                self.line(&label);
            }
            AstKind::Break => self.line("break;"),
            AstKind::Continue => self.line("continue;"),
            AstKind::Goto { label } => self.line(&format!("goto {label};")),
            AstKind::Label { label } => {
                // A label must precede a statement
                if tree.next_sibling(node).is_some() {
                    self.line(&format!("{label}:"));
                } else {
                    self.line(&format!("{label}: ;"));
                }
            }
            AstKind::Return => match tree.child(node, Role::Expression) {
                Some(value) => {
                    let value = self.expression(value);
                    self.line(&format!("return {value};"));
                }
                None => self.line("return;"),
            },
            AstKind::Throw => match tree.child(node, Role::Expression) {
                Some(value) => {
                    let value = self.expression(value);
                    self.line(&format!("throw {value};"));
                }
                None => self.line("throw;"),
            },
            AstKind::CheckedStatement => self.braced("checked", tree.child(node, Role::Body)),
            AstKind::Try => {
                self.line("try {");
                self.indented(tree.child(node, Role::TryBlock));
                for clause in tree.children_with_role(node, Role::CatchClause) {
                    let header = self.catch_header(clause);
                    self.line(&format!("}} {header} {{"));
                    self.indented(tree.child(clause, Role::Body));
                }
                if let Some(finally) = tree.child(node, Role::FinallyBlock) {
                    self.line("} finally {");
                    self.indented(Some(finally));
                }
                self.line("}");
            }
            AstKind::CatchClause { .. } => {
                let header = self.catch_header(node);
                self.braced(&header, tree.child(node, Role::Body));
            }
            AstKind::Lock => {
                let header = format!("lock ({})", self.child_text(node, Role::Expression));
                self.braced(&header, tree.child(node, Role::EmbeddedStatement));
            }
            AstKind::Using { is_async } => {
                let resource = match tree.child(node, Role::ResourceAcquisition) {
                    Some(declaration) if matches!(tree.kind(declaration), AstKind::VariableDeclaration { .. }) => {
                        self.declaration(declaration)
                    }
                    Some(expr) => self.expression(expr),
                    None => String::new(),
                };
                let keyword = if *is_async { "await using" } else { "using" };
                self.braced(
                    &format!("{keyword} ({resource})"),
                    tree.child(node, Role::EmbeddedStatement),
                );
            }
            AstKind::Method { name, is_static } => {
                let return_type = self.child_text(node, Role::ReturnType);
                let parameters: Vec<String> = tree
                    .children_with_role(node, Role::Parameter)
                    .into_iter()
                    .map(|p| self.parameter(p))
                    .collect();
                let modifier = if *is_static { "static " } else { "" };
                let header = format!("{modifier}{return_type} {name}({})", parameters.join(", "));
                self.braced(&header, tree.child(node, Role::Body));
            }
            AstKind::Parameter { .. } => {
                let text = self.parameter(node);
                self.line(&text);
            }
            _ => {
                let text = self.expression(node);
                self.line(&text);
            }
        }
    }

    /// `T name` or `T name = init`, without the semicolon.
    fn declaration(&self, node: AstId) -> String {
        let AstKind::VariableDeclaration { name } = self.tree.kind(node) else {
            return self.expression(node);
        };
        let ty = self.child_text(node, Role::Type);
        match self.tree.child(node, Role::Initializer) {
            Some(init) => format!("{ty} {name} = {}", self.expression(init)),
            None => format!("{ty} {name}"),
        }
    }

    /// `catch`, `catch (T)`, `catch (T name)`, each optionally followed by `when (c)`.
    fn catch_header(&self, clause: AstId) -> String {
        let mut header = "catch".to_string();
        if let Some(ty) = self.tree.child(clause, Role::Type) {
            let ty = self.expression(ty);
            match self.tree.kind(clause) {
                AstKind::CatchClause {
                    variable: Some(name),
                } => header.push_str(&format!(" ({ty} {name})")),
                _ => header.push_str(&format!(" ({ty})")),
            }
        }
        if let Some(filter) = self.tree.child(clause, Role::Condition) {
            header.push_str(&format!(" when ({})", self.expression(filter)));
        }
        header
    }

    fn parameter(&self, node: AstId) -> String {
        match self.tree.kind(node) {
            AstKind::Parameter { name } => format!("{} {name}", self.child_text(node, Role::Type)),
            _ => self.expression(node),
        }
    }

    fn case_label(&self, node: AstId) -> String {
        match self.tree.child(node, Role::Expression) {
            Some(value) => format!("case {}:", self.expression(value)),
            None => "default:".to_string(),
        }
    }

    fn switch_section(&mut self, section: AstId) {
        for label in self.tree.children_with_role(section, Role::CaseLabel) {
            let text = self.case_label(label);
            self.line(&text);
        }
        self.depth += 1;
        for statement in self.tree.children_with_role(section, Role::Statement) {
            self.statement(statement);
        }
        self.depth -= 1;
    }

    /// `if (c) { ... } else if (d) { ... } else { ... }`; `prefix` closes the previous arm.
    fn if_else(&mut self, node: AstId, prefix: &str) {
        let tree = self.tree;
        let header = format!("{prefix}if ({}) {{", self.child_text(node, Role::Condition));
        self.line(&header);
        self.depth += 1;
        if let Some(then) = tree.child(node, Role::TrueStatement) {
            self.embedded(then);
        }
        self.depth -= 1;
        match tree.child(node, Role::FalseStatement) {
            Some(otherwise) if *tree.kind(otherwise) == AstKind::IfElse => {
                self.if_else(otherwise, "} else ");
            }
            Some(otherwise) => {
                self.line("} else {");
                self.depth += 1;
                self.embedded(otherwise);
                self.depth -= 1;
                self.line("}");
            }
            None => self.line("}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::node::{BinaryOperator, Literal, UnaryOperator},
        Result,
    };

    #[test]
    fn test_expression_forms() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let target = tree.identifier("list");
        let call = tree.member(target, "Add")?;
        let one = tree.literal(Literal::Int(1));
        let name = tree.literal(Literal::String("a".into()));
        let invocation = tree.invocation(call, &[one, name])?;
        assert_eq!(print_expression(&tree, invocation), "list.Add(1, \"a\")");

        let ty = tree.simple_type("T");
        let x = tree.identifier("x");
        let neg = tree.unary(UnaryOperator::Minus, x)?;
        let cast = tree.cast(ty, neg)?;
        assert_eq!(print_expression(&tree, cast), "(T)-x");

        let base = tree.primitive_type("int");
        let ptr = tree.composed_type(base, 1, 0, false, false)?;
        assert_eq!(print_expression(&tree, ptr), "int*");

        let i = tree.identifier("i");
        let post = tree.unary(UnaryOperator::PostIncrement, i)?;
        assert_eq!(print_expression(&tree, post), "i++");
        Ok(())
    }

    #[test]
    fn test_statement_layout() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let x = tree.identifier("x");
        let zero = tree.literal(Literal::Int(0));
        let cond = tree.binary(x, BinaryOperator::Equality, zero)?;
        let ret = tree.return_statement(None)?;
        let then = tree.block_statement(&[ret])?;
        let other_x = tree.identifier("x");
        let one = tree.literal(Literal::Int(1));
        let second_cond = tree.binary(other_x, BinaryOperator::Equality, one)?;
        let brk = tree.create(AstKind::Break);
        let second_then = tree.block_statement(&[brk])?;
        let nested = tree.if_else(second_cond, second_then, None)?;
        let statement = tree.if_else(cond, then, Some(nested))?;
        tree.set_root(statement)?;

        assert_eq!(
            tree.to_text(),
            "if (x == 0) {\n    return;\n} else if (x == 1) {\n    break;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_try_catch_finally_layout() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let work = tree.identifier("Work");
        let call = tree.invocation(work, &[])?;
        let statement = tree.expression_statement(call)?;
        let body = tree.block_statement(&[statement])?;

        let ty = tree.named_type("System.IO.IOException")?;
        let rethrow = tree.create(AstKind::Throw);
        let handler = tree.block_statement(&[rethrow])?;
        let typed = tree.make(
            AstKind::CatchClause {
                variable: Some("e".into()),
            },
            &[(Role::Type, ty), (Role::Body, handler)],
        )?;
        let flag = tree.identifier("retry");
        let empty = tree.block_statement(&[])?;
        let filtered = tree.make(
            AstKind::CatchClause { variable: None },
            &[(Role::Condition, flag), (Role::Body, empty)],
        )?;
        let finally = tree.block_statement(&[])?;
        let node = tree.try_statement(body, &[typed, filtered], Some(finally))?;
        tree.set_root(node)?;

        assert_eq!(
            tree.to_text(),
            "try {\n    Work();\n} catch (System.IO.IOException e) {\n    throw;\n} catch when (retry) {\n} finally {\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_checked_and_using_forms() -> Result<()> {
        let mut tree = SyntaxTree::new();
        let a = tree.identifier("a");
        let b = tree.identifier("b");
        let sum = tree.binary(a, BinaryOperator::Add, b)?;
        let checked = tree.checked(sum)?;
        assert_eq!(print_expression(&tree, checked), "checked(a + b)");

        let ty = tree.simple_type("Stream");
        let open = tree.identifier("Open");
        let init = tree.invocation(open, &[])?;
        let resource = tree.variable_declaration("s", ty, Some(init))?;
        let body = tree.block_statement(&[])?;
        let using = tree.make(
            AstKind::Using { is_async: false },
            &[(Role::ResourceAcquisition, resource), (Role::EmbeddedStatement, body)],
        )?;
        assert_eq!(print_node(&tree, using), "using (Stream s = Open()) {\n}\n");
        Ok(())
    }
}
