//! Renders an AST back to source text.
//!
//! Parentheses are inserted from operator precedence, so the output
//! re-parses to the same tree. Single-statement bodies of `if` and loops are
//! always printed as blocks.

use crate::ast::*;
use crate::interpreter::format::number_to_string;
use crate::lexer::is_identifier_name;

const PREC_ASSIGN: u8 = 2;
const PREC_CONDITIONAL: u8 = 3;
const PREC_UNARY: u8 = 15;
const PREC_UPDATE: u8 = 16;
const PREC_CALL: u8 = 18;
const PREC_PRIMARY: u8 = 20;

/// Prints a whole program, one statement per line.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::default();
    for stmt in &program.body {
        printer.stmt(stmt);
    }
    printer.out
}

/// Prints a single expression.
pub fn print_expr(expr: &Expr) -> String {
    let mut printer = Printer::default();
    printer.expr(expr, 0);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Assign { .. } => PREC_ASSIGN,
        Expr::Function(def) if def.is_arrow => PREC_ASSIGN,
        Expr::Conditional { .. } => PREC_CONDITIONAL,
        Expr::Logical { op, .. } => op.precedence(),
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { .. } | Expr::Await(_) => PREC_UNARY,
        Expr::Update { .. } => PREC_UPDATE,
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } | Expr::Index { .. } => PREC_CALL,
        _ => PREC_PRIMARY,
    }
}

/// The expression whose first token begins the printed text.
fn leftmost(expr: &Expr) -> &Expr {
    match expr {
        Expr::Binary { left, .. } | Expr::Logical { left, .. } => leftmost(left),
        Expr::Assign { target, .. } => leftmost(target),
        Expr::Conditional { test, .. } => leftmost(test),
        Expr::Call { callee, .. } => leftmost(callee),
        Expr::Member { object, .. } | Expr::Index { object, .. } => leftmost(object),
        Expr::Update {
            prefix: false,
            target,
            ..
        } => leftmost(target),
        other => other,
    }
}

/// Text starting with `{` or `function` would be read as a statement.
fn needs_statement_parens(expr: &Expr) -> bool {
    match leftmost(expr) {
        Expr::Object(_) => true,
        Expr::Function(def) => !def.is_arrow,
        _ => false,
    }
}

/// `new a.b()` is fine, `new (f())()` needs the parentheses.
fn is_plain_new_callee(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) | Expr::This => true,
        Expr::Member {
            object,
            optional: false,
            ..
        }
        | Expr::Index {
            object,
            optional: false,
            ..
        } => is_plain_new_callee(object),
        _ => false,
    }
}

fn mixes_nullish(parent: LogicalOp, child: &Expr) -> bool {
    match child {
        Expr::Logical { op, .. } => {
            (parent == LogicalOp::Nullish) != (*op == LogicalOp::Nullish)
        }
        _ => false,
    }
}

pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_template(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

impl Printer {
    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn stmt(&mut self, stmt: &Stmt) {
        self.line_start();
        self.stmt_inline(stmt);
        self.out.push('\n');
    }

    /// Prints a statement starting at the current position, without the
    /// trailing newline.
    fn stmt_inline(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { kind, decls } => {
                self.var_decl(*kind, decls);
                self.push(";");
            }
            StmtKind::Function(def) => self.function(def),
            StmtKind::Expr(expr) => {
                if needs_statement_parens(expr) {
                    self.push("(");
                    self.expr(expr, 0);
                    self.push(")");
                } else {
                    self.expr(expr, 0);
                }
                self.push(";");
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.push("if (");
                self.expr(test, 0);
                self.push(") ");
                self.body(consequent);
                if let Some(alternate) = alternate {
                    self.push(" else ");
                    if matches!(alternate.kind, StmtKind::If { .. }) {
                        self.stmt_inline(alternate);
                    } else {
                        self.body(alternate);
                    }
                }
            }
            StmtKind::While { test, body } => {
                self.push("while (");
                self.expr(test, 0);
                self.push(") ");
                self.body(body);
            }
            StmtKind::DoWhile { body, test } => {
                self.push("do ");
                self.body(body);
                self.push(" while (");
                self.expr(test, 0);
                self.push(");");
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.push("for (");
                match init {
                    Some(ForInit::VarDecl { kind, decls }) => self.var_decl(*kind, decls),
                    Some(ForInit::Expr(expr)) => self.expr(expr, 0),
                    None => {}
                }
                self.push(";");
                if let Some(test) = test {
                    self.push(" ");
                    self.expr(test, 0);
                }
                self.push(";");
                if let Some(update) = update {
                    self.push(" ");
                    self.expr(update, 0);
                }
                self.push(") ");
                self.body(body);
            }
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => {
                self.push("for (");
                self.for_binding(binding);
                self.push(" of ");
                self.expr(iterable, PREC_ASSIGN);
                self.push(") ");
                self.body(body);
            }
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => {
                self.push("for (");
                self.for_binding(binding);
                self.push(" in ");
                self.expr(object, 0);
                self.push(") ");
                self.body(body);
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                self.push("switch (");
                self.expr(discriminant, 0);
                self.push(") {\n");
                self.indent += 1;
                for case in cases {
                    self.line_start();
                    match &case.test {
                        Some(test) => {
                            self.push("case ");
                            self.expr(test, 0);
                            self.push(":\n");
                        }
                        None => self.push("default:\n"),
                    }
                    self.indent += 1;
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.line_start();
                self.push("}");
            }
            StmtKind::Return(arg) => {
                self.push("return");
                if let Some(arg) = arg {
                    self.push(" ");
                    self.expr(arg, 0);
                }
                self.push(";");
            }
            StmtKind::Break => self.push("break;"),
            StmtKind::Continue => self.push("continue;"),
            StmtKind::Throw(arg) => {
                self.push("throw ");
                self.expr(arg, 0);
                self.push(";");
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.push("try ");
                self.block(block);
                if let Some(handler) = handler {
                    match &handler.param {
                        Some(param) => {
                            self.push(" catch (");
                            self.push(param);
                            self.push(") ");
                        }
                        None => self.push(" catch "),
                    }
                    self.block(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.push(" finally ");
                    self.block(finalizer);
                }
            }
            StmtKind::Block(stmts) => self.block(stmts),
            StmtKind::Empty => self.push(";"),
        }
    }

    fn var_decl(&mut self, kind: DeclKind, decls: &[Declarator]) {
        self.push(kind.as_str());
        self.push(" ");
        for (i, decl) in decls.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&decl.name);
            if let Some(init) = &decl.init {
                self.push(" = ");
                self.expr(init, PREC_ASSIGN);
            }
        }
    }

    fn for_binding(&mut self, binding: &ForBinding) {
        if let Some(kind) = binding.kind {
            self.push(kind.as_str());
            self.push(" ");
        }
        self.push(&binding.name);
    }

    /// Prints a statement body as a block.
    fn body(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.block(stmts),
            _ => self.block(std::slice::from_ref(stmt)),
        }
    }

    fn block(&mut self, stmts: &[Stmt]) {
        if stmts.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{\n");
        self.indent += 1;
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.line_start();
        self.push("}");
    }

    fn function(&mut self, def: &FunctionDef) {
        if def.is_async {
            self.push("async ");
        }
        if def.is_arrow {
            self.params(&def.params);
            self.push(" => ");
            match &def.body {
                FunctionBody::Block(stmts) => self.block(stmts),
                FunctionBody::Expr(expr) => {
                    if needs_statement_parens(expr) {
                        self.push("(");
                        self.expr(expr, 0);
                        self.push(")");
                    } else {
                        self.expr(expr, PREC_ASSIGN);
                    }
                }
            }
            return;
        }
        self.push("function");
        if let Some(name) = &def.name {
            self.push(" ");
            self.push(name);
        }
        self.params(&def.params);
        self.push(" ");
        match &def.body {
            FunctionBody::Block(stmts) => self.block(stmts),
            FunctionBody::Expr(expr) => {
                self.push("{\n");
                self.indent += 1;
                self.line_start();
                self.push("return ");
                self.expr(expr, 0);
                self.push(";\n");
                self.indent -= 1;
                self.line_start();
                self.push("}");
            }
        }
    }

    fn params(&mut self, params: &[Param]) {
        self.push("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            if param.rest {
                self.push("...");
            }
            self.push(&param.name);
            if let Some(default) = &param.default {
                self.push(" = ");
                self.expr(default, PREC_ASSIGN);
            }
        }
        self.push(")");
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr, min_precedence: u8) {
        if precedence(expr) < min_precedence {
            self.push("(");
            self.expr_inner(expr);
            self.push(")");
        } else {
            self.expr_inner(expr);
        }
    }

    fn parenthesised(&mut self, expr: &Expr) {
        self.push("(");
        self.expr(expr, 0);
        self.push(")");
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(n) => self.push(&number_to_string(*n)),
            Expr::Str(s) => self.push(&quote_string(s)),
            Expr::Template { quasis, exprs } => {
                self.push("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.push(&escape_template(quasi));
                    if let Some(expr) = exprs.get(i) {
                        self.push("${");
                        self.expr(expr, 0);
                        self.push("}");
                    }
                }
                self.push("`");
            }
            Expr::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Expr::Null => self.push("null"),
            Expr::This => self.push("this"),
            Expr::Ident(name) => self.push(name),
            Expr::Array(elements) => {
                self.push("[");
                self.elements(elements);
                self.push("]");
            }
            Expr::Object(props) => self.object(props),
            Expr::Function(def) => self.function(def),
            Expr::Unary { op, arg } => {
                self.push(op.as_str());
                if matches!(op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete) {
                    self.push(" ");
                }
                let prefixed = matches!(
                    **arg,
                    Expr::Unary { .. } | Expr::Update { prefix: true, .. }
                );
                if prefixed {
                    self.parenthesised(arg);
                } else {
                    self.expr(arg, PREC_UNARY);
                }
            }
            Expr::Await(arg) => {
                self.push("await ");
                self.expr(arg, PREC_UNARY);
            }
            Expr::Update { op, prefix, target } => {
                if *prefix {
                    self.push(op.as_str());
                    self.expr(target, PREC_CALL);
                } else {
                    self.expr(target, PREC_CALL);
                    self.push(op.as_str());
                }
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                if *op == BinaryOp::Pow {
                    if matches!(**left, Expr::Unary { .. } | Expr::Await(_)) {
                        self.parenthesised(left);
                    } else {
                        self.expr(left, prec + 1);
                    }
                } else {
                    self.expr(left, prec);
                }
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.expr(right, if *op == BinaryOp::Pow { prec } else { prec + 1 });
            }
            Expr::Logical { op, left, right } => {
                let prec = op.precedence();
                if mixes_nullish(*op, left) {
                    self.parenthesised(left);
                } else {
                    self.expr(left, prec);
                }
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                if mixes_nullish(*op, right) {
                    self.parenthesised(right);
                } else {
                    self.expr(right, prec + 1);
                }
            }
            Expr::Assign { op, target, value } => {
                self.expr(target, PREC_CALL);
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.expr(value, PREC_ASSIGN);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, PREC_CONDITIONAL + 1);
                self.push(" ? ");
                self.expr(consequent, PREC_ASSIGN);
                self.push(" : ");
                self.expr(alternate, PREC_ASSIGN);
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                self.member_object(callee);
                if *optional {
                    self.push("?.");
                }
                self.push("(");
                self.elements(args);
                self.push(")");
            }
            Expr::New { callee, args } => {
                self.push("new ");
                if is_plain_new_callee(callee) {
                    self.expr(callee, 0);
                } else {
                    self.parenthesised(callee);
                }
                self.push("(");
                self.elements(args);
                self.push(")");
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                self.member_object(object);
                self.push(if *optional { "?." } else { "." });
                self.push(property);
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                self.member_object(object);
                if *optional {
                    self.push("?.");
                }
                self.push("[");
                self.expr(index, 0);
                self.push("]");
            }
        }
    }

    fn member_object(&mut self, object: &Expr) {
        match object {
            Expr::Number(_) | Expr::New { .. } => self.parenthesised(object),
            _ => self.expr(object, PREC_CALL),
        }
    }

    fn elements(&mut self, elements: &[Element]) {
        for (i, element) in elements.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match element {
                Element::Expr(expr) => self.expr(expr, PREC_ASSIGN),
                Element::Spread(expr) => {
                    self.push("...");
                    self.expr(expr, PREC_ASSIGN);
                }
            }
        }
    }

    fn object(&mut self, props: &[Property]) {
        if props.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{ ");
        for (i, prop) in props.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match prop {
                Property::Init { key, value } => {
                    match key {
                        PropKey::Named(name) if is_identifier_name(name) => self.push(name),
                        PropKey::Named(name) => self.push(&quote_string(name)),
                        PropKey::Computed(expr) => {
                            self.push("[");
                            self.expr(expr, PREC_ASSIGN);
                            self.push("]");
                        }
                    }
                    self.push(": ");
                    self.expr(value, PREC_ASSIGN);
                }
                Property::Spread(expr) => {
                    self.push("...");
                    self.expr(expr, PREC_ASSIGN);
                }
            }
        }
        self.push(" }");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn reprint(source: &str) -> String {
        print_program(&parse_program(source).unwrap())
    }

    #[test]
    fn keeps_needed_parentheses_only() {
        assert_eq!(reprint("(a + b) * c"), "(a + b) * c;\n");
        assert_eq!(reprint("a + (b * c)"), "a + b * c;\n");
        assert_eq!(reprint("a - (b - c)"), "a - (b - c);\n");
        assert_eq!(reprint("(2 ** 3) ** 2"), "(2 ** 3) ** 2;\n");
        assert_eq!(reprint("(a ?? b) || c"), "(a ?? b) || c;\n");
    }

    #[test]
    fn guards_statement_position() {
        assert_eq!(reprint("({a: 1}).a"), "({ a: 1 }.a);\n");
        assert_eq!(reprint("(function () {})()"), "(function() {}());\n");
        assert_eq!(reprint("f = () => ({})"), "f = () => ({});\n");
    }

    #[test]
    fn keeps_unary_operators_apart() {
        assert_eq!(reprint("- -x"), "-(-x);\n");
        assert_eq!(reprint("-(--x)"), "-(--x);\n");
        assert_eq!(reprint("typeof x === 'string'"), "typeof x === \"string\";\n");
    }

    #[test]
    fn wraps_single_statement_bodies() {
        assert_eq!(
            reprint("if (a) b()\nelse if (c) d()\nelse e()"),
            "if (a) {\n  b();\n} else if (c) {\n  d();\n} else {\n  e();\n}\n"
        );
    }

    #[test]
    fn escapes_strings_and_templates() {
        assert_eq!(reprint(r#"'a"b\n'"#), "\"a\\\"b\\n\";\n");
        assert_eq!(reprint("`x ${y} \\${z}`"), "`x ${y} \\${z}`;\n");
    }

    #[test]
    fn printing_is_idempotent_on_a_mixed_program() {
        let source = r#"
            const xs = [1, 2, ...rest];
            let o = { a, "b c": 1, [k + 1]: x => x * 2, m() { return this.a } };
            for (let i = 0; i < xs.length; i++) { total += xs[i] ** 2 }
            const label = ok ? `yes ${n}` : cond && (a || b) ? -n : void 0;
        "#;
        let once = reprint(source);
        assert_eq!(reprint(&once), once);
    }
}
