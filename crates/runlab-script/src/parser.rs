//! Recursive-descent parser producing [`crate::ast`] trees.
//!
//! Binary operators use precedence climbing. Arrow functions are detected
//! by scanning ahead for the matching `)` followed by `=>`. Nesting of
//! statements and expressions is capped at [`MAX_NESTING_DEPTH`] so hostile
//! input cannot exhaust the stack.

use std::rc::Rc;

use crate::ast::*;
use crate::error::ParseError;
use crate::interpreter::format::number_to_string;
use crate::lexer::{Keyword, Lexer, Punct, TemplateSubstitution, Token, TokenKind};

pub const MAX_NESTING_DEPTH: usize = 100;

/// Reserved words of full JavaScript that this subset does not implement.
const UNSUPPORTED_WORDS: &[&str] = &[
    "class", "import", "export", "yield", "with", "debugger", "super", "enum",
];

/// Parses a complete program.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.parse_statement()?);
    }
    Ok(Program { body })
}

#[derive(Debug, Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl InfixOp {
    fn precedence(self) -> u8 {
        match self {
            InfixOp::Binary(op) => op.precedence(),
            InfixOp::Logical(op) => op.precedence(),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    eof: Token,
    pos: usize,
    depth: usize,
    function_depth: usize,
    loop_depth: usize,
    breakable_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = tokens.last().cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            line: 1,
            column: 1,
            newline_before: true,
        });
        Parser {
            tokens,
            eof,
            pos: 0,
            depth: 0,
            function_depth: 0,
            loop_depth: 0,
            breakable_depth: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn check_punct(&self, punct: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(punct)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<Token, ParseError> {
        if self.check_punct(punct) {
            Ok(self.advance())
        } else {
            Err(self.unexpected())
        }
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn is_ident_at(&self, offset: usize, word: &str) -> bool {
        matches!(&self.peek_at(offset).kind, TokenKind::Ident(name) if name == word)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.line, token.column)
    }

    fn unexpected(&self) -> ParseError {
        match &self.peek().kind {
            TokenKind::Eof => self.error_here("Unexpected end of input"),
            kind => self.error_here(format!("Unexpected token {}", kind.describe())),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) if UNSUPPORTED_WORDS.contains(&name.as_str()) => {
                Err(self.error_here(format!("'{name}' is not supported")))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Punct(Punct::LBracket | Punct::LBrace) => {
                Err(self.error_here("Destructuring is not supported"))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_property_name(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Keyword(keyword) => {
                let name = keyword.as_str().to_string();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(Punct::Semi) {
            return Ok(());
        }
        let token = self.peek();
        if token.newline_before || matches!(token.kind, TokenKind::Punct(Punct::RBrace) | TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn at_statement_end(&self) -> bool {
        let token = self.peek();
        token.newline_before
            || matches!(
                token.kind,
                TokenKind::Punct(Punct::Semi | Punct::RBrace) | TokenKind::Eof
            )
    }

    /// Runs `f` one nesting level deeper, failing past the limit.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here("Program is nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    pub fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        self.nested(|p| p.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        let kind = match &self.peek().kind {
            TokenKind::Punct(Punct::LBrace) => StmtKind::Block(self.parse_block()?),
            TokenKind::Punct(Punct::Semi) => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Keyword(Keyword::Let | Keyword::Const | Keyword::Var) => {
                let (kind, decls) = self.parse_var_decl(true)?;
                self.consume_semicolon()?;
                StmtKind::VarDecl { kind, decls }
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                StmtKind::Function(Rc::new(self.parse_function_rest(false, true, line)?))
            }
            TokenKind::Ident(word)
                if word == "async"
                    && self.peek_at(1).kind == TokenKind::Keyword(Keyword::Function)
                    && !self.peek_at(1).newline_before =>
            {
                self.advance();
                self.advance();
                StmtKind::Function(Rc::new(self.parse_function_rest(true, true, line)?))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                self.expect_punct(Punct::LParen)?;
                let test = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                let body = Box::new(self.parse_loop_body()?);
                StmtKind::While { test, body }
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.advance();
                let body = Box::new(self.parse_loop_body()?);
                self.expect_keyword(Keyword::While)?;
                self.expect_punct(Punct::LParen)?;
                let test = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                self.eat_punct(Punct::Semi);
                StmtKind::DoWhile { body, test }
            }
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch()?,
            TokenKind::Keyword(Keyword::Return) => {
                if self.function_depth == 0 {
                    return Err(self.error_here("Illegal return statement"));
                }
                self.advance();
                let arg = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                StmtKind::Return(arg)
            }
            TokenKind::Keyword(Keyword::Break) => {
                if self.breakable_depth == 0 {
                    return Err(self.error_here("Illegal break statement"));
                }
                self.advance();
                self.reject_label()?;
                self.consume_semicolon()?;
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                if self.loop_depth == 0 {
                    return Err(self.error_here(
                        "Illegal continue statement: no surrounding iteration statement",
                    ));
                }
                self.advance();
                self.reject_label()?;
                self.consume_semicolon()?;
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                if self.peek().newline_before {
                    return Err(self.error_here("Illegal newline after throw"));
                }
                let arg = self.parse_expression()?;
                self.consume_semicolon()?;
                StmtKind::Throw(arg)
            }
            TokenKind::Keyword(Keyword::Try) => self.parse_try()?,
            TokenKind::Ident(_) if self.peek_at(1).kind == TokenKind::Punct(Punct::Colon) => {
                return Err(self.error_here("Labels are not supported"));
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt::new(kind, line))
    }

    fn reject_label(&self) -> Result<(), ParseError> {
        let token = self.peek();
        if matches!(token.kind, TokenKind::Ident(_)) && !token.newline_before {
            return Err(self.error_here("Labels are not supported"));
        }
        Ok(())
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_loop_body(&mut self) -> Result<Stmt, ParseError> {
        self.loop_depth += 1;
        self.breakable_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        self.breakable_depth -= 1;
        body
    }

    fn parse_var_decl(
        &mut self,
        require_const_init: bool,
    ) -> Result<(DeclKind, Vec<Declarator>), ParseError> {
        let kind = match self.advance().kind {
            TokenKind::Keyword(Keyword::Let) => DeclKind::Let,
            TokenKind::Keyword(Keyword::Const) => DeclKind::Const,
            TokenKind::Keyword(Keyword::Var) => DeclKind::Var,
            _ => return Err(self.unexpected()),
        };
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat_punct(Punct::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() && require_const_init {
                return Err(self.error_here("Missing initializer in const declaration"));
            }
            decls.push(Declarator { name, init });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        Ok((kind, decls))
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        self.expect_punct(Punct::LParen)?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        if self.check_keyword(Keyword::Await) {
            return Err(self.error_here("'for await' is not supported"));
        }
        self.expect_punct(Punct::LParen)?;

        let is_each_keyword =
            |p: &Parser, offset: usize| p.is_ident_at(offset, "of") || p.peek_at(offset).kind == TokenKind::Keyword(Keyword::In);

        let init = match &self.peek().kind {
            TokenKind::Keyword(k @ (Keyword::Let | Keyword::Const | Keyword::Var)) => {
                if let TokenKind::Ident(name) = &self.peek_at(1).kind {
                    if is_each_keyword(self, 2) {
                        let kind = match k {
                            Keyword::Let => DeclKind::Let,
                            Keyword::Const => DeclKind::Const,
                            _ => DeclKind::Var,
                        };
                        let name = name.clone();
                        self.advance();
                        self.advance();
                        return self.parse_for_each(ForBinding {
                            kind: Some(kind),
                            name,
                        });
                    }
                }
                let (kind, decls) = self.parse_var_decl(true)?;
                Some(ForInit::VarDecl { kind, decls })
            }
            TokenKind::Ident(name) if is_each_keyword(self, 1) => {
                let name = name.clone();
                self.advance();
                return self.parse_for_each(ForBinding { kind: None, name });
            }
            TokenKind::Punct(Punct::Semi) => None,
            _ => Some(ForInit::Expr(self.parse_expression()?)),
        };

        self.expect_punct(Punct::Semi)?;
        let test = if self.check_punct(Punct::Semi) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::Semi)?;
        let update = if self.check_punct(Punct::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_for_each(&mut self, binding: ForBinding) -> Result<StmtKind, ParseError> {
        if self.is_ident_at(0, "of") {
            self.advance();
            let iterable = self.parse_assignment()?;
            self.expect_punct(Punct::RParen)?;
            let body = Box::new(self.parse_loop_body()?);
            Ok(StmtKind::ForOf {
                binding,
                iterable,
                body,
            })
        } else {
            self.expect_keyword(Keyword::In)?;
            let object = self.parse_expression()?;
            self.expect_punct(Punct::RParen)?;
            let body = Box::new(self.parse_loop_body()?);
            Ok(StmtKind::ForIn {
                binding,
                object,
                body,
            })
        }
    }

    fn parse_switch(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        self.expect_punct(Punct::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        self.expect_punct(Punct::LBrace)?;

        self.breakable_depth += 1;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct(Punct::RBrace) {
            let test = if self.eat_keyword(Keyword::Case) {
                Some(self.parse_expression()?)
            } else if self.check_keyword(Keyword::Default) {
                if seen_default {
                    return Err(self.error_here("More than one default clause in switch statement"));
                }
                self.advance();
                seen_default = true;
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(Punct::Colon)?;
            let mut body = Vec::new();
            while !(self.check_keyword(Keyword::Case)
                || self.check_keyword(Keyword::Default)
                || self.check_punct(Punct::RBrace)
                || self.at_eof())
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.breakable_depth -= 1;

        Ok(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let block = self.parse_block()?;
        let handler = if self.eat_keyword(Keyword::Catch) {
            let param = if self.eat_punct(Punct::LParen) {
                let name = self.expect_ident()?;
                self.expect_punct(Punct::RParen)?;
                Some(name)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat_keyword(Keyword::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_here("Missing catch or finally after try"));
        }
        Ok(StmtKind::Try {
            block,
            handler,
            finalizer,
        })
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    /// Parses what follows the `function` keyword.
    fn parse_function_rest(
        &mut self,
        is_async: bool,
        require_name: bool,
        line: u32,
    ) -> Result<FunctionDef, ParseError> {
        if self.check_punct(Punct::Star) {
            return Err(self.error_here("Generators are not supported"));
        }
        let name = if matches!(self.peek().kind, TokenKind::Ident(_)) {
            Some(self.expect_ident()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
            is_async,
            line,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        while !self.check_punct(Punct::RParen) {
            let rest = self.eat_punct(Punct::Ellipsis);
            let name = self.expect_ident()?;
            let default = if !rest && self.eat_punct(Punct::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                rest,
            });
            if rest || !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(params)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let saved = (self.loop_depth, self.breakable_depth);
        self.loop_depth = 0;
        self.breakable_depth = 0;
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        (self.loop_depth, self.breakable_depth) = saved;
        body
    }

    /// Index of the `)` closing the `(` at `open`, if the input has one.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace) => depth += 1,
                TokenKind::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace) => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return (token.kind == TokenKind::Punct(Punct::RParen)).then_some(index);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let line = self.peek().line;
        let is_async = self.is_ident_at(0, "async")
            && !self.peek_at(1).newline_before
            && matches!(
                self.peek_at(1).kind,
                TokenKind::Ident(_) | TokenKind::Punct(Punct::LParen)
            );
        let offset = usize::from(is_async);
        let arrow_follows = |token: &Token| token.kind == TokenKind::Punct(Punct::Arrow) && !token.newline_before;

        let params = match &self.peek_at(offset).kind {
            TokenKind::Ident(_) if arrow_follows(self.peek_at(offset + 1)) => {
                if is_async {
                    self.advance();
                }
                let name = self.expect_ident()?;
                vec![Param {
                    name,
                    default: None,
                    rest: false,
                }]
            }
            TokenKind::Punct(Punct::LParen) => {
                let Some(close) = self.matching_paren(self.pos + offset) else {
                    return Ok(None);
                };
                let after = self.tokens.get(close + 1).unwrap_or(&self.eof);
                if !arrow_follows(after) {
                    return Ok(None);
                }
                if is_async {
                    self.advance();
                }
                self.parse_params()?
            }
            _ => return Ok(None),
        };

        self.expect_punct(Punct::Arrow)?;
        let body = if self.check_punct(Punct::LBrace) {
            FunctionBody::Block(self.parse_function_body()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Some(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
            is_async,
            line,
        }))))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| p.parse_assignment_inner())
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let start = self.peek().clone();
        let left = self.parse_conditional()?;
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Assign) => AssignOp::Assign,
            TokenKind::Punct(Punct::PlusAssign) => AssignOp::Add,
            TokenKind::Punct(Punct::MinusAssign) => AssignOp::Sub,
            TokenKind::Punct(Punct::StarAssign) => AssignOp::Mul,
            TokenKind::Punct(Punct::SlashAssign) => AssignOp::Div,
            TokenKind::Punct(Punct::PercentAssign) => AssignOp::Mod,
            TokenKind::Punct(Punct::StarStarAssign) => AssignOp::Pow,
            _ => return Ok(left),
        };
        if !left.is_assignment_target() {
            return Err(ParseError::new(
                "Invalid left-hand side in assignment",
                start.line,
                start.column,
            ));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_binary(LogicalOp::Or.precedence())?;
        if !self.eat_punct(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(Punct::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn peek_infix(&self) -> Option<InfixOp> {
        let op = match self.peek().kind {
            TokenKind::Punct(p) => match p {
                Punct::PipePipe => InfixOp::Logical(LogicalOp::Or),
                Punct::QuestionQuestion => InfixOp::Logical(LogicalOp::Nullish),
                Punct::AmpAmp => InfixOp::Logical(LogicalOp::And),
                Punct::Pipe => InfixOp::Binary(BinaryOp::BitOr),
                Punct::Caret => InfixOp::Binary(BinaryOp::BitXor),
                Punct::Amp => InfixOp::Binary(BinaryOp::BitAnd),
                Punct::Eq => InfixOp::Binary(BinaryOp::Eq),
                Punct::NotEq => InfixOp::Binary(BinaryOp::NotEq),
                Punct::StrictEq => InfixOp::Binary(BinaryOp::StrictEq),
                Punct::StrictNotEq => InfixOp::Binary(BinaryOp::StrictNotEq),
                Punct::Lt => InfixOp::Binary(BinaryOp::Lt),
                Punct::LtEq => InfixOp::Binary(BinaryOp::LtEq),
                Punct::Gt => InfixOp::Binary(BinaryOp::Gt),
                Punct::GtEq => InfixOp::Binary(BinaryOp::GtEq),
                Punct::Shl => InfixOp::Binary(BinaryOp::Shl),
                Punct::Shr => InfixOp::Binary(BinaryOp::Shr),
                Punct::UShr => InfixOp::Binary(BinaryOp::UShr),
                Punct::Plus => InfixOp::Binary(BinaryOp::Add),
                Punct::Minus => InfixOp::Binary(BinaryOp::Sub),
                Punct::Star => InfixOp::Binary(BinaryOp::Mul),
                Punct::Slash => InfixOp::Binary(BinaryOp::Div),
                Punct::Percent => InfixOp::Binary(BinaryOp::Mod),
                Punct::StarStar => InfixOp::Binary(BinaryOp::Pow),
                _ => return None,
            },
            TokenKind::Keyword(Keyword::In) => InfixOp::Binary(BinaryOp::In),
            TokenKind::Keyword(Keyword::Instanceof) => InfixOp::Binary(BinaryOp::Instanceof),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_infix() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            left = match op {
                InfixOp::Binary(BinaryOp::Pow) => {
                    let right = self.nested(|p| p.parse_binary(precedence))?;
                    Expr::Binary {
                        op: BinaryOp::Pow,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
                InfixOp::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(self.parse_binary(precedence + 1)?),
                },
                InfixOp::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(self.parse_binary(precedence + 1)?),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::Not),
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            TokenKind::Punct(Punct::Tilde) => Some(UnaryOp::BitNot),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = self.nested(|p| p.parse_unary())?;
            return Ok(Expr::Unary {
                op,
                arg: Box::new(arg),
            });
        }

        let update = match self.peek().kind {
            TokenKind::Punct(Punct::PlusPlus) => Some(UpdateOp::Increment),
            TokenKind::Punct(Punct::MinusMinus) => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = update {
            self.advance();
            let start = self.peek().clone();
            let target = self.nested(|p| p.parse_unary())?;
            if !target.is_assignment_target() {
                return Err(ParseError::new(
                    "Invalid left-hand side expression in prefix operation",
                    start.line,
                    start.column,
                ));
            }
            return Ok(Expr::Update {
                op,
                prefix: true,
                target: Box::new(target),
            });
        }

        if self.eat_keyword(Keyword::Await) {
            let arg = self.nested(|p| p.parse_unary())?;
            return Ok(Expr::Await(Box::new(arg)));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let expr = self.parse_call_member()?;
        let op = match self.peek() {
            token if token.newline_before => None,
            token => match token.kind {
                TokenKind::Punct(Punct::PlusPlus) => Some(UpdateOp::Increment),
                TokenKind::Punct(Punct::MinusMinus) => Some(UpdateOp::Decrement),
                _ => None,
            },
        };
        let Some(op) = op else {
            return Ok(expr);
        };
        if !expr.is_assignment_target() {
            return Err(ParseError::new(
                "Invalid left-hand side expression in postfix operation",
                start.line,
                start.column,
            ));
        }
        self.advance();
        Ok(Expr::Update {
            op,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.check_keyword(Keyword::New) {
            self.nested(|p| p.parse_new())?
        } else {
            self.parse_primary()?
        };
        loop {
            let next = match &self.peek().kind {
                TokenKind::Punct(p) => *p,
                TokenKind::Template { .. } if !self.peek().newline_before => {
                    return Err(self.error_here("Tagged templates are not supported"));
                }
                _ => break,
            };
            expr = match next {
                Punct::Dot => {
                    self.advance();
                    Expr::Member {
                        object: Box::new(expr),
                        property: self.expect_property_name()?,
                        optional: false,
                    }
                }
                Punct::QuestionDot => {
                    self.advance();
                    if self.check_punct(Punct::LParen) {
                        Expr::Call {
                            callee: Box::new(expr),
                            args: self.parse_arguments()?,
                            optional: true,
                        }
                    } else if self.eat_punct(Punct::LBracket) {
                        let index = self.parse_expression()?;
                        self.expect_punct(Punct::RBracket)?;
                        Expr::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: true,
                        }
                    } else {
                        Expr::Member {
                            object: Box::new(expr),
                            property: self.expect_property_name()?,
                            optional: true,
                        }
                    }
                }
                Punct::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect_punct(Punct::RBracket)?;
                    Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    }
                }
                Punct::LParen => Expr::Call {
                    callee: Box::new(expr),
                    args: self.parse_arguments()?,
                    optional: false,
                },
                _ => break,
            };
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        if self.check_punct(Punct::Dot) {
            return Err(self.error_here("'new.target' is not supported"));
        }
        let mut callee = if self.check_keyword(Keyword::New) {
            self.nested(|p| p.parse_new())?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(Punct::Dot) {
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: self.expect_property_name()?,
                    optional: false,
                };
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expression()?;
                self.expect_punct(Punct::RBracket)?;
                callee = Expr::Index {
                    object: Box::new(callee),
                    index: Box::new(index),
                    optional: false,
                };
            } else {
                break;
            }
        }
        let args = if self.check_punct(Punct::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<Element>, ParseError> {
        self.expect_punct(Punct::LParen)?;
        let mut args = Vec::new();
        while !self.check_punct(Punct::RParen) {
            args.push(self.parse_element()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(args)
    }

    fn parse_element(&mut self) -> Result<Element, ParseError> {
        if self.eat_punct(Punct::Ellipsis) {
            Ok(Element::Spread(self.parse_assignment()?))
        } else {
            Ok(Element::Expr(self.parse_assignment()?))
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let expr = match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Expr::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                Expr::Str(s)
            }
            TokenKind::Template {
                quasis,
                substitutions,
            } => {
                self.advance();
                let exprs = substitutions
                    .iter()
                    .map(|s| self.parse_substitution(s))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::Template { quasis, exprs }
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Expr::Bool(true)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Expr::Bool(false)
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Expr::Null
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Expr::This
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                Expr::Function(Rc::new(self.parse_function_rest(false, false, token.line)?))
            }
            TokenKind::Ident(ref name)
                if name == "async"
                    && self.peek_at(1).kind == TokenKind::Keyword(Keyword::Function)
                    && !self.peek_at(1).newline_before =>
            {
                self.advance();
                self.advance();
                Expr::Function(Rc::new(self.parse_function_rest(true, false, token.line)?))
            }
            TokenKind::Ident(_) => Expr::Ident(self.expect_ident()?),
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                inner
            }
            TokenKind::Punct(Punct::LBracket) => self.parse_array()?,
            TokenKind::Punct(Punct::LBrace) => self.parse_object()?,
            TokenKind::Punct(Punct::Slash | Punct::SlashAssign) => {
                return Err(self.error_here("Regular expression literals are not supported"));
            }
            _ => return Err(self.unexpected()),
        };
        Ok(expr)
    }

    fn parse_substitution(&self, substitution: &TemplateSubstitution) -> Result<Expr, ParseError> {
        let tokens =
            Lexer::with_position(&substitution.source, substitution.line, substitution.column)
                .tokenize()?;
        let mut parser = Parser::new(tokens);
        parser.depth = self.depth;
        parser.function_depth = self.function_depth;
        let expr = parser.parse_expression()?;
        if !parser.at_eof() {
            return Err(parser.unexpected());
        }
        Ok(expr)
    }

    fn parse_array(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let mut elements = Vec::new();
        while !self.check_punct(Punct::RBracket) {
            if self.check_punct(Punct::Comma) {
                return Err(self.error_here("Array holes are not supported"));
            }
            elements.push(self.parse_element()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBracket)?;
        Ok(Expr::Array(elements))
    }

    fn parse_object(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let mut properties = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.eat_punct(Punct::Ellipsis) {
                properties.push(Property::Spread(self.parse_assignment()?));
            } else {
                properties.push(self.parse_property()?);
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Expr::Object(properties))
    }

    fn parse_property(&mut self) -> Result<Property, ParseError> {
        let first = self.peek().clone();
        let ends_key = |kind: &TokenKind| {
            matches!(
                kind,
                TokenKind::Punct(Punct::Colon | Punct::LParen | Punct::Comma | Punct::RBrace)
            )
        };

        if matches!(&first.kind, TokenKind::Ident(w) if w == "get" || w == "set")
            && !ends_key(&self.peek_at(1).kind)
        {
            return Err(self.error_here("Getters and setters are not supported"));
        }
        let is_async = self.is_ident_at(0, "async") && !ends_key(&self.peek_at(1).kind);
        if is_async {
            self.advance();
        }

        let key_token = self.peek().clone();
        let key = match key_token.kind {
            TokenKind::Ident(ref name) => {
                self.advance();
                PropKey::Named(name.clone())
            }
            TokenKind::Keyword(keyword) => {
                self.advance();
                PropKey::Named(keyword.as_str().to_string())
            }
            TokenKind::Str(ref s) => {
                self.advance();
                PropKey::Named(s.clone())
            }
            TokenKind::Number(n) => {
                self.advance();
                PropKey::Named(number_to_string(n))
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.advance();
                let key = self.parse_assignment()?;
                self.expect_punct(Punct::RBracket)?;
                PropKey::Computed(key)
            }
            _ => return Err(self.unexpected()),
        };

        let value = if !is_async && self.eat_punct(Punct::Colon) {
            self.parse_assignment()?
        } else if self.check_punct(Punct::LParen) {
            let name = match &key {
                PropKey::Named(name) => Some(name.clone()),
                PropKey::Computed(_) => None,
            };
            let params = self.parse_params()?;
            let body = self.parse_function_body()?;
            Expr::Function(Rc::new(FunctionDef {
                name,
                params,
                body: FunctionBody::Block(body),
                is_arrow: false,
                is_async,
                line: key_token.line,
            }))
        } else if let (false, TokenKind::Ident(name)) = (is_async, &key_token.kind) {
            Expr::Ident(name.clone())
        } else {
            return Err(self.unexpected());
        };
        Ok(Property::Init { key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_of(source: &str) -> Expr {
        let program = parse_program(source).unwrap();
        match program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let Expr::Binary { op, right, .. } = expr_of("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn exponent_is_right_associative() {
        let Expr::Binary { op, left, right } = expr_of("2 ** 3 ** 2") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Pow);
        assert_eq!(*left, Expr::Number(2.0));
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn newline_terminates_statements() {
        let program = parse_program("let a = 1\nlet b = a\nb++").unwrap();
        assert_eq!(program.body.len(), 3);
        assert_eq!(program.body[2].line, 3);
    }

    #[test]
    fn missing_separator_on_one_line_is_an_error() {
        let err = parse_program("let a = 1 let b = 2").unwrap_err();
        assert_eq!(err.message, "Unexpected token 'let'");
        assert_eq!((err.line, err.column), (1, 11));
    }

    #[test]
    fn parses_arrow_functions() {
        let Expr::Function(def) = expr_of("(a, b = 2, ...rest) => a + b") else {
            panic!("expected arrow");
        };
        assert!(def.is_arrow);
        assert_eq!(def.params.len(), 3);
        assert!(def.params[2].rest);
        assert!(matches!(def.body, FunctionBody::Expr(_)));

        let Expr::Function(def) = expr_of("async x => { await x }") else {
            panic!("expected async arrow");
        };
        assert!(def.is_async);
        assert!(matches!(def.body, FunctionBody::Block(_)));
    }

    #[test]
    fn parenthesised_expression_is_not_an_arrow() {
        assert!(matches!(expr_of("(a + b) * c"), Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_for_of_and_c_style_for() {
        let program =
            parse_program("for (const x of xs) {}\nfor (let i = 0; i < 3; i++) {}\nfor (k in o) {}")
                .unwrap();
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::ForOf { binding: ForBinding { kind: Some(DeclKind::Const), name }, .. } if name == "x"
        ));
        assert!(matches!(program.body[1].kind, StmtKind::For { .. }));
        assert!(matches!(
            &program.body[2].kind,
            StmtKind::ForIn { binding: ForBinding { kind: None, .. }, .. }
        ));
    }

    #[test]
    fn object_literal_supports_shorthand_and_methods() {
        let Expr::Object(props) = expr_of("({ a, 'b c': 1, [k]: 2, m() { return 1 }, ...rest })") else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 5);
        assert_eq!(
            props[0],
            Property::Init {
                key: PropKey::Named("a".into()),
                value: Expr::Ident("a".into())
            }
        );
        assert!(matches!(&props[3], Property::Init { value: Expr::Function(def), .. } if def.name.as_deref() == Some("m")));
        assert!(matches!(props[4], Property::Spread(_)));
    }

    #[test]
    fn optional_chaining_marks_each_link() {
        let Expr::Call { callee, optional, .. } = expr_of("a?.b.c?.()") else {
            panic!("expected call");
        };
        assert!(optional);
        let Expr::Member { object, optional, .. } = *callee else {
            panic!("expected member");
        };
        assert!(!optional);
        assert!(matches!(*object, Expr::Member { optional: true, .. }));
    }

    #[test]
    fn template_substitutions_are_parsed_in_place() {
        let Expr::Template { quasis, exprs } = expr_of("`sum: ${a + b}!`") else {
            panic!("expected template");
        };
        assert_eq!(quasis, vec!["sum: ".to_string(), "!".to_string()]);
        assert!(matches!(exprs[0], Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn rejects_misplaced_control_flow() {
        assert_eq!(parse_program("return 1").unwrap_err().message, "Illegal return statement");
        assert_eq!(parse_program("break").unwrap_err().message, "Illegal break statement");
        assert!(parse_program("while (x) { function f() { break } }").is_err());
        assert!(parse_program("switch (x) { case 1: break }").is_ok());
    }

    #[test]
    fn rejects_unsupported_syntax() {
        for source in [
            "class A {}",
            "let [a, b] = xs",
            "const x",
            "x = /re/",
            "function* g() {}",
            "1 = 2",
        ] {
            assert!(parse_program(source).is_err(), "{source} should not parse");
        }
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let source = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let result = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || parse_program(&source).map(|_| ()))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(result.unwrap_err().message, "Program is nested too deeply");
    }
}
