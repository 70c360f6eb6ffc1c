//! Recursive-descent parser from the token stream to [`ParsedModule`].
//!
//! One token of lookahead everywhere except statement starts, where an
//! identifier followed by `:` is a label. Operator expressions are built
//! with the usual precedence ladder (`or` < `and` < comparison < additive
//! < multiplicative < unary < suffix); the operator nodes themselves stay
//! sugar and are rewritten to core/primitive calls on first evaluation.

use std::{cell::OnceCell, rc::Rc};

use crate::{
    ast::{
        BinaryOpKind, BindingKind, Code, DottedName, Expr, ExprKind, ExternalArg, ExternalProc, FormalArg, Item,
        Overload, Overloadable, ParsedModule, Procedure, Record, Stmt, StmtKind, UnaryOpKind,
    },
    error::{CompileError, CompileResult},
    intern::NameId,
    lexer::{Keyword, Symbol, Token, TokenKind},
    source::{Location, Source},
};

/// Parses a tokenized source into a module body.
pub fn parse(source: &Rc<Source>, tokens: Vec<Token>) -> CompileResult<ParsedModule> {
    let mut parser = Parser {
        end: Location::new(source, source.text.len()),
        tokens,
        pos: 0,
    };
    parser.module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: Location,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| &t.kind)
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.pos)
            .map_or_else(|| self.end.clone(), |t| t.location.clone())
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, Some(self.location()))
    }

    fn at_symbol(&self, symbol: Symbol) -> bool {
        matches!(self.peek(), Some(TokenKind::Symbol(s)) if *s == symbol)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek(), Some(TokenKind::Keyword(k)) if *k == keyword)
    }

    fn accept_symbol(&mut self, symbol: Symbol) -> bool {
        if self.at_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: Symbol) -> CompileResult<()> {
        if self.accept_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{symbol}'")))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> CompileResult<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{keyword}'")))
        }
    }

    fn expect_ident(&mut self) -> CompileResult<(NameId, Location)> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = *name;
                let location = self.location();
                self.pos += 1;
                Ok((name, location))
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    //
    // top level
    //

    fn module(&mut self) -> CompileResult<ParsedModule> {
        let mut imports = Vec::new();
        let mut exports = Vec::new();
        let mut items = Vec::new();
        while self.peek().is_some() {
            if self.accept_keyword(Keyword::Import) {
                imports.push(self.dotted_name()?);
                self.expect_symbol(Symbol::Semicolon)?;
            } else if self.accept_keyword(Keyword::Export) {
                let (name, _) = self.expect_ident()?;
                exports.push(name);
                self.expect_symbol(Symbol::Semicolon)?;
            } else {
                items.push(self.item()?);
            }
        }
        Ok(ParsedModule {
            imports,
            exports,
            items,
        })
    }

    fn dotted_name(&mut self) -> CompileResult<DottedName> {
        let (first, location) = self.expect_ident()?;
        let mut parts = vec![first];
        while self.accept_symbol(Symbol::Dot) {
            parts.push(self.expect_ident()?.0);
        }
        Ok(DottedName {
            parts,
            location: Some(location),
        })
    }

    fn item(&mut self) -> CompileResult<Item> {
        if self.accept_keyword(Keyword::Record) {
            return self.record();
        }
        if self.accept_keyword(Keyword::Overloadable) {
            let (name, location) = self.expect_ident()?;
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Item::Overloadable(Rc::new(Overloadable {
                name,
                overloads: Default::default(),
                invoke_tables: Default::default(),
                module: Default::default(),
                co_index: Default::default(),
                location: Some(location),
            })));
        }
        if self.accept_keyword(Keyword::Overload) {
            let (name, location) = self.expect_ident()?;
            let code = self.code()?;
            return Ok(Item::Overload(Rc::new(Overload {
                name,
                code: Rc::new(code),
                module: Default::default(),
                location: Some(location),
            })));
        }
        if self.accept_keyword(Keyword::External) {
            return self.external();
        }
        match self.peek() {
            Some(TokenKind::Ident(_)) => {
                let (name, location) = self.expect_ident()?;
                let code = self.code()?;
                Ok(Item::Procedure(Rc::new(Procedure {
                    name,
                    code: Rc::new(code),
                    module: Default::default(),
                    invoke_table: OnceCell::new(),
                    co_index: Default::default(),
                    location: Some(location),
                })))
            }
            _ => Err(self.error("expected top-level item")),
        }
    }

    fn record(&mut self) -> CompileResult<Item> {
        let (name, location) = self.expect_ident()?;
        let pattern_vars = self.pattern_vars()?;
        self.expect_symbol(Symbol::LParen)?;
        let formal_args = self.formal_args()?;
        self.expect_symbol(Symbol::Semicolon)?;
        Ok(Item::Record(Rc::new(Record {
            name,
            pattern_vars,
            formal_args,
            module: Default::default(),
            co_index: Default::default(),
            location: Some(location),
        })))
    }

    fn external(&mut self) -> CompileResult<Item> {
        let (name, location) = self.expect_ident()?;
        self.expect_symbol(Symbol::LParen)?;
        let mut args = Vec::new();
        if !self.accept_symbol(Symbol::RParen) {
            loop {
                let (arg_name, _) = self.expect_ident()?;
                self.expect_symbol(Symbol::Colon)?;
                let ty = self.expr()?;
                args.push(ExternalArg { name: arg_name, ty });
                if !self.accept_symbol(Symbol::Comma) {
                    break;
                }
            }
            self.expect_symbol(Symbol::RParen)?;
        }
        let return_type = self.expr()?;
        self.expect_symbol(Symbol::Semicolon)?;
        Ok(Item::External(Rc::new(ExternalProc {
            name,
            args,
            return_type,
            resolved: OnceCell::new(),
            module: Default::default(),
            co_index: Default::default(),
            location: Some(location),
        })))
    }

    fn pattern_vars(&mut self) -> CompileResult<Vec<NameId>> {
        let mut vars = Vec::new();
        if self.accept_symbol(Symbol::LBracket) {
            loop {
                vars.push(self.expect_ident()?.0);
                if !self.accept_symbol(Symbol::Comma) {
                    break;
                }
            }
            self.expect_symbol(Symbol::RBracket)?;
        }
        Ok(vars)
    }

    /// Formal argument list up to and including the closing `)`.
    fn formal_args(&mut self) -> CompileResult<Vec<FormalArg>> {
        let mut args = Vec::new();
        if self.accept_symbol(Symbol::RParen) {
            return Ok(args);
        }
        loop {
            let location = self.location();
            if self.accept_keyword(Keyword::Static) {
                let pattern = self.expr()?;
                args.push(FormalArg::Static {
                    pattern,
                    location: Some(location),
                });
            } else {
                let (name, location) = self.expect_ident()?;
                let ty = if self.accept_symbol(Symbol::Colon) {
                    Some(self.expr()?)
                } else {
                    None
                };
                args.push(FormalArg::Value {
                    name,
                    ty,
                    location: Some(location),
                });
            }
            if !self.accept_symbol(Symbol::Comma) {
                break;
            }
        }
        self.expect_symbol(Symbol::RParen)?;
        Ok(args)
    }

    fn code(&mut self) -> CompileResult<Code> {
        let pattern_vars = self.pattern_vars()?;
        self.expect_symbol(Symbol::LParen)?;
        let formal_args = self.formal_args()?;
        let predicate = if self.accept_keyword(Keyword::If) {
            Some(self.expr()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(Code {
            pattern_vars,
            predicate,
            formal_args,
            body,
        })
    }

    //
    // statements
    //

    fn block(&mut self) -> CompileResult<Rc<Stmt>> {
        let location = self.location();
        self.expect_symbol(Symbol::LBrace)?;
        let mut statements = Vec::new();
        while !self.accept_symbol(Symbol::RBrace) {
            if self.peek().is_none() {
                return Err(self.error("unterminated block"));
            }
            statements.push(self.statement()?);
        }
        Ok(Stmt::new(StmtKind::Block(statements), Some(location)))
    }

    fn statement(&mut self) -> CompileResult<Rc<Stmt>> {
        let location = self.location();

        if self.at_symbol(Symbol::LBrace) {
            return self.block();
        }

        // label: identifier directly followed by ':'
        if let (Some(TokenKind::Ident(name)), Some(TokenKind::Symbol(Symbol::Colon))) = (self.peek(), self.peek_at(1)) {
            let name = *name;
            self.pos += 2;
            return Ok(Stmt::new(StmtKind::Label(name), Some(location)));
        }

        for (keyword, kind) in [
            (Keyword::Var, BindingKind::Var),
            (Keyword::Ref, BindingKind::Ref),
            (Keyword::Static, BindingKind::Static),
        ] {
            if self.accept_keyword(keyword) {
                let (name, _) = self.expect_ident()?;
                self.expect_symbol(Symbol::Assign)?;
                let expr = self.expr()?;
                self.expect_symbol(Symbol::Semicolon)?;
                return Ok(Stmt::new(StmtKind::Binding { kind, name, expr }, Some(location)));
            }
        }

        if self.accept_keyword(Keyword::Goto) {
            let (name, _) = self.expect_ident()?;
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Stmt::new(StmtKind::Goto(name), Some(location)));
        }

        if self.accept_keyword(Keyword::Return) {
            let expr = if self.accept_symbol(Symbol::Semicolon) {
                None
            } else {
                let expr = self.expr()?;
                self.expect_symbol(Symbol::Semicolon)?;
                Some(expr)
            };
            return Ok(Stmt::new(StmtKind::Return(expr), Some(location)));
        }

        if self.accept_keyword(Keyword::ReturnRef) {
            let expr = self.expr()?;
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Stmt::new(StmtKind::ReturnRef(expr), Some(location)));
        }

        if self.accept_keyword(Keyword::If) {
            self.expect_symbol(Symbol::LParen)?;
            let condition = self.expr()?;
            self.expect_symbol(Symbol::RParen)?;
            let then_part = self.statement()?;
            let else_part = if self.accept_keyword(Keyword::Else) {
                Some(self.statement()?)
            } else {
                None
            };
            return Ok(Stmt::new(
                StmtKind::If {
                    condition,
                    then_part,
                    else_part,
                },
                Some(location),
            ));
        }

        if self.accept_keyword(Keyword::While) {
            self.expect_symbol(Symbol::LParen)?;
            let condition = self.expr()?;
            self.expect_symbol(Symbol::RParen)?;
            let body = self.statement()?;
            return Ok(Stmt::new(StmtKind::While { condition, body }, Some(location)));
        }

        if self.accept_keyword(Keyword::Break) {
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Stmt::new(StmtKind::Break, Some(location)));
        }

        if self.accept_keyword(Keyword::Continue) {
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Stmt::new(StmtKind::Continue, Some(location)));
        }

        if self.accept_keyword(Keyword::For) {
            self.expect_symbol(Symbol::LParen)?;
            let (variable, _) = self.expect_ident()?;
            self.expect_keyword(Keyword::In)?;
            let expr = self.expr()?;
            self.expect_symbol(Symbol::RParen)?;
            let body = self.statement()?;
            return Ok(Stmt::new(
                StmtKind::For {
                    variable,
                    expr,
                    body,
                    converted: OnceCell::new(),
                },
                Some(location),
            ));
        }

        let expr = self.expr()?;
        if self.accept_symbol(Symbol::Assign) {
            let right = self.expr()?;
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Stmt::new(StmtKind::Assignment { left: expr, right }, Some(location)));
        }
        self.expect_symbol(Symbol::Semicolon)?;
        Ok(Stmt::new(StmtKind::ExprStatement(expr), Some(location)))
    }

    //
    // expressions
    //

    fn expr(&mut self) -> CompileResult<Rc<Expr>> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let mut left = self.and_expr()?;
        while self.at_keyword(Keyword::Or) {
            let location = self.location();
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::new(ExprKind::Or { left, right }, Some(location));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let mut left = self.compare_expr()?;
        while self.at_keyword(Keyword::And) {
            let location = self.location();
            self.pos += 1;
            let right = self.compare_expr()?;
            left = Expr::new(ExprKind::And { left, right }, Some(location));
        }
        Ok(left)
    }

    fn compare_op(&self) -> Option<BinaryOpKind> {
        match self.peek() {
            Some(TokenKind::Symbol(Symbol::EqEq)) => Some(BinaryOpKind::Equals),
            Some(TokenKind::Symbol(Symbol::NotEq)) => Some(BinaryOpKind::NotEquals),
            Some(TokenKind::Symbol(Symbol::Lesser)) => Some(BinaryOpKind::Lesser),
            Some(TokenKind::Symbol(Symbol::LesserEq)) => Some(BinaryOpKind::LesserEquals),
            Some(TokenKind::Symbol(Symbol::Greater)) => Some(BinaryOpKind::Greater),
            Some(TokenKind::Symbol(Symbol::GreaterEq)) => Some(BinaryOpKind::GreaterEquals),
            _ => None,
        }
    }

    fn compare_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let mut left = self.additive_expr()?;
        while let Some(op) = self.compare_op() {
            let location = self.location();
            self.pos += 1;
            let right = self.additive_expr()?;
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left,
                    right,
                    converted: OnceCell::new(),
                },
                Some(location),
            );
        }
        Ok(left)
    }

    fn additive_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Symbol(Symbol::Plus)) => BinaryOpKind::Add,
                Some(TokenKind::Symbol(Symbol::Minus)) => BinaryOpKind::Subtract,
                _ => break,
            };
            let location = self.location();
            self.pos += 1;
            let right = self.multiplicative_expr()?;
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left,
                    right,
                    converted: OnceCell::new(),
                },
                Some(location),
            );
        }
        Ok(left)
    }

    fn multiplicative_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Symbol(Symbol::Star)) => BinaryOpKind::Multiply,
                Some(TokenKind::Symbol(Symbol::Slash)) => BinaryOpKind::Divide,
                Some(TokenKind::Symbol(Symbol::Percent)) => BinaryOpKind::Remainder,
                _ => break,
            };
            let location = self.location();
            self.pos += 1;
            let right = self.unary_expr()?;
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left,
                    right,
                    converted: OnceCell::new(),
                },
                Some(location),
            );
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let op = match self.peek() {
            Some(TokenKind::Symbol(Symbol::Plus)) => Some(UnaryOpKind::Plus),
            Some(TokenKind::Symbol(Symbol::Minus)) => Some(UnaryOpKind::Minus),
            Some(TokenKind::Symbol(Symbol::Star)) => Some(UnaryOpKind::Dereference),
            Some(TokenKind::Symbol(Symbol::Amp)) => Some(UnaryOpKind::AddressOf),
            Some(TokenKind::Keyword(Keyword::Not)) => Some(UnaryOpKind::Not),
            _ => None,
        };
        let Some(op) = op else {
            return self.suffix_expr();
        };
        let location = self.location();
        self.pos += 1;
        let operand = self.unary_expr()?;
        // a sign applied directly to a numeric literal folds into it, so
        // -128#i8 is a literal rather than a negation of 128#i8
        if matches!(op, UnaryOpKind::Minus | UnaryOpKind::Plus) {
            if let Some(folded) = fold_signed_literal(op, &operand) {
                return Ok(folded);
            }
        }
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                expr: operand,
                converted: OnceCell::new(),
            },
            Some(location),
        ))
    }

    fn suffix_expr(&mut self) -> CompileResult<Rc<Expr>> {
        let mut expr = self.atom()?;
        loop {
            let location = self.location();
            if self.accept_symbol(Symbol::LParen) {
                let args = self.call_args(Symbol::RParen)?;
                expr = Expr::new(ExprKind::Call { expr, args }, Some(location));
            } else if self.accept_symbol(Symbol::LBracket) {
                let args = self.call_args(Symbol::RBracket)?;
                expr = Expr::new(ExprKind::Indexing { expr, args }, Some(location));
            } else if self.accept_symbol(Symbol::Dot) {
                match self.peek() {
                    Some(TokenKind::Ident(name)) => {
                        let name = *name;
                        self.pos += 1;
                        expr = Expr::new(ExprKind::FieldRef { expr, name }, Some(location));
                    }
                    Some(TokenKind::IntLiteral { text, suffix: None }) => {
                        let index: u32 = text
                            .parse()
                            .map_err(|_| self.error("invalid tuple element index"))?;
                        self.pos += 1;
                        expr = Expr::new(ExprKind::TupleRef { expr, index }, Some(location));
                    }
                    _ => return Err(self.error("expected field name or tuple index after '.'")),
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self, close: Symbol) -> CompileResult<Vec<Rc<Expr>>> {
        let mut args = Vec::new();
        if self.accept_symbol(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if !self.accept_symbol(Symbol::Comma) {
                break;
            }
        }
        self.expect_symbol(close)?;
        Ok(args)
    }

    fn atom(&mut self) -> CompileResult<Rc<Expr>> {
        let location = self.location();

        if self.accept_keyword(Keyword::True) {
            return Ok(Expr::new(ExprKind::BoolLiteral(true), Some(location)));
        }
        if self.accept_keyword(Keyword::False) {
            return Ok(Expr::new(ExprKind::BoolLiteral(false), Some(location)));
        }

        if self.accept_symbol(Symbol::LParen) {
            let args = self.call_args(Symbol::RParen)?;
            if args.is_empty() {
                return Err(CompileError::new("empty parentheses", Some(location)));
            }
            return Ok(Expr::new(
                ExprKind::Tuple {
                    args,
                    converted: OnceCell::new(),
                },
                Some(location),
            ));
        }

        if self.accept_symbol(Symbol::LBracket) {
            let args = self.call_args(Symbol::RBracket)?;
            return Ok(Expr::new(
                ExprKind::Array {
                    args,
                    converted: OnceCell::new(),
                },
                Some(location),
            ));
        }

        let Some(token) = self.bump() else {
            return Err(self.error("unexpected end of input"));
        };
        let kind = match token.kind {
            TokenKind::Ident(name) => ExprKind::NameRef(name),
            TokenKind::IntLiteral { text, suffix } => ExprKind::IntLiteral { text, suffix },
            TokenKind::FloatLiteral { text, suffix } => ExprKind::FloatLiteral { text, suffix },
            TokenKind::CharLiteral(value) => ExprKind::CharLiteral {
                value,
                converted: OnceCell::new(),
            },
            TokenKind::StringLiteral(value) => ExprKind::StringLiteral {
                value,
                converted: OnceCell::new(),
            },
            other => {
                return Err(CompileError::new(
                    format!("unexpected {other}"),
                    Some(token.location),
                ));
            }
        };
        Ok(Expr::new(kind, Some(token.location)))
    }
}

/// Folds `-lit`/`+lit` into a signed literal node; returns `None` when the
/// operand is not a plain numeric literal.
fn fold_signed_literal(op: UnaryOpKind, operand: &Rc<Expr>) -> Option<Rc<Expr>> {
    let sign = match op {
        UnaryOpKind::Minus => "-",
        UnaryOpKind::Plus => "",
        _ => return None,
    };
    match &operand.kind {
        ExprKind::IntLiteral { text, suffix } if !text.starts_with(['-', '+']) => Some(Expr::new(
            ExprKind::IntLiteral {
                text: format!("{sign}{text}"),
                suffix: suffix.clone(),
            },
            operand.location.clone(),
        )),
        ExprKind::FloatLiteral { text, suffix } if !text.starts_with(['-', '+']) => Some(Expr::new(
            ExprKind::FloatLiteral {
                text: format!("{sign}{text}"),
                suffix: suffix.clone(),
            },
            operand.location.clone(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{intern::Interns, lexer::tokenize};

    fn parse_text(text: &str) -> ParsedModule {
        let source = Source::new("test.clay", text);
        let mut interns = Interns::new();
        let tokens = tokenize(&source, &mut interns).expect("lexes");
        parse(&source, tokens).expect("parses")
    }

    #[test]
    fn parses_record_and_procedure() {
        let module = parse_text(
            "record Pair[A, B](first : A, second : B);\n\
             main() { return Pair(1, true).second; }\n",
        );
        assert_eq!(module.items.len(), 2);
        assert!(matches!(module.items[0], Item::Record(_)));
        assert!(matches!(module.items[1], Item::Procedure(_)));
        let Item::Record(record) = &module.items[0] else {
            unreachable!()
        };
        assert_eq!(record.pattern_vars.len(), 2);
        assert_eq!(record.formal_args.len(), 2);
    }

    #[test]
    fn parses_overloads_with_predicate() {
        let module = parse_text(
            "overloadable f;\n\
             overload f[T](a : T, b : T) if IntegerType?(T) { return a; }\n",
        );
        let Item::Overload(overload) = &module.items[1] else {
            panic!("expected overload")
        };
        assert!(overload.code.predicate.is_some());
        assert_eq!(overload.code.pattern_vars.len(), 1);
    }

    #[test]
    fn parses_static_formal_args() {
        let module = parse_text("f(static n, x : Int32) { return x; }\n");
        let Item::Procedure(proc) = &module.items[0] else {
            panic!("expected procedure")
        };
        assert!(proc.code.formal_args[0].is_static());
        assert!(!proc.code.formal_args[1].is_static());
    }

    #[test]
    fn folds_negative_literals() {
        let module = parse_text("main() { return -128#i8; }\n");
        let Item::Procedure(proc) = &module.items[0] else {
            panic!("expected procedure")
        };
        let StmtKind::Block(stmts) = &proc.code.body.kind else {
            panic!("expected block")
        };
        let StmtKind::Return(Some(expr)) = &stmts[0].kind else {
            panic!("expected return")
        };
        let ExprKind::IntLiteral { text, suffix } = &expr.kind else {
            panic!("expected folded literal")
        };
        assert_eq!(text, "-128");
        assert_eq!(suffix.as_deref(), Some("i8"));
    }

    #[test]
    fn parses_control_flow() {
        parse_text(
            "main() {\n\
                 var i = 0;\n\
                 top:\n\
                 if (i < 10) { i = i + 1; goto top; }\n\
                 while (false) { break; }\n\
                 for (x in range(3)) { continue; }\n\
                 return i;\n\
             }\n",
        );
    }

    #[test]
    fn rejects_stray_tokens() {
        let source = Source::new("test.clay", "record ;");
        let mut interns = Interns::new();
        let tokens = tokenize(&source, &mut interns).expect("lexes");
        assert!(parse(&source, tokens).is_err());
    }
}
