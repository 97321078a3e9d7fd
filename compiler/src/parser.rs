use std::collections::HashMap;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token};

// Grammar:
// top        -> definition | external | expression | ';'
// definition -> def prototype expression
// external   -> extern prototype
// prototype  -> ident ( ident* )
// expression -> primary binoprhs
// binoprhs   -> (binop primary)*
// primary    -> number | ident | ident ( args ) | ( expression ) | ifexpr | forexpr
// args       -> expression (, expression)* | <empty>
// ifexpr     -> if expression then expression else expression
// forexpr    -> for ident = expression , expression (, expression)? in expression

/// Name of the zero-argument function wrapping a top-level expression.
/// Identifiers in source must start with a letter, so this is never
/// reachable from user code.
pub const ANON_FN_NAME: &str = "__anon_expr";

type ParseResult<T> = Result<T, ParseError>;

/// Binary operator precedences; higher binds tighter.
#[derive(Debug, Clone, PartialEq)]
pub struct Precedence(HashMap<char, i32>);

impl Default for Precedence {
    fn default() -> Precedence {
        let mut table = HashMap::new();
        table.insert('<', 10);
        table.insert('>', 10);
        table.insert('+', 20);
        table.insert('-', 20);
        table.insert('/', 40);
        table.insert('*', 40);
        Precedence(table)
    }
}

impl Precedence {
    pub fn set(&mut self, op: char, precedence: i32) {
        self.0.insert(op, precedence);
    }

    /// Precedence of `token` as a binary operator, or -1 if it is not one.
    pub fn of(&self, token: &Token) -> i32 {
        match token {
            Token::Char(c) if c.is_ascii() => {
                match self.0.get(c) {
                    Some(&p) if p > 0 => p,
                    _ => -1,
                }
            }
            _ => -1,
        }
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    precedence: Precedence,
}

impl<'a> Parser<'a> {
    /// The parser starts out looking at a statement separator, so the
    /// first real token is only read once the driver asks for it.
    pub fn new(lexer: Lexer<'a>, precedence: Precedence) -> Parser<'a> {
        Parser { lexer, current: Token::Char(';'), precedence }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn next_token(&mut self) -> &Token {
        self.current = self.lexer.next_token();
        log::trace!("token: {:?}", self.current);
        &self.current
    }

    pub fn precedence_mut(&mut self) -> &mut Precedence {
        &mut self.precedence
    }

    fn expect_char(&mut self, c: char, message: &'static str) -> ParseResult<()> {
        if self.current == Token::Char(c) {
            self.next_token();
            Ok(())
        } else {
            Err(ParseError(message))
        }
    }

    fn expect(&mut self, token: Token, message: &'static str) -> ParseResult<()> {
        if self.current == token {
            self.next_token();
            Ok(())
        } else {
            Err(ParseError(message))
        }
    }

    fn identifier(&mut self, message: &'static str) -> ParseResult<String> {
        match self.current {
            Token::Identifier(ref name) => {
                let name = name.clone();
                self.next_token();
                Ok(name)
            }
            _ => Err(ParseError(message)),
        }
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    pub fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current {
            Token::Identifier(_) => self.parse_identifier_expr(),
            Token::Number(x) => {
                self.next_token();
                Ok(Expr::Number(x))
            }
            Token::Char('(') => self.parse_paren_expr(),
            Token::If => self.parse_if_expr(),
            Token::For => self.parse_for_expr(),
            _ => Err(ParseError("unknown token when expecting an expression")),
        }
    }

    fn parse_paren_expr(&mut self) -> ParseResult<Expr> {
        self.next_token();
        let expr = self.parse_expression()?;
        self.expect_char(')', "expected ')'")?;
        Ok(expr)
    }

    fn parse_identifier_expr(&mut self) -> ParseResult<Expr> {
        let name = self.identifier("expected identifier")?;

        if self.current != Token::Char('(') {
            return Ok(Expr::Var(name));
        }

        self.next_token();
        let mut args = Vec::new();
        if self.current != Token::Char(')') {
            loop {
                args.push(self.parse_expression()?);

                if self.current == Token::Char(')') {
                    break;
                }
                self.expect_char(',', "Expected ')' or ',' in argument list")?;
            }
        }
        self.next_token();

        Ok(Expr::Call(name, args))
    }

    fn parse_if_expr(&mut self) -> ParseResult<Expr> {
        self.next_token();
        let cond = self.parse_expression()?;
        self.expect(Token::Then, "expected then")?;
        let cons = self.parse_expression()?;
        self.expect(Token::Else, "expected else")?;
        let alt = self.parse_expression()?;
        Ok(Expr::cond(cond, cons, alt))
    }

    fn parse_for_expr(&mut self) -> ParseResult<Expr> {
        self.next_token();
        let var = self.identifier("expected identifier after for")?;
        self.expect_char('=', "expected '=' after for")?;

        let start = self.parse_expression()?;
        self.expect_char(',', "expected ',' after for start value")?;
        let end = self.parse_expression()?;

        let step = if self.current == Token::Char(',') {
            self.next_token();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(Token::In, "expected 'in' after for")?;
        let body = self.parse_expression()?;

        Ok(Expr::for_loop(&var, start, end, step, body))
    }

    /// Precedence climbing: folds operators binding at least as tight as
    /// `min_precedence` onto `lhs`.
    pub fn parse_bin_op_rhs(&mut self, min_precedence: i32, mut lhs: Expr) -> ParseResult<Expr> {
        loop {
            let precedence = self.precedence.of(&self.current);
            if precedence < min_precedence {
                return Ok(lhs);
            }

            let op = match self.current {
                Token::Char(c) => c,
                _ => return Ok(lhs),
            };
            self.next_token();

            let mut rhs = self.parse_primary()?;

            let next_precedence = self.precedence.of(&self.current);
            if precedence < next_precedence {
                rhs = self.parse_bin_op_rhs(precedence + 1, rhs)?;
            }

            lhs = Expr::binop(op, lhs, rhs);
        }
    }

    pub fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = self.identifier("Expected function name in prototype")?;

        if self.current != Token::Char('(') {
            return Err(ParseError("Expected '(' in prototype"));
        }

        let mut params = Vec::new();
        while let Token::Identifier(param) = self.next_token() {
            if params.contains(param) {
                return Err(ParseError("Duplicate parameter name in prototype"));
            }
            params.push(param.clone());
        }
        self.expect_char(')', "Expected ')' in prototype")?;

        Ok(Prototype { name, params })
    }

    pub fn parse_definition(&mut self) -> ParseResult<FunDefinition> {
        self.next_token();
        let proto = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(FunDefinition::new(proto, body))
    }

    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.next_token();
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> ParseResult<FunDefinition> {
        let body = self.parse_expression()?;
        Ok(FunDefinition::new(Prototype::new(ANON_FN_NAME, vec![]), body))
    }
}
