//! SQL 파서 — sqlparser 토크나이저 위의 재귀 하강 파서
//!
//! The document dialect (`{a: 1}` literals, `a.b[0]` paths, `UNSET`,
//! `NEXT VALUE FOR`, `ON CONFLICT DO REPLACE`) is outside what sqlparser's
//! AST models, so only its tokenizer is used. Statements are parsed by hand
//! on top of the token stream.

mod expr;
mod statement;

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Word};

use crate::error::{DocqlError, DocqlResult};
use crate::sql::planner::{Expr, Statement};
use crate::value::path::is_reserved;
use crate::value::{Path, PathFragment};

/// SQL 파서 — sqlparser-rs 토크나이저 기반
pub struct SqlParser {
    dialect: GenericDialect,
}

impl SqlParser {
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Parses a script of `;`-separated statements.
    pub fn parse(&self, sql: &str) -> DocqlResult<Vec<Statement>> {
        let mut parser = Parser::new(&self.dialect, sql)?;
        parser.parse_script()
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_query(sql: &str) -> DocqlResult<Vec<Statement>> {
    SqlParser::new().parse(sql)
}

/// Parses exactly one statement.
pub fn parse_statement(sql: &str) -> DocqlResult<Statement> {
    let mut stmts = parse_query(sql)?;
    match stmts.len() {
        1 => Ok(stmts.remove(0)),
        n => Err(DocqlError::SqlParse {
            message: format!("expected one statement, found {n}"),
            sql: sql.to_string(),
        }),
    }
}

pub fn parse_expr(sql: &str) -> DocqlResult<Expr> {
    let mut parser = Parser::new(&GenericDialect {}, sql)?;
    let e = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(e)
}

pub fn parse_path(sql: &str) -> DocqlResult<Path> {
    let mut parser = Parser::new(&GenericDialect {}, sql)?;
    let p = parser.parse_path()?;
    parser.expect_end()?;
    Ok(p)
}

/// Token cursor shared by the expression and statement grammars.
pub(crate) struct Parser<'a> {
    sql: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Positional parameters seen so far in the script.
    positional: usize,
}

impl<'a> Parser<'a> {
    fn new(dialect: &GenericDialect, sql: &'a str) -> DocqlResult<Self> {
        let tokens = Tokenizer::new(dialect, sql)
            .tokenize()
            .map_err(|e| DocqlError::SqlParse {
                message: e.to_string(),
                sql: sql.to_string(),
            })?
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .collect();
        Ok(Parser {
            sql,
            tokens,
            pos: 0,
            positional: 0,
        })
    }

    fn parse_script(&mut self) -> DocqlResult<Vec<Statement>> {
        let mut stmts = Vec::new();
        loop {
            while self.consume(&Token::SemiColon) {}
            if self.at_end() {
                break;
            }
            stmts.push(self.parse_statement()?);
            if !self.consume(&Token::SemiColon) && !self.at_end() {
                return Err(self.unexpected("';' or end of input"));
            }
        }
        Ok(stmts)
    }

    // ════════════════════════════════════════
    // Cursor
    // ════════════════════════════════════════

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&Token::EOF)
    }

    fn next_token(&mut self) -> Token {
        let t = self.peek().clone();
        self.pos += 1;
        t
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn expect_end(&self) -> DocqlResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token: &Token) -> DocqlResult<()> {
        if self.consume(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{token}'")))
        }
    }

    fn error(&self, message: impl Into<String>) -> DocqlError {
        DocqlError::SqlParse {
            message: message.into(),
            sql: self.sql.to_string(),
        }
    }

    fn unexpected(&self, expected: &str) -> DocqlError {
        let found = match self.peek() {
            Token::EOF => "end of input".to_string(),
            t => format!("'{t}'"),
        };
        self.error(format!("expected {expected}, found {found}"))
    }

    // ════════════════════════════════════════
    // Keywords and identifiers
    // ════════════════════════════════════════

    fn keyword_at(&self, n: usize, kw: &str) -> bool {
        matches!(
            self.peek_nth(n),
            Token::Word(Word { value, quote_style: None, .. }) if value.eq_ignore_ascii_case(kw)
        )
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        self.keyword_at(0, kw)
    }

    fn parse_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the whole sequence or nothing.
    fn parse_keywords(&mut self, kws: &[&str]) -> bool {
        if kws.iter().enumerate().all(|(i, kw)| self.keyword_at(i, kw)) {
            self.pos += kws.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> DocqlResult<()> {
        if self.parse_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(kw))
        }
    }

    fn expect_keywords(&mut self, kws: &[&str]) -> DocqlResult<()> {
        for kw in kws {
            self.expect_keyword(kw)?;
        }
        Ok(())
    }

    /// Unquoted non-reserved word or backquoted name.
    fn parse_ident(&mut self) -> DocqlResult<String> {
        match self.peek() {
            Token::Word(Word {
                value,
                quote_style: Some('`'),
                ..
            }) => {
                let v = value.clone();
                self.pos += 1;
                Ok(v)
            }
            Token::Word(Word {
                value,
                quote_style: None,
                ..
            }) if !is_reserved(value) => {
                let v = value.clone();
                self.pos += 1;
                Ok(v)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `a.b[0].c`
    fn parse_path(&mut self) -> DocqlResult<Path> {
        let first = self.parse_ident()?;
        self.parse_path_rest(first)
    }

    fn parse_path_rest(&mut self, first: String) -> DocqlResult<Path> {
        let mut path = Path::field(first);
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Token::Period, Token::Word(w)) if w.quote_style != Some('"') => {
                    let name = w.value.clone();
                    self.pos += 2;
                    path.push(PathFragment::Field(name));
                }
                (Token::LBracket, Token::Number(n, _)) => {
                    let idx = n
                        .parse::<usize>()
                        .map_err(|_| self.error(format!("invalid array index {n}")))?;
                    self.pos += 2;
                    self.expect_token(&Token::RBracket)?;
                    path.push(PathFragment::Index(idx));
                }
                _ => return Ok(path),
            }
        }
    }

    fn parse_paths_in_parens(&mut self) -> DocqlResult<Vec<Path>> {
        self.expect_token(&Token::LParen)?;
        let mut paths = vec![self.parse_path()?];
        while self.consume(&Token::Comma) {
            paths.push(self.parse_path()?);
        }
        self.expect_token(&Token::RParen)?;
        Ok(paths)
    }

    fn parse_comma_separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> DocqlResult<T>,
    ) -> DocqlResult<Vec<T>> {
        let mut out = vec![f(self)?];
        while self.consume(&Token::Comma) {
            out.push(f(self)?);
        }
        Ok(out)
    }

    /// Signed integer literal, `i64::MIN` included.
    fn parse_signed_integer(&mut self) -> DocqlResult<i64> {
        let negative = match self.peek() {
            Token::Minus => {
                self.pos += 1;
                true
            }
            Token::Plus => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        match self.next_token() {
            Token::Number(n, _) => {
                let v: i128 = n
                    .parse()
                    .map_err(|_| self.error(format!("expected integer, found {n}")))?;
                let v = if negative { -v } else { v };
                i64::try_from(v).map_err(|_| self.error(format!("integer out of range: {v}")))
            }
            t => Err(self.error(format!("expected integer, found '{t}'"))),
        }
    }
}

/// Decodes the body of an `x'...'` literal.
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_accept_quoted_fragments() {
        let p = parse_path("a.`b c`[2]").unwrap();
        assert_eq!(p.to_string(), "a.`b c`[2]");
        assert!(parse_path("a.").is_err());
        assert!(parse_path("select").is_err());
    }

    #[test]
    fn positional_parameters_count_across_statements() {
        let stmts = SqlParser::new()
            .parse("SELECT ?; ; SELECT ? + ?")
            .unwrap();
        assert_eq!(stmts.len(), 2);
        let Statement::Select(select) = &stmts[1] else {
            panic!("expected SELECT");
        };
        let crate::sql::planner::Projected::Expr { expr, .. } = &select.projection[0] else {
            panic!("expected expression");
        };
        assert_eq!(
            expr,
            &Expr::binary(
                crate::sql::planner::BinaryOp::Add,
                Expr::Param(crate::sql::planner::ParamRef::Positional(2)),
                Expr::Param(crate::sql::planner::ParamRef::Positional(3)),
            )
        );
    }

    #[test]
    fn tokenizer_errors_are_parse_errors() {
        let err = parse_query("SELECT 'unterminated").unwrap_err();
        assert!(matches!(err, DocqlError::SqlParse { .. }));
        assert!(decode_hex("abc").is_none());
        assert_eq!(decode_hex("00ff"), Some(vec![0x00, 0xff]));
    }
}
