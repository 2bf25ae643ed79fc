//! Expression grammar: precedence climbing over [`BinaryOp::precedence`].

use sqlparser::tokenizer::{Token, Word};

use super::{Parser, decode_hex};
use crate::error::DocqlResult;
use crate::sql::planner::{BinaryOp, Expr, Function, ParamRef, UnaryOp};
use crate::value::path::is_reserved;
use crate::value::{Value, ValueType};

/// Infix operator found at the cursor.
enum Infix {
    Binary(BinaryOp),
    Between { negated: bool },
}

impl Infix {
    fn precedence(&self) -> u8 {
        match self {
            Infix::Binary(op) => op.precedence(),
            Infix::Between { .. } => BinaryOp::Lt.precedence(),
        }
    }
}

impl Parser<'_> {
    pub(crate) fn parse_expr(&mut self) -> DocqlResult<Expr> {
        self.parse_subexpr(0)
    }

    fn parse_subexpr(&mut self, min: u8) -> DocqlResult<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some((infix, width)) = self.peek_infix() {
            let prec = infix.precedence();
            if prec < min {
                break;
            }
            self.pos += width;
            left = match infix {
                Infix::Binary(op @ (BinaryOp::In | BinaryOp::NotIn)) => {
                    let right = self.parse_in_operand(prec + 1)?;
                    Expr::binary(op, left, right)
                }
                Infix::Binary(op) => {
                    let right = self.parse_subexpr(prec + 1)?;
                    Expr::binary(op, left, right)
                }
                Infix::Between { negated } => {
                    let low = self.parse_subexpr(prec + 1)?;
                    self.expect_keyword("AND")?;
                    let high = self.parse_subexpr(prec + 1)?;
                    Expr::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    }
                }
            };
        }
        Ok(left)
    }

    fn peek_infix(&self) -> Option<(Infix, usize)> {
        use BinaryOp::*;
        let op = match self.peek() {
            Token::Word(Word {
                value,
                quote_style: None,
                ..
            }) => {
                return match value.to_ascii_uppercase().as_str() {
                    "OR" => Some((Infix::Binary(Or), 1)),
                    "AND" => Some((Infix::Binary(And), 1)),
                    "IS" if self.keyword_at(1, "NOT") => Some((Infix::Binary(IsNot), 2)),
                    "IS" => Some((Infix::Binary(Is), 1)),
                    "IN" => Some((Infix::Binary(In), 1)),
                    "LIKE" => Some((Infix::Binary(Like), 1)),
                    "BETWEEN" => Some((Infix::Between { negated: false }, 1)),
                    "NOT" if self.keyword_at(1, "IN") => Some((Infix::Binary(NotIn), 2)),
                    "NOT" if self.keyword_at(1, "LIKE") => Some((Infix::Binary(NotLike), 2)),
                    "NOT" if self.keyword_at(1, "BETWEEN") => {
                        Some((Infix::Between { negated: true }, 2))
                    }
                    _ => None,
                };
            }
            Token::Eq | Token::DoubleEq => Eq,
            Token::Neq => Neq,
            Token::Lt => Lt,
            Token::LtEq => Lte,
            Token::Gt => Gt,
            Token::GtEq => Gte,
            Token::Pipe => BitOr,
            Token::Caret => BitXor,
            Token::Ampersand => BitAnd,
            Token::Plus => Add,
            Token::Minus => Sub,
            Token::Mul => Mul,
            Token::Div => Div,
            Token::Mod => Mod,
            Token::StringConcat => Concat,
            _ => return None,
        };
        Some((Infix::Binary(op), 1))
    }

    /// Right side of `IN`: a parenthesized list, or any operand yielding an
    /// array.
    fn parse_in_operand(&mut self, min: u8) -> DocqlResult<Expr> {
        if self.peek() != &Token::LParen {
            return self.parse_subexpr(min);
        }
        self.pos += 1;
        let items = self.parse_comma_separated(|p| p.parse_expr())?;
        self.expect_token(&Token::RParen)?;
        Ok(Expr::List(items))
    }

    pub(super) fn parse_prefix(&mut self) -> DocqlResult<Expr> {
        match self.next_token() {
            Token::Word(w) => self.parse_word(w),
            Token::Number(n, _) => self.parse_number(&n, false),
            Token::Minus => match self.peek().clone() {
                Token::Number(n, _) => {
                    self.pos += 1;
                    self.parse_number(&n, true)
                }
                _ => Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.parse_prefix()?),
                }),
            },
            Token::Plus => self.parse_prefix(),
            Token::SingleQuotedString(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::HexStringLiteral(h) => decode_hex(&h)
                .map(|b| Expr::Literal(Value::Blob(b)))
                .ok_or_else(|| self.error(format!("invalid blob literal x'{h}'"))),
            Token::Placeholder(p) => self.parse_placeholder(&p),
            Token::LParen => {
                let first = self.parse_expr()?;
                if self.consume(&Token::Comma) {
                    let mut items = vec![first];
                    items.extend(self.parse_comma_separated(|p| p.parse_expr())?);
                    self.expect_token(&Token::RParen)?;
                    return Ok(Expr::List(items));
                }
                self.expect_token(&Token::RParen)?;
                Ok(Expr::Paren(Box::new(first)))
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.consume(&Token::RBracket) {
                    items = self.parse_comma_separated(|p| p.parse_expr())?;
                    self.expect_token(&Token::RBracket)?;
                }
                Ok(Expr::Array(items))
            }
            Token::LBrace => self.parse_document(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn parse_word(&mut self, w: Word) -> DocqlResult<Expr> {
        match w.quote_style {
            Some('"') => return Ok(Expr::Literal(Value::Text(w.value))),
            Some(_) => return Ok(Expr::Path(self.parse_path_rest(w.value)?)),
            None => {}
        }
        let upper = w.value.to_ascii_uppercase();
        match upper.as_str() {
            "NOT" => Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(self.parse_subexpr(BinaryOp::Eq.precedence())?),
            }),
            "TRUE" => Ok(Expr::Literal(Value::Bool(true))),
            "FALSE" => Ok(Expr::Literal(Value::Bool(false))),
            "NULL" => Ok(Expr::Literal(Value::Null)),
            "CAST" => {
                self.expect_token(&Token::LParen)?;
                let e = self.parse_expr()?;
                self.expect_keyword("AS")?;
                let to = self.parse_type()?;
                self.expect_token(&Token::RParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(e),
                    to,
                })
            }
            "NEXT" => {
                self.expect_keywords(&["VALUE", "FOR"])?;
                Ok(Expr::NextValueFor(self.parse_ident()?))
            }
            _ if self.peek() == &Token::LParen => self.parse_function(&upper),
            _ if is_reserved(&w.value) => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
            _ => Ok(Expr::Path(self.parse_path_rest(w.value)?)),
        }
    }

    fn parse_number(&self, n: &str, negative: bool) -> DocqlResult<Expr> {
        let text = if negative {
            format!("-{n}")
        } else {
            n.to_string()
        };
        let is_float = n.contains(['.', 'e', 'E']);
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Expr::Literal(Value::Integer(i)));
            }
        }
        // integers past i64 become doubles
        text.parse::<f64>()
            .map(|d| Expr::Literal(Value::Double(d)))
            .map_err(|_| self.error(format!("invalid number {text}")))
    }

    fn parse_placeholder(&mut self, p: &str) -> DocqlResult<Expr> {
        let param = if let Some(rest) = p.strip_prefix('?') {
            if rest.is_empty() {
                self.positional += 1;
                ParamRef::Positional(self.positional)
            } else {
                ParamRef::Positional(
                    rest.parse()
                        .map_err(|_| self.error(format!("invalid parameter {p}")))?,
                )
            }
        } else if let Some(name) = p.strip_prefix('$') {
            ParamRef::Named(name.to_string())
        } else {
            return Err(self.error(format!("invalid parameter {p}")));
        };
        Ok(Expr::Param(param))
    }

    fn parse_document(&mut self) -> DocqlResult<Expr> {
        let mut fields: Vec<(String, Expr)> = Vec::new();
        if self.consume(&Token::RBrace) {
            return Ok(Expr::Document(fields));
        }
        loop {
            let name = match self.next_token() {
                Token::SingleQuotedString(s) => s,
                Token::Word(w) => w.value,
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("field name"));
                }
            };
            self.expect_token(&Token::Colon)?;
            let e = self.parse_expr()?;
            if fields.iter().any(|(n, _)| *n == name) {
                return Err(self.error(format!("duplicate field '{name}' in document")));
            }
            fields.push((name, e));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RBrace)?;
        Ok(Expr::Document(fields))
    }

    fn parse_function(&mut self, name: &str) -> DocqlResult<Expr> {
        self.expect_token(&Token::LParen)?;
        let func = match name {
            "PK" => Function::Pk,
            "COUNT" if self.consume(&Token::Mul) => Function::Count(None),
            "COUNT" => Function::Count(Some(Box::new(self.parse_expr()?))),
            "TYPEOF" => Function::TypeOf(Box::new(self.parse_expr()?)),
            "LEN" => Function::Len(Box::new(self.parse_expr()?)),
            "MIN" => Function::Min(Box::new(self.parse_expr()?)),
            "MAX" => Function::Max(Box::new(self.parse_expr()?)),
            "SUM" => Function::Sum(Box::new(self.parse_expr()?)),
            "AVG" => Function::Avg(Box::new(self.parse_expr()?)),
            _ => return Err(self.error(format!("unknown function {}", name.to_lowercase()))),
        };
        self.expect_token(&Token::RParen)?;
        Ok(Expr::Function(func))
    }

    /// Type name of a field definition or `CAST`.
    pub(crate) fn parse_type(&mut self) -> DocqlResult<ValueType> {
        let ty = self.peek_type().ok_or_else(|| self.unexpected("type name"))?;
        let word = self.peek().to_string().to_ascii_uppercase();
        self.pos += 1;
        match word.as_str() {
            "VARCHAR" | "CHARACTER" | "CHAR" if self.consume(&Token::LParen) => {
                match self.next_token() {
                    Token::Number(..) => {}
                    _ => return Err(self.error("expected length")),
                }
                self.expect_token(&Token::RParen)?;
            }
            "DOUBLE" => {
                self.parse_keyword("PRECISION");
            }
            _ => {}
        }
        Ok(ty)
    }

    pub(crate) fn peek_type(&self) -> Option<ValueType> {
        match self.peek() {
            Token::Word(Word {
                value,
                quote_style: None,
                ..
            }) => ValueType::from_sql_name(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sql::parser::parse_expr;
    use crate::sql::planner::{BinaryOp, Expr, Function, ParamRef};
    use crate::value::{Path, Value};

    fn p(s: &str) -> Expr {
        Expr::Path(Path::parse_simple(s).unwrap())
    }

    #[test]
    fn precedence_and_associativity() {
        let e = parse_expr("a + 1 * 2 > 3 AND NOT b OR c").unwrap();
        assert_eq!(e.to_string(), "a + 1 * 2 > 3 AND (NOT b) OR c");
        match e {
            Expr::Binary {
                op: BinaryOp::Or, ..
            } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parse_expr("1 - 2 - 3").unwrap().to_string(), "1 - 2 - 3");
        assert_eq!(parse_expr("(a + 1) * 2").unwrap().to_string(), "(a + 1) * 2");
    }

    #[test]
    fn literals() {
        assert_eq!(parse_expr("-9223372036854775808").unwrap(), Expr::literal(i64::MIN));
        assert_eq!(parse_expr("1.5").unwrap(), Expr::literal(1.5));
        assert_eq!(parse_expr("'it''s'").unwrap(), Expr::literal("it's"));
        assert_eq!(parse_expr("\"dq\"").unwrap(), Expr::literal("dq"));
        assert_eq!(
            parse_expr("x'ab01'").unwrap(),
            Expr::Literal(Value::Blob(vec![0xab, 0x01]))
        );
        assert_eq!(
            parse_expr("{a: 1, 'b c': [true, NULL]}").unwrap().to_string(),
            "{a: 1, `b c`: [true, NULL]}"
        );
    }

    #[test]
    fn paths_and_params() {
        assert_eq!(parse_expr("a.b[1].c").unwrap(), p("a.b[1].c"));
        assert_eq!(parse_expr("`weird name`").unwrap(), p("weird name"));
        assert_eq!(
            parse_expr("$name").unwrap(),
            Expr::Param(ParamRef::Named("name".into()))
        );
        let e = parse_expr("? + ?").unwrap();
        assert_eq!(
            e,
            Expr::binary(
                BinaryOp::Add,
                Expr::Param(ParamRef::Positional(1)),
                Expr::Param(ParamRef::Positional(2))
            )
        );
    }

    #[test]
    fn special_forms() {
        assert_eq!(
            parse_expr("a NOT IN (1, 2)").unwrap().to_string(),
            "a NOT IN (1, 2)"
        );
        assert_eq!(parse_expr("a IN (1)").unwrap().to_string(), "a IN (1)");
        assert_eq!(
            parse_expr("a BETWEEN 1 AND 2 AND b").unwrap().to_string(),
            "a BETWEEN 1 AND 2 AND b"
        );
        assert_eq!(parse_expr("a IS NOT NULL").unwrap().to_string(), "a IS NOT NULL");
        assert_eq!(
            parse_expr("CAST(a AS varchar(10))").unwrap().to_string(),
            "CAST(a AS TEXT)"
        );
        assert_eq!(
            parse_expr("COUNT(*)").unwrap(),
            Expr::Function(Function::Count(None))
        );
        assert_eq!(
            parse_expr("NEXT VALUE FOR seq").unwrap(),
            Expr::NextValueFor("seq".into())
        );
    }

    #[test]
    fn errors() {
        assert!(parse_expr("a +").is_err());
        assert!(parse_expr("foo(1)").is_err());
        assert!(parse_expr("SELECT").is_err());
        assert!(parse_expr("{a: 1, a: 2}").is_err());
    }
}
