//! Statement grammar.

use sqlparser::tokenizer::Token;

use super::Parser;
use crate::catalog::{FieldConstraint, IndexInfo, SequenceInfo, TableConstraint, TableInfo};
use crate::error::DocqlResult;
use crate::sql::planner::{
    AlterTable, CompoundOp, DeleteStmt, Expr, Function, InsertSource, InsertStmt, OnConflict, OrderBy,
    Projected, SelectStmt, Statement, UpdateAction, UpdateStmt,
};
use crate::value::ValueType;

impl Parser<'_> {
    pub(crate) fn parse_statement(&mut self) -> DocqlResult<Statement> {
        if self.parse_keyword("SELECT") {
            return Ok(Statement::Select(self.parse_select()?));
        }
        if self.parse_keyword("INSERT") {
            return self.parse_insert();
        }
        if self.parse_keyword("UPDATE") {
            return self.parse_update();
        }
        if self.parse_keywords(&["DELETE", "FROM"]) {
            let table = self.parse_ident()?;
            let where_clause = self.parse_where()?;
            return Ok(Statement::Delete(DeleteStmt {
                table,
                where_clause,
            }));
        }
        if self.parse_keyword("CREATE") {
            return self.parse_create();
        }
        if self.parse_keyword("DROP") {
            return self.parse_drop();
        }
        if self.parse_keywords(&["ALTER", "TABLE"]) {
            return self.parse_alter();
        }
        if self.parse_keyword("REINDEX") {
            let target = if self.at_end() || self.peek() == &Token::SemiColon {
                None
            } else {
                Some(self.parse_ident()?)
            };
            return Ok(Statement::Reindex(target));
        }
        if self.parse_keyword("BEGIN") {
            self.parse_keyword("TRANSACTION");
            let writable = if self.parse_keywords(&["READ", "ONLY"]) {
                false
            } else {
                self.parse_keywords(&["READ", "WRITE"]);
                true
            };
            return Ok(Statement::Begin { writable });
        }
        if self.parse_keyword("COMMIT") {
            self.parse_keyword("TRANSACTION");
            return Ok(Statement::Commit);
        }
        if self.parse_keyword("ROLLBACK") {
            self.parse_keyword("TRANSACTION");
            return Ok(Statement::Rollback);
        }
        if self.parse_keyword("EXPLAIN") {
            let inner = self.parse_statement()?;
            return match inner {
                Statement::Select(_)
                | Statement::Insert(_)
                | Statement::Update(_)
                | Statement::Delete(_) => Ok(Statement::Explain(Box::new(inner))),
                _ => Err(self.error("EXPLAIN only accepts SELECT, INSERT, UPDATE or DELETE")),
            };
        }
        Err(self.unexpected("statement"))
    }

    fn parse_where(&mut self) -> DocqlResult<Option<Expr>> {
        if self.parse_keyword("WHERE") {
            Ok(Some(self.parse_expr()?))
        } else {
            Ok(None)
        }
    }

    fn parse_projected(&mut self) -> DocqlResult<Projected> {
        if self.consume(&Token::Mul) {
            return Ok(Projected::Wildcard);
        }
        let expr = self.parse_expr()?;
        let alias = if self.parse_keyword("AS") {
            Some(self.parse_ident()?)
        } else {
            None
        };
        Ok(Projected::Expr { expr, alias })
    }

    // ════════════════════════════════════════
    // DML
    // ════════════════════════════════════════

    /// `core [UNION [ALL] core]... [ORDER BY] [LIMIT] [OFFSET]`
    fn parse_select(&mut self) -> DocqlResult<SelectStmt> {
        let mut select = self.parse_select_core()?;
        while self.parse_keyword("UNION") {
            let op = if self.parse_keyword("ALL") {
                CompoundOp::UnionAll
            } else {
                CompoundOp::Union
            };
            self.expect_keyword("SELECT")?;
            let core = self.parse_select_core()?;
            select.compound.push((op, core));
        }

        select.order_by = if self.parse_keywords(&["ORDER", "BY"]) {
            let expr = self.parse_expr()?;
            let desc = if self.parse_keyword("DESC") {
                true
            } else {
                self.parse_keyword("ASC");
                false
            };
            Some(OrderBy { expr, desc })
        } else {
            None
        };
        select.limit = if self.parse_keyword("LIMIT") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        select.offset = if self.parse_keyword("OFFSET") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if self.peek_keyword("UNION") {
            return Err(self.error("UNION must come before ORDER BY, LIMIT and OFFSET"));
        }
        Ok(select)
    }

    fn parse_select_core(&mut self) -> DocqlResult<SelectStmt> {
        let distinct = self.parse_keyword("DISTINCT");
        let projection = self.parse_comma_separated(|p| p.parse_projected())?;
        let from = if self.parse_keyword("FROM") {
            Some(self.parse_ident()?)
        } else {
            None
        };
        let where_clause = self.parse_where()?;
        let group_by = if self.parse_keywords(&["GROUP", "BY"]) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        if from.is_none() && projection.contains(&Projected::Wildcard) {
            return Err(self.error("no table specified"));
        }
        Ok(SelectStmt {
            distinct,
            projection,
            from,
            where_clause,
            group_by,
            ..SelectStmt::default()
        })
    }

    fn parse_insert(&mut self) -> DocqlResult<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.parse_ident()?;
        let mut fields = Vec::new();
        if self.consume(&Token::LParen) {
            fields = self.parse_comma_separated(|p| p.parse_ident())?;
            self.expect_token(&Token::RParen)?;
        }

        let source = if self.parse_keyword("VALUES") {
            let values = self.parse_comma_separated(|p| p.parse_insert_value(&fields))?;
            InsertSource::Values(values)
        } else if self.parse_keyword("SELECT") {
            InsertSource::Select(Box::new(self.parse_select()?))
        } else {
            return Err(self.unexpected("VALUES or SELECT"));
        };

        let on_conflict = if self.parse_keywords(&["ON", "CONFLICT", "DO"]) {
            if self.parse_keyword("NOTHING") {
                Some(OnConflict::DoNothing)
            } else if self.parse_keyword("REPLACE") {
                Some(OnConflict::DoReplace)
            } else {
                return Err(self.unexpected("NOTHING or REPLACE"));
            }
        } else {
            None
        };

        let returning = if self.parse_keyword("RETURNING") {
            self.parse_comma_separated(|p| p.parse_projected())?
        } else {
            Vec::new()
        };

        Ok(Statement::Insert(InsertStmt {
            table,
            fields,
            source,
            on_conflict,
            returning,
        }))
    }

    /// One `VALUES` item; tuples are zipped with the field list into a
    /// document.
    fn parse_insert_value(&mut self, fields: &[String]) -> DocqlResult<Expr> {
        let e = self.parse_expr()?;
        let items = match e {
            Expr::List(items) => items,
            Expr::Paren(inner) => vec![*inner],
            other if fields.is_empty() => return Ok(other),
            _ => return Err(self.error("expected a list of values after a field list")),
        };
        if fields.is_empty() {
            return Err(self.error("fields must be specified for a list of values"));
        }
        if items.len() != fields.len() {
            return Err(self.error(format!(
                "{} values for {} fields",
                items.len(),
                fields.len()
            )));
        }
        Ok(Expr::Document(fields.iter().cloned().zip(items).collect()))
    }

    fn parse_update(&mut self) -> DocqlResult<Statement> {
        let table = self.parse_ident()?;
        let action = if self.parse_keyword("SET") {
            UpdateAction::Set(self.parse_comma_separated(|p| {
                let path = p.parse_path()?;
                p.expect_token(&Token::Eq)?;
                Ok((path, p.parse_expr()?))
            })?)
        } else if self.parse_keyword("UNSET") {
            UpdateAction::Unset(self.parse_comma_separated(|p| p.parse_path())?)
        } else {
            return Err(self.unexpected("SET or UNSET"));
        };
        let where_clause = self.parse_where()?;
        Ok(Statement::Update(UpdateStmt {
            table,
            action,
            where_clause,
        }))
    }

    // ════════════════════════════════════════
    // DDL
    // ════════════════════════════════════════

    fn parse_if_not_exists(&mut self) -> bool {
        self.parse_keywords(&["IF", "NOT", "EXISTS"])
    }

    fn parse_create(&mut self) -> DocqlResult<Statement> {
        if self.parse_keyword("TABLE") {
            return self.parse_create_table();
        }
        if self.parse_keywords(&["UNIQUE", "INDEX"]) {
            return self.parse_create_index(true);
        }
        if self.parse_keyword("INDEX") {
            return self.parse_create_index(false);
        }
        if self.parse_keyword("SEQUENCE") {
            return self.parse_create_sequence();
        }
        Err(self.unexpected("TABLE, INDEX or SEQUENCE"))
    }

    fn parse_create_table(&mut self) -> DocqlResult<Statement> {
        let if_not_exists = self.parse_if_not_exists();
        let mut info = TableInfo::new(self.parse_ident()?);
        if self.consume(&Token::LParen) {
            let mut constraints = Vec::new();
            loop {
                if let Some(c) = self.parse_table_constraint()? {
                    constraints.push(c);
                } else {
                    let (field, field_constraints) = self.parse_field_definition()?;
                    info.add_field(field)?;
                    constraints.extend(field_constraints);
                }
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen)?;
            for c in constraints {
                info.apply_constraint(c)?;
            }
        }
        Ok(Statement::CreateTable {
            info,
            if_not_exists,
        })
    }

    fn parse_table_constraint(&mut self) -> DocqlResult<Option<TableConstraint>> {
        if self.parse_keywords(&["PRIMARY", "KEY"]) {
            return Ok(Some(TableConstraint::PrimaryKey(self.parse_paths_in_parens()?)));
        }
        if self.parse_keyword("UNIQUE") {
            return Ok(Some(TableConstraint::Unique(self.parse_paths_in_parens()?)));
        }
        if self.parse_keyword("CHECK") {
            return Ok(Some(TableConstraint::Check(self.parse_check()?)));
        }
        Ok(None)
    }

    fn parse_check(&mut self) -> DocqlResult<Expr> {
        self.expect_token(&Token::LParen)?;
        let e = self.parse_expr()?;
        self.expect_token(&Token::RParen)?;
        Ok(e)
    }

    /// `path [TYPE] [PRIMARY KEY | NOT NULL | DEFAULT e | UNIQUE | CHECK (e)]*`
    pub(crate) fn parse_field_definition(
        &mut self,
    ) -> DocqlResult<(FieldConstraint, Vec<TableConstraint>)> {
        let path = self.parse_path()?;
        let mut field = FieldConstraint::new(path.clone());
        if self.peek_type().is_some() {
            field.ty = Some(self.parse_type()?);
        }
        let mut constraints = Vec::new();
        loop {
            if self.parse_keywords(&["PRIMARY", "KEY"]) {
                constraints.push(TableConstraint::PrimaryKey(vec![path.clone()]));
            } else if self.parse_keywords(&["NOT", "NULL"]) {
                field.not_null = true;
            } else if self.parse_keyword("DEFAULT") {
                if field.default.is_some() {
                    return Err(self.error(format!("multiple defaults for field {path}")));
                }
                field.default = Some(self.parse_default()?);
            } else if self.parse_keyword("UNIQUE") {
                constraints.push(TableConstraint::Unique(vec![path.clone()]));
            } else if self.parse_keyword("CHECK") {
                constraints.push(TableConstraint::Check(self.parse_check()?));
            } else {
                break;
            }
        }
        Ok((field, constraints))
    }

    /// `DEFAULT` takes a literal, a signed number or a parenthesized
    /// expression that reads nothing from the row.
    fn parse_default(&mut self) -> DocqlResult<Expr> {
        let e = match self.peek() {
            Token::LParen => {
                self.pos += 1;
                let e = self.parse_expr()?;
                self.expect_token(&Token::RParen)?;
                e
            }
            _ => self.parse_prefix()?,
        };
        let reads_row = e.any(&|e| {
            matches!(e, Expr::Path(_) | Expr::Param(_))
                || matches!(e, Expr::Function(f) if f.is_aggregate() || *f == Function::Pk)
        });
        if reads_row {
            return Err(self.error(format!("DEFAULT must be a constant expression: {e}")));
        }
        Ok(e.unwrap_paren().clone())
    }

    fn parse_create_index(&mut self, unique: bool) -> DocqlResult<Statement> {
        let if_not_exists = self.parse_if_not_exists();
        let name = if self.peek_keyword("ON") {
            String::new()
        } else {
            self.parse_ident()?
        };
        self.expect_keyword("ON")?;
        let table_name = self.parse_ident()?;
        let paths = self.parse_paths_in_parens()?;
        Ok(Statement::CreateIndex {
            info: IndexInfo {
                name,
                table_name,
                paths,
                unique,
                ..IndexInfo::default()
            },
            if_not_exists,
        })
    }

    fn parse_create_sequence(&mut self) -> DocqlResult<Statement> {
        let if_not_exists = self.parse_if_not_exists();
        let name = self.parse_ident()?;

        let mut increment = None;
        let mut min: Option<Option<i64>> = None;
        let mut max: Option<Option<i64>> = None;
        let mut start = None;
        let mut cache = None;
        let mut cycle = None;
        let mut typed = false;

        loop {
            let redundant = if self.parse_keyword("AS") {
                let ty = self.parse_type()?;
                if ty != ValueType::Integer {
                    return Err(self.error("sequences are integers"));
                }
                std::mem::replace(&mut typed, true)
            } else if self.parse_keyword("INCREMENT") {
                self.parse_keyword("BY");
                increment.replace(self.parse_signed_integer()?).is_some()
            } else if self.parse_keywords(&["NO", "MINVALUE"]) {
                min.replace(None).is_some()
            } else if self.parse_keywords(&["NO", "MAXVALUE"]) {
                max.replace(None).is_some()
            } else if self.parse_keywords(&["NO", "CYCLE"]) {
                cycle.replace(false).is_some()
            } else if self.parse_keyword("MINVALUE") {
                min.replace(Some(self.parse_signed_integer()?)).is_some()
            } else if self.parse_keyword("MAXVALUE") {
                max.replace(Some(self.parse_signed_integer()?)).is_some()
            } else if self.parse_keyword("START") {
                self.parse_keyword("WITH");
                start.replace(self.parse_signed_integer()?).is_some()
            } else if self.parse_keyword("CACHE") {
                let n = self.parse_signed_integer()?;
                if n < 1 {
                    return Err(self.error(format!("CACHE ({n}) must be greater than zero")));
                }
                cache.replace(n as u64).is_some()
            } else if self.parse_keyword("CYCLE") {
                cycle.replace(true).is_some()
            } else {
                break;
            };
            if redundant {
                return Err(self.error("conflicting or redundant options"));
            }
        }

        let mut info = SequenceInfo::with_defaults(
            name,
            increment.unwrap_or(1),
            min.flatten(),
            max.flatten(),
            start,
        )?;
        info.cache = cache.unwrap_or(1);
        info.cycle = cycle.unwrap_or(false);
        Ok(Statement::CreateSequence {
            info,
            if_not_exists,
        })
    }

    fn parse_drop(&mut self) -> DocqlResult<Statement> {
        let kind = if self.parse_keyword("TABLE") {
            0
        } else if self.parse_keyword("INDEX") {
            1
        } else if self.parse_keyword("SEQUENCE") {
            2
        } else {
            return Err(self.unexpected("TABLE, INDEX or SEQUENCE"));
        };
        let if_exists = self.parse_keywords(&["IF", "EXISTS"]);
        let name = self.parse_ident()?;
        Ok(match kind {
            0 => Statement::DropTable { name, if_exists },
            1 => Statement::DropIndex { name, if_exists },
            _ => Statement::DropSequence { name, if_exists },
        })
    }

    fn parse_alter(&mut self) -> DocqlResult<Statement> {
        let table = self.parse_ident()?;
        let action = if self.parse_keywords(&["RENAME", "TO"]) {
            AlterTable::RenameTo(self.parse_ident()?)
        } else if self.parse_keyword("ADD") {
            if !self.parse_keyword("FIELD") {
                self.parse_keyword("COLUMN");
            }
            let (field, constraints) = self.parse_field_definition()?;
            AlterTable::AddField { field, constraints }
        } else {
            return Err(self.unexpected("RENAME TO or ADD FIELD"));
        };
        Ok(Statement::AlterTable { table, action })
    }
}
