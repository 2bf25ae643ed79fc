//! Rule 4: Index Selection
//!
//! Replaces a leading `seqScan` by a `pkScan` or `indexScan` when filters
//! right after it compare indexed paths with constants. Absorbed filters
//! are removed; the others stay in place.
//!
//! Candidates are the primary key followed by the table's indexes in
//! creation order. The winner absorbs the most filters, then has the
//! lowest cost:
//!
//! | 항목 | cost |
//! |------|------|
//! | exact ranges | +1 |
//! | two bounds | +50 |
//! | one bound | +100 |
//! | secondary index | +20 |
//! | unique index | -10 |
//! | per absorbed filter | -1 |

use std::cmp::Ordering;

use tracing::debug;

use crate::error::DocqlResult;
use crate::sql::planner::{BinaryOp, Expr, Range, Stream, StreamOp};
use crate::value::{Path, Value};

use super::{OptimizationRule, OptimizerContext};

pub struct IndexSelectionRule;

impl OptimizationRule for IndexSelectionRule {
    fn name(&self) -> &str {
        "IndexSelection"
    }

    fn apply(&self, mut stream: Stream, ctx: &OptimizerContext<'_>) -> DocqlResult<Stream> {
        let table = match stream.ops.first() {
            Some(StreamOp::SeqScan {
                table,
                reverse: false,
            }) => table.clone(),
            _ => return Ok(stream),
        };
        let info = ctx.catalog.get_table(&table)?;

        let terms: Vec<Term> = stream
            .ops
            .iter()
            .enumerate()
            .skip(1)
            .take_while(|(_, op)| matches!(op, StreamOp::Filter(_)))
            .filter_map(|(pos, op)| match op {
                StreamOp::Filter(e) => Term::from_filter(pos, e),
                _ => None,
            })
            .collect();
        if terms.is_empty() {
            return Ok(stream);
        }

        let mut best: Option<Candidate> = None;
        let mut consider = |c: Option<Candidate>| {
            let Some(c) = c else { return };
            let better = match &best {
                None => true,
                Some(b) => c.rank(b) == Ordering::Less,
            };
            if better {
                best = Some(c);
            }
        };
        if let Some(pk) = &info.primary_key {
            consider(Candidate::build(
                Target::Pk(table.clone()),
                pk,
                &terms,
                false,
            ));
        }
        for idx in ctx.catalog.table_indexes(&table) {
            consider(Candidate::build(
                Target::Index(idx.name.clone()),
                &idx.paths,
                &terms,
                idx.unique,
            ));
        }

        let Some(best) = best else {
            return Ok(stream);
        };
        debug!(cost = best.cost, absorbed = best.absorbed.len(), "index selected");
        let scan = match best.target {
            Target::Pk(table) => StreamOp::PkScan {
                table,
                ranges: best.ranges,
                reverse: false,
            },
            Target::Index(index) => StreamOp::IndexScan {
                index,
                ranges: best.ranges,
                reverse: false,
            },
        };
        stream.ops[0] = scan;
        let ops = std::mem::take(&mut stream.ops);
        stream.ops = ops
            .into_iter()
            .enumerate()
            .filter(|(pos, _)| !best.absorbed.contains(pos))
            .map(|(_, op)| op)
            .collect();
        Ok(stream)
    }
}

/// Search argument of one filter.
#[derive(Debug, Clone)]
enum Sarg {
    Eq(Value),
    In(Vec<Value>),
    Lower { value: Value, exclusive: bool },
    Upper { value: Value, exclusive: bool },
    Between(Value, Value),
}

#[derive(Debug, Clone)]
struct Term {
    pos: usize,
    path: Path,
    sarg: Sarg,
}

fn constant(e: &Expr) -> Option<&Value> {
    match e.unwrap_paren() {
        Expr::Literal(v) if !v.is_null() => Some(v),
        _ => None,
    }
}

impl Term {
    fn from_filter(pos: usize, e: &Expr) -> Option<Term> {
        match e.unwrap_paren() {
            Expr::Binary { op, left, right } => {
                let (path, op, v) = match (left.unwrap_paren(), constant(right)) {
                    (Expr::Path(p), Some(v)) => (p, *op, v),
                    _ => match (constant(left), right.unwrap_paren()) {
                        (Some(v), Expr::Path(p)) if *op != BinaryOp::In => (p, op.flip(), v),
                        _ => return None,
                    },
                };
                let sarg = match (op, v) {
                    (BinaryOp::Eq, v) => Sarg::Eq(v.clone()),
                    (BinaryOp::Gt, v) => Sarg::Lower {
                        value: v.clone(),
                        exclusive: true,
                    },
                    (BinaryOp::Gte, v) => Sarg::Lower {
                        value: v.clone(),
                        exclusive: false,
                    },
                    (BinaryOp::Lt, v) => Sarg::Upper {
                        value: v.clone(),
                        exclusive: true,
                    },
                    (BinaryOp::Lte, v) => Sarg::Upper {
                        value: v.clone(),
                        exclusive: false,
                    },
                    (BinaryOp::In, Value::Array(items)) => {
                        let items: Vec<Value> = items.iter().filter(|v| !v.is_null()).cloned().collect();
                        if items.is_empty() {
                            return None;
                        }
                        Sarg::In(items)
                    }
                    _ => return None,
                };
                Some(Term {
                    pos,
                    path: path.clone(),
                    sarg,
                })
            }
            Expr::Between {
                expr,
                low,
                high,
                negated: false,
            } => match (expr.unwrap_paren(), constant(low), constant(high)) {
                (Expr::Path(p), Some(lo), Some(hi)) => Some(Term {
                    pos,
                    path: p.clone(),
                    sarg: Sarg::Between(lo.clone(), hi.clone()),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

enum Target {
    Pk(String),
    Index(String),
}

struct Candidate {
    target: Target,
    ranges: Vec<Range>,
    absorbed: Vec<usize>,
    cost: i64,
}

impl Candidate {
    /// Builds the ranges `paths` can serve: equalities on a prefix, then
    /// at most one bounded component.
    fn build(target: Target, paths: &[Path], terms: &[Term], unique: bool) -> Option<Candidate> {
        let mut prefixes: Vec<Vec<Value>> = vec![Vec::new()];
        let mut absorbed = Vec::new();
        let mut bounds: (Option<Value>, Option<Value>, bool) = (None, None, false);

        for path in paths {
            let on_path = || terms.iter().filter(move |t| t.path == *path);
            if let Some(t) = on_path().find(|t| matches!(t.sarg, Sarg::Eq(_) | Sarg::In(_))) {
                prefixes = match &t.sarg {
                    Sarg::Eq(v) => prefixes
                        .into_iter()
                        .map(|mut p| {
                            p.push(v.clone());
                            p
                        })
                        .collect(),
                    Sarg::In(values) => prefixes
                        .iter()
                        .flat_map(|p| {
                            values.iter().map(move |v| {
                                let mut p = p.clone();
                                p.push(v.clone());
                                p
                            })
                        })
                        .collect(),
                    _ => prefixes,
                };
                absorbed.push(t.pos);
                continue;
            }

            let between = on_path().find(|t| matches!(t.sarg, Sarg::Between(..)));
            let lower = on_path().find(|t| matches!(t.sarg, Sarg::Lower { .. }));
            let upper = on_path().find(|t| matches!(t.sarg, Sarg::Upper { .. }));
            let first_pos = [lower, upper].into_iter().flatten().map(|t| t.pos).min();
            match between {
                Some(Term {
                    pos,
                    sarg: Sarg::Between(lo, hi),
                    ..
                }) if first_pos.is_none_or(|p| *pos < p) => {
                    bounds = (Some(lo.clone()), Some(hi.clone()), false);
                    absorbed.push(*pos);
                }
                _ => match (lower, upper) {
                    (
                        Some(Term {
                            pos: lp,
                            sarg: Sarg::Lower { value: lo, exclusive: lx },
                            ..
                        }),
                        Some(Term {
                            pos: up,
                            sarg: Sarg::Upper { value: hi, exclusive: ux },
                            ..
                        }),
                    ) => {
                        // one exclusivity flag covers both bounds
                        if lx == ux {
                            bounds = (Some(lo.clone()), Some(hi.clone()), *lx);
                            absorbed.extend([*lp, *up]);
                        } else if lp < up {
                            bounds = (Some(lo.clone()), None, *lx);
                            absorbed.push(*lp);
                        } else {
                            bounds = (None, Some(hi.clone()), *ux);
                            absorbed.push(*up);
                        }
                    }
                    (
                        Some(Term {
                            pos,
                            sarg: Sarg::Lower { value, exclusive },
                            ..
                        }),
                        None,
                    ) => {
                        bounds = (Some(value.clone()), None, *exclusive);
                        absorbed.push(*pos);
                    }
                    (
                        None,
                        Some(Term {
                            pos,
                            sarg: Sarg::Upper { value, exclusive },
                            ..
                        }),
                    ) => {
                        bounds = (None, Some(value.clone()), *exclusive);
                        absorbed.push(*pos);
                    }
                    _ => {}
                },
            }
            break;
        }

        if absorbed.is_empty() {
            return None;
        }
        let (min, max, exclusive) = bounds;
        let mut ranges: Vec<Range> = prefixes
            .into_iter()
            .map(|eq| Range {
                eq,
                min: min.clone(),
                max: max.clone(),
                exclusive,
            })
            .collect();
        ranges.sort_by_key(|r| r.seek_pivot(false));
        ranges.dedup_by(|a, b| {
            a.eq.len() == b.eq.len() && a.eq.iter().zip(&b.eq).all(|(x, y)| x.sql_eq(y) == Some(true))
        });

        let mut cost: i64 = match (&min, &max) {
            (None, None) => 1,
            (Some(_), Some(_)) => 50,
            _ => 100,
        };
        if matches!(target, Target::Index(_)) {
            cost += 20;
            if unique {
                cost -= 10;
            }
        }
        cost -= absorbed.len() as i64;

        Some(Candidate {
            target,
            ranges,
            absorbed,
            cost,
        })
    }

    /// `Less` when `self` is the better plan.
    fn rank(&self, other: &Candidate) -> Ordering {
        other
            .absorbed
            .len()
            .cmp(&self.absorbed.len())
            .then(self.cost.cmp(&other.cost))
    }
}
