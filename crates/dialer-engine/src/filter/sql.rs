//! Compile resolved filters into SQLite predicates over a JSON column
//!
//! Every field path is bound as a `$.path` parameter to `json_type` /
//! `json_extract`, so record data never reaches the SQL text. Each leaf is
//! wrapped in `COALESCE(.., 0)` to give SQL the same two-valued results as
//! [`super::eval::matches`].

use serde_json::Value;

use super::{Comparison, ResolvedFilter, ResolvedValue};

/// A bind parameter produced by the compiler, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Real(f64),
}

/// A compiled predicate ready to splice after `WHERE`
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl CompiledFilter {
    /// Bind every parameter onto a sqlx query, in order
    pub fn bind_all<'q>(
        &'q self,
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        for param in &self.params {
            query = match param {
                SqlParam::Text(s) => query.bind(s.as_str()),
                SqlParam::Real(r) => query.bind(*r),
            };
        }
        query
    }
}

/// Compile against the JSON column named `column`
pub fn compile(filter: &ResolvedFilter, column: &str) -> CompiledFilter {
    let mut compiler = Compiler { column, params: Vec::new() };
    let sql = compiler.expr(filter);
    CompiledFilter { sql, params: compiler.params }
}

struct Compiler<'a> {
    column: &'a str,
    params: Vec<SqlParam>,
}

impl Compiler<'_> {
    fn expr(&mut self, filter: &ResolvedFilter) -> String {
        match filter {
            ResolvedFilter::And(all) if all.is_empty() => "1".to_string(),
            ResolvedFilter::Or(any) if any.is_empty() => "0".to_string(),
            ResolvedFilter::And(all) => self.join(all, " AND "),
            ResolvedFilter::Or(any) => self.join(any, " OR "),
            ResolvedFilter::Not(inner) => format!("NOT ({})", self.expr(inner)),
            ResolvedFilter::Compare { field, cmp, value } => self.compare(field, *cmp, value),
            ResolvedFilter::In { values, .. } if values.is_empty() => "0".to_string(),
            ResolvedFilter::In { field, values } => {
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| self.compare(field, Comparison::Eq, v))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            ResolvedFilter::IsNull { field } => {
                let ty = self.json_type(field);
                format!("(COALESCE({}, 'null') = 'null')", ty)
            }
            ResolvedFilter::IsNotNull { field } => {
                let ty = self.json_type(field);
                format!("(COALESCE({}, 'null') != 'null')", ty)
            }
        }
    }

    fn join(&mut self, children: &[ResolvedFilter], sep: &str) -> String {
        let parts: Vec<String> = children.iter().map(|c| self.expr(c)).collect();
        format!("({})", parts.join(sep))
    }

    fn compare(&mut self, field: &str, cmp: Comparison, value: &ResolvedValue) -> String {
        let leaf = match value {
            ResolvedValue::Timestamp(ts) => {
                let extract = self.json_extract(field);
                self.params.push(SqlParam::Text(ts.to_rfc3339()));
                format!("julianday({}) {} julianday(?)", extract, operator(cmp))
            }
            ResolvedValue::Scalar(Value::String(s)) => {
                let ty = self.json_type(field);
                let extract = self.json_extract(field);
                if cmp == Comparison::Contains {
                    self.params.push(SqlParam::Text(format!("%{}%", escape_like(s))));
                    format!("{} = 'text' AND {} LIKE ? ESCAPE '\\'", ty, extract)
                } else {
                    self.params.push(SqlParam::Text(s.clone()));
                    format!("{} = 'text' AND {} {} ?", ty, extract, operator(cmp))
                }
            }
            ResolvedValue::Scalar(Value::Number(n)) => {
                let ty = self.json_type(field);
                let extract = self.json_extract(field);
                self.params.push(SqlParam::Real(n.as_f64().unwrap_or_default()));
                format!("{} IN ('integer', 'real') AND {} {} ?", ty, extract, operator(cmp))
            }
            ResolvedValue::Scalar(Value::Bool(b)) => {
                let wanted = SqlParam::Text(if *b { "true" } else { "false" }.to_string());
                let ty = self.json_type(field);
                if cmp == Comparison::Ne {
                    let ty_again = self.json_type(field);
                    self.params.push(wanted);
                    format!("{} IN ('true', 'false') AND {} != ?", ty, ty_again)
                } else {
                    self.params.push(wanted);
                    format!("{} = ?", ty)
                }
            }
            // Rejected by validation; compile to a predicate that never matches
            ResolvedValue::Scalar(_) => "0".to_string(),
        };
        format!("COALESCE(({}), 0)", leaf)
    }

    fn json_type(&mut self, field: &str) -> String {
        self.params.push(SqlParam::Text(json_path(field)));
        format!("json_type({}, ?)", self.column)
    }

    fn json_extract(&mut self, field: &str) -> String {
        self.params.push(SqlParam::Text(json_path(field)));
        format!("json_extract({}, ?)", self.column)
    }
}

fn json_path(field: &str) -> String {
    format!("$.{}", field)
}

fn operator(cmp: Comparison) -> &'static str {
    match cmp {
        Comparison::Eq => "=",
        Comparison::Ne => "!=",
        Comparison::Gt => ">",
        Comparison::Gte => ">=",
        Comparison::Lt => "<",
        Comparison::Lte => "<=",
        Comparison::Contains => "LIKE",
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
