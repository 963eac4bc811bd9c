// ABOUTME: T-SQL statement builders for table helpers
// ABOUTME: Quotes identifiers, binds values as @P parameters and turns predicates into WHERE clauses

use std::str::FromStr;

use super::SqlServerError;
use crate::models::{is_at_least, ColumnDef, Value};

/// Filtered reads and deletes take at most this many predicates
pub const MAX_PREDICATES: usize = 2;

/// SQL Server accepts 2100 parameters per request; stay below it
const MAX_PARAMS_PER_STATEMENT: usize = 2000;
/// Row constructor limit of a single `INSERT ... VALUES`
const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Comparison applied to numeric and datetime columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericCriteria {
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Between,
}

impl NumericCriteria {
    pub fn operator(&self) -> &'static str {
        match self {
            NumericCriteria::LessThan => "<",
            NumericCriteria::GreaterThan => ">",
            NumericCriteria::LessThanOrEqual => "<=",
            NumericCriteria::GreaterThanOrEqual => ">=",
            NumericCriteria::Between => "BETWEEN",
        }
    }
}

impl FromStr for NumericCriteria {
    type Err = SqlServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" | "<" => Ok(NumericCriteria::LessThan),
            "gt" | ">" => Ok(NumericCriteria::GreaterThan),
            "le" | "<=" => Ok(NumericCriteria::LessThanOrEqual),
            "ge" | ">=" => Ok(NumericCriteria::GreaterThanOrEqual),
            "between" => Ok(NumericCriteria::Between),
            other => Err(invalid("criteria", format!("unknown numeric criteria '{}'", other))),
        }
    }
}

/// Pattern match applied to text columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCriteria {
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl TextCriteria {
    /// LIKE pattern for `keyword`, with wildcards inside the keyword escaped
    pub fn pattern(&self, keyword: &str) -> String {
        let escaped = escape_like(keyword);
        match self {
            TextCriteria::Contains | TextCriteria::NotContains => format!("%{}%", escaped),
            TextCriteria::StartsWith => format!("{}%", escaped),
            TextCriteria::EndsWith => format!("%{}", escaped),
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            TextCriteria::NotContains => "NOT LIKE",
            _ => "LIKE",
        }
    }
}

impl FromStr for TextCriteria {
    type Err = SqlServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(TextCriteria::Contains),
            "not-contains" => Ok(TextCriteria::NotContains),
            "starts-with" => Ok(TextCriteria::StartsWith),
            "ends-with" => Ok(TextCriteria::EndsWith),
            other => Err(invalid("criteria", format!("unknown text criteria '{}'", other))),
        }
    }
}

/// A single filter on one column
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Numeric {
        column: String,
        criteria: NumericCriteria,
        low: Value,
        /// Only read for `Between`
        high: Option<Value>,
    },
    Text {
        column: String,
        criteria: TextCriteria,
        keyword: String,
    },
}

impl Predicate {
    pub fn numeric(column: impl Into<String>, criteria: NumericCriteria, value: impl Into<Value>) -> Self {
        Predicate::Numeric {
            column: column.into(),
            criteria,
            low: value.into(),
            high: None,
        }
    }

    pub fn between(column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Predicate::Numeric {
            column: column.into(),
            criteria: NumericCriteria::Between,
            low: low.into(),
            high: Some(high.into()),
        }
    }

    pub fn text(column: impl Into<String>, criteria: TextCriteria, keyword: impl Into<String>) -> Self {
        Predicate::Text {
            column: column.into(),
            criteria,
            keyword: keyword.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Numeric { column, .. } | Predicate::Text { column, .. } => column,
        }
    }

    /// True when the predicate compares against datetime bounds
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Predicate::Numeric {
                low: Value::DateTime(_),
                ..
            }
        )
    }
}

/// SQL text plus the values bound to its `@P1..@Pn` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    /// Bind a value and return its placeholder
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("@P{}", self.params.len())
    }

    fn push_where(&mut self, predicates: &[Predicate]) -> Result<(), SqlServerError> {
        if predicates.len() > MAX_PREDICATES {
            return Err(SqlServerError::TooManyPredicates(predicates.len()));
        }

        let mut clauses = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            clauses.push(self.predicate_clause(predicate)?);
        }

        if !clauses.is_empty() {
            self.sql.push_str(" WHERE ");
            self.sql.push_str(&clauses.join(" AND "));
        }
        Ok(())
    }

    fn predicate_clause(&mut self, predicate: &Predicate) -> Result<String, SqlServerError> {
        match predicate {
            Predicate::Numeric {
                column,
                criteria,
                low,
                high,
            } => {
                let column = quote_checked("column", column)?;
                check_bound(low)?;

                if *criteria == NumericCriteria::Between {
                    let high = high
                        .as_ref()
                        .ok_or_else(|| invalid("high", "BETWEEN needs an upper bound"))?;
                    check_bound(high)?;
                    if !is_at_least(high, low) {
                        return Err(invalid(
                            "high",
                            format!("upper bound {} is below lower bound {}", high, low),
                        ));
                    }
                    let p_low = self.bind(low.clone());
                    let p_high = self.bind(high.clone());
                    return Ok(format!("{} BETWEEN {} AND {}", column, p_low, p_high));
                }

                let p = self.bind(low.clone());
                Ok(format!("{} {} {}", column, criteria.operator(), p))
            }
            Predicate::Text {
                column,
                criteria,
                keyword,
            } => {
                let column = quote_checked("column", column)?;
                if keyword.is_empty() {
                    return Err(invalid("keyword", "cannot be empty"));
                }
                let p = self.bind(Value::Text(criteria.pattern(keyword)));
                Ok(format!("{} {} {}", column, criteria.operator(), p))
            }
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> SqlServerError {
    SqlServerError::InvalidArgument {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn check_bound(value: &Value) -> Result<(), SqlServerError> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::DateTime(_) => Ok(()),
        other => Err(invalid(
            "bound",
            format!("{:?} cannot be compared numerically", other),
        )),
    }
}

/// Reject empty names, otherwise quote them
pub(crate) fn quote_checked(name: &str, ident: &str) -> Result<String, SqlServerError> {
    if ident.is_empty() {
        return Err(invalid(name, "cannot be empty"));
    }
    Ok(quote_identifier(ident))
}

/// Quote an identifier with square brackets, doubling any closing bracket
pub fn quote_identifier(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Make `%`, `_` and `[` match literally inside a LIKE pattern
pub fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        match c {
            '[' | '%' | '_' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn build_select(
    table: &str,
    column: &str,
    predicates: &[Predicate],
) -> Result<Statement, SqlServerError> {
    let table = quote_checked("table", table)?;
    let column = quote_checked("column", column)?;
    let mut stmt = Statement::new(format!("SELECT {} FROM {}", column, table));
    stmt.push_where(predicates)?;
    Ok(stmt)
}

pub fn build_delete(table: &str, predicates: &[Predicate]) -> Result<Statement, SqlServerError> {
    let table = quote_checked("table", table)?;
    let mut stmt = Statement::new(format!("DELETE FROM {}", table));
    stmt.push_where(predicates)?;
    Ok(stmt)
}

pub fn build_insert<C: AsRef<str>>(
    table: &str,
    columns: &[C],
    rows: &[Vec<Value>],
) -> Result<Statement, SqlServerError> {
    let table = quote_checked("table", table)?;
    if columns.is_empty() {
        return Err(invalid("columns", "cannot be empty"));
    }
    if rows.is_empty() {
        return Err(invalid("rows", "cannot be empty"));
    }

    let quoted = columns
        .iter()
        .map(|c| quote_checked("column", c.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = Statement::new(format!("INSERT INTO {} ({}) VALUES ", table, quoted.join(", ")));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(invalid(
                "rows",
                format!("row {} has {} values for {} columns", i, row.len(), columns.len()),
            ));
        }
        let placeholders: Vec<String> = row.iter().map(|v| stmt.bind(v.clone())).collect();
        if i > 0 {
            stmt.sql.push_str(", ");
        }
        stmt.sql.push_str(&format!("({})", placeholders.join(", ")));
    }
    Ok(stmt)
}

pub fn build_create_table(table: &str, columns: &[ColumnDef]) -> Result<Statement, SqlServerError> {
    let table = quote_checked("table", table)?;
    if columns.is_empty() {
        return Err(invalid("columns", "insufficient table column names"));
    }

    let defs = columns
        .iter()
        .map(|c| Ok(format!("{} {}", quote_checked("column", &c.name)?, c.column_type.sql_name())))
        .collect::<Result<Vec<_>, SqlServerError>>()?;

    Ok(Statement::new(format!("CREATE TABLE {} ({})", table, defs.join(", "))))
}

/// Split rows of `width` values into chunks a single INSERT can carry.
///
/// A row wider than the per-statement parameter cap cannot be inserted at all.
pub fn insert_batches(
    width: usize,
    rows: &[Vec<Value>],
) -> Result<std::slice::Chunks<'_, Vec<Value>>, SqlServerError> {
    if width > MAX_PARAMS_PER_STATEMENT {
        return Err(invalid(
            "columns",
            format!("{} columns exceed {} parameters per statement", width, MAX_PARAMS_PER_STATEMENT),
        ));
    }
    let per_statement = (MAX_PARAMS_PER_STATEMENT / width.max(1)).clamp(1, MAX_ROWS_PER_STATEMENT);
    Ok(rows.chunks(per_statement))
}

/// Build every INSERT needed for `rows`. Nothing is returned unless all
/// batches are valid.
pub fn build_inserts<C: AsRef<str>>(
    table: &str,
    columns: &[C],
    rows: &[Vec<Value>],
) -> Result<Vec<Statement>, SqlServerError> {
    insert_batches(columns.len(), rows)?
        .map(|batch| build_insert(table, columns, batch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;
    use chrono::NaiveDate;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "[users]");
        assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off[x]"), "50[%][_]off[[]x]");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_numeric_operators() {
        let cases = [
            (NumericCriteria::LessThan, "<"),
            (NumericCriteria::GreaterThan, ">"),
            (NumericCriteria::LessThanOrEqual, "<="),
            (NumericCriteria::GreaterThanOrEqual, ">="),
        ];
        for (criteria, op) in cases {
            let stmt = build_select("t", "v", &[Predicate::numeric("age", criteria, 30)]).unwrap();
            assert_eq!(stmt.sql, format!("SELECT [v] FROM [t] WHERE [age] {} @P1", op));
            assert_eq!(stmt.params, vec![Value::Int(30)]);
        }
    }

    #[test]
    fn test_between() {
        let stmt = build_select("t", "v", &[Predicate::between("price", 1.5f32, 9.0f32)]).unwrap();
        assert_eq!(stmt.sql, "SELECT [v] FROM [t] WHERE [price] BETWEEN @P1 AND @P2");
        assert_eq!(stmt.params, vec![Value::Float(1.5), Value::Float(9.0)]);
    }

    #[test]
    fn test_between_validation() {
        let missing_high = Predicate::Numeric {
            column: "price".into(),
            criteria: NumericCriteria::Between,
            low: Value::Int(1),
            high: None,
        };
        assert!(matches!(
            build_select("t", "v", &[missing_high]),
            Err(SqlServerError::InvalidArgument { .. })
        ));

        let reversed = Predicate::between("price", 10, 1);
        assert!(build_select("t", "v", &[reversed]).is_err());

        let mixed = Predicate::between("price", 1, 2.0f32);
        assert!(build_select("t", "v", &[mixed]).is_err());
    }

    #[test]
    fn test_text_patterns() {
        let cases = [
            (TextCriteria::Contains, "LIKE", "%ab%"),
            (TextCriteria::NotContains, "NOT LIKE", "%ab%"),
            (TextCriteria::StartsWith, "LIKE", "ab%"),
            (TextCriteria::EndsWith, "LIKE", "%ab"),
        ];
        for (criteria, op, pattern) in cases {
            let stmt = build_select("t", "v", &[Predicate::text("name", criteria, "ab")]).unwrap();
            assert_eq!(stmt.sql, format!("SELECT [v] FROM [t] WHERE [name] {} @P1", op));
            assert_eq!(stmt.params, vec![Value::Text(pattern.to_string())]);
        }
    }

    #[test]
    fn test_two_predicates() {
        let when = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let stmt = build_select(
            "readings",
            "value",
            &[
                Predicate::numeric("taken_at", NumericCriteria::GreaterThanOrEqual, when),
                Predicate::text("sensor", TextCriteria::StartsWith, "t_1"),
            ],
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT [value] FROM [readings] WHERE [taken_at] >= @P1 AND [sensor] LIKE @P2"
        );
        assert_eq!(
            stmt.params,
            vec![Value::DateTime(when), Value::Text("t[_]1%".to_string())]
        );
    }

    #[test]
    fn test_too_many_predicates() {
        let p = Predicate::numeric("a", NumericCriteria::LessThan, 1);
        let err = build_select("t", "v", &[p.clone(), p.clone(), p]).unwrap_err();
        assert!(matches!(err, SqlServerError::TooManyPredicates(3)));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            build_select("", "v", &[]),
            Err(SqlServerError::InvalidArgument { ref name, .. }) if name == "table"
        ));
        assert!(build_select("t", "", &[]).is_err());
        assert!(build_select("t", "v", &[Predicate::text("n", TextCriteria::Contains, "")]).is_err());
        assert!(build_select(
            "t",
            "v",
            &[Predicate::numeric("n", NumericCriteria::LessThan, "text")]
        )
        .is_err());
    }

    #[test]
    fn test_delete() {
        assert_eq!(build_delete("t", &[]).unwrap().sql, "DELETE FROM [t]");
        let stmt = build_delete("t", &[Predicate::numeric("id", NumericCriteria::GreaterThan, 5)]).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM [t] WHERE [id] > @P1");
    }

    #[test]
    fn test_insert() {
        let rows = vec![
            vec![Value::Int(1), Value::from("a")],
            vec![Value::Int(2), Value::Null],
        ];
        let stmt = build_insert("t", &["id", "name"], &rows).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO [t] ([id], [name]) VALUES (@P1, @P2), (@P3, @P4)"
        );
        assert_eq!(stmt.params.len(), 4);

        let ragged = vec![vec![Value::Int(1)]];
        assert!(build_insert("t", &["id", "name"], &ragged).is_err());
    }

    #[test]
    fn test_create_table() {
        let stmt = build_create_table(
            "readings",
            &[
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("label", ColumnType::Text),
                ColumnDef::new("value", ColumnType::Float),
                ColumnDef::new("taken_at", ColumnType::DateTime),
            ],
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "CREATE TABLE [readings] ([id] INTEGER, [label] NTEXT, [value] FLOAT(24), [taken_at] DATETIME)"
        );
        assert!(stmt.params.is_empty());
        assert!(build_create_table("readings", &[]).is_err());
    }

    #[test]
    fn test_insert_batches() {
        let rows: Vec<Vec<Value>> = (0..2500).map(|i| vec![Value::Int(i)]).collect();
        let sizes: Vec<usize> = insert_batches(1, &rows).unwrap().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        let wide: Vec<Vec<Value>> = (0..10).map(|_| vec![Value::Null; 400]).collect();
        let sizes: Vec<usize> = insert_batches(400, &wide).unwrap().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![5, 5]);

        let too_wide = vec![vec![Value::Null; 2001]];
        assert!(matches!(
            insert_batches(2001, &too_wide),
            Err(SqlServerError::InvalidArgument { ref name, .. }) if name == "columns"
        ));
    }

    #[test]
    fn test_build_inserts_rejects_ragged_row_in_any_batch() {
        let mut rows: Vec<Vec<Value>> = (0..1500).map(|i| vec![Value::Int(i)]).collect();
        let stmts = build_inserts("t", &["id"], &rows).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].params.len(), 1000);
        assert_eq!(stmts[1].params.len(), 500);

        rows[1200].push(Value::Int(0));
        assert!(matches!(
            build_inserts("t", &["id"], &rows),
            Err(SqlServerError::InvalidArgument { ref name, .. }) if name == "rows"
        ));
    }

    #[test]
    fn test_parse_criteria() {
        assert_eq!("ge".parse::<NumericCriteria>().unwrap(), NumericCriteria::GreaterThanOrEqual);
        assert_eq!("ends-with".parse::<TextCriteria>().unwrap(), TextCriteria::EndsWith);
        assert!("like".parse::<TextCriteria>().is_err());
    }
}
