use crate::{TradeViewError, TradeViewResult};

use regex::Regex;
use std::{collections::BTreeSet, fmt, sync::LazyLock};

// https://docs.pinot.apache.org/users/user-guide-query/querying-pinot
// https://docs.pola.rs/api/python/stable/reference/sql/clauses.html

/// Identifiers matching this pattern are emitted bare; anything else is double-quoted.
static PLAIN_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Predicate emitted for an empty selection. Matches zero rows on every engine.
pub const MATCH_NOTHING: &str = "1 = 0";

/// Aggregate functions available to a `Measure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Count => "COUNT",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        };
        f.write_str(name)
    }
}

/// The aggregated numeric expression computed per group, with its output alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Measure {
    pub function: Aggregate,
    /// `None` renders as `*` (only meaningful for `COUNT`).
    pub column: Option<String>,
    pub alias: String,
}

impl Measure {
    pub fn sum(column: &str, alias: &str) -> Self {
        Self::over(Aggregate::Sum, column, alias)
    }

    pub fn avg(column: &str, alias: &str) -> Self {
        Self::over(Aggregate::Avg, column, alias)
    }

    /// `COUNT(*)`
    pub fn count_rows(alias: &str) -> Self {
        Measure {
            function: Aggregate::Count,
            column: None,
            alias: alias.to_string(),
        }
    }

    pub fn over(function: Aggregate, column: &str, alias: &str) -> Self {
        Measure {
            function,
            column: Some(column.to_string()),
            alias: alias.to_string(),
        }
    }

    fn render(&self) -> TradeViewResult<String> {
        let argument = match &self.column {
            Some(column) => quote_identifier(column)?,
            None => "*".to_string(),
        };
        Ok(format!(
            "{}({argument}) AS {}",
            self.function,
            quote_identifier(&self.alias)?
        ))
    }
}

/// A categorical column plus the set of values the user has chosen.
///
/// An empty set means "match nothing", never "match all".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterSelection {
    pub column: String,
    pub values: BTreeSet<String>,
}

impl FilterSelection {
    pub fn new<I, S>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterSelection {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders `<column> IN ('a','b')`, or the zero-row predicate for an empty set.
    pub fn predicate(&self) -> TradeViewResult<String> {
        let column = quote_identifier(&self.column)?;
        if self.values.is_empty() {
            return Ok(MATCH_NOTHING.to_string());
        }
        let literals: Vec<String> = self.values.iter().map(|v| quote_literal(v)).collect();
        Ok(format!("{column} IN ({})", literals.join(",")))
    }
}

/// An aggregation template: one per rendered panel per render cycle.
///
/// Immutable once built; the builder methods consume and return `self`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    pub table: String,
    /// Ordered. Defines the pivot axes.
    pub group_by: Vec<String>,
    pub measure: Measure,
    pub filters: Vec<FilterSelection>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn new(table: &str, measure: Measure) -> Self {
        QuerySpec {
            table: table.to_string(),
            group_by: Vec::new(),
            measure,
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, selection: FilterSelection) -> Self {
        self.filters.push(selection);
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Columns whose selection is empty. The query is still valid and returns no rows.
    pub fn empty_filters(&self) -> Vec<&str> {
        self.filters
            .iter()
            .filter(|f| f.is_empty())
            .map(|f| f.column.as_str())
            .collect()
    }

    /// `true` when some filter has an empty selection, so the result is known to be empty.
    pub fn matches_nothing(&self) -> bool {
        self.filters.iter().any(FilterSelection::is_empty)
    }

    /// Column names of the result, in SELECT order.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.group_by.clone();
        columns.push(self.measure.alias.clone());
        columns
    }

    /// The ANDed predicates, without the `WHERE` keyword. `None` without filters.
    pub fn where_clause(&self) -> TradeViewResult<Option<String>> {
        if self.filters.is_empty() {
            return Ok(None);
        }
        let predicates = self
            .filters
            .iter()
            .map(FilterSelection::predicate)
            .collect::<TradeViewResult<Vec<String>>>()?;
        Ok(Some(predicates.join(" AND ")))
    }

    /// Renders the complete aggregation query.
    ///
    /// `SELECT <groups>, <measure> AS <alias> FROM <table> [WHERE ...] GROUP BY <groups> [LIMIT n]`
    pub fn build(&self) -> TradeViewResult<String> {
        let table = quote_identifier(&self.table)?;
        let groups = self
            .group_by
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<TradeViewResult<Vec<String>>>()?
            .join(", ");

        let mut sql = if groups.is_empty() {
            format!("SELECT {} FROM {table}", self.measure.render()?)
        } else {
            format!("SELECT {groups}, {} FROM {table}", self.measure.render()?)
        };

        if let Some(predicates) = self.where_clause()? {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates);
        }

        if !groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups);
        }

        push_limit(&mut sql, self.limit);
        Ok(sql)
    }
}

/// `SELECT DISTINCT <column> FROM <table>`: the filter-option query.
pub fn build_distinct(table: &str, column: &str, limit: Option<usize>) -> TradeViewResult<String> {
    let mut sql = format!(
        "SELECT DISTINCT {} FROM {}",
        quote_identifier(column)?,
        quote_identifier(table)?
    );
    push_limit(&mut sql, limit);
    Ok(sql)
}

fn push_limit(sql: &mut String, limit: Option<usize>) {
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
}

/// Renders a value as a single-quoted SQL literal. Embedded quotes are doubled,
/// so the value can never close its own literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Emits plain identifiers bare and double-quotes everything else.
pub fn quote_identifier(name: &str) -> TradeViewResult<String> {
    if name.is_empty() {
        return Err(TradeViewError::InvalidQuery(
            "empty identifier".to_string(),
        ));
    }
    if PLAIN_IDENTIFIER.is_match(name) {
        Ok(name.to_string())
    } else {
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//
