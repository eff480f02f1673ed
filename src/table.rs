use crate::{TradeViewError, TradeViewResult};

use polars::prelude::*;
use std::fmt;

/// A single cell returned by the query engine (schema-on-read).
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Reads the cell as a number.
    ///
    /// Text cells are parsed, since some engines serialize big decimals as strings.
    /// Returns `None` for nulls, booleans and unparseable text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
            Scalar::Null | Scalar::Bool(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    /// The label form of the cell, as used for pivot axes and table cells.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&serde_json::Value> for Scalar {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
            },
            serde_json::Value::String(s) => Scalar::Text(s.clone()),
            // Pinot returns multi-value columns as arrays.
            other => Scalar::Text(other.to_string()),
        }
    }
}

impl From<AnyValue<'_>> for Scalar {
    fn from(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => Scalar::Null,
            AnyValue::Boolean(b) => Scalar::Bool(b),
            AnyValue::String(s) => Scalar::Text(s.to_string()),
            AnyValue::StringOwned(s) => Scalar::Text(s.to_string()),
            AnyValue::Float32(x) => Scalar::Float(x.into()),
            AnyValue::Float64(x) => Scalar::Float(x),
            // u64 values beyond i64::MAX fall back to a float.
            av if av.dtype().is_integer() => match av.extract::<i64>() {
                Some(i) => Scalar::Int(i),
                None => av.extract::<f64>().map_or(Scalar::Null, Scalar::Float),
            },
            av => Scalar::Text(av.to_string()),
        }
    }
}

/// The rectangular result of one query execution.
///
/// Created fresh per execution and handed to the reshaper or the table view;
/// never cached across render cycles or mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl ResultTable {
    /// Creates a table, checking that every row has the arity of the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> TradeViewResult<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(TradeViewError::Protocol(format!(
                "row {index} has {} values, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(ResultTable { columns, rows })
    }

    /// An empty result that still carries its column names.
    pub fn empty(columns: Vec<String>) -> Self {
        ResultTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, or `ColumnNotFound`.
    pub fn column_index(&self, name: &str) -> TradeViewResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TradeViewError::ColumnNotFound(name.to_string()))
    }

    /// Iterates the cells of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Scalar> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Converts a polars `DataFrame` (local snapshot engine output) into a `ResultTable`.
    pub fn from_dataframe(df: &DataFrame) -> TradeViewResult<Self> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows = Vec::with_capacity(df.height());
        for row_index in 0..df.height() {
            let row = df
                .columns()
                .iter()
                .map(|column| column.get(row_index).map(Scalar::from))
                .collect::<PolarsResult<Vec<Scalar>>>()?;
            rows.push(row);
        }

        Ok(ResultTable { columns, rows })
    }

    /// Converts the table into a polars `DataFrame` (used for CSV export).
    ///
    /// Each column gets the narrowest type that holds all of its non-null cells:
    /// Int64, then Float64, then Boolean, falling back to String.
    pub fn to_dataframe(&self) -> TradeViewResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, name)| self.build_column(index, name))
            .collect::<Vec<Column>>();

        DataFrame::new_infer_height(columns).map_err(TradeViewError::from)
    }

    fn build_column(&self, index: usize, name: &str) -> Column {
        let cells: Vec<&Scalar> = self.column_values(index).collect();
        let non_null = || cells.iter().filter(|s| !s.is_null());

        if non_null().all(|s| matches!(s, Scalar::Int(_))) {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|s| match s {
                    Scalar::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values)
        } else if non_null().all(|s| matches!(s, Scalar::Int(_) | Scalar::Float(_))) {
            let values: Vec<Option<f64>> = cells.iter().map(|s| s.as_f64()).collect();
            Column::new(name.into(), values)
        } else if non_null().all(|s| matches!(s, Scalar::Bool(_))) {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|s| match s {
                    Scalar::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values)
        } else {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|s| (!s.is_null()).then(|| s.to_string()))
                .collect();
            Column::new(name.into(), values)
        }
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//
