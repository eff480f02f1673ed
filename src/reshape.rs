use crate::{ResultTable, Scalar, TradeViewError, TradeViewResult};

use std::collections::{BTreeMap, HashMap, HashSet};

/// A 2-D matrix indexed by two categorical dimensions, ready for bar charts and heatmaps.
///
/// Labels keep the order of first appearance in the source table, so the same
/// selection always draws the same way. Missing (row, column) combinations are
/// absent cells, not zeros.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultMatrix {
    /// Name of the column that supplied the row labels.
    pub row_dim: String,
    /// Name of the column that supplied the column labels.
    pub col_dim: String,
    /// Name of the column that supplied the cell values.
    pub value_col: String,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    /// Keyed by (row index, column index) into the label vectors.
    cells: BTreeMap<(usize, usize), f64>,
}

impl ResultMatrix {
    /// Cell at label indices.
    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(&(row, col)).copied()
    }

    /// Cell by label values.
    pub fn get(&self, row_label: &str, col_label: &str) -> Option<f64> {
        let row = self.row_labels.iter().position(|l| l == row_label)?;
        let col = self.col_labels.iter().position(|l| l == col_label)?;
        self.cell(row, col)
    }

    /// Number of present cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Smallest and largest present values, used for colour scales and bar lengths.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.cells.values().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Iterates present cells as `(row index, column index, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.cells.iter().map(|(&(r, c), &v)| (r, c, v))
    }
}

/// Identity of a label cell: a null, the number `1` and the text `"1"` are
/// three different labels even though they print alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LabelKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl From<&Scalar> for LabelKey {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Null => LabelKey::Null,
            Scalar::Bool(b) => LabelKey::Bool(*b),
            Scalar::Int(i) => LabelKey::Int(*i),
            // -0.0 and 0.0 are one label.
            Scalar::Float(x) => LabelKey::Float(if *x == 0.0 { 0 } else { x.to_bits() }),
            Scalar::Text(s) => LabelKey::Text(s.clone()),
        }
    }
}

/// Index of `cell` in `labels`, appending its label on first sight.
fn intern(
    labels: &mut Vec<String>,
    lookup: &mut HashMap<LabelKey, usize>,
    cell: &Scalar,
) -> usize {
    let key = LabelKey::from(cell);
    if let Some(&index) = lookup.get(&key) {
        return index;
    }
    let index = labels.len();
    lookup.insert(key, index);
    labels.push(cell.to_string());
    index
}

/// Pivots a `ResultTable` into a `ResultMatrix`.
///
/// ### Errors
/// * `ColumnNotFound`: one of the named columns is not in the table.
/// * `DuplicateKey`: two rows share the same (row, column) pair. The grouping
///   of the query does not uniquely key the pivot; nothing is picked silently.
/// * `NonNumericValue`: a value cell cannot be read as a number. Null values
///   leave the cell absent but still register their labels.
pub fn reshape(
    table: &ResultTable,
    row_dim: &str,
    col_dim: &str,
    value_col: &str,
) -> TradeViewResult<ResultMatrix> {
    let row_index = table.column_index(row_dim)?;
    let col_index = table.column_index(col_dim)?;
    let value_index = table.column_index(value_col)?;

    let mut matrix = ResultMatrix {
        row_dim: row_dim.to_string(),
        col_dim: col_dim.to_string(),
        value_col: value_col.to_string(),
        ..Default::default()
    };
    let mut row_lookup = HashMap::new();
    let mut col_lookup = HashMap::new();
    let mut seen = HashSet::new();

    for row in &table.rows {
        let r = intern(&mut matrix.row_labels, &mut row_lookup, &row[row_index]);
        let c = intern(&mut matrix.col_labels, &mut col_lookup, &row[col_index]);

        if !seen.insert((r, c)) {
            return Err(TradeViewError::DuplicateKey {
                row: matrix.row_labels[r].clone(),
                column: matrix.col_labels[c].clone(),
            });
        }

        let value = &row[value_index];
        if value.is_null() {
            continue;
        }
        let number = value
            .as_f64()
            .ok_or_else(|| TradeViewError::NonNumericValue {
                column: value_col.to_string(),
                value: value.to_string(),
            })?;
        matrix.cells.insert((r, c), number);
    }

    tracing::debug!(
        "reshape(): {} x {} matrix, {} cells ({row_dim} x {col_dim} -> {value_col})",
        matrix.row_labels.len(),
        matrix.col_labels.len(),
        matrix.cells.len()
    );

    Ok(matrix)
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_reshape`
#[cfg(test)]
mod tests_reshape {
    use super::*;
    use crate::Scalar;

    fn text(s: &str) -> Scalar {
        Scalar::Text(s.to_string())
    }

    fn three_column_table(rows: Vec<(Scalar, Scalar, Scalar)>) -> ResultTable {
        ResultTable {
            columns: vec!["col0".into(), "col1".into(), "col2".into()],
            rows: rows.into_iter().map(|(a, b, c)| vec![a, b, c]).collect(),
        }
    }

    #[test]
    fn pivots_in_first_appearance_order() -> TradeViewResult<()> {
        let table = three_column_table(vec![
            (text("A"), Scalar::Int(1), Scalar::Int(10)),
            (text("A"), Scalar::Int(2), Scalar::Int(20)),
            (text("B"), Scalar::Int(1), Scalar::Int(30)),
        ]);

        let matrix = reshape(&table, "col0", "col1", "col2")?;

        assert_eq!(matrix.row_labels, vec!["A", "B"]);
        assert_eq!(matrix.col_labels, vec!["1", "2"]);
        assert_eq!(matrix.get("A", "1"), Some(10.0));
        assert_eq!(matrix.get("A", "2"), Some(20.0));
        assert_eq!(matrix.get("B", "1"), Some(30.0));
        assert_eq!(matrix.get("B", "2"), None);
        assert_eq!(matrix.len(), 3);
        Ok(())
    }

    #[test]
    fn labels_are_not_sorted() -> TradeViewResult<()> {
        let table = three_column_table(vec![
            (text("LOW"), text("M"), Scalar::Int(5)),
            (text("HIGH"), text("F"), Scalar::Int(7)),
            (text("HIGH"), text("M"), Scalar::Int(2)),
        ]);
        let matrix = reshape(&table, "col0", "col1", "col2")?;
        assert_eq!(matrix.row_labels, vec!["LOW", "HIGH"]);
        assert_eq!(matrix.col_labels, vec!["M", "F"]);
        Ok(())
    }

    #[test]
    fn reshape_is_idempotent() -> TradeViewResult<()> {
        let table = three_column_table(vec![
            (text("Region_1"), text("AAA"), Scalar::Float(10.25)),
            (text("Region_2"), text("BBB"), Scalar::Float(3.5)),
            (text("Region_1"), text("BBB"), Scalar::Null),
        ]);
        let first = reshape(&table, "col0", "col1", "col2")?;
        let second = reshape(&table, "col0", "col1", "col2")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn duplicate_pair_fails_fast() {
        let table = three_column_table(vec![
            (text("A"), Scalar::Int(1), Scalar::Int(10)),
            (text("A"), Scalar::Int(1), Scalar::Int(11)),
        ]);
        let result = reshape(&table, "col0", "col1", "col2");
        assert!(
            matches!(
                &result,
                Err(TradeViewError::DuplicateKey { row, column }) if row == "A" && column == "1"
            ),
            "got {result:?}"
        );
    }

    #[test]
    fn null_value_leaves_cell_absent() -> TradeViewResult<()> {
        let table = three_column_table(vec![(text("A"), text("X"), Scalar::Null)]);
        let matrix = reshape(&table, "col0", "col1", "col2")?;
        assert_eq!(matrix.row_labels, vec!["A"]);
        assert_eq!(matrix.col_labels, vec!["X"]);
        assert!(matrix.is_empty());
        assert_eq!(matrix.value_range(), None);
        Ok(())
    }

    #[test]
    fn labels_that_print_alike_stay_apart() -> TradeViewResult<()> {
        let table = three_column_table(vec![
            (Scalar::Null, Scalar::Int(1), Scalar::Int(4)),
            (text("null"), text("1"), Scalar::Int(6)),
        ]);
        let matrix = reshape(&table, "col0", "col1", "col2")?;
        assert_eq!(matrix.row_labels, vec!["null", "null"]);
        assert_eq!(matrix.col_labels, vec!["1", "1"]);
        assert_eq!(matrix.cell(0, 0), Some(4.0));
        assert_eq!(matrix.cell(1, 1), Some(6.0));
        assert_eq!(matrix.cell(0, 1), None);
        Ok(())
    }

    #[test]
    fn non_numeric_value_is_an_error() {
        let table = three_column_table(vec![(text("A"), text("X"), text("lots"))]);
        assert!(matches!(
            reshape(&table, "col0", "col1", "col2"),
            Err(TradeViewError::NonNumericValue { value, .. }) if value == "lots"
        ));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let table = three_column_table(vec![]);
        assert!(matches!(
            reshape(&table, "col0", "missing", "col2"),
            Err(TradeViewError::ColumnNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn value_range_spans_present_cells() -> TradeViewResult<()> {
        let table = three_column_table(vec![
            (text("A"), text("X"), Scalar::Float(-2.0)),
            (text("B"), text("X"), Scalar::Float(8.0)),
        ]);
        let matrix = reshape(&table, "col0", "col1", "col2")?;
        assert_eq!(matrix.value_range(), Some((-2.0, 8.0)));
        Ok(())
    }
}
