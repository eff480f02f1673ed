use crate::{FileExtension, QueryEngine, ResultTable, TradeViewError, TradeViewResult};

use polars::{prelude::*, sql::SQLContext};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    path::{Path, PathBuf},
};
use tokio::task::spawn_blocking;

/// Maximum rows scanned for CSV schema inference.
const INFER_SCHEMA_ROWS: usize = 200;

/// An in-process query engine over a directory of CSV/Parquet snapshots.
///
/// Each file becomes a table named after its stem (`trade_user.csv` -> `trade_user`),
/// and queries run through the polars SQL context. Useful offline and for demos.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    root: PathBuf,
    tables: BTreeMap<String, DataFrame>,
}

impl LocalEngine {
    /// Loads every supported file of `dir`. Files with other extensions are skipped.
    pub async fn open(dir: &Path) -> TradeViewResult<Self> {
        if !dir.is_dir() {
            return Err(TradeViewError::FileNotFound(dir.to_path_buf()));
        }

        let mut tables = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };

            let df = match FileExtension::from_path(&path) {
                FileExtension::Csv => read_csv(&path).await?,
                FileExtension::Parquet => read_parquet(&path).await?,
                FileExtension::Unknown(_) | FileExtension::Missing => {
                    tracing::trace!("Skipping {}", path.display());
                    continue;
                }
            };

            tracing::debug!("Loaded table '{name}' {:?} from {}", df.shape(), path.display());
            tables.insert(name, df);
        }

        if tables.is_empty() {
            return Err(TradeViewError::FileType(format!(
                "no CSV or Parquet files in `{}`",
                dir.display()
            )));
        }

        Ok(LocalEngine {
            root: dir.to_path_buf(),
            tables,
        })
    }

    /// Builds an engine from already loaded tables.
    pub fn from_tables<I>(root: PathBuf, tables: I) -> Self
    where
        I: IntoIterator<Item = (String, DataFrame)>,
    {
        LocalEngine {
            root,
            tables: tables.into_iter().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

impl QueryEngine for LocalEngine {
    async fn submit(&self, sql: &str) -> TradeViewResult<ResultTable> {
        // DataFrame clones share their column buffers.
        let tables = self.tables.clone();
        let sql = sql.to_string();

        let df = execute_polars_blocking(move || {
            let mut ctx = SQLContext::new();
            for (name, df) in tables {
                ctx.register(&name, df.lazy());
            }
            ctx.execute(&sql)?.collect()
        })
        .await
        .map_err(|err| match err {
            // Everything polars raises here is the engine refusing or failing the query.
            TradeViewError::Polars(e) => TradeViewError::Query {
                message: e.to_string(),
            },
            other => other,
        })?;

        ResultTable::from_dataframe(&df)
    }
}

async fn read_csv(path: &Path) -> TradeViewResult<DataFrame> {
    let csv_parse_options = CsvParseOptions::default()
        .with_encoding(CsvEncoding::LossyUtf8) // Handle potentially non-strict UTF8
        .with_missing_is_null(true); // Treat empty fields as nulls

    let csv_reader = CsvReadOptions::default()
        .with_parse_options(csv_parse_options)
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?;

    execute_polars_blocking(move || csv_reader.finish()).await
}

async fn read_parquet(path: &Path) -> TradeViewResult<DataFrame> {
    let plpath = PlRefPath::try_from_path(path)?;
    let args = ScanArgsParquet {
        low_memory: false,
        ..Default::default()
    };

    execute_polars_blocking(move || LazyFrame::scan_parquet(plpath, args)?.collect()).await
}

/// Runs a blocking polars operation on tokio's blocking pool, mapping both
/// the join error and the polars error into `TradeViewError`.
async fn execute_polars_blocking<T, F>(op: F) -> TradeViewResult<T>
where
    F: FnOnce() -> Result<T, PolarsError> + Send + 'static,
    T: Debug + Send + 'static,
{
    let polars_result = spawn_blocking(op).await?;
    Ok(polars_result?)
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//
