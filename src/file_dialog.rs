use crate::{FileExtension, ResultTable, TradeViewError, TradeViewResult};

use egui::Context;
use polars::prelude::*;
use rfd::AsyncFileDialog;
use std::{fs::File, io::BufWriter, path::Path, path::PathBuf};
use tokio::sync::oneshot;
use tracing::{error, info};

/// Opens a native dialog to choose a snapshot directory.
///
/// # Returns
///
/// - `Ok(PathBuf)`: The selected directory.
/// - `Err(TradeViewError::FileNotFound)`: If the user cancels the dialog.
pub async fn pick_folder() -> TradeViewResult<PathBuf> {
    AsyncFileDialog::new()
        .set_title("Open snapshot folder")
        .pick_folder()
        .await
        .map(|folder| folder.path().to_path_buf())
        .ok_or_else(|| TradeViewError::FileNotFound(PathBuf::new()))
}

/// Writes `table` to `path`, as CSV or Parquet depending on the extension.
pub fn write_table(table: &ResultTable, path: &Path) -> TradeViewResult<()> {
    let mut df = table.to_dataframe()?;

    match FileExtension::from_path(path) {
        FileExtension::Csv => {
            let mut writer = BufWriter::new(File::create(path)?);
            CsvWriter::new(&mut writer).finish(&mut df)?;
        }
        FileExtension::Parquet => {
            let mut writer = BufWriter::new(File::create(path)?);
            ParquetWriter::new(&mut writer).finish(&mut df)?;
        }
        FileExtension::Unknown(ext) => {
            return Err(TradeViewError::FileType(format!(
                "cannot export to `.{ext}`: use .csv or .parquet"
            )));
        }
        FileExtension::Missing => {
            return Err(TradeViewError::FileType(
                "missing file extension: use .csv or .parquet".to_string(),
            ));
        }
    }

    info!("Exported {} rows to {}", table.height(), path.display());
    Ok(())
}

/// Asks for a destination and exports a panel result there.
///
/// The write runs on the blocking pool; its outcome comes back over a oneshot
/// channel. Returns `Ok(None)` when the user cancels the dialog.
pub async fn save_as(
    table: ResultTable,
    default_file_name: String,
    ctx: Context,
) -> TradeViewResult<Option<PathBuf>> {
    let file = AsyncFileDialog::new()
        .add_filter("CSV", &["csv"])
        .add_filter("Parquet", &["parquet"])
        .set_file_name(default_file_name)
        .save_file()
        .await;

    let Some(file) = file else {
        return Ok(None);
    };
    let path = file.path().to_path_buf();

    let (tx, rx) = oneshot::channel::<TradeViewResult<()>>();
    let target = path.clone();

    let _handle = tokio::task::spawn_blocking(move || {
        let result = write_table(&table, &target);

        if tx.send(result).is_err() {
            error!("The receiver has been dropped.");
        }

        ctx.request_repaint();
    });

    rx.await
        .map_err(|e| TradeViewError::ChannelReceive(e.to_string()))??;

    Ok(Some(path))
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_export`
#[cfg(test)]
mod tests_export {
    use super::*;
    use crate::Scalar;
    use std::fs;

    fn symbol_side() -> ResultTable {
        ResultTable {
            columns: vec!["SYMBOL".into(), "SIDE".into(), "TOTAL_TRADE_VALUE".into()],
            rows: vec![
                vec![Scalar::Text("AAA".into()), Scalar::Text("BUY".into()), Scalar::Int(100)],
                vec![Scalar::Text("BBB".into()), Scalar::Text("SELL".into()), Scalar::Null],
            ],
        }
    }

    #[test]
    fn exports_csv() -> TradeViewResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("symbol_side.csv");

        write_table(&symbol_side(), &path)?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "SYMBOL,SIDE,TOTAL_TRADE_VALUE");
        assert_eq!(lines[1], "AAA,BUY,100");
        assert_eq!(lines[2], "BBB,SELL,");
        Ok(())
    }

    #[test]
    fn exports_parquet() -> TradeViewResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("symbol_side.parquet");

        write_table(&symbol_side(), &path)?;

        let df = ParquetReader::new(File::open(&path)?).finish()?;
        assert_eq!(df.shape(), (2, 3));
        Ok(())
    }

    #[test]
    fn rejects_unknown_extension() -> TradeViewResult<()> {
        let dir = tempfile::tempdir()?;
        let result = write_table(&symbol_side(), &dir.path().join("symbol_side.xlsx"));
        assert!(matches!(result, Err(TradeViewError::FileType(_))));
        Ok(())
    }
}
