//! Parquet I/O helpers shared by the partitioned writer and the transform
//! stage's reader.

use super::StoreError;
use crate::domain::PriceObservation;
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

fn nan_to_null(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Convert a batch of observations into the canonical tall frame:
/// `symbol, trade_date, open, high, low, close, volume`. NaN price fields
/// become real nulls so downstream null propagation works.
pub fn batch_to_frame(rows: &[PriceObservation]) -> Result<DataFrame, StoreError> {
    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.trade_date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<Option<f64>> = rows.iter().map(|r| nan_to_null(r.open)).collect();
    let highs: Vec<Option<f64>> = rows.iter().map(|r| nan_to_null(r.high)).collect();
    let lows: Vec<Option<f64>> = rows.iter().map(|r| nan_to_null(r.low)).collect();
    let closes: Vec<Option<f64>> = rows.iter().map(|r| nan_to_null(r.close)).collect();
    let volumes: Vec<i64> = rows.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        Column::new("trade_date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Frame(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| StoreError::Frame(format!("dataframe creation: {e}")))
}

/// Write a DataFrame to a parquet file, creating parent directories.
pub fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let file = fs::File::create(path).map_err(|e| StoreError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write {}: {e}", path.display())))?;
    Ok(())
}

/// Read one parquet file eagerly.
pub fn read_parquet(path: &Path) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))
}

/// Recursively collect every `*.parquet` file under `root`, sorted by path
/// for deterministic ordering.
pub fn collect_parquet_files(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    walk(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            files.push(path);
        }
    }
    Ok(())
}

/// Load every parquet file under a partitioned tree and stack them into a
/// single flat frame. Partition key columns are retained inside the data
/// files, so no path parsing is needed here.
pub fn read_parquet_tree(root: &Path) -> Result<DataFrame, StoreError> {
    let files = collect_parquet_files(root)?;
    if files.is_empty() {
        return Err(StoreError::NoInput(root.display().to_string()));
    }

    let mut combined: Option<DataFrame> = None;
    for path in &files {
        let df = read_parquet(path)?;
        combined = Some(match combined {
            None => df,
            Some(acc) => acc
                .vstack(&df)
                .map_err(|e| StoreError::Frame(format!("stack {}: {e}", path.display())))?,
        });
    }

    Ok(combined.expect("files is non-empty"))
}
