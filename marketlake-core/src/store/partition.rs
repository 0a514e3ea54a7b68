//! Partitioned parquet writer.
//!
//! Groups a frame by the cartesian combination of partition-key values and
//! writes one self-describing file per group under
//! `root/key1=v1/key2=v2/.../data.parquet`. Key columns stay inside the
//! data files, so reading a tree back needs no path parsing.
//!
//! Sibling partitions are independent: writing never disturbs data already
//! present under a disjoint key combination. A rerun of the *exact* same
//! key combination replaces that partition's file (write to `.tmp`, then
//! atomic rename over the old file).

use super::parquet::write_parquet;
use super::StoreError;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a partitioned write. Empty input is a distinguished no-op,
/// not an error, so callers can short-circuit the upload step.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Empty,
    Written {
        partitions_written: usize,
        rows: usize,
    },
}

/// Writes frames as hive-partitioned parquet under a root directory.
pub struct PartitionedWriter {
    root: PathBuf,
}

impl PartitionedWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(
        &self,
        df: &DataFrame,
        partition_keys: &[&str],
    ) -> Result<WriteOutcome, StoreError> {
        if df.height() == 0 {
            return Ok(WriteOutcome::Empty);
        }

        for key in partition_keys {
            if df.column(key).is_err() {
                return Err(StoreError::MissingPartitionKey(key.to_string()));
            }
        }

        let key_names: Vec<PlSmallStr> = partition_keys
            .iter()
            .map(|k| PlSmallStr::from_str(k))
            .collect();
        let groups = df
            .partition_by(key_names, true)
            .map_err(|e| StoreError::Frame(format!("partition_by: {e}")))?;

        let rows = df.height();
        let mut partitions_written = 0;

        for group in &groups {
            let dir = self.partition_dir(group, partition_keys)?;
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

            let target = dir.join("data.parquet");
            let tmp = dir.join("data.parquet.tmp");
            write_parquet(group, &tmp)?;
            fs::rename(&tmp, &target).map_err(|e| {
                let _ = fs::remove_file(&tmp);
                StoreError::io(&target, e)
            })?;

            partitions_written += 1;
        }

        Ok(WriteOutcome::Written {
            partitions_written,
            rows,
        })
    }

    /// Build `root/k1=v1/k2=v2` from the group's first row. Every row in a
    /// group shares the same key values by construction.
    fn partition_dir(&self, group: &DataFrame, keys: &[&str]) -> Result<PathBuf, StoreError> {
        let mut dir = self.root.clone();
        for key in keys {
            let value = group
                .column(key)
                .map_err(|e| StoreError::Frame(format!("key column '{key}': {e}")))?
                .cast(&DataType::String)
                .map_err(|e| StoreError::Frame(format!("key cast '{key}': {e}")))?;
            let value = value
                .str()
                .map_err(|e| StoreError::Frame(format!("key dtype '{key}': {e}")))?
                .get(0)
                .ok_or_else(|| StoreError::Frame(format!("null partition value for '{key}'")))?
                .to_string();
            dir = dir.join(format!("{key}={value}"));
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceObservation;
    use crate::store::parquet::{batch_to_frame, read_parquet_tree};
    use chrono::NaiveDate;

    fn obs(symbol: &str, day: u32, close: f64) -> PriceObservation {
        PriceObservation {
            symbol: symbol.into(),
            trade_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 500,
        }
    }

    #[test]
    fn one_directory_per_distinct_key_combination() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            obs("AAA", 2, 10.0),
            obs("AAA", 3, 10.5),
            obs("BBB", 2, 20.0),
        ];
        let df = batch_to_frame(&rows).unwrap();

        let writer = PartitionedWriter::new(dir.path());
        let outcome = writer.write(&df, &["trade_date", "symbol"]).unwrap();

        assert_eq!(
            outcome,
            WriteOutcome::Written {
                partitions_written: 3,
                rows: 3
            }
        );
        assert!(dir
            .path()
            .join("trade_date=2024-01-02/symbol=AAA/data.parquet")
            .exists());
        assert!(dir
            .path()
            .join("trade_date=2024-01-02/symbol=BBB/data.parquet")
            .exists());
        assert!(dir
            .path()
            .join("trade_date=2024-01-03/symbol=AAA/data.parquet")
            .exists());
    }

    #[test]
    fn union_of_partitions_equals_input_rows() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            obs("AAA", 2, 10.0),
            obs("AAA", 3, 10.5),
            obs("BBB", 2, 20.0),
            obs("BBB", 3, 21.0),
        ];
        let df = batch_to_frame(&rows).unwrap();

        PartitionedWriter::new(dir.path())
            .write(&df, &["trade_date"])
            .unwrap();

        let read_back = read_parquet_tree(dir.path()).unwrap();
        assert_eq!(read_back.height(), 4);

        let mut closes: Vec<f64> = read_back
            .column("close")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        closes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(closes, vec![10.0, 10.5, 20.0, 21.0]);
    }

    #[test]
    fn empty_input_is_a_noop_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let df = batch_to_frame(&[]).unwrap();
        let outcome = PartitionedWriter::new(dir.path())
            .write(&df, &["trade_date"])
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Empty);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn exact_rerun_replaces_siblings_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionedWriter::new(dir.path());

        let first = batch_to_frame(&[obs("AAA", 2, 10.0), obs("BBB", 2, 20.0)]).unwrap();
        writer.write(&first, &["symbol"]).unwrap();

        // Rerun only AAA with a corrected close
        let rerun = batch_to_frame(&[obs("AAA", 2, 11.0)]).unwrap();
        writer.write(&rerun, &["symbol"]).unwrap();

        let aaa = read_parquet_tree(&dir.path().join("symbol=AAA")).unwrap();
        assert_eq!(aaa.height(), 1);
        assert_eq!(aaa.column("close").unwrap().f64().unwrap().get(0), Some(11.0));

        // Sibling BBB still present and intact
        let bbb = read_parquet_tree(&dir.path().join("symbol=BBB")).unwrap();
        assert_eq!(bbb.height(), 1);
        assert_eq!(bbb.column("close").unwrap().f64().unwrap().get(0), Some(20.0));
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let df = batch_to_frame(&[obs("AAA", 2, 10.0)]).unwrap();
        let err = PartitionedWriter::new(dir.path())
            .write(&df, &["region"])
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingPartitionKey(_)));
    }
}
