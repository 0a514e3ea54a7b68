//! JSON-file catalog: one pretty-printed document per table under a
//! catalog directory.

use super::{Catalog, CatalogError, PartitionAdd, PartitionEntry, TableDescriptor, TableSpec};
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonCatalog {
    dir: PathBuf,
}

impl JsonCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn load(&self, name: &str) -> Result<Option<TableDescriptor>, CatalogError> {
        let path = self.table_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| CatalogError::Io(e.to_string()))?;
        let desc = serde_json::from_str(&content).map_err(|e| CatalogError::Serde(e.to_string()))?;
        Ok(Some(desc))
    }

    fn save(&self, desc: &TableDescriptor) -> Result<(), CatalogError> {
        fs::create_dir_all(&self.dir).map_err(|e| CatalogError::Io(e.to_string()))?;
        let json = serde_json::to_string_pretty(desc)
            .map_err(|e| CatalogError::Serde(e.to_string()))?;
        write_atomic(&self.table_path(&desc.spec.name), json.as_bytes())
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), CatalogError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(|e| CatalogError::Io(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CatalogError::Io(e.to_string())
    })
}

impl Catalog for JsonCatalog {
    fn upsert_table(&self, spec: &TableSpec) -> Result<(), CatalogError> {
        let partitions = match self.load(&spec.name)? {
            Some(existing) => existing.partitions,
            None => Vec::new(),
        };
        self.save(&TableDescriptor {
            spec: spec.clone(),
            partitions,
        })
    }

    fn add_partition(
        &self,
        table: &str,
        values: &[String],
        location: &str,
    ) -> Result<PartitionAdd, CatalogError> {
        let mut desc = self
            .load(table)?
            .ok_or_else(|| CatalogError::UnknownTable(table.to_string()))?;

        if desc.partitions.iter().any(|p| p.values == values) {
            return Ok(PartitionAdd::AlreadyExists);
        }

        desc.partitions.push(PartitionEntry {
            values: values.to_vec(),
            location: location.to_string(),
        });
        self.save(&desc)?;
        Ok(PartitionAdd::Created)
    }

    fn get_table(&self, name: &str) -> Result<Option<TableDescriptor>, CatalogError> {
        self.load(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnSpec;

    fn spec(name: &str, location: &str) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            columns: vec![
                ColumnSpec {
                    name: "symbol".into(),
                    type_name: "string".into(),
                },
                ColumnSpec {
                    name: "close".into(),
                    type_name: "double".into(),
                },
            ],
            location: location.to_string(),
            partition_keys: vec!["trade_date".into(), "symbol".into()],
        }
    }

    #[test]
    fn upsert_creates_then_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::new(dir.path());

        catalog.upsert_table(&spec("refined", "/lake/refined")).unwrap();
        catalog
            .upsert_table(&spec("refined", "/lake/refined_v2"))
            .unwrap();

        let desc = catalog.get_table("refined").unwrap().unwrap();
        assert_eq!(desc.spec.location, "/lake/refined_v2");
    }

    #[test]
    fn upsert_preserves_registered_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::new(dir.path());

        catalog.upsert_table(&spec("refined", "/lake/refined")).unwrap();
        catalog
            .add_partition(
                "refined",
                &["2024-01-02".into(), "AAA".into()],
                "/lake/refined/trade_date=2024-01-02/symbol=AAA",
            )
            .unwrap();

        catalog.upsert_table(&spec("refined", "/lake/refined")).unwrap();
        let desc = catalog.get_table("refined").unwrap().unwrap();
        assert_eq!(desc.partitions.len(), 1);
    }

    #[test]
    fn reregistering_a_partition_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::new(dir.path());
        catalog.upsert_table(&spec("refined", "/lake/refined")).unwrap();

        let values = vec!["2024-01-02".to_string(), "AAA".to_string()];
        let first = catalog
            .add_partition("refined", &values, "/lake/refined/p1")
            .unwrap();
        let second = catalog
            .add_partition("refined", &values, "/lake/refined/p1")
            .unwrap();

        assert_eq!(first, PartitionAdd::Created);
        assert_eq!(second, PartitionAdd::AlreadyExists);
        let desc = catalog.get_table("refined").unwrap().unwrap();
        assert_eq!(desc.partitions.len(), 1);
    }

    #[test]
    fn partition_on_unknown_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonCatalog::new(dir.path());
        let err = catalog
            .add_partition("ghost", &["x".into()], "/nowhere")
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTable(_)));
    }
}
