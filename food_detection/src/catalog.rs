use crate::config::CatalogConfig;
use config::{FileFormat, Source};
use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use thiserror::Error;

/// Unit price charged for a label the catalog does not know.
pub const DEFAULT_PRICE: f64 = 30.0;
/// Calorie estimate reported for a label the catalog does not know.
pub const DEFAULT_CALORIES: u32 = 200;

const EMBEDDED_CATALOG: &str = include_str!("../configuration/catalog.yaml");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Source(#[from] config::ConfigError),
    #[error("duplicate catalog label: {0}")]
    DuplicateLabel(String),
    #[error("invalid price {price} for label {label}")]
    InvalidPrice { label: String, price: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub price: f64,
    pub calories: u32,
}

impl CatalogEntry {
    pub const DEFAULT: CatalogEntry = CatalogEntry {
        price: DEFAULT_PRICE,
        calories: DEFAULT_CALORIES,
    };
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    items: Vec<CatalogItem>,
}

#[derive(Debug, Deserialize)]
struct CatalogItem {
    label: String,
    price: f64,
    calories: u32,
}

/// Immutable label -> (price, calories) table.
#[derive(Debug, Clone)]
pub struct ClassCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ClassCatalog {
    pub fn load(catalog_config: &CatalogConfig) -> Result<Self, CatalogError> {
        match &catalog_config.file {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_source(config::File::from_str(EMBEDDED_CATALOG, FileFormat::Yaml))
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        Self::from_source(config::File::from(path).format(FileFormat::Yaml))
    }

    fn from_source<S>(source: S) -> Result<Self, CatalogError>
    where
        S: Source + Send + Sync + 'static,
    {
        let file = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize::<CatalogFile>()?;

        Self::from_entries(
            file.items
                .into_iter()
                .map(|item| (item.label, item.price, item.calories)),
        )
    }

    pub fn from_entries<I>(items: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (String, f64, u32)>,
    {
        let mut entries = HashMap::new();
        for (label, price, calories) in items {
            if !price.is_finite() || price < 0.0 {
                return Err(CatalogError::InvalidPrice { label, price });
            }
            if entries.contains_key(&label) {
                return Err(CatalogError::DuplicateLabel(label));
            }
            entries.insert(label, CatalogEntry { price, calories });
        }

        Ok(Self { entries })
    }

    pub fn entry_for(&self, label: &str) -> CatalogEntry {
        self.entries
            .get(label)
            .copied()
            .unwrap_or(CatalogEntry::DEFAULT)
    }

    pub fn price_for(&self, label: &str) -> f64 {
        self.entry_for(label).price
    }

    pub fn calories_for(&self, label: &str) -> u32 {
        self.entry_for(label).calories
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_has_all_categories() {
        let catalog = ClassCatalog::embedded().unwrap();
        assert_eq!(catalog.len(), 18);
        assert!(catalog.contains("haslanmis-yumurta"));
        assert!(catalog.contains("su-sisesi"));
    }

    #[test]
    fn test_known_labels() {
        let catalog = ClassCatalog::embedded().unwrap();

        assert_eq!(catalog.price_for("cay"), 10.0);
        assert_eq!(catalog.calories_for("cay"), 2);
        assert_eq!(catalog.price_for("ana-yemek"), 55.0);
        assert_eq!(catalog.calories_for("ana-yemek"), 450);
        assert_eq!(catalog.price_for("corba"), 35.0);
        assert_eq!(catalog.calories_for("corba"), 150);
        assert_eq!(catalog.calories_for("su-sisesi"), 0);
    }

    #[test]
    fn test_unknown_labels_fall_back_to_default() {
        let catalog = ClassCatalog::embedded().unwrap();

        for label in ["pizza", "Class 42", "", "CAY"] {
            assert_eq!(catalog.price_for(label), DEFAULT_PRICE);
            assert_eq!(catalog.calories_for(label), DEFAULT_CALORIES);
        }
    }

    #[test]
    fn test_external_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(
            &path,
            "items:\n  - label: lahmacun\n    price: 60.0\n    calories: 500\n",
        )
        .unwrap();

        let catalog = ClassCatalog::load(&CatalogConfig {
            file: Some(path),
        })
        .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entry_for("lahmacun"), CatalogEntry {
            price: 60.0,
            calories: 500
        });
        assert_eq!(catalog.entry_for("cay"), CatalogEntry::DEFAULT);
    }

    #[test]
    fn test_rejects_negative_price() {
        let result = ClassCatalog::from_entries(vec![("kek".to_string(), -1.0, 280)]);
        assert!(matches!(result, Err(CatalogError::InvalidPrice { .. })));
    }

    #[test]
    fn test_rejects_duplicate_label() {
        let result = ClassCatalog::from_entries(vec![
            ("kek".to_string(), 25.0, 280),
            ("kek".to_string(), 26.0, 281),
        ]);
        assert!(matches!(result, Err(CatalogError::DuplicateLabel(label)) if label == "kek"));
    }
}
