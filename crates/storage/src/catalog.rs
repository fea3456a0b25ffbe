use fdq_common::{FdqError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::schema::default_aliases;

/// Option key prefix mapping a source header to a canonical column,
/// e.g. `"alias.Avg_Rating": "restaurant_avg_rating"`.
pub const ALIAS_OPTION_PREFIX: &str = "alias.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub uri: String,
    pub format: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            format: format.into(),
            options: HashMap::new(),
        }
    }

    /// Lowercased source header -> canonical column name. Explicit `alias.` options
    /// override the table's default aliases.
    pub fn column_aliases(&self) -> HashMap<String, String> {
        let mut aliases: HashMap<String, String> = default_aliases(&self.name)
            .iter()
            .map(|(src, dst)| (src.to_string(), dst.to_string()))
            .collect();
        aliases.extend(self.options.iter().filter_map(|(k, v)| {
            k.strip_prefix(ALIAS_OPTION_PREFIX)
                .map(|src| (src.to_ascii_lowercase(), v.clone()))
        }));
        aliases
    }

    pub fn delimiter(&self) -> Result<u8> {
        match self.options.get("delimiter") {
            None => Ok(b','),
            Some(d) if d.len() == 1 => Ok(d.as_bytes()[0]),
            Some(d) => Err(FdqError::InvalidConfig(format!(
                "table {}: delimiter must be a single byte, got {d:?}",
                self.name
            ))),
        }
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if self.uri.trim().is_empty() {
            return Err(FdqError::InvalidConfig(format!(
                "table {} has no uri",
                self.name
            )));
        }
        Ok(PathBuf::from(&self.uri))
    }
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tables: BTreeMap<String, TableDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| FdqError::Planning(format!("unknown table: {name}")))
    }

    /// Tables in name order.
    pub fn tables(&self) -> Vec<TableDef> {
        self.tables.values().cloned().collect()
    }

    /// Load a JSON array of table definitions. Relative `uri`s resolve against
    /// the catalog file's directory.
    pub fn load_from_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)?;
        let tables: Vec<TableDef> =
            serde_json::from_str(&s).map_err(|e| FdqError::InvalidConfig(e.to_string()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut cat = Catalog::new();
        for mut t in tables {
            let uri = Path::new(&t.uri);
            if uri.is_relative() && !t.uri.is_empty() {
                t.uri = base.join(uri).to_string_lossy().into_owned();
            }
            cat.register_table(t);
        }
        Ok(cat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_resolves_relative_uris() {
        let dir = std::env::temp_dir().join(format!(
            "fdq_catalog_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"name":"orders","uri":"orders.csv","format":"csv",
                 "options":{"alias.Order_Amount":"order_value","delimiter":";"}}]"#,
        )
        .expect("write");

        let cat = Catalog::load_from_json(&path).expect("load");
        let t = cat.get("orders").expect("orders");
        assert_eq!(t.data_path().expect("path"), dir.join("orders.csv"));
        assert_eq!(
            t.column_aliases().get("order_amount").map(String::as_str),
            Some("order_value")
        );
        assert_eq!(t.delimiter().expect("delimiter"), b';');
        assert!(matches!(cat.get("nope"), Err(FdqError::Planning(_))));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn dimension_tables_alias_unprefixed_headers() {
        let customers = TableDef::new("customers", "customers.csv", "csv");
        assert_eq!(
            customers.column_aliases().get("city").map(String::as_str),
            Some("customer_city")
        );

        let mut restaurants = TableDef::new("restaurants", "restaurants.csv", "csv");
        assert_eq!(
            restaurants.column_aliases().get("avg_rating").map(String::as_str),
            Some("restaurant_avg_rating")
        );
        restaurants
            .options
            .insert("alias.City".to_string(), "restaurant_name".to_string());
        assert_eq!(
            restaurants.column_aliases().get("city").map(String::as_str),
            Some("restaurant_name")
        );

        assert!(TableDef::new("orders", "orders.csv", "csv")
            .column_aliases()
            .get("city")
            .is_none());
    }
}
