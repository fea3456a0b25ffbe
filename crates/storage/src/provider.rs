use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{new_null_array, ArrayRef};
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdq_common::{FdqError, Result};
use tracing::debug;

use crate::catalog::TableDef;
use crate::csv_provider::CsvProvider;
use crate::parquet_provider::ParquetProvider;
use crate::snapshot::MemTable;

pub const DEFAULT_BATCH_ROWS: usize = 8192;

/// Storage abstraction for loading a table into memory.
///
/// Implementations are format-specific (csv, parquet). A provider reads the whole table
/// and conforms it to `target` when the table has a canonical schema.
pub trait StorageProvider: Send + Sync {
    fn format(&self) -> &'static str;

    /// Reads the table described by `table`.
    ///
    /// # Errors
    /// Returns an error for a missing file, undecodable content, or a required canonical
    /// column absent from the source.
    fn scan(&self, table: &TableDef, target: Option<SchemaRef>) -> Result<MemTable>;
}

/// Pick the provider for a table's `format`, decoding `batch_size_rows` rows at a time.
pub fn provider_for(table: &TableDef, batch_size_rows: usize) -> Result<Box<dyn StorageProvider>> {
    match table.format.to_ascii_lowercase().as_str() {
        "csv" => Ok(Box::new(CsvProvider::new().with_batch_size(batch_size_rows))),
        "parquet" => Ok(Box::new(ParquetProvider::new().with_batch_size(batch_size_rows))),
        other => Err(FdqError::Unsupported(format!(
            "table {}: format not supported: {other}",
            table.name
        ))),
    }
}

/// Reorder, rename, and cast a source batch into `target`.
///
/// Source columns match target columns case-insensitively or through `aliases`
/// (lowercased source name -> target name). Missing nullable target columns become
/// all-NULL; unparsable values cast to NULL. Extra source columns are dropped.
pub fn conform_batch(
    batch: &RecordBatch,
    target: &SchemaRef,
    aliases: &HashMap<String, String>,
) -> Result<RecordBatch> {
    let source = batch.schema();
    let mut by_target: HashMap<String, usize> = HashMap::new();
    for (idx, field) in source.fields().iter().enumerate() {
        let lowered = field.name().trim().to_ascii_lowercase();
        let name = aliases.get(&lowered).cloned().unwrap_or(lowered);
        by_target.entry(name).or_insert(idx);
    }

    let mut cols: Vec<ArrayRef> = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        match by_target.remove(field.name()) {
            Some(idx) => {
                let col = batch.column(idx);
                let col = if col.data_type() == field.data_type() {
                    col.clone()
                } else {
                    cast(col, field.data_type()).map_err(|e| {
                        FdqError::Execution(format!(
                            "cannot convert column {} from {:?} to {:?}: {e}",
                            field.name(),
                            col.data_type(),
                            field.data_type()
                        ))
                    })?
                };
                if !field.is_nullable() && col.null_count() > 0 {
                    return Err(FdqError::Execution(format!(
                        "column {} contains NULL but is declared NOT NULL",
                        field.name()
                    )));
                }
                cols.push(col);
            }
            None if field.is_nullable() => {
                cols.push(new_null_array(field.data_type(), batch.num_rows()));
            }
            None => {
                return Err(FdqError::Execution(format!(
                    "required column {} missing from source",
                    field.name()
                )));
            }
        }
    }
    if !by_target.is_empty() {
        let mut extra: Vec<_> = by_target.into_keys().collect();
        extra.sort();
        debug!(columns = ?extra, "dropping source columns without a canonical target");
    }

    RecordBatch::try_new(Arc::clone(target), cols)
        .map_err(|e| FdqError::Execution(format!("conformed batch build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};

    fn source() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Amount", DataType::Utf8, true),
            Field::new("Restaurant_ID", DataType::Utf8, true),
            Field::new("Unused", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("12.5"), Some("n/a")])),
                Arc::new(StringArray::from(vec![Some("R1"), Some("R2")])),
                Arc::new(StringArray::from(vec![Some("x"), Some("y")])),
            ],
        )
        .expect("batch")
    }

    #[test]
    fn conforms_by_name_alias_and_type() {
        let target = Arc::new(Schema::new(vec![
            Field::new("restaurant_id", DataType::Utf8, false),
            Field::new("order_value", DataType::Float64, true),
            Field::new("city", DataType::Utf8, true),
        ]));
        let aliases = HashMap::from([("amount".to_string(), "order_value".to_string())]);
        let out = conform_batch(&source(), &target, &aliases).expect("conform");

        assert_eq!(out.schema(), target);
        let value = out
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("f64");
        assert_eq!(value.value(0), 12.5);
        assert!(value.is_null(1));
        assert_eq!(out.column(2).null_count(), 2);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let target = Arc::new(Schema::new(vec![Field::new(
            "order_id",
            DataType::Utf8,
            false,
        )]));
        let err = conform_batch(&source(), &target, &HashMap::new()).expect_err("missing");
        assert!(err.to_string().contains("order_id"));
    }
}
