use std::fs::File;

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdq_common::{FdqError, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::catalog::TableDef;
use crate::provider::{conform_batch, StorageProvider, DEFAULT_BATCH_ROWS};
use crate::snapshot::MemTable;

pub struct ParquetProvider {
    batch_size_rows: usize,
}

impl ParquetProvider {
    pub fn new() -> Self {
        Self {
            batch_size_rows: DEFAULT_BATCH_ROWS,
        }
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size_rows = rows.max(1);
        self
    }
}

impl Default for ParquetProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for ParquetProvider {
    fn format(&self) -> &'static str {
        "parquet"
    }

    fn scan(&self, table: &TableDef, target: Option<SchemaRef>) -> Result<MemTable> {
        let path = table.data_path()?;
        let file = File::open(&path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| FdqError::Execution(format!("parquet reader build failed: {e}")))?;
        let file_schema = builder.schema().clone();
        let reader = builder
            .with_batch_size(self.batch_size_rows)
            .build()
            .map_err(|e| FdqError::Execution(format!("parquet reader open failed: {e}")))?;

        let aliases = table.column_aliases();
        let schema = target.unwrap_or(file_schema);
        let mut batches = Vec::<RecordBatch>::new();
        for batch in reader {
            let batch =
                batch.map_err(|e| FdqError::Execution(format!("parquet decode failed: {e}")))?;
            batches.push(conform_batch(&batch, &schema, &aliases)?);
        }
        Ok(MemTable::new(schema, batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::restaurants_schema;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    #[test]
    fn reads_and_casts_parquet_columns() {
        let path =
            std::env::temp_dir().join(format!("fdq_parquet_{}.parquet", std::process::id()));
        let schema = Arc::new(Schema::new(vec![
            Field::new("Restaurant_ID", DataType::Utf8, false),
            Field::new("Cuisine_Type", DataType::Utf8, true),
            Field::new("Avg_Rating", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["R1", "R2"])),
                Arc::new(StringArray::from(vec!["Thai", "Pizza"])),
                Arc::new(Int64Array::from(vec![4, 5])),
            ],
        )
        .expect("batch");
        let file = File::create(&path).expect("create parquet");
        let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
        writer.write(&batch).expect("write");
        writer.close().expect("close");

        let mut table = TableDef::new("restaurants", path.to_string_lossy(), "parquet");
        table.options.insert(
            "alias.Avg_Rating".to_string(),
            "restaurant_avg_rating".to_string(),
        );
        let mem = ParquetProvider::new()
            .scan(&table, Some(restaurants_schema()))
            .expect("scan");
        assert_eq!(mem.num_rows(), 2);
        let rating = mem.batches()[0]
            .column_by_name("restaurant_avg_rating")
            .expect("rating")
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("f64");
        assert_eq!(rating.value(1), 5.0);

        let _ = std::fs::remove_file(path);
    }
}
