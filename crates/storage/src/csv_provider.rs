use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use fdq_common::{FdqError, Result};

use crate::catalog::TableDef;
use crate::provider::{conform_batch, StorageProvider, DEFAULT_BATCH_ROWS};
use crate::snapshot::MemTable;

/// Reads delimited text with a header row.
///
/// Every column is read as text first and cast to the canonical type afterwards, so a
/// malformed cell becomes NULL instead of failing the whole file.
pub struct CsvProvider {
    batch_size_rows: usize,
}

impl CsvProvider {
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

impl Default for CsvProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for CsvProvider {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn scan(&self, table: &TableDef, target: Option<SchemaRef>) -> Result<MemTable> {
        let path = table.data_path()?;
        let delimiter = table.delimiter()?;
        let file_schema = read_header_schema(&path, delimiter)?;

        let file = File::open(&path)?;
        let reader = ReaderBuilder::new(file_schema.clone())
            .with_header(true)
            .with_delimiter(delimiter)
            .with_batch_size(self.batch_size_rows)
            .build(file)
            .map_err(|e| FdqError::Execution(format!("csv reader open failed: {e}")))?;

        let aliases = table.column_aliases();
        let schema = target.unwrap_or_else(|| file_schema.clone());
        let mut batches = Vec::<RecordBatch>::new();
        for batch in reader {
            let batch = batch.map_err(|e| {
                FdqError::Execution(format!("csv decode failed for {}: {e}", path.display()))
            })?;
            batches.push(conform_batch(&batch, &schema, &aliases)?);
        }
        Ok(MemTable::new(schema, batches))
    }
}

fn read_header_schema(path: &Path, delimiter: u8) -> Result<SchemaRef> {
    let file = File::open(path)?;
    let mut first = String::new();
    BufReader::new(file).read_line(&mut first)?;
    let header = first.trim_end_matches(['\r', '\n']);
    if header.trim().is_empty() {
        return Err(FdqError::Execution(format!(
            "csv file {} has no header row",
            path.display()
        )));
    }
    let fields = header
        .split(delimiter as char)
        .map(|name| {
            let name = name.trim().trim_matches('"');
            Field::new(name, DataType::Utf8, true)
        })
        .collect::<Vec<_>>();
    Ok(Arc::new(Schema::new(fields)))
}
