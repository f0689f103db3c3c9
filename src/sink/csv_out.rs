use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::types::Table;

/// Header then rows, comma-separated, into any writer.
pub fn write_to<W: Write>(out: W, table: &Table) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
    writer.write_record(&table.header)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(table.rows.len())
}

pub fn write_file(path: &Path, table: &Table) -> Result<usize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    write_to(File::create(path)?, table)
}
