//! Streaming reader for command scripts
//!
//! Provides an iterator over `ScriptCommand`s read from a CSV file. Format
//! concerns are delegated to the csv_format module.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as `Err` items, so one bad row does
//!   not stop the script
//! - Line numbers are included in error messages for debugging

use crate::io::csv_format::{convert_script_record, ScriptCommand, ScriptRecord};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Command script reader
///
/// Reads one row at a time; memory use does not grow with the file size.
#[derive(Debug)]
pub struct ScriptReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl ScriptReader {
    /// Open a script file
    ///
    /// The CSV reader trims whitespace from all fields and allows rows with
    /// trailing columns left out.
    ///
    /// # Returns
    ///
    /// * `Ok(ScriptReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for ScriptReader {
    type Item = Result<ScriptCommand, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<ScriptRecord>();
        let next = deserializer.next()?;

        // Line 1 is the header
        self.line_num += 1;
        let line = self.line_num + 1;

        Some(match next {
            Ok(record) => convert_script_record(record).map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}
