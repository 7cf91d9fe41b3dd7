use candyroute::interfaces::csv::command_reader::HEADER;
use std::io::Write;
use tempfile::NamedTempFile;

/// Writes an operations CSV with the standard header and the given rows.
pub fn ops_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}
