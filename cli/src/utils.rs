use std::fs;
use std::io::{self, Read, Write};

use crate::error::Result;

/// Read input from a file or stdin
///
/// `None` and `Some("-")` read from stdin.
pub(crate) fn read_input(file: Option<&str>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path != "-" => Ok(fs::read(path)?),
        _ => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Write output to a file or stdout
pub(crate) fn write_output(file: Option<&str>, data: &[u8]) -> Result<()> {
    match file {
        Some(path) if path != "-" => Ok(fs::write(path, data)?),
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
