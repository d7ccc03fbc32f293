//! Read and write circuits to files

mod bench;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub use bench::{read_bench, write_bench};

use crate::{Circuit, Error, Result};

fn unknown_extension(path: &Path) -> Error {
    match path.extension() {
        None => Error::Precondition(format!("No extension given for {}", path.display())),
        Some(s) => Error::Precondition(format!("Unknown extension {}", s.to_string_lossy())),
    }
}

/// Read a circuit from a file, named after the file stem
///
/// Following extensions are supported: .bench
pub fn read_circuit_file(path: &Path) -> Result<Circuit> {
    match path.extension() {
        Some(s) if s == "bench" => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let f = File::open(path)?;
            read_bench(f, &name)
        }
        _ => Err(unknown_extension(path)),
    }
}

/// Write a circuit to a file
///
/// Following extensions are supported: .bench
pub fn write_circuit_file(path: &Path, c: &Circuit) -> Result<()> {
    match path.extension() {
        Some(s) if s == "bench" => {
            let mut f = BufWriter::new(File::create(path)?);
            write_bench(&mut f, c)?;
            f.flush()?;
            Ok(())
        }
        _ => Err(unknown_extension(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::generators::adder;

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adder.bench");
        let c = adder::ripple_carry(2, false, true).unwrap();
        write_circuit_file(&path, &c).unwrap();
        let d = read_circuit_file(&path).unwrap();
        assert_eq!(d.name(), "adder");
        assert_eq!(d.inputs(), c.inputs());
        assert_eq!(d.outputs(), c.outputs());
    }

    #[test]
    fn test_unknown_extension() {
        let c = Circuit::new("c");
        assert!(matches!(
            read_circuit_file(Path::new("c.blif")),
            Err(Error::Precondition(_))
        ));
        assert!(matches!(
            write_circuit_file(Path::new("c"), &c),
            Err(Error::Precondition(_))
        ));
    }
}
