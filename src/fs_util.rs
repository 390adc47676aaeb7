use std::fs::{self, File};
use std::io::{BufWriter, Write};

use camino::Utf8Path;

use crate::error::RvarError;

/// Writes `dest` through a temp file in the same directory and renames it into place.
pub fn write_atomic<F>(dest: &Utf8Path, write: F) -> Result<(), RvarError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<(), RvarError>,
{
    let parent = match dest.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RvarError::Filesystem(format!("create {parent}: {err}")))?;
    let temp = tempfile::Builder::new()
        .prefix(".rvar-data")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RvarError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|err| RvarError::Filesystem(format!("write {dest}: {err}")))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| RvarError::Filesystem(format!("persist {dest}: {err}")))?;
    Ok(())
}
