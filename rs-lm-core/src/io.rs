use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{LmError, Result};

/// Reads a UTF-8 text file and returns its lines.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
///
/// # Errors
/// `Io` if the file cannot be read, `InvalidInput` if it is not UTF-8.
pub(crate) fn read_lines<P: AsRef<Path>>(filename: P) -> Result<Vec<String>> {
	let path = filename.as_ref();
	let bytes = fs::read(path)?;
	let contents = String::from_utf8(bytes)
		.map_err(|e| LmError::InvalidInput(format!("{} is not UTF-8 text: {e}", path.display())))?;
	Ok(contents.lines().map(str::to_owned).collect())
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `data/input.txt` + `"bin"` → `data/input.bin`
pub(crate) fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| LmError::InvalidInput(format!("{} has no filename", input_path.display())))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a half-written file.
///
/// Missing parent directories are created.
pub(crate) fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
	let path = path.as_ref();
	let parent = match path.parent() {
		Some(p) if !p.as_os_str().is_empty() => p,
		_ => Path::new("."),
	};
	fs::create_dir_all(parent)?;

	let mut temp_file = NamedTempFile::new_in(parent)?;
	temp_file.write_all(bytes)?;
	temp_file.flush()?;
	temp_file.persist(path).map_err(|e| LmError::Io(e.error))?;
	Ok(())
}
