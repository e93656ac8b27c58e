use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use log::info;
use parking_lot::Mutex;
use zip::result::ZipError;
use zip::ZipArchive;

/// A jar (or any zip archive) on disk.
///
/// The archive is opened once, its central directory is kept around for lookups.
#[derive(Debug)]
pub struct FileJar {
	path: PathBuf,
	archive: Mutex<ZipArchive<File>>,
}

impl FileJar {
	pub fn open(path: PathBuf) -> Result<FileJar> {
		let file = File::open(&path)
			.with_context(|| anyhow!("could not open file {path:?}"))?;
		let archive = ZipArchive::new(file)
			.with_context(|| anyhow!("failed to read zip archive from {path:?}"))?;
		Ok(FileJar { path, archive: Mutex::new(archive) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Reads the entry with the given name, or returns [`None`] if there's no such entry.
	pub fn by_name(&self, name: &str) -> Result<Option<Vec<u8>>> {
		let mut archive = self.archive.lock();
		let mut file = match archive.by_name(name) {
			Ok(file) => file,
			Err(ZipError::FileNotFound) => return Ok(None),
			Err(e) => return Err(anyhow!("could not get file {name} from zip {:?}: {e}", self.path)),
		};

		let capacity = file.size()
			.try_into()
			.unwrap_or_else(|x| {
				info!("size of zip file {name:?} doesn't fit in usize: {x:?}");
				0
			});
		let mut data = Vec::with_capacity(capacity);
		file.read_to_end(&mut data)
			.with_context(|| anyhow!("failed to read {name} from zip {:?}", self.path))?;
		Ok(Some(data))
	}
}
