//! Locating class files.
//!
//! A [`ClassPath`] is an ordered list of places to look for `<name>.class`: directories, jars and classes held in
//! memory. The first entry having the class wins.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use walkdir::WalkDir;

pub mod mem;
pub mod zip;

pub use crate::mem::MemJar;
pub use crate::zip::FileJar;

/// The "Java File Separator". On Windows `;`, on unix-based ':'.
#[cfg(not(windows))]
pub const FILE_SEPARATOR: &str = ":";
#[cfg(windows)]
pub const FILE_SEPARATOR: &str = ";";

/// Something that can give the bytes of class files.
pub trait ClassSource: Debug + Send + Sync {
	/// Finds the bytes of a class by its internal name, like `java/lang/Object`.
	///
	/// Returns [`None`] if the class isn't there. Errors are for failures while reading.
	fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug)]
pub enum ClassPathEntry {
	Directory(PathBuf),
	Jar(FileJar),
	Memory(MemJar),
}

impl ClassPathEntry {
	fn find(&self, name: &str) -> Result<Option<Vec<u8>>> {
		match self {
			ClassPathEntry::Directory(dir) => {
				let path = dir.join(format!("{name}.class"));
				if !path.is_file() {
					return Ok(None);
				}
				std::fs::read(&path)
					.map(Some)
					.with_context(|| anyhow!("failed to read class file {path:?}"))
			},
			ClassPathEntry::Jar(jar) => jar.by_name(&format!("{name}.class")),
			ClassPathEntry::Memory(mem) => Ok(mem.get(name).map(<[u8]>::to_vec)),
		}
	}
}

#[derive(Debug, Default)]
pub struct ClassPath {
	entries: Vec<ClassPathEntry>,
}

impl ClassPath {
	pub fn new() -> ClassPath {
		ClassPath::default()
	}

	/// Parses a class path string, with entries separated by [`FILE_SEPARATOR`].
	///
	/// An entry ending in `*` stands for all the jars in that directory. Entries that don't exist are skipped.
	pub fn parse(class_path: &str) -> Result<ClassPath> {
		let mut result = ClassPath::new();
		for entry in class_path.split(FILE_SEPARATOR).filter(|entry| !entry.is_empty()) {
			result.push_path(Path::new(entry))
				.with_context(|| anyhow!("while adding class path entry {entry:?}"))?;
		}
		info!("class path has {} entries", result.entries.len());
		Ok(result)
	}

	/// Adds a directory, a jar, or with a trailing `*` all jars in a directory.
	pub fn push_path(&mut self, path: &Path) -> Result<()> {
		if path.file_name().is_some_and(|name| name == "*") {
			let dir = path.parent().unwrap_or(Path::new("."));
			let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
			return self.push_jars_in(dir);
		}

		if path.is_dir() {
			info!("adding directory {path:?} to the class path");
			self.entries.push(ClassPathEntry::Directory(path.to_owned()));
		} else if path.is_file() {
			info!("adding jar {path:?} to the class path");
			self.entries.push(ClassPathEntry::Jar(FileJar::open(path.to_owned())?));
		} else {
			warn!("class path entry {path:?} doesn't exist, skipping it");
		}
		Ok(())
	}

	fn push_jars_in(&mut self, dir: &Path) -> Result<()> {
		let jars: Vec<PathBuf> = WalkDir::new(dir)
			.max_depth(1)
			.sort_by_file_name() // make it deterministic
			.into_iter()
			.filter(|res| res.as_ref().is_ok_and(|entry| {
				entry.file_type().is_file() &&
					entry.path().extension().is_some_and(|ex| ex.eq_ignore_ascii_case("jar"))
			}))
			.map(|res| res.map(|entry| entry.into_path()))
			.collect::<Result<_, walkdir::Error>>()
			.with_context(|| anyhow!("failed to list jars in {dir:?}"))?;

		for jar in jars {
			info!("adding jar {jar:?} to the class path");
			self.entries.push(ClassPathEntry::Jar(FileJar::open(jar)?));
		}
		Ok(())
	}

	pub fn push(&mut self, entry: ClassPathEntry) {
		self.entries.push(entry);
	}

	pub fn push_memory(&mut self, mem: MemJar) {
		self.entries.push(ClassPathEntry::Memory(mem));
	}

	pub fn entries(&self) -> &[ClassPathEntry] {
		&self.entries
	}
}

impl From<MemJar> for ClassPath {
	fn from(value: MemJar) -> Self {
		ClassPath { entries: vec![ClassPathEntry::Memory(value)] }
	}
}

impl ClassSource for ClassPath {
	fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>> {
		if name.is_empty() || name.starts_with('/') || name.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
			bail!("invalid class name {name:?}");
		}

		for entry in &self.entries {
			if let Some(bytes) = entry.find(name)? {
				return Ok(Some(bytes));
			}
		}
		Ok(None)
	}
}

impl ClassSource for MemJar {
	fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.get(name).map(<[u8]>::to_vec))
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{ClassPath, ClassSource, MemJar};

	#[test]
	fn first_entry_wins() -> Result<()> {
		let mut class_path = ClassPath::new();
		class_path.push_memory([("a/B", vec![1])].into_iter().collect());
		class_path.push_memory([("a/B", vec![2]), ("a/C", vec![3])].into_iter().collect());

		assert_eq!(class_path.find_class("a/B")?, Some(vec![1]));
		assert_eq!(class_path.find_class("a/C")?, Some(vec![3]));
		assert_eq!(class_path.find_class("a/D")?, None);
		Ok(())
	}

	#[test]
	fn rejects_path_like_names() {
		let class_path = ClassPath::from(MemJar::new());
		assert!(class_path.find_class("../etc/passwd").is_err());
		assert!(class_path.find_class("/abs").is_err());
		assert!(class_path.find_class("a//b").is_err());
	}
}
