use indexmap::IndexMap;

/// Classes held in memory, keyed by their internal name.
#[derive(Debug, Clone, Default)]
pub struct MemJar {
	classes: IndexMap<String, Vec<u8>>,
}

impl MemJar {
	pub fn new() -> MemJar {
		MemJar::default()
	}

	/// Adds a class, replacing an earlier one of the same name.
	pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
		self.classes.insert(name.into(), bytes);
	}

	pub fn get(&self, name: &str) -> Option<&[u8]> {
		self.classes.get(name).map(Vec::as_slice)
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}

	pub fn names(&self) -> impl Iterator<Item=&str> {
		self.classes.keys().map(String::as_str)
	}
}

impl<S: Into<String>> FromIterator<(S, Vec<u8>)> for MemJar {
	fn from_iter<T: IntoIterator<Item=(S, Vec<u8>)>>(iter: T) -> Self {
		MemJar {
			classes: iter.into_iter().map(|(name, bytes)| (name.into(), bytes)).collect(),
		}
	}
}

impl<S: Into<String>> Extend<(S, Vec<u8>)> for MemJar {
	fn extend<T: IntoIterator<Item=(S, Vec<u8>)>>(&mut self, iter: T) {
		self.classes.extend(iter.into_iter().map(|(name, bytes)| (name.into(), bytes)));
	}
}
