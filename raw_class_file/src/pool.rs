use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Entry {
	Utf8(Vec<u8>),
	Integer(i32),
	Float(u32),
	Long(i64),
	Double(u64),
	Class(u16),
	String(u16),
	FieldRef(u16, u16),
	MethodRef(u16, u16),
	InterfaceMethodRef(u16, u16),
	NameAndType(u16, u16),
	MethodHandle(u8, u16),
	MethodType(u16),
	Dynamic(u16, u16),
	InvokeDynamic(u16, u16),
}

/// A constant pool under construction. Each method returns the index of the (possibly already existing) entry.
#[derive(Debug, Clone)]
pub struct Pool {
	entries: Vec<Entry>,
	indices: HashMap<Entry, u16>,
	next: u16,
}

impl Default for Pool {
	fn default() -> Self {
		Pool { entries: Vec::new(), indices: HashMap::new(), next: 1 }
	}
}

impl Pool {
	fn intern(&mut self, entry: Entry) -> u16 {
		if let Some(&index) = self.indices.get(&entry) {
			return index;
		}
		let index = self.next;
		self.next += if matches!(entry, Entry::Long(_) | Entry::Double(_)) { 2 } else { 1 };
		self.indices.insert(entry.clone(), index);
		self.entries.push(entry);
		index
	}

	/// The `constant_pool_count` this pool will be written with.
	pub fn count(&self) -> u16 {
		self.next
	}

	pub fn utf8(&mut self, string: &str) -> u16 {
		self.intern(Entry::Utf8(to_modified_utf8(string)))
	}

	/// An `Utf8` entry with arbitrary content, possibly not valid modified UTF-8.
	pub fn utf8_bytes(&mut self, bytes: &[u8]) -> u16 {
		self.intern(Entry::Utf8(bytes.to_vec()))
	}

	pub fn integer(&mut self, value: i32) -> u16 {
		self.intern(Entry::Integer(value))
	}

	pub fn float(&mut self, value: f32) -> u16 {
		self.intern(Entry::Float(value.to_bits()))
	}

	pub fn long(&mut self, value: i64) -> u16 {
		self.intern(Entry::Long(value))
	}

	pub fn double(&mut self, value: f64) -> u16 {
		self.intern(Entry::Double(value.to_bits()))
	}

	pub fn class(&mut self, name: &str) -> u16 {
		let name_index = self.utf8(name);
		self.intern(Entry::Class(name_index))
	}

	pub fn string(&mut self, string: &str) -> u16 {
		let string_index = self.utf8(string);
		self.intern(Entry::String(string_index))
	}

	pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
		let name_index = self.utf8(name);
		let descriptor_index = self.utf8(descriptor);
		self.intern(Entry::NameAndType(name_index, descriptor_index))
	}

	pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
		let class_index = self.class(class);
		let name_and_type_index = self.name_and_type(name, descriptor);
		self.intern(Entry::FieldRef(class_index, name_and_type_index))
	}

	pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
		let class_index = self.class(class);
		let name_and_type_index = self.name_and_type(name, descriptor);
		self.intern(Entry::MethodRef(class_index, name_and_type_index))
	}

	pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
		let class_index = self.class(class);
		let name_and_type_index = self.name_and_type(name, descriptor);
		self.intern(Entry::InterfaceMethodRef(class_index, name_and_type_index))
	}

	/// A `MethodHandle` entry, see [`crate::reference_kind`] for the kinds.
	pub fn method_handle(&mut self, reference_kind: u8, reference_index: u16) -> u16 {
		self.intern(Entry::MethodHandle(reference_kind, reference_index))
	}

	pub fn method_type(&mut self, descriptor: &str) -> u16 {
		let descriptor_index = self.utf8(descriptor);
		self.intern(Entry::MethodType(descriptor_index))
	}

	pub fn dynamic(&mut self, bootstrap_method_attr_index: u16, name: &str, descriptor: &str) -> u16 {
		let name_and_type_index = self.name_and_type(name, descriptor);
		self.intern(Entry::Dynamic(bootstrap_method_attr_index, name_and_type_index))
	}

	pub fn invoke_dynamic(&mut self, bootstrap_method_attr_index: u16, name: &str, descriptor: &str) -> u16 {
		let name_and_type_index = self.name_and_type(name, descriptor);
		self.intern(Entry::InvokeDynamic(bootstrap_method_attr_index, name_and_type_index))
	}

	/// Writes `constant_pool_count` followed by all the entries.
	pub(crate) fn write(&self, out: &mut Vec<u8>) {
		out.extend(self.next.to_be_bytes());
		for entry in &self.entries {
			match *entry {
				Entry::Utf8(ref bytes) => {
					out.push(1);
					out.extend((bytes.len() as u16).to_be_bytes());
					out.extend(bytes);
				},
				Entry::Integer(value) => { out.push(3); out.extend(value.to_be_bytes()); },
				Entry::Float(bits) => { out.push(4); out.extend(bits.to_be_bytes()); },
				Entry::Long(value) => { out.push(5); out.extend(value.to_be_bytes()); },
				Entry::Double(bits) => { out.push(6); out.extend(bits.to_be_bytes()); },
				Entry::Class(a) => { out.push(7); out.extend(a.to_be_bytes()); },
				Entry::String(a) => { out.push(8); out.extend(a.to_be_bytes()); },
				Entry::FieldRef(a, b) => { out.push(9); out.extend(a.to_be_bytes()); out.extend(b.to_be_bytes()); },
				Entry::MethodRef(a, b) => { out.push(10); out.extend(a.to_be_bytes()); out.extend(b.to_be_bytes()); },
				Entry::InterfaceMethodRef(a, b) => { out.push(11); out.extend(a.to_be_bytes()); out.extend(b.to_be_bytes()); },
				Entry::NameAndType(a, b) => { out.push(12); out.extend(a.to_be_bytes()); out.extend(b.to_be_bytes()); },
				Entry::MethodHandle(kind, a) => { out.push(15); out.push(kind); out.extend(a.to_be_bytes()); },
				Entry::MethodType(a) => { out.push(16); out.extend(a.to_be_bytes()); },
				Entry::Dynamic(a, b) => { out.push(17); out.extend(a.to_be_bytes()); out.extend(b.to_be_bytes()); },
				Entry::InvokeDynamic(a, b) => { out.push(18); out.extend(a.to_be_bytes()); out.extend(b.to_be_bytes()); },
			}
		}
	}
}

/// Encodes a string the way class files store them: `U+0000` as two bytes and supplementary characters as surrogate pairs.
fn to_modified_utf8(string: &str) -> Vec<u8> {
	let mut out = Vec::with_capacity(string.len());
	for unit in string.encode_utf16() {
		match unit {
			0x0001..=0x007f => out.push(unit as u8),
			0x0000 | 0x0080..=0x07ff => {
				out.push(0xc0 | (unit >> 6) as u8);
				out.push(0x80 | (unit & 0x3f) as u8);
			},
			_ => {
				out.push(0xe0 | (unit >> 12) as u8);
				out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
				out.push(0x80 | (unit & 0x3f) as u8);
			},
		}
	}
	out
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::pool::{Pool, to_modified_utf8};

	#[test]
	fn interning() {
		let mut pool = Pool::default();
		let a = pool.method_ref("Foo", "bar", "()V");
		let b = pool.method_ref("Foo", "bar", "()V");
		assert_eq!(a, b);
		// Utf8 Foo, Class, Utf8 bar, Utf8 ()V, NameAndType, MethodRef
		assert_eq!(pool.count(), 7);

		let long = pool.long(5);
		assert_eq!(long, 7);
		assert_eq!(pool.count(), 9);
	}

	#[test]
	fn modified_utf8() {
		assert_eq!(to_modified_utf8("a\0b"), vec![b'a', 0xc0, 0x80, b'b']);
		assert_eq!(to_modified_utf8("\u{1F600}").len(), 6);
	}
}
