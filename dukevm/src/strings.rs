//! Guest strings: conversions between the UTF-16 contents of `java/lang/String` objects and host strings, and the
//! table of interned strings.

use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};
use parking_lot::Mutex;
use crate::error::VmResult;
use crate::object::{Object, ObjectRef, Payload};
use crate::thread::Thread;
use crate::vm::Vm;

pub const STRING: &str = "java/lang/String";

/// Decodes the modified UTF-8 form of a [`JavaStr`] into UTF-16 code units.
pub fn units_from_java(string: &JavaStr) -> Vec<u16> {
	let bytes = string.to_modified_utf8();
	let mut units = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		let b0 = bytes[i] as u16;
		let (unit, width) = if b0 & 0x80 == 0 {
			(b0, 1)
		} else if b0 & 0xe0 == 0xc0 && i + 1 < bytes.len() {
			(((b0 & 0x1f) << 6) | (bytes[i + 1] as u16 & 0x3f), 2)
		} else if i + 2 < bytes.len() {
			(((b0 & 0x0f) << 12) | ((bytes[i + 1] as u16 & 0x3f) << 6) | (bytes[i + 2] as u16 & 0x3f), 3)
		} else {
			// can't happen for the output of `to_modified_utf8`
			(0xfffd, 1)
		};
		units.push(unit);
		i += width;
	}
	units
}

/// Encodes UTF-16 code units, possibly with unpaired surrogates, into a [`JavaString`].
pub fn java_from_units(units: &[u16]) -> Result<JavaString> {
	let mut bytes = Vec::with_capacity(units.len());
	for &unit in units {
		match unit {
			0x0001..=0x007f => bytes.push(unit as u8),
			0x0000 | 0x0080..=0x07ff => {
				bytes.push(0xc0 | (unit >> 6) as u8);
				bytes.push(0x80 | (unit & 0x3f) as u8);
			},
			_ => {
				bytes.push(0xe0 | (unit >> 12) as u8);
				bytes.push(0x80 | ((unit >> 6) & 0x3f) as u8);
				bytes.push(0x80 | (unit & 0x3f) as u8);
			},
		}
	}
	JavaString::from_modified_utf8(bytes)
		.with_context(|| anyhow!("utf-16 code units don't form a java string"))
}

/// Converts UTF-16 code units to a host string, replacing unpaired surrogates.
pub fn to_rust_string(units: &[u16]) -> String {
	String::from_utf16_lossy(units)
}

/// The `String.hashCode` of the given contents.
pub fn hash_code(units: &[u16]) -> i32 {
	units.iter().fold(0i32, |hash, &unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// The strings interned by `String.intern` and by `ldc`.
#[derive(Debug, Default)]
pub(crate) struct StringTable {
	interned: Mutex<HashMap<Vec<u16>, ObjectRef>>,
}

impl StringTable {
	pub(crate) fn len(&self) -> usize {
		self.interned.lock().len()
	}
}

impl Vm {
	/// Creates a new, not interned, `java/lang/String`.
	pub fn new_string(&self, thread: &mut Thread, units: Vec<u16>) -> VmResult<ObjectRef> {
		let class = self.load_class(thread, STRING)?;
		let string = Object::new_instance(class)?;
		string.set_payload(Payload::String(units));
		Ok(string)
	}

	/// Creates a new `java/lang/String` from a host string.
	pub fn new_rust_string(&self, thread: &mut Thread, string: &str) -> VmResult<ObjectRef> {
		self.new_string(thread, string.encode_utf16().collect())
	}

	/// Gets the interned `java/lang/String` with these contents, creating it if needed.
	pub fn intern(&self, thread: &mut Thread, units: Vec<u16>) -> VmResult<ObjectRef> {
		if let Some(string) = self.strings.interned.lock().get(&units) {
			return Ok(string.clone());
		}
		// not holding the lock while creating the object, which might load a class
		let string = self.new_string(thread, units.clone())?;
		Ok(self.strings.interned.lock().entry(units).or_insert(string).clone())
	}

	/// Gets the contents of a `java/lang/String` as a host string.
	pub fn rust_string(&self, string: &Object) -> VmResult<String> {
		string.string_units()
			.map(|units| to_rust_string(&units))
			.ok_or_else(|| crate::error::fatal!("{string:?} is not a string created by the runtime"))
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::strings::{hash_code, java_from_units, to_rust_string, units_from_java};

	#[test]
	fn units() -> Result<()> {
		let units = units_from_java(JavaStr::from_str("a\0\u{e9}\u{20ac}\u{1F600}"));
		assert_eq!(units, vec![0x61, 0x0, 0xe9, 0x20ac, 0xd83d, 0xde00]);
		assert_eq!(to_rust_string(&units), "a\0\u{e9}\u{20ac}\u{1F600}");
		assert_eq!(java_from_units(&units)?, JavaStr::from_str("a\0\u{e9}\u{20ac}\u{1F600}"));
		Ok(())
	}

	#[test]
	fn lone_surrogates_survive() -> Result<()> {
		let units = vec![0xd800, 0x41];
		let string = java_from_units(&units)?;
		assert_eq!(units_from_java(&string), units);
		assert_eq!(to_rust_string(&units), "\u{fffd}A");
		Ok(())
	}

	#[test]
	fn hash_codes() {
		assert_eq!(hash_code(&[]), 0);
		assert_eq!(hash_code(&"hello".encode_utf16().collect::<Vec<_>>()), 99162322);
		assert_eq!(hash_code(&"polygenelubricants".encode_utf16().collect::<Vec<_>>()), i32::MIN);
	}
}
