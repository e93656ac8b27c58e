//! A crate for reading [Java Class Files](https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html) into an owned tree.
//!
//! The tree keeps everything a runtime needs: the constant pool (with a lazily filled resolution cache), the
//! raw bytecode of every method, and the raw bytes of attributes that are only decoded on demand (like annotations).
//!
//! Reading is all-or-nothing: either a complete [`ClassFile`] is returned, or an error.

pub mod class_constants;
pub mod tree;
mod class_reader;
mod jstring;

use std::io::{Cursor, Read, Seek, SeekFrom};
use anyhow::{bail, Context, Result};
use crate::tree::class::ClassFile;

/// Reads a single java class file from the given bytes.
pub fn read_class(bytes: &[u8]) -> Result<ClassFile> {
	let mut reader = Cursor::new(bytes);
	let class = class_reader::read(&mut reader)?;

	let end = reader.marker()?;
	if end != bytes.len() as u64 {
		bail!("class file has {} trailing bytes after the last attribute", bytes.len() as u64 - end);
	}

	Ok(class)
}

/// Reads a single java class file from the reader. Unlike [`read_class`] this doesn't complain about trailing data.
pub fn read_class_from(reader: &mut (impl Read + Seek)) -> Result<ClassFile> {
	class_reader::read(reader)
}

/// A big endian reader over class file data.
///
/// Implemented for everything that is [`Read`] and [`Seek`], most notably for a [`Cursor`] over a byte slice.
pub trait ClassRead {
	fn marker(&mut self) -> Result<u64>;
	fn skip(&mut self, n: i64) -> Result<()>;
	fn goto(&mut self, pos: u64) -> Result<()>;
	fn with_pos<T>(&mut self, pos: u64, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
		let marker = self.marker()?;
		self.goto(pos)?;
		let r = f(self)?;
		self.goto(marker)?;
		Ok(r)
	}

	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]>;
	fn read_u8(&mut self) -> Result<u8> {
		Ok(u8::from_be_bytes(self.read_n().context("couldn't read u8, perhaps the data's end is reached?")?))
	}
	fn read_u16(&mut self) -> Result<u16> {
		Ok(u16::from_be_bytes(self.read_n().context("couldn't read u16, perhaps the data's end is reached?")?))
	}
	fn read_u32(&mut self) -> Result<u32> {
		Ok(u32::from_be_bytes(self.read_n().context("couldn't read u32, perhaps the data's end is reached?")?))
	}
	fn read_u64(&mut self) -> Result<u64> {
		Ok(u64::from_be_bytes(self.read_n().context("couldn't read u64, perhaps the data's end is reached?")?))
	}
	fn read_i8(&mut self) -> Result<i8> {
		Ok(i8::from_be_bytes(self.read_n().context("couldn't read i8, perhaps the data's end is reached?")?))
	}
	fn read_i16(&mut self) -> Result<i16> {
		Ok(i16::from_be_bytes(self.read_n().context("couldn't read i16, perhaps the data's end is reached?")?))
	}
	fn read_i32(&mut self) -> Result<i32> {
		Ok(i32::from_be_bytes(self.read_n().context("couldn't read i32, perhaps the data's end is reached?")?))
	}
	fn read_i64(&mut self) -> Result<i64> {
		Ok(i64::from_be_bytes(self.read_n().context("couldn't read i64, perhaps the data's end is reached?")?))
	}

	fn read_u8_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u8()? as usize)
	}
	fn read_u16_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u16()? as usize)
	}
	fn read_u32_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u32()? as usize)
	}
	fn read_u8_vec(&mut self, size: usize) -> Result<Vec<u8>>;
	fn read_vec<T, S, E>(&mut self, get_size: S, mut get_element: E) -> Result<Vec<T>>
		where
			S: FnOnce(&mut Self) -> Result<usize>,
			E: FnMut(&mut Self) -> Result<T>
	{
		let size = get_size(self)?;
		let mut vec = Vec::with_capacity(size);
		for _ in 0..size {
			vec.push(get_element(self)?);
		}
		Ok(vec)
	}
}

impl<T: Read + Seek> ClassRead for T {
	fn marker(&mut self) -> Result<u64> {
		Ok(self.stream_position()?)
	}
	fn skip(&mut self, n: i64) -> Result<()> {
		self.seek(SeekFrom::Current(n))?;
		Ok(())
	}
	fn goto(&mut self, pos: u64) -> Result<()> {
		self.seek(SeekFrom::Start(pos))?;
		Ok(())
	}

	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut buf = [0u8; N];
		self.read_exact(&mut buf)?;
		Ok(buf)
	}
	fn read_u8_vec(&mut self, size: usize) -> Result<Vec<u8>> {
		// grows with the data actually there, a bogus length can't reserve memory up front
		let mut vec = Vec::new();
		self.by_ref().take(size as u64).read_to_end(&mut vec)?;
		if vec.len() != size {
			bail!("expected {size} bytes, but the data ended after {}", vec.len());
		}
		Ok(vec)
	}
}

#[cfg(test)]
mod testing {
	use std::io::Cursor;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::ClassRead;

	#[test]
	fn big_endian_reads() -> Result<()> {
		let data = [0xca, 0xfe, 0xba, 0xbe, 0xff, 0xfe, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
		let mut r = Cursor::new(&data[..]);

		assert_eq!(r.read_u32()?, 0xCAFEBABE);
		assert_eq!(r.read_i16()?, -2);
		assert_eq!(r.read_i8()?, i8::MIN);
		assert_eq!(r.read_i64()?, 1);
		assert!(r.read_u8().is_err());
		Ok(())
	}

	#[test]
	fn with_pos_restores_marker() -> Result<()> {
		let data = [1, 2, 3, 4];
		let mut r = Cursor::new(&data[..]);

		assert_eq!(r.read_u8()?, 1);
		let peeked = r.with_pos(3, |r| r.read_u8())?;
		assert_eq!(peeked, 4);
		assert_eq!(r.read_u8()?, 2);

		r.skip(-2)?;
		assert_eq!(r.read_u16()?, 0x0102);
		Ok(())
	}

	#[test]
	fn declared_length_beyond_the_data() -> Result<()> {
		let data = [1, 2, 3, 4];
		let mut r = Cursor::new(&data[..]);

		let error = r.read_u8_vec(u32::MAX as usize).unwrap_err();
		assert_eq!(error.to_string(), format!("expected {} bytes, but the data ended after 4", u32::MAX));

		r.set_position(1);
		assert_eq!(r.read_u8_vec(2)?, vec![2, 3]);
		Ok(())
	}
}
