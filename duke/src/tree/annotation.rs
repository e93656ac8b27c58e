//! Decoding of the raw annotation blobs kept in [`RawAnnotations`](crate::tree::attribute::RawAnnotations).

use std::io::Cursor;
use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaString;
use crate::ClassRead;
use crate::tree::pool::{Constant, ConstantPool};

/// Nesting deeper than this is rejected.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
	/// The field descriptor of the annotation interface, like `Ljava/lang/Deprecated;`.
	pub annotation_type: String,
	pub element_values: Vec<(String, ElementValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
	Byte(i8),
	Char(u16),
	Double(f64),
	Float(f32),
	Int(i32),
	Long(i64),
	Short(i16),
	Boolean(bool),
	String(JavaString),
	Enum {
		type_name: String,
		const_name: String,
	},
	/// The return descriptor of the class, `V` for `void.class`.
	Class(String),
	Annotation(Annotation),
	Array(Vec<ElementValue>),
}

/// Decodes a `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations` attribute body.
pub fn parse_annotations(bytes: &[u8], pool: &ConstantPool) -> Result<Vec<Annotation>> {
	let mut reader = Cursor::new(bytes);
	let annotations = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| read_annotation(r, pool, 0)
	)?;
	expect_end(&mut reader, bytes.len())?;
	Ok(annotations)
}

/// Decodes a `RuntimeVisibleParameterAnnotations` or `RuntimeInvisibleParameterAnnotations` attribute body.
pub fn parse_parameter_annotations(bytes: &[u8], pool: &ConstantPool) -> Result<Vec<Vec<Annotation>>> {
	let mut reader = Cursor::new(bytes);
	let parameters = reader.read_vec(
		|r| r.read_u8_as_usize(),
		|r| r.read_vec(
			|r| r.read_u16_as_usize(),
			|r| read_annotation(r, pool, 0)
		)
	)?;
	expect_end(&mut reader, bytes.len())?;
	Ok(parameters)
}

/// Decodes an `AnnotationDefault` attribute body.
pub fn parse_element_value(bytes: &[u8], pool: &ConstantPool) -> Result<ElementValue> {
	let mut reader = Cursor::new(bytes);
	let value = read_element_value(&mut reader, pool, 0)?;
	expect_end(&mut reader, bytes.len())?;
	Ok(value)
}

fn expect_end(reader: &mut impl ClassRead, length: usize) -> Result<()> {
	let position = reader.marker()?;
	if position != length as u64 {
		bail!("annotation data has {} trailing bytes", length as u64 - position);
	}
	Ok(())
}

fn read_annotation(reader: &mut impl ClassRead, pool: &ConstantPool, depth: usize) -> Result<Annotation> {
	if depth > MAX_DEPTH {
		bail!("annotations nested deeper than {MAX_DEPTH}");
	}

	let annotation_type = pool.get_name(reader.read_u16()?)?;
	let element_values = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| {
			let name = pool.get_name(r.read_u16()?)?;
			let value = read_element_value(r, pool, depth + 1)
				.with_context(|| anyhow!("while reading element {name:?} of annotation"))?;
			Ok((name, value))
		}
	).with_context(|| anyhow!("while reading annotation {annotation_type:?}"))?;

	Ok(Annotation { annotation_type, element_values })
}

fn read_int(pool: &ConstantPool, index: u16) -> Result<i32> {
	match pool.resolve(index)? {
		&Constant::Integer(value) => Ok(value),
		other => bail!("expected `Integer` constant, got {other}"),
	}
}

fn read_element_value(reader: &mut impl ClassRead, pool: &ConstantPool, depth: usize) -> Result<ElementValue> {
	if depth > MAX_DEPTH {
		bail!("element values nested deeper than {MAX_DEPTH}");
	}

	let tag = reader.read_u8()?;
	Ok(match tag {
		b'B' => ElementValue::Byte(read_int(pool, reader.read_u16()?)? as i8),
		b'C' => ElementValue::Char(read_int(pool, reader.read_u16()?)? as u16),
		b'I' => ElementValue::Int(read_int(pool, reader.read_u16()?)?),
		b'S' => ElementValue::Short(read_int(pool, reader.read_u16()?)? as i16),
		b'Z' => ElementValue::Boolean(read_int(pool, reader.read_u16()?)? != 0),
		b'D' => match pool.resolve(reader.read_u16()?)? {
			&Constant::Double(value) => ElementValue::Double(value),
			other => bail!("expected `Double` constant, got {other}"),
		},
		b'F' => match pool.resolve(reader.read_u16()?)? {
			&Constant::Float(value) => ElementValue::Float(value),
			other => bail!("expected `Float` constant, got {other}"),
		},
		b'J' => match pool.resolve(reader.read_u16()?)? {
			&Constant::Long(value) => ElementValue::Long(value),
			other => bail!("expected `Long` constant, got {other}"),
		},
		b's' => ElementValue::String(pool.get_utf8(reader.read_u16()?)?.clone()),
		b'e' => ElementValue::Enum {
			type_name: pool.get_name(reader.read_u16()?)?,
			const_name: pool.get_name(reader.read_u16()?)?,
		},
		b'c' => ElementValue::Class(pool.get_name(reader.read_u16()?)?),
		b'@' => ElementValue::Annotation(read_annotation(reader, pool, depth + 1)?),
		b'[' => ElementValue::Array(reader.read_vec(
			|r| r.read_u16_as_usize(),
			|r| read_element_value(r, pool, depth + 1)
		)?),
		tag => bail!("unknown element value tag {:?}", tag as char),
	})
}
