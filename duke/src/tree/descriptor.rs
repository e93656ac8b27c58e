use std::fmt::{Display, Formatter, Write};
use std::iter::Peekable;
use std::str::Chars;
use anyhow::{anyhow, bail, Context, Result};

/// Represents a type.
///
/// In case of an array, use the [`Type::Array`] variant.
///
/// ```
/// use duke::tree::descriptor::{ArrayType, Type};
///
/// // the type of a java `int`
/// let int_type = Type::I;
///
/// // the type of a java `int[][]`
/// let int_array_type = Type::Array(2, ArrayType::I);
///
/// assert_ne!(int_type, int_array_type);
/// assert_eq!(int_array_type.to_string(), "[[I");
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Type {
	/// A `byte`. In rust, this is a `i8`.
	B,
	/// A `char`. In rust, this is a `u16`.
	C,
	/// A `double`. In rust, this is a `f64`.
	D,
	/// A `float`. In rust, this is a `f32`.
	F,
	/// An `int`. In rust, this is a `i32`.
	I,
	/// A `long`. In rust, this is a `i64`.
	J,
	/// A `short`. In rust, this is a `i16`.
	S,
	/// A `boolean`.
	Z,
	/// An instance of the class with the given internal name.
	Object(String),
	/// An array type, represented by the dimension and the innermost [`ArrayType`].
	Array(u8, ArrayType),
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ArrayType {
	B,
	C,
	D,
	F,
	I,
	J,
	S,
	Z,
	Object(String),
}

impl ArrayType {
	fn into_type(self) -> Type {
		match self {
			ArrayType::B => Type::B,
			ArrayType::C => Type::C,
			ArrayType::D => Type::D,
			ArrayType::F => Type::F,
			ArrayType::I => Type::I,
			ArrayType::J => Type::J,
			ArrayType::S => Type::S,
			ArrayType::Z => Type::Z,
			ArrayType::Object(class_name) => Type::Object(class_name),
		}
	}
}

impl Type {
	/// Parses a field descriptor, like `I` or `[Ljava/lang/String;`.
	pub fn parse(descriptor: &str) -> Result<Type> {
		let mut chars = descriptor.chars().peekable();
		let t = read_field_type(&mut chars)
			.with_context(|| anyhow!("invalid field descriptor {descriptor:?}"))?;
		if let Some(rest) = chars.next() {
			bail!("unexpected char {rest:?} after the end of field descriptor {descriptor:?}");
		}
		Ok(t)
	}

	/// The number of local variable or operand stack slots a value of this type occupies.
	pub fn size(&self) -> usize {
		match self {
			Type::D | Type::J => 2,
			_ => 1,
		}
	}

	pub fn is_reference(&self) -> bool {
		matches!(self, Type::Object(_) | Type::Array(..))
	}

	/// The name of the class that represents values of this type.
	///
	/// For objects this is the internal name, for arrays the descriptor. Primitives have no such class name.
	pub fn class_name(&self) -> Option<String> {
		match self {
			Type::Object(class_name) => Some(class_name.clone()),
			Type::Array(..) => Some(self.to_string()),
			_ => None,
		}
	}

	/// For an array type, returns the type of its elements.
	pub fn component(&self) -> Option<Type> {
		match self {
			Type::Array(1, array_type) => Some(array_type.clone().into_type()),
			Type::Array(dimension, array_type) => Some(Type::Array(dimension - 1, array_type.clone())),
			_ => None,
		}
	}
}

// The grammar for descriptors is:
//   FieldDescriptor:
//     FieldType
//
//   MethodDescriptor:
//     "(" FieldType* ")" ReturnDescriptor
//
//   ReturnDescriptor:
//     FieldType | "V"
//
//   FieldType:
//     "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" |
//     "L" ClassName ";" |
//     "[" FieldType
fn read_field_type(chars: &mut Peekable<Chars>) -> Result<Type> {
	let mut array_dimension: u8 = 0;
	while chars.next_if_eq(&'[').is_some() {
		array_dimension = array_dimension.checked_add(1)
			.ok_or_else(|| anyhow!("array dimension exceeds 255"))?;
	}

	let char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
	let array_type = match char {
		'B' => ArrayType::B,
		'C' => ArrayType::C,
		'D' => ArrayType::D,
		'F' => ArrayType::F,
		'I' => ArrayType::I,
		'J' => ArrayType::J,
		'S' => ArrayType::S,
		'Z' => ArrayType::Z,
		'L' => {
			let mut class_name = String::new();
			loop {
				match chars.next() {
					Some(';') => break,
					Some(char @ ('.' | '[')) => bail!("unexpected char {char:?} in class name of descriptor"),
					Some(char) => class_name.push(char),
					None => bail!("unexpected abrupt ending of descriptor"),
				}
			}
			if class_name.is_empty() {
				bail!("empty class name in descriptor");
			}
			ArrayType::Object(class_name)
		},
		x => bail!("unexpected char {x:?} in descriptor"),
	};

	if array_dimension == 0 {
		Ok(array_type.into_type())
	} else {
		Ok(Type::Array(array_dimension, array_type))
	}
}

fn write_array_type(array_type: &ArrayType, f: &mut Formatter<'_>) -> std::fmt::Result {
	match array_type {
		ArrayType::B => f.write_char('B'),
		ArrayType::C => f.write_char('C'),
		ArrayType::D => f.write_char('D'),
		ArrayType::F => f.write_char('F'),
		ArrayType::I => f.write_char('I'),
		ArrayType::J => f.write_char('J'),
		ArrayType::S => f.write_char('S'),
		ArrayType::Z => f.write_char('Z'),
		ArrayType::Object(class_name) => write!(f, "L{class_name};"),
	}
}

impl Display for Type {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Type::B => f.write_char('B'),
			Type::C => f.write_char('C'),
			Type::D => f.write_char('D'),
			Type::F => f.write_char('F'),
			Type::I => f.write_char('I'),
			Type::J => f.write_char('J'),
			Type::S => f.write_char('S'),
			Type::Z => f.write_char('Z'),
			Type::Object(class_name) => write!(f, "L{class_name};"),
			Type::Array(dimension, array_type) => {
				for _ in 0..*dimension {
					f.write_char('[')?;
				}
				write_array_type(array_type, f)
			},
		}
	}
}

/// A parsed method descriptor. A `return_type` of [`None`] stands for `V`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MethodDescriptor {
	pub parameters: Vec<Type>,
	pub return_type: Option<Type>,
}

impl MethodDescriptor {
	/// Parses a method descriptor, like `(IJ)V`.
	pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
		let mut chars = descriptor.chars().peekable();
		(|| {
			if chars.next_if_eq(&'(').is_none() {
				bail!("method descriptor must start with '('");
			}

			let mut parameters = Vec::new();
			while chars.next_if_eq(&')').is_none() {
				parameters.push(read_field_type(&mut chars)?);
			}

			let return_type = if chars.next_if_eq(&'V').is_some() {
				None
			} else {
				Some(read_field_type(&mut chars)?)
			};

			if let Some(rest) = chars.next() {
				bail!("unexpected char {rest:?} after the return type");
			}

			Ok(MethodDescriptor { parameters, return_type })
		})().with_context(|| anyhow!("invalid method descriptor {descriptor:?}"))
	}

	/// The number of local variable slots the parameters occupy, not counting a receiver.
	pub fn parameter_slots(&self) -> usize {
		self.parameters.iter().map(Type::size).sum()
	}
}

impl Display for MethodDescriptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_char('(')?;
		for parameter in &self.parameters {
			write!(f, "{parameter}")?;
		}
		f.write_char(')')?;
		match &self.return_type {
			Some(return_type) => write!(f, "{return_type}"),
			None => f.write_char('V'),
		}
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::descriptor::{ArrayType, MethodDescriptor, Type};

	#[test]
	fn component_of_arrays() -> Result<()> {
		let t = Type::parse("[[Ljava/lang/String;")?;
		assert_eq!(t, Type::Array(2, ArrayType::Object("java/lang/String".to_owned())));

		let component = t.component();
		assert_eq!(component, Some(Type::Array(1, ArrayType::Object("java/lang/String".to_owned()))));
		let leaf = component.and_then(|x| x.component());
		assert_eq!(leaf, Some(Type::Object("java/lang/String".to_owned())));
		assert_eq!(Type::I.component(), None);
		Ok(())
	}

	#[test]
	fn class_names() -> Result<()> {
		assert_eq!(Type::parse("Ljava/lang/Object;")?.class_name().as_deref(), Some("java/lang/Object"));
		assert_eq!(Type::parse("[I")?.class_name().as_deref(), Some("[I"));
		assert_eq!(Type::parse("J")?.class_name(), None);
		Ok(())
	}

	#[test]
	fn slot_sizes() -> Result<()> {
		let descriptor = MethodDescriptor::parse("(IJLjava/lang/Object;D[J)V")?;
		assert_eq!(descriptor.parameters.len(), 5);
		assert_eq!(descriptor.parameter_slots(), 7);
		assert_eq!(descriptor.return_type, None);
		Ok(())
	}
}
