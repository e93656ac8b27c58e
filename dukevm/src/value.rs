use std::fmt::{Debug, Formatter};
use duke::tree::descriptor::Type;
use crate::error::{fatal, VmResult};
use crate::object::ObjectRef;

/// A cell of a local variable array or of an operand stack.
///
/// `long` and `double` values take two cells, the second one is [`Value::Top`].
#[derive(Clone, Default)]
pub enum Value {
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	Ref(Option<ObjectRef>),
	/// Pushed by `jsr` and `jsr_w`, consumed by `ret`.
	ReturnAddress(u16),
	/// A local variable that was never written to.
	#[default]
	Uninitialized,
	/// The upper half of a `long` or `double`.
	Top,
}

impl Value {
	pub const NULL: Value = Value::Ref(None);

	pub fn from_ref(object: ObjectRef) -> Value {
		Value::Ref(Some(object))
	}

	/// Whether this value takes two cells.
	pub fn is_wide(&self) -> bool {
		matches!(self, Value::Long(_) | Value::Double(_))
	}

	/// The zero value of a field or array element of the given type.
	pub fn zero(ty: &Type) -> Value {
		match ty {
			Type::B | Type::C | Type::I | Type::S | Type::Z => Value::Int(0),
			Type::J => Value::Long(0),
			Type::F => Value::Float(0.0),
			Type::D => Value::Double(0.0),
			Type::Object(_) | Type::Array(..) => Value::NULL,
		}
	}

	/// Converts an `int` to the value range of the given type, like storing it into a field or returning it does.
	///
	/// Values of other types are returned as is.
	pub fn narrow(self, ty: &Type) -> Value {
		match (self, ty) {
			(Value::Int(value), Type::Z) => Value::Int(value & 1),
			(Value::Int(value), Type::B) => Value::Int(value as i8 as i32),
			(Value::Int(value), Type::C) => Value::Int(value as u16 as i32),
			(Value::Int(value), Type::S) => Value::Int(value as i16 as i32),
			(value, _) => value,
		}
	}

	/// Checks that this value can be stored into a place of the given type.
	pub fn matches(&self, ty: &Type) -> bool {
		matches!((self, ty),
			(Value::Int(_), Type::B | Type::C | Type::I | Type::S | Type::Z) |
			(Value::Long(_), Type::J) |
			(Value::Float(_), Type::F) |
			(Value::Double(_), Type::D) |
			(Value::Ref(_), Type::Object(_) | Type::Array(..))
		)
	}

	pub fn as_int(&self) -> VmResult<i32> {
		match *self {
			Value::Int(value) => Ok(value),
			ref other => Err(fatal!("expected an int, got {other:?}")),
		}
	}

	pub fn as_long(&self) -> VmResult<i64> {
		match *self {
			Value::Long(value) => Ok(value),
			ref other => Err(fatal!("expected a long, got {other:?}")),
		}
	}

	pub fn as_float(&self) -> VmResult<f32> {
		match *self {
			Value::Float(value) => Ok(value),
			ref other => Err(fatal!("expected a float, got {other:?}")),
		}
	}

	pub fn as_double(&self) -> VmResult<f64> {
		match *self {
			Value::Double(value) => Ok(value),
			ref other => Err(fatal!("expected a double, got {other:?}")),
		}
	}

	/// Gets a reference, [`None`] being `null`.
	pub fn as_ref(&self) -> VmResult<Option<&ObjectRef>> {
		match self {
			Value::Ref(object) => Ok(object.as_ref()),
			other => Err(fatal!("expected a reference, got {other:?}")),
		}
	}

	pub fn into_ref(self) -> VmResult<Option<ObjectRef>> {
		match self {
			Value::Ref(object) => Ok(object),
			other => Err(fatal!("expected a reference, got {other:?}")),
		}
	}

	/// Expands a list of values into cells, adding a [`Value::Top`] after each wide value.
	pub fn to_cells(values: impl IntoIterator<Item=Value>) -> Vec<Value> {
		let mut cells = Vec::new();
		for value in values {
			let wide = value.is_wide();
			cells.push(value);
			if wide {
				cells.push(Value::Top);
			}
		}
		cells
	}

	/// The inverse of [`Value::to_cells`].
	pub fn from_cells(cells: Vec<Value>) -> Vec<Value> {
		cells.into_iter().filter(|cell| !matches!(cell, Value::Top)).collect()
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Int(value) => write!(f, "Int({value})"),
			Value::Long(value) => write!(f, "Long({value})"),
			Value::Float(value) => write!(f, "Float({value:?})"),
			Value::Double(value) => write!(f, "Double({value:?})"),
			Value::Ref(None) => f.write_str("null"),
			Value::Ref(Some(object)) => write!(f, "Ref({}@{:x})", object.class().name(), object.identity_hash()),
			Value::ReturnAddress(pc) => write!(f, "ReturnAddress({pc})"),
			Value::Uninitialized => f.write_str("Uninitialized"),
			Value::Top => f.write_str("Top"),
		}
	}
}

/// Values compare like the guest does: references by identity, floating point values by their bits.
impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Long(a), Value::Long(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
			(Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
			(Value::Ref(a), Value::Ref(b)) => match (a, b) {
				(Some(a), Some(b)) => std::sync::Arc::ptr_eq(a, b),
				(None, None) => true,
				_ => false,
			},
			(Value::ReturnAddress(a), Value::ReturnAddress(b)) => a == b,
			(Value::Uninitialized, Value::Uninitialized) => true,
			(Value::Top, Value::Top) => true,
			_ => false,
		}
	}
}

#[cfg(test)]
mod testing {
	use duke::tree::descriptor::Type;
	use pretty_assertions::assert_eq;
	use crate::value::Value;

	#[test]
	fn cells() {
		let cells = Value::to_cells([Value::Int(1), Value::Long(2), Value::Double(3.0), Value::NULL]);
		assert_eq!(cells, vec![Value::Int(1), Value::Long(2), Value::Top, Value::Double(3.0), Value::Top, Value::NULL]);
		assert_eq!(Value::from_cells(cells), vec![Value::Int(1), Value::Long(2), Value::Double(3.0), Value::NULL]);
	}

	#[test]
	fn narrowing() {
		assert_eq!(Value::Int(3).narrow(&Type::Z), Value::Int(1));
		assert_eq!(Value::Int(0x1ff).narrow(&Type::B), Value::Int(-1));
		assert_eq!(Value::Int(-1).narrow(&Type::C), Value::Int(0xffff));
		assert_eq!(Value::Int(0x18000).narrow(&Type::S), Value::Int(-0x8000));
		assert_eq!(Value::Int(7).narrow(&Type::I), Value::Int(7));
	}

	#[test]
	fn float_equality_is_bitwise() {
		assert_eq!(Value::Float(f32::NAN), Value::Float(f32::NAN));
		assert_ne!(Value::Double(0.0), Value::Double(-0.0));
	}
}
