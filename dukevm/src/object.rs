use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock};
use duke::tree::descriptor::Type;
use parking_lot::{Mutex, MutexGuard};
use crate::class::Class;
use crate::error::{fatal, VmResult};
use crate::monitor::Monitor;
use crate::thread::StackTraceElement;
use crate::value::Value;

/// A reference to a heap object. `null` is represented as `Option::<ObjectRef>::None`.
///
/// There's no garbage collector: objects are freed when the last reference goes away, and cycles are leaked.
pub type ObjectRef = Arc<Object>;

/// Data the host attaches to some objects.
#[derive(Debug, Clone, Default)]
pub enum Payload {
	#[default]
	None,
	/// The UTF-16 code units of a `java/lang/String`.
	String(Vec<u16>),
	/// The class a `java/lang/Class` object stands for.
	Mirror(Arc<Class>),
	/// The stack trace captured by `Throwable.fillInStackTrace`.
	StackTrace(Vec<StackTraceElement>),
}

enum Body {
	Fields(Mutex<Vec<Value>>),
	Array(Mutex<ArrayData>),
}

pub struct Object {
	class: Arc<Class>,
	body: Body,
	monitor: OnceLock<Monitor>,
	payload: Mutex<Payload>,
}

impl Object {
	/// Allocates an instance with all instance fields along the superclass chain set to their zero values.
	pub(crate) fn new_instance(class: Arc<Class>) -> VmResult<ObjectRef> {
		let fields = class.links()?.instance_template().to_vec();
		Ok(Arc::new(Object {
			class,
			body: Body::Fields(Mutex::new(fields)),
			monitor: OnceLock::new(),
			payload: Mutex::new(Payload::None),
		}))
	}

	/// Allocates an array of the given array class, with all elements zeroed.
	pub(crate) fn new_array(class: Arc<Class>, length: usize) -> VmResult<ObjectRef> {
		let Some(element) = class.element_type() else {
			return Err(fatal!("can't create an array of non-array class {}", class.name()));
		};
		let data = ArrayData::new(element, length);
		Ok(Object::with_data(class, data))
	}

	pub(crate) fn with_data(class: Arc<Class>, data: ArrayData) -> ObjectRef {
		Arc::new(Object {
			class,
			body: Body::Array(Mutex::new(data)),
			monitor: OnceLock::new(),
			payload: Mutex::new(Payload::None),
		})
	}

	pub fn class(&self) -> &Arc<Class> {
		&self.class
	}

	/// A hash code based on the identity of this object.
	pub fn identity_hash(&self) -> i32 {
		let address = self as *const Object as usize as u64;
		((address >> 4) as u32 ^ (address >> 36) as u32) as i32 & 0x7fff_ffff
	}

	pub fn is_array(&self) -> bool {
		matches!(self.body, Body::Array(_))
	}

	/// Reads an instance field, by its absolute slot.
	pub fn get_field(&self, slot: usize) -> VmResult<Value> {
		let Body::Fields(fields) = &self.body else {
			return Err(fatal!("can't read field slot {slot} of array {}", self.class.name()));
		};
		fields.lock().get(slot).cloned()
			.ok_or_else(|| fatal!("field slot {slot} is out of range for an instance of {}", self.class.name()))
	}

	/// Writes an instance field, by its absolute slot.
	pub fn set_field(&self, slot: usize, value: Value) -> VmResult<()> {
		let Body::Fields(fields) = &self.body else {
			return Err(fatal!("can't write field slot {slot} of array {}", self.class.name()));
		};
		let mut fields = fields.lock();
		let Some(field) = fields.get_mut(slot) else {
			return Err(fatal!("field slot {slot} is out of range for an instance of {}", self.class.name()));
		};
		*field = value;
		Ok(())
	}

	/// Locks the elements of this array.
	pub fn array(&self) -> VmResult<MutexGuard<'_, ArrayData>> {
		match &self.body {
			Body::Array(data) => Ok(data.lock()),
			Body::Fields(_) => Err(fatal!("{} is not an array class", self.class.name())),
		}
	}

	pub fn array_length(&self) -> VmResult<usize> {
		Ok(self.array()?.len())
	}

	/// The monitor of this object, created on first use.
	pub fn monitor(&self) -> &Monitor {
		self.monitor.get_or_init(Monitor::new)
	}

	pub fn payload(&self) -> MutexGuard<'_, Payload> {
		self.payload.lock()
	}

	pub(crate) fn set_payload(&self, payload: Payload) {
		*self.payload.lock() = payload;
	}

	/// The contents, if this is a string created by the runtime.
	pub fn string_units(&self) -> Option<Vec<u16>> {
		match &*self.payload.lock() {
			Payload::String(units) => Some(units.clone()),
			_ => None,
		}
	}

	/// The class this `java/lang/Class` object stands for.
	pub fn mirrored_class(&self) -> Option<Arc<Class>> {
		match &*self.payload.lock() {
			Payload::Mirror(class) => Some(class.clone()),
			_ => None,
		}
	}

	/// Creates a new object of the same class, with copies of all fields, array elements and the payload.
	///
	/// The monitor is not copied.
	pub fn shallow_clone(&self) -> ObjectRef {
		let body = match &self.body {
			Body::Fields(fields) => Body::Fields(Mutex::new(fields.lock().clone())),
			Body::Array(data) => Body::Array(Mutex::new(data.lock().clone())),
		};
		Arc::new(Object {
			class: self.class.clone(),
			body,
			monitor: OnceLock::new(),
			payload: Mutex::new(self.payload.lock().clone()),
		})
	}
}

/// Objects are equal only to themselves.
impl PartialEq for Object {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::eq(self, other)
	}
}

impl Eq for Object {}

impl Debug for Object {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}@{:x}", self.class.name(), self.identity_hash())
	}
}

/// The elements of an array, stored by their primitive kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
	Boolean(Vec<i8>),
	Byte(Vec<i8>),
	Char(Vec<u16>),
	Short(Vec<i16>),
	Int(Vec<i32>),
	Long(Vec<i64>),
	Float(Vec<f32>),
	Double(Vec<f64>),
	Ref(Vec<Option<ObjectRef>>),
}

impl ArrayData {
	/// Creates zeroed elements for an array whose elements are of type `element`.
	pub fn new(element: &Type, length: usize) -> ArrayData {
		match element {
			Type::Z => ArrayData::Boolean(vec![0; length]),
			Type::B => ArrayData::Byte(vec![0; length]),
			Type::C => ArrayData::Char(vec![0; length]),
			Type::S => ArrayData::Short(vec![0; length]),
			Type::I => ArrayData::Int(vec![0; length]),
			Type::J => ArrayData::Long(vec![0; length]),
			Type::F => ArrayData::Float(vec![0.0; length]),
			Type::D => ArrayData::Double(vec![0.0; length]),
			Type::Object(_) | Type::Array(..) => ArrayData::Ref(vec![None; length]),
		}
	}

	pub fn len(&self) -> usize {
		match self {
			ArrayData::Boolean(vec) | ArrayData::Byte(vec) => vec.len(),
			ArrayData::Char(vec) => vec.len(),
			ArrayData::Short(vec) => vec.len(),
			ArrayData::Int(vec) => vec.len(),
			ArrayData::Long(vec) => vec.len(),
			ArrayData::Float(vec) => vec.len(),
			ArrayData::Double(vec) => vec.len(),
			ArrayData::Ref(vec) => vec.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Reads an element, widening `boolean`, `byte`, `char` and `short` to `int`.
	pub fn get(&self, index: usize) -> Option<Value> {
		Some(match self {
			ArrayData::Boolean(vec) | ArrayData::Byte(vec) => Value::Int(*vec.get(index)? as i32),
			ArrayData::Char(vec) => Value::Int(*vec.get(index)? as i32),
			ArrayData::Short(vec) => Value::Int(*vec.get(index)? as i32),
			ArrayData::Int(vec) => Value::Int(*vec.get(index)?),
			ArrayData::Long(vec) => Value::Long(*vec.get(index)?),
			ArrayData::Float(vec) => Value::Float(*vec.get(index)?),
			ArrayData::Double(vec) => Value::Double(*vec.get(index)?),
			ArrayData::Ref(vec) => Value::Ref(vec.get(index)?.clone()),
		})
	}

	/// Writes an element, narrowing an `int` to the element kind.
	pub fn set(&mut self, index: usize, value: Value) -> VmResult<()> {
		let length = self.len();
		if index >= length {
			return Err(fatal!("array index {index} out of range for length {length}"));
		}
		match (self, value) {
			(ArrayData::Boolean(vec), Value::Int(value)) => vec[index] = (value & 1) as i8,
			(ArrayData::Byte(vec), Value::Int(value)) => vec[index] = value as i8,
			(ArrayData::Char(vec), Value::Int(value)) => vec[index] = value as u16,
			(ArrayData::Short(vec), Value::Int(value)) => vec[index] = value as i16,
			(ArrayData::Int(vec), Value::Int(value)) => vec[index] = value,
			(ArrayData::Long(vec), Value::Long(value)) => vec[index] = value,
			(ArrayData::Float(vec), Value::Float(value)) => vec[index] = value,
			(ArrayData::Double(vec), Value::Double(value)) => vec[index] = value,
			(ArrayData::Ref(vec), Value::Ref(value)) => vec[index] = value,
			(data, value) => return Err(fatal!("can't store {value:?} into an array of kind {}", data.kind())),
		}
		Ok(())
	}

	/// Copies `length` elements from `src` to `dst` within the same array. The ranges may overlap.
	pub fn copy_within(&mut self, src: usize, dst: usize, length: usize) {
		let range = src..src + length;
		match self {
			ArrayData::Boolean(vec) | ArrayData::Byte(vec) => vec.copy_within(range, dst),
			ArrayData::Char(vec) => vec.copy_within(range, dst),
			ArrayData::Short(vec) => vec.copy_within(range, dst),
			ArrayData::Int(vec) => vec.copy_within(range, dst),
			ArrayData::Long(vec) => vec.copy_within(range, dst),
			ArrayData::Float(vec) => vec.copy_within(range, dst),
			ArrayData::Double(vec) => vec.copy_within(range, dst),
			ArrayData::Ref(vec) => {
				let copied: Vec<_> = vec[src..src + length].to_vec();
				vec[dst..dst + length].clone_from_slice(&copied);
			},
		}
	}

	/// Copies primitive elements between two arrays of the same kind.
	///
	/// Returns `false` if the kinds differ. Reference arrays need element checks, so they're copied by the caller.
	pub fn copy_primitives(&self, src: usize, other: &mut ArrayData, dst: usize, length: usize) -> bool {
		match (self, other) {
			(ArrayData::Boolean(a), ArrayData::Boolean(b)) |
			(ArrayData::Byte(a), ArrayData::Byte(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			(ArrayData::Char(a), ArrayData::Char(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			(ArrayData::Short(a), ArrayData::Short(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			(ArrayData::Int(a), ArrayData::Int(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			(ArrayData::Long(a), ArrayData::Long(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			(ArrayData::Float(a), ArrayData::Float(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			(ArrayData::Double(a), ArrayData::Double(b)) => b[dst..dst + length].copy_from_slice(&a[src..src + length]),
			_ => return false,
		}
		true
	}

	fn kind(&self) -> &'static str {
		match self {
			ArrayData::Boolean(_) => "boolean",
			ArrayData::Byte(_) => "byte",
			ArrayData::Char(_) => "char",
			ArrayData::Short(_) => "short",
			ArrayData::Int(_) => "int",
			ArrayData::Long(_) => "long",
			ArrayData::Float(_) => "float",
			ArrayData::Double(_) => "double",
			ArrayData::Ref(_) => "reference",
		}
	}
}

#[cfg(test)]
mod testing {
	use duke::tree::descriptor::Type;
	use pretty_assertions::assert_eq;
	use crate::object::ArrayData;
	use crate::value::Value;

	#[test]
	fn narrowing_stores() -> anyhow::Result<()> {
		let mut booleans = ArrayData::new(&Type::Z, 2);
		booleans.set(0, Value::Int(3))?;
		assert_eq!(booleans.get(0), Some(Value::Int(1)));

		let mut chars = ArrayData::new(&Type::C, 1);
		chars.set(0, Value::Int(-1))?;
		assert_eq!(chars.get(0), Some(Value::Int(0xffff)));

		let mut bytes = ArrayData::new(&Type::B, 1);
		bytes.set(0, Value::Int(0xff))?;
		assert_eq!(bytes.get(0), Some(Value::Int(-1)));
		Ok(())
	}

	#[test]
	fn kind_mismatch_is_rejected() {
		let mut ints = ArrayData::new(&Type::I, 1);
		assert!(ints.set(0, Value::Long(1)).is_err());
		assert!(ints.set(1, Value::Int(1)).is_err());
		assert_eq!(ints.get(1), None);
	}

	#[test]
	fn overlapping_copy() {
		let mut ints = ArrayData::Int(vec![1, 2, 3, 4, 5]);
		ints.copy_within(0, 1, 3);
		assert_eq!(ints, ArrayData::Int(vec![1, 1, 2, 3, 5]));

		let mut longs = ArrayData::Long(vec![0; 2]);
		assert!(ArrayData::Long(vec![7, 8]).copy_primitives(0, &mut longs, 0, 2));
		assert_eq!(longs, ArrayData::Long(vec![7, 8]));
		assert!(!ArrayData::Int(vec![1]).copy_primitives(0, &mut longs, 0, 1));
	}
}
