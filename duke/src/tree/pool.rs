//! The constant pool, together with its lazily filled resolution cache.

use std::fmt::{Display, Formatter};
use std::sync::OnceLock;
use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaString;
use crate::class_constants::pool;
use crate::class_constants::pool::method_handle_reference;
use crate::tree::field::ConstantValue;
use crate::tree::version::Version;
use crate::{ClassRead, jstring};

/// A constant pool entry as it's stored in the class file, with all references still being indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEntry {
	Class { name_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
	String { string_index: u16 },
	Integer { bytes: i32 },
	Float { bytes: u32 },
	Long { bytes: i64 },
	Double { bytes: u64 },
	NameAndType { name_index: u16, descriptor_index: u16 },
	Utf8 { string: JavaString },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
	Module { name_index: u16 },
	Package { name_index: u16 },
}

impl PoolEntry {
	/// The tag this entry had in the class file.
	pub fn tag(&self) -> u8 {
		match self {
			PoolEntry::Class { .. } => pool::CLASS,
			PoolEntry::FieldRef { .. } => pool::FIELD_REF,
			PoolEntry::MethodRef { .. } => pool::METHOD_REF,
			PoolEntry::InterfaceMethodRef { .. } => pool::INTERFACE_METHOD_REF,
			PoolEntry::String { .. } => pool::STRING,
			PoolEntry::Integer { .. } => pool::INTEGER,
			PoolEntry::Float { .. } => pool::FLOAT,
			PoolEntry::Long { .. } => pool::LONG,
			PoolEntry::Double { .. } => pool::DOUBLE,
			PoolEntry::NameAndType { .. } => pool::NAME_AND_TYPE,
			PoolEntry::Utf8 { .. } => pool::UTF8,
			PoolEntry::MethodHandle { .. } => pool::METHOD_HANDLE,
			PoolEntry::MethodType { .. } => pool::METHOD_TYPE,
			PoolEntry::Dynamic { .. } => pool::DYNAMIC,
			PoolEntry::InvokeDynamic { .. } => pool::INVOKE_DYNAMIC,
			PoolEntry::Module { .. } => pool::MODULE,
			PoolEntry::Package { .. } => pool::PACKAGE,
		}
	}
}

/// A reference to a field or method: the owning class, the name and the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
	pub class: String,
	pub name: String,
	pub descriptor: String,
}

impl Display for MemberRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameAndType {
	pub name: String,
	pub descriptor: String,
}

/// The symbolic part of a `CONSTANT_Dynamic_info` or `CONSTANT_InvokeDynamic_info`.
///
/// The bootstrap method stays an index into the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicRef {
	pub bootstrap_method_attribute_index: u16,
	pub name: String,
	pub descriptor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
	GetField,
	GetStatic,
	PutField,
	PutStatic,
	InvokeVirtual,
	InvokeStatic,
	InvokeSpecial,
	NewInvokeSpecial,
	InvokeInterface,
}

impl ReferenceKind {
	fn from_u8(reference_kind: u8) -> Result<ReferenceKind> {
		Ok(match reference_kind {
			method_handle_reference::GET_FIELD => ReferenceKind::GetField,
			method_handle_reference::GET_STATIC => ReferenceKind::GetStatic,
			method_handle_reference::PUT_FIELD => ReferenceKind::PutField,
			method_handle_reference::PUT_STATIC => ReferenceKind::PutStatic,
			method_handle_reference::INVOKE_VIRTUAL => ReferenceKind::InvokeVirtual,
			method_handle_reference::INVOKE_STATIC => ReferenceKind::InvokeStatic,
			method_handle_reference::INVOKE_SPECIAL => ReferenceKind::InvokeSpecial,
			method_handle_reference::NEW_INVOKE_SPECIAL => ReferenceKind::NewInvokeSpecial,
			method_handle_reference::INVOKE_INTERFACE => ReferenceKind::InvokeInterface,
			tag => bail!("unknown `reference_kind` {tag} for `MethodHandle` pool entry"),
		})
	}

	pub fn is_field(self) -> bool {
		matches!(self, ReferenceKind::GetField | ReferenceKind::GetStatic | ReferenceKind::PutField | ReferenceKind::PutStatic)
	}
}

impl Display for ReferenceKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			ReferenceKind::GetField => "getField",
			ReferenceKind::GetStatic => "getStatic",
			ReferenceKind::PutField => "putField",
			ReferenceKind::PutStatic => "putStatic",
			ReferenceKind::InvokeVirtual => "invokeVirtual",
			ReferenceKind::InvokeStatic => "invokeStatic",
			ReferenceKind::InvokeSpecial => "invokeSpecial",
			ReferenceKind::NewInvokeSpecial => "newInvokeSpecial",
			ReferenceKind::InvokeInterface => "invokeInterface",
		})
	}
}

/// A resolved `CONSTANT_MethodHandle_info`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
	pub kind: ReferenceKind,
	pub member: MemberRef,
	/// Whether the member was referenced via an `InterfaceMethodref`.
	pub is_interface: bool,
}

impl Display for Handle {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} {}", self.kind, self.member)
	}
}

/// A resolved constant pool entry, with all nested references followed.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
	Utf8(JavaString),
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class(String),
	String(JavaString),
	FieldRef(MemberRef),
	MethodRef(MemberRef),
	InterfaceMethodRef(MemberRef),
	NameAndType(NameAndType),
	MethodHandle(Handle),
	MethodType(String),
	Dynamic(DynamicRef),
	InvokeDynamic(DynamicRef),
	Module(String),
	Package(String),
}

impl Constant {
	/// Whether `ldc`, `ldc_w` or `ldc2_w` may load this constant.
	pub fn is_loadable(&self) -> bool {
		matches!(self,
			Constant::Integer(_) | Constant::Float(_) | Constant::Long(_) | Constant::Double(_) |
			Constant::Class(_) | Constant::String(_) | Constant::MethodHandle(_) | Constant::MethodType(_) |
			Constant::Dynamic(_)
		)
	}
}

impl Display for Constant {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Constant::Utf8(string) => write!(f, "Utf8: {string:?}"),
			Constant::Integer(value) => write!(f, "Integer: {value}"),
			Constant::Float(value) => write!(f, "Float: {value:?}"),
			Constant::Long(value) => write!(f, "Long: {value}"),
			Constant::Double(value) => write!(f, "Double: {value:?}"),
			Constant::Class(name) => write!(f, "Class: {name}"),
			Constant::String(string) => write!(f, "String: {string:?}"),
			Constant::FieldRef(member) => write!(f, "FieldRef: {member}"),
			Constant::MethodRef(member) => write!(f, "MethodRef: {member}"),
			Constant::InterfaceMethodRef(member) => write!(f, "InterfaceMethodRef: {member}"),
			Constant::NameAndType(NameAndType { name, descriptor }) => write!(f, "NameAndType: {name}:{descriptor}"),
			Constant::MethodHandle(handle) => write!(f, "MethodHandle: {handle}"),
			Constant::MethodType(descriptor) => write!(f, "MethodType: {descriptor}"),
			Constant::Dynamic(DynamicRef { bootstrap_method_attribute_index, name, descriptor }) =>
				write!(f, "Dynamic: #{bootstrap_method_attribute_index} {name}:{descriptor}"),
			Constant::InvokeDynamic(DynamicRef { bootstrap_method_attribute_index, name, descriptor }) =>
				write!(f, "InvokeDynamic: #{bootstrap_method_attribute_index} {name}:{descriptor}"),
			Constant::Module(name) => write!(f, "Module: {name}"),
			Constant::Package(name) => write!(f, "Package: {name}"),
		}
	}
}

/// The constant pool of a class.
///
/// Index `0`, as well as the index after each `Long` and `Double` entry, holds no entry.
///
/// Entries are resolved on demand with [`ConstantPool::resolve`]. The result of that is cached per index, so that
/// repeatedly executing the same instruction doesn't compose the same strings again and again.
pub struct ConstantPool {
	version: Version,
	entries: Vec<Option<PoolEntry>>,
	resolved: Vec<OnceLock<Constant>>,
}

impl ConstantPool {
	/// Reads the constant pool from the specified reader. The first thing read is an `u16` specifying the size of the constant pool.
	pub(crate) fn read(reader: &mut impl ClassRead, version: Version) -> Result<ConstantPool> {
		let mut pool = vec![None];

		let constant_pool_count = reader.read_u16_as_usize()?;
		while pool.len() < constant_pool_count {
			let entry = match reader.read_u8()? {
				pool::UTF8 => {
					let length = reader.read_u16_as_usize()?;
					let vec = reader.read_u8_vec(length)?;
					let string = jstring::from_vec_to_string(vec)
						.with_context(|| anyhow!("while reading `Utf8` at pool index {}", pool.len()))?;
					PoolEntry::Utf8 { string }
				},
				pool::INTEGER => PoolEntry::Integer { bytes: reader.read_i32()? },
				pool::FLOAT => PoolEntry::Float { bytes: reader.read_u32()? },
				pool::LONG => PoolEntry::Long { bytes: reader.read_i64()? },
				pool::DOUBLE => PoolEntry::Double { bytes: reader.read_u64()? },
				pool::CLASS => PoolEntry::Class { name_index: reader.read_u16()? },
				pool::STRING => PoolEntry::String { string_index: reader.read_u16()? },
				pool::FIELD_REF => PoolEntry::FieldRef {
					class_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::METHOD_REF => PoolEntry::MethodRef {
					class_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef {
					class_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::NAME_AND_TYPE => PoolEntry::NameAndType {
					name_index: reader.read_u16()?,
					descriptor_index: reader.read_u16()?,
				},
				pool::METHOD_HANDLE => PoolEntry::MethodHandle {
					reference_kind: reader.read_u8()?,
					reference_index: reader.read_u16()?,
				},
				pool::METHOD_TYPE => PoolEntry::MethodType { descriptor_index: reader.read_u16()? },
				pool::DYNAMIC => PoolEntry::Dynamic {
					bootstrap_method_attribute_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
					bootstrap_method_attribute_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::MODULE => PoolEntry::Module { name_index: reader.read_u16()? },
				pool::PACKAGE => PoolEntry::Package { name_index: reader.read_u16()? },
				tag => bail!("unknown constant pool tag {tag} at pool index {}", pool.len()),
			};

			let takes_two_slots = matches!(entry, PoolEntry::Long { .. } | PoolEntry::Double { .. });
			pool.push(Some(entry));
			if takes_two_slots {
				// long and double take up two pool slots
				pool.push(None);
			}
		}

		if pool.len() != constant_pool_count.max(1) {
			bail!("last `Long` or `Double` entry overflows the constant pool count of {constant_pool_count}");
		}

		let resolved = (0..pool.len()).map(|_| OnceLock::new()).collect();
		Ok(ConstantPool { version, entries: pool, resolved })
	}

	/// The `constant_pool_count` of the class file, i.e. one more than the largest valid index.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.len() <= 1
	}

	/// Gets the raw entry at the given index.
	pub fn entry(&self, index: u16) -> Result<&PoolEntry> {
		if let Some(Some(entry)) = self.entries.get(index as usize) {
			Ok(entry)
		} else {
			bail!("pool entry at index {index:?} is not there: either index too large or the upper half of long or double");
		}
	}

	/// Resolves the entry at the given index, following all the indices it contains.
	///
	/// The result is cached, calling this again with the same index returns the same reference.
	pub fn resolve(&self, index: u16) -> Result<&Constant> {
		let cell = self.resolved.get(index as usize)
			.with_context(|| anyhow!("pool index {index} out of bounds for pool of size {}", self.len()))?;
		if let Some(constant) = cell.get() {
			return Ok(constant);
		}
		let constant = self.resolve_uncached(index).pool_context(index)?;
		Ok(cell.get_or_init(|| constant))
	}

	/// How many entries were resolved so far.
	pub fn resolved_count(&self) -> usize {
		self.resolved.iter().filter(|cell| cell.get().is_some()).count()
	}

	fn resolve_uncached(&self, index: u16) -> Result<Constant> {
		Ok(match *self.entry(index)? {
			PoolEntry::Utf8 { ref string } => Constant::Utf8(string.clone()),
			PoolEntry::Integer { bytes } => Constant::Integer(bytes),
			PoolEntry::Float { bytes } => Constant::Float(f32::from_bits(bytes)),
			PoolEntry::Long { bytes } => Constant::Long(bytes),
			PoolEntry::Double { bytes } => Constant::Double(f64::from_bits(bytes)),
			PoolEntry::Class { name_index } => Constant::Class(self.get_name(name_index)?),
			PoolEntry::String { string_index } => Constant::String(self.get_utf8(string_index)?.clone()),
			PoolEntry::FieldRef { class_index, name_and_type_index } =>
				Constant::FieldRef(self.member_ref(class_index, name_and_type_index)?),
			PoolEntry::MethodRef { class_index, name_and_type_index } =>
				Constant::MethodRef(self.member_ref(class_index, name_and_type_index)?),
			PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } =>
				Constant::InterfaceMethodRef(self.member_ref(class_index, name_and_type_index)?),
			PoolEntry::NameAndType { .. } => Constant::NameAndType(self.get_name_and_type(index)?),
			PoolEntry::MethodHandle { reference_kind, reference_index } =>
				Constant::MethodHandle(self.method_handle(reference_kind, reference_index)?),
			PoolEntry::MethodType { descriptor_index } => Constant::MethodType(self.get_name(descriptor_index)?),
			PoolEntry::Dynamic { bootstrap_method_attribute_index, name_and_type_index } => {
				let NameAndType { name, descriptor } = self.get_name_and_type(name_and_type_index)?;
				Constant::Dynamic(DynamicRef { bootstrap_method_attribute_index, name, descriptor })
			},
			PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index } => {
				let NameAndType { name, descriptor } = self.get_name_and_type(name_and_type_index)?;
				Constant::InvokeDynamic(DynamicRef { bootstrap_method_attribute_index, name, descriptor })
			},
			PoolEntry::Module { name_index } => Constant::Module(self.get_name(name_index)?),
			PoolEntry::Package { name_index } => Constant::Package(self.get_name(name_index)?),
		})
	}

	fn member_ref(&self, class_index: u16, name_and_type_index: u16) -> Result<MemberRef> {
		let class = self.get_class(class_index)?;
		let NameAndType { name, descriptor } = self.get_name_and_type(name_and_type_index)?;
		Ok(MemberRef { class, name, descriptor })
	}

	fn method_handle(&self, reference_kind: u8, reference_index: u16) -> Result<Handle> {
		let kind = ReferenceKind::from_u8(reference_kind)?;

		let (member, is_interface) = match (kind, self.entry(reference_index)?) {
			(kind, &PoolEntry::FieldRef { class_index, name_and_type_index }) if kind.is_field() =>
				(self.member_ref(class_index, name_and_type_index)?, false),
			(ReferenceKind::InvokeVirtual | ReferenceKind::NewInvokeSpecial, &PoolEntry::MethodRef { class_index, name_and_type_index }) =>
				(self.member_ref(class_index, name_and_type_index)?, false),
			(ReferenceKind::InvokeStatic | ReferenceKind::InvokeSpecial, &PoolEntry::MethodRef { class_index, name_and_type_index }) =>
				(self.member_ref(class_index, name_and_type_index)?, false),
			(ReferenceKind::InvokeStatic | ReferenceKind::InvokeSpecial, &PoolEntry::InterfaceMethodRef { class_index, name_and_type_index })
				if self.version.supports_interface_method_refs_for_static_and_special() =>
				(self.member_ref(class_index, name_and_type_index)?, true),
			(ReferenceKind::InvokeInterface, &PoolEntry::InterfaceMethodRef { class_index, name_and_type_index }) =>
				(self.member_ref(class_index, name_and_type_index)?, true),
			(kind, entry) => bail!("`MethodHandle` of kind {kind} can't reference {entry:?} in a class file of version {}", self.version),
		};

		match kind {
			ReferenceKind::NewInvokeSpecial if member.name != "<init>" =>
				bail!("`MethodHandle` of kind {kind} must reference `<init>`, got {member}"),
			ReferenceKind::InvokeVirtual | ReferenceKind::InvokeStatic | ReferenceKind::InvokeInterface if member.name == "<init>" =>
				bail!("`MethodHandle` of kind {kind} must not reference `<init>`, got {member}"),
			kind if !kind.is_field() && member.name == "<clinit>" =>
				bail!("`MethodHandle` of kind {kind} must not reference `<clinit>`, got {member}"),
			_ => {},
		}

		Ok(Handle { kind, member, is_interface })
	}

	pub fn get_utf8(&self, index: u16) -> Result<&JavaString> {
		let PoolEntry::Utf8 { string } = self.entry(index)? else {
			bail!("pool entry not `Utf8`: {:?}", self.entry(index)?);
		};
		Ok(string)
	}

	/// Gets an `Utf8` entry that is used as a name or descriptor.
	pub fn get_name(&self, index: u16) -> Result<String> {
		let string = self.get_utf8(index).pool_context(index)?;
		jstring::to_name(string).pool_context(index)
	}

	/// Gets the name of the class referenced by a `Class` entry.
	pub fn get_class(&self, index: u16) -> Result<String> {
		let &PoolEntry::Class { name_index } = self.entry(index)? else {
			bail!("pool entry not `Class`: {:?}", self.entry(index)?);
		};
		self.get_name(name_index).pool_context(index)
	}

	/// Returns [`None`] if `index` is zero, otherwise returns [`Some`] of the result of the function `f`.
	pub fn get_optional<'a, T: 'a>(&'a self, index: u16, f: impl Fn(&'a ConstantPool, u16) -> Result<T>) -> Result<Option<T>> {
		if index == 0 {
			Ok(None)
		} else {
			Ok(Some(f(self, index)?))
		}
	}

	pub fn get_name_and_type(&self, index: u16) -> Result<NameAndType> {
		let &PoolEntry::NameAndType { name_index, descriptor_index } = self.entry(index)? else {
			bail!("pool entry not `NameAndType`: {:?}", self.entry(index)?);
		};
		let name = self.get_name(name_index)?;
		let descriptor = self.get_name(descriptor_index)?;
		Ok(NameAndType { name, descriptor }).pool_context(index)
	}

	pub fn get_module(&self, index: u16) -> Result<String> {
		let &PoolEntry::Module { name_index } = self.entry(index)? else {
			bail!("pool entry not `Module`: {:?}", self.entry(index)?);
		};
		self.get_name(name_index).pool_context(index)
	}

	pub fn get_package(&self, index: u16) -> Result<String> {
		let &PoolEntry::Package { name_index } = self.entry(index)? else {
			bail!("pool entry not `Package`: {:?}", self.entry(index)?);
		};
		self.get_name(name_index).pool_context(index)
	}

	/// Resolves a `Fieldref`.
	pub fn get_field_ref(&self, index: u16) -> Result<&MemberRef> {
		match self.resolve(index)? {
			Constant::FieldRef(member) => Ok(member),
			other => bail!("pool entry at index {index} not `FieldRef`: {other}"),
		}
	}

	/// Resolves a `Methodref` or `InterfaceMethodref`. The boolean tells if it was an `InterfaceMethodref`.
	pub fn get_any_method_ref(&self, index: u16) -> Result<(&MemberRef, bool)> {
		match self.resolve(index)? {
			Constant::MethodRef(member) => Ok((member, false)),
			Constant::InterfaceMethodRef(member) => Ok((member, true)),
			other => bail!("pool entry at index {index} neither `MethodRef` nor `InterfaceMethodRef`: {other}"),
		}
	}

	/// Resolves an entry that `ldc` and friends can load.
	pub fn get_loadable(&self, index: u16) -> Result<&Constant> {
		let constant = self.resolve(index)?;
		if !constant.is_loadable() {
			bail!("pool entry at index {index} is not loadable: {constant}");
		}
		Ok(constant)
	}

	pub fn get_invoke_dynamic(&self, index: u16) -> Result<&DynamicRef> {
		match self.resolve(index)? {
			Constant::InvokeDynamic(dynamic) => Ok(dynamic),
			other => bail!("pool entry at index {index} not `InvokeDynamic`: {other}"),
		}
	}

	pub fn get_method_handle(&self, index: u16) -> Result<&Handle> {
		match self.resolve(index)? {
			Constant::MethodHandle(handle) => Ok(handle),
			other => bail!("pool entry at index {index} not `MethodHandle`: {other}"),
		}
	}

	pub(crate) fn get_constant_value(&self, index: u16) -> Result<ConstantValue> {
		Ok(match self.resolve(index)? {
			&Constant::Integer(value) => ConstantValue::Integer(value),
			&Constant::Float(value) => ConstantValue::Float(value),
			&Constant::Long(value) => ConstantValue::Long(value),
			&Constant::Double(value) => ConstantValue::Double(value),
			Constant::String(value) => ConstantValue::String(value.clone()),
			other => bail!("pool entry may not be used in a `ConstantValue` attribute: {other}"),
		})
	}
}

/// Tiny helper trait for adding pool indices to errors.
trait PoolContext {
	fn pool_context(self, index: u16) -> Self;
}
impl<T> PoolContext for Result<T> {
	fn pool_context(self, index: u16) -> Self {
		self.with_context(|| anyhow!("while getting pool index {index}"))
	}
}

impl std::fmt::Debug for ConstantPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConstantPool")
			.field("len", &self.len())
			.field("resolved", &self.resolved_count())
			.finish()
	}
}

/// A human-readable dump, one line per entry. Entries that fail to resolve are dumped with their error.
///
/// The dump only depends on the bytes the pool was read from.
impl Display for ConstantPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		for (index, entry) in self.entries.iter().enumerate() {
			if entry.is_none() {
				continue;
			}
			let Ok(index) = u16::try_from(index) else {
				break;
			};
			match self.resolve(index) {
				Ok(constant) => writeln!(f, "{index:>5} = {constant}")?,
				Err(e) => writeln!(f, "{index:>5} = <invalid: {e:#}>")?,
			}
		}
		Ok(())
	}
}

impl Clone for ConstantPool {
	fn clone(&self) -> Self {
		ConstantPool {
			version: self.version,
			entries: self.entries.clone(),
			resolved: (0..self.entries.len()).map(|_| OnceLock::new()).collect(),
		}
	}
}

#[cfg(test)]
mod testing {
	use std::io::Cursor;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::pool::{Constant, ConstantPool, MemberRef, ReferenceKind};
	use crate::tree::version::Version;

	fn utf8(s: &str) -> Vec<u8> {
		let mut v = vec![1];
		v.extend((s.len() as u16).to_be_bytes());
		v.extend(s.as_bytes());
		v
	}

	fn pool(count: u16, entries: &[Vec<u8>], version: Version) -> Result<ConstantPool> {
		let mut data = count.to_be_bytes().to_vec();
		for entry in entries {
			data.extend(entry);
		}
		ConstantPool::read(&mut Cursor::new(data), version)
	}

	fn method_ref_pool(reference_kind: u8, name: &str, version: Version) -> Result<ConstantPool> {
		pool(8, &[
			utf8("Foo"),               // 1
			vec![7, 0, 1],             // 2: Class Foo
			utf8(name),                // 3
			utf8("()V"),               // 4
			vec![12, 0, 3, 0, 4],      // 5: NameAndType
			vec![10, 0, 2, 0, 5],      // 6: MethodRef
			vec![15, reference_kind, 0, 6], // 7: MethodHandle
		], version)
	}

	#[test]
	fn long_takes_two_slots() -> Result<()> {
		let pool = pool(5, &[
			vec![5, 0, 0, 0, 0, 0, 0, 0, 42],
			vec![3, 0xff, 0xff, 0xff, 0xff],
			utf8("x"),
		], Version::V1_8)?;

		assert_eq!(pool.resolve(1)?, &Constant::Long(42));
		assert!(pool.resolve(2).is_err());
		assert_eq!(pool.resolve(3)?, &Constant::Integer(-1));
		Ok(())
	}

	#[test]
	fn resolution_is_cached() -> Result<()> {
		let pool = method_ref_pool(6, "bar", Version::V1_8)?;
		assert_eq!(pool.resolved_count(), 0);

		let first = pool.resolve(6)? as *const Constant;
		let second = pool.resolve(6)? as *const Constant;
		assert_eq!(first, second);
		assert_eq!(pool.resolved_count(), 1);

		let (member, is_interface) = pool.get_any_method_ref(6)?;
		assert_eq!(member, &MemberRef { class: "Foo".to_owned(), name: "bar".to_owned(), descriptor: "()V".to_owned() });
		assert!(!is_interface);
		Ok(())
	}

	#[test]
	fn method_handle_init_rules() -> Result<()> {
		let handle = method_ref_pool(8, "<init>", Version::V1_8)?;
		assert_eq!(handle.get_method_handle(7)?.kind, ReferenceKind::NewInvokeSpecial);

		let handle = method_ref_pool(7, "<init>", Version::V1_8)?;
		assert_eq!(handle.get_method_handle(7)?.kind, ReferenceKind::InvokeSpecial);

		assert!(method_ref_pool(5, "<init>", Version::V1_8)?.get_method_handle(7).is_err());
		assert!(method_ref_pool(8, "notInit", Version::V1_8)?.get_method_handle(7).is_err());
		assert!(method_ref_pool(6, "<clinit>", Version::V1_8)?.get_method_handle(7).is_err());
		// a field reference kind can't point to a method
		assert!(method_ref_pool(1, "bar", Version::V1_8)?.get_method_handle(7).is_err());
		Ok(())
	}

	#[test]
	fn unknown_tag_fails() {
		assert!(pool(2, &[vec![2, 0, 0]], Version::V1_8).is_err());
	}

	#[test]
	fn dump_is_deterministic() -> Result<()> {
		let a = method_ref_pool(6, "bar", Version::V1_8)?;
		let b = method_ref_pool(6, "bar", Version::V1_8)?;

		let dump = a.to_string();
		assert_eq!(dump, b.to_string());
		assert_eq!(dump, a.to_string());
		assert!(dump.contains("    6 = MethodRef: Foo.bar:()V"));
		assert!(dump.contains("    7 = MethodHandle: invokeStatic Foo.bar:()V"));
		Ok(())
	}
}
