use std::fmt::{Debug, Formatter};
use crate::class_constants::access;
use crate::tree::attribute::{RawAnnotations, RawAttribute};
use crate::tree::field::Field;
use crate::tree::method::Method;
use crate::tree::pool::{ConstantPool, Handle};
use crate::tree::version::Version;

/// A parsed class file.
///
/// Apart from the constant pool's resolution cache, this is never changed after reading.
#[derive(Debug, Clone)]
pub struct ClassFile {
	pub version: Version,
	pub access: ClassAccess,
	/// The index of the `this_class` entry in the constant pool.
	pub this_class: u16,
	pub name: String,
	pub super_class: Option<String>,
	pub interfaces: Vec<String>,

	pub fields: Vec<Field>,
	pub methods: Vec<Method>,

	pub pool: ConstantPool,

	pub has_deprecated_attribute: bool,
	pub has_synthetic_attribute: bool,

	pub source_file: Option<String>,
	pub inner_classes: Option<Vec<InnerClass>>,
	pub enclosing_method: Option<EnclosingMethod>,
	pub signature: Option<String>,
	pub bootstrap_methods: Option<Vec<BootstrapMethod>>,

	pub nest_host: Option<String>,
	pub nest_members: Option<Vec<String>>,
	pub permitted_subclasses: Option<Vec<String>>,
	pub record_components: Option<Vec<RecordComponent>>,

	pub annotations: RawAnnotations,
	pub attributes: Vec<RawAttribute>,
}

impl ClassFile {
	pub fn is_interface(&self) -> bool {
		self.access.is_interface
	}

	/// Whether this class has a `Record` attribute.
	pub fn is_record(&self) -> bool {
		self.record_components.is_some()
	}

	pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
		self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
	}

	pub fn field(&self, name: &str, descriptor: &str) -> Option<&Field> {
		self.fields.iter().find(|f| f.name == name && f.descriptor == descriptor)
	}

	/// The package part of the class name, `java/lang` for `java/lang/Object`. Empty for the unnamed package.
	pub fn package(&self) -> &str {
		self.name.rsplit_once('/').map_or("", |(package, _)| package)
	}
}

/// An entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
	pub inner_class: String,
	pub outer_class: Option<String>,
	pub inner_name: Option<String>,
	pub flags: u16,
}

/// The `EnclosingMethod` attribute. The method is only present if the class is directly enclosed by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
	pub class: String,
	pub method: Option<(String, String)>,
}

/// An entry of the `BootstrapMethods` attribute.
///
/// The arguments are kept as pool indices, as an argument can refer to a `Dynamic` entry that uses another
/// bootstrap method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
	pub handle: Handle,
	pub arguments: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
	pub name: String,
	pub descriptor: String,
	pub signature: Option<String>,
	pub annotations: RawAnnotations,
	pub attributes: Vec<RawAttribute>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassAccess {
	pub is_public: bool,
	pub is_final: bool,
	pub is_super: bool,
	pub is_interface: bool,
	pub is_abstract: bool,
	pub is_synthetic: bool,
	pub is_annotation: bool,
	pub is_enum: bool,
	pub is_module: bool,
}

impl From<u16> for ClassAccess {
	fn from(flags: u16) -> Self {
		ClassAccess {
			is_public: flags & access::PUBLIC != 0,
			is_final: flags & access::FINAL != 0,
			is_super: flags & access::SUPER != 0,
			is_interface: flags & access::INTERFACE != 0,
			is_abstract: flags & access::ABSTRACT != 0,
			is_synthetic: flags & access::SYNTHETIC != 0,
			is_annotation: flags & access::ANNOTATION != 0,
			is_enum: flags & access::ENUM != 0,
			is_module: flags & access::MODULE != 0,
		}
	}
}

impl From<ClassAccess> for u16 {
	fn from(value: ClassAccess) -> Self {
		(if value.is_public     { access::PUBLIC     } else { 0 }) |
		(if value.is_final      { access::FINAL      } else { 0 }) |
		(if value.is_super      { access::SUPER      } else { 0 }) |
		(if value.is_interface  { access::INTERFACE  } else { 0 }) |
		(if value.is_abstract   { access::ABSTRACT   } else { 0 }) |
		(if value.is_synthetic  { access::SYNTHETIC  } else { 0 }) |
		(if value.is_annotation { access::ANNOTATION } else { 0 }) |
		(if value.is_enum       { access::ENUM       } else { 0 }) |
		(if value.is_module     { access::MODULE     } else { 0 })
	}
}

impl Debug for ClassAccess {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str("ClassAccess { ")?;
		if self.is_public     { f.write_str("public ")?; }
		if self.is_final      { f.write_str("final ")?; }
		if self.is_super      { f.write_str("super ")?; }
		if self.is_interface  { f.write_str("interface ")?; }
		if self.is_abstract   { f.write_str("abstract ")?; }
		if self.is_synthetic  { f.write_str("synthetic ")?; }
		if self.is_annotation { f.write_str("annotation ")?; }
		if self.is_enum       { f.write_str("enum ")?; }
		if self.is_module     { f.write_str("module ")?; }
		f.write_str("}")
	}
}
