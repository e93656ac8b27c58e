use std::fmt::{Debug, Formatter};
use java_string::JavaString;
use crate::class_constants::access;
use crate::tree::attribute::{RawAnnotations, RawAttribute};

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
	pub access: FieldAccess,
	pub name: String,
	pub descriptor: String,

	pub has_deprecated_attribute: bool,
	pub has_synthetic_attribute: bool,

	pub constant_value: Option<ConstantValue>,
	pub signature: Option<String>,

	pub annotations: RawAnnotations,
	pub attributes: Vec<RawAttribute>,
}

impl Field {
	pub fn new(access: FieldAccess, name: String, descriptor: String) -> Field {
		Field {
			access,
			name,
			descriptor,

			has_deprecated_attribute: false,
			has_synthetic_attribute: false,

			constant_value: None,
			signature: None,

			annotations: RawAnnotations::default(),
			attributes: Vec::new(),
		}
	}
}

/// The value of a `ConstantValue` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	String(JavaString),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldAccess {
	pub is_public: bool,
	pub is_private: bool,
	pub is_protected: bool,
	pub is_static: bool,
	pub is_final: bool,
	pub is_volatile: bool,
	pub is_transient: bool,
	pub is_synthetic: bool,
	pub is_enum: bool,
}

impl From<u16> for FieldAccess {
	fn from(flags: u16) -> Self {
		FieldAccess {
			is_public: flags & access::PUBLIC != 0,
			is_private: flags & access::PRIVATE != 0,
			is_protected: flags & access::PROTECTED != 0,
			is_static: flags & access::STATIC != 0,
			is_final: flags & access::FINAL != 0,
			is_volatile: flags & access::VOLATILE != 0,
			is_transient: flags & access::TRANSIENT != 0,
			is_synthetic: flags & access::SYNTHETIC != 0,
			is_enum: flags & access::ENUM != 0,
		}
	}
}

impl From<FieldAccess> for u16 {
	fn from(value: FieldAccess) -> Self {
		(if value.is_public    { access::PUBLIC    } else { 0 }) |
		(if value.is_private   { access::PRIVATE   } else { 0 }) |
		(if value.is_protected { access::PROTECTED } else { 0 }) |
		(if value.is_static    { access::STATIC    } else { 0 }) |
		(if value.is_final     { access::FINAL     } else { 0 }) |
		(if value.is_volatile  { access::VOLATILE  } else { 0 }) |
		(if value.is_transient { access::TRANSIENT } else { 0 }) |
		(if value.is_synthetic { access::SYNTHETIC } else { 0 }) |
		(if value.is_enum      { access::ENUM      } else { 0 })
	}
}

impl Debug for FieldAccess {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str("FieldAccess { ")?;
		if self.is_public    { f.write_str("public ")?; }
		if self.is_private   { f.write_str("private ")?; }
		if self.is_protected { f.write_str("protected ")?; }
		if self.is_static    { f.write_str("static ")?; }
		if self.is_final     { f.write_str("final ")?; }
		if self.is_volatile  { f.write_str("volatile ")?; }
		if self.is_transient { f.write_str("transient ")?; }
		if self.is_synthetic { f.write_str("synthetic ")?; }
		if self.is_enum      { f.write_str("enum ")?; }
		f.write_str("}")
	}
}
