use std::fmt::{Debug, Formatter};
use crate::class_constants::access;
use crate::tree::attribute::{RawAnnotations, RawAttribute};
use crate::tree::code::Code;

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
	pub access: MethodAccess,
	pub name: String,
	pub descriptor: String,

	pub has_deprecated_attribute: bool,
	pub has_synthetic_attribute: bool,

	pub code: Option<Code>,
	pub exceptions: Option<Vec<String>>,
	pub signature: Option<String>,

	pub annotations: RawAnnotations,
	pub runtime_visible_parameter_annotations: Option<Vec<u8>>,
	pub runtime_invisible_parameter_annotations: Option<Vec<u8>>,
	/// The raw `element_value` of the `AnnotationDefault` attribute.
	pub annotation_default: Option<Vec<u8>>,
	pub method_parameters: Option<Vec<MethodParameter>>,

	pub attributes: Vec<RawAttribute>,
}

impl Method {
	pub fn new(access: MethodAccess, name: String, descriptor: String) -> Method {
		Method {
			access,
			name,
			descriptor,

			has_deprecated_attribute: false,
			has_synthetic_attribute: false,

			code: None,
			exceptions: None,
			signature: None,

			annotations: RawAnnotations::default(),
			runtime_visible_parameter_annotations: None,
			runtime_invisible_parameter_annotations: None,
			annotation_default: None,
			method_parameters: None,

			attributes: Vec::new(),
		}
	}

	pub fn is_initializer(&self) -> bool {
		self.name == "<init>"
	}

	pub fn is_class_initializer(&self) -> bool {
		self.name == "<clinit>"
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodParameter {
	pub name: Option<String>,
	pub flags: u16,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodAccess {
	pub is_public: bool,
	pub is_private: bool,
	pub is_protected: bool,
	pub is_static: bool,
	pub is_final: bool,
	pub is_synchronized: bool,
	pub is_bridge: bool,
	pub is_varargs: bool,
	pub is_native: bool,
	pub is_abstract: bool,
	pub is_strict: bool,
	pub is_synthetic: bool,
}

impl From<u16> for MethodAccess {
	fn from(flags: u16) -> Self {
		MethodAccess {
			is_public: flags & access::PUBLIC != 0,
			is_private: flags & access::PRIVATE != 0,
			is_protected: flags & access::PROTECTED != 0,
			is_static: flags & access::STATIC != 0,
			is_final: flags & access::FINAL != 0,
			is_synchronized: flags & access::SYNCHRONIZED != 0,
			is_bridge: flags & access::BRIDGE != 0,
			is_varargs: flags & access::VARARGS != 0,
			is_native: flags & access::NATIVE != 0,
			is_abstract: flags & access::ABSTRACT != 0,
			is_strict: flags & access::STRICT != 0,
			is_synthetic: flags & access::SYNTHETIC != 0,
		}
	}
}

impl From<MethodAccess> for u16 {
	fn from(value: MethodAccess) -> Self {
		(if value.is_public       { access::PUBLIC       } else { 0 }) |
		(if value.is_private      { access::PRIVATE      } else { 0 }) |
		(if value.is_protected    { access::PROTECTED    } else { 0 }) |
		(if value.is_static       { access::STATIC       } else { 0 }) |
		(if value.is_final        { access::FINAL        } else { 0 }) |
		(if value.is_synchronized { access::SYNCHRONIZED } else { 0 }) |
		(if value.is_bridge       { access::BRIDGE       } else { 0 }) |
		(if value.is_varargs      { access::VARARGS      } else { 0 }) |
		(if value.is_native       { access::NATIVE       } else { 0 }) |
		(if value.is_abstract     { access::ABSTRACT     } else { 0 }) |
		(if value.is_strict       { access::STRICT       } else { 0 }) |
		(if value.is_synthetic    { access::SYNTHETIC    } else { 0 })
	}
}

impl Debug for MethodAccess {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str("MethodAccess { ")?;
		if self.is_public       { f.write_str("public ")?; }
		if self.is_private      { f.write_str("private ")?; }
		if self.is_protected    { f.write_str("protected ")?; }
		if self.is_static       { f.write_str("static ")?; }
		if self.is_final        { f.write_str("final ")?; }
		if self.is_synchronized { f.write_str("synchronized ")?; }
		if self.is_bridge       { f.write_str("bridge ")?; }
		if self.is_varargs      { f.write_str("varargs ")?; }
		if self.is_native       { f.write_str("native ")?; }
		if self.is_abstract     { f.write_str("abstract ")?; }
		if self.is_strict       { f.write_str("strict ")?; }
		if self.is_synthetic    { f.write_str("synthetic ")?; }
		f.write_str("}")
	}
}
