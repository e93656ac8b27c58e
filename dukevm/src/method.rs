use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use anyhow::{anyhow, Context, Result};
use duke::tree::code::Code;
use duke::tree::descriptor::{MethodDescriptor, Type};
use duke::tree::method::MethodAccess;
use crate::class::Class;
use crate::natives::NativeFn;

static NEXT_METHOD_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies a method for the lifetime of the process. Part of the key of inline caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(usize);

/// A method bound to its declaring class, with its descriptor parsed.
pub struct Method {
	id: MethodId,
	class: Arc<Class>,
	/// The index into the methods of the class file.
	index: usize,
	name: String,
	descriptor: String,
	access: MethodAccess,
	parsed: MethodDescriptor,
	/// For each parameter, the number of slots it takes.
	slot_widths: Vec<u8>,
	/// Bound on the first invocation.
	pub(crate) native: OnceLock<NativeFn>,
}

impl Method {
	pub(crate) fn new(class: &Arc<Class>, index: usize) -> Result<Method> {
		let method = class.file()
			.and_then(|file| file.methods.get(index))
			.with_context(|| anyhow!("class {} has no method at index {index}", class.name()))?;

		let parsed = MethodDescriptor::parse(&method.descriptor)
			.with_context(|| anyhow!("in method {}.{}", class.name(), method.name))?;
		let slot_widths: Vec<u8> = parsed.parameters.iter().map(|ty| ty.size() as u8).collect();

		Ok(Method {
			id: MethodId(NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed)),
			class: class.clone(),
			index,
			name: method.name.clone(),
			descriptor: method.descriptor.clone(),
			access: method.access,
			parsed,
			slot_widths,
			native: OnceLock::new(),
		})
	}

	pub fn id(&self) -> MethodId {
		self.id
	}

	/// The declaring class.
	pub fn class(&self) -> &Arc<Class> {
		&self.class
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn descriptor(&self) -> &str {
		&self.descriptor
	}

	pub fn access(&self) -> MethodAccess {
		self.access
	}

	pub fn parameters(&self) -> &[Type] {
		&self.parsed.parameters
	}

	/// The return type, [`None`] for `void`.
	pub fn return_type(&self) -> Option<&Type> {
		self.parsed.return_type.as_ref()
	}

	/// The operand stack cells the parameters take, without the receiver.
	pub fn parameter_slots(&self) -> usize {
		self.slot_widths.iter().map(|&width| width as usize).sum()
	}

	/// The local variable slots the arguments take, including the receiver.
	pub fn arg_slots(&self) -> usize {
		self.parameter_slots() + if self.is_static() { 0 } else { 1 }
	}

	pub fn code(&self) -> Option<&Code> {
		self.class.file()?.methods.get(self.index)?.code.as_ref()
	}

	pub fn is_static(&self) -> bool {
		self.access.is_static
	}

	pub fn is_abstract(&self) -> bool {
		self.access.is_abstract
	}

	pub fn is_native(&self) -> bool {
		self.access.is_native
	}

	pub fn is_private(&self) -> bool {
		self.access.is_private
	}

	pub fn is_initializer(&self) -> bool {
		self.name == "<init>"
	}

	/// A non-abstract instance method declared by an interface.
	pub fn is_default(&self) -> bool {
		self.class.is_interface() && !self.access.is_abstract && !self.access.is_static && !self.access.is_private
	}
}

impl Debug for Method {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Method({self})")
	}
}

impl Display for Method {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}{}", self.class.name(), self.name, self.descriptor)
	}
}
