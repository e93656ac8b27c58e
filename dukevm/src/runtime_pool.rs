//! Linking constant pool entries to runtime structures.
//!
//! The symbolic resolution of an entry (like following the name and type of a `Fieldref`) is done and cached by
//! [`duke::tree::pool::ConstantPool`]. Here the symbolic result is turned into a loaded class, a resolved field or
//! method, or an interned string, and cached per pool index of the referencing class. Failed resolutions are not
//! cached, so the next execution tries again.

use std::sync::Arc;
use duke::tree::descriptor::MethodDescriptor;
use duke::tree::pool::Constant;
use crate::class::{Class, Field};
use crate::error::{fatal, VmResult};
use crate::method::Method;
use crate::object::ObjectRef;
use crate::resolve;
use crate::strings::units_from_java;
use crate::thread::Thread;
use crate::vm::Vm;

#[derive(Debug, Clone)]
pub enum RuntimeEntry {
	Class(Arc<Class>),
	Field(Arc<Field>),
	Method {
		method: Arc<Method>,
		/// The slots the parameters take according to the descriptor at the call site, not counting a receiver.
		///
		/// This only differs from the resolved method for signature polymorphic methods.
		parameter_slots: usize,
	},
	String(ObjectRef),
}

fn cached(class: &Class, index: u16) -> VmResult<Option<&RuntimeEntry>> {
	class.pool.get(index as usize)
		.map(|cell| cell.get())
		.ok_or_else(|| fatal!("pool index {index} is out of bounds for {}", class.name()))
}

fn store(class: &Class, index: u16, entry: RuntimeEntry) {
	if let Some(cell) = class.pool.get(index as usize) {
		// another thread might have been faster, resolving to the same thing
		let _ = cell.set(entry);
	}
}

fn pool(class: &Class) -> VmResult<&duke::tree::pool::ConstantPool> {
	class.file()
		.map(|file| &file.pool)
		.ok_or_else(|| fatal!("{} has no constant pool", class.name()))
}

/// Resolves a `Class` entry, loading the class.
pub fn class_at(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, index: u16) -> VmResult<Arc<Class>> {
	match cached(class, index)? {
		Some(RuntimeEntry::Class(resolved)) => return Ok(resolved.clone()),
		Some(other) => return Err(fatal!("pool index {index} of {} is no class but {other:?}", class.name())),
		None => {},
	}

	let name = pool(class)?.get_class(index)?;
	let resolved = vm.load_class(thread, &name)?;
	store(class, index, RuntimeEntry::Class(resolved.clone()));
	Ok(resolved)
}

/// Resolves a `Fieldref` entry.
pub fn field_at(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, index: u16) -> VmResult<Arc<Field>> {
	match cached(class, index)? {
		Some(RuntimeEntry::Field(resolved)) => return Ok(resolved.clone()),
		Some(other) => return Err(fatal!("pool index {index} of {} is no field but {other:?}", class.name())),
		None => {},
	}

	let member = pool(class)?.get_field_ref(index)?.clone();
	let owner = vm.load_class(thread, &member.class)?;
	let resolved = resolve::resolve_field(vm, thread, &owner, &member.name, &member.descriptor)?;
	store(class, index, RuntimeEntry::Field(resolved.clone()));
	Ok(resolved)
}

/// Resolves a `Methodref` or `InterfaceMethodref` entry. Also returns the parameter slots of the call site.
pub fn method_at(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, index: u16) -> VmResult<(Arc<Method>, usize)> {
	match cached(class, index)? {
		Some(RuntimeEntry::Method { method, parameter_slots }) => return Ok((method.clone(), *parameter_slots)),
		Some(other) => return Err(fatal!("pool index {index} of {} is no method but {other:?}", class.name())),
		None => {},
	}

	let (member, is_interface) = pool(class)?.get_any_method_ref(index)?;
	let member = member.clone();

	let owner = vm.load_class(thread, &member.class)?;
	let resolved = resolve::resolve_method(vm, thread, &owner, &member.name, &member.descriptor, is_interface)?;
	// signature polymorphic methods take the arguments the call site gives them
	let parameter_slots = if resolve::is_signature_polymorphic(&resolved) {
		MethodDescriptor::parse(&member.descriptor)?.parameter_slots()
	} else {
		resolved.parameter_slots()
	};
	store(class, index, RuntimeEntry::Method { method: resolved.clone(), parameter_slots });
	Ok((resolved, parameter_slots))
}

/// Resolves a `String` entry to an interned string.
pub fn string_at(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, index: u16) -> VmResult<ObjectRef> {
	match cached(class, index)? {
		Some(RuntimeEntry::String(string)) => return Ok(string.clone()),
		Some(other) => return Err(fatal!("pool index {index} of {} is no string but {other:?}", class.name())),
		None => {},
	}

	let Constant::String(string) = pool(class)?.get_loadable(index)? else {
		return Err(fatal!("pool index {index} of {} is no string constant", class.name()));
	};
	let units = units_from_java(string);
	let interned = vm.intern(thread, units)?;
	store(class, index, RuntimeEntry::String(interned.clone()));
	Ok(interned)
}
