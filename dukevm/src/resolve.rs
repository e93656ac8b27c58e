//! Field and method resolution, and the selection of the method a virtual call actually runs.

use std::collections::HashMap;
use std::sync::Arc;
use log::debug;
use crate::class::{Class, ClassId, Field};
use crate::error::VmResult;
use crate::method::Method;
use crate::subtype::is_assignable_from;
use crate::thread::Thread;
use crate::vm::Vm;

const OBJECT: &str = "java/lang/Object";
const POLYMORPHIC_CLASSES: [&str; 2] = ["java/lang/invoke/MethodHandle", "java/lang/invoke/VarHandle"];

/// Resolves a method, by class method resolution or interface method resolution, depending on the kind of
/// reference.
pub fn resolve_method(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, name: &str, descriptor: &str, is_interface: bool) -> VmResult<Arc<Method>> {
	if is_interface {
		resolve_interface_method(vm, thread, class, name, descriptor)
	} else {
		resolve_class_method(vm, thread, class, name, descriptor)
	}
}

fn cached(class: &Class, name: &str, descriptor: &str) -> Option<Arc<Method>> {
	class.method_cache.lock().get(&(name.to_owned(), descriptor.to_owned())).cloned()
}

fn remember(class: &Class, name: &str, descriptor: &str, method: Arc<Method>) -> Arc<Method> {
	class.method_cache.lock()
		.entry((name.to_owned(), descriptor.to_owned()))
		.or_insert(method)
		.clone()
}

fn no_such_method(vm: &Vm, thread: &mut Thread, class: &Class, name: &str, descriptor: &str) -> crate::error::VmError {
	let message = format!("'{}'", display_method(class, name, descriptor));
	vm.throw(thread, "java/lang/NoSuchMethodError", Some(message))
}

fn display_method(class: &Class, name: &str, descriptor: &str) -> String {
	format!("{}.{name}{descriptor}", class.java_name())
}

/// Resolves a method referenced by a `Methodref`.
///
/// Searches the class and its superclasses, then signature polymorphic methods, then the maximally specific
/// superinterface methods.
pub fn resolve_class_method(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Arc<Method>> {
	if class.is_interface() {
		let message = format!("Found interface {}, but class was expected", class.java_name());
		return Err(vm.throw(thread, "java/lang/IncompatibleClassChangeError", Some(message)));
	}
	// array classes have no methods of their own
	let class = if class.is_array() { vm.load_class(thread, OBJECT)? } else { class.clone() };

	if let Some(method) = cached(&class, name, descriptor) {
		return Ok(method);
	}
	vm.stats().count_method_search();

	let mut current = Some(&class);
	while let Some(c) = current {
		if let Some(method) = c.declared_method(name, descriptor) {
			return Ok(remember(&class, name, descriptor, method.clone()));
		}
		current = c.super_class();
	}

	if let Some(method) = find_polymorphic(&class, name) {
		return Ok(remember(&class, name, descriptor, method));
	}

	match choose_maximally_specific(vm, thread, &class, name, descriptor)? {
		Some(method) => Ok(remember(&class, name, descriptor, method)),
		None => Err(no_such_method(vm, thread, &class, name, descriptor)),
	}
}

/// Whether calls to this method take their argument types from the call site.
pub fn is_signature_polymorphic(method: &Method) -> bool {
	POLYMORPHIC_CLASSES.contains(&method.class().name()) && method.is_native() && method.access().is_varargs
}

/// A method is signature polymorphic if it's declared by `MethodHandle` or `VarHandle`, is `native` and varargs,
/// and it's the only method with that name there. These only exist from class file version 51 on.
fn find_polymorphic(class: &Arc<Class>, name: &str) -> Option<Arc<Method>> {
	if !POLYMORPHIC_CLASSES.contains(&class.name()) {
		return None;
	}
	if !class.version()?.supports_polymorphic_signatures() {
		return None;
	}
	let mut named = class.links().ok()?.methods().iter().filter(|method| method.name() == name);
	match (named.next(), named.next()) {
		(Some(method), None) if method.is_native() && method.access().is_varargs => Some(method.clone()),
		_ => None,
	}
}

/// Resolves a method referenced by an `InterfaceMethodref`.
///
/// Searches the interface, then the public instance methods of `java/lang/Object`, then the maximally specific
/// superinterface methods.
pub fn resolve_interface_method(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Arc<Method>> {
	if !class.is_interface() {
		let message = format!("Found class {}, but interface was expected", class.java_name());
		return Err(vm.throw(thread, "java/lang/IncompatibleClassChangeError", Some(message)));
	}

	if let Some(method) = cached(class, name, descriptor) {
		return Ok(method);
	}
	vm.stats().count_method_search();

	if let Some(method) = class.declared_method(name, descriptor) {
		return Ok(remember(class, name, descriptor, method.clone()));
	}

	let object = vm.load_class(thread, OBJECT)?;
	if let Some(method) = object.declared_method(name, descriptor) {
		if method.access().is_public && !method.is_static() {
			return Ok(remember(class, name, descriptor, method.clone()));
		}
	}

	match choose_maximally_specific(vm, thread, class, name, descriptor)? {
		Some(method) => Ok(remember(class, name, descriptor, method)),
		None => Err(no_such_method(vm, thread, class, name, descriptor)),
	}
}

/// Picks the one maximally specific superinterface method that isn't abstract, or any abstract one if there's no
/// such method. More than one non-abstract candidate throws `java/lang/IncompatibleClassChangeError`.
fn choose_maximally_specific(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Option<Arc<Method>>> {
	let candidates = maximally_specific(class, name, descriptor)?;
	let non_abstract: Vec<&Arc<Method>> = candidates.iter().filter(|method| !method.is_abstract()).collect();
	match non_abstract.as_slice() {
		[] => Ok(candidates.first().cloned()),
		[method] => Ok(Some((*method).clone())),
		conflicting => {
			debug!("conflicting default methods for {name}{descriptor} in {}", class.name());
			let message = format!("Conflicting default methods: {}", conflicting.iter()
				.map(|method| method.to_string())
				.collect::<Vec<_>>()
				.join(" "));
			Err(vm.throw(thread, "java/lang/IncompatibleClassChangeError", Some(message)))
		},
	}
}

/// Finds the methods of all superinterfaces of `class` that aren't overridden by a method of a more specific
/// superinterface. Private and static interface methods don't take part.
fn maximally_specific(class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Vec<Arc<Method>>> {
	let interfaces = class.links()?.all_interfaces();

	// every interface, mapped to the interfaces extending it
	let mut sub_interfaces: HashMap<ClassId, Vec<ClassId>> = HashMap::new();
	for interface in interfaces {
		for super_interface in interface.links()?.all_interfaces() {
			sub_interfaces.entry(super_interface.id()).or_default().push(interface.id());
		}
	}

	let candidates: Vec<&Arc<Method>> = interfaces.iter()
		.filter_map(|interface| interface.declared_method(name, descriptor))
		.filter(|method| !method.is_private() && !method.is_static())
		.collect();

	Ok(candidates.iter()
		.filter(|method| {
			let subs = sub_interfaces.get(&method.class().id());
			!candidates.iter().any(|other| subs.is_some_and(|subs| subs.contains(&other.class().id())))
		})
		.map(|&method| method.clone())
		.collect())
}

/// Resolves a field referenced by a `Fieldref`.
///
/// Searches the class, then its superinterfaces, then the superclass, recursively.
pub fn resolve_field(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Arc<Field>> {
	let key = (name.to_owned(), descriptor.to_owned());
	if let Some(field) = class.field_cache.lock().get(&key) {
		return Ok(field.clone());
	}
	vm.stats().count_field_search();

	match find_field(class, name, descriptor) {
		Some(field) => Ok(class.field_cache.lock().entry(key).or_insert(field).clone()),
		None => {
			let message = format!("Class {} does not have member field '{} {name}'", class.java_name(), descriptor);
			Err(vm.throw(thread, "java/lang/NoSuchFieldError", Some(message)))
		},
	}
}

fn find_field(class: &Arc<Class>, name: &str, descriptor: &str) -> Option<Arc<Field>> {
	if let Some(field) = class.declared_field(name, descriptor) {
		return Some(field.clone());
	}
	let links = class.links().ok()?;
	for interface in links.interfaces() {
		if let Some(field) = find_field(interface, name, descriptor) {
			return Some(field);
		}
	}
	links.super_class().and_then(|super_class| find_field(super_class, name, descriptor))
}

/// Selects the method an `invokevirtual` or `invokeinterface` runs, for a receiver of the given class.
pub fn select_virtual(vm: &Vm, thread: &mut Thread, resolved: &Arc<Method>, receiver: &Arc<Class>) -> VmResult<Arc<Method>> {
	if resolved.is_private() {
		return Ok(resolved.clone());
	}

	let selected = if receiver.is_array() {
		// arrays have only the methods of java/lang/Object, with clone being the array copy
		Some(resolved.clone())
	} else {
		select_from(vm, thread, receiver, resolved.name(), resolved.descriptor())?
	};

	match selected {
		Some(method) if !method.is_abstract() => Ok(method),
		_ => {
			let message = format!("Receiver class {} does not define or inherit an implementation of the resolved method '{}'",
				receiver.java_name(), display_method(resolved.class(), resolved.name(), resolved.descriptor()));
			Err(vm.throw(thread, "java/lang/AbstractMethodError", Some(message)))
		},
	}
}

/// Searches the class and its superclasses for an instance method, then the maximally specific superinterface
/// methods, preferring non-abstract ones.
fn select_from(vm: &Vm, thread: &mut Thread, class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Option<Arc<Method>>> {
	let mut current = Some(class);
	while let Some(c) = current {
		if let Some(method) = c.declared_method(name, descriptor) {
			if !method.is_static() {
				return Ok(Some(method.clone()));
			}
		}
		current = c.super_class();
	}

	choose_maximally_specific(vm, thread, class, name, descriptor)
}

/// Selects the method an `invokespecial` runs.
///
/// For a call to a superclass method from a class with `ACC_SUPER` set, the lookup starts at the direct superclass of
/// the calling class. Otherwise the resolved method is used.
pub fn select_special(vm: &Vm, thread: &mut Thread, resolved: &Arc<Method>, caller: &Arc<Class>) -> VmResult<Arc<Method>> {
	let resolved_class = resolved.class();
	let use_super_lookup = !resolved.is_initializer()
		&& !resolved.is_private()
		&& !resolved_class.is_interface()
		&& caller.access().is_super
		&& !Arc::ptr_eq(resolved_class, caller)
		&& is_assignable_from(resolved_class, caller);

	if !use_super_lookup {
		if resolved.is_abstract() {
			let message = format!("'{}'", display_method(resolved_class, resolved.name(), resolved.descriptor()));
			return Err(vm.throw(thread, "java/lang/AbstractMethodError", Some(message)));
		}
		return Ok(resolved.clone());
	}

	let Some(super_class) = caller.super_class() else {
		return Ok(resolved.clone());
	};
	match select_from(vm, thread, super_class, resolved.name(), resolved.descriptor())? {
		Some(method) if !method.is_abstract() => Ok(method),
		_ => {
			let message = format!("'{}'", display_method(resolved_class, resolved.name(), resolved.descriptor()));
			Err(vm.throw(thread, "java/lang/AbstractMethodError", Some(message)))
		},
	}
}
