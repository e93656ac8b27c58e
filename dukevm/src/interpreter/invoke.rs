use std::sync::Arc;
use crate::class::Class;
use crate::error::{fatal, VmResult};
use crate::inline_cache::CallSite;
use crate::interpreter::{Executor, INCOMPATIBLE_CLASS_CHANGE_ERROR, NULL_POINTER_EXCEPTION};
use crate::method::Method;
use crate::resolve;
use crate::runtime_pool;
use crate::subtype::is_assignable_from;
use crate::thread::Thread;
use crate::value::Value;

impl Executor<'_> {
	fn call(&mut self, thread: &mut Thread, method: Arc<Method>, args: Vec<Value>) -> VmResult<()> {
		if let Some(value) = super::invoke(self.vm, thread, method, args)? {
			self.frame.push(value)?;
		}
		Ok(())
	}

	/// Pops the receiver and the argument cells, throwing a `java/lang/NullPointerException` for a `null` receiver.
	fn receiver_args(&mut self, thread: &mut Thread, method: &Method, parameter_slots: usize) -> VmResult<Vec<Value>> {
		let args = self.frame.pop_cells(parameter_slots + 1)?;
		if args[0].as_ref()?.is_none() {
			let message = format!("Cannot invoke \"{}.{}()\" because value is null", method.class().java_name(), method.name());
			return Err(self.throw(thread, NULL_POINTER_EXCEPTION, message));
		}
		Ok(args)
	}

	pub(super) fn invokestatic(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let (method, parameter_slots) = runtime_pool::method_at(self.vm, thread, self.class, index)?;
		if !method.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected static method '{method}'")));
		}
		self.vm.initialize(thread, method.class())?;

		let args = self.frame.pop_cells(parameter_slots)?;
		self.call(thread, method, args)
	}

	pub(super) fn invokespecial(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let (resolved, parameter_slots) = runtime_pool::method_at(self.vm, thread, self.class, index)?;
		if resolved.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected non-static method '{resolved}'")));
		}

		let args = self.receiver_args(thread, &resolved, parameter_slots)?;
		let method = resolve::select_special(self.vm, thread, &resolved, self.class)?;
		self.call(thread, method, args)
	}

	pub(super) fn invokevirtual(&mut self, thread: &mut Thread, index: u16, pc: usize) -> VmResult<()> {
		let (resolved, parameter_slots) = runtime_pool::method_at(self.vm, thread, self.class, index)?;
		if resolve::is_signature_polymorphic(&resolved) {
			return Err(fatal!("unsupported operation: invoking the signature polymorphic method {resolved}"));
		}
		if resolved.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected non-static method '{resolved}'")));
		}

		let args = self.receiver_args(thread, &resolved, parameter_slots)?;
		let receiver = args[0].as_ref()?
			.ok_or_else(|| fatal!("receiver vanished"))?
			.class()
			.clone();

		let method = self.dispatch(thread, &resolved, &receiver, pc)?;
		self.call(thread, method, args)
	}

	pub(super) fn invokeinterface(&mut self, thread: &mut Thread, index: u16, pc: usize) -> VmResult<()> {
		let (resolved, parameter_slots) = runtime_pool::method_at(self.vm, thread, self.class, index)?;
		if resolved.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected non-static method '{resolved}'")));
		}

		let args = self.receiver_args(thread, &resolved, parameter_slots)?;
		let receiver = args[0].as_ref()?
			.ok_or_else(|| fatal!("receiver vanished"))?
			.class()
			.clone();

		// methods of java/lang/Object called through an interface don't need the receiver to implement it
		let interface = resolved.class();
		if interface.is_interface() && !is_assignable_from(interface, &receiver) {
			let message = format!("Class {} does not implement the requested interface {}", receiver.java_name(), interface.java_name());
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, message));
		}

		let method = self.dispatch(thread, &resolved, &receiver, pc)?;
		if !method.access().is_public && !method.is_private() {
			let message = format!("Receiver class {} does not implement the interface method '{resolved}' as public", receiver.java_name());
			return Err(self.throw(thread, "java/lang/IllegalAccessError", message));
		}
		self.call(thread, method, args)
	}

	/// Selects the method to run for the receiver class, going through the inline cache of the call site.
	fn dispatch(&mut self, thread: &mut Thread, resolved: &Arc<Method>, receiver: &Arc<Class>, pc: usize) -> VmResult<Arc<Method>> {
		let site = CallSite { method: self.method.id(), pc: pc as u16 };
		let vm = self.vm;
		vm.inline_caches.lookup(site, resolved, receiver, || resolve::select_virtual(vm, thread, resolved, receiver))
	}
}
