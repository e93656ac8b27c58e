use std::sync::Arc;
use log::debug;
use crate::class::{Class, InitState};
use crate::error::{fatal, VmError, VmResult};
use crate::interpreter;
use crate::subtype::is_assignable_from;
use crate::thread::Thread;
use crate::value::Value;
use crate::vm::Vm;

const ERROR: &str = "java/lang/Error";
const EXCEPTION_IN_INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";

impl Vm {
	/// Initializes a class, if that didn't happen yet.
	///
	/// The thread initializing a class may use it while that's ongoing. Other threads wait for it to finish. If the
	/// static initializer throws, the class ends up erroneous and every later attempt throws
	/// `java/lang/NoClassDefFoundError`.
	pub fn initialize(&self, thread: &mut Thread, class: &Arc<Class>) -> VmResult<()> {
		{
			let mut state = class.lock_init();
			loop {
				match *state {
					InitState::FullyInitialized => return Ok(()),
					InitState::BeingInitialized(owner) if owner == thread.id() => return Ok(()),
					InitState::BeingInitialized(_) => class.wait_for_init(&mut state),
					InitState::Erroneous => {
						drop(state);
						let message = format!("Could not initialize class {}", class.java_name());
						return Err(self.throw(thread, "java/lang/NoClassDefFoundError", Some(message)));
					},
					InitState::Allocated => return Err(fatal!("class {} is initialized before being linked", class.name())),
					InitState::Loaded => {
						*state = InitState::BeingInitialized(thread.id());
						break;
					},
				}
			}
		}

		debug!("initializing {}", class.name());
		match self.run_initializers(thread, class) {
			Ok(()) => {
				class.set_init_state(InitState::FullyInitialized);
				debug!("initialized {}", class.name());
				Ok(())
			},
			Err(VmError::Guest(exception)) => {
				class.set_init_state(InitState::Erroneous);
				debug!("initializing {} threw {}", class.name(), exception.class().name());

				let error = self.load_class(thread, ERROR)?;
				if is_assignable_from(&error, exception.class()) {
					return Err(VmError::Guest(exception));
				}
				let wrapped = self.construct(thread, EXCEPTION_IN_INITIALIZER_ERROR, "(Ljava/lang/Throwable;)V", vec![Value::from_ref(exception)])?;
				Err(VmError::Guest(wrapped))
			},
			Err(fatal) => {
				class.set_init_state(InitState::Erroneous);
				Err(fatal)
			},
		}
	}

	fn run_initializers(&self, thread: &mut Thread, class: &Arc<Class>) -> VmResult<()> {
		if !class.is_interface() {
			let links = class.links()?;
			if let Some(super_class) = links.super_class() {
				self.initialize(thread, super_class)?;
			}
			// only the ones that declare default methods
			for interface in links.all_interfaces() {
				let declares_default = interface.links()?.methods().iter().any(|method| method.is_default());
				if declares_default {
					self.initialize(thread, interface)?;
				}
			}
		}

		if let Some(clinit) = class.declared_method("<clinit>", "()V") {
			interpreter::invoke(self, thread, clinit.clone(), Vec::new())?;
		}
		Ok(())
	}
}
