use duke::tree::code::Code;
use crate::error::VmResult;
use crate::object::{Object, Payload};
use crate::subtype::is_assignable_from;
use crate::thread::Thread;
use crate::vm::Vm;

/// Finds the handler for an exception thrown at `pc`, by scanning the exception table in order.
///
/// The first entry covering `pc` whose catch type is absent or a superclass of the exception wins.
pub(crate) fn find_handler(vm: &Vm, thread: &mut Thread, code: &Code, pc: u16, exception: &Object) -> VmResult<Option<u16>> {
	for handler in &code.exception_table {
		if !handler.covers(pc) {
			continue;
		}
		let Some(catch_type) = &handler.catch_type else {
			return Ok(Some(handler.handler_pc));
		};
		let catch_class = vm.load_class(thread, catch_type)?;
		if is_assignable_from(&catch_class, exception.class()) {
			return Ok(Some(handler.handler_pc));
		}
	}
	Ok(None)
}

/// Formats an uncaught exception like it's printed before a thread dies.
pub(crate) fn format_uncaught(vm: &Vm, thread_name: &str, exception: &Object) -> String {
	let mut out = format!("Exception in thread \"{thread_name}\" {}", exception.class().java_name());
	if let Some(message) = vm.throwable_message(exception) {
		out.push_str(": ");
		out.push_str(&message);
	}
	out.push('\n');
	if let Payload::StackTrace(trace) = &*exception.payload() {
		for element in trace {
			out.push_str(&format!("\tat {element}\n"));
		}
	}
	out
}
