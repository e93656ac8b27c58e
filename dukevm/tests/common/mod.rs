#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use dukebox::MemJar;
use dukevm::{ObjectRef, Value, Vm, VmConfig, VmError, VmResult};
use raw_class_file::jdk;

/// Creates a runtime with the minimal `java/lang` and the given classes, capturing the output.
pub fn vm(classes: Vec<(&str, Vec<u8>)>) -> Result<Vm> {
	vm_with(VmConfig::default(), classes)
}

pub fn vm_with(config: VmConfig, classes: Vec<(&str, Vec<u8>)>) -> Result<Vm> {
	let jar: MemJar = jdk::java_lang().into_iter()
		.chain(classes.into_iter().map(|(name, bytes)| (name.to_owned(), bytes)))
		.collect();
	Vm::new(config.class_path(jar.into()).capture_output(true))
}

pub fn int(result: Option<Value>) -> Result<i32> {
	match result {
		Some(Value::Int(value)) => Ok(value),
		other => bail!("expected an int, got {other:?}"),
	}
}

pub fn object(result: Option<Value>) -> Result<ObjectRef> {
	match result {
		Some(Value::Ref(Some(object))) => Ok(object),
		other => bail!("expected an object, got {other:?}"),
	}
}

/// The internal name of the class of the guest exception, failing for success and fatal errors.
pub fn thrown<T: std::fmt::Debug>(result: VmResult<T>) -> Result<String> {
	match result {
		Err(VmError::Guest(exception)) => Ok(exception.class().name().to_owned()),
		Err(VmError::Fatal(e)) => Err(e.context(anyhow!("expected a guest exception"))),
		Ok(value) => bail!("expected a guest exception, got {value:?}"),
	}
}

/// The `detailMessage` of the guest exception.
pub fn thrown_message<T: std::fmt::Debug>(vm: &Vm, result: VmResult<T>) -> Result<Option<String>> {
	match result {
		Err(VmError::Guest(exception)) => Ok(vm.throwable_message(&exception)),
		Err(VmError::Fatal(e)) => Err(e.context(anyhow!("expected a guest exception"))),
		Ok(value) => bail!("expected a guest exception, got {value:?}"),
	}
}

/// Runs `f` on a thread with a large stack, for deep guest recursion.
pub fn with_big_stack<T: Send + 'static>(f: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T> {
	std::thread::Builder::new()
		.stack_size(256 * 1024 * 1024)
		.spawn(f)?
		.join()
		.map_err(|_| anyhow!("test thread panicked"))?
}
