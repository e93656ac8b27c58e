mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use anyhow::{anyhow, bail, Result};
use dukevm::{InitState, Thread, Value, Vm, VmConfig, VmError, VmResult};
use pretty_assertions::assert_eq;
use raw_class_file::{flags, insn, ClassBuilder};
use common::{int, thrown, vm_with};

const PUBLIC_STATIC: u16 = flags::ACC_PUBLIC | flags::ACC_STATIC;
const STACK_SIZE: usize = 64 * 1024 * 1024;

/// Keeps a static initializer running until the test lets it go.
struct Gate {
	runs: AtomicU32,
	entered: AtomicBool,
	released: AtomicBool,
}

impl Gate {
	const fn new() -> Gate {
		Gate { runs: AtomicU32::new(0), entered: AtomicBool::new(false), released: AtomicBool::new(false) }
	}

	fn hold(&self) {
		self.runs.fetch_add(1, Ordering::SeqCst);
		self.entered.store(true, Ordering::SeqCst);
		let start = Instant::now();
		while !self.released.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(10) {
			std::thread::sleep(Duration::from_millis(1));
		}
	}

	fn wait_entered(&self) -> Result<()> {
		let start = Instant::now();
		while !self.entered.load(Ordering::SeqCst) {
			if start.elapsed() > Duration::from_secs(10) {
				bail!("the initializer never started");
			}
			std::thread::sleep(Duration::from_millis(1));
		}
		Ok(())
	}

	fn release(&self) {
		self.released.store(true, Ordering::SeqCst);
	}
}

static SLOW: Gate = Gate::new();
static FAILING: Gate = Gate::new();

fn hold_slow(_: &Vm, _: &mut Thread, _: &[Value]) -> VmResult<Option<Value>> {
	SLOW.hold();
	Ok(None)
}

fn hold_failing(_: &Vm, _: &mut Thread, _: &[Value]) -> VmResult<Option<Value>> {
	FAILING.hold();
	Ok(None)
}

/// A class with a static `value`, whose initializer first calls the native `Gates.<gate>()V`.
fn gated(name: &str, gate: &str, fails: bool) -> Vec<u8> {
	ClassBuilder::new(name)
		.field(PUBLIC_STATIC, "value", "I")
		.method(flags::ACC_STATIC, "<clinit>", "()V", |code| {
			code.invoke(insn::invokestatic, "Gates", gate, "()V");
			if fails {
				code.op(insn::iconst_1).op(insn::iconst_0).op(insn::idiv);
			} else {
				code.iconst(42);
			}
			code.field(insn::putstatic, name, "value", "I")
				.op(insn::r#return);
		})
		.method(PUBLIC_STATIC, "get", "()I", |code| {
			code.field(insn::getstatic, name, "value", "I").op(insn::ireturn);
		})
		.build()
}

fn gated_vm() -> Result<Vm> {
	let gates = ClassBuilder::new("Gates")
		.method_without_code(PUBLIC_STATIC | flags::ACC_NATIVE, "slow", "()V")
		.method_without_code(PUBLIC_STATIC | flags::ACC_NATIVE, "failing", "()V")
		.build();
	let config = VmConfig::default()
		.native("Gates", "slow", "()V", hold_slow)
		.native("Gates", "failing", "()V", hold_failing);
	vm_with(config, vec![
		("Gates", gates),
		("Slow", gated("Slow", "slow", false)),
		("Failing", gated("Failing", "failing", true)),
	])
}

/// Calls `get()I` of the class on two threads. The second one starts while the first is inside the initializer.
fn get_on_two_threads(vm: &Vm, class: &str, gate: &Gate) -> Result<(VmResult<Option<Value>>, VmResult<Option<Value>>)> {
	let get = || {
		let mut thread = vm.new_thread();
		vm.invoke_static(&mut thread, class, "get", "()I", Vec::new())
	};
	std::thread::scope(|scope| {
		let first = std::thread::Builder::new().stack_size(STACK_SIZE).spawn_scoped(scope, get)?;
		gate.wait_entered()?;
		let second = std::thread::Builder::new().stack_size(STACK_SIZE).spawn_scoped(scope, get)?;

		std::thread::sleep(Duration::from_millis(50));
		assert!(!second.is_finished(), "the second thread didn't wait for the initializer");
		gate.release();

		let first = first.join().map_err(|_| anyhow!("first thread panicked"))?;
		let second = second.join().map_err(|_| anyhow!("second thread panicked"))?;
		Ok((first, second))
	})
}

#[test]
fn initializer_runs_once() -> Result<()> {
	let vm = gated_vm()?;
	let (first, second) = get_on_two_threads(&vm, "Slow", &SLOW)?;

	assert_eq!(int(first?)?, 42);
	assert_eq!(int(second?)?, 42);
	assert_eq!(SLOW.runs.load(Ordering::SeqCst), 1);

	let mut thread = vm.new_thread();
	assert_eq!(vm.load_class(&mut thread, "Slow")?.init_state(), InitState::FullyInitialized);
	Ok(())
}

#[test]
fn waiting_thread_sees_failed_initializer() -> Result<()> {
	let vm = gated_vm()?;
	let (first, second) = get_on_two_threads(&vm, "Failing", &FAILING)?;

	assert_eq!(thrown(first)?, "java/lang/ExceptionInInitializerError");
	let Err(VmError::Guest(error)) = second else {
		bail!("expected the waiting thread to get an exception, got {second:?}");
	};
	assert_eq!(error.class().name(), "java/lang/NoClassDefFoundError");
	assert_eq!(vm.throwable_message(&error).as_deref(), Some("Could not initialize class Failing"));
	assert_eq!(FAILING.runs.load(Ordering::SeqCst), 1);
	Ok(())
}
