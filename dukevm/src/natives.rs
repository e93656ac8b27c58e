//! The bridge to host functions for `native` methods.
//!
//! Natives are registered by class, name and descriptor. They're bound on the first invocation of the method, so a
//! missing native only fails when it's actually called.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use crate::error::{fatal, VmResult};
use crate::object::{ObjectRef, Payload};
use crate::strings;
use crate::subtype::is_assignable_from;
use crate::thread::Thread;
use crate::value::Value;
use crate::vm::Vm;

/// A host function implementing a native method.
///
/// The arguments are one value per parameter, with the receiver first for instance methods. `long` and `double`
/// arguments take a single entry. `void` methods return [`None`].
pub type NativeFn = fn(&Vm, &mut Thread, &[Value]) -> VmResult<Option<Value>>;

/// A table of natives, keyed by class and method name, with overloads told apart by descriptor.
#[derive(Clone, Default)]
pub struct NativeRegistry {
	natives: HashMap<(String, String), Vec<(String, NativeFn)>>,
}

impl NativeRegistry {
	pub fn new() -> NativeRegistry {
		NativeRegistry::default()
	}

	/// A registry with the natives needed by the minimal `java/lang` library.
	pub fn with_builtins() -> NativeRegistry {
		let mut registry = NativeRegistry::new();

		registry.register("java/lang/Object", "registerNatives", "()V", register_natives);
		registry.register("java/lang/Object", "getClass", "()Ljava/lang/Class;", object_get_class);
		registry.register("java/lang/Object", "hashCode", "()I", object_hash_code);
		registry.register("java/lang/Object", "clone", "()Ljava/lang/Object;", object_clone);
		registry.register("java/lang/Object", "notify", "()V", object_notify);
		registry.register("java/lang/Object", "notifyAll", "()V", object_notify);
		registry.register("java/lang/Object", "wait", "(J)V", object_wait);

		registry.register("java/lang/Class", "getName", "()Ljava/lang/String;", class_get_name);
		registry.register("java/lang/Class", "isArray", "()Z", class_is_array);
		registry.register("java/lang/Class", "isInterface", "()Z", class_is_interface);
		registry.register("java/lang/Class", "isPrimitive", "()Z", class_is_primitive);

		registry.register("java/lang/String", "length", "()I", string_length);
		registry.register("java/lang/String", "charAt", "(I)C", string_char_at);
		registry.register("java/lang/String", "equals", "(Ljava/lang/Object;)Z", string_equals);
		registry.register("java/lang/String", "hashCode", "()I", string_hash_code);
		registry.register("java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;", string_concat);
		registry.register("java/lang/String", "intern", "()Ljava/lang/String;", string_intern);
		registry.register("java/lang/String", "valueOf", "(I)Ljava/lang/String;", string_value_of_int);

		registry.register("java/lang/System", "registerNatives", "()V", register_natives);
		registry.register("java/lang/System", "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V", system_arraycopy);
		registry.register("java/lang/System", "identityHashCode", "(Ljava/lang/Object;)I", system_identity_hash_code);
		registry.register("java/lang/System", "currentTimeMillis", "()J", system_current_time_millis);
		registry.register("java/lang/System", "nanoTime", "()J", system_nano_time);

		registry.register("java/lang/Float", "floatToRawIntBits", "(F)I", float_to_raw_int_bits);
		registry.register("java/lang/Float", "intBitsToFloat", "(I)F", int_bits_to_float);
		registry.register("java/lang/Double", "doubleToRawLongBits", "(D)J", double_to_raw_long_bits);
		registry.register("java/lang/Double", "longBitsToDouble", "(J)D", long_bits_to_double);

		registry.register("java/lang/Throwable", "fillInStackTrace", "()Ljava/lang/Throwable;", throwable_fill_in_stack_trace);

		registry.register("dukevm/Host", "print", "(Ljava/lang/String;)V", host_print);
		registry.register("dukevm/Host", "println", "(Ljava/lang/String;)V", host_println);
		registry.register("dukevm/Host", "println", "(I)V", host_println_int);

		registry
	}

	/// Registers a native, replacing an earlier one with the same class, name and descriptor.
	pub fn register(&mut self, class: &str, name: &str, descriptor: &str, f: NativeFn) {
		let overloads = self.natives.entry((class.to_owned(), name.to_owned())).or_default();
		overloads.retain(|(d, _)| d != descriptor);
		overloads.push((descriptor.to_owned(), f));
	}

	/// Adds all natives of `other`, replacing the ones already present.
	pub fn extend(&mut self, other: &NativeRegistry) {
		for ((class, name), overloads) in &other.natives {
			for (descriptor, f) in overloads {
				self.register(class, name, descriptor, *f);
			}
		}
	}

	/// Finds a native. If there's only one for the class and name, that one is used whatever the descriptor.
	pub fn lookup(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
		let overloads = self.natives.get(&(class.to_owned(), name.to_owned()))?;
		match overloads.as_slice() {
			[(_, f)] => Some(*f),
			overloads => overloads.iter()
				.find(|(d, _)| d == descriptor)
				.map(|(_, f)| *f),
		}
	}

	pub fn len(&self) -> usize {
		self.natives.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Debug for NativeRegistry {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "NativeRegistry({} natives)", self.len())
	}
}

fn arg(args: &[Value], index: usize) -> VmResult<&Value> {
	args.get(index).ok_or_else(|| fatal!("native called with {} arguments, wanted argument {index}", args.len()))
}

fn receiver(args: &[Value]) -> VmResult<&ObjectRef> {
	arg(args, 0)?.as_ref()?.ok_or_else(|| fatal!("native instance method called with null receiver"))
}

fn boolean(value: bool) -> VmResult<Option<Value>> {
	Ok(Some(Value::Int(value as i32)))
}

fn register_natives(_: &Vm, _: &mut Thread, _: &[Value]) -> VmResult<Option<Value>> {
	Ok(None)
}

fn object_get_class(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let class = receiver(args)?.class().clone();
	Ok(Some(Value::from_ref(vm.mirror(thread, &class)?)))
}

fn object_hash_code(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Int(receiver(args)?.identity_hash())))
}

fn object_clone(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let object = receiver(args)?;
	if !object.is_array() {
		let cloneable = vm.load_class(thread, "java/lang/Cloneable")?;
		if !is_assignable_from(&cloneable, object.class()) {
			return Err(vm.throw(thread, "java/lang/CloneNotSupportedException", Some(object.class().java_name())));
		}
	}
	Ok(Some(Value::from_ref(object.shallow_clone())))
}

fn object_notify(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	if !receiver(args)?.monitor().is_owned_by(thread.id()) {
		return Err(vm.throw(thread, "java/lang/IllegalMonitorStateException", Some("current thread is not owner".to_owned())));
	}
	// there's only ever one thread waiting for nothing
	Ok(None)
}

fn object_wait(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	if !receiver(args)?.monitor().is_owned_by(thread.id()) {
		return Err(vm.throw(thread, "java/lang/IllegalMonitorStateException", Some("current thread is not owner".to_owned())));
	}
	Err(fatal!("unsupported operation: Object.wait"))
}

fn mirrored(args: &[Value]) -> VmResult<Arc<crate::class::Class>> {
	let mirror = receiver(args)?;
	mirror.mirrored_class().ok_or_else(|| fatal!("{mirror:?} is not a class mirror"))
}

fn class_get_name(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let name = mirrored(args)?.java_name();
	Ok(Some(Value::from_ref(vm.new_rust_string(thread, &name)?)))
}

fn class_is_array(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	boolean(mirrored(args)?.is_array())
}

fn class_is_interface(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	boolean(mirrored(args)?.is_interface())
}

fn class_is_primitive(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	boolean(mirrored(args)?.is_primitive())
}

fn string_units(value: &Value) -> VmResult<Option<Vec<u16>>> {
	match value.as_ref()? {
		Some(string) => string.string_units()
			.map(Some)
			.ok_or_else(|| fatal!("{string:?} is not a string created by the runtime")),
		None => Ok(None),
	}
}

fn this_string(args: &[Value]) -> VmResult<Vec<u16>> {
	string_units(arg(args, 0)?)?.ok_or_else(|| fatal!("native instance method called with null receiver"))
}

fn string_length(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Int(this_string(args)?.len() as i32)))
}

fn string_char_at(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let units = this_string(args)?;
	let index = arg(args, 1)?.as_int()?;
	match usize::try_from(index).ok().and_then(|i| units.get(i)) {
		Some(&unit) => Ok(Some(Value::Int(unit as i32))),
		None => {
			let message = format!("Index {index} out of bounds for length {}", units.len());
			Err(vm.throw(thread, "java/lang/IndexOutOfBoundsException", Some(message)))
		},
	}
}

fn string_equals(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let this = this_string(args)?;
	let other = arg(args, 1)?.as_ref()?.and_then(|other| other.string_units());
	boolean(other.is_some_and(|other| other == this))
}

fn string_hash_code(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Int(strings::hash_code(&this_string(args)?))))
}

fn string_concat(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let mut this = this_string(args)?;
	let Some(other) = string_units(arg(args, 1)?)? else {
		return Err(vm.throw(thread, "java/lang/NullPointerException", None));
	};
	this.extend(other);
	Ok(Some(Value::from_ref(vm.new_string(thread, this)?)))
}

fn string_intern(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let this = this_string(args)?;
	Ok(Some(Value::from_ref(vm.intern(thread, this)?)))
}

fn string_value_of_int(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let value = arg(args, 0)?.as_int()?;
	Ok(Some(Value::from_ref(vm.new_rust_string(thread, &value.to_string())?)))
}

fn system_arraycopy(vm: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let (Some(src), Some(dst)) = (arg(args, 0)?.as_ref()?, arg(args, 2)?.as_ref()?) else {
		return Err(vm.throw(thread, "java/lang/NullPointerException", None));
	};
	let src_pos = arg(args, 1)?.as_int()?;
	let dst_pos = arg(args, 3)?.as_int()?;
	let length = arg(args, 4)?.as_int()?;

	for array in [src, dst] {
		if !array.is_array() {
			let message = format!("arraycopy: {} type {} is not an array",
				if Arc::ptr_eq(array, src) { "source" } else { "destination" }, array.class().java_name());
			return Err(vm.throw(thread, "java/lang/ArrayStoreException", Some(message)));
		}
	}

	let src_length = src.array_length()? as i64;
	let dst_length = dst.array_length()? as i64;
	let out_of_bounds = if src_pos < 0 || dst_pos < 0 || length < 0 {
		Some(format!("arraycopy: negative position or length: {src_pos}, {dst_pos}, {length}"))
	} else if src_pos as i64 + length as i64 > src_length {
		Some(format!("arraycopy: last source index {} out of bounds for length {src_length}", src_pos as i64 + length as i64))
	} else if dst_pos as i64 + length as i64 > dst_length {
		Some(format!("arraycopy: last destination index {} out of bounds for length {dst_length}", dst_pos as i64 + length as i64))
	} else {
		None
	};
	if let Some(message) = out_of_bounds {
		return Err(vm.throw(thread, "java/lang/ArrayIndexOutOfBoundsException", Some(message)));
	}
	let (src_pos, dst_pos, length) = (src_pos as usize, dst_pos as usize, length as usize);

	if Arc::ptr_eq(src, dst) {
		src.array()?.copy_within(src_pos, dst_pos, length);
		return Ok(None);
	}

	let (Some(src_component), Some(dst_component)) = (src.class().component(), dst.class().component()) else {
		return Err(fatal!("array classes without component classes"));
	};

	if src_component.is_primitive() || dst_component.is_primitive() {
		// lock in address order, so that two threads copying in opposite directions can't deadlock
		let copied = if Arc::as_ptr(src) < Arc::as_ptr(dst) {
			let src_data = src.array()?;
			let mut dst_data = dst.array()?;
			src_data.copy_primitives(src_pos, &mut dst_data, dst_pos, length)
		} else {
			let mut dst_data = dst.array()?;
			let src_data = src.array()?;
			src_data.copy_primitives(src_pos, &mut dst_data, dst_pos, length)
		};
		if !copied {
			let message = format!("arraycopy: type mismatch: can not copy {} into {}", src.class().java_name(), dst.class().java_name());
			return Err(vm.throw(thread, "java/lang/ArrayStoreException", Some(message)));
		}
		return Ok(None);
	}

	let elements: Vec<Value> = {
		let src_data = src.array()?;
		(src_pos..src_pos + length)
			.map(|i| src_data.get(i).ok_or_else(|| fatal!("array index {i} vanished")))
			.collect::<VmResult<_>>()?
	};
	let check = !is_assignable_from(dst_component, src_component);
	for (i, element) in elements.into_iter().enumerate() {
		if check {
			if let Some(object) = element.as_ref()? {
				if !is_assignable_from(dst_component, object.class()) {
					let message = format!("arraycopy: element type mismatch: can not cast one of the elements of {} to the type of the destination array, {}",
						src.class().java_name(), dst_component.java_name());
					return Err(vm.throw(thread, "java/lang/ArrayStoreException", Some(message)));
				}
			}
		}
		dst.array()?.set(dst_pos + i, element)?;
	}
	Ok(None)
}

fn system_identity_hash_code(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let hash = arg(args, 0)?.as_ref()?.map_or(0, |object| object.identity_hash());
	Ok(Some(Value::Int(hash)))
}

fn system_current_time_millis(_: &Vm, _: &mut Thread, _: &[Value]) -> VmResult<Option<Value>> {
	let millis = SystemTime::now().duration_since(UNIX_EPOCH)
		.map_or(0, |duration| duration.as_millis() as i64);
	Ok(Some(Value::Long(millis)))
}

fn system_nano_time(vm: &Vm, _: &mut Thread, _: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Long(vm.started().elapsed().as_nanos() as i64)))
}

fn float_to_raw_int_bits(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Int(arg(args, 0)?.as_float()?.to_bits() as i32)))
}

fn int_bits_to_float(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Float(f32::from_bits(arg(args, 0)?.as_int()? as u32))))
}

fn double_to_raw_long_bits(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Long(arg(args, 0)?.as_double()?.to_bits() as i64)))
}

fn long_bits_to_double(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	Ok(Some(Value::Double(f64::from_bits(arg(args, 0)?.as_long()? as u64))))
}

fn throwable_fill_in_stack_trace(_: &Vm, thread: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let throwable = receiver(args)?;
	let skipped = thread.frames().iter().rev()
		.take_while(|frame| {
			let method = &frame.method;
			method.name() == "fillInStackTrace" ||
				(method.is_initializer() && is_assignable_from(method.class(), throwable.class()))
		})
		.count();
	let trace = thread.stack_trace().into_iter().skip(skipped).collect();
	throwable.set_payload(Payload::StackTrace(trace));
	Ok(Some(Value::from_ref(throwable.clone())))
}

fn host_string(vm: &Vm, args: &[Value]) -> VmResult<String> {
	match arg(args, 0)?.as_ref()? {
		Some(string) => vm.rust_string(string),
		None => Ok("null".to_owned()),
	}
}

fn host_print(vm: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	vm.print(&host_string(vm, args)?)?;
	Ok(None)
}

fn host_println(vm: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	vm.print(&format!("{}\n", host_string(vm, args)?))?;
	Ok(None)
}

fn host_println_int(vm: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	vm.print(&format!("{}\n", arg(args, 0)?.as_int()?))?;
	Ok(None)
}
