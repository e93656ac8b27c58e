//! The bytecode interpreter.
//!
//! Each invocation of a method with code gets its own [`Frame`] and runs [`Executor::step`] until a return
//! instruction is reached or an exception leaves the method. Invocations recurse on the host stack, the [`Thread`]
//! only tracks which methods are on it.

mod exceptions;
mod frame;
mod invoke;
pub(crate) mod math;

use std::sync::Arc;
use duke::class_constants::atype;
use duke::class_constants::opcode::*;
use duke::tree::descriptor::Type;
use duke::tree::instruction::mnemonic;
use duke::tree::pool::{Constant, ConstantPool};
use log::trace;
use crate::class::Class;
use crate::error::{fatal, VmContext, VmError, VmResult};
use crate::method::Method;
use crate::object::{Object, ObjectRef};
use crate::runtime_pool;
use crate::subtype::is_assignable_from;
use crate::thread::Thread;
use crate::value::Value;
use crate::vm::Vm;
use self::frame::{Frame, Operands};

pub(crate) use self::exceptions::format_uncaught;

/// How many frames creating a `java/lang/StackOverflowError` may use beyond the maximum depth.
const OVERFLOW_RESERVE: usize = 64;

const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
const INCOMPATIBLE_CLASS_CHANGE_ERROR: &str = "java/lang/IncompatibleClassChangeError";
const ILLEGAL_MONITOR_STATE_EXCEPTION: &str = "java/lang/IllegalMonitorStateException";

/// Invokes a method, with the argument cells already in place for the local variables.
///
/// For instance methods, the first cell is the receiver.
pub fn invoke(vm: &Vm, thread: &mut Thread, method: Arc<Method>, args: Vec<Value>) -> VmResult<Option<Value>> {
	let limit = if thread.overflowing { vm.max_stack_depth() + OVERFLOW_RESERVE } else { vm.max_stack_depth() };
	if thread.depth() >= limit {
		if thread.overflowing {
			return Err(fatal!("stack overflow while creating a java/lang/StackOverflowError"));
		}
		thread.overflowing = true;
		let error = vm.throw(thread, "java/lang/StackOverflowError", None);
		thread.overflowing = false;
		return Err(error);
	}
	if method.is_abstract() {
		return Err(vm.throw(thread, "java/lang/AbstractMethodError", Some(format!("'{method}'"))));
	}
	if args.len() != method.arg_slots() {
		return Err(fatal!("{method} takes {} argument slots, but got {}", method.arg_slots(), args.len()));
	}

	let monitor = if method.access().is_synchronized {
		let object = monitor_object(vm, thread, &method, &args)?;
		object.monitor().enter(thread.id());
		Some(object)
	} else {
		None
	};

	thread.push_frame(method.clone());
	let result = if method.is_native() {
		call_native(vm, thread, &method, args)
	} else {
		execute(vm, thread, &method, args)
	};
	thread.pop_frame();

	if let Some(object) = monitor {
		if !object.monitor().exit(thread.id()) && result.is_ok() {
			let message = format!("monitor of {method} was released inside of it");
			return Err(vm.throw(thread, ILLEGAL_MONITOR_STATE_EXCEPTION, Some(message)));
		}
	}
	result
}

/// The object a `synchronized` method locks: the receiver, or the class for static methods.
fn monitor_object(vm: &Vm, thread: &mut Thread, method: &Arc<Method>, args: &[Value]) -> VmResult<ObjectRef> {
	if method.is_static() {
		return vm.mirror(thread, method.class());
	}
	match args.first().map(Value::as_ref).transpose()?.flatten() {
		Some(receiver) => Ok(receiver.clone()),
		None => Err(vm.throw(thread, NULL_POINTER_EXCEPTION, None)),
	}
}

fn call_native(vm: &Vm, thread: &mut Thread, method: &Arc<Method>, args: Vec<Value>) -> VmResult<Option<Value>> {
	let native = match method.native.get() {
		Some(native) => *native,
		None => {
			let found = vm.natives().lookup(method.class().name(), method.name(), method.descriptor())
				.ok_or_else(|| fatal!("unsupported operation: there's no implementation of the native method {method}"))?;
			*method.native.get_or_init(|| found)
		},
	};

	let result = native(vm, thread, &Value::from_cells(args))?;
	match (result, method.return_type()) {
		(Some(value), Some(ty)) if value.matches(ty) => Ok(Some(value.narrow(ty))),
		(None, None) => Ok(None),
		(result, _) => Err(fatal!("native method {method} returned {result:?}, which doesn't match its descriptor")),
	}
}

fn execute(vm: &Vm, thread: &mut Thread, method: &Arc<Method>, args: Vec<Value>) -> VmResult<Option<Value>> {
	let code = method.code()
		.ok_or_else(|| fatal!("method {method} has no code"))?;

	let mut executor = Executor {
		vm,
		method,
		class: method.class(),
		code: &code.code,
		frame: Frame::new(code.max_locals, code.max_stack, args)?,
		pc: 0,
	};

	loop {
		thread.set_pc(executor.pc as u16);
		let step = executor.step(thread)
			.fatal_context(|| format!("at pc {} of {method}", executor.pc));
		match step {
			Ok(Flow::Continue) => {},
			Ok(Flow::Return(value)) => return Ok(value),
			Err(VmError::Guest(exception)) => {
				match exceptions::find_handler(vm, thread, code, executor.pc as u16, &exception)? {
					Some(handler) => {
						executor.frame.clear_stack();
						executor.frame.push(Value::from_ref(exception))?;
						executor.pc = handler as usize;
					},
					None => return Err(VmError::Guest(exception)),
				}
			},
			Err(fatal) => return Err(fatal),
		}
	}
}

enum Flow {
	Continue,
	Return(Option<Value>),
}

/// The type of value a load or store instruction works on.
#[derive(Debug, Clone, Copy)]
enum Kind {
	Int,
	Long,
	Float,
	Double,
	Reference,
}

impl Kind {
	/// The kind of the `n`th instruction of a group ordered like `iload`, `lload`, `fload`, `dload`, `aload`.
	fn nth(n: u8) -> Kind {
		match n {
			0 => Kind::Int,
			1 => Kind::Long,
			2 => Kind::Float,
			3 => Kind::Double,
			_ => Kind::Reference,
		}
	}

	fn check(self, value: &Value, allow_return_address: bool) -> VmResult<()> {
		let fits = match (self, value) {
			(Kind::Int, Value::Int(_)) |
			(Kind::Long, Value::Long(_)) |
			(Kind::Float, Value::Float(_)) |
			(Kind::Double, Value::Double(_)) |
			(Kind::Reference, Value::Ref(_)) => true,
			(Kind::Reference, Value::ReturnAddress(_)) => allow_return_address,
			_ => false,
		};
		if fits {
			Ok(())
		} else {
			Err(fatal!("expected a value of kind {self:?}, got {value:?}"))
		}
	}

	/// Whether an array with elements of the given type can be accessed by the instruction of this kind.
	fn fits_element(op: u8, element: &Type) -> bool {
		match op {
			IALOAD | IASTORE => matches!(element, Type::I),
			LALOAD | LASTORE => matches!(element, Type::J),
			FALOAD | FASTORE => matches!(element, Type::F),
			DALOAD | DASTORE => matches!(element, Type::D),
			AALOAD | AASTORE => element.is_reference(),
			BALOAD | BASTORE => matches!(element, Type::B | Type::Z),
			CALOAD | CASTORE => matches!(element, Type::C),
			SALOAD | SASTORE => matches!(element, Type::S),
			_ => false,
		}
	}
}

struct Executor<'a> {
	vm: &'a Vm,
	method: &'a Arc<Method>,
	class: &'a Arc<Class>,
	code: &'a [u8],
	frame: Frame,
	pc: usize,
}

impl Executor<'_> {
	/// Executes the instruction at the current pc, moving the pc to the next one.
	///
	/// On an exception, the pc stays at the throwing instruction.
	fn step(&mut self, thread: &mut Thread) -> VmResult<Flow> {
		let pc = self.pc;
		let op = self.code.u8_at(pc)?;
		if self.vm.trace_instructions() {
			trace!("{} {pc}: {} {:?}", self.method, mnemonic(op), self.frame.peek().ok());
		}

		let mut next = pc + 1;
		match op {
			NOP => {},
			ACONST_NULL => self.frame.push(Value::NULL)?,
			ICONST_M1..=ICONST_5 => self.frame.push(Value::Int(op as i32 - ICONST_0 as i32))?,
			LCONST_0 | LCONST_1 => self.frame.push(Value::Long((op - LCONST_0) as i64))?,
			FCONST_0..=FCONST_2 => self.frame.push(Value::Float((op - FCONST_0) as f32))?,
			DCONST_0 | DCONST_1 => self.frame.push(Value::Double((op - DCONST_0) as f64))?,
			BIPUSH => {
				self.frame.push(Value::Int(self.code.i8_at(pc + 1)? as i32))?;
				next = pc + 2;
			},
			SIPUSH => {
				self.frame.push(Value::Int(self.code.i16_at(pc + 1)? as i32))?;
				next = pc + 3;
			},
			LDC => {
				self.ldc(thread, self.code.u8_at(pc + 1)? as u16)?;
				next = pc + 2;
			},
			LDC_W | LDC2_W => {
				self.ldc(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},

			ILOAD..=ALOAD => {
				self.load(self.code.u8_at(pc + 1)? as usize, Kind::nth(op - ILOAD))?;
				next = pc + 2;
			},
			ILOAD_0..=ALOAD_3 => {
				let n = op - ILOAD_0;
				self.load((n % 4) as usize, Kind::nth(n / 4))?;
			},
			IALOAD..=SALOAD => self.array_load(thread, op)?,

			ISTORE..=ASTORE => {
				self.store(self.code.u8_at(pc + 1)? as usize, Kind::nth(op - ISTORE))?;
				next = pc + 2;
			},
			ISTORE_0..=ASTORE_3 => {
				let n = op - ISTORE_0;
				self.store((n % 4) as usize, Kind::nth(n / 4))?;
			},
			IASTORE..=SASTORE => self.array_store(thread, op)?,

			POP => {
				self.frame.pop_cell()?;
			},
			POP2 => {
				self.frame.pop_cells(2)?;
			},
			DUP => {
				let value = self.frame.peek()?.clone();
				self.frame.push_cell(value)?;
			},
			DUP_X1 => self.shuffle(2, &[0, 1, 0])?,
			DUP_X2 => self.shuffle(3, &[0, 2, 1, 0])?,
			DUP2 => self.shuffle(2, &[1, 0, 1, 0])?,
			DUP2_X1 => self.shuffle(3, &[1, 0, 2, 1, 0])?,
			DUP2_X2 => self.shuffle(4, &[1, 0, 3, 2, 1, 0])?,
			SWAP => self.shuffle(2, &[0, 1])?,

			IADD => self.int_op(i32::wrapping_add)?,
			LADD => self.long_op(i64::wrapping_add)?,
			FADD => self.float_op(|a, b| a + b)?,
			DADD => self.double_op(|a, b| a + b)?,
			ISUB => self.int_op(i32::wrapping_sub)?,
			LSUB => self.long_op(i64::wrapping_sub)?,
			FSUB => self.float_op(|a, b| a - b)?,
			DSUB => self.double_op(|a, b| a - b)?,
			IMUL => self.int_op(i32::wrapping_mul)?,
			LMUL => self.long_op(i64::wrapping_mul)?,
			FMUL => self.float_op(|a, b| a * b)?,
			DMUL => self.double_op(|a, b| a * b)?,
			IDIV => self.int_division(thread, math::idiv)?,
			LDIV => self.long_division(thread, math::ldiv)?,
			FDIV => self.float_op(|a, b| a / b)?,
			DDIV => self.double_op(|a, b| a / b)?,
			IREM => self.int_division(thread, math::irem)?,
			LREM => self.long_division(thread, math::lrem)?,
			FREM => self.float_op(|a, b| a % b)?,
			DREM => self.double_op(|a, b| a % b)?,
			INEG => {
				let value = self.frame.pop_int()?;
				self.frame.push(Value::Int(value.wrapping_neg()))?;
			},
			LNEG => {
				let value = self.frame.pop_long()?;
				self.frame.push(Value::Long(value.wrapping_neg()))?;
			},
			FNEG => {
				let value = self.frame.pop_float()?;
				self.frame.push(Value::Float(-value))?;
			},
			DNEG => {
				let value = self.frame.pop_double()?;
				self.frame.push(Value::Double(-value))?;
			},
			ISHL => self.int_op(math::ishl)?,
			LSHL => self.long_shift(math::lshl)?,
			ISHR => self.int_op(math::ishr)?,
			LSHR => self.long_shift(math::lshr)?,
			IUSHR => self.int_op(math::iushr)?,
			LUSHR => self.long_shift(math::lushr)?,
			IAND => self.int_op(|a, b| a & b)?,
			LAND => self.long_op(|a, b| a & b)?,
			IOR => self.int_op(|a, b| a | b)?,
			LOR => self.long_op(|a, b| a | b)?,
			IXOR => self.int_op(|a, b| a ^ b)?,
			LXOR => self.long_op(|a, b| a ^ b)?,
			IINC => {
				let index = self.code.u8_at(pc + 1)? as usize;
				let constant = self.code.i8_at(pc + 2)? as i32;
				self.iinc(index, constant)?;
				next = pc + 3;
			},

			I2L => self.convert(Frame::pop_int, |v| Value::Long(v as i64))?,
			I2F => self.convert(Frame::pop_int, |v| Value::Float(v as f32))?,
			I2D => self.convert(Frame::pop_int, |v| Value::Double(v as f64))?,
			L2I => self.convert(Frame::pop_long, |v| Value::Int(v as i32))?,
			L2F => self.convert(Frame::pop_long, |v| Value::Float(v as f32))?,
			L2D => self.convert(Frame::pop_long, |v| Value::Double(v as f64))?,
			F2I => self.convert(Frame::pop_float, |v| Value::Int(math::f2i(v)))?,
			F2L => self.convert(Frame::pop_float, |v| Value::Long(math::f2l(v)))?,
			F2D => self.convert(Frame::pop_float, |v| Value::Double(v as f64))?,
			D2I => self.convert(Frame::pop_double, |v| Value::Int(math::d2i(v)))?,
			D2L => self.convert(Frame::pop_double, |v| Value::Long(math::d2l(v)))?,
			D2F => self.convert(Frame::pop_double, |v| Value::Float(v as f32))?,
			I2B => self.convert(Frame::pop_int, |v| Value::Int(v as i8 as i32))?,
			I2C => self.convert(Frame::pop_int, |v| Value::Int(v as u16 as i32))?,
			I2S => self.convert(Frame::pop_int, |v| Value::Int(v as i16 as i32))?,

			LCMP => {
				let b = self.frame.pop_long()?;
				let a = self.frame.pop_long()?;
				self.frame.push(Value::Int(math::lcmp(a, b)))?;
			},
			FCMPL | FCMPG => {
				let b = self.frame.pop_float()?;
				let a = self.frame.pop_float()?;
				let nan = if op == FCMPL { -1 } else { 1 };
				self.frame.push(Value::Int(math::fcmp(a, b, nan)))?;
			},
			DCMPL | DCMPG => {
				let b = self.frame.pop_double()?;
				let a = self.frame.pop_double()?;
				let nan = if op == DCMPL { -1 } else { 1 };
				self.frame.push(Value::Int(math::dcmp(a, b, nan)))?;
			},
			IFEQ..=IFLE => {
				let value = self.frame.pop_int()?;
				let taken = match op {
					IFEQ => value == 0,
					IFNE => value != 0,
					IFLT => value < 0,
					IFGE => value >= 0,
					IFGT => value > 0,
					_ => value <= 0,
				};
				next = self.branch_if(pc, taken)?;
			},
			IF_ICMPEQ..=IF_ICMPLE => {
				let b = self.frame.pop_int()?;
				let a = self.frame.pop_int()?;
				let taken = match op {
					IF_ICMPEQ => a == b,
					IF_ICMPNE => a != b,
					IF_ICMPLT => a < b,
					IF_ICMPGE => a >= b,
					IF_ICMPGT => a > b,
					_ => a <= b,
				};
				next = self.branch_if(pc, taken)?;
			},
			IF_ACMPEQ | IF_ACMPNE => {
				let b = self.frame.pop_ref()?;
				let a = self.frame.pop_ref()?;
				let same = match (&a, &b) {
					(Some(a), Some(b)) => Arc::ptr_eq(a, b),
					(None, None) => true,
					_ => false,
				};
				next = self.branch_if(pc, same == (op == IF_ACMPEQ))?;
			},
			IFNULL | IFNONNULL => {
				let is_null = self.frame.pop_ref()?.is_none();
				next = self.branch_if(pc, is_null == (op == IFNULL))?;
			},

			GOTO => next = self.target(pc, self.code.i16_at(pc + 1)? as i32)?,
			GOTO_W => next = self.target(pc, self.code.i32_at(pc + 1)?)?,
			JSR => {
				self.frame.push(Value::ReturnAddress((pc + 3) as u16))?;
				next = self.target(pc, self.code.i16_at(pc + 1)? as i32)?;
			},
			JSR_W => {
				self.frame.push(Value::ReturnAddress((pc + 5) as u16))?;
				next = self.target(pc, self.code.i32_at(pc + 1)?)?;
			},
			RET => next = self.ret(self.code.u8_at(pc + 1)? as usize)?,
			TABLESWITCH => next = self.tableswitch(pc)?,
			LOOKUPSWITCH => next = self.lookupswitch(pc)?,

			IRETURN => {
				let value = Value::Int(self.frame.pop_int()?);
				return self.return_value(value);
			},
			LRETURN | FRETURN | DRETURN | ARETURN => {
				let value = self.frame.pop()?;
				let kind = match op {
					LRETURN => Kind::Long,
					FRETURN => Kind::Float,
					DRETURN => Kind::Double,
					_ => Kind::Reference,
				};
				kind.check(&value, false)?;
				return self.return_value(value);
			},
			RETURN => {
				if let Some(ty) = self.method.return_type() {
					return Err(fatal!("return in method returning {ty}"));
				}
				return Ok(Flow::Return(None));
			},

			GETSTATIC => {
				self.getstatic(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			PUTSTATIC => {
				self.putstatic(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			GETFIELD => {
				self.getfield(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			PUTFIELD => {
				self.putfield(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			INVOKEVIRTUAL => {
				self.invokevirtual(thread, self.code.u16_at(pc + 1)?, pc)?;
				next = pc + 3;
			},
			INVOKESPECIAL => {
				self.invokespecial(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			INVOKESTATIC => {
				self.invokestatic(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			INVOKEINTERFACE => {
				self.invokeinterface(thread, self.code.u16_at(pc + 1)?, pc)?;
				next = pc + 5;
			},
			INVOKEDYNAMIC => {
				return Err(fatal!("unsupported operation: invokedynamic"));
			},

			NEW => {
				self.new_object(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			NEWARRAY => {
				self.newarray(thread, self.code.u8_at(pc + 1)?)?;
				next = pc + 2;
			},
			ANEWARRAY => {
				self.anewarray(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			MULTIANEWARRAY => {
				self.multianewarray(thread, self.code.u16_at(pc + 1)?, self.code.u8_at(pc + 3)?)?;
				next = pc + 4;
			},
			ARRAYLENGTH => {
				let array = self.non_null(thread, "read the array length")?;
				let length = array.array_length()?;
				self.frame.push(Value::Int(length as i32))?;
			},
			ATHROW => {
				let exception = self.non_null(thread, "throw exception")?;
				return Err(VmError::Guest(exception));
			},
			CHECKCAST => {
				self.checkcast(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			INSTANCEOF => {
				self.instanceof(thread, self.code.u16_at(pc + 1)?)?;
				next = pc + 3;
			},
			MONITORENTER => {
				let object = self.non_null(thread, "enter synchronized block")?;
				object.monitor().enter(thread.id());
			},
			MONITOREXIT => {
				let object = self.non_null(thread, "exit synchronized block")?;
				if !object.monitor().exit(thread.id()) {
					let message = "current thread is not owner".to_owned();
					return Err(self.vm.throw(thread, ILLEGAL_MONITOR_STATE_EXCEPTION, Some(message)));
				}
			},

			WIDE => next = self.wide(pc)?,

			BREAKPOINT | IMPDEP1 | IMPDEP2 => return Err(fatal!("reserved opcode {} found", mnemonic(op))),
			_ => return Err(fatal!("unknown opcode {op:#04x}")),
		}

		self.pc = next;
		Ok(Flow::Continue)
	}

	fn pool(&self) -> VmResult<&ConstantPool> {
		self.class.file()
			.map(|file| &file.pool)
			.ok_or_else(|| fatal!("{} has no constant pool", self.class.name()))
	}

	fn throw(&self, thread: &mut Thread, class: &str, message: impl Into<String>) -> VmError {
		self.vm.throw(thread, class, Some(message.into()))
	}

	/// Pops a reference, throwing a `java/lang/NullPointerException` if it's `null`.
	fn non_null(&mut self, thread: &mut Thread, action: &str) -> VmResult<ObjectRef> {
		match self.frame.pop_ref()? {
			Some(object) => Ok(object),
			None => Err(self.throw(thread, NULL_POINTER_EXCEPTION, format!("Cannot {action} because value is null"))),
		}
	}

	fn target(&self, pc: usize, offset: i32) -> VmResult<usize> {
		let target = pc as i64 + offset as i64;
		if target < 0 || target >= self.code.len() as i64 {
			return Err(fatal!("jump from {pc} by {offset} leaves the code of length {}", self.code.len()));
		}
		Ok(target as usize)
	}

	fn branch_if(&self, pc: usize, taken: bool) -> VmResult<usize> {
		if taken {
			self.target(pc, self.code.i16_at(pc + 1)? as i32)
		} else {
			Ok(pc + 3)
		}
	}

	fn ldc(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let constant = self.pool()?.get_loadable(index)?.clone();
		let value = match constant {
			Constant::Integer(value) => Value::Int(value),
			Constant::Float(value) => Value::Float(value),
			Constant::Long(value) => Value::Long(value),
			Constant::Double(value) => Value::Double(value),
			Constant::String(_) => Value::from_ref(runtime_pool::string_at(self.vm, thread, self.class, index)?),
			Constant::Class(_) => {
				let class = runtime_pool::class_at(self.vm, thread, self.class, index)?;
				Value::from_ref(self.vm.mirror(thread, &class)?)
			},
			other => return Err(fatal!("unsupported operation: loading the constant {other}")),
		};
		self.frame.push(value)
	}

	fn load(&mut self, index: usize, kind: Kind) -> VmResult<()> {
		let value = self.frame.load(index)?;
		kind.check(&value, false)?;
		self.frame.push(value)
	}

	fn store(&mut self, index: usize, kind: Kind) -> VmResult<()> {
		let value = self.frame.pop()?;
		// astore also stores the return addresses of jsr
		kind.check(&value, true)?;
		self.frame.store(index, value)
	}

	fn iinc(&mut self, index: usize, constant: i32) -> VmResult<()> {
		let value = self.frame.load(index)?.as_int()?;
		self.frame.store(index, Value::Int(value.wrapping_add(constant)))
	}

	fn ret(&self, index: usize) -> VmResult<usize> {
		match self.frame.load(index)? {
			Value::ReturnAddress(address) => Ok(address as usize),
			other => Err(fatal!("ret needs a return address in local {index}, found {other:?}")),
		}
	}

	fn wide(&mut self, pc: usize) -> VmResult<usize> {
		let op = self.code.u8_at(pc + 1)?;
		let index = self.code.u16_at(pc + 2)? as usize;
		match op {
			ILOAD..=ALOAD => self.load(index, Kind::nth(op - ILOAD))?,
			ISTORE..=ASTORE => self.store(index, Kind::nth(op - ISTORE))?,
			RET => return self.ret(index),
			IINC => {
				let constant = self.code.i16_at(pc + 4)? as i32;
				self.iinc(index, constant)?;
				return Ok(pc + 6);
			},
			_ => return Err(fatal!("wide can't modify {}", mnemonic(op))),
		}
		Ok(pc + 4)
	}

	fn tableswitch(&mut self, pc: usize) -> VmResult<usize> {
		// the operands are 4 byte aligned, relative to the start of the code
		let base = (pc + 4) & !3;
		let default = self.code.i32_at(base)?;
		let low = self.code.i32_at(base + 4)?;
		let high = self.code.i32_at(base + 8)?;
		let index = self.frame.pop_int()?;

		let offset = if index < low || index > high {
			default
		} else {
			self.code.i32_at(base + 12 + 4 * (index as i64 - low as i64) as usize)?
		};
		self.target(pc, offset)
	}

	fn lookupswitch(&mut self, pc: usize) -> VmResult<usize> {
		let base = (pc + 4) & !3;
		let default = self.code.i32_at(base)?;
		let pairs = self.code.i32_at(base + 4)?;
		let key = self.frame.pop_int()?;

		for i in 0..pairs.max(0) as usize {
			let entry = base + 8 + 8 * i;
			if self.code.i32_at(entry)? == key {
				return self.target(pc, self.code.i32_at(entry + 4)?);
			}
		}
		self.target(pc, default)
	}

	/// Rearranges the top `n` cells. The order lists the cells to push, with `0` being the topmost one.
	fn shuffle(&mut self, n: usize, order: &[usize]) -> VmResult<()> {
		let cells = self.frame.pop_cells(n)?;
		for &i in order {
			self.frame.push_cell(cells[n - 1 - i].clone())?;
		}
		Ok(())
	}

	fn int_op(&mut self, f: impl FnOnce(i32, i32) -> i32) -> VmResult<()> {
		let b = self.frame.pop_int()?;
		let a = self.frame.pop_int()?;
		self.frame.push(Value::Int(f(a, b)))
	}

	fn long_op(&mut self, f: impl FnOnce(i64, i64) -> i64) -> VmResult<()> {
		let b = self.frame.pop_long()?;
		let a = self.frame.pop_long()?;
		self.frame.push(Value::Long(f(a, b)))
	}

	fn long_shift(&mut self, f: impl FnOnce(i64, i32) -> i64) -> VmResult<()> {
		let b = self.frame.pop_int()?;
		let a = self.frame.pop_long()?;
		self.frame.push(Value::Long(f(a, b)))
	}

	fn float_op(&mut self, f: impl FnOnce(f32, f32) -> f32) -> VmResult<()> {
		let b = self.frame.pop_float()?;
		let a = self.frame.pop_float()?;
		self.frame.push(Value::Float(f(a, b)))
	}

	fn double_op(&mut self, f: impl FnOnce(f64, f64) -> f64) -> VmResult<()> {
		let b = self.frame.pop_double()?;
		let a = self.frame.pop_double()?;
		self.frame.push(Value::Double(f(a, b)))
	}

	fn int_division(&mut self, thread: &mut Thread, f: fn(i32, i32) -> Option<i32>) -> VmResult<()> {
		let b = self.frame.pop_int()?;
		let a = self.frame.pop_int()?;
		match f(a, b) {
			Some(result) => self.frame.push(Value::Int(result)),
			None => Err(self.throw(thread, "java/lang/ArithmeticException", "/ by zero")),
		}
	}

	fn long_division(&mut self, thread: &mut Thread, f: fn(i64, i64) -> Option<i64>) -> VmResult<()> {
		let b = self.frame.pop_long()?;
		let a = self.frame.pop_long()?;
		match f(a, b) {
			Some(result) => self.frame.push(Value::Long(result)),
			None => Err(self.throw(thread, "java/lang/ArithmeticException", "/ by zero")),
		}
	}

	fn convert<T>(&mut self, pop: fn(&mut Frame) -> VmResult<T>, f: impl FnOnce(T) -> Value) -> VmResult<()> {
		let value = pop(&mut self.frame)?;
		self.frame.push(f(value))
	}

	fn return_value(&mut self, value: Value) -> VmResult<Flow> {
		let Some(ty) = self.method.return_type() else {
			return Err(fatal!("returning {value:?} from a void method"));
		};
		if !value.matches(ty) {
			return Err(fatal!("returning {value:?} from a method returning {ty}"));
		}
		Ok(Flow::Return(Some(value.narrow(ty))))
	}

	fn array_load(&mut self, thread: &mut Thread, op: u8) -> VmResult<()> {
		let index = self.frame.pop_int()?;
		let array = self.non_null(thread, "load from array")?;
		self.check_element(&array, op)?;

		let value = usize::try_from(index).ok()
			.and_then(|i| array.array().ok()?.get(i));
		match value {
			Some(value) => self.frame.push(value),
			None => Err(self.index_out_of_bounds(thread, index, &array)?),
		}
	}

	fn array_store(&mut self, thread: &mut Thread, op: u8) -> VmResult<()> {
		let value = self.frame.pop()?;
		let index = self.frame.pop_int()?;
		let array = self.non_null(thread, "store to array")?;
		self.check_element(&array, op)?;

		let length = array.array_length()?;
		let Some(i) = usize::try_from(index).ok().filter(|&i| i < length) else {
			return Err(self.index_out_of_bounds(thread, index, &array)?);
		};

		if let Value::Ref(Some(element)) = &value {
			let component = array.class().component()
				.ok_or_else(|| fatal!("{:?} is an array without component type", array.class()))?;
			if !is_assignable_from(component, element.class()) {
				return Err(self.throw(thread, "java/lang/ArrayStoreException", element.class().java_name()));
			}
		}
		array.array()?.set(i, value)?;
		Ok(())
	}

	fn check_element(&self, array: &Object, op: u8) -> VmResult<()> {
		let element = array.class().element_type()
			.ok_or_else(|| fatal!("{:?} is not an array, can't use {} on it", array.class(), mnemonic(op)))?;
		if !Kind::fits_element(op, element) {
			return Err(fatal!("{} can't be used on an array of {element}", mnemonic(op)));
		}
		Ok(())
	}

	fn index_out_of_bounds(&self, thread: &mut Thread, index: i32, array: &Object) -> VmResult<VmError> {
		let message = format!("Index {index} out of bounds for length {}", array.array_length()?);
		Ok(self.throw(thread, "java/lang/ArrayIndexOutOfBoundsException", message))
	}

	fn getstatic(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let field = runtime_pool::field_at(self.vm, thread, self.class, index)?;
		if !field.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected static field {field}")));
		}
		self.vm.initialize(thread, field.class())?;
		let value = field.class().get_static(field.slot())?;
		self.frame.push(value)
	}

	fn putstatic(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let field = runtime_pool::field_at(self.vm, thread, self.class, index)?;
		if !field.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected static field {field}")));
		}
		if field.access().is_final && !Arc::ptr_eq(field.class(), self.class) {
			let message = format!("Update to static final field {field} attempted from a different class ({})", self.class.java_name());
			return Err(self.throw(thread, "java/lang/IllegalAccessError", message));
		}
		self.vm.initialize(thread, field.class())?;

		let value = self.frame.pop()?;
		if !value.matches(field.ty()) {
			return Err(fatal!("can't store {value:?} into field {field}"));
		}
		field.class().set_static(field.slot(), value.narrow(field.ty()))
	}

	fn getfield(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let field = runtime_pool::field_at(self.vm, thread, self.class, index)?;
		if field.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected non-static field {field}")));
		}
		let object = self.non_null(thread, &format!("read field \"{}\"", field.name()))?;
		let value = object.get_field(field.slot())?;
		self.frame.push(value)
	}

	fn putfield(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let field = runtime_pool::field_at(self.vm, thread, self.class, index)?;
		if field.is_static() {
			return Err(self.throw(thread, INCOMPATIBLE_CLASS_CHANGE_ERROR, format!("Expected non-static field {field}")));
		}
		if field.access().is_final && !Arc::ptr_eq(field.class(), self.class) {
			let message = format!("Update to non-static final field {field} attempted from a different class ({})", self.class.java_name());
			return Err(self.throw(thread, "java/lang/IllegalAccessError", message));
		}

		let value = self.frame.pop()?;
		if !value.matches(field.ty()) {
			return Err(fatal!("can't store {value:?} into field {field}"));
		}
		let object = self.non_null(thread, &format!("assign field \"{}\"", field.name()))?;
		object.set_field(field.slot(), value.narrow(field.ty()))
	}

	fn new_object(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let class = runtime_pool::class_at(self.vm, thread, self.class, index)?;
		if class.is_interface() || class.is_abstract() || class.is_array() {
			return Err(self.throw(thread, "java/lang/InstantiationError", class.java_name()));
		}
		self.vm.initialize(thread, &class)?;
		let object = Object::new_instance(class)?;
		self.frame.push(Value::from_ref(object))
	}

	fn array_length_operand(&mut self, thread: &mut Thread) -> VmResult<usize> {
		let length = self.frame.pop_int()?;
		usize::try_from(length)
			.map_err(|_| self.throw(thread, "java/lang/NegativeArraySizeException", length.to_string()))
	}

	fn newarray(&mut self, thread: &mut Thread, element: u8) -> VmResult<()> {
		let name = match element {
			atype::T_BOOLEAN => "[Z",
			atype::T_CHAR => "[C",
			atype::T_FLOAT => "[F",
			atype::T_DOUBLE => "[D",
			atype::T_BYTE => "[B",
			atype::T_SHORT => "[S",
			atype::T_INT => "[I",
			atype::T_LONG => "[J",
			_ => return Err(fatal!("invalid array type {element} for newarray")),
		};
		let length = self.array_length_operand(thread)?;
		let class = self.vm.load_class(thread, name)?;
		self.frame.push(Value::from_ref(Object::new_array(class, length)?))
	}

	fn anewarray(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let component = runtime_pool::class_at(self.vm, thread, self.class, index)?;
		let length = self.array_length_operand(thread)?;
		let class = self.vm.array_class(thread, &component)?;
		self.frame.push(Value::from_ref(Object::new_array(class, length)?))
	}

	fn multianewarray(&mut self, thread: &mut Thread, index: u16, dimensions: u8) -> VmResult<()> {
		let class = runtime_pool::class_at(self.vm, thread, self.class, index)?;
		if dimensions == 0 {
			return Err(fatal!("multianewarray needs at least one dimension"));
		}

		let counts = self.frame.pop_cells(dimensions as usize)?
			.iter()
			.map(Value::as_int)
			.collect::<VmResult<Vec<i32>>>()?;
		if let Some(negative) = counts.iter().find(|&&count| count < 0) {
			return Err(self.throw(thread, "java/lang/NegativeArraySizeException", negative.to_string()));
		}
		let counts: Vec<usize> = counts.into_iter().map(|count| count as usize).collect();

		let array = build_array(&class, &counts)?;
		self.frame.push(Value::from_ref(array))
	}

	fn checkcast(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let target = runtime_pool::class_at(self.vm, thread, self.class, index)?;
		if let Some(object) = self.frame.peek()?.as_ref()? {
			if !is_assignable_from(&target, object.class()) {
				let message = format!("class {} cannot be cast to class {}", object.class().java_name(), target.java_name());
				return Err(self.throw(thread, "java/lang/ClassCastException", message));
			}
		}
		Ok(())
	}

	fn instanceof(&mut self, thread: &mut Thread, index: u16) -> VmResult<()> {
		let target = runtime_pool::class_at(self.vm, thread, self.class, index)?;
		let result = match self.frame.pop_ref()? {
			Some(object) => is_assignable_from(&target, object.class()),
			None => false,
		};
		self.frame.push(Value::Int(result as i32))
	}
}

/// Creates a possibly nested array. The dimensions beyond the given counts are left `null`.
fn build_array(class: &Arc<Class>, counts: &[usize]) -> VmResult<ObjectRef> {
	let Some((&length, rest)) = counts.split_first() else {
		return Err(fatal!("no dimensions left for {class:?}"));
	};
	let array = Object::new_array(class.clone(), length)?;
	if !rest.is_empty() {
		let component = class.component()
			.ok_or_else(|| fatal!("{class:?} has fewer dimensions than requested"))?;
		for i in 0..length {
			let inner = build_array(component, rest)?;
			array.array()?.set(i, Value::from_ref(inner))?;
		}
	}
	Ok(array)
}
