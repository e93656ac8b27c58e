mod common;

use std::sync::Arc;
use anyhow::{anyhow, Result};
use dukevm::{InitState, Value, VmConfig, VmResult, Thread, Vm};
use pretty_assertions::assert_eq;
use raw_class_file::{atype, flags, insn, ClassBuilder, ConstantValue};
use common::{int, object, vm, vm_with};

const PUBLIC_STATIC: u16 = flags::ACC_PUBLIC | flags::ACC_STATIC;

#[test]
fn add() -> Result<()> {
	let calc = ClassBuilder::new("Calc")
		.method(PUBLIC_STATIC, "add", "(II)I", |code| {
			code.op(insn::iload_0)
				.op(insn::iload_1)
				.op(insn::iadd)
				.op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![("Calc", calc)])?;
	let mut thread = vm.new_thread();

	let result = vm.invoke_static(&mut thread, "Calc", "add", "(II)I", vec![Value::Int(2), Value::Int(3)])?;
	assert_eq!(result, Some(Value::Int(5)));
	assert_eq!(thread.depth(), 0);
	Ok(())
}

#[test]
fn constant_value_is_there_before_the_static_initializer() -> Result<()> {
	let class = ClassBuilder::new("K")
		.constant_field(PUBLIC_STATIC | flags::ACC_FINAL, "ANSWER", "I", ConstantValue::Int(42))
		.constant_field(PUBLIC_STATIC | flags::ACC_FINAL, "GREETING", "Ljava/lang/String;", ConstantValue::String("hi".to_owned()))
		.field(PUBLIC_STATIC, "seen", "I")
		.method(flags::ACC_STATIC, "<clinit>", "()V", |code| {
			code.field(insn::getstatic, "K", "ANSWER", "I")
				.field(insn::putstatic, "K", "seen", "I")
				.op(insn::r#return);
		})
		.method(PUBLIC_STATIC, "seen", "()I", |code| {
			code.field(insn::getstatic, "K", "seen", "I")
				.op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![("K", class)])?;
	let mut thread = vm.new_thread();

	let k = vm.load_class(&mut thread, "K")?;
	assert_eq!(k.init_state(), InitState::Loaded);
	let answer = k.declared_field("ANSWER", "I").ok_or_else(|| anyhow!("no field"))?;
	assert_eq!(k.get_static(answer.slot())?, Value::Int(42));

	let greeting = k.declared_field("GREETING", "Ljava/lang/String;").ok_or_else(|| anyhow!("no field"))?;
	let greeting = object(Some(k.get_static(greeting.slot())?))?;
	let units = greeting.string_units().ok_or_else(|| anyhow!("not a string"))?;
	assert_eq!(dukevm::strings::to_rust_string(&units), "hi");

	assert_eq!(int(vm.invoke_static(&mut thread, "K", "seen", "()I", Vec::new())?)?, 42);
	assert_eq!(k.init_state(), InitState::FullyInitialized);
	Ok(())
}

#[test]
fn multianewarray() -> Result<()> {
	let class = ClassBuilder::new("Arrays")
		.method(PUBLIC_STATIC, "make", "()[[I", |code| {
			code.op(insn::iconst_2)
				.op(insn::iconst_3)
				.multianewarray("[[I", 2)
				.op(insn::areturn);
		})
		.build();
	let vm = vm(vec![("Arrays", class)])?;
	let mut thread = vm.new_thread();

	let outer = object(vm.invoke_static(&mut thread, "Arrays", "make", "()[[I", Vec::new())?)?;
	assert_eq!(outer.class().name(), "[[I");
	assert_eq!(outer.array_length()?, 2);

	let first = object(outer.array()?.get(0))?;
	let second = object(outer.array()?.get(1))?;
	assert!(!Arc::ptr_eq(&first, &second));
	for inner in [&first, &second] {
		assert_eq!(inner.class().name(), "[I");
		assert_eq!(inner.array_length()?, 3);
		for i in 0..3 {
			assert_eq!(inner.array()?.get(i), Some(Value::Int(0)));
		}
	}

	first.array()?.set(1, Value::Int(7))?;
	assert_eq!(second.array()?.get(1), Some(Value::Int(0)));
	Ok(())
}

fn call_int(vm: &Vm, thread: &mut Thread, name: &str, descriptor: &str, args: Vec<Value>) -> VmResult<Option<Value>> {
	vm.invoke_static(thread, "Ops", name, descriptor, args)
}

fn ops() -> Vec<u8> {
	ClassBuilder::new("Ops")
		.method(PUBLIC_STATIC, "idiv", "(II)I", |code| {
			code.op(insn::iload_0).op(insn::iload_1).op(insn::idiv).op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "irem", "(II)I", |code| {
			code.op(insn::iload_0).op(insn::iload_1).op(insn::irem).op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "ishl", "(II)I", |code| {
			code.op(insn::iload_0).op(insn::iload_1).op(insn::ishl).op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "lmul", "(JJ)J", |code| {
			code.op(insn::lload_0).op(insn::lload_2).op(insn::lmul).op(insn::lreturn);
		})
		.method(PUBLIC_STATIC, "fdiv", "(FF)F", |code| {
			code.op(insn::fload_0).op(insn::fload_1).op(insn::fdiv).op(insn::freturn);
		})
		.method(PUBLIC_STATIC, "d2i", "(D)I", |code| {
			code.op(insn::dload_0).op(insn::d2i).op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "dcmpg", "(DD)I", |code| {
			code.op(insn::dload_0).op(insn::dload_2).op(insn::dcmpg).op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "i2b", "(I)B", |code| {
			code.op(insn::iload_0).op(insn::ireturn);
		})
		.build()
}

#[test]
fn arithmetic() -> Result<()> {
	let vm = vm(vec![("Ops", ops())])?;
	let mut thread = vm.new_thread();
	let t = &mut thread;

	assert_eq!(int(call_int(&vm, t, "idiv", "(II)I", vec![Value::Int(-7), Value::Int(2)])?)?, -3);
	assert_eq!(int(call_int(&vm, t, "idiv", "(II)I", vec![Value::Int(i32::MIN), Value::Int(-1)])?)?, i32::MIN);
	assert_eq!(common::thrown(call_int(&vm, t, "idiv", "(II)I", vec![Value::Int(1), Value::Int(0)]))?, "java/lang/ArithmeticException");
	assert_eq!(common::thrown_message(&vm, call_int(&vm, t, "irem", "(II)I", vec![Value::Int(1), Value::Int(0)]))?.as_deref(), Some("/ by zero"));
	assert_eq!(int(call_int(&vm, t, "ishl", "(II)I", vec![Value::Int(1), Value::Int(33)])?)?, 2);

	let product = call_int(&vm, t, "lmul", "(JJ)J", vec![Value::Long(1 << 40), Value::Long(1 << 30)])?;
	assert_eq!(product, Some(Value::Long(1i64.wrapping_shl(70))));

	let quotient = call_int(&vm, t, "fdiv", "(FF)F", vec![Value::Float(1.0), Value::Float(0.0)])?;
	assert_eq!(quotient, Some(Value::Float(f32::INFINITY)));

	assert_eq!(int(call_int(&vm, t, "d2i", "(D)I", vec![Value::Double(f64::NAN)])?)?, 0);
	assert_eq!(int(call_int(&vm, t, "d2i", "(D)I", vec![Value::Double(1e300)])?)?, i32::MAX);
	assert_eq!(int(call_int(&vm, t, "dcmpg", "(DD)I", vec![Value::Double(f64::NAN), Value::Double(0.0)])?)?, 1);

	// returning from a byte method narrows
	assert_eq!(int(call_int(&vm, t, "i2b", "(I)B", vec![Value::Int(0x1ff)])?)?, -1);
	Ok(())
}

#[test]
fn switches() -> Result<()> {
	let class = ClassBuilder::new("Switch")
		.method(PUBLIC_STATIC, "table", "(I)I", |code| {
			let default = code.label();
			let targets = [code.label(), code.label(), code.label()];
			code.op(insn::iload_0).tableswitch(0, default, &targets);
			for (i, target) in targets.into_iter().enumerate() {
				code.place(target).iconst(10 * (i as i32 + 1)).op(insn::ireturn);
			}
			code.place(default).iconst(-1).op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "lookup", "(I)I", |code| {
			let default = code.label();
			let small = code.label();
			let large = code.label();
			code.op(insn::iload_0)
				.lookupswitch(default, &[(-5, small), (1000, large)])
				.place(small).iconst(1).op(insn::ireturn)
				.place(large).iconst(2).op(insn::ireturn)
				.place(default).iconst(0).op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![("Switch", class)])?;
	let mut thread = vm.new_thread();

	let mut table = |i| vm.invoke_static(&mut thread, "Switch", "table", "(I)I", vec![Value::Int(i)]).map_err(anyhow::Error::from).and_then(int);
	assert_eq!(table(0)?, 10);
	assert_eq!(table(2)?, 30);
	assert_eq!(table(3)?, -1);
	assert_eq!(table(-1)?, -1);

	let mut thread = vm.new_thread();
	let mut lookup = |i| vm.invoke_static(&mut thread, "Switch", "lookup", "(I)I", vec![Value::Int(i)]).map_err(anyhow::Error::from).and_then(int);
	assert_eq!(lookup(-5)?, 1);
	assert_eq!(lookup(1000)?, 2);
	assert_eq!(lookup(7)?, 0);
	Ok(())
}

#[test]
fn wide_locals_and_subroutines() -> Result<()> {
	let class = ClassBuilder::new("Locals")
		.method(PUBLIC_STATIC, "wide", "(I)I", |code| {
			code.op(insn::iload_0)
				.local(insn::istore, 300)
				.iinc(300, 1000)
				.local(insn::iload, 300)
				.op(insn::ireturn);
		})
		.method(PUBLIC_STATIC, "subroutine", "()I", |code| {
			let subroutine = code.label();
			code.iconst(1)
				.local(insn::istore, 0)
				.jump(insn::jsr, subroutine)
				.local(insn::iload, 0)
				.op(insn::ireturn)
				.place(subroutine)
				.local(insn::astore, 1)
				.iinc(0, 8)
				.local(insn::ret, 1);
		})
		.method(PUBLIC_STATIC, "halves", "(J)J", |code| {
			// a long in 0 and 1, overwritten in its upper half, then stored again
			code.op(insn::iconst_0)
				.local(insn::istore, 1)
				.op(insn::lload_0)
				.op(insn::lreturn);
		})
		.build();
	let vm = vm(vec![("Locals", class)])?;
	let mut thread = vm.new_thread();

	assert_eq!(int(vm.invoke_static(&mut thread, "Locals", "wide", "(I)I", vec![Value::Int(5)])?)?, 1005);
	assert_eq!(int(vm.invoke_static(&mut thread, "Locals", "subroutine", "()I", Vec::new())?)?, 9);

	// the long was invalidated, reading it is a runtime invariant violation
	let result = vm.invoke_static(&mut thread, "Locals", "halves", "(J)J", vec![Value::Long(1)]);
	assert!(matches!(result, Err(dukevm::VmError::Fatal(_))), "{result:?}");
	Ok(())
}

#[test]
fn strings_and_output() -> Result<()> {
	let main = ClassBuilder::new("Main")
		.method(PUBLIC_STATIC, "main", "([Ljava/lang/String;)V", |code| {
			code.ldc_string("a")
				.ldc_string("b")
				.invoke(insn::invokevirtual, "java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;")
				.invoke(insn::invokestatic, "dukevm/Host", "println", "(Ljava/lang/String;)V")
				.op(insn::aload_0)
				.op(insn::arraylength)
				.invoke(insn::invokestatic, "dukevm/Host", "println", "(I)V")
				.op(insn::aload_0)
				.op(insn::iconst_0)
				.op(insn::aaload)
				.invoke(insn::invokestatic, "dukevm/Host", "print", "(Ljava/lang/String;)V")
				.op(insn::r#return);
		})
		.method(PUBLIC_STATIC, "same", "()Z", |code| {
			let different = code.label();
			code.ldc_string("x")
				.ldc_string("x")
				.jump(insn::if_acmpne, different)
				.op(insn::iconst_1)
				.op(insn::ireturn)
				.place(different)
				.op(insn::iconst_0)
				.op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![("Main", main)])?;

	vm.run_main("Main", &["first".to_owned(), "second".to_owned()])?;
	assert_eq!(vm.take_output().as_deref(), Some("ab\n2\nfirst"));

	let mut thread = vm.new_thread();
	assert_eq!(int(vm.invoke_static(&mut thread, "Main", "same", "()Z", Vec::new())?)?, 1);
	Ok(())
}

#[test]
fn field_layout_is_shared_with_subclasses() -> Result<()> {
	let b = ClassBuilder::new("B")
		.field(flags::ACC_PUBLIC, "a", "I")
		.field(flags::ACC_PUBLIC, "b", "J")
		.default_constructor("java/lang/Object")
		.build();
	let c = ClassBuilder::new("C")
		.super_class(Some("B"))
		.field(flags::ACC_PUBLIC, "c", "I")
		.default_constructor("B")
		.method(PUBLIC_STATIC, "test", "()I", |code| {
			code.type_op(insn::new, "C")
				.op(insn::dup)
				.invoke(insn::invokespecial, "C", "<init>", "()V")
				.local(insn::astore, 0)
				.local(insn::aload, 0)
				.iconst(5)
				.field(insn::putfield, "B", "a", "I")
				.local(insn::aload, 0)
				.iconst(6)
				.field(insn::putfield, "C", "c", "I")
				.local(insn::aload, 0)
				.field(insn::getfield, "C", "a", "I")
				.local(insn::aload, 0)
				.field(insn::getfield, "C", "c", "I")
				.op(insn::iadd)
				.op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![("B", b), ("C", c)])?;
	let mut thread = vm.new_thread();

	let b = vm.load_class(&mut thread, "B")?;
	let c = vm.load_class(&mut thread, "C")?;
	let own = c.links()?.fields().iter().filter(|field| !field.is_static()).count();
	assert_eq!(c.links()?.instance_field_size(), b.links()?.instance_field_size() + own);

	assert_eq!(int(vm.invoke_static(&mut thread, "C", "test", "()I", Vec::new())?)?, 11);
	Ok(())
}

fn twice(_: &Vm, _: &mut Thread, args: &[Value]) -> VmResult<Option<Value>> {
	let value = args.first().map(Value::as_int).transpose()?.unwrap_or_default();
	Ok(Some(Value::Int(value * 2)))
}

#[test]
fn natives_from_the_config() -> Result<()> {
	let class = ClassBuilder::new("N")
		.method_without_code(PUBLIC_STATIC | flags::ACC_NATIVE, "twice", "(I)I")
		.method_without_code(PUBLIC_STATIC | flags::ACC_NATIVE, "missing", "()V")
		.method(PUBLIC_STATIC, "arrays", "()I", |code| {
			code.iconst(4)
				.newarray(atype::T_CHAR)
				.op(insn::dup)
				.op(insn::iconst_0)
				.iconst(0x1_0041)
				.op(insn::castore)
				.op(insn::iconst_0)
				.op(insn::caload)
				.op(insn::ireturn);
		})
		.build();
	let vm = vm_with(VmConfig::default().native("N", "twice", "(I)I", twice), vec![("N", class)])?;
	let mut thread = vm.new_thread();

	assert_eq!(int(vm.invoke_static(&mut thread, "N", "twice", "(I)I", vec![Value::Int(21)])?)?, 42);
	// the char store truncates
	assert_eq!(int(vm.invoke_static(&mut thread, "N", "arrays", "()I", Vec::new())?)?, 0x41);

	let missing = vm.invoke_static(&mut thread, "N", "missing", "()V", Vec::new());
	let Err(dukevm::VmError::Fatal(e)) = missing else {
		anyhow::bail!("expected a fatal error, got {missing:?}");
	};
	assert!(format!("{e:#}").contains("unsupported operation"), "{e:#}");
	Ok(())
}

#[test]
fn long_arguments_take_two_slots() -> Result<()> {
	let calc = ClassBuilder::new("Wide")
		.method(PUBLIC_STATIC, "sum", "(JI)J", |code| {
			code.op(insn::lload_0)
				.op(insn::iload_2)
				.op(insn::i2l)
				.op(insn::ladd)
				.op(insn::lreturn);
		})
		.method(PUBLIC_STATIC, "call", "()J", |code| {
			code.op(insn::lconst_1)
				.iconst(41)
				.invoke(insn::invokestatic, "Wide", "sum", "(JI)J")
				.op(insn::lreturn);
		})
		.build();
	let vm = vm(vec![("Wide", calc)])?;
	let mut thread = vm.new_thread();

	assert_eq!(vm.invoke_static(&mut thread, "Wide", "call", "()J", Vec::new())?, Some(Value::Long(42)));
	assert_eq!(vm.invoke_static(&mut thread, "Wide", "sum", "(JI)J", vec![Value::Long(40), Value::Int(2)])?, Some(Value::Long(42)));

	let missing = vm.invoke_static(&mut thread, "Wide", "sum", "(JI)J", vec![Value::Long(40)]);
	let Err(dukevm::VmError::Fatal(e)) = missing else {
		anyhow::bail!("expected a fatal error, got {missing:?}");
	};
	assert!(format!("{e:#}").contains("takes 3 argument slots, but got 2"), "{e:#}");
	assert_eq!(thread.depth(), 0);
	Ok(())
}
