mod common;

use std::sync::Arc;
use anyhow::{anyhow, Result};
use dukevm::{resolve, CallSite, Tier, Value, VmError};
use pretty_assertions::assert_eq;
use raw_class_file::{flags, insn, ClassBuilder};
use common::{int, thrown, vm};

const PUBLIC_STATIC: u16 = flags::ACC_PUBLIC | flags::ACC_STATIC;

fn returning(name: &str, super_class: &str, value: i32) -> Vec<u8> {
	ClassBuilder::new(name)
		.super_class(Some(super_class))
		.default_constructor(super_class)
		.method(flags::ACC_PUBLIC, "value", "()I", |code| {
			code.iconst(value).op(insn::ireturn);
		})
		.build()
}

#[test]
fn inline_cache_tiers() -> Result<()> {
	let mut classes = vec![("Base", returning("Base", "java/lang/Object", 0))];
	let names = ["S0", "S1", "S2", "S3", "S4"];
	for (i, &name) in names.iter().enumerate() {
		classes.push((name, returning(name, "Base", i as i32 + 1)));
	}
	classes.push(("Caller", ClassBuilder::new("Caller")
		.method(PUBLIC_STATIC, "call", "(LBase;)I", |code| {
			code.op(insn::aload_0);
			assert_eq!(code.pc(), 1);
			code.invoke(insn::invokevirtual, "Base", "value", "()I")
				.op(insn::ireturn);
		})
		.build()));
	let vm = vm(classes)?;
	let mut thread = vm.new_thread();

	let caller = vm.load_class(&mut thread, "Caller")?;
	let call = caller.declared_method("call", "(LBase;)I").ok_or_else(|| anyhow!("no call method"))?;
	let site = CallSite { method: call.id(), pc: 1 };
	assert_eq!(vm.inline_cache_tier(site), None);

	let receivers = names.iter()
		.map(|name| vm.construct(&mut thread, name, "()V", Vec::new()))
		.collect::<Result<Vec<_>, _>>()?;
	let mut call = |i: usize| -> Result<i32> {
		let result = vm.invoke_static(&mut thread, "Caller", "call", "(LBase;)I", vec![Value::from_ref(receivers[i].clone())])?;
		int(result)
	};

	assert_eq!(call(0)?, 1);
	assert_eq!(vm.inline_cache_tier(site), Some(Tier::Monomorphic));
	let before = vm.inline_cache_counts();
	assert_eq!(call(0)?, 1);
	assert_eq!(vm.inline_cache_counts().hits, before.hits + 1);
	assert_eq!(vm.inline_cache_tier(site), Some(Tier::Monomorphic));

	assert_eq!(call(1)?, 2);
	assert_eq!(vm.inline_cache_tier(site), Some(Tier::Polymorphic));
	assert_eq!(call(2)?, 3);
	assert_eq!(call(3)?, 4);
	assert_eq!(vm.inline_cache_tier(site), Some(Tier::Polymorphic));
	assert_eq!(call(0)?, 1);

	assert_eq!(call(4)?, 5);
	assert_eq!(vm.inline_cache_tier(site), Some(Tier::Megamorphic));
	assert!(vm.megamorphic_entries() >= 1);

	// once megamorphic, always megamorphic, and still correct
	for i in [0, 1, 2, 3, 4, 0] {
		assert_eq!(call(i)?, i as i32 + 1);
	}
	assert_eq!(vm.inline_cache_tier(site), Some(Tier::Megamorphic));
	Ok(())
}

fn animals() -> Vec<(&'static str, Vec<u8>)> {
	let animal = ClassBuilder::new("Animal")
		.default_constructor("java/lang/Object")
		.method(flags::ACC_PUBLIC, "speak", "()I", |code| {
			code.op(insn::iconst_1).op(insn::ireturn);
		})
		.build();
	let dog = ClassBuilder::new("Dog")
		.super_class(Some("Animal"))
		.default_constructor("Animal")
		.method(flags::ACC_PUBLIC, "speak", "()I", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokespecial, "Animal", "speak", "()I")
				.iconst(10)
				.op(insn::iadd)
				.op(insn::ireturn);
		})
		.build();
	let puppy = ClassBuilder::new("Puppy")
		.super_class(Some("Dog"))
		.default_constructor("Dog")
		.build();
	let shape = ClassBuilder::new("Shape")
		.access(flags::ACC_PUBLIC | flags::ACC_SUPER | flags::ACC_ABSTRACT)
		.default_constructor("java/lang/Object")
		.method_without_code(flags::ACC_PUBLIC | flags::ACC_ABSTRACT, "area", "()I")
		.build();
	let square = ClassBuilder::new("Square")
		.super_class(Some("Shape"))
		.default_constructor("Shape")
		.build();
	vec![("Animal", animal), ("Dog", dog), ("Puppy", puppy), ("Shape", shape), ("Square", square)]
}

#[test]
fn virtual_and_super_calls() -> Result<()> {
	let vm = vm(animals())?;
	let mut thread = vm.new_thread();

	let animal = vm.construct(&mut thread, "Animal", "()V", Vec::new())?;
	let dog = vm.construct(&mut thread, "Dog", "()V", Vec::new())?;
	let puppy = vm.construct(&mut thread, "Puppy", "()V", Vec::new())?;
	assert_eq!(int(vm.invoke_virtual(&mut thread, &animal, "speak", "()I", Vec::new())?)?, 1);
	assert_eq!(int(vm.invoke_virtual(&mut thread, &dog, "speak", "()I", Vec::new())?)?, 11);
	assert_eq!(int(vm.invoke_virtual(&mut thread, &puppy, "speak", "()I", Vec::new())?)?, 11);

	let square = vm.construct(&mut thread, "Square", "()V", Vec::new())?;
	assert_eq!(thrown(vm.invoke_virtual(&mut thread, &square, "area", "()I", Vec::new()))?, "java/lang/AbstractMethodError");
	Ok(())
}

#[test]
fn resolution_is_remembered() -> Result<()> {
	let vm = vm(animals())?;
	let mut thread = vm.new_thread();
	let puppy = vm.load_class(&mut thread, "Puppy")?;

	let first = resolve::resolve_class_method(&vm, &mut thread, &puppy, "speak", "()I")?;
	assert_eq!(first.class().name(), "Dog");
	let searches = vm.stats().method_searches();
	let second = resolve::resolve_class_method(&vm, &mut thread, &puppy, "speak", "()I")?;
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(vm.stats().method_searches(), searches);

	let hash_code = resolve::resolve_class_method(&vm, &mut thread, &puppy, "hashCode", "()I")?;
	assert_eq!(hash_code.class().name(), "java/lang/Object");

	// failures aren't remembered, each attempt searches again
	let searches = vm.stats().method_searches();
	assert_eq!(thrown(resolve::resolve_class_method(&vm, &mut thread, &puppy, "bark", "()V"))?, "java/lang/NoSuchMethodError");
	assert_eq!(thrown(resolve::resolve_class_method(&vm, &mut thread, &puppy, "bark", "()V"))?, "java/lang/NoSuchMethodError");
	assert!(vm.stats().method_searches() >= searches + 2);

	let cloneable = vm.load_class(&mut thread, "java/lang/Cloneable")?;
	let result = resolve::resolve_class_method(&vm, &mut thread, &cloneable, "hashCode", "()I");
	assert_eq!(thrown(result)?, "java/lang/IncompatibleClassChangeError");
	Ok(())
}

fn greeter(name: &str, value: i32) -> Vec<u8> {
	ClassBuilder::interface(name)
		.method(flags::ACC_PUBLIC, "greet", "()I", |code| {
			code.iconst(value).op(insn::ireturn);
		})
		.build()
}

#[test]
fn interface_calls() -> Result<()> {
	let inherits = ClassBuilder::new("Inherits")
		.implements("Greeter")
		.default_constructor("java/lang/Object")
		.build();
	let overrides = ClassBuilder::new("Overrides")
		.implements("Greeter")
		.default_constructor("java/lang/Object")
		.method(flags::ACC_PUBLIC, "greet", "()I", |code| {
			code.iconst(8).op(insn::ireturn);
		})
		.build();
	let conflicting = ClassBuilder::new("Conflicting")
		.implements("Greeter")
		.implements("Other")
		.default_constructor("java/lang/Object")
		.build();
	let caller = ClassBuilder::new("Caller")
		.method(PUBLIC_STATIC, "greet", "(Ljava/lang/Object;)I", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokeinterface, "Greeter", "greet", "()I")
				.op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![
		("Greeter", greeter("Greeter", 7)),
		("Other", greeter("Other", 9)),
		("Inherits", inherits),
		("Overrides", overrides),
		("Conflicting", conflicting),
		("Caller", caller),
	])?;
	let mut thread = vm.new_thread();

	let mut greet = |name: &str| {
		let receiver = vm.construct(&mut thread, name, "()V", Vec::new())?;
		vm.invoke_static(&mut thread, "Caller", "greet", "(Ljava/lang/Object;)I", vec![Value::from_ref(receiver)])
	};
	assert_eq!(int(greet("Inherits")?)?, 7);
	assert_eq!(int(greet("Overrides")?)?, 8);
	assert_eq!(thrown(greet("Conflicting"))?, "java/lang/IncompatibleClassChangeError");

	let result = greet("java/lang/Object");
	let Err(VmError::Guest(exception)) = &result else {
		anyhow::bail!("expected an exception, got {result:?}");
	};
	assert_eq!(exception.class().name(), "java/lang/IncompatibleClassChangeError");
	assert_eq!(
		vm.throwable_message(exception).as_deref(),
		Some("Class java.lang.Object does not implement the requested interface Greeter"),
	);
	Ok(())
}

#[test]
fn interface_resolution_rejects_conflicting_defaults() -> Result<()> {
	let both = ClassBuilder::interface("Both")
		.implements("Greeter")
		.implements("Other")
		.build();
	let via_super = ClassBuilder::new("ViaSuper")
		.implements("Both")
		.default_constructor("java/lang/Object")
		.method(flags::ACC_PUBLIC, "callSuper", "()I", |code| {
			code.op(insn::aload_0)
				.invoke_interface_owner(insn::invokespecial, "Both", "greet", "()I")
				.op(insn::ireturn);
		})
		.build();
	let vm = vm(vec![
		("Greeter", greeter("Greeter", 7)),
		("Other", greeter("Other", 9)),
		("Both", both),
		("ViaSuper", via_super),
	])?;
	let mut thread = vm.new_thread();

	let both = vm.load_class(&mut thread, "Both")?;
	for _ in 0..2 {
		let result = resolve::resolve_interface_method(&vm, &mut thread, &both, "greet", "()I");
		let Err(VmError::Guest(exception)) = &result else {
			anyhow::bail!("expected an exception, got {result:?}");
		};
		assert_eq!(exception.class().name(), "java/lang/IncompatibleClassChangeError");
		let message = vm.throwable_message(exception).unwrap_or_default();
		assert!(message.starts_with("Conflicting default methods: "), "{message}");
		assert!(message.contains("Greeter.greet()I") && message.contains("Other.greet()I"), "{message}");
	}

	let receiver = vm.construct(&mut thread, "ViaSuper", "()V", Vec::new())?;
	let result = vm.invoke_virtual(&mut thread, &receiver, "callSuper", "()I", Vec::new());
	assert_eq!(thrown(result)?, "java/lang/IncompatibleClassChangeError");
	Ok(())
}

#[test]
fn invokedynamic_is_unsupported() -> Result<()> {
	let class = ClassBuilder::new("Lambda")
		.method(PUBLIC_STATIC, "run", "()V", |code| {
			code.invokedynamic("run", "()Ljava/lang/Runnable;")
				.op(insn::pop)
				.op(insn::r#return);
		})
		.build();
	let vm = vm(vec![("Lambda", class)])?;
	let mut thread = vm.new_thread();

	let result = vm.invoke_static(&mut thread, "Lambda", "run", "()V", Vec::new());
	let Err(VmError::Fatal(e)) = result else {
		anyhow::bail!("expected a fatal error, got {result:?}");
	};
	assert!(format!("{e:#}").contains("unsupported operation: invokedynamic"), "{e:#}");
	Ok(())
}
