//! A tiny `java/lang` library.
//!
//! Only what's needed to bootstrap a runtime and run code throwing exceptions is there. Everything that needs the
//! host is declared `native`.

use crate::{ClassBuilder, flags, insn};

const PUBLIC: u16 = flags::ACC_PUBLIC;
const PUBLIC_NATIVE: u16 = flags::ACC_PUBLIC | flags::ACC_NATIVE;
const PUBLIC_STATIC_NATIVE: u16 = flags::ACC_PUBLIC | flags::ACC_STATIC | flags::ACC_NATIVE;

/// Throwable classes, together with their super classes. Each gets a `<init>()V` and a `<init>(Ljava/lang/String;)V`.
const THROWABLES: &[(&str, &str)] = &[
	("java/lang/Exception", "java/lang/Throwable"),
	("java/lang/Error", "java/lang/Throwable"),
	("java/lang/RuntimeException", "java/lang/Exception"),
	("java/lang/ArithmeticException", "java/lang/RuntimeException"),
	("java/lang/NullPointerException", "java/lang/RuntimeException"),
	("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
	("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
	("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
	("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
	("java/lang/ClassCastException", "java/lang/RuntimeException"),
	("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
	("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
	("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
	("java/lang/CloneNotSupportedException", "java/lang/Exception"),
	("java/lang/InterruptedException", "java/lang/Exception"),
	("java/lang/LinkageError", "java/lang/Error"),
	("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
	("java/lang/ClassFormatError", "java/lang/LinkageError"),
	("java/lang/ClassCircularityError", "java/lang/LinkageError"),
	("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
	("java/lang/VerifyError", "java/lang/LinkageError"),
	("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
	("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
	("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
	("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
	("java/lang/IllegalAccessError", "java/lang/IncompatibleClassChangeError"),
	("java/lang/InstantiationError", "java/lang/IncompatibleClassChangeError"),
	("java/lang/VirtualMachineError", "java/lang/Error"),
	("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
	("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
	("java/lang/InternalError", "java/lang/VirtualMachineError"),
];

/// All classes of the library, as pairs of internal name and class file bytes.
pub fn java_lang() -> Vec<(String, Vec<u8>)> {
	let mut classes = vec![
		("java/lang/Object".to_owned(), object()),
		("java/lang/Class".to_owned(), class()),
		("java/lang/String".to_owned(), string()),
		("java/lang/System".to_owned(), system()),
		("java/lang/Float".to_owned(), float()),
		("java/lang/Double".to_owned(), double()),
		("java/lang/Cloneable".to_owned(), ClassBuilder::interface("java/lang/Cloneable").build()),
		("java/io/Serializable".to_owned(), ClassBuilder::interface("java/io/Serializable").build()),
		("java/lang/Throwable".to_owned(), throwable()),
		("java/lang/ExceptionInInitializerError".to_owned(), exception_in_initializer_error()),
		("java/lang/invoke/MethodHandle".to_owned(), method_handle()),
		("dukevm/Host".to_owned(), host()),
	];

	for &(name, super_class) in THROWABLES {
		classes.push((name.to_owned(), throwable_subclass(name, super_class)));
	}

	classes
}

fn object() -> Vec<u8> {
	ClassBuilder::new("java/lang/Object")
		.super_class(None)
		.method(PUBLIC, "<init>", "()V", |code| {
			code.op(insn::r#return);
		})
		.method_without_code(flags::ACC_PRIVATE | flags::ACC_STATIC | flags::ACC_NATIVE, "registerNatives", "()V")
		.method(flags::ACC_STATIC, "<clinit>", "()V", |code| {
			code.invoke(insn::invokestatic, "java/lang/Object", "registerNatives", "()V")
				.op(insn::r#return);
		})
		.method_without_code(PUBLIC_NATIVE | flags::ACC_FINAL, "getClass", "()Ljava/lang/Class;")
		.method_without_code(PUBLIC_NATIVE, "hashCode", "()I")
		.method(PUBLIC, "equals", "(Ljava/lang/Object;)Z", |code| {
			let not_equal = code.label();
			code.op(insn::aload_0)
				.op(insn::aload_1)
				.jump(insn::if_acmpne, not_equal)
				.op(insn::iconst_1)
				.op(insn::ireturn)
				.place(not_equal)
				.op(insn::iconst_0)
				.op(insn::ireturn);
		})
		.method_without_code(flags::ACC_PROTECTED | flags::ACC_NATIVE, "clone", "()Ljava/lang/Object;")
		.method(PUBLIC, "toString", "()Ljava/lang/String;", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokevirtual, "java/lang/Object", "getClass", "()Ljava/lang/Class;")
				.invoke(insn::invokevirtual, "java/lang/Class", "getName", "()Ljava/lang/String;")
				.op(insn::areturn);
		})
		.method_without_code(PUBLIC_NATIVE | flags::ACC_FINAL, "notify", "()V")
		.method_without_code(PUBLIC_NATIVE | flags::ACC_FINAL, "notifyAll", "()V")
		.method_without_code(PUBLIC_NATIVE | flags::ACC_FINAL, "wait", "(J)V")
		.source_file("Object.java")
		.build()
}

fn class() -> Vec<u8> {
	ClassBuilder::new("java/lang/Class")
		.access(PUBLIC | flags::ACC_FINAL | flags::ACC_SUPER)
		.implements("java/io/Serializable")
		.method(flags::ACC_PRIVATE, "<init>", "()V", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokespecial, "java/lang/Object", "<init>", "()V")
				.op(insn::r#return);
		})
		.method_without_code(PUBLIC_NATIVE, "getName", "()Ljava/lang/String;")
		.method_without_code(PUBLIC_NATIVE, "isArray", "()Z")
		.method_without_code(PUBLIC_NATIVE, "isInterface", "()Z")
		.method_without_code(PUBLIC_NATIVE, "isPrimitive", "()Z")
		.method(PUBLIC, "toString", "()Ljava/lang/String;", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokevirtual, "java/lang/Class", "getName", "()Ljava/lang/String;")
				.op(insn::areturn);
		})
		.build()
}

fn string() -> Vec<u8> {
	ClassBuilder::new("java/lang/String")
		.access(PUBLIC | flags::ACC_FINAL | flags::ACC_SUPER)
		.implements("java/io/Serializable")
		.default_constructor("java/lang/Object")
		.method_without_code(PUBLIC_NATIVE, "length", "()I")
		.method_without_code(PUBLIC_NATIVE, "charAt", "(I)C")
		.method_without_code(PUBLIC_NATIVE, "equals", "(Ljava/lang/Object;)Z")
		.method_without_code(PUBLIC_NATIVE, "hashCode", "()I")
		.method_without_code(PUBLIC_NATIVE, "concat", "(Ljava/lang/String;)Ljava/lang/String;")
		.method_without_code(PUBLIC_NATIVE, "intern", "()Ljava/lang/String;")
		.method_without_code(PUBLIC_STATIC_NATIVE, "valueOf", "(I)Ljava/lang/String;")
		.method(PUBLIC, "toString", "()Ljava/lang/String;", |code| {
			code.op(insn::aload_0).op(insn::areturn);
		})
		.build()
}

fn system() -> Vec<u8> {
	ClassBuilder::new("java/lang/System")
		.access(PUBLIC | flags::ACC_FINAL | flags::ACC_SUPER)
		.method_without_code(flags::ACC_PRIVATE | flags::ACC_STATIC | flags::ACC_NATIVE, "registerNatives", "()V")
		.method(flags::ACC_STATIC, "<clinit>", "()V", |code| {
			code.invoke(insn::invokestatic, "java/lang/System", "registerNatives", "()V")
				.op(insn::r#return);
		})
		.method_without_code(PUBLIC_STATIC_NATIVE, "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V")
		.method_without_code(PUBLIC_STATIC_NATIVE, "identityHashCode", "(Ljava/lang/Object;)I")
		.method_without_code(PUBLIC_STATIC_NATIVE, "currentTimeMillis", "()J")
		.method_without_code(PUBLIC_STATIC_NATIVE, "nanoTime", "()J")
		.build()
}

fn float() -> Vec<u8> {
	ClassBuilder::new("java/lang/Float")
		.access(PUBLIC | flags::ACC_FINAL | flags::ACC_SUPER)
		.method_without_code(PUBLIC_STATIC_NATIVE, "floatToRawIntBits", "(F)I")
		.method_without_code(PUBLIC_STATIC_NATIVE, "intBitsToFloat", "(I)F")
		.build()
}

fn double() -> Vec<u8> {
	ClassBuilder::new("java/lang/Double")
		.access(PUBLIC | flags::ACC_FINAL | flags::ACC_SUPER)
		.method_without_code(PUBLIC_STATIC_NATIVE, "doubleToRawLongBits", "(D)J")
		.method_without_code(PUBLIC_STATIC_NATIVE, "longBitsToDouble", "(J)D")
		.build()
}

fn throwable() -> Vec<u8> {
	ClassBuilder::new("java/lang/Throwable")
		.implements("java/io/Serializable")
		.field(flags::ACC_PRIVATE, "detailMessage", "Ljava/lang/String;")
		.method(PUBLIC, "<init>", "()V", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokespecial, "java/lang/Object", "<init>", "()V")
				.op(insn::aload_0)
				.invoke(insn::invokevirtual, "java/lang/Throwable", "fillInStackTrace", "()Ljava/lang/Throwable;")
				.op(insn::pop)
				.op(insn::r#return);
		})
		.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokespecial, "java/lang/Object", "<init>", "()V")
				.op(insn::aload_0)
				.invoke(insn::invokevirtual, "java/lang/Throwable", "fillInStackTrace", "()Ljava/lang/Throwable;")
				.op(insn::pop)
				.op(insn::aload_0)
				.op(insn::aload_1)
				.field(insn::putfield, "java/lang/Throwable", "detailMessage", "Ljava/lang/String;")
				.op(insn::r#return);
		})
		.method(PUBLIC, "getMessage", "()Ljava/lang/String;", |code| {
			code.op(insn::aload_0)
				.field(insn::getfield, "java/lang/Throwable", "detailMessage", "Ljava/lang/String;")
				.op(insn::areturn);
		})
		.method_without_code(PUBLIC_NATIVE | flags::ACC_SYNCHRONIZED, "fillInStackTrace", "()Ljava/lang/Throwable;")
		.source_file("Throwable.java")
		.build()
}

fn throwable_subclass(name: &str, super_class: &str) -> Vec<u8> {
	ClassBuilder::new(name)
		.super_class(Some(super_class))
		.default_constructor(super_class)
		.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", |code| {
			code.op(insn::aload_0)
				.op(insn::aload_1)
				.invoke(insn::invokespecial, super_class, "<init>", "(Ljava/lang/String;)V")
				.op(insn::r#return);
		})
		.build()
}

fn exception_in_initializer_error() -> Vec<u8> {
	const NAME: &str = "java/lang/ExceptionInInitializerError";
	ClassBuilder::new(NAME)
		.super_class(Some("java/lang/LinkageError"))
		.field(flags::ACC_PRIVATE, "exception", "Ljava/lang/Throwable;")
		.default_constructor("java/lang/LinkageError")
		.method(PUBLIC, "<init>", "(Ljava/lang/Throwable;)V", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokespecial, "java/lang/LinkageError", "<init>", "()V")
				.op(insn::aload_0)
				.op(insn::aload_1)
				.field(insn::putfield, NAME, "exception", "Ljava/lang/Throwable;")
				.op(insn::r#return);
		})
		.method(PUBLIC, "getException", "()Ljava/lang/Throwable;", |code| {
			code.op(insn::aload_0)
				.field(insn::getfield, NAME, "exception", "Ljava/lang/Throwable;")
				.op(insn::areturn);
		})
		.build()
}

fn method_handle() -> Vec<u8> {
	let polymorphic = PUBLIC_NATIVE | flags::ACC_FINAL | flags::ACC_VARARGS;
	ClassBuilder::new("java/lang/invoke/MethodHandle")
		.access(PUBLIC | flags::ACC_ABSTRACT | flags::ACC_SUPER)
		.default_constructor("java/lang/Object")
		.method_without_code(polymorphic, "invokeExact", "([Ljava/lang/Object;)Ljava/lang/Object;")
		.method_without_code(polymorphic, "invoke", "([Ljava/lang/Object;)Ljava/lang/Object;")
		.build()
}

fn host() -> Vec<u8> {
	ClassBuilder::new("dukevm/Host")
		.access(PUBLIC | flags::ACC_FINAL | flags::ACC_SUPER)
		.method_without_code(PUBLIC_STATIC_NATIVE, "print", "(Ljava/lang/String;)V")
		.method_without_code(PUBLIC_STATIC_NATIVE, "println", "(Ljava/lang/String;)V")
		.method_without_code(PUBLIC_STATIC_NATIVE, "println", "(I)V")
		.build()
}

#[cfg(test)]
mod testing {
	use std::collections::HashSet;
	use crate::jdk::java_lang;

	#[test]
	fn names_are_unique_and_supers_present() {
		let classes = java_lang();
		let names: HashSet<_> = classes.iter().map(|(name, _)| name.as_str()).collect();
		assert_eq!(names.len(), classes.len());
		for &(_, super_class) in super::THROWABLES {
			assert!(names.contains(super_class), "{super_class} missing");
		}
	}
}
