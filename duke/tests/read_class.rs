use anyhow::{anyhow, Result};
use pretty_assertions::assert_eq;
use duke::read_class;
use duke::tree::annotation::{parse_annotations, Annotation, ElementValue};
use duke::tree::code::ExceptionHandler;
use duke::tree::field::ConstantValue;
use duke::tree::instruction::{decode, mnemonic, Instruction};
use duke::tree::version::Version;
use raw_class_file::{flags, insn, ClassBuilder};

fn example() -> ClassBuilder {
	ClassBuilder::new("org/example/Main")
		.implements("java/lang/Runnable")
		.source_file("Main.java")
		.constant_field(flags::ACC_PUBLIC | flags::ACC_STATIC | flags::ACC_FINAL, "LIMIT", "J", raw_class_file::ConstantValue::Long(1 << 40))
		.field(flags::ACC_PRIVATE, "count", "I")
		.default_constructor("java/lang/Object")
		.method(flags::ACC_PUBLIC, "run", "()V", |code| {
			let (start, end, handler) = (code.label(), code.label(), code.label());
			code.line(10)
				.place(start)
				.op(insn::aload_0)
				.invoke(insn::invokevirtual, "org/example/Main", "step", "()V")
				.place(end)
				.line(11)
				.op(insn::r#return)
				.place(handler)
				.op(insn::pop)
				.op(insn::r#return)
				.try_catch(start, end, handler, Some("java/lang/RuntimeException"))
				.try_catch(start, end, handler, None);
		})
		.method_without_code(flags::ACC_PRIVATE | flags::ACC_NATIVE, "step", "()V")
}

#[test]
fn members() -> Result<()> {
	let class = read_class(&example().build())?;

	assert_eq!(class.name, "org/example/Main");
	assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
	assert_eq!(class.interfaces, vec!["java/lang/Runnable"]);
	assert_eq!(class.version, Version::V1_8);
	assert_eq!(class.package(), "org/example");
	assert_eq!(class.source_file.as_deref(), Some("Main.java"));
	assert!(class.access.is_public);
	assert!(!class.is_interface());

	let limit = class.field("LIMIT", "J").ok_or_else(|| anyhow!("no field LIMIT"))?;
	assert!(limit.access.is_static && limit.access.is_final);
	assert_eq!(limit.constant_value, Some(ConstantValue::Long(1 << 40)));
	let count = class.field("count", "I").ok_or_else(|| anyhow!("no field count"))?;
	assert!(count.access.is_private);
	assert_eq!(count.constant_value, None);

	let step = class.method("step", "()V").ok_or_else(|| anyhow!("no method step"))?;
	assert!(step.access.is_native);
	assert!(step.code.is_none());

	let run = class.method("run", "()V").ok_or_else(|| anyhow!("no method run"))?;
	let code = run.code.as_ref().ok_or_else(|| anyhow!("run has no code"))?;
	assert_eq!(code.code.len(), 7);
	assert_eq!(code.exception_table, vec![
		ExceptionHandler { start_pc: 0, end_pc: 4, handler_pc: 5, catch_type: Some("java/lang/RuntimeException".to_owned()) },
		ExceptionHandler { start_pc: 0, end_pc: 4, handler_pc: 5, catch_type: None },
	]);
	assert_eq!(code.line_number(0), Some(10));
	assert_eq!(code.line_number(3), Some(10));
	assert_eq!(code.line_number(4), Some(11));
	assert_eq!(code.line_number(6), Some(11));
	Ok(())
}

#[test]
fn disassembly() -> Result<()> {
	let class = read_class(&example().build())?;
	let run = class.method("run", "()V").ok_or_else(|| anyhow!("no method run"))?;
	let code = run.code.as_ref().ok_or_else(|| anyhow!("run has no code"))?;

	let instructions = decode(&code.code)?;
	let names: Vec<_> = instructions.iter()
		.map(|(pc, instruction)| {
			let op = match instruction {
				Instruction::Simple(op) => *op,
				Instruction::Pool { opcode, .. } => *opcode,
				other => panic!("unexpected instruction {other:?}"),
			};
			(*pc, mnemonic(op))
		})
		.collect();
	assert_eq!(names, vec![(0, "aload_0"), (1, "invokevirtual"), (4, "return"), (5, "pop"), (6, "return")]);
	Ok(())
}

#[test]
fn pool_dump_is_stable() -> Result<()> {
	let bytes = example().build();
	let a = read_class(&bytes)?;
	let b = read_class(&bytes)?;

	let dump = a.pool.to_string();
	assert_eq!(dump, b.pool.to_string());
	assert!(dump.contains("MethodRef: org/example/Main.step:()V"), "{dump}");
	assert!(dump.contains("Class: java/lang/Runnable"), "{dump}");
	assert!(dump.contains("Long: 1099511627776"), "{dump}");

	// resolving entries doesn't change the dump
	for index in 1..a.pool.len() as u16 {
		let _ = a.pool.resolve(index);
	}
	assert_eq!(a.pool.to_string(), dump);
	Ok(())
}

#[test]
fn malformed_class_files() -> Result<()> {
	let bytes = example().build();

	let mut wrong_magic = bytes.clone();
	wrong_magic[0] = 0xcb;
	let e = read_class(&wrong_magic).err().ok_or_else(|| anyhow!("wrong magic was accepted"))?;
	assert!(format!("{e:#}").contains("wrong magic"), "{e:#}");

	let too_old = example().version(44, 0).build();
	assert!(read_class(&too_old).is_err());
	let too_new = example().version(200, 0).build();
	assert!(read_class(&too_new).is_err());

	for length in [0, 4, 10, bytes.len() / 2, bytes.len() - 1] {
		assert!(read_class(&bytes[..length]).is_err(), "truncated to {length} bytes was accepted");
	}

	let mut trailing = bytes.clone();
	trailing.push(0);
	let e = read_class(&trailing).err().ok_or_else(|| anyhow!("trailing data was accepted"))?;
	assert!(format!("{e:#}").contains("trailing"), "{e:#}");

	let mut cursor = std::io::Cursor::new(trailing);
	assert_eq!(duke::read_class_from(&mut cursor)?.name, "org/example/Main");

	let duplicate = ClassBuilder::new("Duplicate")
		.source_file("A.java")
		.source_file("B.java")
		.build();
	assert!(read_class(&duplicate).is_err());
	Ok(())
}

#[test]
fn annotations() -> Result<()> {
	let mut builder = ClassBuilder::new("Annotated");
	let pool = builder.pool();
	let mut body = Vec::new();
	body.extend(1u16.to_be_bytes());
	body.extend(pool.utf8("Lorg/example/Marker;").to_be_bytes());
	body.extend(2u16.to_be_bytes());
	body.extend(pool.utf8("value").to_be_bytes());
	body.push(b'I');
	body.extend(pool.integer(5).to_be_bytes());
	body.extend(pool.utf8("names").to_be_bytes());
	body.push(b'[');
	body.extend(2u16.to_be_bytes());
	body.push(b's');
	body.extend(pool.utf8("a").to_be_bytes());
	body.push(b'e');
	body.extend(pool.utf8("Lorg/example/Color;").to_be_bytes());
	body.extend(pool.utf8("RED").to_be_bytes());
	let class = read_class(&builder.attribute("RuntimeVisibleAnnotations", &body).build())?;

	let raw = class.annotations.runtime_visible.as_deref().ok_or_else(|| anyhow!("annotations weren't kept"))?;
	assert_eq!(raw, body.as_slice());
	assert_eq!(parse_annotations(raw, &class.pool)?, vec![
		Annotation {
			annotation_type: "Lorg/example/Marker;".to_owned(),
			element_values: vec![
				("value".to_owned(), ElementValue::Int(5)),
				("names".to_owned(), ElementValue::Array(vec![
					ElementValue::String("a".into()),
					ElementValue::Enum { type_name: "Lorg/example/Color;".to_owned(), const_name: "RED".to_owned() },
				])),
			],
		},
	]);

	assert!(parse_annotations(&body[..body.len() - 1], &class.pool).is_err());
	Ok(())
}
