use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::tree::descriptor::{ArrayType, MethodDescriptor, Type};

#[test]
fn valid_field_descriptors() -> Result<()> {
	let valid_field_descriptors = [
		"B",
		"C",
		"D",
		"F",
		"I",
		"J",
		"Ljava/lang/Object;",
		"Lorg/example/MyClassName;",
		"S",
		"Z",
		"[[[D",
	];

	for i in valid_field_descriptors {
		let t = Type::parse(i)?;
		assert_eq!(t.to_string(), i, "{i:?} must display as itself");
	}

	Ok(())
}

#[test]
fn invalid_field_descriptors() -> Result<()> {
	let invalid_field_descriptors = [
		"",
		"V",
		"(",
		")",
		"()",
		"[V",
		"L;",
		"()V",
		"foo",
		"(D)I",
		"L;DV",
		"Ljava/lang/Object",
		"La.b;",
		"II",
	];

	for i in invalid_field_descriptors {
		assert!(Type::parse(i).is_err(), "{i:?} is an invalid field descriptor");
	}

	Ok(())
}

#[test]
fn array_dimensions() -> Result<()> {
	let max = format!("{}I", "[".repeat(255));
	assert_eq!(Type::parse(&max)?, Type::Array(255, ArrayType::I));

	let too_many = format!("{}I", "[".repeat(256));
	assert!(Type::parse(&too_many).is_err());
	Ok(())
}

#[test]
fn valid_method_descriptors() -> Result<()> {
	let valid_method_descriptors = [
		"()V",
		"(I)V",
		"(Ljava/lang/String;)Ljava/lang/Object;",
		"([Ljava/lang/String;)V",
		"(IJDF[[Z)[J",
	];

	for i in valid_method_descriptors {
		let descriptor = MethodDescriptor::parse(i)?;
		assert_eq!(descriptor.to_string(), i, "{i:?} must display as itself");
	}

	Ok(())
}

#[test]
fn invalid_method_descriptors() -> Result<()> {
	let invalid_method_descriptors = [
		"",
		"V",
		"I",
		"(",
		")V",
		"()",
		"(V)V",
		"()VV",
		"(I",
		"(L;)V",
		"()[V",
	];

	for i in invalid_method_descriptors {
		assert!(MethodDescriptor::parse(i).is_err(), "{i:?} is an invalid method descriptor");
	}

	Ok(())
}

#[test]
fn parameter_slots() -> Result<()> {
	assert_eq!(MethodDescriptor::parse("()V")?.parameter_slots(), 0);
	assert_eq!(MethodDescriptor::parse("(JD)V")?.parameter_slots(), 4);
	assert_eq!(MethodDescriptor::parse("([J[D)V")?.parameter_slots(), 2);

	let descriptor = MethodDescriptor::parse("(ILjava/lang/String;)[I")?;
	assert_eq!(descriptor.parameters, vec![Type::I, Type::Object("java/lang/String".to_owned())]);
	assert_eq!(descriptor.return_type, Some(Type::Array(1, ArrayType::I)));
	Ok(())
}
