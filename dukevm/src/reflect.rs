//! A read-only view of a linked class.

use std::fmt::{Display, Formatter};
use duke::tree::class::ClassAccess;
use duke::tree::field::FieldAccess;
use duke::tree::method::MethodAccess;
use crate::class::Class;
use crate::error::VmResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
	pub name: String,
	pub modifiers: Vec<&'static str>,
	pub super_class: Option<String>,
	pub interfaces: Vec<String>,
	pub fields: Vec<FieldDescriptor>,
	pub methods: Vec<MethodDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
	pub name: String,
	pub descriptor: String,
	pub modifiers: Vec<&'static str>,
	/// The index in the instance field storage, or in the static storage of the class.
	pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
	pub name: String,
	pub descriptor: String,
	pub modifiers: Vec<&'static str>,
}

fn flags<const N: usize>(flags: [(bool, &'static str); N]) -> Vec<&'static str> {
	flags.into_iter().filter(|(set, _)| *set).map(|(_, name)| name).collect()
}

fn class_modifiers(access: ClassAccess) -> Vec<&'static str> {
	flags([
		(access.is_public, "public"),
		(access.is_abstract && !access.is_interface, "abstract"),
		(access.is_final, "final"),
		(access.is_interface, "interface"),
	])
}

fn field_modifiers(access: FieldAccess) -> Vec<&'static str> {
	flags([
		(access.is_public, "public"),
		(access.is_private, "private"),
		(access.is_protected, "protected"),
		(access.is_static, "static"),
		(access.is_final, "final"),
		(access.is_volatile, "volatile"),
		(access.is_transient, "transient"),
	])
}

fn method_modifiers(access: MethodAccess) -> Vec<&'static str> {
	flags([
		(access.is_public, "public"),
		(access.is_private, "private"),
		(access.is_protected, "protected"),
		(access.is_abstract, "abstract"),
		(access.is_static, "static"),
		(access.is_final, "final"),
		(access.is_synchronized, "synchronized"),
		(access.is_native, "native"),
	])
}

/// Projects a linked class onto its name, modifiers, supertypes and declared members.
pub fn describe(class: &Class) -> VmResult<ClassDescriptor> {
	let links = class.links()?;
	Ok(ClassDescriptor {
		name: class.java_name(),
		modifiers: class_modifiers(class.access()),
		super_class: links.super_class().map(|super_class| super_class.java_name()),
		interfaces: links.interfaces().iter().map(|interface| interface.java_name()).collect(),
		fields: links.fields().iter()
			.map(|field| FieldDescriptor {
				name: field.name().to_owned(),
				descriptor: field.descriptor().to_owned(),
				modifiers: field_modifiers(field.access()),
				slot: field.slot(),
			})
			.collect(),
		methods: links.methods().iter()
			.map(|method| MethodDescriptor {
				name: method.name().to_owned(),
				descriptor: method.descriptor().to_owned(),
				modifiers: method_modifiers(method.access()),
			})
			.collect(),
	})
}

fn write_modifiers(f: &mut Formatter<'_>, modifiers: &[&str]) -> std::fmt::Result {
	for modifier in modifiers {
		write!(f, "{modifier} ")?;
	}
	Ok(())
}

impl Display for ClassDescriptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write_modifiers(f, &self.modifiers)?;
		if !self.modifiers.contains(&"interface") {
			f.write_str("class ")?;
		}
		f.write_str(&self.name)?;
		if let Some(super_class) = &self.super_class {
			write!(f, " extends {super_class}")?;
		}
		if !self.interfaces.is_empty() {
			let keyword = if self.modifiers.contains(&"interface") { "extends" } else { "implements" };
			write!(f, " {keyword} {}", self.interfaces.join(", "))?;
		}
		writeln!(f, " {{")?;
		for field in &self.fields {
			f.write_str("\t")?;
			write_modifiers(f, &field.modifiers)?;
			writeln!(f, "{} {}; // slot {}", field.descriptor, field.name, field.slot)?;
		}
		for method in &self.methods {
			f.write_str("\t")?;
			write_modifiers(f, &method.modifiers)?;
			writeln!(f, "{}{};", method.name, method.descriptor)?;
		}
		f.write_str("}")
	}
}
