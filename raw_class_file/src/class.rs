use crate::code::{Code, parameter_slots};
use crate::flags;
use crate::insn;
use crate::pool::Pool;

/// The value of a `ConstantValue` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	String(String),
}

/// Builds a class file.
///
/// The class starts out as `public` with the `ACC_SUPER` flag, extending `java/lang/Object`, in version `52.0`.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
	minor_version: u16,
	major_version: u16,
	access_flags: u16,
	this_class: u16,
	super_class: u16,
	interfaces: Vec<u16>,
	fields_count: u16,
	fields: Vec<u8>,
	methods_count: u16,
	methods: Vec<u8>,
	attributes_count: u16,
	attributes: Vec<u8>,
	pool: Pool,
}

fn write_attribute(pool: &mut Pool, out: &mut Vec<u8>, name: &str, body: &[u8]) {
	out.extend(pool.utf8(name).to_be_bytes());
	out.extend((body.len() as u32).to_be_bytes());
	out.extend(body);
}

impl ClassBuilder {
	pub fn new(name: &str) -> ClassBuilder {
		let mut pool = Pool::default();
		let this_class = pool.class(name);
		let super_class = pool.class("java/lang/Object");
		ClassBuilder {
			minor_version: 0,
			major_version: 52,
			access_flags: flags::ACC_PUBLIC | flags::ACC_SUPER,
			this_class,
			super_class,
			interfaces: Vec::new(),
			fields_count: 0,
			fields: Vec::new(),
			methods_count: 0,
			methods: Vec::new(),
			attributes_count: 0,
			attributes: Vec::new(),
			pool,
		}
	}

	/// Starts an interface, extending `java/lang/Object` as required.
	pub fn interface(name: &str) -> ClassBuilder {
		ClassBuilder::new(name).access(flags::ACC_PUBLIC | flags::ACC_INTERFACE | flags::ACC_ABSTRACT)
	}

	pub fn version(mut self, major: u16, minor: u16) -> Self {
		self.major_version = major;
		self.minor_version = minor;
		self
	}

	pub fn access(mut self, access_flags: u16) -> Self {
		self.access_flags = access_flags;
		self
	}

	/// Sets the super class. [`None`] is only valid for `java/lang/Object`.
	pub fn super_class(mut self, name: Option<&str>) -> Self {
		self.super_class = name.map_or(0, |name| self.pool.class(name));
		self
	}

	pub fn implements(mut self, name: &str) -> Self {
		let index = self.pool.class(name);
		self.interfaces.push(index);
		self
	}

	pub fn field(mut self, access_flags: u16, name: &str, descriptor: &str) -> Self {
		self.push_field(access_flags, name, descriptor, None);
		self
	}

	/// A field with a `ConstantValue` attribute.
	pub fn constant_field(mut self, access_flags: u16, name: &str, descriptor: &str, value: ConstantValue) -> Self {
		self.push_field(access_flags, name, descriptor, Some(value));
		self
	}

	fn push_field(&mut self, access_flags: u16, name: &str, descriptor: &str, value: Option<ConstantValue>) {
		self.fields_count += 1;
		let out = &mut self.fields;
		out.extend(access_flags.to_be_bytes());
		out.extend(self.pool.utf8(name).to_be_bytes());
		out.extend(self.pool.utf8(descriptor).to_be_bytes());
		if let Some(value) = value {
			let index = match value {
				ConstantValue::Int(value) => self.pool.integer(value),
				ConstantValue::Long(value) => self.pool.long(value),
				ConstantValue::Float(value) => self.pool.float(value),
				ConstantValue::Double(value) => self.pool.double(value),
				ConstantValue::String(value) => self.pool.string(&value),
			};
			out.extend(1u16.to_be_bytes());
			write_attribute(&mut self.pool, out, "ConstantValue", &index.to_be_bytes());
		} else {
			out.extend(0u16.to_be_bytes());
		}
	}

	/// A method with a `Code` attribute, built by `f`.
	///
	/// `max_locals` starts out as the slots the parameters (and `this`) take.
	pub fn method(mut self, access_flags: u16, name: &str, descriptor: &str, f: impl FnOnce(&mut Code)) -> Self {
		self.methods_count += 1;
		let out = &mut self.methods;
		out.extend(access_flags.to_be_bytes());
		out.extend(self.pool.utf8(name).to_be_bytes());
		out.extend(self.pool.utf8(descriptor).to_be_bytes());
		out.extend(1u16.to_be_bytes());

		let this_slot = if access_flags & flags::ACC_STATIC == 0 { 1 } else { 0 };
		let mut code = Code::new(&mut self.pool, parameter_slots(descriptor) as u16 + this_slot);
		f(&mut code);
		let code = code.finish();

		let mut body = Vec::new();
		body.extend(code.max_stack.to_be_bytes());
		body.extend(code.max_locals.to_be_bytes());
		body.extend((code.code.len() as u32).to_be_bytes());
		body.extend(&code.code);
		body.extend((code.exception_table.len() as u16).to_be_bytes());
		for entry in code.exception_table {
			for value in entry {
				body.extend(value.to_be_bytes());
			}
		}
		if code.line_numbers.is_empty() {
			body.extend(0u16.to_be_bytes());
		} else {
			body.extend(1u16.to_be_bytes());
			let mut table = (code.line_numbers.len() as u16).to_be_bytes().to_vec();
			for (start_pc, line) in code.line_numbers {
				table.extend(start_pc.to_be_bytes());
				table.extend(line.to_be_bytes());
			}
			write_attribute(&mut self.pool, &mut body, "LineNumberTable", &table);
		}

		write_attribute(&mut self.pool, out, "Code", &body);
		self
	}

	/// A method without a `Code` attribute, for `abstract` and `native` methods.
	pub fn method_without_code(mut self, access_flags: u16, name: &str, descriptor: &str) -> Self {
		self.methods_count += 1;
		let out = &mut self.methods;
		out.extend(access_flags.to_be_bytes());
		out.extend(self.pool.utf8(name).to_be_bytes());
		out.extend(self.pool.utf8(descriptor).to_be_bytes());
		out.extend(0u16.to_be_bytes());
		self
	}

	/// A public `<init>()V` calling the `<init>()V` of the super class.
	pub fn default_constructor(self, super_class: &str) -> Self {
		self.method(flags::ACC_PUBLIC, "<init>", "()V", |code| {
			code.op(insn::aload_0)
				.invoke(insn::invokespecial, super_class, "<init>", "()V")
				.op(insn::r#return);
		})
	}

	pub fn source_file(mut self, name: &str) -> Self {
		let index = self.pool.utf8(name);
		self.attribute("SourceFile", &index.to_be_bytes())
	}

	/// Adds a class attribute with arbitrary content.
	pub fn attribute(mut self, name: &str, body: &[u8]) -> Self {
		self.attributes_count += 1;
		write_attribute(&mut self.pool, &mut self.attributes, name, body);
		self
	}

	/// Access to the constant pool, for entries without a helper.
	pub fn pool(&mut self) -> &mut Pool {
		&mut self.pool
	}

	/// Converts the class file to binary representation.
	pub fn build(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend(0xCAFEBABEu32.to_be_bytes());
		out.extend(self.minor_version.to_be_bytes());
		out.extend(self.major_version.to_be_bytes());
		self.pool.write(&mut out);
		out.extend(self.access_flags.to_be_bytes());
		out.extend(self.this_class.to_be_bytes());
		out.extend(self.super_class.to_be_bytes());
		out.extend((self.interfaces.len() as u16).to_be_bytes());
		for interface in &self.interfaces {
			out.extend(interface.to_be_bytes());
		}
		out.extend(self.fields_count.to_be_bytes());
		out.extend(&self.fields);
		out.extend(self.methods_count.to_be_bytes());
		out.extend(&self.methods);
		out.extend(self.attributes_count.to_be_bytes());
		out.extend(&self.attributes);
		out
	}
}
