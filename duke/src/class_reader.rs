use anyhow::{anyhow, bail, Context, Result};
use crate::class_constants::attribute;
use crate::ClassRead;
use crate::tree::attribute::{RawAnnotations, RawAttribute};
use crate::tree::class::{BootstrapMethod, ClassAccess, ClassFile, EnclosingMethod, InnerClass, RecordComponent};
use crate::tree::code::{Code, ExceptionHandler, LineNumber, LocalVariable};
use crate::tree::field::Field;
use crate::tree::method::{Method, MethodParameter};
use crate::tree::pool::ConstantPool;
use crate::tree::version::Version;

const MAGIC: u32 = 0xCAFEBABE;

/// The newest class file version we know of.
const MAX_VERSION: Version = Version::new(67, 0);

/// Reads the attributes of a class, field, method, record component or code.
///
/// `handle` gets called with the name and length of each attribute, and returns `true` if it read the attribute.
/// Attributes it didn't read are kept as [`RawAttribute`]. Read attributes must be exactly as long as declared.
fn read_attributes<R: ClassRead>(
	reader: &mut R,
	pool: &ConstantPool,
	mut handle: impl FnMut(&mut R, &str, u32) -> Result<bool>,
) -> Result<Vec<RawAttribute>> {
	let mut unknown = Vec::new();

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let name = pool.get_name(reader.read_u16()?)
			.context("while reading attribute name")?;
		let length = reader.read_u32()?;

		let start = reader.marker()?;
		let handled = handle(reader, &name, length)
			.with_context(|| anyhow!("while reading attribute {name:?}"))?;

		if handled {
			let read = reader.marker()? - start;
			if read != length as u64 {
				bail!("attribute {name:?} declared a length of {length} bytes, but {read} bytes were read");
			}
		} else {
			let info = reader.read_u8_vec(length as usize)
				.with_context(|| anyhow!("while reading unknown attribute {name:?}"))?;
			unknown.push(RawAttribute { name, info });
		}
	}

	Ok(unknown)
}

/// Reads the attribute body as raw bytes into `slot`, failing if there already is such an attribute.
fn read_raw_into(reader: &mut impl ClassRead, slot: &mut Option<Vec<u8>>, name: &str, length: u32) -> Result<()> {
	if slot.is_some() {
		bail!("duplicate attribute {name:?}");
	}
	*slot = Some(reader.read_u8_vec(length as usize)?);
	Ok(())
}

/// Handles the annotation attributes that classes, fields, methods and record components share.
fn read_annotation_attribute(reader: &mut impl ClassRead, annotations: &mut RawAnnotations, name: &str, length: u32) -> Result<bool> {
	let slot = match name {
		attribute::RUNTIME_VISIBLE_ANNOTATIONS => &mut annotations.runtime_visible,
		attribute::RUNTIME_INVISIBLE_ANNOTATIONS => &mut annotations.runtime_invisible,
		attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => &mut annotations.runtime_visible_type,
		attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => &mut annotations.runtime_invisible_type,
		_ => return Ok(false),
	};
	read_raw_into(reader, slot, name, length)?;
	Ok(true)
}

fn read_class_list(reader: &mut impl ClassRead, pool: &ConstantPool) -> Result<Vec<String>> {
	reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| pool.get_class(r.read_u16()?)
	)
}

/// Reads a class file from a reader.
pub(crate) fn read(reader: &mut impl ClassRead) -> Result<ClassFile> {
	let magic = reader.read_u32()?;
	if magic != MAGIC {
		bail!("wrong magic: got {magic:#x}, expected 0xCAFEBABE");
	}

	let minor = reader.read_u16()?;
	let major = reader.read_u16()?;
	let version = Version::new(major, minor);

	if version > MAX_VERSION || version < Version::V1_1 {
		bail!("unsupported class file version: {version}");
	}

	let pool = ConstantPool::read(reader, version)
		.context("while reading the constant pool")?;

	let access: ClassAccess = reader.read_u16()?.into();
	let this_class = reader.read_u16()?;
	let name = pool.get_class(this_class)
		.context("while reading `this_class`")?;
	let super_class = pool.get_optional(reader.read_u16()?, ConstantPool::get_class)
		.context("while reading `super_class`")?;
	let interfaces = read_class_list(reader, &pool)
		.context("while reading the interfaces")?;

	let fields = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| read_field(r, &pool)
	).with_context(|| anyhow!("while reading fields of class {name:?}"))?;

	let methods = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| read_method(r, &pool)
	).with_context(|| anyhow!("while reading methods of class {name:?}"))?;

	let mut has_deprecated_attribute = false;
	let mut has_synthetic_attribute = false;
	let mut source_file = None;
	let mut inner_classes = None;
	let mut enclosing_method = None;
	let mut signature = None;
	let mut bootstrap_methods = None;
	let mut nest_host = None;
	let mut nest_members = None;
	let mut permitted_subclasses = None;
	let mut record_components = None;
	let mut annotations = RawAnnotations::default();

	let attributes = read_attributes(reader, &pool, |r, attribute_name, length| {
		match attribute_name {
			attribute::DEPRECATED => has_deprecated_attribute = true,
			attribute::SYNTHETIC => has_synthetic_attribute = true,
			attribute::SOURCE_FILE => source_file = Some(pool.get_name(r.read_u16()?)?),
			attribute::SIGNATURE => signature = Some(pool.get_name(r.read_u16()?)?),
			attribute::INNER_CLASSES => {
				inner_classes = Some(r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(InnerClass {
						inner_class: pool.get_class(r.read_u16()?)?,
						outer_class: pool.get_optional(r.read_u16()?, ConstantPool::get_class)?,
						inner_name: pool.get_optional(r.read_u16()?, ConstantPool::get_name)?,
						flags: r.read_u16()?,
					})
				)?);
			},
			attribute::ENCLOSING_METHOD => {
				let class = pool.get_class(r.read_u16()?)?;
				let method = pool.get_optional(r.read_u16()?, ConstantPool::get_name_and_type)?
					.map(|nat| (nat.name, nat.descriptor));
				enclosing_method = Some(EnclosingMethod { class, method });
			},
			attribute::BOOTSTRAP_METHODS => {
				bootstrap_methods = Some(r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| {
						let handle = pool.get_method_handle(r.read_u16()?)?.clone();
						let arguments = r.read_vec(
							|r| r.read_u16_as_usize(),
							|r| r.read_u16()
						)?;
						Ok(BootstrapMethod { handle, arguments })
					}
				)?);
			},
			attribute::NEST_HOST => nest_host = Some(pool.get_class(r.read_u16()?)?),
			attribute::NEST_MEMBERS => nest_members = Some(read_class_list(r, &pool)?),
			attribute::PERMITTED_SUBCLASSES => permitted_subclasses = Some(read_class_list(r, &pool)?),
			attribute::RECORD => {
				record_components = Some(r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| read_record_component(r, &pool)
				)?);
			},
			name => return read_annotation_attribute(r, &mut annotations, name, length),
		}
		Ok(true)
	}).with_context(|| anyhow!("while reading attributes of class {name:?}"))?;

	Ok(ClassFile {
		version,
		access,
		this_class,
		name,
		super_class,
		interfaces,
		fields,
		methods,
		pool,
		has_deprecated_attribute,
		has_synthetic_attribute,
		source_file,
		inner_classes,
		enclosing_method,
		signature,
		bootstrap_methods,
		nest_host,
		nest_members,
		permitted_subclasses,
		record_components,
		annotations,
		attributes,
	})
}

fn read_record_component(reader: &mut impl ClassRead, pool: &ConstantPool) -> Result<RecordComponent> {
	let name = pool.get_name(reader.read_u16()?)?;
	let descriptor = pool.get_name(reader.read_u16()?)?;

	let mut signature = None;
	let mut annotations = RawAnnotations::default();

	let attributes = read_attributes(reader, pool, |r, attribute_name, length| {
		match attribute_name {
			attribute::SIGNATURE => signature = Some(pool.get_name(r.read_u16()?)?),
			name => return read_annotation_attribute(r, &mut annotations, name, length),
		}
		Ok(true)
	}).with_context(|| anyhow!("while reading record component {name:?}"))?;

	Ok(RecordComponent { name, descriptor, signature, annotations, attributes })
}

fn read_field(reader: &mut impl ClassRead, pool: &ConstantPool) -> Result<Field> {
	let access = reader.read_u16()?.into();
	let name = pool.get_name(reader.read_u16()?)?;
	let descriptor = pool.get_name(reader.read_u16()?)?;

	let mut field = Field::new(access, name, descriptor);

	field.attributes = read_attributes(reader, pool, |r, attribute_name, length| {
		match attribute_name {
			attribute::DEPRECATED => field.has_deprecated_attribute = true,
			attribute::SYNTHETIC => field.has_synthetic_attribute = true,
			attribute::CONSTANT_VALUE => {
				if field.constant_value.is_some() {
					bail!("duplicate `ConstantValue` attribute");
				}
				field.constant_value = Some(pool.get_constant_value(r.read_u16()?)?);
			},
			attribute::SIGNATURE => field.signature = Some(pool.get_name(r.read_u16()?)?),
			name => return read_annotation_attribute(r, &mut field.annotations, name, length),
		}
		Ok(true)
	}).with_context(|| anyhow!("while reading field {:?}", field.name))?;

	Ok(field)
}

fn read_method(reader: &mut impl ClassRead, pool: &ConstantPool) -> Result<Method> {
	let access = reader.read_u16()?.into();
	let name = pool.get_name(reader.read_u16()?)?;
	let descriptor = pool.get_name(reader.read_u16()?)?;

	let mut method = Method::new(access, name, descriptor);

	method.attributes = read_attributes(reader, pool, |r, attribute_name, length| {
		match attribute_name {
			attribute::DEPRECATED => method.has_deprecated_attribute = true,
			attribute::SYNTHETIC => method.has_synthetic_attribute = true,
			attribute::CODE => {
				if method.code.is_some() {
					bail!("duplicate `Code` attribute");
				}
				method.code = Some(read_code(r, pool)?);
			},
			attribute::EXCEPTIONS => method.exceptions = Some(read_class_list(r, pool)?),
			attribute::SIGNATURE => method.signature = Some(pool.get_name(r.read_u16()?)?),
			attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS =>
				read_raw_into(r, &mut method.runtime_visible_parameter_annotations, attribute_name, length)?,
			attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS =>
				read_raw_into(r, &mut method.runtime_invisible_parameter_annotations, attribute_name, length)?,
			attribute::ANNOTATION_DEFAULT =>
				read_raw_into(r, &mut method.annotation_default, attribute_name, length)?,
			attribute::METHOD_PARAMETERS => {
				method.method_parameters = Some(r.read_vec(
					|r| r.read_u8_as_usize(),
					|r| Ok(MethodParameter {
						name: pool.get_optional(r.read_u16()?, ConstantPool::get_name)?,
						flags: r.read_u16()?,
					})
				)?);
			},
			name => return read_annotation_attribute(r, &mut method.annotations, name, length),
		}
		Ok(true)
	}).with_context(|| anyhow!("while reading method {:?}{:?}", method.name, method.descriptor))?;

	Ok(method)
}

fn read_local_variables(reader: &mut impl ClassRead, pool: &ConstantPool, code_length: u16) -> Result<Vec<LocalVariable>> {
	reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| {
			let local_variable = LocalVariable {
				start_pc: r.read_u16()?,
				length: r.read_u16()?,
				name: pool.get_name(r.read_u16()?)?,
				descriptor: pool.get_name(r.read_u16()?)?,
				index: r.read_u16()?,
			};
			if local_variable.start_pc as u32 + local_variable.length as u32 > code_length as u32 {
				bail!("local variable {local_variable:?} reaches beyond the code length {code_length}");
			}
			Ok(local_variable)
		}
	)
}

fn read_code(reader: &mut impl ClassRead, pool: &ConstantPool) -> Result<Code> {
	let max_stack = reader.read_u16()?;
	let max_locals = reader.read_u16()?;

	let code_length = reader.read_u32()?;

	// This limit here is defined by the Java Virtual Machine Specification, and this allows us to store offsets in an u16.
	if code_length == 0 || code_length > u16::MAX as u32 {
		bail!("`code_length` must be greater than zero and less than 65536, got {code_length:?}");
	}
	let code_length = code_length as u16; // can't fail, see checks above

	let code = reader.read_u8_vec(code_length as usize)?;

	let exception_table = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| {
			let handler = ExceptionHandler {
				start_pc: r.read_u16()?,
				end_pc: r.read_u16()?,
				handler_pc: r.read_u16()?,
				catch_type: pool.get_optional(r.read_u16()?, ConstantPool::get_class)?,
			};
			if handler.start_pc >= handler.end_pc || handler.end_pc > code_length || handler.handler_pc >= code_length {
				bail!("exception handler {handler:?} out of bounds for code length {code_length}");
			}
			Ok(handler)
		}
	).context("while reading the exception table")?;

	let mut code = Code {
		max_stack,
		max_locals,
		code,
		exception_table,
		line_numbers: None,
		local_variables: None,
		local_variable_types: None,
		stack_map_table: None,
		runtime_visible_type_annotations: None,
		runtime_invisible_type_annotations: None,
		attributes: Vec::new(),
	};

	code.attributes = read_attributes(reader, pool, |r, attribute_name, length| {
		match attribute_name {
			attribute::LINE_NUMBER_TABLE => {
				let line_numbers = r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(LineNumber {
						start_pc: r.read_u16()?,
						line_number: r.read_u16()?,
					})
				)?;
				// there may be multiple of these, they are simply concatenated
				code.line_numbers.get_or_insert_with(Vec::new).extend(line_numbers);
			},
			attribute::LOCAL_VARIABLE_TABLE => {
				let local_variables = read_local_variables(r, pool, code_length)?;
				code.local_variables.get_or_insert_with(Vec::new).extend(local_variables);
			},
			attribute::LOCAL_VARIABLE_TYPE_TABLE => {
				let local_variable_types = read_local_variables(r, pool, code_length)?;
				code.local_variable_types.get_or_insert_with(Vec::new).extend(local_variable_types);
			},
			attribute::STACK_MAP_TABLE =>
				read_raw_into(r, &mut code.stack_map_table, attribute_name, length)?,
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS =>
				read_raw_into(r, &mut code.runtime_visible_type_annotations, attribute_name, length)?,
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS =>
				read_raw_into(r, &mut code.runtime_invisible_type_annotations, attribute_name, length)?,
			_ => return Ok(false),
		}
		Ok(true)
	}).context("while reading attributes of code")?;

	Ok(code)
}
