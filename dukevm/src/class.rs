//! The runtime representation of classes and their fields.
//!
//! A [`Class`] is created in the *allocated* state by the loader and then linked exactly once, which computes its
//! [`Links`]: the supertypes, the field layout and the bound methods. After that, initialization moves it through
//! *being initialized* to either *fully initialized* or *erroneous*.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use anyhow::{anyhow, bail, Context, Result};
use duke::tree::class::{ClassAccess, ClassFile};
use duke::tree::descriptor::Type;
use duke::tree::field::{ConstantValue, FieldAccess};
use duke::tree::version::Version;
use parking_lot::{Condvar, Mutex, MutexGuard};
use crate::error::{fatal, VmResult};
use crate::method::Method;
use crate::object::ObjectRef;
use crate::runtime_pool::RuntimeEntry;
use crate::thread::ThreadId;
use crate::value::Value;

static NEXT_CLASS_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies a class for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

impl ClassId {
	fn next() -> ClassId {
		ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
	}
}

pub enum ClassKind {
	/// A primitive type, like `int`.
	Primitive(Type),
	/// An array type, with the class of its components and the type of its elements.
	Array {
		component: Arc<Class>,
		element: Type,
	},
	/// A class or interface read from a class file.
	Object(ClassFile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
	Allocated,
	Loaded,
	BeingInitialized(ThreadId),
	FullyInitialized,
	/// The static initializer failed. This is terminal.
	Erroneous,
}

/// Everything computed when linking a class.
#[derive(Debug)]
pub struct Links {
	super_class: Option<Arc<Class>>,
	interfaces: Vec<Arc<Class>>,
	all_interfaces: Vec<Arc<Class>>,
	primary: Vec<ClassId>,
	secondary: HashSet<ClassId>,
	instance_field_size: usize,
	static_field_size: usize,
	fields: Vec<Arc<Field>>,
	methods: Vec<Arc<Method>>,
	instance_template: Vec<Value>,
}

impl Links {
	fn empty(primary: Vec<ClassId>) -> Links {
		Links {
			super_class: None,
			interfaces: Vec::new(),
			all_interfaces: Vec::new(),
			primary,
			secondary: HashSet::new(),
			instance_field_size: 0,
			static_field_size: 0,
			fields: Vec::new(),
			methods: Vec::new(),
			instance_template: Vec::new(),
		}
	}

	pub fn super_class(&self) -> Option<&Arc<Class>> {
		self.super_class.as_ref()
	}

	/// The directly implemented interfaces, or for an interface the directly extended ones.
	pub fn interfaces(&self) -> &[Arc<Class>] {
		&self.interfaces
	}

	/// All superinterfaces, transitively, including the ones of superclasses. Each appears once.
	pub fn all_interfaces(&self) -> &[Arc<Class>] {
		&self.all_interfaces
	}

	/// The chain of non-interface supertypes, from `java/lang/Object` down to this class.
	///
	/// Interfaces don't appear in their own chain.
	pub fn primary_supertypes(&self) -> &[ClassId] {
		&self.primary
	}

	/// The ids of all superinterfaces.
	pub fn secondary_supertypes(&self) -> &HashSet<ClassId> {
		&self.secondary
	}

	/// The number of instance field slots, including the ones of all superclasses.
	pub fn instance_field_size(&self) -> usize {
		self.instance_field_size
	}

	/// The number of static fields declared by this class and its superclasses.
	///
	/// Only the ones declared by this class are stored in it.
	pub fn static_field_size(&self) -> usize {
		self.static_field_size
	}

	/// The fields this class declares.
	pub fn fields(&self) -> &[Arc<Field>] {
		&self.fields
	}

	/// The methods this class declares.
	pub fn methods(&self) -> &[Arc<Method>] {
		&self.methods
	}

	pub(crate) fn instance_template(&self) -> &[Value] {
		&self.instance_template
	}
}

pub struct Class {
	id: ClassId,
	name: String,
	kind: ClassKind,
	links: OnceLock<Links>,
	/// The id plus one of the last class this one was found to be assignable to, `0` if none.
	pub(crate) last_assignable: AtomicUsize,
	init: Mutex<InitState>,
	init_changed: Condvar,
	statics: Mutex<Vec<Value>>,
	mirror: OnceLock<ObjectRef>,
	pub(crate) method_cache: Mutex<HashMap<(String, String), Arc<Method>>>,
	pub(crate) field_cache: Mutex<HashMap<(String, String), Arc<Field>>>,
	pub(crate) pool: Vec<OnceLock<RuntimeEntry>>,
}

impl Class {
	fn new(name: String, kind: ClassKind, init: InitState) -> Class {
		let pool_size = match &kind {
			ClassKind::Object(file) => file.pool.len(),
			_ => 0,
		};
		Class {
			id: ClassId::next(),
			name,
			kind,
			links: OnceLock::new(),
			last_assignable: AtomicUsize::new(0),
			init: Mutex::new(init),
			init_changed: Condvar::new(),
			statics: Mutex::new(Vec::new()),
			mirror: OnceLock::new(),
			method_cache: Mutex::new(HashMap::new()),
			field_cache: Mutex::new(HashMap::new()),
			pool: (0..pool_size).map(|_| OnceLock::new()).collect(),
		}
	}

	/// Creates the class of a primitive type. These are linked and initialized right away.
	pub(crate) fn new_primitive(ty: Type) -> Result<Arc<Class>> {
		let name = primitive_name(&ty)
			.with_context(|| anyhow!("{ty} is not a primitive type"))?;
		let class = Class::new(name.to_owned(), ClassKind::Primitive(ty), InitState::FullyInitialized);
		let links = Links::empty(vec![class.id]);
		let _ = class.links.set(links);
		Ok(Arc::new(class))
	}

	/// Creates an array class. The super class is `object`, the interfaces are `array_interfaces`.
	///
	/// Array classes are linked and initialized right away.
	pub(crate) fn new_array(component: Arc<Class>, object: &Arc<Class>, array_interfaces: Vec<Arc<Class>>) -> Result<Arc<Class>> {
		let name = format!("[{}", component.descriptor());
		let element = Type::parse(&name)?.component()
			.with_context(|| anyhow!("{name} is no array descriptor"))?;

		let class = Class::new(name, ClassKind::Array { component, element }, InitState::FullyInitialized);

		let mut links = Links::empty(vec![object.id, class.id]);
		links.super_class = Some(object.clone());
		links.secondary = array_interfaces.iter().map(|interface| interface.id).collect();
		links.all_interfaces = array_interfaces.clone();
		links.interfaces = array_interfaces;
		let _ = class.links.set(links);

		Ok(Arc::new(class))
	}

	/// Creates a class for a class file. It must be linked with [`Class::link`] before being used.
	pub(crate) fn new_object(file: ClassFile) -> Arc<Class> {
		let name = file.name.clone();
		Arc::new(Class::new(name, ClassKind::Object(file), InitState::Allocated))
	}

	/// Computes the supertypes, the field layout, and binds the methods.
	pub(crate) fn link(self: &Arc<Class>, super_class: Option<Arc<Class>>, interfaces: Vec<Arc<Class>>) -> Result<()> {
		let Some(file) = self.file() else {
			bail!("only classes from class files need linking, {} is none", self.name);
		};
		let super_links = super_class.as_ref().map(|class| class.links()).transpose()
			.map_err(|_| anyhow!("super class of {} is not linked", self.name))?;

		let mut primary = super_links.map(|links| links.primary.clone()).unwrap_or_default();
		if !file.is_interface() {
			primary.push(self.id);
		}

		let mut all_interfaces: Vec<Arc<Class>> = Vec::new();
		let mut seen = HashSet::new();
		for interface in &interfaces {
			let interface_links = interface.links()
				.map_err(|_| anyhow!("interface {} of {} is not linked", interface.name, self.name))?;
			for i in std::iter::once(interface).chain(interface_links.all_interfaces.iter()) {
				if seen.insert(i.id) {
					all_interfaces.push(i.clone());
				}
			}
		}
		for i in super_links.iter().flat_map(|links| links.all_interfaces.iter()) {
			if seen.insert(i.id) {
				all_interfaces.push(i.clone());
			}
		}

		let mut instance_field_size = super_links.map_or(0, |links| links.instance_field_size);
		let mut instance_template = super_links.map(|links| links.instance_template.clone()).unwrap_or_default();
		let mut own_statics = Vec::new();

		let mut fields = Vec::with_capacity(file.fields.len());
		for field in &file.fields {
			let ty = Type::parse(&field.descriptor)
				.with_context(|| anyhow!("in field {} of {}", field.name, self.name))?;
			let slot = if field.access.is_static {
				own_statics.push(Value::zero(&ty));
				own_statics.len() - 1
			} else {
				instance_template.push(Value::zero(&ty));
				instance_field_size += 1;
				instance_field_size - 1
			};
			fields.push(Arc::new(Field {
				class: self.clone(),
				name: field.name.clone(),
				descriptor: field.descriptor.clone(),
				ty,
				access: field.access,
				slot,
				constant_value: field.constant_value.clone(),
			}));
		}
		let static_field_size = own_statics.len() + super_links.map_or(0, |links| links.static_field_size);

		let methods = (0..file.methods.len())
			.map(|index| Method::new(self, index).map(Arc::new))
			.collect::<Result<Vec<_>>>()?;

		let links = Links {
			super_class,
			interfaces,
			secondary: all_interfaces.iter().map(|interface| interface.id).collect(),
			all_interfaces,
			primary,
			instance_field_size,
			static_field_size,
			fields,
			methods,
			instance_template,
		};

		*self.statics.lock() = own_statics;
		if self.links.set(links).is_err() {
			bail!("class {} was linked twice", self.name);
		}
		self.set_init_state(InitState::Loaded);
		Ok(())
	}

	pub fn id(&self) -> ClassId {
		self.id
	}

	/// The internal name, like `java/lang/Object`. Array classes are named by their descriptor, primitive classes
	/// by their keyword.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The name as `Class.getName` gives it, like `java.lang.Object` or `[Ljava.lang.String;`.
	pub fn java_name(&self) -> String {
		self.name.replace('/', ".")
	}

	/// The field descriptor for values of this class.
	pub fn descriptor(&self) -> String {
		match &self.kind {
			ClassKind::Primitive(ty) => ty.to_string(),
			ClassKind::Array { .. } => self.name.clone(),
			ClassKind::Object(_) => format!("L{};", self.name),
		}
	}

	pub fn kind(&self) -> &ClassKind {
		&self.kind
	}

	/// The class file, for classes that have one.
	pub fn file(&self) -> Option<&ClassFile> {
		match &self.kind {
			ClassKind::Object(file) => Some(file),
			_ => None,
		}
	}

	pub fn version(&self) -> Option<Version> {
		self.file().map(|file| file.version)
	}

	pub fn access(&self) -> ClassAccess {
		match &self.kind {
			ClassKind::Object(file) => file.access,
			// like for primitives and arrays in the reference implementation
			_ => ClassAccess::from(0x0411),
		}
	}

	pub fn is_interface(&self) -> bool {
		self.file().is_some_and(ClassFile::is_interface)
	}

	pub fn is_abstract(&self) -> bool {
		self.access().is_abstract
	}

	pub fn is_array(&self) -> bool {
		matches!(self.kind, ClassKind::Array { .. })
	}

	pub fn is_primitive(&self) -> bool {
		matches!(self.kind, ClassKind::Primitive(_))
	}

	/// The class of the components, for array classes.
	pub fn component(&self) -> Option<&Arc<Class>> {
		match &self.kind {
			ClassKind::Array { component, .. } => Some(component),
			_ => None,
		}
	}

	/// The type of the elements, for array classes.
	pub fn element_type(&self) -> Option<&Type> {
		match &self.kind {
			ClassKind::Array { element, .. } => Some(element),
			_ => None,
		}
	}

	pub fn links(&self) -> VmResult<&Links> {
		self.links.get().ok_or_else(|| fatal!("class {} is not linked yet", self.name))
	}

	pub fn is_linked(&self) -> bool {
		self.links.get().is_some()
	}

	pub fn super_class(&self) -> Option<&Arc<Class>> {
		self.links.get().and_then(Links::super_class)
	}

	/// Finds a method declared by this class.
	pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<Method>> {
		self.links.get()?.methods.iter()
			.find(|method| method.name() == name && method.descriptor() == descriptor)
	}

	/// Finds a field declared by this class.
	pub fn declared_field(&self, name: &str, descriptor: &str) -> Option<&Arc<Field>> {
		self.links.get()?.fields.iter()
			.find(|field| field.name == name && field.descriptor == descriptor)
	}

	pub fn init_state(&self) -> InitState {
		*self.init.lock()
	}

	pub(crate) fn set_init_state(&self, state: InitState) {
		*self.init.lock() = state;
		self.init_changed.notify_all();
	}

	pub(crate) fn lock_init(&self) -> MutexGuard<'_, InitState> {
		self.init.lock()
	}

	pub(crate) fn wait_for_init(&self, guard: &mut MutexGuard<'_, InitState>) {
		self.init_changed.wait(guard);
	}

	/// Reads a static field declared by this class.
	pub fn get_static(&self, slot: usize) -> VmResult<Value> {
		self.statics.lock().get(slot).cloned()
			.ok_or_else(|| fatal!("static slot {slot} is out of range for {}", self.name))
	}

	/// Writes a static field declared by this class.
	pub fn set_static(&self, slot: usize, value: Value) -> VmResult<()> {
		let mut statics = self.statics.lock();
		let Some(cell) = statics.get_mut(slot) else {
			return Err(fatal!("static slot {slot} is out of range for {}", self.name));
		};
		*cell = value;
		Ok(())
	}

	/// The `java/lang/Class` object for this class, if it's created already.
	pub fn mirror(&self) -> Option<&ObjectRef> {
		self.mirror.get()
	}

	/// Sets the `java/lang/Class` object, returning the one that's actually in place.
	pub(crate) fn set_mirror(&self, mirror: ObjectRef) -> &ObjectRef {
		self.mirror.get_or_init(|| mirror)
	}
}

impl Debug for Class {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Class({})", self.name)
	}
}

impl Display for Class {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.name)
	}
}

pub(crate) fn primitive_name(ty: &Type) -> Option<&'static str> {
	Some(match ty {
		Type::B => "byte",
		Type::C => "char",
		Type::D => "double",
		Type::F => "float",
		Type::I => "int",
		Type::J => "long",
		Type::S => "short",
		Type::Z => "boolean",
		Type::Object(_) | Type::Array(..) => return None,
	})
}

/// A field bound to its declaring class.
pub struct Field {
	class: Arc<Class>,
	name: String,
	descriptor: String,
	ty: Type,
	access: FieldAccess,
	/// For instance fields the absolute slot in the object, for static fields the slot in the declaring class.
	slot: usize,
	constant_value: Option<ConstantValue>,
}

impl Field {
	pub fn class(&self) -> &Arc<Class> {
		&self.class
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn descriptor(&self) -> &str {
		&self.descriptor
	}

	pub fn ty(&self) -> &Type {
		&self.ty
	}

	pub fn access(&self) -> FieldAccess {
		self.access
	}

	pub fn is_static(&self) -> bool {
		self.access.is_static
	}

	pub fn slot(&self) -> usize {
		self.slot
	}

	pub fn constant_value(&self) -> Option<&ConstantValue> {
		self.constant_value.as_ref()
	}
}

impl Debug for Field {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Field({}.{}:{} @{})", self.class.name, self.name, self.descriptor, self.slot)
	}
}

impl Display for Field {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}", self.class.name, self.name)
	}
}
