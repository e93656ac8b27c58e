//! Loading classes from the class path, deriving array classes, and the bootstrap of the root types.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use duke::tree::descriptor::Type;
use duke::tree::field::ConstantValue;
use dukebox::ClassSource;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use crate::class::Class;
use crate::error::VmError;
use crate::strings::units_from_java;
use crate::thread::{Thread, ThreadId};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) const OBJECT: &str = "java/lang/Object";
pub(crate) const CLASS: &str = "java/lang/Class";
pub(crate) const CLONEABLE: &str = "java/lang/Cloneable";
pub(crate) const SERIALIZABLE: &str = "java/io/Serializable";

const PRIMITIVES: [Type; 8] = [Type::B, Type::C, Type::D, Type::F, Type::I, Type::J, Type::S, Type::Z];

enum LoadEntry {
	Loaded(Arc<Class>),
	/// A thread is loading this class. Once the class file is parsed, the half-built class is available here.
	InProgress {
		class: Option<Arc<Class>>,
		owner: ThreadId,
	},
}

/// Why loading a class failed.
pub enum LoadError {
	/// No class path entry has the class.
	NotFound(String),
	/// The class file found for a name declares another name.
	WrongName {
		requested: String,
		found: String,
	},
	/// The class file couldn't be read, or its descriptors are malformed.
	Format(String, anyhow::Error),
	/// The class is its own superclass or superinterface.
	Circularity(String),
	/// A superclass is an interface or final, or an interface is none.
	Incompatible(String),
	/// Running guest code while loading failed.
	Raised(VmError),
	/// Reading from the class path failed.
	Fatal(anyhow::Error),
}

impl Debug for LoadError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "LoadError({self})")
	}
}

impl Display for LoadError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			LoadError::NotFound(name) => write!(f, "class {name} not found"),
			LoadError::WrongName { requested, found } => write!(f, "{requested} (wrong name: {found})"),
			LoadError::Format(name, e) => write!(f, "malformed class {name}: {e:#}"),
			LoadError::Circularity(name) => write!(f, "class circularity involving {name}"),
			LoadError::Incompatible(message) => f.write_str(message),
			LoadError::Raised(e) => write!(f, "{e}"),
			LoadError::Fatal(e) => write!(f, "{e:#}"),
		}
	}
}

/// The table of loaded classes of a [`Vm`].
pub(crate) struct Loader {
	classes: Mutex<HashMap<String, LoadEntry>>,
	/// Notified whenever a load finishes, successful or not.
	changed: Condvar,
	primitives: Vec<Arc<Class>>,
}

impl Loader {
	pub(crate) fn new() -> Result<Loader> {
		let primitives = PRIMITIVES.iter()
			.map(|ty| Class::new_primitive(ty.clone()))
			.collect::<Result<Vec<_>>>()?;
		Ok(Loader {
			classes: Mutex::new(HashMap::new()),
			changed: Condvar::new(),
			primitives,
		})
	}

	/// The class of a primitive type.
	pub(crate) fn primitive(&self, ty: &Type) -> Option<&Arc<Class>> {
		self.primitives.iter().find(|class| matches!(class.kind(), crate::class::ClassKind::Primitive(t) if t == ty))
	}

	pub(crate) fn find_loaded(&self, name: &str) -> Option<Arc<Class>> {
		match self.classes.lock().get(name) {
			Some(LoadEntry::Loaded(class)) => Some(class.clone()),
			_ => None,
		}
	}

	/// All fully loaded classes, in no particular order.
	pub(crate) fn loaded(&self) -> Vec<Arc<Class>> {
		self.classes.lock().values()
			.filter_map(|entry| match entry {
				LoadEntry::Loaded(class) => Some(class.clone()),
				LoadEntry::InProgress { .. } => None,
			})
			.collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.classes.lock().values().filter(|entry| matches!(entry, LoadEntry::Loaded(_))).count()
	}
}

enum Claim {
	Done(Arc<Class>),
	Circular,
	Wait,
	Mine,
}

impl Vm {
	/// Loads a class, an array class or gets a primitive class. Loading a class that's already loaded gives the
	/// same [`Arc`].
	pub(crate) fn load(&self, thread: &mut Thread, name: &str) -> Result<Arc<Class>, LoadError> {
		if name.starts_with('[') {
			return self.load_array(thread, name);
		}

		let mut classes = self.loader.classes.lock();
		loop {
			let claim = match classes.get(name) {
				Some(LoadEntry::Loaded(class)) => Claim::Done(class.clone()),
				Some(LoadEntry::InProgress { class: Some(class), owner }) if *owner == thread.id() => Claim::Done(class.clone()),
				Some(LoadEntry::InProgress { class: None, owner }) if *owner == thread.id() => Claim::Circular,
				Some(LoadEntry::InProgress { .. }) => Claim::Wait,
				None => Claim::Mine,
			};
			match claim {
				Claim::Done(class) => return Ok(class),
				Claim::Circular => return Err(LoadError::Circularity(name.to_owned())),
				Claim::Wait => self.loader.changed.wait(&mut classes),
				Claim::Mine => break,
			}
		}
		classes.insert(name.to_owned(), LoadEntry::InProgress { class: None, owner: thread.id() });
		drop(classes);

		let result = self.define(thread, name);

		let mut classes = self.loader.classes.lock();
		match &result {
			Ok(class) => {
				classes.insert(name.to_owned(), LoadEntry::Loaded(class.clone()));
				self.stats().count_class_load();
			},
			Err(e) => {
				debug!("loading {name} failed: {e}");
				classes.remove(name);
			},
		}
		drop(classes);
		self.loader.changed.notify_all();

		result
	}

	fn define(&self, thread: &mut Thread, name: &str) -> Result<Arc<Class>, LoadError> {
		let bytes = match self.class_path().find_class(name) {
			Ok(Some(bytes)) => bytes,
			Ok(None) => return Err(LoadError::NotFound(name.to_owned())),
			Err(e) => return Err(LoadError::Fatal(e.context(anyhow!("while looking for class {name}")))),
		};

		let file = duke::read_class(&bytes)
			.map_err(|e| LoadError::Format(name.to_owned(), e))?;
		if file.name != name {
			return Err(LoadError::WrongName { requested: name.to_owned(), found: file.name.clone() });
		}
		let super_name = file.super_class.clone();
		let interface_names = file.interfaces.clone();
		let is_interface = file.is_interface();

		let class = Class::new_object(file);
		debug!("loading {name}");
		if let Some(LoadEntry::InProgress { class: half_built, .. }) = self.loader.classes.lock().get_mut(name) {
			*half_built = Some(class.clone());
		}

		let super_class = match super_name {
			Some(super_name) => {
				let super_class = self.load_super(thread, name, &super_name)?;
				if super_class.is_interface() {
					return Err(LoadError::Incompatible(format!("class {name} has interface {super_name} as super class")));
				}
				if super_class.access().is_final {
					return Err(LoadError::Incompatible(format!("class {name} cannot inherit from final class {super_name}")));
				}
				if is_interface && super_name != OBJECT {
					return Err(LoadError::Format(name.to_owned(), anyhow!("interfaces must have java/lang/Object as super class")));
				}
				Some(super_class)
			},
			None if name == OBJECT => None,
			None => return Err(LoadError::Format(name.to_owned(), anyhow!("only java/lang/Object may have no super class"))),
		};

		let mut interfaces = Vec::with_capacity(interface_names.len());
		for interface_name in &interface_names {
			let interface = self.load_super(thread, name, interface_name)?;
			if !interface.is_interface() {
				return Err(LoadError::Incompatible(format!("class {name} can not implement {interface_name}, because it is not an interface")));
			}
			interfaces.push(interface);
		}

		class.link(super_class, interfaces)
			.map_err(|e| LoadError::Format(name.to_owned(), e))?;
		debug!("linked {name}");

		self.apply_constant_values(thread, &class).map_err(LoadError::Raised)?;
		Ok(class)
	}

	/// Loads a superclass or superinterface. Getting the half-built class of an ongoing load means a cycle.
	fn load_super(&self, thread: &mut Thread, name: &str, super_name: &str) -> Result<Arc<Class>, LoadError> {
		let super_class = self.load(thread, super_name)?;
		if !super_class.is_linked() {
			return Err(LoadError::Circularity(name.to_owned()));
		}
		Ok(super_class)
	}

	/// Stores the `ConstantValue` of static fields, before any static initializer runs.
	fn apply_constant_values(&self, thread: &mut Thread, class: &Arc<Class>) -> Result<(), VmError> {
		for field in class.links()?.fields() {
			if !field.is_static() {
				continue;
			}
			let Some(constant) = field.constant_value() else {
				continue;
			};
			let value = match constant {
				ConstantValue::Integer(value) => Value::Int(*value),
				ConstantValue::Float(value) => Value::Float(*value),
				ConstantValue::Long(value) => Value::Long(*value),
				ConstantValue::Double(value) => Value::Double(*value),
				ConstantValue::String(string) => Value::from_ref(self.intern(thread, units_from_java(string))?),
			};
			if !value.matches(field.ty()) {
				return Err(VmError::Fatal(anyhow!("constant value {value:?} doesn't fit field {field}")));
			}
			class.set_static(field.slot(), value.narrow(field.ty()))?;
		}
		Ok(())
	}

	fn load_array(&self, thread: &mut Thread, name: &str) -> Result<Arc<Class>, LoadError> {
		if let Some(class) = self.loader.find_loaded(name) {
			return Ok(class);
		}

		let component_name = &name[1..];
		let component = if let Some(class_name) = component_name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
			self.load(thread, class_name)?
		} else if component_name.starts_with('[') {
			self.load_array(thread, component_name)?
		} else {
			let ty = Type::parse(component_name)
				.map_err(|e| LoadError::Format(name.to_owned(), e))?;
			self.loader.primitive(&ty)
				.cloned()
				.ok_or_else(|| LoadError::Format(name.to_owned(), anyhow!("{component_name} is not a primitive type")))?
		};

		let object = self.load(thread, OBJECT)?;
		let interfaces = vec![self.load(thread, CLONEABLE)?, self.load(thread, SERIALIZABLE)?];
		let array = Class::new_array(component, &object, interfaces)
			.with_context(|| anyhow!("while deriving array class {name}"))
			.map_err(LoadError::Fatal)?;

		let mut classes = self.loader.classes.lock();
		let entry = classes.entry(name.to_owned()).or_insert_with(|| {
			debug!("derived array class {name}");
			self.stats().count_class_load();
			LoadEntry::Loaded(array.clone())
		});
		match entry {
			LoadEntry::Loaded(class) => Ok(class.clone()),
			// arrays are never in progress
			LoadEntry::InProgress { .. } => Ok(array),
		}
	}

	/// Creates the `java/lang/Class` objects of all classes loaded so far.
	///
	/// The root types are loaded before `java/lang/Class` exists, so they can't have their mirror set up right away.
	/// Classes loaded after this get their mirror on first request.
	pub(crate) fn fixup_bootstrap(&self, thread: &mut Thread) -> Result<()> {
		if self.loader.find_loaded(CLASS).is_none() {
			warn!("{CLASS} is not loaded, not creating mirrors");
			return Ok(());
		}
		let mut classes = self.loader.loaded();
		classes.sort_by_key(|class| class.id());
		for class in &classes {
			self.mirror(thread, class)
				.with_context(|| anyhow!("while creating the mirror of {}", class.name()))?;
		}
		debug!("created mirrors for {} bootstrap classes", classes.len());
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use dukebox::MemJar;
	use pretty_assertions::assert_eq;
	use raw_class_file::{ClassBuilder, flags, jdk};
	use crate::loader::{LoadEntry, LoadError};
	use crate::vm::{Vm, VmConfig};

	fn vm_with(extra: Vec<(String, Vec<u8>)>) -> Result<Vm> {
		let jar: MemJar = jdk::java_lang().into_iter().chain(extra).collect();
		Vm::new(VmConfig::default().class_path(jar.into()))
	}

	#[test]
	fn same_class_twice() -> Result<()> {
		let vm = vm_with(Vec::new())?;
		let mut thread = vm.new_thread();
		let a = vm.load_class(&mut thread, "java/lang/String")?;
		let b = vm.load_class(&mut thread, "java/lang/String")?;
		assert!(std::sync::Arc::ptr_eq(&a, &b));
		Ok(())
	}

	#[test]
	fn mirrors_exist_after_bootstrap() -> Result<()> {
		let vm = vm_with(Vec::new())?;
		let object = vm.find_loaded("java/lang/Object").ok_or_else(|| anyhow::anyhow!("no object"))?;
		let class = vm.find_loaded("java/lang/Class").ok_or_else(|| anyhow::anyhow!("no class"))?;
		assert!(object.mirror().is_some());
		let class_mirror = class.mirror().ok_or_else(|| anyhow::anyhow!("no mirror"))?;
		assert!(std::sync::Arc::ptr_eq(class_mirror.class(), &class));
		Ok(())
	}

	#[test]
	fn circularity() -> Result<()> {
		let vm = vm_with(vec![
			("A".to_owned(), ClassBuilder::new("A").super_class(Some("B")).build()),
			("B".to_owned(), ClassBuilder::new("B").super_class(Some("A")).build()),
		])?;
		let mut thread = vm.new_thread();
		assert!(matches!(vm.load(&mut thread, "A"), Err(LoadError::Circularity(_))));
		// the failed load leaves nothing behind
		assert!(vm.find_loaded("A").is_none());
		assert!(vm.find_loaded("B").is_none());
		Ok(())
	}

	#[test]
	fn incompatible_supers() -> Result<()> {
		let vm = vm_with(vec![
			("I".to_owned(), ClassBuilder::interface("I").build()),
			("F".to_owned(), ClassBuilder::new("F").access(flags::ACC_PUBLIC | flags::ACC_FINAL).build()),
			("A".to_owned(), ClassBuilder::new("A").super_class(Some("I")).build()),
			("B".to_owned(), ClassBuilder::new("B").super_class(Some("F")).build()),
			("C".to_owned(), ClassBuilder::new("C").implements("F").build()),
		])?;
		let mut thread = vm.new_thread();
		for name in ["A", "B", "C"] {
			assert!(matches!(vm.load(&mut thread, name), Err(LoadError::Incompatible(_))), "{name}");
		}
		Ok(())
	}

	#[test]
	fn wrong_name_and_missing() -> Result<()> {
		let vm = vm_with(vec![
			("a/A".to_owned(), ClassBuilder::new("b/B").build()),
		])?;
		let mut thread = vm.new_thread();
		assert!(matches!(vm.load(&mut thread, "a/A"), Err(LoadError::WrongName { .. })));
		assert!(matches!(vm.load(&mut thread, "a/Missing"), Err(LoadError::NotFound(_))));
		Ok(())
	}

	#[test]
	fn arrays() -> Result<()> {
		let vm = vm_with(Vec::new())?;
		let mut thread = vm.new_thread();
		let ints = vm.load_class(&mut thread, "[[I")?;
		assert_eq!(ints.name(), "[[I");
		let component = ints.component().ok_or_else(|| anyhow::anyhow!("no component"))?;
		assert_eq!(component.name(), "[I");
		assert_eq!(component.component().map(|c| c.name()), Some("int"));

		let strings = vm.load_class(&mut thread, "[Ljava/lang/String;")?;
		assert_eq!(strings.java_name(), "[Ljava.lang.String;");
		assert_eq!(strings.super_class().map(|c| c.name()), Some("java/lang/Object"));
		Ok(())
	}

	#[test]
	fn waits_for_load_of_other_thread() -> Result<()> {
		let vm = vm_with(vec![("W".to_owned(), ClassBuilder::new("W").build())])?;
		let owner = vm.new_thread();
		vm.loader.classes.lock().insert("W".to_owned(), LoadEntry::InProgress { class: None, owner: owner.id() });

		std::thread::scope(|scope| {
			let waiter = scope.spawn(|| {
				let mut thread = vm.new_thread();
				vm.load(&mut thread, "W").map_err(|e| anyhow::anyhow!("{e}"))
			});
			std::thread::sleep(std::time::Duration::from_millis(50));
			assert!(!waiter.is_finished(), "the load didn't wait for the owning thread");

			// the owner gives up, so the waiting thread loads the class itself
			vm.loader.classes.lock().remove("W");
			vm.loader.changed.notify_all();

			let class = waiter.join().map_err(|_| anyhow::anyhow!("loading thread panicked"))??;
			assert_eq!(class.name(), "W");
			Ok(())
		})
	}
}
