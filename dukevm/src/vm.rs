use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use anyhow::{anyhow, Context, Result};
use dukebox::ClassPath;
use duke::tree::descriptor::Type;
use log::{debug, info, warn};
use parking_lot::Mutex;
use crate::class::Class;
use crate::error::{fatal, VmError, VmResult};
use crate::inline_cache::{CacheCounts, CallSite, InlineCaches, Tier, POLYMORPHIC_WIDTH};
use crate::interpreter;
use crate::loader::{LoadError, Loader, CLASS, OBJECT};
use crate::natives::{NativeFn, NativeRegistry};
use crate::object::{Object, ObjectRef, Payload};
use crate::resolve;
use crate::strings::StringTable;
use crate::thread::{Thread, ThreadId};
use crate::value::Value;

/// The settings of a [`Vm`].
#[derive(Debug)]
pub struct VmConfig {
	pub class_path: ClassPath,
	/// The number of frames a thread may have before `java/lang/StackOverflowError` is thrown.
	pub max_stack_depth: usize,
	/// The number of entries in the map shared by all megamorphic call sites.
	pub megamorphic_capacity: usize,
	/// Whether to log every executed instruction, at trace level.
	pub trace_instructions: bool,
	/// Natives added to (or replacing) the built-in ones.
	pub natives: NativeRegistry,
	/// Whether `dukevm/Host` output is collected instead of written to stdout, see [`Vm::take_output`].
	pub capture_output: bool,
}

impl Default for VmConfig {
	fn default() -> Self {
		VmConfig {
			class_path: ClassPath::new(),
			max_stack_depth: 512,
			megamorphic_capacity: 1024,
			trace_instructions: false,
			natives: NativeRegistry::new(),
			capture_output: false,
		}
	}
}

impl VmConfig {
	pub fn class_path(mut self, class_path: ClassPath) -> Self {
		self.class_path = class_path;
		self
	}

	pub fn max_stack_depth(mut self, max_stack_depth: usize) -> Self {
		self.max_stack_depth = max_stack_depth;
		self
	}

	pub fn megamorphic_capacity(mut self, megamorphic_capacity: usize) -> Self {
		self.megamorphic_capacity = megamorphic_capacity;
		self
	}

	pub fn trace_instructions(mut self, trace_instructions: bool) -> Self {
		self.trace_instructions = trace_instructions;
		self
	}

	pub fn capture_output(mut self, capture_output: bool) -> Self {
		self.capture_output = capture_output;
		self
	}

	pub fn native(mut self, class: &str, name: &str, descriptor: &str, f: NativeFn) -> Self {
		self.natives.register(class, name, descriptor, f);
		self
	}

	/// The number of receiver classes a polymorphic call site remembers. Not configurable.
	pub fn polymorphic_width(&self) -> usize {
		POLYMORPHIC_WIDTH
	}
}

/// Counters for the work done by the runtime.
#[derive(Debug, Default)]
pub struct VmStats {
	method_searches: AtomicUsize,
	field_searches: AtomicUsize,
	class_loads: AtomicUsize,
}

impl VmStats {
	pub(crate) fn count_method_search(&self) {
		self.method_searches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn count_field_search(&self) {
		self.field_searches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn count_class_load(&self) {
		self.class_loads.fetch_add(1, Ordering::Relaxed);
	}

	/// How often a method had to be searched for, as it wasn't in the resolution cache of a class.
	pub fn method_searches(&self) -> usize {
		self.method_searches.load(Ordering::Relaxed)
	}

	pub fn field_searches(&self) -> usize {
		self.field_searches.load(Ordering::Relaxed)
	}

	/// How many classes (including array classes) were loaded.
	pub fn class_loads(&self) -> usize {
		self.class_loads.load(Ordering::Relaxed)
	}
}

enum Output {
	Stdout,
	Captured(Mutex<String>),
}

/// A runtime instance: the loaded classes and every cache.
///
/// Several of these don't share anything. Each [`Thread`] must only be used with the [`Vm`] that created it.
pub struct Vm {
	class_path: ClassPath,
	max_stack_depth: usize,
	trace_instructions: bool,
	pub(crate) loader: Loader,
	natives: NativeRegistry,
	pub(crate) strings: StringTable,
	pub(crate) inline_caches: InlineCaches,
	stats: VmStats,
	next_thread: AtomicU64,
	started: Instant,
	output: Output,
}

impl Debug for Vm {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Vm")
			.field("class_path", &self.class_path)
			.field("loaded_classes", &self.loader.len())
			.field("natives", &self.natives)
			.field("stats", &self.stats)
			.finish_non_exhaustive()
	}
}

impl Vm {
	/// Creates a runtime, loading `java/lang/Object` and `java/lang/Class` from the class path.
	pub fn new(config: VmConfig) -> Result<Vm> {
		let mut natives = NativeRegistry::with_builtins();
		natives.extend(&config.natives);

		info!("class path has {} entries", config.class_path.entries().len());

		let vm = Vm {
			class_path: config.class_path,
			max_stack_depth: config.max_stack_depth,
			trace_instructions: config.trace_instructions,
			loader: Loader::new()?,
			natives,
			strings: StringTable::default(),
			inline_caches: InlineCaches::new(config.megamorphic_capacity),
			stats: VmStats::default(),
			next_thread: AtomicU64::new(1),
			started: Instant::now(),
			output: if config.capture_output { Output::Captured(Mutex::new(String::new())) } else { Output::Stdout },
		};

		let mut thread = vm.new_thread();
		vm.load(&mut thread, OBJECT)
			.map_err(|e| anyhow!("{e}"))
			.with_context(|| anyhow!("failed to load the root class {OBJECT}"))?;
		match vm.load(&mut thread, CLASS) {
			Ok(_) => {},
			Err(LoadError::NotFound(_)) => warn!("{CLASS} is not on the class path"),
			Err(e) => return Err(anyhow!("{e}")).with_context(|| anyhow!("failed to load {CLASS}")),
		}
		vm.fixup_bootstrap(&mut thread)?;

		Ok(vm)
	}

	pub fn new_thread(&self) -> Thread {
		Thread::new(ThreadId(self.next_thread.fetch_add(1, Ordering::Relaxed)))
	}

	pub fn stats(&self) -> &VmStats {
		&self.stats
	}

	pub fn started(&self) -> Instant {
		self.started
	}

	pub fn class_path(&self) -> &ClassPath {
		&self.class_path
	}

	pub fn max_stack_depth(&self) -> usize {
		self.max_stack_depth
	}

	pub fn trace_instructions(&self) -> bool {
		self.trace_instructions
	}

	pub fn natives(&self) -> &NativeRegistry {
		&self.natives
	}

	/// The number of interned strings.
	pub fn interned_strings(&self) -> usize {
		self.strings.len()
	}

	/// Writes the output of the guest.
	pub fn print(&self, string: &str) -> VmResult<()> {
		match &self.output {
			Output::Stdout => {
				let mut stdout = std::io::stdout().lock();
				stdout.write_all(string.as_bytes())
					.and_then(|()| stdout.flush())
					.with_context(|| anyhow!("failed to write guest output to stdout"))?;
			},
			Output::Captured(output) => output.lock().push_str(string),
		}
		Ok(())
	}

	/// Takes the output collected so far, if the output is captured.
	pub fn take_output(&self) -> Option<String> {
		match &self.output {
			Output::Stdout => None,
			Output::Captured(output) => Some(std::mem::take(&mut *output.lock())),
		}
	}

	/// Loads a class, throwing the matching guest exception if that fails.
	pub fn load_class(&self, thread: &mut Thread, name: &str) -> VmResult<Arc<Class>> {
		self.load(thread, name).or_else(|e| {
			let (class, message) = match e {
				LoadError::NotFound(name) => ("java/lang/NoClassDefFoundError", name),
				LoadError::WrongName { requested, found } =>
					("java/lang/NoClassDefFoundError", format!("{requested} (wrong name: {found})")),
				LoadError::Format(name, e) => ("java/lang/ClassFormatError", format!("{name}: {e:#}")),
				LoadError::Circularity(name) => ("java/lang/ClassCircularityError", name),
				LoadError::Incompatible(message) => ("java/lang/IncompatibleClassChangeError", message),
				LoadError::Raised(e) => return Err(e),
				LoadError::Fatal(e) => return Err(VmError::Fatal(e)),
			};
			Err(self.throw(thread, class, Some(message)))
		})
	}

	/// Gets an already loaded class.
	pub fn find_loaded(&self, name: &str) -> Option<Arc<Class>> {
		self.loader.find_loaded(name)
	}

	/// All classes loaded so far, in no particular order.
	pub fn loaded_classes(&self) -> Vec<Arc<Class>> {
		self.loader.loaded()
	}

	pub fn primitive_class(&self, ty: &Type) -> Option<&Arc<Class>> {
		self.loader.primitive(ty)
	}

	/// Gets the array class with the given component.
	pub fn array_class(&self, thread: &mut Thread, component: &Arc<Class>) -> VmResult<Arc<Class>> {
		let name = if component.is_array() {
			format!("[{}", component.name())
		} else {
			format!("[{}", component.descriptor())
		};
		self.load_class(thread, &name)
	}

	/// Gets the `java/lang/Class` object of a class, creating it on first use.
	pub fn mirror(&self, thread: &mut Thread, class: &Arc<Class>) -> VmResult<ObjectRef> {
		if let Some(mirror) = class.mirror() {
			return Ok(mirror.clone());
		}
		let class_class = self.load_class(thread, CLASS)?;
		let mirror = Object::new_instance(class_class)?;
		mirror.set_payload(Payload::Mirror(class.clone()));
		// another thread might have won
		Ok(class.set_mirror(mirror).clone())
	}

	/// Creates a guest exception, by running the `(Ljava/lang/String;)V` or `()V` constructor.
	///
	/// If that fails with a guest exception, that one is returned instead. If the exception class can't even be
	/// loaded, a fatal error naming the original fault is returned.
	pub fn throw(&self, thread: &mut Thread, class_name: &str, message: Option<String>) -> VmError {
		let class = match self.load(thread, class_name) {
			Ok(class) => class,
			Err(e) => {
				let fault = match &message {
					Some(message) => format!("{class_name}: {message}"),
					None => class_name.to_owned(),
				};
				return fatal!("couldn't load exception class to throw {fault}: {e}");
			},
		};
		debug!("throwing {class_name}{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default());

		let result = match message {
			Some(message) if class.declared_method("<init>", "(Ljava/lang/String;)V").is_some() => {
				self.new_rust_string(thread, &message)
					.and_then(|message| self.construct(thread, class_name, "(Ljava/lang/String;)V", vec![Value::from_ref(message)]))
			},
			_ => self.construct(thread, class_name, "()V", Vec::new()),
		};
		match result {
			Ok(exception) => VmError::Guest(exception),
			Err(e) => e,
		}
	}

	/// Creates an object, initializing the class and running the constructor with the given descriptor.
	pub fn construct(&self, thread: &mut Thread, class_name: &str, descriptor: &str, args: Vec<Value>) -> VmResult<ObjectRef> {
		let class = self.load_class(thread, class_name)?;
		self.initialize(thread, &class)?;
		let Some(constructor) = class.declared_method("<init>", descriptor).cloned() else {
			return Err(fatal!("{class_name} has no constructor {descriptor}"));
		};

		let object = Object::new_instance(class)?;
		let mut cells = vec![Value::from_ref(object.clone())];
		cells.extend(Value::to_cells(args));
		interpreter::invoke(self, thread, constructor, cells)?;
		Ok(object)
	}

	/// Invokes a static method, initializing its class first. The arguments are one value each.
	pub fn invoke_static(&self, thread: &mut Thread, class_name: &str, name: &str, descriptor: &str, args: Vec<Value>) -> VmResult<Option<Value>> {
		let class = self.load_class(thread, class_name)?;
		let method = resolve::resolve_class_method(self, thread, &class, name, descriptor)?;
		if !method.is_static() {
			return Err(fatal!("{method} is not static"));
		}
		self.initialize(thread, method.class())?;
		interpreter::invoke(self, thread, method, Value::to_cells(args))
	}

	/// Invokes an instance method like `invokevirtual` does. The arguments are one value each, without the receiver.
	pub fn invoke_virtual(&self, thread: &mut Thread, receiver: &ObjectRef, name: &str, descriptor: &str, args: Vec<Value>) -> VmResult<Option<Value>> {
		let resolved = resolve::resolve_class_method(self, thread, receiver.class(), name, descriptor)?;
		let method = resolve::select_virtual(self, thread, &resolved, receiver.class())?;

		let mut cells = vec![Value::from_ref(receiver.clone())];
		cells.extend(Value::to_cells(args));
		interpreter::invoke(self, thread, method, cells)
	}

	/// Runs the `public static void main(String[])` method of a class, on a new thread.
	///
	/// The class name may use dots or slashes. An uncaught exception is printed to stderr and then returned.
	pub fn run_main(&self, class_name: &str, args: &[String]) -> VmResult<()> {
		let mut thread = self.new_thread();
		let class_name = class_name.replace('.', "/");

		let result = self.run_main_on(&mut thread, &class_name, args);
		if let Err(VmError::Guest(exception)) = &result {
			eprint!("{}", self.format_uncaught("main", exception));
		}
		result
	}

	fn run_main_on(&self, thread: &mut Thread, class_name: &str, args: &[String]) -> VmResult<()> {
		let class = self.load_class(thread, class_name)?;
		self.initialize(thread, &class)?;

		let Some(main) = class.declared_method("main", "([Ljava/lang/String;)V").cloned() else {
			return Err(fatal!("class {} has no method main(String[])", class.java_name()));
		};
		if !main.is_static() || !main.access().is_public {
			return Err(fatal!("the main method of {} must be public and static", class.java_name()));
		}

		// the strings are created before the array, as that one is locked while filling it
		let strings = args.iter()
			.map(|arg| self.new_rust_string(thread, arg))
			.collect::<VmResult<Vec<_>>>()?;
		let array_class = self.load_class(thread, "[Ljava/lang/String;")?;
		let array = Object::new_array(array_class, strings.len())?;
		{
			let mut data = array.array()?;
			for (i, string) in strings.into_iter().enumerate() {
				data.set(i, Value::from_ref(string))?;
			}
		}

		debug!("running {}", main);
		interpreter::invoke(self, thread, main, vec![Value::from_ref(array)])?;
		Ok(())
	}

	/// Gets the `detailMessage` of a `java/lang/Throwable`.
	pub fn throwable_message(&self, throwable: &Object) -> Option<String> {
		let mut class = Some(throwable.class());
		while let Some(c) = class {
			if let Some(field) = c.declared_field("detailMessage", "Ljava/lang/String;") {
				let message = throwable.get_field(field.slot()).ok()?;
				return self.rust_string(message.as_ref().ok()??).ok();
			}
			class = c.super_class();
		}
		None
	}

	/// Formats an uncaught exception the way it's printed when a thread dies.
	pub fn format_uncaught(&self, thread_name: &str, exception: &Object) -> String {
		interpreter::format_uncaught(self, thread_name, exception)
	}

	/// The hits and misses of all inline caches.
	pub fn inline_cache_counts(&self) -> CacheCounts {
		self.inline_caches.counts()
	}

	/// The tier of the inline cache of a call site, or [`None`] if it wasn't executed yet.
	pub fn inline_cache_tier(&self, site: CallSite) -> Option<Tier> {
		self.inline_caches.tier(site)
	}

	/// The number of entries of the map shared by the megamorphic call sites.
	pub fn megamorphic_entries(&self) -> usize {
		self.inline_caches.megamorphic_len()
	}
}
