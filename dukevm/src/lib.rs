//! An interpreting runtime for java class files.
//!
//! A [`Vm`] loads classes from a [`dukebox::ClassPath`], links and initializes them on demand and runs their bytecode
//! on a [`Thread`]. Errors come in two kinds, see [`VmError`]: guest exceptions, which guest code can catch, and fatal
//! errors, which it can't.
//!
//! ```no_run
//! use dukebox::ClassPath;
//! use dukevm::{Vm, VmConfig};
//! # fn main() -> anyhow::Result<()> {
//! let vm = Vm::new(VmConfig::default().class_path(ClassPath::parse("classes")?))?;
//! vm.run_main("org.example.Main", &[])?;
//! # Ok(())
//! # }
//! ```

pub mod class;
mod error;
mod init;
mod inline_cache;
mod interpreter;
mod loader;
pub mod method;
mod monitor;
pub mod natives;
pub mod object;
pub mod reflect;
pub mod resolve;
mod runtime_pool;
pub mod strings;
pub mod subtype;
mod thread;
mod value;
mod vm;

pub use class::{Class, ClassId, ClassKind, Field, InitState, Links};
pub use error::{VmError, VmResult};
pub use inline_cache::{CacheCounts, CallSite, Tier, POLYMORPHIC_WIDTH};
pub use loader::LoadError;
pub use method::{Method, MethodId};
pub use monitor::Monitor;
pub use natives::{NativeFn, NativeRegistry};
pub use object::{ArrayData, Object, ObjectRef, Payload};
pub use thread::{FrameInfo, StackTraceElement, Thread, ThreadId};
pub use value::Value;
pub use vm::{Vm, VmConfig, VmStats};
