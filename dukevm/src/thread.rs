use std::fmt::{Display, Formatter};
use std::sync::Arc;
use crate::method::Method;

/// Identifies a [`Thread`] within a [`crate::Vm`]. Monitors and class initialization record these as owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) u64);

impl Display for ThreadId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// A frame as seen from the outside: the method and the pc of the instruction currently executing.
#[derive(Debug, Clone)]
pub struct FrameInfo {
	pub method: Arc<Method>,
	pub pc: u16,
}

/// One element of a captured stack trace.
#[derive(Debug, Clone, PartialEq)]
pub struct StackTraceElement {
	/// The internal name of the declaring class.
	pub class: String,
	pub method: String,
	pub file: Option<String>,
	pub line: Option<u16>,
	pub is_native: bool,
}

impl Display for StackTraceElement {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}(", self.class.replace('/', "."), self.method)?;
		match (&self.file, self.line) {
			_ if self.is_native => f.write_str("Native Method")?,
			(Some(file), Some(line)) => write!(f, "{file}:{line}")?,
			(Some(file), None) => f.write_str(file)?,
			(None, _) => f.write_str("Unknown Source")?,
		}
		f.write_str(")")
	}
}

/// A call stack.
///
/// The interpreter keeps the actual locals and operand stacks on the host stack. This only keeps what's needed to
/// produce stack traces and to limit the recursion depth.
#[derive(Debug)]
pub struct Thread {
	id: ThreadId,
	frames: Vec<FrameInfo>,
	/// Set while a `java/lang/StackOverflowError` is being created, to allow a few more frames for that.
	pub(crate) overflowing: bool,
}

impl Thread {
	pub(crate) fn new(id: ThreadId) -> Thread {
		Thread { id, frames: Vec::new(), overflowing: false }
	}

	pub fn id(&self) -> ThreadId {
		self.id
	}

	pub fn depth(&self) -> usize {
		self.frames.len()
	}

	/// The frames of this thread, the innermost one last.
	pub fn frames(&self) -> &[FrameInfo] {
		&self.frames
	}

	pub(crate) fn push_frame(&mut self, method: Arc<Method>) {
		self.frames.push(FrameInfo { method, pc: 0 });
	}

	pub(crate) fn pop_frame(&mut self) {
		self.frames.pop();
	}

	pub(crate) fn set_pc(&mut self, pc: u16) {
		if let Some(frame) = self.frames.last_mut() {
			frame.pc = pc;
		}
	}

	/// Captures the current frames, the innermost one first.
	pub fn stack_trace(&self) -> Vec<StackTraceElement> {
		self.frames.iter().rev()
			.map(|frame| {
				let method = &frame.method;
				StackTraceElement {
					class: method.class().name().to_owned(),
					method: method.name().to_owned(),
					file: method.class().file().and_then(|file| file.source_file.clone()),
					line: method.code().and_then(|code| code.line_number(frame.pc)),
					is_native: method.access().is_native,
				}
			})
			.collect()
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::thread::StackTraceElement;

	fn element(file: Option<&str>, line: Option<u16>, is_native: bool) -> String {
		StackTraceElement {
			class: "org/example/Main".to_owned(),
			method: "run".to_owned(),
			file: file.map(str::to_owned),
			line,
			is_native,
		}.to_string()
	}

	#[test]
	fn display() {
		assert_eq!(element(Some("Main.java"), Some(12), false), "org.example.Main.run(Main.java:12)");
		assert_eq!(element(Some("Main.java"), None, false), "org.example.Main.run(Main.java)");
		assert_eq!(element(None, Some(12), false), "org.example.Main.run(Unknown Source)");
		assert_eq!(element(Some("Main.java"), None, true), "org.example.Main.run(Native Method)");
	}
}
