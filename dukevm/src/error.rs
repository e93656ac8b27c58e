use std::fmt::{Debug, Display, Formatter};
use crate::object::ObjectRef;

/// The two ways executing code can fail.
pub enum VmError {
	/// A guest exception, thrown by `athrow` or by the runtime itself. Exception handlers of the guest code can
	/// catch these.
	Guest(ObjectRef),
	/// Something the guest can't observe, like a broken invariant of the runtime or an unsupported operation.
	Fatal(anyhow::Error),
}

pub type VmResult<T> = Result<T, VmError>;

/// Creates a [`VmError::Fatal`] from a format string, like [`anyhow::anyhow`] does.
macro_rules! fatal {
	($($arg:tt)*) => {
		$crate::error::VmError::Fatal(anyhow::anyhow!($($arg)*))
	};
}

pub(crate) use fatal;

impl VmError {
	pub fn is_guest(&self) -> bool {
		matches!(self, VmError::Guest(_))
	}

	/// The guest exception, if this is one.
	pub fn guest(&self) -> Option<&ObjectRef> {
		match self {
			VmError::Guest(exception) => Some(exception),
			VmError::Fatal(_) => None,
		}
	}
}

impl From<anyhow::Error> for VmError {
	fn from(value: anyhow::Error) -> Self {
		VmError::Fatal(value)
	}
}

impl Debug for VmError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			VmError::Guest(exception) => write!(f, "Guest({})", exception.class().name()),
			VmError::Fatal(e) => write!(f, "Fatal({e:?})"),
		}
	}
}

impl Display for VmError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			VmError::Guest(exception) => write!(f, "uncaught guest exception {}", exception.class().name()),
			VmError::Fatal(e) => write!(f, "{e:#}"),
		}
	}
}

impl std::error::Error for VmError {}

/// Adds context to the fatal part of a [`VmResult`], leaving guest exceptions untouched.
pub(crate) trait VmContext<T> {
	fn fatal_context<C: Display + Send + Sync + 'static>(self, f: impl FnOnce() -> C) -> VmResult<T>;
}

impl<T> VmContext<T> for VmResult<T> {
	fn fatal_context<C: Display + Send + Sync + 'static>(self, f: impl FnOnce() -> C) -> VmResult<T> {
		self.map_err(|e| match e {
			VmError::Fatal(e) => VmError::Fatal(e.context(f())),
			guest => guest,
		})
	}
}
