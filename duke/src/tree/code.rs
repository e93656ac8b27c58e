use crate::tree::attribute::RawAttribute;

/// The body of a method: the raw bytecode and the tables describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
	pub max_stack: u16,
	pub max_locals: u16,
	/// The raw instructions. Branch offsets inside are relative to the start of the branching instruction,
	/// see [`crate::tree::instruction::decode`] for reading them.
	pub code: Vec<u8>,
	pub exception_table: Vec<ExceptionHandler>,

	pub line_numbers: Option<Vec<LineNumber>>,
	pub local_variables: Option<Vec<LocalVariable>>,
	pub local_variable_types: Option<Vec<LocalVariable>>,
	/// Kept raw, there's no verification pass that would read it.
	pub stack_map_table: Option<Vec<u8>>,

	pub runtime_visible_type_annotations: Option<Vec<u8>>,
	pub runtime_invisible_type_annotations: Option<Vec<u8>>,

	pub attributes: Vec<RawAttribute>,
}

impl Code {
	/// The source line of the instruction at the given offset, if there's a `LineNumberTable`.
	///
	/// This is the line of the entry with the largest `start_pc` not after `pc`.
	pub fn line_number(&self, pc: u16) -> Option<u16> {
		self.line_numbers.as_ref()?
			.iter()
			.filter(|entry| entry.start_pc <= pc)
			.max_by_key(|entry| entry.start_pc)
			.map(|entry| entry.line_number)
	}
}

/// An entry of the exception table. The range `start_pc..end_pc` is exclusive at the end.
///
/// A `catch_type` of [`None`] catches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
	pub start_pc: u16,
	pub end_pc: u16,
	pub handler_pc: u16,
	pub catch_type: Option<String>,
}

impl ExceptionHandler {
	pub fn covers(&self, pc: u16) -> bool {
		self.start_pc <= pc && pc < self.end_pc
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
	pub start_pc: u16,
	pub line_number: u16,
}

/// An entry of the `LocalVariableTable`, or of the `LocalVariableTypeTable` where `descriptor` holds the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
	pub start_pc: u16,
	pub length: u16,
	pub name: String,
	pub descriptor: String,
	pub index: u16,
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::tree::code::{Code, ExceptionHandler, LineNumber};

	#[test]
	fn line_number_lookup() {
		let code = Code {
			max_stack: 0,
			max_locals: 0,
			code: vec![0; 20],
			exception_table: Vec::new(),
			line_numbers: Some(vec![
				LineNumber { start_pc: 0, line_number: 3 },
				LineNumber { start_pc: 8, line_number: 5 },
				LineNumber { start_pc: 4, line_number: 4 },
			]),
			local_variables: None,
			local_variable_types: None,
			stack_map_table: None,
			runtime_visible_type_annotations: None,
			runtime_invisible_type_annotations: None,
			attributes: Vec::new(),
		};

		assert_eq!(code.line_number(0), Some(3));
		assert_eq!(code.line_number(5), Some(4));
		assert_eq!(code.line_number(19), Some(5));
	}

	#[test]
	fn handler_range_is_exclusive() {
		let handler = ExceptionHandler { start_pc: 10, end_pc: 20, handler_pc: 30, catch_type: None };
		assert!(!handler.covers(9));
		assert!(handler.covers(10));
		assert!(handler.covers(15));
		assert!(!handler.covers(20));
		assert!(!handler.covers(25));
	}
}
