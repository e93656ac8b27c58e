use crate::error::{fatal, VmResult};
use crate::object::ObjectRef;
use crate::value::Value;

/// The local variables and the operand stack of a method invocation.
///
/// Both hold cells: a `long` or `double` takes two of them, the second being [`Value::Top`].
pub(crate) struct Frame {
	locals: Vec<Value>,
	stack: Vec<Value>,
	max_stack: usize,
}

impl Frame {
	/// Creates a frame with the argument cells in the first local variables.
	pub(crate) fn new(max_locals: u16, max_stack: u16, args: Vec<Value>) -> VmResult<Frame> {
		let max_locals = max_locals as usize;
		if args.len() > max_locals {
			return Err(fatal!("{} argument cells don't fit into {max_locals} local variables", args.len()));
		}
		let mut locals = args;
		locals.resize(max_locals, Value::Uninitialized);
		Ok(Frame {
			locals,
			stack: Vec::with_capacity(max_stack as usize),
			max_stack: max_stack as usize,
		})
	}

	pub(crate) fn load(&self, index: usize) -> VmResult<Value> {
		let value = self.locals.get(index)
			.ok_or_else(|| fatal!("local variable {index} is out of range, there are {}", self.locals.len()))?;
		match value {
			Value::Top | Value::Uninitialized => Err(fatal!("local variable {index} holds no value but {value:?}")),
			value => Ok(value.clone()),
		}
	}

	/// Stores into a local variable. Writing over one half of a `long` or `double` invalidates the other half.
	pub(crate) fn store(&mut self, index: usize, value: Value) -> VmResult<()> {
		let width = if value.is_wide() { 2 } else { 1 };
		if index + width > self.locals.len() {
			return Err(fatal!("local variable {index} is out of range, there are {}", self.locals.len()));
		}

		if index > 0 && self.locals[index - 1].is_wide() {
			self.locals[index - 1] = Value::Uninitialized;
		}
		let last = index + width - 1;
		if self.locals[last].is_wide() {
			if let Some(upper) = self.locals.get_mut(last + 1) {
				*upper = Value::Uninitialized;
			}
		}

		if width == 2 {
			self.locals[index + 1] = Value::Top;
		}
		self.locals[index] = value;
		Ok(())
	}

	pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
		let wide = value.is_wide();
		self.push_cell(value)?;
		if wide {
			self.push_cell(Value::Top)?;
		}
		Ok(())
	}

	pub(crate) fn push_cell(&mut self, cell: Value) -> VmResult<()> {
		if self.stack.len() >= self.max_stack {
			return Err(fatal!("operand stack overflow, max stack is {}", self.max_stack));
		}
		self.stack.push(cell);
		Ok(())
	}

	pub(crate) fn pop_cell(&mut self) -> VmResult<Value> {
		self.stack.pop().ok_or_else(|| fatal!("operand stack underflow"))
	}

	/// Pops a value, both cells for a `long` or `double`.
	pub(crate) fn pop(&mut self) -> VmResult<Value> {
		match self.pop_cell()? {
			Value::Top => {
				let value = self.pop_cell()?;
				if !value.is_wide() {
					return Err(fatal!("found {value:?} below a top cell"));
				}
				Ok(value)
			},
			value => Ok(value),
		}
	}

	pub(crate) fn peek(&self) -> VmResult<&Value> {
		self.stack.last().ok_or_else(|| fatal!("operand stack underflow"))
	}

	/// Pops the top `n` cells, in the order they were pushed.
	pub(crate) fn pop_cells(&mut self, n: usize) -> VmResult<Vec<Value>> {
		if n > self.stack.len() {
			return Err(fatal!("operand stack underflow, wanted {n} cells but only {} are there", self.stack.len()));
		}
		Ok(self.stack.split_off(self.stack.len() - n))
	}

	pub(crate) fn pop_int(&mut self) -> VmResult<i32> {
		self.pop_cell()?.as_int()
	}

	pub(crate) fn pop_long(&mut self) -> VmResult<i64> {
		self.pop()?.as_long()
	}

	pub(crate) fn pop_float(&mut self) -> VmResult<f32> {
		self.pop_cell()?.as_float()
	}

	pub(crate) fn pop_double(&mut self) -> VmResult<f64> {
		self.pop()?.as_double()
	}

	pub(crate) fn pop_ref(&mut self) -> VmResult<Option<ObjectRef>> {
		self.pop_cell()?.into_ref()
	}

	pub(crate) fn clear_stack(&mut self) {
		self.stack.clear();
	}

	pub(crate) fn stack_depth(&self) -> usize {
		self.stack.len()
	}
}

/// Reading the operands of instructions.
pub(crate) trait Operands {
	fn u8_at(&self, pc: usize) -> VmResult<u8>;

	fn i8_at(&self, pc: usize) -> VmResult<i8> {
		Ok(self.u8_at(pc)? as i8)
	}

	fn u16_at(&self, pc: usize) -> VmResult<u16> {
		Ok(u16::from_be_bytes([self.u8_at(pc)?, self.u8_at(pc + 1)?]))
	}

	fn i16_at(&self, pc: usize) -> VmResult<i16> {
		Ok(self.u16_at(pc)? as i16)
	}

	fn i32_at(&self, pc: usize) -> VmResult<i32> {
		Ok(i32::from_be_bytes([self.u8_at(pc)?, self.u8_at(pc + 1)?, self.u8_at(pc + 2)?, self.u8_at(pc + 3)?]))
	}
}

impl Operands for [u8] {
	fn u8_at(&self, pc: usize) -> VmResult<u8> {
		self.get(pc).copied().ok_or_else(|| fatal!("code ends in the middle of an instruction, at {pc}"))
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::interpreter::frame::{Frame, Operands};
	use crate::value::Value;

	#[test]
	fn wide_values_take_two_cells() -> Result<()> {
		let mut frame = Frame::new(4, 4, vec![Value::Int(1)])?;
		frame.push(Value::Long(5))?;
		frame.push(Value::Int(7))?;
		assert_eq!(frame.stack_depth(), 3);
		assert_eq!(frame.pop()?, Value::Int(7));
		assert_eq!(frame.pop()?, Value::Long(5));

		frame.store(1, Value::Double(2.5))?;
		assert_eq!(frame.load(1)?, Value::Double(2.5));
		assert!(frame.load(2).is_err());
		Ok(())
	}

	#[test]
	fn storing_over_half_invalidates_the_other() -> Result<()> {
		let mut frame = Frame::new(4, 2, Vec::new())?;
		frame.store(0, Value::Long(1))?;
		frame.store(1, Value::Int(2))?;
		assert!(frame.load(0).is_err());
		assert_eq!(frame.load(1)?, Value::Int(2));

		frame.store(2, Value::Long(3))?;
		frame.store(1, Value::Long(4))?;
		assert_eq!(frame.load(1)?, Value::Long(4));
		assert!(frame.load(3).is_err());
		Ok(())
	}

	#[test]
	fn limits() -> Result<()> {
		assert!(Frame::new(1, 1, vec![Value::Int(1), Value::Int(2)]).is_err());

		let mut frame = Frame::new(1, 1, Vec::new())?;
		assert!(frame.push(Value::Long(1)).is_err());
		assert!(frame.store(0, Value::Long(1)).is_err());
		assert!(frame.load(0).is_err());
		Ok(())
	}

	#[test]
	fn operands() -> Result<()> {
		let code: &[u8] = &[0xff, 0xfe, 0x00, 0x10];
		assert_eq!(code.i8_at(0)?, -1);
		assert_eq!(code.i16_at(0)?, -2);
		assert_eq!(code.u16_at(2)?, 16);
		assert_eq!(code.i32_at(0)?, -0x1fff0);
		assert!(code.i32_at(1).is_err());
		Ok(())
	}
}
