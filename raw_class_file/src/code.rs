use crate::insn;
use crate::pool::Pool;

/// A position in the code, placed with [`Code::place`]. Can be used before it's placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct Fixup {
	/// The offset of the instruction the branch offset is relative to.
	instruction: usize,
	/// Where to write the offset.
	at: usize,
	label: Label,
	wide: bool,
}

/// The body of a `Code` attribute under construction.
///
/// Branch offsets to labels get filled in by [`Code::finish`].
#[derive(Debug)]
pub struct Code<'a> {
	pool: &'a mut Pool,
	code: Vec<u8>,
	max_stack: u16,
	max_locals: u16,
	labels: Vec<Option<usize>>,
	fixups: Vec<Fixup>,
	handlers: Vec<(Label, Label, Label, u16)>,
	lines: Vec<(u16, u16)>,
}

/// The finished parts of a `Code` attribute, except the attribute name.
pub(crate) struct FinishedCode {
	pub(crate) max_stack: u16,
	pub(crate) max_locals: u16,
	pub(crate) code: Vec<u8>,
	pub(crate) exception_table: Vec<[u16; 4]>,
	pub(crate) line_numbers: Vec<(u16, u16)>,
}

impl<'a> Code<'a> {
	pub(crate) fn new(pool: &'a mut Pool, max_locals: u16) -> Code<'a> {
		Code {
			pool,
			code: Vec::new(),
			max_stack: 16,
			max_locals,
			labels: Vec::new(),
			fixups: Vec::new(),
			handlers: Vec::new(),
			lines: Vec::new(),
		}
	}

	/// Access to the constant pool, for entries without a helper here.
	pub fn pool(&mut self) -> &mut Pool {
		self.pool
	}

	/// The offset the next instruction will have.
	pub fn pc(&self) -> u16 {
		self.code.len() as u16
	}

	/// Overrides the default `max_stack` of `16`.
	pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
		self.max_stack = max_stack;
		self
	}

	/// Overrides `max_locals`. It starts as the number of slots the arguments need, and grows with each local
	/// variable instruction emitted through [`Code::local`] or [`Code::iinc`].
	pub fn max_locals(&mut self, max_locals: u16) -> &mut Self {
		self.max_locals = max_locals;
		self
	}

	/// Emits a single byte, usually an instruction without operands.
	pub fn op(&mut self, op: u8) -> &mut Self {
		self.code.push(op);
		self
	}

	pub fn u8(&mut self, value: u8) -> &mut Self {
		self.code.push(value);
		self
	}

	pub fn u16(&mut self, value: u16) -> &mut Self {
		self.code.extend(value.to_be_bytes());
		self
	}

	/// Emits arbitrary bytes.
	pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
		self.code.extend(bytes);
		self
	}

	/// Pushes an `int` constant with the shortest instruction.
	pub fn iconst(&mut self, value: i32) -> &mut Self {
		match value {
			-1..=5 => self.op((insn::iconst_0 as i32 + value) as u8),
			-128..=127 => self.op(insn::bipush).u8(value as i8 as u8),
			-32768..=32767 => self.op(insn::sipush).u16(value as i16 as u16),
			_ => {
				let index = self.pool.integer(value);
				self.ldc_index(index)
			},
		}
	}

	pub fn lconst(&mut self, value: i64) -> &mut Self {
		match value {
			0 => self.op(insn::lconst_0),
			1 => self.op(insn::lconst_1),
			_ => {
				let index = self.pool.long(value);
				self.op(insn::ldc2_w).u16(index)
			},
		}
	}

	pub fn fconst(&mut self, value: f32) -> &mut Self {
		let index = self.pool.float(value);
		self.ldc_index(index)
	}

	pub fn dconst(&mut self, value: f64) -> &mut Self {
		let index = self.pool.double(value);
		self.op(insn::ldc2_w).u16(index)
	}

	pub fn ldc_string(&mut self, string: &str) -> &mut Self {
		let index = self.pool.string(string);
		self.ldc_index(index)
	}

	pub fn ldc_class(&mut self, name: &str) -> &mut Self {
		let index = self.pool.class(name);
		self.ldc_index(index)
	}

	/// `ldc` or `ldc_w` of some single slot pool entry.
	pub fn ldc_index(&mut self, index: u16) -> &mut Self {
		if let Ok(index) = u8::try_from(index) {
			self.op(insn::ldc).u8(index)
		} else {
			self.op(insn::ldc_w).u16(index)
		}
	}

	/// Emits a load, store or `ret` with an explicit index, using `wide` if the index doesn't fit in a byte.
	pub fn local(&mut self, op: u8, index: u16) -> &mut Self {
		let width = if matches!(op, insn::lload | insn::dload | insn::lstore | insn::dstore) { 2 } else { 1 };
		self.max_locals = self.max_locals.max(index + width);
		if let Ok(index) = u8::try_from(index) {
			self.op(op).u8(index)
		} else {
			self.op(insn::wide).op(op).u16(index)
		}
	}

	pub fn iinc(&mut self, index: u16, value: i16) -> &mut Self {
		self.max_locals = self.max_locals.max(index + 1);
		match (u8::try_from(index), i8::try_from(value)) {
			(Ok(index), Ok(value)) => self.op(insn::iinc).u8(index).u8(value as u8),
			_ => self.op(insn::wide).op(insn::iinc).u16(index).u16(value as u16),
		}
	}

	pub fn label(&mut self) -> Label {
		self.labels.push(None);
		Label(self.labels.len() - 1)
	}

	/// Places the label at the current offset.
	pub fn place(&mut self, label: Label) -> &mut Self {
		self.labels[label.0] = Some(self.code.len());
		self
	}

	/// A branch instruction with a two byte offset.
	pub fn jump(&mut self, op: u8, label: Label) -> &mut Self {
		let instruction = self.code.len();
		self.op(op);
		self.fixups.push(Fixup { instruction, at: self.code.len(), label, wide: false });
		self.u16(0)
	}

	/// `goto_w` or `jsr_w`.
	pub fn jump_wide(&mut self, op: u8, label: Label) -> &mut Self {
		let instruction = self.code.len();
		self.op(op);
		self.fixups.push(Fixup { instruction, at: self.code.len(), label, wide: true });
		self.raw(&[0; 4])
	}

	fn switch_padding(&mut self) {
		while self.code.len() % 4 != 0 {
			self.code.push(0);
		}
	}

	fn switch_target(&mut self, instruction: usize, label: Label) {
		self.fixups.push(Fixup { instruction, at: self.code.len(), label, wide: true });
		self.code.extend([0; 4]);
	}

	/// A `tableswitch` for the keys `low..low + targets.len()`.
	pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
		let instruction = self.code.len();
		self.op(insn::tableswitch);
		self.switch_padding();
		self.switch_target(instruction, default);
		let high = low + targets.len() as i32 - 1;
		self.raw(&low.to_be_bytes()).raw(&high.to_be_bytes());
		for &target in targets {
			self.switch_target(instruction, target);
		}
		self
	}

	pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
		let instruction = self.code.len();
		self.op(insn::lookupswitch);
		self.switch_padding();
		self.switch_target(instruction, default);
		self.raw(&(pairs.len() as i32).to_be_bytes());
		for &(key, target) in pairs {
			self.raw(&key.to_be_bytes());
			self.switch_target(instruction, target);
		}
		self
	}

	/// `getstatic`, `putstatic`, `getfield` or `putfield`.
	pub fn field(&mut self, op: u8, class: &str, name: &str, descriptor: &str) -> &mut Self {
		let index = self.pool.field_ref(class, name, descriptor);
		self.op(op).u16(index)
	}

	/// An invoke instruction. `invokeinterface` references an `InterfaceMethodref`, all others a `Methodref`.
	pub fn invoke(&mut self, op: u8, class: &str, name: &str, descriptor: &str) -> &mut Self {
		if op == insn::invokeinterface {
			let index = self.pool.interface_method_ref(class, name, descriptor);
			let count = 1 + parameter_slots(descriptor);
			self.op(op).u16(index).u8(count).u8(0)
		} else {
			let index = self.pool.method_ref(class, name, descriptor);
			self.op(op).u16(index)
		}
	}

	/// `invokestatic` or `invokespecial` of a method declared in an interface.
	pub fn invoke_interface_owner(&mut self, op: u8, class: &str, name: &str, descriptor: &str) -> &mut Self {
		let index = self.pool.interface_method_ref(class, name, descriptor);
		self.op(op).u16(index)
	}

	/// `invokedynamic`, with a call site referring to bootstrap method `0`.
	pub fn invokedynamic(&mut self, name: &str, descriptor: &str) -> &mut Self {
		let index = self.pool.invoke_dynamic(0, name, descriptor);
		self.op(insn::invokedynamic).u16(index).u16(0)
	}

	/// `new`, `anewarray`, `checkcast` or `instanceof`.
	pub fn type_op(&mut self, op: u8, class: &str) -> &mut Self {
		let index = self.pool.class(class);
		self.op(op).u16(index)
	}

	/// `newarray` with the given [`crate::atype`].
	pub fn newarray(&mut self, atype: u8) -> &mut Self {
		self.op(insn::newarray).u8(atype)
	}

	pub fn multianewarray(&mut self, descriptor: &str, dimensions: u8) -> &mut Self {
		let index = self.pool.class(descriptor);
		self.op(insn::multianewarray).u16(index).u8(dimensions)
	}

	/// Adds an exception table entry. `catch_type` of [`None`] catches everything.
	pub fn try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> &mut Self {
		let catch_type = catch_type.map_or(0, |name| self.pool.class(name));
		self.handlers.push((start, end, handler, catch_type));
		self
	}

	/// Adds a line number table entry starting at the current offset.
	pub fn line(&mut self, line: u16) -> &mut Self {
		self.lines.push((self.pc(), line));
		self
	}

	fn offset(&self, label: Label) -> usize {
		match self.labels[label.0] {
			Some(offset) => offset,
			None => panic!("label {label:?} was never placed"),
		}
	}

	pub(crate) fn finish(mut self) -> FinishedCode {
		for fixup in std::mem::take(&mut self.fixups) {
			let offset = self.offset(fixup.label) as i64 - fixup.instruction as i64;
			if fixup.wide {
				self.code[fixup.at..fixup.at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
			} else {
				let offset = i16::try_from(offset).unwrap_or_else(|_| panic!("branch offset {offset} doesn't fit into 16 bits"));
				self.code[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
			}
		}

		let exception_table = self.handlers.iter()
			.map(|&(start, end, handler, catch_type)| [
				self.offset(start) as u16,
				self.offset(end) as u16,
				self.offset(handler) as u16,
				catch_type,
			])
			.collect();

		FinishedCode {
			max_stack: self.max_stack,
			max_locals: self.max_locals,
			code: self.code,
			exception_table,
			line_numbers: self.lines,
		}
	}
}

/// The number of local variable slots the parameters of a method descriptor take.
pub(crate) fn parameter_slots(descriptor: &str) -> u8 {
	let mut slots = 0;
	let mut chars = descriptor.trim_start_matches('(').chars();
	while let Some(c) = chars.next() {
		match c {
			')' => break,
			'J' | 'D' => slots += 2,
			'L' => {
				slots += 1;
				for c in chars.by_ref() {
					if c == ';' { break; }
				}
			},
			'[' => {
				slots += 1;
				let mut c = chars.next();
				while c == Some('[') {
					c = chars.next();
				}
				if c == Some('L') {
					for c in chars.by_ref() {
						if c == ';' { break; }
					}
				}
			},
			_ => slots += 1,
		}
	}
	slots
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::code::{Code, parameter_slots};
	use crate::insn;
	use crate::pool::Pool;

	#[test]
	fn slots() {
		assert_eq!(parameter_slots("()V"), 0);
		assert_eq!(parameter_slots("(IJ)V"), 3);
		assert_eq!(parameter_slots("(Ljava/lang/String;[[JD)V"), 4);
		assert_eq!(parameter_slots("([Ljava/lang/Object;I)V"), 2);
	}

	#[test]
	fn backward_and_forward_jumps() {
		let mut pool = Pool::default();
		let mut code = Code::new(&mut pool, 0);
		let start = code.label();
		let end = code.label();
		code.place(start)
			.op(insn::nop)
			.jump(insn::ifeq, end)
			.jump(insn::goto, start)
			.place(end)
			.op(insn::r#return);
		let finished = code.finish();
		assert_eq!(finished.code, vec![
			insn::nop,
			insn::ifeq, 0, 6,
			insn::goto, 0xff, 0xfc,
			insn::r#return,
		]);
	}

	#[test]
	fn switch_is_padded() {
		let mut pool = Pool::default();
		let mut code = Code::new(&mut pool, 0);
		let target = code.label();
		code.op(insn::iconst_0)
			.lookupswitch(target, &[(1, target)])
			.place(target)
			.op(insn::r#return);
		let finished = code.finish();
		// opcode at 1, padding 2..4, default at 4, npairs at 8, pair at 12, return at 20
		assert_eq!(finished.code.len(), 21);
		assert_eq!(&finished.code[4..8], &19i32.to_be_bytes());
		assert_eq!(&finished.code[16..20], &19i32.to_be_bytes());
	}
}
