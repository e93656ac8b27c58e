//! A decoded view over raw bytecode, used for disassembly.
//!
//! The interpreter executes the raw bytes directly, this is for humans (and tests) looking at them.

use std::fmt::Write;
use std::io::Cursor;
use anyhow::{anyhow, bail, Context, Result};
use crate::class_constants::{atype, opcode};
use crate::ClassRead;
use crate::tree::pool::ConstantPool;

/// An instruction with its operands. Jump targets are absolute bytecode offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
	/// An instruction without operands.
	Simple(u8),
	/// A load, store or `ret` with an explicit local variable index.
	Local { opcode: u8, index: u16, wide: bool },
	Iinc { index: u16, value: i16, wide: bool },
	/// `bipush` or `sipush`.
	Push { opcode: u8, value: i16 },
	/// `ldc`, `ldc_w` or `ldc2_w`.
	Ldc { opcode: u8, index: u16 },
	/// An instruction with a single pool index operand, like `getfield` or `checkcast`.
	Pool { opcode: u8, index: u16 },
	InvokeInterface { index: u16, count: u8 },
	InvokeDynamic { index: u16 },
	Jump { opcode: u8, target: u16 },
	TableSwitch { default: u16, low: i32, high: i32, targets: Vec<u16> },
	LookupSwitch { default: u16, pairs: Vec<(i32, u16)> },
	NewArray { atype: u8 },
	MultiANewArray { index: u16, dimensions: u8 },
}

/// Helper for reading branch offsets, which are relative to the start of the instruction.
trait CodeReadHelper: ClassRead {
	fn read_branch_target_i16(&mut self, opcode_pos: u16) -> Result<u16> {
		let offset = self.read_i16()?;
		opcode_pos.checked_add_signed(offset)
			.with_context(|| anyhow!("branch target {opcode_pos} + {offset} out of bounds"))
	}

	fn read_branch_target_i32(&mut self, opcode_pos: u16) -> Result<u16> {
		let offset = self.read_i32()?;
		let target = opcode_pos as i64 + offset as i64;
		u16::try_from(target)
			.with_context(|| anyhow!("branch target {opcode_pos} + {offset} out of bounds"))
	}

	/// Skips the padding of `tableswitch` and `lookupswitch`, aligned relative to the start of the code.
	fn align_to_4_byte_boundary(&mut self) -> Result<()> {
		let padding = (4 - (self.marker()? & 0b11)) & 0b11;
		self.skip(padding as i64)
	}
}
impl<T: ClassRead> CodeReadHelper for T {}

/// Decodes the given raw bytecode into instructions, paired with their offsets.
pub fn decode(code: &[u8]) -> Result<Vec<(u16, Instruction)>> {
	if code.len() > u16::MAX as usize {
		bail!("code length {} too large", code.len());
	}

	let mut r = Cursor::new(code);
	let mut instructions = Vec::new();

	while (r.position() as usize) < code.len() {
		let opcode_pos = r.position() as u16;

		let instruction = decode_one(&mut r, opcode_pos)
			.with_context(|| anyhow!("while decoding instruction at {opcode_pos}"))?;

		if let Instruction::Jump { target, .. } = instruction {
			if target as usize >= code.len() {
				bail!("jump at {opcode_pos} targets {target}, beyond the code length {}", code.len());
			}
		}

		instructions.push((opcode_pos, instruction));
	}

	Ok(instructions)
}

fn decode_one(r: &mut Cursor<&[u8]>, opcode_pos: u16) -> Result<Instruction> {
	let op = r.read_u8()?;
	Ok(match op {
		opcode::NOP..=opcode::DCONST_1 |
		opcode::ILOAD_0..=opcode::SALOAD |
		opcode::ISTORE_0..=opcode::LXOR |
		opcode::I2L..=opcode::DCMPG |
		opcode::IRETURN..=opcode::RETURN |
		opcode::ARRAYLENGTH |
		opcode::ATHROW |
		opcode::MONITORENTER |
		opcode::MONITOREXIT => Instruction::Simple(op),
		opcode::BIPUSH => Instruction::Push { opcode: op, value: r.read_i8()? as i16 },
		opcode::SIPUSH => Instruction::Push { opcode: op, value: r.read_i16()? },
		opcode::LDC => Instruction::Ldc { opcode: op, index: r.read_u8()? as u16 },
		opcode::LDC_W | opcode::LDC2_W => Instruction::Ldc { opcode: op, index: r.read_u16()? },
		opcode::ILOAD..=opcode::ALOAD |
		opcode::ISTORE..=opcode::ASTORE |
		opcode::RET => Instruction::Local { opcode: op, index: r.read_u8()? as u16, wide: false },
		opcode::IINC => Instruction::Iinc { index: r.read_u8()? as u16, value: r.read_i8()? as i16, wide: false },
		opcode::IFEQ..=opcode::JSR |
		opcode::IFNULL |
		opcode::IFNONNULL => Instruction::Jump { opcode: op, target: r.read_branch_target_i16(opcode_pos)? },
		opcode::GOTO_W | opcode::JSR_W => Instruction::Jump { opcode: op, target: r.read_branch_target_i32(opcode_pos)? },
		opcode::TABLESWITCH => {
			r.align_to_4_byte_boundary()?;
			let default = r.read_branch_target_i32(opcode_pos)?;
			let low = r.read_i32()?;
			let high = r.read_i32()?;
			if low > high {
				bail!("tableswitch: low is greater than high: {low} > {high}");
			}
			let mut targets = Vec::with_capacity((high as i64 - low as i64 + 1) as usize);
			for _ in low..=high {
				targets.push(r.read_branch_target_i32(opcode_pos)?);
			}
			Instruction::TableSwitch { default, low, high, targets }
		},
		opcode::LOOKUPSWITCH => {
			r.align_to_4_byte_boundary()?;
			let default = r.read_branch_target_i32(opcode_pos)?;
			let npairs = r.read_i32()?;
			if npairs < 0 {
				bail!("lookupswitch: npairs must be non-negative, got {npairs}");
			}
			let mut pairs = Vec::with_capacity(npairs as usize);
			for _ in 0..npairs {
				let key = r.read_i32()?;
				pairs.push((key, r.read_branch_target_i32(opcode_pos)?));
			}
			Instruction::LookupSwitch { default, pairs }
		},
		opcode::GETSTATIC..=opcode::INVOKESTATIC |
		opcode::NEW |
		opcode::ANEWARRAY |
		opcode::CHECKCAST |
		opcode::INSTANCEOF => Instruction::Pool { opcode: op, index: r.read_u16()? },
		opcode::INVOKEINTERFACE => {
			let index = r.read_u16()?;
			let count = r.read_u8()?;
			if r.read_u8()? != 0 {
				bail!("invokeinterface: fourth operand byte must be zero");
			}
			Instruction::InvokeInterface { index, count }
		},
		opcode::INVOKEDYNAMIC => {
			let index = r.read_u16()?;
			if r.read_u16()? != 0 {
				bail!("invokedynamic: third and fourth operand bytes must be zero");
			}
			Instruction::InvokeDynamic { index }
		},
		opcode::NEWARRAY => {
			let atype = r.read_u8()?;
			if !(atype::T_BOOLEAN..=atype::T_LONG).contains(&atype) {
				bail!("newarray: unknown array type {atype}");
			}
			Instruction::NewArray { atype }
		},
		opcode::MULTIANEWARRAY => Instruction::MultiANewArray { index: r.read_u16()?, dimensions: r.read_u8()? },
		opcode::WIDE => {
			let op = r.read_u8()?;
			match op {
				opcode::ILOAD..=opcode::ALOAD |
				opcode::ISTORE..=opcode::ASTORE |
				opcode::RET => Instruction::Local { opcode: op, index: r.read_u16()?, wide: true },
				opcode::IINC => Instruction::Iinc { index: r.read_u16()?, value: r.read_i16()?, wide: true },
				op => bail!("wide: can't be applied to opcode {op:#x}"),
			}
		},
		op => bail!("unknown opcode {op:#x}"),
	})
}

/// The mnemonic of an opcode, or `"<unknown>"`.
pub fn mnemonic(op: u8) -> &'static str {
	const MNEMONICS: [&str; 0xcb] = [
		"nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4", "iconst_5",
		"lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1", "bipush", "sipush",
		"ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload", "iload_0", "iload_1", "iload_2",
		"iload_3", "lload_0", "lload_1", "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3",
		"dload_0", "dload_1", "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload",
		"laload", "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore", "fstore",
		"dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1", "lstore_2",
		"lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0", "dstore_1", "dstore_2",
		"dstore_3", "astore_0", "astore_1", "astore_2", "astore_3", "iastore", "lastore", "fastore", "dastore",
		"aastore", "bastore", "castore", "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1",
		"dup2_x2", "swap", "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul",
		"fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg", "lneg", "fneg",
		"dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land", "ior", "lor", "ixor", "lxor",
		"iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l", "d2f", "i2b", "i2c",
		"i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle",
		"if_icmpeq", "if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne",
		"goto", "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
		"areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial",
		"invokestatic", "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength",
		"athrow", "checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull",
		"ifnonnull", "goto_w", "jsr_w", "breakpoint",
	];
	MNEMONICS.get(op as usize).copied().unwrap_or(match op {
		opcode::IMPDEP1 => "impdep1",
		opcode::IMPDEP2 => "impdep2",
		_ => "<unknown>",
	})
}

fn array_type_name(atype: u8) -> &'static str {
	match atype {
		atype::T_BOOLEAN => "boolean",
		atype::T_CHAR => "char",
		atype::T_FLOAT => "float",
		atype::T_DOUBLE => "double",
		atype::T_BYTE => "byte",
		atype::T_SHORT => "short",
		atype::T_INT => "int",
		atype::T_LONG => "long",
		_ => "<unknown>",
	}
}

impl Instruction {
	/// Formats this instruction like a disassembler would, resolving pool references with the given pool.
	pub fn display(&self, pool: &ConstantPool) -> String {
		let describe = |index: u16| match pool.resolve(index) {
			Ok(constant) => format!("#{index} // {constant}"),
			Err(_) => format!("#{index} // <invalid>"),
		};

		let mut s = String::new();
		// writing to a String can't fail
		let _ = match self {
			&Instruction::Simple(op) => write!(s, "{}", mnemonic(op)),
			&Instruction::Local { opcode, index, wide } =>
				write!(s, "{}{} {index}", if wide { "wide " } else { "" }, mnemonic(opcode)),
			&Instruction::Iinc { index, value, wide } =>
				write!(s, "{}iinc {index} {value}", if wide { "wide " } else { "" }),
			&Instruction::Push { opcode, value } => write!(s, "{} {value}", mnemonic(opcode)),
			&Instruction::Ldc { opcode, index } => write!(s, "{} {}", mnemonic(opcode), describe(index)),
			&Instruction::Pool { opcode, index } => write!(s, "{} {}", mnemonic(opcode), describe(index)),
			&Instruction::InvokeInterface { index, count } => write!(s, "invokeinterface {} count {count}", describe(index)),
			&Instruction::InvokeDynamic { index } => write!(s, "invokedynamic {}", describe(index)),
			&Instruction::Jump { opcode, target } => write!(s, "{} {target}", mnemonic(opcode)),
			Instruction::TableSwitch { default, low, targets, .. } => {
				let _ = write!(s, "tableswitch {{");
				for (key, target) in (*low..).zip(targets) {
					let _ = write!(s, " {key}: {target},");
				}
				write!(s, " default: {default} }}")
			},
			Instruction::LookupSwitch { default, pairs } => {
				let _ = write!(s, "lookupswitch {{");
				for (key, target) in pairs {
					let _ = write!(s, " {key}: {target},");
				}
				write!(s, " default: {default} }}")
			},
			&Instruction::NewArray { atype } => write!(s, "newarray {}", array_type_name(atype)),
			&Instruction::MultiANewArray { index, dimensions } => write!(s, "multianewarray {} dim {dimensions}", describe(index)),
		};
		s
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_constants::opcode;
	use crate::tree::instruction::{decode, mnemonic, Instruction};

	#[test]
	fn branches_are_relative_to_instruction_start() -> Result<()> {
		let code = [
			opcode::NOP,
			opcode::GOTO, 0xff, 0xff, // to 0
			opcode::IFEQ, 0x00, 0x03, // to 7
			opcode::RETURN,
		];
		let decoded = decode(&code)?;
		assert_eq!(decoded, vec![
			(0, Instruction::Simple(opcode::NOP)),
			(1, Instruction::Jump { opcode: opcode::GOTO, target: 0 }),
			(4, Instruction::Jump { opcode: opcode::IFEQ, target: 7 }),
			(7, Instruction::Simple(opcode::RETURN)),
		]);
		Ok(())
	}

	#[test]
	fn tableswitch_padding_is_relative_to_code_start() -> Result<()> {
		// tableswitch at offset 1: opcode at 1, two bytes of padding (2 and 3), data starts at 4
		let code = [
			opcode::ICONST_0,
			opcode::TABLESWITCH, 0, 0,
			0, 0, 0, 23, // default: 1 + 23 = 24
			0, 0, 0, 0, // low
			0, 0, 0, 1, // high
			0, 0, 0, 23, // 0 => 24
			0, 0, 0, 23, // 1 => 24
			opcode::RETURN,
		];
		let decoded = decode(&code)?;
		assert_eq!(decoded[1], (1, Instruction::TableSwitch { default: 24, low: 0, high: 1, targets: vec![24, 24] }));
		assert_eq!(decoded[2], (24, Instruction::Simple(opcode::RETURN)));
		Ok(())
	}

	#[test]
	fn wide_widens_one_instruction() -> Result<()> {
		let code = [
			opcode::WIDE, opcode::ILOAD, 0x01, 0x00,
			opcode::WIDE, opcode::IINC, 0x00, 0x02, 0xff, 0xfe,
			opcode::ILOAD, 0x05,
		];
		let decoded = decode(&code)?;
		assert_eq!(decoded, vec![
			(0, Instruction::Local { opcode: opcode::ILOAD, index: 256, wide: true }),
			(4, Instruction::Iinc { index: 2, value: -2, wide: true }),
			(10, Instruction::Local { opcode: opcode::ILOAD, index: 5, wide: false }),
		]);
		Ok(())
	}

	#[test]
	fn rejects_bad_code() {
		assert!(decode(&[0xcb]).is_err());
		assert!(decode(&[opcode::SIPUSH, 0]).is_err());
		assert!(decode(&[opcode::GOTO, 0x00, 0x10]).is_err());
		assert!(decode(&[opcode::WIDE, opcode::NOP]).is_err());
	}

	#[test]
	fn mnemonics() {
		assert_eq!(mnemonic(opcode::NOP), "nop");
		assert_eq!(mnemonic(opcode::INVOKEDYNAMIC), "invokedynamic");
		assert_eq!(mnemonic(opcode::JSR_W), "jsr_w");
		assert_eq!(mnemonic(opcode::BREAKPOINT), "breakpoint");
		assert_eq!(mnemonic(opcode::IMPDEP2), "impdep2");
		assert_eq!(mnemonic(0xd0), "<unknown>");
	}
}
