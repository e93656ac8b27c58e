use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, LevelFilter};
use duke::tree::class::ClassFile;
use duke::tree::instruction::decode;
use dukebox::ClassPath;
use dukevm::{reflect, Vm, VmConfig, VmError};

/// The stack size of the thread running the interpreter. Each guest frame takes a few host frames.
const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(version, about = "Runs java class files")]
struct Cli {
	/// Where to look for classes: directories, jars and `dir/*` wildcards, separated by the path separator.
	///
	/// Falls back to the `CLASSPATH` environment variable, then to the current directory. `-cp` works as well.
	#[arg(long = "class-path")]
	class_path: Option<String>,

	/// How many frames a thread may have before a `java.lang.StackOverflowError` is thrown.
	#[arg(long, default_value_t = 512)]
	max_stack_depth: usize,

	/// How many entries the map shared by all megamorphic call sites may hold.
	#[arg(long, default_value_t = 1024)]
	megamorphic_capacity: usize,

	/// Log each executed instruction, needs `-vvv` to be seen.
	#[arg(long)]
	trace: bool,

	/// Be verbose. Give it more than once for even more output.
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Runs the `main` method of a class
	Run {
		/// The class name, with dots or slashes.
		main_class: String,
		#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
		args: Vec<String>,
	},
	/// Prints the constant pool and the disassembled methods of a class file
	Dump {
		file: PathBuf,
	},
	/// Prints the members of a class, as seen after linking
	Describe {
		class_name: String,
	},
}

fn setup_logging(verbose: u8) -> Result<()> {
	let level = match verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	fern::Dispatch::new()
		.format(|out, message, record| {
			out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
		})
		.level(level)
		.chain(std::io::stderr())
		.apply()
		.context("failed to set up logging")
}

impl Cli {
	fn class_path(&self) -> Result<ClassPath> {
		let class_path = match &self.class_path {
			Some(class_path) => class_path.clone(),
			None => std::env::var("CLASSPATH").unwrap_or_else(|_| ".".to_owned()),
		};
		info!("using class path {class_path:?}");
		ClassPath::parse(&class_path)
			.with_context(|| anyhow!("invalid class path {class_path:?}"))
	}

	fn vm(&self) -> Result<Vm> {
		let config = VmConfig::default()
			.class_path(self.class_path()?)
			.max_stack_depth(self.max_stack_depth)
			.megamorphic_capacity(self.megamorphic_capacity)
			.trace_instructions(self.trace);
		Vm::new(config)
	}
}

fn dump(class: &ClassFile) -> Result<String> {
	let mut out = format!("{} {} (version {})\n", if class.is_interface() { "interface" } else { "class" }, class.name, class.version);
	if let Some(super_class) = &class.super_class {
		out.push_str(&format!("  extends {super_class}\n"));
	}
	for interface in &class.interfaces {
		out.push_str(&format!("  implements {interface}\n"));
	}

	out.push_str("constant pool:\n");
	out.push_str(&class.pool.to_string());

	for field in &class.fields {
		out.push_str(&format!("field {} {}\n", field.name, field.descriptor));
	}
	for method in &class.methods {
		out.push_str(&format!("method {}{}\n", method.name, method.descriptor));
		let Some(code) = &method.code else {
			continue;
		};
		out.push_str(&format!("  max_stack = {}, max_locals = {}\n", code.max_stack, code.max_locals));
		let instructions = decode(&code.code)
			.with_context(|| anyhow!("while disassembling {}{}", method.name, method.descriptor))?;
		for (pc, instruction) in instructions {
			out.push_str(&format!("  {pc:>5}: {}\n", instruction.display(&class.pool)));
		}
		for handler in &code.exception_table {
			out.push_str(&format!("  catch {} [{}, {}) -> {}\n",
				handler.catch_type.as_deref().unwrap_or("any"), handler.start_pc, handler.end_pc, handler.handler_pc));
		}
	}
	Ok(out)
}

/// Runs the command, returning whether it succeeded.
fn run(cli: Cli) -> Result<bool> {
	match &cli.command {
		Command::Run { main_class, args } => {
			let vm = cli.vm()?;
			match vm.run_main(main_class, args) {
				Ok(()) => Ok(true),
				// the stack trace is already printed
				Err(VmError::Guest(_)) => Ok(false),
				Err(VmError::Fatal(e)) => Err(e),
			}
		},
		Command::Dump { file } => {
			let bytes = std::fs::read(file)
				.with_context(|| anyhow!("failed to read {file:?}"))?;
			let class = duke::read_class(&bytes)
				.with_context(|| anyhow!("failed to parse {file:?}"))?;
			print!("{}", dump(&class)?);
			Ok(true)
		},
		Command::Describe { class_name } => {
			let vm = cli.vm()?;
			let mut thread = vm.new_thread();
			let class = vm.load_class(&mut thread, &class_name.replace('.', "/"))
				.map_err(|e| describe_error(&vm, e))?;
			let description = reflect::describe(&class)
				.map_err(|e| describe_error(&vm, e))?;
			println!("{description}");
			Ok(true)
		},
	}
}

fn describe_error(vm: &Vm, e: VmError) -> anyhow::Error {
	match e {
		VmError::Guest(exception) => anyhow!("{}", vm.format_uncaught("main", &exception).trim_end()),
		VmError::Fatal(e) => e,
	}
}

fn main() -> Result<ExitCode> {
	// `-cp` like java has it, clap only knows single character short options
	let args = std::env::args().map(|arg| if arg == "-cp" { "--class-path".to_owned() } else { arg });
	let cli = Cli::parse_from(args);
	setup_logging(cli.verbose)?;

	let success = std::thread::Builder::new()
		.name("main".to_owned())
		.stack_size(INTERPRETER_STACK_SIZE)
		.spawn(move || run(cli))?
		.join()
		.map_err(|_| anyhow!("the interpreter thread panicked"))??;

	Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use clap::Parser;
	use pretty_assertions::assert_eq;
	use raw_class_file::{flags, insn, ClassBuilder};
	use crate::{dump, Cli, Command};

	#[test]
	fn arguments() -> Result<()> {
		let cli = Cli::try_parse_from(["dukerun", "--class-path", "a:b", "-vv", "--trace", "run", "org.example.Main", "--flag", "x"])?;
		assert_eq!(cli.class_path.as_deref(), Some("a:b"));
		assert_eq!(cli.verbose, 2);
		assert!(cli.trace);
		assert_eq!(cli.max_stack_depth, 512);
		let Command::Run { main_class, args } = cli.command else {
			anyhow::bail!("expected the run command, got {:?}", cli.command);
		};
		assert_eq!(main_class, "org.example.Main");
		assert_eq!(args, vec!["--flag", "x"]);
		Ok(())
	}

	#[test]
	fn disassembly() -> Result<()> {
		let bytes = ClassBuilder::new("Main")
			.method(flags::ACC_PUBLIC | flags::ACC_STATIC, "add", "(II)I", |code| {
				code.op(insn::iload_0)
					.op(insn::iload_1)
					.op(insn::iadd)
					.op(insn::ireturn);
			})
			.build();
		let class = duke::read_class(&bytes)?;
		let out = dump(&class)?;

		assert!(out.starts_with("class Main (version 52.0)\n  extends java/lang/Object\nconstant pool:\n"), "{out}");
		assert!(out.contains("method add(II)I\n  max_stack = 16, max_locals = 2\n      0: iload_0\n      1: iload_1\n      2: iadd\n      3: ireturn\n"), "{out}");
		Ok(())
	}
}
