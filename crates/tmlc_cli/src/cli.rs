//! Command-line argument surface for `tmlc`, following the same
//! `clap::Parser`-derived shape across subcommands rather than hand-rolled
//! argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "tmlc", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level of the compiler itself (not the generated program's `TML_LOG`).
    #[arg(value_enum, short, long, global = true, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    #[default]
    #[value(alias("0"))]
    Error,
    #[value(alias("1"))]
    Warn,
    #[value(alias("2"))]
    Info,
    #[value(alias("3"))]
    Debug,
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// `-O{0|1|2|3|s|z}`, carried straight through to `clang` by `build`;
/// `emit-llvm` accepts and records it but never runs an optimization pass
/// of its own (the emitter always lowers to unoptimized IR, matching
/// `codegen::emit_module`'s single textual pass).
#[derive(ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum OptLevel {
    #[default]
    #[value(name = "0")]
    O0,
    #[value(name = "1")]
    O1,
    #[value(name = "2")]
    O2,
    #[value(name = "3")]
    O3,
    #[value(name = "s")]
    Os,
    #[value(name = "z")]
    Oz,
}

impl OptLevel {
    pub fn as_clang_flag(&self) -> &'static str {
        match self {
            OptLevel::O0 => "-O0",
            OptLevel::O1 => "-O1",
            OptLevel::O2 => "-O2",
            OptLevel::O3 => "-O3",
            OptLevel::Os => "-Os",
            OptLevel::Oz => "-Oz",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run lexer -> parser -> type checker -> borrow checker and print
    /// diagnostics; exits non-zero on any error-severity diagnostic.
    Check(SourceArgs),

    /// Run the full pipeline through the monomorphizer and emitter and
    /// write textual LLVM IR.
    EmitLlvm(EmitArgs),

    /// Same as `emit-llvm`, plus shelling out to `clang` to assemble and
    /// link the result into an object file, static/shared library or
    /// executable.
    Build(BuildArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source files making up the program, in compilation order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EmitArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Where to write the `.ll` text; defaults to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// LLVM target triple to emit for; defaults to the host triple.
    #[arg(long = "target")]
    pub target_triple: Option<String>,

    #[arg(short = 'O', value_enum, default_value_t = OptLevel::default())]
    pub opt: OptLevel,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Path of the produced artifact (object file, library or executable,
    /// depending on `clang`'s own inference from the extension).
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long = "target")]
    pub target_triple: Option<String>,

    #[arg(short = 'O', value_enum, default_value_t = OptLevel::default())]
    pub opt: OptLevel,

    /// Emit debug info (`clang -g`).
    #[arg(short = 'g', long)]
    pub debug_info: bool,

    /// Position-independent code (`clang -fPIC`).
    #[arg(long = "fpic")]
    pub pic: bool,
}
