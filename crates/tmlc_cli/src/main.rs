//! `tmlc`: the command-line driver tying the library crate's phases
//! (lexer -> parser -> type checker -> borrow checker -> monomorphizer ->
//! emitter) into `check`/`emit-llvm`/`build` subcommands. Diagnostics use
//! each phase's own `Display` impl; this binary is the only place
//! `anyhow::Result` and `log` appear, since the library crate's own
//! errors are hand-rolled enums with no `anyhow`/`thiserror` dependency.

mod cli;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context as _};
use inkwell::context::Context;
use log::{debug, error, info};

use cli::{BuildArgs, Cli, Commands, EmitArgs, SourceArgs};
use tmlc_core::borrow;
use tmlc_core::lexer::Lexer;
use tmlc_core::parser::parse_module;
use tmlc_core::registry::ModuleRegistry;
use tmlc_core::typechecker::{self, TypeTable};

const DEFAULT_TARGET_TRIPLE: &str = "x86_64-unknown-linux-gnu";

fn main() -> anyhow::Result<()> {
    let args = Cli::init();
    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    match &args.command {
        Commands::Check(source) => run_check(source),
        Commands::EmitLlvm(emit) => run_emit_llvm(emit),
        Commands::Build(build) => run_build(build),
    }
}

/// One module's worth of checked state: the parsed tree, its registry
/// entry and the type table the checker/borrow checker produced for it.
/// The CLI compiles every input file as a single concatenated module
/// rather than one module per file, since `NodeId` allocation starts
/// fresh inside each `parse_module` call and the checker/emitter key their
/// per-node tables by that id — merging tables from independently parsed
/// modules would silently collide. A real multi-module build is exercised
/// by the library's own tests, which construct each module's `NodeIdGen`
/// themselves; see `DESIGN.md`.
fn load_program(source: &SourceArgs) -> anyhow::Result<(ModuleRegistry, TypeTable, tmlc_core::ast::Module)> {
    let mut combined_source = String::new();
    for file in &source.files {
        let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        combined_source.push_str(&text);
        combined_source.push('\n');
    }

    let module_path = module_path_for(&source.files);
    debug!("lexing {} file(s) as module '{}'", source.files.len(), module_path.join("::"));

    let tokens = Lexer::new(&combined_source).lex().map_err(|e| anyhow!(e.to_string()))?;
    let module = parse_module(tokens, module_path).map_err(|e| anyhow!(e.to_string()))?;

    let mut registry = ModuleRegistry::new();
    registry.insert_module(&module);

    let outcome = typechecker::check_module(&registry, &module);
    if !outcome.errors.is_empty() {
        for err in &outcome.errors {
            error!("{err}");
        }
        bail!("{} type error(s)", outcome.errors.len());
    }

    let borrow_outcome = borrow::check_module(&registry, &outcome.types, &module);
    if !borrow_outcome.errors.is_empty() {
        for err in &borrow_outcome.errors {
            error!("{err}");
        }
        bail!("{} borrow error(s)", borrow_outcome.errors.len());
    }

    Ok((registry, outcome.types, module))
}

fn module_path_for(files: &[PathBuf]) -> Vec<String> {
    files
        .first()
        .and_then(|f| f.file_stem())
        .map(|s| vec![s.to_string_lossy().into_owned()])
        .unwrap_or_else(|| vec!["main".to_string()])
}

fn run_check(source: &SourceArgs) -> anyhow::Result<()> {
    let (_registry, _types, _module) = load_program(source)?;
    info!("no errors");
    Ok(())
}

/// Runs lexer through emitter and returns the produced textual IR, without
/// deciding where it ends up — shared by `emit-llvm` (prints/writes it
/// directly) and `build` (writes it to a sibling `.ll` before invoking
/// `clang`).
fn compile_to_ir(source: &SourceArgs, target_triple: Option<&str>) -> anyhow::Result<String> {
    let (registry, types, _module) = load_program(source)?;
    let program = tmlc_core::monomorphize::monomorphize(&registry, &types);

    let target_triple = target_triple.unwrap_or(DEFAULT_TARGET_TRIPLE);
    let module_name = module_path_for(&source.files).join("::");

    let context = Context::create();
    Ok(tmlc_core::codegen::emit_module(&context, &module_name, target_triple, &registry, &program, &types))
}

fn run_emit_llvm(emit: &EmitArgs) -> anyhow::Result<()> {
    let ir = compile_to_ir(&emit.source, emit.target_triple.as_deref())?;

    match &emit.output {
        Some(path) => fs::write(path, &ir).with_context(|| format!("writing {}", path.display()))?,
        None => print!("{ir}"),
    }

    Ok(())
}

fn run_build(build: &BuildArgs) -> anyhow::Result<()> {
    let ir = compile_to_ir(&build.source, build.target_triple.as_deref())?;

    let ir_path = build.output.with_extension("ll");
    fs::write(&ir_path, &ir).with_context(|| format!("writing {}", ir_path.display()))?;

    let status = clang_command(&ir_path, build).status().context("spawning clang")?;

    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }

    info!("wrote {}", build.output.display());
    Ok(())
}

fn clang_command(ir_path: &Path, build: &BuildArgs) -> Command {
    let mut cmd = Command::new("clang");
    cmd.arg(ir_path).arg("-o").arg(&build.output).arg(build.opt.as_clang_flag());

    if let Some(triple) = &build.target_triple {
        cmd.arg(format!("--target={triple}"));
    }
    if build.debug_info {
        cmd.arg("-g");
    }
    if build.pic {
        cmd.arg("-fPIC");
    }

    cmd
}
