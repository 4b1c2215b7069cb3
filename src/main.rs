// quill - A bytecode-compiled scripting language written in Rust
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use quill_parser::Parser;
use quill_vm::builtins::BUILTINS;
use quill_vm::{Compiler, Object, SymbolTable, VM, new_globals};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Quill v0.1.0");
        return;
    }

    // If files provided, run them; otherwise start the REPL
    if args.len() > 1 {
        run_files(&args[1..]);
    } else {
        run_repl();
    }
}

/// Run a sequence of script files.
fn run_files(files: &[String]) {
    for file_path in files {
        if let Err(e) = run_file(file_path) {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

/// Run a single script file.
fn run_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);

    // Validate file extension
    match path.extension().and_then(|e| e.to_str()) {
        Some("ql") => {}
        Some(ext) => {
            return Err(format!(
                "Error: unsupported file extension '.{}' for '{}'",
                ext, file_path
            ));
        }
        None => {
            return Err(format!(
                "Error: file '{}' has no extension (expected .ql)",
                file_path
            ));
        }
    }

    let source =
        fs::read_to_string(path).map_err(|e| format!("Error reading '{}': {}", file_path, e))?;

    let program = Parser::parse_source(&source)
        .map_err(|e| format!("Parse error in '{}': {}", file_path, e))?;

    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .map_err(|e| format!("Compile error in '{}': {}", file_path, e))?;

    let mut vm = VM::new(compiler.bytecode());
    vm.run()
        .map_err(|e| format!("Runtime error in '{}': {}", file_path, e))?;

    Ok(())
}

/// Run the interactive REPL.
///
/// The symbol table, constant pool, and globals vector persist across
/// lines; a failed line is discarded and the loop resumes with state
/// preserved.
fn run_repl() {
    println!("Quill v0.1.0");

    let mut symbols = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        symbols.define_builtin(index, builtin.name);
    }
    let mut constants: Vec<Object> = Vec::new();
    let mut globals = new_globals();

    loop {
        print!(">>>");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = input.trim();
                if line.is_empty() {
                    continue;
                }

                let program = match Parser::parse_source(line) {
                    Ok(program) => program,
                    Err(e) => {
                        println!("\t{}", e);
                        continue;
                    }
                };

                let mut compiler = Compiler::with_state(symbols, constants);
                let compiled = compiler.compile(&program);
                let bytecode = compiler.bytecode();
                let state = compiler.into_state();
                symbols = state.0;
                constants = state.1;
                if let Err(e) = compiled {
                    println!("\t Compilation failed: {}", e);
                    continue;
                }

                let mut vm = VM::with_globals(bytecode, globals);
                let ran = vm.run();
                let last_popped = vm.last_popped();
                globals = vm.into_globals();
                match ran {
                    Ok(()) => println!("{}", last_popped),
                    Err(e) => println!("\t VM failed: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}
