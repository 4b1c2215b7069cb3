// quill-vm - Bytecode compiler and virtual machine for the Quill programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass bytecode compiler.
//!
//! Walks the AST and emits instructions into a stack of compilation
//! scopes, one per function body being compiled. Jump operands are
//! emitted as zero and patched in place once the target offset is known;
//! operand widths are fixed, so patching never moves code.

pub mod symbol_table;

use std::fmt;
use std::rc::Rc;

use quill_parser::ast::{Block, Expr, Program, Stmt};

use crate::builtins::BUILTINS;
use crate::code::{self, Instructions, Opcode};
use crate::object::{CompiledFunction, Object};

use symbol_table::{Symbol, SymbolScope, SymbolTable};

/// Error during compilation.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// Reference to a name with no visible definition.
    UndefinedVariable(String),
    /// Operator with no corresponding instruction.
    UnknownOperator(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UndefinedVariable(name) => {
                write!(f, "undefined variable {}", name)
            }
            CompileError::UnknownOperator(op) => write!(f, "unknown operator {}", op),
        }
    }
}

impl std::error::Error for CompileError {}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;

/// The compiler's output: an instruction stream plus the constants it
/// references.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

/// The opcode and byte offset of an already-emitted instruction.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Per-function emission context. Tracks the last two emitted
/// instructions so trailing-pop surgery is O(1).
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Object>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    /// Create a compiler with the builtin registry pre-defined.
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(index, builtin.name);
        }
        Compiler::with_state(symbols, Vec::new())
    }

    /// Create a compiler resuming from a persistent symbol table and
    /// constant pool (REPL sessions).
    pub fn with_state(symbols: SymbolTable, constants: Vec<Object>) -> Self {
        Compiler {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Hand back the symbol table and constant pool for the next
    /// compilation.
    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        (self.symbols, self.constants)
    }

    /// The compiled program.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Compile a program into the current scope.
    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for stmt in &program.stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<()> {
        for stmt in &block.stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Var { name, value } => {
                // The name is defined before the value is compiled so the
                // value can refer to it.
                let symbol = self.symbols.define(name);
                self.compile_expr(value)?;
                self.emit_binding(&symbol);
            }
            Stmt::Return(value) => {
                self.compile_expr(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Integer(n) => {
                let index = self.add_constant(Object::Int(*n));
                self.emit(Opcode::Constant, &[index]);
            }
            Expr::Str(s) => {
                let index = self.add_constant(Object::Str(Rc::from(s.as_str())));
                self.emit(Opcode::Constant, &[index]);
            }
            Expr::Boolean(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expr::Boolean(false) => {
                self.emit(Opcode::False, &[]);
            }
            Expr::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            Expr::Map(pairs) => {
                // Emission order is the lexicographic order of the keys'
                // source text, keeping the bytecode deterministic.
                let mut ordered: Vec<&(Expr, Expr)> = pairs.iter().collect();
                ordered.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in ordered {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::Map, &[pairs.len() * 2]);
            }
            Expr::Prefix { operator, right } => {
                self.compile_expr(right)?;
                match operator.as_str() {
                    "-" => self.emit(Opcode::Minus, &[]),
                    "!" => self.emit(Opcode::Bang, &[]),
                    op => return Err(CompileError::UnknownOperator(op.to_string())),
                };
            }
            Expr::Infix {
                operator,
                left,
                right,
            } => {
                if operator == "<" {
                    // Only a greater-than instruction exists; reverse the
                    // operands instead.
                    self.compile_expr(right)?;
                    self.compile_expr(left)?;
                    self.emit(Opcode::Greater, &[]);
                    return Ok(());
                }
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match operator.as_str() {
                    "+" => self.emit(Opcode::Add, &[]),
                    "-" => self.emit(Opcode::Sub, &[]),
                    "*" => self.emit(Opcode::Mul, &[]),
                    "/" => self.emit(Opcode::Quo, &[]),
                    ">" => self.emit(Opcode::Greater, &[]),
                    "==" => self.emit(Opcode::Equal, &[]),
                    "!=" => self.emit(Opcode::NotEqual, &[]),
                    op => return Err(CompileError::UnknownOperator(op.to_string())),
                };
            }
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expr(condition)?;

                // Placeholder operand, patched once the consequence ends.
                let jump_not_true = self.emit(Opcode::JumpNotTrue, &[0]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    // The branch is an expression; its value stays on the
                    // stack.
                    self.remove_last_pop();
                }

                let jump = self.emit(Opcode::Jump, &[0]);

                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_true, after_consequence);

                match alternative {
                    None => {
                        self.emit(Opcode::Nil, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump, after_alternative);
            }
            Expr::Func { name, params, body } => {
                let symbol = self.symbols.define(name);

                self.enter_scope();
                self.symbols.define_function_self(name);
                for param in params {
                    self.symbols.define(param);
                }

                self.compile_block(body)?;

                // A trailing expression statement becomes the return
                // value; a body that falls through returns nil.
                if self.last_instruction_is(Opcode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Opcode::ReturnValue) {
                    self.emit(Opcode::Return, &[]);
                }

                let (instructions, scope_info) = self.leave_scope();
                for captured in &scope_info.context {
                    self.load_symbol(captured);
                }

                let func = CompiledFunction {
                    instructions,
                    num_locals: scope_info.num_locals,
                    num_parameters: params.len(),
                };
                let index = self.add_constant(Object::Function(Rc::new(func)));
                self.emit(Opcode::Closure, &[index, scope_info.context.len()]);

                self.emit_binding(&symbol);
            }
            Expr::Call { func, args } => {
                self.compile_expr(func)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Opcode::Call, &[args.len()]);
            }
            Expr::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Opcode::Index, &[]);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("compilation scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes
            .last_mut()
            .expect("compilation scope stack is never empty")
    }

    fn add_constant(&mut self, object: Object) -> usize {
        self.constants.push(object);
        self.constants.len() - 1
    }

    /// Emit an instruction into the current scope; returns its byte
    /// offset.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = code::make(op, operands);
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.append(&instruction);
        scope.previous = scope.last;
        scope.last = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    /// Emit the store instruction matching where a symbol was defined.
    fn emit_binding(&mut self, symbol: &Symbol) {
        if symbol.scope == SymbolScope::Global {
            self.emit(Opcode::SetGlobal, &[symbol.index]);
        } else {
            self.emit(Opcode::SetLocal, &[symbol.index]);
        }
    }

    /// Emit the load instruction matching a symbol's scope.
    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Context => self.emit(Opcode::Context, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        match self.current_scope().last {
            Some(last) => last.opcode == op,
            None => false,
        }
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope.last.expect("no instruction to remove");
        scope.instructions.truncate(last.position);
        scope.last = scope.previous;
        scope.previous = None;
    }

    fn replace_instruction(&mut self, position: usize, instruction: &[u8]) {
        self.current_scope_mut()
            .instructions
            .replace(position, instruction);
    }

    fn replace_last_pop_with_return(&mut self) {
        let last = self
            .current_scope()
            .last
            .expect("no instruction to replace");
        self.replace_instruction(last.position, &code::make(Opcode::ReturnValue, &[]));
        self.current_scope_mut().last = Some(EmittedInstruction {
            opcode: Opcode::ReturnValue,
            position: last.position,
        });
    }

    /// Rewrite the operand of the instruction at `position`. The new
    /// encoding has the same footprint, so no offsets move.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let byte = self.current_scope().instructions.as_bytes()[position];
        let op = Opcode::from_byte(byte).expect("patching an undefined opcode");
        self.replace_instruction(position, &code::make(op, &[operand]));
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbols.push_scope();
    }

    fn leave_scope(&mut self) -> (Instructions, symbol_table::ScopeInfo) {
        let scope = self.scopes.pop().expect("compilation scope underflow");
        let info = self.symbols.pop_scope();
        (scope.instructions, info)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
