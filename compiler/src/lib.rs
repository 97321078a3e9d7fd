pub mod lexer;
pub mod ast;
pub mod parser;
pub mod ssa;
pub mod llvm;
pub mod codegen;
pub mod jit;
pub mod session;
pub mod config;
pub mod error;
