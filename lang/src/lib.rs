//! Skein: a small statically typed scripting language for embedding in host
//! applications. Scripts are compiled to compact bytecode ahead of time and run by a VM
//! that reaches the host only through [`vm::Callbacks`].

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod parser;
pub mod runtime;
pub mod source;
pub mod types;
pub mod vm;
