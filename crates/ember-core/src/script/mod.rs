//! Ember script front end: source text to [`Proto`].

pub mod ast;
pub mod codegen;
pub mod diagnostic;
pub mod lexer;
pub mod parser;

pub use diagnostic::Diagnostic;

use crate::bytecode::Proto;

/// Compile a source chunk into its main function prototype
pub fn compile(chunk: &str, source: &str) -> Result<Proto, Diagnostic> {
    let tokens = lexer::tokenize(chunk, source)?;
    let block = parser::Parser::new(chunk, tokens).parse_chunk()?;
    let proto = codegen::CodeGen::new(chunk).generate(&block)?;
    tracing::debug!(chunk, functions = proto.protos.len(), "compiled chunk");
    Ok(proto)
}
