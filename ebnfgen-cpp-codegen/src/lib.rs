use std::path::Path;

use ebnfgen_codegen::GeneratedCodeWriter;
use ebnfgen_grammar::Grammar;

pub use parser::EmitError;

mod parser;

pub struct CppParserCodeGen {}

impl CppParserCodeGen {
    pub fn new() -> Self {
        CppParserCodeGen {}
    }

    /// Emit the recursive-descent parser for a finalized grammar as
    /// `<stem>.hpp` and `<stem>.cpp`.
    pub fn generate_parser(
        &self,
        grammar: &Grammar,
        output_stem: &Path,
        gen: &mut GeneratedCodeWriter,
    ) -> Result<(), EmitError> {
        parser::generate(grammar, output_stem, gen)
    }
}

impl Default for CppParserCodeGen {
    fn default() -> Self {
        Self::new()
    }
}
