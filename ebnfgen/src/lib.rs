use std::path::Path;

use ebnfgen_codegen::GeneratedCodeWriter;
use ebnfgen_cpp_codegen::CppParserCodeGen;
use ebnfgen_grammar::{ll, Grammar};
use ebnfgen_input::parse_grammar_file;
use tracing::{info, trace};

pub use errors::GeneratorError;

mod errors;

/// Run the whole pipeline: load and parse the grammar description, compute
/// First/Follow, check the LL(1) conditions and emit the `<stem>.hpp` /
/// `<stem>.cpp` parser sources. Stages stop advancing at the first failing
/// one and every diagnostic collected so far is returned.
pub fn generate(grammar_path: &Path, output_stem: &Path) -> Result<(), Vec<GeneratorError>> {
    trace!(
        "Opening file {} for parsing as a grammar definition",
        grammar_path.display()
    );
    let file_contents = std::fs::read_to_string(grammar_path)
        .map_err(|error| vec![GeneratorError::io(grammar_path.to_path_buf(), error)])?;

    let grammar_file = parse_grammar_file(&file_contents)
        .map_err(|error| vec![GeneratorError::syntax(grammar_path.to_path_buf(), error)])?;
    let mut grammar = Grammar::from_grammar_file(grammar_file)
        .map_err(|error| vec![GeneratorError::Grammar(error)])?;

    grammar.finalize();
    grammar.log_grammar();

    ll::check_grammar(&grammar).map_err(|conflicts| {
        conflicts
            .into_iter()
            .map(GeneratorError::Conflict)
            .collect::<Vec<_>>()
    })?;

    info!("Generating parser");
    let mut gen = GeneratedCodeWriter::new();
    let codegen = CppParserCodeGen::new();
    codegen
        .generate_parser(&grammar, output_stem, &mut gen)
        .map_err(|error| vec![GeneratorError::Emit(error)])?;
    Ok(())
}
