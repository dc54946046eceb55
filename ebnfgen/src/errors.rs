use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

use ebnfgen_cpp_codegen::EmitError;
use ebnfgen_grammar::{GrammarError, LlConflict};
use ebnfgen_input::InputError;
use owo_colors::OwoColorize;

#[derive(Debug)]
pub enum Severity {
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "{}", "error".bright_red().bold()),
        }
    }
}

/// Any failure of the generation pipeline, tagged with the stage it came
/// from. The driver collects these and the binary prints them.
#[derive(Debug)]
pub enum GeneratorError {
    Io { file: PathBuf, error: io::Error },
    Syntax { file: PathBuf, error: InputError },
    Grammar(GrammarError),
    Conflict(LlConflict),
    Emit(EmitError),
}

impl GeneratorError {
    pub(crate) fn io(file: PathBuf, error: io::Error) -> Self {
        GeneratorError::Io { file, error }
    }

    pub(crate) fn syntax(file: PathBuf, error: InputError) -> Self {
        GeneratorError::Syntax { file, error }
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn message(&self) -> &'static str {
        match self {
            GeneratorError::Io { .. } => "failed to read grammar file",
            GeneratorError::Syntax { .. } => "failed to parse grammar file",
            GeneratorError::Grammar(_) => "invalid grammar",
            GeneratorError::Conflict(_) => "grammar cannot be parsed with one token of lookahead",
            GeneratorError::Emit(_) => "parser generation failed",
        }
    }
}

impl Error for GeneratorError {}

impl Display for GeneratorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {}", self.severity(), self.message())?;
        match self {
            GeneratorError::Io { file, error } => {
                write!(f, "     file: {}\n     reason: {}", file.display(), error)
            }
            GeneratorError::Syntax { file, error } => {
                write!(f, "     file: {}\n     reason: {}", file.display(), error)
            }
            GeneratorError::Grammar(error) => write!(f, "     reason: {}", error),
            GeneratorError::Conflict(conflict) => write!(f, "     reason: {}", conflict),
            GeneratorError::Emit(error) => write!(f, "     reason: {}", error),
        }
    }
}
