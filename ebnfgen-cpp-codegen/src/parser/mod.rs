use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ebnfgen_codegen::{GeneratedCodeWriter, Template};
use ebnfgen_grammar::Grammar;
use ebnfgen_input::{EbnfNode, EPSILON};
use tracing::{error, info, trace};

#[derive(Debug)]
pub enum EmitError {
    MissingProduction(String),
    MalformedTree(String),
    NoStartSymbol,
    Io(io::Error),
}

impl Error for EmitError {}

impl Display for EmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitError::MissingProduction(nonterminal) => {
                write!(f, "no productions defined for nonterminal `{}`", nonterminal)
            }
            EmitError::MalformedTree(nonterminal) => write!(
                f,
                "internal error: the production of `{}` is not rooted in a sequence",
                nonterminal
            ),
            EmitError::NoStartSymbol => write!(f, "the grammar has no start symbol"),
            EmitError::Io(err) => write!(f, "failed to write generated parser: {}", err),
        }
    }
}

impl From<io::Error> for EmitError {
    fn from(err: io::Error) -> Self {
        EmitError::Io(err)
    }
}

fn sanitize_identifier(name: &str) -> String {
    let mut identifier: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if identifier.is_empty() || identifier.starts_with(|ch: char| ch.is_ascii_digit()) {
        identifier.insert(0, '_');
    }
    identifier
}

fn cpp_string_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn predefined_token_type(name: &str) -> Option<&'static str> {
    match name {
        "identifier" => Some("IDENTIFIER"),
        "numeric_constant" => Some("NUMERIC_CONSTANT"),
        "string_literal" => Some("STRING_LITERAL"),
        _ => None,
    }
}

fn indent(output: &mut dyn Write, level: usize) -> io::Result<()> {
    for _ in 0..level {
        write!(output, "\t")?;
    }
    Ok(())
}

struct CodeWriter<'parser> {
    grammar: &'parser Grammar,
    class_name: String,
    header_file_name: String,
    parse_fn_names: BTreeMap<String, String>,
    header_template: Template<'static>,
    impl_template: Template<'static>,
}

impl<'parser> CodeWriter<'parser> {
    fn new(grammar: &'parser Grammar, class_name: String, header_file_name: String) -> Self {
        let mut parse_fn_names = BTreeMap::new();
        let mut used = BTreeSet::new();
        for nonterminal in grammar.nonterminals() {
            let sanitized = sanitize_identifier(nonterminal);
            let mut candidate = sanitized.clone();
            let mut suffix = 1;
            while !used.insert(candidate.clone()) {
                suffix += 1;
                candidate = format!("{}_{}", sanitized, suffix);
            }
            parse_fn_names.insert(nonterminal.to_string(), candidate);
        }
        CodeWriter {
            grammar,
            class_name,
            header_file_name,
            parse_fn_names,
            header_template: Template::new(include_str!("parser_header.tpl")),
            impl_template: Template::new(include_str!("parser_impl.tpl")),
        }
    }

    fn parse_fn_name(&self, nonterminal: &str) -> &str {
        self.parse_fn_names
            .get(nonterminal)
            .expect("every declared nonterminal has a parse function name")
    }

    fn write_header(&self, output: &mut dyn Write) -> io::Result<()> {
        let mut writer = self.header_template.writer();
        let include_guard = self.class_name.to_uppercase();
        writer.substitute("include_guard", move |w| write!(w, "{}", include_guard));
        writer.substitute("class_name", |w| write!(w, "{}", self.class_name));
        writer.substitute("parse_function_declarations", |w| {
            self.write_parse_function_declarations(w)
        });
        writer.write(output)
    }

    fn write_impl(&self, output: &mut dyn Write) -> io::Result<()> {
        let start_symbol = self
            .grammar
            .start_symbol()
            .expect("emission is gated on a start symbol");
        let mut writer = self.impl_template.writer();
        writer.substitute("header_file_name", |w| {
            write!(w, "{}", self.header_file_name)
        });
        writer.substitute("class_name", |w| write!(w, "{}", self.class_name));
        writer.substitute("start_symbol", |w| {
            write!(w, "{}", self.parse_fn_name(start_symbol))
        });
        writer.substitute("parse_functions", |w| self.write_parse_functions(w));
        writer.write(output)
    }

    fn write_parse_function_declarations(&self, output: &mut dyn Write) -> io::Result<()> {
        for nonterminal in self.grammar.nonterminals() {
            writeln!(
                output,
                "\t\tvoid parse_{}(ParseTreeNode* parse_tree_parent);",
                self.parse_fn_name(nonterminal)
            )?;
        }
        Ok(())
    }

    fn write_parse_functions(&self, output: &mut dyn Write) -> io::Result<()> {
        for (nonterminal, production) in self.grammar.productions() {
            let tree = production.expect("emission is gated on complete productions");
            self.write_parse_function(nonterminal, tree, output)?;
        }
        Ok(())
    }

    fn write_parse_function(
        &self,
        nonterminal: &str,
        tree: &EbnfNode,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        trace!("Generating parse function for `{}`", nonterminal);
        writeln!(output, "// {} ::= {}", nonterminal, tree)?;
        writeln!(
            output,
            "void {}::parse_{}(ParseTreeNode* parse_tree_parent) {{",
            self.class_name,
            self.parse_fn_name(nonterminal)
        )?;
        writeln!(output, "\tLexerToken next_token = lexer.peek_next_token();")?;
        writeln!(output)?;
        writeln!(
            output,
            "\tParseTreeNode* new_node = new ParseTreeNode(\"{}\");",
            cpp_string_escape(nonterminal)
        )?;
        writeln!(output, "\tif (parse_tree_parent == nullptr) {{")?;
        writeln!(output, "\t\tdelete new_node;")?;
        writeln!(
            output,
            "\t\tthrow InternalErrorException(\"Parse tree node pointer is nullptr\");"
        )?;
        writeln!(output, "\t}} else {{")?;
        writeln!(output, "\t\tparse_tree_parent->add_child(new_node);")?;
        writeln!(output, "\t}}")?;
        writeln!(output)?;
        self.write_node(tree, 1, output)?;
        writeln!(output, "}}")?;
        writeln!(output)
    }

    /// First set of a fragment with epsilon stripped: exactly the tokens a
    /// lookahead comparison can be generated for.
    fn lookahead_set(&self, node: &EbnfNode) -> BTreeSet<String> {
        let mut first_set = self.grammar.first_of(node);
        first_set.remove(EPSILON);
        first_set
    }

    fn write_lookahead_condition(
        &self,
        lookahead: &BTreeSet<String>,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        for (i, symbol) in lookahead.iter().enumerate() {
            if i > 0 {
                write!(output, " || ")?;
            }
            match predefined_token_type(symbol) {
                Some(token_type) => {
                    write!(output, "next_token.get_token_type() == \"{}\"", token_type)?
                }
                None => write!(
                    output,
                    "next_token.get_lexeme() == \"{}\"",
                    cpp_string_escape(symbol)
                )?,
            }
        }
        Ok(())
    }

    fn write_node(&self, node: &EbnfNode, level: usize, output: &mut dyn Write) -> io::Result<()> {
        match node {
            EbnfNode::Sequence { elements } => {
                for element in elements {
                    self.write_node(element, level, output)?;
                }
                Ok(())
            }
            EbnfNode::Group { inner } => self.write_node(inner, level, output),
            EbnfNode::Terminal { name } => self.write_terminal(name, level, output),
            EbnfNode::NonTerminal { name } => {
                indent(output, level)?;
                writeln!(output, "parse_{}(new_node);", self.parse_fn_name(name))
            }
            EbnfNode::Or { alternatives } => self.write_or(node, alternatives, level, output),
            EbnfNode::Repeat { inner } => self.write_repeat(inner, level, output),
            EbnfNode::Optional { inner } => self.write_optional(inner, level, output),
        }
    }

    fn write_terminal(&self, name: &str, level: usize, output: &mut dyn Write) -> io::Result<()> {
        if name == EPSILON {
            indent(output, level)?;
            writeln!(output, "// Produces epsilon so no token is consumed")?;
            indent(output, level)?;
            writeln!(output, "new_node->add_child(new ParseTreeNode(\"epsilon\"));")?;
            return Ok(());
        }
        indent(output, level)?;
        writeln!(output, "next_token = lexer.get_next_token();")?;
        indent(output, level)?;
        match predefined_token_type(name) {
            Some(token_type) => {
                writeln!(
                    output,
                    "if (next_token.get_token_type() == \"{}\") {{",
                    token_type
                )?;
                indent(output, level + 1)?;
                writeln!(
                    output,
                    "ParseTreeNode* tmp_node = new ParseTreeNode(\"{}\");",
                    token_type
                )?;
                indent(output, level + 1)?;
                writeln!(
                    output,
                    "tmp_node->add_child(new ParseTreeNode(next_token.get_lexeme()));"
                )?;
                indent(output, level + 1)?;
                writeln!(output, "new_node->add_child(tmp_node);")?;
            }
            None => {
                writeln!(
                    output,
                    "if (next_token.get_lexeme() == \"{}\") {{",
                    cpp_string_escape(name)
                )?;
                indent(output, level + 1)?;
                writeln!(
                    output,
                    "new_node->add_child(new ParseTreeNode(\"{}\"));",
                    cpp_string_escape(name)
                )?;
            }
        }
        indent(output, level)?;
        writeln!(output, "}} else {{")?;
        indent(output, level + 1)?;
        writeln!(
            output,
            "parsing_error(next_token, \"{}\");",
            cpp_string_escape(name)
        )?;
        indent(output, level)?;
        writeln!(output, "}}")
    }

    fn write_or(
        &self,
        or_node: &EbnfNode,
        alternatives: &[EbnfNode],
        level: usize,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        indent(output, level)?;
        writeln!(output, "next_token = lexer.peek_next_token();")?;
        let mut is_first = true;
        for alternative in alternatives {
            let lookahead = self.lookahead_set(alternative);
            if lookahead.is_empty() {
                // Nothing to compare against; the final else covers it.
                continue;
            }
            if is_first {
                indent(output, level)?;
                write!(output, "if (")?;
                is_first = false;
            } else {
                write!(output, " else if (")?;
            }
            self.write_lookahead_condition(&lookahead, output)?;
            writeln!(output, ") {{")?;
            self.write_node(alternative, level + 1, output)?;
            indent(output, level)?;
            write!(output, "}}")?;
        }
        let or_is_nullable = self.grammar.first_of(or_node).contains(EPSILON);
        if is_first {
            // Every alternative was empty; emit the fallback on its own.
            if or_is_nullable {
                indent(output, level)?;
                writeln!(output, "new_node->add_child(new ParseTreeNode(\"epsilon\"));")?;
            } else {
                indent(output, level)?;
                writeln!(
                    output,
                    "parsing_error(next_token, \"{}\");",
                    cpp_string_escape(&or_node.to_string())
                )?;
            }
            return Ok(());
        }
        writeln!(output, " else {{")?;
        indent(output, level + 1)?;
        if or_is_nullable {
            writeln!(output, "new_node->add_child(new ParseTreeNode(\"epsilon\"));")?;
        } else {
            writeln!(
                output,
                "parsing_error(next_token, \"{}\");",
                cpp_string_escape(&or_node.to_string())
            )?;
        }
        indent(output, level)?;
        writeln!(output, "}}")
    }

    fn write_repeat(
        &self,
        inner: &EbnfNode,
        level: usize,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        let lookahead = self.lookahead_set(inner);
        if lookahead.is_empty() {
            // The body can never start; the whole loop is elided.
            return Ok(());
        }
        indent(output, level)?;
        writeln!(output, "next_token = lexer.peek_next_token();")?;
        indent(output, level)?;
        write!(output, "while (")?;
        self.write_lookahead_condition(&lookahead, output)?;
        writeln!(output, ") {{")?;
        self.write_node(inner, level + 1, output)?;
        indent(output, level + 1)?;
        writeln!(output, "next_token = lexer.peek_next_token();")?;
        indent(output, level)?;
        writeln!(output, "}}")
    }

    fn write_optional(
        &self,
        inner: &EbnfNode,
        level: usize,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        let lookahead = self.lookahead_set(inner);
        if lookahead.is_empty() {
            return Ok(());
        }
        indent(output, level)?;
        writeln!(output, "next_token = lexer.peek_next_token();")?;
        indent(output, level)?;
        write!(output, "if (")?;
        self.write_lookahead_condition(&lookahead, output)?;
        writeln!(output, ") {{")?;
        self.write_node(inner, level + 1, output)?;
        indent(output, level)?;
        writeln!(output, "}}")
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut path = stem.as_os_str().to_os_string();
    path.push(suffix);
    PathBuf::from(path)
}

/// Emit the generated parser for a finalized grammar as `<stem>.hpp` and
/// `<stem>.cpp`. On any failure every file written so far is removed.
pub(crate) fn generate(
    grammar: &Grammar,
    output_stem: &Path,
    gen: &mut GeneratedCodeWriter,
) -> Result<(), EmitError> {
    let start_symbol = grammar.start_symbol().ok_or(EmitError::NoStartSymbol)?;
    for (nonterminal, production) in grammar.productions() {
        match production {
            None => {
                error!("No productions defined for nonterminal `{}`", nonterminal);
                return Err(EmitError::MissingProduction(nonterminal.to_string()));
            }
            Some(EbnfNode::Sequence { .. }) => {}
            Some(_) => return Err(EmitError::MalformedTree(nonterminal.to_string())),
        }
    }
    trace!("Emitting parser for start symbol `{}`", start_symbol);

    let class_name = output_stem
        .file_name()
        .map(|name| sanitize_identifier(&name.to_string_lossy()))
        .unwrap_or_else(|| String::from("Parser"));
    let header_path = with_suffix(output_stem, ".hpp");
    let impl_path = with_suffix(output_stem, ".cpp");
    let header_file_name = header_path
        .file_name()
        .expect("header path has a file name")
        .to_string_lossy()
        .into_owned();

    let code_writer = CodeWriter::new(grammar, class_name, header_file_name);

    info!("Writing header file to `{}`", header_path.display());
    let result = gen
        .generate_code(&header_path, |output| code_writer.write_header(output))
        .and_then(|_| {
            info!("Writing source code file to `{}`", impl_path.display());
            gen.generate_code(&impl_path, |output| code_writer.write_impl(output))
        });
    if let Err(err) = result {
        error!("Generation failed; removing partial output files");
        gen.remove_outputs();
        return Err(EmitError::Io(err));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
