use std::path::Path;

use ebnfgen_codegen::GeneratedCodeWriter;
use pretty_assertions::assert_eq;
use ebnfgen_grammar::Grammar;
use ebnfgen_input::parse_grammar_file;

use super::{generate, sanitize_identifier, CodeWriter, EmitError};

fn finalized(source: &str) -> Grammar {
    let file = parse_grammar_file(source).unwrap();
    let mut grammar = Grammar::from_grammar_file(file).unwrap();
    grammar.finalize();
    grammar
}

fn render(grammar: &Grammar) -> (String, String) {
    let writer = CodeWriter::new(
        grammar,
        String::from("TestParser"),
        String::from("TestParser.hpp"),
    );
    let mut header = Vec::new();
    writer.write_header(&mut header).unwrap();
    let mut source = Vec::new();
    writer.write_impl(&mut source).unwrap();
    (
        String::from_utf8(header).unwrap(),
        String::from_utf8(source).unwrap(),
    )
}

#[test]
fn test_sanitize_identifier() {
    assert_eq!(sanitize_identifier("E"), "E");
    assert_eq!(sanitize_identifier("E'"), "E_");
    assert_eq!(sanitize_identifier("my-parser"), "my_parser");
    assert_eq!(sanitize_identifier("1st"), "_1st");
}

#[test]
fn test_header_declares_parser_class() {
    let grammar = finalized("T: a\nNT: S\nP:\nS ::= a\n");
    let (header, _) = render(&grammar);
    assert!(header.contains("class TestParser {"));
    assert!(header.contains("void start_parsing();"));
    assert!(header.contains("void parse_tree_gnu_plot();"));
    assert!(header.contains("void parse_S(ParseTreeNode* parse_tree_parent);"));
    assert!(header.contains("class VirtualLexer {"));
    assert!(header.contains("virtual LexerToken& peek_next_token() = 0;"));
}

#[test]
fn test_impl_starts_at_start_symbol() {
    let grammar = finalized("T: a\nNT: S\nP:\nS ::= a\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("#include \"TestParser.hpp\""));
    assert!(source.contains("parse_S(parse_tree_root);"));
    assert!(source.contains("// S ::= a"));
    assert!(source.contains("void TestParser::parse_S(ParseTreeNode* parse_tree_parent) {"));
}

#[test]
fn test_terminal_match_by_lexeme() {
    let grammar = finalized("T: a\nNT: S\nP:\nS ::= a\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("next_token = lexer.get_next_token();"));
    assert!(source.contains("if (next_token.get_lexeme() == \"a\") {"));
    assert!(source.contains("new_node->add_child(new ParseTreeNode(\"a\"));"));
    assert!(source.contains("parsing_error(next_token, \"a\");"));
}

#[test]
fn test_predefined_terminals_match_by_token_type() {
    let grammar = finalized("T: ;\nNT: S\nP:\nS ::= identifier numeric_constant string_literal ;\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("if (next_token.get_token_type() == \"IDENTIFIER\") {"));
    assert!(source.contains("if (next_token.get_token_type() == \"NUMERIC_CONSTANT\") {"));
    assert!(source.contains("if (next_token.get_token_type() == \"STRING_LITERAL\") {"));
    assert!(source.contains("ParseTreeNode* tmp_node = new ParseTreeNode(\"IDENTIFIER\");"));
    assert!(source.contains("tmp_node->add_child(new ParseTreeNode(next_token.get_lexeme()));"));
}

#[test]
fn test_nullable_or_gets_epsilon_fallback() {
    let grammar = finalized("T: +, n\nNT: E, E'\nP:\nE ::= n E'\nE' ::= + n E' | epsilon\n");
    let (header, source) = render(&grammar);
    // E' is sanitized into a valid C++ identifier.
    assert!(header.contains("void parse_E_(ParseTreeNode* parse_tree_parent);"));
    assert!(source.contains("void TestParser::parse_E_(ParseTreeNode* parse_tree_parent) {"));
    assert!(source.contains("if (next_token.get_lexeme() == \"+\") {"));
    assert!(source.contains(" else {"));
    assert!(source.contains("new_node->add_child(new ParseTreeNode(\"epsilon\"));"));
}

#[test]
fn test_or_without_epsilon_reports_error() {
    let grammar = finalized("T: a, b\nNT: S\nP:\nS ::= a | b\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("if (next_token.get_lexeme() == \"a\") {"));
    assert!(source.contains(" else if (next_token.get_lexeme() == \"b\") {"));
    assert!(source.contains("parsing_error(next_token, \"a | b\");"));
}

#[test]
fn test_repeat_emits_while_loop() {
    let grammar = finalized("T: ;, id\nNT: P, S\nP:\nP ::= { S }\nS ::= id ;\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("while (next_token.get_lexeme() == \"id\") {"));
    assert!(source.contains("parse_S(new_node);"));
}

#[test]
fn test_optional_emits_single_if() {
    let grammar = finalized("T: a, b\nNT: S\nP:\nS ::= [ a ] b\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("next_token = lexer.peek_next_token();"));
    assert!(source.contains("if (next_token.get_lexeme() == \"a\") {"));
    assert!(!source.contains("while (next_token"));
}

#[test]
fn test_group_emits_child_inline() {
    let grammar = finalized("T: a, b, c\nNT: S\nP:\nS ::= ( a | b ) c\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("if (next_token.get_lexeme() == \"a\") {"));
    assert!(source.contains(" else if (next_token.get_lexeme() == \"b\") {"));
}

#[test]
fn test_terminal_names_escaped_in_string_literals() {
    let grammar = finalized("T: \\|, \\{\nNT: X\nP:\nX ::= \\| \\{\n");
    let (_, source) = render(&grammar);
    assert!(source.contains("if (next_token.get_lexeme() == \"|\") {"));
    assert!(source.contains("if (next_token.get_lexeme() == \"{\") {"));
}

#[test]
fn test_missing_production_aborts_before_writing() {
    let grammar = finalized("T: a\nNT: S, Q\nP:\nS ::= a\n");
    let mut gen = GeneratedCodeWriter::new();
    // Validation fails before any output path is opened, so the unwritable
    // stem is never touched.
    let result = generate(&grammar, Path::new("/nonexistent/OutputParser"), &mut gen);
    match result {
        Err(EmitError::MissingProduction(nonterminal)) => assert_eq!(nonterminal, "Q"),
        other => panic!("expected missing production error, got {:?}", other),
    }
}
