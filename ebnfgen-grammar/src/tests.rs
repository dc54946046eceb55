use std::collections::{BTreeMap, BTreeSet};

use ebnfgen_input::{parse_grammar_file, EbnfNode};
use pretty_assertions::assert_eq;

use crate::grammar::{Grammar, GrammarError};
use crate::ll::{check_grammar, LlConflict};
use crate::sets;

fn finalized(source: &str) -> Grammar {
    let file = parse_grammar_file(source).unwrap();
    let mut grammar = Grammar::from_grammar_file(file).unwrap();
    grammar.finalize();
    grammar
}

fn set(symbols: &[&str]) -> BTreeSet<String> {
    symbols.iter().map(|symbol| symbol.to_string()).collect()
}

const ARITHMETIC: &str = "T: +, *, (, ), n\n\
                          NT: E, E', T, T', F\n\
                          P:\n\
                          E ::= T E'\n\
                          E' ::= + T E' | epsilon\n\
                          T ::= F T'\n\
                          T' ::= * F T' | epsilon\n\
                          F ::= ( E ) | n\n";

#[test]
fn test_arithmetic_first_sets() {
    let grammar = finalized(ARITHMETIC);
    assert_eq!(grammar.first_set("E").unwrap(), &set(&["(", "n"]));
    assert_eq!(grammar.first_set("T").unwrap(), &set(&["(", "n"]));
    assert_eq!(grammar.first_set("F").unwrap(), &set(&["(", "n"]));
    assert_eq!(grammar.first_set("E'").unwrap(), &set(&["+", "epsilon"]));
    assert_eq!(grammar.first_set("T'").unwrap(), &set(&["*", "epsilon"]));
    // Terminals map to themselves.
    assert_eq!(grammar.first_set("+").unwrap(), &set(&["+"]));
}

#[test]
fn test_arithmetic_follow_sets() {
    let grammar = finalized(ARITHMETIC);
    assert_eq!(grammar.follow_set("E").unwrap(), &set(&[")", "eof"]));
    assert_eq!(grammar.follow_set("E'").unwrap(), &set(&[")", "eof"]));
    assert_eq!(grammar.follow_set("T").unwrap(), &set(&["+", ")", "eof"]));
    assert_eq!(grammar.follow_set("T'").unwrap(), &set(&["+", ")", "eof"]));
    assert_eq!(
        grammar.follow_set("F").unwrap(),
        &set(&["+", "*", ")", "eof"])
    );
}

#[test]
fn test_arithmetic_is_ll1() {
    let grammar = finalized(ARITHMETIC);
    assert_eq!(check_grammar(&grammar), Ok(()));
}

#[test]
fn test_eof_only_in_follow_sets() {
    let grammar = finalized(ARITHMETIC);
    assert_eq!(grammar.start_symbol(), Some("E"));
    assert!(grammar.follow_set("E").unwrap().contains("eof"));
    for nonterminal in grammar.nonterminals() {
        assert!(!grammar.first_set(nonterminal).unwrap().contains("eof"));
    }
    for terminal in grammar.terminals() {
        assert!(!grammar.first_set(terminal).unwrap().contains("eof"));
    }
}

#[test]
fn test_first_of_rhs_contained_in_first_of_lhs() {
    let file = parse_grammar_file(ARITHMETIC).unwrap();
    let productions: BTreeMap<String, Option<EbnfNode>> = file
        .productions
        .iter()
        .map(|(lhs, tree)| (lhs.clone(), Some(tree.clone())))
        .collect();
    let first_sets = sets::compute_first_sets(&productions);
    // Re-running the fix point yields identical sets.
    assert_eq!(first_sets, sets::compute_first_sets(&productions));
    for (nonterminal, production) in &productions {
        let first_of_rhs = sets::first_of_node(production.as_ref().unwrap(), &first_sets);
        assert!(first_of_rhs.is_subset(&first_sets[nonterminal]));
    }
}

#[test]
fn test_repeat_grammar_sets() {
    let grammar = finalized("T: ;, id\nNT: P, S\nP:\nP ::= { S }\nS ::= id ;\n");
    assert_eq!(grammar.first_set("P").unwrap(), &set(&["id", "epsilon"]));
    assert_eq!(grammar.first_set("S").unwrap(), &set(&["id"]));
    assert_eq!(grammar.follow_set("S").unwrap(), &set(&["id", "eof"]));
    assert_eq!(check_grammar(&grammar), Ok(()));
}

#[test]
fn test_escaped_meta_first_set() {
    let grammar = finalized("T: \\|, \\{\nNT: X\nP:\nX ::= \\| \\{\n");
    assert_eq!(grammar.first_set("X").unwrap(), &set(&["|"]));
}

#[test]
fn test_first_first_conflict() {
    let grammar = finalized("T: a, b\nNT: S\nP:\nS ::= a b | a\n");
    let conflicts = check_grammar(&grammar).unwrap_err();
    assert_eq!(
        conflicts,
        vec![LlConflict::FirstFirst {
            nonterminal: "S".to_string(),
            symbol: "a".to_string(),
        }]
    );
}

#[test]
fn test_first_follow_conflict() {
    let grammar = finalized("T: a\nNT: S, A\nP:\nS ::= A a\nA ::= a | epsilon\n");
    assert_eq!(grammar.first_set("A").unwrap(), &set(&["a", "epsilon"]));
    assert_eq!(grammar.follow_set("A").unwrap(), &set(&["a"]));
    let conflicts = check_grammar(&grammar).unwrap_err();
    assert_eq!(
        conflicts,
        vec![LlConflict::FirstFollow {
            nonterminal: "A".to_string(),
            symbol: "a".to_string(),
        }]
    );
}

#[test]
fn test_direct_left_recursion_rejected() {
    let grammar = finalized("T: a\nNT: S\nP:\nS ::= S\n");
    let conflicts = check_grammar(&grammar).unwrap_err();
    assert_eq!(
        conflicts,
        vec![LlConflict::EmptyFirstSet {
            nonterminal: "S".to_string(),
        }]
    );
}

#[test]
fn test_nullable_left_recursion_is_first_follow_conflict() {
    let grammar = finalized("T: a\nNT: S\nP:\nS ::= S a | epsilon\n");
    let conflicts = check_grammar(&grammar).unwrap_err();
    assert!(conflicts.contains(&LlConflict::FirstFollow {
        nonterminal: "S".to_string(),
        symbol: "a".to_string(),
    }));
}

#[test]
fn test_group_sets() {
    let grammar = finalized("T: a, b, c\nNT: S\nP:\nS ::= ( a | b ) c\n");
    assert_eq!(grammar.first_set("S").unwrap(), &set(&["a", "b"]));
    assert_eq!(check_grammar(&grammar), Ok(()));
}

#[test]
fn test_reserved_eof_rejected() {
    let mut grammar = Grammar::new();
    assert_eq!(
        grammar.add_terminal("eof"),
        Err(GrammarError::ReservedSymbol("eof".to_string()))
    );
    assert_eq!(
        grammar.add_nonterminal("eof"),
        Err(GrammarError::ReservedSymbol("eof".to_string()))
    );
}

#[test]
fn test_symbol_kinds_are_exclusive() {
    let mut grammar = Grammar::new();
    grammar.add_terminal("a").unwrap();
    grammar.add_nonterminal("S").unwrap();
    assert_eq!(
        grammar.add_nonterminal("a"),
        Err(GrammarError::AlreadyTerminal("a".to_string()))
    );
    assert_eq!(
        grammar.add_terminal("S"),
        Err(GrammarError::AlreadyNonTerminal("S".to_string()))
    );
    // Duplicates of the same kind warn and keep the first definition.
    grammar.add_terminal("a").unwrap();
    grammar.add_nonterminal("S").unwrap();
    assert!(grammar.is_terminal("a") ^ grammar.is_nonterminal("a"));
    assert!(grammar.is_terminal("S") ^ grammar.is_nonterminal("S"));
}

#[test]
fn test_predefined_terminals_always_present() {
    let grammar = Grammar::new();
    assert!(grammar.is_terminal("identifier"));
    assert!(grammar.is_terminal("numeric_constant"));
    assert!(grammar.is_terminal("string_literal"));
    assert!(grammar.is_terminal("epsilon"));
    assert!(!grammar.is_terminal("eof"));
}

#[test]
fn test_start_symbol_inference_and_override() {
    let mut grammar = Grammar::new();
    grammar.add_terminal("a").unwrap();
    grammar.add_nonterminal("S").unwrap();
    grammar.add_nonterminal("A").unwrap();
    assert_eq!(
        grammar.set_start_symbol("Q"),
        Err(GrammarError::UnknownNonTerminal("Q".to_string()))
    );
    grammar
        .add_production(
            "A",
            EbnfNode::Sequence {
                elements: vec![EbnfNode::Terminal {
                    name: "a".to_string(),
                }],
            },
        )
        .unwrap();
    assert_eq!(grammar.start_symbol(), Some("A"));
    grammar.set_start_symbol("S").unwrap();
    assert_eq!(grammar.start_symbol(), Some("S"));
}

#[test]
fn test_duplicate_production_keeps_first() {
    let grammar = finalized("T: a, b\nNT: S\nP:\nS ::= a\nS ::= b\n");
    assert_eq!(grammar.first_set("S").unwrap(), &set(&["a"]));
}

#[test]
fn test_production_with_undeclared_symbol_rejected() {
    let mut grammar = Grammar::new();
    grammar.add_nonterminal("S").unwrap();
    let result = grammar.add_production(
        "S",
        EbnfNode::Sequence {
            elements: vec![EbnfNode::Terminal {
                name: "ghost".to_string(),
            }],
        },
    );
    assert_eq!(
        result,
        Err(GrammarError::UndeclaredSymbol {
            nonterminal: "S".to_string(),
            symbol: "ghost".to_string(),
        })
    );
}

#[test]
fn test_finalize_latches_grammar() {
    let mut grammar = Grammar::new();
    grammar.add_terminal("a").unwrap();
    grammar.add_nonterminal("S").unwrap();
    grammar
        .add_production(
            "S",
            EbnfNode::Sequence {
                elements: vec![EbnfNode::Terminal {
                    name: "a".to_string(),
                }],
            },
        )
        .unwrap();
    assert!(!grammar.is_final());
    assert!(grammar.first_set("S").is_none());
    grammar.finalize();
    assert!(grammar.is_final());
    let first_of_s = grammar.first_set("S").unwrap().clone();

    // Finalize is idempotent and the latch rejects further mutation.
    grammar.finalize();
    assert_eq!(grammar.first_set("S").unwrap(), &first_of_s);
    assert_eq!(
        grammar.add_terminal("b"),
        Err(GrammarError::AlreadyFinalized)
    );
    assert_eq!(
        grammar.add_nonterminal("B"),
        Err(GrammarError::AlreadyFinalized)
    );
    assert_eq!(
        grammar.set_start_symbol("S"),
        Err(GrammarError::AlreadyFinalized)
    );
}

#[test]
fn test_declared_nonterminal_without_production() {
    let grammar = finalized("T: a\nNT: S, Q\nP:\nS ::= a\n");
    assert!(grammar.is_nonterminal("Q"));
    assert!(grammar.production("Q").is_none());
    assert_eq!(grammar.first_set("Q").unwrap(), &set(&[]));
    // The missing production is not an LL(1) conflict; emission reports it.
    assert_eq!(check_grammar(&grammar), Ok(()));
}
