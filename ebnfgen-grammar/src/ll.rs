use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

use ebnfgen_input::{EbnfNode, EPSILON};

use crate::grammar::Grammar;

/// A violation of the LL(1) condition. Any conflict aborts parser emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlConflict {
    FirstFirst { nonterminal: String, symbol: String },
    FirstFollow { nonterminal: String, symbol: String },
    EmptyFirstSet { nonterminal: String },
}

impl Error for LlConflict {}

impl Display for LlConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LlConflict::FirstFirst { nonterminal, symbol } => write!(
                f,
                "First/First conflict for nonterminal `{}`: symbol `{}` can begin more than one alternative",
                nonterminal, symbol
            ),
            LlConflict::FirstFollow { nonterminal, symbol } => write!(
                f,
                "First/Follow conflict for nonterminal `{}`: symbol `{}` appears in both the First and the Follow set while `epsilon` is in the First set",
                nonterminal, symbol
            ),
            LlConflict::EmptyFirstSet { nonterminal } => write!(
                f,
                "nonterminal `{}` cannot derive any terminal string",
                nonterminal
            ),
        }
    }
}

/// Check that the finalized grammar can be driven by one token of
/// lookahead. All conflicts found in the grammar are reported together.
pub fn check_grammar(grammar: &Grammar) -> Result<(), Vec<LlConflict>> {
    let mut conflicts = Vec::new();
    for (nonterminal, production) in grammar.productions() {
        let Some(tree) = production else {
            // A missing production is the emitter's problem, not an LL(1)
            // conflict.
            continue;
        };
        let empty_set = BTreeSet::new();
        let first_set = grammar.first_set(nonterminal).unwrap_or(&empty_set);
        if first_set.is_empty() {
            conflicts.push(LlConflict::EmptyFirstSet {
                nonterminal: nonterminal.to_string(),
            });
        }
        if first_set.contains(EPSILON) {
            if let Some(follow_set) = grammar.follow_set(nonterminal) {
                for symbol in first_set.intersection(follow_set) {
                    if symbol != EPSILON {
                        conflicts.push(LlConflict::FirstFollow {
                            nonterminal: nonterminal.to_string(),
                            symbol: symbol.clone(),
                        });
                    }
                }
            }
        }
        check_or_nodes(grammar, nonterminal, tree, &mut conflicts);
    }
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(conflicts)
    }
}

fn check_or_nodes(
    grammar: &Grammar,
    nonterminal: &str,
    node: &EbnfNode,
    conflicts: &mut Vec<LlConflict>,
) {
    match node {
        EbnfNode::Sequence { elements } => {
            for element in elements {
                check_or_nodes(grammar, nonterminal, element, conflicts);
            }
        }
        EbnfNode::Or { alternatives } => {
            // The First sets of the alternatives must be pairwise disjoint,
            // epsilon included: two nullable alternatives are just as
            // ambiguous as two alternatives sharing a token.
            let mut seen: Vec<BTreeSet<String>> = Vec::new();
            for alternative in alternatives {
                let first_of_alternative = grammar.first_of(alternative);
                for earlier in &seen {
                    for symbol in earlier.intersection(&first_of_alternative) {
                        conflicts.push(LlConflict::FirstFirst {
                            nonterminal: nonterminal.to_string(),
                            symbol: symbol.clone(),
                        });
                    }
                }
                seen.push(first_of_alternative);
            }
            for alternative in alternatives {
                check_or_nodes(grammar, nonterminal, alternative, conflicts);
            }
        }
        EbnfNode::Optional { inner } | EbnfNode::Repeat { inner } | EbnfNode::Group { inner } => {
            check_or_nodes(grammar, nonterminal, inner, conflicts);
        }
        EbnfNode::Terminal { .. } | EbnfNode::NonTerminal { .. } => {}
    }
}
