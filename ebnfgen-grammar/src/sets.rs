use std::collections::{BTreeMap, BTreeSet};

use ebnfgen_input::{EbnfNode, END_MARKER, EPSILON};

/// First set of a right-hand-side fragment, read against the First sets
/// computed so far.
pub fn first_of_node(
    node: &EbnfNode,
    first_sets: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeSet<String> {
    match node {
        EbnfNode::Terminal { name } => BTreeSet::from([name.clone()]),
        EbnfNode::NonTerminal { name } => first_sets.get(name).cloned().unwrap_or_default(),
        EbnfNode::Sequence { elements } => {
            let mut result_set = BTreeSet::new();
            let mut all_nullable = true;
            for element in elements {
                let first_of_element = first_of_node(element, first_sets);
                let nullable = first_of_element.contains(EPSILON);
                result_set.extend(
                    first_of_element
                        .into_iter()
                        .filter(|symbol| symbol != EPSILON),
                );
                if !nullable {
                    all_nullable = false;
                    break;
                }
            }
            if all_nullable {
                result_set.insert(EPSILON.to_string());
            }
            result_set
        }
        EbnfNode::Or { alternatives } => {
            let mut result_set = BTreeSet::new();
            for alternative in alternatives {
                result_set.extend(first_of_node(alternative, first_sets));
            }
            result_set
        }
        EbnfNode::Optional { inner } | EbnfNode::Repeat { inner } => {
            let mut result_set = first_of_node(inner, first_sets);
            result_set.insert(EPSILON.to_string());
            result_set
        }
        EbnfNode::Group { inner } => first_of_node(inner, first_sets),
    }
}

/// Fix-point computation of the First sets of all produced nonterminals.
pub fn compute_first_sets(
    productions: &BTreeMap<String, Option<EbnfNode>>,
) -> BTreeMap<String, BTreeSet<String>> {
    // init empty first sets
    let mut first_sets: BTreeMap<String, BTreeSet<String>> = productions
        .keys()
        .map(|nonterminal| (nonterminal.clone(), BTreeSet::new()))
        .collect();
    // repeat until no more changes occur
    loop {
        let mut inserted_any = false;
        for (nonterminal, production) in productions {
            let Some(tree) = production else {
                continue;
            };
            let first_of_rhs = first_of_node(tree, &first_sets);
            let first_set = first_sets
                .get_mut(nonterminal)
                .expect("first sets initialized for every nonterminal");
            for symbol in first_of_rhs {
                let was_inserted = first_set.insert(symbol);
                inserted_any = inserted_any || was_inserted;
            }
        }
        // if nothing new was added, we are done
        if !inserted_any {
            break;
        }
    }
    first_sets
}

/// Fix-point computation of the Follow sets of all nonterminals.
///
/// Each production's right-hand side is walked right to left carrying a
/// collection of trailer sets ("what can follow here"); alternation branches
/// contribute multiple candidate follow contexts, which is why a collection
/// is needed rather than a single set.
pub fn compute_follow_sets(
    productions: &BTreeMap<String, Option<EbnfNode>>,
    start_symbol: &str,
    first_sets: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut follow_sets: BTreeMap<String, BTreeSet<String>> = productions
        .keys()
        .map(|nonterminal| (nonterminal.clone(), BTreeSet::new()))
        .collect();
    if let Some(follow_of_start) = follow_sets.get_mut(start_symbol) {
        follow_of_start.insert(END_MARKER.to_string());
    }
    loop {
        let mut inserted_any = false;
        for (nonterminal, production) in productions {
            let Some(tree) = production else {
                continue;
            };
            let mut trailers = vec![follow_sets
                .get(nonterminal)
                .cloned()
                .unwrap_or_default()];
            follow_node(tree, first_sets, &mut follow_sets, &mut trailers, &mut inserted_any);
        }
        if !inserted_any {
            break;
        }
    }
    follow_sets
}

fn follow_node(
    node: &EbnfNode,
    first_sets: &BTreeMap<String, BTreeSet<String>>,
    follow_sets: &mut BTreeMap<String, BTreeSet<String>>,
    trailers: &mut Vec<BTreeSet<String>>,
    inserted_any: &mut bool,
) {
    match node {
        EbnfNode::Terminal { name } => {
            trailers.clear();
            trailers.push(BTreeSet::from([name.clone()]));
        }
        EbnfNode::NonTerminal { name } => {
            if let Some(follow_set) = follow_sets.get_mut(name) {
                for trailer in trailers.iter() {
                    for symbol in trailer {
                        let was_inserted = follow_set.insert(symbol.clone());
                        *inserted_any = *inserted_any || was_inserted;
                    }
                }
            }
            let first_set = first_sets.get(name).cloned().unwrap_or_default();
            if first_set.contains(EPSILON) {
                for trailer in trailers.iter_mut() {
                    trailer.extend(
                        first_set
                            .iter()
                            .filter(|symbol| *symbol != EPSILON)
                            .cloned(),
                    );
                }
            } else {
                trailers.clear();
                trailers.push(first_set);
            }
        }
        EbnfNode::Sequence { elements } => {
            for element in elements.iter().rev() {
                follow_node(element, first_sets, follow_sets, trailers, inserted_any);
            }
        }
        EbnfNode::Or { alternatives } => {
            // Everything that follows the alternation follows each
            // alternative, so each branch walks a private copy.
            let incoming = trailers.clone();
            let mut outgoing = Vec::new();
            for alternative in alternatives {
                let mut branch = incoming.clone();
                follow_node(alternative, first_sets, follow_sets, &mut branch, inserted_any);
                outgoing.extend(branch);
            }
            *trailers = outgoing;
        }
        EbnfNode::Optional { inner } => {
            let mut branch = trailers.clone();
            follow_node(inner, first_sets, follow_sets, &mut branch, inserted_any);
            trailers.extend(branch);
        }
        EbnfNode::Repeat { inner } => {
            let mut branch = trailers.clone();
            // The last symbol of the body may be followed by the next
            // iteration of the body itself.
            let iteration: BTreeSet<String> = first_of_node(inner, first_sets)
                .into_iter()
                .filter(|symbol| symbol != EPSILON)
                .collect();
            if !iteration.is_empty() {
                branch.push(iteration);
            }
            follow_node(inner, first_sets, follow_sets, &mut branch, inserted_any);
            trailers.extend(branch);
        }
        EbnfNode::Group { inner } => {
            // A mandatory, non-nullable group seals its contents off from
            // the outside context.
            let first_of_group = first_of_node(inner, first_sets);
            let mut branch = if first_of_group.contains(EPSILON) {
                trailers.clone()
            } else {
                Vec::new()
            };
            follow_node(inner, first_sets, follow_sets, &mut branch, inserted_any);
            *trailers = branch;
        }
    }
}
