use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

use ebnfgen_input::{EbnfNode, GrammarFile, END_MARKER, EPSILON, PREDEFINED_TERMINALS};
use tracing::{error, info, trace, warn};

use crate::sets;

#[derive(Debug, PartialEq, Eq)]
pub enum GrammarError {
    ReservedSymbol(String),
    AlreadyTerminal(String),
    AlreadyNonTerminal(String),
    UnknownNonTerminal(String),
    UndeclaredSymbol { nonterminal: String, symbol: String },
    AlreadyFinalized,
}

impl Error for GrammarError {}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GrammarError::ReservedSymbol(name) => {
                write!(f, "the symbol `{}` is reserved and cannot be declared", name)
            }
            GrammarError::AlreadyTerminal(name) => write!(
                f,
                "attempting to add nonterminal `{}` but it is already declared as a terminal",
                name
            ),
            GrammarError::AlreadyNonTerminal(name) => write!(
                f,
                "attempting to add terminal `{}` but it is already declared as a nonterminal",
                name
            ),
            GrammarError::UnknownNonTerminal(name) => {
                write!(f, "`{}` is not declared as a nonterminal", name)
            }
            GrammarError::UndeclaredSymbol { nonterminal, symbol } => write!(
                f,
                "production for `{}` references `{}` which is neither a terminal nor a nonterminal",
                nonterminal, symbol
            ),
            GrammarError::AlreadyFinalized => {
                write!(f, "the grammar is finalized and can no longer be modified")
            }
        }
    }
}

/// The grammar under construction: declared symbol sets, at most one
/// right-hand-side tree per nonterminal, and — after [`Grammar::finalize`] —
/// the First and Follow sets.
///
/// The grammar grows monotonically through the `add_*` operations until
/// `finalize` flips the immutability latch; every mutation afterwards fails
/// with [`GrammarError::AlreadyFinalized`].
#[derive(Debug)]
pub struct Grammar {
    terminals: BTreeSet<String>,
    nonterminals: BTreeSet<String>,
    productions: BTreeMap<String, Option<EbnfNode>>,
    start_symbol: Option<String>,
    first_sets: BTreeMap<String, BTreeSet<String>>,
    follow_sets: BTreeMap<String, BTreeSet<String>>,
    is_final: bool,
}

impl Grammar {
    pub fn new() -> Self {
        let mut terminals = BTreeSet::new();
        for name in PREDEFINED_TERMINALS {
            terminals.insert(name.to_string());
        }
        terminals.insert(EPSILON.to_string());
        Grammar {
            terminals,
            nonterminals: BTreeSet::new(),
            productions: BTreeMap::new(),
            start_symbol: None,
            first_sets: BTreeMap::new(),
            follow_sets: BTreeMap::new(),
            is_final: false,
        }
    }

    /// Build a grammar from a parsed grammar file. A declaration clashing
    /// with the other symbol kind keeps its first kind and is logged; every
    /// other error aborts the load.
    pub fn from_grammar_file(file: GrammarFile) -> Result<Self, GrammarError> {
        let mut grammar = Grammar::new();
        for name in &file.terminals {
            grammar.add_terminal(name)?;
        }
        for name in &file.nonterminals {
            if let Err(err) = grammar.add_nonterminal(name) {
                match err {
                    GrammarError::AlreadyTerminal(_) => error!("{}", err),
                    other => return Err(other),
                }
            }
        }
        for (lhs, tree) in file.productions {
            grammar.add_production(&lhs, tree)?;
        }
        Ok(grammar)
    }

    pub fn add_terminal(&mut self, name: &str) -> Result<(), GrammarError> {
        if self.is_final {
            return Err(GrammarError::AlreadyFinalized);
        }
        if name == END_MARKER {
            return Err(GrammarError::ReservedSymbol(name.to_string()));
        }
        if self.nonterminals.contains(name) {
            return Err(GrammarError::AlreadyNonTerminal(name.to_string()));
        }
        if !self.terminals.insert(name.to_string()) {
            warn!(
                "Found duplicate definition of terminal `{}`. Ignoring second definition",
                name
            );
        }
        Ok(())
    }

    pub fn add_nonterminal(&mut self, name: &str) -> Result<(), GrammarError> {
        if self.is_final {
            return Err(GrammarError::AlreadyFinalized);
        }
        if name == END_MARKER {
            return Err(GrammarError::ReservedSymbol(name.to_string()));
        }
        if self.terminals.contains(name) {
            return Err(GrammarError::AlreadyTerminal(name.to_string()));
        }
        if self.nonterminals.insert(name.to_string()) {
            self.productions.insert(name.to_string(), None);
        } else {
            warn!(
                "Found duplicate definition of nonterminal `{}`. Ignoring second definition",
                name
            );
        }
        Ok(())
    }

    pub fn set_start_symbol(&mut self, name: &str) -> Result<(), GrammarError> {
        if self.is_final {
            return Err(GrammarError::AlreadyFinalized);
        }
        if !self.nonterminals.contains(name) {
            return Err(GrammarError::UnknownNonTerminal(name.to_string()));
        }
        self.start_symbol = Some(name.to_string());
        Ok(())
    }

    /// Attach a right-hand side to a declared nonterminal. The first
    /// production wins; a second one is discarded with a warning. The first
    /// nonterminal to receive a production becomes the start symbol unless
    /// one was set explicitly.
    pub fn add_production(&mut self, nonterminal: &str, tree: EbnfNode) -> Result<(), GrammarError> {
        if self.is_final {
            return Err(GrammarError::AlreadyFinalized);
        }
        if !self.nonterminals.contains(nonterminal) {
            return Err(GrammarError::UnknownNonTerminal(nonterminal.to_string()));
        }
        self.check_declared(nonterminal, &tree)?;
        let slot = self
            .productions
            .get_mut(nonterminal)
            .expect("declared nonterminal has a production slot");
        if slot.is_some() {
            warn!(
                "Productions for nonterminal `{}` already defined. Ignoring second set of productions",
                nonterminal
            );
            return Ok(());
        }
        *slot = Some(tree);
        if self.start_symbol.is_none() {
            trace!("Inferring start symbol as `{}`", nonterminal);
            self.start_symbol = Some(nonterminal.to_string());
        }
        Ok(())
    }

    fn check_declared(&self, nonterminal: &str, node: &EbnfNode) -> Result<(), GrammarError> {
        match node {
            EbnfNode::Sequence { elements: children } | EbnfNode::Or { alternatives: children } => {
                for child in children {
                    self.check_declared(nonterminal, child)?;
                }
                Ok(())
            }
            EbnfNode::Optional { inner } | EbnfNode::Repeat { inner } | EbnfNode::Group { inner } => {
                self.check_declared(nonterminal, inner)
            }
            EbnfNode::Terminal { name } => {
                if self.terminals.contains(name) {
                    Ok(())
                } else {
                    Err(GrammarError::UndeclaredSymbol {
                        nonterminal: nonterminal.to_string(),
                        symbol: name.clone(),
                    })
                }
            }
            EbnfNode::NonTerminal { name } => {
                if self.nonterminals.contains(name) {
                    Ok(())
                } else {
                    Err(GrammarError::UndeclaredSymbol {
                        nonterminal: nonterminal.to_string(),
                        symbol: name.clone(),
                    })
                }
            }
        }
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }

    pub fn is_nonterminal(&self, name: &str) -> bool {
        self.nonterminals.contains(name)
    }

    pub fn start_symbol(&self) -> Option<&str> {
        self.start_symbol.as_deref()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn terminals(&self) -> impl Iterator<Item = &str> {
        self.terminals.iter().map(|name| name.as_str())
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.nonterminals.iter().map(|name| name.as_str())
    }

    pub fn productions(&self) -> impl Iterator<Item = (&str, Option<&EbnfNode>)> {
        self.productions
            .iter()
            .map(|(name, production)| (name.as_str(), production.as_ref()))
    }

    pub fn production(&self, nonterminal: &str) -> Option<&EbnfNode> {
        self.productions.get(nonterminal)?.as_ref()
    }

    /// Compute First then Follow and latch the grammar immutable. Re-entry
    /// is a no-op.
    pub fn finalize(&mut self) {
        if self.is_final {
            return;
        }
        info!("Computing First sets");
        self.first_sets = sets::compute_first_sets(&self.productions);
        for terminal in &self.terminals {
            self.first_sets
                .insert(terminal.clone(), BTreeSet::from([terminal.clone()]));
        }
        info!("Computing Follow sets");
        match &self.start_symbol {
            Some(start_symbol) => {
                self.follow_sets =
                    sets::compute_follow_sets(&self.productions, start_symbol, &self.first_sets);
            }
            None => {
                warn!("Grammar has no start symbol; Follow sets are empty");
                self.follow_sets = self
                    .nonterminals
                    .iter()
                    .map(|name| (name.clone(), BTreeSet::new()))
                    .collect();
            }
        }
        self.is_final = true;
    }

    /// Valid only after [`Grammar::finalize`].
    pub fn first_set(&self, symbol: &str) -> Option<&BTreeSet<String>> {
        self.first_sets.get(symbol)
    }

    /// Valid only after [`Grammar::finalize`]. Follow sets exist for
    /// nonterminals only.
    pub fn follow_set(&self, symbol: &str) -> Option<&BTreeSet<String>> {
        self.follow_sets.get(symbol)
    }

    /// First set of an arbitrary right-hand-side fragment, computed against
    /// the finalized First sets.
    pub fn first_of(&self, node: &EbnfNode) -> BTreeSet<String> {
        sets::first_of_node(node, &self.first_sets)
    }

    pub fn log_grammar(&self) {
        let terminals: Vec<String> = self.terminals.iter().map(|t| format!("`{}`", t)).collect();
        info!("Terminals found: {}", terminals.join(", "));
        let nonterminals: Vec<String> = self
            .nonterminals
            .iter()
            .map(|nt| format!("`{}`", nt))
            .collect();
        info!("Nonterminals found: {}", nonterminals.join(", "));
        info!(
            "Start symbol: `{}`",
            self.start_symbol.as_deref().unwrap_or("<none>")
        );
        for (nonterminal, production) in &self.productions {
            match production {
                Some(tree) => info!("{} ::= {}", nonterminal, tree),
                None => info!("{} ::= <no production>", nonterminal),
            }
        }
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Grammar (start: {}) {{",
            self.start_symbol.as_deref().unwrap_or("<none>")
        )?;
        for (nonterminal, production) in &self.productions {
            if let Some(tree) = production {
                writeln!(f, "\t{} ::= {}", nonterminal, tree)?;
            }
        }
        write!(f, "}}")
    }
}
