use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag};
use nom::character::complete::{char, one_of, space0};
use nom::combinator::{map, opt, verify};
use nom::error::{context, ContextError, ErrorKind, ParseError, VerboseError, VerboseErrorKind};
use nom::multi::separated_list1;
use nom::sequence::delimited;
use nom::IResult;
use tracing::{error, info, trace, warn};

/// The pseudo-terminal marking the empty production.
pub const EPSILON: &str = "epsilon";
/// The end-of-input sentinel. Reserved: it may never be declared.
pub const END_MARKER: &str = "eof";
/// Terminals that are declared implicitly in every grammar.
pub const PREDEFINED_TERMINALS: [&str; 3] = ["identifier", "numeric_constant", "string_literal"];

const META_CHARS: &str = ",{}[]()\\|";

/// One node of a production's right-hand side.
///
/// The tree is built once while the grammar file is parsed and is read-only
/// afterwards. The root of every production is a `Sequence` wrapping exactly
/// one child; an `Or` with a single alternative is elided during parsing and
/// every alternative of a surviving `Or` is itself a `Sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EbnfNode {
    Sequence { elements: Vec<EbnfNode> },
    Or { alternatives: Vec<EbnfNode> },
    Optional { inner: Box<EbnfNode> },
    Repeat { inner: Box<EbnfNode> },
    Group { inner: Box<EbnfNode> },
    Terminal { name: String },
    NonTerminal { name: String },
}

fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        if META_CHARS.contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl Display for EbnfNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EbnfNode::Sequence { elements } => {
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", element)?;
                }
                Ok(())
            }
            EbnfNode::Or { alternatives } => {
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", alternative)?;
                }
                Ok(())
            }
            EbnfNode::Optional { inner } => write!(f, "[ {} ]", inner),
            EbnfNode::Repeat { inner } => write!(f, "{{ {} }}", inner),
            EbnfNode::Group { inner } => write!(f, "( {} )", inner),
            EbnfNode::Terminal { name } | EbnfNode::NonTerminal { name } => {
                write!(f, "{}", escape_name(name))
            }
        }
    }
}

/// The raw contents of a grammar file: declaration lists in file order plus
/// one parsed right-hand side per production line.
#[derive(Debug)]
pub struct GrammarFile {
    pub terminals: Vec<String>,
    pub nonterminals: Vec<String>,
    pub productions: Vec<(String, EbnfNode)>,
}

/// A syntax error in a grammar file, located by byte offset. `contexts`
/// names the parse functions active when the error was detected, innermost
/// first.
#[derive(Debug, PartialEq, Eq)]
pub struct InputError {
    pub offset: usize,
    pub contexts: Vec<&'static str>,
}

impl InputError {
    fn from_verbose(source: &str, err: VerboseError<&str>) -> Self {
        let offset = err
            .errors
            .first()
            .map(|(input, _)| source.len() - input.len())
            .unwrap_or(source.len());
        let contexts = err
            .errors
            .iter()
            .filter_map(|(_, kind)| match kind {
                VerboseErrorKind::Context(name) => Some(*name),
                _ => None,
            })
            .collect();
        InputError { offset, contexts }
    }
}

impl Error for InputError {}

impl Display for InputError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error at byte {}", self.offset)?;
        if !self.contexts.is_empty() {
            write!(f, " (in {})", self.contexts.join(", "))?;
        }
        Ok(())
    }
}

type Span<'src> = &'src str;
type PResult<'src, T> = IResult<Span<'src>, T, VerboseError<Span<'src>>>;

fn failure_at<'src>(at: Span<'src>, ctx: &'static str) -> nom::Err<VerboseError<Span<'src>>> {
    let base = VerboseError::from_error_kind(at, ErrorKind::Verify);
    nom::Err::Failure(VerboseError::add_context(at, ctx, base))
}

/// A possibly-escaped run of name characters. Stops at whitespace and at any
/// unescaped meta character; fails on an empty run.
fn name_run(input: Span) -> PResult<String> {
    verify(
        escaped_transform(
            is_not(" \t\r\n,{}[]()\\|"),
            '\\',
            one_of(",{}[]()\\|"),
        ),
        |name: &str| !name.is_empty(),
    )(input)
}

/// A name in a declaration list. A lone unescaped bracket character is
/// accepted as a one-character name so that bracket tokens can be declared
/// without escaping; `,`, `\` and `|` keep their separator/operator roles
/// and must be escaped to name a token.
fn declared_symbol(input: Span) -> PResult<String> {
    let (rest, name) = context(
        "symbol",
        alt((name_run, map(one_of("{}[]()"), String::from))),
    )(input)?;
    if name == END_MARKER {
        error!("The symbol `eof` is reserved and cannot be declared");
        return Err(failure_at(input, "reserved symbol"));
    }
    Ok((rest, name))
}

fn symbol_list(input: Span) -> PResult<Vec<String>> {
    separated_list1(delimited(space0, char(','), space0), declared_symbol)(input)
}

/// Consume an optional carriage return, then require a line feed.
fn end_of_line(input: Span) -> PResult<()> {
    let (input, _) = opt(char('\r'))(input)?;
    let (input, _) = char('\n')(input)?;
    Ok((input, ()))
}

/// Right-hand-side parser, parameterized over the declared symbol sets so
/// leaves can be classified while parsing.
struct RhsParser<'decl> {
    terminals: &'decl BTreeSet<String>,
    nonterminals: &'decl BTreeSet<String>,
}

impl<'decl> RhsParser<'decl> {
    fn is_single_char_terminal(&self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        let name: &str = ch.encode_utf8(&mut buf);
        self.terminals.contains(name)
    }

    /// RHS ::= TERM {"|" TERM}
    fn rhs<'src>(&self, input: Span<'src>, closing: Option<char>) -> PResult<'src, EbnfNode> {
        trace!("Parsing RHS");
        let (input, _) = space0(input)?;
        let (mut input, first) = self.term(input, closing)?;
        let mut alternatives = vec![first];
        loop {
            let (rest, _) = space0(input)?;
            if let Some(after_bar) = rest.strip_prefix('|') {
                let (rest, alternative) = self.term(after_bar, closing)?;
                alternatives.push(alternative);
                input = rest;
            } else {
                input = rest;
                break;
            }
        }
        if alternatives.len() == 1 {
            Ok((input, alternatives.pop().expect("one alternative")))
        } else {
            Ok((input, EbnfNode::Or { alternatives }))
        }
    }

    /// TERM ::= FACTOR {FACTOR}
    fn term<'src>(&self, input: Span<'src>, closing: Option<char>) -> PResult<'src, EbnfNode> {
        let (input, _) = space0(input)?;
        let (mut input, first) = self.factor(input, closing)?;
        let mut elements = vec![first];
        loop {
            let (rest, _) = space0(input)?;
            input = rest;
            if self.at_term_end(input, closing) {
                break;
            }
            let (rest, element) = self.factor(input, closing)?;
            elements.push(element);
            input = rest;
        }
        Ok((input, EbnfNode::Sequence { elements }))
    }

    fn at_term_end(&self, input: Span, closing: Option<char>) -> bool {
        match input.chars().next() {
            None => true,
            Some('\r') | Some('\n') | Some('|') => true,
            Some(ch @ (')' | ']' | '}')) => {
                // The innermost construct's closer always closes it; any
                // other closing bracket is a leaf only when declared.
                Some(ch) == closing || !self.is_single_char_terminal(ch)
            }
            Some(_) => false,
        }
    }

    /// FACTOR ::= "[" RHS "]" | "{" RHS "}" | "(" RHS ")" | TERMINAL
    fn factor<'src>(&self, input: Span<'src>, closing: Option<char>) -> PResult<'src, EbnfNode> {
        let (input, _) = space0(input)?;
        if let Ok((rest, name)) = name_run(input) {
            return self.classify(input, rest, name);
        }
        match input.chars().next() {
            Some(ch @ ('[' | '{' | '(')) if !self.is_single_char_terminal(ch) => {
                self.bracket(input, ch)
            }
            Some(ch @ ('[' | '{' | '(' | ')' | ']' | '}'))
                if self.is_single_char_terminal(ch) && Some(ch) != closing =>
            {
                let (rest, _) = char(ch)(input)?;
                Ok((rest, EbnfNode::Terminal { name: ch.to_string() }))
            }
            Some('\\') => {
                error!("Unknown escape sequence in production");
                Err(failure_at(input, "escape sequence"))
            }
            _ => Err(nom::Err::Error(VerboseError::add_context(
                input,
                "factor",
                VerboseError::from_error_kind(input, ErrorKind::Char),
            ))),
        }
    }

    fn bracket<'src>(&self, input: Span<'src>, open: char) -> PResult<'src, EbnfNode> {
        let close = match open {
            '[' => ']',
            '{' => '}',
            _ => ')',
        };
        trace!("Parsing bracketed factor `{}`", open);
        let (input, _) = char(open)(input)?;
        let (input, inner) = self.rhs(input, Some(close))?;
        let (input, _) = space0(input)?;
        let (input, _) = context("closing delimiter", char(close))(input)?;
        let inner = Box::new(inner);
        let node = match open {
            '[' => EbnfNode::Optional { inner },
            '{' => EbnfNode::Repeat { inner },
            _ => EbnfNode::Group { inner },
        };
        Ok((input, node))
    }

    fn classify<'src>(
        &self,
        at: Span<'src>,
        rest: Span<'src>,
        name: String,
    ) -> PResult<'src, EbnfNode> {
        if self.terminals.contains(&name) {
            Ok((rest, EbnfNode::Terminal { name }))
        } else if self.nonterminals.contains(&name) {
            Ok((rest, EbnfNode::NonTerminal { name }))
        } else {
            error!(
                "Value `{}` used in production is neither a terminal nor a nonterminal",
                name
            );
            Err(failure_at(at, "neither terminal nor nonterminal"))
        }
    }

    /// PROD ::= LHS "::=" RHS, wrapped in the root `Sequence`.
    fn production<'src>(&self, input: Span<'src>) -> PResult<'src, (String, EbnfNode)> {
        let (input, _) = space0(input)?;
        let (input, lhs) = context(
            "production",
            alt((name_run, map(one_of("{}[]()"), String::from))),
        )(input)?;
        trace!("LHS of production `{}`", lhs);
        if !self.nonterminals.contains(&lhs) {
            error!("Production for undeclared nonterminal `{}`", lhs);
            return Err(failure_at(input, "undeclared nonterminal"));
        }
        let (input, _) = space0(input)?;
        let (input, _) = context("production", tag("::="))(input)?;
        let (input, rhs) = self.rhs(input, None)?;
        let root = EbnfNode::Sequence { elements: vec![rhs] };
        Ok((input, (lhs, root)))
    }
}

/// Parse a complete grammar file: the `T:`/`NT:` declaration lines followed
/// by the `P:` section. Aborts on the first error.
pub fn parse_grammar_file(source: &str) -> Result<GrammarFile, InputError> {
    match parse_file_raw(source) {
        Ok(file) => Ok(file),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            let err = InputError::from_verbose(source, err);
            error!("Failed to parse grammar file: {}", err);
            Err(err)
        }
        Err(nom::Err::Incomplete(_)) => Err(InputError {
            offset: source.len(),
            contexts: Vec::new(),
        }),
    }
}

fn parse_file_raw(source: &str) -> Result<GrammarFile, nom::Err<VerboseError<&str>>> {
    let input = source;

    info!("Parsing terminals");
    let (input, _) = context("terminal declaration", tag("T:"))(input)?;
    let (input, _) = space0(input)?;
    let (input, terminal_names) = context("terminal declaration", symbol_list)(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = context("terminal declaration", end_of_line)(input)?;
    for name in &terminal_names {
        trace!("Found terminal `{}`", name);
    }

    info!("Parsing nonterminals");
    let (input, _) = context("nonterminal declaration", tag("NT:"))(input)?;
    let (input, _) = space0(input)?;
    let (input, nonterminal_names) = context("nonterminal declaration", symbol_list)(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = context("nonterminal declaration", end_of_line)(input)?;
    for name in &nonterminal_names {
        trace!("Found nonterminal `{}`", name);
    }

    let (input, _) = context("production declaration", tag("P:"))(input)?;
    let (input, _) = space0(input)?;
    let mut input = if input.is_empty() {
        input
    } else {
        let (input, _) = context("production declaration", end_of_line)(input)?;
        input
    };

    // Classification sets for right-hand-side leaves. A name appearing in
    // both lists keeps its first kind (terminal); the grammar store repeats
    // that check and reports it.
    let mut terminals: BTreeSet<String> = PREDEFINED_TERMINALS
        .iter()
        .map(|name| name.to_string())
        .collect();
    terminals.insert(EPSILON.to_string());
    terminals.extend(terminal_names.iter().cloned());
    let nonterminals: BTreeSet<String> = nonterminal_names.iter().cloned().collect();

    info!("Parsing productions");
    let rhs_parser = RhsParser {
        terminals: &terminals,
        nonterminals: &nonterminals,
    };
    let mut productions = Vec::new();
    while !input.is_empty() {
        let (rest, (lhs, tree)) = rhs_parser.production(input)?;
        trace!("Found production `{} ::= {}`", lhs, tree);
        productions.push((lhs, tree));
        let (rest, _) = space0(rest)?;
        if rest.is_empty() {
            input = rest;
            break;
        }
        let (rest, _) = context("production", end_of_line)(rest)?;
        input = rest;
    }
    if productions.is_empty() {
        warn!("No production rules defined");
    }

    Ok(GrammarFile {
        terminals: terminal_names,
        nonterminals: nonterminal_names,
        productions,
    })
}
