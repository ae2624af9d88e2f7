/// AST node types for SIEVE scripts (RFC 5228).
///
/// Every node records the byte offset it was parsed from. The node set is
/// closed: commands are a sum type and everything else is a plain struct.
use std::fmt;

use serde::Serialize;

/// Zero-based byte offset into the original script text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Position(pub usize);

impl Position {
    pub fn offset(self) -> usize {
        self.0
    }

    /// One-based line and column (in characters) of this offset in `input`.
    pub fn line_col(self, input: &str) -> (usize, usize) {
        let end = self.0.min(input.len());
        let before = input.get(..end).unwrap_or(input);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminant of every node variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeType {
    CommandList,
    Require,
    Stop,
    Keep,
    Discard,
    Redirect,
    Test,
    If,
    ElseIf,
    Else,
    StringLiteral,
    StringList,
}

pub trait Node {
    fn node_type(&self) -> NodeType;
    fn position(&self) -> Position;
}

macro_rules! impl_node {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Node for $ty {
                fn node_type(&self) -> NodeType {
                    NodeType::$ty
                }

                fn position(&self) -> Position {
                    self.pos
                }
            }
        )*
    };
}

impl_node!(
    CommandList,
    Require,
    Stop,
    Keep,
    Discard,
    Redirect,
    Test,
    If,
    ElseIf,
    Else,
    StringLiteral,
    StringList,
);

/// A parsed script. `start` holds the top-level commands in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree {
    pub start: CommandList,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self {
            start: CommandList::new(Position(0)),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.start.commands
    }

    pub fn is_empty(&self) -> bool {
        self.start.commands.is_empty()
    }

    /// Capabilities named by every top-level `require`, in order, without duplicates.
    pub fn capabilities(&self) -> Vec<&str> {
        let mut caps: Vec<&str> = Vec::new();
        for cmd in &self.start.commands {
            if let Command::Require(req) = cmd {
                for cap in &req.capabilities {
                    if !caps.contains(&cap.as_str()) {
                        caps.push(cap);
                    }
                }
            }
        }
        caps
    }
}

/// An ordered sequence of commands: the script itself or a block body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandList {
    pub pos: Position,
    pub commands: Vec<Command>,
}

impl CommandList {
    pub fn new(pos: Position) -> Self {
        Self {
            pos,
            commands: Vec::new(),
        }
    }

    pub fn append(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A command that may stand on its own in a command list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    /// `require ["ext1", "ext2"];`
    Require(Require),
    /// `stop;`
    Stop(Stop),
    /// `keep;`
    Keep(Keep),
    /// `discard;`
    Discard(Discard),
    /// `redirect "address";`
    Redirect(Redirect),
    /// `if <test> { ... }` with its elsif/else chain
    If(If),
}

impl Command {
    /// The keyword that introduces this command.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Require(_) => "require",
            Self::Stop(_) => "stop",
            Self::Keep(_) => "keep",
            Self::Discard(_) => "discard",
            Self::Redirect(_) => "redirect",
            Self::If(_) => "if",
        }
    }
}

impl Node for Command {
    fn node_type(&self) -> NodeType {
        match self {
            Self::Require(n) => n.node_type(),
            Self::Stop(n) => n.node_type(),
            Self::Keep(n) => n.node_type(),
            Self::Discard(n) => n.node_type(),
            Self::Redirect(n) => n.node_type(),
            Self::If(n) => n.node_type(),
        }
    }

    fn position(&self) -> Position {
        match self {
            Self::Require(n) => n.position(),
            Self::Stop(n) => n.position(),
            Self::Keep(n) => n.position(),
            Self::Discard(n) => n.position(),
            Self::Redirect(n) => n.position(),
            Self::If(n) => n.position(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Require {
    pub pos: Position,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keep {
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discard {
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redirect {
    pub pos: Position,
    pub address: StringLiteral,
}

/// `if` owns its guard, its body, the elsif chain in declaration order
/// and the optional trailing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct If {
    pub pos: Position,
    pub test: Test,
    pub body: CommandList,
    pub else_ifs: Vec<ElseIf>,
    pub otherwise: Option<Else>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseIf {
    pub pos: Position,
    pub test: Test,
    pub body: CommandList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Else {
    pub pos: Position,
    pub body: CommandList,
}

/// A test is kept generic: `header :is "From" "x"`, `anyof (...)` and
/// `not exists "X"` all share this shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Test {
    pub pos: Position,
    pub name: String,
    pub arguments: Vec<Argument>,
    /// A single trailing test (`not`) or the members of a test-list.
    pub tests: Vec<Test>,
    /// Whether `tests` was written as a parenthesised test-list.
    pub test_list: bool,
}

impl Test {
    /// Tag names (without the colon) in argument order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(|a| match a {
            Argument::Tag(tag) => Some(tag.name.as_str()),
            _ => None,
        })
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags().any(|t| t == name)
    }

    pub fn string_lists(&self) -> impl Iterator<Item = &StringList> {
        self.arguments.iter().filter_map(|a| match a {
            Argument::StringList(list) => Some(list),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Argument {
    StringList(StringList),
    Number(Number),
    Tag(Tag),
}

impl Argument {
    pub fn position(&self) -> Position {
        match self {
            Self::StringList(list) => list.pos,
            Self::Number(n) => n.pos,
            Self::Tag(t) => t.pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringLiteral {
    pub pos: Position,
    pub value: String,
}

/// A string-list argument. A lone string is a one-element list with
/// `bracketed == false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringList {
    pub pos: Position,
    pub items: Vec<StringLiteral>,
    pub bracketed: bool,
}

impl StringList {
    pub fn values(&self) -> Vec<&str> {
        self.items.iter().map(|s| s.value.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub pos: Position,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Number {
    pub pos: Position,
    pub value: u64,
    pub quantifier: Option<Quantifier>,
}

impl Number {
    /// The value with its quantifier applied, or `None` on overflow.
    pub fn scaled(&self) -> Option<u64> {
        match self.quantifier {
            Some(q) => self.value.checked_mul(q.multiplier()),
            None => Some(self.value),
        }
    }
}

/// Size suffix of a number: `K`, `M` or `G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quantifier {
    K,
    M,
    G,
}

impl Quantifier {
    pub fn multiplier(self) -> u64 {
        match self {
            Self::K => 1 << 10,
            Self::M => 1 << 20,
            Self::G => 1 << 30,
        }
    }

    pub fn as_sieve(self) -> char {
        match self {
            Self::K => 'K',
            Self::M => 'M',
            Self::G => 'G',
        }
    }

    /// Quantifiers are case-insensitive (RFC 5234 string literals).
    pub fn from_sieve(c: char) -> Option<Self> {
        match c {
            'K' | 'k' => Some(Self::K),
            'M' | 'm' => Some(Self::M),
            'G' | 'g' => Some(Self::G),
            _ => None,
        }
    }
}
