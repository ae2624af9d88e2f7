/// Recursive descent SIEVE parser.
///
/// The whole script is tokenized up front; the parser then walks the token
/// array with a cursor that can peek, advance and back up one step.
/// The first error aborts the parse.
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::sieve::ast::*;
use crate::sieve::error::ParseError;
use crate::sieve::lexer::{tokenize, Token, TokenKind};

/// Tests that take a single trailing test instead of a test-list.
const NESTED_TEST_NAMES: &[&str] = &["not"];

/// Limits applied before and during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseSettings {
    /// Reject scripts longer than this many bytes.
    pub max_script_bytes: Option<usize>,
    /// Maximum depth of nested blocks and nested tests.
    pub max_nesting_depth: usize,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            max_script_bytes: None,
            max_nesting_depth: 64,
        }
    }
}

pub fn parse(input: &str) -> Result<Tree, ParseError> {
    parse_with(input, &ParseSettings::default())
}

pub fn parse_with(input: &str, settings: &ParseSettings) -> Result<Tree, ParseError> {
    let result = Parser::with_settings(input, settings).and_then(Parser::parse);
    if let Err(err) = &result {
        debug!(category = err.category(), offset = err.position().offset(), "parse failed: {err}");
    }
    result
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        Self::with_settings(input, &ParseSettings::default())
    }

    /// Scan the complete input. A scan error fails construction.
    pub fn with_settings(input: &str, settings: &ParseSettings) -> Result<Self, ParseError> {
        if let Some(limit) = settings.max_script_bytes {
            if input.len() > limit {
                return Err(ParseError::ScriptTooLarge {
                    len: input.len(),
                    limit,
                });
            }
        }

        let tokens = tokenize(input)?;
        debug!(tokens = tokens.len(), "scanned script");
        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth: settings.max_nesting_depth,
        })
    }

    pub fn parse(mut self) -> Result<Tree, ParseError> {
        let mut tree = Tree::new();
        self.parse_commands(&mut tree.start, false)?;
        debug!(commands = tree.start.len(), "parsed script");
        Ok(tree)
    }

    // -- cursor ------------------------------------------------------------

    /// The token under the cursor. Past the end this is the final EOF token.
    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn backup(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.next().kind == kind {
            return true;
        }
        self.backup();
        false
    }

    fn skip_comments(&mut self) {
        while self.peek().kind == TokenKind::Comment {
            self.pos += 1;
        }
    }

    /// The next token that is not a comment.
    fn lookahead(&mut self) -> &Token {
        self.skip_comments();
        self.peek()
    }

    fn expected(&self, expected: &'static str) -> ParseError {
        let token = self.peek();
        ParseError::Expected {
            expected,
            found: token.to_string(),
            pos: token.pos,
        }
    }

    fn expect_end(&mut self, command: &str) -> Result<(), ParseError> {
        self.skip_comments();
        if self.accept(TokenKind::End) {
            return Ok(());
        }
        let found = self.peek();
        Err(ParseError::ExpectedEnd {
            command: command.to_string(),
            found: found.to_string(),
            pos: found.pos,
        })
    }

    fn enter(&mut self, pos: Position) -> Result<(), ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::NestingTooDeep {
                limit: self.max_depth,
                pos,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // -- commands ----------------------------------------------------------

    /// Parse commands into `list` until end of input (top level) or until a
    /// `}` (inside a block, left for the caller to consume).
    fn parse_commands(&mut self, list: &mut CommandList, in_block: bool) -> Result<(), ParseError> {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Comment => self.pos += 1,
                TokenKind::Identifier => {
                    let command = self.parse_command()?;
                    trace!(command = command.keyword(), offset = command.position().offset(), "parsed command");
                    list.append(command);
                }
                TokenKind::BlockClose if in_block => return Ok(()),
                TokenKind::Eof if !in_block => return Ok(()),
                TokenKind::Eof => return Err(self.expected("`}`")),
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        found: token.to_string(),
                        pos: token.pos,
                    })
                }
            }
        }
    }

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let token = self.next();
        let pos = token.pos;
        match token.text.as_str() {
            "if" => self.parse_if(pos).map(Command::If),
            "require" => self.parse_require(pos).map(Command::Require),
            "redirect" => self.parse_redirect(pos).map(Command::Redirect),
            "stop" => {
                self.expect_end("stop")?;
                Ok(Command::Stop(Stop { pos }))
            }
            "keep" => {
                self.expect_end("keep")?;
                Ok(Command::Keep(Keep { pos }))
            }
            "discard" => {
                self.expect_end("discard")?;
                Ok(Command::Discard(Discard { pos }))
            }
            "elsif" | "else" => Err(ParseError::OrphanBranch {
                keyword: token.text.clone(),
                pos,
            }),
            _ => Err(ParseError::UnknownIdentifier {
                name: token.text.clone(),
                pos,
            }),
        }
    }

    /// require <capabilities: string-list>;
    fn parse_require(&mut self, pos: Position) -> Result<Require, ParseError> {
        let list = self.parse_string_list("capability string or string-list")?;
        self.expect_end("require")?;
        Ok(Require {
            pos,
            capabilities: list.items.into_iter().map(|s| s.value).collect(),
        })
    }

    /// redirect <address: string>;
    fn parse_redirect(&mut self, pos: Position) -> Result<Redirect, ParseError> {
        if self.lookahead().kind != TokenKind::String {
            return Err(self.expected("address string"));
        }
        let address = literal(self.next());
        self.expect_end("redirect")?;
        Ok(Redirect { pos, address })
    }

    /// if <test> <block> *(elsif <test> <block>) [else <block>]
    fn parse_if(&mut self, pos: Position) -> Result<If, ParseError> {
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let mut node = If {
            pos,
            test,
            body,
            else_ifs: Vec::new(),
            otherwise: None,
        };

        loop {
            let keyword = {
                let token = self.lookahead();
                if !token.is_word() {
                    break;
                }
                token.text.clone()
            };
            match keyword.as_str() {
                "elsif" => {
                    let pos = self.next().pos;
                    let test = self.parse_test()?;
                    let body = self.parse_block()?;
                    node.else_ifs.push(ElseIf { pos, test, body });
                }
                "else" => {
                    let pos = self.next().pos;
                    let body = self.parse_block()?;
                    node.otherwise = Some(Else { pos, body });
                    break;
                }
                _ => break,
            }
        }

        Ok(node)
    }

    fn parse_block(&mut self) -> Result<CommandList, ParseError> {
        if self.lookahead().kind != TokenKind::BlockOpen {
            return Err(self.expected("`{`"));
        }
        let open = self.next();
        self.enter(open.pos)?;
        let mut body = CommandList::new(open.pos);
        self.parse_commands(&mut body, true)?;
        self.leave();
        // parse_commands only returns inside a block when it sees `}`
        self.next();
        Ok(body)
    }

    // -- tests and arguments -----------------------------------------------

    /// test = identifier *argument [ test / test-list ]
    fn parse_test(&mut self) -> Result<Test, ParseError> {
        if !self.lookahead().is_word() {
            return Err(self.expected("test"));
        }
        let token = self.next();
        self.enter(token.pos)?;

        let mut test = Test {
            pos: token.pos,
            name: token.text,
            arguments: Vec::new(),
            tests: Vec::new(),
            test_list: false,
        };

        loop {
            let next = self.lookahead();
            let argument = match next.kind {
                TokenKind::String | TokenKind::StringListOpen => {
                    Argument::StringList(self.parse_string_list("string")?)
                }
                TokenKind::Numeric => Argument::Number(number(self.next())?),
                TokenKind::Identifier if next.is_tag() => {
                    let tag = self.next();
                    Argument::Tag(Tag {
                        pos: tag.pos,
                        name: tag.text[1..].to_string(),
                    })
                }
                _ => break,
            };
            test.arguments.push(argument);
        }

        let next = self.lookahead();
        if next.kind == TokenKind::TestListOpen {
            test.tests = self.parse_test_list()?;
            test.test_list = true;
        } else if next.is_word() && NESTED_TEST_NAMES.contains(&test.name.as_str()) {
            test.tests.push(self.parse_test()?);
        }

        self.leave();
        Ok(test)
    }

    /// test-list = "(" test *("," test) ")"; the commas never reach the parser.
    fn parse_test_list(&mut self) -> Result<Vec<Test>, ParseError> {
        self.next();
        let mut tests = Vec::new();
        loop {
            let next = self.lookahead();
            if next.kind == TokenKind::TestListClose && !tests.is_empty() {
                self.next();
                return Ok(tests);
            }
            if !next.is_word() {
                return Err(self.expected(if tests.is_empty() { "test" } else { "test or `)`" }));
            }
            tests.push(self.parse_test()?);
        }
    }

    /// A single string, or `[` string *("," string) `]`.
    fn parse_string_list(&mut self, expected: &'static str) -> Result<StringList, ParseError> {
        let kind = self.lookahead().kind;
        match kind {
            TokenKind::String => {
                let item = literal(self.next());
                Ok(StringList {
                    pos: item.pos,
                    items: vec![item],
                    bracketed: false,
                })
            }
            TokenKind::StringListOpen => {
                let open = self.next();
                let mut items = Vec::new();
                loop {
                    let kind = self.lookahead().kind;
                    match kind {
                        TokenKind::String => items.push(literal(self.next())),
                        TokenKind::StringListClose if !items.is_empty() => {
                            self.next();
                            break;
                        }
                        _ if items.is_empty() => return Err(self.expected("string")),
                        _ => return Err(self.expected("string or `]`")),
                    }
                }
                Ok(StringList {
                    pos: open.pos,
                    items,
                    bracketed: true,
                })
            }
            _ => Err(self.expected(expected)),
        }
    }
}

fn literal(token: Token) -> StringLiteral {
    StringLiteral {
        pos: token.pos,
        value: token.text,
    }
}

fn number(token: Token) -> Result<Number, ParseError> {
    let quantifier = token.text.chars().last().and_then(Quantifier::from_sieve);
    let digits = match quantifier {
        Some(_) => &token.text[..token.text.len() - 1],
        None => token.text.as_str(),
    };
    let value = digits
        .parse::<u64>()
        .map_err(|_| ParseError::NumberOutOfRange {
            text: token.text.clone(),
            pos: token.pos,
        })?;
    Ok(Number {
        pos: token.pos,
        value,
        quantifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_if(tree: &Tree) -> &If {
        match &tree.commands()[0] {
            Command::If(node) => node,
            other => panic!("Expected If, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("# only a comment\r\n/* and another */").unwrap().is_empty());
    }

    #[test]
    fn test_parse_require() {
        let tree = parse("require [\"fileinto\", \"reject\"];").unwrap();
        match &tree.commands()[0] {
            Command::Require(req) => {
                assert_eq!(req.capabilities, ["fileinto", "reject"]);
                assert_eq!(req.pos, Position(0));
            }
            other => panic!("Expected Require, got {other:?}"),
        }

        let tree = parse("require \"envelope\";").unwrap();
        assert_eq!(tree.capabilities(), ["envelope"]);
    }

    #[test]
    fn test_parse_require_needs_argument() {
        let err = parse("require;").unwrap_err();
        assert_eq!(err.category(), "expected token");
        assert_eq!(err.position(), Position(7));
    }

    #[test]
    fn test_parse_actions() {
        let tree = parse("keep;\r\ndiscard;\r\nstop;").unwrap();
        let types: Vec<NodeType> = tree.commands().iter().map(|c| c.node_type()).collect();
        assert_eq!(types, [NodeType::Keep, NodeType::Discard, NodeType::Stop]);
        assert_eq!(tree.commands()[1].position(), Position(7));
    }

    #[test]
    fn test_parse_redirect() {
        let tree = parse("redirect \"jdoe@example.com\";").unwrap();
        match &tree.commands()[0] {
            Command::Redirect(r) => {
                assert_eq!(r.address.value, "jdoe@example.com");
                assert_eq!(r.address.pos, Position(9));
            }
            other => panic!("Expected Redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_redirect_rejects_list() {
        let err = parse("redirect [\"a@example.com\"];").unwrap_err();
        assert!(matches!(err, ParseError::Expected { expected: "address string", .. }));
    }

    #[test]
    fn test_parse_simple_if() {
        let input = "# Filter: Move spam\r\nif header :contains \"Subject\" \"SPAM\" {\r\n    discard;\r\n    stop;\r\n}\r\n";
        let tree = parse(input).unwrap();
        let node = only_if(&tree);
        assert_eq!(node.test.name, "header");
        assert!(node.test.has_tag("contains"));
        let lists: Vec<Vec<&str>> = node.test.string_lists().map(|l| l.values()).collect();
        assert_eq!(lists, [vec!["Subject"], vec!["SPAM"]]);
        assert_eq!(node.body.len(), 2);
        assert!(node.else_ifs.is_empty());
        assert!(node.otherwise.is_none());
    }

    #[test]
    fn test_if_chain_order() {
        let tree = parse("if t1 {keep;} elsif t2 {discard;} else {stop;}").unwrap();
        let node = only_if(&tree);
        assert_eq!(node.test.name, "t1");
        assert_eq!(node.else_ifs.len(), 1);
        assert_eq!(node.else_ifs[0].test.name, "t2");
        assert_eq!(node.else_ifs[0].body.commands[0].node_type(), NodeType::Discard);
        let otherwise = node.otherwise.as_ref().unwrap();
        assert_eq!(otherwise.body.commands[0].node_type(), NodeType::Stop);
        assert_eq!(otherwise.node_type(), NodeType::Else);
    }

    #[test]
    fn test_multiple_elsif_branches() {
        let tree = parse("if a {keep;} elsif b {keep;} elsif c {stop;} keep;").unwrap();
        let node = only_if(&tree);
        let names: Vec<&str> = node.else_ifs.iter().map(|e| e.test.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
        assert!(node.otherwise.is_none());
        assert_eq!(tree.commands().len(), 2);
    }

    #[test]
    fn test_nested_if() {
        let tree = parse("if true { if false { discard; } else { keep; } }").unwrap();
        let outer = only_if(&tree);
        match &outer.body.commands[0] {
            Command::If(inner) => {
                assert_eq!(inner.test.name, "false");
                assert!(inner.otherwise.is_some());
            }
            other => panic!("Expected nested If, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_anyof_with_not() {
        let input = "if anyof (not exists [\"From\",\"Date\"], header :is \"X\" \"y\") { discard; }";
        let tree = parse(input).unwrap();
        let test = &only_if(&tree).test;
        assert_eq!(test.name, "anyof");
        assert!(test.test_list);
        assert_eq!(test.tests.len(), 2);
        let not = &test.tests[0];
        assert_eq!(not.name, "not");
        assert!(!not.test_list);
        assert_eq!(not.tests[0].name, "exists");
        assert_eq!(not.tests[0].string_lists().next().unwrap().values(), ["From", "Date"]);
        assert_eq!(test.tests[1].name, "header");
    }

    #[test]
    fn test_juxtaposed_tests_in_list() {
        let tree = parse("if allof(true, false) { keep; }").unwrap();
        let test = &only_if(&tree).test;
        let names: Vec<&str> = test.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["true", "false"]);
    }

    #[test]
    fn test_parse_size_quantifier() {
        let tree = parse("if size :over 10K { discard; }").unwrap();
        let test = &only_if(&tree).test;
        match &test.arguments[..] {
            [Argument::Tag(tag), Argument::Number(n)] => {
                assert_eq!(tag.name, "over");
                assert_eq!(n.value, 10);
                assert_eq!(n.quantifier, Some(Quantifier::K));
                assert_eq!(n.scaled(), Some(10240));
            }
            other => panic!("Unexpected arguments {other:?}"),
        }

        let tree = parse("if size :under 10 { keep; }").unwrap();
        match &only_if(&tree).test.arguments[1] {
            Argument::Number(n) => assert_eq!(n.quantifier, None),
            other => panic!("Expected number, got {other:?}"),
        }

        let tree = parse("if size :over 3m { discard; }").unwrap();
        match &only_if(&tree).test.arguments[1] {
            Argument::Number(n) => {
                assert_eq!(n.quantifier, Some(Quantifier::M));
                assert_eq!(n.scaled(), Some(3 << 20));
            }
            other => panic!("Expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_number_out_of_range() {
        let err = parse("if size :over 99999999999999999999 { keep; }").unwrap_err();
        assert_eq!(err.category(), "number out of range");
        assert_eq!(err.position(), Position(14));
    }

    #[test]
    fn test_escapes_reach_the_tree() {
        let tree = parse(r#"redirect "a\"b\\c";"#).unwrap();
        match &tree.commands()[0] {
            Command::Redirect(r) => assert_eq!(r.address.value, "a\"b\\c"),
            other => panic!("Expected Redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_multiline_argument() {
        let tree = parse("redirect text:\r\nline1\r\nline2\r\n.\r\n;").unwrap();
        match &tree.commands()[0] {
            Command::Redirect(r) => assert_eq!(r.address.value, "line1\r\nline2\r\n"),
            other => panic!("Expected Redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_inside_commands() {
        let tree = parse("keep /* why */ ;\r\nif true # note\r\n{ stop; }").unwrap();
        assert_eq!(tree.commands().len(), 2);
    }

    #[test]
    fn test_unknown_identifier() {
        let err = parse("keep;\r\nbogus;").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownIdentifier {
                name: "bogus".into(),
                pos: Position(7)
            }
        );
        assert_eq!(err.category(), "unknown identifier");
    }

    #[test]
    fn test_extension_commands_are_unknown() {
        let err = parse("fileinto \"Junk\";").unwrap_err();
        assert_eq!(err.category(), "unknown identifier");
    }

    #[test]
    fn test_missing_terminator() {
        let err = parse("stop").unwrap_err();
        assert_eq!(err.category(), "expected terminator");
        assert_eq!(err.position(), Position(4));
        assert_eq!(err.to_string(), "expected `;` after `stop` at offset 4, found `end of input`");
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("if t1 {keep;").unwrap_err();
        assert!(err.position() >= Position(6));
        assert!(matches!(err, ParseError::Expected { expected: "`}`", .. }));
    }

    #[test]
    fn test_missing_test() {
        let err = parse("if { keep; }").unwrap_err();
        assert!(matches!(err, ParseError::Expected { expected: "test", .. }));
        assert_eq!(err.position(), Position(3));

        let err = parse("if true {keep;} elsif {stop;}").unwrap_err();
        assert!(matches!(err, ParseError::Expected { expected: "test", .. }));
    }

    #[test]
    fn test_orphan_branches() {
        let err = parse("else { keep; }").unwrap_err();
        assert_eq!(
            err,
            ParseError::OrphanBranch {
                keyword: "else".into(),
                pos: Position(0)
            }
        );
        let err = parse("if a {keep;} else {stop;} else {keep;}").unwrap_err();
        assert_eq!(err.category(), "orphan branch");
    }

    #[test]
    fn test_unexpected_token_at_top_level() {
        let err = parse("keep; }").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                found: "}".into(),
                pos: Position(6)
            }
        );
    }

    #[test]
    fn test_lex_error_is_surfaced() {
        let err = parse("keep;\nstop;").unwrap_err();
        assert_eq!(err.category(), "syntax error");
        assert_eq!(err.position(), Position(5));
    }

    #[test]
    fn test_empty_lists_are_rejected() {
        assert!(parse("require [];").is_err());
        assert!(parse("if anyof () { keep; }").is_err());
        assert!(parse("if anyof (true { keep; }").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let settings = ParseSettings {
            max_script_bytes: None,
            max_nesting_depth: 2,
        };
        assert!(parse_with("if a { if b { keep; } }", &settings).is_ok());
        let err = parse_with("if a { if b { if c { keep; } } }", &settings).unwrap_err();
        assert_eq!(err.category(), "nesting too deep");

        let deep = format!("if {}true {{ keep; }}", "not ".repeat(10));
        assert!(parse_with(&deep, &settings).is_err());
        assert!(parse(&deep).is_ok());
    }

    #[test]
    fn test_nested_test_lists_hit_the_limit() {
        let input = format!("if {}true{} {{ keep; }}", "anyof(".repeat(100), ")".repeat(100));
        let err = parse(&input).unwrap_err();
        assert_eq!(err.category(), "nesting too deep");
        assert_eq!(err.position(), Position(3 + 64 * 6));
        assert_eq!(err.to_string(), "nesting deeper than 64 at offset 387");
    }

    #[test]
    fn test_script_size_limit() {
        let settings = ParseSettings {
            max_script_bytes: Some(4),
            ..ParseSettings::default()
        };
        let err = parse_with("keep;", &settings).unwrap_err();
        assert_eq!(err, ParseError::ScriptTooLarge { len: 5, limit: 4 });
    }

    #[test]
    fn test_parse_is_deterministic() {
        let input = "require [\"envelope\"];\r\nif envelope :all :is \"from\" \"a@b.c\" { redirect \"x@y.z\"; } else { keep; }";
        assert_eq!(parse(input).unwrap(), parse(input).unwrap());
    }

    #[test]
    fn test_cursor_backup() {
        let mut parser = Parser::new("keep; stop;").unwrap();
        assert!(!parser.accept(TokenKind::End));
        assert_eq!(parser.next().text, "keep");
        assert!(parser.accept(TokenKind::End));
        parser.backup();
        assert_eq!(parser.peek().kind, TokenKind::End);
    }
}
