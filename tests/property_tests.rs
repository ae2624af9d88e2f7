//! Property tests for the scanner and parser.
//!
//! - scanning and parsing never panic, whatever the input
//! - comments are transparent: adding them never changes the tree
//! - emitted text parses back to the same tree

use proptest::prelude::*;
use sieve_syntax::{emit, parse, tokenize, TokenKind};

/// Token sequences of complete commands.
fn arb_command() -> impl Strategy<Value = Vec<&'static str>> {
    prop_oneof![
        Just(vec!["keep", ";"]),
        Just(vec!["stop", ";"]),
        Just(vec!["discard", ";"]),
        Just(vec!["redirect", "\"jdoe@example.com\"", ";"]),
        Just(vec!["require", "[", "\"envelope\"", ",", "\"fileinto\"", "]", ";"]),
        Just(vec!["if", "size", ":over", "100K", "{", "discard", ";", "}"]),
        Just(vec![
            "if", "header", ":contains", "\"Subject\"", "\"a\\\"b\"", "{", "stop", ";", "}",
            "elsif", "exists", "\"X-Spam\"", "{", "keep", ";", "}",
            "else", "{", "discard", ";", "}",
        ]),
        Just(vec![
            "if", "anyof", "(", "not", "exists", "[", "\"From\"", ",", "\"Date\"", "]", ",",
            "true", ")", "{", "if", "false", "{", "keep", ";", "}", "}",
        ]),
    ]
}

fn arb_script() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(arb_command(), 0..8).prop_map(|cmds| cmds.concat())
}

proptest! {
    #[test]
    fn scanning_arbitrary_input_never_panics(input in "\\PC*") {
        let _ = tokenize(&input);
        let _ = parse(&input);
    }

    #[test]
    fn scanning_ascii_soup_never_panics(input in "[ -~\\t\\r\\n]{0,64}") {
        if let Ok(tokens) = tokenize(&input) {
            prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
            for pair in tokens.windows(2) {
                prop_assert!(pair[0].pos < pair[1].pos);
            }
        }
    }

    #[test]
    fn comments_are_transparent(
        tokens in arb_script(),
        separators in prop::collection::vec(0u8..3, 64),
    ) {
        let plain = tokens.join(" ");
        let mut commented = String::new();
        for (i, token) in tokens.iter().enumerate() {
            commented.push_str(token);
            commented.push_str(match separators[i % separators.len()] {
                0 => " ",
                1 => " /* note * / */ ",
                _ => " # note\r\n",
            });
        }

        let a = parse(&plain).unwrap();
        let b = parse(&commented).unwrap();
        prop_assert_eq!(emit(&a), emit(&b));
    }

    #[test]
    fn emitted_text_reparses_identically(tokens in arb_script()) {
        let tree = parse(&tokens.join("\r\n")).unwrap();
        let text = emit(&tree);
        let reparsed = parse(&text).unwrap();
        prop_assert_eq!(&text, &emit(&reparsed));
        prop_assert_eq!(tree.commands().len(), reparsed.commands().len());
    }

    #[test]
    fn parsing_is_deterministic(tokens in arb_script()) {
        let input = tokens.join(" ");
        prop_assert_eq!(parse(&input).unwrap(), parse(&input).unwrap());
    }
}
