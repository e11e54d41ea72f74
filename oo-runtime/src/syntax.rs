//! Word and list syntax of the command language, parsed with pest.

use crate::error::{Result, RuntimeError};
use crate::value::unescape;
use pest::Parser;
use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::Pair;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "syntax.pest"]
struct SyntaxParser;

/// One piece of a word, substituted at evaluation time
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Variable(String),
    Command(String),
}

pub type Word = Vec<Part>;
pub type Command = Vec<Word>;

/// Split a script into commands and their words
pub fn parse_script(script: &str) -> Result<Vec<Command>> {
    let mut pairs = SyntaxParser::parse(Rule::script, script)
        .map_err(|error| syntax_failure(error, &["TCL", "PARSE"]))?;
    let Some(script) = pairs.next() else {
        return Ok(Vec::new());
    };

    Ok(script
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::command)
        .map(|command| command.into_inner().map(word_parts).collect())
        .collect())
}

/// Split a string into list elements using command-language list syntax
pub fn split_list(text: &str) -> Result<Vec<String>> {
    let mut pairs = SyntaxParser::parse(Rule::list, text)
        .map_err(|error| syntax_failure(error, &["TCL", "VALUE", "LIST"]))?;
    let Some(list) = pairs.next() else {
        return Ok(Vec::new());
    };

    Ok(list
        .into_inner()
        .filter_map(|element| match element.as_rule() {
            Rule::braced_element => Some(inner_text(element)),
            Rule::quoted_element | Rule::bare_element => Some(
                element
                    .into_inner()
                    .map(|piece| match piece.as_rule() {
                        Rule::escape => list_escape(piece.as_str()),
                        _ => piece.as_str().to_string(),
                    })
                    .collect(),
            ),
            _ => None,
        })
        .collect())
}

fn word_parts(word: Pair<'_, Rule>) -> Word {
    if word.as_rule() == Rule::braced {
        return vec![Part::Text(inner_text(word))];
    }

    let mut parts = Vec::new();
    let mut text = String::new();
    for piece in word.into_inner() {
        match piece.as_rule() {
            Rule::variable => {
                flush_text(&mut parts, &mut text);
                parts.push(Part::Variable(inner_text(piece)));
            }
            Rule::command_sub => {
                flush_text(&mut parts, &mut text);
                parts.push(Part::Command(inner_text(piece)));
            }
            Rule::escape => text.push(word_escape(piece.as_str())),
            _ => text.push_str(piece.as_str()),
        }
    }
    flush_text(&mut parts, &mut text);
    parts
}

/// Text of the single inner pair: a brace body, a variable name or a script
fn inner_text(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|inner| inner.as_str().to_string())
        .unwrap_or_default()
}

fn flush_text(parts: &mut Word, text: &mut String) {
    if !text.is_empty() {
        parts.push(Part::Text(std::mem::take(text)));
    }
}

/// Backslash substitution inside a word; a trailing newline joins lines
fn word_escape(sequence: &str) -> char {
    match sequence.chars().nth(1) {
        Some('\n') => ' ',
        Some(escaped) => unescape(escaped),
        None => '\\',
    }
}

fn list_escape(sequence: &str) -> String {
    match sequence.chars().nth(1) {
        Some(escaped) => unescape(escaped).to_string(),
        None => "\\".to_string(),
    }
}

fn syntax_failure(error: PestError<Rule>, code: &[&str]) -> RuntimeError {
    let (line, column) = match error.line_col {
        LineColLocation::Pos(position) | LineColLocation::Span(position, _) => position,
    };
    RuntimeError::script_with_code(
        format!(
            "syntax error at line {line}, column {column}: {}",
            error.variant.message()
        ),
        code.iter().map(|tag| tag.to_string()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Part {
        Part::Text(s.to_string())
    }

    #[test]
    fn test_script_splits_words_and_commands() {
        let commands = parse_script("set a {b c}; puts \"x $a\"\n# note\nlist [self] $::g").unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0][2], vec![text("b c")]);
        assert_eq!(
            commands[1][1],
            vec![text("x "), Part::Variable("a".into())]
        );
        assert_eq!(commands[2][1], vec![Part::Command("self".into())]);
        assert_eq!(commands[2][2], vec![Part::Variable("::g".into())]);
    }

    #[test]
    fn test_braces_nest_and_stay_literal() {
        let commands = parse_script("puts {a {b $c} [d]} {}").unwrap();
        assert_eq!(commands[0][1], vec![text("a {b $c} [d]")]);
        assert_eq!(commands[0][2], vec![text("")]);
    }

    #[test]
    fn test_command_substitution_nests() {
        let commands = parse_script("set x [string cat [list a] {]}]-y").unwrap();
        assert_eq!(
            commands[0][2],
            vec![Part::Command("string cat [list a] {]}".into()), text("-y")]
        );
    }

    #[test]
    fn test_escapes_and_line_continuation() {
        let commands = parse_script("puts a\\ b \"c\\td\" \\\n  e ${f g}$").unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0][1], vec![text("a b")]);
        assert_eq!(commands[0][2], vec![text("c\td")]);
        assert_eq!(commands[0][3], vec![text("e")]);
        assert_eq!(commands[0][4], vec![Part::Variable("f g".into()), text("$")]);
    }

    #[test]
    fn test_unbalanced_scripts_are_rejected() {
        for script in ["puts {a", "puts [a", "puts \"a", "puts {a}b", "puts \"a\"b"] {
            let error = parse_script(script).unwrap_err();
            assert_eq!(error.error_code(), vec!["TCL", "PARSE"], "{script}");
        }
    }

    #[test]
    fn test_split_list() {
        let parts = split_list("a {b c} \"d e\" {} f\\ g").unwrap();
        assert_eq!(parts, vec!["a", "b c", "d e", "", "f g"]);
        assert!(split_list("  ").unwrap().is_empty());
    }

    #[test]
    fn test_split_list_errors() {
        for text in ["a {b", "\"abc", "{a}b"] {
            let error = split_list(text).unwrap_err();
            assert_eq!(error.error_code(), vec!["TCL", "VALUE", "LIST"], "{text}");
        }
    }
}
