//! Java preprocessor (`//#if`) expression grammar.
//!
//! ## Grammar
//!
//! ```text
//! <expression> := <and> (("or" | "||") <and>)*
//! <and>        := <primary> (("and" | "&&") <primary>)*
//! <primary>    := "defined" "(" <identifier> ")"
//!               | "!" "defined" "(" <identifier> ")"
//!               | <operand> (<comparison> <operand>)?
//! <operand>    := "${" <identifier> "}" | <number> | <string>+
//!               | ("+" | "-") <number> | <identifier>
//! <comparison> := "<" | ">" | "<=" | ">=" | "==" | "!="
//! ```
//!
//! A comparison (or a lone operand) is one literal named by its text with
//! whitespace removed outside strings: `${ test } == "a b"` becomes
//! `${test}=="a b"`.

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded, repeat};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

use super::cpp::{
    parse_identifier, parse_number, parse_operator, parse_string_literal, parse_symbol,
};
use super::ExprTree;

const COMPARISON: &[(&str, &[char])] = &[
    ("<=", &[]),
    (">=", &[]),
    ("==", &[]),
    ("!=", &[]),
    ("<", &['=']),
    (">", &['=']),
];

/// Parse the argument of `//#if`/`//#elif` into its boolean skeleton.
pub(crate) fn parse_jpp_expression(text: &str) -> Result<ExprTree, String> {
    let input = text.trim();
    if input.is_empty() {
        return Err("missing formula".to_string());
    }

    parse_expression.parse(input).map_err(|e| format!("{:?}", e))
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

fn parse_expression(input: &mut &str) -> ModalResult<ExprTree> {
    let first = parse_and_expr(input)?;

    let rest: Vec<ExprTree> =
        repeat(0.., preceded(parse_or_keyword, parse_and_expr)).parse_next(input)?;

    if rest.is_empty() {
        Ok(first)
    } else {
        let mut all = vec![first];
        all.extend(rest);
        Ok(ExprTree::Or(all))
    }
}

fn parse_and_expr(input: &mut &str) -> ModalResult<ExprTree> {
    let first = parse_primary(input)?;

    let rest: Vec<ExprTree> =
        repeat(0.., preceded(parse_and_keyword, parse_primary)).parse_next(input)?;

    if rest.is_empty() {
        Ok(first)
    } else {
        let mut all = vec![first];
        all.extend(rest);
        Ok(ExprTree::And(all))
    }
}

fn parse_primary(input: &mut &str) -> ModalResult<ExprTree> {
    let _ = multispace0.parse_next(input)?;

    alt((parse_defined, parse_undefined, parse_comparison)).parse_next(input)
}

/// `defined(X)`
fn parse_defined(input: &mut &str) -> ModalResult<ExprTree> {
    let checkpoint = *input;
    let word = parse_identifier(input)?;
    if word != "defined" {
        *input = checkpoint;
        return Err(ErrMode::from_input(input));
    }

    let name = delimited(
        (multispace0, '(', multispace0),
        parse_identifier,
        (multispace0, ')'),
    )
    .parse_next(input)?;

    Ok(ExprTree::Atom(format!("defined({})", name)))
}

/// `!defined(X)`
fn parse_undefined(input: &mut &str) -> ModalResult<ExprTree> {
    parse_symbol(input, "!", &['='])?;
    let _ = multispace0.parse_next(input)?;
    let defined = parse_defined(input)?;
    Ok(ExprTree::Not(Box::new(defined)))
}

fn parse_comparison(input: &mut &str) -> ModalResult<ExprTree> {
    let left = parse_operand(input)?;

    let right = opt((|i: &mut &str| parse_operator(i, COMPARISON), parse_operand))
        .parse_next(input)?;

    Ok(ExprTree::Atom(match right {
        Some((op, right)) => format!("{}{}{}", left, op, right),
        None => left,
    }))
}

fn parse_operand(input: &mut &str) -> ModalResult<String> {
    let _ = multispace0.parse_next(input)?;

    alt((
        parse_property,
        parse_signed_number,
        parse_number.map(str::to_string),
        repeat(1.., preceded(multispace0, parse_string_literal))
            .map(|parts: Vec<&str>| parts.concat()),
        parse_plain_identifier.map(str::to_string),
    ))
    .parse_next(input)
}

/// `${name}`
fn parse_property(input: &mut &str) -> ModalResult<String> {
    delimited(
        ("${", multispace0),
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '-'),
        (multispace0, '}'),
    )
    .map(|name: &str| format!("${{{}}}", name))
    .parse_next(input)
}

fn parse_signed_number(input: &mut &str) -> ModalResult<String> {
    let sign = alt(('-', '+')).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let number = parse_number(input)?;
    Ok(format!("{}{}", sign, number))
}

/// An identifier operand, excluding the connective keywords.
fn parse_plain_identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    let checkpoint = *input;
    let word = parse_identifier(input)?;
    if matches!(word, "and" | "or" | "defined") {
        *input = checkpoint;
        return Err(ErrMode::from_input(input));
    }
    Ok(word)
}

/// Parse `or` or `||`.
fn parse_or_keyword(input: &mut &str) -> ModalResult<()> {
    parse_connective(input, "or", "||")
}

/// Parse `and` or `&&`.
fn parse_and_keyword(input: &mut &str) -> ModalResult<()> {
    parse_connective(input, "and", "&&")
}

fn parse_connective(input: &mut &str, keyword: &str, symbol: &'static str) -> ModalResult<()> {
    let checkpoint = *input;
    let _ = multispace0.parse_next(input)?;

    if parse_symbol(input, symbol, &[]).is_ok() {
        return Ok(());
    }
    if let Ok(word) = parse_identifier(input) {
        if word == keyword {
            return Ok(());
        }
    }

    *input = checkpoint;
    Err(ErrMode::from_input(input))
}
