//! C preprocessor expression grammar.
//!
//! ## Grammar
//!
//! ```text
//! <expression>  := <assignment> ("," <assignment>)*
//! <assignment>  := <conditional> (<assign-op> <assignment>)?
//! <conditional> := <or> ("?" <expression> ":" <conditional>)?
//! <or>          := <and> ("||" <and>)*
//! <and>         := <bit-or> ("&&" <bit-or>)*
//! <bit-or>      := <bit-xor> ("|" <bit-xor>)*
//! <bit-xor>     := <bit-and> ("^" <bit-and>)*
//! <bit-and>     := <equality> ("&" <equality>)*
//! <equality>    := <relational> (("==" | "!=") <relational>)*
//! <relational>  := <shift> (("<" | ">" | "<=" | ">=") <shift>)*
//! <shift>       := <additive> (("<<" | ">>") <additive>)*
//! <additive>    := <multiplicative> (("+" | "-") <multiplicative>)*
//! <multiplicative> := <primary> (("*" | "/" | "%") <primary>)*
//! <primary>     := "(" <expression> ")" | "!" <primary> | <unary-op> <primary>
//!                | <string>+ | <char> | <number> | <special-op> | <call> | <identifier>
//! ```
//!
//! Only `||`, `&&`, `!` and parentheses survive as structure. Every other
//! level with more than one operand collapses into a single [`ExprTree::Atom`]
//! holding its whitespace-free text, so `1 > -42` becomes the atom `1>-42`.

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded, repeat};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};
use winnow::ModalResult;

use super::ExprTree;

/// An operator symbol and the characters that must not follow it (so that
/// `&` does not match the start of `&&`).
type Operator = (&'static str, &'static [char]);

const NOTHING: &[char] = &[];

const MULTIPLICATIVE: &[Operator] = &[("*", &['=']), ("/", &['=']), ("%", &['='])];
const ADDITIVE: &[Operator] = &[("+", &['=', '+']), ("-", &['=', '-'])];
const SHIFT: &[Operator] = &[("<<", &['=']), (">>", &['='])];
const RELATIONAL: &[Operator] = &[
    ("<=", NOTHING),
    (">=", NOTHING),
    ("<", &['<', '=']),
    (">", &['>', '=']),
];
const EQUALITY: &[Operator] = &[("==", NOTHING), ("!=", NOTHING)];
const BIT_AND: &[Operator] = &[("&", &['&', '='])];
const BIT_XOR: &[Operator] = &[("^", &['='])];
const BIT_OR: &[Operator] = &[("|", &['|', '='])];
const ASSIGNMENT: &[Operator] = &[
    ("<<=", NOTHING),
    (">>=", NOTHING),
    ("*=", NOTHING),
    ("/=", NOTHING),
    ("%=", NOTHING),
    ("+=", NOTHING),
    ("-=", NOTHING),
    ("&=", NOTHING),
    ("^=", NOTHING),
    ("|=", NOTHING),
    ("=", &['=']),
];
const UNARY: &[Operator] = &[
    ("-", &['-', '=']),
    ("+", &['+', '=']),
    ("~", NOTHING),
    ("*", &['=']),
    ("&", &['&', '=']),
];

/// Operators whose whole call form is one literal.
const SPECIAL_OPERATORS: &[&str] = &[
    "__has_include",
    "__has_include_next",
    "__has_attribute",
    "__has_cpp_attribute",
    "__has_c_attribute",
    "__has_builtin",
];

/// Parse the argument of `#if`/`#elif` into its boolean skeleton.
///
/// Comments are stripped first; an argument that is empty afterwards is an
/// error.
pub(crate) fn parse_c_expression(text: &str) -> Result<ExprTree, String> {
    let stripped = strip_comments(text);
    let input = stripped.trim();
    if input.is_empty() {
        return Err("missing formula".to_string());
    }

    parse_expression.parse(input).map_err(|e| format!("{:?}", e))
}

/// Remove `//` and `/* */` comments outside of string and character
/// literals. An unterminated block comment runs to the end of the text.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('/', Some('/')) => break,
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        break;
                    }
                    previous = c;
                }
                out.push(' ');
            }
            ('"', _) | ('\'', _) => {
                quote = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Remove whitespace outside of string and character literals.
pub(crate) fn compact(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c.is_whitespace() => {}
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

// ============================================================================
// Lexical helpers (shared with the jpp grammar)
// ============================================================================

/// Parse `symbol` after optional whitespace, unless it is followed by one of
/// `longer` (which would make it part of a longer operator).
pub(crate) fn parse_symbol(
    input: &mut &str,
    symbol: &'static str,
    longer: &[char],
) -> ModalResult<&'static str> {
    let checkpoint = *input;
    let _ = multispace0.parse_next(input)?;

    if let Some(rest) = input.strip_prefix(symbol) {
        if !rest.starts_with(longer) {
            *input = rest;
            return Ok(symbol);
        }
    }

    *input = checkpoint;
    Err(ErrMode::from_input(input))
}

/// Parse the first operator of `operators` that matches.
pub(crate) fn parse_operator(
    input: &mut &str,
    operators: &[Operator],
) -> ModalResult<&'static str> {
    for &(symbol, longer) in operators {
        if let Ok(symbol) = parse_symbol(input, symbol, longer) {
            return Ok(symbol);
        }
    }
    Err(ErrMode::from_input(input))
}

/// Parse a C identifier.
pub(crate) fn parse_identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
    )
        .take()
        .parse_next(input)
}

/// Parse a numeric constant, including suffixes and digit separators.
pub(crate) fn parse_number<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_digit()),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '\''
        }),
    )
        .take()
        .parse_next(input)
}

/// Parse a literal delimited by `quote`, honoring backslash escapes.
fn parse_quoted<'i>(input: &mut &'i str, quote: char) -> ModalResult<&'i str> {
    let text: &'i str = *input;
    let mut chars = text.char_indices();
    if !matches!(chars.next(), Some((_, c)) if c == quote) {
        return Err(ErrMode::from_input(input));
    }

    let mut escaped = false;
    for (index, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            let end = index + c.len_utf8();
            *input = &text[end..];
            return Ok(&text[..end]);
        }
    }
    Err(ErrMode::from_input(input))
}

pub(crate) fn parse_string_literal<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    parse_quoted(input, '"')
}

fn parse_char_literal<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    parse_quoted(input, '\'')
}

/// Parse a parenthesized argument list with balanced parentheses and return
/// its compacted content.
fn parse_call_arguments(input: &mut &str) -> ModalResult<String> {
    let checkpoint = *input;
    let _ = multispace0.parse_next(input)?;
    let text: &str = *input;
    if !text.starts_with('(') {
        *input = checkpoint;
        return Err(ErrMode::from_input(input));
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    *input = &text[index + 1..];
                    return Ok(compact(&text[1..index]));
                }
            }
            _ => {}
        }
    }

    *input = checkpoint;
    Err(ErrMode::from_input(input))
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

/// Parse a comma expression (lowest precedence).
fn parse_expression(input: &mut &str) -> ModalResult<ExprTree> {
    let first = parse_assignment(input)?;

    let rest: Vec<ExprTree> =
        repeat(0.., preceded(parse_comma, parse_assignment)).parse_next(input)?;

    if rest.is_empty() {
        return Ok(first);
    }
    let mut all = vec![first];
    all.extend(rest);
    let text: Vec<String> = all.iter().map(ExprTree::text).collect();
    Ok(ExprTree::Atom(text.join(",")))
}

fn parse_comma(input: &mut &str) -> ModalResult<&'static str> {
    parse_symbol(input, ",", NOTHING)
}

/// Parse an assignment (right associative).
fn parse_assignment(input: &mut &str) -> ModalResult<ExprTree> {
    let target = parse_conditional(input)?;

    let assigned = opt((
        |i: &mut &str| parse_operator(i, ASSIGNMENT),
        parse_assignment,
    ))
    .parse_next(input)?;

    Ok(match assigned {
        Some((op, value)) => ExprTree::Atom(format!("{}{}{}", target.text(), op, value.text())),
        None => target,
    })
}

/// Parse a ternary conditional. The whole ternary is one atom.
fn parse_conditional(input: &mut &str) -> ModalResult<ExprTree> {
    let condition = parse_logical_or(input)?;

    if parse_symbol(input, "?", NOTHING).is_err() {
        return Ok(condition);
    }
    let then = parse_expression(input)?;
    parse_symbol(input, ":", &[':'])?;
    let otherwise = parse_conditional(input)?;

    Ok(ExprTree::Atom(format!(
        "{}?{}:{}",
        condition.text(),
        then.text(),
        otherwise.text()
    )))
}

fn parse_logical_or(input: &mut &str) -> ModalResult<ExprTree> {
    let first = parse_logical_and(input)?;

    let rest: Vec<ExprTree> =
        repeat(0.., preceded(parse_or_operator, parse_logical_and)).parse_next(input)?;

    if rest.is_empty() {
        Ok(first)
    } else {
        let mut all = vec![first];
        all.extend(rest);
        Ok(ExprTree::Or(all))
    }
}

fn parse_logical_and(input: &mut &str) -> ModalResult<ExprTree> {
    let first = parse_bit_or(input)?;

    let rest: Vec<ExprTree> =
        repeat(0.., preceded(parse_and_operator, parse_bit_or)).parse_next(input)?;

    if rest.is_empty() {
        Ok(first)
    } else {
        let mut all = vec![first];
        all.extend(rest);
        Ok(ExprTree::And(all))
    }
}

fn parse_or_operator(input: &mut &str) -> ModalResult<&'static str> {
    parse_symbol(input, "||", NOTHING)
}

fn parse_and_operator(input: &mut &str) -> ModalResult<&'static str> {
    parse_symbol(input, "&&", NOTHING)
}

/// Parse `operand (op operand)*`. Any operator makes the level opaque.
fn parse_opaque_level(
    input: &mut &str,
    operand: fn(&mut &str) -> ModalResult<ExprTree>,
    operators: &[Operator],
) -> ModalResult<ExprTree> {
    let first = operand(input)?;

    let rest: Vec<(&'static str, ExprTree)> = repeat(
        0..,
        (|i: &mut &str| parse_operator(i, operators), operand),
    )
    .parse_next(input)?;

    if rest.is_empty() {
        return Ok(first);
    }
    let mut text = first.text();
    for (op, next) in rest {
        text.push_str(op);
        text.push_str(&next.text());
    }
    Ok(ExprTree::Atom(text))
}

fn parse_bit_or(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_bit_xor, BIT_OR)
}

fn parse_bit_xor(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_bit_and, BIT_XOR)
}

fn parse_bit_and(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_equality, BIT_AND)
}

fn parse_equality(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_relational, EQUALITY)
}

fn parse_relational(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_shift, RELATIONAL)
}

fn parse_shift(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_additive, SHIFT)
}

fn parse_additive(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_multiplicative, ADDITIVE)
}

fn parse_multiplicative(input: &mut &str) -> ModalResult<ExprTree> {
    parse_opaque_level(input, parse_primary, MULTIPLICATIVE)
}

/// Parse a primary expression.
fn parse_primary(input: &mut &str) -> ModalResult<ExprTree> {
    let _ = multispace0.parse_next(input)?;

    alt((
        parse_group,
        parse_negation,
        parse_unary,
        parse_strings,
        parse_char_literal.map(|s: &str| ExprTree::Atom(s.to_string())),
        parse_number.map(|s: &str| ExprTree::Atom(s.to_string())),
        parse_word,
    ))
    .parse_next(input)
}

fn parse_group(input: &mut &str) -> ModalResult<ExprTree> {
    delimited(('(', multispace0), parse_expression, (multispace0, ')'))
        .map(|inner| ExprTree::Group(Box::new(inner)))
        .parse_next(input)
}

fn parse_negation(input: &mut &str) -> ModalResult<ExprTree> {
    parse_symbol(input, "!", &['='])?;
    let operand = parse_primary(input)?;
    Ok(ExprTree::Not(Box::new(operand)))
}

fn parse_unary(input: &mut &str) -> ModalResult<ExprTree> {
    let op = parse_operator(input, UNARY)?;
    let operand = parse_primary(input)?;
    Ok(ExprTree::Atom(format!("{}{}", op, operand.text())))
}

/// Adjacent string literals form one atom.
fn parse_strings(input: &mut &str) -> ModalResult<ExprTree> {
    let parts: Vec<&str> =
        repeat(1.., preceded(multispace0, parse_string_literal)).parse_next(input)?;
    Ok(ExprTree::Atom(parts.concat()))
}

/// Identifiers, macro calls and special operators.
fn parse_word(input: &mut &str) -> ModalResult<ExprTree> {
    let name = parse_identifier(input)?;

    if name == "defined" {
        return parse_defined(input);
    }

    let arguments = opt(parse_call_arguments).parse_next(input)?;
    Ok(match arguments {
        Some(args) if SPECIAL_OPERATORS.contains(&name) => {
            ExprTree::Atom(format!("{}({})", name, args))
        }
        Some(args) => ExprTree::Call {
            name: name.to_string(),
            args,
        },
        None => ExprTree::Atom(name.to_string()),
    })
}

/// `defined(X)`, `defined X` and a bare `defined` all render as one atom.
fn parse_defined(input: &mut &str) -> ModalResult<ExprTree> {
    let name = opt(alt((
        delimited(
            (multispace0, '(', multispace0),
            parse_identifier,
            (multispace0, ')'),
        ),
        preceded(multispace0, parse_identifier),
    )))
    .parse_next(input)?;

    Ok(ExprTree::Atom(match name {
        Some(name) => format!("defined({})", name),
        None => "defined".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{and, not, or, var, Formula};

    fn abstracted(text: &str) -> Formula {
        parse_c_expression(text).unwrap().to_formula(false)
    }

    mod boolean_structure_tests {
        use super::*;

        #[test]
        fn single_literal() {
            assert_eq!(abstracted("A"), var("A"));
        }

        #[test]
        fn connectives_are_kept() {
            assert_eq!(abstracted("A && B"), and([var("A"), var("B")]));
            assert_eq!(abstracted("A || B"), or([var("A"), var("B")]));
            assert_eq!(abstracted("!A"), not(var("A")));
            assert_eq!(
                abstracted("(A || B) && !C"),
                and([or([var("A"), var("B")]), not(var("C"))])
            );
        }

        #[test]
        fn and_binds_tighter_than_or() {
            assert_eq!(
                abstracted("A || B && C"),
                or([var("A"), and([var("B"), var("C")])])
            );
        }

        #[test]
        fn nested_parentheses() {
            assert_eq!(abstracted("((A))"), var("A"));
            assert_eq!(abstracted("!(A && B)"), not(and([var("A"), var("B")])));
        }
    }

    mod opaque_literal_tests {
        use super::*;

        #[test]
        fn comparison_is_one_literal() {
            assert_eq!(abstracted("1 > -42"), var("1>-42"));
            assert_eq!(abstracted("A == 1"), var("A==1"));
            assert_eq!(abstracted("VERSION >= 0x0200"), var("VERSION>=0x0200"));
        }

        #[test]
        fn ternary_is_one_literal() {
            assert_eq!(abstracted("A ? B : C"), var("A?B:C"));
            assert_eq!(abstracted("A ? B && C : D"), var("A?B&&C:D"));
        }

        #[test]
        fn arithmetic_and_bit_operators() {
            assert_eq!(abstracted("A + B * 2"), var("A+B*2"));
            assert_eq!(abstracted("(A << 2) | B"), var("(A<<2)|B"));
            assert_eq!(abstracted("A & B"), var("A&B"));
            assert_eq!(abstracted("A ^ B"), var("A^B"));
            assert_eq!(abstracted("~A"), var("~A"));
        }

        #[test]
        fn comparison_inside_connective() {
            assert_eq!(
                abstracted("A > 1 && defined(B)"),
                and([var("A>1"), var("defined(B)")])
            );
        }

        #[test]
        fn negated_parenthesized_comparison() {
            assert_eq!(
                abstracted("!(('Z' - 'A') == 25)"),
                not(var("('Z'-'A')==25"))
            );
        }

        #[test]
        fn boolean_subexpression_below_comparison_is_text() {
            assert_eq!(abstracted("(A && B) == 1"), var("(A&&B)==1"));
        }

        #[test]
        fn assignment_and_comma() {
            assert_eq!(abstracted("A = 3"), var("A=3"));
            assert_eq!(abstracted("A, B"), var("A,B"));
        }

        #[test]
        fn string_literals_keep_inner_spaces() {
            assert_eq!(abstracted("\"a b\" \"c\""), var("\"a b\"\"c\""));
        }
    }

    mod special_operator_tests {
        use super::*;

        #[test]
        fn defined_forms() {
            assert_eq!(abstracted("defined(A)"), var("defined(A)"));
            assert_eq!(abstracted("defined ( A )"), var("defined(A)"));
            assert_eq!(abstracted("defined A"), var("defined(A)"));
            assert_eq!(
                abstracted("defined A && defined B"),
                and([var("defined(A)"), var("defined(B)")])
            );
            assert_eq!(abstracted("!defined(A)"), not(var("defined(A)")));
        }

        #[test]
        fn has_include_keeps_path() {
            assert_eq!(
                abstracted("__has_include(<nss3/nss.h>)"),
                var("__has_include(<nss3/nss.h>)")
            );
            assert_eq!(
                abstracted("__has_include(\"my file.h\")"),
                var("__has_include(\"my file.h\")")
            );
            assert_eq!(abstracted("__has_include"), var("__has_include"));
            assert_eq!(
                abstracted("defined __has_include"),
                var("defined(__has_include)")
            );
        }

        #[test]
        fn has_attribute_family() {
            assert_eq!(
                abstracted("__has_cpp_attribute(nodiscard) >= 201603L"),
                var("__has_cpp_attribute(nodiscard)>=201603L")
            );
            assert_eq!(
                abstracted("__has_builtin( __builtin_expect )"),
                var("__has_builtin(__builtin_expect)")
            );
        }

        #[test]
        fn macro_calls_are_literals() {
            assert_eq!(abstracted("MACRO (A, B)"), var("MACRO(A,B)"));
            assert_eq!(
                abstracted("VERSION(1, 2) && A"),
                and([var("VERSION(1,2)"), var("A")])
            );
        }
    }

    mod comment_tests {
        use super::*;

        #[test]
        fn line_comment_is_ignored() {
            assert_eq!(abstracted("A // Comment && B"), var("A"));
        }

        #[test]
        fn block_comment_is_ignored() {
            assert_eq!(abstracted("A /* Comment */ && B"), and([var("A"), var("B")]));
            assert_eq!(abstracted("A /* Multiline"), var("A"));
        }

        #[test]
        fn comment_markers_inside_strings_are_kept() {
            assert_eq!(abstracted("\"//\" == A"), var("\"//\"==A"));
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn malformed_expressions_fail() {
            assert!(parse_c_expression("").is_err());
            assert!(parse_c_expression("// only a comment").is_err());
            assert!(parse_c_expression("A &&").is_err());
            assert!(parse_c_expression("(A").is_err());
            assert!(parse_c_expression("A B").is_err());
            assert!(parse_c_expression("1 >").is_err());
            assert!(parse_c_expression("A ? B").is_err());
        }
    }
}
