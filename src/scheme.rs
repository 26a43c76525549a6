//! Reader: source text to tokens, tokens to trees.
//!
//! Reading happens in two passes. [`tokenize`] scans the whole input into a
//! flat [`Token`] sequence with nom, and [`parse_program`] brackets those
//! tokens into arena lists. The result is a `Nil`-terminated list holding one
//! tree per top-level form.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, not_line_ending, one_of, satisfy},
    combinator::{recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::pair,
};

use crate::arena::Arena;
use crate::ast::{NumberType, SYMBOL_INITIAL_CHARS, Value};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(NumberType),
    Double(f64),
    /// String literal text, including its surrounding quotes
    Str(String),
    Symbol(String),
    Boolean(bool),
    Open,
    Close,
    /// The `'` shorthand
    Quote,
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_symbol_initial(c: char) -> bool {
    c.is_alphabetic() || SYMBOL_INITIAL_CHARS.contains(c) || c == '+' || c == '-'
}

/// Symbols run until whitespace, a parenthesis, or a comment
fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ';')
}

fn failure(input: &str, code: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, code))
}

/// Whitespace and `;` comments. Whitespace is whatever ends a symbol.
fn atmosphere(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            take_while1(char::is_whitespace),
            recognize(pair(char(';'), not_line_ending)),
        ))),
    )
    .parse(input)
}

fn skip_atmosphere(input: &str) -> &str {
    atmosphere(input).map_or(input, |(rest, ())| rest)
}

/// Parse a number. A `.` anywhere makes it a double.
fn parse_number(input: &str) -> IResult<&str, Token> {
    let (rest, text) = alt((
        recognize((
            one_of("+-"),
            satisfy(|c: char| c.is_ascii_digit()),
            take_while(is_number_char),
        )),
        recognize(pair(satisfy(is_number_char), take_while(is_number_char))),
    ))
    .parse(input)?;

    if text.contains('.') {
        match text.parse::<f64>() {
            Ok(d) => Ok((rest, Token::Double(d))),
            Err(_) => Err(failure(input, ErrorKind::Float)),
        }
    } else {
        match text.parse::<NumberType>() {
            Ok(n) => Ok((rest, Token::Integer(n))),
            Err(_) => Err(failure(input, ErrorKind::Digit)),
        }
    }
}

/// Parse a boolean (#t or #f); any other `#` form is an error
fn parse_bool(input: &str) -> IResult<&str, Token> {
    let (rest, _) = char('#').parse(input)?;
    alt((
        value(Token::Boolean(true), char('t')),
        value(Token::Boolean(false), char('f')),
    ))
    .parse(rest)
    .map_err(|_: nom::Err<nom::error::Error<&str>>| failure(input, ErrorKind::Tag))
}

/// Parse a string literal. There are no escape sequences.
fn parse_string(input: &str) -> IResult<&str, Token> {
    let (rest, _) = char('"').parse(input)?;
    let (rest, body) = take_while(|c: char| c != '"').parse(rest)?;
    match rest.strip_prefix('"') {
        Some(rest) => Ok((rest, Token::Str(format!("\"{body}\"")))),
        None => Err(failure(input, ErrorKind::Eof)),
    }
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> IResult<&str, Token> {
    recognize(pair(satisfy(is_symbol_initial), take_while(is_symbol_char)))
        .map(|name: &str| Token::Symbol(name.to_owned()))
        .parse(input)
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Open, char('(')),
        value(Token::Close, char(')')),
        value(Token::Quote, char('\'')),
        parse_bool,
        parse_string,
        // Numbers before symbols: `-5` is a number, `-` and `-x` are symbols
        parse_number,
        parse_symbol,
    ))
    .parse(input)
}

/// Convert nom parsing errors to structured parse errors
fn token_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let byte_offset = input.len().saturating_sub(e.input.len());
            let offset = input
                .get(..byte_offset)
                .map_or(0, |consumed| consumed.chars().count());
            let found: String = e
                .input
                .chars()
                .take_while(|c| !c.is_whitespace())
                .take(20)
                .collect();
            let (kind, message) = match e.code {
                ErrorKind::Float => (ParseErrorKind::InvalidSyntax, "Malformed number literal"),
                ErrorKind::Digit => (
                    ParseErrorKind::ImplementationLimit,
                    "Integer literal does not fit in 64 bits",
                ),
                ErrorKind::Tag => (
                    ParseErrorKind::InvalidSyntax,
                    "Invalid boolean literal (expected #t or #f)",
                ),
                ErrorKind::Eof => (ParseErrorKind::Incomplete, "Unterminated string literal"),
                _ => (ParseErrorKind::InvalidSyntax, "Unexpected character"),
            };
            ParseError::with_context_and_found(kind, message, input, offset, Some(found))
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Scan the whole input into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut rest = skip_atmosphere(input);
    while !rest.is_empty() {
        let (remaining, token) = parse_token(rest).map_err(|e| token_error(input, e))?;
        tokens.push(token);
        rest = skip_atmosphere(remaining);
    }
    Ok(tokens)
}

/// A list still waiting for its `)`, plus any `'` prefixes waiting for a datum
#[derive(Default)]
struct OpenList {
    items: Vec<Value>,
    pending_quotes: usize,
}

impl OpenList {
    fn push(&mut self, mut datum: Value, arena: &mut Arena) -> Result<(), Error> {
        for _ in 0..std::mem::take(&mut self.pending_quotes) {
            let quote = Value::Symbol(arena.alloc_text("quote")?);
            datum = arena.list(&[quote, datum])?;
        }
        self.items.push(datum);
        Ok(())
    }
}

fn dangling_quote() -> Error {
    ParseError::from_message(ParseErrorKind::Incomplete, "Quote with no datum after it").into()
}

/// Bracket a token sequence into a `Nil`-terminated list of top-level forms.
pub fn parse_program(tokens: &[Token], arena: &mut Arena, max_depth: usize) -> Result<Value, Error> {
    let mut program = OpenList::default();
    let mut open: Vec<OpenList> = Vec::new();

    for token in tokens {
        let datum = match token {
            Token::Open => {
                if open.len() >= max_depth {
                    return Err(ParseError::from_message(
                        ParseErrorKind::TooDeeplyNested,
                        format!("Expression too deeply nested (max depth: {max_depth})"),
                    )
                    .into());
                }
                open.push(OpenList::default());
                continue;
            }
            Token::Close => {
                let Some(finished) = open.pop() else {
                    return Err(ParseError::from_message(
                        ParseErrorKind::UnexpectedClose,
                        "Unexpected ')' with no matching '('",
                    )
                    .into());
                };
                if finished.pending_quotes > 0 {
                    return Err(dangling_quote());
                }
                arena.list(&finished.items)?
            }
            Token::Quote => {
                open.last_mut().unwrap_or(&mut program).pending_quotes += 1;
                continue;
            }
            Token::Integer(n) => Value::Integer(*n),
            Token::Double(d) => Value::Double(*d),
            Token::Boolean(b) => Value::Boolean(*b),
            Token::Str(text) => Value::String(arena.alloc_text(text)?),
            Token::Symbol(name) => Value::Symbol(arena.alloc_text(name)?),
        };
        open.last_mut().unwrap_or(&mut program).push(datum, arena)?;
    }

    if !open.is_empty() {
        return Err(ParseError::from_message(
            ParseErrorKind::Incomplete,
            format!("Missing ')': {} unclosed list(s) at end of input", open.len()),
        )
        .into());
    }
    if program.pending_quotes > 0 {
        return Err(dangling_quote());
    }
    arena.list(&program.items)
}

/// Tokenize and parse a whole program with the default nesting limit.
pub fn read_program(input: &str, arena: &mut Arena) -> Result<Value, Error> {
    parse_program(&tokenize(input)?, arena, MAX_PARSE_DEPTH)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::printer::print_value;

    /// Test result variants for tokenizer tests
    #[derive(Debug)]
    enum TokenTestResult {
        Tokens(Vec<Token>),
        SpecificError(ParseErrorKind, &'static str),
    }
    use Token::*;
    use TokenTestResult::*;

    fn symbol(name: &str) -> Token {
        Symbol(name.to_owned())
    }

    fn string(text: &str) -> Token {
        Str(text.to_owned())
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_tokenizer_data_driven() {
        let test_cases = vec![
            // Numbers
            ("42", Tokens(vec![Integer(42)])),
            ("-17", Tokens(vec![Integer(-17)])),
            ("+5", Tokens(vec![Integer(5)])),
            ("2.75", Tokens(vec![Double(2.75)])),
            (".5", Tokens(vec![Double(0.5)])),
            ("-0.25", Tokens(vec![Double(-0.25)])),
            ("1.", Tokens(vec![Double(1.0)])),
            ("9223372036854775807", Tokens(vec![Integer(i64::MAX)])),
            ("-9223372036854775808", Tokens(vec![Integer(i64::MIN)])),
            // A number stops at the first non-number character
            ("12abc", Tokens(vec![Integer(12), symbol("abc")])),
            // Symbols, including the sign characters on their own
            ("foo", Tokens(vec![symbol("foo")])),
            ("+", Tokens(vec![symbol("+")])),
            ("-", Tokens(vec![symbol("-")])),
            ("-x", Tokens(vec![symbol("-x")])),
            ("null?", Tokens(vec![symbol("null?")])),
            ("set!", Tokens(vec![symbol("set!")])),
            ("let*", Tokens(vec![symbol("let*")])),
            ("<=>", Tokens(vec![symbol("<=>")])),
            ("a1-b2", Tokens(vec![symbol("a1-b2")])),
            ("x;comment", Tokens(vec![symbol("x")])),
            // Booleans
            ("#t", Tokens(vec![Boolean(true)])),
            ("#f", Tokens(vec![Boolean(false)])),
            // Strings keep their quotes and have no escapes
            ("\"hello world\"", Tokens(vec![string("\"hello world\"")])),
            ("\"\"", Tokens(vec![string("\"\"")])),
            ("\"a\\\"", Tokens(vec![string("\"a\\\"")])),
            ("\"(not a list)\"", Tokens(vec![string("\"(not a list)\"")])),
            // Structure
            (
                "(+ 1 2)",
                Tokens(vec![Open, symbol("+"), Integer(1), Integer(2), Close]),
            ),
            ("'x", Tokens(vec![Quote, symbol("x")])),
            ("'()", Tokens(vec![Quote, Open, Close])),
            (
                "(a(b)c)",
                Tokens(vec![Open, symbol("a"), Open, symbol("b"), Close, symbol("c"), Close]),
            ),
            // Whitespace and comments
            ("", Tokens(vec![])),
            ("   \n\t  ", Tokens(vec![])),
            ("; only a comment", Tokens(vec![])),
            (
                "1 ; one\n2 ; two\n",
                Tokens(vec![Integer(1), Integer(2)]),
            ),
            ("(x)\r\n(y)", Tokens(vec![Open, symbol("x"), Close, Open, symbol("y"), Close])),
            // Any Unicode whitespace separates tokens, as it ends symbols
            ("(x)\u{c}(y)", Tokens(vec![Open, symbol("x"), Close, Open, symbol("y"), Close])),
            ("a\u{a0}b", Tokens(vec![symbol("a"), symbol("b")])),
            ("\u{2003}42\u{2003}", Tokens(vec![Integer(42)])),
            // Errors
            (
                "\"unterminated",
                SpecificError(ParseErrorKind::Incomplete, "Unterminated string literal"),
            ),
            (
                "#x",
                SpecificError(ParseErrorKind::InvalidSyntax, "Invalid boolean literal"),
            ),
            (
                "#",
                SpecificError(ParseErrorKind::InvalidSyntax, "Invalid boolean literal"),
            ),
            (
                "1.2.3",
                SpecificError(ParseErrorKind::InvalidSyntax, "Malformed number literal"),
            ),
            (
                ".",
                SpecificError(ParseErrorKind::InvalidSyntax, "Malformed number literal"),
            ),
            (
                "9223372036854775808",
                SpecificError(
                    ParseErrorKind::ImplementationLimit,
                    "Integer literal does not fit in 64 bits",
                ),
            ),
            (
                "(a @b)",
                SpecificError(ParseErrorKind::InvalidSyntax, "Unexpected character"),
            ),
            (
                "[1]",
                SpecificError(ParseErrorKind::InvalidSyntax, "Unexpected character"),
            ),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("Tokenize test #{} ({input:?})", i + 1);
            match (tokenize(input), expected) {
                (Ok(actual), Tokens(expected)) => {
                    assert_eq!(actual, expected, "{test_id}: token mismatch");
                }
                (Err(Error::ParseError(err)), SpecificError(kind, text)) => {
                    assert_eq!(err.kind, kind, "{test_id}: kind mismatch");
                    assert!(
                        err.message.contains(text),
                        "{test_id}: message should contain '{text}', got '{}'",
                        err.message
                    );
                }
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}");
                }
            }
        }
    }

    #[test]
    fn test_error_reports_offending_text() {
        let Err(Error::ParseError(err)) = tokenize("(define s \"abc") else {
            panic!("expected a parse error");
        };
        assert_eq!(err.found.as_deref(), Some("\"abc"));
        assert_eq!(err.context.as_deref(), Some("(define s \"abc"));
    }

    /// Parse `input`, print every top-level form, and join with newlines
    fn parse_and_print(input: &str) -> Result<String, Error> {
        let mut arena = Arena::new();
        let forms = read_program(input, &mut arena)?;
        let printed: Vec<String> = arena
            .list_to_vec(forms)
            .unwrap()
            .into_iter()
            .map(|form| print_value(form, &arena))
            .collect();
        Ok(printed.join("\n"))
    }

    #[test]
    fn test_parser_data_driven() {
        let test_cases: Vec<(&str, Result<&str, ParseErrorKind>)> = vec![
            ("42", Ok("42")),
            ("(+ 1 2)", Ok("(+ 1 2)")),
            ("(a (b (c)) d)", Ok("(a (b (c)) d)")),
            ("()", Ok("()")),
            ("(())", Ok("(())")),
            ("1 2 3", Ok("1\n2\n3")),
            ("(define x 1) x", Ok("(define x 1)\nx")),
            ("'x", Ok("(quote x)")),
            ("''x", Ok("(quote (quote x))")),
            ("'(1 2)", Ok("(quote (1 2))")),
            ("(f 'a 'b)", Ok("(f (quote a) (quote b))")),
            ("\"str\" 2.5 #t", Ok("\"str\"\n2.500000\n#t")),
            ("", Ok("")),
            ("(", Err(ParseErrorKind::Incomplete)),
            ("((a)", Err(ParseErrorKind::Incomplete)),
            (")", Err(ParseErrorKind::UnexpectedClose)),
            ("(a))", Err(ParseErrorKind::UnexpectedClose)),
            ("'", Err(ParseErrorKind::Incomplete)),
            ("(a ')", Err(ParseErrorKind::Incomplete)),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            match (parse_and_print(input), expected) {
                (Ok(actual), Ok(expected)) => {
                    assert_eq!(actual, expected, "{test_id}: printed form mismatch");

                    // Round trip: print -> parse -> print is stable
                    let reprinted = parse_and_print(&actual).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{actual}': {e:?}")
                    });
                    assert_eq!(actual, reprinted, "{test_id}: round-trip mismatch");
                }
                (Err(Error::ParseError(err)), Err(kind)) => {
                    assert_eq!(err.kind, kind, "{test_id}: kind mismatch ({err})");
                }
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}");
                }
            }
        }
    }

    #[test]
    fn test_parse_depth_limit() {
        let mut arena = Arena::new();
        let nested = format!("{}{}", "(".repeat(5), ")".repeat(5));
        let tokens = tokenize(&nested).unwrap();

        parse_program(&tokens, &mut arena, 5).unwrap();
        let Err(Error::ParseError(err)) = parse_program(&tokens, &mut arena, 4) else {
            panic!("expected nesting error");
        };
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
    }
}
