//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams. The same token stream feeds
//! both the object parser and the content-stream interpreter: any bare
//! keyword that is not part of object syntax (`BT`, `Tj`, `re`, ...) comes
//! out as [`Token::Operator`].
//!
//! # PDF Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -.5)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /Fields)
//! - Keywords: true, false, null, obj, endobj, stream, endstream, R
//! - Delimiters: `[`, `]`, `<<`, `>>`
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are
//! skipped between tokens.

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real (floating-point) number (e.g., 3.14, -.5)
    Real(f64),
    /// Literal string bytes (content of "(Hello)"); escapes are NOT decoded here
    LiteralString(&'a [u8]),
    /// Hexadecimal string bytes (content of "<48656C6C6F>")
    HexString(&'a [u8]),
    /// Name (e.g., "Type" from "/Type"); #XX escapes ARE decoded here
    Name(String),
    /// Boolean true keyword
    True,
    /// Boolean false keyword
    False,
    /// Null keyword
    Null,
    /// Array start delimiter [
    ArrayStart,
    /// Array end delimiter ]
    ArrayEnd,
    /// Dictionary start delimiter <<
    DictStart,
    /// Dictionary end delimiter >>
    DictEnd,
    /// Indirect object start keyword "obj"
    ObjStart,
    /// Indirect object end keyword "endobj"
    ObjEnd,
    /// Stream start keyword "stream"
    StreamStart,
    /// Stream end keyword "endstream"
    StreamEnd,
    /// Reference keyword "R" (used in "10 0 R")
    R,
    /// Any other bare keyword; content-stream operators surface here
    Operator(&'a [u8]),
}

/// Parse PDF whitespace (space, tab, CR, LF, null, form feed).
///
/// Requires at least one whitespace character.
fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) =
        take_while(|c| matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C))(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }
    Ok((remaining, ()))
}

/// Parse a comment (% to end of line).
fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments before the next token.
fn skip_ws(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let mut remaining = input;
    loop {
        let before = remaining;
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        if remaining == before {
            break;
        }
    }
    Ok((remaining, input))
}

/// Parse an integer or real number.
///
/// PDF allows leading +/- signs and numbers starting or ending with a
/// decimal point (.5, 5.).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    if frac_part.is_some() {
        let mut num_str = String::new();
        if sign == Some('-') {
            num_str.push('-');
        }
        match int_part {
            Some(int) => num_str.push_str(std::str::from_utf8(int).map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
            })?),
            None => num_str.push('0'),
        }
        num_str.push('.');
        if let Some(Some(frac)) = frac_part {
            num_str.push_str(std::str::from_utf8(frac).map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
            })?);
        } else {
            num_str.push('0');
        }
        let num: f64 = num_str.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        Ok((input, Token::Real(num)))
    } else {
        let int_bytes = int_part.ok_or_else(|| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        let int_str = std::str::from_utf8(int_bytes).map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        let mut num: i64 = int_str.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        if sign == Some('-') {
            num = -num;
        }
        Ok((input, Token::Integer(num)))
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Handles balanced nested parentheses and escape sequences; the raw bytes
/// including escapes are returned, decoding happens at the parser level.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (mut remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => {
                pos += 1;
                if pos < remaining.len() {
                    if remaining[pos].is_ascii_digit() {
                        // Octal escape is 1-3 digits
                        pos += 1;
                        if pos < remaining.len() && remaining[pos].is_ascii_digit() {
                            pos += 1;
                        }
                        if pos < remaining.len() && remaining[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    } else {
                        pos += 1;
                    }
                }
            },
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => {
                pos += 1;
            },
        }
    }

    if depth != 0 {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    let content = &remaining[..pos - 1];
    remaining = &remaining[pos..];
    Ok((remaining, Token::LiteralString(content)))
}

/// Parse a hexadecimal string enclosed in angle brackets.
///
/// Whitespace inside the brackets is preserved here and stripped during
/// decoding; an odd digit count is padded with 0 at that stage.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    // << is a dictionary, not a hex string
    if input.len() >= 2 && input[0] == b'<' && input[1] == b'<' {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || c.is_ascii_whitespace()),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode #XX escape sequences in PDF names.
///
/// Name objects can contain any byte encoded as #XX where XX is a two-digit
/// hexadecimal code; /A#20B becomes "A B". Invalid sequences are preserved
/// literally.
pub fn decode_name_escapes(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '#' {
            let hex1 = chars.next();
            let hex2 = chars.next();
            if let (Some(h1), Some(h2)) = (hex1, hex2) {
                let hex_str = format!("{}{}", h1, h2);
                if let Ok(byte) = u8::from_str_radix(&hex_str, 16) {
                    result.push(byte as char);
                    continue;
                }
                result.push('#');
                result.push(h1);
                result.push(h2);
            } else if let Some(h1) = hex1 {
                result.push('#');
                result.push(h1);
            } else {
                result.push('#');
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Parse a name starting with /.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular_char), |bytes| {
            let name_str = std::str::from_utf8(bytes).unwrap_or("");
            Token::Name(decode_name_escapes(name_str))
        }),
    )(input)
}

/// Regular characters: anything that is not whitespace or a delimiter.
fn is_regular_char(c: u8) -> bool {
    !matches!(
        c,
        b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C |
        b'/' | b'%' |
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
    )
}

/// Parse a bare keyword: a maximal run of regular characters.
///
/// Known object-syntax keywords map to dedicated tokens; everything else
/// (content-stream operators like `BT`, `Tj`, `re`) becomes
/// [`Token::Operator`]. Maximal munch means `RG` is one operator token, not
/// an `R` reference marker followed by junk.
fn parse_bare_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, word) = take_while(is_regular_char)(input)?;
    if word.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    let tok = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        _ => Token::Operator(word),
    };
    Ok((remaining, tok))
}

/// Parse the bracket delimiters.
fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, nom::bytes::complete::tag(b"<<")),
        value(Token::DictEnd, nom::bytes::complete::tag(b">>")),
        value(Token::ArrayStart, nom::bytes::complete::tag(b"[")),
        value(Token::ArrayEnd, nom::bytes::complete::tag(b"]")),
    ))(input)
}

/// Parse a single PDF token, skipping any leading whitespace and comments.
///
/// The order of alternatives matters: delimiters before hex strings (`<<`
/// vs `<`), numbers before bare keywords (so `-5` is not an operator).
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_delimiter,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
        parse_bare_keyword,
    ))(input)
}

/// Parse all tokens from input until it is exhausted or an error occurs.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"0"), Ok((&b""[..], Token::Integer(0))));
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_parse_reals() {
        assert_eq!(token(b"3.14"), Ok((&b""[..], Token::Real(3.14))));
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
    }

    #[test]
    fn test_parse_name_simple() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".to_string()))));
    }

    #[test]
    fn test_parse_name_with_escape() {
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
    }

    #[test]
    fn test_parse_literal_string_nested() {
        let result = token(b"(Hello (World))");
        assert_eq!(result, Ok((&b""[..], Token::LiteralString(&b"Hello (World)"[..]))));
    }

    #[test]
    fn test_parse_literal_string_escaped_paren() {
        let result = token(b"(a\\)b)");
        assert_eq!(result, Ok((&b""[..], Token::LiteralString(&b"a\\)b"[..]))));
    }

    #[test]
    fn test_parse_hex_string() {
        let result = token(b"<48656C6C6F>");
        assert_eq!(result, Ok((&b""[..], Token::HexString(&b"48656C6C6F"[..]))));
    }

    #[test]
    fn test_dict_start_not_hex() {
        assert_eq!(token(b"<< /A 1 >>").unwrap().1, Token::DictStart);
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(token(b"true").unwrap().1, Token::True);
        assert_eq!(token(b"false").unwrap().1, Token::False);
        assert_eq!(token(b"null").unwrap().1, Token::Null);
        assert_eq!(token(b"obj").unwrap().1, Token::ObjStart);
        assert_eq!(token(b"endobj").unwrap().1, Token::ObjEnd);
        assert_eq!(token(b"R").unwrap().1, Token::R);
    }

    #[test]
    fn test_operator_maximal_munch() {
        // RG must be a single operator, not R followed by garbage
        assert_eq!(token(b"RG").unwrap().1, Token::Operator(&b"RG"[..]));
        assert_eq!(token(b"BT").unwrap().1, Token::Operator(&b"BT"[..]));
        assert_eq!(token(b"Tj").unwrap().1, Token::Operator(&b"Tj"[..]));
    }

    #[test]
    fn test_skip_whitespace_and_comments() {
        let result = token(b"  % a comment\n  42");
        assert_eq!(result, Ok((&b""[..], Token::Integer(42))));
    }

    #[test]
    fn test_tokens_sequence() {
        let (_, toks) = tokens(b"<< /Fields [ 1 0 R ] >>").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::DictStart,
                Token::Name("Fields".to_string()),
                Token::ArrayStart,
                Token::Integer(1),
                Token::Integer(0),
                Token::R,
                Token::ArrayEnd,
                Token::DictEnd,
            ]
        );
    }

    #[test]
    fn test_decode_name_escapes() {
        assert_eq!(decode_name_escapes("A#20B#23C"), "A B#C");
        assert_eq!(decode_name_escapes("Type"), "Type");
        assert_eq!(decode_name_escapes("A#"), "A#");
    }
}
