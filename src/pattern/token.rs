//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mailpat.
//
// Mailpat is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailpat is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailpat. If not, see <http://www.gnu.org/licenses/>.

//! Extraction of pattern arguments.
//!
//! An argument runs until unquoted whitespace or one of the characters
//! which can start the next term. Single and double quotes group text;
//! backslash escapes work everywhere except inside single quotes.

use crate::support::error::Error;

/// Characters which end an unquoted argument.
const TERMINATORS: &[char] = &['#', ';', '~', '%', '=', '!', '|'];

/// Extract one argument from the start of `input`.
///
/// Returns the unquoted, unescaped argument and the remaining input with
/// leading whitespace removed.
pub fn extract_token(input: &str) -> Result<(String, &str), Error> {
    let premature = || Error::Syntax(format!("Error in expression: {}", input));

    let mut dest = String::new();
    let mut quote = None::<char>;
    let mut rest = input;

    while let Some(ch) = rest.chars().next() {
        if quote.is_none() && (ch.is_whitespace() || TERMINATORS.contains(&ch))
        {
            break;
        }

        rest = &rest[ch.len_utf8()..];

        if Some(ch) == quote {
            quote = None;
        } else if quote.is_none() && ('\'' == ch || '"' == ch) {
            quote = Some(ch);
        } else if '\\' == ch && quote != Some('\'') {
            let esc = rest.chars().next().ok_or_else(premature)?;
            rest = &rest[esc.len_utf8()..];
            match esc {
                'c' | 'C' => {
                    let c = rest.chars().next().ok_or_else(premature)?;
                    rest = &rest[c.len_utf8()..];
                    dest.push(control_char(c));
                }
                'r' => dest.push('\r'),
                'n' => dest.push('\n'),
                't' => dest.push('\t'),
                'f' => dest.push('\x0c'),
                'e' => dest.push('\x1b'),
                _ => match octal_escape(esc, rest) {
                    Some(c) => {
                        dest.push(c);
                        rest = &rest[2..];
                    }
                    None => dest.push(esc),
                },
            }
        } else {
            dest.push(ch);
        }
    }

    Ok((dest, rest.trim_start()))
}

/// `\cX`: the control character corresponding to `X`.
fn control_char(c: char) -> char {
    let code = (c.to_ascii_uppercase() as u32).wrapping_sub('@' as u32) & 0x7f;
    char::from_u32(code).unwrap_or('\0')
}

/// `\NNN`: a three-digit octal escape, whose first digit is `first` and
/// remaining two digits start `rest`.
fn octal_escape(first: char, rest: &str) -> Option<char> {
    let mut digits = rest.chars();
    let d0 = first.to_digit(8)?;
    let d1 = digits.next()?.to_digit(8)?;
    let d2 = digits.next()?.to_digit(8)?;
    char::from_u32((d0 << 6) | (d1 << 3) | d2)
}

#[cfg(test)]
mod test {
    use super::*;

    fn tok(s: &str) -> (String, &str) {
        extract_token(s).unwrap()
    }

    #[test]
    fn plain_tokens() {
        assert_eq!(("foo".to_owned(), "bar"), tok("foo bar"));
        assert_eq!(("foo".to_owned(), ""), tok("foo"));
        assert_eq!(("foo(bar)".to_owned(), ""), tok("foo(bar)"));
        assert_eq!(("foo".to_owned(), "~s bar"), tok("foo~s bar"));
        assert_eq!(("foo".to_owned(), "| ~s bar"), tok("foo   | ~s bar"));
        assert_eq!(("a".to_owned(), "# comment"), tok("a# comment"));
        assert_eq!(("a".to_owned(), "!b"), tok("a!b"));
    }

    #[test]
    fn quoting() {
        assert_eq!(("foo bar".to_owned(), "x"), tok("\"foo bar\" x"));
        assert_eq!(("foo~bar".to_owned(), ""), tok("'foo~bar'"));
        assert_eq!(("it's".to_owned(), ""), tok("\"it's\""));
        assert_eq!(("a\\nb".to_owned(), ""), tok("'a\\nb'"));
        assert_eq!(("xy z".to_owned(), ""), tok("x\"y z\""));
        // An unterminated quote runs to the end of input
        assert_eq!(("foo bar".to_owned(), ""), tok("\"foo bar"));
    }

    #[test]
    fn escapes() {
        assert_eq!(("a b".to_owned(), ""), tok("a\\ b"));
        assert_eq!(("a\nb\tc".to_owned(), ""), tok("a\\nb\\tc"));
        assert_eq!(("\x1b\r\x0c".to_owned(), ""), tok("\\e\\r\\f"));
        assert_eq!(("\x01".to_owned(), ""), tok("\\ca"));
        assert_eq!(("A".to_owned(), ""), tok("\\101"));
        assert_eq!(("9x".to_owned(), ""), tok("\\9x"));
        assert_eq!(("\"".to_owned(), ""), tok("\"\\\"\""));
        assert_eq!(("foo.bar".to_owned(), ""), tok("foo\\.bar"));
        assert_eq!(("foo\\.bar".to_owned(), ""), tok("foo\\\\.bar"));
    }

    #[test]
    fn premature_end() {
        assert_matches!(Err(Error::Syntax(..)), extract_token("foo\\"));
        assert_matches!(Err(Error::Syntax(..)), extract_token("\\c"));
    }
}
