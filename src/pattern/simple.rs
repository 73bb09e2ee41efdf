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

//! Expansion of "simple searches" into full patterns.
//!
//! A query which contains no unescaped `~`, `=` or `%` is not a pattern.
//! A handful of keywords stand for common patterns; anything else is quoted
//! and substituted into the configured template, so that with the default
//! template `foo` searches for `~f "foo" | ~s "foo"`.

/// Keywords which stand for a whole pattern, compared case-insensitively.
static KEYWORDS: &[(&str, &str)] = &[
    ("all", "~A"),
    ("del", "~D"),
    ("flag", "~F"),
    ("new", "~N"),
    ("old", "~O"),
    ("repl", "~Q"),
    ("read", "~R"),
    ("tag", "~T"),
    ("unread", "~U"),
];

/// Whether `query` is a simple search rather than a pattern.
pub fn is_simple(query: &str) -> bool {
    let mut chars = query.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '~' | '=' | '%' => return false,
            _ => (),
        }
    }

    true
}

/// Expand `query` into a full pattern if it is a simple search, using
/// `template` for anything that is not a keyword. Patterns are returned
/// unchanged.
pub fn expand_simple(query: &str, template: &str) -> String {
    if !is_simple(query) {
        return query.to_owned();
    }

    if "^" == query || "." == query {
        return "~A".to_owned();
    }

    if let Some(&(_, pattern)) = KEYWORDS
        .iter()
        .find(|&&(keyword, _)| keyword.eq_ignore_ascii_case(query))
    {
        return pattern.to_owned();
    }

    expand_template(template, &quote(query))
}

/// Wrap `s` in double quotes, escaping as needed.
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for ch in s.chars() {
        if '\\' == ch || '"' == ch {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Replace each `%s` in `template` with `arg` and each `%%` with `%`. If
/// there is no `%s`, `arg` is appended after a space.
fn expand_template(template: &str, arg: &str) -> String {
    let mut out = String::with_capacity(template.len() + arg.len());
    let mut substituted = false;
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if '%' != ch {
            out.push(ch);
            continue;
        }

        match chars.peek() {
            Some('s') => {
                chars.next();
                out.push_str(arg);
                substituted = true;
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }

    if !substituted {
        out.push(' ');
        out.push_str(arg);
    }

    out
}
