// Miniscript
// Written in 2018 by
//     Andrew Poelstra <apoelstra@wpsoftware.net>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # Function-call-like Expression Language
//!
//! A generic parser for `name(arg1,arg2(sub,args),arg3)` shaped strings, used
//! by both the miniscript fragment parser and the descriptor envelope
//! parser. This does not know about miniscript or descriptor semantics: it
//! just turns a string into a tree of `(name, args)` nodes.

use std::str::FromStr;

use crate::error::Error;

/// A node in a parsed expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree<'a> {
    /// The name `n` of `n(...)`, or the entire string if there are no parens.
    pub name: &'a str,
    /// The comma-separated contents of the parens, if any.
    pub args: Vec<Tree<'a>>,
}

impl<'a> Tree<'a> {
    /// Parses a tree from a string, requiring the whole string to be
    /// consumed (no dangling characters after the closing paren).
    pub fn from_slice(sl: &'a str) -> Result<(Tree<'a>, &'a str), Error> {
        let mut node_name_end = sl
            .find(|ch: char| ch == '(' || ch == ',' || ch == ')')
            .unwrap_or(sl.len());
        // exclude checksum suffix characters from name matching accidentally
        for (pos, ch) in sl[..node_name_end].char_indices() {
            if !ch.is_ascii() {
                return Err(Error::Unprintable(ch as u32));
            }
            let _ = pos;
        }

        if node_name_end == sl.len() {
            return Ok((
                Tree {
                    name: sl,
                    args: vec![],
                },
                "",
            ));
        }

        if sl.as_bytes()[node_name_end] == b'(' {
            let mut args = vec![];
            let mut remaining = &sl[node_name_end + 1..];
            loop {
                let (arg, new_remaining) = Tree::from_slice(remaining)?;
                args.push(arg);

                if new_remaining.is_empty() {
                    return Err(Error::ParseFailure(sl.to_string()));
                }
                match new_remaining.as_bytes()[0] {
                    b',' => {
                        remaining = &new_remaining[1..];
                    }
                    b')' => {
                        remaining = &new_remaining[1..];
                        break;
                    }
                    _ => return Err(Error::ParseFailure(sl.to_string())),
                }
            }
            Ok((
                Tree {
                    name: &sl[..node_name_end],
                    args,
                },
                remaining,
            ))
        } else {
            Ok((
                Tree {
                    name: &sl[..node_name_end],
                    args: vec![],
                },
                &sl[node_name_end..],
            ))
        }
    }

    /// Parses a tree requiring the whole string to be consumed.
    pub fn from_str_exact(s: &'a str) -> Result<Tree<'a>, Error> {
        let (top, rem) = Tree::from_slice(s)?;
        if !rem.is_empty() {
            return Err(Error::ParseFailure(s.to_string()));
        }
        Ok(top)
    }
}

impl<'a> FromStr for Tree<'a> {
    type Err = Error;
    fn from_str(_s: &str) -> Result<Self, Self::Err> {
        // Lifetime of `&str` input can't outlive an owned `FromStr::from_str`
        // call, so callers must use `Tree::from_str_exact` directly. This
        // impl exists only so generic code that wants `T: FromStr` compiles;
        // it always fails.
        Err(Error::ParseFailure(
            "use Tree::from_str_exact, not FromStr::from_str".to_string(),
        ))
    }
}

/// Parses a terminal (leaf) node's single argument using a closure, failing
/// if the node has args of its own (i.e. is not a bare string token).
pub fn terminal<T, F, E>(tree: &Tree, convert: F) -> Result<T, Error>
where
    F: FnOnce(&str) -> Result<T, E>,
    E: ToString,
{
    if tree.args.is_empty() {
        convert(tree.name).map_err(|e| Error::ParseFailure(e.to_string()))
    } else {
        Err(Error::ParseFailure(format!(
            "{}(...) found where terminal expected",
            tree.name
        )))
    }
}

/// Splits a comma-joined argument list string into top-level pieces,
/// respecting nested parens. Used by envelope bodies captured loosely as
/// `.*?` that still need structural splitting (e.g. `multi(2,A,B)`).
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = vec![];
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}
