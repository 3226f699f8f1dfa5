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

//! # Range Isolator
//!
//! Strips a descriptor's checksum (verifying it if required), then
//! replaces every `*` wildcard in lockstep with a supplied integer index.
//! Multiple wildcards in the same descriptor (e.g. `multi(2,A/*,B/*)`)
//! share the same index rather than being treated as a cartesian product.

use crate::checksum;
use crate::error::Error;

/// Strips the checksum (verifying it if present, or failing if
/// `checksum_required` and it is absent) and substitutes every `*` with
/// `index`.
///
/// `index` is only consulted if the descriptor actually contains a `*`; a
/// non-range descriptor ignores it entirely.
pub fn isolate(expr: &str, index: Option<i64>, checksum_required: bool) -> Result<String, Error> {
    let bare = checksum::verify(expr, checksum_required)?;

    let wildcard_count = bare.matches('*').count();
    if wildcard_count == 0 {
        return Ok(bare.to_string());
    }

    let idx = match index {
        Some(i) if i >= 0 => i,
        Some(i) => return Err(Error::InvalidIndex(i.to_string())),
        None => return Err(Error::InvalidIndex("missing".to_string())),
    };

    Ok(bare.replace('*', &idx.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_every_wildcard_in_lockstep() {
        let desc = "wsh(multi(2,xpubA/*,xpubB/*))";
        let out = isolate(desc, Some(7), false).unwrap();
        assert_eq!(out, "wsh(multi(2,xpubA/7,xpubB/7))");
    }

    #[test]
    fn no_wildcard_ignores_index() {
        let desc = "pk(xpubA)";
        let out = isolate(desc, None, false).unwrap();
        assert_eq!(out, "pk(xpubA)");
    }

    #[test]
    fn missing_index_on_range_descriptor_fails() {
        let desc = "pk(xpubA/*)";
        assert!(isolate(desc, None, false).is_err());
    }

    #[test]
    fn negative_index_fails() {
        let desc = "pk(xpubA/*)";
        assert!(isolate(desc, Some(-1), false).is_err());
    }

    #[test]
    fn checksum_required_but_missing_fails() {
        let desc = "pk(xpubA)";
        assert!(isolate(desc, None, true).is_err());
    }

    #[test]
    fn valid_checksum_is_stripped() {
        let bare = "pk(020000000000000000000000000000000000000000000000000000000000000002)";
        let sum = checksum::checksum(bare).unwrap();
        let full = format!("{}#{}", bare, sum);
        assert_eq!(isolate(&full, None, true).unwrap(), bare);
    }
}
