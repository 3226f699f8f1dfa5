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

//! # Grammar / Regex Suite
//!
//! Named patterns for key expressions and descriptor envelopes, compiled
//! once per process via `once_cell::sync::Lazy`. `regex` guarantees linear
//! time matching (no backtracking engine), satisfying the "avoid
//! catastrophic backtracking" requirement without any extra care at the
//! pattern-authoring level.
//!
//! The envelope patterns are deliberately loose around miniscript and
//! `pk`/`addr` bodies (`.*?`-shaped); callers must additionally check that
//! the matched body reconstructs the original string exactly (see
//! [`crate::descriptor`]), since the grammar is only a first filter and
//! semantic validation happens downstream.

use once_cell::sync::Lazy;
use regex::Regex;

macro_rules! lazy_re {
    ($name:ident, $pat:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| {
            log::trace!("compiling grammar pattern {}", stringify!($name));
            Regex::new($pat).expect("static regex")
        });
    };
}

/// a `/N` or `/Nh` derivation path component
const PATH_COMPONENT: &str = r"(?:/[0-9]+(?:[hH'])?)";
const LEVEL: &str = r"[0-9]+(?:[hH'])?";

lazy_re!(RE_LEVEL, &{
    let p = format!("^{}$", LEVEL);
    p
});

lazy_re!(ORIGIN, &format!(r"^\[[0-9a-fA-F]{{8}}(?:{})*\]$", PATH_COMPONENT));

lazy_re!(COMPRESSED_PUBKEY, r"^(?:02|03)[0-9a-fA-F]{64}$");
lazy_re!(UNCOMPRESSED_PUBKEY, r"^04[0-9a-fA-F]{128}$");

lazy_re!(WIF, r"^[5KLc9][1-9A-HJ-NP-Za-km-z]{50,51}$");

lazy_re!(XPUB, r"^[xXtT]pub[1-9A-HJ-NP-Za-km-z]{79,108}$");
lazy_re!(XPRV, r"^[xXtT]prv[1-9A-HJ-NP-Za-km-z]{79,108}$");

// a path suffix that may end in a wildcard level: zero or more plain
// components followed by either a (possibly hardened) `*` or a plain level
lazy_re!(
    RANGE_PATH,
    &format!(
        r"^(?:{})*(?:/\*(?:[hH'])?|/{})$",
        PATH_COMPONENT, LEVEL
    )
);

/// Returns true if `s` is a bare decimal derivation level, optionally
/// hardened (`"44"`, `"44h"`, `"44'"`).
pub fn is_level(s: &str) -> bool {
    RE_LEVEL.is_match(s)
}

/// Returns true if `s` looks like a `[fingerprint/path]` origin.
pub fn is_origin(s: &str) -> bool {
    ORIGIN.is_match(s)
}

/// Returns true if `s` is a compressed (33-byte) hex public key.
pub fn is_compressed_pubkey(s: &str) -> bool {
    COMPRESSED_PUBKEY.is_match(s)
}

/// Returns true if `s` is an uncompressed (65-byte) hex public key.
pub fn is_uncompressed_pubkey(s: &str) -> bool {
    UNCOMPRESSED_PUBKEY.is_match(s)
}

/// Returns true if `s` looks like a WIF-encoded private key.
pub fn is_wif(s: &str) -> bool {
    WIF.is_match(s)
}

/// Returns true if `s` looks like a base58 extended public key.
pub fn is_xpub(s: &str) -> bool {
    XPUB.is_match(s)
}

/// Returns true if `s` looks like a base58 extended private key.
pub fn is_xprv(s: &str) -> bool {
    XPRV.is_match(s)
}

/// Returns true if `s` is a derivation path suffix (the part after the key
/// material) that may end in a wildcard level. An empty suffix is valid
/// (no path at all).
pub fn is_range_path(s: &str) -> bool {
    s.is_empty() || RANGE_PATH.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_pubkeys() {
        let compressed = "020000000000000000000000000000000000000000000000000000000000000002";
        assert!(is_compressed_pubkey(compressed));
        assert!(!is_uncompressed_pubkey(compressed));
    }

    #[test]
    fn recognizes_origin() {
        assert!(is_origin("[d34db33f/49h/0h/0h]"));
        assert!(is_origin("[d34db33f]"));
        assert!(!is_origin("[d34db33f/]"));
        assert!(!is_origin("d34db33f"));
    }

    #[test]
    fn recognizes_range_path() {
        assert!(is_range_path(""));
        assert!(is_range_path("/0/*"));
        assert!(is_range_path("/0/*h"));
        assert!(is_range_path("/44h/0h/0h"));
        assert!(!is_range_path("/*/0"));
    }

    #[test]
    fn recognizes_xpub_xprv() {
        let xpub = "xpub661MyMwAqRbcFLqTBCNzuoj4FYE1xRxmCjrSWC6LUjKHo46Du4NacKgxdrJPWhzLjkPsXqnjAUwn1raMSWfxWZKysPoBNQMZMs8b5JM8egC";
        assert!(is_xpub(xpub));
        assert!(!is_xprv(xpub));
    }

    #[test]
    fn recognizes_wif() {
        assert!(is_wif("5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ"));
    }
}
