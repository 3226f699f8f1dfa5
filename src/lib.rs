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

//! # Output Descriptors
//!
//! A parser and realizer for Bitcoin output descriptors, the `addr(...)`/
//! `pk(...)`/`pkh(...)`/`wpkh(...)`/`sh(...)`/`wsh(...)` expression language
//! that names a scriptPubKey (and, for the script-embedding variants, a
//! Miniscript policy fragment) without ambiguity.
//!
//! The pipeline a descriptor goes through, module by module:
//!
//! - [`checksum`] verifies or computes the trailing `#checksum`.
//! - [`range`] isolates a single child descriptor out of a `*`-wildcard range.
//! - [`expression`] parses the `name(arg,arg,...)` shape shared by every
//!   envelope and every miniscript fragment.
//! - [`grammar`] recognizes the lexical shape of key expressions and
//!   descriptor bodies before anything is built from them.
//! - [`key`] resolves a key expression (raw pubkey, WIF, xpub/xprv with an
//!   optional origin and derivation path) to serialized public key bytes.
//! - [`miniscript`] parses, type-checks, and assembles a Miniscript fragment
//!   against opaque key placeholders.
//! - [`solver`] fills those placeholders in with real keys resolved via
//!   [`key`].
//! - [`asm`] assembles the resulting ASM text into a real [`bitcoin::Script`].
//! - [`descriptor`] ties all of the above together into the public API.

pub mod asm;
pub mod checksum;
pub mod descriptor;
pub mod error;
pub mod expression;
pub mod grammar;
pub mod key;
pub mod miniscript;
pub mod range;
pub mod solver;

pub use crate::descriptor::{Descriptor, DescriptorOptions, Kind, Payment};
pub use crate::error::Error;
