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

//! # Errors
//!
//! A single error enum covering grammar/checksum/key/miniscript/descriptor
//! failures. Construction is fail-fast: a [`crate::Descriptor`] that exists
//! is guaranteed valid, so none of these variants are ever recovered from
//! internally.

use thiserror::Error as ThisError;

/// Every failure mode surfaced by this crate.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A character outside the printable ASCII range appeared in a
    /// descriptor or miniscript fragment.
    #[error("unprintable character 0x{0:02x} in expression")]
    Unprintable(u32),

    /// The grammar did not anchor-match any known envelope, or the
    /// exact-reconstruction check after a loose `.*?` capture failed.
    #[error("failed to parse expression: {0}")]
    ParseFailure(String),

    /// A descriptor required a trailing `#checksum` that was not present.
    #[error("expected descriptor checksum")]
    MissingChecksum,

    /// The trailing `#checksum` did not match the computed value.
    #[error("invalid descriptor checksum for `{expr}`: expected `{expected}`")]
    InvalidChecksum {
        /// The descriptor string the checksum was computed over.
        expr: String,
        /// The checksum that should have been present.
        expected: String,
    },

    /// `index` passed to [`crate::Descriptor::new`] was missing, negative,
    /// or otherwise not a valid child number for a range descriptor.
    #[error("invalid range index: {0}")]
    InvalidIndex(String),

    /// A key expression did not match `reKeyExp` at all.
    #[error("bad key expression: {0}")]
    BadKeyExpression(String),

    /// A raw public key failed `ecc.isPoint`, had the wrong length, or was
    /// uncompressed in a SegWit-only context.
    #[error("invalid public key: {0}")]
    InvalidPubKey(String),

    /// A WIF-encoded private key failed to decode.
    #[error("invalid WIF: {0}")]
    InvalidWif(String),

    /// An xpub/xprv failed to decode, or derivation along its path failed.
    #[error("invalid extended key: {0}")]
    InvalidExtendedKey(String),

    /// A derivation path element was `>= 2^31`.
    #[error("derivation path element overflowed: {0}")]
    PathElementOverflow(u64),

    /// Two distinct key expressions inside the same miniscript resolved to
    /// the same public key.
    #[error("duplicate public key in miniscript")]
    DuplicateKey,

    /// The miniscript compiler rejected the fragment as not type-sound.
    #[error("miniscript failed sanity/type check: {0}")]
    UnsaneMiniscript(String),

    /// The satisfier produced no non-malleable satisfying witness.
    #[error("miniscript is not satisfiable under the given assumptions")]
    Unsatisfiable,

    /// A compiled script exceeded a consensus/standardness size limit.
    #[error("{kind} script too large: {size} bytes (limit {limit})")]
    ScriptTooLarge {
        /// Which script (`"P2SH"`, `"P2WSH"`) was oversized.
        kind: &'static str,
        /// Its actual size in bytes.
        size: usize,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// A compiled script had more than 201 non-push opcodes.
    #[error("too many non-push opcodes: {count} (limit {limit})")]
    TooManyOps {
        /// The opcode count found.
        count: usize,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// A `sh(ms)` descriptor's inner fragment did not start with an
    /// allow-listed head and `allow_miniscript_in_p2sh` was false.
    #[error("miniscript not allowed directly inside sh() without allow_miniscript_in_p2sh")]
    MiniscriptDisallowedInP2sh,

    /// `addr(...)` failed to decode under the requested network.
    #[error("invalid address `{0}` for the requested network")]
    InvalidAddress(String),

    /// `getAddress` was called on a descriptor kind with no address
    /// (`pk(...)`, or bare miniscript).
    #[error("this descriptor kind has no address")]
    NoAddress,
}
