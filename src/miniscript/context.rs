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

//! # Script Context Limits
//!
//! The consensus/standardness resource limits a compiled miniscript's
//! locking script must respect, which differ by the envelope it is
//! embedded in. These mirror Bitcoin Core's own constants, not anything
//! specific to miniscript.

/// Maximum size of a P2SH redeem script (`MAX_SCRIPT_ELEMENT_SIZE`).
pub const MAX_P2SH_SCRIPT_SIZE: usize = 520;

/// Maximum size of a P2WSH witness script (`MAX_STANDARD_P2WSH_SCRIPT_SIZE`).
pub const MAX_P2WSH_SCRIPT_SIZE: usize = 3600;

/// Maximum number of non-push opcodes in a script (`MAX_OPS_PER_SCRIPT`).
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of keys a legacy `multi`/`sortedmulti` may reference,
/// imposed by `OP_CHECKMULTISIG`'s stack-item limit.
pub const MAX_MULTISIG_PUBKEYS: usize = 20;
