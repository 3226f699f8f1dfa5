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

//! # Descriptor Realizer
//!
//! Top-level entry point. Parses an output descriptor's envelope
//! (`addr`/`pk`/`pkh`/`wpkh`/`sh(wpkh)`/`sh(ms)`/`wsh(ms)`/`sh(wsh(ms))`),
//! dispatches each to the right combination of [`crate::key`] and
//! [`crate::solver`], enforces the consensus/standardness resource limits on
//! whatever comes out, and exposes the resulting locking script and address.

use std::fmt;

use bitcoin::hashes::{hash160, sha256, Hash};
use bitcoin::{Address, Network, Script};

use crate::asm;
use crate::checksum;
use crate::error::Error;
use crate::expression::Tree;
use crate::key;
use crate::miniscript::context::{MAX_OPS_PER_SCRIPT, MAX_P2SH_SCRIPT_SIZE, MAX_P2WSH_SCRIPT_SIZE};
use crate::range;
use crate::solver;

/// Which descriptor envelope matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Addr,
    Pk,
    Pkh,
    Wpkh,
    ShWpkh,
    ShMs,
    WshMs,
    ShWshMs,
}

/// The concrete output this descriptor pays to.
#[derive(Debug, Clone)]
pub struct Payment {
    /// The final scriptPubKey.
    pub script_pubkey: Script,
    /// The P2SH redeem script, present for every `sh(...)` variant.
    pub redeem_script: Option<Script>,
    /// The P2WSH/P2WPKH witness script, present for `wpkh`/`sh(wpkh)` (the
    /// implied single-key witness program) and every `wsh(ms)` variant.
    pub witness_script: Option<Script>,
    /// A satisfying witness-stack template (`sig(<hex>)` / preimage
    /// placeholder tokens, one per stack item) when this kind embeds a
    /// miniscript fragment and the fragment was satisfiable.
    pub satisfaction: Option<String>,
    /// Upper bound, in witness-stack bytes, on the size of a satisfying
    /// witness — used for fee estimation ahead of a real signature. `None`
    /// for `addr(...)` (no satisfaction is modeled at all) or an
    /// unsatisfiable miniscript fragment.
    pub max_satisfaction_weight: Option<usize>,
}

/// A fully realized output descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    kind: Kind,
    network: Network,
    payment: Payment,
}

/// Inputs to [`Descriptor::new`], mirroring the external collaborators
/// spec.md describes as ambient configuration rather than inline arguments.
#[derive(Debug, Clone)]
pub struct DescriptorOptions {
    /// The descriptor expression, with or without a trailing `#checksum`.
    pub expression: String,
    /// The child index to substitute for `*` wildcards, if any are present.
    pub index: Option<i64>,
    /// Whether a trailing `#checksum` is mandatory.
    pub checksum_required: bool,
    /// Whether `sh(ms(...))` may embed a miniscript fragment whose head is
    /// not one of the allow-listed combinators (`and_*`/`or_*`/`andor`/
    /// `thresh`/`multi`/`multi_a`/`sortedmulti`/`sortedmulti_a`).
    pub allow_miniscript_in_p2sh: bool,
    /// The network addresses and extended keys are validated against.
    pub network: Network,
}

impl Default for DescriptorOptions {
    fn default() -> Self {
        DescriptorOptions {
            expression: String::new(),
            index: None,
            checksum_required: false,
            allow_miniscript_in_p2sh: false,
            network: Network::Bitcoin,
        }
    }
}

/// Worst-case DER-signature-plus-sighash-byte length, for the fee-estimation
/// upper bound carried on [`Payment::max_satisfaction_weight`].
const SIG_BYTES: usize = 73;
const PUBKEY_BYTES: usize = 33;

/// The heads `sh(ms)` may start with when `allow_miniscript_in_p2sh` is
/// false. `combo` matches this allow-list (so it isn't rejected here) but
/// has no `Terminal` variant of its own — `sh(combo(...))` still fails
/// downstream in the miniscript parser, since `combo` is a multi-script
/// descriptor convenience, not a realizable miniscript fragment.
const P2SH_ALLOWED_HEADS: &[&str] = &[
    "pk",
    "pkh",
    "wpkh",
    "combo",
    "multi",
    "sortedmulti",
    "multi_a",
    "sortedmulti_a",
];

fn strip_wrapper_prefix(name: &str) -> &str {
    match name.find(':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

fn reconstructs_exactly(tree: &Tree, original: &str) -> bool {
    // Envelope bodies are captured loosely; we additionally require
    // `name(arg0,arg1,...)` (or bare `name`) to exactly equal the slice
    // it was parsed from, catching anything the lenient grammar let through
    // that wasn't actually well-formed (mismatched parens, stray text).
    let rebuilt = if tree.args.is_empty() {
        tree.name.to_string()
    } else {
        format!(
            "{}({})",
            tree.name,
            tree.args
                .iter()
                .map(|a| reconstruct(a))
                .collect::<Vec<_>>()
                .join(",")
        )
    };
    rebuilt == original
}

fn reconstruct(tree: &Tree) -> String {
    if tree.args.is_empty() {
        tree.name.to_string()
    } else {
        format!(
            "{}({})",
            tree.name,
            tree.args.iter().map(reconstruct).collect::<Vec<_>>().join(",")
        )
    }
}

fn check_script_size(kind: &'static str, script: &Script, limit: usize) -> Result<(), Error> {
    let size = script.len();
    if size > limit {
        return Err(Error::ScriptTooLarge { kind, size, limit });
    }
    Ok(())
}

fn check_op_count(script: &Script) -> Result<(), Error> {
    let count = asm::count_non_push_opcodes(script)?;
    if count > MAX_OPS_PER_SCRIPT {
        return Err(Error::TooManyOps {
            count,
            limit: MAX_OPS_PER_SCRIPT,
        });
    }
    Ok(())
}

/// Builds these four standard envelope scripts with our own ASM assembler
/// rather than reaching for constructors whose exact name varies across
/// `bitcoin` crate versions, reusing the same [`asm::from_asm`] path the
/// miniscript solver's output goes through.
fn p2wpkh_script(pubkey_bytes: &[u8]) -> Script {
    let hash = hash160::Hash::hash(pubkey_bytes);
    asm::from_asm(&format!("OP_0 {}", hex(hash.as_ref()))).expect("well-formed ASM")
}

fn p2pkh_script(pubkey_bytes: &[u8]) -> Script {
    let hash = hash160::Hash::hash(pubkey_bytes);
    asm::from_asm(&format!(
        "OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG",
        hex(hash.as_ref())
    ))
    .expect("well-formed ASM")
}

fn p2sh_script(redeem: &Script) -> Script {
    let hash = hash160::Hash::hash(redeem.as_bytes());
    asm::from_asm(&format!("OP_HASH160 {} OP_EQUAL", hex(hash.as_ref()))).expect("well-formed ASM")
}

fn p2wsh_script(witness: &Script) -> Script {
    let hash = sha256::Hash::hash(witness.as_bytes());
    asm::from_asm(&format!("OP_0 {}", hex(hash.as_ref()))).expect("well-formed ASM")
}

impl Descriptor {
    /// Parses, resolves and realizes a descriptor expression.
    pub fn new(opts: &DescriptorOptions) -> Result<Descriptor, Error> {
        let bare = range::isolate(&opts.expression, opts.index, opts.checksum_required)?;
        let network = opts.network;
        log::trace!("isolated descriptor body: {}", bare);

        if let Some(body) = strip_envelope(&bare, "addr") {
            log::debug!("dispatching to addr(...)");
            return Self::build_addr(body, network);
        }
        if let Some(body) = strip_envelope(&bare, "pk") {
            log::debug!("dispatching to pk(...)");
            return Self::build_pk(body, network);
        }
        if let Some(body) = strip_envelope(&bare, "pkh") {
            log::debug!("dispatching to pkh(...)");
            return Self::build_pkh(body, network);
        }
        if let Some(inner) = strip_envelope(&bare, "sh") {
            if let Some(body) = strip_envelope(inner, "wpkh") {
                log::debug!("dispatching to sh(wpkh(...))");
                return Self::build_sh_wpkh(body, network);
            }
            if let Some(wsh_inner) = strip_envelope(inner, "wsh") {
                log::debug!("dispatching to sh(wsh(...))");
                return Self::build_sh_wsh_ms(wsh_inner, network);
            }
            log::debug!("dispatching to sh(...) miniscript");
            return Self::build_sh_ms(inner, network, opts.allow_miniscript_in_p2sh);
        }
        if let Some(body) = strip_envelope(&bare, "wpkh") {
            log::debug!("dispatching to wpkh(...)");
            return Self::build_wpkh(body, network);
        }
        if let Some(body) = strip_envelope(&bare, "wsh") {
            log::debug!("dispatching to wsh(...) miniscript");
            return Self::build_wsh_ms(body, network);
        }

        Err(Error::ParseFailure(bare))
    }

    fn build_addr(body: &str, network: Network) -> Result<Descriptor, Error> {
        let address: Address = body
            .parse()
            .map_err(|_| Error::InvalidAddress(body.to_string()))?;
        if address.network != network {
            return Err(Error::InvalidAddress(body.to_string()));
        }
        let script_pubkey = address.script_pubkey();
        Ok(Descriptor {
            kind: Kind::Addr,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: None,
                witness_script: None,
                satisfaction: None,
                max_satisfaction_weight: None,
            },
        })
    }

    fn build_pk(body: &str, network: Network) -> Result<Descriptor, Error> {
        let pk_bytes = key::resolve(body, network, false)?;
        let asm = format!("{} OP_CHECKSIG", hex(&pk_bytes));
        let script_pubkey = asm::from_asm(&asm)?;
        Ok(Descriptor {
            kind: Kind::Pk,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: None,
                witness_script: None,
                satisfaction: Some(format!("sig(<{}>)", hex(&pk_bytes))),
                max_satisfaction_weight: Some(SIG_BYTES),
            },
        })
    }

    fn build_pkh(body: &str, network: Network) -> Result<Descriptor, Error> {
        let pk_bytes = key::resolve(body, network, false)?;
        let script_pubkey = p2pkh_script(&pk_bytes);
        Ok(Descriptor {
            kind: Kind::Pkh,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: None,
                witness_script: None,
                satisfaction: Some(format!("sig(<{}>) <{}>", hex(&pk_bytes), hex(&pk_bytes))),
                max_satisfaction_weight: Some(SIG_BYTES + PUBKEY_BYTES),
            },
        })
    }

    fn build_wpkh(body: &str, network: Network) -> Result<Descriptor, Error> {
        let pk_bytes = key::resolve(body, network, true)?;
        let script_pubkey = p2wpkh_script(&pk_bytes);
        Ok(Descriptor {
            kind: Kind::Wpkh,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: None,
                witness_script: None,
                satisfaction: Some(format!("sig(<{}>) <{}>", hex(&pk_bytes), hex(&pk_bytes))),
                max_satisfaction_weight: Some(SIG_BYTES + PUBKEY_BYTES),
            },
        })
    }

    fn build_sh_wpkh(body: &str, network: Network) -> Result<Descriptor, Error> {
        let pk_bytes = key::resolve(body, network, true)?;
        let redeem = p2wpkh_script(&pk_bytes);
        check_script_size("P2SH", &redeem, MAX_P2SH_SCRIPT_SIZE)?;
        let script_pubkey = p2sh_script(&redeem);
        Ok(Descriptor {
            kind: Kind::ShWpkh,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: Some(redeem),
                witness_script: None,
                satisfaction: Some(format!("sig(<{}>) <{}>", hex(&pk_bytes), hex(&pk_bytes))),
                max_satisfaction_weight: Some(SIG_BYTES + PUBKEY_BYTES),
            },
        })
    }

    fn build_sh_ms(
        inner: &str,
        network: Network,
        allow_miniscript_in_p2sh: bool,
    ) -> Result<Descriptor, Error> {
        if !allow_miniscript_in_p2sh {
            let tree = Tree::from_str_exact(inner)?;
            let head = strip_wrapper_prefix(tree.name);
            if !P2SH_ALLOWED_HEADS.contains(&head) {
                return Err(Error::MiniscriptDisallowedInP2sh);
            }
        }
        let solved = solver::compile(inner, network, false)?;
        let redeem = asm::from_asm(&solved.locking_asm)?;
        check_script_size("P2SH", &redeem, MAX_P2SH_SCRIPT_SIZE)?;
        check_op_count(&redeem)?;
        let script_pubkey = p2sh_script(&redeem);
        Ok(Descriptor {
            kind: Kind::ShMs,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: Some(redeem),
                witness_script: None,
                satisfaction: solved.satisfaction_asm,
                max_satisfaction_weight: solved.max_satisfaction_weight,
            },
        })
    }

    fn build_wsh_ms(body: &str, network: Network) -> Result<Descriptor, Error> {
        let solved = solver::compile(body, network, true)?;
        let witness = asm::from_asm(&solved.locking_asm)?;
        check_script_size("P2WSH", &witness, MAX_P2WSH_SCRIPT_SIZE)?;
        check_op_count(&witness)?;
        let script_pubkey = p2wsh_script(&witness);
        Ok(Descriptor {
            kind: Kind::WshMs,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: None,
                witness_script: Some(witness),
                satisfaction: solved.satisfaction_asm,
                max_satisfaction_weight: solved.max_satisfaction_weight,
            },
        })
    }

    fn build_sh_wsh_ms(body: &str, network: Network) -> Result<Descriptor, Error> {
        let solved = solver::compile(body, network, true)?;
        let witness = asm::from_asm(&solved.locking_asm)?;
        check_script_size("P2WSH", &witness, MAX_P2WSH_SCRIPT_SIZE)?;
        check_op_count(&witness)?;
        let redeem = p2wsh_script(&witness);
        check_script_size("P2SH", &redeem, MAX_P2SH_SCRIPT_SIZE)?;
        let script_pubkey = p2sh_script(&redeem);
        Ok(Descriptor {
            kind: Kind::ShWshMs,
            network,
            payment: Payment {
                script_pubkey,
                redeem_script: Some(redeem),
                witness_script: Some(witness),
                satisfaction: solved.satisfaction_asm,
                max_satisfaction_weight: solved.max_satisfaction_weight,
            },
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn get_payment(&self) -> &Payment {
        &self.payment
    }

    pub fn get_script_pubkey(&self) -> &Script {
        &self.payment.script_pubkey
    }

    /// Returns the address this descriptor pays to. Every kind but bare
    /// `pk(...)` has one (a bare-key output has no standard address form).
    pub fn get_address(&self) -> Result<Address, Error> {
        if self.kind == Kind::Pk {
            return Err(Error::NoAddress);
        }
        Address::from_script(&self.payment.script_pubkey, self.network).ok_or(Error::NoAddress)
    }

    /// Computes the BIP-380 checksum of a descriptor string.
    pub fn checksum(expr: &str) -> Result<String, Error> {
        let (bare, _) = checksum::split_checksum(expr);
        checksum::checksum(bare)
    }

    /// Resolves a single key expression to its serialized public key bytes,
    /// without needing a full descriptor envelope around it.
    pub fn key_expression_to_pub_key(
        expr: &str,
        network: Network,
        is_segwit: bool,
    ) -> Result<Vec<u8>, Error> {
        key::resolve(expr, network, is_segwit)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// If `bare` is `name(...)`, returns the inner content; verifies the whole
/// string reconstructs exactly (catching malformed parens the loose
/// top-level split would otherwise accept).
fn strip_envelope<'a>(bare: &'a str, name: &str) -> Option<&'a str> {
    if !bare.starts_with(name) || bare.as_bytes().get(name.len()) != Some(&b'(') || !bare.ends_with(')') {
        return None;
    }
    let inner = &bare[name.len() + 1..bare.len() - 1];
    let tree = Tree::from_str_exact(bare).ok()?;
    if tree.name != name || !reconstructs_exactly(&tree, bare) {
        return None;
    }
    Some(inner)
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {}", self.kind, self.payment.script_pubkey)
    }
}

impl std::str::FromStr for Descriptor {
    type Err = Error;

    /// Parses a bare descriptor string with [`DescriptorOptions::default`]
    /// (mainnet, no wildcard index, checksum optional). Use
    /// [`Descriptor::new`] directly for a range descriptor or any other
    /// non-default option.
    fn from_str(s: &str) -> Result<Self, Error> {
        let opts = DescriptorOptions {
            expression: s.to_string(),
            ..Default::default()
        };
        Descriptor::new(&opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPRESSED: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn wpkh_builds_v0_program() {
        let opts = DescriptorOptions {
            expression: format!("wpkh({})", COMPRESSED),
            network: Network::Bitcoin,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.kind(), Kind::Wpkh);
        assert!(d.get_script_pubkey().is_v0_p2wpkh());
    }

    #[test]
    fn sh_wpkh_wraps_in_p2sh() {
        let opts = DescriptorOptions {
            expression: format!("sh(wpkh({}))", COMPRESSED),
            network: Network::Bitcoin,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.kind(), Kind::ShWpkh);
        assert!(d.get_script_pubkey().is_p2sh());
        assert!(d.get_payment().redeem_script.as_ref().unwrap().is_v0_p2wpkh());
    }

    #[test]
    fn pk_has_no_address() {
        let opts = DescriptorOptions {
            expression: format!("pk({})", COMPRESSED),
            network: Network::Bitcoin,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert!(matches!(d.get_address(), Err(Error::NoAddress)));
    }

    #[test]
    fn wsh_multi_builds_p2wsh() {
        let key_b = "03fac2114c2fbb091527eb7c64ecb11f8021cb7316856f7e0f8e6a8f3b4c5d8c3";
        let opts = DescriptorOptions {
            expression: format!("wsh(multi(1,{},{}))", COMPRESSED, key_b),
            network: Network::Bitcoin,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.kind(), Kind::WshMs);
        assert!(d.get_script_pubkey().is_v0_p2wsh());
    }

    #[test]
    fn sh_ms_disallows_non_allowlisted_head_by_default() {
        let opts = DescriptorOptions {
            expression: format!("sh(pk_k({}))", COMPRESSED),
            network: Network::Bitcoin,
            allow_miniscript_in_p2sh: false,
            ..Default::default()
        };
        let err = Descriptor::new(&opts).unwrap_err();
        assert!(matches!(err, Error::MiniscriptDisallowedInP2sh));
    }

    #[test]
    fn sh_ms_allows_allowlisted_pk_head() {
        let opts = DescriptorOptions {
            expression: format!("sh(pk({}))", COMPRESSED),
            network: Network::Bitcoin,
            allow_miniscript_in_p2sh: false,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.kind(), Kind::ShMs);
    }

    #[test]
    fn sh_ms_allows_allowlisted_multi_head() {
        let key_b = "03fac2114c2fbb091527eb7c64ecb11f8021cb7316856f7e0f8e6a8f3b4c5d8c3";
        let opts = DescriptorOptions {
            expression: format!("sh(multi(1,{},{}))", COMPRESSED, key_b),
            network: Network::Bitcoin,
            allow_miniscript_in_p2sh: false,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.kind(), Kind::ShMs);
    }

    #[test]
    fn sh_ms_disallows_thresh_head_by_default() {
        let key_b = "03fac2114c2fbb091527eb7c64ecb11f8021cb7316856f7e0f8e6a8f3b4c5d8c3";
        let opts = DescriptorOptions {
            expression: format!("sh(thresh(1,pk_k({}),pk_k({})))", COMPRESSED, key_b),
            network: Network::Bitcoin,
            allow_miniscript_in_p2sh: false,
            ..Default::default()
        };
        let err = Descriptor::new(&opts).unwrap_err();
        assert!(matches!(err, Error::MiniscriptDisallowedInP2sh));
    }

    #[test]
    fn sh_ms_allows_thresh_head_when_explicitly_permitted() {
        let key_b = "03fac2114c2fbb091527eb7c64ecb11f8021cb7316856f7e0f8e6a8f3b4c5d8c3";
        let opts = DescriptorOptions {
            expression: format!("sh(thresh(1,pk_k({}),pk_k({})))", COMPRESSED, key_b),
            network: Network::Bitcoin,
            allow_miniscript_in_p2sh: true,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.kind(), Kind::ShMs);
    }

    #[test]
    fn addr_round_trips_script_pubkey() {
        use bitcoin::hashes::hex::FromHex;
        let pk_bytes = Vec::<u8>::from_hex(COMPRESSED).unwrap();
        let pk = bitcoin::PublicKey::from_slice(&pk_bytes).unwrap();
        let addr = Address::p2pkh(&pk, Network::Bitcoin);
        let opts = DescriptorOptions {
            expression: format!("addr({})", addr),
            network: Network::Bitcoin,
            ..Default::default()
        };
        let d = Descriptor::new(&opts).unwrap();
        assert_eq!(d.get_script_pubkey(), &addr.script_pubkey());
    }

    #[test]
    fn from_str_parses_with_default_options() {
        let d: Descriptor = format!("wpkh({})", COMPRESSED).parse().unwrap();
        assert_eq!(d.kind(), Kind::Wpkh);
        assert_eq!(d.network, Network::Bitcoin);
    }
}
