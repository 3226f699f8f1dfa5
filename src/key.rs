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

//! # Key Expression Resolver
//!
//! Normalizes a key expression (with or without a `[fingerprint/path]`
//! origin) into a 33- or 65-byte public key, dispatching to raw-pubkey
//! validation, WIF decoding, or BIP32 derivation along a parsed path. The
//! curve verifier, WIF decoder and BIP32 derivation facility spec.md §6
//! lists as external collaborators are realized here by the real `bitcoin`
//! crate (`secp256k1::PublicKey::from_slice`, `bitcoin::PrivateKey::from_wif`,
//! `bitcoin::util::bip32`) rather than reimplemented.

use std::str::FromStr;

use bitcoin::hashes::hex::FromHex;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::util::bip32::{self, ChildNumber, DerivationPath, ExtendedPrivKey, ExtendedPubKey};
use bitcoin::{Network, PrivateKey};

use crate::error::Error;
use crate::grammar;

/// A parsed `[fingerprint/path]` origin. Informational only — the
/// derivation that actually produces the resolved key is the key
/// expression's own trailing path, not the origin's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// The 4-byte master key fingerprint.
    pub fingerprint: [u8; 4],
    /// The path from the master key to this key's immediate parent.
    pub path: DerivationPath,
}

/// Parses a BIP32-style derivation path suffix (no leading `m`), accepting
/// `H`/`h`/`'` as the hardened marker interchangeably, normalizing to `'`
/// before delegating to `bitcoin`'s own path construction.
pub fn parse_derivation_path(path: &str) -> Result<DerivationPath, Error> {
    let normalized = path.replace(['H', 'h'], "'");
    let normalized = normalized.strip_prefix('/').unwrap_or(&normalized);
    if normalized.is_empty() {
        return Ok(DerivationPath::from(Vec::<ChildNumber>::new()));
    }
    let mut nums = Vec::new();
    for part in normalized.split('/') {
        if !grammar::is_level(part) {
            return Err(Error::BadKeyExpression(path.to_string()));
        }
        let (num_str, hardened) = match part.strip_suffix('\'') {
            Some(stripped) => (stripped, true),
            None => (part, false),
        };
        let n: u64 = num_str
            .parse()
            .map_err(|_| Error::BadKeyExpression(path.to_string()))?;
        if n >= (1u64 << 31) {
            return Err(Error::PathElementOverflow(n));
        }
        let cn = if hardened {
            ChildNumber::from_hardened_idx(n as u32).expect("bounds checked above")
        } else {
            ChildNumber::from_normal_idx(n as u32).expect("bounds checked above")
        };
        nums.push(cn);
    }
    Ok(DerivationPath::from(nums))
}

fn parse_origin(s: &str) -> Result<Origin, Error> {
    if !grammar::is_origin(s) {
        return Err(Error::BadKeyExpression(s.to_string()));
    }
    let inner = &s[1..s.len() - 1];
    let (fp_hex, rest) = match inner.find('/') {
        Some(idx) => (&inner[..idx], &inner[idx..]),
        None => (inner, ""),
    };
    let fp_bytes = Vec::<u8>::from_hex(fp_hex)
        .map_err(|_| Error::BadKeyExpression(s.to_string()))?;
    if fp_bytes.len() != 4 {
        return Err(Error::BadKeyExpression(s.to_string()));
    }
    let mut fingerprint = [0u8; 4];
    fingerprint.copy_from_slice(&fp_bytes);
    let path = parse_derivation_path(rest)?;
    Ok(Origin { fingerprint, path })
}

/// Splits a leading `[...]` origin off a key expression, if present.
pub fn split_origin(expr: &str) -> Result<(Option<Origin>, &str), Error> {
    if expr.starts_with('[') {
        let end = expr
            .find(']')
            .ok_or_else(|| Error::BadKeyExpression(expr.to_string()))?;
        let origin = parse_origin(&expr[..=end])?;
        Ok((Some(origin), &expr[end + 1..]))
    } else {
        Ok((None, expr))
    }
}

/// Returns true if `network` and a key's intrinsic network (as decoded from
/// its version bytes) are compatible. `bitcoin`'s BIP32 implementation only
/// distinguishes mainnet from "everything else", so testnet/signet/regtest
/// all share the testnet version bytes.
fn network_compatible(key_network: Network, requested: Network) -> bool {
    match requested {
        Network::Bitcoin => key_network == Network::Bitcoin,
        Network::Testnet | Network::Signet | Network::Regtest => key_network != Network::Bitcoin,
    }
}

fn validate_point(bytes: &[u8]) -> Result<(), Error> {
    bitcoin::secp256k1::PublicKey::from_slice(bytes)
        .map(|_| ())
        .map_err(|e| Error::InvalidPubKey(e.to_string()))
}

/// Resolves a bare key expression body (origin already stripped) to a
/// public key's serialized bytes (33 compressed, or 65 uncompressed when
/// `is_segwit` is false).
fn resolve_body(body: &str, network: Network, is_segwit: bool) -> Result<Vec<u8>, Error> {
    if grammar::is_compressed_pubkey(body) {
        let bytes = Vec::<u8>::from_hex(body).map_err(|e| Error::InvalidPubKey(e.to_string()))?;
        validate_point(&bytes)?;
        return Ok(bytes);
    }
    if grammar::is_uncompressed_pubkey(body) {
        if is_segwit {
            return Err(Error::InvalidPubKey(
                "uncompressed public key in a SegWit context".to_string(),
            ));
        }
        let bytes = Vec::<u8>::from_hex(body).map_err(|e| Error::InvalidPubKey(e.to_string()))?;
        validate_point(&bytes)?;
        return Ok(bytes);
    }
    if grammar::is_wif(body) {
        let sk = PrivateKey::from_wif(body).map_err(|e| Error::InvalidWif(e.to_string()))?;
        if !network_compatible(sk.network, network) {
            return Err(Error::InvalidWif(format!(
                "WIF `{}` does not match requested network",
                body
            )));
        }
        if is_segwit && !sk.compressed {
            return Err(Error::InvalidPubKey(
                "uncompressed public key in a SegWit context".to_string(),
            ));
        }
        let secp = Secp256k1::new();
        let pk = sk.public_key(&secp);
        return Ok(pk.to_bytes());
    }

    let (prefix, path_str) = match body.find('/') {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => (body, ""),
    };
    if !grammar::is_range_path(path_str) {
        return Err(Error::BadKeyExpression(body.to_string()));
    }

    if grammar::is_xpub(prefix) {
        let xpub = ExtendedPubKey::from_str(prefix)
            .map_err(|e| Error::InvalidExtendedKey(e.to_string()))?;
        if !network_compatible(xpub.network, network) {
            return Err(Error::InvalidExtendedKey(format!(
                "xpub `{}` does not match requested network",
                prefix
            )));
        }
        let path = parse_derivation_path(path_str)?;
        let secp = Secp256k1::new();
        let child = if path.as_ref().is_empty() {
            xpub
        } else {
            xpub.derive_pub(&secp, &path)
                .map_err(|e| Error::InvalidExtendedKey(e.to_string()))?
        };
        return Ok(child.public_key.serialize().to_vec());
    }
    if grammar::is_xprv(prefix) {
        let xprv = ExtendedPrivKey::from_str(prefix)
            .map_err(|e| Error::InvalidExtendedKey(e.to_string()))?;
        if !network_compatible(xprv.network, network) {
            return Err(Error::InvalidExtendedKey(format!(
                "xprv `{}` does not match requested network",
                prefix
            )));
        }
        let path = parse_derivation_path(path_str)?;
        let secp = Secp256k1::new();
        let child = if path.as_ref().is_empty() {
            xprv
        } else {
            xprv.derive_priv(&secp, &path)
                .map_err(|e| Error::InvalidExtendedKey(e.to_string()))?
        };
        let pk = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &child.private_key);
        return Ok(pk.serialize().to_vec());
    }

    Err(Error::BadKeyExpression(body.to_string()))
}

/// Resolves a full key expression (optional origin plus key material) to a
/// public key's serialized bytes.
pub fn resolve(expr: &str, network: Network, is_segwit: bool) -> Result<Vec<u8>, Error> {
    let (_origin, body) = split_origin(expr)?;
    resolve_body(body, network, is_segwit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_raw_compressed_pubkey() {
        let key = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
        let bytes = resolve(key, Network::Bitcoin, true).unwrap();
        assert_eq!(bytes.len(), 33);
    }

    #[test]
    fn rejects_uncompressed_in_segwit() {
        let key = "04\
            79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
            483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";
        assert!(resolve(key, Network::Bitcoin, true).is_err());
        assert!(resolve(key, Network::Bitcoin, false).is_ok());
    }

    #[test]
    fn parses_origin_and_strips_it() {
        let expr = "[d34db33f/49'/0'/0']0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
        let (origin, body) = split_origin(expr).unwrap();
        let origin = origin.unwrap();
        assert_eq!(origin.fingerprint, [0xd3, 0x4d, 0xb3, 0x3f]);
        assert_eq!(body, "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
    }

    #[test]
    fn path_element_overflow_is_rejected() {
        let err = parse_derivation_path("/2147483648").unwrap_err();
        assert!(matches!(err, Error::PathElementOverflow(_)));
    }

    #[test]
    fn hardened_markers_are_interchangeable() {
        let a = parse_derivation_path("/44h/0h/0h").unwrap();
        let b = parse_derivation_path("/44'/0'/0'").unwrap();
        let c = parse_derivation_path("/44H/0H/0H").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
