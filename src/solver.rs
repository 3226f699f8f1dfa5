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

//! # Miniscript Solver
//!
//! Glues [`crate::key`] resolution to the [`crate::miniscript`] compiler: it
//! scans a bare miniscript expression for key sub-expressions, resolves each
//! to real key material, substitutes an opaque `@i` placeholder in its
//! place before handing the text to the miniscript parser, and afterwards
//! re-substitutes those placeholders (and their `HASH160` derivatives) back
//! into the compiled ASM with real hex. This keeps the miniscript compiler
//! itself free of any key-resolution logic.

use std::collections::{HashMap, HashSet};

use bitcoin::hashes::{hash160, Hash};
use bitcoin::Network;

use crate::error::Error;
use crate::expression::Tree;
use crate::key;
use crate::miniscript::Miniscript;

/// The result of compiling a bare miniscript fragment: its locking script
/// ASM (ready for [`crate::asm::from_asm`]) and a satisfying witness
/// template, both with placeholders fully resolved.
pub struct Solved {
    pub locking_asm: String,
    pub satisfaction_asm: Option<String>,
    pub keys: Vec<Vec<u8>>,
    pub max_satisfaction_weight: Option<usize>,
}

fn split_wrappers(name: &str) -> &str {
    match name.find(':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Walks a parsed expression tree and replaces every key-expression
/// argument — the sole argument of `pk_k`/`pk_h`/`pk`/`pkh`, or the trailing
/// key arguments of `multi`/`multi_a`/`sortedmulti`/`sortedmulti_a` — with an
/// opaque `@i` placeholder, returning the rewritten text alongside the
/// substituted-in-order list of original key expressions. Everything else
/// (thresholds, timelocks, hash literals) is reproduced verbatim, since only
/// these fragment positions carry key material in the miniscript grammar.
fn rewrite_tree(tree: &Tree, originals: &mut Vec<String>) -> String {
    if tree.args.is_empty() {
        return tree.name.to_string();
    }
    let real_name = split_wrappers(tree.name);
    match real_name {
        "pk_k" | "pk_h" | "pk" | "pkh" if tree.args.len() == 1 => {
            let placeholder = format!("@{}", originals.len());
            originals.push(tree.args[0].name.to_string());
            format!("{}({})", tree.name, placeholder)
        }
        "multi" | "multi_a" | "sortedmulti" | "sortedmulti_a" if tree.args.len() >= 2 => {
            let mut parts = vec![tree.args[0].name.to_string()];
            for arg in &tree.args[1..] {
                let placeholder = format!("@{}", originals.len());
                originals.push(arg.name.to_string());
                parts.push(placeholder);
            }
            format!("{}({})", tree.name, parts.join(","))
        }
        _ => {
            let parts: Vec<String> = tree
                .args
                .iter()
                .map(|arg| rewrite_tree(arg, originals))
                .collect();
            format!("{}({})", tree.name, parts.join(","))
        }
    }
}

/// Parses `expr` and replaces every key-expression argument with `@0`,
/// `@1`, ... in order of appearance.
fn extract_placeholders(expr: &str) -> Result<(String, Vec<String>), Error> {
    let tree = Tree::from_str_exact(expr)?;
    let mut originals = vec![];
    let rewritten = rewrite_tree(&tree, &mut originals);
    Ok((rewritten, originals))
}

/// Compiles a bare miniscript expression (the contents of `ms(...)`/`sh(ms(...))`/
/// `wsh(ms(...))`, without the envelope) against real key material.
///
/// `is_segwit` controls whether raw/WIF keys must be compressed.
/// `unknowns` is currently always empty for this crate (it exists so a
/// caller could model "assume this key's signature is unavailable" when
/// picking among multiple satisfying branches; [`crate::descriptor`] does
/// not yet need that).
pub fn compile(expr: &str, network: Network, is_segwit: bool) -> Result<Solved, Error> {
    let (templated, originals) = extract_placeholders(expr)?;
    log::debug!("compiling miniscript with {} key placeholder(s)", originals.len());

    let mut key_map: HashMap<String, Vec<u8>> = HashMap::new();
    let mut seen_hex: HashSet<Vec<u8>> = HashSet::new();
    let mut keys_in_order = vec![];
    for (i, orig) in originals.iter().enumerate() {
        let resolved = key::resolve(orig, network, is_segwit)?;
        if !seen_hex.insert(resolved.clone()) {
            return Err(Error::DuplicateKey);
        }
        key_map.insert(format!("@{}", i), resolved.clone());
        keys_in_order.push(resolved);
    }

    let ms = Miniscript::from_str(&templated)?;
    ms.sanity_check()
        .map_err(|e| Error::UnsaneMiniscript(e.to_string()))?;

    let locking_template = ms.encode_asm();
    let locking_asm = resubstitute(&locking_template, &key_map, false);

    let unknowns = HashSet::new();
    let satisfaction_asm = ms
        .satisfy(&unknowns)
        .map(|template| resubstitute(&template, &key_map, true));
    log::trace!("satisfiable: {}", satisfaction_asm.is_some());

    Ok(Solved {
        locking_asm,
        satisfaction_asm,
        keys: keys_in_order,
        max_satisfaction_weight: ms.max_satisfaction_weight(),
    })
}

/// Replaces every `<@i>` with the hex-encoded key and every `<HASH160(@i)>`
/// with the hex-encoded hash160 of that key.
///
/// `keep_brackets` distinguishes the two callers' needs: the locking-ASM
/// template feeds [`crate::asm::from_asm`], which expects bare hex push
/// tokens, so brackets are stripped (`<@i>` -> `hex`); the satisfaction
/// template is a human/caller-facing `sig(<hex>)` witness description, so
/// the brackets around the hex are kept (`<@i>` -> `<hex>`), matching the
/// brackets already used around signature/pubkey hex everywhere else this
/// crate builds a satisfaction string (e.g. [`crate::descriptor`]'s bare
/// `pk`/`pkh`/`wpkh` templates).
fn resubstitute(asm: &str, key_map: &HashMap<String, Vec<u8>>, keep_brackets: bool) -> String {
    let mut out = asm.to_string();
    for (placeholder, key_bytes) in key_map {
        let hex = hex_encode(key_bytes);
        let hash_hex = hex_encode(hash160::Hash::hash(key_bytes).as_ref());
        let (hash_repl, key_repl) = if keep_brackets {
            (format!("<{}>", hash_hex), format!("<{}>", hex))
        } else {
            (hash_hex, hex)
        };
        out = out.replace(&format!("<HASH160({})>", placeholder), &hash_repl);
        out = out.replace(&format!("<{}>", placeholder), &key_repl);
    }
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const KEY_B: &str = "03fac2114c2fbb091527eb7c64ecb11f8021cb7316856f7e0f8e6a8f3b4c5d8c3";

    #[test]
    fn extracts_single_key_placeholder() {
        let (templated, originals) = extract_placeholders(&format!("pk_k({})", KEY_A)).unwrap();
        assert_eq!(templated, "pk_k(@0)");
        assert_eq!(originals, vec![KEY_A.to_string()]);
    }

    #[test]
    fn extracts_multiple_keys_in_order() {
        let expr = format!("and_v(v:pk_k({}),pk_k({}))", KEY_A, KEY_B);
        let (templated, originals) = extract_placeholders(&expr).unwrap();
        assert_eq!(templated, "and_v(v:pk_k(@0),pk_k(@1))");
        assert_eq!(originals, vec![KEY_A.to_string(), KEY_B.to_string()]);
    }

    #[test]
    fn leaves_hash_literal_untouched() {
        let hash = "a".repeat(64);
        let expr = format!("sha256({})", hash);
        let (templated, originals) = extract_placeholders(&expr).unwrap();
        assert_eq!(templated, expr);
        assert!(originals.is_empty());
    }

    #[test]
    fn compiles_single_key_check() {
        let expr = format!("pk({})", KEY_A);
        let solved = compile(&expr, Network::Bitcoin, true).unwrap();
        assert_eq!(solved.locking_asm, format!("{} OP_CHECKSIG", KEY_A));
        assert_eq!(
            solved.satisfaction_asm.unwrap(),
            format!("sig(<{}>)", KEY_A)
        );
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let expr = format!("and_v(v:pk_k({}),pk_k({}))", KEY_A, KEY_A);
        assert!(matches!(
            compile(&expr, Network::Bitcoin, true).unwrap_err(),
            Error::DuplicateKey
        ));
    }

    #[test]
    fn multi_compiles_with_resolved_keys() {
        let expr = format!("multi(2,{},{})", KEY_A, KEY_B);
        let solved = compile(&expr, Network::Bitcoin, true).unwrap();
        assert_eq!(
            solved.locking_asm,
            format!("2 {} {} 2 OP_CHECKMULTISIG", KEY_A, KEY_B)
        );
    }

    #[test]
    fn satisfaction_keeps_brackets_around_every_substituted_key() {
        let expr = format!("and_v(v:pk({}),pk({}))", KEY_A, KEY_B);
        let solved = compile(&expr, Network::Bitcoin, true).unwrap();
        assert_eq!(
            solved.satisfaction_asm.unwrap(),
            format!("sig(<{}>) sig(<{}>)", KEY_A, KEY_B)
        );
    }
}
