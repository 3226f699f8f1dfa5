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
//! A small compiler from miniscript-fragment text to script ASM, plus a
//! satisfier that derives a witness-assembly template. Keys here are never
//! real public keys: the [`crate::solver`] module that drives this compiler
//! substitutes placeholder tokens (`@0`, `@1`, ...) in for every key
//! expression before calling in, so this module works purely in terms of
//! those placeholder strings and fills the compiled ASM with `<@i>` /
//! `<HASH160(@i)>` tokens for [`crate::solver`] to resolve afterwards. This
//! keeps key resolution and miniscript compilation fully decoupled, the way
//! spec.md's "pure functions, no shared state" framing of the external
//! miniscript compiler describes it.
//!
//! The type system here is deliberately shallow: real miniscript enforces a
//! full B/V/K/U correctness-type calculus with malleability and timelock
//! analysis. [`Miniscript::sanity_check`] instead does structural bounds
//! checking (threshold/multisig `k` in range, no duplicate fragments inside
//! `thresh`), and the satisfier always picks the leftmost satisfiable branch
//! rather than proving non-malleability. Good enough for a descriptor
//! realizer that never broadcasts anything, documented in DESIGN.md.

pub mod context;

use std::collections::HashSet;
use std::fmt;

use crate::error::Error;
use crate::expression::Tree;

/// A parsed miniscript fragment. Keys are opaque placeholder strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Miniscript {
    pub node: Terminal,
}

/// The node types of a miniscript fragment, after wrapper desugaring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    True,
    False,
    PkK(String),
    PkH(String),
    Older(u32),
    After(u32),
    Sha256(String),
    Hash256(String),
    Ripemd160(String),
    Hash160(String),
    Multi(usize, Vec<String>),
    MultiA(usize, Vec<String>),
    SortedMulti(usize, Vec<String>),
    SortedMultiA(usize, Vec<String>),
    AndV(Box<Miniscript>, Box<Miniscript>),
    AndB(Box<Miniscript>, Box<Miniscript>),
    AndOr(Box<Miniscript>, Box<Miniscript>, Box<Miniscript>),
    OrB(Box<Miniscript>, Box<Miniscript>),
    OrC(Box<Miniscript>, Box<Miniscript>),
    OrD(Box<Miniscript>, Box<Miniscript>),
    OrI(Box<Miniscript>, Box<Miniscript>),
    Thresh(usize, Vec<Miniscript>),
    Alt(Box<Miniscript>),
    Swap(Box<Miniscript>),
    Check(Box<Miniscript>),
    DupIf(Box<Miniscript>),
    Verify(Box<Miniscript>),
    NonZero(Box<Miniscript>),
    ZeroNotEqual(Box<Miniscript>),
}

fn leaf(t: &Tree) -> Result<String, Error> {
    crate::expression::terminal(t, |s| Ok::<String, Error>(s.to_string()))
}

fn leaf_num(t: &Tree) -> Result<u32, Error> {
    crate::expression::terminal(t, |s| {
        s.parse::<u32>()
            .map_err(|_| Error::ParseFailure(format!("bad numeric literal `{}`", s)))
    })
}

fn leaf_hash(t: &Tree, hex_len: usize) -> Result<String, Error> {
    let s = leaf(t)?;
    if s.len() != hex_len || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::ParseFailure(format!(
            "expected a {}-hex-digit hash, found `{}`",
            hex_len, s
        )));
    }
    Ok(s.to_lowercase())
}

fn split_wrappers(name: &str) -> (&str, &str) {
    match name.find(':') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => ("", name),
    }
}

fn apply_wrapper(ch: char, inner: Miniscript) -> Result<Miniscript, Error> {
    let node = match ch {
        'a' => Terminal::Alt(Box::new(inner)),
        's' => Terminal::Swap(Box::new(inner)),
        'c' => Terminal::Check(Box::new(inner)),
        'd' => Terminal::DupIf(Box::new(inner)),
        'v' => Terminal::Verify(Box::new(inner)),
        'j' => Terminal::NonZero(Box::new(inner)),
        'n' => Terminal::ZeroNotEqual(Box::new(inner)),
        't' => Terminal::AndV(Box::new(inner), Box::new(Miniscript { node: Terminal::True })),
        'u' => Terminal::OrI(Box::new(inner), Box::new(Miniscript { node: Terminal::False })),
        'l' => Terminal::OrI(Box::new(Miniscript { node: Terminal::False }), Box::new(inner)),
        other => return Err(Error::ParseFailure(format!("unknown wrapper `{}`", other))),
    };
    Ok(Miniscript { node })
}

impl Miniscript {
    /// Parses a miniscript fragment from its text form.
    pub fn from_str(s: &str) -> Result<Miniscript, Error> {
        let tree = Tree::from_str_exact(s)?;
        Self::from_tree(&tree)
    }

    fn from_tree(tree: &Tree) -> Result<Miniscript, Error> {
        let (wrappers, real_name) = split_wrappers(tree.name);
        if !wrappers.is_empty() {
            // Reconstruct a tree with the unwrapped name so the base-fragment
            // match below doesn't need to know about wrapper prefixes.
            let inner_tree = Tree {
                name: real_name,
                args: tree.args.clone(),
            };
            let mut node = Self::from_tree(&inner_tree)?;
            for ch in wrappers.chars().rev() {
                node = apply_wrapper(ch, node)?;
            }
            return Ok(node);
        }

        let node = match (real_name, tree.args.len()) {
            ("0", 0) => Terminal::False,
            ("1", 0) => Terminal::True,
            ("pk_k", 1) => Terminal::PkK(leaf(&tree.args[0])?),
            ("pk_h", 1) => Terminal::PkH(leaf(&tree.args[0])?),
            ("pk", 1) => {
                return apply_wrapper('c', Miniscript { node: Terminal::PkK(leaf(&tree.args[0])?) })
            }
            ("pkh", 1) => {
                return apply_wrapper('c', Miniscript { node: Terminal::PkH(leaf(&tree.args[0])?) })
            }
            ("older", 1) => Terminal::Older(leaf_num(&tree.args[0])?),
            ("after", 1) => Terminal::After(leaf_num(&tree.args[0])?),
            ("sha256", 1) => Terminal::Sha256(leaf_hash(&tree.args[0], 64)?),
            ("hash256", 1) => Terminal::Hash256(leaf_hash(&tree.args[0], 64)?),
            ("ripemd160", 1) => Terminal::Ripemd160(leaf_hash(&tree.args[0], 40)?),
            ("hash160", 1) => Terminal::Hash160(leaf_hash(&tree.args[0], 40)?),
            ("and_v", 2) => Terminal::AndV(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
            ),
            ("and_b", 2) => Terminal::AndB(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
            ),
            ("and_n", 2) => Terminal::AndOr(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
                Box::new(Miniscript { node: Terminal::False }),
            ),
            ("andor", 3) => Terminal::AndOr(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
                Box::new(Self::from_tree(&tree.args[2])?),
            ),
            ("or_b", 2) => Terminal::OrB(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
            ),
            ("or_c", 2) => Terminal::OrC(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
            ),
            ("or_d", 2) => Terminal::OrD(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
            ),
            ("or_i", 2) => Terminal::OrI(
                Box::new(Self::from_tree(&tree.args[0])?),
                Box::new(Self::from_tree(&tree.args[1])?),
            ),
            ("thresh", n) if n >= 2 => {
                let k = leaf_num(&tree.args[0])? as usize;
                let mut subs = Vec::with_capacity(n - 1);
                for arg in &tree.args[1..] {
                    subs.push(Self::from_tree(arg)?);
                }
                Terminal::Thresh(k, subs)
            }
            ("multi", n) if n >= 2 => {
                let k = leaf_num(&tree.args[0])? as usize;
                let keys = tree.args[1..].iter().map(leaf).collect::<Result<_, _>>()?;
                Terminal::Multi(k, keys)
            }
            ("multi_a", n) if n >= 2 => {
                let k = leaf_num(&tree.args[0])? as usize;
                let keys = tree.args[1..].iter().map(leaf).collect::<Result<_, _>>()?;
                Terminal::MultiA(k, keys)
            }
            ("sortedmulti", n) if n >= 2 => {
                let k = leaf_num(&tree.args[0])? as usize;
                let keys = tree.args[1..].iter().map(leaf).collect::<Result<_, _>>()?;
                Terminal::SortedMulti(k, keys)
            }
            ("sortedmulti_a", n) if n >= 2 => {
                let k = leaf_num(&tree.args[0])? as usize;
                let keys = tree.args[1..].iter().map(leaf).collect::<Result<_, _>>()?;
                Terminal::SortedMultiA(k, keys)
            }
            (name, _) => {
                return Err(Error::ParseFailure(format!(
                    "unknown or malformed miniscript fragment `{}`",
                    name
                )))
            }
        };
        Ok(Miniscript { node })
    }

    /// All placeholder key tokens referenced anywhere in the fragment, in
    /// first-appearance order with duplicates removed.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = vec![];
        self.collect_keys(&mut seen, &mut out);
        out
    }

    fn collect_keys(&self, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        let mut push = |k: &str| {
            if seen.insert(k.to_string()) {
                out.push(k.to_string());
            }
        };
        match &self.node {
            Terminal::PkK(k) | Terminal::PkH(k) => push(k),
            Terminal::Multi(_, ks)
            | Terminal::MultiA(_, ks)
            | Terminal::SortedMulti(_, ks)
            | Terminal::SortedMultiA(_, ks) => {
                for k in ks {
                    push(k);
                }
            }
            Terminal::AndV(a, b) | Terminal::AndB(a, b) | Terminal::OrB(a, b)
            | Terminal::OrC(a, b) | Terminal::OrD(a, b) | Terminal::OrI(a, b) => {
                a.collect_keys(seen, out);
                b.collect_keys(seen, out);
            }
            Terminal::AndOr(a, b, c) => {
                a.collect_keys(seen, out);
                b.collect_keys(seen, out);
                c.collect_keys(seen, out);
            }
            Terminal::Thresh(_, subs) => {
                for s in subs {
                    s.collect_keys(seen, out);
                }
            }
            Terminal::Alt(x) | Terminal::Swap(x) | Terminal::Check(x) | Terminal::DupIf(x)
            | Terminal::Verify(x) | Terminal::NonZero(x) | Terminal::ZeroNotEqual(x) => {
                x.collect_keys(seen, out);
            }
            Terminal::True
            | Terminal::False
            | Terminal::Older(_)
            | Terminal::After(_)
            | Terminal::Sha256(_)
            | Terminal::Hash256(_)
            | Terminal::Ripemd160(_)
            | Terminal::Hash160(_) => {}
        }
    }

    /// Structural bounds checking in place of a full correctness-type
    /// calculus: threshold/multisig `k` must be in `1..=n`, and
    /// `multi`/`sortedmulti` may not exceed
    /// [`context::MAX_MULTISIG_PUBKEYS`] keys.
    pub fn sanity_check(&self) -> Result<(), Error> {
        match &self.node {
            Terminal::Multi(k, keys)
            | Terminal::MultiA(k, keys)
            | Terminal::SortedMulti(k, keys)
            | Terminal::SortedMultiA(k, keys) => {
                if *k == 0 || *k > keys.len() {
                    return Err(Error::UnsaneMiniscript(format!(
                        "multisig threshold {} out of range for {} keys",
                        k,
                        keys.len()
                    )));
                }
                if keys.len() > context::MAX_MULTISIG_PUBKEYS {
                    return Err(Error::UnsaneMiniscript(format!(
                        "multisig references {} keys, limit {}",
                        keys.len(),
                        context::MAX_MULTISIG_PUBKEYS
                    )));
                }
                Ok(())
            }
            Terminal::Thresh(k, subs) => {
                if *k == 0 || *k > subs.len() {
                    return Err(Error::UnsaneMiniscript(format!(
                        "thresh threshold {} out of range for {} subexpressions",
                        k,
                        subs.len()
                    )));
                }
                subs.iter().try_for_each(Miniscript::sanity_check)
            }
            Terminal::AndV(a, b) | Terminal::AndB(a, b) | Terminal::OrB(a, b)
            | Terminal::OrC(a, b) | Terminal::OrD(a, b) | Terminal::OrI(a, b) => {
                a.sanity_check()?;
                b.sanity_check()
            }
            Terminal::AndOr(a, b, c) => {
                a.sanity_check()?;
                b.sanity_check()?;
                c.sanity_check()
            }
            Terminal::Alt(x) | Terminal::Swap(x) | Terminal::Check(x) | Terminal::DupIf(x)
            | Terminal::Verify(x) | Terminal::NonZero(x) | Terminal::ZeroNotEqual(x) => {
                x.sanity_check()
            }
            _ => Ok(()),
        }
    }

    /// Encodes this fragment as space-separated ASM text, with `<@i>` and
    /// `<HASH160(@i)>` placeholder tokens standing in for key material.
    pub fn encode_asm(&self) -> String {
        match &self.node {
            Terminal::True => "OP_1".to_string(),
            Terminal::False => "OP_0".to_string(),
            Terminal::PkK(k) => format!("<{}>", k),
            Terminal::PkH(k) => format!("OP_DUP OP_HASH160 <HASH160({})> OP_EQUALVERIFY", k),
            Terminal::Older(n) => format!("{} OP_CHECKSEQUENCEVERIFY", n),
            Terminal::After(n) => format!("{} OP_CHECKLOCKTIMEVERIFY", n),
            Terminal::Sha256(h) => format!("OP_SIZE 32 OP_EQUALVERIFY OP_SHA256 {} OP_EQUAL", h),
            Terminal::Hash256(h) => format!("OP_SIZE 32 OP_EQUALVERIFY OP_HASH256 {} OP_EQUAL", h),
            Terminal::Ripemd160(h) => {
                format!("OP_SIZE 32 OP_EQUALVERIFY OP_RIPEMD160 {} OP_EQUAL", h)
            }
            Terminal::Hash160(h) => {
                format!("OP_SIZE 32 OP_EQUALVERIFY OP_HASH160 {} OP_EQUAL", h)
            }
            Terminal::Multi(k, keys) | Terminal::SortedMulti(k, keys) => {
                let pushed: Vec<String> = keys.iter().map(|s| format!("<{}>", s)).collect();
                format!("{} {} {} OP_CHECKMULTISIG", k, pushed.join(" "), keys.len())
            }
            Terminal::MultiA(k, keys) | Terminal::SortedMultiA(k, keys) => {
                let mut parts = vec![];
                for (i, key) in keys.iter().enumerate() {
                    parts.push(format!("<{}>", key));
                    parts.push(if i == 0 {
                        "OP_CHECKSIG".to_string()
                    } else {
                        "OP_CHECKSIGADD".to_string()
                    });
                }
                format!("{} {} OP_NUMEQUAL", parts.join(" "), k)
            }
            Terminal::AndV(a, b) => format!("{} {}", a.encode_asm(), b.encode_asm()),
            Terminal::AndB(a, b) => format!("{} {} OP_BOOLAND", a.encode_asm(), b.encode_asm()),
            Terminal::AndOr(a, b, c) => format!(
                "{} OP_NOTIF {} OP_ELSE {} OP_ENDIF",
                a.encode_asm(),
                c.encode_asm(),
                b.encode_asm()
            ),
            Terminal::OrB(a, b) => format!("{} {} OP_BOOLOR", a.encode_asm(), b.encode_asm()),
            Terminal::OrC(a, b) => format!("{} OP_NOTIF {} OP_ENDIF", a.encode_asm(), b.encode_asm()),
            Terminal::OrD(a, b) => {
                format!("{} OP_IFDUP OP_NOTIF {} OP_ENDIF", a.encode_asm(), b.encode_asm())
            }
            Terminal::OrI(a, b) => {
                format!("OP_IF {} OP_ELSE {} OP_ENDIF", a.encode_asm(), b.encode_asm())
            }
            Terminal::Thresh(k, subs) => {
                let mut out = subs[0].encode_asm();
                for sub in &subs[1..] {
                    out = format!("{} {} OP_ADD", out, sub.encode_asm());
                }
                format!("{} {} OP_EQUAL", out, k)
            }
            Terminal::Alt(x) => format!("OP_TOALTSTACK {} OP_FROMALTSTACK", x.encode_asm()),
            Terminal::Swap(x) => format!("OP_SWAP {}", x.encode_asm()),
            Terminal::Check(x) => format!("{} OP_CHECKSIG", x.encode_asm()),
            Terminal::DupIf(x) => format!("OP_DUP OP_IF {} OP_ENDIF", x.encode_asm()),
            Terminal::Verify(x) => format!("{} OP_VERIFY", x.encode_asm()),
            Terminal::NonZero(x) => {
                format!("OP_SIZE OP_0NOTEQUAL OP_IF {} OP_ENDIF", x.encode_asm())
            }
            Terminal::ZeroNotEqual(x) => format!("{} OP_0NOTEQUAL", x.encode_asm()),
        }
    }

    /// Upper bound, in witness-stack bytes, on the size of a satisfying
    /// witness for this fragment — `None` if it has no satisfying witness at
    /// all. Used for fee estimation before a real signature is available, so
    /// it assumes worst-case DER signature length rather than measuring one.
    ///
    /// This approximates rather than replicates real miniscript's exact
    /// algorithm: `Thresh` picks the `k` costliest satisfiable
    /// subexpressions rather than running the minimum-cost-flow style search
    /// real miniscript uses, and every branch of an `or_*`/`andor` is
    /// assumed reachable independently rather than proven non-malleable.
    pub fn max_satisfaction_weight(&self) -> Option<usize> {
        const SIG_BYTES: usize = 73;
        const PUBKEY_BYTES: usize = 33;
        const PREIMAGE_BYTES: usize = 32;
        const DUMMY_PUSH_BYTES: usize = 1;

        match &self.node {
            Terminal::True => Some(0),
            Terminal::False => None,
            Terminal::PkK(_) => Some(SIG_BYTES),
            Terminal::PkH(_) => Some(SIG_BYTES + PUBKEY_BYTES),
            Terminal::Older(_) | Terminal::After(_) => Some(0),
            Terminal::Sha256(_) | Terminal::Hash256(_) | Terminal::Ripemd160(_) | Terminal::Hash160(_) => {
                Some(PREIMAGE_BYTES)
            }
            Terminal::Multi(k, _) | Terminal::SortedMulti(k, _) => Some(k * SIG_BYTES + DUMMY_PUSH_BYTES),
            Terminal::MultiA(k, _) | Terminal::SortedMultiA(k, _) => Some(k * SIG_BYTES),
            Terminal::AndV(a, b) | Terminal::AndB(a, b) => {
                Some(a.max_satisfaction_weight()? + b.max_satisfaction_weight()?)
            }
            Terminal::AndOr(a, b, c) => {
                let via_then = a
                    .max_satisfaction_weight()
                    .and_then(|wa| b.max_satisfaction_weight().map(|wb| wa + wb));
                let via_else = c.max_satisfaction_weight();
                via_then.into_iter().chain(via_else).max()
            }
            Terminal::OrB(a, b) | Terminal::OrC(a, b) | Terminal::OrD(a, b) | Terminal::OrI(a, b) => {
                let wa = a.max_satisfaction_weight();
                let wb = b.max_satisfaction_weight();
                wa.into_iter().chain(wb).max()
            }
            Terminal::Thresh(k, subs) => {
                let mut weights: Vec<usize> = subs.iter().filter_map(Miniscript::max_satisfaction_weight).collect();
                if weights.len() < *k {
                    return None;
                }
                weights.sort_unstable_by(|a, b| b.cmp(a));
                let satisfied: usize = weights[..*k].iter().sum();
                let dissatisfied = (subs.len() - *k) * DUMMY_PUSH_BYTES;
                Some(satisfied + dissatisfied)
            }
            Terminal::Alt(x) | Terminal::Swap(x) | Terminal::Check(x) | Terminal::Verify(x)
            | Terminal::NonZero(x) | Terminal::ZeroNotEqual(x) | Terminal::DupIf(x) => x.max_satisfaction_weight(),
        }
    }

    /// A minimal dissatisfaction token. Real miniscript derives a
    /// fragment-specific minimal dissatisfaction from its type; this always
    /// falls back to a single zero push, sufficient for the illustrative
    /// witness template this crate produces (noted in DESIGN.md).
    fn dissatisfy(&self) -> String {
        "0".to_string()
    }

    /// Builds a satisfying witness-assembly template, assuming every key not
    /// named in `unknowns` has a signature available and every hash fragment
    /// has an unresolved preimage. Returns `None` if no branch is
    /// satisfiable under that assumption.
    pub fn satisfy(&self, unknowns: &HashSet<String>) -> Option<String> {
        match &self.node {
            Terminal::True => Some(String::new()),
            Terminal::False => None,
            Terminal::PkK(k) => {
                if unknowns.contains(k) {
                    None
                } else {
                    Some(format!("sig(<{}>)", k))
                }
            }
            Terminal::PkH(k) => {
                if unknowns.contains(k) {
                    None
                } else {
                    Some(format!("sig(<{}>) <{}>", k, k))
                }
            }
            Terminal::Older(_) | Terminal::After(_) => Some(String::new()),
            Terminal::Sha256(h) => Some(format!("<preimage(sha256:{})>", h)),
            Terminal::Hash256(h) => Some(format!("<preimage(hash256:{})>", h)),
            Terminal::Ripemd160(h) => Some(format!("<preimage(ripemd160:{})>", h)),
            Terminal::Hash160(h) => Some(format!("<preimage(hash160:{})>", h)),
            Terminal::Multi(k, keys) | Terminal::SortedMulti(k, keys) => {
                let sigs: Vec<String> = keys
                    .iter()
                    .filter(|k| !unknowns.contains(*k))
                    .take(*k)
                    .map(|k| format!("sig(<{}>)", k))
                    .collect();
                if sigs.len() < *k {
                    None
                } else {
                    Some(format!("OP_0 {}", sigs.join(" ")))
                }
            }
            Terminal::MultiA(k, keys) | Terminal::SortedMultiA(k, keys) => {
                let sigs: Vec<String> = keys
                    .iter()
                    .filter(|k| !unknowns.contains(*k))
                    .take(*k)
                    .map(|k| format!("sig(<{}>)", k))
                    .collect();
                if sigs.len() < *k {
                    None
                } else {
                    Some(sigs.join(" "))
                }
            }
            Terminal::AndV(a, b) | Terminal::AndB(a, b) => {
                Some(format!("{} {}", a.satisfy(unknowns)?, b.satisfy(unknowns)?))
            }
            Terminal::AndOr(a, b, c) => a
                .satisfy(unknowns)
                .and_then(|sa| Some(format!("{} {}", sa, b.satisfy(unknowns)?)))
                .or_else(|| Some(format!("{} {}", a.dissatisfy(), c.satisfy(unknowns)?))),
            Terminal::OrB(a, b) => a
                .satisfy(unknowns)
                .map(|sa| format!("{} {}", b.dissatisfy(), sa))
                .or_else(|| b.satisfy(unknowns).map(|sb| format!("{} {}", sb, a.dissatisfy()))),
            Terminal::OrC(a, b) => a
                .satisfy(unknowns)
                .or_else(|| Some(format!("{} {}", a.dissatisfy(), b.satisfy(unknowns)?))),
            Terminal::OrD(a, b) => a
                .satisfy(unknowns)
                .or_else(|| Some(format!("{} {}", a.dissatisfy(), b.satisfy(unknowns)?))),
            Terminal::OrI(a, b) => a
                .satisfy(unknowns)
                .map(|sa| format!("{} 1", sa))
                .or_else(|| b.satisfy(unknowns).map(|sb| format!("{} 0", sb))),
            Terminal::Thresh(k, subs) => {
                let mut sats: Vec<String> = vec![];
                let mut satisfied = 0usize;
                for sub in subs.iter().rev() {
                    if satisfied < *k {
                        if let Some(s) = sub.satisfy(unknowns) {
                            sats.push(s);
                            satisfied += 1;
                            continue;
                        }
                    }
                    sats.push(sub.dissatisfy());
                }
                if satisfied < *k {
                    None
                } else {
                    Some(sats.join(" "))
                }
            }
            Terminal::Alt(x) | Terminal::Swap(x) | Terminal::Check(x) | Terminal::Verify(x)
            | Terminal::NonZero(x) | Terminal::ZeroNotEqual(x) => x.satisfy(unknowns),
            Terminal::DupIf(x) => x.satisfy(unknowns).map(|s| format!("{} 1", s)),
        }
    }
}

impl fmt::Display for Miniscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Terminal::True => write!(f, "1"),
            Terminal::False => write!(f, "0"),
            Terminal::PkK(k) => write!(f, "pk_k({})", k),
            Terminal::PkH(k) => write!(f, "pk_h({})", k),
            Terminal::Older(n) => write!(f, "older({})", n),
            Terminal::After(n) => write!(f, "after({})", n),
            Terminal::Sha256(h) => write!(f, "sha256({})", h),
            Terminal::Hash256(h) => write!(f, "hash256({})", h),
            Terminal::Ripemd160(h) => write!(f, "ripemd160({})", h),
            Terminal::Hash160(h) => write!(f, "hash160({})", h),
            Terminal::Multi(k, keys) => write!(f, "multi({},{})", k, keys.join(",")),
            Terminal::MultiA(k, keys) => write!(f, "multi_a({},{})", k, keys.join(",")),
            Terminal::SortedMulti(k, keys) => write!(f, "sortedmulti({},{})", k, keys.join(",")),
            Terminal::SortedMultiA(k, keys) => {
                write!(f, "sortedmulti_a({},{})", k, keys.join(","))
            }
            Terminal::AndV(a, b) => write!(f, "and_v({},{})", a, b),
            Terminal::AndB(a, b) => write!(f, "and_b({},{})", a, b),
            Terminal::AndOr(a, b, c) => write!(f, "andor({},{},{})", a, b, c),
            Terminal::OrB(a, b) => write!(f, "or_b({},{})", a, b),
            Terminal::OrC(a, b) => write!(f, "or_c({},{})", a, b),
            Terminal::OrD(a, b) => write!(f, "or_d({},{})", a, b),
            Terminal::OrI(a, b) => write!(f, "or_i({},{})", a, b),
            Terminal::Thresh(k, subs) => {
                write!(f, "thresh({}", k)?;
                for s in subs {
                    write!(f, ",{}", s)?;
                }
                write!(f, ")")
            }
            Terminal::Alt(x) => write!(f, "a:{}", x),
            Terminal::Swap(x) => write!(f, "s:{}", x),
            Terminal::Check(x) => write!(f, "c:{}", x),
            Terminal::DupIf(x) => write!(f, "d:{}", x),
            Terminal::Verify(x) => write!(f, "v:{}", x),
            Terminal::NonZero(x) => write!(f, "j:{}", x),
            Terminal::ZeroNotEqual(x) => write!(f, "n:{}", x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_pk_k() {
        let ms = Miniscript::from_str("pk_k(@0)").unwrap();
        assert_eq!(ms.node, Terminal::PkK("@0".to_string()));
    }

    #[test]
    fn pk_sugar_desugars_to_check_pk_k() {
        let ms = Miniscript::from_str("pk(@0)").unwrap();
        assert!(matches!(ms.node, Terminal::Check(_)));
        assert_eq!(ms.encode_asm(), "<@0> OP_CHECKSIG");
    }

    #[test]
    fn parses_wrapper_chain() {
        let ms = Miniscript::from_str("sc:pk_k(@0)").unwrap();
        // sc:X = s:(c:(X))
        match ms.node {
            Terminal::Swap(inner) => assert!(matches!(inner.node, Terminal::Check(_))),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn t_u_l_desugar_to_combinators() {
        let t = Miniscript::from_str("t:pk_k(@0)").unwrap();
        assert!(matches!(t.node, Terminal::AndV(_, _)));
        let u = Miniscript::from_str("u:pk_k(@0)").unwrap();
        assert!(matches!(u.node, Terminal::OrI(_, _)));
        let l = Miniscript::from_str("l:pk_k(@0)").unwrap();
        assert!(matches!(l.node, Terminal::OrI(_, _)));
    }

    #[test]
    fn collects_keys_in_order_without_duplicates() {
        let ms = Miniscript::from_str("and_v(v:pk_k(@0),or_i(pk_k(@1),pk_k(@0)))").unwrap();
        assert_eq!(ms.keys(), vec!["@0".to_string(), "@1".to_string()]);
    }

    #[test]
    fn multi_sanity_check_rejects_bad_threshold() {
        let ms = Miniscript::from_str("multi(3,@0,@1)").unwrap();
        assert!(ms.sanity_check().is_err());
    }

    #[test]
    fn multi_encodes_and_satisfies() {
        let ms = Miniscript::from_str("multi(2,@0,@1,@2)").unwrap();
        assert!(ms.sanity_check().is_ok());
        assert_eq!(ms.encode_asm(), "2 <@0> <@1> <@2> 3 OP_CHECKMULTISIG");
        let sat = ms.satisfy(&HashSet::new()).unwrap();
        assert_eq!(sat, "OP_0 sig(<@0>) sig(<@1>)");
    }

    #[test]
    fn unknown_key_is_unsatisfiable() {
        let ms = Miniscript::from_str("pk_k(@0)").unwrap();
        let mut unknowns = HashSet::new();
        unknowns.insert("@0".to_string());
        assert!(ms.satisfy(&unknowns).is_none());
    }

    #[test]
    fn andor_falls_back_to_else_branch() {
        let ms = Miniscript::from_str("andor(pk_k(@0),pk_k(@1),pk_k(@2))").unwrap();
        let mut unknowns = HashSet::new();
        unknowns.insert("@0".to_string());
        let sat = ms.satisfy(&unknowns).unwrap();
        assert!(sat.contains("@2"));
        assert!(!sat.contains("@1"));
    }

    #[test]
    fn max_satisfaction_weight_sums_and_picks_best_branch() {
        let single = Miniscript::from_str("pk_k(@0)").unwrap();
        assert_eq!(single.max_satisfaction_weight(), Some(73));

        let or = Miniscript::from_str("or_i(pk_k(@0),and_v(v:pk_k(@1),pk_k(@2)))").unwrap();
        // the and_v branch (146) outweighs the single-sig branch (73)
        assert_eq!(or.max_satisfaction_weight(), Some(146));
    }

    #[test]
    fn thresh_requires_k_satisfiable_subs() {
        let ms = Miniscript::from_str("thresh(2,pk_k(@0),pk_k(@1),pk_k(@2))").unwrap();
        let mut unknowns = HashSet::new();
        unknowns.insert("@0".to_string());
        unknowns.insert("@1".to_string());
        assert!(ms.satisfy(&unknowns).is_none());
    }
}
