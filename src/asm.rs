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

//! # ASM Assembler
//!
//! Turns the space-separated opcode-name/hex-literal ASM text the
//! [`crate::miniscript`] compiler emits into a real [`bitcoin::Script`].
//! Op-counting for the [`crate::miniscript::context`] limits is done with
//! the real `bitcoin` crate's script decompiler rather than reimplemented,
//! since that half of the round trip already exists there.

use bitcoin::blockdata::opcodes::all::OP_16;
use bitcoin::blockdata::script::{Builder, Instruction, Script};
use bitcoin::hashes::hex::FromHex;

use crate::error::Error;

/// Minimal little-endian sign-magnitude encoding of `n`, as used for numeric
/// script literals (`CScriptNum`). Returns an empty vector for zero.
pub fn encode_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return vec![];
    }
    let neg = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = vec![];
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if out.last().copied().unwrap_or(0) & 0x80 != 0 {
        out.push(if neg { 0x80 } else { 0x00 });
    } else if neg {
        *out.last_mut().unwrap() |= 0x80;
    }
    out
}

fn opcode_byte(name: &str) -> Option<u8> {
    Some(match name {
        "OP_0" => 0x00,
        "OP_1" | "OP_TRUE" => 0x51,
        "OP_2" => 0x52,
        "OP_3" => 0x53,
        "OP_4" => 0x54,
        "OP_5" => 0x55,
        "OP_6" => 0x56,
        "OP_7" => 0x57,
        "OP_8" => 0x58,
        "OP_9" => 0x59,
        "OP_10" => 0x5a,
        "OP_11" => 0x5b,
        "OP_12" => 0x5c,
        "OP_13" => 0x5d,
        "OP_14" => 0x5e,
        "OP_15" => 0x5f,
        "OP_16" => 0x60,
        "OP_IF" => 0x63,
        "OP_NOTIF" => 0x64,
        "OP_ELSE" => 0x67,
        "OP_ENDIF" => 0x68,
        "OP_VERIFY" => 0x69,
        "OP_TOALTSTACK" => 0x6b,
        "OP_FROMALTSTACK" => 0x6c,
        "OP_DROP" => 0x75,
        "OP_DUP" => 0x76,
        "OP_SWAP" => 0x7c,
        "OP_IFDUP" => 0x73,
        "OP_SIZE" => 0x82,
        "OP_EQUAL" => 0x87,
        "OP_EQUALVERIFY" => 0x88,
        "OP_0NOTEQUAL" => 0x92,
        "OP_ADD" => 0x93,
        "OP_BOOLAND" => 0x9a,
        "OP_BOOLOR" => 0x9b,
        "OP_NUMEQUAL" => 0x9c,
        "OP_RIPEMD160" => 0xa6,
        "OP_SHA256" => 0xa8,
        "OP_HASH160" => 0xa9,
        "OP_HASH256" => 0xaa,
        "OP_CHECKSIG" => 0xac,
        "OP_CHECKSIGVERIFY" => 0xad,
        "OP_CHECKMULTISIG" => 0xae,
        "OP_CHECKMULTISIGVERIFY" => 0xaf,
        "OP_CHECKLOCKTIMEVERIFY" => 0xb1,
        "OP_CHECKSEQUENCEVERIFY" => 0xb2,
        "OP_CHECKSIGADD" => 0xba,
        _ => return None,
    })
}

/// Assembles a space-separated ASM string (opcode names, even-length hex
/// literals, and bare decimal numbers) into a [`Script`]. Every placeholder
/// token (`<...>`) must already have been substituted by the caller.
pub fn from_asm(asm: &str) -> Result<Script, Error> {
    let mut builder = Builder::new();
    for token in asm.split_whitespace() {
        if let Some(byte) = opcode_byte(token) {
            builder = builder.push_opcode(byte.into());
        } else if token.bytes().all(|b| b.is_ascii_hexdigit()) && token.len() % 2 == 0 && !token.is_empty() {
            let data = Vec::<u8>::from_hex(token)
                .map_err(|e| Error::ParseFailure(format!("bad hex literal `{}`: {}", token, e)))?;
            builder = builder.push_slice(&data);
        } else if let Ok(n) = token.parse::<i64>() {
            // OP_1..OP_16/OP_1NEGATE are the canonical minimal encoding for
            // this range; everything outside it falls back to our own
            // CScriptNum encoding rather than a generic push.
            builder = if n == -1 || (1..=16).contains(&n) {
                builder.push_int(n)
            } else {
                builder.push_slice(&encode_num(n))
            };
        } else {
            return Err(Error::ParseFailure(format!(
                "unrecognized ASM token `{}`",
                token
            )));
        }
    }
    Ok(builder.into_script())
}

/// Counts non-push opcodes (anything above `OP_16`) via the real decompiler,
/// for enforcement of [`crate::miniscript::context::MAX_OPS_PER_SCRIPT`].
pub fn count_non_push_opcodes(script: &Script) -> Result<usize, Error> {
    let mut count = 0usize;
    for ins in script.instructions() {
        if let Instruction::Op(op) = ins.map_err(|e| Error::ParseFailure(e.to_string()))? {
            if op.into_u8() > OP_16.into_u8() {
                count += 1;
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_small_positive_numbers() {
        assert_eq!(encode_num(0), Vec::<u8>::new());
        assert_eq!(encode_num(1), vec![0x01]);
        assert_eq!(encode_num(127), vec![0x7f]);
        assert_eq!(encode_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_num(255), vec![0xff, 0x00]);
        assert_eq!(encode_num(256), vec![0x00, 0x01]);
    }

    #[test]
    fn encodes_negative_numbers() {
        assert_eq!(encode_num(-1), vec![0x81]);
        assert_eq!(encode_num(-128), vec![0x80, 0x80]);
    }

    #[test]
    fn assembles_simple_script() {
        let script = from_asm("OP_DUP OP_HASH160").unwrap();
        assert_eq!(script.as_bytes(), &[0x76, 0xa9]);
    }

    #[test]
    fn assembles_push_and_counts_ops() {
        let hex = "02".to_string() + &"00".repeat(32);
        let asm = format!("{} OP_CHECKSIG", hex);
        let script = from_asm(&asm).unwrap();
        assert_eq!(count_non_push_opcodes(&script).unwrap(), 1);
    }

    #[test]
    fn small_thresholds_use_canonical_op_n() {
        let script = from_asm("2 OP_CHECKSIGADD 3 OP_NUMEQUAL").unwrap();
        assert_eq!(script.as_bytes()[0], 0x52); // OP_2
    }

    #[test]
    fn large_numeric_literal_uses_scriptnum_encoding() {
        let script = from_asm("500000 OP_CHECKLOCKTIMEVERIFY").unwrap();
        assert_eq!(script.as_bytes()[..4], [0x03, 0x20, 0xa1, 0x07]);
    }
}
