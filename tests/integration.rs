//! Scenario-level tests exercising the full `Descriptor::new` pipeline
//! end-to-end, rather than any one module in isolation.

use bitcoin::Network;
use descriptors::{Descriptor, DescriptorOptions, Error, Kind};

const COMPRESSED_A: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
const COMPRESSED_B: &str = "03fac2114c2fbb091527eb7c64ecb11f8021cb7316856f7e0f8e6a8f3b4c5d8c3";

// BIP32 test vector 1, master extended public key (seed 000102030405060708090a0b0c0d0e0f).
const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

fn opts(expression: String) -> DescriptorOptions {
    DescriptorOptions {
        expression,
        network: Network::Bitcoin,
        ..Default::default()
    }
}

/// Surfaces this crate's `trace!`/`debug!` logging under `RUST_LOG` when
/// running `cargo test -- --nocapture`; silent otherwise. Safe to call from
/// every test since `try_init` no-ops after the first call.
fn init_logging() {
    let _ = env_logger::try_init();
}

#[test]
fn raw_wpkh_address_matches_known_vector() {
    init_logging();
    let d = Descriptor::new(&opts(format!("wpkh({})", COMPRESSED_A))).unwrap();
    assert_eq!(
        d.get_address().unwrap().to_string(),
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
    );
}

#[test]
fn nested_segwit_from_xpub_wraps_v0_program_in_p2sh() {
    init_logging();
    let expr = format!("sh(wpkh([d34db33f/49'/0'/0']{}/0/0))", XPUB);
    let d = Descriptor::new(&opts(expr)).unwrap();
    assert_eq!(d.kind(), Kind::ShWpkh);

    let payment = d.get_payment();
    let redeem = payment.redeem_script.as_ref().unwrap();
    assert!(redeem.is_v0_p2wpkh());

    let spk = payment.script_pubkey.as_bytes();
    assert_eq!(spk.len(), 23);
    assert_eq!(spk[0], 0xa9); // OP_HASH160
    assert_eq!(spk[1], 0x14); // push 20 bytes
    assert_eq!(spk[22], 0x87); // OP_EQUAL
}

#[test]
fn or_branches_miniscript_embeds_both_keys_but_satisfies_one_branch() {
    init_logging();
    let expr = format!(
        "wsh(or_d(and_v(v:pk({}),older(5)),and_v(v:pk({}),after(500000))))",
        COMPRESSED_A, COMPRESSED_B
    );
    let d = Descriptor::new(&opts(expr)).unwrap();
    assert_eq!(d.kind(), Kind::WshMs);

    let payment = d.get_payment();
    let witness = payment.witness_script.as_ref().unwrap();
    let key_a_bytes = hex_decode(COMPRESSED_A);
    let key_b_bytes = hex_decode(COMPRESSED_B);
    assert!(contains_subslice(witness.as_bytes(), &key_a_bytes));
    assert!(contains_subslice(witness.as_bytes(), &key_b_bytes));

    let satisfaction = payment.satisfaction.as_ref().unwrap();
    assert!(!satisfaction.contains('@'));
    assert!(satisfaction.contains(COMPRESSED_A) || satisfaction.contains(COMPRESSED_B));
}

#[test]
fn duplicate_key_expressions_are_rejected() {
    init_logging();
    let expr = format!(
        "wsh(or_d(pk({}),pk({})))",
        COMPRESSED_A, COMPRESSED_A
    );
    let err = Descriptor::new(&opts(expr)).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey));
}

#[test]
fn range_index_derives_in_lockstep_not_as_a_cartesian_product() {
    init_logging();
    // Two distinct branches off the same xpub, both ending in a wildcard:
    // a single `index` substitutes into both in lockstep, not as a
    // cartesian product over independent indices.
    let expr = format!("wsh(multi(2,{}/0/*,{}/1/*))", XPUB, XPUB);
    let mut direct = opts(expr);
    direct.index = Some(7);
    let d = Descriptor::new(&direct).unwrap();
    assert_eq!(d.kind(), Kind::WshMs);

    let expected_first = descriptors::key::resolve(&format!("{}/0/7", XPUB), Network::Bitcoin, true).unwrap();
    let expected_second = descriptors::key::resolve(&format!("{}/1/7", XPUB), Network::Bitcoin, true).unwrap();
    let witness = d.get_payment().witness_script.as_ref().unwrap();
    assert!(contains_subslice(witness.as_bytes(), &expected_first));
    assert!(contains_subslice(witness.as_bytes(), &expected_second));
}

#[test]
fn oversized_multisig_redeem_script_is_rejected() {
    init_logging();
    // 16 distinct children of one xpub (34 bytes pushed each) plus the
    // m-of-n threshold and CHECKMULTISIG framing comfortably exceeds the
    // 520-byte P2SH limit.
    let keys: Vec<String> = (0..16).map(|i| format!("{}/{}", XPUB, i)).collect();
    let expr = format!("sh(multi(1,{}))", keys.join(","));
    let err = Descriptor::new(&opts(expr)).unwrap_err();
    assert!(matches!(err, Error::ScriptTooLarge { kind: "P2SH", .. }));
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
