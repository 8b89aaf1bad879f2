#![no_main]

use libfuzzer_sys::fuzz_target;
use keyward_hd::{ed25519::Slip10Node, secp256k1::Bip32Node};

fuzz_target!(|data: &[u8]| {
    // Seed ingestion must never panic, whatever the length or content
    if let Ok(node) = Bip32Node::master_from_seed(data, None) {
        let pk = node.public_key().unwrap();
        assert!(pk.as_bytes()[0] == 0x02 || pk.as_bytes()[0] == 0x03);

        // First byte of the data doubles as a derivation index
        let index = data.first().copied().unwrap_or(0) as u32;
        if let Ok(child) = node.derive(index) {
            child.public_key().unwrap();
        }
    }

    if let Ok(node) = Slip10Node::master_from_seed(data, None) {
        node.public_key().unwrap();
    }
});
