//! Locking-script codec
//!
//! Converts an address into its spending-condition script and back.
//! Exactly two spending conditions are supported (P2PKH and P2SH);
//! OP_RETURN outputs are recognized as data carriers with no address.
//! All functions here are pure and deterministic.

use super::address::{Address, AddressKind};

pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_RETURN: u8 = 0x6a;

/// Locking script for an address.
///
/// P2PKH: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
/// P2SH:  `OP_HASH160 <20> OP_EQUAL`
pub fn spending_script_for(address: &Address) -> Vec<u8> {
    let hash = address.hash();
    match address.kind() {
        AddressKind::PubKeyHash => {
            let mut script = Vec::with_capacity(25);
            script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
            script.extend_from_slice(hash);
            script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
            script
        }
        AddressKind::ScriptHash => {
            let mut script = Vec::with_capacity(23);
            script.extend_from_slice(&[OP_HASH160, 20]);
            script.extend_from_slice(hash);
            script.push(OP_EQUAL);
            script
        }
    }
}

/// Recover the address a locking script pays, if it pays one.
///
/// Returns `None` for OP_RETURN data carriers and for any script shape
/// other than the two supported templates. Most outputs the wallet sees
/// on regtest are one of these, and anything else is simply not ours.
pub fn address_from_script(script: &[u8]) -> Option<Address> {
    match script {
        [OP_DUP, OP_HASH160, 20, rest @ ..]
            if rest.len() == 22 && rest[20] == OP_EQUALVERIFY && rest[21] == OP_CHECKSIG =>
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&rest[..20]);
            Some(Address::from_pubkey_hash(hash))
        }
        [OP_HASH160, 20, rest @ ..] if rest.len() == 21 && rest[20] == OP_EQUAL => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&rest[..20]);
            Some(Address::from_script_hash(hash))
        }
        _ => None,
    }
}

/// Whether a script is an OP_RETURN data carrier
pub fn is_op_return(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}
