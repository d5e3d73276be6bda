use alloy_rlp::{Encodable, Header};
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;

use crate::opcodes::Opcode;
use crate::world::MessageFrame;

pub fn u256_to_u64_saturating(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.low_u64()
    }
}

pub fn u256_to_usize_saturating(value: U256) -> usize {
    usize::try_from(u256_to_u64_saturating(value)).unwrap_or(usize::MAX)
}

/// Lower 20 bytes of a stack word.
pub fn word_to_address(value: U256) -> Address {
    let bytes = value.to_big_endian();
    Address::from_slice(bytes.get(12..).unwrap_or_default())
}

pub fn address_to_word(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}

/// Stack item at `depth` from the top, zero when the stack is too shallow.
pub fn stack_word(frame: &dyn MessageFrame, depth: usize) -> U256 {
    frame.stack_item(depth).unwrap_or_default()
}

pub fn code_hash(code: &Bytes) -> H256 {
    keccak(code.as_ref())
}

/// `keccak(rlp([sender, nonce]))[12..]`
pub fn calculate_create_address(sender: Address, nonce: u64) -> Address {
    let sender_bytes: [u8; 20] = sender.0;
    let payload_length = sender_bytes.length() + nonce.length();
    let mut encoded = Vec::with_capacity(payload_length + 1);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut encoded);
    sender_bytes.encode(&mut encoded);
    nonce.encode(&mut encoded);
    Address::from_slice(keccak(&encoded).as_bytes().get(12..).unwrap_or_default())
}

/// `keccak(0xff ++ sender ++ salt ++ keccak(init_code))[12..]`
pub fn calculate_create2_address(sender: Address, init_code: &Bytes, salt: U256) -> Address {
    let init_code_hash = keccak(init_code.as_ref());
    let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
    preimage.push(0xff);
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(&salt.to_big_endian());
    preimage.extend_from_slice(init_code_hash.as_bytes());
    Address::from_slice(keccak(&preimage).as_bytes().get(12..).unwrap_or_default())
}

/// Whether `destination` is a `JUMPDEST` outside of push data.
pub fn is_valid_jump_destination(code: &[u8], destination: usize) -> bool {
    if code.get(destination).copied() != Some(u8::from(Opcode::JUMPDEST)) {
        return false;
    }
    let mut pc = 0;
    while pc < destination {
        let push_size = Opcode::from(code.get(pc).copied().unwrap_or_default())
            .push_size()
            .unwrap_or(0);
        pc = pc.saturating_add(1).saturating_add(push_size);
    }
    pc == destination
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn create_address_matches_known_vector() {
        // https://ethereum.stackexchange.com/a/761
        let sender = Address::from(hex!("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0"));
        assert_eq!(
            calculate_create_address(sender, 0),
            Address::from(hex!("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"))
        );
        assert_eq!(
            calculate_create_address(sender, 1),
            Address::from(hex!("343c43a37d37dff08ae8c4a11544c718abb4fcf8"))
        );
    }

    #[test]
    fn create2_address_matches_eip_example() {
        // EIP-1014, example 0
        let address = calculate_create2_address(Address::zero(), &Bytes::from_static(&[0x00]), U256::zero());
        assert_eq!(
            address,
            Address::from(hex!("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38"))
        );
    }

    #[test]
    fn jump_destinations_skip_push_data() {
        // PUSH1 0x5b JUMPDEST
        let code = hex!("605b5b");
        assert!(!is_valid_jump_destination(&code, 1));
        assert!(is_valid_jump_destination(&code, 2));
        assert!(!is_valid_jump_destination(&code, 3));
    }

    #[test]
    fn word_address_conversions() {
        let address = Address::from_low_u64_be(0xdead);
        assert_eq!(word_to_address(address_to_word(address)), address);
        assert_eq!(u256_to_u64_saturating(U256::MAX), u64::MAX);
    }
}
