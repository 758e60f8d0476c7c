#![no_main]

use libfuzzer_sys::fuzz_target;
use secure_packet::protocol::token::ConnectToken;

fuzz_target!(|data: &[u8]| {
    // Plaintext parsing sees attacker bytes only after authentication,
    // but it must still never panic on garbage
    let _ = ConnectToken::read(data);
    let _ = ConnectToken::decrypt(data, &[0u8; 8], &[1u8; 32]);
});
