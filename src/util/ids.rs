//! Random identifiers

use rand::RngCore;

/// 16 random bytes, hex encoded (32 chars)
pub fn random_hex_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Firebase-style push key: 8 chars of millisecond timestamp followed by
/// 12 random chars, so keys sort by creation time.
pub fn push_key(now_millis: u64) -> String {
    let mut key = [0u8; 20];
    let mut ts = now_millis;
    for slot in key[..8].iter_mut().rev() {
        *slot = PUSH_CHARS[(ts % 64) as usize];
        ts /= 64;
    }
    let mut rng = rand::thread_rng();
    for slot in key[8..].iter_mut() {
        *slot = PUSH_CHARS[(rng.next_u32() % 64) as usize];
    }
    key.iter().map(|&b| b as char).collect()
}
