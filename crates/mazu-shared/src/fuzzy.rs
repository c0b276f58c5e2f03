//! Spamsum-style context-triggered piecewise hashing.
//!
//! A rolling hash over a 7-byte window decides where a piece ends; each piece
//! contributes one base64 character derived from an FNV-style hash of its
//! bytes. Two signatures are produced, at block size `b` and `2b`, and the
//! result is rendered as `b:sig1:sig2`, the same text ssdeep prints.
//! Payloads sharing long runs of bytes end up with overlapping signatures.

const ROLLING_WINDOW: usize = 7;
const MIN_BLOCKSIZE: u32 = 3;
const SPAMSUM_LENGTH: usize = 64;
const HASH_PRIME: u32 = 0x0100_0193;
const HASH_INIT: u32 = 0x2802_1967;
const B64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Default)]
struct RollingHash {
    window: [u8; ROLLING_WINDOW],
    h1: u32,
    h2: u32,
    h3: u32,
    n: usize,
}

impl RollingHash {
    fn update(&mut self, c: u8) -> u32 {
        let value = u32::from(c);
        let slot = self.n % ROLLING_WINDOW;

        self.h2 = self.h2.wrapping_sub(self.h1);
        self.h2 = self.h2.wrapping_add(ROLLING_WINDOW as u32 * value);

        self.h1 = self.h1.wrapping_add(value);
        self.h1 = self.h1.wrapping_sub(u32::from(self.window[slot]));

        self.window[slot] = c;
        self.n += 1;

        self.h3 = (self.h3 << 5) ^ value;

        self.h1.wrapping_add(self.h2).wrapping_add(self.h3)
    }
}

fn sum_hash(c: u8, h: u32) -> u32 {
    h.wrapping_mul(HASH_PRIME) ^ u32::from(c)
}

fn b64(h: u32) -> char {
    B64[(h % 64) as usize] as char
}

/// Signatures at `block_size` and `2 * block_size`, plus the number of
/// pieces the first one closed before its tail character was appended.
fn signatures(buf: &[u8], block_size: u32) -> (String, String, usize) {
    let mut roll = RollingHash::default();
    let mut h1 = HASH_INIT;
    let mut h2 = HASH_INIT;
    let mut first = String::with_capacity(SPAMSUM_LENGTH);
    let mut second = String::with_capacity(SPAMSUM_LENGTH / 2);
    let double = block_size * 2;

    for &c in buf {
        h1 = sum_hash(c, h1);
        h2 = sum_hash(c, h2);
        let r = roll.update(c);

        // Once a signature is full its last piece keeps absorbing bytes
        // until the tail character is written below.
        if r % block_size == block_size - 1 && first.len() < SPAMSUM_LENGTH - 1 {
            first.push(b64(h1));
            h1 = HASH_INIT;
        }
        if r % double == double - 1 && second.len() < SPAMSUM_LENGTH / 2 - 1 {
            second.push(b64(h2));
            h2 = HASH_INIT;
        }
    }

    let closed = first.len();
    if !buf.is_empty() {
        first.push(b64(h1));
        second.push(b64(h2));
    }
    (first, second, closed)
}

/// Compute the fuzzy digest of `buf`.
pub fn fuzzy_hash(buf: &[u8]) -> String {
    let mut block_size = MIN_BLOCKSIZE;
    while (block_size as usize) * SPAMSUM_LENGTH < buf.len() {
        block_size *= 2;
    }

    loop {
        let (first, second, closed) = signatures(buf, block_size);
        // Too few pieces at this size: halve and try again.
        if block_size > MIN_BLOCKSIZE && closed < SPAMSUM_LENGTH / 2 {
            block_size /= 2;
            continue;
        }
        return format!("{block_size}:{first}:{second}");
    }
}
