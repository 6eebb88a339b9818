//! 64-bit similarity fingerprints for near-duplicate symbol detection
//!
//! A simhash over a symbol's identifier-ish tokens, sliced into four
//! disjoint 16-bit bands. Symbols colliding in any one band are candidate
//! near-duplicates; candidate retrieval is a union over four band-equality
//! lookups.

use xxhash_rust::xxh3::xxh3_64;

use crate::types::Fingerprint;

/// Tag stored alongside each fingerprint so the scheme can evolve
pub const FINGERPRINT_KIND: &str = "simhash64_v1";

/// Compute the simhash fingerprint of a symbol's source text
pub fn fingerprint_text(text: &str) -> Fingerprint {
    let mut counters = [0i32; 64];

    for token in tokenize(text) {
        let hash = xxh3_64(token.as_bytes());
        for (bit, counter) in counters.iter_mut().enumerate() {
            if hash & (1u64 << bit) != 0 {
                *counter += 1;
            } else {
                *counter -= 1;
            }
        }
    }

    let mut bits = 0u64;
    for (bit, counter) in counters.iter().enumerate() {
        if *counter > 0 {
            bits |= 1u64 << bit;
        }
    }

    Fingerprint {
        bits,
        bands: bands_of(bits),
    }
}

/// Slice a fingerprint into its four disjoint 16-bit bands
pub fn bands_of(bits: u64) -> [u16; 4] {
    [
        (bits & 0xFFFF) as u16,
        ((bits >> 16) & 0xFFFF) as u16,
        ((bits >> 32) & 0xFFFF) as u16,
        ((bits >> 48) & 0xFFFF) as u16,
    ]
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_reassemble_the_fingerprint() {
        let fp = fingerprint_text("fn hash_password(input: &str) -> Digest");
        let [b0, b1, b2, b3] = fp.bands;
        let rebuilt =
            (b0 as u64) | ((b1 as u64) << 16) | ((b2 as u64) << 32) | ((b3 as u64) << 48);
        assert_eq!(rebuilt, fp.bits);
    }

    #[test]
    fn identical_text_collides_everywhere() {
        let a = fingerprint_text("let total = items.iter().sum();");
        let b = fingerprint_text("let total = items.iter().sum();");
        assert_eq!(a.bits, b.bits);
        assert_eq!(a.bands, b.bands);
    }

    #[test]
    fn similar_text_shares_at_least_one_band() {
        let a = fingerprint_text(
            "pub fn find_user(&self, id: UserId) -> Option<User> { self.users.get(&id).cloned() }",
        );
        let b = fingerprint_text(
            "pub fn find_user(&self, id: UserId) -> Option<User> { self.members.get(&id).cloned() }",
        );
        assert!(a.bands.iter().zip(b.bands.iter()).any(|(x, y)| x == y));
    }

    #[test]
    fn unrelated_text_differs() {
        let a = fingerprint_text("SELECT id FROM users WHERE email = $1");
        let b = fingerprint_text("for (let i = 0; i < rows.length; i++) render(rows[i])");
        assert_ne!(a.bits, b.bits);
    }
}
