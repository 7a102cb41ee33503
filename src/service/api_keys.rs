use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const KEY_PREFIX: &str = "wa_";

/// Fresh bearer key; only its hash is stored.
pub fn generate_api_key() -> String {
    format!("{KEY_PREFIX}{}", Uuid::new_v4().simple())
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_and_hash_stably() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
        assert!(a.starts_with(KEY_PREFIX));
        assert_eq!(hash_api_key(&a), hash_api_key(&a));
        assert_eq!(hash_api_key(&a).len(), 64);
        assert_ne!(hash_api_key(&a), hash_api_key(&b));
    }
}
