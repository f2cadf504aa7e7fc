use uuid::Uuid;

/// Generate a new row/public id (UUIDv4, hyphenated).
pub fn next_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a short fingerprint for read-only badge URLs.
///
/// 12 hex chars from a fresh UUIDv4. Uniqueness is enforced by the
/// database's unique index; callers retry on conflict.
pub fn badge_key() -> String {
    let id = Uuid::new_v4();
    id.simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn next_id_returns_unique_ids() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(!id.is_empty());
            assert!(ids.insert(id), "Duplicate ID generated");
        }
    }

    #[test]
    fn next_id_is_uuid() {
        let id = next_id();
        assert!(Uuid::parse_str(&id).is_ok(), "ID should parse as UUID: {}", id);
    }

    #[test]
    fn badge_key_is_short_hex() {
        let key = badge_key();
        assert_eq!(key.len(), 12);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
