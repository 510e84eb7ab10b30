use chrono::Utc;
use gex_analyzer::token_store::{TokenRecord, TokenStore};

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> TokenStore {
        let path = std::env::temp_dir().join(format!(
            "gex-store-it-{}-{}.json",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        TokenStore::new(path)
    }

    fn bundle(tag: &str) -> TokenRecord {
        TokenRecord {
            access_token_issued_at: Utc::now(),
            refresh_token_issued_at: Utc::now(),
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
            id_token: String::new(),
            expires_in: 1800,
            token_type: "Bearer".to_string(),
            scope: "api".to_string(),
        }
    }

    #[test]
    fn test_seeding_twice_leaves_one_row() {
        let store = temp_store("idempotent");
        let external = bundle("cloud");

        assert!(store.seed_if_empty(Some(&external)).unwrap());
        assert!(!store.seed_if_empty(Some(&external)).unwrap());

        let cached = store.load().unwrap().unwrap();
        assert_eq!(cached, external);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_existing_row_wins_over_different_external_bundle() {
        let store = temp_store("local-wins");
        let local = bundle("local");
        store.save(&local).unwrap();

        // A differing external bundle must not replace the local row:
        // local state may be fresher (rotated refresh token).
        let external = bundle("cloud");
        assert!(!store.seed_if_empty(Some(&external)).unwrap());
        assert_eq!(store.load().unwrap().unwrap(), local);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_absent_external_bundle_is_silent_noop() {
        let store = temp_store("absent-bundle");
        assert!(!store.seed_if_empty(None).unwrap());
        assert!(store.is_empty());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_record_round_trips_through_cache_format() {
        let store = temp_store("roundtrip");
        let record = TokenRecord {
            access_token_issued_at: "2026-08-07T14:30:00Z".parse().unwrap(),
            refresh_token_issued_at: "2026-08-01T09:00:00Z".parse().unwrap(),
            access_token: "acc".to_string(),
            refresh_token: "ref".to_string(),
            id_token: "idt".to_string(),
            expires_in: 1800,
            token_type: "Bearer".to_string(),
            scope: "api".to_string(),
        };

        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), record);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_malformed_cache_counts_as_populated() {
        let store = temp_store("malformed");
        std::fs::write(store.path(), "not json at all").unwrap();

        // Never overwrite something we cannot read
        assert!(!store.is_empty());
        assert!(!store.seed_if_empty(Some(&bundle("cloud"))).unwrap());
        assert!(store.load().is_err());
        let _ = std::fs::remove_file(store.path());
    }
}
