/// Integration-level tests for the `shared` crate.
///
/// Each section tests one module; unit tests that are tightly coupled to
/// private helpers live inside the modules themselves (see `#[cfg(test)]`
/// blocks in `session.rs` and `config.rs`).
// ---------------------------------------------------------------------------
// Session wire shape
// ---------------------------------------------------------------------------
mod session_tests {
    use shared::types::{Scope, Session};

    fn sample_session() -> Session {
        Session {
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            user_id: 42,
            permissions: vec!["petpictures|*".to_string(), "beenames|5".to_string()],
            issued_at: 1_700_000_000,
            last_used_at: 1_700_000_000,
            expires_at: 9_999_999_999,
        }
    }

    #[test]
    fn session_serializes_and_deserializes_roundtrip() {
        let s = sample_session();
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn session_json_contains_expected_keys() {
        let json = serde_json::to_value(sample_session()).unwrap();
        for key in &[
            "id",
            "user_id",
            "permissions",
            "issued_at",
            "last_used_at",
            "expires_at",
        ] {
            assert!(json.get(key).is_some(), "missing key: {key}");
        }
    }

    #[test]
    fn permission_check_is_snapshot_based() {
        let mut s = sample_session();
        assert!(s.has_permission(&Scope::new("petpictures", "*")));

        // Mutating the snapshot is the only thing that changes the answer —
        // there is no live lookup behind has_permission.
        s.permissions.clear();
        assert!(!s.has_permission(&Scope::new("petpictures", "*")));
    }
}

// ---------------------------------------------------------------------------
// Platform / account types
// ---------------------------------------------------------------------------
mod account_tests {
    use shared::types::{Account, Platform};

    #[test]
    fn platform_roundtrips_through_strings() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::Discord).unwrap();
        assert_eq!(json, r#""discord""#);
    }

    #[test]
    fn credentials_require_both_fields() {
        let mut account = Account {
            user_id: 1,
            username: Some("aurora".to_string()),
            email: Some("aurora@example.test".to_string()),
            hashed_secret: Some("hash".to_string()),
            salt: None,
            roles: vec![],
            created_at: 0,
            last_login: None,
        };
        // Half a credential pair is treated the same as none.
        assert!(!account.has_credentials());
        assert!(account.credentials().is_none());

        account.salt = Some("salt".to_string());
        assert!(account.has_credentials());
        assert_eq!(account.credentials(), Some(("hash", "salt")));
    }
}
