// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `registry/mod.rs`

#[cfg(test)]
mod tests {
    use crate::registry::*;

    #[test]
    fn test_registrable_candidates_most_specific_first() {
        assert_eq!(
            registrable_candidates("v1.api.Example.com."),
            vec!["v1.api.example.com", "api.example.com", "example.com"]
        );
        assert_eq!(registrable_candidates("example.com"), vec!["example.com"]);
        assert!(registrable_candidates("localhost").is_empty());
    }

    #[test]
    fn test_closest_zone_cut_prefers_own_delegation() {
        let own = vec!["ns1.sub.example.com".to_string()];
        let apex = vec!["ns1.registrar.net".to_string()];

        assert_eq!(closest_zone_cut_nameservers(&own, &apex), own);
        assert_eq!(closest_zone_cut_nameservers(&[], &apex), apex);
    }

    #[test]
    fn test_is_apex() {
        let lookup = DomainLookup {
            registration: RegistrationData {
                domain: "example.com".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(lookup.is_apex("Example.com."));
        assert!(!lookup.is_apex("api.example.com"));
    }
}
