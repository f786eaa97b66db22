//! Relevancy filtering against tracked organizations and zones

use std::collections::HashSet;

use crate::types::CertificateAttributes;

/// Decides whether a certificate belongs to a tracked organization or zone
#[derive(Debug, Clone, Default)]
pub struct RelevancyFilter {
    organizations: HashSet<String>,
    zones: Vec<String>,
}

impl RelevancyFilter {
    /// Zones keep their first-seen order; duplicates and blanks are dropped
    pub fn new<O, Z>(organizations: O, zones: Z) -> Self
    where
        O: IntoIterator<Item = String>,
        Z: IntoIterator<Item = String>,
    {
        let mut unique = Vec::new();
        for zone in zones {
            let zone = zone.trim().to_string();
            if !zone.is_empty() && !unique.contains(&zone) {
                unique.push(zone);
            }
        }

        Self {
            organizations: organizations.into_iter().collect(),
            zones: unique,
        }
    }

    /// True if any subject organization name is tracked
    pub fn matches_organization(&self, cert: &CertificateAttributes) -> bool {
        cert.subject_organization_name
            .iter()
            .any(|org| self.organizations.contains(org))
    }

    /// Tracked zones named by the certificate, common names first, then DNS names.
    ///
    /// A name matches a zone when it equals the zone or ends with `.zone`.
    pub fn match_zones(&self, cert: &CertificateAttributes) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();

        let names = cert
            .subject_common_names
            .iter()
            .chain(cert.subject_dns_names.iter());

        for name in names {
            for zone in &self.zones {
                if Self::in_zone(name, zone) && !matched.contains(zone) {
                    matched.push(zone.clone());
                }
            }
        }

        matched
    }

    /// Matched zones if the certificate should be kept, `None` otherwise
    pub fn evaluate(&self, cert: &CertificateAttributes) -> Option<Vec<String>> {
        let zones = self.match_zones(cert);
        if self.matches_organization(cert) || !zones.is_empty() {
            Some(zones)
        } else {
            None
        }
    }

    fn in_zone(name: &str, zone: &str) -> bool {
        name == zone
            || (name.len() > zone.len()
                && name.ends_with(zone)
                && name.as_bytes()[name.len() - zone.len() - 1] == b'.')
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::attributes;

    fn cert(cns: &[&str], dns: &[&str], orgs: &[&str]) -> CertificateAttributes {
        let mut cert = attributes("ff");
        cert.subject_common_names = cns.iter().map(|s| s.to_string()).collect();
        cert.subject_dns_names = dns.iter().map(|s| s.to_string()).collect();
        cert.subject_organization_name = orgs.iter().map(|s| s.to_string()).collect();
        cert
    }

    fn filter(orgs: &[&str], zones: &[&str]) -> RelevancyFilter {
        RelevancyFilter::new(
            orgs.iter().map(|s| s.to_string()),
            zones.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn test_subdomain_matches_zone() {
        let f = filter(&[], &["example.com"]);
        let c = cert(&["a.b.example.com"], &[], &[]);
        assert_eq!(f.match_zones(&c), vec!["example.com".to_string()]);
    }

    #[test]
    fn test_exact_match() {
        let f = filter(&[], &["example.com"]);
        let c = cert(&[], &["example.com"], &[]);
        assert_eq!(f.match_zones(&c), vec!["example.com".to_string()]);
    }

    #[test]
    fn test_no_bare_substring_match() {
        let f = filter(&[], &["example.com"]);
        assert!(f.match_zones(&cert(&["notexample.com"], &[], &[])).is_empty());
        assert!(f.match_zones(&cert(&[], &["example.com.evil.net"], &[])).is_empty());
        assert!(f.match_zones(&cert(&[], &["xexample.com"], &[])).is_empty());
    }

    #[test]
    fn test_order_common_names_then_dns_names_without_duplicates() {
        let f = filter(&[], &["a.com", "b.com", "c.com"]);
        let c = cert(
            &["www.c.com"],
            &["x.b.com", "c.com", "y.b.com", "a.com"],
            &[],
        );

        assert_eq!(
            f.match_zones(&c),
            vec!["c.com".to_string(), "b.com".to_string(), "a.com".to_string()]
        );
    }

    #[test]
    fn test_match_zones_is_idempotent() {
        let f = filter(&[], &["example.com", "example.org"]);
        let c = cert(&["www.example.org"], &["example.com"], &[]);
        assert_eq!(f.match_zones(&c), f.match_zones(&c));
    }

    #[test]
    fn test_organization_match() {
        let f = filter(&["Example Inc"], &[]);
        assert!(f.matches_organization(&cert(&[], &[], &["Other", "Example Inc"])));
        assert!(!f.matches_organization(&cert(&[], &[], &["Example"])));
        assert!(!f.matches_organization(&cert(&[], &[], &[])));
    }

    #[test]
    fn test_evaluate() {
        let f = filter(&["Example Inc"], &["example.com"]);

        // Organization only: kept with no zones
        assert_eq!(
            f.evaluate(&cert(&["unrelated.net"], &[], &["Example Inc"])),
            Some(vec![])
        );

        // Zone only
        assert_eq!(
            f.evaluate(&cert(&[], &["api.example.com"], &[])),
            Some(vec!["example.com".to_string()])
        );

        // Neither
        assert_eq!(f.evaluate(&cert(&["unrelated.net"], &[], &["Other"])), None);
    }

    #[test]
    fn test_new_dedupes_zones() {
        let f = filter(&["A", "A"], &["example.com", " example.com ", "", "example.org"]);
        assert_eq!(f.zone_count(), 2);
        assert_eq!(f.organization_count(), 1);
    }
}
