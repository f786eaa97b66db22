// src/cert_parser.rs
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

use crate::types::CertificateAttributes;

/// Turns DER bytes into the attribute set the crawler filters and stores.
///
/// Returns `None` when the bytes cannot be parsed; the caller skips the entry.
pub trait AttributeParser: Send + Sync {
    fn parse(&self, der: &[u8], source: &str) -> Option<CertificateAttributes>;
}

/// `AttributeParser` backed by x509-parser
#[derive(Debug, Clone, Copy, Default)]
pub struct X509AttributeParser;

impl X509AttributeParser {
    pub fn new() -> Self {
        Self
    }

    fn extract(der: &[u8]) -> anyhow::Result<CertificateAttributes> {
        let (rem, cert) = X509Certificate::from_der(der)
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate from DER: {:?}", e))?;

        // Precertificate slices carry trailing chain bytes past the certificate
        let der = &der[..der.len() - rem.len()];

        let subject_organization_name = cert
            .subject()
            .iter_organization()
            .filter_map(|attr| attr.as_str().ok())
            .map(str::to_string)
            .collect();

        let subject_common_names = cert
            .subject()
            .iter_common_name()
            .filter_map(|attr| attr.as_str().ok())
            .map(str::to_string)
            .collect();

        let issuer_common_name = cert
            .issuer()
            .iter_common_name()
            .filter_map(|attr| attr.as_str().ok())
            .map(str::to_string)
            .collect();

        let mut subject_dns_names = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for general_name in &san.general_names {
                    if let GeneralName::DNSName(dns_name) = general_name {
                        subject_dns_names.push(dns_name.to_string());
                    }
                }
            }
        }

        let not_before = to_datetime(cert.validity().not_before.timestamp())?;
        let not_after = to_datetime(cert.validity().not_after.timestamp())?;

        Ok(CertificateAttributes {
            fingerprint_sha256: fingerprint_sha256(der),
            subject_organization_name,
            subject_common_names,
            subject_dns_names,
            issuer_common_name,
            serial_number: cert.raw_serial_as_string(),
            not_before,
            not_after,
            raw: base64::engine::general_purpose::STANDARD.encode(der),
        })
    }
}

impl AttributeParser for X509AttributeParser {
    fn parse(&self, der: &[u8], source: &str) -> Option<CertificateAttributes> {
        match Self::extract(der) {
            Ok(attributes) => Some(attributes),
            Err(e) => {
                debug!("{}: {}", source, e);
                None
            }
        }
    }
}

fn to_datetime(timestamp: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| anyhow::anyhow!("Validity timestamp out of range: {}", timestamp))
}

/// Lowercase hex SHA-256 of the DER bytes
pub fn fingerprint_sha256(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}

/// Check that bytes still decode as an X.509 certificate
pub fn validate_der(der: &[u8]) -> anyhow::Result<()> {
    X509Certificate::from_der(der)
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Not a valid X.509 certificate: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ct_log::leaf::test_support::{precert_extra_b64, precert_leaf_b64, x509_leaf_b64};
    use crate::ct_log::leaf::{decode_leaf_input, extract_certificate};

    const EXAMPLE_DER: &[u8] = include_bytes!("../tests/fixtures/example.der");
    const EXAMPLE_SHA256: &str =
        "b2e261ed00b180e5db69101e45dcb4b792efbdee857ddd5925d7648e3a10d718";

    #[test]
    fn test_extract_attributes_from_real_certificate() {
        let attrs = X509AttributeParser::new()
            .parse(EXAMPLE_DER, "test_log")
            .unwrap();

        assert_eq!(attrs.fingerprint_sha256, EXAMPLE_SHA256);
        assert_eq!(attrs.subject_organization_name, vec!["Example Inc".to_string()]);
        assert_eq!(attrs.subject_common_names, vec!["www.example.com".to_string()]);
        assert_eq!(
            attrs.subject_dns_names,
            vec![
                "www.example.com".to_string(),
                "example.com".to_string(),
                "api.example.com".to_string(),
            ]
        );
        assert_eq!(attrs.issuer_common_name, vec!["www.example.com".to_string()]);
        assert_eq!(attrs.serial_number, "10:01");
        assert_eq!(attrs.not_before.timestamp(), 1792262624);
        assert_eq!(attrs.not_after.timestamp(), 2107622624);
        assert_eq!(
            attrs.raw,
            base64::engine::general_purpose::STANDARD.encode(EXAMPLE_DER)
        );
    }

    #[test]
    fn test_x509_entry_keeps_certificate_fingerprint() {
        let header = decode_leaf_input(&x509_leaf_b64(EXAMPLE_DER)).unwrap();
        let der = extract_certificate(&header, None, false).unwrap().unwrap();

        let attrs = X509AttributeParser::new().parse(&der, "test_log").unwrap();
        assert_eq!(attrs.fingerprint_sha256, EXAMPLE_SHA256);
    }

    #[test]
    fn test_precert_trailing_byte_excluded_from_fingerprint_and_raw() {
        let header = decode_leaf_input(&precert_leaf_b64()).unwrap();
        let extra = precert_extra_b64(EXAMPLE_DER, &[0, 0, 0]);
        let slice = extract_certificate(&header, Some(&extra), true)
            .unwrap()
            .unwrap();
        assert_eq!(slice.len(), EXAMPLE_DER.len() + 1);

        let attrs = X509AttributeParser::new().parse(&slice, "test_log").unwrap();
        assert_eq!(attrs.fingerprint_sha256, EXAMPLE_SHA256);

        let raw = base64::engine::general_purpose::STANDARD
            .decode(&attrs.raw)
            .unwrap();
        assert_eq!(raw, EXAMPLE_DER);
        assert!(validate_der(&raw).is_ok());
    }

    #[test]
    fn test_fingerprint_is_lowercase_hex_sha256() {
        assert_eq!(
            fingerprint_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        let parser = X509AttributeParser::new();
        assert!(parser.parse(b"not a certificate", "test_log").is_none());
        assert!(parser.parse(&[], "test_log").is_none());
    }

    #[test]
    fn test_validate_der_rejects_garbage() {
        assert!(validate_der(&[0x30, 0x03, 0x01, 0x01, 0xFF]).is_err());
    }
}
