//! Optional on-disk copies of stored certificates

use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::cert_parser::validate_der;

/// Whether stored certificates are also written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadMethod {
    #[default]
    DbAndSave,
    DbOnly,
}

/// On-disk certificate encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Pem,
    /// Binary DER
    Asn1,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Pem => "pem",
            SaveFormat::Asn1 => "der",
        }
    }
}

/// Writes certificates to `{save_location}/ct_{source}/{index}.{pem|der}`
#[derive(Debug, Clone)]
pub struct CertificateExporter {
    directory: PathBuf,
    format: SaveFormat,
}

impl CertificateExporter {
    /// Create the per-source directory if it does not exist yet
    pub async fn prepare(save_location: &Path, source: &str, format: SaveFormat) -> Result<Self> {
        let directory = save_location.join(format!("ct_{}", source));

        if !directory.exists() {
            fs::create_dir_all(&directory)
                .await
                .with_context(|| format!("Failed to create {}", directory.display()))?;
            info!("Created certificate directory {}", directory.display());
        }

        Ok(Self { directory, format })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Re-encode the stored base64 DER and write it under the log index
    pub async fn write(&self, raw: &str, index: u64) -> Result<PathBuf> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .context("Stored certificate is not valid base64")?;
        validate_der(&der)?;

        let contents = match self.format {
            SaveFormat::Pem => to_pem(&der).into_bytes(),
            SaveFormat::Asn1 => der,
        };

        let path = self
            .directory
            .join(format!("{}.{}", index, self.format.extension()));

        fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}

/// PEM armor with 64-column base64 lines
pub fn to_pem(der: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}
