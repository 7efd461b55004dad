use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{Datelike, Utc};
use openssl::x509::X509;
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose};

use super::cert::generate_leaf_cert;
use super::types::{
    CaCertificate, CaMaterial, CaMaterialPaths, LeafCertificate, TlsError, TlsErrorKind,
};

const DEFAULT_CA_VALIDITY_DAYS: i64 = 3 * 365;
const CA_CERT_FILE: &str = "relaygate-ca.pem";
const CA_KEY_FILE: &str = "relaygate-ca-key.pem";

/// Signs leaf certificates for intercepted hosts.
pub trait LeafIssuer: Send + Sync {
    fn issue_leaf(&self, host: &str, validity: Duration) -> Result<LeafCertificate, TlsError>;
}

impl LeafIssuer for CaCertificate {
    fn issue_leaf(&self, host: &str, validity: Duration) -> Result<LeafCertificate, TlsError> {
        generate_leaf_cert(host, self, validity)
    }
}

pub fn generate_ca(common_name: &str) -> Result<CaCertificate, TlsError> {
    let mut params = CertificateParams::new(Vec::new());
    params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "relaygate");
    params.distinguished_name = dn;

    let yesterday = Utc::now() - chrono::Duration::days(1);
    let until = Utc::now() + chrono::Duration::days(DEFAULT_CA_VALIDITY_DAYS);
    params.not_before =
        rcgen::date_time_ymd(yesterday.year(), yesterday.month() as u8, yesterday.day() as u8);
    params.not_after = rcgen::date_time_ymd(until.year(), until.month() as u8, until.day() as u8);

    let cert = Certificate::from_params(params)?;

    let cert_pem = cert.serialize_pem()?.into_bytes();
    let cert_der = cert.serialize_der()?;
    let key_pem = cert.serialize_private_key_pem().into_bytes();
    let key_der = cert.serialize_private_key_der();

    Ok(CaCertificate {
        material: CaMaterial {
            cert_pem,
            key_pem,
            cert_der,
            key_der,
        },
        cert,
    })
}

/// Rebuilds a signing CA from PEM material written by [`write_ca_to_dir`].
pub fn load_ca(cert_pem: &[u8], key_pem: &[u8]) -> Result<CaCertificate, TlsError> {
    let cert_text = std::str::from_utf8(cert_pem)
        .map_err(|err| TlsError::new(TlsErrorKind::Rcgen, err.to_string()))?;
    let key_text = std::str::from_utf8(key_pem)
        .map_err(|err| TlsError::new(TlsErrorKind::Rcgen, err.to_string()))?;

    let key_pair = KeyPair::from_pem(key_text)?;
    let params = CertificateParams::from_ca_cert_pem(cert_text, key_pair)?;
    let cert = Certificate::from_params(params)?;

    let cert_der = X509::from_pem(cert_pem)?.to_der()?;
    let key_der = cert.serialize_private_key_der();

    Ok(CaCertificate {
        material: CaMaterial {
            cert_pem: cert_pem.to_vec(),
            key_pem: key_pem.to_vec(),
            cert_der,
            key_der,
        },
        cert,
    })
}

/// Loads the root from `dir`, or generates and persists a new one when
/// none exists yet. An existing root is never replaced.
pub fn load_or_generate_ca(
    dir: impl AsRef<Path>,
    common_name: &str,
) -> Result<(CaCertificate, CaMaterialPaths), TlsError> {
    let dir = dir.as_ref();
    let paths = ca_paths(dir);
    if paths.cert_path.exists() && paths.key_path.exists() {
        let cert_pem = fs::read(&paths.cert_path)
            .map_err(|err| TlsError::new(TlsErrorKind::Io, err.to_string()))?;
        let key_pem = fs::read(&paths.key_path)
            .map_err(|err| TlsError::new(TlsErrorKind::Io, err.to_string()))?;
        let ca = load_ca(&cert_pem, &key_pem)?;
        tracing::debug!(path = %paths.cert_path.display(), "loaded root CA");
        return Ok((ca, paths));
    }

    let ca = generate_ca(common_name)?;
    let paths = write_ca_to_dir(dir, &ca.material)?;
    tracing::info!(path = %paths.cert_path.display(), "generated new root CA");
    Ok((ca, paths))
}

pub fn write_ca_to_dir(
    dir: impl AsRef<Path>,
    material: &CaMaterial,
) -> Result<CaMaterialPaths, TlsError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|err| TlsError::new(TlsErrorKind::Io, err.to_string()))?;

    let paths = ca_paths(dir);
    fs::write(&paths.cert_path, &material.cert_pem)
        .map_err(|err| TlsError::new(TlsErrorKind::Io, err.to_string()))?;
    fs::write(&paths.key_path, &material.key_pem)
        .map_err(|err| TlsError::new(TlsErrorKind::Io, err.to_string()))?;

    Ok(paths)
}

fn ca_paths(dir: &Path) -> CaMaterialPaths {
    CaMaterialPaths {
        cert_path: dir.join(CA_CERT_FILE),
        key_path: dir.join(CA_KEY_FILE),
    }
}
