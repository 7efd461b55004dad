use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    SanType,
};
use time::OffsetDateTime;

use super::types::{CaCertificate, LeafCertificate, TlsError, TlsErrorKind};

const ONE_DAY_SECS: i64 = 24 * 60 * 60;
const DEFAULT_VALIDITY_SECS: i64 = 365 * ONE_DAY_SECS;

/// Forges a server certificate for `host` signed by `ca`, valid from
/// yesterday until `validity` from now.
pub fn generate_leaf_cert(
    host: &str,
    ca: &CaCertificate,
    validity: Duration,
) -> Result<LeafCertificate, TlsError> {
    let mut params = CertificateParams::new(Vec::new());
    params.is_ca = IsCa::NoCa;
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, host);
    params.distinguished_name = dn;

    if let Ok(ip) = host.parse::<IpAddr>() {
        params.subject_alt_names.push(SanType::IpAddress(ip));
    } else {
        params
            .subject_alt_names
            .push(SanType::DnsName(host.to_string()));
    }

    // X.509 times have whole-second precision; the recorded expiry matches
    // the encoded notAfter exactly.
    let now = Utc::now().timestamp();
    let validity = i64::try_from(validity.as_secs()).unwrap_or(DEFAULT_VALIDITY_SECS);
    let not_after = DateTime::<Utc>::from_timestamp(now.saturating_add(validity), 0)
        .ok_or_else(|| TlsError::new(TlsErrorKind::Issuer, "leaf validity out of range"))?;
    params.not_before = to_offset(now - ONE_DAY_SECS)?;
    params.not_after = to_offset(not_after.timestamp())?;

    let cert = Certificate::from_params(params)?;

    let cert_pem = cert.serialize_pem_with_signer(&ca.cert)?.into_bytes();
    let key_pem = cert.serialize_private_key_pem().into_bytes();

    Ok(LeafCertificate {
        cert_pem,
        key_pem,
        not_after,
    })
}

fn to_offset(unix_secs: i64) -> Result<OffsetDateTime, TlsError> {
    OffsetDateTime::from_unix_timestamp(unix_secs)
        .map_err(|err| TlsError::new(TlsErrorKind::Issuer, err.to_string()))
}
