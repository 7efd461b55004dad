use openssl::pkey::PKey;
use openssl::ssl::{
    AlpnError, SslAcceptor, SslConnector, SslMethod, SslOptions, SslVerifyMode, select_next_proto,
};
use openssl::x509::X509;

use super::types::{LeafCertificate, TlsError};

const HTTP1_ALPN: &[u8] = b"\x08http/1.1";

/// Server side of an intercepted connection, presenting the forged leaf.
/// Only HTTP/1.1 is offered through ALPN.
pub fn build_acceptor(leaf: &LeafCertificate) -> Result<SslAcceptor, TlsError> {
    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())?;
    builder.set_options(SslOptions::NO_SSLV2 | SslOptions::NO_SSLV3);

    let cert = X509::from_pem(&leaf.cert_pem)?;
    let key = PKey::private_key_from_pem(&leaf.key_pem)?;
    builder.set_certificate(&cert)?;
    builder.set_private_key(&key)?;
    builder.check_private_key()?;

    builder.set_alpn_select_callback(|_, client| {
        select_next_proto(HTTP1_ALPN, client).ok_or(AlpnError::NOACK)
    });
    builder.set_verify(SslVerifyMode::NONE);

    Ok(builder.build())
}

/// Client side for upstream TLS. Verifies against the system store plus any
/// extra PEM roots.
pub fn build_connector(extra_roots_pem: &[Vec<u8>]) -> Result<SslConnector, TlsError> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_default_verify_paths()?;
    for pem in extra_roots_pem {
        for cert in X509::stack_from_pem(pem)? {
            builder.cert_store_mut().add_cert(cert)?;
        }
    }
    builder.set_alpn_protos(HTTP1_ALPN)?;
    Ok(builder.build())
}
