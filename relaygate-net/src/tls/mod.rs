mod ca;
mod cache;
mod cert;
mod openssl;
mod types;

pub use ca::{LeafIssuer, generate_ca, load_ca, load_or_generate_ca, write_ca_to_dir};
pub use cache::LeafCache;
pub use cert::generate_leaf_cert;
pub use openssl::{build_acceptor, build_connector};
pub use types::{
    CaCertificate, CaMaterial, CaMaterialPaths, LeafCertificate, TlsError, TlsErrorKind,
};
