//! OpenSSL-backed TLS negotiation.

use std::pin::Pin;

use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::X509;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;
use tracing::debug;

use super::policy::{TlsPolicy, TlsVersion};
use crate::core::{ClientIdentity, ConnectError, IdentityError};

impl From<TlsVersion> for SslVersion {
    fn from(v: TlsVersion) -> Self {
        match v {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

fn tls_error(e: ErrorStack) -> ConnectError {
    ConnectError::Tls(e.to_string())
}

fn invalid_identity(e: impl std::fmt::Display) -> ConnectError {
    ConnectError::Identity(IdentityError::Invalid(e.to_string()))
}

/// Build a connector for `policy`, presenting `identity` when given.
pub(crate) fn connector(
    policy: &TlsPolicy,
    identity: Option<&ClientIdentity>,
) -> Result<SslConnector, ConnectError> {
    let mut builder = SslConnector::builder(SslMethod::tls_client()).map_err(tls_error)?;

    builder
        .set_min_proto_version(Some(policy.min_version.into()))
        .map_err(tls_error)?;
    builder
        .set_max_proto_version(policy.max_version.map(Into::into))
        .map_err(tls_error)?;
    builder
        .set_cipher_list(&policy.cipher_string())
        .map_err(tls_error)?;

    if policy.accept_any_server_certificate {
        builder.set_verify(SslVerifyMode::NONE);
    } else {
        builder.set_verify(SslVerifyMode::PEER);
        if let Some(pem) = &policy.pinned_ca_pem {
            let certs = X509::stack_from_pem(pem.as_bytes()).map_err(tls_error)?;
            for cert in certs {
                builder.cert_store_mut().add_cert(cert).map_err(tls_error)?;
            }
        }
    }

    if let Some(identity) = identity {
        apply_identity(&mut builder, identity)?;
    }

    Ok(builder.build())
}

fn apply_identity(
    builder: &mut SslConnectorBuilder,
    identity: &ClientIdentity,
) -> Result<(), ConnectError> {
    match identity {
        ClientIdentity::Pem {
            certificate_chain,
            private_key,
        } => {
            let mut chain = X509::stack_from_pem(certificate_chain)
                .map_err(invalid_identity)?
                .into_iter();
            let leaf = chain
                .next()
                .ok_or_else(|| invalid_identity("empty certificate chain"))?;
            let key = PKey::private_key_from_pem(private_key).map_err(invalid_identity)?;

            builder.set_certificate(&leaf).map_err(tls_error)?;
            for cert in chain {
                builder.add_extra_chain_cert(cert).map_err(tls_error)?;
            }
            builder.set_private_key(&key).map_err(tls_error)?;
        }
        ClientIdentity::Pkcs12 { der, password } => {
            let parsed = Pkcs12::from_der(der)
                .and_then(|p| p.parse2(password))
                .map_err(invalid_identity)?;
            let (Some(cert), Some(key)) = (parsed.cert, parsed.pkey) else {
                return Err(invalid_identity("bundle lacks a certificate or key"));
            };

            builder.set_certificate(&cert).map_err(tls_error)?;
            builder.set_private_key(&key).map_err(tls_error)?;
            if let Some(ca) = parsed.ca {
                for cert in ca {
                    builder.add_extra_chain_cert(cert).map_err(tls_error)?;
                }
            }
        }
    }
    builder.check_private_key().map_err(invalid_identity)
}

/// Run the client handshake over a connected TCP stream.
pub(crate) async fn handshake(
    connector: &SslConnector,
    policy: &TlsPolicy,
    host: &str,
    stream: TcpStream,
) -> Result<SslStream<TcpStream>, ConnectError> {
    let mut config = connector.configure().map_err(tls_error)?;
    if policy.accept_any_server_certificate {
        config.set_verify_hostname(false);
    }
    let ssl = config.into_ssl(host).map_err(tls_error)?;

    let mut stream = SslStream::new(ssl, stream).map_err(tls_error)?;
    Pin::new(&mut stream)
        .connect()
        .await
        .map_err(|e| ConnectError::Tls(e.to_string()))?;

    let ssl = stream.ssl();
    debug!(
        host,
        version = ssl.version_str(),
        cipher = ssl.current_cipher().map(|c| c.name()).unwrap_or("none"),
        "tls handshake complete"
    );
    Ok(stream)
}

/// Self-signed server material for loopback TLS tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::pin::Pin;

    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, Private};
    use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
    use openssl::x509::{X509NameBuilder, X509};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_openssl::SslStream;

    /// Certificate and key for `CN=localhost`.
    pub(crate) fn self_signed() -> (X509, PKey<Private>) {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "localhost").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        (builder.build(), key)
    }

    /// Bind a loopback listener and return it with an acceptor for it.
    pub(crate) async fn server() -> (TcpListener, SslAcceptor, X509) {
        let (cert, key) = self_signed();
        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor.set_private_key(&key).unwrap();
        acceptor.set_certificate(&cert).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        (listener, acceptor.build(), cert)
    }

    /// Accept one TLS connection.
    pub(crate) async fn accept(
        listener: &TcpListener,
        acceptor: &SslAcceptor,
    ) -> SslStream<TcpStream> {
        let (tcp, _) = listener.accept().await.unwrap();
        let ssl = Ssl::new(acceptor.context()).unwrap();
        let mut stream = SslStream::new(ssl, tcp).unwrap();
        Pin::new(&mut stream).accept().await.unwrap();
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{accept, self_signed, server};
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn connect_with(policy: TlsPolicy) -> Result<SslStream<TcpStream>, ConnectError> {
        let (listener, acceptor, _) = server().await;
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut stream = accept(&listener, &acceptor).await;
            stream.write_all(b"ok").await.unwrap();
            stream.flush().await.unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });

        let connector = connector(&policy, None)?;
        let tcp = TcpStream::connect(("127.0.0.1", port)).await?;
        handshake(&connector, &policy, "localhost", tcp).await
    }

    #[tokio::test]
    async fn test_strict_accepts_self_signed_by_default() {
        let mut stream = connect_with(TlsPolicy::strict()).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");
    }

    #[tokio::test]
    async fn test_legacy_negotiates_with_modern_server() {
        let stream = connect_with(TlsPolicy::legacy()).await.unwrap();
        assert!(stream.ssl().version2().is_some());
    }

    #[tokio::test]
    async fn test_verification_rejects_unknown_ca() {
        let policy = TlsPolicy::strict().verify_server(None);
        let err = connect_with(policy).await.unwrap_err();
        assert!(matches!(err, ConnectError::Tls(_)));
    }

    #[tokio::test]
    async fn test_pinned_ca_accepts_matching_server() {
        let (listener, acceptor, cert) = server().await;
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _stream = accept(&listener, &acceptor).await;
        });

        let pem = String::from_utf8(cert.to_pem().unwrap()).unwrap();
        let policy = TlsPolicy::strict().verify_server(Some(pem));
        let connector = connector(&policy, None).unwrap();
        let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        handshake(&connector, &policy, "localhost", tcp).await.unwrap();
    }

    #[test]
    fn test_pem_identity_loads() {
        let (cert, key) = self_signed();
        let identity = ClientIdentity::Pem {
            certificate_chain: cert.to_pem().unwrap(),
            private_key: key.private_key_to_pem_pkcs8().unwrap(),
        };
        connector(&TlsPolicy::strict(), Some(&identity)).unwrap();
    }

    #[test]
    fn test_pkcs12_identity_loads() {
        let (cert, key) = self_signed();
        let der = Pkcs12::builder()
            .name("client")
            .pkey(&key)
            .cert(&cert)
            .build2("secret")
            .unwrap()
            .to_der()
            .unwrap();

        let identity = ClientIdentity::Pkcs12 {
            der: der.clone(),
            password: "secret".into(),
        };
        connector(&TlsPolicy::legacy(), Some(&identity)).unwrap();

        let wrong = ClientIdentity::Pkcs12 {
            der,
            password: "nope".into(),
        };
        let err = connector(&TlsPolicy::legacy(), Some(&wrong)).unwrap_err();
        assert!(matches!(err, ConnectError::Identity(IdentityError::Invalid(_))));
    }

    #[test]
    fn test_garbage_identity_rejected() {
        let identity = ClientIdentity::Pem {
            certificate_chain: b"not a cert".to_vec(),
            private_key: b"not a key".to_vec(),
        };
        let err = connector(&TlsPolicy::strict(), Some(&identity)).unwrap_err();
        assert!(!err.is_retryable());
    }
}
