use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context};
use rumqttc::{MqttOptions, Transport};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use tracing::{debug, warn};

use irmqtt_common::DeviceConfig;

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TLS_PORT: u16 = 8883;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    /// Accepts `host`, `host:port`, `[v6addr]:port`, and `mqtt://` / `mqtts://` URLs.
    /// A bare IPv6 address without brackets takes the default port.
    pub fn parse(server: &str) -> anyhow::Result<Self> {
        let server = server.trim().trim_end_matches('/');
        let (rest, tls) = if let Some(rest) = server.strip_prefix("mqtts://") {
            (rest, true)
        } else if let Some(rest) = server.strip_prefix("mqtt://") {
            (rest, false)
        } else if let Some(rest) = server.strip_prefix("tcp://") {
            (rest, false)
        } else {
            (server, false)
        };

        let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT };
        let parse_port = |port: &str| {
            port.parse::<u16>()
                .with_context(|| format!("invalid mqtt port in '{server}'"))
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .with_context(|| format!("unterminated IPv6 address in '{server}'"))?;
            let port = match tail {
                "" => default_port,
                _ => match tail.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => bail!("unexpected '{tail}' after IPv6 address in '{server}'"),
                },
            };
            (host, port)
        } else if rest.matches(':').count() > 1 {
            (rest, default_port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (rest, default_port),
            }
        };

        if host.is_empty() {
            bail!("mqtt server '{server}' has no host");
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub ca: Option<Vec<u8>>,
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
    pub verify_server: bool,
}

/// Everything needed to open the broker connection, read once at start-up.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub address: BrokerAddress,
    pub client_id: String,
    pub keepalive: Option<Duration>,
    pub credentials: Option<(String, String)>,
    pub tls: Option<TlsMaterial>,
}

pub fn build_connection_options(config: &DeviceConfig) -> anyhow::Result<ConnectionOptions> {
    let mqtt = &config.mqtt;
    let address = BrokerAddress::parse(&mqtt.server)?;

    // Config validation only admits version 4, which is the client's only protocol.
    if let Some(version) = mqtt.version {
        debug!("using mqtt protocol version {version}");
    }

    let keepalive = mqtt.keepalive.map(|secs| {
        debug!("using mqtt keepalive: {secs}s");
        Duration::from_secs(secs)
    });

    let ca = match &mqtt.ca {
        Some(path) => {
            debug!("mqtt tls: path to CA certificate = {}", path.display());
            Some(read_material(path, "CA certificate")?)
        }
        None => None,
    };

    let client_auth = match (&mqtt.cert, &mqtt.key) {
        (Some(cert), Some(key)) => {
            debug!("mqtt tls: path to client key = {}", key.display());
            debug!("mqtt tls: path to client certificate = {}", cert.display());
            Some((
                read_material(cert, "client certificate")?,
                read_material(key, "client key")?,
            ))
        }
        _ => None,
    };

    let credentials = match (&mqtt.username, &mqtt.password) {
        (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
        _ => None,
    };

    let client_id = match &mqtt.client_id {
        Some(id) => {
            debug!("using mqtt client id: '{id}'");
            id.clone()
        }
        None => default_client_id(&mqtt.prefix),
    };

    let verify_server = mqtt.reject_unauthorized != Some(false);
    if !verify_server {
        debug!("mqtt reject_unauthorized set false, ignoring certificate warnings");
    }

    let tls = if address.tls || ca.is_some() || client_auth.is_some() {
        Some(TlsMaterial {
            ca,
            client_auth,
            verify_server,
        })
    } else {
        None
    };

    Ok(ConnectionOptions {
        address,
        client_id,
        keepalive,
        credentials,
        tls,
    })
}

impl ConnectionOptions {
    pub fn mqtt_options(&self) -> anyhow::Result<MqttOptions> {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.address.host.clone(),
            self.address.port,
        );

        if let Some(keepalive) = self.keepalive {
            options.set_keep_alive(keepalive);
        }
        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user.clone(), pass.clone());
        }
        if let Some(tls) = &self.tls {
            options.set_transport(Transport::tls_with_config(rustls_config(tls)?.into()));
        }

        Ok(options)
    }
}

fn read_material(path: &Path, what: &str) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read mqtt {what} {}", path.display()))
}

fn default_client_id(prefix: &str) -> String {
    let slug: String = prefix
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("irmqtt-{slug}")
}

fn rustls_config(tls: &TlsMaterial) -> anyhow::Result<ClientConfig> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .context("failed to select tls protocol versions")?;

    let builder = if tls.verify_server {
        builder.with_root_certificates(root_store(tls.ca.as_deref())?)
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
    };

    let config = match &tls.client_auth {
        Some((cert, key)) => {
            let chain = parse_certificates(cert).context("invalid mqtt client certificate")?;
            let key = PrivateKeyDer::from_pem_slice(key)
                .map_err(|err| anyhow!("invalid mqtt client key: {err}"))?;
            builder
                .with_client_auth_cert(chain, key)
                .context("mqtt client certificate and key do not match")?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}

fn root_store(ca: Option<&[u8]>) -> anyhow::Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match ca {
        Some(pem) => {
            let certs = parse_certificates(pem).context("invalid mqtt CA certificate")?;
            let (added, ignored) = roots.add_parsable_certificates(certs);
            if added == 0 {
                bail!("mqtt CA file contains no usable certificates ({ignored} rejected)");
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                warn!("failed to load a platform certificate: {err}");
            }
            roots.add_parsable_certificates(native.certs);
        }
    }
    Ok(roots)
}

fn parse_certificates(pem: &[u8]) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("{err}"))?;
    if certs.is_empty() {
        bail!("no PEM certificates found");
    }
    Ok(certs)
}

/// Installed when `reject_unauthorized` is false: any server certificate passes,
/// handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use irmqtt_common::{MqttConfig, TargetMode};

    use super::*;

    fn device(mqtt: MqttConfig) -> DeviceConfig {
        DeviceConfig {
            display_name: "Bedroom".to_string(),
            default_temperature: 24,
            target_modes: vec![TargetMode::Cool],
            mqtt,
        }
    }

    fn mqtt(server: &str) -> MqttConfig {
        MqttConfig {
            server: server.to_string(),
            prefix: "home/ir/bedroom".to_string(),
            ..MqttConfig::default()
        }
    }

    fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("irmqtt-options-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_server_forms() {
        assert_eq!(
            BrokerAddress::parse("broker.local").unwrap(),
            BrokerAddress {
                host: "broker.local".to_string(),
                port: 1883,
                tls: false
            }
        );
        assert_eq!(BrokerAddress::parse("mqtt://10.0.0.2:1884").unwrap().port, 1884);

        let secure = BrokerAddress::parse("mqtts://broker.local").unwrap();
        assert!(secure.tls);
        assert_eq!(secure.port, 8883);

        let v6 = BrokerAddress::parse("mqtt://[::1]:1884").unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 1884);
        assert_eq!(BrokerAddress::parse("[fe80::2]").unwrap().port, 1883);
        let bare_v6 = BrokerAddress::parse("::1").unwrap();
        assert_eq!(bare_v6.host, "::1");
        assert_eq!(bare_v6.port, 1883);
        assert!(BrokerAddress::parse("[::1").is_err());

        assert!(BrokerAddress::parse("broker:http").is_err());
        assert!(BrokerAddress::parse("mqtt://:1883").is_err());
    }

    #[test]
    fn absent_keys_leave_transport_defaults() {
        let options = build_connection_options(&device(mqtt("broker"))).unwrap();

        assert_eq!(options.client_id, "irmqtt-home-ir-bedroom");
        assert_eq!(options.keepalive, None);
        assert!(options.credentials.is_none());
        assert!(options.tls.is_none());
        assert!(options.mqtt_options().is_ok());
    }

    #[test]
    fn protocol_version_4_builds_default_client() {
        let mut config = mqtt("broker");
        config.version = Some(4);

        let options = build_connection_options(&device(config)).unwrap();

        assert!(options.tls.is_none());
        assert!(options.mqtt_options().is_ok());
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut config = mqtt("broker");
        config.username = Some("ac".to_string());
        let options = build_connection_options(&device(config.clone())).unwrap();
        assert!(options.credentials.is_none());

        config.password = Some("secret".to_string());
        config.client_id = Some("bedroom-ac".to_string());
        config.keepalive = Some(15);
        let options = build_connection_options(&device(config)).unwrap();
        assert_eq!(
            options.credentials,
            Some(("ac".to_string(), "secret".to_string()))
        );
        assert_eq!(options.client_id, "bedroom-ac");
        assert_eq!(options.keepalive, Some(Duration::from_secs(15)));
    }

    #[test]
    fn missing_ca_file_is_fatal() {
        let mut config = mqtt("broker");
        config.ca = Some(PathBuf::from("/nonexistent/irmqtt/ca.pem"));

        let err = build_connection_options(&device(config)).unwrap_err();
        assert!(format!("{err:#}").contains("CA certificate"));
    }

    #[test]
    fn ca_file_enables_tls() {
        let mut config = mqtt("broker");
        config.ca = Some(scratch_file("ca.pem", b"not a certificate"));
        config.reject_unauthorized = Some(false);

        let options = build_connection_options(&device(config)).unwrap();
        let tls = options.tls.as_ref().unwrap();

        assert_eq!(tls.ca.as_deref(), Some(&b"not a certificate"[..]));
        assert!(!tls.verify_server);
    }

    #[test]
    fn garbage_ca_is_rejected_when_verifying() {
        let tls = TlsMaterial {
            ca: Some(b"not a certificate".to_vec()),
            client_auth: None,
            verify_server: true,
        };

        assert!(rustls_config(&tls).is_err());
    }

    #[test]
    fn unverified_tls_builds_without_roots() {
        let tls = TlsMaterial {
            ca: None,
            client_auth: None,
            verify_server: false,
        };

        assert!(rustls_config(&tls).is_ok());
    }
}
