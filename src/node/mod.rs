//! Client for users' own LND nodes (REST).
//!
//! Each user brings their own host, macaroon and TLS certificate, so the
//! HTTP client is built per call.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Certificate, Client, Proxy};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::database::LndParams;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";
const PEM_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const MAX_ERROR_BODY: usize = 300;

/// LND invoice state for an unpaid invoice.
pub const STATE_OPEN: &str = "OPEN";
pub const STATE_SETTLED: &str = "SETTLED";

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("call to lnd failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid root certificate")]
    InvalidCertificate,

    #[error("invalid hash")]
    InvalidHash,

    #[error("invalid node parameters: {0}")]
    InvalidParams(&'static str),
}

/// Invoice created on a user's node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInvoice {
    pub payment_request: String,
    /// `r_hash` as LND returns it (base64).
    pub r_hash: String,
    pub status: String,
}

impl NodeInvoice {
    /// Payment hash as hex, the form LND expects in URLs.
    pub fn hash_hex(&self) -> Result<String, NodeError> {
        let raw = BASE64
            .decode(self.r_hash.as_bytes())
            .map_err(|_| NodeError::InvalidHash)?;
        Ok(hex::encode(raw))
    }

    pub fn is_settled(&self) -> bool {
        self.status == STATE_SETTLED
    }
}

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
    payment_request: String,
    r_hash: String,
}

#[derive(Debug, Deserialize)]
struct LookupInvoiceResponse {
    state: String,
}

#[derive(Clone, Default)]
pub struct NodeClient {
    proxy: Option<String>,
}

impl NodeClient {
    /// `proxy` is used for every node that isn't on localhost.
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            proxy: proxy.filter(|p| !p.is_empty()),
        }
    }

    fn http_for(&self, params: &LndParams) -> Result<Client, NodeError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(10));

        builder = if params.cert.is_empty() {
            builder.danger_accept_invalid_certs(true)
        } else {
            let cert = Certificate::from_pem(params.cert.as_bytes())
                .map_err(|_| NodeError::InvalidCertificate)?;
            builder.add_root_certificate(cert)
        };

        if let Some(proxy) = &self.proxy
            && !is_local(&params.host)
        {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        Ok(builder.build()?)
    }

    /// `POST /v1/invoices` on the user's node.
    pub async fn get_invoice(
        &self,
        params: &LndParams,
        amount_sat: i64,
        memo: &str,
    ) -> Result<NodeInvoice, NodeError> {
        let http = self.http_for(params)?;
        let response = http
            .post(format!("{}/v1/invoices", params.host.trim_end_matches('/')))
            .header(MACAROON_HEADER, macaroon_hex(&params.macaroon))
            .json(&json!({ "value_msat": amount_sat * 1000, "memo": memo }))
            .send()
            .await?;

        let created: AddInvoiceResponse = check_status(response).await?.json().await?;
        debug!("Node {} created invoice {}", params.host, created.r_hash);

        Ok(NodeInvoice {
            payment_request: created.payment_request,
            r_hash: created.r_hash,
            status: STATE_OPEN.to_string(),
        })
    }

    /// `GET /v1/invoice/{r_hash_hex}`; returns the invoice with its
    /// current state.
    pub async fn check_invoice(
        &self,
        params: &LndParams,
        invoice: &NodeInvoice,
    ) -> Result<NodeInvoice, NodeError> {
        let mut url = url::Url::parse(&format!(
            "{}/v1/invoice/{}",
            params.host.trim_end_matches('/'),
            invoice.hash_hex()?
        ))
        .map_err(|_| NodeError::InvalidParams("host is not a URL"))?;
        url.set_scheme("https")
            .map_err(|_| NodeError::InvalidParams("host must be https"))?;

        let http = self.http_for(params)?;
        let response = http
            .get(url)
            .header(MACAROON_HEADER, macaroon_hex(&params.macaroon))
            .send()
            .await?;

        let lookup: LookupInvoiceResponse = check_status(response).await?.json().await?;
        Ok(NodeInvoice {
            status: lookup.state,
            ..invoice.clone()
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY)
        .collect();
    warn!("LND request failed ({}): {}", status, body);
    Err(NodeError::Api {
        status: status.as_u16(),
        body,
    })
}

fn is_local(host: &str) -> bool {
    host.starts_with("https://127.0.0.1") || host.starts_with("https://localhost")
}

/// LND wants the macaroon hex encoded; base64 input is converted.
pub fn macaroon_hex(macaroon: &str) -> String {
    if macaroon.chars().all(|c| c.is_ascii_hexdigit()) {
        return macaroon.to_string();
    }
    match BASE64.decode(macaroon.as_bytes()) {
        Ok(raw) => hex::encode(raw),
        Err(_) => macaroon.to_string(),
    }
}

/// Accept a certificate as PEM, hex of PEM or base64 of PEM.
pub fn parse_certificate_to_pem(cert: &str) -> Option<String> {
    let cert = cert.trim();
    if cert.contains(PEM_MARKER) {
        return Some(cert.to_string());
    }

    let decoded = hex::decode(cert).or_else(|_| BASE64.decode(cert)).ok()?;
    let pem = String::from_utf8(decoded).ok()?;
    pem.contains(PEM_MARKER).then_some(pem)
}

/// Parse `<host> <macaroon> <cert>` as typed after `/node add`.
pub fn parse_node_params(args: &[&str]) -> Result<LndParams, NodeError> {
    let [host, macaroon, cert] = args else {
        return Err(NodeError::InvalidParams("use <host> <macaroon> <cert>"));
    };

    let host = if host.starts_with("https://") || host.starts_with("http://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    url::Url::parse(&host).map_err(|_| NodeError::InvalidParams("host wrong format"))?;

    let cert = parse_certificate_to_pem(cert).ok_or(NodeError::InvalidCertificate)?;

    Ok(LndParams {
        host,
        macaroon: macaroon.to_string(),
        cert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    #[test]
    fn test_certificate_formats() {
        assert_eq!(parse_certificate_to_pem(PEM).as_deref(), Some(PEM.trim()));
        assert_eq!(parse_certificate_to_pem(&hex::encode(PEM)).as_deref(), Some(PEM));
        assert_eq!(parse_certificate_to_pem(&BASE64.encode(PEM)).as_deref(), Some(PEM));
        assert!(parse_certificate_to_pem("not a cert").is_none());
        assert!(parse_certificate_to_pem(&hex::encode("hello")).is_none());
    }

    #[test]
    fn test_macaroon_encoding() {
        assert_eq!(macaroon_hex("0201036c6e64"), "0201036c6e64");
        assert_eq!(macaroon_hex(&BASE64.encode([0x02, 0x01, 0xff])), "0201ff");
    }

    #[test]
    fn test_hash_hex_from_base64() {
        let invoice = NodeInvoice {
            payment_request: "lnbc1".into(),
            r_hash: BASE64.encode([0xde, 0xad, 0xbe, 0xef]),
            status: STATE_OPEN.into(),
        };
        assert_eq!(invoice.hash_hex().unwrap(), "deadbeef");

        let broken = NodeInvoice {
            r_hash: "%%%".into(),
            ..invoice
        };
        assert!(matches!(broken.hash_hex(), Err(NodeError::InvalidHash)));
    }

    #[test]
    fn test_parse_node_params() {
        let hex_cert = hex::encode(PEM);
        let params = parse_node_params(&["mynode.com:8080", "abcd", hex_cert.as_str()]).unwrap();
        assert_eq!(params.host, "https://mynode.com:8080");
        assert_eq!(params.cert, PEM);

        assert!(parse_node_params(&["host", "mac"]).is_err());
        assert!(matches!(
            parse_node_params(&["host", "mac", "garbage"]),
            Err(NodeError::InvalidCertificate)
        ));
    }

    #[test]
    fn test_local_hosts_skip_proxy() {
        assert!(is_local("https://127.0.0.1:8080"));
        assert!(!is_local("https://mynode.onion:8080"));
    }
}
