//! Payloads written by the worker and the request data they are built from.

use axum::http::{HeaderMap, Uri, header};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Header carrying the two-letter country code of the client.
pub const COUNTRY_HEADER: &str = "cf-ipcountry";

/// Header carrying the autonomous system number of the client's network.
pub const ASN_HEADER: &str = "cf-asn";

/// A JSON record written to the bucket on every seed or scheduled write.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WritePayload {
    /// Epoch milliseconds.
    pub ts: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,

    /// Position of this write within its batch.
    pub seq: u32,
}

impl WritePayload {
    /// Payload for a timer-driven write.
    pub fn scheduled(ts: i64) -> Self {
        Self {
            ts,
            url: None,
            country: None,
            asn: None,
            seq: 0,
        }
    }

    /// Payload for the `seq`-th seed write of a request.
    pub fn from_context(ctx: &RequestContext, seq: u32) -> Self {
        Self {
            ts: ctx.timestamp,
            url: Some(ctx.url.clone()),
            country: ctx.country.clone(),
            asn: ctx.asn.clone(),
            seq,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Per-request data used to build write payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub url: String,
    pub country: Option<String>,
    pub asn: Option<String>,
    pub timestamp: i64,
}

impl RequestContext {
    pub fn from_request(uri: &Uri, headers: &HeaderMap) -> Self {
        let url = match (uri.host(), header_value(headers, header::HOST.as_str())) {
            (Some(_), _) => uri.to_string(),
            (None, Some(host)) => format!("http://{}{}", host, uri),
            (None, None) => uri.to_string(),
        };

        Self {
            url,
            country: header_value(headers, COUNTRY_HEADER),
            asn: header_value(headers, ASN_HEADER),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
