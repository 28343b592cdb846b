//! IP geolocation client (ipinfo.io lite API)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use super::{flag_glyph, GatewayError, GeoGateway};
use crate::types::GeoInfo;

const IPINFO_LITE_URL: &str = "https://api.ipinfo.io/lite";

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    as_name: Option<String>,
}

impl IpInfoResponse {
    fn into_geo(self, endpoint: &str) -> Result<GeoInfo, GatewayError> {
        let country_code = self.country_code.ok_or_else(|| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            message: "missing country_code".to_string(),
        })?;

        Ok(GeoInfo {
            flag: flag_glyph(&country_code),
            country_name: self.country.unwrap_or_else(|| country_code.clone()),
            country_code,
            organization: self.as_name.unwrap_or_default(),
        })
    }
}

/// Geolocation lookups against ipinfo.io
pub struct IpInfoClient {
    client: Client,
    token: Option<String>,
    base_url: String,
}

impl IpInfoClient {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                endpoint: IPINFO_LITE_URL.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            token,
            base_url: IPINFO_LITE_URL.to_string(),
        })
    }
}

#[async_trait]
impl GeoGateway for IpInfoClient {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GatewayError> {
        let endpoint = format!("{}/{}", self.base_url, ip);

        let mut request = self.client.get(&endpoint);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request.send().await.map_err(|e| GatewayError::Transport {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(GatewayError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }

        let body: IpInfoResponse = response.json().await.map_err(|e| GatewayError::Decode {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        body.into_geo(&endpoint)
    }
}
