//! Esplora REST client.

use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{Address, Txid};
use reqwest::{Client, Response, StatusCode};
use satchel_core::error::SourceError;
use satchel_core::traits::ChainSource;
use satchel_core::types::{AddressStats, FeePresets, RemoteUtxo};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{AddressInfo, FeeEstimates, UtxoEntry, presets_from_estimates};
use crate::config::ExplorerConfig;

/// Client for an Esplora-compatible explorer API.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(config: &ExplorerConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let resp = check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

/// Pass successful responses through; turn anything else into
/// [`SourceError::Status`] carrying the body.
async fn check_status(resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChainSource for EsploraClient {
    async fn address_stats(&self, address: &Address) -> Result<AddressStats, SourceError> {
        let info: AddressInfo = self.get_json(&format!("/address/{address}")).await?;
        Ok(info.into())
    }

    async fn address_utxos(&self, address: &Address) -> Result<Vec<RemoteUtxo>, SourceError> {
        let entries: Vec<UtxoEntry> = self.get_json(&format!("/address/{address}/utxo")).await?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<Txid, SourceError> {
        let url = self.url("/tx");
        debug!(%url, bytes = tx_hex.len() / 2, "POST");
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        // Esplora answers a node-side rejection with 400 and the node's
        // reason as the body. Other 4xx codes describe the endpoint.
        if status == StatusCode::BAD_REQUEST {
            return Err(SourceError::Rejected(body));
        }
        if status != StatusCode::OK {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Txid::from_str(body.trim())
            .map_err(|e| SourceError::Decode(format!("broadcast returned '{body}': {e}")))
    }

    async fn fee_presets(&self) -> Result<FeePresets, SourceError> {
        let estimates: FeeEstimates = self.get_json("/fee-estimates").await?;
        presets_from_estimates(&estimates)
            .ok_or_else(|| SourceError::Decode("fee estimate table is empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use bitcoin::Network;
    use bitcoin::address::NetworkUnchecked;
    use bitcoin::hashes::Hash;
    use satchel_core::types::FeeRate;
    use serde_json::json;

    const USED: &str = "tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl";
    const FRESH: &str = "tb1qd7spv5q28348xl4myc8zmh983w5jx32cjhkn97";
    const BROKEN: &str = "tb1qxdyjf6h5d6qxap4n2dap97q4j5ps6ua8sll0ct";
    const TXID: &str = "0303030303030303030303030303030303030303030303030303030303030303";

    async fn address(Path(addr): Path<String>) -> AxumResponse {
        match addr.as_str() {
            USED => axum::Json(json!({
                "address": addr,
                "chain_stats": {"funded_txo_count": 1, "funded_txo_sum": 5000,
                                "spent_txo_count": 0, "spent_txo_sum": 0, "tx_count": 1},
                "mempool_stats": {"funded_txo_count": 0, "funded_txo_sum": 0,
                                  "spent_txo_count": 0, "spent_txo_sum": 0, "tx_count": 0}
            }))
            .into_response(),
            BROKEN => (AxumStatus::INTERNAL_SERVER_ERROR, "db down").into_response(),
            _ => axum::Json(json!({
                "address": addr,
                "chain_stats": {"funded_txo_count": 0, "funded_txo_sum": 0,
                                "spent_txo_count": 0, "spent_txo_sum": 0, "tx_count": 0},
                "mempool_stats": {"funded_txo_count": 0, "funded_txo_sum": 0,
                                  "spent_txo_count": 0, "spent_txo_sum": 0, "tx_count": 0}
            }))
            .into_response(),
        }
    }

    async fn utxos(Path(addr): Path<String>) -> AxumResponse {
        if addr == USED {
            axum::Json(json!([{
                "txid": TXID, "vout": 2, "value": 5000,
                "status": {"confirmed": true, "block_height": 120}
            }]))
            .into_response()
        } else {
            axum::Json(json!([])).into_response()
        }
    }

    async fn broadcast(body: String) -> AxumResponse {
        if let Some(code) = body.strip_prefix("status:") {
            let code = AxumStatus::from_u16(code.parse().unwrap()).unwrap();
            (code, "endpoint trouble").into_response()
        } else if body.starts_with("02") {
            (AxumStatus::OK, TXID).into_response()
        } else {
            (
                AxumStatus::BAD_REQUEST,
                "sendrawtransaction RPC error: {\"code\":-22,\"message\":\"TX decode failed\"}",
            )
                .into_response()
        }
    }

    async fn fee_estimates() -> impl IntoResponse {
        axum::Json(json!({"1": 15.0, "3": 8.5, "6": 3.0, "144": 1.0}))
    }

    async fn spawn_explorer() -> EsploraClient {
        let app = Router::new()
            .route("/address/:address", get(address))
            .route("/address/:address/utxo", get(utxos))
            .route("/tx", post(broadcast))
            .route("/fee-estimates", get(fee_estimates));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        EsploraClient::new(&ExplorerConfig::new(format!("http://{addr}/"))).unwrap()
    }

    fn parse(addr: &str) -> Address {
        addr.parse::<Address<NetworkUnchecked>>()
            .unwrap()
            .require_network(Network::Testnet)
            .unwrap()
    }

    #[tokio::test]
    async fn address_stats_maps_activity() {
        let client = spawn_explorer().await;
        let used = client.address_stats(&parse(USED)).await.unwrap();
        assert!(used.has_activity());
        assert_eq!(used.funded_sum, 5_000);
        let fresh = client.address_stats(&parse(FRESH)).await.unwrap();
        assert!(!fresh.has_activity());
    }

    #[tokio::test]
    async fn server_error_is_status() {
        let client = spawn_explorer().await;
        let err = client.address_stats(&parse(BROKEN)).await.unwrap_err();
        assert_eq!(
            err,
            SourceError::Status {
                status: 500,
                body: "db down".into()
            }
        );
    }

    #[tokio::test]
    async fn utxos_are_decoded() {
        let client = spawn_explorer().await;
        let utxos = client.address_utxos(&parse(USED)).await.unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].outpoint.txid, Txid::from_byte_array([3; 32]));
        assert_eq!(utxos[0].outpoint.vout, 2);
        assert_eq!(utxos[0].block_height, Some(120));
        assert!(client.address_utxos(&parse(FRESH)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_returns_txid() {
        let client = spawn_explorer().await;
        let txid = client.broadcast("0200000000").await.unwrap();
        assert_eq!(txid.to_string(), TXID);
    }

    #[tokio::test]
    async fn broadcast_rejection_is_verbatim() {
        let client = spawn_explorer().await;
        let err = client.broadcast("ff").await.unwrap_err();
        assert_eq!(
            err,
            SourceError::Rejected(
                "sendrawtransaction RPC error: {\"code\":-22,\"message\":\"TX decode failed\"}"
                    .into()
            )
        );
    }

    #[tokio::test]
    async fn broadcast_endpoint_errors_are_status() {
        let client = spawn_explorer().await;
        for code in [404u16, 408, 429, 503] {
            let err = client.broadcast(&format!("status:{code}")).await.unwrap_err();
            assert_eq!(
                err,
                SourceError::Status {
                    status: code,
                    body: "endpoint trouble".into()
                },
                "HTTP {code}"
            );
        }
    }

    #[tokio::test]
    async fn fee_presets_from_estimates() {
        let client = spawn_explorer().await;
        let presets = client.fee_presets().await.unwrap();
        assert_eq!(presets.fast, FeeRate::from_sat_per_vb(15));
        assert_eq!(presets.medium, FeeRate::from_sat_per_kvb(8_500));
        assert_eq!(presets.economy, FeeRate::from_sat_per_vb(3));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport() {
        let client = EsploraClient::new(&ExplorerConfig::new("http://127.0.0.1:1")).unwrap();
        let err = client.fee_presets().await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }
}
