//! JSON-RPC HTTP client for Unique-style nodes.
//!
//! Reads go to the node. Writes go to a signing relay that holds no keys of
//! its own: every `migrator_*` call carries the signer URI first. By default
//! the relay is served from the node endpoint.

use std::{sync::Mutex, time::Duration};

use chainmigrate_migration::{
    LedgerError,
    ledger::{Ledger, Signer},
    types::{
        BlockNumber, CollectionId, CollectionInfo, CollectionOptions, CrossAccount, MintReceipt,
        TokenData, TokenId,
    },
};
use serde_json::{Value, json};
use url::Url;

use crate::{error::RpcError, parse};

/// Configuration for RPC client behavior.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Per-request timeout (default: 60s).
    pub timeout: Duration,
    /// TCP connect timeout (default: 10s).
    pub connect_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub struct RpcLedger {
    http: reqwest::Client,
    node_url: Url,
    relay_url: Url,
    config: RpcConfig,
    /// Last historical block resolved to a hash.
    block_hash: Mutex<Option<(BlockNumber, String)>>,
}

/// Maps `ws://` and `wss://` endpoints to their HTTP counterparts.
pub fn http_url(endpoint: &str) -> Result<Url, RpcError> {
    let invalid = |cause: String| RpcError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        cause,
    };
    let mut url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => return Err(invalid(format!("unsupported scheme `{other}`"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    Ok(url)
}

impl RpcLedger {
    pub fn new(endpoint: &str) -> Result<Self, RpcError> {
        Self::with_config(endpoint, RpcConfig::default())
    }

    pub fn with_config(endpoint: &str, config: RpcConfig) -> Result<Self, RpcError> {
        let node_url = http_url(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| RpcError::ConnectionFailed {
                url: node_url.to_string(),
                cause: err.to_string(),
            })?;
        Ok(Self {
            http,
            relay_url: node_url.clone(),
            node_url,
            config,
            block_hash: Mutex::new(None),
        })
    }

    /// Sends writes to a separate signing relay.
    pub fn with_relay(mut self, endpoint: &str) -> Result<Self, RpcError> {
        self.relay_url = http_url(endpoint)?;
        Ok(self)
    }

    pub fn node_url(&self) -> &Url {
        &self.node_url
    }

    pub fn relay_url(&self) -> &Url {
        &self.relay_url
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn node_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call(&self.node_url, method, params).await
    }

    async fn relay_call(
        &self,
        method: &str,
        signer: &Signer,
        mut params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        params.insert(0, Value::String(signer.uri().to_owned()));
        self.call(&self.relay_url, method, Value::Array(params))
            .await
    }

    async fn call(&self, url: &Url, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        tracing::trace!(%url, method, "JSON-RPC request");

        let response = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout {
                        method: method.into(),
                        elapsed_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    RpcError::ConnectionFailed {
                        url: url.to_string(),
                        cause: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::HttpError {
                method: method.into(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let json_response: Value = response.json().await.map_err(|e| RpcError::ParseError {
            method: method.into(),
            field: "response_body".into(),
            cause: e.to_string(),
        })?;

        if let Some(error) = json_response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(RpcError::JsonRpcError {
                method: method.into(),
                code,
                message,
            });
        }

        json_response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::parse(method, "result", "missing result field"))
    }

    /// Block hash to pin reads at, `None` for the chain head.
    async fn at(&self, at_block: Option<BlockNumber>) -> Result<Value, RpcError> {
        let Some(number) = at_block else {
            return Ok(Value::Null);
        };
        let cached = self.block_hash.lock().ok().and_then(|cache| {
            cache
                .as_ref()
                .filter(|(cached, _)| *cached == number)
                .map(|(_, hash)| hash.clone())
        });
        if let Some(hash) = cached {
            return Ok(Value::String(hash));
        }

        let method = "chain_getBlockHash";
        let hash = match self.node_call(method, json!([number])).await? {
            Value::String(hash) => hash,
            Value::Null => {
                return Err(RpcError::parse(
                    method,
                    "result",
                    format!("block {number} is unknown to the node"),
                ));
            }
            other => {
                return Err(RpcError::parse(
                    method,
                    "result",
                    format!("expected a hash, got {other}"),
                ));
            }
        };
        if let Ok(mut cache) = self.block_hash.lock() {
            *cache = Some((number, hash.clone()));
        }
        Ok(Value::String(hash))
    }
}

fn to_param<T: serde::Serialize>(method: &str, value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::parse(method, "params", err.to_string()))
}

#[async_trait::async_trait]
impl Ledger for RpcLedger {
    async fn get_collection(
        &self,
        collection_id: CollectionId,
        at_block: Option<BlockNumber>,
    ) -> Result<Option<CollectionInfo>, LedgerError> {
        let method = "unique_collectionById";
        let at = self.at(at_block).await?;
        let result = self.node_call(method, json!([collection_id, at])).await?;
        Ok(parse::parse_collection(method, result)?)
    }

    async fn collection_admins(
        &self,
        collection_id: CollectionId,
        at_block: Option<BlockNumber>,
    ) -> Result<Vec<CrossAccount>, LedgerError> {
        let method = "unique_adminlist";
        let at = self.at(at_block).await?;
        let result = self.node_call(method, json!([collection_id, at])).await?;
        Ok(parse::parse_admins(method, &result)?)
    }

    async fn get_token(
        &self,
        collection_id: CollectionId,
        token_id: TokenId,
        at_block: Option<BlockNumber>,
    ) -> Result<Option<TokenData>, LedgerError> {
        let method = "unique_tokenData";
        let at = self.at(at_block).await?;
        let result = self
            .node_call(method, json!([collection_id, token_id, at]))
            .await?;
        Ok(parse::parse_token(method, result)?)
    }

    async fn last_token_id(
        &self,
        collection_id: CollectionId,
        at_block: Option<BlockNumber>,
    ) -> Result<TokenId, LedgerError> {
        let method = "unique_lastTokenId";
        let at = self.at(at_block).await?;
        let result = self.node_call(method, json!([collection_id, at])).await?;
        Ok(parse::parse_number(method, "result", &result)?)
    }

    async fn signer_account(&self, signer: &Signer) -> Result<CrossAccount, LedgerError> {
        let method = "migrator_signerAccount";
        let result = self.relay_call(method, signer, Vec::new()).await?;
        Ok(parse::parse_account(method, "result", &result)?)
    }

    async fn create_collection(
        &self,
        signer: &Signer,
        options: &CollectionOptions,
    ) -> Result<CollectionId, LedgerError> {
        let method = "migrator_createCollection";
        let result = self
            .relay_call(method, signer, vec![to_param(method, options)?])
            .await?;
        Ok(parse::parse_collection_id(method, &result)?)
    }

    async fn create_tokens(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        tokens: &[TokenData],
    ) -> Result<MintReceipt, LedgerError> {
        let method = "migrator_createMultipleItems";
        let result = self
            .relay_call(
                method,
                signer,
                vec![json!(collection_id), to_param(method, &tokens)?],
            )
            .await?;
        Ok(parse::parse_receipt(method, result)?)
    }

    async fn create_token(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        token: &TokenData,
    ) -> Result<MintReceipt, LedgerError> {
        let method = "migrator_createItem";
        let result = self
            .relay_call(
                method,
                signer,
                vec![json!(collection_id), to_param(method, token)?],
            )
            .await?;
        Ok(parse::parse_receipt(method, result)?)
    }

    async fn burn_token(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        token_id: TokenId,
    ) -> Result<bool, LedgerError> {
        let method = "migrator_burnItem";
        let result = self
            .relay_call(method, signer, vec![json!(collection_id), json!(token_id)])
            .await?;
        Ok(parse::parse_bool(method, &result)?)
    }

    async fn burn_collection(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
    ) -> Result<bool, LedgerError> {
        let method = "migrator_destroyCollection";
        let result = self
            .relay_call(method, signer, vec![json!(collection_id)])
            .await?;
        Ok(parse::parse_bool(method, &result)?)
    }

    async fn add_admin(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        admin: &CrossAccount,
    ) -> Result<bool, LedgerError> {
        let method = "migrator_addCollectionAdmin";
        let result = self
            .relay_call(
                method,
                signer,
                vec![json!(collection_id), to_param(method, admin)?],
            )
            .await?;
        Ok(parse::parse_bool(method, &result)?)
    }

    async fn change_owner(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        owner: &str,
    ) -> Result<bool, LedgerError> {
        let method = "migrator_changeCollectionOwner";
        let result = self
            .relay_call(method, signer, vec![json!(collection_id), json!(owner)])
            .await?;
        Ok(parse::parse_bool(method, &result)?)
    }

    async fn set_sponsor(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        sponsor: &str,
    ) -> Result<bool, LedgerError> {
        let method = "migrator_setCollectionSponsor";
        let result = self
            .relay_call(method, signer, vec![json!(collection_id), json!(sponsor)])
            .await?;
        Ok(parse::parse_bool(method, &result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_endpoints_map_to_http() {
        assert_eq!(
            http_url("ws://127.0.0.1:9944").unwrap().as_str(),
            "http://127.0.0.1:9944/"
        );
        assert_eq!(
            http_url("wss://ws-quartz.unique.network").unwrap().as_str(),
            "https://ws-quartz.unique.network/"
        );
        assert_eq!(
            http_url("https://rpc.example").unwrap().scheme(),
            "https"
        );
    }

    #[test]
    fn rejects_unsupported_endpoints() {
        assert!(matches!(
            http_url("ftp://node"),
            Err(RpcError::InvalidEndpoint { .. })
        ));
        assert!(http_url("not a url").is_err());
    }

    #[test]
    fn relay_defaults_to_the_node() {
        let ledger = RpcLedger::new("ws://127.0.0.1:9944").unwrap();
        assert_eq!(ledger.relay_url(), ledger.node_url());

        let ledger = ledger.with_relay("http://127.0.0.1:8545").unwrap();
        assert_eq!(ledger.relay_url().port(), Some(8545));
    }
}
