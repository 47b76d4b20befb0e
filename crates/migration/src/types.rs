use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub type CollectionId = u32;
pub type TokenId = u32;
pub type BlockNumber = u64;

/// Account as the ledger represents it on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossAccount {
    #[serde(alias = "substrate")]
    Substrate(String),
    #[serde(alias = "ethereum")]
    Ethereum(String),
}

impl CrossAccount {
    /// Builds an account from its normalized string form. Twenty-byte hex
    /// strings are Ethereum addresses, anything else is a Substrate address.
    pub fn from_normalized(address: &str) -> Self {
        let address = address.trim();
        let is_ethereum = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()));
        if is_ethereum {
            Self::Ethereum(format!("0x{}", address[2..].to_ascii_lowercase()))
        } else {
            Self::Substrate(address.to_owned())
        }
    }

    pub fn normalized(&self) -> String {
        match self {
            Self::Substrate(address) => address.trim().to_owned(),
            Self::Ethereum(address) => {
                let address = address.trim();
                let hex = address
                    .strip_prefix("0x")
                    .or_else(|| address.strip_prefix("0X"))
                    .unwrap_or(address);
                format!("0x{}", hex.to_ascii_lowercase())
            }
        }
    }

    /// Reads an account from any of the shapes a node may return: a bare
    /// string or a single-key object with either key casing.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(address) => Ok(Self::from_normalized(address)),
            Value::Object(map) if map.len() == 1 => {
                let (kind, inner) = map
                    .iter()
                    .next()
                    .ok_or_else(|| "empty account object".to_owned())?;
                let address = inner
                    .as_str()
                    .ok_or_else(|| format!("account {kind} is not a string"))?
                    .to_owned();
                match kind.to_ascii_lowercase().as_str() {
                    "substrate" => Ok(Self::Substrate(address)),
                    "ethereum" => Ok(Self::Ethereum(address)),
                    other => Err(format!("unknown account kind `{other}`")),
                }
            }
            other => Err(format!("unexpected account value {other}")),
        }
    }
}

/// Sponsorship state of a collection, independent of the casing the ledger
/// used to report it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "address", rename_all = "lowercase")]
pub enum Sponsorship {
    #[default]
    Disabled,
    Pending(String),
    Confirmed(String),
}

impl Sponsorship {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::Disabled),
            Value::String(status) => match status.to_ascii_lowercase().as_str() {
                "disabled" => Ok(Self::Disabled),
                other => Err(format!("sponsorship `{other}` carries no address")),
            },
            Value::Object(map) => {
                if let Some(status) = map.get("status") {
                    let status = status
                        .as_str()
                        .ok_or_else(|| "sponsorship status is not a string".to_owned())?;
                    let address = map.get("address").unwrap_or(&Value::Null);
                    return Self::from_parts(status, address);
                }
                let (status, address) = map
                    .iter()
                    .next()
                    .ok_or_else(|| "empty sponsorship object".to_owned())?;
                Self::from_parts(status, address)
            }
            other => Err(format!("unexpected sponsorship value {other}")),
        }
    }

    fn from_parts(status: &str, address: &Value) -> Result<Self, String> {
        match status.to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "unconfirmed" | "pending" => {
                Ok(Self::Pending(CrossAccount::from_value(address)?.normalized()))
            }
            "confirmed" => Ok(Self::Confirmed(
                CrossAccount::from_value(address)?.normalized(),
            )),
            other => Err(format!("unknown sponsorship status `{other}`")),
        }
    }

    pub fn confirmed_sponsor(&self) -> Option<&str> {
        match self {
            Self::Confirmed(address) => Some(address),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Sponsorship {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionMode {
    #[default]
    #[serde(alias = "nft", alias = "NFT")]
    Nft,
    #[serde(alias = "fungible")]
    Fungible(u8),
    #[serde(alias = "refungible", alias = "reFungible")]
    ReFungible,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_token_ownership_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsored_data_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsored_data_rate_limit: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_transfer_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_approve_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_can_transfer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_can_destroy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfers_enabled: Option<bool>,
}

impl CollectionLimits {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionPermissions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nesting: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyPermission {
    pub mutable: bool,
    pub collection_admin: bool,
    pub token_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPropertyPermission {
    pub key: String,
    pub permission: PropertyPermission,
}

/// Collection configuration as reported by the source ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCollection {
    pub owner: String,
    #[serde(default)]
    pub mode: CollectionMode,
    #[serde(default)]
    pub limits: CollectionLimits,
    #[serde(default)]
    pub permissions: CollectionPermissions,
    #[serde(default)]
    pub sponsorship: Sponsorship,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub token_property_permissions: Vec<TokenPropertyPermission>,
}

/// Collection metadata returned by a ledger read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub description: String,
    pub token_prefix: String,
    pub raw: RawCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub id: CollectionId,
    pub name: String,
    pub description: String,
    pub token_prefix: String,
    pub raw: RawCollection,
    #[serde(default)]
    pub admins: Vec<CrossAccount>,
    /// Last token id the source had assigned when the snapshot was taken.
    pub tokens_count: TokenId,
}

impl CollectionSnapshot {
    pub fn new(
        id: CollectionId,
        info: CollectionInfo,
        admins: Vec<CrossAccount>,
        tokens_count: TokenId,
    ) -> Self {
        Self {
            id,
            name: info.name,
            description: info.description,
            token_prefix: info.token_prefix,
            raw: info.raw,
            admins,
            tokens_count,
        }
    }

    pub fn owner(&self) -> String {
        CrossAccount::from_normalized(&self.raw.owner).normalized()
    }

    /// Creation parameters that reproduce this collection on a destination.
    pub fn to_creation_options(&self) -> CollectionOptions {
        let limits = &self.raw.limits;
        CollectionOptions {
            name: self.name.clone(),
            description: self.description.clone(),
            token_prefix: self.token_prefix.clone(),
            mode: self.raw.mode.clone(),
            limits: (!limits.is_empty()).then(|| limits.clone()),
            permissions: self.raw.permissions.clone(),
            properties: self.raw.properties.clone(),
            token_property_permissions: self.raw.token_property_permissions.clone(),
            pending_sponsor: self.raw.sponsorship.confirmed_sponsor().map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    pub name: String,
    pub description: String,
    pub token_prefix: String,
    pub mode: CollectionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<CollectionLimits>,
    pub permissions: CollectionPermissions,
    pub properties: Vec<Property>,
    pub token_property_permissions: Vec<TokenPropertyPermission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_sponsor: Option<String>,
}

/// Raw token contents, as read from or written to a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub owner: CrossAccount,
    #[serde(with = "hex_bytes")]
    pub const_data: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub variable_data: Vec<u8>,
}

/// One exported token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: TokenId,
    pub owner: String,
    pub owner_account: CrossAccount,
    #[serde(with = "hex_bytes")]
    pub const_data: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub variable_data: Vec<u8>,
    #[serde(default)]
    pub decoded: Option<Value>,
}

impl TokenRecord {
    pub fn new(token_id: TokenId, data: TokenData, decoded: Option<Value>) -> Self {
        Self {
            token_id,
            owner: data.owner.normalized(),
            owner_account: data.owner,
            const_data: data.const_data,
            variable_data: data.variable_data,
            decoded,
        }
    }

    /// Token contents to mint on a destination ledger.
    pub fn to_token_data(&self) -> TokenData {
        TokenData {
            owner: CrossAccount::from_normalized(&self.owner),
            const_data: self.const_data.clone(),
            variable_data: self.variable_data.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub success: bool,
    pub created_ids: Vec<TokenId>,
}

pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(trimmed).map_err(serde::de::Error::custom)
    }
}
