//! Conversion of node responses into the migration data model.
//!
//! Nodes disagree on key casing (`tokenPrefix` vs `token_prefix`) and on
//! how strings are encoded (UTF-16 code unit arrays, byte arrays, hex or
//! plain text), so every reader here accepts all of them.

use chainmigrate_migration::types::{
    CollectionId, CollectionInfo, CollectionMode, CrossAccount, MintReceipt, RawCollection,
    Sponsorship, TokenData, TokenId,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::RpcError;

/// Rewrites every object key from camelCase to snake_case, recursively.
pub fn snake_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (to_snake_case(&key), snake_case_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_case_keys).collect()),
        other => other,
    }
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Reads text that may arrive as UTF-16 code units, raw bytes, `0x` hex
/// or a plain string.
pub fn parse_text(method: &str, field: &str, value: &Value) -> Result<String, RpcError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(text) => match text.strip_prefix("0x") {
            Some(encoded) => hex::decode(encoded)
                .map_err(|err| RpcError::parse(method, field, err.to_string()))
                .and_then(|bytes| {
                    String::from_utf8(bytes)
                        .map_err(|err| RpcError::parse(method, field, err.to_string()))
                }),
            None => Ok(text.clone()),
        },
        Value::Array(units) => {
            let units = units
                .iter()
                .map(|unit| {
                    unit.as_u64()
                        .and_then(|unit| u16::try_from(unit).ok())
                        .ok_or_else(|| RpcError::parse(method, field, "expected code units"))
                })
                .collect::<Result<Vec<u16>, _>>()?;
            String::from_utf16(&units).map_err(|err| RpcError::parse(method, field, err.to_string()))
        }
        other => Err(RpcError::parse(
            method,
            field,
            format!("unexpected text value {other}"),
        )),
    }
}

/// Reads opaque payload bytes from `0x` hex or a byte array.
pub fn parse_bytes(method: &str, field: &str, value: &Value) -> Result<Vec<u8>, RpcError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => hex::decode(text.strip_prefix("0x").unwrap_or(text))
            .map_err(|err| RpcError::parse(method, field, err.to_string())),
        Value::Array(bytes) => bytes
            .iter()
            .map(|byte| {
                byte.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| RpcError::parse(method, field, "expected bytes"))
            })
            .collect(),
        other => Err(RpcError::parse(
            method,
            field,
            format!("unexpected payload value {other}"),
        )),
    }
}

pub fn parse_number<T: TryFrom<u64>>(method: &str, field: &str, value: &Value) -> Result<T, RpcError> {
    let number = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => match text.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        },
        _ => None,
    };
    number
        .and_then(|number| T::try_from(number).ok())
        .ok_or_else(|| RpcError::parse(method, field, format!("expected a number, got {value}")))
}

pub fn parse_account(method: &str, field: &str, value: &Value) -> Result<CrossAccount, RpcError> {
    CrossAccount::from_value(value).map_err(|cause| RpcError::parse(method, field, cause))
}

fn parse_mode(method: &str, value: &Value) -> Result<CollectionMode, RpcError> {
    match value {
        Value::Null => Ok(CollectionMode::Nft),
        Value::String(mode) => match mode.to_ascii_lowercase().as_str() {
            "nft" => Ok(CollectionMode::Nft),
            "refungible" => Ok(CollectionMode::ReFungible),
            other => Err(RpcError::parse(method, "mode", format!("unknown mode `{other}`"))),
        },
        Value::Object(map) => match map.iter().next() {
            Some((kind, decimals)) if kind.eq_ignore_ascii_case("fungible") => Ok(
                CollectionMode::Fungible(parse_number(method, "mode", decimals)?),
            ),
            Some((kind, _)) => parse_mode(method, &Value::String(kind.clone())),
            None => Err(RpcError::parse(method, "mode", "empty mode object")),
        },
        other => Err(RpcError::parse(
            method,
            "mode",
            format!("unexpected mode value {other}"),
        )),
    }
}

fn parse_field<T: DeserializeOwned + Default>(
    method: &str,
    field: &str,
    value: Option<&Value>,
) -> Result<T, RpcError> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| RpcError::parse(method, field, err.to_string())),
    }
}

/// Parses a `unique_collectionById` result. `null` means no such collection.
pub fn parse_collection(method: &str, value: Value) -> Result<Option<CollectionInfo>, RpcError> {
    if value.is_null() {
        return Ok(None);
    }
    let value = snake_case_keys(value);
    let Value::Object(map) = &value else {
        return Err(RpcError::parse(method, "result", "expected an object"));
    };
    let get = |key: &str| map.get(key).unwrap_or(&Value::Null);

    let owner = parse_account(method, "owner", get("owner"))?.normalized();
    let sponsorship = Sponsorship::from_value(get("sponsorship"))
        .map_err(|cause| RpcError::parse(method, "sponsorship", cause))?;

    Ok(Some(CollectionInfo {
        name: parse_text(method, "name", get("name"))?,
        description: parse_text(method, "description", get("description"))?,
        token_prefix: parse_text(method, "token_prefix", get("token_prefix"))?,
        raw: RawCollection {
            owner,
            mode: parse_mode(method, get("mode"))?,
            limits: parse_field(method, "limits", map.get("limits"))?,
            permissions: parse_field(method, "permissions", map.get("permissions"))?,
            sponsorship,
            properties: parse_field(method, "properties", map.get("properties"))?,
            token_property_permissions: parse_field(
                method,
                "token_property_permissions",
                map.get("token_property_permissions"),
            )?,
        },
    }))
}

pub fn parse_admins(method: &str, value: &Value) -> Result<Vec<CrossAccount>, RpcError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(admins) => admins
            .iter()
            .map(|admin| parse_account(method, "admin", admin))
            .collect(),
        other => Err(RpcError::parse(
            method,
            "result",
            format!("expected an admin list, got {other}"),
        )),
    }
}

/// Parses a `unique_tokenData` result. A missing owner means the token
/// does not exist or was burned.
pub fn parse_token(method: &str, value: Value) -> Result<Option<TokenData>, RpcError> {
    let value = snake_case_keys(value);
    let Value::Object(map) = &value else {
        return Ok(None);
    };
    let Some(owner) = map.get("owner").filter(|owner| !owner.is_null()) else {
        return Ok(None);
    };
    Ok(Some(TokenData {
        owner: parse_account(method, "owner", owner)?,
        const_data: parse_bytes(
            method,
            "const_data",
            map.get("const_data").unwrap_or(&Value::Null),
        )?,
        variable_data: parse_bytes(
            method,
            "variable_data",
            map.get("variable_data").unwrap_or(&Value::Null),
        )?,
    }))
}

pub fn parse_receipt(method: &str, value: Value) -> Result<MintReceipt, RpcError> {
    let value = snake_case_keys(value);
    let Value::Object(map) = &value else {
        return Err(RpcError::parse(method, "result", "expected a receipt object"));
    };
    let success = map
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::parse(method, "success", "expected a boolean"))?;
    let created_ids = match map.get("created_ids") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|id| parse_number::<TokenId>(method, "created_ids", id))
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(RpcError::parse(
                method,
                "created_ids",
                format!("expected an id list, got {other}"),
            ));
        }
    };
    Ok(MintReceipt {
        success,
        created_ids,
    })
}

pub fn parse_collection_id(method: &str, value: &Value) -> Result<CollectionId, RpcError> {
    let id = match value {
        Value::Object(map) => map
            .get("collectionId")
            .or_else(|| map.get("collection_id"))
            .unwrap_or(&Value::Null),
        other => other,
    };
    parse_number(method, "collection_id", id)
}

pub fn parse_bool(method: &str, value: &Value) -> Result<bool, RpcError> {
    value
        .as_bool()
        .ok_or_else(|| RpcError::parse(method, "result", format!("expected a boolean, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_camel_case_keys() {
        assert_eq!(
            snake_case_keys(json!({"tokenPrefix": "A", "limits": {"ownerCanDestroy": true}})),
            json!({"token_prefix": "A", "limits": {"owner_can_destroy": true}})
        );
    }

    #[test]
    fn reads_every_text_encoding() {
        let units: Vec<u16> = "Punks".encode_utf16().collect();
        assert_eq!(parse_text("m", "name", &json!(units)).unwrap(), "Punks");
        assert_eq!(parse_text("m", "name", &json!("0x504e4b")).unwrap(), "PNK");
        assert_eq!(parse_text("m", "name", &json!("plain")).unwrap(), "plain");
        assert!(parse_text("m", "name", &json!([70000])).is_err());
    }

    #[test]
    fn parses_a_camel_case_collection() {
        let raw = json!({
            "owner": "5GrwvaEF",
            "mode": {"Fungible": 18},
            "name": "Punks".encode_utf16().collect::<Vec<u16>>(),
            "description": [],
            "tokenPrefix": "0x504e4b",
            "sponsorship": {"Confirmed": "5Sponsor"},
            "limits": {"tokenLimit": 100, "ownerCanTransfer": false},
            "permissions": {"mintMode": true},
            "properties": [{"key": "schema", "value": "{}"}],
            "tokenPropertyPermissions": [
                {"key": "name", "permission": {"mutable": false, "collectionAdmin": true}}
            ]
        });

        let info = parse_collection("unique_collectionById", raw).unwrap().unwrap();
        assert_eq!(info.name, "Punks");
        assert_eq!(info.token_prefix, "PNK");
        assert_eq!(info.raw.mode, CollectionMode::Fungible(18));
        assert_eq!(info.raw.sponsorship, Sponsorship::Confirmed("5Sponsor".to_owned()));
        assert_eq!(info.raw.limits.token_limit, Some(100));
        assert_eq!(info.raw.limits.owner_can_transfer, Some(false));
        assert_eq!(info.raw.permissions.mint_mode, Some(true));
        assert!(info.raw.token_property_permissions[0].permission.collection_admin);
    }

    #[test]
    fn null_collection_is_absent() {
        assert!(parse_collection("m", Value::Null).unwrap().is_none());
    }

    #[test]
    fn token_without_owner_is_absent() {
        assert!(parse_token("m", json!({"owner": null})).unwrap().is_none());
        assert!(parse_token("m", Value::Null).unwrap().is_none());

        let token = parse_token(
            "m",
            json!({"owner": {"ethereum": "0xABCDEFabcdefABCDEFabcdefABCDEFabcdefABCD"}, "constData": "0x0102"}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(token.const_data, vec![1, 2]);
        assert!(token.variable_data.is_empty());
        assert_eq!(
            token.owner.normalized(),
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
    }

    #[test]
    fn receipts_accept_both_casings() {
        let camel = parse_receipt("m", json!({"success": true, "createdIds": [4, "0x5"]})).unwrap();
        assert_eq!(camel.created_ids, vec![4, 5]);

        let failed = parse_receipt("m", json!({"success": false})).unwrap();
        assert!(!failed.success && failed.created_ids.is_empty());

        assert!(parse_receipt("m", json!({"createdIds": []})).is_err());
    }

    #[test]
    fn collection_id_from_number_or_object() {
        assert_eq!(parse_collection_id("m", &json!(12)).unwrap(), 12);
        assert_eq!(parse_collection_id("m", &json!({"collectionId": 13})).unwrap(), 13);
        assert!(parse_collection_id("m", &json!(-1)).is_err());
    }
}
