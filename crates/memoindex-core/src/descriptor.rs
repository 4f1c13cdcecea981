//! Deployment descriptor loading.
//!
//! The descriptor is written by the contract deployment step and read at
//! every startup:
//!
//! ```json
//! { "address": "0x51F0…0bBB", "abi": [ … ], "deploymentBlock": 1 }
//! ```
//!
//! Older deployment steps wrote `abi` as a JSON-encoded string; both forms
//! are accepted and normalized to a structured [`JsonAbi`].

use std::path::{Path, PathBuf};

use alloy_json_abi::{Event, JsonAbi};
use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::IngestError;

/// Contract address, interface and starting block for the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub address: Address,
    pub abi: JsonAbi,
    pub deployment_block: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorFile {
    address: Option<String>,
    abi: Option<Value>,
    deployment_block: Option<u64>,
}

impl Descriptor {
    /// Parse a descriptor document.
    pub fn from_json_str(json: &str) -> Result<Self, IngestError> {
        let file: DescriptorFile = serde_json::from_str(json)
            .map_err(|e| IngestError::Config(format!("descriptor is not valid JSON: {e}")))?;

        let address = file
            .address
            .filter(|a| !a.is_empty())
            .ok_or_else(|| IngestError::Config("contract address not found in descriptor".into()))?;
        let address: Address = address
            .parse()
            .map_err(|e| IngestError::Config(format!("invalid contract address {address}: {e}")))?;

        let abi = match file.abi {
            None | Some(Value::Null) => {
                return Err(IngestError::Config("contract ABI not found in descriptor".into()))
            }
            Some(v) => normalize_abi(v)?,
        };

        Ok(Self {
            address,
            abi,
            deployment_block: file.deployment_block,
        })
    }

    /// Resolve the named event from the ABI.
    pub fn event(&self, name: &str) -> Result<&Event, IngestError> {
        self.abi
            .event(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| IngestError::Config(format!("event {name} not found in contract ABI")))
    }

    /// First block to scan: `deploymentBlock`, else `default`.
    pub fn start_block(&self, default: u64) -> u64 {
        self.deployment_block.unwrap_or(default)
    }
}

/// Accept a legacy JSON-encoded string or a structured ABI value.
fn normalize_abi(value: Value) -> Result<JsonAbi, IngestError> {
    match value {
        Value::String(encoded) => {
            debug!("descriptor ABI is a JSON-encoded string, decoding");
            serde_json::from_str(&encoded)
                .map_err(|e| IngestError::Config(format!("invalid encoded ABI: {e}")))
        }
        structured => serde_json::from_value(structured)
            .map_err(|e| IngestError::Config(format!("invalid ABI: {e}"))),
    }
}

/// Reads the descriptor file on demand.
///
/// Every [`load`](Self::load) re-reads the file, so calling it again
/// refreshes the configuration.
#[derive(Debug, Clone)]
pub struct DescriptorLoader {
    path: PathBuf,
}

impl DescriptorLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the descriptor.
    pub fn load(&self) -> Result<Descriptor, IngestError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            IngestError::Config(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let descriptor = Descriptor::from_json_str(&raw)?;
        debug!(
            path = %self.path.display(),
            address = %descriptor.address,
            deployment_block = ?descriptor.deployment_block,
            "descriptor loaded"
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABI: &str = r#"[
        {"inputs":[],"stateMutability":"nonpayable","type":"constructor"},
        {"anonymous":false,"inputs":[
            {"indexed":true,"internalType":"address","name":"from","type":"address"},
            {"indexed":false,"internalType":"uint256","name":"timestamp","type":"uint256"},
            {"indexed":false,"internalType":"string","name":"name","type":"string"},
            {"indexed":false,"internalType":"string","name":"message","type":"string"}
        ],"name":"NewMemo","type":"event"},
        {"inputs":[{"internalType":"string","name":"_name","type":"string"},
                   {"internalType":"string","name":"_message","type":"string"}],
         "name":"buyCoffee","outputs":[],"stateMutability":"payable","type":"function"}
    ]"#;

    const ADDRESS: &str = "0x51F005313F7d84fA14C5B7907e71836884a10bBB";

    fn structured_doc() -> String {
        format!(r#"{{"address":"{ADDRESS}","abi":{ABI},"deploymentBlock":100}}"#)
    }

    fn legacy_doc() -> String {
        let encoded = serde_json::to_string(ABI).unwrap();
        format!(r#"{{"address":"{ADDRESS}","abi":{encoded},"deploymentBlock":100}}"#)
    }

    #[test]
    fn legacy_and_structured_abi_are_equivalent() {
        let structured = Descriptor::from_json_str(&structured_doc()).unwrap();
        let legacy = Descriptor::from_json_str(&legacy_doc()).unwrap();
        assert_eq!(structured.abi, legacy.abi);
        assert_eq!(structured, legacy);
    }

    #[test]
    fn resolves_event_and_start_block() {
        let d = Descriptor::from_json_str(&structured_doc()).unwrap();
        let event = d.event("NewMemo").unwrap();
        assert_eq!(event.inputs.len(), 4);
        assert_eq!(d.start_block(0), 100);
        assert!(d.event("Withdrawn").is_err());
    }

    #[test]
    fn missing_deployment_block_uses_default() {
        let doc = format!(r#"{{"address":"{ADDRESS}","abi":{ABI}}}"#);
        let d = Descriptor::from_json_str(&doc).unwrap();
        assert_eq!(d.deployment_block, None);
        assert_eq!(d.start_block(0), 0);

        let doc = format!(r#"{{"address":"{ADDRESS}","abi":{ABI},"deploymentBlock":null}}"#);
        assert_eq!(Descriptor::from_json_str(&doc).unwrap().deployment_block, None);
    }

    #[test]
    fn missing_fields_are_config_errors() {
        let no_abi = format!(r#"{{"address":"{ADDRESS}"}}"#);
        let no_address = format!(r#"{{"abi":{ABI}}}"#);
        for doc in [no_abi.as_str(), no_address.as_str(), "not json", r#"{"address":"0x12","abi":[]}"#] {
            let err = Descriptor::from_json_str(doc).unwrap_err();
            assert!(matches!(err, IngestError::Config(_)), "{doc}: {err}");
        }
    }

    #[test]
    fn missing_file_is_config_error() {
        let loader = DescriptorLoader::new("/nonexistent/contract-data.json");
        assert!(matches!(loader.load(), Err(IngestError::Config(_))));
    }

    #[test]
    fn load_rereads_file() {
        let path = std::env::temp_dir().join(format!("memoindex-descriptor-{}.json", std::process::id()));
        std::fs::write(&path, structured_doc()).unwrap();
        let loader = DescriptorLoader::new(&path);
        assert_eq!(loader.load().unwrap().deployment_block, Some(100));

        std::fs::write(&path, legacy_doc().replace("100", "250")).unwrap();
        assert_eq!(loader.load().unwrap().deployment_block, Some(250));
        std::fs::remove_file(&path).ok();
    }
}
