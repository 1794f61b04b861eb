//! Contract interface descriptions.
//!
//! An interface is a versioned JSON ABI. It is accepted either as a compiled
//! artifact (`{"contractName": ..., "abi": [...]}`, as emitted by Hardhat and
//! Truffle) or as a bare ABI array. The crate ships the marketplace interface
//! as its default.

use alloy::json_abi::{Event, Function, JsonAbi};
use alloy::primitives::B256;
use serde::Deserialize;
use std::path::Path;

use crate::error::{ErrorCode, ServiceError, ServiceResult};

/// Default interface of the marketplace contract.
const MARKETPLACE_ABI: &str = include_str!("../../abi/HealthDataMarketplace.json");

/// Version label used when the artifact carries none.
const UNVERSIONED: &str = "unversioned";

#[derive(Deserialize)]
#[serde(untagged)]
enum Artifact {
    Compiled {
        #[serde(rename = "contractName", default)]
        contract_name: Option<String>,
        #[serde(default)]
        version: Option<String>,
        abi: JsonAbi,
    },
    Bare(JsonAbi),
}

/// A parsed, immutable contract interface.
#[derive(Debug, Clone)]
pub struct ContractInterface {
    name: String,
    version: String,
    abi: JsonAbi,
}

impl ContractInterface {
    /// The built-in marketplace interface.
    pub fn marketplace() -> ServiceResult<Self> {
        Self::from_json(MARKETPLACE_ABI)
    }

    /// Parse an artifact or bare ABI from JSON text.
    pub fn from_json(raw: &str) -> ServiceResult<Self> {
        let artifact: Artifact = serde_json::from_str(raw).map_err(|e| {
            ServiceError::new(
                ErrorCode::InvalidInterface,
                format!("Invalid contract interface JSON: {}", e),
            )
            .with_source(e)
        })?;

        let (name, version, abi) = match artifact {
            Artifact::Compiled {
                contract_name,
                version,
                abi,
            } => (
                contract_name.unwrap_or_default(),
                version.unwrap_or_else(|| UNVERSIONED.to_string()),
                abi,
            ),
            Artifact::Bare(abi) => (String::new(), UNVERSIONED.to_string(), abi),
        };

        Ok(Self { name, version, abi })
    }

    /// Load an artifact from disk.
    pub fn from_file(path: &Path) -> ServiceResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::new(
                ErrorCode::InvalidInterface,
                format!("Cannot read contract artifact {}: {}", path.display(), e),
            )
            .with_source(e)
        })?;
        Self::from_json(&raw)
    }

    /// Load from an optional path, falling back to the built-in interface.
    pub fn load(path: Option<&str>) -> ServiceResult<Self> {
        match path {
            Some(path) => Self::from_file(Path::new(path)),
            None => Self::marketplace(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// First function declared with `name`.
    pub fn function(&self, name: &str) -> ServiceResult<&Function> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| {
                ServiceError::new(
                    ErrorCode::UnknownFunction,
                    format!("Function '{}' is not part of the contract interface", name),
                )
            })
    }

    /// First event declared with `name`.
    pub fn event(&self, name: &str) -> Option<&Event> {
        self.abi
            .event(name)
            .and_then(|overloads| overloads.first())
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.event(name).is_some()
    }

    /// Whether an overload of `name` has the topic-0 `selector`.
    pub fn declares_event(&self, name: &str, selector: B256) -> bool {
        self.abi
            .event(name)
            .is_some_and(|overloads| overloads.iter().any(|e| e.selector() == selector))
    }

    /// Names of all declared events.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.abi.events().map(|e| e.name.as_str())
    }
}
