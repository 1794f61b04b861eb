//! Contract event definitions and normalized records.

use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorCode, ServiceError, ServiceResult};

sol! {
    /// Emitted when a data set is listed for sale.
    #[derive(Debug)]
    event DataListed(uint256 indexed id, address indexed seller, uint256 price);

    /// Emitted when a data set is purchased.
    #[derive(Debug)]
    event DataPurchased(uint256 indexed id, address indexed buyer, address indexed seller, uint256 price);
}

/// Contract events this crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DataListed,
    DataPurchased,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::DataListed, EventKind::DataPurchased];

    /// Event name as declared in the contract interface.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DataListed => "DataListed",
            EventKind::DataPurchased => "DataPurchased",
        }
    }

    /// Topic 0 of the event's logs.
    pub fn signature_hash(&self) -> B256 {
        match self {
            EventKind::DataListed => DataListed::SIGNATURE_HASH,
            EventKind::DataPurchased => DataPurchased::SIGNATURE_HASH,
        }
    }

    /// Resolve a name, rejecting events the crate cannot decode.
    pub fn from_name(name: &str) -> ServiceResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| {
                ServiceError::new(
                    ErrorCode::UnknownEvent,
                    format!("Unknown contract event '{}'", name),
                )
                .with_details(serde_json::json!({
                    "event": name,
                    "known": Self::ALL.iter().map(|k| k.name()).collect::<Vec<_>>(),
                }))
            })
    }

    /// Identify a log by its first topic.
    pub fn from_topic(topic0: &B256) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.signature_hash() == *topic0)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOrigin {
    /// Hash of the triggering transaction.
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

/// Normalized `DataListed` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataListedRecord {
    /// Listing id as a decimal string.
    pub id: String,
    /// Checksummed seller address.
    pub seller: String,
    /// Price in human units (e.g. "0.25").
    pub price: String,
    #[serde(flatten)]
    pub origin: EventOrigin,
}

/// Normalized `DataPurchased` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPurchasedRecord {
    /// Listing id as a decimal string.
    pub id: String,
    /// Checksummed buyer address.
    pub buyer: String,
    /// Checksummed seller address.
    pub seller: String,
    /// Price in human units (e.g. "1.0").
    pub price: String,
    #[serde(flatten)]
    pub origin: EventOrigin,
}

/// A decoded and normalized contract event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "record")]
pub enum ContractEvent {
    DataListed(DataListedRecord),
    DataPurchased(DataPurchasedRecord),
}

impl ContractEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ContractEvent::DataListed(_) => EventKind::DataListed,
            ContractEvent::DataPurchased(_) => EventKind::DataPurchased,
        }
    }

    pub fn origin(&self) -> &EventOrigin {
        match self {
            ContractEvent::DataListed(r) => &r.origin,
            ContractEvent::DataPurchased(r) => &r.origin,
        }
    }
}
