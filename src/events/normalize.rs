//! Conversion of raw logs into normalized records.
//!
//! Integers become decimal strings, amounts in the smallest on-chain unit
//! become human decimal strings, addresses become checksummed hex.

use alloy::primitives::utils::format_units;
use alloy::primitives::U256;
use alloy::rpc::types::Log;

use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::events::types::{
    ContractEvent, DataListed, DataListedRecord, DataPurchased, DataPurchasedRecord, EventKind,
    EventOrigin,
};

/// Format `amount` with `decimals` decimals, trimming trailing zeros but
/// keeping at least one fractional digit (`10^18`, 18 → `"1.0"`).
pub fn format_amount(amount: U256, decimals: u8) -> ServiceResult<String> {
    let formatted = format_units(amount, decimals).map_err(|e| {
        ServiceError::new(
            ErrorCode::DecodingError,
            format!("Cannot format amount with {} decimals: {}", decimals, e),
        )
        .with_source(e)
    })?;

    let Some((whole, fraction)) = formatted.split_once('.') else {
        return Ok(format!("{}.0", formatted));
    };

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        Ok(format!("{}.0", whole))
    } else {
        Ok(format!("{}.{}", whole, fraction))
    }
}

fn origin(log: &Log) -> EventOrigin {
    EventOrigin {
        transaction_hash: log
            .transaction_hash
            .map(|h| h.to_string())
            .unwrap_or_default(),
        block_number: log.block_number,
        log_index: log.log_index,
    }
}

fn decode_error(kind: EventKind, e: alloy::sol_types::Error) -> ServiceError {
    ServiceError::new(
        ErrorCode::DecodingError,
        format!("Cannot decode {} log: {}", kind, e),
    )
    .with_source(e)
}

/// Decode a log of a known kind into its normalized record.
///
/// Returns `Ok(None)` for logs whose first topic matches no known event.
pub fn normalize_log(log: &Log, decimals: u8) -> ServiceResult<Option<ContractEvent>> {
    let Some(kind) = log.topic0().and_then(EventKind::from_topic) else {
        return Ok(None);
    };

    let event = match kind {
        EventKind::DataListed => {
            let decoded = log
                .log_decode::<DataListed>()
                .map_err(|e| decode_error(kind, e))?;
            let event = decoded.inner.data;
            ContractEvent::DataListed(DataListedRecord {
                id: event.id.to_string(),
                seller: event.seller.to_checksum(None),
                price: format_amount(event.price, decimals)?,
                origin: origin(log),
            })
        }
        EventKind::DataPurchased => {
            let decoded = log
                .log_decode::<DataPurchased>()
                .map_err(|e| decode_error(kind, e))?;
            let event = decoded.inner.data;
            ContractEvent::DataPurchased(DataPurchasedRecord {
                id: event.id.to_string(),
                buyer: event.buyer.to_checksum(None),
                seller: event.seller.to_checksum(None),
                price: format_amount(event.price, decimals)?,
                origin: origin(log),
            })
        }
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, LogData, B256};
    use alloy::sol_types::SolEvent;

    fn rpc_log(data: LogData, block: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x11),
                data,
            },
            block_number: Some(block),
            transaction_hash: Some(B256::repeat_byte(0xcd)),
            log_index: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_one_ether() {
        let wei = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_amount(wei, 18).unwrap(), "1.0");
    }

    #[test]
    fn test_fractional_amounts() {
        assert_eq!(format_amount(U256::from(1_500_000_000_000_000_000u128), 18).unwrap(), "1.5");
        assert_eq!(format_amount(U256::from(1u64), 18).unwrap(), "0.000000000000000001");
        assert_eq!(format_amount(U256::ZERO, 18).unwrap(), "0.0");
        assert_eq!(format_amount(U256::from(1_234_500u64), 6).unwrap(), "1.2345");
    }

    #[test]
    fn test_normalize_purchase() {
        let buyer = Address::repeat_byte(0xaa);
        let seller = Address::repeat_byte(0xbb);
        let event = DataPurchased {
            id: U256::from(42u64),
            buyer,
            seller,
            price: U256::from(1_000_000_000_000_000_000u128),
        };
        let log = rpc_log(event.encode_log_data(), 12);

        let normalized = normalize_log(&log, 18).unwrap().unwrap();
        let ContractEvent::DataPurchased(record) = normalized else {
            panic!("expected DataPurchased");
        };
        assert_eq!(record.id, "42");
        assert_eq!(record.price, "1.0");
        assert_eq!(record.buyer, buyer.to_checksum(None));
        assert_eq!(record.seller, seller.to_checksum(None));
        assert_eq!(record.origin.transaction_hash, B256::repeat_byte(0xcd).to_string());
        assert_eq!(record.origin.block_number, Some(12));
    }

    #[test]
    fn test_unrelated_log_is_skipped() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0x01)], Default::default());
        assert!(normalize_log(&rpc_log(data, 1), 18).unwrap().is_none());
    }

    #[test]
    fn test_malformed_log_is_decoding_error() {
        let data = LogData::new_unchecked(vec![DataListed::SIGNATURE_HASH], Default::default());
        let err = normalize_log(&rpc_log(data, 1), 18).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DecodingError);
    }
}
