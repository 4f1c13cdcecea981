//! Maps a [`RawEvent`] onto the canonical [`Memo`] record.
//!
//! Arguments are positional: `[from, timestamp, name, message]`. The block
//! number and transaction hash come from whichever envelope the event was
//! delivered in.

use alloy_dyn_abi::DynSolValue;
use chrono::{DateTime, Utc};

use crate::error::IngestError;
use crate::types::{Memo, RawEvent};

const ARG_FROM: usize = 0;
const ARG_TIMESTAMP: usize = 1;
const ARG_NAME: usize = 2;
const ARG_MESSAGE: usize = 3;

/// Normalize a raw `NewMemo` event.
pub fn normalize(raw: &RawEvent) -> Result<Memo, IngestError> {
    let (args, block_number, tx_hash) = match raw {
        RawEvent::Historical(e) => (&e.args, e.block_number, &e.transaction_hash),
        RawEvent::Live(e) => (&e.args, e.log.block_number, &e.log.transaction_hash),
    };

    Ok(Memo {
        sender_address: address_at(args, ARG_FROM)?,
        timestamp: timestamp_at(args, ARG_TIMESTAMP)?,
        name: string_at(args, ARG_NAME)?,
        message: string_at(args, ARG_MESSAGE)?,
        block_number,
        tx_hash: tx_hash.clone(),
    })
}

fn arg(args: &[DynSolValue], idx: usize) -> Result<&DynSolValue, IngestError> {
    args.get(idx).ok_or_else(|| {
        IngestError::Normalize(format!("missing argument {idx} (event has {})", args.len()))
    })
}

fn address_at(args: &[DynSolValue], idx: usize) -> Result<String, IngestError> {
    match arg(args, idx)? {
        DynSolValue::Address(a) => Ok(a.to_checksum(None)),
        other => Err(mismatch(idx, "address", other)),
    }
}

fn string_at(args: &[DynSolValue], idx: usize) -> Result<String, IngestError> {
    match arg(args, idx)? {
        DynSolValue::String(s) => Ok(s.clone()),
        other => Err(mismatch(idx, "string", other)),
    }
}

/// Unix seconds → milliseconds → UTC timestamp.
fn timestamp_at(args: &[DynSolValue], idx: usize) -> Result<DateTime<Utc>, IngestError> {
    let secs = match arg(args, idx)? {
        DynSolValue::Uint(u, _) => u64::try_from(*u)
            .ok()
            .and_then(|s| i64::try_from(s).ok())
            .ok_or_else(|| IngestError::Normalize(format!("timestamp {u} out of range")))?,
        other => return Err(mismatch(idx, "uint", other)),
    };
    secs.checked_mul(1000)
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| IngestError::Normalize(format!("timestamp {secs} out of range")))
}

fn mismatch(idx: usize, expected: &str, got: &DynSolValue) -> IngestError {
    let got = got
        .as_type()
        .map(|t| t.sol_type_name().into_owned())
        .unwrap_or_else(|| "unknown".into());
    IngestError::Normalize(format!("argument {idx}: expected {expected}, got {got}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HistoricalEvent, LiveEvent, LogLocation};
    use alloy_primitives::{Address, U256};

    const SENDER: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    fn args(ts: u64) -> Vec<DynSolValue> {
        vec![
            DynSolValue::Address(SENDER.parse::<Address>().unwrap()),
            DynSolValue::Uint(U256::from(ts), 256),
            DynSolValue::String("alice".into()),
            DynSolValue::String("thanks for the coffee".into()),
        ]
    }

    fn tx() -> String {
        format!("0x{}", "5e".repeat(32))
    }

    fn historical(args: Vec<DynSolValue>) -> RawEvent {
        RawEvent::Historical(HistoricalEvent {
            args,
            block_number: 103,
            transaction_hash: tx(),
        })
    }

    #[test]
    fn historical_event_fields() {
        let memo = normalize(&historical(args(1_700_000_000))).unwrap();
        assert_eq!(memo.sender_address, SENDER);
        assert_eq!(memo.sender_address.len(), 42);
        assert_eq!(memo.name, "alice");
        assert_eq!(memo.message, "thanks for the coffee");
        assert_eq!(memo.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(memo.block_number, 103);
        assert_eq!(memo.tx_hash.len(), 66);
    }

    #[test]
    fn both_envelopes_normalize_identically() {
        let hist = historical(args(1_700_000_000));
        let live = RawEvent::Live(LiveEvent {
            args: args(1_700_000_000),
            log: LogLocation {
                block_number: 103,
                transaction_hash: tx(),
            },
        });
        assert_eq!(normalize(&hist).unwrap(), normalize(&live).unwrap());
    }

    #[test]
    fn empty_strings_pass_through() {
        let mut a = args(0);
        a[ARG_NAME] = DynSolValue::String(String::new());
        let memo = normalize(&historical(a)).unwrap();
        assert_eq!(memo.name, "");
        assert_eq!(memo.timestamp.timestamp(), 0);
    }

    #[test]
    fn wrong_shape_is_normalize_error() {
        let mut a = args(1);
        a[ARG_TIMESTAMP] = DynSolValue::String("yesterday".into());
        assert!(matches!(normalize(&historical(a)), Err(IngestError::Normalize(_))));

        let short = args(1).into_iter().take(2).collect();
        assert!(matches!(normalize(&historical(short)), Err(IngestError::Normalize(_))));
    }

    #[test]
    fn oversized_timestamp_is_normalize_error() {
        let mut a = args(0);
        a[ARG_TIMESTAMP] = DynSolValue::Uint(U256::MAX, 256);
        assert!(matches!(normalize(&historical(a)), Err(IngestError::Normalize(_))));
    }
}
