use std::io::{self, Write};

use leaseflake::{LeaseflakeId, SystemClock, TimeSource};
use leaseflake_lease::SlotLeaseRecord;
use serde::Serialize;

/// An ID with its fields spelled out.
#[derive(Debug, Serialize)]
pub struct DecodedId {
    pub id: LeaseflakeId,
    pub timestamp_ms: u64,
    pub slot: u8,
    pub sequence: u16,
}

impl From<LeaseflakeId> for DecodedId {
    fn from(id: LeaseflakeId) -> Self {
        let (timestamp_ms, slot, sequence) = id.decode();
        Self {
            id,
            timestamp_ms,
            slot,
            sequence,
        }
    }
}

/// One row of the lease table as reported by `status`.
#[derive(Debug, Serialize)]
pub struct LeaseRow {
    pub slot: u8,
    pub owner_token: Option<String>,
    pub version: i64,
    pub expires_at_ms: i64,
    /// Milliseconds until expiry by the local clock; negative once expired.
    pub expires_in_ms: i64,
}

impl From<SlotLeaseRecord> for LeaseRow {
    fn from(record: SlotLeaseRecord) -> Self {
        let now = i64::try_from(SystemClock.current_millis()).unwrap_or(i64::MAX);
        Self {
            slot: record.slot,
            owner_token: (!record.owner_token.is_empty()).then_some(record.owner_token),
            version: record.version,
            expires_at_ms: record.expires_at_millis,
            expires_in_ms: record.expires_at_millis.saturating_sub(now),
        }
    }
}

pub fn write_id(out: &mut impl Write, id: LeaseflakeId, json: bool) -> io::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, &DecodedId::from(id))?;
        writeln!(out)
    } else {
        writeln!(out, "{id}")
    }
}

pub fn write_decoded(out: &mut impl Write, id: LeaseflakeId, json: bool) -> io::Result<()> {
    if json {
        return write_id(out, id, true);
    }
    let (timestamp_ms, slot, sequence) = id.decode();
    writeln!(
        out,
        "{id}\ttimestamp_ms={timestamp_ms}\tslot={slot}\tsequence={sequence}"
    )
}

pub fn write_lease_row(out: &mut impl Write, row: &LeaseRow, json: bool) -> io::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, row)?;
        return writeln!(out);
    }
    let owner = row.owner_token.as_deref().unwrap_or("-");
    let state = if row.owner_token.is_none() {
        "never leased"
    } else if row.expires_in_ms > 0 {
        "leased"
    } else {
        "expired"
    };
    writeln!(
        out,
        "{:>3}  {:<12}  v{:<6}  {:>10}ms  {owner}",
        row.slot, state, row.version, row.expires_in_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn ids_print_as_plain_numbers() {
        let id = LeaseflakeId::encode(1_700_000_000_000, 5, 42).unwrap();
        let text = render(|out| write_id(out, id, false));
        assert_eq!(text, format!("{}\n", id.to_raw()));
    }

    #[test]
    fn json_lines_carry_the_decoded_fields() {
        let id = LeaseflakeId::encode(1_700_000_000_000, 5, 42).unwrap();
        let text = render(|out| write_id(out, id, true));
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["id"], id.to_raw());
        assert_eq!(value["timestamp_ms"], 1_700_000_000_000_u64);
        assert_eq!(value["slot"], 5);
        assert_eq!(value["sequence"], 42);
    }

    #[test]
    fn decoded_text_names_each_field() {
        let id = LeaseflakeId::encode(7, 127, 4095).unwrap();
        let text = render(|out| write_decoded(out, id, false));
        assert!(text.ends_with("timestamp_ms=7\tslot=127\tsequence=4095\n"));
    }

    #[test]
    fn unleased_rows_have_no_owner() {
        let row = LeaseRow::from(SlotLeaseRecord {
            slot: 3,
            owner_token: String::new(),
            version: 0,
            expires_at_millis: 0,
        });
        assert_eq!(row.owner_token, None);
        assert!(row.expires_in_ms < 0);
        let text = render(|out| write_lease_row(out, &row, false));
        assert!(text.contains("never leased"));
    }
}
