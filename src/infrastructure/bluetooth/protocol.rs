//! Label Printer Protocol
//!
//! GATT layout of the printer's BLE parser service. The payload written to
//! the write characteristic is an opaque printer command stream (CPCL/ZPL).

use anyhow::Result;
use uuid::Uuid;

/// Device Information Service (short form "180A")
pub const DEVICE_INFO_SERVICE_UUID: &str = "0000180A-0000-1000-8000-00805F9B34FB";

/// Printer parser service
pub const PRINTER_SERVICE_UUID: &str = "38EB4A80-C570-11E3-9507-0002A5D5C51B";

/// Read from printer characteristic
pub const READ_CHAR_UUID: &str = "38EB4A81-C570-11E3-9507-0002A5D5C51B";

/// Write to printer characteristic - where the command stream goes
pub const WRITE_CHAR_UUID: &str = "38EB4A82-C570-11E3-9507-0002A5D5C51B";

/// Advertised name fragment of compatible printers
pub const PRINTER_NAME_MARKER: &str = "JJKY";

/// Bluetooth base UUID used to expand 16/32-bit short forms
const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805F9B34FB";

/// CPCL test label printed by `print` when no payload is given
pub const TEST_LABEL: &str = "! 0 200 200 450 1\r\n\
COUNTRY CHINA\r\n\
SPEED 4\r\n\
BARCODE-TEXT 7 0 5\r\n\
BARCODE 128 1 1 50 0 20 250123456789\r\n\
BARCODE-TEXT OFF\r\n\
PRINT\r\n";

/// Parse a UUID string, accepting the 16-bit ("180A") and 32-bit short forms
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid> {
    let trimmed = uuid_str.trim();
    let is_short = matches!(trimmed.len(), 4 | 8) && trimmed.chars().all(|c| c.is_ascii_hexdigit());

    let uuid = if is_short {
        Uuid::parse_str(&format!("{:0>8}{}", trimmed, BASE_UUID_SUFFIX))?
    } else {
        Uuid::parse_str(trimmed)?
    };
    Ok(uuid)
}

/// Compare two UUID strings regardless of case or short/long form
pub fn uuid_matches(a: &str, b: &str) -> bool {
    match (parse_uuid(a), parse_uuid(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid() {
        let uuid = parse_uuid(PRINTER_SERVICE_UUID).unwrap();
        assert_eq!(uuid.as_u128() >> 96, 0x38eb4a80);
    }

    #[test]
    fn test_short_form_expands_to_base_uuid() {
        assert_eq!(
            parse_uuid("180A").unwrap(),
            parse_uuid(DEVICE_INFO_SERVICE_UUID).unwrap()
        );
        assert_eq!(
            parse_uuid("0000180a").unwrap(),
            parse_uuid(DEVICE_INFO_SERVICE_UUID).unwrap()
        );
    }

    #[test]
    fn test_uuid_matches_ignores_case() {
        assert!(uuid_matches(
            WRITE_CHAR_UUID,
            "38eb4a82-c570-11e3-9507-0002a5d5c51b"
        ));
        assert!(!uuid_matches(WRITE_CHAR_UUID, READ_CHAR_UUID));
        assert!(uuid_matches("not-a-uuid", "NOT-A-UUID"));
    }

    #[test]
    fn test_label_is_crlf_terminated() {
        assert!(TEST_LABEL.starts_with("! 0 200 200 450 1\r\n"));
        assert!(TEST_LABEL.ends_with("PRINT\r\n"));
    }
}
