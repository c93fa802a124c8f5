/// Organization ACL Kernel: Address Primitives
///
/// Entity identifiers are plain strings. Hex addresses are compared
/// case-insensitively, so they are normalized to lowercase on entry.

use crate::error::AclError;

/// Sentinel grantee: a permission granted to this address allows every sender.
pub const ANY_ENTITY: &str = "0xffffffffffffffffffffffffffffffffffffffff";

/// Manager value meaning "no manager": the role becomes unmanaged.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Byte length of a well-formed address.
pub const ADDRESS_BYTES: usize = 20;

/// Normalize an entity identifier: trimmed, and lowercased when it is hex.
pub fn normalize(id: &str) -> String {
    let id = id.trim();
    if is_hex_prefixed(id) {
        id.to_ascii_lowercase()
    } else {
        id.to_string()
    }
}

/// True if `id` is `0x` followed by exactly 40 hex digits.
pub fn is_address(id: &str) -> bool {
    let Some(digits) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
        return false;
    };
    digits.len() == ADDRESS_BYTES * 2 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a well-formed address, returning it normalized.
pub fn validate_address(id: &str) -> Result<String, AclError> {
    let normalized = normalize(id);
    if is_address(&normalized) {
        Ok(normalized)
    } else {
        Err(AclError::InvalidAddress(format!(
            "{:?} is not a 20-byte hex address",
            id
        )))
    }
}

/// Decode a well-formed address into its raw bytes.
pub fn address_bytes(id: &str) -> Result<[u8; ADDRESS_BYTES], AclError> {
    let normalized = validate_address(id)?;
    let mut out = [0u8; ADDRESS_BYTES];
    hex::decode_to_slice(&normalized[2..], &mut out)
        .map_err(|e| AclError::InvalidAddress(format!("{:?}: {}", id, e)))?;
    Ok(out)
}

fn is_hex_prefixed(id: &str) -> bool {
    (id.starts_with("0x") || id.starts_with("0X"))
        && id.len() > 2
        && id[2..].chars().all(|c| c.is_ascii_hexdigit())
}
