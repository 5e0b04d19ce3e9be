//! Input checks shared by the REST handlers.

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Upper bound for a single points amount: adjustments, quest rewards, task points.
pub const MAX_POINTS: i64 = 1_000_000_000;

/// `0x` followed by 40 hex digits.
pub fn is_evm_address(s: &str) -> bool {
    hex_with_prefix(s, 20)
}

/// `0x` followed by 64 hex digits.
pub fn is_tx_hash(s: &str) -> bool {
    hex_with_prefix(s, 32)
}

fn hex_with_prefix(s: &str, bytes: usize) -> bool {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) if digits.len() == bytes * 2 => hex::decode(digits).is_ok(),
        _ => false,
    }
}

pub fn normalize_address(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Trims text content and checks it is non-empty and at most `max_chars`.
pub fn message_content(raw: &str, max_chars: usize) -> Result<String, &'static str> {
    let content = raw.trim();
    if content.is_empty() {
        return Err("content must not be empty");
    }
    if content.chars().count() > max_chars {
        return Err("content is too long");
    }
    Ok(content.to_string())
}

/// NFT token ids are uint256 values written in decimal.
pub fn is_token_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= 78 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Canonical decimal form of a token id: `"007"` and `"7"` are the same token.
pub fn normalize_token_id(s: &str) -> Option<String> {
    let s = s.trim();
    if !s.bytes().all(|b| b.is_ascii_digit()) || s.is_empty() {
        return None;
    }
    let digits = s.trim_start_matches('0');
    let canonical = if digits.is_empty() { "0" } else { digits };
    is_token_id(canonical).then(|| canonical.to_string())
}
