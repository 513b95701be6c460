//! Human-readable renderings of instruction words for debugging.

/// Render a word as `0x` followed by eight lowercase hex digits.
pub fn to_hex(ins: u32) -> String {
    format!("{ins:#010x}")
}

/// Render a word as `0b` followed by all 32 bits.
pub fn to_bin(ins: u32) -> String {
    format!("{ins:#034b}")
}
