//! Helpers for explicit wire byte-order conversions.
//!
//! Every integer on the wire is little-endian. These helpers keep Clippy
//! expectations scoped to the conversion points so protocol code can remain
//! explicit about wire endianness without repeating lint annotations.

/// Serialise an `i32` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use docwire::byte_order::write_wire_i32;
///
/// assert_eq!(write_wire_i32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub fn write_wire_i32(value: i32) -> [u8; 4] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The wire protocol encodes integers as little-endian."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `i32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use docwire::byte_order::read_wire_i32;
///
/// assert_eq!(read_wire_i32([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
/// assert_eq!(read_wire_i32([0xff, 0xff, 0xff, 0xff]), -1);
/// ```
#[must_use]
pub fn read_wire_i32(bytes: [u8; 4]) -> i32 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The wire protocol encodes integers as little-endian."
    )]
    i32::from_le_bytes(bytes)
}

/// Parse a wire-order `u32` from its on-wire representation.
#[must_use]
pub fn read_wire_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The wire protocol encodes integers as little-endian."
    )]
    u32::from_le_bytes(bytes)
}

/// Parse a wire-order `i64` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use docwire::byte_order::read_wire_i64;
///
/// assert_eq!(read_wire_i64([1, 0, 0, 0, 0, 0, 0, 0]), 1);
/// ```
#[must_use]
pub fn read_wire_i64(bytes: [u8; 8]) -> i64 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The wire protocol encodes integers as little-endian."
    )]
    i64::from_le_bytes(bytes)
}

/// Read the little-endian `i32` at `offset`, if `bytes` is long enough.
pub(crate) fn i32_at(bytes: &[u8], offset: usize) -> Option<i32> {
    let end = offset.checked_add(4)?;
    bytes
        .get(offset..end)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(read_wire_i32)
}

/// Read the little-endian `u32` at `offset`, if `bytes` is long enough.
pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    bytes
        .get(offset..end)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(read_wire_u32)
}

/// Read the little-endian `i64` at `offset`, if `bytes` is long enough.
pub(crate) fn i64_at(bytes: &[u8], offset: usize) -> Option<i64> {
    let end = offset.checked_add(8)?;
    bytes
        .get(offset..end)
        .and_then(|slice| <[u8; 8]>::try_from(slice).ok())
        .map(read_wire_i64)
}
