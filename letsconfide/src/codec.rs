// SPDX-FileCopyrightText: © 2026 The LetsConfide Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Sized byte arrays
//!
//! A sized byte array concatenates length-prefixed segments:
//! `<len:u16 big-endian><bytes>` for each element. It is the binary framing
//! used inside wrapped keys, the serialized secrets list and the persisted
//! device token list.

use anyhow::{bail, Result};

/// Largest element a sized byte array can carry.
const MAX_ELEMENT_SIZE: usize = u16::MAX as usize;

/// Combine a list of byte segments into a single sized byte array.
///
/// This is the inverse of [`decode`].
pub fn encode<T: AsRef<[u8]>>(parts: &[T]) -> Result<Vec<u8>> {
    let total: usize = parts.iter().map(|p| 2 + p.as_ref().len()).sum();
    let mut result = Vec::with_capacity(total);
    for part in parts {
        let part = part.as_ref();
        if part.len() > MAX_ELEMENT_SIZE {
            bail!("Data elements greater than {MAX_ELEMENT_SIZE} are not supported.");
        }
        result.extend_from_slice(&(part.len() as u16).to_be_bytes());
        result.extend_from_slice(part);
    }
    Ok(result)
}

/// Split a sized byte array into its constituent segments.
///
/// Decoding is total: every input byte must belong to a well-formed segment.
pub fn decode(input: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut result = Vec::with_capacity(2);
    let mut pos = 0usize;
    while pos < input.len() {
        let size = next_segment_size(input, pos)?;
        // Advance past the two bytes encoding the segment size.
        pos += 2;
        if input.len() < pos + size {
            bail!("Invalid sized byte array, byte segment size {size} at index {pos} is too large");
        }
        result.push(input[pos..pos + size].to_vec());
        pos += size;
    }
    Ok(result)
}

/// Size of the segment starting at `start`. The two size bytes are widened
/// into a 32-bit integer whose upper 16 bits are zero; values ≤ 0 are
/// rejected.
fn next_segment_size(input: &[u8], start: usize) -> Result<usize> {
    if input.len() - start < 2 {
        bail!("Invalid sized byte array, truncated size at index {start}");
    }
    let size = i32::from(u16::from_be_bytes([input[start], input[start + 1]]));
    if size <= 0 {
        bail!("Invalid sized byte array, negative size {size} at index {start}");
    }
    Ok(size as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let parts: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![0xFF; 16], vec![7]];
        let encoded = encode(&parts).unwrap();
        assert_eq!(encoded.len(), 3 * 2 + 3 + 16 + 1);
        assert_eq!(decode(&encoded).unwrap(), parts);
    }

    #[test]
    fn test_encode_empty_list() {
        assert!(encode::<Vec<u8>>(&[]).unwrap().is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_encode_element_too_large() {
        let parts = vec![vec![0u8; MAX_ELEMENT_SIZE + 1]];
        let err = encode(&parts).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Data elements greater than 65535 are not supported."
        );

        // The maximum size itself is accepted.
        let parts = vec![vec![0u8; MAX_ELEMENT_SIZE]];
        let encoded = encode(&parts).unwrap();
        assert_eq!(decode(&encoded).unwrap(), parts);
    }

    #[test]
    fn test_decode_segment_too_large() {
        // A 32-byte buffer whose first two bytes claim a 33-byte segment.
        let mut input = vec![0xA5u8; 32];
        input[0] = 0;
        input[1] = 33;
        let err = decode(&input).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid sized byte array, byte segment size 33 at index 2 is too large"
        );
    }

    #[test]
    fn test_decode_zero_size() {
        let input = [0u8, 0, 1];
        let err = decode(&input).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid sized byte array, negative size 0 at index 0"
        );
    }

    #[test]
    fn test_decode_truncated_size() {
        let encoded = encode(&[vec![9u8, 9]]).unwrap();
        let mut input = encoded.clone();
        input.push(0); // lone trailing byte
        let err = decode(&input).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid sized byte array, truncated size at index 4"
        );
    }
}
