// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Owned secret byte buffer with zeroize-on-drop semantics.

use zeroize::Zeroize;

/// An owned, length-tagged buffer for secret material (raw keys, sealed
/// blobs, random handles). Bytes are overwritten before the buffer is
/// released, whether by an explicit [`KeyBlob::clear`] or on drop.
#[derive(Clone, Default)]
pub struct KeyBlob {
    data: Option<Vec<u8>>,
}

impl KeyBlob {
    pub fn empty() -> Self {
        Self { data: None }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }

    /// Allocates `size` zeroed bytes. Fails if this blob already holds data.
    pub fn alloc(&mut self, size: usize) -> Result<(), &'static str> {
        if self.data.is_some() {
            return Err("key blob already holds data");
        }
        self.data = Some(vec![0u8; size]);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.data.as_ref().map(|d| d.is_empty()).unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map(|d| d.len()).unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    /// Overwrites and releases the held bytes, leaving the blob empty.
    pub fn clear(&mut self) {
        if let Some(mut d) = self.data.take() {
            d.zeroize();
        }
    }

    /// Hex form for diagnostics. Callers must only interpolate this into
    /// trace-level log messages, never at info level or above.
    pub fn to_hex_string(&self) -> String {
        hex::encode(self.as_slice())
    }
}

impl Drop for KeyBlob {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for KeyBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBlob").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_clear_empties_blob() {
        let mut blob = KeyBlob::empty();
        assert!(blob.is_empty());
        blob.alloc(32).unwrap();
        assert_eq!(blob.len(), 32);
        assert!(!blob.is_empty());
        blob.clear();
        assert!(blob.is_empty());
    }

    #[test]
    fn double_alloc_rejected() {
        let mut blob = KeyBlob::from_vec(vec![1, 2, 3]);
        assert!(blob.alloc(8).is_err());
    }

    #[test]
    fn hex_round_trips_through_known_bytes() {
        let blob = KeyBlob::from_vec(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(blob.to_hex_string(), "deadbeef");
    }
}
