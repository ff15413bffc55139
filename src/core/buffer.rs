/*!
Buffer views over growable byte sequences.

A view is a non-owning window that starts at an offset into a sequence, so
partial reads and writes can continue where the previous one stopped
without copying the sequence.
*/

use std::ops::{Deref, DerefMut};

/// Growable byte sequence exchanged with the session and the transport
pub type Data = Vec<u8>;

/// Read-only window over a byte sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataConstBuffer<'a> {
    data: &'a [u8],
}

impl<'a> DataConstBuffer<'a> {
    /// View the whole sequence
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// View the sequence from `offset` to its end.
    ///
    /// An offset past the end yields an empty view.
    pub fn with_offset(data: &'a [u8], offset: usize) -> Self {
        let start = offset.min(data.len());
        Self { data: &data[start..] }
    }

    /// The viewed bytes
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }
}

impl Deref for DataConstBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

/// Mutable window over a byte sequence
#[derive(Debug, PartialEq, Eq)]
pub struct DataBuffer<'a> {
    data: &'a mut [u8],
}

impl<'a> DataBuffer<'a> {
    /// View the whole sequence
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// View the sequence from `offset` to its current end.
    ///
    /// An offset past the end yields an empty view.
    pub fn with_offset(data: &'a mut [u8], offset: usize) -> Self {
        let start = offset.min(data.len());
        Self { data: &mut data[start..] }
    }

    /// The viewed bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data
    }
}

impl Deref for DataBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl DerefMut for DataBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}
