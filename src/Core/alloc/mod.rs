use crate::Core::error::{Error, Result};
use std::io::IoSlice;
mod aligned;
mod debug;
mod getters;
mod scatter;

pub use aligned::{page_size, PageAlignedBuffer};
pub use scatter::{remaining_mut, ScatterBufferSet};

/// Number of independently allocated fields in every message.
pub const NUM_FIELDS: usize = 8;

const FILL_BASE: u8 = b'A';

/// The byte every position of field `index` is filled with ('A', 'B', 'C', ...).
#[inline]
pub fn fill_byte(index: usize) -> u8 {
    FILL_BASE + (index % 26) as u8
}

/// Check a contiguous run of message bytes against the fill pattern.
///
/// `bytes` must start on a message boundary; its length may be any multiple
/// of `field_size` (a partial field at the end is checked up to its length).
pub fn verify_pattern(field_size: usize, bytes: &[u8]) -> bool {
    if field_size == 0 {
        return bytes.is_empty();
    }
    bytes
        .chunks(field_size)
        .enumerate()
        .all(|(i, chunk)| field_matches(i % NUM_FIELDS, chunk))
}

/// Check one field's worth of bytes against the pattern for field `index`.
#[inline]
pub fn field_matches(index: usize, bytes: &[u8]) -> bool {
    let expected = fill_byte(index);
    bytes.iter().all(|&b| b == expected)
}

// Fallible per-field allocation. A failed reservation is reported with the
// index of the field that could not be allocated.
pub(crate) fn alloc_field(index: usize, field_size: usize, fill: u8) -> Result<Box<[u8]>> {
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(field_size).map_err(|_| Error::Allocation {
        field: index,
        requested: field_size,
    })?;
    buf.resize(field_size, fill);
    Ok(buf.into_boxed_slice())
}

/// A logical payload split into equal-size, independently heap-allocated fields.
///
/// The fields are filled once at allocation time and never mutated afterwards,
/// which is what lets the zero-copy sender hand the same pages to the kernel on
/// every iteration.
pub struct Message {
    fields: Vec<Box<[u8]>>,
    field_size: usize,
}

impl Message {
    /// Allocate a message of [`NUM_FIELDS`] fields of `field_size` bytes each.
    pub fn allocate(field_size: usize) -> Result<Self> {
        Self::with_fields(NUM_FIELDS, field_size)
    }

    /// Allocate a message with an explicit field count.
    ///
    /// If any field allocation fails, the fields allocated so far are dropped
    /// before the error is returned.
    pub fn with_fields(count: usize, field_size: usize) -> Result<Self> {
        if field_size == 0 {
            return Err(Error::ZeroFieldSize);
        }
        if count == 0 {
            return Err(Error::InvalidConfig("a message needs at least one field".into()));
        }

        let mut fields = Vec::new();
        fields
            .try_reserve_exact(count)
            .map_err(|_| Error::Allocation {
                field: 0,
                requested: field_size,
            })?;

        for index in 0..count {
            fields.push(alloc_field(index, field_size, fill_byte(index))?);
        }

        Ok(Self { fields, field_size })
    }

    /// Release the message and all of its fields.
    pub fn release(self) {
        drop(self);
    }

    /// Copy every field back-to-back into one contiguous buffer.
    pub fn serialize(&self) -> Result<SerializedMessage> {
        let total = self.total_size();
        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| Error::SerializeAllocation { requested: total })?;

        for field in &self.fields {
            data.extend_from_slice(field);
        }

        Ok(SerializedMessage {
            data: data.into_boxed_slice(),
            field_size: self.field_size,
        })
    }

    /// Build a gather descriptor over the fields, in field order, without copying.
    pub fn gather_descriptor(&self) -> GatherDescriptor<'_> {
        GatherDescriptor::new(self.fields.iter().map(|f| &f[..]).collect())
    }
}

/// All fields of a [`Message`] copied into one contiguous buffer.
pub struct SerializedMessage {
    data: Box<[u8]>,
    field_size: usize,
}

impl SerializedMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    pub fn field_size(&self) -> usize {
        self.field_size
    }

    /// The bytes belonging to field `index`, if it exists.
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.field_size)?;
        let end = start.checked_add(self.field_size)?;
        self.data.get(start..end)
    }
}

/// An ordered list of `{pointer, length}` pairs over borrowed buffers.
///
/// The borrow keeps every referenced buffer alive and unmodified for as long
/// as the descriptor exists.
pub struct GatherDescriptor<'a> {
    parts: Vec<&'a [u8]>,
    slices: Vec<IoSlice<'a>>,
    total: usize,
}

impl<'a> GatherDescriptor<'a> {
    pub fn new(parts: Vec<&'a [u8]>) -> Self {
        let slices = parts.iter().map(|&p| IoSlice::new(p)).collect();
        let total = parts.iter().map(|p| p.len()).sum();
        Self {
            parts,
            slices,
            total,
        }
    }

    /// The full descriptor, ready to pass to a gathering send.
    pub fn slices(&self) -> &[IoSlice<'a>] {
        &self.slices
    }

    /// Sum of all entry lengths.
    pub fn total_len(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// A descriptor covering only the bytes after the first `offset` bytes.
    ///
    /// Used to finish a message after a short send.
    pub fn remaining_after(&self, offset: usize) -> Vec<IoSlice<'a>> {
        let mut skip = offset;
        let mut out = Vec::with_capacity(self.parts.len());
        for &part in &self.parts {
            if skip >= part.len() {
                skip -= part.len();
                continue;
            }
            out.push(IoSlice::new(&part[skip..]));
            skip = 0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_follow_fill_pattern() {
        let msg = Message::allocate(16).unwrap();
        for i in 0..NUM_FIELDS {
            assert!(msg.field(i).unwrap().iter().all(|&b| b == fill_byte(i)));
        }
        assert_eq!(fill_byte(0), b'A');
        assert_eq!(fill_byte(7), b'H');
    }

    #[test]
    fn serialized_fields_line_up() {
        let msg = Message::allocate(4).unwrap();
        let ser = msg.serialize().unwrap();
        assert_eq!(&ser.as_bytes()[..8], b"AAAABBBB");
        assert_eq!(ser.field(7), Some(&b"HHHH"[..]));
        assert_eq!(ser.field(8), None);
    }

    #[test]
    fn remaining_after_skips_whole_and_partial_entries() {
        let msg = Message::allocate(4).unwrap();
        let desc = msg.gather_descriptor();

        let rest = desc.remaining_after(6);
        assert_eq!(rest.len(), NUM_FIELDS - 1);
        assert_eq!(&*rest[0], b"BB");
        assert_eq!(rest.iter().map(|s| s.len()).sum::<usize>(), desc.total_len() - 6);

        assert!(desc.remaining_after(desc.total_len()).is_empty());
    }

    #[test]
    fn zero_field_size_is_rejected() {
        assert!(matches!(Message::allocate(0), Err(Error::ZeroFieldSize)));
    }

    #[test]
    fn verify_pattern_detects_corruption() {
        let msg = Message::allocate(8).unwrap();
        let mut bytes = msg.serialize().unwrap().as_bytes().to_vec();
        assert!(verify_pattern(8, &bytes));
        // a second message back-to-back is still aligned
        let again = bytes.clone();
        bytes.extend_from_slice(&again);
        assert!(verify_pattern(8, &bytes));
        bytes[20] = b'Z';
        assert!(!verify_pattern(8, &bytes));
    }
}
