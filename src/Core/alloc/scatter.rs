use super::alloc_field;
use crate::Core::error::{Error, Result};
use std::io::IoSliceMut;

/// N independently allocated receive buffers addressed through one scatter
/// descriptor.
pub struct ScatterBufferSet {
    buffers: Vec<Box<[u8]>>,
    field_size: usize,
}

impl ScatterBufferSet {
    /// Allocate `count` zeroed buffers of `field_size` bytes each.
    pub fn allocate(count: usize, field_size: usize) -> Result<Self> {
        if field_size == 0 {
            return Err(Error::ZeroFieldSize);
        }
        let mut buffers = Vec::new();
        buffers
            .try_reserve_exact(count)
            .map_err(|_| Error::Allocation {
                field: 0,
                requested: field_size,
            })?;
        for index in 0..count {
            buffers.push(alloc_field(index, field_size, 0)?);
        }
        Ok(Self {
            buffers,
            field_size,
        })
    }

    pub fn field_size(&self) -> usize {
        self.field_size
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Sum of all buffer lengths.
    pub fn total_len(&self) -> usize {
        self.buffers.len() * self.field_size
    }

    pub fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(|b| &b[..])
    }

    /// Build the scatter descriptor over every buffer, in order.
    pub fn scatter_descriptor(&mut self) -> Vec<IoSliceMut<'_>> {
        self.buffers
            .iter_mut()
            .map(|b| IoSliceMut::new(&mut b[..]))
            .collect()
    }
}

/// A descriptor over the bytes of `iov` after the first `offset` bytes.
///
/// Used to complete a message after a short scattering receive.
pub fn remaining_mut<'a>(iov: &'a mut [IoSliceMut<'_>], offset: usize) -> Vec<IoSliceMut<'a>> {
    let mut skip = offset;
    let mut out = Vec::with_capacity(iov.len());
    for slice in iov.iter_mut() {
        let len = slice.len();
        if skip >= len {
            skip -= len;
            continue;
        }
        out.push(IoSliceMut::new(&mut slice[skip..]));
        skip = 0;
    }
    out
}
