use crate::Core::error::{Error, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

lazy_static::lazy_static! {
    static ref PAGE_SIZE: usize = {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as usize } else { 4096 }
    };
}

/// The system page size, queried once.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// A zeroed heap buffer whose start is aligned to the system page size.
///
/// Backs the zero-copy receiver's single receive buffer.
pub struct PageAlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl PageAlignedBuffer {
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::ZeroFieldSize);
        }
        let layout = Layout::from_size_align(len, page_size())
            .map_err(|e| Error::InvalidConfig(format!("bad aligned layout: {e}")))?;

        // Safety: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(Error::Allocation {
            field: 0,
            requested: len,
        })?;

        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for PageAlignedBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// The buffer is uniquely owned; moving it across threads is fine.
unsafe impl Send for PageAlignedBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_page_aligned() {
        let buf = PageAlignedBuffer::new(1000).unwrap();
        assert_eq!(buf.as_ptr() as usize % page_size(), 0);
        assert_eq!(buf.len(), 1000);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(PageAlignedBuffer::new(0).is_err());
    }
}
