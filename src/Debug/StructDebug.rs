use std::fmt;
use crate::Core::alloc::{Message, PageAlignedBuffer, ScatterBufferSet, SerializedMessage};
use crate::Transport::WorkerRegistry;

/// Debug function for Message
///
/// Shows the field layout and whether each field still holds its fill
/// pattern. Field contents are never printed.
pub fn debug_message(message: &Message, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
        .field("fields", &message.field_count())
        .field("field_size", &message.field_size())
        .field("total_size", &message.total_size())
        .field("intact", &message.is_intact())
        .finish()
}

/// Debug function for SerializedMessage
pub fn debug_serialized_message(message: &SerializedMessage, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SerializedMessage")
        .field("total_size", &message.total_size())
        .field("field_size", &message.field_size())
        .field("data", &format_args!("{:p}", message.as_bytes().as_ptr()))
        .finish()
}

pub fn debug_scatter_buffer_set(set: &ScatterBufferSet, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ScatterBufferSet")
        .field("buffers", &set.len())
        .field("field_size", &set.field_size())
        .field("total_len", &set.total_len())
        .finish()
}

/// Debug function for PageAlignedBuffer
///
/// Displays the buffer's address and alignment without reading its contents
pub fn debug_page_aligned_buffer(buffer: &PageAlignedBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PageAlignedBuffer")
        .field("ptr", &format_args!("0x{:x}", buffer.as_ptr() as usize))
        .field("len", &buffer.len())
        .field("alignment", &buffer.alignment())
        .finish()
}

pub fn debug_worker_registry(registry: &WorkerRegistry, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let stats = registry.stats();
    f.debug_struct("WorkerRegistry")
        .field("capacity", &registry.capacity())
        .field("active", &registry.active())
        .field("admitted", &stats.admitted)
        .field("rejected", &stats.rejected)
        .finish_non_exhaustive()
}
