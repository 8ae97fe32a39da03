// Allocation tracking tests for message and receive buffers
//
// Note: every test here is marked with #[serial_test::serial]. dhat only
// allows one profiler at a time, and its heap counters see allocations from
// every thread, so nothing else may run alongside a measurement.
//
// # Run all allocation tracking tests
// cargo test --test allocation_tracking -- --nocapture

use dmxp_netcopy::Core::alloc::{Message, PageAlignedBuffer, ScatterBufferSet, NUM_FIELDS};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
#[serial_test::serial]
fn test_message_release_with_dhat() {
    println!("\n--- Running message release with dhat ---");
    let _dhat = dhat::Profiler::builder().testing().build();

    let field_size = 4096;
    let before = dhat::HeapStats::get();

    let message = Message::allocate(field_size).unwrap();
    let during = dhat::HeapStats::get();
    assert!(during.curr_bytes - before.curr_bytes >= NUM_FIELDS * field_size);
    // one block per field plus the field table
    assert_eq!(during.curr_blocks - before.curr_blocks, NUM_FIELDS + 1);

    message.release();
    let after = dhat::HeapStats::get();
    assert_eq!(after.curr_blocks, before.curr_blocks);
    assert_eq!(after.curr_bytes, before.curr_bytes);
    println!("✓ Every field was freed on release");
}

#[test]
#[serial_test::serial]
fn test_serialize_allocates_exactly_once_with_dhat() {
    let _dhat = dhat::Profiler::builder().testing().build();

    let message = Message::allocate(512).unwrap();
    let before = dhat::HeapStats::get();
    let serialized = message.serialize().unwrap();
    let during = dhat::HeapStats::get();
    assert_eq!(during.total_blocks - before.total_blocks, 1);
    assert_eq!(serialized.total_size(), 512 * NUM_FIELDS);

    drop(serialized);
    assert_eq!(dhat::HeapStats::get().curr_blocks, before.curr_blocks);
}

#[test]
#[serial_test::serial]
fn test_receive_buffers_are_freed_with_dhat() {
    let _dhat = dhat::Profiler::builder().testing().build();
    let before = dhat::HeapStats::get();

    {
        let mut set = ScatterBufferSet::allocate(NUM_FIELDS, 2048).unwrap();
        let iov = set.scatter_descriptor();
        assert_eq!(iov.len(), NUM_FIELDS);
        let aligned = PageAlignedBuffer::new(2048 * NUM_FIELDS).unwrap();
        assert_eq!(aligned.len(), 2048 * NUM_FIELDS);
    }

    let after = dhat::HeapStats::get();
    assert_eq!(after.curr_blocks, before.curr_blocks);
    assert_eq!(after.curr_bytes, before.curr_bytes);
}

#[test]
#[serial_test::serial]
fn test_repeated_allocation_with_memory_stats() {
    println!("\n--- Running repeated allocation with memory-stats ---");
    use memory_stats::memory_stats;

    let before = memory_stats();
    println!("Memory before: {:?}", before);

    for _ in 0..200 {
        let message = Message::allocate(64 * 1024).unwrap();
        let serialized = message.serialize().unwrap();
        assert_eq!(serialized.total_size(), 64 * 1024 * NUM_FIELDS);
        message.release();
    }

    let after = memory_stats();
    println!("Memory after: {:?}", after);

    if let (Some(b), Some(a)) = (before, after) {
        let delta = a.physical_mem as i64 - b.physical_mem as i64;
        println!("Memory delta: {} bytes ({:.2} KB)", delta, delta as f64 / 1024.0);
        // 200 leaked messages would be over 100 MB
        assert!(delta < 64 * 1024 * 1024, "memory grew by {delta} bytes");
    }
}
