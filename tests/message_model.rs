use dmxp_netcopy::Core::alloc::{fill_byte, remaining_mut, verify_pattern, Message, ScatterBufferSet, NUM_FIELDS};
use dmxp_netcopy::Error;

#[test]
fn random_field_sizes_keep_layout_invariants() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..64 {
        let field_size = rng.usize(1..=16 * 1024);
        let message = Message::allocate(field_size).unwrap();

        assert_eq!(message.field_count(), NUM_FIELDS);
        assert_eq!(message.total_size(), NUM_FIELDS * field_size);
        assert!(message.is_intact());

        let desc = message.gather_descriptor();
        assert_eq!(desc.len(), NUM_FIELDS);
        assert_eq!(desc.total_len(), message.total_size());
        assert_eq!(desc.slices().iter().map(|s| s.len()).sum::<usize>(), message.total_size());
        // descriptor entries point at the fields themselves
        for (slice, field) in desc.slices().iter().zip(message.fields()) {
            assert_eq!(slice.as_ptr(), field.as_ptr());
        }

        let serialized = message.serialize().unwrap();
        let concatenated: Vec<u8> = message.fields().flatten().copied().collect();
        assert_eq!(serialized.as_bytes(), &concatenated[..]);
        assert!(verify_pattern(field_size, serialized.as_bytes()));
    }
}

#[test]
fn short_send_offsets_cover_the_rest_of_the_message() {
    let mut rng = fastrand::Rng::with_seed(7);
    let message = Message::allocate(333).unwrap();
    let desc = message.gather_descriptor();
    for _ in 0..100 {
        let offset = rng.usize(0..desc.total_len());
        let rest = desc.remaining_after(offset);
        let bytes: Vec<u8> = rest.iter().flat_map(|s| s.iter().copied()).collect();
        assert_eq!(bytes.len(), desc.total_len() - offset);
        assert_eq!(bytes[0], fill_byte(offset / 333));
    }
}

#[test]
fn short_receive_offsets_fill_the_right_bytes() {
    let mut set = ScatterBufferSet::allocate(NUM_FIELDS, 10).unwrap();
    {
        let mut iov = set.scatter_descriptor();
        let mut rest = remaining_mut(&mut iov, 25);
        assert_eq!(rest.iter().map(|s| s.len()).sum::<usize>(), 55);
        rest[0].fill(b'x');
    }
    assert_eq!(&set.buffer(2).unwrap()[..5], &[0u8; 5]);
    assert_eq!(&set.buffer(2).unwrap()[5..], b"xxxxx");
}

#[test]
fn zero_and_absurd_sizes_fail_cleanly() {
    assert!(matches!(Message::allocate(0), Err(Error::ZeroFieldSize)));
    assert!(matches!(ScatterBufferSet::allocate(NUM_FIELDS, 0), Err(Error::ZeroFieldSize)));
    match Message::allocate(1 << 62) {
        Err(Error::Allocation { field, requested }) => {
            assert_eq!(field, 0);
            assert_eq!(requested, 1 << 62);
        }
        other => panic!("expected allocation failure, got {other:?}"),
    }
}
