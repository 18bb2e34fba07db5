use arx_emit::CodeBuffer;
use proptest::prelude::*;

proptest! {
    // cursor <= cap after any sequence of writes, and overflow implies the
    // offending write left no partial bytes behind.
    #[test]
    fn cursor_never_exceeds_cap(cap in 1usize..256, writes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut buf = CodeBuffer::new(cap);
        let mut expect = 0usize;
        for (i, b) in writes.iter().enumerate() {
            match i % 3 {
                0 => {
                    buf.emit_u8(*b);
                    if !buf.overflowed() {
                        expect += 1;
                    }
                }
                1 => {
                    buf.emit_u32(u32::from(*b));
                    if !buf.overflowed() {
                        expect += 4;
                    }
                }
                _ => {
                    buf.emit_u64(u64::from(*b));
                    if !buf.overflowed() {
                        expect += 8;
                    }
                }
            }
            prop_assert!(buf.offset() <= buf.capacity());
        }
        if !buf.overflowed() {
            prop_assert_eq!(buf.offset(), expect);
        }
    }

    #[test]
    fn reset_clears_everything(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut buf = CodeBuffer::new(16);
        buf.emit_bytes(&data);
        buf.reset();
        prop_assert_eq!(buf.offset(), 0);
        prop_assert!(!buf.overflowed());
    }
}
