/*++

Licensed under the Apache-2.0 license.

File Name:

    keyhole_tests.rs

Abstract:

    File contains test cases for keyhole chunk planning and transfers.

--*/

mod harness;

use harness::*;
use pmc_drivers::{keyhole_transfer, DmaRoute, KeyholeParams, PmcError, DMA_BURST_WORDS};

/// Cursor a keyhole ends at after moving `len` bytes from `offset`
fn expected_cursor(base: u32, window: u32, offset: u32, len: u32) -> u32 {
    base + (offset + len) % window
}

#[test]
fn test_chunks_conserve_length() {
    for window in [16u32, 256, 4096] {
        let base = addr(KEYHOLE_ADDR);
        for len in [1u32, 4, window - 4, window, window + 4, 3 * window + 8, 10 * window] {
            for offset in [0u32, 4, window / 2, window - 4] {
                let params =
                    KeyholeParams::with_cursor(base, window, base + offset).unwrap();
                let mut chunks = params.chunks(addr(INPUT_ADDR), len);

                let mut total = 0;
                let mut src = INPUT_ADDR;
                for (i, chunk) in chunks.by_ref().enumerate() {
                    assert!(chunk.len > 0 && chunk.len <= window);
                    assert_eq!(chunk.src, addr(src));
                    if i == 0 {
                        assert_eq!(chunk.dst, base + offset);
                        assert!(chunk.len <= window - offset);
                    } else {
                        assert_eq!(chunk.dst, base);
                    }
                    let end = u64::from(chunk.dst) + chunk.len as u64;
                    assert!(end <= u64::from(base) + window as u64);

                    src += chunk.len;
                    total += chunk.len;
                }
                assert_eq!(total, len);
                assert_eq!(chunks.remaining(), 0);
                assert_eq!(
                    chunks.cursor(),
                    addr(expected_cursor(KEYHOLE_ADDR, window, offset, len))
                );
            }
        }
    }
}

#[test]
fn test_exact_fill_wraps_cursor() {
    let mut params = KeyholeParams::new(addr(KEYHOLE_ADDR), 64).unwrap();
    let chunks = params.chunks(addr(INPUT_ADDR), 64);
    let plan: Vec<_> = chunks.clone().collect();
    assert_eq!(plan.len(), 1);

    let mut chunks = chunks;
    chunks.by_ref().for_each(drop);
    params.commit(&chunks);
    assert_eq!(params.cursor(), params.base());
}

#[test]
fn test_new_rejects_bad_windows() {
    for window in [0u32, 2, 3, 12, 48, 100] {
        assert_eq!(
            KeyholeParams::new(addr(KEYHOLE_ADDR), window),
            Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)
        );
    }
    assert_eq!(
        KeyholeParams::new(addr(KEYHOLE_ADDR + 2), 64),
        Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)
    );
    assert_eq!(
        KeyholeParams::new(pmc_drivers::AxiAddr::from(u64::MAX - 3), 64),
        Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)
    );

    let params = KeyholeParams::new(addr(KEYHOLE_ADDR), 4).unwrap();
    assert_eq!(params.window_size(), 4);
}

#[test]
fn test_with_cursor_rejects_outside_window() {
    let base = addr(KEYHOLE_ADDR);
    for cursor in [KEYHOLE_ADDR - 4, KEYHOLE_ADDR + 64, KEYHOLE_ADDR + 6] {
        assert_eq!(
            KeyholeParams::with_cursor(base, 64, addr(cursor)),
            Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)
        );
    }
    let params = KeyholeParams::with_cursor(base, 64, addr(KEYHOLE_ADDR + 60)).unwrap();
    assert_eq!(params.cursor(), addr(KEYHOLE_ADDR + 60));
}

#[test]
fn test_keyhole_transfer_wraps_window() {
    let h = Harness::new();
    let mut rng = rng();
    let data = random_bytes(&mut rng, 200);
    h.write_mem(INPUT_ADDR, &data);

    let mut dma = h.platform.dma();
    let mut keyhole = KeyholeParams::new(addr(KEYHOLE_ADDR), 64).unwrap();
    keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR), 40).unwrap();
    assert_eq!(keyhole.cursor(), addr(KEYHOLE_ADDR + 40));
    assert_eq!(h.read_mem(KEYHOLE_ADDR, 40), &data[..40]);

    keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR + 40), 160).unwrap();
    assert_eq!(keyhole.cursor(), addr(KEYHOLE_ADDR + 8));

    // Chunks of 40, 24, 64, 64 and 8 bytes; only their whole bursts use DMA.
    let lens: Vec<u32> = h
        .platform
        .dma_log()
        .iter()
        .map(|xfer| xfer.len_words * 4)
        .collect();
    assert_eq!(lens, vec![32, 16, 64, 64]);
    assert!(h
        .platform
        .dma_log()
        .iter()
        .all(|xfer| xfer.route == DmaRoute::Loopback));

    assert_eq!(h.read_mem(KEYHOLE_ADDR, 8), &data[192..]);
    assert_eq!(h.read_mem(KEYHOLE_ADDR + 8, 56), &data[136..192]);
}

#[test]
fn test_keyhole_transfer_keeps_dma_to_whole_bursts() {
    let h = Harness::new();
    let mut rng = rng();
    let data = random_bytes(&mut rng, 32);
    h.write_mem(INPUT_ADDR, &data);
    let mut dma = h.platform.dma();

    // A window smaller than one burst is filled by register only.
    let mut narrow = KeyholeParams::new(addr(KEYHOLE_ADDR), 8).unwrap();
    keyhole_transfer(&mut dma, &mut narrow, addr(INPUT_ADDR), 32).unwrap();
    assert!(h.platform.dma_log().is_empty());
    assert_eq!(h.read_mem(KEYHOLE_ADDR, 8), &data[24..]);
    assert_eq!(narrow.cursor(), narrow.base());

    let mut keyhole =
        KeyholeParams::with_cursor(addr(SCRATCH_ADDR), 64, addr(SCRATCH_ADDR + 4)).unwrap();
    keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR), 20).unwrap();
    assert!(h.platform.dma_log().is_empty());
    assert_eq!(h.read_mem(SCRATCH_ADDR + 4, 20), &data[..20]);
    assert_eq!(keyhole.cursor(), addr(SCRATCH_ADDR + 24));

    keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR), 32).unwrap();
    assert_eq!(h.read_mem(SCRATCH_ADDR + 24, 32), data);
    for xfer in h.platform.dma_log() {
        assert_eq!(xfer.route, DmaRoute::Loopback);
        assert_eq!(xfer.len_words % DMA_BURST_WORDS, 0);
        assert_eq!(xfer.dst.map(|dst| dst.lo % 16), Some(0));
    }
    assert_eq!(h.platform.dma_log().len(), 1);
}

#[test]
fn test_keyhole_transfer_rejects_bad_params() {
    let h = Harness::new();
    let mut dma = h.platform.dma();
    let mut keyhole = KeyholeParams::new(addr(KEYHOLE_ADDR), 64).unwrap();
    let before = keyhole;

    assert_eq!(
        keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR), 6),
        Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)
    );
    assert_eq!(
        keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR + 2), 8),
        Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)
    );
    assert_eq!(keyhole, before);
}

#[test]
fn test_keyhole_transfer_failure_keeps_cursor() {
    let h = Harness::new();
    let mut dma = h.platform.dma();
    let mut keyhole = KeyholeParams::new(addr(KEYHOLE_ADDR), 64).unwrap();

    h.platform.fail_next_dma();
    assert_eq!(
        keyhole_transfer(&mut dma, &mut keyhole, addr(INPUT_ADDR), 32),
        Err(PmcError::DRIVER_DMA_TRANSFER_FAILURE)
    );
    assert_eq!(keyhole.cursor(), keyhole.base());
}
