/*++

Licensed under the Apache-2.0 license.

File Name:

    dma_tests.rs

Abstract:

    File contains test cases for the unaligned transfer splitter.

--*/

mod harness;

use harness::*;
use pmc_drivers::{
    split_unaligned, transfer_unaligned, unaligned_xfer, AxiAddr, DmaFlags, DmaRoute,
    DmaTransfer, PmcError, UnalignedMode, DMA_BURST_WORDS,
};

const MODES: [UnalignedMode; 3] = [
    UnalignedMode::AlignSrc,
    UnalignedMode::AlignDst,
    UnalignedMode::AlignLen,
];

#[test]
fn test_split_satisfies_mode() {
    for src_off in (0u32..16).step_by(4) {
        for dst_off in (0u32..16).step_by(4) {
            for len_words in 0u32..40 {
                for mode in MODES {
                    let src = addr(INPUT_ADDR + src_off);
                    let dst = addr(OUTPUT_ADDR + dst_off);
                    let split = split_unaligned(src, dst, len_words, mode);

                    assert!(split.prefix_words <= len_words);
                    assert_eq!(split.prefix_words + split.len_words, len_words);
                    assert_eq!(split.src, src + split.prefix_words * 4);
                    assert_eq!(split.dst, dst + split.prefix_words * 4);

                    let aligned = match mode {
                        UnalignedMode::AlignSrc => split.src.lo % 16 == 0,
                        UnalignedMode::AlignDst => split.dst.lo % 16 == 0,
                        UnalignedMode::AlignLen => split.len_words % DMA_BURST_WORDS == 0,
                    };
                    // Short transfers may be consumed entirely by the prefix.
                    assert!(aligned || split.len_words == 0);
                }
            }
        }
    }
}

#[test]
fn test_split_is_idempotent() {
    for off in (0u32..16).step_by(4) {
        for len_words in 0u32..24 {
            for mode in MODES {
                let first = split_unaligned(
                    addr(INPUT_ADDR + off),
                    addr(OUTPUT_ADDR + 12 - off),
                    len_words,
                    mode,
                );
                let second = split_unaligned(first.src, first.dst, first.len_words, mode);
                assert_eq!(second.prefix_words, 0);
                assert_eq!(second.len_words, first.len_words);
            }
        }
    }
}

#[test]
fn test_split_examples() {
    let split = split_unaligned(addr(0x1004), addr(0x2000), 10, UnalignedMode::AlignSrc);
    assert_eq!(split.prefix_words, 3);
    assert_eq!(split.src, addr(0x1010));
    assert_eq!(split.dst, addr(0x200C));
    assert_eq!(split.len_words, 7);

    let split = split_unaligned(addr(0x1004), addr(0x2008), 1, UnalignedMode::AlignDst);
    assert_eq!(split.prefix_words, 1);
    assert_eq!(split.len_words, 0);

    let split = split_unaligned(addr(0x1000), addr(0x2000), 9, UnalignedMode::AlignLen);
    assert_eq!(split.prefix_words, 1);
    assert_eq!(split.len_words, 8);
}

#[test]
fn test_split_above_4gib() {
    let src = AxiAddr::from(0x1_0000_0008u64);
    let split = split_unaligned(src, addr(0x2000), 6, UnalignedMode::AlignSrc);
    assert_eq!(split.prefix_words, 2);
    assert_eq!(u64::from(split.src), 0x1_0000_0010);
}

#[test]
fn test_bytes_to_engine_rounds_up_to_words() {
    for (len_bytes, len_words, tail_bytes) in [
        (1u32, 1u32, 1u8),
        (16, 4, 0),
        (21, 6, 1),
        (u32::MAX - 3, 0x3fff_ffff, 0),
        (u32::MAX, 0x4000_0000, 3),
    ] {
        let xfer = DmaTransfer::bytes_to_engine(addr(AAD_ADDR), len_bytes, DmaFlags::empty());
        assert_eq!(xfer.route, DmaRoute::Engine);
        assert_eq!(xfer.len_words, len_words);
        assert_eq!(xfer.tail_bytes, tail_bytes);
    }
}

#[test]
fn test_unaligned_xfer_copies_prefix() {
    let h = Harness::new();
    let data: Vec<u8> = (0u8..64).collect();
    h.write_mem(INPUT_ADDR + 4, &data);

    let mut dma = h.platform.dma();
    let split = unaligned_xfer(
        &mut dma,
        addr(INPUT_ADDR + 4),
        addr(OUTPUT_ADDR),
        16,
        UnalignedMode::AlignSrc,
    )
    .unwrap();
    assert_eq!(split.prefix_words, 3);
    assert_eq!(h.read_mem(OUTPUT_ADDR, 12), &data[..12]);
    assert_eq!(h.read_mem(OUTPUT_ADDR + 12, 4), vec![0; 4]);
    assert!(h.platform.dma_log().is_empty());
}

#[test]
fn test_unaligned_xfer_rejects_misaligned_addresses() {
    let h = Harness::new();
    let mut dma = h.platform.dma();
    for (src, dst) in [
        (addr(INPUT_ADDR + 2), addr(OUTPUT_ADDR)),
        (addr(INPUT_ADDR), addr(OUTPUT_ADDR + 1)),
    ] {
        assert_eq!(
            unaligned_xfer(&mut dma, src, dst, 8, UnalignedMode::AlignLen),
            Err(PmcError::DRIVER_DMA_INVALID_PARAM)
        );
    }
}

#[test]
fn test_transfer_unaligned_copies_everything() {
    let h = Harness::new();
    let mut rng = rng();

    for (src_off, dst_off, len_words) in [(4u32, 8u32, 37u32), (0, 12, 3), (12, 0, 16), (0, 0, 32)]
    {
        let data = random_bytes(&mut rng, len_words as usize * 4);
        h.write_mem(INPUT_ADDR + src_off, &data);
        h.write_mem(OUTPUT_ADDR, &[0; 256]);
        h.platform.clear_dma_log();

        let mut dma = h.platform.dma();
        transfer_unaligned(
            &mut dma,
            addr(INPUT_ADDR + src_off),
            addr(OUTPUT_ADDR + dst_off),
            len_words,
        )
        .unwrap();
        assert_eq!(h.read_mem(OUTPUT_ADDR + dst_off, data.len()), data);

        // Only whole bursts from a burst-aligned destination go through DMA.
        for xfer in h.platform.dma_log() {
            assert_eq!(xfer.route, DmaRoute::Loopback);
            assert_eq!(xfer.len_words % DMA_BURST_WORDS, 0);
            assert_eq!(xfer.dst.map(|dst| dst.lo % 16), Some(0));
        }
    }
}

#[test]
fn test_transfer_unaligned_reports_dma_failure() {
    let h = Harness::new();
    let mut dma = h.platform.dma();
    h.platform.fail_next_dma();
    assert_eq!(
        transfer_unaligned(&mut dma, addr(INPUT_ADDR), addr(OUTPUT_ADDR), 8),
        Err(PmcError::DRIVER_DMA_TRANSFER_FAILURE)
    );
}
