//! Integration tests for imgpress

use imgpress::config::CompressionConfig;
use imgpress::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Smooth gradients plus a little noise, roughly photo-like.
fn photo_like(width: u32, height: u32, channels: u8, seed: u64) -> PixelBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity((width * height) as usize * channels as usize);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels as u32 {
                let base = 60.0 + 80.0 * ((x as f64 / 9.0).sin() * (y as f64 / 13.0 + c as f64).cos());
                let noise: f64 = rng.gen_range(-12.0..12.0);
                data.push((base + noise).clamp(0.0, 255.0) as u8);
            }
        }
    }
    PixelBuffer::new(width, height, channels, data).unwrap()
}

#[test]
fn test_deflate_roundtrip_varied_inputs() {
    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0u8; 5000],
        random_bytes(20_000, 1),
        b"abracadabra ".repeat(500),
        (0..=255u8).cycle().take(3000).collect(),
    ];
    for data in inputs {
        let compressed = deflate_compress(&data).unwrap();
        assert_eq!(deflate_decompress(&compressed).unwrap(), data, "len {}", data.len());
    }
}

#[test]
fn test_empty_buffer_scenario() {
    let compressed = deflate_compress(&[]).unwrap();
    assert_eq!(deflate_decompress(&compressed).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_single_byte_runs_compress_to_near_constant_size() {
    let small = deflate_compress(&vec![0xABu8; 10_000]).unwrap();
    let large = deflate_compress(&vec![0xABu8; 100_000]).unwrap();
    assert!(small.len() < 100, "got {}", small.len());
    assert!(large.len() < 200, "got {}", large.len());
    assert_eq!(deflate_decompress(&large).unwrap(), vec![0xABu8; 100_000]);
}

#[test]
fn test_random_input_does_not_expand() {
    for (len, seed) in [(1, 9), (100, 10), (4096, 11), (50_000, 12)] {
        let data = random_bytes(len, seed);
        let compressed = deflate_compress(&data).unwrap();
        assert!(compressed.len() <= len + deflate::HEADER_LEN + 1);
    }
}

#[test]
fn test_corrupt_deflate_stream() {
    let mut compressed = deflate_compress(b"payload payload payload payload").unwrap();
    compressed.truncate(compressed.len() - 2);
    assert!(matches!(
        deflate_decompress(&compressed),
        Err(CompressError::CorruptStream(_))
    ));
    assert!(matches!(deflate_decompress(&[]), Err(CompressError::CorruptStream(_))));
}

#[test]
fn test_lossy_quality_monotonicity() {
    let image = photo_like(48, 40, 3, 5);
    let low = jpeg_lite_decompress(&jpeg_lite_compress(&image, 10).unwrap()).unwrap();
    let high = jpeg_lite_decompress(&jpeg_lite_compress(&image, 90).unwrap()).unwrap();
    let psnr_low = compute_fidelity(&image, &low).unwrap().psnr;
    let psnr_high = compute_fidelity(&image, &high).unwrap().psnr;
    assert!(psnr_high > psnr_low, "q90 {psnr_high} vs q10 {psnr_low}");
}

#[test]
fn test_lower_quality_is_smaller() {
    let image = photo_like(64, 64, 1, 6);
    let low = jpeg_lite_compress(&image, 10).unwrap();
    let high = jpeg_lite_compress(&image, 75).unwrap();
    assert!(low.len() < high.len());
    assert!(high.len() < image.data().len());
}

#[test]
fn test_lossy_determinism() {
    let image = photo_like(33, 21, 3, 7);
    let a = jpeg_lite_compress(&image, 60).unwrap();
    let b = jpeg_lite_compress(&image, 60).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_odd_dimensions_preserved() {
    for (w, h, c) in [(1, 1, 1), (7, 9, 3), (17, 8, 4), (30, 3, 1)] {
        let image = photo_like(w, h, c, 8);
        let decoded = jpeg_lite_decompress(&jpeg_lite_compress(&image, 50).unwrap()).unwrap();
        assert_eq!(decoded.width(), w);
        assert_eq!(decoded.height(), h);
        assert_eq!(decoded.channels(), c);
    }
}

#[test]
fn test_gray_16x16_scenario() {
    let image = PixelBuffer::filled(16, 16, 1, 128).unwrap();
    let decoded = jpeg_lite_decompress(&jpeg_lite_compress(&image, 50).unwrap()).unwrap();
    assert!(decoded.data().iter().all(|&v| v.abs_diff(128) <= 2));
    let fidelity = compute_fidelity(&image, &decoded).unwrap();
    assert!(fidelity.psnr > 40.0);
}

#[test]
fn test_fidelity_width_mismatch_scenario() {
    let a = PixelBuffer::filled(8, 8, 3, 10).unwrap();
    let b = PixelBuffer::filled(9, 8, 3, 10).unwrap();
    assert!(matches!(
        compute_fidelity(&a, &b),
        Err(CompressError::SizeMismatch { .. })
    ));
}

#[test]
fn test_quality_100_near_lossless() {
    let image = photo_like(24, 24, 1, 9);
    let decoded = jpeg_lite_decompress(&jpeg_lite_compress(&image, 100).unwrap()).unwrap();
    let fidelity = compute_fidelity(&image, &decoded).unwrap();
    assert!(fidelity.psnr > 45.0, "psnr {}", fidelity.psnr);
}

#[test]
fn test_invalid_parameters() {
    let image = PixelBuffer::filled(8, 8, 3, 0).unwrap();
    assert!(matches!(
        jpeg_lite_compress(&image, 200),
        Err(CompressError::InvalidParameter(_))
    ));
    assert!(matches!(
        PixelBuffer::new(4, 4, 2, vec![0; 32]),
        Err(CompressError::InvalidParameter(_))
    ));
    assert!(matches!(
        PixelBuffer::new(0, 0, 1, vec![]),
        Err(CompressError::InvalidParameter(_))
    ));
}

#[test]
fn test_metrics_entry_point() {
    let data = b"metrics metrics metrics metrics metrics".repeat(20);
    let compressed = deflate_compress(&data).unwrap();
    let metrics = compute_metrics(data.len(), compressed.len());
    assert_eq!(metrics.original_size, data.len());
    assert_eq!(metrics.compressed_size, compressed.len());
    assert!(metrics.ratio > 5.0);
    assert!(compute_metrics(10, 0).ratio.is_infinite());
}

#[test]
fn test_compressor_lossless_report() {
    let compressor = Compressor::default();
    let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
    let report = compressor.evaluate_bytes(&data).unwrap();
    assert_eq!(report.decompressed, data);
    assert!(report.result.ratio() > 2.0);
    assert!(report.result.entropy_bits > 0.0);
}

#[test]
fn test_compressor_lossy_report() {
    let config = CompressionConfig {
        default_quality: 30,
        ..CompressionConfig::default()
    };
    let compressor = Compressor::new(config).unwrap();
    let image = photo_like(32, 32, 3, 10);
    let report = compressor.evaluate_image(&image, None).unwrap();
    assert_eq!(report.result.method, CompressionMethod::JpegLite);
    assert_eq!(report.reconstructed.dimensions(), image.dimensions());
    assert!(report.fidelity.psnr > 20.0);
    assert!(report.result.compressed_size() < image.data().len());
}

#[test]
fn test_compressor_config_from_json() {
    let config = CompressionConfig::from_json(r#"{"window_size": 1024, "level": 4}"#).unwrap();
    let compressor = Compressor::new(config).unwrap();
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 700 % 251) as u8).collect();
    let result = compressor.compress_bytes(&data).unwrap();
    assert_eq!(
        compressor.decompress(&result.data).unwrap(),
        Decompressed::Bytes(data)
    );
}

#[test]
fn test_parallel_calls_are_independent() {
    let image = photo_like(40, 24, 3, 11);
    let expected = jpeg_lite_compress(&image, 70).unwrap();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| jpeg_lite_compress(&image, 70).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_corrupted_body_is_detected() {
    let data = b"a body bit flip must never decode silently. ".repeat(40);
    let compressed = deflate_compress(&data).unwrap();
    let mut flipped = compressed.clone();
    let middle = deflate::HEADER_LEN + 1 + (compressed.len() - deflate::HEADER_LEN - 1) / 2;
    flipped[middle] ^= 0x08;
    assert!(matches!(
        deflate_decompress(&flipped),
        Err(CompressError::CorruptStream(_))
    ));
}

#[test]
fn test_compressor_resizes_to_target() {
    let config = CompressionConfig {
        target_dimensions: Some((100, 100)),
        ..CompressionConfig::default()
    };
    let compressor = Compressor::new(config).unwrap();
    let image = photo_like(160, 120, 3, 12);
    let result = compressor.compress_image(&image, None).unwrap();
    match compressor.decompress(&result.data).unwrap() {
        Decompressed::Image(decoded) => {
            assert_eq!((decoded.width(), decoded.height()), (100, 100));
            assert_eq!(decoded.channels(), 3);
        }
        other => panic!("expected an image, got {other:?}"),
    }
}
