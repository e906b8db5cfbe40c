use criterion::{criterion_group, criterion_main, Criterion};
use rawsterio::{
    Access, BandGeometry, BufferGeometry, IoOp, RawBand, RawIoConfig, Resampling, SampleType,
    Window,
};
use std::io::Cursor;

const SIZE: (u32, u32) = (2048, 2048);

fn test_band(one_big_read: Option<bool>) -> RawBand {
    let (width, height) = SIZE;
    let geometry = BandGeometry {
        image_offset: 0,
        pixel_stride: 2,
        line_stride: i64::from(width) * 2,
        sample_type: SampleType::U16,
        native_order: true,
        width,
        height,
    };
    let payload = vec![0x5Au8; width as usize * height as usize * 2];
    let config = RawIoConfig {
        one_big_read,
        ..Default::default()
    };
    RawBand::with_stream(Cursor::new(payload), geometry, Access::ReadOnly, config).unwrap()
}

fn bench_read_blocks(c: &mut Criterion) {
    let mut band = test_band(None);
    let mut block = vec![0u8; band.block_len()];
    c.bench_function("read_blocks", |b| {
        b.iter(|| {
            for line in 0..SIZE.1 {
                band.read_block(line, &mut block).unwrap();
            }
        })
    });
}

fn bench_raster_io_direct(c: &mut Criterion) {
    let mut band = test_band(Some(true));
    let geometry = BufferGeometry::packed(SIZE.0, SIZE.1, SampleType::U16);
    let mut data = vec![0u8; geometry.len_bytes()];
    c.bench_function("raster_io_direct", |b| {
        b.iter(|| {
            band.raster_io(
                IoOp::Read,
                Window::full(SIZE.0, SIZE.1),
                &mut data,
                &geometry,
                Resampling::Nearest,
                None,
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_read_blocks, bench_raster_io_direct);
criterion_main!(benches);
