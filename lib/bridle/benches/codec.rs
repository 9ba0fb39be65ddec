use bridle::magic::{decode_magic, encode_magic, MessageMagic};
use bridle::scramble::{chatter_apply, RollingCode};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_magic(c: &mut Criterion) {
    c.bench_function("magic_roundtrip", |b| {
        b.iter(|| {
            let magic = MessageMagic {
                id: black_box(0x0123),
                length: black_box(1024),
            };
            black_box(decode_magic(encode_magic(magic)))
        })
    });
}

fn bench_scramble(c: &mut Criterion) {
    let mut payload = vec![0xA5u8; 4088];

    c.bench_function("rolling_scramble_4k", |b| {
        let mut code = RollingCode::initial();
        b.iter(|| {
            code.apply(black_box(&mut payload));
            code.roll();
        })
    });

    c.bench_function("chatter_scramble_4k", |b| {
        b.iter(|| chatter_apply(black_box(&mut payload)))
    });
}

criterion_group!(benches, bench_magic, bench_scramble);
criterion_main!(benches);
