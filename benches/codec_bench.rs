use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zion::ion::{self, SymbolTable, Type};
use zion::{Algo, Decoder, Encoder};

/// One block of ~4000 records with a handful of mixed-type fields.
fn sample_block() -> Vec<u8> {
    let mut table = SymbolTable::new();
    for name in ["id", "name", "score", "flag"] {
        table.intern(name);
    }
    let mut src = Vec::new();
    table.write_update(&mut src);
    for i in 0..4000i64 {
        let mut payload = Vec::new();
        ion::write_varuint(&mut payload, table.lookup("id").unwrap() as u64);
        ion::write_int(&mut payload, i);
        ion::write_varuint(&mut payload, table.lookup("name").unwrap() as u64);
        ion::write_string(&mut payload, "some record body text");
        ion::write_varuint(&mut payload, table.lookup("score").unwrap() as u64);
        ion::write_f64(&mut payload, i as f64 / 1e3);
        ion::write_varuint(&mut payload, table.lookup("flag").unwrap() as u64);
        ion::write_bool(&mut payload, i % 3 == 0);
        ion::write_container(&mut src, Type::Struct, &payload);
    }
    src
}

fn bench_codec(c: &mut Criterion) {
    let src = sample_block();
    for algo in [Algo::Zstd, Algo::Lz] {
        let mut enc = Encoder::new();
        enc.set_bucket_algo(algo);
        let mut encoded = Vec::new();
        enc.encode(&src, &mut encoded).unwrap();

        c.bench_function(&format!("encode_4k_records_{algo:?}"), |b| {
            b.iter(|| {
                let mut enc = Encoder::new();
                enc.set_bucket_algo(algo);
                let mut out = Vec::new();
                enc.encode(black_box(&src), &mut out).unwrap();
                out
            })
        });
        c.bench_function(&format!("decode_4k_records_{algo:?}"), |b| {
            b.iter(|| {
                let mut dec = Decoder::new();
                let mut out = Vec::new();
                dec.decode(black_box(&encoded), &mut out).unwrap();
                out
            })
        });
        c.bench_function(&format!("project_one_field_{algo:?}"), |b| {
            b.iter(|| {
                let mut dec = Decoder::new();
                dec.set_components(&["score"]);
                let mut out = Vec::new();
                dec.decode(black_box(&encoded), &mut out).unwrap();
                out
            })
        });
    }
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
