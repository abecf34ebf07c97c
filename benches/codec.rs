use bonjson::{Encoder, Policy, PositionMap, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sample_document(n: usize) -> Value {
    let items = (0..n)
        .map(|i| {
            Value::Object(vec![
                ("id".into(), Value::from(i as i64)),
                ("name".into(), Value::from("widget")),
                ("score".into(), Value::from(i as f64 * 1.5)),
            ])
        })
        .collect();
    Value::Object(vec![
        ("items".into(), Value::Array(items)),
        ("count".into(), Value::from(n as i64)),
    ])
}

fn encode(value: &Value) -> Vec<u8> {
    let mut encoder = Encoder::begin_document(Policy::new());
    encoder.write_value(value).unwrap();
    encoder.end_document().unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let value = sample_document(1000);
    c.bench_function("encode_1000_record_array", |b| {
        b.iter(|| black_box(encode(&value)));
    });
}

fn bench_scan(c: &mut Criterion) {
    let bytes = encode(&sample_document(1000));
    c.bench_function("scan_1000_record_array", |b| {
        b.iter(|| black_box(PositionMap::build_from_bytes(&bytes, Policy::new()).unwrap()));
    });
}

fn bench_reader_lookup(c: &mut Criterion) {
    let bytes = encode(&sample_document(1000));
    let map = PositionMap::build_from_bytes(&bytes, Policy::new()).unwrap();
    let root = map.root_index();
    let items = map.object_lookup(root, "items").unwrap().unwrap();
    c.bench_function("child_at_last_of_1000", |b| {
        b.iter(|| black_box(map.child_at(items, 999).unwrap()));
    });
}

criterion_group!(benches, bench_encode, bench_scan, bench_reader_lookup);
criterion_main!(benches);
