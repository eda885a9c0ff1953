use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use miniseed_traces::{
    ByteOrder, CodecRegistry, EncodingFormat, IoSink, ReadOptions, RecordReader, RecordWriter,
    Samples, StreamId, Tolerances, Trace, TraceGroup, WriterOptions, envelope, read_traces,
};

/// Generate realistic seismic-like samples (smooth with small diffs, good for Steim).
fn seismic_samples(n: usize) -> Vec<i32> {
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let drift = (i as f64 * 0.05).sin() * 50.0;
        let noise = ((i as f64 * 1.7).sin() * 10.0) as i32;
        v.push(1000 + drift as i32 + noise);
    }
    v
}

fn anmo(samples: Vec<i32>) -> Trace {
    // 2025-100T12:00:00Z
    let start = 1_744_286_400_000_000;
    Trace::new(
        StreamId::new("IU", "ANMO", "00", "BHZ"),
        start,
        100.0,
        Samples::Int(samples),
    )
}

fn packed(trace: &Trace, encoding: EncodingFormat, record_length: u32) -> Vec<u8> {
    let options = WriterOptions::default()
        .with_encoding(encoding)
        .with_record_length(record_length);
    let mut sink = IoSink::new(Vec::new());
    RecordWriter::new(options)
        .pack(&mut trace.clone(), &mut sink, true)
        .unwrap();
    sink.into_inner()
}

fn bench_codecs(c: &mut Criterion) {
    let registry = CodecRegistry::standard();
    let samples = Samples::Int(seismic_samples(1000));

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1000));

    for encoding in [EncodingFormat::Steim1, EncodingFormat::Steim2, EncodingFormat::Int32] {
        let codec = registry.get(encoding.to_code()).unwrap();
        let encoded = codec
            .encode(samples.slice(0..1000), 1 << 16, ByteOrder::Big)
            .unwrap();
        assert_eq!(encoded.sample_count, 1000);

        group.bench_function(format!("encode/{encoding}/1000samp"), |b| {
            b.iter(|| {
                codec
                    .encode(black_box(samples.slice(0..1000)), 1 << 16, ByteOrder::Big)
                    .unwrap()
            })
        });
        group.bench_function(format!("decode/{encoding}/1000samp"), |b| {
            b.iter(|| {
                codec
                    .decode(black_box(&encoded.payload), 1000, ByteOrder::Big)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_writer(c: &mut Criterion) {
    let trace = anmo(seismic_samples(10_000));

    let mut group = c.benchmark_group("writer");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("steim2/512/10000samp", |b| {
        b.iter(|| packed(black_box(&trace), EncodingFormat::Steim2, 512))
    });
    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    let trace = anmo(seismic_samples(10_000));
    let stream = packed(&trace, EncodingFormat::Steim2, 512);
    let count = RecordReader::new(stream.as_slice(), ReadOptions::default()).count();

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("records/steim2/512", |b| {
        b.iter(|| {
            let records: Vec<_> = RecordReader::new(black_box(stream.as_slice()), ReadOptions::default())
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            assert_eq!(records.len(), count);
        })
    });
    group.bench_function("headers/steim2/512", |b| {
        let options = ReadOptions::default().with_decode_samples(false);
        b.iter(|| {
            RecordReader::new(black_box(stream.as_slice()), options.clone())
                .filter_map(Result::ok)
                .count()
        })
    });
    group.bench_function("traces/steim2/512", |b| {
        b.iter(|| {
            let group = read_traces(
                black_box(stream.as_slice()),
                &ReadOptions::default(),
                &Tolerances::default(),
            )
            .unwrap();
            assert_eq!(group.value.len(), 1);
        })
    });
    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let group = TraceGroup::from(vec![anmo(seismic_samples(100_000))]);

    let mut bench = c.benchmark_group("envelope");
    bench.throughput(Throughput::Elements(100_000));
    for width in [800, 4000] {
        bench.bench_function(format!("whole/{width}"), |b| {
            b.iter(|| envelope(black_box(&group), width, None).unwrap())
        });
    }
    bench.finish();
}

criterion_group!(benches, bench_codecs, bench_writer, bench_reader, bench_envelope);
criterion_main!(benches);
