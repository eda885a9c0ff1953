//! Compile-time smoke test: verify top-level re-exports work.

use std::io;

use miniseed_traces::{
    BTime, ByteOrder, Codec, CodecRegistry, EncodingFormat, Envelope, GapDescriptor, GapFilter,
    IoSink, MseedError, ReadOptions, Record, RecordLength, RecordReader, RecordSink, RecordWriter,
    Result, SampleType, Samples, StreamId, TimeFormat, TimeWindow, Tolerances, Trace,
    TraceAssembler, TraceGroup, Warning, WithWarnings, WriterOptions, envelope, find_gaps,
    rate_is_tolerable,
};

#[test]
fn top_level_imports_compile() {
    let _: fn(&TraceGroup, &GapFilter) -> WithWarnings<Vec<GapDescriptor>> = find_gaps;
    let _: fn(&TraceGroup, usize, Option<TimeWindow>) -> Result<Envelope> = envelope;
    let _: fn(f64, f64) -> bool = rate_is_tolerable;

    let _bo = ByteOrder::Big;
    let _s = Samples::Int(vec![]);
    let _bt = BTime {
        year: 2025,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
        fract: 0,
    };
    let _enc = EncodingFormat::Steim1;
    let _st = SampleType::Int;
    let _tf = TimeFormat::Iso;
    let _rl = RecordLength::from_hint(0);
    let _sid = StreamId::new("IU", "ANMO", "00", "BHZ");

    let registry = CodecRegistry::standard();
    let codec: &dyn Codec = registry.get(11).unwrap();
    assert_eq!(codec.sample_type(), SampleType::Int);

    let _reader: RecordReader<&[u8]> = RecordReader::new(&[], ReadOptions::default());
    let _assembler = TraceAssembler::new(Tolerances::default());
    let _writer = RecordWriter::new(WriterOptions::default());
    let _record: Option<Record> = None;
    let _trace: Option<Trace> = None;
    let _warning: Option<Warning> = None;

    // MseedError is accessible
    let _e: Option<MseedError> = None;
}

#[test]
fn closures_and_writers_are_sinks() {
    fn accepts(_: &mut impl RecordSink) {}

    let mut count = 0;
    let mut closure = |_: &[u8]| -> io::Result<()> {
        count += 1;
        Ok(())
    };
    accepts(&mut closure);
    accepts(&mut IoSink::new(Vec::new()));
    accepts(&mut IoSink::new(io::sink()));
}
