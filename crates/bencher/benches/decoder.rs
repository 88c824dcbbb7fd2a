use bencher::request_cases;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nimbus_http::codec::{DecodedRequest, RequestAggregator};
use std::hint::black_box;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

fn benchmark_request_aggregator(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_aggregator");

    for case in request_cases() {
        group.throughput(Throughput::Bytes(case.file().len()));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let mut aggregator = RequestAggregator::default();
            b.iter_batched_ref(
                || BytesMut::from(case.file().content()),
                |bytes_mut| {
                    let request = aggregator.decode(bytes_mut).expect("input should be a valid http request");
                    assert!(matches!(request, Some(DecodedRequest::Request(_))));
                    black_box(request);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_aggregator);
criterion_main!(decoder);
