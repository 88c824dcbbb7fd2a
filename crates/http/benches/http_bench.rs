use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use http::{Request, Response, StatusCode};
use nimbus_http::codec::{RequestAggregator, ResponseEncoder};
use nimbus_http::connection::{ConnectionConfig, HttpConnection};
use nimbus_http::handler::make_handler;
use nimbus_http::pool::ExecutionPool;
use nimbus_http::protocol::body::ResponseBody;
use nimbus_http::protocol::{ConnectionMeta, Message, PayloadItem, PayloadSize, ResponseHead};
use std::hint::black_box;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};
use tokio_util::codec::{Decoder, Encoder};

const REQUEST: &[u8] = b"POST /api/v3/group HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 17\r\n\r\n{\"name\":\"Lobby\"}\n";

fn bench_request_aggregator(c: &mut Criterion) {
    c.bench_function("aggregate_request", |b| {
        b.iter(|| {
            let mut aggregator = RequestAggregator::default();
            let mut bytes = BytesMut::from(REQUEST);
            black_box(aggregator.decode(&mut bytes).unwrap());
        });
    });
}

fn bench_response_encoder(c: &mut Criterion) {
    let body = Bytes::from_static(b"{\"name\":\"Lobby\",\"nodes\":[\"Node-1\"]}");

    c.bench_function("encode_response", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = BytesMut::new();
            let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
            encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Length(body.len() as u64))), &mut bytes).unwrap();
            encoder.encode(Message::<(ResponseHead, PayloadSize), _>::Payload(PayloadItem::Chunk(body.clone())), &mut bytes).unwrap();
            encoder.encode(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut bytes).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_http_connection(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let handler = Arc::new(make_handler(|_request: Request<Bytes>| async { Response::new(ResponseBody::from("ok")) }));
    let pool = runtime.block_on(async { Arc::new(ExecutionPool::on_current(64)) });

    c.bench_function("process_request", |b| {
        b.to_async(&runtime).iter(|| {
            let handler = Arc::clone(&handler);
            let pool = Arc::clone(&pool);
            async move {
                let (client, server) = duplex(16 * 1024);
                let (reader, writer) = split(server);
                let connection = HttpConnection::new(reader, writer, ConnectionMeta::default(), ConnectionConfig::default());
                let task = tokio::spawn(connection.process(handler, pool));

                let (mut client_read, mut client_write) = split(client);
                client_write.write_all(REQUEST).await.unwrap();
                client_write.shutdown().await.unwrap();
                let mut output = Vec::new();
                client_read.read_to_end(&mut output).await.unwrap();
                task.await.unwrap().unwrap();
                black_box(output);
            }
        });
    });
}

criterion_group!(benches, bench_request_aggregator, bench_response_encoder, bench_http_connection);
criterion_main!(benches);
