use criterion::{Criterion, black_box, criterion_group, criterion_main};

use pike_http::protocol::response::build_response;
use pike_http::protocol::{HeaderView, MAX_HEADER_VIEWS, RawRequest, parser};

const REQUEST: &[u8] = b"POST /api/v1/orders?verbose=1 HTTP/1.1\r\n\
Host: bench.local\r\n\
User-Agent: pike-bench/0.1\r\n\
Accept: application/json\r\n\
Content-Type: application/json\r\n\
Content-Length: 27\r\n\
\r\n\
{\"item\":\"widget\",\"qty\":100}";

fn bench_parse(c: &mut Criterion) {
    let mut headers = [HeaderView::default(); MAX_HEADER_VIEWS];
    let mut request = RawRequest::default();

    c.bench_function("parse_request", |b| {
        b.iter(|| {
            let consumed = parser::parse(black_box(REQUEST), &mut headers, &mut request).unwrap();
            black_box(consumed)
        })
    });
}

fn bench_build_response(c: &mut Criterion) {
    let mut out = vec![0u8; 4096];

    c.bench_function("build_response", |b| {
        b.iter(|| {
            let len = build_response(
                200,
                &[(b"Content-Type", b"application/json")],
                black_box(b"{\"status\":\"ok\"}"),
                &mut out,
            );
            black_box(len)
        })
    });
}

criterion_group!(benches, bench_parse, bench_build_response);
criterion_main!(benches);
