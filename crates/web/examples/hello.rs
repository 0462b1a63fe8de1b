use pike_web::{Server, ServerError};

fn main() -> Result<(), ServerError> {
    Server::builder()
        .address("127.0.0.1:8080")
        .get(b"/", |ctx| {
            ctx.set_header(b"Content-Type", b"text/plain");
            let _ = ctx.send(b"hello from pike\n");
        })
        .get(b"/greet/:name", |ctx| {
            let name = ctx.param(b"name").unwrap_or(b"world").to_vec();
            let mut body = Vec::from(&b"hello, "[..]);
            body.extend_from_slice(&name);
            body.push(b'\n');
            let _ = ctx.send(&body);
        })
        .post(b"/echo", |ctx| {
            let body = ctx.body().to_vec();
            let _ = ctx.send(&body);
        })
        .middleware(|ctx| {
            ctx.set_header(b"Server", b"pike");
            ctx.next();
        })
        .build()?
        .start()
}
