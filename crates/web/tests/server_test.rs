//! End-to-end tests over loopback: a real server on an ephemeral port,
//! raw TCP clients asserting on the exact wire behavior.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use pike_web::{Server, ServerBuilder};

fn spawn(builder: ServerBuilder) -> SocketAddr {
    let bound = builder.address("127.0.0.1:0").build().unwrap().bind().unwrap();
    let addr = bound.local_addr();
    thread::spawn(move || bound.run());
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Reads one full response (headers + declared body) from the stream,
/// buffering any bytes that belong to the next pipelined response.
fn read_response(stream: &mut TcpStream, pending: &mut Vec<u8>) -> (u16, String, Vec<u8>) {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(pos) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8(pending[..pos].to_vec()).unwrap();
            let length = head
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    key.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);

            let total = pos + 4 + length;
            if pending.len() >= total {
                let status: u16 = head.split_whitespace().nth(1).unwrap().parse().unwrap();
                let body = pending[pos + 4..total].to_vec();
                pending.drain(..total);
                return (status, head, body);
            }
        }

        let n = stream.read(&mut chunk).expect("read failed");
        assert!(n > 0, "connection closed before a full response arrived");
        pending.extend_from_slice(&chunk[..n]);
    }
}

fn demo_server() -> ServerBuilder {
    Server::builder()
        .get(b"/hello", |ctx| {
            ctx.set_header(b"Content-Type", b"text/plain");
            ctx.send(b"hello").unwrap();
        })
        .get(b"/users/:id", |ctx| {
            let id = ctx.param(b"id").unwrap().to_vec();
            ctx.send(&id).unwrap();
        })
        .post(b"/echo", |ctx| {
            let body = ctx.body().to_vec();
            ctx.send(&body).unwrap();
        })
        .get(b"/search", |ctx| {
            let q = ctx.query(b"q").unwrap_or(b"").to_vec();
            ctx.send(&q).unwrap();
        })
}

#[test]
fn static_route_round_trip() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /hello HTTP/1.1\r\nHost: test\r\n\r\n").unwrap();
    let (status, head, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert!(head.contains("Content-Type: text/plain"));
    assert_eq!(body, b"hello");
}

#[test]
fn path_parameter_reaches_the_handler() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /users/1234 HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"1234");
}

#[test]
fn request_body_echo() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nround-trip").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"round-trip");
}

#[test]
fn query_parameter_lookup() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /search?q=pike&page=2 HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"pike");
}

#[test]
fn unknown_route_answers_404_and_keeps_the_connection() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /nope HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 404);
    assert_eq!(body, b"404 page not found\n");

    // the connection survives a miss
    stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");
}

#[test]
fn unrecognized_method_is_a_miss_not_an_error() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"PATCH /hello HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, _) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 404);

    stream.write_all(b"777 /hello HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, _) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 404);

    stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, _) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
}

#[test]
fn pipelined_requests_are_answered_in_order() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream
        .write_all(b"GET /hello HTTP/1.1\r\n\r\nGET /users/7 HTTP/1.1\r\n\r\nPOST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\nok")
        .unwrap();

    let (_, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(body, b"hello");
    let (_, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(body, b"7");
    let (_, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(body, b"ok");
}

#[test]
fn request_split_across_writes_is_served_once_complete() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /use").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"rs/88 HTTP/1.1\r\nHost: te").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"st\r\n\r\n").unwrap();

    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"88");
}

#[test]
fn middleware_runs_in_registration_order() {
    let builder = demo_server()
        .middleware(|ctx| {
            ctx.set_header(b"X-First", b"1");
            ctx.next();
        })
        .middleware(|ctx| {
            ctx.set_header(b"X-Second", b"2");
            ctx.next();
        });
    let addr = spawn(builder);
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").unwrap();
    let (status, head, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");

    let first = head.find("X-First: 1").expect("first middleware header missing");
    let second = head.find("X-Second: 2").expect("second middleware header missing");
    assert!(first < second);
}

#[test]
fn middleware_can_short_circuit() {
    let builder = demo_server().middleware(|ctx| {
        if ctx.request_header(b"authorization").is_none() {
            ctx.set_status(401);
            ctx.send(b"denied").unwrap();
            return;
        }
        ctx.next();
    });
    let addr = spawn(builder);
    let mut stream = connect(addr);
    let mut pending = Vec::new();

    stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 401);
    assert_eq!(body, b"denied");

    stream.write_all(b"GET /hello HTTP/1.1\r\nAuthorization: yes\r\n\r\n").unwrap();
    let (status, _, body) = read_response(&mut stream, &mut pending);
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");
}

#[test]
fn malformed_request_closes_the_connection() {
    let addr = spawn(demo_server());
    let mut stream = connect(addr);

    stream.write_all(b"GET /hello HTTP/1.1\r\nBrokenHeaderLine\r\n\r\n").unwrap();

    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(n, 0, "server must close without answering a malformed request");
}

#[test]
fn oversized_request_closes_the_connection() {
    let addr = spawn(demo_server().max_request_size(256));
    let mut stream = connect(addr);

    // no space byte, so this can never complete; it overflows instead
    stream.write_all(&[b'A'; 1024]).unwrap();

    // the kernel may turn the close into a reset when unread bytes remain
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
            Err(e) => panic!("expected close, got {e}"),
        }
    }
}
