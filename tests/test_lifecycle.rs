mod common;

use std::io::{Read as _, Write as _};
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::thread;
use std::time::Duration;

use common::{FailingAcceptor, config, server_with, server_with_chunks};
use ember::{Config, Error, Read, Server, State, StatusCode};

#[test]
fn test_idle_wait_reports_timeout() {
    let (mut server, _clients) = server_with(&[]);

    assert_eq!(server.state(), State::Configured);
    assert!(matches!(server.read().unwrap(), Read::Timeout));
    assert!(matches!(server.read().unwrap(), Read::Timeout));
    assert_eq!(server.state(), State::AwaitingRequest);
}

#[test]
fn test_listener_failure_is_fatal() {
    let mut server = Server::with_acceptor(&Config::default(), Box::new(FailingAcceptor)).unwrap();

    assert!(matches!(server.read(), Err(Error::Fatal(_))));
}

#[test]
fn test_bad_request_then_good_request() {
    let (mut server, clients) = server_with(&[
        b"BREW /pot HTTP/1.1\r\n\r\n",
        b"GET /tea HTTP/1.1\r\n\r\n",
    ]);

    assert!(matches!(server.read().unwrap(), Read::Continue));
    match server.read().unwrap() {
        Read::Request(req) => assert_eq!(req.segment(0), Some("tea")),
        other => panic!("expected a request, got {other:?}"),
    }
    server.set_status_code(StatusCode::Ok).unwrap();
    server.finish().unwrap();

    assert!(clients[0].response().starts_with("HTTP/1.1 400 "));
    assert_eq!(clients[1].response(), "HTTP/1.1 200 OK\r\n\r\n");
}

#[test]
fn test_memory_is_reclaimed_every_cycle() {
    let cycles = 50;
    let connections = (0..cycles)
        .map(|i| {
            let body = "x".repeat(100 + i * 50);
            vec![format!(
                "POST /items/{i} HTTP/1.1\r\nHost: example.com\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            )
            .into_bytes()]
        })
        .collect();
    let (mut server, clients) = server_with_chunks(&config(32 * 1024), connections);

    for i in 0..cycles {
        match server.read().unwrap() {
            Read::Request(req) => assert_eq!(req.body_len(), 100 + i * 50),
            other => panic!("expected a request, got {other:?}"),
        }
        server.set_status(200, "OK").unwrap();
        server.write_body_formatted(format_args!("item {i}")).unwrap();
        server.finish().unwrap();
    }
    assert!(matches!(server.read().unwrap(), Read::Timeout));

    let (mut fresh, _) = server_with_chunks(&config(32 * 1024), vec![]);
    assert!(matches!(fresh.read().unwrap(), Read::Timeout));

    // back at the checkpoint, and no cycle ever saw another cycle's leftovers
    let idle = server.arena().used();
    assert_eq!(idle, fresh.arena().used());
    assert!(server.arena().high_water() < idle + 8 * 1024);
    assert!(clients.iter().all(|c| c.is_closed()));
}

#[test]
fn test_used_memory_returns_to_checkpoint() {
    let (mut server, _clients) = server_with(&[
        b"GET /first/request/with/segments HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n",
        b"GET / HTTP/1.1\r\n\r\n",
    ]);

    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    let busy = server.arena().used();
    server.set_status(200, "OK").unwrap();
    server.finish().unwrap();

    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    let quiet = server.arena().used();
    server.set_status(200, "OK").unwrap();
    server.finish().unwrap();

    assert!(matches!(server.read().unwrap(), Read::Timeout));
    let idle = server.arena().used();

    assert!(idle < quiet);
    assert!(quiet < busy);
}

#[test]
fn test_read_during_reply_aborts_it() {
    let (mut server, clients) = server_with(&[
        b"GET /one HTTP/1.1\r\n\r\n",
        b"GET /two HTTP/1.1\r\n\r\n",
    ]);

    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    server.set_status(200, "OK").unwrap();

    assert!(matches!(
        server.read(),
        Err(Error::State {
            operation: "read",
            state: State::HeadersOpen
        })
    ));
    assert_eq!(server.state(), State::ErrorClosed);
    assert_eq!(clients[0].response(), "HTTP/1.1 500 Internal Server Error\r\n\r\n");
    assert!(clients[0].is_closed());

    // an aborted reply does not stop the engine
    match server.read().unwrap() {
        Read::Request(req) => assert_eq!(req.segment(0), Some("two")),
        other => panic!("expected a request, got {other:?}"),
    }
}

#[test]
fn test_teardown_closes_open_connection() {
    let (mut server, clients) = server_with(&[b"GET / HTTP/1.1\r\n\r\n"]);

    assert!(matches!(server.read().unwrap(), Read::Request(_)));
    assert!(!clients[0].is_closed());

    server.teardown();
    assert!(clients[0].is_closed());
}

#[test]
fn test_serves_over_loopback_tcp() {
    let config = Config {
        address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..Config::default()
    };
    let mut server = Server::bind(&config).unwrap();
    let addr = server.local_addr().unwrap();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream
            .write_all(b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\n\r\nping")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    });

    let mut body = None;
    for _ in 0..10 {
        match server.read().unwrap() {
            Read::Request(req) => {
                body = Some(req.body().to_vec());
                break;
            }
            Read::Timeout | Read::Continue => continue,
        }
    }
    let body = body.expect("no request arrived");

    server.set_status_code(StatusCode::Ok).unwrap();
    server.add_header("Content-Type", "text/plain").unwrap();
    server.write_body_bytes(&body).unwrap();
    server.finish().unwrap();

    let response = client.join().unwrap();
    assert_eq!(
        response,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\nping"
    );
    server.teardown();
}
