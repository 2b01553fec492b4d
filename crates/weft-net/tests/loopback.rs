// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loopback scenarios: real sockets on 127.0.0.1, ephemeral ports only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use weft_net::{
    check_sockets_for_incoming_data, NetConfig, NonBlockSocketChecker, SocketDelegate,
    SocketHandle, SocketInfoPair, SocketOptions, TcpServerSocket, TcpSocket,
};
use weft_sync::{Atomic, CancelToken, Error, Mutex, Thread};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn listening_server() -> TcpServerSocket {
    let mut server = TcpServerSocket::new().unwrap();
    server.bind(0, Some("127.0.0.1")).unwrap();
    server.listen(8).unwrap();
    server
}

fn connected_pair() -> (TcpServerSocket, TcpSocket, TcpSocket) {
    let server = listening_server();
    let mut client = TcpSocket::new();
    client.connect("127.0.0.1", server.port()).unwrap();
    let accepted = server.accept(5_000).unwrap();
    (server, client, accepted)
}

struct Acceptor {
    server: TcpServerSocket,
    accepted: Mutex<Vec<TcpSocket>>,
    calls: Atomic<u32>,
}

impl Acceptor {
    fn on_connection(&self, _handle: SocketHandle) {
        self.calls.inc();
        let socket = self.server.accept(1_000).unwrap();
        self.accepted.lock().push(socket);
    }
}

#[test]
fn accept_callback_fires_once_per_connection() {
    init_tracing();
    let acceptor = Arc::new(Acceptor {
        server: listening_server(),
        accepted: Mutex::new(Vec::new()),
        calls: Atomic::new(0),
    });
    let pairs = [SocketInfoPair::new(
        acceptor.server.handle(),
        SocketDelegate::bind(&acceptor, Acceptor::on_connection),
    )];

    let mut client = TcpSocket::new();
    client.connect("127.0.0.1", acceptor.server.port()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while acceptor.calls.load() == 0 && Instant::now() < deadline {
        check_sockets_for_incoming_data(&pairs, 50).unwrap();
    }
    assert_eq!(acceptor.calls.load(), 1);
    assert_eq!(acceptor.accepted.lock().len(), 1);

    // The connection was consumed; the listener is quiet again.
    assert_eq!(check_sockets_for_incoming_data(&pairs, 50).unwrap(), 0);
    assert_eq!(acceptor.calls.load(), 1);
}

#[test]
fn round_trip_is_byte_identical() {
    init_tracing();
    let (_server, client, accepted) = connected_pair();
    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i * 31 % 251) as u8).collect();

    let mut sender = Thread::with_name("sender");
    {
        let payload = payload.clone();
        sender
            .start(move |_: &CancelToken| client.send_all(&payload).unwrap())
            .unwrap();
    }

    let mut received = vec![0u8; payload.len()];
    accepted.receive_exact(&mut received).unwrap();
    sender.join().unwrap();
    assert_eq!(received, payload);
}

#[test]
fn peer_close_reads_as_end_of_stream() {
    let (_server, mut client, accepted) = connected_pair();
    client.send_all(b"abc").unwrap();
    client.close().unwrap();
    assert!(!client.is_connected());

    let mut buf = [0u8; 8];
    assert!(matches!(accepted.receive_exact(&mut buf), Err(Error::Eof)));
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(accepted.receive(&mut buf).unwrap(), 0);
}

#[test]
fn receive_timeout_is_reported_as_timeout() {
    let (_server, mut client, _accepted) = connected_pair();
    client.set_timeout(30).unwrap();
    let start = Instant::now();
    let err = client.receive(&mut [0u8; 16]).unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[test]
fn connect_to_closed_port_fails() {
    let port = {
        let server = listening_server();
        server.port()
    };
    let mut client = TcpSocket::new();
    assert!(matches!(
        client.connect("127.0.0.1", port),
        Err(Error::SocketConnect(_))
    ));
    assert!(!client.is_connected());
}

#[test]
fn options_apply_to_connected_socket() {
    let server = listening_server();
    let options = SocketOptions {
        no_delay: true,
        keep_alive: true,
        linger: Some(1),
        timeout_ms: Some(2_000),
        ..SocketOptions::default()
    };
    let mut client = TcpSocket::with_options(options);
    client.connect("127.0.0.1", server.port()).unwrap();

    assert!(client.no_delay().unwrap());
    assert!(client.keep_alive().unwrap());
    assert_eq!(client.linger().unwrap(), Some(1));
    assert_eq!(client.timeout().unwrap(), 2_000);
    assert_eq!(client.remote_address().unwrap().port(), server.port());

    client.set_no_delay(false).unwrap();
    assert!(!client.no_delay().unwrap());
}

#[test]
fn applying_defaults_switches_options_off() {
    let (_server, mut client, _accepted) = connected_pair();
    client.set_no_delay(true).unwrap();
    client.set_keep_alive(true).unwrap();
    client.set_linger(true, 2).unwrap();
    client.set_timeout(500).unwrap();

    client.apply_options(&SocketOptions::default()).unwrap();
    assert!(!client.no_delay().unwrap());
    assert!(!client.keep_alive().unwrap());
    assert_eq!(client.linger().unwrap(), None);
    assert_eq!(client.timeout().unwrap(), 0);
}

#[test]
fn buffer_size_reports_request_and_kernel_reservation() {
    let (_server, mut client, _accepted) = connected_pair();
    client.set_buffer_size(32 * 1024).unwrap();
    assert_eq!(client.buffer_size(), Some(32 * 1024));
    let (recv, send) = client.os_buffer_sizes().unwrap();
    assert!(recv >= 32 * 1024, "receive buffer {recv}");
    assert!(send >= 32 * 1024, "send buffer {send}");
}

/// Echo service driven by a checker loop on its own thread.
struct Echo {
    server: TcpServerSocket,
    clients: Arc<Mutex<HashMap<SocketHandle, TcpSocket>>>,
    checker: Arc<NonBlockSocketChecker>,
}

impl Echo {
    fn on_connection(&self, _handle: SocketHandle) {
        let Ok(socket) = self.server.accept(1_000) else {
            return;
        };
        let handle = socket.handle();
        self.clients.lock().insert(handle, socket);

        let clients = self.clients.clone();
        let checker = self.checker.clone();
        let on_data = SocketDelegate::from_closure(move |h| {
            let mut buf = [0u8; 1024];
            let closed = {
                let map = clients.lock();
                let Some(socket) = map.get(&h) else {
                    return;
                };
                match socket.receive(&mut buf) {
                    Ok(0) | Err(_) => true,
                    Ok(n) => socket.send_all(&buf[..n]).is_err(),
                }
            };
            if closed {
                checker.unregister(h);
                clients.lock().remove(&h);
            }
        });
        self.checker.register(SocketInfoPair::new(handle, on_data));
    }
}

#[test]
fn checker_loop_serves_echo_clients() {
    init_tracing();
    let config = NetConfig::from_toml_str("checker_poll_ms = 10\nbacklog = 4").unwrap();

    let mut server = TcpServerSocket::new().unwrap();
    server.bind(0, Some("127.0.0.1")).unwrap();
    server.listen(config.backlog).unwrap();
    let port = server.port();

    let echo = Arc::new(Echo {
        server,
        clients: Arc::new(Mutex::new(HashMap::new())),
        checker: Arc::new(NonBlockSocketChecker::new()),
    });
    echo.checker.register(SocketInfoPair::new(
        echo.server.handle(),
        SocketDelegate::bind_weak(&echo, Echo::on_connection),
    ));

    let mut service = Thread::with_name("echo");
    {
        let checker = echo.checker.clone();
        let poll_ms = config.checker_poll_ms;
        service
            .start(move |token: &CancelToken| checker.run(poll_ms, token).unwrap())
            .unwrap();
    }

    for round in 0..3u8 {
        let mut client = TcpSocket::with_options(config.socket.clone());
        client.connect("127.0.0.1", port).unwrap();
        client.set_timeout(5_000).unwrap();
        let message = [b'a' + round; 32];
        client.send_all(&message).unwrap();
        let mut reply = [0u8; 32];
        client.receive_exact(&mut reply).unwrap();
        assert_eq!(reply, message);
        client.close().unwrap();
    }

    // Each hang-up is seen by the checker loop, which drops that client.
    let deadline = Instant::now() + Duration::from_secs(5);
    let drained = || echo.checker.len() == 1 && echo.clients.lock().is_empty();
    while !drained() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(echo.checker.len(), 1);
    assert!(echo.clients.lock().is_empty());

    service.cancel();
    service.join().unwrap();

    // The listener is registered weakly, so the checker does not pin Echo.
    assert_eq!(Arc::strong_count(&echo), 1);
    let checker = echo.checker.clone();
    let listener = echo.server.handle();
    drop(echo);
    assert_eq!(checker.unregister(listener), 1);
    assert!(checker.is_empty());
}
