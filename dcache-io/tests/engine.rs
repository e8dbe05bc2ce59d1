//! End-to-end tests driving the engine against real loopback sockets.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dcache_io::{
    select_ready, CallbackRegistry, Connection, EngineConfig, EngineError, DATAGRAM_HEADER_LEN,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Connected stream pair: the engine side and the raw server side.
fn stream_pair(config: EngineConfig) -> (Connection, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    let conn = Connection::stream(OwnedFd::from(client), config).unwrap();
    (conn, server)
}

/// Connected datagram pair.
fn datagram_pair(config: EngineConfig) -> (Connection, UdpSocket) {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.connect(server.local_addr().unwrap()).unwrap();
    let conn = Connection::datagram(OwnedFd::from(client), config).unwrap();
    (conn, server)
}

fn settle() {
    thread::sleep(Duration::from_millis(100));
}

#[test]
fn write_fragments_into_buffer_sized_sends() {
    init_tracing();
    let config = EngineConfig {
        buffer_capacity: 4096,
        ..EngineConfig::default()
    };
    let (mut conn, mut server) = stream_pair(config);
    let payload: Vec<u8> = (0..9000u32).map(|i| i as u8).collect();

    let reader = thread::spawn(move || {
        let mut received = vec![0u8; 9000];
        server.read_exact(&mut received).unwrap();
        received
    });

    let written = conn.write(&payload, true).unwrap();
    assert_eq!(written, 9000);
    let counters = conn.counters();
    assert_eq!(counters.send_calls, 3);
    assert_eq!(counters.bytes_sent, 9000);
    assert_eq!(conn.write_queued(), 0);

    assert_eq!(reader.join().unwrap(), payload);
}

#[test]
fn queue_then_flush_is_one_send() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    conn.queue(b"get ").unwrap();
    conn.queue(b"key\r\n").unwrap();
    assert_eq!(conn.write_queued(), 9);
    assert_eq!(conn.counters().send_calls, 0);

    conn.flush(false).unwrap();
    assert_eq!(conn.write_queued(), 0);
    assert_eq!(conn.counters().send_calls, 1);

    let mut received = [0u8; 9];
    server.read_exact(&mut received).unwrap();
    assert_eq!(&received, b"get key\r\n");
}

#[test]
fn read_reassembles_across_refills() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
    let chunks: Vec<Vec<u8>> = payload.chunks(100).map(|c| c.to_vec()).collect();

    let writer = thread::spawn(move || {
        for chunk in chunks {
            server.write_all(&chunk).unwrap();
            thread::sleep(Duration::from_millis(50));
        }
        server
    });

    let mut head = [0u8; 40];
    assert_eq!(conn.read(&mut head).unwrap(), 40);
    let mut tail = [0u8; 260];
    conn.read_exact(&mut tail).unwrap();

    assert_eq!(&head[..], &payload[..40]);
    assert_eq!(&tail[..], &payload[40..]);
    drop(writer.join().unwrap());
}

#[test]
fn read_line_includes_delimiter_and_buffers_rest() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    server.write_all(b"STORED\r\nVALUE x").unwrap();
    settle();

    let mut line = [0u8; 64];
    let n = conn.read_line(&mut line).unwrap();
    assert_eq!(&line[..n], b"STORED\r\n");
    assert_eq!(line[n - 1], b'\n');
    assert_eq!(conn.read_buffered(), 7);
}

#[test]
fn read_line_at_exact_capacity_succeeds() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    let mut message = vec![b'a'; 63];
    message.push(b'\n');
    server.write_all(&message).unwrap();
    settle();

    let mut line = [0u8; 64];
    assert_eq!(conn.read_line(&mut line).unwrap(), 64);
    assert_eq!(line[63], b'\n');
}

#[test]
fn read_line_overflow_is_protocol_error() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    let mut message = vec![b'a'; 64];
    message.push(b'\n');
    server.write_all(&message).unwrap();
    settle();

    let mut line = [0u8; 64];
    assert!(matches!(
        conn.read_line(&mut line),
        Err(EngineError::Protocol)
    ));
}

#[test]
fn peer_close_resets_connection() {
    init_tracing();
    let (mut conn, server) = stream_pair(EngineConfig::default());
    conn.queue(b"abc").unwrap();
    conn.mark_request_sent();
    drop(server);
    settle();

    let mut byte = [0u8; 1];
    assert!(matches!(
        conn.read(&mut byte),
        Err(EngineError::ConnectionFailure(_))
    ));
    assert!(conn.is_closed());
    assert_eq!(conn.write_queued(), 0);
    assert_eq!(conn.read_buffered(), 0);
    assert_eq!(conn.pending_responses(), 0);
    assert!(!conn.version().is_known());

    // every further operation fails fast
    assert!(matches!(
        conn.flush(false),
        Err(EngineError::ConnectionFailure(_))
    ));
    assert!(matches!(
        conn.read(&mut byte),
        Err(EngineError::ConnectionFailure(_))
    ));
}

#[test]
fn zero_poll_timeout_fails_immediately() {
    let config = EngineConfig {
        poll_timeout_ms: 0,
        ..EngineConfig::default()
    };
    let (mut conn, _server) = stream_pair(config);
    let mut byte = [0u8; 1];
    assert!(matches!(conn.read(&mut byte), Err(EngineError::Timeout)));
    assert!(!conn.is_closed());
}

#[test]
fn select_ready_prefers_buffered_data() {
    let config = EngineConfig::default();
    let (mut conn_a, mut server_a) = stream_pair(config.clone());
    let (mut conn_b, mut server_b) = stream_pair(config.clone());

    conn_a.mark_request_sent();
    server_a.write_all(b"world\n").unwrap();
    server_b.write_all(b"hello\n").unwrap();
    settle();

    // conn_b ends up with unconsumed buffered bytes
    let mut byte = [0u8; 1];
    conn_b.read(&mut byte).unwrap();
    assert!(conn_b.read_buffered() > 0);

    let connections = [conn_a, conn_b];
    assert_eq!(select_ready(&connections, &config), Some(1));
}

#[test]
fn select_ready_single_candidate_skips_polling() {
    let config = EngineConfig::default();
    let (mut conn_a, _server_a) = stream_pair(config.clone());
    let (conn_b, _server_b) = stream_pair(config.clone());

    // one candidate: returned directly, no readiness check involved
    conn_a.mark_request_sent();
    let connections = [conn_a, conn_b];
    assert_eq!(select_ready(&connections, &config), Some(0));
}

#[test]
fn select_ready_polls_awaiting_connections() {
    let config = EngineConfig::default();
    let (mut conn_a, _server_a) = stream_pair(config.clone());
    let (mut conn_b, mut server_b) = stream_pair(config.clone());

    conn_a.mark_request_sent();
    conn_b.mark_request_sent();
    server_b.write_all(b"STORED\r\n").unwrap();
    settle();

    let connections = [conn_a, conn_b];
    assert_eq!(select_ready(&connections, &config), Some(1));
}

#[test]
fn datagram_carries_header_then_payload() {
    let (mut conn, server) = datagram_pair(EngineConfig::default());
    conn.send_datagram(&[&[], b"get foo\r\n"]).unwrap();

    let mut packet = [0u8; 64];
    let n = server.recv(&mut packet).unwrap();
    assert_eq!(n, DATAGRAM_HEADER_LEN + 9);
    // message id 1, fragment 0 of 1, reserved word zero
    assert_eq!(&packet[..DATAGRAM_HEADER_LEN], &[0, 1, 0, 0, 0, 1, 0, 0]);
    assert_eq!(&packet[DATAGRAM_HEADER_LEN..n], b"get foo\r\n");
    assert_eq!(conn.counters().datagram_retries, 0);
}

#[test]
fn datagram_message_ids_increment() {
    let (mut conn, server) = datagram_pair(EngineConfig::default());
    conn.send_datagram(&[&[], b"a"]).unwrap();
    conn.send_datagram(&[&[], b"b"]).unwrap();

    let mut packet = [0u8; 16];
    server.recv(&mut packet).unwrap();
    assert_eq!(&packet[..2], &[0, 1]);
    server.recv(&mut packet).unwrap();
    assert_eq!(&packet[..2], &[0, 2]);
}

#[test]
fn oversized_datagram_fails_without_retry() {
    init_tracing();
    let (mut conn, _server) = datagram_pair(EngineConfig::default());
    let oversized = vec![0u8; 70_000];
    assert!(matches!(
        conn.send_datagram(&[&[], &oversized]),
        Err(EngineError::WriteFailure)
    ));
    assert_eq!(conn.counters().datagram_retries, 0);
    assert!(!conn.is_closed());
}

#[test]
fn datagram_header_slot_must_be_empty() {
    let (mut conn, _server) = datagram_pair(EngineConfig::default());
    assert!(matches!(
        conn.send_datagram(&[b"oops".as_slice()]),
        Err(EngineError::NotSupported(_))
    ));
}

#[test]
fn transport_mismatch_is_not_supported() {
    let (mut stream_conn, _server) = stream_pair(EngineConfig::default());
    assert!(matches!(
        stream_conn.send_datagram(&[&[], b"x"]),
        Err(EngineError::NotSupported(_))
    ));

    let (mut datagram_conn, _server) = datagram_pair(EngineConfig::default());
    assert!(matches!(
        datagram_conn.write_vectored(&[b"x".as_slice()], true),
        Err(EngineError::NotSupported(_))
    ));
}

#[test]
fn submit_concatenates_segments_and_tracks_pending() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    conn.submit(&[b"set a 0 0 1\r\n".as_slice(), b"x\r\n"], true, true)
        .unwrap();
    assert_eq!(conn.pending_responses(), 1);

    let mut received = [0u8; 16];
    server.read_exact(&mut received).unwrap();
    assert_eq!(&received, b"set a 0 0 1\r\nx\r\n");
}

fn shrink_socket_buffer(fd: i32, option: libc::c_int) {
    let size: libc::c_int = 4096;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &size as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    assert_eq!(rc, 0);
}

#[test]
fn blocked_write_relief_dispatches_pending_response() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    // small receive window, inherited by the accepted socket, so the
    // flush hits a full send queue while the server is not reading
    shrink_socket_buffer(listener.as_raw_fd(), libc::SO_RCVBUF);
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    shrink_socket_buffer(client.as_raw_fd(), libc::SO_SNDBUF);
    let (mut server, _) = listener.accept().unwrap();

    // the response is already on the wire before the big write starts
    server.write_all(b"STORED\r\n").unwrap();

    let config = EngineConfig {
        buffer_capacity: 4096,
        ..EngineConfig::default()
    };
    let mut conn = Connection::stream(OwnedFd::from(client), config).unwrap();
    settle();

    let fired = Arc::new(AtomicBool::new(false));
    let mut registry = CallbackRegistry::new();
    let flag = Arc::clone(&fired);
    registry.register(move |line: &[u8]| {
        assert_eq!(line, b"STORED\r\n");
        flag.store(true, Ordering::SeqCst);
        true
    });
    conn.set_response_callbacks(registry);
    conn.mark_request_sent();

    let sink = thread::spawn(move || {
        // stay deaf long enough to wedge the write, then drain it all
        thread::sleep(Duration::from_millis(300));
        let mut sunk = 0usize;
        let mut buf = [0u8; 4096];
        loop {
            match server.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => sunk += n,
            }
        }
        sunk
    });

    let payload = vec![0xabu8; 1 << 20];
    let written = conn.write(&payload, true).unwrap();
    assert_eq!(written, payload.len());

    // the blocked flush relieved itself by consuming the response
    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(conn.pending_responses(), 0);

    drop(conn);
    assert_eq!(sink.join().unwrap(), payload.len());
}

#[test]
fn select_ready_skips_closed_connections() {
    let config = EngineConfig::default();
    let (mut conn_a, _server_a) = stream_pair(config.clone());
    let (mut conn_b, _server_b) = stream_pair(config.clone());

    conn_a.reset();
    conn_a.mark_request_sent();
    conn_b.mark_request_sent();

    // the closed connection never wins the linear-scan shortcut
    let connections = [conn_a, conn_b];
    assert_eq!(select_ready(&connections, &config), Some(1));
}

#[test]
fn dispatcher_consumes_one_response() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let mut registry = CallbackRegistry::new();
    let sink = Arc::clone(&seen);
    registry.register(move |line: &[u8]| {
        sink.lock().unwrap().push(line.to_vec());
        true
    });
    conn.set_response_callbacks(registry);

    conn.mark_request_sent();
    server.write_all(b"STORED\r\n").unwrap();
    settle();

    assert!(conn.drain_one());
    assert_eq!(conn.pending_responses(), 0);
    assert_eq!(seen.lock().unwrap().as_slice(), &[b"STORED\r\n".to_vec()]);

    // nothing pending, nothing consumed
    assert!(!conn.drain_one());
}

#[test]
fn drain_one_without_registry_is_noop() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    conn.mark_request_sent();
    server.write_all(b"STORED\r\n").unwrap();
    settle();

    assert!(!conn.drain_one());
    // the response stays for a direct read
    let mut line = [0u8; 16];
    assert_eq!(conn.read_line(&mut line).unwrap(), 8);
}

#[test]
fn drain_until_closed_ends_in_connection_failure() {
    let (mut conn, mut server) = stream_pair(EngineConfig::default());
    server.write_all(b"stale response bytes\r\n").unwrap();
    drop(server);

    // peer close is the terminal state the drain is after; the dead
    // socket must not stay attached
    assert!(matches!(
        conn.drain_until_closed(),
        Err(EngineError::ConnectionFailure(_))
    ));
    assert!(conn.is_closed());
    assert_eq!(conn.read_buffered(), 0);
}

#[test]
fn drain_until_closed_reports_in_progress_on_silent_peer() {
    let config = EngineConfig {
        poll_timeout_ms: 100,
        ..EngineConfig::default()
    };
    let (mut conn, _server) = stream_pair(config);
    assert!(matches!(
        conn.drain_until_closed(),
        Err(EngineError::InProgress)
    ));
}
