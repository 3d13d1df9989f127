use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::socket::{
    bind, connect, listen, socket, AddressFamily, Backlog, SockFlag, SockType, UnixAddr,
};

use quorumgate_core::{ConsensusRequest, InterceptedCall, OperationKind, TransportError, Votes};
use transport::{ConsensusTransport, RpcTransport, SocketTransport};

const METHOD: &str = "quorumgate_submitOperation";

fn sample_request() -> ConsensusRequest {
    let call = InterceptedCall::on_path(OperationKind::FileOpen, "/etc/hosts")
        .with_flags((libc::O_WRONLY | libc::O_TRUNC) as i64);
    ConsensusRequest::from_call(&call, "System configuration")
}

/// Serves one connection on a Unix socket, replying with `reply` (or
/// closing silently when `None`). Returns the received record.
fn unix_backend(
    reply: Option<&'static [u8]>,
    delay: Duration,
) -> (tempfile::TempDir, PathBuf, mpsc::Receiver<String>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("consensus.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let bytes = stream.read(&mut buf).unwrap();
        tx.send(String::from_utf8_lossy(&buf[..bytes]).into_owned()).unwrap();
        thread::sleep(delay);
        if let Some(reply) = reply {
            let _ = stream.write_all(reply);
        }
    });
    (dir, path, rx)
}

/// Reads one HTTP request and returns its body.
fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let bytes = stream.read(&mut buf).unwrap();
        raw.extend_from_slice(&buf[..bytes]);
        let text = String::from_utf8_lossy(&raw).into_owned();
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= split + 4 + length {
                return text[split + 4..].to_string();
            }
        }
        if bytes == 0 {
            return String::new();
        }
    }
}

/// Answers one HTTP request with `response` verbatim, then keeps the
/// connection open for `hold` before closing it.
fn http_backend(response: Vec<u8>, hold: Duration) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = tx.send(read_request(&mut stream));
        let _ = stream.write_all(&response);
        thread::sleep(hold);
    });
    (endpoint, rx)
}

fn json_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

#[test]
fn socket_backend_approves_on_exact_token() {
    let (_dir, path, rx) = unix_backend(Some(b"APPROVE"), Duration::ZERO);
    let transport = SocketTransport::new(&path, "APPROVE", Duration::from_secs(2));
    let response = transport.request(&sample_request()).unwrap();
    assert!(response.approved);

    let record = rx.recv().unwrap();
    assert!(record.starts_with("file_open|resource=/etc/hosts;"));
}

#[test]
fn socket_backend_other_reply_denies() {
    let (_dir, path, _rx) = unix_backend(Some(b"DENY"), Duration::ZERO);
    let transport = SocketTransport::new(&path, "APPROVE", Duration::from_secs(2));
    let response = transport.request(&sample_request()).unwrap();
    assert!(!response.approved);
}

#[test]
fn socket_backend_silent_close_is_protocol_error() {
    let (_dir, path, _rx) = unix_backend(None, Duration::ZERO);
    let transport = SocketTransport::new(&path, "APPROVE", Duration::from_secs(2));
    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)));
}

#[test]
fn socket_backend_slow_reply_times_out() {
    let (_dir, path, _rx) = unix_backend(Some(b"APPROVE"), Duration::from_millis(800));
    let transport = SocketTransport::new(&path, "APPROVE", Duration::from_millis(100));
    let err = transport.request(&sample_request()).unwrap_err();
    assert_eq!(err, TransportError::Timeout(100));
}

#[test]
fn socket_backend_stale_socket_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("consensus.sock");
    drop(UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let transport = SocketTransport::new(&path, "APPROVE", Duration::from_secs(1));
    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Unavailable(_)), "{err:?}");
}

#[test]
fn socket_backend_full_backlog_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("consensus.sock");
    let addr = UnixAddr::new(&path).unwrap();
    let listener = socket(AddressFamily::Unix, SockType::Stream, SockFlag::empty(), None).unwrap();
    bind(listener.as_raw_fd(), &addr).unwrap();
    listen(&listener, Backlog::new(1).unwrap()).unwrap();

    // Never accepted: queue connections until the kernel refuses more.
    let mut queued = Vec::new();
    loop {
        let fd = socket(AddressFamily::Unix, SockType::Stream, SockFlag::SOCK_NONBLOCK, None)
            .unwrap();
        match connect(fd.as_raw_fd(), &addr) {
            Ok(()) => queued.push(fd),
            Err(Errno::EAGAIN) => break,
            Err(err) => panic!("unexpected connect failure: {err}"),
        }
        assert!(queued.len() < 64, "listener backlog never filled");
    }

    let transport = SocketTransport::new(&path, "APPROVE", Duration::from_millis(200));
    let started = Instant::now();
    let err = transport.request(&sample_request()).unwrap_err();
    assert_eq!(err, TransportError::Timeout(200));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn rpc_backend_refused_connection_is_unavailable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport =
        RpcTransport::new(format!("http://127.0.0.1:{port}"), METHOD, Duration::from_secs(1));
    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Unavailable(_)), "{err:?}");
}

#[test]
fn rpc_backend_unsupported_scheme_is_unavailable() {
    let transport = RpcTransport::new("ftp://127.0.0.1:21/", METHOD, Duration::from_secs(1));
    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Unavailable(_)), "{err:?}");
}

#[test]
fn rpc_backend_reports_tally() {
    let request = sample_request();
    let body = format!(
        r#"{{"jsonrpc":"2.0","id":"{}","result":{{"approved":false,"votes_for":1,"votes_against":4}}}}"#,
        request.id
    );
    let (endpoint, rx) = http_backend(json_response(&body), Duration::ZERO);
    let transport = RpcTransport::new(endpoint, METHOD, Duration::from_secs(2));
    let response = transport.request(&request).unwrap();

    assert!(!response.approved);
    assert_eq!(response.votes, Some(Votes { votes_for: 1, votes_against: 4 }));

    let sent: serde_json::Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
    assert_eq!(sent["jsonrpc"], "2.0");
    assert_eq!(sent["method"], METHOD);
    assert_eq!(sent["params"]["operation"], "file_open");
    assert_eq!(sent["params"]["resource"], "/etc/hosts");
}

#[test]
fn rpc_backend_verdict_honored_while_connection_stays_open() {
    let request = sample_request();
    let body = format!(
        r#"{{"jsonrpc":"2.0","id":"{}","result":{{"approved":true}}}}"#,
        request.id
    );
    let (endpoint, _rx) = http_backend(json_response(&body), Duration::from_secs(3));
    let transport = RpcTransport::new(endpoint, METHOD, Duration::from_secs(1));

    let response = transport.request(&request).unwrap();
    assert!(response.approved);
}

#[test]
fn rpc_backend_that_never_answers_times_out() {
    let (endpoint, _rx) = http_backend(Vec::new(), Duration::from_secs(3));
    let transport = RpcTransport::new(endpoint, METHOD, Duration::from_millis(300));

    let started = Instant::now();
    let err = transport.request(&sample_request()).unwrap_err();
    assert_eq!(err, TransportError::Timeout(300));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn rpc_backend_oversized_chunk_length_is_protocol_error() {
    let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\n{}\r\n0\r\n\r\n";
    let (endpoint, _rx) = http_backend(response.to_vec(), Duration::ZERO);
    let transport = RpcTransport::new(endpoint, METHOD, Duration::from_secs(2));

    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)), "{err:?}");
}

#[test]
fn rpc_backend_error_status_is_protocol_error() {
    let response = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n";
    let (endpoint, _rx) = http_backend(response.to_vec(), Duration::ZERO);
    let transport = RpcTransport::new(endpoint, METHOD, Duration::from_secs(2));

    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)), "{err:?}");
}

#[test]
fn rpc_backend_garbage_is_protocol_error() {
    let (endpoint, _rx) = http_backend(json_response("APPROVE"), Duration::ZERO);
    let transport = RpcTransport::new(endpoint, METHOD, Duration::from_secs(2));
    let err = transport.request(&sample_request()).unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)));
}
