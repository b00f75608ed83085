use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use simpl_sry::{Protocol, Received, Sry, SryConfig, SryError};
use simpl_surrogate::{SerialSurrogate, SurrogateConfig, SurrogateError, TcpSurrogate};
use simpl_wire::{Frame, FrameReader, FrameWriter, NameLocateReply, Token};

fn unique_fifo_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "simpl-surrogate-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn sry_config(dir: &PathBuf) -> SryConfig {
    SryConfig::default()
        .with_fifo_dir(dir)
        .with_locate_timeout(Duration::from_secs(10))
}

fn loopback_config() -> SurrogateConfig {
    SurrogateConfig::default()
        .with_bind_host("127.0.0.1")
        .with_port(0)
        .with_nameloc_timeout(Duration::from_secs(5))
}

enum Event {
    Message(Vec<u8>),
    Proxy(u32),
}

/// Receiver that answers every message with the payload reversed and
/// reports what it saw.
fn reversing_receiver(dir: &PathBuf, name: &str, events: usize) -> thread::JoinHandle<Vec<Event>> {
    let mut receiver =
        Sry::open_with_config(name, sry_config(dir)).expect("receiver should register");
    thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..events {
            match receiver.receive().expect("receive should succeed") {
                Received::Message(msg) => {
                    let mut reply = msg.payload().to_vec();
                    seen.push(Event::Message(reply.clone()));
                    reply.reverse();
                    receiver.reply(msg, &reply).expect("reply should succeed");
                }
                Received::Proxy(value) => seen.push(Event::Proxy(value)),
            }
        }
        seen
    })
}

#[test]
fn tcp_remote_send_and_reply() {
    let dir = unique_fifo_dir("tcp-send");
    let surrogate = TcpSurrogate::start(loopback_config(), sry_config(&dir)).unwrap();
    let receiver = reversing_receiver(&dir, "echo", 4);

    let mut sender = Sry::open_with_config("sender", sry_config(&dir)).unwrap();
    let handle = sender
        .locate("127.0.0.1", "echo", 1024, Protocol::Tcp)
        .unwrap();
    assert!(handle.is_remote());

    for text in ["abc", "hello world", ""] {
        let mut reply = [0u8; 1024];
        let len = sender.send(&handle, text.as_bytes(), &mut reply).unwrap();
        let expected: Vec<u8> = text.bytes().rev().collect();
        assert_eq!(&reply[..len], expected.as_slice());
    }

    sender.trigger(&handle, 42).unwrap();
    let seen = receiver.join().unwrap();
    assert!(matches!(seen.last(), Some(Event::Proxy(42))));
    assert_eq!(
        seen.iter().filter(|e| matches!(e, Event::Message(_))).count(),
        3
    );

    sender.close().unwrap();
    surrogate.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn tcp_remote_locate_of_missing_name_is_not_found() {
    let dir = unique_fifo_dir("tcp-missing");
    let surrogate = TcpSurrogate::start(loopback_config(), sry_config(&dir)).unwrap();

    let mut sender = Sry::open_with_config("sender", sry_config(&dir)).unwrap();
    let err = sender
        .locate("127.0.0.1", "nobody", 64, Protocol::Tcp)
        .unwrap_err();
    match err {
        SryError::NotFound { name, host } => {
            assert_eq!(name, "nobody");
            assert_eq!(host.as_deref(), Some("127.0.0.1"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }

    surrogate.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn tcp_session_refuses_messages_above_limit() {
    let dir = unique_fifo_dir("tcp-limit");
    let config = loopback_config().with_max_msg_mem(256);
    let surrogate = TcpSurrogate::start(config, sry_config(&dir)).unwrap();
    let _receiver = Sry::open_with_config("echo", sry_config(&dir)).unwrap();

    let mut sender = Sry::open_with_config("sender", sry_config(&dir)).unwrap();
    let err = sender
        .locate("127.0.0.1", "echo", 4096, Protocol::Tcp)
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error {err:?}");

    surrogate.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn second_surrogate_on_same_host_is_refused() {
    let dir = unique_fifo_dir("tcp-twice");
    let first = TcpSurrogate::start(loopback_config(), sry_config(&dir)).unwrap();
    match TcpSurrogate::start(loopback_config(), sry_config(&dir)) {
        Err(SurrogateError::Sry(SryError::NameConflict { name, .. })) => {
            assert_eq!(name, "_TCP_surrogate_S");
        }
        Err(other) => panic!("expected NameConflict, got {other:?}"),
        Ok(_) => panic!("second surrogate should not start"),
    }
    first.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn locate_without_running_surrogate_fails() {
    let dir = unique_fifo_dir("tcp-none");
    let mut sender = Sry::open_with_config("sender", sry_config(&dir)).unwrap();
    let err = sender
        .locate("127.0.0.1", "echo", 64, Protocol::Tcp)
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error {err:?}");
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn serial_line_joins_two_hosts() {
    let near = unique_fifo_dir("serial-near");
    let far = unique_fifo_dir("serial-far");
    let (a, b) = UnixStream::pair().unwrap();

    let near_surrogate = SerialSurrogate::over(
        a.try_clone().unwrap(),
        a,
        SurrogateConfig::serial(),
        sry_config(&near),
    )
    .unwrap();
    let far_surrogate = SerialSurrogate::over(
        b.try_clone().unwrap(),
        b,
        SurrogateConfig::serial(),
        sry_config(&far),
    )
    .unwrap();

    let receiver = reversing_receiver(&far, "echo", 2);
    let mut sender = Sry::open_with_config("sender", sry_config(&near)).unwrap();
    let handle = sender
        .locate("far-host", "echo", 512, Protocol::Serial)
        .unwrap();

    for text in ["over the wire", "again"] {
        let mut reply = [0u8; 512];
        let len = sender.send(&handle, text.as_bytes(), &mut reply).unwrap();
        let expected: Vec<u8> = text.bytes().rev().collect();
        assert_eq!(&reply[..len], expected.as_slice());
    }
    receiver.join().unwrap();

    sender.close().unwrap();
    near_surrogate.shutdown().unwrap();
    far_surrogate.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(near);
    let _ = std::fs::remove_dir_all(far);
}

#[test]
fn quiet_inbound_session_outlives_keepalive_window() {
    let near = unique_fifo_dir("quiet-near");
    let far = unique_fifo_dir("quiet-far");
    let (a, b) = UnixStream::pair().unwrap();

    // The locating side never probes; the receiving side runs a short clock.
    let near_surrogate = SerialSurrogate::over(
        a.try_clone().unwrap(),
        a,
        SurrogateConfig::serial().with_keepalive(false),
        sry_config(&near),
    )
    .unwrap();
    let far_surrogate = SerialSurrogate::over(
        b.try_clone().unwrap(),
        b,
        SurrogateConfig::serial()
            .with_check_interval(Duration::from_millis(100))
            .with_fail_limit(1),
        sry_config(&far),
    )
    .unwrap();

    let receiver = reversing_receiver(&far, "echo", 2);
    let mut sender = Sry::open_with_config("sender", sry_config(&near)).unwrap();
    let handle = sender
        .locate("far-host", "echo", 256, Protocol::Serial)
        .unwrap();

    let mut reply = [0u8; 256];
    let len = sender.send(&handle, b"ping", &mut reply).unwrap();
    assert_eq!(&reply[..len], b"gnip");

    // Several times the far side's interval * (fail_limit + 1).
    thread::sleep(Duration::from_millis(1500));
    let len = sender.send(&handle, b"later", &mut reply).unwrap();
    assert_eq!(&reply[..len], b"retal");
    receiver.join().unwrap();

    sender.close().unwrap();
    near_surrogate.shutdown().unwrap();
    far_surrogate.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(near);
    let _ = std::fs::remove_dir_all(far);
}

struct SilentPeer {
    answered_at: Instant,
    sends: usize,
    alives: usize,
    closes: Vec<Instant>,
}

/// Far end of a serial line that accepts one NAME_LOCATE and then never
/// answers anything.
fn silent_peer(line: UnixStream) -> thread::JoinHandle<SilentPeer> {
    thread::spawn(move || {
        let mut reader = FrameReader::new(line.try_clone().unwrap(), 64 * 1024);
        let mut writer = FrameWriter::new(line.try_clone().unwrap());

        let hello = reader.read_frame().unwrap();
        assert_eq!(hello.token, Token::NameLocate);
        let found = NameLocateReply::found(99).encode().unwrap();
        writer
            .write_frame(&Frame::new(Token::Reply, hello.remote_id, found))
            .unwrap();

        let mut seen = SilentPeer {
            answered_at: Instant::now(),
            sends: 0,
            alives: 0,
            closes: Vec::new(),
        };
        line.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        while let Ok(frame) = reader.read_frame() {
            assert_eq!(frame.remote_id, 99);
            match frame.token {
                Token::Send => seen.sends += 1,
                Token::Alive => seen.alives += 1,
                Token::Close => {
                    seen.closes.push(Instant::now());
                    // Keep listening briefly for a second CLOSE.
                    line.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
                }
                other => panic!("unexpected {other} from the session"),
            }
        }
        seen
    })
}

#[test]
fn outbound_session_expires_once_when_peer_is_silent() {
    let dir = unique_fifo_dir("silent");
    let (line, far) = UnixStream::pair().unwrap();
    let peer = silent_peer(far);

    let interval = Duration::from_millis(200);
    let fail_limit = 2;
    let config = SurrogateConfig::serial()
        .with_check_interval(interval)
        .with_fail_limit(fail_limit);
    let surrogate =
        SerialSurrogate::over(line.try_clone().unwrap(), line, config, sry_config(&dir)).unwrap();

    let mut sender = Sry::open_with_config("sender", sry_config(&dir)).unwrap();
    let handle = sender
        .locate("far-host", "echo", 256, Protocol::Serial)
        .unwrap();
    let mut reply = [0u8; 256];
    let err = sender.send(&handle, b"anyone?", &mut reply).unwrap_err();
    assert!(matches!(err, SryError::ReplyFailed), "unexpected error {err:?}");

    let seen = peer.join().unwrap();
    assert_eq!(seen.sends, 1);
    assert_eq!(seen.alives, fail_limit as usize);
    assert_eq!(seen.closes.len(), 1);
    let elapsed = seen.closes[0] - seen.answered_at;
    let window = interval * (fail_limit + 1);
    assert!(elapsed >= window, "closed after {elapsed:?}, window {window:?}");
    assert!(elapsed < window + Duration::from_secs(3), "closed after {elapsed:?}");

    sender.close().unwrap();
    surrogate.shutdown().unwrap();
    let _ = std::fs::remove_dir_all(dir);
}
