/// Integration test: each peer over its own TCP endpoint, as two processes would run.

use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use peer_exchange::comms::tcp::{RetryPolicy, TcpTransportListener};
use peer_exchange::exchange::{
    run_socket_initiator, run_socket_pair, run_socket_responder, run_socket_responder_on,
    ExchangeConfig,
};
use peer_exchange::ExchangeError;

fn config(stop_condition: u32, port: u16) -> ExchangeConfig {
    ExchangeConfig {
        stop_condition,
        initial_message: "Hi".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        retry: RetryPolicy {
            delay: Duration::from_millis(25),
            max_wait: Duration::from_secs(5),
        },
        ..Default::default()
    }
}

/// Reserve a port the OS considers free, then release it.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    listener.local_addr().unwrap().port()
}

#[test]
fn test_responder_and_initiator_complete() {
    for n in [1, 3, 20] {
        let listener = TcpTransportListener::bind(0).unwrap();
        let port = listener.local_addr().unwrap().port();

        let responder_config = config(n, port);
        let responder = thread::spawn(move || run_socket_responder_on(&responder_config, listener));

        let initiator = run_socket_initiator(&config(n, port)).unwrap();
        let responder = responder.join().unwrap().unwrap();

        assert_eq!((initiator.sent, initiator.received), (n, n));
        assert_eq!((responder.sent, responder.received), (n, n));
    }
}

#[test]
fn test_initiator_started_before_responder() {
    let port = free_port();

    let initiator = thread::spawn(move || run_socket_initiator(&config(4, port)));

    // The initiator is retrying "connection refused" in the meantime.
    thread::sleep(Duration::from_millis(200));
    let responder = run_socket_responder(&config(4, port)).unwrap();
    let initiator = initiator.join().unwrap().unwrap();

    assert_eq!((initiator.sent, initiator.received), (4, 4));
    assert_eq!((responder.sent, responder.received), (4, 4));
}

#[test]
fn test_socket_pair_harness() {
    let report = run_socket_pair(&config(5, 0)).unwrap();
    assert!(report.is_complete(5));
}

#[test]
fn test_mismatched_stop_conditions_are_reported() {
    let listener = TcpTransportListener::bind(0).unwrap();
    let port = listener.local_addr().unwrap().port();

    let responder_config = config(3, port);
    let responder = thread::spawn(move || run_socket_responder_on(&responder_config, listener));

    let initiator = run_socket_initiator(&config(2, port)).unwrap();
    let err = responder.join().unwrap().unwrap_err();

    assert_eq!((initiator.sent, initiator.received), (2, 2));
    match err {
        ExchangeError::Disconnected { received, expected, .. } => {
            assert_eq!((received, expected), (2, 3));
        }
        other => panic!("Expected Disconnected, got {:?}", other),
    }
}

#[test]
fn test_initiator_times_out_without_responder() {
    let mut cfg = config(1, free_port());
    cfg.retry = RetryPolicy {
        delay: Duration::from_millis(20),
        max_wait: Duration::from_millis(150),
    };

    let err = run_socket_initiator(&cfg).unwrap_err();
    assert!(matches!(err, ExchangeError::ConnectionTimeout { .. }));
}

#[test]
fn test_socket_pair_returns_when_initiator_cannot_connect() {
    let unreachable = ExchangeConfig {
        host: "no-such-host.invalid".to_string(),
        retry: RetryPolicy {
            delay: Duration::from_millis(20),
            max_wait: Duration::from_millis(200),
        },
        ..config(3, 0)
    };

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let _ = done_tx.send(run_socket_pair(&unreachable));
    });

    let result = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("socket pair should return instead of waiting in accept");
    assert!(matches!(result, Err(ExchangeError::Transport(_))));
}

#[test]
fn test_line_over_limit_aborts_exchange() {
    let tight = ExchangeConfig {
        max_line_len: 4,
        ..config(3, 0)
    };

    // "Hi 0" fits, the responder's "Hi 0 1" does not.
    let err = run_socket_pair(&tight).unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Transport(ref e) if e.kind() == std::io::ErrorKind::InvalidData
    ));
}
