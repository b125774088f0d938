/// Integration test: bounded connect retry against a late or absent listener.

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use peer_exchange::comms::tcp::{connect_with_retry, RetryPolicy};
use peer_exchange::ExchangeError;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    listener.local_addr().unwrap().port()
}

#[test]
fn test_connects_once_listener_appears() {
    let port = free_port();
    let policy = RetryPolicy {
        delay: Duration::from_millis(50),
        max_wait: Duration::from_secs(5),
    };

    let late_listener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind port");
        let (stream, _) = listener.accept().expect("accept");
        stream
    });

    let started = Instant::now();
    let stream = connect_with_retry(&format!("127.0.0.1:{}", port), &policy).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(stream.peer_addr().unwrap().port(), port);
    drop(late_listener.join().unwrap());
}

#[test]
fn test_times_out_within_one_retry_interval() {
    let port = free_port();
    let policy = RetryPolicy {
        delay: Duration::from_millis(50),
        max_wait: Duration::from_millis(400),
    };

    let started = Instant::now();
    let err = connect_with_retry(&format!("127.0.0.1:{}", port), &policy).unwrap_err();
    let elapsed = started.elapsed();

    match err {
        ExchangeError::ConnectionTimeout { waited, .. } => {
            assert!(waited >= policy.max_wait);
        }
        other => panic!("Expected ConnectionTimeout, got {:?}", other),
    }
    assert!(elapsed >= policy.max_wait);
    // One retry interval of tolerance, plus scheduling slack.
    assert!(elapsed < policy.max_wait + policy.delay + Duration::from_millis(500));
}

#[test]
fn test_other_errors_abort_without_retry() {
    let policy = RetryPolicy {
        delay: Duration::from_millis(200),
        max_wait: Duration::from_secs(5),
    };

    let started = Instant::now();
    let err = connect_with_retry("no-port-given", &policy).unwrap_err();

    assert!(matches!(err, ExchangeError::Transport(_)));
    assert!(started.elapsed() < policy.delay);
}
