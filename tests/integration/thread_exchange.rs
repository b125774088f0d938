/// Integration test: both peers on threads over the in-memory queue pair.

use std::sync::Arc;
use std::thread;

use peer_exchange::comms::queue::QueueTransport;
use peer_exchange::exchange::{run_threaded, ExchangeConfig, Peer, PeerConfig};
use peer_exchange::protocol::PeerState;

fn config(stop_condition: u32, initial_message: &str) -> ExchangeConfig {
    ExchangeConfig {
        stop_condition,
        initial_message: initial_message.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_single_round_trip() {
    let report = run_threaded(&config(1, "Hi")).unwrap();

    assert_eq!((report.initiator.sent, report.initiator.received), (1, 1));
    assert_eq!((report.responder.sent, report.responder.received), (1, 1));
}

#[test]
fn test_three_rounds_strict_alternation() {
    let report = run_threaded(&config(3, "Hi")).unwrap();
    assert!(report.is_complete(3));
}

#[test]
fn test_every_stop_condition_completes() {
    for n in 1..=25 {
        let report = run_threaded(&config(n, "Test")).unwrap();
        assert!(report.is_complete(n), "incomplete run for n={}: {:?}", n, report);
    }
}

#[test]
fn test_maximum_stop_condition() {
    let report = run_threaded(&config(1000, "Hi")).unwrap();
    assert!(report.is_complete(1000));
}

#[test]
fn test_counters_monotonic_and_bounded() {
    const N: u32 = 50;

    let initiator = Arc::new(Peer::new(PeerConfig::initiator("i", N, false, "Hi")).unwrap());
    let responder = Arc::new(Peer::new(PeerConfig::responder("r", N, false)).unwrap());
    let (a, b) = QueueTransport::pair("i", "r");

    let watcher = {
        let initiator = initiator.clone();
        let responder = responder.clone();
        thread::spawn(move || {
            let mut last = [(0u32, 0u32); 2];
            loop {
                let done = initiator.state() == PeerState::Stopped
                    && responder.state() == PeerState::Stopped;
                for (slot, peer) in last.iter_mut().zip([&initiator, &responder]) {
                    let now = (peer.sent_count(), peer.received_count());
                    assert!(now.0 >= slot.0 && now.1 >= slot.1, "counter went backwards");
                    assert!(now.0 <= N && now.1 <= N, "counter exceeded stop condition");
                    *slot = now;
                }
                if done {
                    return last;
                }
                thread::yield_now();
            }
        })
    };

    let r = {
        let responder = responder.clone();
        thread::spawn(move || responder.run(|| Ok(b)))
    };
    let i = {
        let initiator = initiator.clone();
        thread::spawn(move || initiator.run(|| Ok(a)))
    };

    i.join().unwrap().unwrap();
    r.join().unwrap().unwrap();
    let last = watcher.join().unwrap();

    assert_eq!(last, [(N, N), (N, N)]);
}

#[test]
fn test_initial_send_precedes_first_receive() {
    let initiator = Peer::new(PeerConfig::initiator("i", 1, false, "Hi")).unwrap();
    let (a, b) = QueueTransport::pair("i", "script");

    thread::scope(|s| {
        let script = s.spawn(|| {
            use peer_exchange::comms::Transport;
            let first = b.recv_line().unwrap().unwrap();
            // Nothing has been sent to the initiator yet, so it cannot have received.
            while initiator.sent_count() == 0 {
                thread::yield_now();
            }
            let sent_before_reply = initiator.sent_count();
            let received_before_reply = initiator.received_count();
            b.send_line(&format!("{} 1", first)).unwrap();
            (first, sent_before_reply, received_before_reply)
        });

        let stats = initiator.run(|| Ok(a)).unwrap();
        let (first, sent_before, received_before) = script.join().unwrap();

        assert_eq!(first, "Hi 0");
        assert_eq!((sent_before, received_before), (1, 0));
        assert_eq!((stats.sent, stats.received), (1, 1));
    });
}
