mod support;

use std::sync::Arc;
use std::thread;

use reglo_pump::{PumpDirection, SessionConfig};
use support::{assert_not_interleaved, SimulatedPump};

#[test]
fn shared_session_never_interleaves_transactions() {
    let pump = SimulatedPump::new(2);
    pump.set(|s| s.run_polls = 2);
    let session = Arc::new(
        pump.establish(SessionConfig {
            stall_window: None,
            ..SessionConfig::default()
        })
        .unwrap(),
    );
    pump.clear_writes();

    let workers: Vec<_> = [1u8, 2]
        .into_iter()
        .map(|channel| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for _ in 0..25 {
                    session
                        .pump_vol(channel, PumpDirection::Clockwise, 0.5, 1.0)
                        .unwrap();
                    while session.is_running(channel).unwrap() {}
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_not_interleaved(&pump.events());

    let writes = pump.writes();
    let starts: Vec<usize> = writes
        .iter()
        .enumerate()
        .filter(|(_, w)| w.ends_with("I1\r"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(starts.len(), 50);
    for start in starts {
        let channel = &writes[start][..1];
        let sequence = &writes[start..start + 7];
        assert!(
            sequence.iter().all(|w| w.starts_with(channel)),
            "pump_vol sequence split by another caller: {sequence:?}"
        );
        assert_eq!(sequence[6], format!("{channel}H1\r"));
    }
}

#[test]
fn session_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<reglo_pump::PumpSession<support::SimTransport>>();
}
