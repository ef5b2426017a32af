//! End-to-end exchanges against a simulated VESC.
//!
//! The simulator implements the wire protocol byte-for-byte: it decodes each
//! request frame, updates its internal state, and queues a framed response,
//! so these tests exercise the codec, dispatcher, catalog and session
//! exactly as a real device would.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use pivesc::constants::*;
use pivesc::frame;
use pivesc::messages::{InboundCommand, OutboundMessage};
use pivesc::session::{SessionEvent, SessionManager};
use pivesc::transport::Transport;
use pivesc::{Dispatcher, SessionHandle, VescClient, VescError};

/// Raw field values the simulator reports in GET_VALUES.
fn values_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&250i16.to_be_bytes()); // temp_mosfet -> 25.0
    body.extend_from_slice(&310i16.to_be_bytes()); // temp_motor -> 31.0
    body.extend_from_slice(&1234i32.to_be_bytes()); // current_motor -> 12.34
    body.extend_from_slice(&3000i32.to_be_bytes()); // current_battery -> 30.0
    body.extend_from_slice(&100i32.to_be_bytes()); // id -> 1.0
    body.extend_from_slice(&(-100i32).to_be_bytes()); // iq -> -1.0
    body.extend_from_slice(&1000i16.to_be_bytes()); // duty raw 1.0 -> capped 0.9
    body.extend_from_slice(&4500i32.to_be_bytes()); // rpm
    body.extend_from_slice(&415i16.to_be_bytes()); // v_in -> 41.5 + 0.5
    body.extend_from_slice(&1000i32.to_be_bytes()); // amp_hours -> 1.0
    body.extend_from_slice(&250i32.to_be_bytes()); // amp_hours_charged -> 0.25
    body.extend_from_slice(&15000i32.to_be_bytes()); // watt_hours -> 1.5
    body.extend_from_slice(&3000i32.to_be_bytes()); // watt_hours_charged -> 0.3
    body.extend_from_slice(&99i32.to_be_bytes()); // tachometer
    body.extend_from_slice(&204i32.to_be_bytes()); // tachometer_abs
    body
}

#[derive(Default)]
struct SimState {
    pending: VecDeque<u8>,
    parked: bool,
    corrupt_next: bool,
}

/// A scripted device on the other end of the link.
#[derive(Clone, Default)]
struct SimulatedVesc {
    state: Arc<Mutex<SimState>>,
    corrupt_flag: Arc<AtomicBool>,
}

impl SimulatedVesc {
    fn corrupt_next_response(&self) {
        self.corrupt_flag.store(true, Ordering::SeqCst);
    }

    fn respond(&self, state: &mut SimState, payload: &[u8]) {
        let mut response = frame::encode(payload);
        if state.corrupt_next {
            state.corrupt_next = false;
            // Damage one payload bit; the client must detect it.
            response[2] ^= 0x01;
        }
        state.pending.extend(response);
    }
}

impl Read for SimulatedVesc {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.pending.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for SimulatedVesc {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        assert!(
            state.pending.is_empty(),
            "request written while a response was still unread: exchanges interleaved"
        );
        state.corrupt_next = self.corrupt_flag.swap(false, Ordering::SeqCst);

        let request = frame::read_frame(&mut Cursor::new(buf)).expect("well-formed request");
        let command = request[0];
        match command {
            COMM_GET_VALUES => {
                let mut payload = vec![COMM_GET_VALUES];
                payload.extend_from_slice(&values_body());
                self.respond(&mut state, &payload);
            }
            COMM_GET_ADC_VALUES => {
                self.respond(&mut state, &[COMM_GET_ADC_VALUES, 12, 34]);
            }
            COMM_GET_PARKED_STATUS => {
                let flag = u8::from(state.parked);
                self.respond(&mut state, &[COMM_GET_PARKED_STATUS, flag]);
            }
            COMM_FW_VERSION => {
                self.respond(&mut state, &[COMM_FW_VERSION, 5, 2]);
            }
            COMM_PARK_MODE => {
                state.parked = true;
                self.respond(&mut state, &[COMM_PARK_MODE]);
            }
            COMM_PARK_UNLOCK => {
                state.parked = false;
                self.respond(&mut state, &[COMM_PARK_UNLOCK]);
            }
            COMM_SET_MOTOR_LIMITS => {
                // Echo the three applied limits back, as the firmware does.
                let mut payload = vec![COMM_SET_MOTOR_LIMITS];
                payload.extend_from_slice(&request[1..13]);
                self.respond(&mut state, &payload);
            }
            other => {
                self.respond(&mut state, &[other]);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for SimulatedVesc {}

fn sim_client() -> (VescClient, SimulatedVesc) {
    let device = SimulatedVesc::default();
    let client = VescClient::new(Dispatcher::spawn(Some(Box::new(device.clone()))));
    (client, device)
}

#[tokio::test]
async fn park_then_status_round_trip() {
    let (client, _device) = sim_client();

    client.set_parked(true).await.unwrap();
    assert!(client.parked_status().await.unwrap());

    client.set_parked(false).await.unwrap();
    assert!(!client.parked_status().await.unwrap());
}

#[tokio::test]
async fn composite_poll_decodes_one_coherent_snapshot() {
    let (client, _device) = sim_client();

    let snapshot = client.poll_snapshot().await.unwrap();
    assert_eq!(snapshot.temp_mosfet, 25.0);
    assert_eq!(snapshot.temp_motor, 31.0);
    assert_eq!(snapshot.current_motor, 12.34);
    assert_eq!(snapshot.current_battery, 30.0);
    assert_eq!(snapshot.duty_cycle, 0.9);
    assert_eq!(snapshot.rpm, 4500);
    assert_eq!(snapshot.v_in, 42.0);
    assert_eq!(snapshot.amp_hours, 1.0);
    assert_eq!(snapshot.adc1, 12.0);
    assert_eq!(snapshot.adc2, 34.0);
    assert_eq!(snapshot.is_parked, Some(false));
    assert_eq!(snapshot.firmware, "5.2");
}

#[tokio::test]
async fn setters_validate_the_command_echo() {
    let (client, _device) = sim_client();

    client.set_duty_cycle(0.4).await.unwrap();
    client.set_current(12.0).await.unwrap();
    client.set_current_brake(8.0).await.unwrap();
    client.set_rpm(3000.0).await.unwrap();
    client.set_motor_limits(60.0, 40.0, 15.0).await.unwrap();
    client.set_battery_cutoff(42.0, 38.0).await.unwrap();
}

#[tokio::test]
async fn firmware_version_reads_major_minor() {
    let (client, _device) = sim_client();
    assert_eq!(client.firmware_version().await.unwrap(), "5.2");
}

#[tokio::test]
async fn corrupt_response_fails_the_poll_then_recovers() {
    let (client, device) = sim_client();

    device.corrupt_next_response();
    let err = client.poll_snapshot().await.unwrap_err();
    assert!(matches!(err, VescError::CrcMismatch { .. }));

    // Next tick's poll sees a clean line again.
    let snapshot = client.poll_snapshot().await.unwrap();
    assert_eq!(snapshot.v_in, 42.0);
}

async fn sim_session() -> (SessionHandle, SimulatedVesc, watch::Sender<bool>) {
    let device = SimulatedVesc::default();
    let client = VescClient::new(Dispatcher::spawn(Some(Box::new(device.clone()))));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, _task) = SessionManager::spawn(client, Duration::from_millis(20), shutdown_rx);
    (handle, device, shutdown_tx)
}

#[tokio::test]
async fn session_broadcasts_snapshots_and_services_commands() {
    let (handle, _device, _shutdown) = sim_session().await;
    let mut observer = handle.attach();

    let event = observer.events.recv().await.unwrap();
    let SessionEvent::Snapshot(snapshot) = event else {
        panic!("expected a snapshot broadcast");
    };
    assert_eq!(snapshot.firmware, "5.2");

    let reply = observer.request(InboundCommand::SetParked).await;
    assert!(matches!(reply, OutboundMessage::Parked { parked: true }));

    let reply = observer.request(InboundCommand::GetParkedStatus).await;
    assert!(matches!(reply, OutboundMessage::Parked { parked: true }));

    let reply = observer.request(InboundCommand::SetUnparked).await;
    assert!(matches!(reply, OutboundMessage::Unparked { unparked: true }));

    // Polling carries on after the command interleave.
    let mut saw_snapshot = false;
    for _ in 0..10 {
        match observer.events.recv().await {
            Ok(SessionEvent::Snapshot(_)) => {
                saw_snapshot = true;
                break;
            }
            Ok(SessionEvent::NoData) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(other) => panic!("broadcast closed: {other:?}"),
        }
    }
    assert!(saw_snapshot);
}

#[tokio::test]
async fn forced_snapshot_reflects_current_park_state() {
    let (handle, _device, _shutdown) = sim_session().await;
    let observer = handle.attach();

    let reply = observer.request(InboundCommand::SetParked).await;
    assert!(matches!(reply, OutboundMessage::Parked { parked: true }));

    let snapshot = handle.snapshot().await.expect("device is answering");
    assert_eq!(snapshot.is_parked, Some(true));
}
