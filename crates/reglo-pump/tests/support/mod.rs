#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reglo_frame::{decode_command, encode_line, encode_status, Mnemonic, ParsedCommand, Status};
use reglo_pump::{ManualClock, PumpSession, SessionConfig};
use reglo_transport::Transport;

/// One transport call, as seen by the simulated pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write(String),
    Read,
}

#[derive(Debug)]
pub struct SimState {
    pub serial_no: String,
    pub info: String,
    pub channels: u8,
    pub tubing: BTreeMap<u8, u16>,
    /// Number of `E` polls a started channel answers `+` to.
    pub run_polls: u32,
    pub running: BTreeMap<u8, u32>,
    pub odometer: BTreeMap<u8, u64>,
    pub stalled: bool,
    pub reject: HashSet<Mnemonic>,
    pub silent: bool,
    pub display: Option<String>,
    pub writes: Vec<String>,
    pub events: Vec<(ThreadId, Op)>,
}

/// In-memory Reglo ICC that answers like the real device.
#[derive(Clone)]
pub struct SimulatedPump {
    pub state: Arc<Mutex<SimState>>,
    pub clock: Arc<ManualClock>,
}

impl SimulatedPump {
    pub fn new(channels: u8) -> Self {
        let tubing = (1..=channels).map(|ch| (ch, 152)).collect();
        Self {
            state: Arc::new(Mutex::new(SimState {
                serial_no: "A1B2C3".to_string(),
                info: "REGLO ICC 0208 406".to_string(),
                channels,
                tubing,
                run_polls: 3,
                running: BTreeMap::new(),
                odometer: BTreeMap::new(),
                stalled: false,
                reject: HashSet::new(),
                silent: false,
                display: None,
                writes: Vec::new(),
                events: Vec::new(),
            })),
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub fn with_serial_no(self, serial_no: &str) -> Self {
        self.state.lock().unwrap().serial_no = serial_no.to_string();
        self
    }

    pub fn transport(&self) -> SimTransport {
        SimTransport {
            pump: self.clone(),
            rx: BytesMut::new(),
            tx: VecDeque::new(),
        }
    }

    pub fn establish(&self, config: SessionConfig) -> reglo_pump::Result<PumpSession<SimTransport>> {
        PumpSession::establish_with_clock(self.transport(), config, self.clock.clone())
    }

    pub fn set(&self, f: impl FnOnce(&mut SimState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        let mut state = self.state.lock().unwrap();
        state.writes.clear();
        state.events.clear();
    }

    pub fn events(&self) -> Vec<(ThreadId, Op)> {
        self.state.lock().unwrap().events.clone()
    }

    fn respond(&self, command: &ParsedCommand, out: &mut BytesMut) {
        let mut state = self.state.lock().unwrap();
        if state.reject.contains(&command.mnemonic) {
            encode_status(Status::Failure, out).unwrap();
            return;
        }
        let channel = command.address.channel_no().unwrap_or(0);

        match command.mnemonic {
            Mnemonic::SerialNumber => encode_line(&state.serial_no, out).unwrap(),
            Mnemonic::ChannelCount => encode_line(&state.channels.to_string(), out).unwrap(),
            Mnemonic::PumpInfo => encode_line(&state.info, out).unwrap(),
            Mnemonic::DisplayText => {
                state.display = Some(command.params.clone());
                encode_status(Status::Success, out).unwrap();
            }
            Mnemonic::SetTubingDiameter => {
                let hundredths = command.params.parse().unwrap();
                state.tubing.insert(channel, hundredths);
                encode_status(Status::Success, out).unwrap();
            }
            Mnemonic::TubingDiameter => {
                let mm = f64::from(state.tubing.get(&channel).copied().unwrap_or(0)) / 100.0;
                encode_line(&format!("{mm:.2} mm"), out).unwrap();
            }
            Mnemonic::SetVolume | Mnemonic::SetFlowRate => {
                encode_line(&command.params, out).unwrap()
            }
            Mnemonic::Start => {
                let polls = state.run_polls;
                state.running.insert(channel, polls);
                encode_status(Status::Success, out).unwrap();
            }
            Mnemonic::Stop => {
                state.running.insert(channel, 0);
                encode_status(Status::Success, out).unwrap();
            }
            Mnemonic::RunState => {
                let remaining = state.running.get(&channel).copied().unwrap_or(0);
                if remaining > 0 {
                    state.running.insert(channel, remaining.saturating_sub(1));
                    if !state.stalled {
                        *state.odometer.entry(channel).or_insert(0) += 10;
                    }
                    encode_status(Status::Yes, out).unwrap();
                } else {
                    encode_status(Status::No, out).unwrap();
                }
            }
            Mnemonic::Odometer => {
                let value = state.odometer.get(&channel).copied().unwrap_or(0);
                encode_line(&value.to_string(), out).unwrap();
            }
            Mnemonic::EnableChannelAddressing
            | Mnemonic::Clockwise
            | Mnemonic::CounterClockwise
            | Mnemonic::VolumeTimeMode
            | Mnemonic::SpeedFromFlowRate => encode_status(Status::Success, out).unwrap(),
        }
    }
}

pub struct SimTransport {
    pump: SimulatedPump,
    rx: BytesMut,
    tx: VecDeque<u8>,
}

impl Transport for SimTransport {
    fn read(&mut self, timeout: Duration) -> reglo_transport::Result<Bytes> {
        self.pump
            .state
            .lock()
            .unwrap()
            .events
            .push((std::thread::current().id(), Op::Read));
        if self.tx.is_empty() {
            self.pump.clock.advance(timeout);
            return Ok(Bytes::new());
        }
        Ok(self.tx.drain(..).collect::<Vec<u8>>().into())
    }

    fn write_all(&mut self, data: &[u8]) -> reglo_transport::Result<()> {
        let text = String::from_utf8_lossy(data).into_owned();
        {
            let mut state = self.pump.state.lock().unwrap();
            state.writes.push(text.clone());
            state
                .events
                .push((std::thread::current().id(), Op::Write(text)));
        }

        self.rx.extend_from_slice(data);
        while let Some(command) = decode_command(&mut self.rx).unwrap() {
            if self.pump.state.lock().unwrap().silent {
                continue;
            }
            let mut out = BytesMut::new();
            self.pump.respond(&command, &mut out);
            self.tx.extend(out.iter().copied());
        }
        Ok(())
    }

    fn clear_input(&mut self) -> reglo_transport::Result<()> {
        self.tx.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Writes made by one thread while the transport is held must not be
/// separated by another thread's traffic.
pub fn assert_not_interleaved(events: &[(ThreadId, Op)]) {
    let mut owner = None;
    for (thread, op) in events {
        match op {
            Op::Write(_) => owner = Some(*thread),
            Op::Read => assert_eq!(
                owner,
                Some(*thread),
                "read by {thread:?} while {owner:?} awaited a reply"
            ),
        }
    }
}

pub fn mnemonics(writes: &[String]) -> Vec<String> {
    writes.iter().map(|w| w.trim_end().to_string()).collect()
}
