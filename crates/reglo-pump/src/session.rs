//! A live connection to one pump.
//!
//! The session owns the transport and the per-channel calibration table for
//! its whole lifetime. Identity is read once at establishment; run state is
//! always queried fresh.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use reglo_frame::{CommandFrame, Response, Status, MAX_ADDRESS};
use reglo_transport::Transport;
use tracing::{debug, info, warn};

use crate::calibration::{
    check_flow_range, validate_flow_rate, validate_volume, CalibrationTable, ChannelCalibration,
    TubingId,
};
use crate::clock::{Clock, SystemClock};
use crate::commands;
use crate::config::SessionConfig;
use crate::direction::PumpDirection;
use crate::engine::{Exchange, TransactionEngine};
use crate::error::{PumpError, RemoteError, Result};
use crate::identity::DeviceIdentity;

/// Session with one Reglo ICC pump.
pub struct PumpSession<T> {
    engine: TransactionEngine<T>,
    clock: Arc<dyn Clock>,
    identity: DeviceIdentity,
    config: SessionConfig,
    state: Mutex<ChannelState>,
}

#[derive(Debug, Default)]
struct ChannelState {
    calibration: CalibrationTable,
    dispense_dirs: BTreeMap<u8, PumpDirection>,
    odometers: BTreeMap<u8, OdometerTrack>,
}

#[derive(Debug, Clone, Copy)]
struct OdometerTrack {
    value: u64,
    changed_at: Instant,
}

impl<T: Transport> PumpSession<T> {
    /// Establish a session over an open transport using the system clock.
    pub fn establish(transport: T, config: SessionConfig) -> Result<Self> {
        Self::establish_with_clock(transport, config, Arc::new(SystemClock))
    }

    /// Establish a session with an explicit clock.
    ///
    /// Order on the wire: serial number (checked against
    /// `config.serial_no` before anything else is sent), channel count,
    /// enable channel addressing, tubing per channel, pump info. On any
    /// failure the transport is dropped.
    pub fn establish_with_clock(
        transport: T,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let pump = config.pump_address;
        let mut tubing_ids = BTreeMap::new();
        for (&channel, &mm) in &config.tubing_ids {
            let id = TubingId::from_mm(mm).ok_or(PumpError::InvalidTubingId(mm))?;
            tubing_ids.insert(channel, (id, mm));
        }

        let engine = TransactionEngine::new(transport, config.transaction.clone(), clock.clone());
        let (identity, calibration) = {
            let mut exchange = engine.begin();
            debug!(transport = exchange.transport_name(), pump, "establishing session");

            let [serial_no] = query_fields::<1, _>(&mut exchange, &commands::serial_number(pump))?;
            if let Some(expected) = &config.serial_no {
                if expected != &serial_no {
                    warn!(expected = %expected, reported = %serial_no, "serial number mismatch");
                    return Err(PumpError::SerialNoMismatch {
                        expected: expected.clone(),
                        reported: serial_no,
                    });
                }
            }

            let count_command = commands::channel_count(pump);
            let [count_text] = query_fields::<1, _>(&mut exchange, &count_command)?;
            let channel_count: u8 = parse_field(&count_command, &count_text)?;
            if !(1..=MAX_ADDRESS).contains(&channel_count) {
                return Err(invalid(&count_command, &count_text, "channel count out of range"));
            }
            let channels: Vec<u8> = (1..=channel_count).collect();

            for &channel in config.dispense_dirs.keys().chain(tubing_ids.keys()) {
                if !channels.contains(&channel) {
                    return Err(PumpError::InvalidChannel { channel, channels });
                }
            }

            expect_success(
                &mut exchange,
                &commands::enable_channel_addressing(pump),
                command_failed,
            )?;

            let mut calibration = CalibrationTable::default();
            for &channel in &channels {
                let inner_diameter = match tubing_ids.get(&channel) {
                    Some(&(id, mm)) => apply_tubing(&mut exchange, pump, channel, id, mm)?,
                    None => read_tubing(&mut exchange, pump, channel)?,
                };
                calibration.insert(ChannelCalibration::new(
                    channel,
                    inner_diameter,
                    &config.limits,
                ));
            }

            let [model_no, sw_ver, head_code] =
                query_fields::<3, _>(&mut exchange, &commands::pump_info(pump))?;

            (
                DeviceIdentity {
                    model_no,
                    serial_no,
                    sw_ver,
                    head_code,
                    channel_count,
                },
                calibration,
            )
        };

        let dispense_dirs = identity
            .channel_nos()
            .into_iter()
            .map(|ch| {
                let dir = config.dispense_dirs.get(&ch).copied().unwrap_or_default();
                (ch, dir)
            })
            .collect();

        info!(
            serial_no = %identity.serial_no,
            model = %identity.model_no,
            sw_ver = %identity.sw_ver,
            channels = identity.channel_count,
            "pump session established"
        );

        Ok(Self {
            engine,
            clock,
            identity,
            config,
            state: Mutex::new(ChannelState {
                calibration,
                dispense_dirs,
                odometers: BTreeMap::new(),
            }),
        })
    }

    pub fn pump_address(&self) -> u8 {
        self.config.pump_address
    }

    pub fn channel_nos(&self) -> Vec<u8> {
        self.identity.channel_nos()
    }

    pub fn model_no(&self) -> &str {
        &self.identity.model_no
    }

    pub fn serial_no(&self) -> &str {
        &self.identity.serial_no
    }

    pub fn sw_ver(&self) -> &str {
        &self.identity.sw_ver
    }

    pub fn head_code(&self) -> &str {
        &self.identity.head_code
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Tubing inner diameter (mm) per channel, as last reported by the pump.
    pub fn tubing_ids(&self) -> BTreeMap<u8, f64> {
        self.state().calibration.inner_diameters()
    }

    pub fn calibration(&self, channel: u8) -> Option<ChannelCalibration> {
        self.state().calibration.get(channel).copied()
    }

    /// Direction that dispenses on `channel`.
    pub fn dispense_dir(&self, channel: u8) -> Result<PumpDirection> {
        self.check_channel(channel)?;
        Ok(self
            .state()
            .dispense_dirs
            .get(&channel)
            .copied()
            .unwrap_or_default())
    }

    pub fn set_dispense_dir(&self, channel: u8, direction: PumpDirection) -> Result<()> {
        self.check_channel(channel)?;
        self.state().dispense_dirs.insert(channel, direction);
        Ok(())
    }

    /// Set the tubing inner diameter of a channel.
    ///
    /// Unsupported diameters are rejected before anything is sent. Returns
    /// the diameter the pump reports back, which also becomes the channel's
    /// calibration.
    pub fn set_tubing_id(&self, channel: u8, inner_diameter_mm: f64) -> Result<f64> {
        self.check_channel(channel)?;
        let id = TubingId::from_mm(inner_diameter_mm)
            .ok_or(PumpError::InvalidTubingId(inner_diameter_mm))?;

        let reported = {
            let mut exchange = self.engine.begin();
            apply_tubing(
                &mut exchange,
                self.pump_address(),
                channel,
                id,
                inner_diameter_mm,
            )?
        };

        self.state().calibration.insert(ChannelCalibration::new(
            channel,
            reported,
            &self.config.limits,
        ));
        info!(channel, inner_diameter_mm = reported, "tubing inner diameter set");
        Ok(reported)
    }

    /// Pump `volume_ml` at `rate_ml_per_min` in `direction`.
    ///
    /// Returns once the pump has accepted the command, not when pumping is
    /// done. Use [`wait_for_stop`](Self::wait_for_stop) for completion.
    pub fn pump_vol(
        &self,
        channel: u8,
        direction: PumpDirection,
        volume_ml: f64,
        rate_ml_per_min: f64,
    ) -> Result<()> {
        self.check_channel(channel)?;
        validate_volume(channel, volume_ml)?;
        validate_flow_rate(channel, rate_ml_per_min)?;
        if self.config.check_flow_range {
            if let Some(calibration) = self.calibration(channel) {
                check_flow_range(&calibration, rate_ml_per_min, &self.config.limits)?;
            }
        }

        let pump = self.pump_address();
        {
            let mut exchange = self.engine.begin();
            expect_success(&mut exchange, &commands::stop(pump, channel), command_failed)?;
            expect_success(
                &mut exchange,
                &commands::direction(pump, channel, direction),
                command_failed,
            )?;
            expect_success(
                &mut exchange,
                &commands::volume_time_mode(pump, channel),
                command_failed,
            )?;
            expect_success(
                &mut exchange,
                &commands::speed_from_flow_rate(pump, channel),
                command_failed,
            )?;
            expect_line(
                &mut exchange,
                &commands::set_volume(pump, channel, volume_ml),
                || RemoteError::InvalidVolume {
                    channel,
                    volume: volume_ml,
                },
            )?;
            expect_line(
                &mut exchange,
                &commands::set_flow_rate(pump, channel, rate_ml_per_min),
                || RemoteError::InvalidFlowRate {
                    channel,
                    rate: rate_ml_per_min,
                },
            )?;
            expect_success(&mut exchange, &commands::start(pump, channel), command_failed)?;
        }

        self.state().odometers.remove(&channel);
        info!(
            channel,
            %direction,
            volume_ml,
            rate_ml_per_min,
            speed_rpm = ?self.calibration(channel).map(|c| c.speed_for(rate_ml_per_min)),
            "pumping started"
        );
        Ok(())
    }

    /// Pump in the channel's dispense direction.
    pub fn dispense_vol(&self, channel: u8, volume_ml: f64, rate_ml_per_min: f64) -> Result<()> {
        let direction = self.dispense_dir(channel)?;
        self.pump_vol(channel, direction, volume_ml, rate_ml_per_min)
    }

    /// Pump opposite to the channel's dispense direction.
    pub fn aspirate_vol(&self, channel: u8, volume_ml: f64, rate_ml_per_min: f64) -> Result<()> {
        let direction = self.dispense_dir(channel)?.opposite();
        self.pump_vol(channel, direction, volume_ml, rate_ml_per_min)
    }

    pub fn stop(&self, channel: u8) -> Result<()> {
        self.check_channel(channel)?;
        let mut exchange = self.engine.begin();
        expect_success(
            &mut exchange,
            &commands::stop(self.pump_address(), channel),
            command_failed,
        )?;
        debug!(channel, "channel stopped");
        Ok(())
    }

    pub fn stop_all(&self) -> Result<()> {
        for channel in self.channel_nos() {
            self.stop(channel)?;
        }
        Ok(())
    }

    /// Ask the pump whether `channel` is running.
    ///
    /// While running, the channel odometer is checked as well. If it has not
    /// moved within the configured stall window the channel is stopped and
    /// [`RemoteError::StallDetectionDetected`] is returned.
    pub fn is_running(&self, channel: u8) -> Result<bool> {
        self.check_channel(channel)?;
        let pump = self.pump_address();
        let mut exchange = self.engine.begin();

        let command = commands::run_state(pump, channel);
        let response = exchange.execute(&command)?;
        let running = match response.status {
            Status::Yes => true,
            Status::No => false,
            Status::Failure => return Err(command_failed(&command).into()),
            _ => return Err(unexpected_status(&command, &response)),
        };

        let Some(window) = self.config.stall_window else {
            return Ok(running);
        };
        if !running {
            return Ok(false);
        }

        let odometer_command = commands::odometer(pump, channel);
        let [text] = query_fields::<1, _>(&mut exchange, &odometer_command)?;
        let odometer: u64 = parse_field(&odometer_command, &text)?;

        if self.odometer_stalled(channel, odometer, window) {
            warn!(channel, odometer, ?window, "odometer not advancing, stopping channel");
            expect_success(&mut exchange, &commands::stop(pump, channel), command_failed)?;
            drop(exchange);
            self.state().odometers.remove(&channel);
            return Err(RemoteError::StallDetectionDetected { channel }.into());
        }
        Ok(true)
    }

    /// Block until `channel` stops, polling every `poll_interval`.
    ///
    /// Fails with [`PumpError::CommandTimeout`] if the channel is still
    /// running after `overall_timeout`.
    pub fn wait_for_stop(
        &self,
        channel: u8,
        poll_interval: Duration,
        overall_timeout: Duration,
    ) -> Result<()> {
        self.wait_until_stopped(&[channel], poll_interval, overall_timeout, None)
            .map(|_| ())
    }

    /// Block until every channel stops.
    pub fn wait_for_stop_all(&self, poll_interval: Duration, overall_timeout: Duration) -> Result<()> {
        self.wait_until_stopped(&self.channel_nos(), poll_interval, overall_timeout, None)
            .map(|_| ())
    }

    /// Like [`wait_for_stop`](Self::wait_for_stop), but gives up early when
    /// `cancel` is set. Returns `false` if cancelled. The pump keeps
    /// running; stopping it is up to the caller.
    pub fn wait_for_stop_cancellable(
        &self,
        channels: &[u8],
        poll_interval: Duration,
        overall_timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<bool> {
        self.wait_until_stopped(channels, poll_interval, overall_timeout, Some(cancel))
    }

    /// Show a message on the pump display.
    pub fn show_msg(&self, text: &str) -> Result<()> {
        let mut exchange = self.engine.begin();
        expect_success(
            &mut exchange,
            &commands::display_text(self.pump_address(), text),
            command_failed,
        )
    }

    /// End the session and release the transport.
    pub fn close(self) {
        info!(serial_no = %self.identity.serial_no, "pump session closed");
    }

    fn wait_until_stopped(
        &self,
        channels: &[u8],
        poll_interval: Duration,
        overall_timeout: Duration,
        cancel: Option<&AtomicBool>,
    ) -> Result<bool> {
        for &channel in channels {
            self.check_channel(channel)?;
        }

        // A timeout too large to represent as an instant never expires.
        let deadline = self.clock.now().checked_add(overall_timeout);
        let mut running = channels.to_vec();
        let mut polls = 0u32;

        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                debug!(?running, "wait for stop cancelled");
                return Ok(false);
            }

            polls += 1;
            let mut still_running = Vec::with_capacity(running.len());
            for &channel in &running {
                if self.is_running(channel)? {
                    still_running.push(channel);
                }
            }
            running = still_running;

            if running.is_empty() {
                debug!(polls, "channels stopped");
                return Ok(true);
            }

            let now = self.clock.now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(PumpError::CommandTimeout {
                        command: format!("wait_for_stop (channels {running:?})"),
                        attempts: polls,
                        timeout: overall_timeout,
                    });
                }
                Some(deadline) => poll_interval.min(deadline - now),
                None => poll_interval,
            };
            self.clock.sleep(pause);
        }
    }

    fn odometer_stalled(&self, channel: u8, value: u64, window: Duration) -> bool {
        let now = self.clock.now();
        let mut state = self.state();
        match state.odometers.get_mut(&channel) {
            Some(track) if track.value == value => now.duration_since(track.changed_at) >= window,
            Some(track) => {
                track.value = value;
                track.changed_at = now;
                false
            }
            None => {
                state.odometers.insert(
                    channel,
                    OdometerTrack {
                        value,
                        changed_at: now,
                    },
                );
                false
            }
        }
    }

    fn check_channel(&self, channel: u8) -> Result<()> {
        if (1..=self.identity.channel_count).contains(&channel) {
            Ok(())
        } else {
            Err(PumpError::InvalidChannel {
                channel,
                channels: self.channel_nos(),
            })
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for PumpSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpSession")
            .field("pump_address", &self.config.pump_address)
            .field("identity", &self.identity)
            .finish()
    }
}

fn command_failed(command: &CommandFrame) -> RemoteError {
    RemoteError::CommandFailed {
        command: command.mnemonic().as_str().to_string(),
        target: command.address().to_string(),
    }
}

fn invalid(command: &CommandFrame, raw: &str, reason: &str) -> PumpError {
    PumpError::InvalidResponse {
        command: command.to_string(),
        raw: Bytes::copy_from_slice(raw.as_bytes()),
        reason: reason.to_string(),
    }
}

fn unexpected_status(command: &CommandFrame, response: &Response) -> PumpError {
    let raw = response
        .status
        .as_byte()
        .map(|b| Bytes::copy_from_slice(&[b]))
        .unwrap_or_else(|| Bytes::copy_from_slice(response.text.as_bytes()));
    PumpError::InvalidResponse {
        command: command.to_string(),
        raw,
        reason: format!("unexpected status {:?}", response.status),
    }
}

fn parse_field<F: FromStr>(command: &CommandFrame, text: &str) -> Result<F> {
    text.parse()
        .map_err(|_| invalid(command, text, "unparseable field"))
}

/// Run a status command that must answer `*`.
fn expect_success<T: Transport>(
    exchange: &mut Exchange<'_, T>,
    command: &CommandFrame,
    on_failure: impl FnOnce(&CommandFrame) -> RemoteError,
) -> Result<()> {
    let response = exchange.execute(command)?;
    match response.status {
        Status::Success => Ok(()),
        Status::Failure => Err(on_failure(command).into()),
        _ => Err(unexpected_status(command, &response)),
    }
}

/// Run a command that answers with a data line, mapping `#` via `on_failure`.
fn expect_line<T: Transport>(
    exchange: &mut Exchange<'_, T>,
    command: &CommandFrame,
    on_failure: impl FnOnce() -> RemoteError,
) -> Result<Response> {
    let response = exchange.execute(command)?;
    match response.status {
        Status::Data => Ok(response),
        Status::Failure => Err(on_failure().into()),
        _ => Err(unexpected_status(command, &response)),
    }
}

/// Run a query and split its reply into exactly `N` fields.
fn query_fields<const N: usize, T: Transport>(
    exchange: &mut Exchange<'_, T>,
    command: &CommandFrame,
) -> Result<[String; N]> {
    let response = expect_line(exchange, command, || command_failed(command))?;
    response
        .fields(N)
        .and_then(|fields| {
            let owned: Vec<String> = fields.into_iter().map(str::to_string).collect();
            owned.try_into().ok()
        })
        .ok_or_else(|| invalid(command, &response.text, "unexpected field count"))
}

fn read_tubing<T: Transport>(exchange: &mut Exchange<'_, T>, pump: u8, channel: u8) -> Result<f64> {
    let command = commands::tubing_diameter(pump, channel);
    let [diameter, _unit] = query_fields::<2, _>(exchange, &command)?;
    parse_field(&command, &diameter)
}

fn apply_tubing<T: Transport>(
    exchange: &mut Exchange<'_, T>,
    pump: u8,
    channel: u8,
    id: TubingId,
    requested_mm: f64,
) -> Result<f64> {
    expect_success(
        exchange,
        &commands::set_tubing_diameter(pump, channel, id),
        |_| RemoteError::InvalidTubingId {
            channel,
            inner_diameter: requested_mm,
        },
    )?;
    read_tubing(exchange, pump, channel)
}
