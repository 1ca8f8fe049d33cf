//! Request/response transactions with timeout and retry.
//!
//! One transaction is in flight per engine. The transport sits behind a
//! mutex that is held from the write until the reply is decoded, so
//! concurrent callers are serialized in lock order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use reglo_frame::{CommandFrame, FrameError, Response, ResponseBuffer, ResponseShape};
use reglo_transport::Transport;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::TransactionConfig;
use crate::error::{PumpError, Result};

/// Owns the transport and runs transactions against it.
pub struct TransactionEngine<T> {
    transport: Mutex<T>,
    config: TransactionConfig,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> TransactionEngine<T> {
    pub fn new(transport: T, config: TransactionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport: Mutex::new(transport),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Lock the transport for a sequence of transactions.
    ///
    /// No other caller can transmit until the returned guard is dropped.
    pub fn begin(&self) -> Exchange<'_, T> {
        Exchange {
            transport: self
                .transport
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            config: &self.config,
            clock: self.clock.as_ref(),
        }
    }

    /// Run a single transaction.
    pub fn execute(&self, command: &CommandFrame) -> Result<Response> {
        self.begin().execute(command)
    }

    /// Release the engine and hand back the transport.
    pub fn into_transport(self) -> T {
        self.transport
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to the transport for one or more transactions.
pub struct Exchange<'a, T> {
    transport: MutexGuard<'a, T>,
    config: &'a TransactionConfig,
    clock: &'a dyn Clock,
}

enum Attempt {
    Reply(Response),
    TimedOut { partial: Bytes },
    Malformed { raw: Bytes, reason: &'static str },
}

impl<T: Transport> Exchange<'_, T> {
    /// Send `command` and wait for a structurally valid reply.
    ///
    /// Timeouts and malformed replies are retried up to `max_retries` times,
    /// each attempt writing the same bytes. A reply that decodes but reports
    /// failure (`#`) is returned as is; classifying it is up to the caller.
    pub fn execute(&mut self, command: &CommandFrame) -> Result<Response> {
        let wire = command.encode()?;
        let attempts = self.config.max_retries + 1;
        let label = command.to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.transport.clear_input()?;
            debug!(command = %label, attempt, wire = ?wire, "sending command");
            self.transport.write_all(&wire)?;

            let failure = match self.await_reply(command.response_shape())? {
                Attempt::Reply(response) => {
                    debug!(command = %label, attempt, status = ?response.status, text = %response.text, "received reply");
                    return Ok(response);
                }
                Attempt::TimedOut { partial } => {
                    warn!(command = %label, attempt, attempts, partial = ?partial, "no reply before timeout");
                    PumpError::CommandTimeout {
                        command: label.clone(),
                        attempts: attempt,
                        timeout: self.config.timeout,
                    }
                }
                Attempt::Malformed { raw, reason } => {
                    warn!(command = %label, attempt, attempts, raw = ?raw, reason, "malformed reply");
                    PumpError::InvalidResponse {
                        command: label.clone(),
                        raw,
                        reason: reason.to_string(),
                    }
                }
            };

            if attempt >= attempts {
                return Err(failure);
            }
        }
    }

    /// Name of the locked transport.
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    fn await_reply(&mut self, shape: ResponseShape) -> Result<Attempt> {
        let mut buffer = ResponseBuffer::new();
        let deadline = self.clock.now() + self.config.timeout;

        loop {
            match buffer.try_decode(shape) {
                Ok(Some(response)) => return Ok(Attempt::Reply(response)),
                Ok(None) => {}
                Err(FrameError::InvalidResponse { raw, reason }) => {
                    return Ok(Attempt::Malformed { raw, reason })
                }
                Err(other) => return Err(other.into()),
            }

            let now = self.clock.now();
            if now >= deadline {
                return Ok(Attempt::TimedOut {
                    partial: Bytes::copy_from_slice(buffer.pending()),
                });
            }
            let chunk = self.transport.read(deadline - now)?;
            buffer.extend(&chunk);
        }
    }
}
