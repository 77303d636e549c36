use log::{debug, info, warn};
use std::time::Instant;

use super::state::{SchedulerState, SchedulerTimings};
use super::write_queue::{WriteQueue, WriteRequest};
use crate::devices::traits::ValueSink;
use crate::modbus::transport::Transport;
use crate::registers::{BlockId, Catalog, CatalogCursor, Decoder};
use crate::utils::error::ModbusError;

/// What a step tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    Waiting,
    RateLimited,
    TimedOut { dropped_writes: usize },
    SentRead { block: BlockId },
    SentWrite { request: WriteRequest },
}

/// What happened to a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Decoded { block: BlockId, readings: usize },
    DecodeFailed { block: BlockId },
    WriteAcknowledged,
    Unsolicited,
}

/// Half-duplex request scheduler for one slave on one serial line.
///
/// Reads walk the catalog once per cycle; queued writes preempt reads at the
/// next free slot. Only one request is ever outstanding, frames are spaced
/// by `min_send_interval`, and a request unanswered for `response_timeout`
/// drops the write queue and restarts polling from the first block.
pub struct Scheduler {
    slave: u8,
    catalog: Catalog,
    decoder: Decoder,
    queue: WriteQueue,
    state: SchedulerState,
    last_sent: Option<Instant>,
    timings: SchedulerTimings,
}

impl Scheduler {
    pub fn new(slave: u8, catalog: Catalog) -> Self {
        Self::with_timings(slave, catalog, SchedulerTimings::default())
    }

    pub fn with_timings(slave: u8, catalog: Catalog, timings: SchedulerTimings) -> Self {
        Self {
            slave,
            catalog,
            decoder: Decoder::new(),
            queue: WriteQueue::new(),
            state: SchedulerState::Idle,
            last_sent: None,
            timings,
        }
    }

    pub fn slave(&self) -> u8 {
        self.slave
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    pub fn timings(&self) -> SchedulerTimings {
        self.timings
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    pub fn is_awaiting(&self) -> bool {
        self.state.is_awaiting()
    }

    /// Idle with nothing left to write.
    pub fn is_settled(&self) -> bool {
        self.state.is_idle() && self.queue.is_empty()
    }

    /// Starts a new poll cycle. No-op unless idle.
    pub fn cycle_tick(&mut self) -> bool {
        if !self.state.is_idle() {
            return false;
        }
        if self.catalog.is_empty() {
            debug!("No register blocks enabled, staying idle");
            return false;
        }
        debug!("No more idle");
        self.state = SchedulerState::Polling { position: 0 };
        true
    }

    pub fn step<T: Transport + ?Sized>(
        &mut self,
        now: Instant,
        transport: &mut T,
    ) -> Result<StepOutcome, ModbusError> {
        if let Some(sent_at) = self.state.sent_at() {
            if now.saturating_duration_since(sent_at) > self.timings.response_timeout {
                let dropped_writes = self.queue.clear();
                warn!(
                    "⏰ Timed out waiting for response ({}), dropped {} queued writes",
                    self.state, dropped_writes
                );
                self.state = SchedulerState::Polling { position: 0 };
                return Ok(StepOutcome::TimedOut { dropped_writes });
            }
            return Ok(StepOutcome::Waiting);
        }

        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.timings.min_send_interval {
                return Ok(StepOutcome::RateLimited);
            }
        }

        let resume = match self.state {
            SchedulerState::Idle if self.queue.is_empty() => return Ok(StepOutcome::Idle),
            SchedulerState::Idle => 0,
            SchedulerState::Polling { position } => position,
            SchedulerState::Writing { resume } => resume,
            SchedulerState::AwaitingRead { .. } | SchedulerState::AwaitingWrite { .. } => {
                return Ok(StepOutcome::Waiting)
            }
        };

        if let Some(request) = self.queue.pop_front() {
            return self.send_write(request, resume, now, transport);
        }
        if matches!(self.state, SchedulerState::Writing { .. }) {
            debug!("Resuming read sequence at #{}", resume);
        }
        self.send_read(resume, now, transport)
    }

    /// Hands a response payload to whatever request is outstanding.
    pub fn on_response<S: ValueSink + ?Sized>(&mut self, payload: &[u8], sink: &mut S) -> ResponseOutcome {
        match self.state {
            SchedulerState::AwaitingRead { position, .. } => {
                let Some(block) = self.catalog.get(position).copied() else {
                    self.state = SchedulerState::Idle;
                    return ResponseOutcome::Unsolicited;
                };

                let outcome = match self.decoder.decode(&block, payload, sink) {
                    Ok(readings) => ResponseOutcome::Decoded { block: block.id, readings },
                    Err(e) => {
                        debug!("Skipping {}: {}", block.id, e);
                        ResponseOutcome::DecodeFailed { block: block.id }
                    }
                };

                self.state = match self.catalog.advance(position) {
                    CatalogCursor::Next(next) => SchedulerState::Polling { position: next },
                    CatalogCursor::Exhausted => {
                        debug!("Going to idle mode");
                        SchedulerState::Idle
                    }
                };
                outcome
            }
            SchedulerState::AwaitingWrite { resume, .. } => {
                debug!("Write response: {}", hex::encode(payload));
                self.state = SchedulerState::Writing { resume };
                ResponseOutcome::WriteAcknowledged
            }
            _ => {
                debug!("Discarding unsolicited response ({}): {}", self.state, hex::encode(payload));
                ResponseOutcome::Unsolicited
            }
        }
    }

    /// Queues a write. When idle, leaves idle and runs one step right away so
    /// user commands do not wait for the next tick.
    pub fn enqueue<T: Transport + ?Sized>(
        &mut self,
        request: WriteRequest,
        now: Instant,
        transport: &mut T,
    ) -> Result<Option<StepOutcome>, ModbusError> {
        self.queue.enqueue(request);
        debug!(
            "Write to {} pending ({}), queue size is now {}",
            request.register,
            request.value,
            self.queue.len()
        );

        if self.state.is_idle() {
            self.state = SchedulerState::Writing { resume: 0 };
            return self.step(now, transport).map(Some);
        }
        Ok(None)
    }

    fn send_read<T: Transport + ?Sized>(
        &mut self,
        position: usize,
        now: Instant,
        transport: &mut T,
    ) -> Result<StepOutcome, ModbusError> {
        let Some(block) = self.catalog.get(position).copied() else {
            self.state = SchedulerState::Idle;
            return Ok(StepOutcome::Idle);
        };

        let frame = block.read_request(self.slave).encode();
        self.last_sent = Some(now);
        match transmit(transport, &frame) {
            Ok(()) => {
                self.state = SchedulerState::AwaitingRead { position, sent_at: now };
                Ok(StepOutcome::SentRead { block: block.id })
            }
            Err(e) => {
                self.state = SchedulerState::Polling { position };
                Err(e)
            }
        }
    }

    fn send_write<T: Transport + ?Sized>(
        &mut self,
        request: WriteRequest,
        resume: usize,
        now: Instant,
        transport: &mut T,
    ) -> Result<StepOutcome, ModbusError> {
        info!("✍️  Writing {} to register {}", request.value, request.register);

        let frame = request.encode(self.slave);
        self.last_sent = Some(now);
        match transmit(transport, &frame) {
            Ok(()) => {
                self.state = if request.ignore_response {
                    SchedulerState::Writing { resume }
                } else {
                    SchedulerState::AwaitingWrite { sent_at: now, resume }
                };
                Ok(StepOutcome::SentWrite { request })
            }
            Err(e) => {
                warn!("Write to register {} lost: {}", request.register, e);
                self.state = SchedulerState::Writing { resume };
                Err(e)
            }
        }
    }
}

fn transmit<T: Transport + ?Sized>(transport: &mut T, frame: &[u8]) -> Result<(), ModbusError> {
    transport.send_frame(frame)?;
    transport.flush()
}
