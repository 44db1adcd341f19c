//! # Connection Resilience Module
//!
//! Owns the single polling connection and keeps it alive.
//!
//! # State Machine
//!
//! - **Disconnected**: no connection, nothing in flight
//! - **Connecting**: `start()` is establishing a connection
//! - **Connected**: polling; the health check timer is armed
//! - **Reconnecting**: tearing down and waiting out the backoff
//!
//! Failure signals from the active connection, health check ticks and shutdown are
//! multiplexed on one loop ([`ResilienceController::run`]), so reconnect cycles
//! never overlap. Each connection is tagged with a generation number and signals
//! from an older generation are ignored.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ResilienceConfig;
use crate::errors::TransportError;
use crate::retry::{with_deadline, Deadline};

/// What a connection (or the process-wide fallback) reports to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// The update listener failed to fetch updates
    PollingError(TransportError),
    /// The update listener ended on its own
    ListenerStopped,
    /// An otherwise unhandled failure escalated by the fallback handler
    Unhandled(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSignal {
    /// Generation of the reporting connection; `None` for process-wide signals
    pub generation: Option<u64>,
    pub kind: SignalKind,
}

impl ConnectionSignal {
    pub fn from_connection(generation: u64, kind: SignalKind) -> Self {
        Self {
            generation: Some(generation),
            kind,
        }
    }

    pub fn process_wide(kind: SignalKind) -> Self {
        Self {
            generation: None,
            kind,
        }
    }
}

pub type SignalSender = mpsc::UnboundedSender<ConnectionSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<ConnectionSignal>;

pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// A live polling connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Lightweight liveness check against the messaging API
    async fn probe(&self) -> Result<(), TransportError>;

    /// Stop polling and detach the event handlers
    async fn stop(&mut self);
}

/// Factory of polling connections
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Establish a connection that reports failures on `signals`
    async fn connect(
        &self,
        generation: u64,
        signals: SignalSender,
    ) -> Result<Self::Connection, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reconnect delay for the given attempt: exponential growth with a ceiling
pub fn backoff(config: &ResilienceConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_ms = config.initial_reconnect_delay_ms as f64
        * config.backoff_growth_factor.powi(exponent);
    let capped_ms = delay_ms.min(config.max_reconnect_delay_ms as f64);
    Duration::from_millis(capped_ms.round() as u64)
}

enum LoopEvent {
    Shutdown,
    Signal(Option<ConnectionSignal>),
    HealthTick,
}

/// Lifecycle owner of the polling connection
pub struct ResilienceController<C: Connector> {
    connector: C,
    config: ResilienceConfig,
    state: ConnectionState,
    connection: Option<C::Connection>,
    generation: u64,
    reconnect_attempts: u32,
    is_reconnecting: bool,
    last_failure: Option<Instant>,
    last_health_success: Instant,
    health_timer: Option<Interval>,
    signals_tx: SignalSender,
    signals_rx: SignalReceiver,
    shutdown: CancellationToken,
}

impl<C: Connector> ResilienceController<C> {
    pub fn new(
        connector: C,
        config: ResilienceConfig,
        signals_tx: SignalSender,
        signals_rx: SignalReceiver,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connector,
            config,
            state: ConnectionState::Disconnected,
            connection: None,
            generation: 0,
            reconnect_attempts: 0,
            is_reconnecting: false,
            last_failure: None,
            last_health_success: Instant::now(),
            health_timer: None,
            signals_tx,
            signals_rx,
            shutdown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Generation of the current (or last) connection
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_health_check_armed(&self) -> bool {
        self.health_timer.is_some()
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff(&self.config, attempt)
    }

    /// Establish a new connection and arm the health check
    pub async fn start(&mut self) -> Result<(), TransportError> {
        self.state = ConnectionState::Connecting;
        self.generation += 1;
        info!(generation = self.generation, "Creating new bot connection");

        match self
            .connector
            .connect(self.generation, self.signals_tx.clone())
            .await
        {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state = ConnectionState::Connected;
                self.reconnect_attempts = 0;
                self.last_health_success = Instant::now();

                let period = self.config.health_check_interval;
                let mut timer = tokio::time::interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.health_timer = Some(timer);

                info!(generation = self.generation, "Bot polling started successfully");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                error!(generation = self.generation, error = %e, "Failed to create bot connection");
                Err(e)
            }
        }
    }

    /// Periodic liveness check; forces a reconnect on staleness or probe timeout
    pub async fn health_check(&mut self) {
        if self.state != ConnectionState::Connected || self.is_reconnecting {
            return;
        }

        let since_success = self.last_health_success.elapsed();
        if since_success > self.config.health_check_staleness {
            warn!(
                since_success_ms = since_success.as_millis() as u64,
                "Health check threshold exceeded, forcing reconnect"
            );
            self.reconnect().await;
            return;
        }

        let Some(connection) = self.connection.as_ref() else {
            return;
        };

        let outcome = with_deadline(self.config.probe_timeout, connection.probe()).await;
        match outcome {
            Deadline::Completed(Ok(())) => {
                self.last_health_success = Instant::now();
                debug!("Health check passed");
            }
            Deadline::Completed(Err(e)) if e.is_timeout() => {
                warn!(error = %e, "Health check timed out, forcing reconnect");
                self.reconnect().await;
            }
            Deadline::Completed(Err(e)) => {
                warn!(error = %e, "Health check failed");
            }
            Deadline::TimedOut => {
                warn!("Health check probe exceeded its deadline, forcing reconnect");
                self.reconnect().await;
            }
        }
    }

    /// Tear down the connection and establish a new one after a backoff
    ///
    /// Returns `false` when the call was absorbed by the in-progress guard or the
    /// failure debounce window.
    pub async fn reconnect(&mut self) -> bool {
        if self.is_reconnecting {
            debug!("Reconnect already in progress");
            return false;
        }
        if let Some(last) = self.last_failure {
            if last.elapsed() < self.config.failure_debounce {
                debug!("Reconnect suppressed by failure debounce");
                return false;
            }
        }

        self.is_reconnecting = true;
        self.last_failure = Some(Instant::now());
        self.state = ConnectionState::Reconnecting;
        info!("Starting reconnection process");

        self.teardown().await;

        loop {
            let delay = self.backoff(self.reconnect_attempts);
            info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.reconnect_attempts + 1,
                max_attempts = self.config.max_reconnect_attempts,
                "Waiting before reconnect"
            );
            if !self.pause(delay).await {
                break;
            }

            if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                warn!("Max reconnection attempts reached, resetting");
                self.reconnect_attempts = 0;
                if !self.pause(Duration::from_millis(self.config.max_reconnect_delay_ms)).await {
                    break;
                }
            } else {
                self.reconnect_attempts += 1;
            }

            if self.start().await.is_ok() {
                break;
            }
            self.state = ConnectionState::Reconnecting;
        }

        if self.shutdown.is_cancelled() {
            self.state = ConnectionState::Disconnected;
        }
        self.is_reconnecting = false;
        true
    }

    /// React to a signal from a connection or from the fallback handler
    pub async fn handle_signal(&mut self, signal: ConnectionSignal) {
        if let Some(generation) = signal.generation {
            if generation != self.generation {
                debug!(generation, current = self.generation, "Ignoring signal from a retired connection");
                return;
            }
        }

        match signal.kind {
            // API errors from the poller (a 409 conflict, a revoked token) also mean
            // the listener is unusable, unlike the same class from the health probe
            SignalKind::PollingError(e) => {
                if e.is_network() {
                    warn!(error = %e, "Polling network error");
                } else {
                    warn!(error = %e, "Polling API error");
                }
                self.reconnect().await;
            }
            SignalKind::ListenerStopped => {
                if self.state == ConnectionState::Connected {
                    warn!("Bot polling stopped unexpectedly");
                    self.reconnect().await;
                }
            }
            SignalKind::Unhandled(message) => {
                error!(error = %message, "Unhandled failure, reconnecting");
                self.reconnect().await;
            }
        }
    }

    /// Drive the connection until shutdown is requested
    pub async fn run(&mut self) {
        if self.start().await.is_err() {
            self.reconnect().await;
        }

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => LoopEvent::Shutdown,
                signal = self.signals_rx.recv() => LoopEvent::Signal(signal),
                _ = next_tick(self.health_timer.as_mut()) => LoopEvent::HealthTick,
            };

            match event {
                LoopEvent::Shutdown => break,
                LoopEvent::Signal(Some(signal)) => self.handle_signal(signal).await,
                LoopEvent::Signal(None) => break,
                LoopEvent::HealthTick => self.health_check().await,
            }
        }

        self.shutdown().await;
    }

    /// Cancel the health check and stop the connection without reconnecting
    pub async fn shutdown(&mut self) {
        info!("Shutting down bot connection");
        self.shutdown.cancel();
        self.teardown().await;
        self.state = ConnectionState::Disconnected;
    }

    async fn teardown(&mut self) {
        self.health_timer = None;

        if let Some(mut connection) = self.connection.take() {
            info!(generation = self.generation, "Stopping polling");
            if with_deadline(self.config.stop_timeout, connection.stop())
                .await
                .is_timed_out()
            {
                warn!("Stopping the connection timed out, discarding it");
            }
        }
    }

    /// Sleep unless shutdown is requested first; returns false on shutdown
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }
}

async fn next_tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
