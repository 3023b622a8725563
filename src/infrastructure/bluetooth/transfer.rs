//! Chunked Transfer Module
//!
//! Delivers a payload to the printer's write characteristic one chunk at a
//! time. A chunk is only issued after the previous write has completed, and
//! the optional pacing delay starts only once that completion is known, so
//! writes can never overlap or reorder.

use crate::domain::encoder;
use crate::domain::error::TransferError;
use crate::domain::models::{AppEvent, GattHandle, TransferState};
use crate::domain::profile::PlatformProfile;
use crate::infrastructure::bluetooth::host::BleHost;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub struct TransferEngine<H: BleHost> {
    host: Arc<H>,
    state: Mutex<TransferState>,
    active: AtomicBool,
    cancel: watch::Sender<bool>,
    event_sender: Option<mpsc::UnboundedSender<AppEvent>>,
}

/// Holds the engine's single session slot; releases it on every exit path.
struct SessionGuard<'a> {
    active: &'a AtomicBool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

impl<H: BleHost> TransferEngine<H> {
    pub fn new(host: Arc<H>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            host,
            state: Mutex::new(TransferState::Idle),
            active: AtomicBool::new(false),
            cancel,
            event_sender: None,
        }
    }

    /// Publish `AppEvent::TransferProgress` after every acknowledged chunk.
    pub fn with_events(mut self, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn state(&self) -> TransferState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Abort the running transfer at the next chunk boundary.
    ///
    /// A write already handed to the host still completes; no later chunk is issued.
    pub fn cancel(&self) {
        if self.is_busy() {
            info!("Transfer cancellation requested");
            self.cancel.send_replace(true);
        }
    }

    /// Send `payload` to `handle`, chunked and encoded per `profile`.
    pub async fn send(
        &self,
        payload: &[u8],
        handle: &GattHandle,
        profile: &PlatformProfile,
    ) -> Result<(), TransferError> {
        if payload.is_empty() {
            debug!("Empty payload, nothing to send");
            return Ok(());
        }

        let _session = self.acquire()?;
        self.cancel.send_replace(false);
        self.set_state(TransferState::Idle);

        let total = payload.len();
        let chunk_size = profile.max_chunk_bytes.max(1);
        let pace = Duration::from_millis(profile.pace_millis_per_chunk);
        let mut cancel_rx = self.cancel.subscribe();
        let mut offset = 0;

        info!(
            "Sending {} bytes to {} in chunks of {} ({:?})",
            total, handle.device_id, chunk_size, profile.encoding
        );

        while offset < total {
            if *cancel_rx.borrow() {
                return Err(self.abort_cancelled(offset, total));
            }

            let chunk_end = (offset + chunk_size).min(total);
            let chunk_index = offset / chunk_size;
            let value = encoder::encode(&payload[offset..chunk_end], profile.encoding);

            self.set_state(TransferState::InFlight);
            debug!(
                "Writing chunk {} ({}..{} of {})",
                chunk_index, offset, chunk_end, total
            );

            let result = self
                .host
                .write_characteristic(
                    &handle.device_id,
                    &handle.service_id,
                    &handle.characteristic_id,
                    &value,
                )
                .await;

            if let Err(e) = result {
                error!("Failed to write chunk {}: {}", chunk_index, e);
                self.set_state(TransferState::Failed);
                return Err(TransferError::WriteFailed(chunk_index));
            }

            offset = chunk_end;
            self.publish(AppEvent::TransferProgress {
                sent: offset,
                total,
            });

            if !pace.is_zero() && offset < total {
                tokio::select! {
                    _ = tokio::time::sleep(pace) => {}
                    _ = cancel_rx.wait_for(|cancelled| *cancelled) => {
                        return Err(self.abort_cancelled(offset, total));
                    }
                }
            }
        }

        self.set_state(TransferState::Completed);
        info!("Transfer complete: {} bytes", total);
        Ok(())
    }

    fn acquire(&self) -> Result<SessionGuard<'_>, TransferError> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("Transfer rejected: another transfer is in progress");
                TransferError::SessionBusy
            })?;
        Ok(SessionGuard {
            active: &self.active,
        })
    }

    fn abort_cancelled(&self, offset: usize, total: usize) -> TransferError {
        warn!("Transfer cancelled after {} of {} bytes", offset, total);
        self.set_state(TransferState::Failed);
        TransferError::Cancelled
    }

    fn set_state(&self, state: TransferState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn publish(&self, event: AppEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encoder::WireValue;
    use crate::domain::profile::{self, Encoding};
    use crate::infrastructure::bluetooth::mock::MockBleHost;
    use crate::infrastructure::bluetooth::protocol;
    use tokio::time::Instant;

    const DEVICE: &str = "printer-1";

    async fn connected_host(host: MockBleHost) -> Arc<MockBleHost> {
        let host = Arc::new(host);
        host.connect(DEVICE).await.unwrap();
        host
    }

    fn handle() -> GattHandle {
        GattHandle {
            device_id: DEVICE.to_string(),
            service_id: protocol::PRINTER_SERVICE_UUID.to_string(),
            characteristic_id: protocol::WRITE_CHAR_UUID.to_string(),
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_chunks_concatenate_to_payload() {
        for (len, max) in [(1, 20), (20, 20), (21, 20), (100, 7), (601, 300), (57, 19)] {
            let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY")).await;
            let engine = TransferEngine::new(host.clone());
            let profile = PlatformProfile {
                max_chunk_bytes: max,
                pace_millis_per_chunk: 0,
                encoding: Encoding::Raw,
            };
            let data = payload(len);

            engine.send(&data, &handle(), &profile).await.unwrap();

            let writes = host.writes();
            assert_eq!(writes.len(), len.div_ceil(max));
            for write in &writes[..writes.len() - 1] {
                assert_eq!(write.value.len(), max);
            }
            assert_eq!(host.written_bytes(), data);
            assert_eq!(engine.state(), TransferState::Completed);
        }
    }

    #[tokio::test]
    async fn test_writes_never_overlap() {
        let host = connected_host(
            MockBleHost::with_printer(DEVICE, "JJKY").with_write_latency(Duration::from_millis(5)),
        )
        .await;
        let engine = TransferEngine::new(host.clone());

        engine
            .send(&payload(200), &handle(), &profile::resolve("windows"))
            .await
            .unwrap();

        assert_eq!(host.writes().len(), 10);
        assert_eq!(host.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_issues_no_writes() {
        let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY")).await;
        let engine = TransferEngine::new(host.clone());

        engine
            .send(&[], &handle(), &PlatformProfile::DEFAULT)
            .await
            .unwrap();

        assert!(host.writes().is_empty());
        assert_eq!(engine.state(), TransferState::Idle);
    }

    #[tokio::test]
    async fn test_failure_on_third_chunk_stops_transfer() {
        let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY").fail_write_at(2)).await;
        let engine = TransferEngine::new(host.clone());

        let result = engine
            .send(&payload(100), &handle(), &PlatformProfile::DEFAULT)
            .await;

        assert_eq!(result, Err(TransferError::WriteFailed(2)));
        assert_eq!(host.writes().len(), 3);
        assert!(!host.writes()[2].succeeded);
        assert_eq!(engine.state(), TransferState::Failed);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_hex_text_chunks() {
        let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY")).await;
        let engine = TransferEngine::new(host.clone());
        let profile = PlatformProfile {
            pace_millis_per_chunk: 0,
            ..PlatformProfile::ANDROID
        };
        let data = payload(40);

        engine.send(&data, &handle(), &profile).await.unwrap();

        let writes = host.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].value, WireValue::Text(hex::encode(&data[..19])));
        assert_eq!(writes[2].value, WireValue::Text(hex::encode(&data[38..])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delay_between_chunks() {
        let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY")).await;
        let engine = TransferEngine::new(host.clone());
        let start = Instant::now();

        engine
            .send(&payload(57), &handle(), &PlatformProfile::ANDROID)
            .await
            .unwrap();

        // Three chunks, two gaps; no delay after the last one.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(600));
        assert_eq!(host.writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_send_while_busy() {
        let host = connected_host(
            MockBleHost::with_printer(DEVICE, "JJKY").with_write_latency(Duration::from_millis(10)),
        )
        .await;
        let engine = TransferEngine::new(host.clone());
        let data = payload(60);
        let handle = handle();

        let (first, second) = tokio::join!(
            engine.send(&data, &handle, &PlatformProfile::DEFAULT),
            async {
                tokio::task::yield_now().await;
                engine.send(&data, &handle, &PlatformProfile::DEFAULT).await
            }
        );

        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(TransferError::SessionBusy));
        assert_eq!(host.written_bytes(), data);
        assert!(!engine.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pacing_delay() {
        let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY")).await;
        let engine = TransferEngine::new(host.clone());
        let data = payload(95);
        let handle = handle();
        let start = Instant::now();

        let (result, _) = tokio::join!(
            engine.send(&data, &handle, &PlatformProfile::ANDROID),
            async {
                tokio::time::sleep(Duration::from_millis(250)).await;
                engine.cancel();
            }
        );

        assert_eq!(result, Err(TransferError::Cancelled));
        assert_eq!(host.writes().len(), 2);
        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(engine.state(), TransferState::Failed);

        // The slot is free again and a fresh send is not affected by the old cancel.
        engine
            .send(&data, &handle, &PlatformProfile::DEFAULT)
            .await
            .unwrap();
        assert_eq!(engine.state(), TransferState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_write_stops_at_next_chunk() {
        let host = connected_host(
            MockBleHost::with_printer(DEVICE, "JJKY").with_write_latency(Duration::from_millis(100)),
        )
        .await;
        let engine = TransferEngine::new(host.clone());
        let data = payload(100);
        let handle = handle();

        // Cancel lands while chunk 1 is with the host; no pacing on this profile.
        let (result, _) = tokio::join!(
            engine.send(&data, &handle, &PlatformProfile::DEFAULT),
            async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                engine.cancel();
            }
        );

        assert_eq!(result, Err(TransferError::Cancelled));
        assert_eq!(host.writes().len(), 2);
        assert!(host.writes().iter().all(|w| w.succeeded));
        assert_eq!(host.written_bytes(), &data[..40]);
        assert_eq!(engine.state(), TransferState::Failed);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let host = connected_host(MockBleHost::with_printer(DEVICE, "JJKY")).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = TransferEngine::new(host).with_events(tx);

        engine
            .send(&payload(45), &handle(), &PlatformProfile::DEFAULT)
            .await
            .unwrap();

        let mut progress = Vec::new();
        while let Ok(AppEvent::TransferProgress { sent, total }) = rx.try_recv() {
            assert_eq!(total, 45);
            progress.push(sent);
        }
        assert_eq!(progress, vec![20, 40, 45]);
    }
}
