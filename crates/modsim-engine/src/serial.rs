//! Serial RTU listener: silence-delimited frames on a serial port.

use crate::handler::{Channel, Outcome, SlaveHandler};
use crate::TransportError;
use modsim_core::codec::Sink;
use modsim_core::frame::rtu::{self, MAX_FRAME_LEN, MIN_FRAME_LEN};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info, trace, warn};

const REOPEN_ATTEMPTS: u32 = 5;
const REOPEN_BACKOFF: Duration = Duration::from_millis(500);

/// Serial link parameters for one RTU bus.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
}

/// The inter-frame gap that delimits RTU frames: 3.5 character times of
/// 11 bits each, with the standard 1.75 ms floor above 19200 baud.
pub fn inter_frame_silence(baud_rate: u32) -> Duration {
    if baud_rate > 19_200 {
        Duration::from_micros(1_750)
    } else {
        Duration::from_micros(38_500_000 / u64::from(baud_rate.max(1)))
    }
}

/// Serves one serial bus, reopening the port a bounded number of times if
/// it drops.
pub struct SerialSlaveListener {
    settings: SerialSettings,
    handler: Arc<SlaveHandler>,
    shutdown: watch::Receiver<bool>,
}

impl SerialSlaveListener {
    pub fn new(
        settings: SerialSettings,
        handler: Arc<SlaveHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            handler,
            shutdown,
        }
    }

    fn open(&self) -> Result<tokio_serial::SerialStream, TransportError> {
        tokio_serial::new(&self.settings.path, self.settings.baud_rate)
            .parity(self.settings.parity)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .open_native_async()
            .map_err(|err| TransportError::SerialOpen {
                path: self.settings.path.clone(),
                reason: err.to_string(),
            })
    }

    pub async fn run(mut self) -> Result<(), TransportError> {
        let silence = inter_frame_silence(self.settings.baud_rate);
        let mut attempts = 0u32;
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            let stream = match self.open() {
                Ok(stream) => {
                    attempts = 0;
                    stream
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= REOPEN_ATTEMPTS {
                        return Err(err);
                    }
                    warn!(
                        path = %self.settings.path,
                        attempt = attempts,
                        error = %err,
                        "serial port open failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(REOPEN_BACKOFF) => {}
                        _ = self.shutdown.changed() => {}
                    }
                    continue;
                }
            };

            info!(
                path = %self.settings.path,
                baud_rate = self.settings.baud_rate,
                "serial port open"
            );
            match serve_frames(
                stream,
                Arc::clone(&self.handler),
                silence,
                self.shutdown.clone(),
            )
            .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(path = %self.settings.path, error = %err, "serial link failed, reopening");
                }
            }
        }
    }
}

/// Reads silence-delimited frames and answers them. Frames with a bad CRC
/// or an oversized body are dropped without a reply; broadcasts are
/// executed but never answered.
pub(crate) async fn serve_frames<IO>(
    mut io: IO,
    handler: Arc<SlaveHandler>,
    silence: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TransportError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = [0u8; MAX_FRAME_LEN];
    let mut len = 0usize;
    let mut oversized = false;
    let mut chunk = [0u8; MAX_FRAME_LEN];

    loop {
        let read = if len == 0 && !oversized {
            tokio::select! {
                read = io.read(&mut chunk) => Some(read?),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            }
        } else {
            tokio::select! {
                read = tokio::time::timeout(silence, io.read(&mut chunk)) => match read {
                    Ok(read) => Some(read?),
                    Err(_) => None,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            }
        };

        match read {
            Some(0) => {
                // Peer closed the link; treat pending bytes as a final frame.
                if len > 0 && !oversized {
                    handle_frame(&mut io, &handler, &frame[..len]).await?;
                }
                return Ok(());
            }
            Some(n) => {
                if oversized || len + n > MAX_FRAME_LEN {
                    if !oversized {
                        trace!("dropping oversized frame");
                    }
                    oversized = true;
                    len = 0;
                    continue;
                }
                frame[len..len + n].copy_from_slice(&chunk[..n]);
                len += n;
            }
            None => {
                // Inter-frame gap elapsed.
                if !oversized && len > 0 {
                    handle_frame(&mut io, &handler, &frame[..len]).await?;
                }
                len = 0;
                oversized = false;
            }
        }
    }
}

async fn handle_frame<IO>(
    io: &mut IO,
    handler: &SlaveHandler,
    frame: &[u8],
) -> Result<(), TransportError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    if frame.len() < MIN_FRAME_LEN {
        trace!(len = frame.len(), "dropping runt frame");
        return Ok(());
    }
    let (unit_id, pdu) = match rtu::decode(frame) {
        Ok(decoded) => decoded,
        Err(err) => {
            trace!(error = %err, "dropping frame with bad crc");
            return Ok(());
        }
    };

    let mut out = [0u8; MAX_FRAME_LEN - 3];
    let Outcome::Respond(len) = handler.handle(Channel::Serial, unit_id, pdu, &mut out) else {
        debug!(unit_id, "no response for frame");
        return Ok(());
    };

    let mut response = [0u8; MAX_FRAME_LEN];
    let mut sink = Sink::new(&mut response);
    rtu::encode(&mut sink, unit_id, &out[..len])?;
    io.write_all(sink.bytes()).await?;
    io.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{inter_frame_silence, serve_frames};
    use crate::device::{DeviceIdentity, SlaveDevice};
    use crate::handler::SlaveHandler;
    use crate::store::RegionSizes;
    use modsim_core::codec::Sink;
    use modsim_core::frame::rtu;
    use modsim_core::RegisterSpace;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::watch;

    fn handler() -> Arc<SlaveHandler> {
        let mut handler = SlaveHandler::new();
        handler.add(Arc::new(SlaveDevice::new(
            0x11,
            DeviceIdentity::default(),
            &RegionSizes::uniform(104),
        )));
        Arc::new(handler)
    }

    fn frame(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let mut sink = Sink::new(&mut buf);
        rtu::encode(&mut sink, unit_id, pdu).unwrap();
        sink.bytes().to_vec()
    }

    #[test]
    fn silence_scales_with_baud_rate() {
        assert_eq!(
            inter_frame_silence(9_600),
            Duration::from_micros(4_010)
        );
        assert_eq!(
            inter_frame_silence(19_200),
            Duration::from_micros(2_005)
        );
        // Fixed floor above 19200 baud.
        assert_eq!(
            inter_frame_silence(115_200),
            Duration::from_micros(1_750)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn valid_frame_is_answered() {
        let (mut client, server_side) = duplex(512);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_frames(
            server_side,
            handler(),
            Duration::from_millis(2),
            rx,
        ));

        client
            .write_all(&frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .await
            .unwrap();

        let mut response = [0u8; 7];
        client.read_exact(&mut response).await.unwrap();
        let (unit_id, pdu) = rtu::decode(&response).unwrap();
        assert_eq!(unit_id, 0x11);
        assert_eq!(pdu, &[0x03, 0x02, 0x00, 0x00]);

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_frame_is_silently_dropped() {
        let (mut client, server_side) = duplex(512);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_frames(
            server_side,
            handler(),
            Duration::from_millis(2),
            rx,
        ));

        let mut corrupted = frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        corrupted[2] ^= 0x40;
        client.write_all(&corrupted).await.unwrap();

        // A gap passes, then a valid frame; only the valid one is answered.
        tokio::time::sleep(Duration::from_millis(5)).await;
        client
            .write_all(&frame(0x11, &[0x01, 0x00, 0x00, 0x00, 0x08]))
            .await
            .unwrap();

        let mut response = [0u8; 6];
        client.read_exact(&mut response).await.unwrap();
        let (unit_id, pdu) = rtu::decode(&response).unwrap();
        assert_eq!(unit_id, 0x11);
        assert_eq!(pdu, &[0x01, 0x01, 0x00]);

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_write_executes_without_reply() {
        let (mut client, server_side) = duplex(512);
        let (_tx, rx) = watch::channel(false);
        let handler = handler();
        let task = tokio::spawn(serve_frames(
            server_side,
            Arc::clone(&handler),
            Duration::from_millis(2),
            rx,
        ));

        client
            .write_all(&frame(0, &[0x06, 0x00, 0x05, 0xAB, 0xCD]))
            .await
            .unwrap();

        // Closing the link flushes the pending frame and ends the loop
        // without any response having been written.
        drop(client);
        task.await.unwrap().unwrap();

        let device = handler.device(0x11).unwrap();
        assert_eq!(
            device
                .store()
                .word(RegisterSpace::HoldingRegister, 5)
                .unwrap(),
            0xABCD
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_idle_listener() {
        let (client, server_side) = duplex(512);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_frames(
            server_side,
            handler(),
            Duration::from_millis(2),
            rx,
        ));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
        drop(client);
    }
}
