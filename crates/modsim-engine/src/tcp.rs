//! Modbus TCP listener: one task per connection, MBAP framing.

use crate::handler::{Channel, Outcome, SlaveHandler};
use crate::TransportError;
use modsim_core::codec::{Cursor, Sink};
use modsim_core::frame::mbap::{self, MbapHeader, HEADER_LEN, MAX_PDU_LEN};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Accepts Modbus TCP connections and serves them until shut down.
pub struct TcpSlaveListener {
    listener: TcpListener,
    handler: Arc<SlaveHandler>,
    shutdown: watch::Receiver<bool>,
}

impl TcpSlaveListener {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: Arc<SlaveHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Returns once the shutdown flag flips; open connections
    /// stop on their own copy of the receiver.
    pub async fn run(mut self) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, peer) = accepted?;
                    debug!(%peer, "accepted modbus tcp connection");
                    let handler = Arc::clone(&self.handler);
                    let shutdown = self.shutdown.clone();
                    tokio::spawn(async move {
                        match serve_connection(socket, handler, shutdown).await {
                            Ok(()) => debug!(%peer, "modbus tcp connection closed"),
                            Err(err) => warn!(%peer, error = %err, "modbus tcp connection failed"),
                        }
                    });
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        debug!("tcp listener shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Serves one connection. Every complete request frame is answered with
/// the caller's transaction id, exceptions included; a header that cannot
/// be parsed ends the connection since resynchronization is impossible.
async fn serve_connection<IO>(
    mut io: IO,
    handler: Arc<SlaveHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TransportError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    loop {
        // The header is filled with plain `read` calls, which are
        // cancel-safe: a shutdown check between chunks never loses bytes
        // already received, so the stream stays aligned.
        let mut filled = 0usize;
        while filled < HEADER_LEN {
            tokio::select! {
                read = io.read(&mut header_buf[filled..]) => {
                    let n = read?;
                    if n == 0 {
                        if filled == 0 {
                            return Ok(());
                        }
                        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                    }
                    filled += n;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }

        let mut cursor = Cursor::new(&header_buf);
        let header = MbapHeader::decode(&mut cursor)?;

        let mut pdu = vec![0u8; header.pdu_len()];
        io.read_exact(&mut pdu).await?;

        let mut out = [0u8; MAX_PDU_LEN];
        let Outcome::Respond(len) =
            handler.handle(Channel::Network, header.unit_id, &pdu, &mut out)
        else {
            continue;
        };

        let mut frame = [0u8; HEADER_LEN + MAX_PDU_LEN];
        let mut sink = Sink::new(&mut frame);
        mbap::encode(&mut sink, header.transaction_id, header.unit_id, &out[..len])?;
        io.write_all(sink.bytes()).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::serve_connection;
    use crate::device::{DeviceIdentity, SlaveDevice};
    use crate::handler::SlaveHandler;
    use crate::store::RegionSizes;
    use std::sync::Arc;
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

    #[tokio::test]
    async fn transaction_id_is_echoed() {
        let (mut client, server_side) = duplex(512);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_connection(server_side, handler(), rx));

        client
            .write_all(&[
                0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x00, 0x00, 0x02,
            ])
            .await
            .unwrap();

        let mut response = [0u8; 13];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(
            response,
            [0x00, 0x07, 0x00, 0x00, 0x00, 0x07, 0x11, 0x03, 0x04, 0, 0, 0, 0]
        );

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn exception_carries_transaction_id() {
        let (mut client, server_side) = duplex(512);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_connection(server_side, handler(), rx));

        // Function 0x07 is outside the supported set.
        client
            .write_all(&[0x12, 0x34, 0x00, 0x00, 0x00, 0x02, 0x11, 0x07])
            .await
            .unwrap();

        let mut response = [0u8; 9];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(
            response,
            [0x12, 0x34, 0x00, 0x00, 0x00, 0x03, 0x11, 0x87, 0x01]
        );

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn nonzero_protocol_id_closes_connection() {
        let (mut client, server_side) = duplex(512);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_connection(server_side, handler(), rx));

        client
            .write_all(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x11, 0x07])
            .await
            .unwrap();

        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn notification_between_header_bytes_keeps_stream_aligned() {
        let (mut client, server_side) = duplex(512);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_connection(server_side, handler(), rx));

        let frame = [
            0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x00, 0x00, 0x01,
        ];
        client.write_all(&frame[..4]).await.unwrap();
        tokio::task::yield_now().await;
        // A watch notification that does not set the flag must not lose
        // the header bytes already read.
        tx.send(false).unwrap();
        client.write_all(&frame[4..]).await.unwrap();

        let mut response = [0u8; 11];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(
            response,
            [0x00, 0x09, 0x00, 0x00, 0x00, 0x05, 0x11, 0x03, 0x02, 0x00, 0x00]
        );

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_flag_stops_idle_connection() {
        let (client, server_side) = duplex(512);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve_connection(server_side, handler(), rx));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
        drop(client);
    }
}
