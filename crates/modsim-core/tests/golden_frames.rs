//! Byte-exact vectors taken from the Modbus specification examples.

use modsim_core::codec::{Cursor, Sink};
use modsim_core::frame::{mbap, rtu};
use modsim_core::pdu::{self, ExceptionCode, ExceptionResponse, FunctionCode, Request, RequestBody};

const FC03_REQUEST: &[u8] = &[0x03, 0x00, 0x6B, 0x00, 0x03];
const TCP_FC03_REQUEST: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03,
];

#[test]
fn fc03_request_decodes() {
    let request = Request::decode(FC03_REQUEST).unwrap();
    assert_eq!(request.function, FunctionCode::ReadHoldingRegisters);
    assert_eq!(
        request.body,
        RequestBody::Read {
            start: 0x006B,
            count: 3
        }
    );
}

#[test]
fn fc03_response_golden_encode() {
    let mut buf = [0u8; 16];
    let mut sink = Sink::new(&mut buf);
    pdu::response::word_read(
        &mut sink,
        FunctionCode::ReadHoldingRegisters,
        &[0x022B, 0x0000, 0x0064],
    )
    .unwrap();
    assert_eq!(
        sink.bytes(),
        &[0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]
    );
}

#[test]
fn tcp_frame_golden() {
    let mut buf = [0u8; 16];
    let mut sink = Sink::new(&mut buf);
    mbap::encode(&mut sink, 1, 0x11, FC03_REQUEST).unwrap();
    assert_eq!(sink.bytes(), TCP_FC03_REQUEST);

    let mut cursor = Cursor::new(TCP_FC03_REQUEST);
    let header = mbap::MbapHeader::decode(&mut cursor).unwrap();
    assert_eq!(header.transaction_id, 1);
    assert_eq!(header.unit_id, 0x11);
    assert_eq!(cursor.take(header.pdu_len()).unwrap(), FC03_REQUEST);
}

#[test]
fn rtu_frame_golden() {
    let mut buf = [0u8; 16];
    let mut sink = Sink::new(&mut buf);
    rtu::encode(&mut sink, 0x01, &[0x03, 0x00, 0x00, 0x00, 0x0A]).unwrap();
    // Trailer is the reference CRC 0xCDC5, little-endian on the wire.
    assert_eq!(
        sink.bytes(),
        &[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]
    );
}

#[test]
fn exception_pdu_golden() {
    let mut buf = [0u8; 2];
    let mut sink = Sink::new(&mut buf);
    ExceptionResponse {
        function: 0x04,
        code: ExceptionCode::SlaveDeviceFailure,
    }
    .encode(&mut sink)
    .unwrap();
    assert_eq!(sink.bytes(), &[0x84, 0x04]);
}
