//! First-bytes protocol classification.
//!
//! HTTP/2 connections open with the client preface; anything else is HTTP/1.
//! For HTTP/2 the first HEADERS block (with its CONTINUATION frames) is
//! HPACK-decoded and its `content-type` decides between the gRPC lane and the
//! generic HTTP/2 lane. Nothing is ever written to the peer.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Bytes that may be buffered before the first END_HEADERS.
pub const MAX_SNIFF_BYTES: usize = 64 * 1024;

/// Time allowed to read the preface and first HEADERS block.
pub const SNIFF_TIMEOUT: Duration = Duration::from_secs(30);

const FRAME_HEADER_LEN: usize = 9;

const FRAME_HEADERS: u8 = 0x1;
const FRAME_CONTINUATION: u8 = 0x9;

const FLAG_END_HEADERS: u8 = 0x4;
const FLAG_PADDED: u8 = 0x8;
const FLAG_PRIORITY: u8 = 0x20;

const GRPC_CONTENT_TYPE: &[u8] = b"application/grpc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Http1,
    Grpc,
    Http2,
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    len: usize,
    kind: u8,
    flags: u8,
}

impl FrameHeader {
    fn parse(raw: &[u8]) -> Self {
        Self {
            len: (usize::from(raw[0]) << 16) | (usize::from(raw[1]) << 8) | usize::from(raw[2]),
            kind: raw[3],
            flags: raw[4],
        }
    }
}

/// Read from `io` into `buf` until the lane is known.
///
/// Everything read stays in `buf` so the connection can be replayed.
pub async fn classify<R>(io: &mut R, buf: &mut BytesMut) -> io::Result<Lane>
where
    R: AsyncRead + Unpin,
{
    while buf.len() < PREFACE.len() {
        if !PREFACE.starts_with(&buf[..]) {
            return Ok(Lane::Http1);
        }
        fill(io, buf).await?;
    }
    if &buf[..PREFACE.len()] != PREFACE {
        return Ok(Lane::Http1);
    }

    let mut offset = PREFACE.len();
    let mut block: Vec<u8> = Vec::new();
    let mut in_headers = false;
    loop {
        let header = read_frame_header(io, buf, offset).await?;
        let payload_start = offset + FRAME_HEADER_LEN;
        let payload_end = payload_start + header.len;
        ensure_buffered(io, buf, payload_end).await?;
        let payload = &buf[payload_start..payload_end];
        offset = payload_end;

        match (header.kind, in_headers) {
            (FRAME_HEADERS, false) => {
                block.extend_from_slice(header_fragment(header, payload)?);
                in_headers = true;
            }
            (FRAME_CONTINUATION, true) => block.extend_from_slice(payload),
            (_, true) => {
                return Err(invalid("header block interrupted by another frame"));
            }
            (kind, false) => {
                trace!(kind, len = header.len, "skipping frame before headers");
                continue;
            }
        }
        if header.flags & FLAG_END_HEADERS != 0 {
            return Ok(lane_for(&block));
        }
    }
}

fn lane_for(block: &[u8]) -> Lane {
    let mut decoder = hpack::Decoder::new();
    let Ok(fields) = decoder.decode(block) else {
        return Lane::Http2;
    };
    let grpc = fields
        .iter()
        .any(|(name, value)| name.as_slice() == b"content-type" && value.starts_with(GRPC_CONTENT_TYPE));
    if grpc { Lane::Grpc } else { Lane::Http2 }
}

/// The header block fragment of a HEADERS frame, without padding and
/// priority fields.
fn header_fragment(header: FrameHeader, payload: &[u8]) -> io::Result<&[u8]> {
    let mut start = 0;
    let mut end = payload.len();
    if header.flags & FLAG_PADDED != 0 {
        let pad = usize::from(*payload.first().ok_or_else(|| invalid("empty padded frame"))?);
        start += 1;
        end = end
            .checked_sub(pad)
            .ok_or_else(|| invalid("padding exceeds frame"))?;
    }
    if header.flags & FLAG_PRIORITY != 0 {
        start += 5;
    }
    if start > end {
        return Err(invalid("headers frame too short"));
    }
    Ok(&payload[start..end])
}

async fn read_frame_header<R>(io: &mut R, buf: &mut BytesMut, offset: usize) -> io::Result<FrameHeader>
where
    R: AsyncRead + Unpin,
{
    ensure_buffered(io, buf, offset + FRAME_HEADER_LEN).await?;
    Ok(FrameHeader::parse(&buf[offset..offset + FRAME_HEADER_LEN]))
}

async fn ensure_buffered<R>(io: &mut R, buf: &mut BytesMut, len: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    if len > MAX_SNIFF_BYTES {
        return Err(invalid("first header block exceeds sniff limit"));
    }
    while buf.len() < len {
        fill(io, buf).await?;
    }
    Ok(())
}

async fn fill<R>(io: &mut R, buf: &mut BytesMut) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    buf.reserve(4096);
    if io.read_buf(buf).await? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed while sniffing"));
    }
    Ok(())
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}
