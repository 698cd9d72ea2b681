// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCPROS service-call codec.
//!
//! Wire format (all integers little-endian):
//! ```text
//! header   := u32 total_len, { u32 field_len, "key=value" }*
//! request  := u32 len, body
//! response := u8 ok, u32 len, body      (ok == 0: body is an error string)
//! ```

use crate::error::{ChaosError, Result};
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single header or response frame.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// A fully encoded service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub caller_id: String,
    pub service: String,
    pub service_type: &'static str,
    pub md5sum: &'static str,
    pub body: Vec<u8>,
}

impl ServiceRequest {
    fn header_fields(&self) -> Vec<(&str, &str)> {
        vec![
            ("callerid", self.caller_id.as_str()),
            ("service", self.service.as_str()),
            ("md5sum", self.md5sum),
            ("type", self.service_type),
            ("persistent", "0"),
        ]
    }
}

/// Split a `rosrpc://host:port` service address into `host:port`.
pub fn parse_rosrpc_uri(uri: &str) -> Result<String> {
    let rest = uri
        .strip_prefix("rosrpc://")
        .ok_or_else(|| ChaosError::Decode(format!("'{}' is not a rosrpc:// address", uri)))?;
    let authority = rest.trim_end_matches('/');
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(authority.to_string())
        }
        _ => Err(ChaosError::Decode(format!(
            "'{}' has no host:port authority",
            uri
        ))),
    }
}

/// Encode a connection header.
pub fn encode_header(fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in fields {
        let field = format!("{}={}", key, value);
        body.extend_from_slice(&(field.len() as u32).to_le_bytes());
        body.extend_from_slice(field.as_bytes());
    }
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decode a connection header body (without its outer length prefix).
pub fn decode_header(mut buf: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    while !buf.is_empty() {
        let len = take_u32(&mut buf)? as usize;
        if buf.len() < len {
            return Err(ChaosError::Decode("truncated header field".into()));
        }
        let (field, rest) = buf.split_at(len);
        buf = rest;
        let field = String::from_utf8_lossy(field);
        if let Some((key, value)) = field.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
    }
    Ok(fields)
}

/// Perform one service call over an established stream.
pub async fn call<S>(stream: &mut S, request: &ServiceRequest) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_err = |e: std::io::Error| ChaosError::communication(&request.service, e);

    stream
        .write_all(&encode_header(&request.header_fields()))
        .await
        .map_err(io_err)?;

    let header_len = stream.read_u32_le().await.map_err(io_err)?;
    let header = read_frame(stream, header_len, &request.service).await?;
    let fields = decode_header(&header)?;
    if let Some(error) = fields.get("error") {
        return Err(ChaosError::protocol(&request.service, 0, error.clone()));
    }

    let mut frame = Vec::with_capacity(request.body.len() + 4);
    frame.extend_from_slice(&(request.body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&request.body);
    stream.write_all(&frame).await.map_err(io_err)?;
    stream.flush().await.map_err(io_err)?;

    let ok = stream.read_u8().await.map_err(io_err)?;
    let len = stream.read_u32_le().await.map_err(io_err)?;
    let body = read_frame(stream, len, &request.service).await?;
    if ok == 0 {
        return Err(ChaosError::protocol(
            &request.service,
            0,
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }
    Ok(body)
}

async fn read_frame<S>(stream: &mut S, len: u32, service: &str) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    if len > MAX_FRAME_LEN {
        return Err(ChaosError::Decode(format!(
            "{}: frame of {} bytes exceeds limit",
            service, len
        )));
    }
    let mut buf = vec![0u8; len as usize];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| ChaosError::communication(service, e))?;
    Ok(buf)
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.len() < 4 {
        return Err(ChaosError::Decode("truncated length prefix".into()));
    }
    let (len, rest) = buf.split_at(4);
    *buf = rest;
    Ok(u32::from_le_bytes([len[0], len[1], len[2], len[3]]))
}

/// Append a ROS `string`.
pub fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Cursor over a serialized ROS message.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        take_u32(&mut self.buf)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        if self.buf.len() < len {
            return Err(ChaosError::Decode("truncated string".into()));
        }
        let (s, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(String::from_utf8_lossy(s).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
