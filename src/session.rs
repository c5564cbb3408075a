//! Protocol engine (component E): a buffered, length-prefixed request decoder that dispatches
//! into a [`Binding`]'s handler table, enforces capability negotiation, encodes replies, and
//! carries per-transaction status. Grounded on `read_packet` in the original `xvcserver.c`.
//!
//! `Session` never touches a socket directly — it is driven by [`Session::serve`], generic
//! over any `Read + Write`, so it can be exercised with an in-memory stream in tests and with
//! a real `TcpStream` from the server crate.

use std::io::{Read, Write};

use crate::error::ProtocolError;
use crate::handlers::Binding;
use crate::uleb128;

/// Sliding receive buffer capacity (`MAX_PACKET_LEN` in the original source).
pub const MAX_PACKET_LEN: usize = 10000;
/// How far the engine scans for the verb-terminating `:` before declaring a protocol error.
const VERB_SCAN_LIMIT: usize = 30;
/// `xvcServer_v<MAJOR>.<MINOR>` reported by `getinfo:`.
const XVC_VERSION_MAJOR: u32 = 1;
const XVC_VERSION_MINOR: u32 = 1;

enum ReplyMode {
    /// No status byte at all (`getinfo:`, `capabilities:`, `error:`).
    None,
    /// Only appended when the client enabled `status` via `configure:` (`shift:`, `settck:`).
    Optional,
    /// Always appended.
    Mandatory,
}

/// One connection's worth of protocol-engine state (spec.md §3 "Protocol client").
pub struct Session<'a> {
    binding: Binding<'a>,
    buf: Vec<u8>,
    buf_max: usize,
    locked: bool,
    enable_locking: bool,
    enable_status: bool,
    pending_error: String,
}

impl<'a> Session<'a> {
    pub fn new(binding: Binding<'a>) -> Self {
        Self {
            binding,
            buf: Vec::new(),
            buf_max: MAX_PACKET_LEN,
            locked: false,
            enable_locking: false,
            enable_status: false,
            pending_error: String::new(),
        }
    }

    pub fn buf_max(&self) -> usize {
        self.buf_max
    }

    /// Drives the decode/reply cycle for the lifetime of one connection. Returns once the
    /// peer closes the socket or an I/O error occurs (spec.md §4.5 step 5); a protocol error
    /// is also fatal to the connection but is reported as `Err` rather than a clean return.
    pub fn serve<S: Read + Write>(&mut self, stream: &mut S) -> Result<(), ProtocolError> {
        loop {
            let (reply, consumed, fill) = self.decode()?;
            if consumed > 0 {
                self.binding
                    .core
                    .flush()
                    .map_err(|e| ProtocolError::UnknownVerb(format!("flush failed: {e}")))?;
                stream.write_all(&reply)?;
                self.buf.drain(0..consumed);
                if !self.buf.is_empty() && !fill {
                    continue;
                }
            }

            let mut chunk = vec![0u8; self.buf_max - self.buf.len()];
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(ProtocolError::PeerClosed);
            }
            chunk.truncate(n);
            self.buf.extend_from_slice(&chunk);
        }
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.pending_error = message.into();
    }

    fn status_byte(&self) -> u8 {
        u8::from(!self.pending_error.is_empty())
    }

    /// Decodes as many fully-buffered verbs as possible. Returns the accumulated reply bytes,
    /// the number of input bytes they consumed, and whether the loop stopped because a verb's
    /// payload isn't fully buffered yet (spec.md §4.5 steps 1-4).
    fn decode(&mut self) -> Result<(Vec<u8>, usize, bool), ProtocolError> {
        let mut reply = Vec::new();
        let mut consumed = 0usize;
        loop {
            let window = self.buf[consumed..].to_vec();
            if window.is_empty() {
                return Ok((reply, consumed, false));
            }

            let scan_end = window.len().min(VERB_SCAN_LIMIT);
            let Some(colon) = window[..scan_end].iter().position(|&b| b == b':') else {
                if scan_end >= VERB_SCAN_LIMIT {
                    return Err(ProtocolError::UnterminatedVerb);
                }
                return Ok((reply, consumed, true));
            };
            let verb_len = colon + 1;
            let verb = &window[..verb_len];
            let payload = &window[verb_len..];

            match self.dispatch(verb, payload, &mut reply)? {
                Some(extra) => consumed += verb_len + extra,
                None => return Ok((reply, consumed, true)),
            }
        }
    }

    fn dispatch(
        &mut self,
        verb: &[u8],
        payload: &[u8],
        reply: &mut Vec<u8>,
    ) -> Result<Option<usize>, ProtocolError> {
        let (extra, mode) = match verb {
            b"getinfo:" => (self.handle_getinfo(reply), ReplyMode::None),
            b"capabilities:" => (self.handle_capabilities(reply), ReplyMode::None),
            b"configure:" => match self.handle_configure(payload)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"error:" => (self.handle_error(reply), ReplyMode::None),
            b"lock:" => match self.handle_lock(payload)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"unlock:" => match self.handle_unlock()? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"shift:" => match self.handle_shift(payload, reply)? {
                Some(extra) => (extra, ReplyMode::Optional),
                None => return Ok(None),
            },
            b"settck:" => match self.handle_settck(payload, reply)? {
                Some(extra) => (extra, ReplyMode::Optional),
                None => return Ok(None),
            },
            b"irshift:" => match self.handle_register_shift(true, payload, reply)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"drshift:" => match self.handle_register_shift(false, payload, reply)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"state:" => match self.handle_state(payload)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"mrd:" => match self.handle_mrd(payload, reply)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"mwr:" => match self.handle_mwr(payload)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"idpc:" => match self.handle_idpc(payload)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            b"edpc:" => match self.handle_edpc(payload, reply)? {
                Some(extra) => (extra, ReplyMode::Mandatory),
                None => return Ok(None),
            },
            _ => {
                return Err(ProtocolError::UnknownVerb(
                    String::from_utf8_lossy(verb).into_owned(),
                ))
            }
        };

        match mode {
            ReplyMode::Mandatory => reply.push(self.status_byte()),
            ReplyMode::Optional if self.enable_status => reply.push(self.status_byte()),
            ReplyMode::Optional | ReplyMode::None => {}
        }
        Ok(Some(extra))
    }

    fn handle_getinfo(&self, reply: &mut Vec<u8>) -> usize {
        let text = format!(
            "xvcServer_v{XVC_VERSION_MAJOR}.{XVC_VERSION_MINOR}:{}\n",
            self.buf_max
        );
        reply.extend_from_slice(text.as_bytes());
        0
    }

    fn capabilities_list(&self) -> String {
        let mut caps = Vec::new();
        if self.binding.locking_supported() {
            caps.push("locking".to_owned());
        }
        if self.binding.state_aware_supported() {
            caps.push("state-aware".to_owned());
        }
        if self.binding.memory_supported() {
            caps.push("memory".to_owned());
            if let Some(idcode) = self.binding.idcode {
                caps.push(format!("idcode={idcode}"));
            }
        }
        caps.push("status".to_owned());
        caps.join(",")
    }

    fn handle_capabilities(&self, reply: &mut Vec<u8>) -> usize {
        let caps = self.capabilities_list();
        uleb128::encode(caps.len() as u64, reply);
        reply.extend_from_slice(caps.as_bytes());
        0
    }

    fn handle_error(&mut self, reply: &mut Vec<u8>) -> usize {
        let mut len = self.pending_error.len();
        let header_estimate = (len + 127) / 128;
        if len > self.buf_max.saturating_sub(header_estimate) {
            len = self.buf_max.saturating_sub(header_estimate);
        }
        uleb128::encode(len as u64, reply);
        reply.extend_from_slice(&self.pending_error.as_bytes()[..len]);
        self.pending_error.clear();
        0
    }

    fn handle_configure(&mut self, payload: &[u8]) -> Result<Option<usize>, ProtocolError> {
        let mut pos = 0usize;
        let Some((byte_count, len)) = uleb128::decode(payload)? else {
            return Ok(None);
        };
        pos += len;
        let byte_count = byte_count as usize;
        if payload.len() < pos + byte_count {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&payload[pos..pos + byte_count]).into_owned();
        pos += byte_count;

        for field in text.split(',') {
            if field.is_empty() {
                continue;
            }
            let (key, enable) = Self::parse_config_field(field);

            if key == "locking" && self.binding.locking_supported() {
                match enable {
                    Some(v) => self.enable_locking = v,
                    None => {
                        self.set_error("configuration \"locking\" requires boolean + or -");
                        break;
                    }
                }
            } else if key == "status" {
                match enable {
                    Some(v) => self.enable_status = v,
                    None => {
                        self.set_error("configuration \"status\" requires boolean + or -");
                        break;
                    }
                }
            } else {
                self.set_error(format!("unexpected configuration: {key}"));
                break;
            }
        }

        Ok(Some(pos))
    }

    fn parse_config_field(field: &str) -> (&str, Option<bool>) {
        if field.contains('=') {
            return (field.split('=').next().unwrap_or(field), None);
        }
        if field.len() > 1 {
            match field.as_bytes()[field.len() - 1] {
                b'+' => return (&field[..field.len() - 1], Some(true)),
                b'-' => return (&field[..field.len() - 1], Some(false)),
                _ => {}
            }
        }
        (field, None)
    }

    fn handle_lock(&mut self, payload: &[u8]) -> Result<Option<usize>, ProtocolError> {
        let Some((timeout, len)) = uleb128::decode(payload)? else {
            return Ok(None);
        };
        if self.binding.locking.is_none() {
            return Err(ProtocolError::UnknownVerb("lock:".to_owned()));
        }
        if self.pending_error.is_empty() {
            if !self.enable_locking {
                self.set_error("locking is disabled");
            } else if self.locked {
                self.set_error("already locked");
            } else {
                let locking = self.binding.locking.as_mut().expect("checked above");
                match locking.lock(timeout) {
                    Ok(()) => self.locked = true,
                    Err(e) => self.set_error(e.to_string()),
                }
            }
        }
        Ok(Some(len))
    }

    fn handle_unlock(&mut self) -> Result<Option<usize>, ProtocolError> {
        if self.binding.locking.is_none() {
            return Err(ProtocolError::UnknownVerb("unlock:".to_owned()));
        }
        if self.pending_error.is_empty() {
            if !self.enable_locking {
                self.set_error("locking is disabled");
            } else if !self.locked {
                self.set_error("already unlocked");
            } else {
                let locking = self.binding.locking.as_mut().expect("checked above");
                match locking.unlock() {
                    Ok(()) => self.locked = false,
                    Err(e) => self.set_error(e.to_string()),
                }
            }
        }
        Ok(Some(0))
    }

    fn handle_shift(
        &mut self,
        payload: &[u8],
        reply: &mut Vec<u8>,
    ) -> Result<Option<usize>, ProtocolError> {
        if payload.len() < 4 {
            return Ok(None);
        }
        if self.binding.jtag.is_none() {
            return Err(ProtocolError::UnknownVerb("shift:".to_owned()));
        }
        let bits = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let bytes = ((bits + 7) / 8) as usize;
        if payload.len() < 4 + bytes * 2 {
            return Ok(None);
        }
        let tms = payload[4..4 + bytes].to_vec();
        let tdi = payload[4 + bytes..4 + bytes * 2].to_vec();

        let start = reply.len();
        reply.resize(start + bytes, 0);
        if self.pending_error.is_empty() {
            let jtag = self.binding.jtag.as_mut().expect("checked above");
            if let Err(e) = jtag.shift_tms_tdi(bits, &tms, &tdi, &mut reply[start..start + bytes]) {
                self.set_error(e.to_string());
            }
        }
        if !self.pending_error.is_empty() {
            reply[start..start + bytes].fill(0);
        }
        Ok(Some(4 + bytes * 2))
    }

    fn handle_settck(
        &mut self,
        payload: &[u8],
        reply: &mut Vec<u8>,
    ) -> Result<Option<usize>, ProtocolError> {
        if payload.len() < 4 {
            return Ok(None);
        }
        if self.binding.jtag.is_none() {
            return Err(ProtocolError::UnknownVerb("settck:".to_owned()));
        }
        let period = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let resolved = if self.pending_error.is_empty() {
            let jtag = self.binding.jtag.as_mut().expect("checked above");
            match jtag.set_tck(period) {
                Ok(v) => v,
                Err(e) => {
                    self.set_error(e.to_string());
                    period
                }
            }
        } else {
            period
        };
        reply.extend_from_slice(&resolved.to_le_bytes());
        Ok(Some(4))
    }

    fn handle_register_shift(
        &mut self,
        is_ir: bool,
        payload: &[u8],
        reply: &mut Vec<u8>,
    ) -> Result<Option<usize>, ProtocolError> {
        if self.binding.state_aware.is_none() {
            return Err(ProtocolError::UnknownVerb(
                if is_ir { "irshift:" } else { "drshift:" }.to_owned(),
            ));
        }
        let mut pos = 0usize;
        let Some((flags, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((end_state, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((count, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;

        let tdi_bytes = if flags & 3 == 0 { ((count + 7) / 8) as usize } else { 0 };
        let tdo_bytes = if flags & 4 != 0 { ((count + 7) / 8) as usize } else { 0 };
        if payload.len() < pos + tdi_bytes {
            return Ok(None);
        }
        let tdi = if tdi_bytes > 0 {
            Some(payload[pos..pos + tdi_bytes].to_vec())
        } else {
            None
        };
        pos += tdi_bytes;

        let tdo_start = reply.len();
        if tdo_bytes > 0 {
            reply.resize(tdo_start + tdo_bytes, 0);
        }
        if self.pending_error.is_empty() {
            let state_aware = self.binding.state_aware.as_mut().expect("checked above");
            let tdo = if tdo_bytes > 0 {
                Some(&mut reply[tdo_start..tdo_start + tdo_bytes])
            } else {
                None
            };
            if let Err(e) = state_aware.register_shift(
                is_ir,
                flags as u32,
                end_state as u32,
                count,
                tdi.as_deref(),
                tdo,
            ) {
                self.set_error(e.to_string());
            }
        }
        if !self.pending_error.is_empty() && tdo_bytes > 0 {
            reply[tdo_start..tdo_start + tdo_bytes].fill(0);
        }
        Ok(Some(pos))
    }

    fn handle_state(&mut self, payload: &[u8]) -> Result<Option<usize>, ProtocolError> {
        if self.binding.state_aware.is_none() {
            return Err(ProtocolError::UnknownVerb("state:".to_owned()));
        }
        let mut pos = 0usize;
        let Some((flags, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((end_state, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((count, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;

        if self.pending_error.is_empty() {
            let state_aware = self.binding.state_aware.as_mut().expect("checked above");
            if let Err(e) = state_aware.state(flags as u32, end_state as u32, count) {
                self.set_error(e.to_string());
            }
        }
        Ok(Some(pos))
    }

    fn handle_mrd(
        &mut self,
        payload: &[u8],
        reply: &mut Vec<u8>,
    ) -> Result<Option<usize>, ProtocolError> {
        if self.binding.memory.is_none() {
            return Err(ProtocolError::UnknownVerb("mrd:".to_owned()));
        }
        let mut pos = 0usize;
        let Some((flags, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((addr, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((num_bytes, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let num_bytes = num_bytes as usize;

        let start = reply.len();
        reply.resize(start + num_bytes, 0);
        if self.pending_error.is_empty() {
            let memory = self.binding.memory.as_mut().expect("checked above");
            if let Err(e) = memory.mrd(flags as u32, addr, &mut reply[start..start + num_bytes]) {
                self.set_error(e.to_string());
            }
        }
        if !self.pending_error.is_empty() {
            reply[start..start + num_bytes].fill(0);
        }
        Ok(Some(pos))
    }

    fn handle_mwr(&mut self, payload: &[u8]) -> Result<Option<usize>, ProtocolError> {
        if self.binding.memory.is_none() {
            return Err(ProtocolError::UnknownVerb("mwr:".to_owned()));
        }
        let mut pos = 0usize;
        let Some((flags, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((addr, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((num_bytes, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let num_bytes = num_bytes as usize;
        if payload.len() < pos + num_bytes {
            return Ok(None);
        }
        let data = payload[pos..pos + num_bytes].to_vec();
        pos += num_bytes;

        if self.pending_error.is_empty() {
            let memory = self.binding.memory.as_mut().expect("checked above");
            if let Err(e) = memory.mwr(flags as u32, addr, &data) {
                self.set_error(e.to_string());
            }
        }
        Ok(Some(pos))
    }

    fn handle_idpc(&mut self, payload: &[u8]) -> Result<Option<usize>, ProtocolError> {
        if self.binding.dpc.is_none() {
            return Err(ProtocolError::UnknownVerb("idpc:".to_owned()));
        }
        let mut pos = 0usize;
        let Some((flags, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((word_count, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let byte_len = word_count as usize * 4;
        if payload.len() < pos + byte_len {
            return Ok(None);
        }
        let data = payload[pos..pos + byte_len].to_vec();
        pos += byte_len;

        if self.pending_error.is_empty() {
            let dpc = self.binding.dpc.as_mut().expect("checked above");
            if let Err(e) = dpc.idpc(flags as u32, &data) {
                self.set_error(e.to_string());
            }
        }
        Ok(Some(pos))
    }

    fn handle_edpc(
        &mut self,
        payload: &[u8],
        reply: &mut Vec<u8>,
    ) -> Result<Option<usize>, ProtocolError> {
        if self.binding.dpc.is_none() {
            return Err(ProtocolError::UnknownVerb("edpc:".to_owned()));
        }
        let mut pos = 0usize;
        let Some((flags, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let Some((word_count, len)) = uleb128::decode(&payload[pos..])? else {
            return Ok(None);
        };
        pos += len;
        let want = word_count as usize * 4;

        let start = reply.len();
        reply.resize(start + want, 0);
        if self.pending_error.is_empty() {
            let dpc = self.binding.dpc.as_mut().expect("checked above");
            match dpc.edpc(flags as u32, word_count as u32) {
                Ok(data) => {
                    let n = data.len().min(want);
                    reply[start..start + n].copy_from_slice(&data[..n]);
                }
                Err(e) => self.set_error(e.to_string()),
            }
        }
        Ok(Some(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handlers::{CoreOps, JtagOps, LockingOps, MemoryOps};
    use std::collections::VecDeque;
    use std::io;

    struct FakeCore;
    impl CoreOps for FakeCore {
        fn open_port(&mut self) -> Result<(), HandlerError> {
            Ok(())
        }
        fn close_port(&mut self) {}
    }

    struct FakeJtag {
        period: u32,
        fail: bool,
    }
    impl JtagOps for FakeJtag {
        fn set_tck(&mut self, period_ns: u32) -> Result<u32, HandlerError> {
            if self.fail {
                return Err(HandlerError::new("tck failed"));
            }
            self.period = period_ns;
            Ok(period_ns)
        }
        fn shift_tms_tdi(
            &mut self,
            _bit_count: u32,
            _tms: &[u8],
            tdi: &[u8],
            tdo: &mut [u8],
        ) -> Result<(), HandlerError> {
            if self.fail {
                return Err(HandlerError::new("shift failed"));
            }
            tdo.copy_from_slice(tdi);
            Ok(())
        }
    }

    struct FakeLocking;
    impl LockingOps for FakeLocking {
        fn lock(&mut self, _timeout_ms: u64) -> Result<(), HandlerError> {
            Ok(())
        }
        fn unlock(&mut self) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct FakeMemory {
        data: Vec<u8>,
    }
    impl MemoryOps for FakeMemory {
        fn mrd(&mut self, _flags: u32, addr: u64, out: &mut [u8]) -> Result<(), HandlerError> {
            let addr = addr as usize;
            out.copy_from_slice(&self.data[addr..addr + out.len()]);
            Ok(())
        }
        fn mwr(&mut self, _flags: u32, addr: u64, data: &[u8]) -> Result<(), HandlerError> {
            let addr = addr as usize;
            self.data[addr..addr + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    /// A stream that yields input in caller-chosen chunks and records every write, so tests
    /// can assert reply framing under fragmented reads.
    struct ChunkedStream {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }
    impl ChunkedStream {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
                written: Vec::new(),
            }
        }
    }
    impl Read for ChunkedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }
    impl Write for ChunkedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn bare_binding<'a>(core: &'a mut dyn CoreOps) -> Binding<'a> {
        Binding {
            core,
            jtag: None,
            locking: None,
            state_aware: None,
            memory: None,
            dpc: None,
            idcode: None,
        }
    }

    #[test]
    fn getinfo_reports_version_and_buffer_size() {
        let mut core = FakeCore;
        let binding = bare_binding(&mut core);
        let mut session = Session::new(binding);
        let mut stream = ChunkedStream::new(vec![b"getinfo:".to_vec()]);
        let err = session.serve(&mut stream).unwrap_err();
        assert!(matches!(err, ProtocolError::PeerClosed));
        assert_eq!(stream.written, b"xvcServer_v1.1:10000\n".to_vec());
    }

    #[test]
    fn capabilities_lists_only_negotiated_features() {
        let mut core = FakeCore;
        let mut locking = FakeLocking;
        let binding = Binding {
            core: &mut core,
            jtag: None,
            locking: Some(&mut locking),
            state_aware: None,
            memory: None,
            dpc: None,
            idcode: None,
        };
        let mut session = Session::new(binding);
        let mut stream = ChunkedStream::new(vec![b"capabilities:".to_vec()]);
        let _ = session.serve(&mut stream);
        let mut reply = Vec::new();
        uleb128::encode("locking,status".len() as u64, &mut reply);
        reply.extend_from_slice(b"locking,status");
        assert_eq!(stream.written, reply);
    }

    #[test]
    fn fragmented_reads_produce_the_same_reply_as_one_shot() {
        let mut core = FakeCore;
        let binding = bare_binding(&mut core);
        let mut session = Session::new(binding);
        let mut fragmented = ChunkedStream::new(vec![b"geti".to_vec(), b"nfo:".to_vec()]);
        let _ = session.serve(&mut fragmented);

        let mut core2 = FakeCore;
        let binding2 = bare_binding(&mut core2);
        let mut session2 = Session::new(binding2);
        let mut whole = ChunkedStream::new(vec![b"getinfo:".to_vec()]);
        let _ = session2.serve(&mut whole);

        assert_eq!(fragmented.written, whole.written);
    }

    #[test]
    fn unsupported_verb_is_a_protocol_error() {
        let mut core = FakeCore;
        let binding = bare_binding(&mut core);
        let mut session = Session::new(binding);
        let mut stream = ChunkedStream::new(vec![b"lock:\x05".to_vec()]);
        let err = session.serve(&mut stream).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownVerb(_)));
    }

    #[test]
    fn settck_failure_sets_pending_error_retrieved_via_error_verb() {
        let mut core = FakeCore;
        let mut jtag = FakeJtag {
            period: 0,
            fail: true,
        };
        let binding = Binding {
            core: &mut core,
            jtag: Some(&mut jtag),
            locking: None,
            state_aware: None,
            memory: None,
            dpc: None,
            idcode: None,
        };
        let mut session = Session::new(binding);
        let mut request = b"settck:".to_vec();
        request.extend_from_slice(&1000u32.to_le_bytes());
        request.extend_from_slice(b"error:");
        let mut stream = ChunkedStream::new(vec![request]);
        let _ = session.serve(&mut stream);

        let mut expected = 1000u32.to_le_bytes().to_vec();
        let message = b"tck failed";
        uleb128::encode(message.len() as u64, &mut expected);
        expected.extend_from_slice(message);
        assert_eq!(stream.written, expected);
        assert!(session.pending_error.is_empty());
    }

    #[test]
    fn mwr_then_mrd_round_trips_through_memory_binding() {
        let mut core = FakeCore;
        let mut memory = FakeMemory { data: vec![0; 16] };
        let binding = Binding {
            core: &mut core,
            jtag: None,
            locking: None,
            state_aware: None,
            memory: Some(&mut memory),
            dpc: None,
            idcode: None,
        };
        let mut session = Session::new(binding);

        let mut mwr = b"mwr:".to_vec();
        uleb128::encode(0, &mut mwr); // flags
        uleb128::encode(4, &mut mwr); // addr
        uleb128::encode(4, &mut mwr); // num_bytes
        mwr.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut mrd = b"mrd:".to_vec();
        uleb128::encode(0, &mut mrd);
        uleb128::encode(4, &mut mrd);
        uleb128::encode(4, &mut mrd);

        let mut request = mwr;
        request.extend_from_slice(&mrd);
        let mut stream = ChunkedStream::new(vec![request]);
        let _ = session.serve(&mut stream);

        // mwr: status byte(0) ; mrd: 4 data bytes + status byte(0)
        assert_eq!(stream.written, vec![0, 0xAA, 0xBB, 0xCC, 0xDD, 0]);
    }
}
