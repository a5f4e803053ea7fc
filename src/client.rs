use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{
    Capabilities, CapabilityTable, DeviceDetails, DeviceIdentity, SessionState,
};
use crate::chord::Chord;
use crate::framing::{LineDecoder, encode_line};
use crate::protocol::{ProtocolError, UNKNOWN_COMMAND, encode_command, parse_reply};
#[cfg(feature = "serial")]
use crate::transport::serial::{SerialConfig, SerialTransport};
use crate::transport::{DEFAULT_TIMEOUT, Transport, TransportError};

/// Settings read by [`DeviceSession::diagnostics`].
pub const DIAGNOSTIC_SETTINGS: [u16; 3] = [0x10, 0x20, 0x30];

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("VERSION failed: {0}")]
    Version(#[source] CommandError),
    #[error("VERSION reply carried no version")]
    MissingVersion,
    #[error("ID failed: {0}")]
    Identity(#[source] CommandError),
    #[error("ID reply is incomplete: {tokens:?}")]
    IncompleteIdentity { tokens: Vec<String> },
}

/// Composite setting address: `setting_id + profile * 256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SettingId(u32);

impl SettingId {
    pub fn new(profile: u16, setting_id: u16) -> Self {
        Self(u32::from(setting_id) + u32::from(profile) * 0x100)
    }

    pub fn composite(self) -> u32 {
        self.0
    }

    /// Uppercase hex form used on the wire.
    pub fn to_hex(self) -> String {
        format!("{:X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Setting {
    pub id: SettingId,
    /// Present only when the device reported success.
    pub value: Option<i64>,
}

/// Snapshot of the connection and whatever the handshake established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub version: Option<String>,
    pub identity: Option<DeviceIdentity>,
    pub capabilities: Option<Capabilities>,
    pub is_connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub version: Option<String>,
    pub identity: Option<String>,
    pub chord_count: u32,
    pub ram_available: Option<u32>,
    /// Profile 0 settings that answered, keyed as `0x10`.
    pub settings: BTreeMap<String, i64>,
    pub sample_chord: Option<Chord>,
}

/// Client session over a line-oriented command transport.
///
/// One command is in flight at a time. Everything above the transport degrades
/// to an empty or sentinel result instead of failing; the `try_*` and
/// [`DeviceSession::handshake`] variants expose the underlying error.
pub struct DeviceSession<T: Transport> {
    io: Option<T>,
    decoder: LineDecoder,
    read_buffer: Vec<u8>,
    default_timeout: Duration,
    table: CapabilityTable,
    state: SessionState,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(io: T) -> Self {
        Self::with_table(io, CapabilityTable::default())
    }

    pub fn with_table(io: T, table: CapabilityTable) -> Self {
        Self {
            io: Some(io),
            decoder: LineDecoder::new(),
            read_buffer: vec![0; 64],
            default_timeout: DEFAULT_TIMEOUT,
            table,
            state: SessionState::Uninitialized,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    pub fn transport(&self) -> Option<&T> {
        self.io.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.io.is_some()
    }

    /// Releases the transport. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.io.take().is_some() {
            self.decoder.clear();
            info!("connection closed");
        }
    }

    /// Takes the transport back, leaving the session closed.
    pub fn into_inner(mut self) -> Option<T> {
        self.io.take()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn version(&self) -> Option<&str> {
        self.state.version()
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.state.details().map(|details| &details.identity)
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.state.details().map(|details| details.capabilities)
    }

    pub fn key_count(&self) -> Option<u16> {
        self.capabilities().map(|caps| caps.key_count)
    }

    pub fn layer_count(&self) -> Option<u8> {
        self.capabilities().map(|caps| caps.layer_count)
    }

    pub fn profile_count(&self) -> Option<u8> {
        self.capabilities().map(|caps| caps.profile_count)
    }

    /// Writes `command` followed by CRLF and flushes.
    pub fn send_raw(&mut self, command: &str) -> Result<(), TransportError> {
        let io = self.io.as_mut().ok_or(TransportError::Closed)?;
        debug!(%command, "sending");
        io.write_all(&encode_line(command))?;
        io.flush()?;
        Ok(())
    }

    /// Reads one non-blank line.
    ///
    /// `None` waits until a line arrives or the connection fails. On timeout the
    /// unterminated bytes read so far are dropped. The transport timeout is
    /// reset to the session default before returning.
    pub fn read_line(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, TransportError> {
        let default_timeout = self.default_timeout;
        let io = self.io.as_mut().ok_or(TransportError::Closed)?;
        let mut io = TimeoutGuard {
            io,
            restore: default_timeout,
        };
        // A deadline past what `Instant` can represent waits indefinitely.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            if let Some(line) = self.decoder.next_line() {
                debug!(%line, "received");
                return Ok(Some(line));
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        if self.decoder.has_partial() {
                            debug!("dropping unterminated line after timeout");
                        }
                        self.decoder.discard_partial();
                        return Ok(None);
                    }
                    remaining
                }
                None => default_timeout,
            };
            io.set_read_timeout(wait)?;

            match io.read(&mut self.read_buffer) {
                Ok(0) => {
                    return Err(TransportError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "Transport reached EOF",
                    )));
                }
                Ok(n) => self.decoder.push(&self.read_buffer[..n]),
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Sends `parts` as one request and returns the reply payload, or why there is none.
    pub fn try_command<S: AsRef<str>>(
        &mut self,
        parts: &[S],
        timeout: Duration,
    ) -> Result<Vec<String>, CommandError> {
        let command = encode_command(parts);
        self.discard_stale_input();
        self.send_raw(&command)?;

        let line = self
            .read_line(Some(timeout))?
            .ok_or(CommandError::Timeout(timeout))?;
        Ok(parse_reply(parts, &line)?)
    }

    /// Like [`DeviceSession::try_command`], but every failure becomes an empty payload.
    pub fn send_command<S: AsRef<str>>(&mut self, parts: &[S], timeout: Duration) -> Vec<String> {
        match self.try_command(parts, timeout) {
            Ok(payload) => payload,
            Err(err) => {
                let command = encode_command(parts);
                match &err {
                    CommandError::Timeout(_) => debug!(%command, error = %err, "command failed"),
                    _ => warn!(%command, error = %err, "command failed"),
                }
                Vec::new()
            }
        }
    }

    /// [`DeviceSession::send_command`] with the session's default timeout.
    pub fn command<S: AsRef<str>>(&mut self, parts: &[S]) -> Vec<String> {
        let timeout = self.default_timeout;
        self.send_command(parts, timeout)
    }

    /// Runs the `VERSION`/`ID` handshake. Failures are logged and reported as `false`.
    pub fn init(&mut self) -> bool {
        match self.handshake() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "initialization failed");
                false
            }
        }
    }

    /// Runs the `VERSION`/`ID` handshake.
    ///
    /// Any previous handshake result is discarded first. A failed `VERSION`
    /// leaves the session uninitialized and a failed `ID` leaves it at
    /// [`SessionState::VersionFetched`]; capabilities are only available once
    /// both succeed.
    pub fn handshake(&mut self) -> Result<(), InitError> {
        self.state = SessionState::Uninitialized;
        let timeout = self.default_timeout;

        let version = self
            .try_command(&["VERSION"], timeout)
            .map_err(InitError::Version)?;
        if version.is_empty() {
            return Err(InitError::MissingVersion);
        }
        self.state = SessionState::version_fetched(version.join(" "));

        let tokens = self
            .try_command(&["ID"], timeout)
            .map_err(InitError::Identity)?;
        let identity = DeviceIdentity::from_tokens(&tokens)
            .ok_or_else(|| InitError::IncompleteIdentity { tokens })?;

        self.state = std::mem::take(&mut self.state).identified(identity, &self.table);
        if let Some(DeviceDetails {
            version,
            identity,
            capabilities,
        }) = self.state.details()
        {
            info!(
                %version,
                %identity,
                key_count = capabilities.key_count,
                layer_count = capabilities.layer_count,
                profile_count = capabilities.profile_count,
                "device initialized"
            );
        }
        Ok(())
    }

    /// Number of chords stored on the device, 0 when unknown.
    pub fn chord_count(&mut self) -> u32 {
        self.command(&["CML", "C0"])
            .first()
            .and_then(|count| count.parse().ok())
            .unwrap_or(0)
    }

    /// Free RAM in bytes, if the firmware reports it.
    pub fn ram_available(&mut self) -> Option<u32> {
        self.command(&["RAM"])
            .first()
            .filter(|bytes| bytes.as_str() != UNKNOWN_COMMAND)
            .and_then(|bytes| bytes.parse().ok())
    }

    pub fn read_setting(&mut self, profile: u16, setting_id: u16) -> Setting {
        let id = SettingId::new(profile, setting_id);
        let hex = id.to_hex();
        let payload = self.command(&["VAR", "B1", hex.as_str()]);

        let value = match payload.as_slice() {
            [value, status, ..] if status == "0" => value.parse().ok(),
            _ => None,
        };
        Setting { id, value }
    }

    pub fn setting(&mut self, profile: u16, setting_id: u16) -> Option<i64> {
        self.read_setting(profile, setting_id).value
    }

    /// Chord at `index`, or [`Chord::empty`] when the device returns nothing usable.
    pub fn chord(&mut self, index: u32) -> Chord {
        let index_arg = index.to_string();
        let payload = self.command(&["CML", "C1", index_arg.as_str()]);
        Chord::from_tokens(index, &payload)
    }

    /// Asks for the key currently pressed.
    ///
    /// With `timeout` of `None` this blocks until the device answers or the
    /// connection fails.
    pub fn query_key(&mut self, timeout: Option<Duration>) -> Option<u32> {
        const PARTS: [&str; 2] = ["QRY", "KEY"];

        self.discard_stale_input();
        if let Err(err) = self.send_raw(&encode_command(&PARTS)) {
            warn!(error = %err, "key query failed");
            return None;
        }

        let line = match self.read_line(timeout) {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "key query failed");
                return None;
            }
        };

        parse_reply(&PARTS, &line)
            .ok()?
            .first()
            .and_then(|code| code.parse().ok())
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            port: self.io.as_ref().and_then(|io| io.name()),
            baud_rate: self.io.as_ref().and_then(|io| io.baud_rate()),
            version: self.version().map(str::to_string),
            identity: self.identity().cloned(),
            capabilities: self.capabilities(),
            is_connected: self.is_connected(),
        }
    }

    /// Exercises the read-only commands and collects what answered.
    pub fn diagnostics(&mut self) -> DiagnosticsReport {
        let chord_count = self.chord_count();
        let ram_available = self.ram_available();

        let settings: BTreeMap<String, i64> = DIAGNOSTIC_SETTINGS
            .iter()
            .filter_map(|&setting_id| {
                self.setting(0, setting_id)
                    .map(|value| (format!("0x{setting_id:02X}"), value))
            })
            .collect();

        let sample_chord = (chord_count > 0).then(|| self.chord(0));

        DiagnosticsReport {
            version: self.version().map(str::to_string),
            identity: self.identity().map(ToString::to_string),
            chord_count,
            ram_available,
            settings,
            sample_chord,
        }
    }

    /// Drops input left over from earlier requests so it can't answer the next one.
    fn discard_stale_input(&mut self) {
        let dropped = self.decoder.clear();
        if dropped > 0 {
            debug!(dropped, "discarding stale lines");
        }
        if let Some(io) = self.io.as_mut() {
            if let Err(err) = io.clear_input() {
                debug!(error = %err, "could not clear transport input");
            }
        }
    }
}

impl<T: Transport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Restores the read timeout when a read finishes, however it finishes.
struct TimeoutGuard<'a, T: Transport> {
    io: &'a mut T,
    restore: Duration,
}

impl<T: Transport> Deref for TimeoutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.io
    }
}

impl<T: Transport> DerefMut for TimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.io
    }
}

impl<T: Transport> Drop for TimeoutGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.io.set_read_timeout(self.restore) {
            warn!(error = %err, "failed to restore read timeout");
        }
    }
}

#[cfg(feature = "serial")]
impl DeviceSession<SerialTransport> {
    pub fn open_serial(path: &str) -> Result<Self, TransportError> {
        Self::open_serial_with(&SerialConfig::new(path))
    }

    pub fn open_serial_with(config: &SerialConfig) -> Result<Self, TransportError> {
        let mut session = Self::new(SerialTransport::open_with(config)?);
        session.set_default_timeout(config.timeout);
        Ok(session)
    }
}
