use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chara_serial_api::transport::mock::MockTransport;
use chara_serial_api::{
    CapabilityGate, CapabilityTable, DeviceSession, InitError, SessionState,
};

const SHORT: Duration = Duration::from_millis(50);

fn session(mock: MockTransport) -> DeviceSession<MockTransport> {
    let mut session = DeviceSession::new(mock);
    session.set_default_timeout(SHORT);
    session
}

fn charachorder_one(version: &str) -> MockTransport {
    MockTransport::new()
        .reply("VERSION", &format!("VERSION {version}"))
        .reply("ID", "ID CHARACHORDER ONE M0")
}

#[test]
fn init_resolves_capabilities() {
    let mut s = session(charachorder_one("2.2.0-beta.20"));
    assert!(s.init());

    assert_eq!(s.version(), Some("2.2.0-beta.20"));
    assert_eq!(s.identity().unwrap().chipset, "M0");
    assert_eq!(s.key_count(), Some(90));
    assert_eq!(s.profile_count(), Some(2));
    assert_eq!(s.layer_count(), Some(3));
    assert_eq!(s.transport().unwrap().written(), ["VERSION", "ID"]);
}

#[test]
fn old_firmware_keeps_conservative_counts() {
    let mut s = session(
        MockTransport::new()
            .reply("VERSION", "VERSION 1.1.3")
            .reply("ID", "ID CHARACHORDER LITE S2"),
    );
    assert!(s.init());
    assert_eq!(s.key_count(), Some(67));
    assert_eq!(s.profile_count(), Some(1));
    assert_eq!(s.layer_count(), Some(3));
}

#[test]
fn failed_version_leaves_session_uninitialized() {
    let mut s = session(MockTransport::new().reply("VERSION", "UKN"));
    assert!(matches!(s.handshake(), Err(InitError::Version(_))));
    assert_eq!(s.state(), &SessionState::Uninitialized);
    assert_eq!(s.key_count(), None);
    // ID is never attempted.
    assert_eq!(s.transport().unwrap().written(), ["VERSION"]);
}

#[test]
fn short_identity_stops_after_version() {
    let mut s = session(
        MockTransport::new()
            .reply("VERSION", "VERSION 2.2.0")
            .reply("ID", "ID CHARACHORDER ONE"),
    );

    let err = s.handshake().unwrap_err();
    assert!(matches!(err, InitError::IncompleteIdentity { ref tokens } if tokens.len() == 2));
    assert_eq!(s.version(), Some("2.2.0"));
    assert!(s.capabilities().is_none());
    assert!(s.identity().is_none());
}

#[test]
fn failed_reinit_does_not_keep_previous_capabilities() {
    let mut s = session(charachorder_one("2.2.0"));
    assert!(s.init());
    assert!(s.capabilities().is_some());

    assert!(!s.init());
    assert!(s.capabilities().is_none());
    assert_eq!(s.state(), &SessionState::Uninitialized);
}

#[test]
fn injected_table_drives_capabilities() {
    let table = CapabilityTable {
        key_counts: BTreeMap::from([("ONE".to_string(), 18)]),
        default_key_count: 10,
        limited_chipsets: Vec::new(),
        profiles: CapabilityGate {
            min_version: "1.0".to_string(),
            fallback: 1,
            limited: 1,
            full: 8,
        },
        layers: CapabilityGate {
            min_version: "9.0".to_string(),
            fallback: 2,
            limited: 2,
            full: 6,
        },
    };
    let mut s = DeviceSession::with_table(charachorder_one("2.0.0"), table);
    s.set_default_timeout(SHORT);

    assert!(s.init());
    assert_eq!(s.key_count(), Some(18));
    assert_eq!(s.profile_count(), Some(8));
    assert_eq!(s.layer_count(), Some(2));
}

#[test]
fn unterminated_reply_times_out_and_session_recovers() {
    let mut s = session(
        MockTransport::new()
            .reply_raw("VERSION", "VERSION 2.2.0")
            .reply("ID", "ID CHARACHORDER ONE M0"),
    );

    let started = Instant::now();
    assert!(s.send_command(&["VERSION"], Duration::from_millis(40)).is_empty());
    assert!(started.elapsed() >= Duration::from_millis(40));

    assert_eq!(s.command(&["ID"]), vec!["CHARACHORDER", "ONE", "M0"]);
}

#[test]
fn setting_reads_composite_id() {
    let mut s = session(
        MockTransport::new()
            .reply("VAR B1 10", "VAR B1 5 0")
            .reply("VAR B1 10", "VAR B1 5 1")
            .reply("VAR B1 241", "VAR B1 1 0"),
    );

    assert_eq!(s.setting(0, 0x10), Some(5));
    assert_eq!(s.setting(0, 0x10), None);
    assert_eq!(s.setting(2, 0x41), Some(1));
}

#[test]
fn diagnostics_collect_answers() {
    let mock = charachorder_one("2.2.0")
        .reply("CML C0", "CML C0 2")
        .reply("RAM", "RAM 2048")
        .reply("VAR B1 10", "VAR B1 1 0")
        .reply("VAR B1 20", "VAR B1 0 2")
        .reply("VAR B1 30", "VAR B1 25 0")
        .reply("CML C1 0", "CML C1 402 0061");
    let mut s = session(mock);
    assert!(s.init());

    let report = s.diagnostics();
    assert_eq!(report.version.as_deref(), Some("2.2.0"));
    assert_eq!(report.identity.as_deref(), Some("CHARACHORDER ONE M0"));
    assert_eq!(report.chord_count, 2);
    assert_eq!(report.ram_available, Some(2048));
    assert_eq!(
        report.settings,
        BTreeMap::from([("0x10".to_string(), 1), ("0x30".to_string(), 25)])
    );
    let chord = report.sample_chord.as_ref().unwrap();
    assert_eq!(chord.actions, vec![1, 2]);
    assert_eq!(chord.phrase, vec![0x61]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sample_chord"]["phrase_hex"], "0061");
}

#[test]
fn device_info_reflects_connection_state() {
    let mut s = session(charachorder_one("2.2.0"));
    assert!(s.init());

    let info = s.device_info();
    assert_eq!(info.port.as_deref(), Some("mock"));
    assert!(info.is_connected);
    assert_eq!(info.capabilities.unwrap().layer_count, 3);

    s.close();
    let info = s.device_info();
    assert!(!info.is_connected);
    assert_eq!(info.port, None);
    assert_eq!(s.chord_count(), 0);
    assert_eq!(s.chord(0).phrase_hex, "");
}

#[test]
fn into_inner_returns_transport() {
    let mut s = session(MockTransport::new().reply("RAM", "RAM 10"));
    assert_eq!(s.ram_available(), Some(10));

    let mock = s.into_inner().unwrap();
    assert_eq!(mock.written(), ["RAM"]);
}
