//! Integration tests: hand-assembled SMF byte streams and full
//! record → write → read → playback round trips.

use tw_formats::{
    Division, MidiFile, MidiFilePlayer, MidiFileRecorder, TrackEvent, DEFAULT_TEMPO_MICROS,
};

/// Format-0 file with one track, assembled byte-by-byte.
fn raw_file(track_payload: &[u8], division: u16) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes()); // format
    bytes.extend_from_slice(&1u16.to_be_bytes()); // tracks
    bytes.extend_from_slice(&division.to_be_bytes());
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track_payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(track_payload);
    bytes
}

#[test]
fn running_status_fixture_decodes_two_notes() {
    // delta 0, note-on ch0 note 60 vel 64; delta 96, running-status
    // note 60 vel 0 (a release by the velocity-zero convention)
    let payload = [
        0x00, 0x90, 60, 64, //
        0x60, 60, 0, //
        0x00, 0xFF, 0x2F, 0x00,
    ];
    let file = MidiFile::read(&mut raw_file(&payload, 96).as_slice()).unwrap();

    let mut track = TrackEvent::new(file.division);
    let mut chunk = file.tracks[0].clone();
    track.read_all(&mut chunk).unwrap();

    let first = track.pop_note().unwrap();
    let second = track.pop_note().unwrap();
    assert!(track.pop_note().is_none());

    assert!(first.pressed);
    assert!(!second.pressed);
    assert_eq!(second.channel, first.channel);
    assert_eq!(second.note, 60);
    // 96 ticks at 96 tpq = one quarter = 0.5 s at the default tempo
    assert!((second.time_seconds - first.time_seconds - 0.5).abs() < 1e-9);
}

#[test]
fn record_write_read_playback_round_trip() {
    const TPQ: u16 = 24;

    let mut recorder = MidiFileRecorder::new(Division::TicksPerQuarter(TPQ));
    recorder.press(0, 60, 100);
    recorder.update_midi_clock(480.0);
    recorder.release(0, 60, 0);

    let mut bytes = Vec::new();
    recorder.write_to(&mut bytes).unwrap();

    let mut player = MidiFilePlayer::new();
    player.read(&mut bytes.as_slice()).unwrap();

    let notes = player.notes();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].pressed);
    assert!(!notes[1].pressed);

    let seconds_per_tick = DEFAULT_TEMPO_MICROS as f64 * 1e-6 / TPQ as f64;
    let expected = 480.0 * seconds_per_tick;
    assert!((notes[1].time_seconds - notes[0].time_seconds - expected).abs() < 1e-9);

    // And the polling surface replays them in order
    player.play();
    assert!(player.check_time().unwrap().pressed);
    assert!(player.check_time().is_none());
    player.update(expected);
    assert!(!player.check_time().unwrap().pressed);
    assert!(player.is_finished());
}

#[test]
fn recorded_file_survives_disk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.mid");

    let mut recorder = MidiFileRecorder::new(Division::TicksPerQuarter(480));
    recorder.press(2, 64, 90);
    recorder.update_midi_clock(240.0);
    recorder.release(2, 64, 0);
    recorder.update_midi_clock(480.0);
    recorder.press(2, 67, 90);
    recorder.write(&path).unwrap();

    let mut player = MidiFilePlayer::new();
    player.open(&path).unwrap();
    // Second press was still held: finalize force-released it
    assert_eq!(player.notes().len(), 4);
    assert!(player
        .notes()
        .iter()
        .all(|n| n.channel == 2));
}

#[test]
fn smpte_division_file_parses() {
    let payload = [
        0x00, 0x90, 60, 100, //
        0xE8, 0x00, 0x80, 60, 0, // delta = 0x3400 ticks... (VLQ 0xE8 0x00)
        0x00, 0xFF, 0x2F, 0x00,
    ];
    // 25 fps, 40 ticks/frame: -25 is 0xE7 in the high byte
    let division_raw = ((25u8.wrapping_neg() as u16) << 8) | 40;
    let file = MidiFile::read(&mut raw_file(&payload, division_raw).as_slice()).unwrap();
    assert_eq!(
        file.division,
        Division::Smpte {
            frames_per_second: 25,
            ticks_per_frame: 40
        }
    );

    let mut player = MidiFilePlayer::new();
    player.load(&file).unwrap();
    assert_eq!(player.notes().len(), 2);
    // 0xE8 0x00 decodes to 0x3400 = 13312 ticks at 1000 ticks/s
    assert!((player.duration_seconds() - 13.312).abs() < 1e-9);
}
