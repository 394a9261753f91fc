//! tonewheel CLI — headless tone generation and MIDI playback.
//!
//! Usage:
//!   tw-cli tone [--freq 440] [--seconds 2] [--wav output.wav]
//!   tw-cli play path/to/file.mid [--wav output.wav]

use std::time::{Duration, Instant};
use std::{env, process};

use tw_master::{note_frequency, AudioEngine, MidiFilePlayer, WavFileRecorder, WavHeader};

const SAMPLE_RATE: u32 = 44_100;
const VOICES: usize = 8;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);
    let wav_path = flag_value(&args, "--wav");

    match command {
        Some("tone") => {
            let freq: f32 = flag_value(&args, "--freq")
                .and_then(|s| s.parse().ok())
                .unwrap_or(440.0);
            let seconds: f32 = flag_value(&args, "--seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(2.0);
            run_tone(freq, seconds, wav_path.as_deref());
        }
        Some("play") => {
            let path = args.get(2).filter(|a| !a.starts_with("--")).unwrap_or_else(|| {
                eprintln!("Usage: tw-cli play <file.mid> [--wav output.wav]");
                process::exit(1);
            });
            run_midi(path, wav_path.as_deref());
        }
        _ => {
            eprintln!("Usage: tw-cli tone [--freq HZ] [--seconds S] [--wav output.wav]");
            eprintln!("       tw-cli play <file.mid> [--wav output.wav]");
            process::exit(1);
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn run_tone(freq: f32, seconds: f32, wav_path: Option<&str>) {
    let mut engine = AudioEngine::new(1, SAMPLE_RATE);
    engine.with_voice(0, |v| {
        v.set_frequency(freq);
        v.play();
    });

    match wav_path {
        Some(path) => {
            println!("Rendering {:.1} s of {} Hz to {}...", seconds, freq, path);
            engine.render_to_wav(path, seconds).unwrap_or_else(|e| {
                eprintln!("Failed to write {}: {}", path, e);
                process::exit(1);
            });
            println!("Done.");
        }
        None => {
            println!("Playing {} Hz for {:.1} s...", freq, seconds);
            engine.start();
            std::thread::sleep(Duration::from_secs_f32(seconds));
            engine.stop();
            println!("Done.");
        }
    }
}

fn run_midi(path: &str, wav_path: Option<&str>) {
    let mut player = MidiFilePlayer::new();
    player.open(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path, e);
        process::exit(1);
    });

    println!("File:     {}", path);
    println!("Notes:    {}", player.notes().len());
    println!("Duration: {:.2} s", player.duration_seconds());

    let mut engine = AudioEngine::new(VOICES, SAMPLE_RATE);
    // Which note each voice currently holds
    let mut held: [Option<u8>; VOICES] = [None; VOICES];

    match wav_path {
        Some(out) => render_midi(&engine, &mut player, &mut held, out),
        None => play_midi(&mut engine, &mut player, &mut held),
    }
}

/// Dispatch every note event that has come due to the voice bank.
fn pump_notes(engine: &AudioEngine, player: &mut MidiFilePlayer, held: &mut [Option<u8>; VOICES]) {
    while let Some(note) = player.check_time() {
        if note.pressed {
            // First free voice; steal voice 0 when all are busy
            let voice = held.iter().position(Option::is_none).unwrap_or(0);
            held[voice] = Some(note.note);
            engine.with_voice(voice, |v| {
                v.set_frequency(note_frequency(note.note));
                v.set_amplitude(note.velocity as f32 / 127.0);
                v.play();
            });
        } else if let Some(voice) = held.iter().position(|h| *h == Some(note.note)) {
            held[voice] = None;
            engine.with_voice(voice, |v| v.pause());
        }
    }
}

fn play_midi(engine: &mut AudioEngine, player: &mut MidiFilePlayer, held: &mut [Option<u8>; VOICES]) {
    engine.start();
    player.play();
    println!("Playing...");

    let started = Instant::now();
    let mut last = started;
    while !player.is_finished() {
        let now = Instant::now();
        player.update(now.duration_since(last).as_secs_f64());
        last = now;
        pump_notes(engine, player, held);
        std::thread::sleep(Duration::from_millis(5));
    }

    // Let the tail of the last note drain
    std::thread::sleep(Duration::from_millis(500));
    engine.stop();
    println!("Done ({:.2} s).", started.elapsed().as_secs_f64());
}

fn render_midi(
    engine: &AudioEngine,
    player: &mut MidiFilePlayer,
    held: &mut [Option<u8>; VOICES],
    out: &str,
) {
    println!("Rendering to {} at {} Hz...", out, SAMPLE_RATE);

    let header = WavHeader::new(2, SAMPLE_RATE, 16);
    let mut recorder = WavFileRecorder::create(out, header).unwrap_or_else(|e| {
        eprintln!("Failed to create {}: {}", out, e);
        process::exit(1);
    });

    let chunk_frames = (SAMPLE_RATE / 100) as usize; // 10 ms steps
    let chunk_seconds = chunk_frames as f64 / SAMPLE_RATE as f64;
    player.play();
    let result = (|| {
        while !player.is_finished() {
            pump_notes(engine, player, held);
            recorder.write_samples(&engine.render_frames(chunk_frames))?;
            player.update(chunk_seconds);
        }
        // Half a second of release tail
        for _ in 0..50 {
            recorder.write_samples(&engine.render_frames(chunk_frames))?;
        }
        recorder.finalize()
    })();

    result.unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", out, e);
        process::exit(1);
    });
    println!("Done ({} frames).", recorder.frame_count());
}
