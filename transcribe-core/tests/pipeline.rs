//! Audio to notes to notation and back, end to end.

use std::f32::consts::PI;

use pretty_assertions::assert_eq;
use transcribe_core::{
    analysis::{self, AnalysisEvent},
    notation::{self, Meter, NotationOptions},
    segment, AnalysisConfig, PipelineConfig, SegmentationConfig,
};

const SAMPLE_RATE: u32 = 44_100;

/// Phase-continuous sine melody of `(frequency, seconds)` pairs.
fn melody(parts: &[(f32, f32)]) -> Vec<f32> {
    let mut samples = Vec::new();
    let mut phase = 0.0f32;
    for &(frequency, seconds) in parts {
        let len = (seconds * SAMPLE_RATE as f32) as usize;
        let step = 2.0 * PI * frequency / SAMPLE_RATE as f32;
        for _ in 0..len {
            samples.push(if frequency > 0.0 { 0.5 * phase.sin() } else { 0.0 });
            phase = (phase + step) % (2.0 * PI);
        }
    }
    samples
}

#[test]
fn sine_melody_becomes_three_notes() {
    let samples = melody(&[(220.0, 0.5), (261.63, 0.5), (329.63, 0.5)]);
    let config = PipelineConfig::default();
    config.validate(SAMPLE_RATE).unwrap();

    let track = analysis::analyze(&samples, SAMPLE_RATE, &config.analysis, |_| {});
    let notes = segment::segment(&track, &config.segmentation, &[]);

    assert!(notes.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    assert!(notes
        .iter()
        .all(|n| n.duration() >= config.segmentation.min_note_duration));
    let long: Vec<_> = notes
        .iter()
        .filter(|n| n.duration() > 0.3)
        .map(|n| n.pitch)
        .collect();
    assert_eq!(long, vec![57, 60, 64]);
}

#[test]
fn silence_yields_no_notes_and_a_rest_measure() {
    let samples = vec![0.0; SAMPLE_RATE as usize];
    let config = PipelineConfig::default();
    let track = analysis::analyze(&samples, SAMPLE_RATE, &config.analysis, |_| {});
    assert!(track.frequencies.iter().all(|&f| f == 0.0));

    let notes = segment::segment(&track, &config.segmentation, &[]);
    assert!(notes.is_empty());

    let options = NotationOptions {
        tempo_bpm: Some(120),
        ..NotationOptions::default()
    };
    let text = notation::encode(&notes, &options);
    assert!(text.ends_with("K:C\nz8 |]\n"));
    assert_eq!(
        notation::decode_str(&text),
        Err(transcribe_core::ParseError::NoNotes)
    );
}

#[test]
fn taps_cut_windows_through_the_end_of_the_track() {
    let samples = melody(&[(440.0, 3.0)]);
    let analysis_config = AnalysisConfig::default();
    let track = analysis::analyze(&samples, SAMPLE_RATE, &analysis_config, |_| {});
    let notes = segment::segment(&track, &SegmentationConfig::default(), &[2.5, 0.0, 1.0]);

    let windows: Vec<_> = notes.iter().map(|n| (n.start_time, n.end_time)).collect();
    assert_eq!(windows, vec![(0.0, 1.0), (1.0, 2.5), (2.5, track.duration())]);
    assert!(notes.iter().all(|n| n.pitch == 69));
    let ids: Vec<_> = notes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn worker_result_feeds_the_encoder() {
    let samples = melody(&[(261.63, 1.0), (0.0, 0.25), (392.0, 1.0)]);
    let config = PipelineConfig::default();

    let worker = analysis::spawn_analysis(samples.clone(), SAMPLE_RATE, config.analysis);
    let mut progress = Vec::new();
    let track = loop {
        match worker.events().recv() {
            Ok(AnalysisEvent::Progress(p)) => progress.push(p),
            Ok(AnalysisEvent::Finished(track)) => break track,
            Ok(AnalysisEvent::Cancelled) | Err(_) => panic!("analysis did not finish"),
        }
    };
    assert_eq!(progress.last(), Some(&1.0));
    assert_eq!(
        track,
        analysis::analyze(&samples, SAMPLE_RATE, &config.analysis, |_| {})
    );

    let notes = segment::segment(&track, &config.segmentation, &[]);
    let options = NotationOptions {
        title: "Fifth".to_string(),
        tempo_bpm: Some(60),
        meter: Meter::new(3, 4),
        ..NotationOptions::default()
    };
    let rendering = notation::render(&notes, &options);
    assert!(rendering.text.starts_with("X:1\nT:Fifth\nM:3/4\nL:1/8\nQ:1/4=60\nK:C\n"));

    let decoded = notation::decode_str(&rendering.text).unwrap();
    let pitches: Vec<_> = decoded.notes.iter().map(|n| n.pitch).collect();
    let expected: Vec<_> = notes.iter().map(|n| n.pitch).collect();
    assert_eq!(pitches, expected);
    assert!(pitches.contains(&60) && pitches.contains(&67));
}
