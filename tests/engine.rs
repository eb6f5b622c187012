use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
};

use mania_rate::{
    document::BeatmapDocument,
    engine::{
        AudioStretcher, EngineConfig, EngineError, Progress, RateEngine, RateRange, RateRequest,
        StretchError, StretchRequest, beatmap_file_name, rate_document,
    },
    hash::ContentHash,
};
use pretty_assertions::assert_eq;

const TWO_TEMPO: &str = include_str!("files/two_tempo_4k.osu");
const SOURCE_NAME: &str = "Test Artist - Test Song (mapper) [Hard].osu";

/// Copies the input audio, optionally failing for some rates.
#[derive(Default)]
struct FakeStretcher {
    unavailable: bool,
    failing_rates: Vec<f64>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(f64, bool)>>,
}

impl AudioStretcher for FakeStretcher {
    fn probe(&self) -> Result<(), StretchError> {
        if self.unavailable {
            return Err(StretchError::Unavailable {
                program: "fake".into(),
                reason: "not installed".into(),
            });
        }
        Ok(())
    }

    fn stretch(&self, request: &StretchRequest<'_>) -> Result<(), StretchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((request.rate, request.preserve_pitch));
        if self.failing_rates.contains(&request.rate) {
            return Err(StretchError::Failed {
                status: Some(1),
                stderr: "decoder exploded".into(),
            });
        }
        std::fs::copy(request.input, request.output)?;
        Ok(())
    }
}

fn scratch_map(name: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("mania-rate-engine-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("audio.mp3"), b"not really audio").unwrap();
    let source = dir.join(SOURCE_NAME);
    std::fs::write(&source, TWO_TEMPO).unwrap();
    (dir, source)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn produces_beatmap_and_audio() {
    let (dir, source) = scratch_map("single");
    let engine = RateEngine::new(FakeStretcher::default(), EngineConfig::default());
    let (sender, receiver) = mpsc::channel();

    let output = engine
        .apply_rate(&source, &RateRequest::new(1.5), Some(&sender))
        .unwrap();
    assert_eq!(output.display_name, "Hard 1.5x (180bpm)");
    assert_eq!(
        output.beatmap_path,
        dir.join("Test Artist - Test Song (mapper) [Hard 1.5x (180bpm)].osu")
    );
    assert_eq!(output.audio_path, dir.join("audio_1.5x.mp3"));
    assert!(!output.audio_reused);
    assert_eq!(output.hash, ContentHash::of_file(&output.beatmap_path).unwrap());

    let written = std::fs::read_to_string(&output.beatmap_path).unwrap();
    let document = BeatmapDocument::parse(&written).unwrap().document;
    assert_eq!(document.audio_filename(), Some("audio_1.5x.mp3"));
    assert_eq!(document.version(), Some("Hard 1.5x (180bpm)"));
    assert_eq!(document.beatmap_id(), Some(0));
    assert_eq!(document.get("Metadata", "Tags"), Some("test mania 1.5x"));
    assert_eq!(document.hit_objects().objects[0].time, 1000);
    assert_eq!(std::fs::read_to_string(&source).unwrap(), TWO_TEMPO);

    drop(sender);
    let events = receiver.iter().collect::<Vec<_>>();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], Progress::Started { rate: 1.5 });
    assert!(matches!(events[1], Progress::AudioReady { reused: false, .. }));
    assert!(matches!(events[2], Progress::Finished { .. }));
}

#[test]
fn unavailable_stretcher_writes_nothing() {
    let (dir, source) = scratch_map("unavailable");
    let before = file_names(&dir);
    let stretcher = FakeStretcher {
        unavailable: true,
        ..FakeStretcher::default()
    };
    let engine = RateEngine::new(stretcher, EngineConfig::default());

    let err = engine
        .apply_rate(&source, &RateRequest::new(1.2), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::DependencyUnavailable { .. }));
    assert_eq!(file_names(&dir), before);
    assert_eq!(engine.stretcher().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn checks_happen_before_any_stretch() {
    let (dir, source) = scratch_map("checks");
    let engine = RateEngine::new(FakeStretcher::default(), EngineConfig::default());

    assert!(matches!(
        engine.apply_rate(&source, &RateRequest::new(7.0), None),
        Err(EngineError::InvalidRate(_))
    ));

    let already_rated = dir.join("Test Artist - Test Song (mapper) [Hard 1.2x].osu");
    std::fs::write(&already_rated, TWO_TEMPO.replace("Version:Hard", "Version:Hard 1.2x")).unwrap();
    let detour = dir
        .join("..")
        .join(dir.file_name().unwrap())
        .join(already_rated.file_name().unwrap());
    let overwrite = RateRequest {
        template: Some("[[name]]".into()),
        ..RateRequest::new(1.2)
    };
    assert!(matches!(
        engine.apply_rate(&detour, &overwrite, None),
        Err(EngineError::WouldOverwriteSource(_))
    ));
    assert_eq!(
        std::fs::read_to_string(&already_rated).unwrap(),
        TWO_TEMPO.replace("Version:Hard", "Version:Hard 1.2x")
    );

    std::fs::remove_file(dir.join("audio.mp3")).unwrap();
    assert!(matches!(
        engine.apply_rate(&source, &RateRequest::new(1.2), None),
        Err(EngineError::MissingAudio(_))
    ));

    std::fs::write(&source, "just some text\n").unwrap();
    assert!(matches!(
        engine.apply_rate(&source, &RateRequest::new(1.2), None),
        Err(EngineError::MalformedDocument(_))
    ));
    assert_eq!(engine.stretcher().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn existing_audio_is_reused() {
    let (_dir, source) = scratch_map("reuse");
    let engine = RateEngine::new(FakeStretcher::default(), EngineConfig::default());
    let first = engine
        .apply_rate(&source, &RateRequest::new(1.3), None)
        .unwrap();
    let second = engine
        .apply_rate(&source, &RateRequest::new(1.3), None)
        .unwrap();
    assert!(!first.audio_reused);
    assert!(second.audio_reused);
    assert_eq!(engine.stretcher().calls.load(Ordering::SeqCst), 1);

    let nightcore = RateRequest {
        preserve_pitch: false,
        ..RateRequest::new(1.3)
    };
    let third = engine.apply_rate(&source, &nightcore, None).unwrap();
    assert_eq!(third.audio_path.file_name().unwrap(), "audio_1.3x_nc.mp3");
    assert_eq!(
        *engine.stretcher().requests.lock().unwrap(),
        vec![(1.3, true), (1.3, false)]
    );
}

#[test]
fn bulk_continues_past_failures() {
    let (dir, source) = scratch_map("bulk");
    let stretcher = FakeStretcher {
        failing_rates: vec![1.2],
        ..FakeStretcher::default()
    };
    let config = EngineConfig {
        workers: 2,
        ..EngineConfig::default()
    };
    let engine = RateEngine::new(stretcher, config);
    let range = RateRange {
        exclude_base_rate: true,
        ..RateRange::new(0.9, 1.2, 0.1)
    };

    let report = engine
        .apply_range(&source, &range, &RateRequest::new(1.0), None)
        .unwrap();
    assert_eq!(
        report.results.iter().map(|r| r.rate).collect::<Vec<_>>(),
        vec![0.9, 1.1, 1.2]
    );
    assert_eq!(report.succeeded().count(), 2);
    let failed = report.failed().collect::<Vec<_>>();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, 1.2);
    assert!(matches!(failed[0].1, EngineError::StretchFailed { status: Some(1), .. }));
    assert!(!report.all_succeeded());
    assert_eq!(report.hashes().len(), 2);

    assert!(dir.join("audio_1.1x.mp3").exists());
    assert!(!dir.join("audio_1.2x.mp3").exists());
    assert!(!dir.join("Test Artist - Test Song (mapper) [Hard 1.2x (144bpm)].osu").exists());
}

#[test]
fn bulk_outputs_never_share_a_path() {
    let (dir, source) = scratch_map("bulk-paths");
    let engine = RateEngine::new(FakeStretcher::default(), EngineConfig::default());
    let range = RateRange::new(1.0, 1.02, 0.005);
    let (sender, receiver) = mpsc::channel();

    for preserve_pitch in [true, false] {
        let request = RateRequest {
            preserve_pitch,
            template: Some("[[name]]".into()),
            ..RateRequest::new(1.0)
        };
        let report = engine
            .apply_range(&source, &range, &request, Some(&sender))
            .unwrap();
        assert!(report.all_succeeded());
    }
    drop(sender);

    let mut finished = receiver
        .iter()
        .filter_map(|event| match event {
            Progress::Finished { path, .. } => Some(path),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(finished.len(), 6);
    finished.sort();
    finished.dedup();
    assert_eq!(finished.len(), 6);
    assert!(finished.contains(&dir.join("Test Artist - Test Song (mapper) [Hard 1.01x].osu")));
    assert!(finished.contains(&dir.join("Test Artist - Test Song (mapper) [Hard 1.01x NC].osu")));
    assert!(dir.join("audio_1.01x.mp3").exists());
    assert!(dir.join("audio_1.01x_nc.mp3").exists());
}

#[test]
fn bulk_rejects_bad_ranges_up_front() {
    let (_dir, source) = scratch_map("bulk-range");
    let engine = RateEngine::new(FakeStretcher::default(), EngineConfig::default());
    assert!(matches!(
        engine.apply_range(&source, &RateRange::new(1.5, 1.0, 0.1), &RateRequest::new(1.0), None),
        Err(EngineError::InvalidRange(_))
    ));
}

#[test]
fn overrides_are_clamped() {
    let document = BeatmapDocument::parse(TWO_TEMPO).unwrap().document;
    let request = RateRequest {
        od_override: Some(12.0),
        hp_override: Some(6.5),
        ..RateRequest::new(1.2)
    };
    let rated = rate_document(&document, &request, "[[name]] [[rate]]x OD[[od]] HP[[hp]]").unwrap();
    assert_eq!(rated.display_name, "Hard 1.2x OD10 HP6.5");
    assert_eq!(rated.document.overall_difficulty(), Some(10.0));
    assert_eq!(rated.document.hp_drain(), Some(6.5));
    assert_eq!(
        beatmap_file_name(&rated.document),
        "Test Artist - Test Song (mapper) [Hard 1.2x OD10 HP6.5].osu"
    );
}

#[test]
fn config_from_json() {
    let config = EngineConfig::from_json(
        r#"{"stretcher_program":"/opt/ffmpeg","stretch_timeout":12.5,"workers":3}"#,
    )
    .unwrap();
    assert_eq!(config.stretcher_program, PathBuf::from("/opt/ffmpeg"));
    assert_eq!(config.stretch_timeout.as_millis(), 12_500);
    assert_eq!(config.workers, 3);
    assert!(config.reuse_existing_audio);
    assert_eq!(config.template, EngineConfig::default().template);

    let err = EngineConfig::from_json(r#"{"workers":"many"}"#).unwrap_err();
    assert!(err.to_string().contains("workers"));
}
