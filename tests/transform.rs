use mania_rate::{
    document::BeatmapDocument,
    hit_object::HitObjectKind,
    summary::{BeatmapSummary, break_periods},
    timing::TimingPoint,
    transform::{
        NormalizeOptions, OffsetScope, apply_offset, apply_offset_to_document,
        normalize_scroll_velocity, rate::scale_timing_points, scale_document,
    },
};
use pretty_assertions::assert_eq;

const TWO_TEMPO: &str = include_str!("files/two_tempo_4k.osu");

fn document() -> BeatmapDocument {
    BeatmapDocument::parse(TWO_TEMPO)
        .expect("must be parsed")
        .document
}

#[test]
fn one_and_a_half_times_faster() {
    let scaled = scale_document(&document(), 1.5).expect("rate in range");
    assert!(scaled.warnings.is_empty());
    let document = scaled.document;

    let points = document.timing_points().points;
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].time, 0.0);
    assert!((points[0].beat_length - 333.333).abs() < 1e-3);
    assert_eq!(points[1].time, 3333.0);
    assert_eq!(points[1].sv_multiplier(), Some(2.0));
    assert_eq!(points[2].time, 6666.0);
    assert!((points[2].beat_length - 266.667).abs() < 1e-3);
    assert!((points[0].bpm().unwrap() - 180.0).abs() < 1e-9);
    assert!((points[2].bpm().unwrap() - 225.0).abs() < 1e-9);

    let objects = document.hit_objects().objects;
    assert_eq!(
        objects.iter().map(|o| o.time).collect::<Vec<_>>(),
        vec![1000, 2000, 6000, 8000, 10000]
    );
    assert_eq!(objects[1].kind, HitObjectKind::Hold { end_time: 3000 });
    assert_eq!(objects[4].kind, HitObjectKind::Hold { end_time: 10666 });

    assert_eq!(document.preview_time(), Some(3000));
    assert_eq!(document.get("Editor", "Bookmarks"), Some("1000,8000"));
    let breaks = break_periods(&document);
    assert_eq!((breaks[0].start, breaks[0].end), (3000, 5000));

    assert_eq!(document.overall_difficulty(), Some(8.0));
    assert_eq!(document.get("Metadata", "Tags"), Some("test mania"));
}

#[test]
fn scaling_keeps_the_section_layout() {
    let text = scale_document(&document(), 1.5)
        .expect("rate in range")
        .document
        .to_osu_string();
    assert!(text.contains(
        "[HitObjects]\n64,192,1000,1,0,0:0:0:0:\n192,192,2000,128,0,3000:0:0:0:0:\n"
    ));
    assert!(text.contains("//Break Periods\n2,3000,5000\n//Storyboard Layer 0 (Background)\n\n[TimingPoints]"));
    assert!(text.contains("0,0,\"bg.jpg\",0,0"));
}

#[test]
fn out_of_range_rates_are_rejected() {
    assert!(scale_document(&document(), 0.05).is_err());
    assert!(scale_document(&document(), 5.5).is_err());
    assert!(scale_document(&document(), f64::INFINITY).is_err());
}

#[test]
fn rate_then_inverse_stays_within_a_millisecond() {
    let points = (0..2000)
        .map(|index| TimingPoint::uninherited(f64::from(index * 7), 300.0 + f64::from(index)))
        .collect::<Vec<_>>();
    for rate in [0.5, 0.75, 0.8, 1.0, 1.1, 1.25, 1.5, 2.0] {
        let back = scale_timing_points(&scale_timing_points(&points, rate), 1.0 / rate);
        for (original, restored) in points.iter().zip(&back) {
            assert!(
                (original.time - restored.time).abs() <= 1.0,
                "rate {rate}: {} became {}",
                original.time,
                restored.time
            );
            assert!((original.beat_length - restored.beat_length).abs() < 1e-9);
        }
    }
}

#[test]
fn offset_is_exactly_invertible() {
    let points = document().timing_points().points;
    for offset in [-250, 0, 1, 37, 10_000] {
        assert_eq!(apply_offset(&apply_offset(&points, offset), -offset), points);
    }
}

#[test]
fn offset_scopes() {
    let mut timing_only = document();
    let warnings = apply_offset_to_document(&mut timing_only, 25, OffsetScope::TimingOnly);
    assert!(warnings.is_empty());
    assert_eq!(timing_only.timing_points().points[2].time, 10025.0);
    assert_eq!(timing_only.hit_objects().objects[0].time, 1500);

    let mut both = document();
    apply_offset_to_document(&mut both, -25, OffsetScope::TimingAndNotes);
    assert_eq!(both.timing_points().points[0].time, -25.0);
    let objects = both.hit_objects().objects;
    assert_eq!(objects[0].time, 1475);
    assert_eq!(objects[4].kind, HitObjectKind::Hold { end_time: 15975 });
}

#[test]
fn normalizing_a_single_tempo_map_changes_nothing() {
    let points = vec![
        TimingPoint::uninherited(100.0, 500.0),
        TimingPoint::inherited(2000.0, 1.5),
        TimingPoint::inherited(4000.0, 0.75),
    ];
    let output = normalize_scroll_velocity(&points, Some(9000.0), NormalizeOptions::default());
    assert_eq!(output.points, points);
    assert_eq!(output.removed_inherited, 0);
    assert_eq!(output.dominant_bpm, Some(120.0));
}

#[test]
fn normalizing_the_fixture() {
    let document = document();
    let summary = BeatmapSummary::of_document(&document);
    let map_end = summary.objects.last_end_time.map(f64::from);
    let output = normalize_scroll_velocity(
        &document.timing_points().points,
        map_end,
        NormalizeOptions::default(),
    );
    assert_eq!(output.dominant_bpm, Some(120.0));
    let inherited = output
        .points
        .iter()
        .filter_map(|p| Some((p.time, p.sv_multiplier()?)))
        .collect::<Vec<_>>();
    assert_eq!(inherited, vec![(0.0, 1.0), (5000.0, 2.0), (10000.0, 0.8)]);
}
