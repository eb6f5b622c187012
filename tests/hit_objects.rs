use mania_rate::hit_object::{
    HitObject, HitObjectError, HitObjectKind, MAX_KEY_COUNT, column_of, parse_hit_objects,
    summary, validate_round_trip, x_of,
};
use pretty_assertions::assert_eq;

#[test]
fn column_centers_map_back_for_every_key_count() {
    for key_count in 1..=MAX_KEY_COUNT {
        for column in 0..key_count {
            let x = x_of(column, key_count);
            assert_eq!(column_of(x, key_count), column, "{key_count}K column {column}");
        }
    }
}

#[test]
fn canonical_lines_survive_parse_and_write_for_every_key_count() {
    for key_count in 1..=MAX_KEY_COUNT {
        for column in 0..key_count {
            let x = x_of(column, key_count);
            let time = 1000 + i32::from(column) * 125;
            let circle = format!("{x},192,{time},1,0,0:0:0:0:");
            let hold = format!("{x},192,{time},128,2,{}:1:0:0:70:hit.wav", time + 480);

            for line in [circle, hold] {
                let object = HitObject::try_parse(&line, key_count).unwrap();
                assert_eq!(object.column, column, "{key_count}K `{line}`");
                assert_eq!(object.to_osu_line(key_count), line, "{key_count}K");
            }
        }
    }
}

#[test]
fn out_of_range_x_is_clamped() {
    assert_eq!(column_of(-40, 4), 0);
    assert_eq!(column_of(512, 4), 3);
    assert_eq!(column_of(9000, 7), 6);
}

#[test]
fn hold_detection() {
    let by_flag = HitObject::try_parse("448,192,1000,128,0,1500:0:0:0:0:", 4).unwrap();
    assert_eq!(by_flag.kind, HitObjectKind::Hold { end_time: 1500 });
    assert_eq!(by_flag.column, 3);

    let by_parts = HitObject::try_parse("448,192,1000,1,0,1500:0:0:0:0:", 4).unwrap();
    assert_eq!(by_parts.kind, HitObjectKind::Hold { end_time: 1500 });

    let circle = HitObject::try_parse("448,192,1000,1,0,0:0:0:0:", 4).unwrap();
    assert_eq!(circle.kind, HitObjectKind::Circle);
    assert_eq!(circle.hit_sample.as_deref(), Some("0:0:0:0:"));
}

#[test]
fn invalid_objects() {
    assert_eq!(
        HitObject::try_parse("64,192,1000", 4),
        Err(HitObjectError::TooFewFields(3))
    );
    assert_eq!(
        HitObject::try_parse("64,192,1000,12,0,2000", 4),
        Err(HitObjectError::UnsupportedType(12))
    );
    assert_eq!(
        HitObject::try_parse("64,192,1000,128,0,1000:0:0:0:0:", 4),
        Err(HitObjectError::NonPositiveHold {
            time: 1000,
            end_time: 1000
        })
    );
    assert!(matches!(
        HitObject::try_parse("64,192,soon,1,0", 4),
        Err(HitObjectError::InvalidNumber { field: "time", .. })
    ));
}

#[test]
fn serialization_recenters_notes() {
    let object = HitObject::try_parse("100,192,1000,5,2,0:0:0:0:", 4).unwrap();
    assert_eq!(object.to_osu_line(4), "64,192,1000,5,2,0:0:0:0:");

    let hold = HitObject::hold(250, 900, 6);
    assert_eq!(hold.to_osu_line(7), "475,192,250,128,0,900:0:0:0:0:");
}

#[test]
fn round_trip_reports() {
    let report = validate_round_trip("182,192,750,128,0,1200:0:0:0:0:", 7);
    assert!(report.consistent);
    assert_eq!(report.serialized.as_deref(), Some("182,192,750,128,0,1200:0:0:0:0:"));

    let report = validate_round_trip("not,a,note", 7);
    assert!(!report.consistent);
    assert_eq!(report.error, Some(HitObjectError::TooFewFields(3)));
}

#[test]
fn section_parsing_skips_and_sorts() {
    let lines = [
        "448,192,2000,1,0,0:0:0:0:",
        "// comment",
        "",
        "64,192,1000,128,0,1800:0:0:0:0:",
        "192,192,1000,1,0,0:0:0:0:",
        "256,192,1500,2,0,B|300:192,1,70",
    ];
    let output = parse_hit_objects(&lines, 4);
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].line, 6);
    assert_eq!(
        output
            .objects
            .iter()
            .map(|o| (o.time, o.column))
            .collect::<Vec<_>>(),
        vec![(1000, 0), (1000, 1), (2000, 3)]
    );

    let counts = summary(&output.objects);
    assert_eq!(counts.circles, 2);
    assert_eq!(counts.holds, 1);
    assert_eq!(counts.first_time, Some(1000));
    assert_eq!(counts.last_end_time, Some(2000));
}
