#[allow(dead_code)]
mod common;

use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::{
    catalog, chip, make_frame, master_dark, master_flat, raw_dark, raw_flat, write_card_fits,
    write_raw_fits, MemoryStore,
};
use masterframe_core::catalog::store::load_master_catalog;
use masterframe_core::catalog::{MasterCatalog, Quality, RawFrame};
use masterframe_core::combine::{ChipOutcome, SkipReason};
use masterframe_core::config::SynthesisConfig;
use masterframe_core::frame::Frame;
use masterframe_core::identity::{FrameKind, Grouping, Identity};
use masterframe_core::io::fits::{write_fits, FitsHeader, Hdu, HeaderValue};
use masterframe_core::io::store::{FitsStore, FrameStore};
use masterframe_core::policy::purge_bad;
use masterframe_core::synth::{
    append_batch, new_identities, run_synthesis, synthesize_darks, synthesize_flats, NoOpReporter,
    Target,
};

const NIGHT: i64 = 2_460_000;

fn config() -> SynthesisConfig {
    SynthesisConfig {
        worker_count: Some(2),
        ..Default::default()
    }
}

/// Three 30s darks on chip 1, two on chip 2, all on one night.
fn dark_night(store: &MemoryStore) -> Vec<RawFrame> {
    let frames = vec![
        (raw_dark("d1", 1, 30.0, 2_460_000.50), 10.0),
        (raw_dark("d2", 1, 30.0, 2_460_000.52), 30.0),
        (raw_dark("d3", 1, 30.0, 2_460_000.54), 20.0),
        (raw_dark("d4", 2, 30.0, 2_460_000.50), 10.0),
        (raw_dark("d5", 2, 30.0, 2_460_000.52), 12.0),
    ];
    frames
        .into_iter()
        .map(|(raw, level)| {
            store.insert_raw(&raw, make_frame(8, 8, level));
            raw
        })
        .collect()
}

fn flat_frames(store: &MemoryStore, specs: &[(&str, u8, f64, f32, &str)]) -> Vec<RawFrame> {
    specs
        .iter()
        .map(|&(name, chip_no, jd, level, field)| {
            let raw = raw_flat(name, chip_no, "r", jd, field);
            store.insert_raw(&raw, make_frame(8, 8, level));
            raw
        })
        .collect()
}

fn only_produced(outcome: &ChipOutcome) -> &masterframe_core::catalog::MasterFrame {
    match outcome {
        ChipOutcome::Produced(m) => m,
        ChipOutcome::Skipped { chip, reason } => panic!("chip {chip} skipped: {reason}"),
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

#[test]
fn test_new_identities_is_set_difference() {
    let raw = catalog(
        FrameKind::Dark,
        vec![
            raw_dark("a", 1, 30.0, 1.5),
            raw_dark("b", 1, 30.0, 2.5),
            raw_dark("c", 1, 30.0, 3.5),
        ],
    );
    let masters =
        MasterCatalog::from_records(vec![master_dark(1, 1, 30.0, 1.5, Quality::Good)]).unwrap();

    let new = new_identities(&raw, &masters, Grouping::PerNight);
    let encoded: Vec<String> = new.iter().map(|id| id.encode()).collect();
    assert_eq!(encoded, vec!["dark_3_30s", "dark_2_30s"]);
}

#[test]
fn test_identity_is_mastered_by_any_chip() {
    let raw = catalog(
        FrameKind::Dark,
        vec![raw_dark("a", 1, 30.0, 1.5), raw_dark("b", 7, 30.0, 1.6)],
    );
    // Only chip 7 is recorded, the identity still counts as done.
    let masters =
        MasterCatalog::from_records(vec![master_dark(1, 7, 30.0, 1.6, Quality::Good)]).unwrap();
    assert!(new_identities(&raw, &masters, Grouping::PerNight).is_empty());
}

// ---------------------------------------------------------------------------
// Darks
// ---------------------------------------------------------------------------

#[test]
fn test_dark_batch_combines_per_chip() {
    let store = MemoryStore::new();
    let raw = catalog(FrameKind::Dark, dark_night(&store));
    let masters = MasterCatalog::new();

    let batch = synthesize_darks(&raw, &masters, &config(), &store, &NoOpReporter).unwrap();
    assert_eq!(batch.identities(), 1);
    let outcome = &batch.outcomes[0];
    assert_eq!(outcome.identity, Identity::dark(NIGHT, 30.0));
    assert_eq!(outcome.chips.len(), 10);

    let chip1 = only_produced(&outcome.chips[0]);
    assert_eq!(chip1.name.to_string(), "dark_2460000_30s-m1");
    assert_eq!(chip1.source_count, 3);
    assert_eq!(chip1.note, Quality::Good);
    assert_abs_diff_eq!(chip1.jd, 2_460_000.52, epsilon = 1e-6);
    assert_abs_diff_eq!(chip1.exposure_time, 30.0);

    let chip2 = only_produced(&outcome.chips[1]);
    assert_eq!(chip2.source_count, 2);
    assert_eq!(chip2.note, Quality::Bad);

    let planes = store.saved_planes("dark_2460000_30s-m1").unwrap();
    assert_abs_diff_eq!(planes.value[[4, 4]], 20.0);

    let skipped: Vec<_> = batch.skipped().collect();
    assert_eq!(skipped.len(), 8);
    assert!(skipped.iter().all(|(_, reason)| **reason == SkipReason::NoFrames));
}

#[test]
fn test_unreadable_frame_is_excluded() {
    let store = MemoryStore::new();
    let loaded = raw_dark("ok1", 3, 30.0, 2_460_000.5);
    let also = raw_dark("ok2", 3, 30.0, 2_460_000.5);
    let lost = raw_dark("lost", 3, 30.0, 2_460_000.5);
    store.insert_raw(&loaded, make_frame(4, 4, 5.0));
    store.insert_raw(&also, make_frame(4, 4, 7.0));
    let raw = catalog(FrameKind::Dark, vec![loaded, lost, also]);

    let batch =
        synthesize_darks(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    assert_eq!(master.source_count, 2);
    assert_eq!(master.note, Quality::Bad);
    let planes = store.saved_planes("dark_2460000_30s-m3").unwrap();
    assert_abs_diff_eq!(planes.value[[0, 0]], 6.0);
    assert_abs_diff_eq!(planes.sigma[[0, 0]], 1.0);
}

#[test]
fn test_all_unreadable_chip_is_skipped() {
    let store = MemoryStore::new();
    let raw = catalog(FrameKind::Dark, vec![raw_dark("gone", 4, 30.0, 2_460_000.5)]);
    let batch =
        synthesize_darks(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    assert_eq!(batch.produced().count(), 0);
    let skipped: Vec<_> = batch
        .skipped()
        .filter(|(name, _)| name.chip == chip(4))
        .collect();
    assert_eq!(*skipped[0].1, SkipReason::Unreadable { frames: 1 });
    let empty: Vec<_> = batch.empty_identities().collect();
    assert_eq!(empty, vec![&Identity::dark(NIGHT, 30.0)]);
}

#[test]
fn test_hostile_fits_header_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let store = FitsStore::new(dir.path().join("master"), false);

    // Axes whose product overflows, backed by a single data block.
    let hostile_cards = [
        "SIMPLE  =                    T",
        "BITPIX  =                  -32",
        "NAXIS   =                    2",
        "NAXIS1  =           4294967296",
        "NAXIS2  =           4294967296",
    ];
    let hostile = |name: &str, chip_no: u8| {
        let mut raw = raw_dark(name, chip_no, 30.0, 2_460_000.5);
        raw.file = dir.path().join(format!("{name}.fits"));
        write_card_fits(&raw.file, &hostile_cards, &[0u8; 2880]);
        raw
    };
    let mut frames = vec![hostile("bad1", 1), hostile("bad6", 6)];
    for (i, level) in [10.0, 20.0, 30.0].into_iter().enumerate() {
        let mut raw = raw_dark(&format!("ok{i}"), 1, 30.0, 2_460_000.5);
        raw.file = dir.path().join(format!("ok{i}.fits"));
        write_raw_fits(&raw.file, Array2::from_elem((4, 4), level));
        frames.push(raw);
    }
    let raw = catalog(FrameKind::Dark, frames);

    let batch =
        synthesize_darks(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    assert_eq!(master.chip, chip(1));
    assert_eq!(master.source_count, 3);
    assert_eq!(master.note, Quality::Good);

    let reason = batch
        .skipped()
        .find(|(name, _)| name.chip == chip(6))
        .map(|(_, reason)| reason.clone())
        .unwrap();
    assert_eq!(reason, SkipReason::Unreadable { frames: 1 });
}

#[test]
fn test_master_carries_source_date_and_cards() {
    let store = MemoryStore::new();
    let mut raws = Vec::new();
    for (i, date) in ["2023-04-01T10:12:00", "2023-04-01T10:40:00"].iter().enumerate() {
        let raw = raw_dark(&format!("d{i}"), 2, 30.0, 2_460_000.5);
        let mut header = FitsHeader::new();
        header.set("DATE-OBS", HeaderValue::Text(date.to_string()));
        header.set("TELESCOP", HeaderValue::Text("MOA-II".into()));
        store.insert_raw(&raw, Frame::with_header(Array2::from_elem((4, 4), 5.0), header));
        raws.push(raw);
    }
    let raw = catalog(FrameKind::Dark, raws);

    let batch =
        synthesize_darks(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    assert_eq!(master.date.as_deref(), Some("2023-04-01T10:12:00"));

    let (_, _, metadata) = store.saved().into_iter().next().unwrap();
    assert_eq!(metadata.source_header.get_str("TELESCOP"), Some("MOA-II"));
    assert_eq!(metadata.source_header.get_str("DATE-OBS"), Some("2023-04-01T10:12:00"));
}

#[test]
fn test_second_run_does_nothing() {
    let store = MemoryStore::new();
    let raw = catalog(FrameKind::Dark, dark_night(&store));
    let mut masters = MasterCatalog::new();

    let first = synthesize_darks(&raw, &masters, &config(), &store, &NoOpReporter).unwrap();
    assert_eq!(append_batch(&mut masters, &first).unwrap(), 2);
    let snapshot = masters.records().to_vec();

    let second = synthesize_darks(&raw, &masters, &config(), &store, &NoOpReporter).unwrap();
    assert_eq!(second.identities(), 0);
    assert_eq!(append_batch(&mut masters, &second).unwrap(), 0);
    assert_eq!(masters.records(), snapshot.as_slice());
}

#[test]
fn test_synthesis_is_deterministic() {
    let run = |workers: usize| {
        let store = MemoryStore::new();
        let mut frames = dark_night(&store);
        let extra = raw_dark("d6", 1, 60.0, 2_460_001.3);
        store.insert_raw(&extra, make_frame(8, 8, 3.0));
        frames.push(extra);
        let raw = catalog(FrameKind::Dark, frames);
        let cfg = SynthesisConfig {
            worker_count: Some(workers),
            ..Default::default()
        };
        let mut masters = MasterCatalog::new();
        let batch = synthesize_darks(&raw, &masters, &cfg, &store, &NoOpReporter).unwrap();
        append_batch(&mut masters, &batch).unwrap();
        masters.records().to_vec()
    };
    let one = run(1);
    let four = run(4);
    assert_eq!(one.len(), 3);
    assert_eq!(one, four);
    // Newest identity first.
    assert_eq!(one[0].name.to_string(), "dark_2460001_60s-m1");
}

// ---------------------------------------------------------------------------
// Flats
// ---------------------------------------------------------------------------

#[test]
fn test_flat_is_dark_subtracted() {
    let store = MemoryStore::new();
    let dark = master_dark(NIGHT, 1, 5.0, 2_460_000.5, Quality::Good);
    store.insert(dark.file.clone(), make_frame(8, 8, 100.0));
    let masters = MasterCatalog::from_records(vec![dark.clone()]).unwrap();

    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("f1", 1, 2_460_000.6, 20_100.0, "twilight"),
                ("f2", 1, 2_460_000.7, 20_300.0, "twilight"),
                ("f3", 1, 2_460_000.8, 20_500.0, "twilight"),
            ],
        ),
    );

    let batch = synthesize_flats(&raw, &masters, &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    assert_eq!(master.name.to_string(), "flat_r_2460000-m1");
    assert_eq!(master.band.as_deref(), Some("r"));
    assert_eq!(master.note, Quality::Good);
    assert_eq!(master.source_count, 3);
    assert_abs_diff_eq!(master.jd, 2_460_000.7, epsilon = 1e-6);

    let provenance = master.flat.as_ref().unwrap();
    assert_eq!(provenance.file.as_ref(), Some(&dark.file));
    assert_abs_diff_eq!(provenance.time_diff, 0.1, epsilon = 1e-6);
    assert!(!master.missing_dark());

    let planes = store.saved_planes("flat_r_2460000-m1").unwrap();
    assert_abs_diff_eq!(planes.value[[2, 2]], 20_200.0);
}

#[test]
fn test_flat_without_dark_gets_sentinel() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("f1", 2, 2_460_000.6, 20_000.0, "twilight"),
                ("f2", 2, 2_460_000.7, 21_000.0, "twilight"),
            ],
        ),
    );

    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    let provenance = master.flat.as_ref().unwrap();
    assert_eq!(provenance.time_diff, -999.0);
    assert!(provenance.file.is_none());
    assert!(master.missing_dark());
    // Quality is still judged on the unsubtracted combination.
    assert_eq!(master.note, Quality::Good);
    assert_eq!(batch.unresolved().count(), 1);

    let planes = store.saved_planes("flat_r_2460000-m2").unwrap();
    assert_abs_diff_eq!(planes.value[[0, 0]], 20_500.0);
}

#[test]
fn test_faint_flat_is_bad() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(&store, &[("f1", 1, 2_460_000.6, 14_999.0, "twilight")]),
    );
    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    assert_eq!(batch.produced().next().unwrap().note, Quality::Bad);
}

#[test]
fn test_single_dome_flat_is_bad() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(&store, &[("dome", 1, 2_460_000.6, 25_000.0, "flat_round_2")]),
    );
    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    assert_eq!(master.note, Quality::Bad);
    assert_eq!(
        master.flat.as_ref().unwrap().flat_kind,
        masterframe_core::catalog::FlatKind::Dome
    );
}

#[test]
fn test_saturated_frames_are_masked() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("hot", 1, 2_460_000.6, 50_000.0, "twilight"),
                ("ok", 1, 2_460_000.7, 20_000.0, "twilight"),
            ],
        ),
    );
    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    // The masked frame still counts as a source.
    assert_eq!(master.source_count, 2);
    assert_abs_diff_eq!(master.jd, 2_460_000.65, epsilon = 1e-6);
    let planes = store.saved_planes("flat_r_2460000-m1").unwrap();
    assert_abs_diff_eq!(planes.value[[0, 0]], 20_000.0);
}

#[test]
fn test_dome_pair_with_saturated_frame_is_good() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("dome1", 1, 2_460_000.6, 50_000.0, "flat_round"),
                ("dome2", 1, 2_460_000.7, 20_000.0, "flat_round"),
            ],
        ),
    );
    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    let master = batch.produced().next().unwrap();
    assert_eq!(
        master.flat.as_ref().unwrap().flat_kind,
        masterframe_core::catalog::FlatKind::Dome
    );
    assert_eq!(master.source_count, 2);
    assert_eq!(master.note, Quality::Good);
    assert_abs_diff_eq!(master.jd, 2_460_000.65, epsilon = 1e-6);

    let (_, planes, metadata) = store.saved().into_iter().next().unwrap();
    assert_eq!(metadata.source_count, 2);
    assert_abs_diff_eq!(planes.value[[0, 0]], 20_000.0);
}

#[test]
fn test_all_masked_chip_is_skipped() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("hot1", 5, 2_460_000.6, 45_000.0, "twilight"),
                ("hot2", 5, 2_460_000.7, 60_000.0, "twilight"),
            ],
        ),
    );
    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &config(), &store, &NoOpReporter).unwrap();
    assert_eq!(batch.produced().count(), 0);
    let reason = batch
        .skipped()
        .find(|(name, _)| name.chip == chip(5))
        .map(|(_, reason)| reason.clone())
        .unwrap();
    assert_eq!(reason, SkipReason::AllMasked { frames: 2 });
}

#[test]
fn test_trailing_window_uses_mean() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("n8a", 1, 8.5, 20_000.0, "twilight"),
                ("n8b", 1, 8.6, 20_000.0, "twilight"),
                ("n10", 1, 10.5, 26_000.0, "twilight"),
            ],
        ),
    );
    let mut cfg = config();
    cfg.flats.grouping = Grouping::TrailingWindow { days: 3 };

    let batch =
        synthesize_flats(&raw, &MasterCatalog::new(), &cfg, &store, &NoOpReporter).unwrap();
    let mut names: Vec<String> = batch.produced().map(|m| m.name.to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["flat_r_10_w3-m1", "flat_r_8_w3-m1"]);

    // Window (7, 10] holds all three frames. A median would give 20000.
    let latest = store.saved_planes("flat_r_10_w3-m1").unwrap();
    assert_abs_diff_eq!(latest.value[[0, 0]], 22_000.0);
    let earlier = store.saved_planes("flat_r_8_w3-m1").unwrap();
    assert_abs_diff_eq!(earlier.value[[0, 0]], 20_000.0);
}

// ---------------------------------------------------------------------------
// Purge and redo
// ---------------------------------------------------------------------------

#[test]
fn test_purge_drops_whole_identity() {
    let stale = Identity::flat("r", NIGHT, Grouping::PerNight);
    let fine = Identity::flat("g", NIGHT, Grouping::PerNight);
    let masters = MasterCatalog::from_records(vec![
        master_dark(NIGHT, 1, 5.0, 2_460_000.5, Quality::Good),
        master_flat(stale.clone(), 1, 0.1),
        master_flat(stale.clone(), 2, -999.0),
        master_flat(fine.clone(), 1, 0.2),
    ])
    .unwrap();

    let outcome = purge_bad(masters);
    assert_eq!(outcome.purged, vec![stale.clone()]);
    assert_eq!(outcome.catalog.len(), 2);
    assert!(!outcome.catalog.contains_identity(&stale));
    assert!(outcome.catalog.contains_identity(&fine));
}

#[test]
fn test_purged_identity_is_redone_with_new_dark() {
    let store = MemoryStore::new();
    let raw = catalog(
        FrameKind::Flat,
        flat_frames(
            &store,
            &[
                ("f1", 1, 2_460_000.6, 20_100.0, "twilight"),
                ("f2", 1, 2_460_000.7, 20_100.0, "twilight"),
            ],
        ),
    );
    let identity = Identity::flat("r", NIGHT, Grouping::PerNight);

    // A previous run recorded the flat without a dark.
    let mut masters = MasterCatalog::from_records(vec![master_flat(identity.clone(), 1, -999.0)]).unwrap();
    assert!(new_identities(&raw, &masters, Grouping::PerNight).is_empty());

    // The dark arrives later.
    let dark = master_dark(NIGHT, 1, 5.0, 2_460_000.5, Quality::Good);
    store.insert(dark.file.clone(), make_frame(8, 8, 100.0));
    masters.push(dark).unwrap();

    let mut masters = purge_bad(masters).catalog;
    assert_eq!(new_identities(&raw, &masters, Grouping::PerNight), vec![identity]);

    let batch = synthesize_flats(&raw, &masters, &config(), &store, &NoOpReporter).unwrap();
    append_batch(&mut masters, &batch).unwrap();
    let redone = masters
        .records()
        .iter()
        .find(|m| m.kind() == FrameKind::Flat)
        .unwrap();
    assert!(!redone.missing_dark());
    assert_abs_diff_eq!(redone.flat.as_ref().unwrap().time_diff, 0.1, epsilon = 1e-6);
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

fn write_csv(path: &Path, header: &str, rows: &[String]) {
    let mut text = format!("{header}\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

fn write_dated_fits(path: &Path, data: Array2<f32>, date: &str) {
    let mut header = FitsHeader::new();
    header.set("DATE-OBS", HeaderValue::Text(date.to_string()));
    write_fits(
        path,
        &[Hdu {
            header,
            data: Some(data),
        }],
    )
    .unwrap();
}

#[test]
fn test_run_synthesis_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    fs::create_dir_all(&raw_dir).unwrap();

    let mut dark_rows = Vec::new();
    for (i, jd) in [2_460_000.50, 2_460_000.52, 2_460_000.54].iter().enumerate() {
        let file = raw_dir.join(format!("dark{i}.fits"));
        write_dated_fits(&file, Array2::from_elem((6, 6), 100.0 + i as f32), "2023-04-01T00:00:00");
        dark_rows.push(format!("dark{i},1,,5,{jd},{}", file.display()));
    }
    // Unreadable header, rejected at ingest.
    dark_rows.push("broken,bad,,bad,bad,bad".to_string());

    let mut flat_rows = Vec::new();
    for (i, jd) in [2_460_000.60, 2_460_000.62].iter().enumerate() {
        let file = raw_dir.join(format!("flat{i}.fits"));
        write_raw_fits(&file, Array2::from_elem((6, 6), 20_101.0));
        flat_rows.push(format!("flat{i},1,r,5,{jd},{},good,twilight", file.display()));
    }

    let lists = dir.path().join("cal_lists");
    fs::create_dir_all(&lists).unwrap();
    let mut cfg = config();
    cfg.save_location = dir.path().join("master");
    cfg.catalogs.darks = lists.join("dark_list.csv");
    cfg.catalogs.flats = lists.join("flat_list.csv");
    cfg.catalogs.masters = lists.join("master_list.csv");
    write_csv(&cfg.catalogs.darks, "name,chip,band,exptime,jd,filename", &dark_rows);
    write_csv(
        &cfg.catalogs.flats,
        "name,chip,band,exptime,jd,filename,note,field",
        &flat_rows,
    );

    let store = FitsStore::new(&cfg.save_location, cfg.compress);
    let report = run_synthesis(&cfg, Target::All, &store, &NoOpReporter).unwrap();
    assert_eq!(report.darks.identities(), 1);
    assert_eq!(report.flats.identities(), 1);
    assert_eq!(report.produced(), 2);
    assert_eq!(report.rejected_rows, 1);
    assert!(report.purged.is_empty());

    let masters = load_master_catalog(&cfg.catalogs.masters).unwrap();
    assert_eq!(masters.len(), 2);
    let dark = &masters.records()[0];
    let flat = &masters.records()[1];
    assert_eq!(dark.name.to_string(), "dark_2460000_5s-m1");
    assert!(dark.file.ends_with("dark/dark_2460000_5s-m1.fits.gz"));
    assert!(dark.file.exists());
    assert_eq!(dark.date.as_deref(), Some("2023-04-01T00:00:00"));
    assert!(flat.date.is_none());

    let provenance = flat.flat.as_ref().unwrap();
    assert_eq!(provenance.file.as_ref(), Some(&dark.file));
    assert_abs_diff_eq!(provenance.time_diff, 0.08, epsilon = 1e-6);
    assert_eq!(flat.note, Quality::Good);

    let flat_frame = store.load(&flat.file).unwrap();
    assert_eq!(flat_frame.dim(), (6, 6));
    assert_abs_diff_eq!(flat_frame.data[[3, 3]], 20_000.0);

    // Nothing new on the second run; the catalog stays as it was.
    let before = fs::read_to_string(&cfg.catalogs.masters).unwrap();
    let again = run_synthesis(&cfg, Target::All, &store, &NoOpReporter).unwrap();
    assert_eq!(again.produced(), 0);
    assert_eq!(fs::read_to_string(&cfg.catalogs.masters).unwrap(), before);
}

#[test]
fn test_run_synthesis_darks_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.save_location = dir.path().join("master");
    cfg.catalogs.darks = dir.path().join("dark_list.csv");
    cfg.catalogs.flats = dir.path().join("missing_flat_list.csv");
    cfg.catalogs.masters = dir.path().join("master_list.csv");
    write_csv(&cfg.catalogs.darks, "name,chip,band,exptime,jd,filename", &[]);

    let store = FitsStore::new(&cfg.save_location, true);
    let report = run_synthesis(&cfg, Target::Darks, &store, &NoOpReporter).unwrap();
    assert_eq!(report.produced(), 0);
    assert_eq!(report.flats.identities(), 0);
    // No change, so no catalog file is written.
    assert!(!cfg.catalogs.masters.exists());
}

#[test]
fn test_run_synthesis_rejects_invalid_config() {
    let mut cfg = config();
    cfg.worker_count = Some(0);
    let store = MemoryStore::new();
    assert!(run_synthesis(&cfg, Target::All, &store, &NoOpReporter).is_err());
}
