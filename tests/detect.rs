/// End-to-end detector tests: regions, the mate-link graph, traversal, and
/// emitted records, driven by synthetic position-sorted read streams.
use std::io::Write as _;
use svscan_rs::config::{BamConfig, LibraryInfo, Options};
use svscan_rs::{Detector, Orientation, PairFlag, Read};

// ── helpers ──────────────────────────────────────────────────────────────────

fn test_config() -> (BamConfig, tempfile::NamedTempFile) {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(
        file,
        "readgroup:rg1\tplatform:illumina\tmap:lib1.bam\treadlen:100.00\tlib:lib1\tnum:10000\tlower:300.00\tupper:500.00\tmean:400.00\tstd:50.00"
    )
    .unwrap();
    let cfg = BamConfig::load(file.path()).expect("load config");
    (cfg, file)
}

fn test_options() -> Options {
    Options {
        min_map_qual: 35,
        max_sd: 1_000_000,
        min_len: 7,
        seq_coverage_lim: 1000.0,
        buffer_size: 100,
        max_read_window_size: 1000,
        min_read_pair: 2,
        transchr_rearrange: false,
        illumina_long_insert: false,
        cn_per_lib: false,
        fisher: false,
        score_threshold: 25,
        print_af: false,
        prefix_fastq: None,
        dump_bed: None,
        need_sequence_data: false,
    }
}

fn test_lib_info() -> LibraryInfo {
    let mut info = LibraryInfo {
        flag_counts: vec![Default::default()],
        covered_reference_length: 1_000_000,
        read_density: Default::default(),
    };
    for flag in [
        PairFlag::ArpFrBigInsert,
        PairFlag::ArpFrSmallInsert,
        PairFlag::ArpRf,
        PairFlag::ArpFf,
        PairFlag::ArpCtx,
    ] {
        info.flag_counts[0].insert(flag, 20);
    }
    info.read_density.insert("lib1.bam".to_string(), 0.01);
    info.read_density.insert("lib1".to_string(), 0.01);
    info
}

fn ref_names() -> Vec<String> {
    vec!["chr1".to_string(), "chr2".to_string()]
}

fn read_at(name: &str, tid: i32, pos: i64, isize: i64, ori: Orientation, flag: PairFlag) -> Read {
    Read::new(name.to_string(), tid, pos, 100, 60, isize, ori, 0, flag)
}

/// A same-chromosome pair in FR geometry with the given outer span.
fn fr_pair(name: &str, tid: i32, pos: i64, span: i64) -> (Read, Read) {
    let fwd = read_at(name, tid, pos, span, Orientation::Fwd, PairFlag::NormalFr);
    let rev = read_at(
        name,
        tid,
        pos + span - 100,
        -span,
        Orientation::Rev,
        PairFlag::NormalFr,
    );
    (fwd, rev)
}

fn sort_stream(reads: &mut Vec<Read>) {
    reads.sort_by_key(|r| (r.tid, r.pos));
}

fn record_lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect()
}

fn run_detector(reads: Vec<Read>, opts: &Options) -> Vec<u8> {
    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let mut buf = Vec::new();
    let mut detector = Detector::new(opts, &cfg, &info, ref_names(), &mut buf);
    for read in reads {
        detector.push(read);
    }
    detector.finish().unwrap();
    drop(detector);
    buf
}

// ── scenarios ────────────────────────────────────────────────────────────────

/// Normal pairs alone never open a region; the stream produces no calls.
#[test]
fn all_normal_input_emits_nothing() {
    let mut reads = Vec::new();
    for i in 0..10 {
        let (fwd, rev) = fr_pair(&format!("n{i}"), 0, 1_000 + i * 10, 400);
        reads.push(fwd);
        reads.push(rev);
    }
    sort_stream(&mut reads);

    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let opts = test_options();
    let mut buf = Vec::new();
    let mut detector = Detector::new(&opts, &cfg, &info, ref_names(), &mut buf);
    detector.write_header().unwrap();
    for read in reads {
        detector.push(read);
    }
    detector.finish().unwrap();
    assert_eq!(detector.store().num_regions(), 0);
    drop(detector);

    assert!(record_lines(&buf).is_empty());
    assert!(!buf.is_empty(), "header comments are still written");
}

/// Normal pairs inside an open region are counted into its depth.
#[test]
fn normal_reads_counted_into_open_region() {
    let mut opts = test_options();
    opts.min_read_pair = 3; // keep the lone anomalous pair from emitting

    let mut reads = Vec::new();
    let (fwd, rev) = fr_pair("a0", 0, 1_000, 900);
    reads.push(fwd);
    reads.push(rev);
    for i in 0..10 {
        let (fwd, rev) = fr_pair(&format!("n{i}"), 0, 1_010 + i * 5, 400);
        reads.push(fwd);
        reads.push(rev);
    }
    sort_stream(&mut reads);

    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let mut buf = Vec::new();
    let mut detector = Detector::new(&opts, &cfg, &info, ref_names(), &mut buf);
    for read in reads {
        detector.push(read);
    }
    detector.finish().unwrap();

    assert_eq!(detector.stats().regions_promoted, 1);
    let region = detector.store().region(0);
    assert_eq!(region.normal_read_count, 10);
    assert_eq!(detector.stats().calls_emitted, 0);
}

/// Twelve far-spanning FR pairs in one window: one region, a self-link of
/// count 12, and a single DEL call.
#[test]
fn deletion_cluster_forms_self_link_and_emits() {
    let mut opts = test_options();
    opts.min_read_pair = 4;
    opts.min_len = 50;
    opts.seq_coverage_lim = 10.0;

    let mut reads = Vec::new();
    for i in 0..12i64 {
        let (fwd, rev) = fr_pair(&format!("p{i}"), 0, 1_000 + i * 5, 900);
        reads.push(fwd);
        reads.push(rev);
    }
    // Separator pair on the next reference promotes the cluster before
    // end-of-stream so the graph can be inspected.
    let (fwd, rev) = fr_pair("far", 1, 5_000, 900);
    reads.push(fwd);
    reads.push(rev);
    sort_stream(&mut reads);

    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let mut buf = Vec::new();
    let mut detector = Detector::new(&opts, &cfg, &info, ref_names(), &mut buf);
    for read in reads {
        detector.push(read);
    }

    let self_link = detector
        .store()
        .graph()
        .get(&0)
        .and_then(|edges| edges.get(&0))
        .copied();
    assert_eq!(self_link, Some(12));

    detector.finish().unwrap();
    assert!(!detector.store().region_exists(0), "consumed region is evicted");
    drop(detector);

    let records = record_lines(&buf);
    assert_eq!(records.len(), 1);
    let cols: Vec<&str> = records[0].split('\t').collect();
    assert_eq!(cols[0], "chr1");
    assert_eq!(cols[2], "12+0-");
    assert_eq!(cols[5], "0+12-");
    assert_eq!(cols[6], "DEL");
    assert_eq!(cols[7], "500", "diffspan is span minus mean insert");
    assert!(cols[8].parse::<i32>().unwrap() > 0);
    assert_eq!(cols[9], "12");
    assert_eq!(cols[10], "lib1.bam|12");
}

/// Six CTX pairs bridging two references: two regions, one cross edge, one
/// CTX call anchored on both chromosomes.
#[test]
fn cross_chromosome_clusters_emit_ctx() {
    let mut opts = test_options();
    opts.min_read_pair = 3;

    let mut reads = Vec::new();
    for i in 0..6i64 {
        reads.push(read_at(
            &format!("c{i}"),
            0,
            1_000 + i * 20,
            0,
            Orientation::Fwd,
            PairFlag::ArpCtx,
        ));
        reads.push(read_at(
            &format!("c{i}"),
            1,
            5_000 + i * 20,
            0,
            Orientation::Rev,
            PairFlag::ArpCtx,
        ));
    }
    sort_stream(&mut reads);

    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let mut buf = Vec::new();
    let mut detector = Detector::new(&opts, &cfg, &info, ref_names(), &mut buf);
    for read in reads {
        detector.push(read);
    }
    assert_eq!(detector.stats().regions_promoted, 1, "chr2 cluster still open");
    detector.finish().unwrap();
    drop(detector);

    let records = record_lines(&buf);
    assert_eq!(records.len(), 1);
    let cols: Vec<&str> = records[0].split('\t').collect();
    assert_eq!(cols[0], "chr1");
    assert_eq!(cols[2], "6+0-");
    assert_eq!(cols[3], "chr2");
    assert_eq!(cols[5], "0+6-");
    assert_eq!(cols[6], "CTX");
    assert_eq!(cols[9], "6");
}

/// A-B and B-C links with exactly threshold support: two calls, and all three
/// regions are evicted once their reads are consumed.
#[test]
fn chained_regions_emit_pairwise_and_free() {
    let mut opts = test_options();
    opts.min_read_pair = 3;

    let mut reads = Vec::new();
    for i in 0..3i64 {
        // A (around 1k) to B (around 10k)
        let (fwd, rev) = fr_pair(&format!("ab{i}"), 0, 1_000 + i * 30, 9_000);
        reads.push(fwd);
        reads.push(rev);
        // B (around 10k) to C (around 20k)
        let (fwd, rev) = fr_pair(&format!("bc{i}"), 0, 10_100 + i * 30, 9_960);
        reads.push(fwd);
        reads.push(rev);
    }
    sort_stream(&mut reads);

    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let mut buf = Vec::new();
    let mut detector = Detector::new(&opts, &cfg, &info, ref_names(), &mut buf);
    for read in reads {
        detector.push(read);
    }
    detector.finish().unwrap();

    for id in 0..3 {
        assert!(
            !detector.store().region_exists(id),
            "region {id} should be freed"
        );
    }
    drop(detector);

    let records = record_lines(&buf);
    assert_eq!(records.len(), 2);
    let pos_of = |line: &str| -> i64 { line.split('\t').nth(1).unwrap().parse().unwrap() };
    assert!(
        pos_of(&records[0]) < pos_of(&records[1]),
        "calls ordered by region id"
    );
}

/// Flushing after every promoted region must not change the emitted records.
#[test]
fn flush_cadence_is_semantically_transparent() {
    let mut stream = Vec::new();
    for i in 0..6i64 {
        let (fwd, rev) = fr_pair(&format!("x{i}"), 0, 1_000 + i * 5, 900);
        stream.push(fwd);
        stream.push(rev);
    }
    for i in 0..6i64 {
        let (fwd, rev) = fr_pair(&format!("y{i}"), 0, 50_000 + i * 5, 900);
        stream.push(fwd);
        stream.push(rev);
    }
    sort_stream(&mut stream);

    let mut opts_buffered = test_options();
    opts_buffered.min_read_pair = 3;
    let mut opts_eager = opts_buffered.clone();
    opts_eager.buffer_size = 0;

    let buffered = run_detector(stream.clone(), &opts_buffered);
    let eager = run_detector(stream, &opts_eager);

    assert_eq!(record_lines(&buffered).len(), 2);
    assert_eq!(buffered, eager);
}

/// Identical input and options produce byte-identical output.
#[test]
fn output_is_deterministic() {
    let mut stream = Vec::new();
    for i in 0..3i64 {
        let (fwd, rev) = fr_pair(&format!("ab{i}"), 0, 1_000 + i * 30, 9_000);
        stream.push(fwd);
        stream.push(rev);
        let (fwd, rev) = fr_pair(&format!("bc{i}"), 0, 10_100 + i * 30, 9_960);
        stream.push(fwd);
        stream.push(rev);
    }
    sort_stream(&mut stream);

    let mut opts = test_options();
    opts.min_read_pair = 3;

    let first = run_detector(stream.clone(), &opts);
    let second = run_detector(stream, &opts);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

/// Unpaired residue stays behind: a candidate consumes only reads whose
/// mates were both observed.
#[test]
fn unpaired_reads_survive_traversal() {
    let mut opts = test_options();
    opts.min_read_pair = 2;

    let mut reads = Vec::new();
    for i in 0..4i64 {
        let (fwd, rev) = fr_pair(&format!("p{i}"), 0, 1_000 + i * 5, 900);
        reads.push(fwd);
        reads.push(rev);
    }
    // Lone mates whose partners never arrive (e.g. filtered upstream).
    for name in ["widow1", "widow2"] {
        reads.push(read_at(
            name,
            0,
            1_030,
            900,
            Orientation::Fwd,
            PairFlag::NormalFr,
        ));
    }
    sort_stream(&mut reads);

    let (cfg, _file) = test_config();
    let info = test_lib_info();
    let mut buf = Vec::new();
    let mut detector = Detector::new(&opts, &cfg, &info, ref_names(), &mut buf);
    for read in reads {
        detector.push(read);
    }
    detector.finish().unwrap();

    assert_eq!(detector.stats().calls_emitted, 1);
    // The widows were not claimed, and enough residue keeps the region live.
    assert!(detector.store().region_exists(0));
    assert_eq!(detector.store().num_reads_in_region(0), 2);
    assert_eq!(detector.store().regions_of_read("widow1"), Some(&[0usize][..]));
}

/// First-seen mate lands in the "2" FASTQ, its partner in "1".
#[test]
fn fastq_dump_preserves_pairing_quirk() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("support").to_string_lossy().into_owned();

    let mut opts = test_options();
    opts.min_read_pair = 4;
    opts.prefix_fastq = Some(prefix.clone());
    opts.need_sequence_data = true;

    let mut reads = Vec::new();
    for i in 0..4i64 {
        let (mut fwd, mut rev) = fr_pair(&format!("p{i}"), 0, 1_000 + i * 5, 900);
        fwd.seq = Some(b"ACGTACGT".to_vec());
        fwd.quals = Some(b"IIIIIIII".to_vec());
        rev.seq = Some(b"TGCATGCA".to_vec());
        rev.quals = Some(b"IIIIIIII".to_vec());
        reads.push(fwd);
        reads.push(rev);
    }
    sort_stream(&mut reads);

    run_detector(reads, &opts);

    let file2 = std::fs::read_to_string(format!("{prefix}.lib1.2.fastq")).unwrap();
    let file1 = std::fs::read_to_string(format!("{prefix}.lib1.1.fastq")).unwrap();
    // Forward mates arrive first in a sorted stream.
    assert!(file2.contains("ACGTACGT"));
    assert!(!file2.contains("TGCATGCA"));
    assert!(file1.contains("TGCATGCA"));
    assert_eq!(file2.lines().count(), 16, "4 records of 4 lines");
}

// ── config parsing ───────────────────────────────────────────────────────────

#[test]
fn config_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "readgroup:rgA\tplatform:illumina\tmap:a.bam\treadlen:100.00\tlib:libA\tnum:5000\tlower:250.00\tupper:550.00\tmean:400.00\tstd:75.00\tmqual:30"
    )
    .unwrap();
    writeln!(
        file,
        "readgroup:rgA2\tplatform:illumina\tmap:a.bam\treadlen:100.00\tlib:libA\tnum:5000\tlower:250.00\tupper:550.00\tmean:400.00\tstd:75.00"
    )
    .unwrap();
    writeln!(
        file,
        "readgroup:rgB\tplatform:illumina\tmap:b.bam\treadlen:150.00\tlib:libB\tnum:2000\tlower:2000.00\tupper:4000.00\tmean:3000.00\tstd:400.00"
    )
    .unwrap();

    let cfg = BamConfig::load(file.path()).unwrap();
    assert_eq!(cfg.libraries.len(), 2);
    assert_eq!(cfg.bam_files, vec!["a.bam".to_string(), "b.bam".to_string()]);

    let lib_a = cfg.library(cfg.library_by_readgroup("rgA").unwrap());
    assert_eq!(lib_a.name, "libA");
    assert_eq!(lib_a.min_mapping_quality, 30);
    assert_eq!(cfg.library_by_readgroup("rgA2").unwrap(), lib_a.index);

    let lib_b = cfg.library(cfg.library_by_readgroup("rgB").unwrap());
    assert_eq!(lib_b.uppercutoff, 4000.0);
    assert_eq!(cfg.sole_library_of_bam("b.bam"), Some(lib_b.index));

    assert_eq!(Options::derive_max_read_window_size(&cfg), 200);
}

#[test]
fn config_rejects_missing_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "readgroup:rgA\tmean:400.00").unwrap();
    assert!(BamConfig::load(file.path()).is_err());
}

// ── region store ─────────────────────────────────────────────────────────────

#[test]
fn region_ids_monotonic_and_links_count_query_names() {
    use svscan_rs::RegionStore;

    let mut store = RegionStore::new();
    let r0 = store.add_region(
        0,
        100,
        200,
        0,
        Default::default(),
        vec![
            read_at("m0", 0, 100, 900, Orientation::Fwd, PairFlag::ArpFrBigInsert),
            read_at("m1", 0, 150, 900, Orientation::Fwd, PairFlag::ArpFrBigInsert),
        ],
    );
    let r1 = store.add_region(
        0,
        900,
        1_100,
        0,
        Default::default(),
        vec![
            read_at("m0", 0, 900, -900, Orientation::Rev, PairFlag::ArpFrBigInsert),
            read_at("m1", 0, 950, -900, Orientation::Rev, PairFlag::ArpFrBigInsert),
            read_at("w", 0, 1_000, 80, Orientation::Fwd, PairFlag::ArpFf),
            read_at("w", 0, 1_060, -80, Orientation::Rev, PairFlag::ArpFf),
        ],
    );
    assert_eq!((r0, r1), (0, 1));

    // One link per spanning query name, one self-loop per intra-region pair.
    assert_eq!(store.graph().get(&r0).and_then(|e| e.get(&r1)), Some(&2));
    assert_eq!(store.graph().get(&r1).and_then(|e| e.get(&r0)), Some(&2));
    assert_eq!(store.graph().get(&r1).and_then(|e| e.get(&r1)), Some(&1));

    assert_eq!(store.sum_of_region_sizes(&[r0, r1]), 300);

    // Clearing a region purges only its side of the name index.
    store.clear_region(r0);
    assert!(!store.region_exists(r0));
    assert_eq!(store.regions_of_read("m0"), Some(&[r1][..]));
    store.clear_region(r1);
    assert_eq!(store.regions_of_read("m0"), None);
    assert_eq!(store.regions_of_read("w"), None);
}
