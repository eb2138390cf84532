//! End-to-end runs over synthetic ARP captures written to temporary CSVs.

use arpguard_core::{ArpGuardError, ExperimentConfig};
use arpguard_training::pipeline;
use candle_core::Device;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const HEADER: &str =
    "frame.len,arp.opcode,arp.src.hw_mac,arp.dst.hw_mac,arp.src.proto_ipv4,arp.dst.proto_ipv4";

const HOSTS: usize = 24;

fn host_mac(h: usize) -> String {
    format!("3c:22:fb:00:00:{:02x}", h)
}

fn host_ip(h: usize) -> String {
    format!("192.168.1.{}", h + 1)
}

/// Normal traffic: hosts announce their own MAC/IP pair. Spoofing: an
/// attacker MAC replies claiming the gateway address.
fn row(i: usize, spoofing: bool) -> String {
    if spoofing {
        let victim = 1 + i % (HOSTS - 1);
        format!(
            "42,2,de:ad:be:ef:00:{:02x},{},{},{}",
            i % 3,
            host_mac(victim),
            host_ip(0),
            host_ip(victim)
        )
    } else {
        let src = i % HOSTS;
        let dst = (i * 7 + 3) % HOSTS;
        let (frame_len, opcode, dst_mac) = if i % 2 == 0 {
            (60, 1, "00:00:00:00:00:00".to_string())
        } else {
            (42, 2, host_mac(dst))
        };
        format!(
            "{frame_len},{opcode},{},{dst_mac},{},{}",
            host_mac(src),
            host_ip(src),
            host_ip(dst)
        )
    }
}

fn write_split(dir: &Path, name: &str, normal: usize, spoofing: usize, labeled: bool) -> PathBuf {
    let mut body = String::new();
    if labeled {
        writeln!(body, "{HEADER},label").unwrap();
    } else {
        writeln!(body, "{HEADER}").unwrap();
    }
    // interleave so spoofing rows are spread through the file
    let total = normal + spoofing;
    let (mut n, mut s) = (0, 0);
    for i in 0..total {
        let take_spoof = s < spoofing && (n >= normal || i % (total / spoofing.max(1)) == 0);
        let line = row(i, take_spoof);
        if take_spoof {
            s += 1;
        } else {
            n += 1;
        }
        if labeled {
            writeln!(body, "{line},{}", u8::from(take_spoof)).unwrap();
        } else {
            writeln!(body, "{line}").unwrap();
        }
    }
    assert_eq!((n, s), (normal, spoofing));
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn seeded_config() -> ExperimentConfig {
    ExperimentConfig {
        seed: Some(2024),
        ..Default::default()
    }
}

#[test]
fn test_full_run_confusion_matrix_covers_test_split() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_split(dir.path(), "train.csv", 900, 100, true);
    let test = write_split(dir.path(), "test.csv", 840, 60, true);

    let output = pipeline::run(&seeded_config(), &train, &test, &Device::Cpu).unwrap();
    let report = &output.report;

    assert_eq!(report.train_records, 1000);
    assert_eq!(report.test_records, 900);
    assert_eq!(report.feature_dim, report.feature_names.len());
    assert_eq!(report.pretext.len(), 20);
    assert!(report.pretext.iter().all(|e| e.loss.is_finite()));

    let downstream = report.downstream.as_ref().expect("both splits are labeled");
    assert_eq!(downstream.history.len(), 20);

    let metrics = &downstream.metrics;
    let cm = metrics.confusion_matrix;
    assert_eq!(cm.total(), 900);
    assert_eq!(cm.0[0][0] + cm.0[0][1], 840);
    assert_eq!(cm.0[1][0] + cm.0[1][1], 60);
    assert_eq!(metrics.support, [840, 60]);

    for v in [metrics.accuracy, metrics.precision, metrics.recall, metrics.f1] {
        assert!((0.0..=1.0).contains(&v), "metric out of range: {v}");
    }
    if cm.tp() + cm.fp() == 0 {
        assert_eq!(metrics.f1, 0.0);
    }
    assert!(output.model.is_encoder_frozen());
}

#[test]
fn test_unlabeled_test_split_skips_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_split(dir.path(), "train.csv", 90, 10, true);
    let test = write_split(dir.path(), "test.csv", 45, 5, false);

    let mut config = seeded_config();
    config.pretext.epochs = 2;
    let output = pipeline::run(&config, &train, &test, &Device::Cpu).unwrap();

    assert!(output.report.downstream.is_none());
    assert_eq!(output.report.pretext.len(), 2);
    assert!(!output.model.is_encoder_frozen());
}

#[test]
fn test_missing_test_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_split(dir.path(), "train.csv", 9, 1, true);
    let result = pipeline::run(
        &seeded_config(),
        &train,
        &dir.path().join("absent.csv"),
        &Device::Cpu,
    );
    assert!(matches!(result, Err(ArpGuardError::MissingInput { .. })));
}

#[test]
fn test_report_and_encoder_written() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_split(dir.path(), "train.csv", 45, 5, true);
    let test = write_split(dir.path(), "test.csv", 27, 3, true);

    let mut config = seeded_config();
    config.pretext.epochs = 2;
    config.downstream.epochs = 2;
    let output = pipeline::run(&config, &train, &test, &Device::Cpu).unwrap();

    let report_path = dir.path().join("out").join("report.json");
    pipeline::write_report(&output.report, &report_path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["test_records"], 30);
    assert_eq!(json["seed"], 2024);
    let matrix = &json["downstream"]["metrics"]["confusion_matrix"];
    let total: u64 = matrix
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|r| r.as_array().unwrap().iter().map(|c| c.as_u64().unwrap()))
        .sum();
    assert_eq!(total, 30);

    let encoder_path = dir.path().join("encoder.safetensors");
    output.model.save_encoder(&encoder_path).unwrap();
    assert!(encoder_path.exists());
}
