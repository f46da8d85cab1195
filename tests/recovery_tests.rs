mod common;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use ant::aof::{AofReader, AofWriter, LogTarget, Operation};
use ant::index::IvfFlatIndex;
use ant::instance::{version, WriteMode};

use common::vectors::{ids, random_vectors};
use common::{open, params, sorted_ids, V1};

fn apply_directly(index: &mut IvfFlatIndex, op: &Operation) {
    let kmeans = params(8, 4).kmeans;
    match op {
        Operation::Build { vectors, ids } => index.train_and_add(vectors, ids, &kmeans).unwrap(),
        Operation::Insert { vectors, ids } => index.add(vectors, ids).unwrap(),
        Operation::Update { vectors, ids } => index.replace(ids, vectors).unwrap(),
        Operation::Remove { ids } => {
            index.remove(ids);
        }
    }
}

fn workload() -> Vec<Operation> {
    vec![
        Operation::Build {
            vectors: random_vectors(30, 8, 1),
            ids: ids(0..30),
        },
        Operation::Insert {
            vectors: random_vectors(10, 8, 2),
            ids: ids(100..110),
        },
        Operation::Remove {
            ids: vec![0, 1, 2, 105, 999],
        },
        Operation::Update {
            vectors: random_vectors(3, 8, 3),
            ids: vec![3, 4, 200],
        },
        Operation::Remove { ids: ids(20..25) },
    ]
}

fn run(instance: &ant::instance::Instance, op: Operation) {
    match op {
        Operation::Build { vectors, ids } => instance.build(vectors, ids).unwrap(),
        Operation::Insert { vectors, ids } => instance.insert(vectors, ids).unwrap(),
        Operation::Update { vectors, ids } => instance.update(vectors, ids).unwrap(),
        Operation::Remove { ids } => instance.remove(ids).unwrap(),
    }
}

#[test]
fn test_replay_equivalence() {
    let mut direct = IvfFlatIndex::new(8, 4);
    for op in workload() {
        apply_directly(&mut direct, &op);
    }
    let mut expected = direct.ids();
    expected.sort_unstable();

    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    for op in workload() {
        run(&instance, op);
    }
    assert_eq!(sorted_ids(&instance), expected);
    drop(instance);

    let reader = AofReader::new(&dir.path().join(V1), "AOF", LogTarget::Primary);
    assert_eq!(reader.count_operations().unwrap(), workload().len());

    let recovered = open(dir.path(), 8, 4);
    assert_eq!(sorted_ids(&recovered), expected);
}

#[test]
fn test_buffered_writes_apply_after_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(20, 8, 4), ids(0..20)).unwrap();

    instance.set_mode(WriteMode::Buffering).unwrap();
    instance.insert(random_vectors(5, 8, 5), ids(50..55)).unwrap();
    instance.remove(vec![0, 1]).unwrap();
    assert_eq!(instance.count(), 20);
    assert!(!instance.contains(50));

    instance.set_mode(WriteMode::Normal).unwrap();
    assert_eq!(instance.count(), 23);
    assert!(instance.contains(50) && !instance.contains(0));
    assert!(!dir.path().join(V1).join("BUFFER").exists());

    // Drained operations were re-logged to the primary log.
    drop(instance);
    assert_eq!(open(dir.path(), 8, 4).count(), 23);
}

#[test]
fn test_leftover_buffer_drained_on_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(20, 8, 6), ids(0..20)).unwrap();
    instance.set_mode(WriteMode::Buffering).unwrap();
    instance.insert(random_vectors(4, 8, 7), ids(40..44)).unwrap();
    drop(instance);

    let recovered = open(dir.path(), 8, 4);
    assert_eq!(recovered.count(), 24);
    assert_eq!(recovered.mode(), WriteMode::Normal);
    assert!(!dir.path().join(V1).join("BUFFER").exists());
}

#[test]
fn test_interrupted_drain_resumes_from_marker() {
    let dir = tempfile::tempdir().unwrap();
    let v1 = dir.path().join(V1);
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(20, 8, 8), ids(0..20)).unwrap();

    instance.set_mode(WriteMode::Buffering).unwrap();
    instance.insert(random_vectors(2, 8, 9), ids(60..62)).unwrap();
    instance.insert(random_vectors(2, 8, 10), ids(70..72)).unwrap();
    let buffer = fs::read(v1.join("BUFFER")).unwrap();
    instance.set_mode(WriteMode::Normal).unwrap();
    drop(instance);

    // Recreate the state of a crash after the first buffered record reached
    // the primary log: buffer restored, marker at the pre-drain count.
    let aof = fs::read_to_string(v1.join("AOF")).unwrap();
    let lines: Vec<&str> = aof.lines().collect();
    assert_eq!(lines.len(), 3);
    fs::write(v1.join("AOF"), format!("{}\n{}\n", lines[0], lines[1])).unwrap();
    fs::write(v1.join("BUFFER"), buffer).unwrap();
    fs::write(v1.join("BUFFER.base"), "1").unwrap();

    let recovered = open(dir.path(), 8, 4);
    assert_eq!(recovered.count(), 24);
    assert!(recovered.contains(61) && recovered.contains(71));
    assert!(!v1.join("BUFFER.base").exists());

    let reader = AofReader::new(&v1, "AOF", LogTarget::Primary);
    assert_eq!(reader.count_operations().unwrap(), 3);
}

#[test]
fn test_abandoned_newer_version_adopted() {
    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(20, 8, 11), ids(0..20)).unwrap();
    drop(instance);

    let newer = version::next_version(Some(V1));
    let newer_dir = dir.path().join(&newer);
    fs::create_dir_all(newer_dir.join("data")).unwrap();
    AofWriter::new(&newer_dir, "BUFFER", "data", LogTarget::Buffer)
        .append(&Operation::Insert {
            vectors: random_vectors(3, 8, 12),
            ids: ids(80..83),
        })
        .unwrap();

    let recovered = open(dir.path(), 8, 4);
    assert_eq!(recovered.count(), 23);
    assert!(!newer_dir.exists());
    assert_eq!(recovered.version(), V1);

    // The adopted writes now live in the current primary log.
    drop(recovered);
    assert_eq!(open(dir.path(), 8, 4).count(), 23);
}

#[test]
fn test_torn_tail_ignored_and_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(20, 8, 13), ids(0..20)).unwrap();
    drop(instance);

    let mut aof = OpenOptions::new()
        .append(true)
        .open(dir.path().join(V1).join("AOF"))
        .unwrap();
    aof.write_all(b"2024-01-01 00:00:00.000000\tINSERT\tdata/01H").unwrap();
    drop(aof);

    let recovered = open(dir.path(), 8, 4);
    assert_eq!(recovered.count(), 20);
    recovered.insert(random_vectors(1, 8, 14), vec![99]).unwrap();
    drop(recovered);

    let again = open(dir.path(), 8, 4);
    assert_eq!(again.count(), 21);
    assert!(again.contains(99));
}

#[test]
fn test_backup_then_restart_on_new_version() {
    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(20, 8, 15), ids(0..20)).unwrap();
    let new_version = instance.backup(|_| Ok(())).unwrap();
    instance.insert(random_vectors(2, 8, 16), ids(30..32)).unwrap();
    drop(instance);

    let reopened =
        ant::instance::Instance::open(dir.path(), &new_version, params(8, 4)).unwrap();
    reopened.rebuild().unwrap();
    assert_eq!(reopened.count(), 22);
    assert_eq!(
        version::list_versions(dir.path()).unwrap(),
        vec![V1.to_string(), new_version]
    );
}

#[test]
fn test_writes_during_backups_survive_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let instance = open(dir.path(), 8, 4);
    instance.build(random_vectors(40, 8, 17), ids(0..40)).unwrap();
    let stop = AtomicBool::new(false);

    let last_version = thread::scope(|scope| {
        for writer in 0..3i64 {
            let (instance, stop) = (&instance, &stop);
            scope.spawn(move || {
                let base = 1_000 * (writer + 1);
                let mut next = base;
                let mut round = 0u64;
                while round < 5 || !stop.load(Ordering::Relaxed) {
                    let vectors = random_vectors(2, 8, 100 + writer as u64 * 10_000 + round);
                    instance.insert(vectors, vec![next, next + 1]).unwrap();
                    if round % 3 == 2 {
                        instance.remove(vec![next - 2, writer]).unwrap();
                    }
                    next += 2;
                    round += 1;
                }
            });
        }

        let mut last = V1.to_string();
        for _ in 0..15 {
            last = instance.backup(|_| Ok(())).unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        last
    });

    assert_eq!(instance.version(), last_version);
    assert_eq!(instance.mode(), WriteMode::Normal);
    let live = sorted_ids(&instance);
    assert!(live.len() > 40);
    assert!(!dir.path().join(&last_version).join("BUFFER").exists());
    drop(instance);

    let recovered =
        ant::instance::Instance::open(dir.path(), &last_version, params(8, 4)).unwrap();
    recovered.rebuild().unwrap();
    assert_eq!(sorted_ids(&recovered), live);
}
