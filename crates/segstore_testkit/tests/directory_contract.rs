//! Behaviour shared by every directory implementation.

use segstore_testkit::prelude::*;
use std::sync::Arc;

const PAYLOAD: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Every directory flavour, with whatever keeps it alive.
fn directories() -> Vec<(&'static str, TestDirectory, Arc<dyn Directory>)> {
    let mut out = Vec::new();

    let ram = TestDirectory::memory();
    let dir = ram.directory();
    out.push(("ram", ram, dir));

    for (label, mode) in [
        ("fs-auto", ReadMode::Auto),
        ("fs-mmap", ReadMode::Mmap),
        ("fs-buffered", ReadMode::Buffered),
    ] {
        let fs = TestDirectory::file_with_config(
            DirectoryConfig::new().read_mode(mode).read_buffer_size(8),
        );
        let dir = fs.directory();
        out.push((label, fs, dir));
    }

    let tracked = TestDirectory::memory();
    let dir: Arc<dyn Directory> = Arc::new(TrackingDirectory::new(tracked.directory()));
    out.push(("tracking", tracked, dir));

    let mocked = TestDirectory::memory();
    let dir: Arc<dyn Directory> = Arc::new(MockDirectory::new(mocked.directory()));
    out.push(("mock", mocked, dir));

    out
}

fn write_file(dir: &dyn Directory, name: &str, bytes: &[u8]) {
    let mut out = dir.create_output(name).unwrap();
    out.write_bytes(bytes).unwrap();
    out.close().unwrap();
}

#[test]
fn written_bytes_read_back() {
    for (label, _guard, dir) in directories() {
        write_file(dir.as_ref(), "_0.bin", PAYLOAD);
        assert_eq!(dir.file_length("_0.bin").unwrap(), PAYLOAD.len() as u64, "{label}");

        let mut input = dir.open_input("_0.bin").unwrap();
        assert_eq!(input.len(), PAYLOAD.len() as u64, "{label}");
        let mut buf = vec![0u8; PAYLOAD.len()];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, PAYLOAD, "{label}");
        assert_eq!(input.position(), PAYLOAD.len() as u64, "{label}");
        input.close().unwrap();
    }
}

#[test]
fn clones_have_independent_cursors() {
    for (label, _guard, dir) in directories() {
        write_file(dir.as_ref(), "_0.bin", PAYLOAD);
        let mut input = dir.open_input("_0.bin").unwrap();
        input.seek(10).unwrap();
        assert!(!input.is_clone(), "{label}");

        let mut clone = input.clone_input();
        assert!(clone.is_clone(), "{label}");
        assert_eq!(clone.position(), 0, "{label}");
        assert_eq!(clone.read_byte().unwrap(), b'0', "{label}");
        clone.seek(20).unwrap();
        assert_eq!(clone.read_byte().unwrap(), PAYLOAD[20], "{label}");

        assert_eq!(input.position(), 10, "{label}");
        assert_eq!(input.read_byte().unwrap(), PAYLOAD[10], "{label}");
        input.close().unwrap();
    }
}

#[test]
fn closing_clones_keeps_the_original_readable() {
    for (label, _guard, dir) in directories() {
        write_file(dir.as_ref(), "_0.bin", PAYLOAD);
        let mut input = dir.open_input("_0.bin").unwrap();

        for _ in 0..5 {
            let mut clone = input.clone_input();
            clone.read_byte().unwrap();
            clone.close().unwrap();
            let mut slice = input.slice("part", 4, 8).unwrap();
            slice.close().unwrap();
        }

        input.seek(PAYLOAD.len() as u64 - 1).unwrap();
        assert_eq!(input.read_byte().unwrap(), b'z', "{label}");
        input.close().unwrap();
    }
}

#[test]
fn clones_stop_working_after_the_original_closes() {
    for (label, _guard, dir) in directories() {
        write_file(dir.as_ref(), "_0.bin", PAYLOAD);
        let mut input = dir.open_input("_0.bin").unwrap();
        let mut clone = input.clone_input();
        input.close().unwrap();

        let err = clone.read_byte().unwrap_err();
        assert!(
            matches!(err, StoreError::AlreadyClosed { .. }),
            "{label}: unexpected error {err}"
        );
        assert!(input.read_byte().is_err(), "{label}");

        let mut other = dir.open_input("_0.bin").unwrap();
        assert_eq!(other.read_byte().unwrap(), b'0', "{label}");
        other.close().unwrap();
    }
}

#[test]
fn slices_are_bounded() {
    for (label, _guard, dir) in directories() {
        write_file(dir.as_ref(), "_0.bin", PAYLOAD);
        let input = dir.open_input("_0.bin").unwrap();

        let mut slice = input.slice("middle", 10, 4).unwrap();
        assert_eq!(slice.len(), 4, "{label}");
        let mut buf = [0u8; 4];
        slice.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"abcd", "{label}");
        assert!(slice.read_byte().unwrap_err().is_end_of_input(), "{label}");

        assert!(input.slice("past", 30, 10).is_err(), "{label}");
    }
}

#[test]
fn reading_past_the_end_is_end_of_input() {
    for (label, _guard, dir) in directories() {
        write_file(dir.as_ref(), "_0.bin", b"abc");
        let mut input = dir.open_input("_0.bin").unwrap();
        let mut buf = [0u8; 4];
        let err = input.read_bytes(&mut buf).unwrap_err();
        assert!(err.is_end_of_input(), "{label}: unexpected error {err}");
        input.close().unwrap();
    }
}

#[test]
fn missing_and_existing_files() {
    for (label, _guard, dir) in directories() {
        assert!(dir.open_input("_9.bin").unwrap_err().is_not_found(), "{label}");
        assert!(dir.file_length("_9.bin").unwrap_err().is_not_found(), "{label}");
        assert!(!dir.file_exists("_9.bin").unwrap(), "{label}");

        write_file(dir.as_ref(), "_1.bin", b"x");
        assert!(
            matches!(
                dir.create_output("_1.bin").unwrap_err(),
                StoreError::AlreadyExists { .. }
            ),
            "{label}"
        );
    }
}

#[test]
fn list_and_delete() {
    for (label, _guard, dir) in directories() {
        for name in ["_2.b", "_0.c", "_1.a"] {
            write_file(dir.as_ref(), name, b"data");
        }
        dir.sync(&["_0.c".to_string()]).unwrap();
        assert_eq!(dir.list_all().unwrap(), vec!["_0.c", "_1.a", "_2.b"], "{label}");

        dir.delete_file("_1.a").unwrap();
        assert!(!dir.file_exists("_1.a").unwrap(), "{label}");
        assert!(dir.delete_file("_1.a").unwrap_err().is_not_found(), "{label}");
        assert_eq!(dir.list_all().unwrap(), vec!["_0.c", "_2.b"], "{label}");
    }
}

#[test]
fn tracking_directory_records_created_files() {
    let tracking = TrackingDirectory::new(Arc::new(RamDirectory::new()));
    write_file(&tracking, "_0.fnm", b"x");
    write_file(&tracking, "_0_Plain_0.pst", b"y");
    assert_eq!(
        tracking.created_files().into_iter().collect::<Vec<_>>(),
        vec!["_0.fnm", "_0_Plain_0.pst"]
    );
}

#[test]
fn mock_directory_counts_leaked_inputs() {
    let mock = MockDirectory::in_memory();
    write_file(&mock, "_0.bin", PAYLOAD);

    let mut closed = mock.open_input("_0.bin").unwrap();
    let leaked = mock.open_input("_0.bin").unwrap();
    let clone = closed.clone_input();
    drop(clone);
    closed.close().unwrap();
    drop(leaked);

    assert_eq!(mock.inputs_opened(), 2);
    assert_eq!(mock.inputs_closed(), 1);
    assert_eq!(mock.inputs_leaked(), 1);
}

#[test]
fn whole_segment_round_trips_on_every_directory() {
    init_tracing();
    for (_label, _guard, dir) in directories() {
        let mut harness = SegmentHarness::new(dir, 3);
        let postings: Arc<dyn PostingsFormat> = Arc::new(PlainPostingsFormat::new());
        let doc_values: Arc<dyn DocValuesFormat> = Arc::new(PlainDocValuesFormat::new());
        harness
            .add_postings_field("body", IndexOptions::Docs, postings, simple_terms(&["a", "b"]))
            .add_doc_values_field(
                "title",
                doc_values,
                DocValuesData::Binary(vec![Some(b"t".to_vec()), None, Some(Vec::new())]),
            );
        harness.round_trip();
    }
}
