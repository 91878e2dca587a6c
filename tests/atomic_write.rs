mod common;

use common::Fixture;
use fs_primitives::{
    write_atomic, AtomicWriteOptions, Durability, OverwriteStrategy, WriteError,
};

#[test]
fn atomic_create_publishes_exact_bytes() {
    let fixture = Fixture::new();
    let dest = fixture.path("a");

    write_atomic(&[0x48, 0x69], &dest, &AtomicWriteOptions::default()).expect("atomic create");

    assert_eq!(fixture.read("a"), vec![0x48, 0x69]);
    assert!(fixture.temp_files().is_empty(), "temp files remain: {:?}", fixture.temp_files());
}

#[test]
fn atomic_replace_swaps_content_completely() {
    let fixture = Fixture::new();
    fixture.write_file("b", &[0x01, 0x02, 0x03]);

    write_atomic(&[0xff], fixture.path("b"), &AtomicWriteOptions::default())
        .expect("atomic replace");

    assert_eq!(fixture.read("b"), vec![0xff]);
}

#[test]
fn no_clobber_leaves_existing_bytes_untouched() {
    let fixture = Fixture::new();
    fixture.write_file("c", &[0x00]);

    let options =
        AtomicWriteOptions { strategy: OverwriteStrategy::NoClobber, ..Default::default() };
    let err =
        write_atomic(&[0x11], fixture.path("c"), &options).expect_err("destination exists");

    match err {
        WriteError::DestinationExists { path } => assert_eq!(path, fixture.path("c")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fixture.read("c"), vec![0x00]);
    assert!(fixture.temp_files().is_empty());
}

#[test]
fn overwrite_sequence_ends_with_the_last_write() {
    let fixture = Fixture::new();
    let dest = fixture.path("seq");

    write_atomic(b"x", &dest, &AtomicWriteOptions::default()).expect("first");
    write_atomic(b"y", &dest, &AtomicWriteOptions::default()).expect("second");

    assert_eq!(fixture.read("seq"), b"y");
}

#[test]
fn empty_bytes_produce_an_empty_file() {
    let fixture = Fixture::new();

    write_atomic(&[], fixture.path("empty"), &AtomicWriteOptions::default()).expect("write");

    assert_eq!(fixture.read("empty"), Vec::<u8>::new());
}

#[test]
fn parent_must_exist_unless_intermediates_are_requested() {
    let fixture = Fixture::new();
    let dest = fixture.path("missing/parent/file");

    let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default())
        .expect_err("parent missing");
    assert!(matches!(err, WriteError::Parent(_)));
    assert!(!dest.exists());

    let options = AtomicWriteOptions { create_intermediates: true, ..Default::default() };
    write_atomic(b"x", &dest, &options).expect("intermediates created");
    assert_eq!(std::fs::read(&dest).expect("read deep file"), b"x");
}

#[test]
fn large_payload_round_trips() {
    let fixture = Fixture::new();
    let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();

    write_atomic(&payload, fixture.path("big"), &AtomicWriteOptions::default())
        .expect("large write");

    assert_eq!(fixture.read("big"), payload);
    assert!(fixture.temp_files().is_empty());
}

#[test]
fn data_only_durability_still_publishes() {
    let fixture = Fixture::new();
    let options = AtomicWriteOptions { durability: Durability::DataOnly, ..Default::default() };

    write_atomic(b"data", fixture.path("d"), &options).expect("write");

    assert_eq!(fixture.read("d"), b"data");
}

#[test]
fn no_durability_still_publishes() {
    let fixture = Fixture::new();
    let options = AtomicWriteOptions { durability: Durability::None, ..Default::default() };

    write_atomic(b"fast", fixture.path("n"), &options).expect("write");

    assert_eq!(fixture.read("n"), b"fast");
}

#[cfg(unix)]
#[test]
fn replace_keeps_content_visible_to_an_open_reader() {
    use std::io::Read;

    let fixture = Fixture::new();
    fixture.write_file("shared", b"old content");
    let mut reader = std::fs::File::open(fixture.path("shared")).expect("open reader");

    write_atomic(b"new content", fixture.path("shared"), &AtomicWriteOptions::default())
        .expect("replace under reader");

    // The reader still sees the file it opened; the path sees the new one.
    let mut seen = String::new();
    reader.read_to_string(&mut seen).expect("read old file");
    assert_eq!(seen, "old content");
    assert_eq!(fixture.read("shared"), b"new content");
}

#[cfg(unix)]
#[test]
fn symlinked_parent_directory_is_accepted() {
    let fixture = Fixture::new();
    fixture.create_dir("real");
    std::os::unix::fs::symlink(fixture.path("real"), fixture.path("alias"))
        .expect("create symlink");

    write_atomic(b"via link", fixture.path("alias/file"), &AtomicWriteOptions::default())
        .expect("write through symlinked parent");

    assert_eq!(fixture.read("real/file"), b"via link");
}
