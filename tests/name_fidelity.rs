mod common;

use std::collections::HashSet;

use common::Fixture;
use fs_primitives::{file_identity, Name, ReadDir};

#[test]
fn decoded_entries_reopen_the_same_object() {
    let fixture = Fixture::new();
    let names = ["plain.txt", "café.txt", "日本語.bin", "mixed é 空白.dat"];
    for (index, name) in names.iter().enumerate() {
        fixture.write_file(name, &[index as u8; 4]);
    }

    let mut seen = 0;
    for entry in ReadDir::open(fixture.root()).expect("open dir") {
        let entry = entry.expect("read entry");
        let path = entry.path().expect("all fixture names decode");

        // The joined path must name the very object the kernel listed.
        let via_entry = file_identity(path).expect("identity via entry path");
        let decoded = entry.name().decode().expect("strict decode");
        let via_join = file_identity(fixture.path(&decoded)).expect("identity via join");
        assert_eq!(via_entry, via_join);

        let content = std::fs::read(path).expect("reopen through entry path");
        assert_eq!(content.len(), 4);
        seen += 1;
    }
    assert_eq!(seen, names.len());
}

#[cfg(unix)]
#[test]
fn raw_name_bytes_survive_the_round_trip() {
    let fixture = Fixture::new();
    fixture.write_file("café.txt", b"x");

    let entries: Vec<_> = ReadDir::open(fixture.root())
        .expect("open dir")
        .map(|entry| entry.expect("read entry"))
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name().as_bytes(), "café.txt".as_bytes());
}

#[test]
fn names_compare_and_hash_by_raw_content() {
    let fixture = Fixture::new();
    fixture.write_file("a", b"");
    fixture.write_file("b", b"");

    let first: HashSet<Name> = ReadDir::open(fixture.root())
        .expect("open dir")
        .map(|entry| entry.expect("read entry").name().clone())
        .collect();
    let second: HashSet<Name> = ReadDir::open(fixture.root())
        .expect("open dir")
        .map(|entry| entry.expect("read entry").name().clone())
        .collect();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn lossy_decoding_is_display_only() {
    let fixture = Fixture::new();
    fixture.write_file("good.txt", b"x");

    for entry in ReadDir::open(fixture.root()).expect("open dir") {
        let entry = entry.expect("read entry");
        // For decodable names, strict and lossy agree.
        assert_eq!(entry.name().decode().expect("decodes"), entry.name().decode_lossy());
        assert!(entry.name().decode_validating().is_ok());
    }
}
