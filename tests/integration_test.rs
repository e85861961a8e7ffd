use std::fs;
use tempfile::tempdir;
use xzframe::archive::{self, CompressOptions, DecompressOptions};
use xzframe::{CheckType, CheckVerification, ErrorKind, Section, Stream, StreamParser, XzError};

/// `xz -C crc64` on empty input.
const EMPTY_CRC64: [u8; 32] = [
    0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x04, 0xE6, 0xD6, 0xB4, 0x46,
    0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21,
    0x1F, 0xB6, 0xF3, 0x7D, 0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0x59, 0x5A,
];

/// `xz -C crc32` on empty input.
const EMPTY_CRC32: [u8; 32] = [
    0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x01, 0x69, 0x22, 0xDE, 0x36,
    0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21,
    0x90, 0x42, 0x99, 0x0D, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5A,
];

fn sample_data() -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..2000u32 {
        data.extend_from_slice(format!("line {i}: some moderately repetitive text\n").as_bytes());
    }
    data
}

#[test]
fn test_empty_streams_match_reference_bytes() {
    let stream = Stream::from_bytes(&EMPTY_CRC64).unwrap();
    assert!(stream.blocks.is_empty());
    assert_eq!(stream.check_type(), CheckType::Crc64);
    assert_eq!(stream.footer.backward_size.real_size(), 8);
    assert_eq!(stream.to_bytes().unwrap(), EMPTY_CRC64);

    let opts = CompressOptions { check: CheckType::Crc32, ..Default::default() };
    assert_eq!(archive::compress(&[], &opts).unwrap().to_bytes().unwrap(), EMPTY_CRC32);
    assert_eq!(archive::compress(&[], &CompressOptions::default()).unwrap().to_bytes().unwrap(), EMPTY_CRC64);
}

#[test]
fn test_file_roundtrip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.txt");
    let packed = dir.path().join("input.txt.xz");
    let unpacked = dir.path().join("output.txt");

    let data = sample_data();
    fs::write(&input, &data).unwrap();

    let opts = CompressOptions { block_size: 16 * 1024, ..Default::default() };
    let stream = archive::compress_file(&input, &packed, &opts).unwrap();
    assert!(stream.blocks.len() > 1);
    assert_eq!(fs::metadata(&packed).unwrap().len(), stream.encoded_len());

    let written = archive::decompress_file(&packed, &unpacked, &DecompressOptions::default()).unwrap();
    assert_eq!(written, data.len() as u64);
    assert_eq!(fs::read(&unpacked).unwrap(), data);
}

#[test]
fn test_read_headers_and_json_dump() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.bin");
    let packed = dir.path().join("data.bin.xz");
    fs::write(&input, sample_data()).unwrap();

    let opts = CompressOptions { check: CheckType::Crc32, block_size: 32 * 1024, ..Default::default() };
    let written = archive::compress_file(&input, &packed, &opts).unwrap();
    let stream = archive::read_headers(&packed).unwrap();
    assert_eq!(stream, written);
    assert_eq!(stream.check_verification(), CheckVerification::Verified(CheckType::Crc32));

    let json = serde_json::to_value(&stream).unwrap();
    assert_eq!(json["header"]["flags"], serde_json::json!([0, 1]));
    assert_eq!(json["blocks"].as_array().unwrap().len(), stream.blocks.len());
    assert_eq!(json["blocks"][0]["header"]["filters"][0]["id"], 0x21);
    assert_eq!(json["blocks"][0]["header"]["filters"][0]["name"], "lzma2");
    assert_eq!(
        json["blocks"][0]["payload_len"],
        stream.blocks[0].compressed_data.len() as u64
    );
    assert_eq!(json["index"]["records"].as_array().unwrap().len(), stream.blocks.len());
}

#[test]
fn test_corrupted_payload_is_rejected() {
    let data = sample_data();
    let stream = archive::compress(&data, &CompressOptions::default()).unwrap();
    let mut bytes = stream.to_bytes().unwrap();

    let payload_at = stream.block_offsets()[0] as usize + stream.blocks[0].header.size();
    bytes[payload_at + 10] ^= 0x40;

    let err = Stream::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err.kind(), Some(ErrorKind::CrcMismatch { .. })));
    assert_eq!(err.section(), Some(Section::Block(0)));
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = tempdir().unwrap();
    let packed = dir.path().join("short.xz");
    let bytes = archive::compress(&sample_data(), &CompressOptions::default())
        .unwrap()
        .to_bytes()
        .unwrap();
    fs::write(&packed, &bytes[..bytes.len() - 5]).unwrap();

    let err = archive::read_headers(&packed).unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::Truncated));
    assert_eq!(err.section(), Some(Section::StreamFooter));

    let out = dir.path().join("never-written");
    assert!(archive::decompress_file(&packed, &out, &DecompressOptions::default()).is_err());
    assert!(!out.exists());
}

#[test]
fn test_bad_magic_reports_offset() {
    let mut bytes = EMPTY_CRC64;
    bytes[3] = b'Y';
    let err = Stream::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::BadHeaderMagic));
    assert_eq!(err.offset(), Some(0));

    let mut bytes = EMPTY_CRC64;
    bytes[31] = b'Y';
    let err = Stream::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.kind(), Some(&ErrorKind::BadFooterMagic));
    assert_eq!(err.section(), Some(Section::StreamFooter));
}

#[test]
fn test_parser_exposes_partial_stream() {
    let stream = archive::compress(&sample_data(), &CompressOptions { block_size: 20_000, ..Default::default() }).unwrap();
    let mut bytes = stream.to_bytes().unwrap();
    let index_at = stream.index_offset() as usize;
    bytes[index_at + 1] ^= 0x01;

    let mut parser = StreamParser::new(bytes.as_slice());
    let err = parser.run().unwrap_err();
    assert_eq!(err.section(), Some(Section::Index));

    let partial = parser.into_partial();
    assert_eq!(partial.blocks.len(), stream.blocks.len());
    assert!(partial.index.is_none());
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempdir().unwrap();
    let err = archive::read_headers(dir.path().join("absent.xz")).unwrap_err();
    assert!(matches!(err, XzError::Io(_)));
}
