//! End-to-end codec exercises: descriptors are serialized, parsed back,
//! materialized against a slice, and driven through write-then-read cycles.

use htx_codecs::{
    BlockBinder, CompressionHeaderMap, DataSeriesId, Encoding, SliceReader, SliceWriter,
};
use htx_core::bits::{BitReader, BitWriter};
use htx_core::HtxError;

/// Build the codec twice, from the original descriptor and from its
/// serialized-then-parsed twin, and check both produce identical bytes.
fn assert_descriptor_identity(encoding: &Encoding, values: &[i32]) {
    let params = encoding.serialize_params().unwrap();
    let reparsed = Encoding::parse(encoding.id(), &params).unwrap();
    assert_eq!(&reparsed, encoding);

    let mut streams = Vec::new();
    for e in [encoding, &reparsed] {
        let mut binder = BlockBinder::new(vec![1]);
        let codec = e.build_int(&mut binder).unwrap();
        let mut slice = SliceWriter::new();
        for &v in values {
            codec.write(&mut slice, v).unwrap();
        }
        let (core, external) = slice.finish().unwrap();
        streams.push((core, external.get(&1).cloned().unwrap_or_default()));
    }
    assert_eq!(streams[0], streams[1]);
}

#[test]
fn equal_descriptors_produce_identical_streams() {
    let values = [0, 1, 2, 3, 100, 1000, 65_536];
    assert_descriptor_identity(&Encoding::Gamma { offset: 1 }, &values);
    assert_descriptor_identity(&Encoding::Subexponential { offset: 0, k: 2 }, &values);
    assert_descriptor_identity(&Encoding::Golomb { offset: 0, m: 10 }, &values);
    assert_descriptor_identity(&Encoding::GolombRice { offset: 0, log2m: 4 }, &values);
    assert_descriptor_identity(&Encoding::External { content_id: 1 }, &values);
}

#[test]
fn int_codecs_roundtrip_through_a_slice() {
    let encodings = [
        Encoding::Gamma { offset: 5 },
        Encoding::Subexponential { offset: 4, k: 3 },
        Encoding::Golomb { offset: 2, m: 7 },
        Encoding::GolombRice { offset: 2, log2m: 2 },
        Encoding::Beta {
            offset: 4,
            width: 16,
        },
        Encoding::External { content_id: 1 },
    ];
    let values = [-2, 0, 1, 17, 255, 40_000];

    for encoding in encodings {
        let mut binder = BlockBinder::new(vec![1]);
        let codec = encoding.build_int(&mut binder).unwrap();

        let mut writer = SliceWriter::new();
        for &v in &values {
            codec.write(&mut writer, v).unwrap();
        }
        let (core, external) = writer.finish().unwrap();

        let mut reader = SliceReader::new(
            core.as_slice(),
            external.iter().map(|(&id, data)| (id, data.as_slice())),
        );
        for &v in &values {
            assert_eq!(codec.read(&mut reader).unwrap(), v, "{:?}", encoding.id());
        }
    }
}

#[test]
fn canonical_huffman_reference_stream() {
    // Symbols A..E with lengths [2, 2, 2, 3, 3] canonicalize to
    // A=00 B=01 C=10 D=110 E=111; ABACDE packs to 0x12 0xDC.
    let encoding = Encoding::Huffman {
        symbols: vec![b'A' as i32, b'B' as i32, b'C' as i32, b'D' as i32, b'E' as i32],
        lengths: vec![2, 2, 2, 3, 3],
    };
    let mut binder = BlockBinder::new(Vec::new());
    let codec = encoding.build_byte(&mut binder).unwrap();

    let mut writer = SliceWriter::new();
    for b in *b"ABACDE" {
        codec.write(&mut writer, b).unwrap();
    }
    let (core, _) = writer.finish().unwrap();
    assert_eq!(core, vec![0x12, 0xDC]);

    let mut reader = SliceReader::new(core.as_slice(), Vec::new());
    let decoded: Vec<u8> = (0..6).map(|_| codec.read(&mut reader).unwrap()).collect();
    assert_eq!(decoded, b"ABACDE");
}

#[test]
fn byte_array_len_composes_inner_codecs() {
    let encoding = Encoding::ByteArrayLen {
        lengths: Box::new(Encoding::Gamma { offset: 1 }),
        values: Box::new(Encoding::External { content_id: 9 }),
    };
    let arrays: [&[u8]; 3] = [b"", b"ACGT", b"a longer read name"];

    let mut binder = BlockBinder::new(vec![9]);
    let codec = encoding.build_byte_array(&mut binder).unwrap();

    let mut writer = SliceWriter::new();
    for a in arrays {
        codec.write(&mut writer, a).unwrap();
    }
    let (core, external) = writer.finish().unwrap();

    let mut reader = SliceReader::new(
        core.as_slice(),
        external.iter().map(|(&id, data)| (id, data.as_slice())),
    );
    for a in arrays {
        assert_eq!(codec.read(&mut reader).unwrap(), a);
    }
}

#[test]
fn byte_array_stop_roundtrip_and_read_n_refusal() {
    let encoding = Encoding::ByteArrayStop {
        stop_byte: 0,
        content_id: 4,
    };
    let mut binder = BlockBinder::new(vec![4]);
    let codec = encoding.build_byte_array(&mut binder).unwrap();

    let mut writer = SliceWriter::new();
    codec.write(&mut writer, b"chrM").unwrap();
    codec.write(&mut writer, b"chr1").unwrap();
    let (core, external) = writer.finish().unwrap();

    let mut reader = SliceReader::new(
        core.as_slice(),
        external.iter().map(|(&id, data)| (id, data.as_slice())),
    );
    assert_eq!(codec.read(&mut reader).unwrap(), b"chrM");
    assert_eq!(codec.read(&mut reader).unwrap(), b"chr1");
    assert!(matches!(
        codec.read_n(&mut reader, 4),
        Err(HtxError::NotApplicable { .. })
    ));
}

#[test]
fn factory_enforces_single_ownership_of_blocks() {
    let mut binder = BlockBinder::new(vec![1]);
    Encoding::External { content_id: 1 }
        .build_int(&mut binder)
        .unwrap();

    // Same block again: refused.
    assert!(matches!(
        Encoding::External { content_id: 1 }.build_byte(&mut binder),
        Err(HtxError::BlockInUse { content_id: 1 })
    ));

    // Unknown block: refused.
    assert!(matches!(
        Encoding::External { content_id: 2 }.build_long(&mut binder),
        Err(HtxError::MissingExternalBlock { content_id: 2 })
    ));
}

#[test]
fn long_series_roundtrip_via_ltf8_block() {
    let encoding = Encoding::External { content_id: 11 };
    let mut binder = BlockBinder::new(vec![11]);
    let codec = encoding.build_long(&mut binder).unwrap();

    let values = [0i64, 1, -1, 1 << 40, i64::MAX];
    let mut writer = SliceWriter::new();
    for &v in &values {
        codec.write(&mut writer, v).unwrap();
    }
    let (core, external) = writer.finish().unwrap();

    let mut reader = SliceReader::new(
        core.as_slice(),
        external.iter().map(|(&id, data)| (id, data.as_slice())),
    );
    for &v in &values {
        assert_eq!(codec.read(&mut reader).unwrap(), v);
    }
}

#[test]
fn compression_map_drives_a_mixed_slice() {
    let mut map = CompressionHeaderMap::new();
    map.insert(DataSeriesId(*b"RL"), Encoding::Gamma { offset: 1 });
    map.insert(
        DataSeriesId(*b"RN"),
        Encoding::ByteArrayStop {
            stop_byte: b'\t',
            content_id: 2,
        },
    );
    map.insert(DataSeriesId(*b"MQ"), Encoding::External { content_id: 3 });

    // Serialize the map as a slice header would, parse it back, and build
    // the codec table from the parsed copy.
    let mut header = Vec::new();
    map.serialize(&mut header).unwrap();
    let map = CompressionHeaderMap::parse(&mut header.as_slice()).unwrap();

    let mut binder = BlockBinder::new(vec![2, 3]);
    let read_len = map
        .get(DataSeriesId(*b"RL"))
        .unwrap()
        .build_int(&mut binder)
        .unwrap();
    let read_name = map
        .get(DataSeriesId(*b"RN"))
        .unwrap()
        .build_byte_array(&mut binder)
        .unwrap();
    let mapping_quality = map
        .get(DataSeriesId(*b"MQ"))
        .unwrap()
        .build_int(&mut binder)
        .unwrap();

    let records = [(100, &b"read.1"[..], 60), (151, &b"read.2"[..], 0)];

    let mut writer = SliceWriter::new();
    for (len, name, mq) in records {
        read_len.write(&mut writer, len).unwrap();
        read_name.write(&mut writer, name).unwrap();
        mapping_quality.write(&mut writer, mq).unwrap();
    }
    let (core, external) = writer.finish().unwrap();

    let mut reader = SliceReader::new(
        core.as_slice(),
        external.iter().map(|(&id, data)| (id, data.as_slice())),
    );
    for (len, name, mq) in records {
        assert_eq!(read_len.read(&mut reader).unwrap(), len);
        assert_eq!(read_name.read(&mut reader).unwrap(), name);
        assert_eq!(mapping_quality.read(&mut reader).unwrap(), mq);
    }
}

#[test]
fn write_after_error_leaves_codec_usable_for_inspection_only() {
    // A beta codec refuses out-of-range values without touching the
    // stream position for the failed write.
    let encoding = Encoding::Beta {
        offset: 0,
        width: 4,
    };
    let mut binder = BlockBinder::new(Vec::new());
    let codec = encoding.build_int(&mut binder).unwrap();

    let mut writer = SliceWriter::new();
    codec.write(&mut writer, 15).unwrap();
    assert!(codec.write(&mut writer, 16).is_err());
    codec.write(&mut writer, 1).unwrap();
    let (core, _) = writer.finish().unwrap();

    let mut r = BitReader::new(core.as_slice());
    assert_eq!(r.read_bits(4).unwrap(), 15);
    assert_eq!(r.read_bits(4).unwrap(), 1);
}

#[test]
fn bit_stream_flush_byte_count() {
    let mut out = Vec::new();
    let mut w = BitWriter::new(&mut out);
    for i in 0..10u32 {
        w.write_bits(i, 3).unwrap();
    }
    w.flush().unwrap();
    // 30 bits -> 4 bytes.
    assert_eq!(out.len(), 4);
}
