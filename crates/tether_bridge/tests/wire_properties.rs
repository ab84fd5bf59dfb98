//! Randomized checks on the codecs: damaged input never panics, and what
//! survives damage is exactly what was sent.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tether_bridge::protocol::{
    decode_frame, decode_text, encode_bundle, encode_command, encode_geometry_frame, Arg,
    ByteWriter, Decoded, GeometryDecoder,
};
use tether_bridge::{
    AxisUpdate, Frame, GeometryRecord, GeometryUpdate, ObjectHandle, Quaternion, Vec3,
};

const ROUNDS: usize = 500;

fn random_vec(rng: &mut StdRng) -> Vec3 {
    Vec3::new(
        rng.gen_range(-1000.0..1000.0),
        rng.gen_range(-1000.0..1000.0),
        rng.gen_range(-1000.0..1000.0),
    )
}

fn random_update(rng: &mut StdRng) -> GeometryUpdate {
    let mut update = GeometryUpdate::new();
    if rng.gen_bool(0.5) {
        update.scale = Some(AxisUpdate { value: random_vec(rng), snap: rng.gen() });
    }
    if rng.gen_bool(0.5) {
        let q = Quaternion::new(rng.gen(), rng.gen(), rng.gen(), 0.1 + rng.gen::<f32>()).normalize();
        update.rotation = Some(AxisUpdate { value: q, snap: rng.gen() });
    }
    if rng.gen_bool(0.5) || update.is_empty() {
        update.translation = Some(AxisUpdate { value: random_vec(rng), snap: rng.gen() });
    }
    update
}

fn random_records(rng: &mut StdRng) -> Vec<GeometryRecord> {
    (0..rng.gen_range(1..40))
        .map(|_| GeometryRecord::new(ObjectHandle(rng.gen_range(100..1_000_000)), random_update(rng)))
        .collect()
}

#[test]
fn test_truncated_geometry_yields_prefix() {
    let mut rng = StdRng::seed_from_u64(0x7e7);
    let mut writer = ByteWriter::new();
    for _ in 0..ROUNDS {
        let records = random_records(&mut rng);
        encode_geometry_frame(&mut writer, 1_000, &records);
        let full = writer.as_slice().to_vec();
        let cut = rng.gen_range(0..=full.len());

        let Ok(Decoded::Geometry { records: decoded, fault, .. }) =
            decode_frame(&Frame::Binary(full[..cut].to_vec()))
        else {
            // Cut inside the ASCII header.
            continue;
        };
        assert!(decoded.len() <= records.len());
        assert_eq!(decoded[..], records[..decoded.len()]);
        if decoded.len() < records.len() && fault.is_none() {
            // A clean stop only happens on a record boundary.
            let consumed: usize = records[..decoded.len()]
                .iter()
                .map(|r| r.update.encoded_len())
                .sum();
            let header_len = full.len()
                - records.iter().map(|r| r.update.encoded_len()).sum::<usize>();
            assert_eq!(cut, header_len + consumed);
        }
    }
}

#[test]
fn test_random_payload_never_panics() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..ROUNDS {
        let len = rng.gen_range(0..256);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let mut decoded = 0;
        for result in GeometryDecoder::new(&payload) {
            if result.is_err() {
                break;
            }
            decoded += 1;
        }
        assert!(decoded * 4 <= payload.len());
    }
}

#[test]
fn test_merge_keeps_latest_per_axis() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..ROUNDS {
        let updates: Vec<GeometryUpdate> =
            (0..rng.gen_range(1..8)).map(|_| random_update(&mut rng)).collect();
        let mut merged = GeometryUpdate::new();
        for update in &updates {
            merged.merge(update);
        }
        let last_scale = updates.iter().rev().find_map(|u| u.scale);
        let last_rotation = updates.iter().rev().find_map(|u| u.rotation);
        let last_translation = updates.iter().rev().find_map(|u| u.translation);
        assert_eq!(merged.scale, last_scale);
        assert_eq!(merged.rotation, last_rotation);
        assert_eq!(merged.translation, last_translation);
    }
}

#[test]
fn test_bundles_preserve_order_and_arguments() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..ROUNDS {
        let count = rng.gen_range(2..12);
        let originals: Vec<(String, Vec<String>)> = (0..count)
            .map(|i| {
                let args = (0..rng.gen_range(0..4))
                    .map(|_| format!("{}", rng.gen_range(-1.0e6..1.0e6_f64)))
                    .collect();
                (format!("cmd{i}"), args)
            })
            .collect();
        let encoded: Vec<String> = originals
            .iter()
            .map(|(name, args)| {
                let args: Vec<Arg> = args.iter().map(Arg::from).collect();
                encode_command(name, &args)
            })
            .collect();
        let bundle = encode_bundle(123, &encoded);

        let commands = decode_text(&bundle).unwrap().into_commands();
        assert_eq!(commands.len(), originals.len());
        for (command, (name, args)) in commands.iter().zip(&originals) {
            assert_eq!(&command.name, name);
            assert_eq!(&command.args, args);
        }
    }
}
