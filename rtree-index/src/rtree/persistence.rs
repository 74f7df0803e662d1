//! Whole-tree byte image.
//!
//! Layout, encoded with bincode's legacy configuration (fixed-width little
//! endian integers):
//!
//! | field        | encoding                                         |
//! |--------------|--------------------------------------------------|
//! | max fanout   | `u32`                                            |
//! | envelope     | 4 × `f64` (min x, min y, max x, max y)           |
//! | root node    | `u64` entry count, then per entry a `u32` tag and |
//! |              | `{bbox, value}` (leaf) or `{bbox, node}` (inner)  |
//! | extra flag   | `bool`                                           |
//!
//! The format is private to this crate and only guaranteed to round-trip
//! within the same version.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::error::{DecodeError, EncodeError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;

use super::node::NodeSlots;
use super::rtree_impl::RTree;
use super::rtree_types::{RTreeConfig, SpatialError, SpatialResult};

#[derive(Serialize)]
struct ImageRef<'a, V> {
    max_fanout: u32,
    root_envelope: BoundingBox,
    root: &'a NodeSlots<V>,
    extra_flag: bool,
}

#[derive(Deserialize)]
struct Image<V> {
    max_fanout: u32,
    root_envelope: BoundingBox,
    root: NodeSlots<V>,
    extra_flag: bool,
}

impl<V: Serialize> RTree<V> {
    /// Encodes the whole tree into a byte vector.
    pub fn serialize(&self) -> SpatialResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self.image()?, bincode::config::legacy())
            .map_err(encode_error)
    }

    /// Encodes the whole tree into `writer`, returning the number of bytes written.
    pub fn serialize_into<W: Write>(&self, writer: &mut W) -> SpatialResult<usize> {
        bincode::serde::encode_into_std_write(self.image()?, writer, bincode::config::legacy())
            .map_err(encode_error)
    }

    /// Writes the tree to a file, replacing any previous content.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> SpatialResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        let written = self.serialize_into(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        log::debug!("Saved {} entries ({} bytes) to {:?}", self.len(), written, path);
        Ok(())
    }

    fn image(&self) -> SpatialResult<ImageRef<'_, V>> {
        let max_fanout = u32::try_from(self.max_fanout()).map_err(|_| {
            SpatialError::Serialization(format!(
                "max fanout {} does not fit the index format",
                self.max_fanout()
            ))
        })?;
        Ok(ImageRef {
            max_fanout,
            root_envelope: *self.root_envelope(),
            root: self.root(),
            extra_flag: self.extra_flag(),
        })
    }
}

impl<V: DeserializeOwned> RTree<V> {
    /// Decodes a tree previously produced by [`serialize`](RTree::serialize).
    ///
    /// # Errors
    /// - [`SpatialError::UnexpectedEndOfStream`] when `bytes` stops early
    /// - [`SpatialError::CorruptIndex`] for malformed data, trailing bytes or
    ///   an image that violates the tree invariants
    pub fn deserialize(bytes: &[u8]) -> SpatialResult<Self> {
        let (image, read): (Image<V>, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
                .map_err(decode_error)?;
        if read != bytes.len() {
            return Err(SpatialError::CorruptIndex(format!(
                "{} trailing bytes after the index image",
                bytes.len() - read
            )));
        }
        Self::from_image(image)
    }

    /// Decodes one tree image from `reader`, leaving anything after it unread.
    pub fn deserialize_from<R: Read>(reader: &mut R) -> SpatialResult<Self> {
        let image: Image<V> = bincode::serde::decode_from_std_read(reader, bincode::config::legacy())
            .map_err(decode_error)?;
        Self::from_image(image)
    }

    /// Loads a tree written by [`save_to_path`](RTree::save_to_path).
    pub fn load_from_path(path: impl AsRef<Path>) -> SpatialResult<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let tree = Self::deserialize_from(&mut reader)?;

        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(SpatialError::CorruptIndex(format!(
                "trailing bytes after the index image in {:?}",
                path
            )));
        }

        log::debug!("Loaded {} entries from {:?}", tree.len(), path);
        Ok(tree)
    }

    fn from_image(image: Image<V>) -> SpatialResult<Self> {
        let config = RTreeConfig::new(image.root_envelope).with_max_fanout(image.max_fanout as usize);
        Self::from_parts(config, image.root, image.extra_flag).map_err(|e| match e {
            corrupt @ SpatialError::CorruptIndex(_) => corrupt,
            other => SpatialError::CorruptIndex(other.to_string()),
        })
    }
}

fn encode_error(error: EncodeError) -> SpatialError {
    match error {
        EncodeError::Io { inner, .. } => SpatialError::Io(inner),
        other => SpatialError::Serialization(other.to_string()),
    }
}

fn decode_error(error: DecodeError) -> SpatialError {
    match error {
        DecodeError::UnexpectedEnd { .. } => SpatialError::UnexpectedEndOfStream,
        DecodeError::Io { inner, .. } if inner.kind() == io::ErrorKind::UnexpectedEof => {
            SpatialError::UnexpectedEndOfStream
        }
        DecodeError::Io { inner, .. } => SpatialError::Io(inner),
        other => SpatialError::CorruptIndex(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtree::rtree_constants::{MAX_MAX_FANOUT, MAX_TREE_HEIGHT};
    use std::io::Cursor;

    fn envelope() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 100.0, 100.0)
    }

    fn sample_tree() -> RTree<u32> {
        let mut tree = RTree::new(envelope(), 4).unwrap();
        for i in 0..12u32 {
            let x = (i % 4) as f64 * 10.0;
            let y = (i / 4) as f64 * 10.0;
            tree.insert(BoundingBox::new(x, y, x + 5.0, y + 5.0), i).unwrap();
        }
        tree.set_extra_flag(true);
        tree
    }

    fn sorted(mut values: Vec<u32>) -> Vec<u32> {
        values.sort();
        values
    }

    #[test]
    fn test_round_trip() {
        let tree = sample_tree();
        let bytes = tree.serialize().unwrap();
        let loaded: RTree<u32> = RTree::deserialize(&bytes).unwrap();

        assert_eq!(loaded.len(), 12);
        assert_eq!(loaded.max_fanout(), 4);
        assert_eq!(*loaded.root_envelope(), envelope());
        assert!(loaded.extra_flag());
        assert_eq!(loaded.height(), tree.height());
        for window in [
            envelope(),
            BoundingBox::new(8.0, 8.0, 22.0, 12.0),
            BoundingBox::new(90.0, 90.0, 95.0, 95.0),
        ] {
            assert_eq!(sorted(loaded.query(&window)), sorted(tree.query(&window)));
        }
        // re-encoding yields the same image
        assert_eq!(loaded.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_image_header_layout() {
        let tree = sample_tree();
        let bytes = tree.serialize().unwrap();
        assert_eq!(&bytes[0..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &0.0f64.to_le_bytes());
        assert_eq!(&bytes[20..28], &100.0f64.to_le_bytes());
        assert_eq!(bytes[bytes.len() - 1], 1);
    }

    #[test]
    fn test_empty_tree_round_trip() {
        let tree: RTree<u32> = RTree::new(envelope(), 8).unwrap();
        let bytes = tree.serialize().unwrap();
        // fanout + envelope + entry count + flag
        assert_eq!(bytes.len(), 4 + 32 + 8 + 1);
        let loaded: RTree<u32> = RTree::deserialize(&bytes).unwrap();
        assert!(loaded.is_empty());
        assert!(!loaded.extra_flag());
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = sample_tree().serialize().unwrap();
        for cut in [0, 3, 20, bytes.len() / 2, bytes.len() - 1] {
            let result = RTree::<u32>::deserialize(&bytes[..cut]);
            assert!(
                matches!(result, Err(SpatialError::UnexpectedEndOfStream)),
                "cut at {}",
                cut
            );
        }

        let mut reader = Cursor::new(&bytes[..bytes.len() - 5]);
        assert!(matches!(
            RTree::<u32>::deserialize_from(&mut reader),
            Err(SpatialError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn test_corrupt_flag_byte() {
        let mut bytes = sample_tree().serialize().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = sample_tree().serialize().unwrap();
        bytes.push(0);
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_invalid_fanout_in_image() {
        let mut bytes = sample_tree().serialize().unwrap();
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_image_violating_fanout_is_rejected() {
        // a well-formed stream whose root holds more entries than its fanout allows
        let mut tree: RTree<u32> = RTree::new(envelope(), 16).unwrap();
        for i in 0..6u32 {
            tree.insert(BoundingBox::new(i as f64, 0.0, i as f64 + 1.0, 1.0), i).unwrap();
        }
        let mut bytes = tree.serialize().unwrap();
        bytes[0..4].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    // Hand-built images in the legacy bincode layout.

    const LEAF_TAG: u32 = 0;
    const INTERNAL_TAG: u32 = 1;

    fn header(max_fanout: u32) -> Vec<u8> {
        let mut bytes = max_fanout.to_le_bytes().to_vec();
        for coordinate in [0.0f64, 0.0, 100.0, 100.0] {
            bytes.extend_from_slice(&coordinate.to_le_bytes());
        }
        bytes
    }

    fn push_count(bytes: &mut Vec<u8>, count: u64) {
        bytes.extend_from_slice(&count.to_le_bytes());
    }

    fn push_entry_head(bytes: &mut Vec<u8>, tag: u32, bbox: BoundingBox) {
        bytes.extend_from_slice(&tag.to_le_bytes());
        for coordinate in [bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y] {
            bytes.extend_from_slice(&coordinate.to_le_bytes());
        }
    }

    fn push_leaf(bytes: &mut Vec<u8>, bbox: BoundingBox, value: u32) {
        push_entry_head(bytes, LEAF_TAG, bbox);
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn unit(x: f64) -> BoundingBox {
        BoundingBox::new(x, x, x + 1.0, x + 1.0)
    }

    /// `levels` internal entries nested inside each other around an empty node.
    fn nested_image(levels: usize) -> Vec<u8> {
        let mut bytes = header(4);
        for _ in 0..levels {
            push_count(&mut bytes, 1);
            push_entry_head(&mut bytes, INTERNAL_TAG, unit(1.0));
        }
        push_count(&mut bytes, 0);
        bytes.push(0);
        bytes
    }

    #[test]
    fn test_hand_built_image_matches_encoder() {
        let mut tree: RTree<u32> = RTree::new(envelope(), 4).unwrap();
        tree.insert(unit(1.0), 11).unwrap();
        tree.insert(unit(5.0), 12).unwrap();

        let mut bytes = header(4);
        push_count(&mut bytes, 2);
        push_leaf(&mut bytes, unit(1.0), 11);
        push_leaf(&mut bytes, unit(5.0), 12);
        bytes.push(0);
        assert_eq!(tree.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_deeply_nested_image_is_rejected() {
        for levels in [MAX_TREE_HEIGHT, 20_000] {
            let result = RTree::<u32>::deserialize(&nested_image(levels));
            assert!(
                matches!(result, Err(SpatialError::CorruptIndex(_))),
                "{} levels",
                levels
            );
        }
        let mut reader = Cursor::new(nested_image(20_000));
        assert!(matches!(
            RTree::<u32>::deserialize_from(&mut reader),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_absurd_fanout_is_rejected() {
        for fanout in [u32::MAX, MAX_MAX_FANOUT as u32 + 1] {
            let mut bytes = header(fanout);
            push_count(&mut bytes, 0);
            bytes.push(0);
            assert!(matches!(
                RTree::<u32>::deserialize(&bytes),
                Err(SpatialError::CorruptIndex(_))
            ));
        }
    }

    #[test]
    fn test_absurd_entry_count_is_not_preallocated() {
        let mut bytes = header(4);
        push_count(&mut bytes, u64::MAX);
        push_leaf(&mut bytes, unit(1.0), 1);
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn test_underfull_inner_node_is_rejected() {
        // fanout 10 needs at least 2 entries per non-root node
        let mut bytes = header(10);
        push_count(&mut bytes, 2);
        push_entry_head(&mut bytes, INTERNAL_TAG, unit(1.0));
        push_count(&mut bytes, 1);
        push_leaf(&mut bytes, unit(1.0), 1);
        push_entry_head(&mut bytes, INTERNAL_TAG, BoundingBox::new(5.0, 5.0, 8.0, 8.0));
        push_count(&mut bytes, 2);
        push_leaf(&mut bytes, unit(5.0), 2);
        push_leaf(&mut bytes, unit(7.0), 3);
        bytes.push(0);
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_mixed_node_is_rejected() {
        let mut bytes = header(4);
        push_count(&mut bytes, 2);
        push_leaf(&mut bytes, unit(1.0), 1);
        push_entry_head(&mut bytes, INTERNAL_TAG, unit(5.0));
        push_count(&mut bytes, 1);
        push_leaf(&mut bytes, unit(5.0), 2);
        bytes.push(0);
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_unknown_entry_tag_is_rejected() {
        let mut bytes = header(4);
        push_count(&mut bytes, 1);
        push_entry_head(&mut bytes, 2, unit(1.0));
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.push(0);
        assert!(matches!(
            RTree::<u32>::deserialize(&bytes),
            Err(SpatialError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_stream_round_trip_leaves_rest_unread() {
        let tree = sample_tree();
        let mut buffer = Vec::new();
        let written = tree.serialize_into(&mut buffer).unwrap();
        assert_eq!(written, buffer.len());
        buffer.extend_from_slice(b"tail");

        let mut reader = Cursor::new(buffer);
        let loaded: RTree<u32> = RTree::deserialize_from(&mut reader).unwrap();
        assert_eq!(loaded.len(), 12);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"tail");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.rtree");
        let tree = sample_tree();
        tree.save_to_path(&path).unwrap();

        let loaded: RTree<u32> = RTree::load_from_path(&path).unwrap();
        assert_eq!(sorted(loaded.query(&envelope())), (0..12).collect::<Vec<_>>());
        loaded.check_invariants().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RTree::<u32>::load_from_path(dir.path().join("absent.rtree"));
        assert!(matches!(result, Err(SpatialError::Io(_))));
    }
}
