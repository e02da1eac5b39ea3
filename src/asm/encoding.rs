//! Formatters which can read and write assembled images.
//!
//! The [`ImageFormat`] trait describes an implementation of reading/writing
//! the two image streams (instruction words and data bytes).
//! This module provides two implementations of the trait:
//! - [`HexFormat`]: one hex value per line, as read by `$readmemh`-style loaders
//! - [`BinaryFormat`]: a packed binary representation
//!
//! # Example
//! ```
//! use gumnut_sim::asm::assemble;
//! use gumnut_sim::asm::encoding::{HexFormat, ImageFormat};
//!
//! let image = assemble("add r1, r2, 0x12\nbyte 7").unwrap();
//! let text = HexFormat::serialize_instr(&image.instr()[..1]);
//! assert_eq!(text, "00a12\n");
//! assert_eq!(HexFormat::deserialize_instr(&text), Some(vec![0x00A12]));
//! ```

use std::fmt::Write;

use crate::ast::sim::WORD_BITS;

use super::Image;

/// A trait defining image formats.
pub trait ImageFormat {
    /// Representation of the serialized format.
    ///
    /// For binary formats, `[u8]` should be used.
    /// For text-based formats, `str` should be used.
    type Stream: ToOwned + ?Sized;

    /// Serializes instruction words into the stream format.
    fn serialize_instr(words: &[u32]) -> <Self::Stream as ToOwned>::Owned;
    /// Serializes data bytes into the stream format.
    fn serialize_data(bytes: &[u8]) -> <Self::Stream as ToOwned>::Owned;
    /// Deserializes instruction words from the stream format, returning `None`
    /// if an error occurred during deserialization.
    fn deserialize_instr(i: &Self::Stream) -> Option<Vec<u32>>;
    /// Deserializes data bytes from the stream format, returning `None`
    /// if an error occurred during deserialization.
    fn deserialize_data(i: &Self::Stream) -> Option<Vec<u8>>;

    /// Serializes both streams of an image.
    fn serialize(image: &Image) -> (<Self::Stream as ToOwned>::Owned, <Self::Stream as ToOwned>::Owned) {
        (Self::serialize_instr(image.instr()), Self::serialize_data(image.data()))
    }
    /// Deserializes both streams into an image (without debug information).
    fn deserialize(instr: &Self::Stream, data: &Self::Stream) -> Option<Image> {
        let words = Self::deserialize_instr(instr)?;
        let bytes = Self::deserialize_data(data)?;
        Image::from_raw(&words, &bytes).ok()
    }
}

fn fits_word(word: u32) -> bool {
    word >> WORD_BITS == 0
}

// TEXT!
/// A text format of image data.
///
/// Each word is written as 5 hex digits and each byte as 2 hex digits,
/// one per line. Blank lines are ignored when reading.
pub struct HexFormat;

impl ImageFormat for HexFormat {
    type Stream = str;

    fn serialize_instr(words: &[u32]) -> String {
        let mut out = String::with_capacity(words.len() * 6);
        for word in words {
            // writing to a String cannot fail
            let _ = writeln!(out, "{word:05x}");
        }
        out
    }

    fn serialize_data(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 3);
        for byte in bytes {
            let _ = writeln!(out, "{byte:02x}");
        }
        out
    }

    fn deserialize_instr(string: &str) -> Option<Vec<u32>> {
        hex_lines(string)
            .map(|s| u32::from_str_radix(s, 16).ok().filter(|&w| fits_word(w)))
            .collect()
    }

    fn deserialize_data(string: &str) -> Option<Vec<u8>> {
        hex_lines(string)
            .map(|s| u8::from_str_radix(s, 16).ok())
            .collect()
    }
}
fn hex_lines(string: &str) -> impl Iterator<Item=&str> {
    string.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

// BINARY!
/// A binary format of image data.
///
/// Each word is written as 3 little-endian bytes. Data bytes are written as-is.
pub struct BinaryFormat;

impl ImageFormat for BinaryFormat {
    type Stream = [u8];

    fn serialize_instr(words: &[u32]) -> Vec<u8> {
        words.iter()
            .flat_map(|w| {
                let [b0, b1, b2, _] = w.to_le_bytes();
                [b0, b1, b2]
            })
            .collect()
    }

    fn serialize_data(bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn deserialize_instr(vec: &[u8]) -> Option<Vec<u32>> {
        let chunks = vec.chunks_exact(3);
        if !chunks.remainder().is_empty() { return None; }

        chunks
            .map(|c| {
                let word = u32::from_le_bytes([c[0], c[1], c[2], 0]);
                fits_word(word).then_some(word)
            })
            .collect()
    }

    fn deserialize_data(vec: &[u8]) -> Option<Vec<u8>> {
        Some(vec.to_vec())
    }
}
