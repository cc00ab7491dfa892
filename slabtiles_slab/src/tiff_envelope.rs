//! Minimal TIFF envelope for single tiles.
//!
//! Tiles served as-is (raw, LZW, deflate, PackBits) are not self-describing,
//! so downstream consumers get them wrapped in a small single-strip TIFF
//! header. JPEG and PNG payloads are already complete files and never pass
//! through here.

use anyhow::{Result, ensure};
use byteorder::{ByteOrder, LittleEndian};
use slabtiles_core::{Blob, PixelFormat};

const TIFF_SHORT: u16 = 3;
const TIFF_LONG: u16 = 4;

struct IfdWriter {
	data: Vec<u8>,
	position: usize,
}

impl IfdWriter {
	fn tag(&mut self, tag: u16, kind: u16, count: u32, value: u32) {
		LittleEndian::write_u16(&mut self.data[self.position..], tag);
		LittleEndian::write_u16(&mut self.data[self.position + 2..], kind);
		LittleEndian::write_u32(&mut self.data[self.position + 4..], count);
		LittleEndian::write_u32(&mut self.data[self.position + 8..], value);
		self.position += 12;
	}

	fn shorts(&mut self, tag: u16, values: &[u16], overflow_offset: &mut u32) {
		if values.len() <= 2 {
			LittleEndian::write_u16(&mut self.data[self.position..], tag);
			LittleEndian::write_u16(&mut self.data[self.position + 2..], TIFF_SHORT);
			LittleEndian::write_u32(&mut self.data[self.position + 4..], values.len() as u32);
			for (i, &value) in values.iter().enumerate() {
				LittleEndian::write_u16(&mut self.data[self.position + 8 + 2 * i..], value);
			}
			self.position += 12;
		} else {
			// values overflow the tag, store them behind the IFD
			self.tag(tag, TIFF_SHORT, values.len() as u32, *overflow_offset);
			for (i, &value) in values.iter().enumerate() {
				LittleEndian::write_u16(&mut self.data[*overflow_offset as usize + 2 * i..], value);
			}
			*overflow_offset += 2 * values.len() as u32;
		}
	}
}

/// Wraps one encoded tile payload in a minimal single-strip TIFF.
pub fn tiff_envelope(payload: &[u8], format: &PixelFormat, width: u32, height: u32) -> Result<Blob> {
	ensure!(
		!format.compression.is_self_describing(),
		"{} tiles are served without a TIFF envelope",
		format.compression
	);

	let channels = format.channels;
	let mut entries = 10u16;
	if channels == 4 || channels == 2 {
		entries += 1;
	}

	// preamble + entry count + entries + next-IFD pointer, then room for
	// overflowing short arrays, rounded up for a stable payload offset
	let ifd_end = 8 + 2 + 12 * entries as usize + 4;
	let header_size = (ifd_end + 16 + 7) & !7;
	let mut writer = IfdWriter {
		data: vec![0u8; header_size],
		position: 10,
	};
	let mut overflow_offset = ifd_end as u32;

	LittleEndian::write_u16(&mut writer.data[0..], 0x4949);
	LittleEndian::write_u16(&mut writer.data[2..], 42);
	LittleEndian::write_u32(&mut writer.data[4..], 8);
	LittleEndian::write_u16(&mut writer.data[8..], entries);

	writer.tag(256, TIFF_LONG, 1, width);
	writer.tag(257, TIFF_LONG, 1, height);
	let bits = vec![format.bits_per_sample; channels as usize];
	writer.shorts(258, &bits, &mut overflow_offset);
	writer.tag(259, TIFF_SHORT, 1, format.compression.to_tiff_code());
	writer.tag(262, TIFF_SHORT, 1, u32::from(format.photometric.to_tiff_code()));
	writer.tag(273, TIFF_LONG, 1, header_size as u32); // StripOffsets
	writer.tag(277, TIFF_SHORT, 1, u32::from(channels));
	writer.tag(278, TIFF_LONG, 1, height); // RowsPerStrip
	writer.tag(279, TIFF_LONG, 1, payload.len() as u32); // StripByteCounts
	if channels == 4 || channels == 2 {
		writer.tag(338, TIFF_SHORT, 1, 2);
	}
	writer.tag(339, TIFF_SHORT, 1, format.sample_format.to_tiff_code());

	let mut data = writer.data;
	data.extend_from_slice(payload);
	Ok(Blob::from(data))
}
