//! TIFF-variant LZW codec.
//!
//! MSB-first bit packing, code widths 9 to 12 bits with the TIFF "early
//! change" (the width grows one code before the table is full), clear code
//! 256, end-of-information code 257.

use anyhow::{Result, bail};

const CLEAR_CODE: u16 = 256;
const EOI_CODE: u16 = 257;
const FIRST_CODE: u16 = 258;
const MAX_WIDTH: u32 = 12;
const TABLE_FULL: u16 = 4094;

struct BitReader<'a> {
	data: &'a [u8],
	bit_position: usize,
}

impl<'a> BitReader<'a> {
	fn new(data: &'a [u8]) -> Self {
		Self { data, bit_position: 0 }
	}

	fn read(&mut self, width: u32) -> Option<u16> {
		let mut value: u32 = 0;
		for _ in 0..width {
			let byte = self.data.get(self.bit_position / 8)?;
			let bit = (byte >> (7 - self.bit_position % 8)) & 1;
			value = (value << 1) | u32::from(bit);
			self.bit_position += 1;
		}
		Some(value as u16)
	}
}

struct BitWriter {
	data: Vec<u8>,
	pending: u32,
	pending_bits: u32,
}

impl BitWriter {
	fn new() -> Self {
		Self {
			data: Vec::new(),
			pending: 0,
			pending_bits: 0,
		}
	}

	fn write(&mut self, code: u16, width: u32) {
		self.pending = (self.pending << width) | u32::from(code);
		self.pending_bits += width;
		while self.pending_bits >= 8 {
			self.pending_bits -= 8;
			self.data.push((self.pending >> self.pending_bits) as u8);
		}
	}

	fn finish(mut self) -> Vec<u8> {
		if self.pending_bits > 0 {
			self.data.push((self.pending << (8 - self.pending_bits)) as u8);
		}
		self.data
	}
}

/// Decodes a TIFF-LZW payload.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
	let mut output = Vec::new();
	if data.is_empty() {
		return Ok(output);
	}

	// entries 0..=255 are the single bytes, 256/257 are reserved
	let mut table: Vec<Vec<u8>> = (0..=255u16).map(|b| vec![b as u8]).collect();
	table.push(Vec::new());
	table.push(Vec::new());

	let mut reader = BitReader::new(data);
	let mut width: u32 = 9;
	let mut previous: Option<u16> = None;

	loop {
		let Some(code) = reader.read(width) else {
			// payloads may end without an explicit EOI
			break;
		};

		if code == EOI_CODE {
			break;
		}

		if code == CLEAR_CODE {
			table.truncate(FIRST_CODE as usize);
			width = 9;
			previous = None;
			continue;
		}

		let entry = if (code as usize) < table.len() {
			table[code as usize].clone()
		} else if code as usize == table.len() {
			// KwKwK case: the code being defined right now
			let Some(prev) = previous else {
				bail!("LZW stream references undefined code {code} with no previous entry");
			};
			let mut entry = table[prev as usize].clone();
			entry.push(table[prev as usize][0]);
			entry
		} else {
			bail!("LZW stream references out-of-table code {code}");
		};

		if let Some(prev) = previous {
			let mut new_entry = table[prev as usize].clone();
			new_entry.push(entry[0]);
			table.push(new_entry);
		}

		output.extend_from_slice(&entry);
		previous = Some(code);

		// early change, shifted one entry up front: the decoder trails the
		// encoder's table by one entry, so it grows the width one add sooner
		if table.len() as u16 == (1 << width) as u16 - 2 && width < MAX_WIDTH {
			width += 1;
		}
	}

	Ok(output)
}

/// Encodes raw bytes as a TIFF-LZW payload.
pub fn encode(data: &[u8]) -> Vec<u8> {
	use std::collections::HashMap;

	let mut writer = BitWriter::new();
	let mut width: u32 = 9;
	writer.write(CLEAR_CODE, width);

	if data.is_empty() {
		writer.write(EOI_CODE, width);
		return writer.finish();
	}

	let mut dictionary: HashMap<(u16, u8), u16> = HashMap::new();
	let mut next_code = FIRST_CODE;
	let mut current = u16::from(data[0]);

	for &byte in &data[1..] {
		if let Some(&code) = dictionary.get(&(current, byte)) {
			current = code;
			continue;
		}

		writer.write(current, width);
		dictionary.insert((current, byte), next_code);
		next_code += 1;

		if next_code == (1 << width) as u16 - 1 && width < MAX_WIDTH {
			width += 1;
		}
		if next_code >= TABLE_FULL {
			writer.write(CLEAR_CODE, width);
			dictionary.clear();
			next_code = FIRST_CODE;
			width = 9;
		}

		current = u16::from(byte);
	}

	writer.write(current, width);
	writer.write(EOI_CODE, width);
	writer.finish()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip_simple() {
		let data = b"TOBEORNOTTOBEORTOBEORNOT";
		let encoded = encode(data);
		assert_eq!(decode(&encoded).unwrap(), data);
	}

	#[test]
	fn roundtrip_empty() {
		assert!(decode(&encode(&[])).unwrap().is_empty());
	}

	#[test]
	fn roundtrip_repetitive_tile() {
		// long runs drive the KwKwK case and several width changes
		let mut data = Vec::new();
		for i in 0..65536usize {
			data.push((i / 977) as u8);
		}
		let encoded = encode(&data);
		assert!(encoded.len() < data.len());
		assert_eq!(decode(&encoded).unwrap(), data);
	}

	#[test]
	fn roundtrip_noise() {
		// pseudo-random bytes cross the table-full reset
		let mut state = 0x2545F491_4F6C_DD1Du64;
		let data: Vec<u8> = (0..100_000)
			.map(|_| {
				state ^= state << 13;
				state ^= state >> 7;
				state ^= state << 17;
				state as u8
			})
			.collect();
		let encoded = encode(&data);
		assert_eq!(decode(&encoded).unwrap(), data);
	}

	#[test]
	fn rejects_garbage_code() {
		// a 9-bit code far beyond the table with no previous entry
		let garbage = [0xFF, 0xFF, 0xFF, 0xFF];
		assert!(decode(&garbage).is_err());
	}
}
