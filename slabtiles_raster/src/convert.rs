//! Sample conversions between the stored formats and the scanline types.
//!
//! Integer to float promotion is exact; float to integer saturates with
//! round-half-away-from-zero.

/// u8 to f32, direct promotion.
pub fn u8_to_f32(from: &[u8], to: &mut [f32]) {
	for (output, &input) in to.iter_mut().zip(from) {
		*output = f32::from(input);
	}
}

/// u16 to f32, direct promotion.
pub fn u16_to_f32(from: &[u16], to: &mut [f32]) {
	for (output, &input) in to.iter_mut().zip(from) {
		*output = f32::from(input);
	}
}

/// f32 to u8 with saturating rounding.
pub fn f32_to_u8(from: &[f32], to: &mut [u8]) {
	for (output, &input) in to.iter_mut().zip(from) {
		*output = input.round().clamp(0.0, 255.0) as u8;
	}
}

/// f32 to u16 with saturating rounding.
pub fn f32_to_u16(from: &[f32], to: &mut [u16]) {
	for (output, &input) in to.iter_mut().zip(from) {
		*output = input.round().clamp(0.0, 65535.0) as u16;
	}
}

/// u16 to u8, scaling 65535 down to 255.
pub fn u16_to_u8(from: &[u16], to: &mut [u8]) {
	for (output, &input) in to.iter_mut().zip(from) {
		*output = (f32::from(input) / 257.0).round() as u8;
	}
}
