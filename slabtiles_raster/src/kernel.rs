//! Interpolation kernels: nearest, linear, cubic and Lanczos 2/3/4.
//!
//! A kernel answers two queries: the half-width of its non-zero support
//! (scaled by the ratio when zooming out, so the filter keeps averaging
//! enough input pixels) and the normalized weight row around a floating
//! center coordinate.

use lazy_static::lazy_static;
use std::f64::consts::PI;

/// The selectable kernel types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelType {
	NearestNeighbour,
	Linear,
	Cubic,
	Lanczos2,
	Lanczos3,
	Lanczos4,
}

impl KernelType {
	/// Parses the published kernel names; plain `lanczos` maps to Lanczos 2.
	pub fn from_name(name: &str) -> Option<KernelType> {
		match name {
			"nn" | "nearest" => Some(KernelType::NearestNeighbour),
			"linear" => Some(KernelType::Linear),
			"bicubic" | "cubic" => Some(KernelType::Cubic),
			"lanczos" | "lanczos_2" => Some(KernelType::Lanczos2),
			"lanczos_3" => Some(KernelType::Lanczos3),
			"lanczos_4" => Some(KernelType::Lanczos4),
			_ => None,
		}
	}

	/// Kernel actually used for same-CRS resampling: any Lanczos request
	/// becomes Lanczos 3.
	pub fn for_resampling(self) -> KernelType {
		match self {
			KernelType::Lanczos2 | KernelType::Lanczos3 | KernelType::Lanczos4 => KernelType::Lanczos3,
			other => other,
		}
	}

	/// Kernel actually used for reprojection: any Lanczos request becomes
	/// Lanczos 2.
	pub fn for_reprojection(self) -> KernelType {
		match self {
			KernelType::Lanczos2 | KernelType::Lanczos3 | KernelType::Lanczos4 => KernelType::Lanczos2,
			other => other,
		}
	}

	/// Kernel used when resampling a data mask: always nearest-neighbour.
	pub fn for_mask(self) -> KernelType {
		KernelType::NearestNeighbour
	}
}

/// One interpolation kernel.
pub struct Kernel {
	/// Half-width of the support at ratio 1.
	kernel_size: f64,
	/// `true` when the support does not scale with the ratio.
	const_ratio: bool,
	function: fn(f64) -> f64,
}

fn nearest_function(d: f64) -> f64 {
	if d.abs() <= 0.5 { 1.0 } else { 0.0 }
}

fn linear_function(d: f64) -> f64 {
	(1.0 - d.abs()).max(0.0)
}

fn cubic_function(d: f64) -> f64 {
	let t = d.abs();
	if t < 1.0 {
		(1.5 * t - 2.5) * t * t + 1.0
	} else if t < 2.0 {
		((-0.5 * t + 2.5) * t - 4.0) * t + 2.0
	} else {
		0.0
	}
}

fn sinc(x: f64) -> f64 {
	if x.abs() < 1e-12 { 1.0 } else { (PI * x).sin() / (PI * x) }
}

fn lanczos_function<const A: i64>(d: f64) -> f64 {
	if d.abs() >= A as f64 {
		0.0
	} else {
		sinc(d) * sinc(d / A as f64)
	}
}

lazy_static! {
	static ref NEAREST: Kernel = Kernel::new(0.5, true, nearest_function);
	static ref LINEAR: Kernel = Kernel::new(1.0, false, linear_function);
	static ref CUBIC: Kernel = Kernel::new(2.0, false, cubic_function);
	static ref LANCZOS_2: Kernel = Kernel::new(2.0, false, lanczos_function::<2>);
	static ref LANCZOS_3: Kernel = Kernel::new(3.0, false, lanczos_function::<3>);
	static ref LANCZOS_4: Kernel = Kernel::new(4.0, false, lanczos_function::<4>);
}

impl Kernel {
	fn new(kernel_size: f64, const_ratio: bool, function: fn(f64) -> f64) -> Kernel {
		Kernel {
			kernel_size,
			const_ratio,
			function,
		}
	}

	/// The shared instance for a kernel type.
	pub fn get(kernel_type: KernelType) -> &'static Kernel {
		match kernel_type {
			KernelType::NearestNeighbour => &NEAREST,
			KernelType::Linear => &LINEAR,
			KernelType::Cubic => &CUBIC,
			KernelType::Lanczos2 => &LANCZOS_2,
			KernelType::Lanczos3 => &LANCZOS_3,
			KernelType::Lanczos4 => &LANCZOS_4,
		}
	}

	fn effective_ratio(&self, ratio: f64) -> f64 {
		if self.const_ratio || ratio <= 1.0 { 1.0 } else { ratio }
	}

	/// Half-width of the non-zero support, in input pixels.
	pub fn support(&self, ratio: f64) -> f64 {
		self.kernel_size * self.effective_ratio(ratio)
	}

	/// Computes the weight row around `center`.
	///
	/// Returns the first input index and the normalized weights (sum 1), at
	/// most `max_length` of them. The first index never exceeds `center` and
	/// the window stays balanced around it within one coefficient.
	pub fn weights(&self, center: f64, ratio: f64, max_length: usize) -> (i64, Vec<f32>) {
		let ratio = self.effective_ratio(ratio);
		let support = self.kernel_size * ratio;

		let mut xmin = (center - support).ceil() as i64;
		let mut xmax = (center + support).floor() as i64;
		if xmin > center.floor() as i64 {
			xmin = center.floor() as i64;
		}
		if xmax < xmin {
			xmax = xmin;
		}

		// cap the window, dropping the side farther from the center
		while (xmax - xmin + 1) as usize > max_length.max(1) {
			if center - xmin as f64 > xmax as f64 - center {
				xmin += 1;
			} else {
				xmax -= 1;
			}
		}

		let mut weights: Vec<f32> = (xmin..=xmax)
			.map(|x| (self.function)((x as f64 - center) / ratio) as f32)
			.collect();

		let sum: f32 = weights.iter().sum();
		if sum.abs() > 1e-12 {
			for weight in &mut weights {
				*weight /= sum;
			}
		} else {
			// degenerate window: give all the weight to the nearest pixel
			let nearest = weights
				.iter()
				.enumerate()
				.map(|(i, _)| i)
				.min_by(|&a, &b| {
					let da = ((xmin + a as i64) as f64 - center).abs();
					let db = ((xmin + b as i64) as f64 - center).abs();
					da.partial_cmp(&db).unwrap()
				})
				.unwrap_or(0);
			weights.fill(0.0);
			weights[nearest] = 1.0;
		}

		(xmin, weights)
	}
}
