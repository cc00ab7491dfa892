//! This module provides the [`TileMatrixSet`] struct, an ordered collection
//! of [`TileMatrix`] entries sharing one CRS.

use super::{Crs, TileMatrix};
use anyhow::{Result, bail};

/// An ordered set of tile matrices, keyed by identifier.
///
/// The order is the insertion order, finest last or first as the publisher
/// chooses; the engine never assumes cross-level phase.
#[derive(Clone, Debug)]
pub struct TileMatrixSet {
	id: String,
	crs: Crs,
	matrices: Vec<TileMatrix>,
}

impl TileMatrixSet {
	pub fn new(id: &str, crs: Crs, matrices: Vec<TileMatrix>) -> Result<TileMatrixSet> {
		for (i, tm) in matrices.iter().enumerate() {
			if matrices[..i].iter().any(|other| other.id() == tm.id()) {
				bail!("tile matrix set '{id}': duplicate tile matrix identifier '{}'", tm.id());
			}
		}
		Ok(TileMatrixSet {
			id: id.to_owned(),
			crs,
			matrices,
		})
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn crs(&self) -> Crs {
		self.crs
	}

	/// Looks up a tile matrix by identifier.
	pub fn matrix(&self, id: &str) -> Option<&TileMatrix> {
		self.matrices.iter().find(|tm| tm.id() == id)
	}

	/// Iterates over the matrices in set order.
	pub fn iter(&self) -> impl Iterator<Item = &TileMatrix> {
		self.matrices.iter()
	}

	pub fn len(&self) -> usize {
		self.matrices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.matrices.is_empty()
	}
}
