//! Vertical discretization of the river-bed column.

use crate::domain::error::{MolonariError, Result};
use serde::{Deserialize, Serialize};

/// Cell-centred grid over the layered column.
///
/// The column spans from the river bed (`0`) down to the deepest layer
/// boundary `H`. It is split into `n` cells of size `H / n`; node `i` sits at
/// `(i + 0.5) * H / n` and belongs to the layer containing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discretization {
    /// Node depths, increasing (m).
    pub depths: Vec<f64>,

    /// Layer index of every node.
    pub layer_of_node: Vec<usize>,

    /// Bottom depth of every layer (m).
    pub layer_bottoms: Vec<f64>,

    /// Cell size (m).
    pub cell_size: f64,
}

impl Discretization {
    /// Builds the grid for layer boundaries `[0, b1, …, H]` and `cell_count` cells.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] if the boundaries do not start at
    /// zero, are not strictly increasing, if there are fewer cells than layers,
    /// or if a layer is too thin to contain a node.
    pub fn new(boundaries: &[f64], cell_count: usize) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(MolonariError::Validation(
                "at least one layer (two boundaries) is required".to_string(),
            ));
        }
        if boundaries.iter().any(|b| !b.is_finite()) {
            return Err(MolonariError::Validation(
                "layer boundaries must be finite".to_string(),
            ));
        }
        if boundaries[0] != 0.0 {
            return Err(MolonariError::Validation(format!(
                "the first layer boundary must be the river bed (0), got {}",
                boundaries[0]
            )));
        }
        if boundaries.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(MolonariError::Validation(format!(
                "layer boundaries must be strictly increasing, got {boundaries:?}"
            )));
        }

        let layer_bottoms = boundaries[1..].to_vec();
        if cell_count < layer_bottoms.len() {
            return Err(MolonariError::Validation(format!(
                "{cell_count} cells cannot hold {} layers",
                layer_bottoms.len()
            )));
        }

        let height = boundaries[boundaries.len() - 1];
        #[allow(clippy::cast_precision_loss)]
        let cell_size = height / cell_count as f64;

        #[allow(clippy::cast_precision_loss)]
        let depths: Vec<f64> = (0..cell_count)
            .map(|i| (i as f64 + 0.5) * cell_size)
            .collect();
        let layer_of_node: Vec<usize> = depths
            .iter()
            .map(|depth| {
                layer_bottoms
                    .iter()
                    .position(|bottom| depth < bottom)
                    .unwrap_or(layer_bottoms.len() - 1)
            })
            .collect();

        for layer in 0..layer_bottoms.len() {
            if !layer_of_node.contains(&layer) {
                return Err(MolonariError::Validation(format!(
                    "layer {layer} is thinner than one cell ({cell_size} m); increase the cell count"
                )));
            }
        }

        Ok(Self {
            depths,
            layer_of_node,
            layer_bottoms,
            cell_size,
        })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.depths.len()
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layer_bottoms.len()
    }

    /// Total column height (m).
    #[must_use]
    pub fn height(&self) -> f64 {
        self.layer_bottoms.last().copied().unwrap_or(0.0)
    }

    /// Index of the node closest to `depth`.
    #[must_use]
    pub fn nearest_node(&self, depth: f64) -> usize {
        self.depths
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - depth).abs().total_cmp(&(*b - depth).abs()))
            .map_or(0, |(index, _)| index)
    }
}
