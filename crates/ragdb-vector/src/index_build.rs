//! IVF_PQ index sizing and build for the chunk table.
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::{info, warn};

use ragdb_core::{Error, Result};

use crate::schema::VECTOR_COLUMN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

pub fn compute_ivfpq_params(total_ready: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (total_ready as f64).sqrt() as usize;
    let mut nlist = std::cmp::max(1, 2 * sqrt_n);
    nlist = std::cmp::min(nlist, 65536);
    // Clamp nlist to be less than total_ready for tiny datasets
    if total_ready > 1 {
        nlist = std::cmp::min(nlist, total_ready - 1);
    } else {
        nlist = 1;
    }
    // Sub-vectors must divide the dimension.
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = (1..=preferred).rev().find(|m| dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m }
}

pub async fn has_vector_index(table: &Table) -> Result<bool> {
    let indices = table.list_indices().await.map_err(Error::store)?;
    Ok(indices.iter().any(|idx| idx.columns.iter().any(|c| c == VECTOR_COLUMN)))
}

/// Builds a cosine IVF_PQ index once the table is large enough to train it.
/// Returns whether an index was created.
pub async fn ensure_ann_index(table: &Table, dim: usize, min_rows: usize) -> Result<bool> {
    let rows = table.count_rows(None).await.map_err(Error::store)?;
    if rows < min_rows.max(2) || has_vector_index(table).await? {
        return Ok(false);
    }
    let params = compute_ivfpq_params(rows, dim);
    let built = table
        .create_index(
            &[VECTOR_COLUMN],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(u32::try_from(params.nlist).unwrap_or(u32::MAX))
                    .num_sub_vectors(u32::try_from(params.m).unwrap_or(1)),
            ),
        )
        .name(format!("{}_{VECTOR_COLUMN}_ivfpq", table.name()))
        .execute()
        .await;
    match built {
        Ok(()) => {
            info!(table = table.name(), rows, nlist = params.nlist, m = params.m, "built IVF_PQ index");
            Ok(true)
        }
        Err(e) => {
            // Exact search still works without the index.
            warn!(table = table.name(), error = %e, "IVF_PQ build failed");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_respect_dimension_and_size() {
        let p = compute_ivfpq_params(10_000, 1024);
        assert_eq!(p, IvfPqParams { nlist: 200, m: 32 });
        let p = compute_ivfpq_params(300, 384);
        assert_eq!(p.m, 16);
        assert!(p.nlist < 300);
        assert_eq!(compute_ivfpq_params(300, 12).m, 12);
        assert_eq!(compute_ivfpq_params(300, 7).m, 7);
        assert_eq!(compute_ivfpq_params(1, 8).nlist, 1);
    }
}
