//! Probe pipeline: query an index and its exact view side by side.
//!
//! Produces the `exactNeighbors` / `approximateNeighbors` dataset consumed by
//! [`RecallEvaluator`], one row per probe vector.

use crate::config::{DEFAULT_APPROXIMATE_NEIGHBORS_COL, DEFAULT_EXACT_NEIGHBORS_COL};
use crate::dataset::{
    neighbors_type, neighbors_value, DataType, Dataset, Field, IntoValue, Row, Schema, Value,
};
use crate::error::{Error, Result};
use crate::evaluation::RecallEvaluator;
use crate::index::{Index, SearchIndex};
use rayon::prelude::*;
use std::time::Instant;

/// Runs every probe through `index` and through `index.as_exact_index()`.
///
/// Probes are processed in parallel. Row `i` carries probe ordinal `i` in the
/// `id` column; rows are spread round-robin over `num_partitions` partitions.
pub fn compare_neighbors<I, Id, V, D>(
    index: &I,
    probes: &[V],
    k: usize,
    num_partitions: usize,
) -> Result<Dataset>
where
    I: Index<Id, V, D>,
    Id: IntoValue + Clone,
    D: IntoValue + Copy,
    V: Sync,
{
    if k == 0 {
        return Err(Error::InvalidArgument("k must be positive".into()));
    }
    let start = Instant::now();
    let exact = index.as_exact_index();

    let rows: Vec<Row> = probes
        .par_iter()
        .enumerate()
        .map(|(i, probe)| -> Result<Row> {
            let approximate = index.find_nearest(probe, k)?;
            let truth = exact.find_nearest(probe, k)?;
            Ok(vec![
                Value::Long(i as i64),
                neighbors_value(&truth),
                neighbors_value(&approximate),
            ])
        })
        .collect::<Result<Vec<Row>>>()?;

    let column = neighbors_type(Id::data_type(), D::data_type());
    let schema = Schema::new(vec![
        Field::new("id", DataType::Long),
        Field::new(DEFAULT_EXACT_NEIGHBORS_COL, column.clone()),
        Field::new(DEFAULT_APPROXIMATE_NEIGHBORS_COL, column),
    ]);
    tracing::info!(
        "Queried {} probes at k={} against {} items in {:?}",
        probes.len(),
        k,
        index.len(),
        start.elapsed()
    );
    Dataset::from_rows(schema, rows, num_partitions)
}

/// Recall of `index` against its own exact view over `probes`.
pub fn measure_recall<I, Id, V, D>(
    index: &I,
    probes: &[V],
    k: usize,
    num_partitions: usize,
) -> Result<f64>
where
    I: Index<Id, V, D>,
    Id: IntoValue + Clone,
    D: IntoValue + Copy,
    V: Sync,
{
    let dataset = compare_neighbors(index, probes, k, num_partitions)?;
    RecallEvaluator::new().evaluate(&dataset)
}
