//! Recall evaluation over partitioned neighbor-list columns.
//!
//! For every row, the evaluator counts how many ids of the exact neighbor
//! list also appear in the approximate one, and how long the exact list is.
//! Both counts are summed as integers across rows and partitions (in parallel
//! with rayon) and divided once at the end:
//!
//! ```text
//! recall = Σ |set(exact_i) ∩ set(approx_i)| / Σ |exact_i|
//! ```
//!
//! A grand total of zero yields exactly `1.0`. The result never depends on
//! row order or partition boundaries.

use crate::config::{
    DEFAULT_APPROXIMATE_NEIGHBORS_COL, DEFAULT_EXACT_NEIGHBORS_COL, DISTANCE_FIELD, NEIGHBOR_FIELD,
};
use crate::dataset::{DataType, Dataset, Schema, Value};
use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Column names read by [`RecallEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluatorConfig {
    pub exact_neighbors_col: String,
    pub approximate_neighbors_col: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            exact_neighbors_col: DEFAULT_EXACT_NEIGHBORS_COL.to_string(),
            approximate_neighbors_col: DEFAULT_APPROXIMATE_NEIGHBORS_COL.to_string(),
        }
    }
}

/// Integer accumulators behind a recall value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallCounts {
    /// Exact neighbor ids also found by the approximate search.
    pub matching: u64,
    /// Length of all exact neighbor lists.
    pub total: u64,
}

impl RecallCounts {
    pub fn new(matching: u64, total: u64) -> Self {
        Self { matching, total }
    }

    /// Combines two partial counts. Associative and commutative.
    pub fn merge(self, other: Self) -> Self {
        Self {
            matching: self.matching + other.matching,
            total: self.total + other.total,
        }
    }

    /// `matching / total`, or `1.0` when there is nothing to find.
    pub fn recall(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.matching as f64 / self.total as f64
        }
    }
}

/// Neighbor id normalized across the supported column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdKey {
    Int(i64),
    Str(String),
}

/// Where a validated neighbor column sits and which struct slot holds the id.
#[derive(Debug, Clone, Copy)]
struct NeighborColumn {
    index: usize,
    id_slot: usize,
}

/// Measures approximate-search recall against exact ground truth.
#[derive(Debug, Clone, Default)]
pub struct RecallEvaluator {
    config: EvaluatorConfig,
}

impl RecallEvaluator {
    /// Evaluator reading the default `exactNeighbors` / `approximateNeighbors` columns.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn with_exact_col(mut self, name: impl Into<String>) -> Self {
        self.config.exact_neighbors_col = name.into();
        self
    }

    pub fn with_approximate_col(mut self, name: impl Into<String>) -> Self {
        self.config.approximate_neighbors_col = name.into();
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Recall is a score: larger is better.
    pub fn is_larger_better(&self) -> bool {
        true
    }

    /// Computes recall in [0, 1].
    ///
    /// Fails with [`Error::Schema`] if either configured column is missing or
    /// mis-shaped, or if a cell holds a value that is not a neighbor record.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<f64> {
        let counts = self.evaluate_counts(dataset)?;
        tracing::debug!(
            "Recall {}/{} over {} rows in {} partitions",
            counts.matching,
            counts.total,
            dataset.num_rows(),
            dataset.num_partitions()
        );
        Ok(counts.recall())
    }

    /// Computes the summed counts without dividing.
    pub fn evaluate_counts(&self, dataset: &Dataset) -> Result<RecallCounts> {
        let exact_col = &self.config.exact_neighbors_col;
        let approx_col = &self.config.approximate_neighbors_col;
        let exact = resolve_column(dataset.schema(), exact_col)?;
        let approx = resolve_column(dataset.schema(), approx_col)?;

        dataset
            .partitions()
            .par_iter()
            .map(|rows| {
                rows.iter().try_fold(RecallCounts::default(), |acc, row| -> Result<RecallCounts> {
                    let exact_ids = extract_ids(cell(row, exact.index)?, exact.id_slot, exact_col)?;
                    let approx_ids =
                        extract_ids(cell(row, approx.index)?, approx.id_slot, approx_col)?;
                    Ok(acc.merge(count_row(&exact_ids, &approx_ids)))
                })
            })
            .try_reduce(RecallCounts::default, |a, b| Ok(a.merge(b)))
    }
}

fn count_row(exact: &[IdKey], approx: &[IdKey]) -> RecallCounts {
    let approx_set: HashSet<&IdKey> = approx.iter().collect();
    let exact_set: HashSet<&IdKey> = exact.iter().collect();
    let matching = exact_set.intersection(&approx_set).count();
    RecallCounts::new(matching as u64, exact.len() as u64)
}

/// Checks that `name` exists and is `array<struct<{neighbor, distance}>>`.
fn resolve_column(schema: &Schema, name: &str) -> Result<NeighborColumn> {
    let index = schema
        .index_of(name)
        .ok_or_else(|| Error::Schema(format!("column '{name}' does not exist")))?;
    let data_type = &schema.fields[index].data_type;

    let DataType::Array(element) = data_type else {
        return Err(Error::Schema(format!(
            "column '{name}' must be an array of neighbor structs, found {data_type}"
        )));
    };
    let DataType::Struct(fields) = element.as_ref() else {
        return Err(Error::Schema(format!(
            "column '{name}' elements must be structs, found {element}"
        )));
    };

    let has = |field: &str| fields.iter().filter(|f| f.name == field).count() == 1;
    if fields.len() != 2 || !has(NEIGHBOR_FIELD) || !has(DISTANCE_FIELD) {
        return Err(Error::Schema(format!(
            "column '{name}' elements must have exactly the fields \
             '{NEIGHBOR_FIELD}' and '{DISTANCE_FIELD}', found {element}"
        )));
    }

    let id_slot = fields
        .iter()
        .position(|f| f.name == NEIGHBOR_FIELD)
        .ok_or_else(|| Error::Schema(format!("column '{name}' lacks '{NEIGHBOR_FIELD}'")))?;
    match fields[id_slot].data_type {
        DataType::Int | DataType::Long | DataType::String => {}
        ref other => {
            return Err(Error::Schema(format!(
                "column '{name}' has unsupported neighbor id type {other}"
            )))
        }
    }
    Ok(NeighborColumn { index, id_slot })
}

fn cell(row: &[Value], index: usize) -> Result<&Value> {
    row.get(index).ok_or_else(|| {
        Error::Schema(format!(
            "row has {} values, column {index} is missing",
            row.len()
        ))
    })
}

/// Projects a neighbor-list cell onto its ids. A null cell is an empty list.
fn extract_ids(cell: &Value, id_slot: usize, column: &str) -> Result<Vec<IdKey>> {
    let records = match cell {
        Value::Null => return Ok(Vec::new()),
        Value::Array(records) => records,
        other => {
            return Err(Error::Schema(format!(
                "column '{column}' holds {other:?} instead of a neighbor list"
            )))
        }
    };
    records
        .iter()
        .map(|record| match record {
            Value::Struct(values) if values.len() == 2 => match &values[id_slot] {
                Value::Int(v) => Ok(IdKey::Int(i64::from(*v))),
                Value::Long(v) => Ok(IdKey::Int(*v)),
                Value::String(s) => Ok(IdKey::Str(s.clone())),
                other => Err(Error::Schema(format!(
                    "column '{column}' holds unsupported neighbor id {other:?}"
                ))),
            },
            other => Err(Error::Schema(format!(
                "column '{column}' holds malformed neighbor record {other:?}"
            ))),
        })
        .collect()
}
