//! Minimal partitioned, schema-typed table.
//!
//! A [`Dataset`] holds rows split across partitions. The recall evaluator
//! reads neighbor-list columns from it; the query pipeline produces one.
//! Neighbor lists use the canonical column type
//! `array<struct<neighbor: id, distance: float>>`.

use crate::config::{DISTANCE_FIELD, NEIGHBOR_FIELD};
use crate::error::{Error, Result};
use crate::item::Neighbor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column and field types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Long,
    Float,
    Double,
    String,
    Array(Box<DataType>),
    Struct(Vec<Field>),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => f.write_str("int"),
            DataType::Long => f.write_str("long"),
            DataType::Float => f.write_str("float"),
            DataType::Double => f.write_str("double"),
            DataType::String => f.write_str("string"),
            DataType::Array(element) => write!(f, "array<{element}>"),
            DataType::Struct(fields) => {
                f.write_str("struct<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", field.name, field.data_type)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// A named, typed column or struct field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single cell. Struct values are positional in their type's field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Struct(Vec<Value>),
}

pub type Row = Vec<Value>;

/// Conversion of ids and distances into cell values.
pub trait IntoValue {
    /// Column type produced by [`IntoValue::into_value`].
    fn data_type() -> DataType;

    fn into_value(self) -> Value;
}

macro_rules! impl_into_value {
    ($t:ty, $variant:ident, $dt:ident) => {
        impl IntoValue for $t {
            fn data_type() -> DataType {
                DataType::$dt
            }

            fn into_value(self) -> Value {
                Value::$variant(self.into())
            }
        }
    };
}

impl_into_value!(i32, Int, Int);
impl_into_value!(i64, Long, Long);
impl_into_value!(u32, Long, Long);
impl_into_value!(f32, Float, Float);
impl_into_value!(f64, Double, Double);
impl_into_value!(String, String, String);
impl_into_value!(&str, String, String);

/// Column type for a neighbor list with the given id and distance types.
pub fn neighbors_type(id_type: DataType, distance_type: DataType) -> DataType {
    DataType::Array(Box::new(DataType::Struct(vec![
        Field::new(NEIGHBOR_FIELD, id_type),
        Field::new(DISTANCE_FIELD, distance_type),
    ])))
}

/// Cell value for a neighbor list, matching [`neighbors_type`].
pub fn neighbors_value<Id, D>(neighbors: &[Neighbor<Id, D>]) -> Value
where
    Id: IntoValue + Clone,
    D: IntoValue + Copy,
{
    Value::Array(
        neighbors
            .iter()
            .map(|n| Value::Struct(vec![n.id().clone().into_value(), n.distance().into_value()]))
            .collect(),
    )
}

/// Rows split across partitions under a shared schema.
///
/// Every row has one value per schema column, including rows that arrive
/// through deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "UncheckedDataset")]
pub struct Dataset {
    schema: Schema,
    partitions: Vec<Vec<Row>>,
}

#[derive(Deserialize)]
struct UncheckedDataset {
    schema: Schema,
    partitions: Vec<Vec<Row>>,
}

impl TryFrom<UncheckedDataset> for Dataset {
    type Error = Error;

    fn try_from(raw: UncheckedDataset) -> Result<Self> {
        for row in raw.partitions.iter().flatten() {
            check_arity(&raw.schema, row)?;
        }
        Ok(Self {
            schema: raw.schema,
            partitions: raw.partitions,
        })
    }
}

impl Dataset {
    /// Creates an empty dataset with no partitions.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            partitions: Vec::new(),
        }
    }

    /// Distributes `rows` round-robin over `num_partitions` partitions.
    pub fn from_rows(schema: Schema, rows: Vec<Row>, num_partitions: usize) -> Result<Self> {
        if num_partitions == 0 {
            return Err(Error::InvalidArgument(
                "num_partitions must be positive".into(),
            ));
        }
        let mut partitions = vec![Vec::new(); num_partitions];
        for (i, row) in rows.into_iter().enumerate() {
            check_arity(&schema, &row)?;
            partitions[i % num_partitions].push(row);
        }
        Ok(Self { schema, partitions })
    }

    /// Appends a partition after checking every row's arity.
    pub fn push_partition(&mut self, rows: Vec<Row>) -> Result<()> {
        for row in &rows {
            check_arity(&self.schema, row)?;
        }
        self.partitions.push(rows);
        Ok(())
    }

    /// Redistributes all rows round-robin over `num_partitions` partitions.
    pub fn repartition(self, num_partitions: usize) -> Result<Self> {
        let rows: Vec<Row> = self.partitions.into_iter().flatten().collect();
        Self::from_rows(self.schema, rows, num_partitions)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn partitions(&self) -> &[Vec<Row>] {
        &self.partitions
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.partitions.iter().flatten()
    }

    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }
}

fn check_arity(schema: &Schema, row: &Row) -> Result<()> {
    if row.len() != schema.len() {
        return Err(Error::Schema(format!(
            "row has {} values but schema has {} columns",
            row.len(),
            schema.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Long),
            Field::new("neighbors", neighbors_type(DataType::Int, DataType::Float)),
        ])
    }

    fn row(i: i64) -> Row {
        vec![Value::Long(i), Value::Array(Vec::new())]
    }

    #[test]
    fn test_deserialize_checks_arity() {
        let ds = Dataset::from_rows(schema(), vec![row(1), row(2)], 2).unwrap();
        let json = serde_json::to_string(&ds).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ds);

        let mut short = serde_json::to_value(&ds).unwrap();
        short["partitions"][0][0] = serde_json::json!([]);
        let err = serde_json::from_value::<Dataset>(short).unwrap_err();
        assert!(err.to_string().contains("row has 0 values"));
    }

    #[test]
    fn test_neighbors_type_display() {
        let dt = neighbors_type(DataType::Int, DataType::Float);
        assert_eq!(dt.to_string(), "array<struct<neighbor:int,distance:float>>");
    }

    #[test]
    fn test_neighbors_value() {
        let neighbors = vec![Neighbor::new(3i32, 0.5f32), Neighbor::new(1, 0.75)];
        let value = neighbors_value(&neighbors);
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Struct(vec![Value::Int(3), Value::Float(0.5)]),
                Value::Struct(vec![Value::Int(1), Value::Float(0.75)]),
            ])
        );
        assert_eq!(u32::data_type(), DataType::Long);
        assert_eq!("a".into_value(), Value::String("a".into()));
    }

    #[test]
    fn test_from_rows_round_robin() {
        let rows: Vec<Row> = (0..7).map(row).collect();
        let ds = Dataset::from_rows(schema(), rows, 3).unwrap();
        assert_eq!(ds.num_partitions(), 3);
        assert_eq!(ds.num_rows(), 7);
        let sizes: Vec<usize> = ds.partitions().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        assert_eq!(ds.partitions()[1][0], row(1));
    }

    #[test]
    fn test_arity_checked() {
        let err = Dataset::from_rows(schema(), vec![vec![Value::Null]], 1).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        let mut ds = Dataset::new(schema());
        assert!(ds.push_partition(vec![row(0), vec![]]).is_err());
        assert_eq!(ds.num_partitions(), 0);
        ds.push_partition(vec![row(0)]).unwrap();
        assert_eq!(ds.num_rows(), 1);
    }

    #[test]
    fn test_repartition_keeps_rows() {
        let rows: Vec<Row> = (0..10).map(row).collect();
        let ds = Dataset::from_rows(schema(), rows, 2).unwrap();
        let ds = ds.repartition(5).unwrap();
        assert_eq!(ds.num_partitions(), 5);
        assert_eq!(ds.num_rows(), 10);
        assert_eq!(ds.column_index("neighbors"), Some(1));
        assert!(Dataset::new(schema()).repartition(0).is_err());
    }
}
