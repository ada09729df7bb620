//! Semantic model: declarative fields, measures and joins over the
//! warehouse tables.
//!
//! The model itself is read-only configuration consumed by BI tooling.
//! The only thing checked here is that it still matches the warehouse:
//! every referenced column exists with a compatible type, and every join
//! points at a declared cube.

use crate::error::{EtlError, EtlResult};
use arrow::datatypes::{DataType, SchemaRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_MODEL: &str = include_str!("../models/semantic_model.json");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DimensionType {
    String,
    Number,
    Time,
    Boolean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    CountDistinct,
    CountWhere,
    Sum,
    Avg,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    OneToMany,
    ManyToOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub column: String,
    #[serde(rename = "type")]
    pub kind: DimensionType,
    #[serde(default)]
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureFilter {
    pub column: String,
    pub equals: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub filter: Option<MeasureFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub cube: String,
    pub local_column: String,
    pub foreign_column: String,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cube {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticModel {
    pub cubes: Vec<Cube>,
}

impl SemanticModel {
    /// The model shipped with the warehouse.
    pub fn bundled() -> EtlResult<Self> {
        Self::from_json(DEFAULT_MODEL)
    }

    pub fn from_json(json: &str) -> EtlResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn cube(&self, name: &str) -> Option<&Cube> {
        self.cubes.iter().find(|c| c.name == name)
    }

    /// Check every cube against the warehouse schemas, keyed by table name.
    pub fn validate(&self, schemas: &[(&str, SchemaRef)]) -> EtlResult<()> {
        let tables: HashMap<&str, &SchemaRef> =
            schemas.iter().map(|(name, schema)| (*name, schema)).collect();

        for cube in &self.cubes {
            let schema = tables.get(cube.table.as_str()).ok_or_else(|| {
                EtlError::schema(
                    cube.name.as_str(),
                    format!("cube references unknown table '{}'", cube.table),
                )
            })?;

            for dim in &cube.dimensions {
                let data_type = column_type(cube, schema, &dim.column)?;
                if !dimension_accepts(dim.kind, data_type) {
                    return Err(EtlError::schema(
                        cube.name.as_str(),
                        format!(
                            "dimension '{}' declared {:?} but column '{}' is {data_type}",
                            dim.name, dim.kind, dim.column
                        ),
                    ));
                }
            }

            for measure in &cube.measures {
                self.check_measure(cube, schema, measure)?;
            }

            for join in &cube.joins {
                let target = self.cube(&join.cube).ok_or_else(|| {
                    EtlError::schema(
                        cube.name.as_str(),
                        format!("join to undeclared cube '{}'", join.cube),
                    )
                })?;
                let target_schema = tables.get(target.table.as_str()).ok_or_else(|| {
                    EtlError::schema(
                        target.name.as_str(),
                        format!("cube references unknown table '{}'", target.table),
                    )
                })?;
                column_type(cube, schema, &join.local_column)?;
                column_type(target, target_schema, &join.foreign_column)?;
            }
        }
        log::debug!("semantic: {} cubes validated", self.cubes.len());
        Ok(())
    }

    fn check_measure(&self, cube: &Cube, schema: &SchemaRef, measure: &Measure) -> EtlResult<()> {
        match (measure.aggregation, measure.column.as_deref()) {
            (Aggregation::Sum | Aggregation::Avg, None) | (Aggregation::CountDistinct, None) => {
                return Err(EtlError::schema(
                    cube.name.as_str(),
                    format!("measure '{}' needs a column", measure.name),
                ));
            }
            (Aggregation::Sum | Aggregation::Avg, Some(column)) => {
                let data_type = column_type(cube, schema, column)?;
                if !data_type.is_numeric() {
                    return Err(EtlError::schema(
                        cube.name.as_str(),
                        format!(
                            "measure '{}' aggregates non-numeric column '{column}' ({data_type})",
                            measure.name
                        ),
                    ));
                }
            }
            (_, Some(column)) => {
                column_type(cube, schema, column)?;
            }
            (_, None) => {}
        }

        match (measure.aggregation, &measure.filter) {
            (Aggregation::CountWhere, None) => Err(EtlError::schema(
                cube.name.as_str(),
                format!("measure '{}' is count_where without a filter", measure.name),
            )),
            (_, Some(filter)) => column_type(cube, schema, &filter.column).map(|_| ()),
            (_, None) => Ok(()),
        }
    }
}

fn column_type<'a>(cube: &Cube, schema: &'a SchemaRef, column: &str) -> EtlResult<&'a DataType> {
    schema
        .field_with_name(column)
        .map(|f| f.data_type())
        .map_err(|_| {
            EtlError::schema(
                cube.name.as_str(),
                format!("column '{column}' not found in table '{}'", cube.table),
            )
        })
}

fn dimension_accepts(kind: DimensionType, data_type: &DataType) -> bool {
    match kind {
        DimensionType::String => matches!(data_type, DataType::Utf8 | DataType::LargeUtf8),
        DimensionType::Number => data_type.is_numeric(),
        DimensionType::Time => matches!(
            data_type,
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
        ),
        DimensionType::Boolean => matches!(data_type, DataType::Boolean),
    }
}
