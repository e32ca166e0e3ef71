use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::algebra;
use super::model::{Grid, OperationRecord};
use super::permissions::{self, Action};
use super::store::MatrixStore;
use crate::error::{CollabError, CollabResult};

/// Algebra request types accepted on a stored matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Add,
    Subtract,
    Multiply,
    Divide,
    Transpose,
    Determinant,
    Inverse,
}

impl OperationType {
    pub fn parse(s: &str) -> CollabResult<Self> {
        match s {
            "add" => Ok(Self::Add),
            "subtract" => Ok(Self::Subtract),
            "multiply" => Ok(Self::Multiply),
            "divide" => Ok(Self::Divide),
            "transpose" => Ok(Self::Transpose),
            "determinant" => Ok(Self::Determinant),
            "inverse" => Ok(Self::Inverse),
            other => Err(CollabError::UnsupportedOperation(format!(
                "unknown operation type '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Transpose => "transpose",
            Self::Determinant => "determinant",
            Self::Inverse => "inverse",
        }
    }

    /// Binary operations take their right-hand side from `parameters.matrix`.
    pub fn needs_operand(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationParameters {
    #[serde(default)]
    pub matrix: Option<Grid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationValue {
    Scalar(f64),
    Grid(Grid),
}

/// Run `op` against `data`. Pure; all validation happens before any arithmetic.
pub fn compute(
    data: &[Vec<f64>],
    op: OperationType,
    params: &OperationParameters,
    max_determinant_dimension: usize,
) -> CollabResult<OperationValue> {
    let operand = || {
        params.matrix.as_deref().ok_or_else(|| {
            CollabError::InvalidInput("Second matrix is required for this operation".to_string())
        })
    };

    let value = match op {
        OperationType::Transpose => OperationValue::Grid(algebra::transpose(data)?),
        OperationType::Determinant => {
            let (rows, columns) = algebra::shape(data)?;
            if rows != columns {
                return Err(CollabError::NotSquare);
            }
            if rows > max_determinant_dimension {
                return Err(CollabError::UnsupportedOperation(format!(
                    "determinant is limited to matrices up to {}x{}",
                    max_determinant_dimension, max_determinant_dimension
                )));
            }
            OperationValue::Scalar(algebra::determinant(data)?)
        }
        OperationType::Inverse => OperationValue::Grid(algebra::inverse(data)?),
        OperationType::Add => OperationValue::Grid(algebra::add(data, operand()?)?),
        OperationType::Subtract => OperationValue::Grid(algebra::subtract(data, operand()?)?),
        OperationType::Multiply => OperationValue::Grid(algebra::multiply(data, operand()?)?),
        OperationType::Divide => OperationValue::Grid(algebra::divide(data, operand()?)?),
    };
    Ok(value)
}

/// Execute an algebra request against a stored matrix on behalf of `user_id`.
///
/// Requires `edit` permission. The matrix is loaded, the result computed on the
/// blocking pool with no shared lock held, and only a successful result is
/// appended to the history. The stored grid itself is not modified.
pub async fn perform_operation(
    store: Arc<dyn MatrixStore>,
    matrix_id: &str,
    user_id: &str,
    operation_type: &str,
    parameters: serde_json::Value,
    max_determinant_dimension: usize,
) -> CollabResult<OperationRecord> {
    let op = OperationType::parse(operation_type)?;
    let params: OperationParameters = if parameters.is_null() {
        OperationParameters::default()
    } else {
        serde_json::from_value(parameters.clone())
            .map_err(|e| CollabError::InvalidInput(format!("Invalid parameters: {}", e)))?
    };
    if op.needs_operand() && params.matrix.is_none() {
        return Err(CollabError::InvalidInput(
            "Second matrix is required for this operation".to_string(),
        ));
    }

    let matrix = {
        let store = store.clone();
        let id = matrix_id.to_string();
        tokio::task::spawn_blocking(move || store.get(&id)).await??
    };
    permissions::require(&matrix, user_id, Action::Edit)?;

    let value = tokio::task::spawn_blocking(move || {
        compute(&matrix.data, op, &params, max_determinant_dimension)
    })
    .await??;

    let record = OperationRecord {
        id: Uuid::now_v7().to_string(),
        op_type: op.as_str().to_string(),
        parameters: if parameters.is_null() {
            serde_json::json!({})
        } else {
            parameters
        },
        result: serde_json::to_value(&value)?,
        performed_by: user_id.to_string(),
        timestamp: Utc::now(),
    };

    {
        let store = store.clone();
        let id = matrix_id.to_string();
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.append_operation(&id, &record)).await??;
    }

    tracing::info!(
        matrix_id = %matrix_id,
        user_id = %user_id,
        operation = op.as_str(),
        "Matrix operation recorded"
    );

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_unsupported() {
        assert_eq!(
            OperationType::parse("eigen").unwrap_err().kind(),
            "unsupported_operation"
        );
        assert_eq!(OperationType::parse("divide").unwrap(), OperationType::Divide);
    }

    #[test]
    fn binary_operations_require_operand() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let err = compute(&data, OperationType::Add, &OperationParameters::default(), 10)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn determinant_value_is_scalar() {
        let data = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let value = compute(
            &data,
            OperationType::Determinant,
            &OperationParameters::default(),
            10,
        )
        .unwrap();
        assert_eq!(value, OperationValue::Scalar(10.0));
        assert_eq!(serde_json::to_value(&value).unwrap(), serde_json::json!(10.0));
    }

    #[test]
    fn determinant_respects_dimension_cap() {
        let data = vec![vec![1.0; 4]; 4];
        let err = compute(
            &data,
            OperationType::Determinant,
            &OperationParameters::default(),
            3,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unsupported_operation");

        let tall = vec![vec![1.0, 2.0]; 11];
        let err = compute(
            &tall,
            OperationType::Determinant,
            &OperationParameters::default(),
            10,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "not_square");
    }

    #[test]
    fn divide_with_operand() {
        let data = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let params = OperationParameters {
            matrix: Some(data.clone()),
        };
        match compute(&data, OperationType::Divide, &params, 10).unwrap() {
            OperationValue::Grid(g) => {
                assert!((g[0][0] - 1.0).abs() < 1e-9);
                assert!(g[0][1].abs() < 1e-9);
                assert!(g[1][0].abs() < 1e-9);
                assert!((g[1][1] - 1.0).abs() < 1e-9);
            }
            other => panic!("expected grid, got {:?}", other),
        }
    }
}
