/*
 * Copyright 2024 Thaddeus Treloar
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

use serde_json::Value;

/// A scored transaction as produced by the upstream scorer. Immutable once
/// decoded; `transaction_id` is persisted as NULL when absent.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreEvent {
    pub transaction_id: Option<String>,
    pub score: f64,
    pub fraud_flag: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record has no payload")]
    EmptyPayload,
    #[error("payload is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is not a json object")]
    NotAnObject,
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("field '{field}' is not coercible from '{value}'")]
    Uncoercible { field: &'static str, value: Value },
}

/// Decodes one raw record payload into a [`ScoreEvent`].
///
/// The payload is a self-describing JSON object; unrecognised fields are
/// ignored. `score` must coerce to f64 and `fraud_flag` to an integer,
/// otherwise the record is undecodable. Malformed input cannot be repaired
/// by redelivery, so callers drop the record rather than retry.
pub fn decode(payload: Option<&[u8]>) -> Result<ScoreEvent, DecodeError> {
    let bytes = payload.ok_or(DecodeError::EmptyPayload)?;

    let value: Value = serde_json::from_slice(bytes)?;

    let fields = match value {
        Value::Object(fields) => fields,
        _ => return Err(DecodeError::NotAnObject),
    };

    let score = match fields.get("score") {
        None => return Err(DecodeError::MissingField { field: "score" }),
        Some(raw) => coerce_f64(raw).ok_or_else(|| DecodeError::Uncoercible {
            field: "score",
            value: raw.clone(),
        })?,
    };

    let fraud_flag = match fields.get("fraud_flag") {
        None => return Err(DecodeError::MissingField { field: "fraud_flag" }),
        Some(raw) => coerce_i32(raw).ok_or_else(|| DecodeError::Uncoercible {
            field: "fraud_flag",
            value: raw.clone(),
        })?,
    };

    let transaction_id = match fields.get("transaction_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        Some(raw) => {
            return Err(DecodeError::Uncoercible {
                field: "transaction_id",
                value: raw.clone(),
            })
        }
    };

    Ok(ScoreEvent {
        transaction_id,
        score,
        fraud_flag,
    })
}

fn coerce_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_i32(raw: &Value) -> Option<i32> {
    match raw {
        Value::Number(number) => match number.as_i64() {
            Some(integer) => i32::try_from(integer).ok(),
            // Upstream serialisers sometimes emit flags as 0.0/1.0.
            None => number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .map(|float| float as i32),
        },
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
