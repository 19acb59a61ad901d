use crate::error::{AppError, Result};
use crate::schema::{DataPoint, PointKind, ValueFormat};
use serde::Serialize;
use tracing::warn;

/// A typed measurement value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Number(f64),
    Bool(bool),
}

impl PointValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Number(v) => Some(*v),
            PointValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PointValue::Bool(v) => Some(*v),
            PointValue::Number(_) => None,
        }
    }
}

/// Hardware can genuinely report extremes, so readings outside this range are
/// accepted but logged as suspect.
const PLAUSIBLE_TEMPERATURE_C: std::ops::RangeInclusive<f64> = -50.0..=100.0;

/// Convert a raw extracted token into a typed value. Pure function: the same
/// token always yields the same result.
pub fn normalize(point: &DataPoint, token: &str) -> Result<PointValue> {
    match point.format {
        ValueFormat::Temperature => {
            let v = parse_decimal(point, token, &["°C"])?;
            if !PLAUSIBLE_TEMPERATURE_C.contains(&v) {
                warn!(field = point.key, value = v, "temperature outside plausible range");
            }
            Ok(PointValue::Number(v))
        }
        ValueFormat::Percent => parse_decimal(point, token, &["%"]).map(PointValue::Number),
        ValueFormat::Energy => {
            let v = parse_energy_kwh(point, token)?;
            if point.kind == PointKind::DailyCounter && v < 0.0 {
                return Err(AppError::Parse {
                    field: point.key,
                    reason: format!("negative counter reading '{}'", token),
                });
            }
            Ok(PointValue::Number(v))
        }
        ValueFormat::Count => parse_decimal(point, token, &[]).map(PointValue::Number),
        ValueFormat::OnOff => parse_on_off(point, token),
    }
}

/// Locale-aware number: comma decimal separator, optional sign, optional
/// unit suffix.
fn parse_decimal(point: &DataPoint, token: &str, units: &[&str]) -> Result<f64> {
    let mut cleaned = token.trim().to_string();
    for unit in units {
        cleaned = cleaned.replace(unit, "");
    }
    let cleaned = cleaned.replace(',', ".");
    cleaned.trim().parse::<f64>().map_err(|_| AppError::Parse {
        field: point.key,
        reason: format!("not a number: '{}'", token),
    })
}

/// Energy amount in kWh from the ISG's `12,5KWh` / `3,250MWh` format.
/// A token without a recognized unit is an error, not a guess.
fn parse_energy_kwh(point: &DataPoint, token: &str) -> Result<f64> {
    let upper = token.to_uppercase();
    let factor = if upper.contains("MWH") {
        1000.0
    } else if upper.contains("KWH") {
        1.0
    } else {
        return Err(AppError::Parse {
            field: point.key,
            reason: format!("missing energy unit in '{}'", token),
        });
    };

    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+'))
        .collect();
    let value = cleaned
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| AppError::Parse {
            field: point.key,
            reason: format!("not an energy amount: '{}'", token),
        })?;

    Ok(value * factor)
}

/// Map the closed set of known status tokens: the ISG's on/off icon src
/// markers plus textual variants. Unknown tokens fail instead of defaulting.
fn parse_on_off(point: &DataPoint, token: &str) -> Result<PointValue> {
    if token.contains("ste-symbol_an-") {
        return Ok(PointValue::Bool(true));
    }
    if token.contains("ste-symbol_aus-") {
        return Ok(PointValue::Bool(false));
    }
    match token.trim().to_uppercase().as_str() {
        "ON" | "EIN" | "1" => Ok(PointValue::Bool(true)),
        "OFF" | "AUS" | "0" => Ok(PointValue::Bool(false)),
        _ => Err(AppError::Parse {
            field: point.key,
            reason: format!("unknown status token '{}'", token),
        }),
    }
}
