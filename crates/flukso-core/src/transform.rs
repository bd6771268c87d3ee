//! Declarative value transforms over sensor state payloads.
//!
//! Devices publish state as `"<timestamp>,<value>"`. A [`ValueTransform`]
//! describes how the host turns that payload into an entity state. It can
//! be evaluated locally and rendered as the template expression the host
//! platform consumes, so both stay in step.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Seconds after which an event-style binary sensor falls back to OFF.
pub const EVENT_OFF_DELAY_SECS: u32 = 10;

/// Full scale of the battery voltage reading.
const BATTERY_FULL_SCALE_VOLTS: f64 = 3.3;

/// Divisor from the device's native gas unit to cubic metres.
const GAS_NATIVE_PER_CUBIC_METRE: f64 = 1000.0;

const VALUE_FIELD: &str = r#"value.split(",")[1]"#;

/// How a state payload becomes an entity state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueTransform {
    /// `round(value / divisor * multiplier, precision)`
    Numeric {
        /// Applied first
        divisor: f64,
        /// Applied after the divisor
        multiplier: f64,
        /// Decimal places to round to, if any
        precision: Option<u32>,
    },
    /// ON when the code after the comma is greater than zero
    ProblemCode,
    /// ON whenever a message arrives
    EventFlag,
}

impl ValueTransform {
    /// The numeric value as published.
    #[must_use]
    pub fn plain() -> Self {
        Self::Numeric {
            divisor: 1.0,
            multiplier: 1.0,
            precision: None,
        }
    }

    /// Temperature, one decimal.
    #[must_use]
    pub fn temperature() -> Self {
        Self::Numeric {
            divisor: 1.0,
            multiplier: 1.0,
            precision: Some(1),
        }
    }

    /// Battery voltage as a percentage of full scale, two decimals.
    #[must_use]
    pub fn battery() -> Self {
        Self::Numeric {
            divisor: BATTERY_FULL_SCALE_VOLTS,
            multiplier: 100.0,
            precision: Some(2),
        }
    }

    /// Gas in cubic metres.
    #[must_use]
    pub fn gas() -> Self {
        Self::Numeric {
            divisor: GAS_NATIVE_PER_CUBIC_METRE,
            multiplier: 1.0,
            precision: None,
        }
    }

    /// Power factor as a percentage, one decimal.
    #[must_use]
    pub fn power_factor() -> Self {
        Self::Numeric {
            divisor: 1.0,
            multiplier: 100.0,
            precision: Some(1),
        }
    }

    /// Transform for an analog channel of the given type and subtype.
    #[must_use]
    pub fn for_analog(sensor_type: Option<&str>, subtype: Option<&str>) -> Self {
        match (sensor_type, subtype) {
            (Some("temperature"), _) => Self::temperature(),
            (Some("battery"), _) => Self::battery(),
            (Some("gas"), _) => Self::gas(),
            (Some("electricity"), Some("pf")) => Self::power_factor(),
            _ => Self::plain(),
        }
    }

    /// Whether this transform yields ON/OFF rather than a number.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        !matches!(self, Self::Numeric { .. })
    }

    /// Apply the transform to a raw state payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload does not have the shape the transform
    /// reads.
    pub fn evaluate(&self, payload: &str) -> Result<StateValue, TransformError> {
        match *self {
            Self::Numeric {
                divisor,
                multiplier,
                precision,
            } => {
                let reading = Reading::parse(payload)?;
                let raw: f64 = reading
                    .value
                    .trim()
                    .parse()
                    .map_err(|_| TransformError::NotNumeric(reading.value.to_string()))?;
                let value = raw / divisor * multiplier;
                Ok(StateValue::Number(match precision {
                    Some(digits) => round_to(value, digits),
                    None => value,
                }))
            }
            Self::ProblemCode => {
                let reading = Reading::parse(payload)?;
                Ok(StateValue::Flag(parse_code(reading.value)? > 0))
            }
            Self::EventFlag => Ok(StateValue::Flag(!payload.is_empty())),
        }
    }

    /// Render as a host template expression.
    #[must_use]
    pub fn template(&self) -> String {
        match *self {
            Self::Numeric {
                divisor,
                multiplier,
                precision,
            } => {
                let mut expr = format!("({VALUE_FIELD} | float)");
                if (divisor - 1.0).abs() > f64::EPSILON {
                    expr = format!("({expr} / {})", format_number(divisor));
                }
                if (multiplier - 1.0).abs() > f64::EPSILON {
                    expr = format!("({expr} * {})", format_number(multiplier));
                }
                match precision {
                    Some(digits) => format!("{{{{ {expr} | round({digits}) }}}}"),
                    None => format!("{{{{ {expr} }}}}"),
                }
            }
            Self::ProblemCode => {
                format!("{{% if ({VALUE_FIELD} | int) > 0 %}}ON{{% else %}}OFF{{% endif %}}")
            }
            Self::EventFlag => "{% if value %}ON{% else %}OFF{% endif %}".to_string(),
        }
    }
}

impl fmt::Display for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template())
    }
}

impl Serialize for ValueTransform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.template())
    }
}

/// Result of evaluating a transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateValue {
    /// Numeric sensor state
    Number(f64),
    /// Binary sensor state, `true` is ON
    Flag(bool),
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Flag(true) => f.write_str("ON"),
            Self::Flag(false) => f.write_str("OFF"),
        }
    }
}

/// A state payload split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading<'a> {
    /// Device time of the reading, when the first field is a Unix timestamp
    pub timestamp: Option<DateTime<Utc>>,
    /// Second field, unparsed
    pub value: &'a str,
}

impl<'a> Reading<'a> {
    /// Split a `"<timestamp>,<value>"` payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload has no second field.
    pub fn parse(payload: &'a str) -> Result<Self, TransformError> {
        let (timestamp, rest) = payload
            .split_once(',')
            .ok_or_else(|| TransformError::MissingField(payload.to_string()))?;
        let value = rest.split(',').next().unwrap_or(rest);

        let timestamp = timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(Self { timestamp, value })
    }
}

/// Errors evaluating a transform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Payload has no value after the timestamp
    #[error("payload has no value field: {0:?}")]
    MissingField(String),
    /// Value field is not a number
    #[error("value is not numeric: {0:?}")]
    NotNumeric(String),
}

fn parse_code(value: &str) -> Result<i64, TransformError> {
    let value = value.trim();
    if let Ok(code) = value.parse::<i64>() {
        return Ok(code);
    }
    value
        .parse::<f64>()
        // Integer conversion truncates like the host's `int` filter.
        .map(|code| code.trunc() as i64)
        .map_err(|_| TransformError::NotNumeric(value.to_string()))
}

fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
    (value * scale).round() / scale
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
