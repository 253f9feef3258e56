// Sensor log schemas
// Line formats written by the two generations of bike firmware

use serde::{Deserialize, Serialize};

use crate::data::types::RawSample;

/// Prefix of orientation lines in the older serial log format
const IMU_PREFIX: &str = "IMU: ";

/// Which line format a log directory was recorded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// `timestamp,pitch,roll,yaw,gForce[,hallDir,speed...]`
    #[default]
    Csv,

    /// `IMU: pitch, roll, yaw`
    ImuPrefixed,
}

impl SchemaVariant {
    /// Width of the feature row produced by this schema
    pub fn feature_count(&self) -> usize {
        match self {
            SchemaVariant::Csv => 4,
            SchemaVariant::ImuPrefixed => 3,
        }
    }

    /// Parse one log line. Returns None for anything that is not a
    /// well-formed reading; callers skip those lines.
    pub fn parse_line(&self, line: &str) -> Option<RawSample> {
        match self {
            SchemaVariant::Csv => parse_csv_line(line),
            SchemaVariant::ImuPrefixed => parse_imu_line(line),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVariant::Csv => "csv",
            SchemaVariant::ImuPrefixed => "imu_prefixed",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(SchemaVariant::Csv),
            "imu_prefixed" | "imu" => Some(SchemaVariant::ImuPrefixed),
            _ => None,
        }
    }
}

fn parse_csv_line(line: &str) -> Option<RawSample> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 5 {
        return None;
    }

    let pitch = parse_float(fields[1])?;
    let roll = parse_float(fields[2])?;
    let yaw = parse_float(fields[3])?;
    let g_force = parse_float(fields[4])?;

    Some(RawSample::with_g_force(pitch, roll, yaw, g_force))
}

fn parse_imu_line(line: &str) -> Option<RawSample> {
    let payload = line.trim_end().strip_prefix(IMU_PREFIX)?;

    let fields: Vec<&str> = payload.split(", ").collect();
    if fields.len() != 3 {
        return None;
    }

    let pitch = parse_float(fields[0])?;
    let roll = parse_float(fields[1])?;
    let yaw = parse_float(fields[2])?;

    Some(RawSample::orientation(pitch, roll, yaw))
}

fn parse_float(field: &str) -> Option<f32> {
    field.trim().parse::<f32>().ok()
}
