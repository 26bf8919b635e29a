//! Sensor record model: decoded fields per reading and readings per transmission cycle.

use std::fmt;

use chrono::NaiveDateTime;

use super::{
    error::FormatError,
    payload::{self, DataFormat},
};

/// Timestamp format of the CSV data log.
pub const CSV_TIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
/// Timestamp prefix of the transmission payload (24-hour `HHMM`).
pub const PAYLOAD_TIME_FORMAT: &'static str = "%H%M";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSource {
    /// Digital rain gauge.
    RainGauge,
    /// Digital staff gauge (water level).
    StaffGauge,
}

/// One decoded field. `datum` is `None` when the sensor could not be read.
#[derive(Clone, Debug, PartialEq)]
pub struct RawData {
    pub format: DataFormat,
    pub datum: Option<f64>,
}

/// One sensor reading.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorData {
    source: DataSource,
    unit: &'static str,
    timestamp: NaiveDateTime,
    data: Vec<RawData>,
}

/// All readings of one polling cycle, in transmission order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledSensorData {
    data: Vec<SensorData>,
}

impl DataSource {
    /// Short code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            DataSource::RainGauge => "DRRG",
            DataSource::StaffGauge => "DSG",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            DataSource::RainGauge => "mm",
            DataSource::StaffGauge => "cm",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl RawData {
    pub fn new(format: DataFormat, datum: Option<f64>) -> Self {
        RawData { format, datum }
    }

    /// An absent field of the given format.
    pub fn absent(format: DataFormat) -> Self {
        RawData {
            format,
            datum: None,
        }
    }

    pub fn render(&self) -> Result<String, FormatError> {
        payload::render(self.datum, self.format)
    }
}

impl SensorData {
    pub fn new(source: DataSource, timestamp: NaiveDateTime) -> Self {
        SensorData {
            source,
            unit: source.unit(),
            timestamp,
            data: vec![],
        }
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    pub fn unit(&self) -> &str {
        self.unit
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn data(&self) -> &[RawData] {
        self.data.as_slice()
    }

    pub fn append_data(&mut self, datum: RawData) {
        self.data.push(datum);
    }

    /// Concatenated fixed-width fields of this reading.
    pub fn payload(&self) -> Result<String, FormatError> {
        let mut payload = String::new();
        for datum in self.data.iter() {
            payload.push_str(datum.render()?.as_str());
        }
        Ok(payload)
    }
}

impl CompiledSensorData {
    pub fn new(data: Vec<SensorData>) -> Self {
        CompiledSensorData { data }
    }

    pub fn append_data(&mut self, datum: SensorData) {
        self.data.push(datum);
    }

    pub fn data(&self) -> &[SensorData] {
        self.data.as_slice()
    }

    /// `HHMM` followed by the payload of every reading.
    ///
    /// The first field that does not fit its format aborts the whole payload.
    pub fn full_payload(&self, timestamp: NaiveDateTime) -> Result<String, FormatError> {
        let mut payload = timestamp.format(PAYLOAD_TIME_FORMAT).to_string();
        for sensor_data in self.data.iter() {
            payload.push_str(sensor_data.payload()?.as_str());
        }
        Ok(payload)
    }

    /// The timestamp followed by every raw value, with empty cells for absent values.
    pub fn csv_row(&self, timestamp: NaiveDateTime) -> Vec<String> {
        let mut row = vec![timestamp.format(CSV_TIME_FORMAT).to_string()];
        for sensor_data in self.data.iter() {
            for datum in sensor_data.data.iter() {
                row.push(match datum.datum {
                    None => String::new(),
                    Some(v) => v.to_string(),
                });
            }
        }
        row
    }
}
