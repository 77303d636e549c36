use chrono::Utc;
use serde_json::json;

use crate::devices::sinks::TimestampedReading;
use crate::devices::traits::Reading;
use crate::utils::error::ModbusError;

pub trait DataFormatter: Send + Sync {
    fn format_reading(&self, item: &TimestampedReading) -> String;
    fn format_snapshot(&self, readings: &[Reading]) -> String;
    fn format_header(&self) -> String;

    fn format_batch(&self, items: &[TimestampedReading]) -> String {
        items
            .iter()
            .map(|item| self.format_reading(item))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_reading(&self, item: &TimestampedReading) -> String {
        format!(
            "[{}] {}: {}",
            item.timestamp.format("%H:%M:%S%.3f"),
            item.reading.name,
            item.reading.value
        )
    }

    fn format_snapshot(&self, readings: &[Reading]) -> String {
        let mut output = String::from("📊 Nilan Readings:\n");
        output.push_str(&"═".repeat(60));
        output.push('\n');
        for reading in readings {
            output.push_str(&format!("{:<28} {}\n", reading.name, reading.value));
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🌬️  Nilan Modbus Data - {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_reading(&self, item: &TimestampedReading) -> String {
        json!({
            "timestamp": item.timestamp.to_rfc3339(),
            "name": item.reading.name,
            "value": item.reading.value,
        })
        .to_string()
    }

    fn format_snapshot(&self, readings: &[Reading]) -> String {
        let values: serde_json::Map<String, serde_json::Value> = readings
            .iter()
            .map(|r| (r.name.to_string(), json!(r.value)))
            .collect();
        let result = json!({
            "timestamp": Utc::now().timestamp(),
            "readings": values,
        });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new()
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_reading(&self, item: &TimestampedReading) -> String {
        format!(
            "{},{},{},{}",
            item.timestamp.to_rfc3339(),
            item.reading.name,
            item.reading.value.kind(),
            csv_field(&item.reading.value.to_string())
        )
    }

    fn format_snapshot(&self, readings: &[Reading]) -> String {
        let timestamp = Utc::now().to_rfc3339();
        readings
            .iter()
            .map(|r| format!("{},{},{},{}\n", timestamp, r.name, r.value.kind(), csv_field(&r.value.to_string())))
            .collect()
    }

    fn format_header(&self) -> String {
        "Timestamp,Name,Kind,Value".to_string()
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn formatter_for(format: &str) -> Result<Box<dyn DataFormatter>, ModbusError> {
    match format {
        "console" => Ok(Box::new(ConsoleFormatter)),
        "json" => Ok(Box::new(JsonFormatter)),
        "csv" => Ok(Box::new(CsvFormatter)),
        other => Err(ModbusError::ConfigError(format!("Unknown output format: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(reading: Reading) -> TimestampedReading {
        TimestampedReading {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            reading,
        }
    }

    #[test]
    fn test_console_line() {
        let line = ConsoleFormatter.format_reading(&item(Reading::float("temp_t7", 21.456)));
        assert_eq!(line, "[12:30:05.000] temp_t7: 21.46");
    }

    #[test]
    fn test_json_line_is_parseable() {
        let line = JsonFormatter.format_reading(&item(Reading::flag("door_open", true)));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["name"], "door_open");
        assert_eq!(parsed["value"], true);
        assert_eq!(parsed["timestamp"], "2024-03-01T12:30:05+00:00");
    }

    #[test]
    fn test_json_snapshot_keys_by_name() {
        let snapshot = JsonFormatter.format_snapshot(&[
            Reading::integer("co2_level", 640),
            Reading::text("operation_mode", "Auto"),
        ]);
        let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed["readings"]["co2_level"], 640);
        assert_eq!(parsed["readings"]["operation_mode"], "Auto");
    }

    #[test]
    fn test_csv_quotes_commas() {
        let line = CsvFormatter.format_reading(&item(Reading::text("control_state", "Cooling, hot")));
        assert_eq!(line, "2024-03-01T12:30:05+00:00,control_state,text,\"Cooling, hot\"");

        let batch = CsvFormatter.format_batch(&[
            item(Reading::integer("active_alarms", 0)),
            item(Reading::flag("is_summer", false)),
        ]);
        assert_eq!(batch.lines().count(), 2);
        assert!(batch.ends_with("is_summer,bool,OFF"));
    }

    #[test]
    fn test_formatter_lookup() {
        assert!(formatter_for("json").is_ok());
        assert!(formatter_for("csv").unwrap().format_header().starts_with("Timestamp"));
        assert!(matches!(formatter_for("hex"), Err(ModbusError::ConfigError(_))));
    }
}
