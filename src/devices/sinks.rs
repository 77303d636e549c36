use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

use super::traits::{Reading, Value, ValueSink};

/// A reading stamped with the time it left the decoder.
#[derive(Debug, Clone)]
pub struct TimestampedReading {
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

/// Forwards readings into a tokio channel so the async side can format and
/// ship them.
pub struct ChannelSink {
    tx: UnboundedSender<TimestampedReading>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<TimestampedReading>) -> Self {
        Self { tx }
    }
}

impl ValueSink for ChannelSink {
    fn publish(&mut self, reading: Reading) {
        let item = TimestampedReading {
            timestamp: Utc::now(),
            reading,
        };
        if self.tx.send(item).is_err() {
            debug!("Reading receiver dropped, value discarded");
        }
    }
}

/// Latest value per reading name.
#[derive(Debug, Default, Clone)]
pub struct ReadingCache {
    values: HashMap<&'static str, Value>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Readings sorted by name.
    pub fn snapshot(&self) -> Vec<Reading> {
        let mut readings: Vec<Reading> = self
            .values
            .iter()
            .map(|(&name, value)| Reading::new(name, value.clone()))
            .collect();
        readings.sort_by(|a, b| a.name.cmp(b.name));
        readings
    }
}

impl ValueSink for ReadingCache {
    fn publish(&mut self, reading: Reading) {
        self.values.insert(reading.name, reading.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_cache_keeps_latest_value() {
        let mut cache = ReadingCache::new();
        cache.publish(Reading::float("target_temp", 21.0));
        cache.publish(Reading::float("target_temp", 22.5));
        cache.publish(Reading::integer("ventilation_speed", 3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("target_temp"), Some(&Value::Float(22.5)));
        let names: Vec<_> = cache.snapshot().iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["target_temp", "ventilation_speed"]);
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        sink.publish(Reading::flag("door_open", true));

        let item = rx.try_recv().unwrap();
        assert_eq!(item.reading, Reading::flag("door_open", true));
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        sink.publish(Reading::integer("active_alarms", 0));
    }
}
