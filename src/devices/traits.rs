use serde::Serialize;
use std::fmt;

/// Decoded value of one register field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Float(f32),
    Integer(u32),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Integer(v) => Some(v as f32),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Integer(_) => "integer",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{:.2}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", if *v { "ON" } else { "OFF" }),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// One named field decoded from a register block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub name: &'static str,
    pub value: Value,
}

impl Reading {
    pub fn new(name: &'static str, value: Value) -> Self {
        Self { name, value }
    }

    pub fn float(name: &'static str, value: f32) -> Self {
        Self::new(name, Value::Float(value))
    }

    pub fn integer(name: &'static str, value: u32) -> Self {
        Self::new(name, Value::Integer(value))
    }

    pub fn flag(name: &'static str, value: bool) -> Self {
        Self::new(name, Value::Bool(value))
    }

    pub fn text(name: &'static str, value: impl Into<String>) -> Self {
        Self::new(name, Value::Text(value.into()))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Receives every reading the decoder produces.
pub trait ValueSink {
    fn publish(&mut self, reading: Reading);
}

impl<S: ValueSink + ?Sized> ValueSink for &mut S {
    fn publish(&mut self, reading: Reading) {
        (**self).publish(reading)
    }
}

impl ValueSink for Vec<Reading> {
    fn publish(&mut self, reading: Reading) {
        self.push(reading);
    }
}
