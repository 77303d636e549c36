pub const UNKNOWN: &str = "Unknown";

pub const OPERATION_MODES: [&str; 5] = ["Off", "Heat", "Cool", "Auto", "Service"];

pub const CONTROL_STATES: [&str; 14] = [
    "Off",
    "Shift",
    "Stop",
    "Start",
    "Standby",
    "Ventilation stop",
    "Ventilation",
    "Heating",
    "Cooling",
    "Hot water",
    "Legionella",
    "Cooling + hot water",
    "Central heating",
    "Defrost",
];

pub const USER_FUNCTIONS: [&str; 7] = [
    "0 : None",
    "1 : Extend",
    "2 : Inlet",
    "3 : Exhaust",
    "4 : External heater offset",
    "5 : Ventilate",
    "6 : Cooker Hood",
];

pub fn label(table: &'static [&'static str], code: u16) -> &'static str {
    table.get(code as usize).copied().unwrap_or(UNKNOWN)
}

pub fn operation_mode(code: u16) -> &'static str {
    label(&OPERATION_MODES, code)
}

pub fn control_state(code: u16) -> &'static str {
    label(&CONTROL_STATES, code)
}

pub fn user_function(code: u16) -> &'static str {
    label(&USER_FUNCTIONS, code)
}
