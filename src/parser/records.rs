use serde::{Deserialize, Serialize};

/// Header fields of a crash report. Every field is optional; a label that
/// never appears in the page stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub case_number: Option<String>,
    pub report_type: Option<String>,
    pub county: Option<String>,
    /// `YYYY-MM-DD` when recognized, otherwise the raw value.
    pub crash_date: Option<String>,
    /// `HH:MM` when recognized, otherwise the raw value.
    pub crash_time: Option<String>,
    pub location: Option<String>,
    pub officer_name: Option<String>,
    pub post: Option<String>,
    pub assisted_by: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Taken from the "Vehicle N" marker, not the position in the page.
    pub vehicle_number: u32,
    pub year: Option<String>,
    pub make: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub towed_by: Option<String>,
    pub driver_name: Option<String>,
    pub age: Option<String>,
    pub city_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Injury {
    /// Taken from the "Injury N" marker.
    pub injury_index: u32,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub age: Option<String>,
    pub city_state: Option<String>,
    pub seatbelt_use: Option<String>,
    pub life_saved_by_seatbelt: Option<String>,
    pub transported_to: Option<String>,
    pub transported_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCarrier {
    pub carrier_name: Option<String>,
    pub usdot_or_mcc: Option<String>,
    pub city_state: Option<String>,
    pub hazmat_involved: Option<String>,
}

impl MotorCarrier {
    pub fn is_empty(&self) -> bool {
        self.carrier_name.is_none()
            && self.usdot_or_mcc.is_none()
            && self.city_state.is_none()
            && self.hazmat_involved.is_none()
    }
}

/// Everything recovered from one report page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub report: Report,
    pub vehicles: Vec<Vehicle>,
    pub injuries: Vec<Injury>,
    pub motor_carriers: Vec<MotorCarrier>,
    /// First lines of the normalized text, for eyeballing pages that parse badly.
    pub preview: Vec<String>,
}
