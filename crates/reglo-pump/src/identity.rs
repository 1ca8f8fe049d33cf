use serde::Serialize;

/// What the pump reported about itself at session establishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub model_no: String,
    pub serial_no: String,
    pub sw_ver: String,
    pub head_code: String,
    pub channel_count: u8,
}

impl DeviceIdentity {
    /// Channel numbers, starting at 1.
    pub fn channel_nos(&self) -> Vec<u8> {
        (1..=self.channel_count).collect()
    }
}
