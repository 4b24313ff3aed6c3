use serde::{Deserialize, Serialize};

/// The bookable resource: which kind of vehicle is requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceClass {
    Standard,
    Premium,
    Xl,
}

impl ServiceClass {
    pub const ALL: [ServiceClass; 3] = [ServiceClass::Standard, ServiceClass::Premium, ServiceClass::Xl];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceClass::Standard => "standard",
            ServiceClass::Premium => "premium",
            ServiceClass::Xl => "xl",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Some(ServiceClass::Standard),
            "premium" => Some(ServiceClass::Premium),
            "xl" => Some(ServiceClass::Xl),
            _ => None,
        }
    }
}
