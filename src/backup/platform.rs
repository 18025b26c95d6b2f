use derive_more::Display;
use std::str::FromStr;

/// The closed set of target platforms a plan may declare.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Platform {
    #[display("mongodb")]
    MongoDb,
    #[display("influxdb")]
    InfluxDb,
    #[display("prometheus")]
    Prometheus,
    #[display("gitlab")]
    Gitlab,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::MongoDb,
        Platform::InfluxDb,
        Platform::Prometheus,
        Platform::Gitlab,
    ];
}

#[derive(Debug, Display, PartialEq, Eq)]
#[display("unknown platform {_0:?}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.to_string() == s)
            .ok_or_else(|| UnknownPlatform(s.to_owned()))
    }
}
