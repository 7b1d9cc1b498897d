use std::fmt;
use std::str::FromStr;

/// Severity attached to each shipped record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShipLevel {
    Verbose,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl ShipLevel {
    /// All levels in ascending severity.
    pub const ALL: [ShipLevel; 5] = [
        ShipLevel::Verbose,
        ShipLevel::Debug,
        ShipLevel::Info,
        ShipLevel::Warning,
        ShipLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipLevel::Verbose => "VERBOSE",
            ShipLevel::Debug => "DEBUG",
            ShipLevel::Info => "INFO",
            ShipLevel::Warning => "WARNING",
            ShipLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for ShipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VERBOSE" | "TRACE" => Ok(Self::Verbose),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}
