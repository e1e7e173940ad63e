use std::{fmt, str::FromStr};

use crate::Error;

/// Where pipelines are placed when the worker instantiates them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Cuda(usize),
    Metal(usize),
    /// Probe the host for an accelerator, falling back to the CPU.
    Auto,
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::ForceCpu
    }
}

impl FromStr for DeviceMap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (name, ordinal) = match s.split_once(':') {
            Some((name, ordinal)) => {
                let ordinal = ordinal
                    .parse::<usize>()
                    .map_err(|_| Error::invalid("device", format!("bad ordinal in `{s}`")))?;
                (name, ordinal)
            }
            None => (s.as_str(), 0),
        };
        match name {
            "cpu" => Ok(Self::ForceCpu),
            "cuda" | "gpu" => Ok(Self::Cuda(ordinal)),
            "metal" | "mps" => Ok(Self::Metal(ordinal)),
            "auto" => Ok(Self::Auto),
            other => Err(Error::invalid(
                "device",
                format!("unknown device `{other}`, expected cpu, cuda[:N], mps or auto"),
            )),
        }
    }
}

impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForceCpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::Metal(ordinal) => write!(f, "mps:{ordinal}"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Weight precision requested from the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    F16,
    F32,
}

impl Precision {
    /// Half precision on accelerators, full precision on the CPU.
    pub fn for_device(device: DeviceMap) -> Self {
        match device {
            DeviceMap::ForceCpu | DeviceMap::Auto => Self::F32,
            DeviceMap::Cuda(_) | DeviceMap::Metal(_) => Self::F16,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F16 => "float16",
            Self::F32 => "float32",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_names() {
        assert_eq!("cpu".parse::<DeviceMap>().unwrap(), DeviceMap::ForceCpu);
        assert_eq!("CUDA".parse::<DeviceMap>().unwrap(), DeviceMap::Cuda(0));
        assert_eq!("cuda:1".parse::<DeviceMap>().unwrap(), DeviceMap::Cuda(1));
        assert_eq!("mps".parse::<DeviceMap>().unwrap(), DeviceMap::Metal(0));
        assert!("tpu".parse::<DeviceMap>().is_err());
        assert!("cuda:x".parse::<DeviceMap>().is_err());
    }

    #[test]
    fn half_precision_only_on_accelerators() {
        assert_eq!(Precision::for_device(DeviceMap::ForceCpu), Precision::F32);
        assert_eq!(Precision::for_device(DeviceMap::Cuda(0)), Precision::F16);
    }
}
