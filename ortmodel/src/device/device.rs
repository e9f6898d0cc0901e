use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Backend-specific key/value options passed along with a provider.
pub type ProviderOptions = BTreeMap<String, String>;

/// Memory location a tensor lives in and a graph executes on.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda {
        ordinal: u32,
    },
}

impl Device {
    /// Accelerators keep tensors in their own memory and can bind them without a host copy.
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda { .. })
    }

    pub fn ordinal(&self) -> Option<u32> {
        match self {
            Device::Cpu => None,
            Device::Cuda {
                ordinal,
            } => Some(*ordinal),
        }
    }

    /// Provider able to execute on this device.
    pub fn provider(&self) -> ExecutionProvider {
        match self {
            Device::Cpu => ExecutionProvider::Cpu,
            Device::Cuda {
                ..
            } => ExecutionProvider::Cuda,
        }
    }

    /// Options selecting this device inside its provider.
    pub fn provider_options(&self) -> ProviderOptions {
        let mut options = ProviderOptions::new();
        if let Some(ordinal) = self.ordinal() {
            options.insert("device_id".to_string(), ordinal.to_string());
        }
        options
    }
}

impl fmt::Display for Device {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda {
                ordinal,
            } => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    /// Accepts `cpu`, `cuda`, `cuda:N`, `-1` (cpu) and a bare ordinal `N` (cuda:N).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(index) = value.parse::<i64>() {
            return match index {
                -1 => Ok(Device::Cpu),
                index if index >= 0 => u32::try_from(index)
                    .map(|ordinal| Device::Cuda {
                        ordinal,
                    })
                    .map_err(|_| Error::InvalidDevice(value.to_string())),
                _ => Err(Error::InvalidDevice(value.to_string())),
            };
        }
        match value.split_once(':') {
            None if value == "cpu" => Ok(Device::Cpu),
            None if value == "cuda" => Ok(Device::Cuda {
                ordinal: 0,
            }),
            Some(("cuda", ordinal)) => ordinal
                .parse::<u32>()
                .map(|ordinal| Device::Cuda {
                    ordinal,
                })
                .map_err(|_| Error::InvalidDevice(value.to_string())),
            _ => Err(Error::InvalidDevice(value.to_string())),
        }
    }
}

/// Execution backend of the inference engine.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    #[default]
    #[serde(rename = "CPUExecutionProvider")]
    Cpu,
    #[serde(rename = "CUDAExecutionProvider")]
    Cuda,
    #[serde(rename = "TensorrtExecutionProvider")]
    Tensorrt,
    #[serde(rename = "ROCMExecutionProvider")]
    Rocm,
    #[serde(rename = "OpenVINOExecutionProvider")]
    OpenVino,
}

impl ExecutionProvider {
    pub const fn name(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "CPUExecutionProvider",
            ExecutionProvider::Cuda => "CUDAExecutionProvider",
            ExecutionProvider::Tensorrt => "TensorrtExecutionProvider",
            ExecutionProvider::Rocm => "ROCMExecutionProvider",
            ExecutionProvider::OpenVino => "OpenVINOExecutionProvider",
        }
    }

    /// Device outputs land on when this provider runs the graph, if it is known.
    pub fn device(&self) -> Option<Device> {
        match self {
            ExecutionProvider::Cpu => Some(Device::Cpu),
            ExecutionProvider::Cuda | ExecutionProvider::Tensorrt => Some(Device::Cuda {
                ordinal: 0,
            }),
            ExecutionProvider::Rocm | ExecutionProvider::OpenVino => None,
        }
    }

    /// Providers that run their own memory planner, which makes I/O binding redundant.
    pub fn manages_own_memory(&self) -> bool {
        matches!(self, ExecutionProvider::Tensorrt)
    }

    /// Provider list handed to the engine when `self` is requested.
    pub fn with_fallbacks(&self) -> Vec<ExecutionProvider> {
        match self {
            ExecutionProvider::Tensorrt => vec![ExecutionProvider::Tensorrt, ExecutionProvider::Cuda],
            provider => vec![*provider],
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecutionProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            ExecutionProvider::Cpu,
            ExecutionProvider::Cuda,
            ExecutionProvider::Tensorrt,
            ExecutionProvider::Rocm,
            ExecutionProvider::OpenVino,
        ]
        .into_iter()
        .find(|provider| provider.name() == value)
        .ok_or_else(|| Error::UnknownProvider(value.to_string()))
    }
}

/// Fails with [`Error::UnavailableProvider`] when the engine was built without `provider`.
pub fn validate_provider_availability(
    provider: ExecutionProvider,
    available: &[ExecutionProvider],
) -> Result<(), Error> {
    if available.contains(&provider) {
        Ok(())
    } else {
        Err(Error::UnavailableProvider {
            provider,
            available: available.to_vec(),
        })
    }
}
