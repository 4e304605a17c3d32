use std::fmt;

use serde::{Deserialize, Serialize};

/// Device assignment of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    #[default]
    Default,
    Interpreter,
    Cpu,
    Gpu,
    Accelerator,
}

impl Placement {
    pub fn name(self) -> &'static str {
        match self {
            Placement::Default => "DEFAULT",
            Placement::Interpreter => "INTERPRETER",
            Placement::Cpu => "CPU",
            Placement::Gpu => "GPU",
            Placement::Accelerator => "ACCELERATOR",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
