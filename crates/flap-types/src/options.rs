use serde::{Deserialize, Serialize};

/// What the decoder does with a line that does not match the event pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnparsedPolicy {
    /// Copy the original line to the output unchanged
    #[default]
    Passthrough,
    /// Emit nothing for the line
    Drop,
}

/// Time zone used to render decoded wall-clock timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneMode {
    #[default]
    Local,
    Utc,
}

/// How `(pid, fd)` pairs are turned into file paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Read the `/proc/<pid>/fd/<fd>` symlink
    #[default]
    Proc,
    /// Run an external helper as `<helper> <pid> <fd>`
    Command,
}
