//! Violation catalog.
//!
//! Codes are stable identifiers referenced by tests and downstream tooling.
//! Never renumber; add new codes at the end.

use serde::Serialize;
use std::fmt;

/// One entry of the fixed violation catalog (S1-S13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum ViolationCode {
    /// Syntax kind outside the whitelist.
    S1 = 1,
    /// Underscore-prefixed identifier or attribute.
    S2 = 2,
    /// `import` below module top level.
    S3 = 3,
    /// `from X import Y`.
    S4 = 4,
    /// Import target missing from the contract registry.
    S5 = 5,
    /// Class definition.
    S6 = 6,
    /// Async function definition.
    S7 = 7,
    /// Decorator outside the decorator set.
    S8 = 8,
    /// More than one constructor.
    S9 = 9,
    /// More than one decorator on a function.
    S10 = 10,
    /// Reserved storage keyword or storage constructor name rebound.
    S11 = 11,
    /// Storage-cell constructor assigned to several targets.
    S12 = 12,
    /// No exported function in the contract.
    S13 = 13,
}

impl ViolationCode {
    pub const ALL: [ViolationCode; 13] = [
        ViolationCode::S1,
        ViolationCode::S2,
        ViolationCode::S3,
        ViolationCode::S4,
        ViolationCode::S5,
        ViolationCode::S6,
        ViolationCode::S7,
        ViolationCode::S8,
        ViolationCode::S9,
        ViolationCode::S10,
        ViolationCode::S11,
        ViolationCode::S12,
        ViolationCode::S13,
    ];

    /// The code as printed in messages, e.g. `"S5"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationCode::S1 => "S1",
            ViolationCode::S2 => "S2",
            ViolationCode::S3 => "S3",
            ViolationCode::S4 => "S4",
            ViolationCode::S5 => "S5",
            ViolationCode::S6 => "S6",
            ViolationCode::S7 => "S7",
            ViolationCode::S8 => "S8",
            ViolationCode::S9 => "S9",
            ViolationCode::S10 => "S10",
            ViolationCode::S11 => "S11",
            ViolationCode::S12 => "S12",
            ViolationCode::S13 => "S13",
        }
    }

    /// Fixed human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            ViolationCode::S1 => "Illegal seneca syntax type used",
            ViolationCode::S2 => "Illicit use of '_' before variable",
            ViolationCode::S3 => "Illicit use of Nested imports",
            ViolationCode::S4 => "ImportFrom ast nodes not yet supported",
            ViolationCode::S5 => "Contract not found in lib",
            ViolationCode::S6 => "Illicit use of classes",
            ViolationCode::S7 => "Illicit use of Async functions",
            ViolationCode::S8 => "Invalid decorator used",
            ViolationCode::S9 => "Multiple use of constructors detected",
            ViolationCode::S10 => "Illicit use of multiple decorators",
            ViolationCode::S11 => "Illicit keyword overloading",
            ViolationCode::S12 => "Multiple targets to ORM definition detected",
            ViolationCode::S13 => "no valid export found",
        }
    }

    /// `"<code>- <description>"`, the prefix shared by every template.
    pub fn trigger(self) -> String {
        format!("{}- {}", self.as_str(), self.description())
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
