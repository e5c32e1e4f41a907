use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the caller as resolved by the (external) auth layer. This core
/// treats it as an already-validated input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Patient,
    Doctor,
    Staff,
    Admin,
    Superadmin,
}

impl CallerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerRole::Patient => "patient",
            CallerRole::Doctor => "doctor",
            CallerRole::Staff => "staff",
            CallerRole::Admin => "admin",
            CallerRole::Superadmin => "superadmin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "patient" => Some(CallerRole::Patient),
            "doctor" => Some(CallerRole::Doctor),
            "staff" => Some(CallerRole::Staff),
            "admin" => Some(CallerRole::Admin),
            "superadmin" => Some(CallerRole::Superadmin),
            _ => None,
        }
    }
}

impl fmt::Display for CallerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data-driven rule exemptions per role. New roles or exemptions are a table
/// change, not a new code path.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    advance_notice_exempt: Vec<CallerRole>,
    same_day_booking_allowed: Vec<CallerRole>,
}

impl Default for RolePolicy {
    fn default() -> Self {
        let privileged = vec![
            CallerRole::Doctor,
            CallerRole::Staff,
            CallerRole::Admin,
            CallerRole::Superadmin,
        ];
        Self {
            advance_notice_exempt: privileged.clone(),
            same_day_booking_allowed: privileged,
        }
    }
}

impl RolePolicy {
    /// A privileged caller may opt back into the standard rules with
    /// `use_standard_rules`, in which case no exemption applies.
    pub fn exempt_from_advance_notice(&self, role: CallerRole, use_standard_rules: bool) -> bool {
        !use_standard_rules && self.advance_notice_exempt.contains(&role)
    }

    pub fn allows_same_day_booking(&self, role: CallerRole, use_standard_rules: bool) -> bool {
        !use_standard_rules && self.same_day_booking_allowed.contains(&role)
    }
}
