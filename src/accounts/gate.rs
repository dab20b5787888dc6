use std::collections::BTreeSet;
use std::fmt;

use super::{AccountId, LocalAccount};
use crate::utils::LoggingHelper;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    pub disable_admin_login: bool,
    pub admin_account_id: AccountId,
    pub disabled_roles: BTreeSet<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            disable_admin_login: true,
            admin_account_id: 1,
            disabled_roles: BTreeSet::new(),
        }
    }
}

/// The first rule that refused a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDenial {
    AdminLoginDisabled,
    RoleDisabled(String),
    InactiveAccount,
}

impl fmt::Display for GateDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdminLoginDisabled => write!(f, "administrator login is disabled"),
            Self::RoleDisabled(role) => write!(f, "role '{role}' may not log in"),
            Self::InactiveAccount => write!(f, "account is not active"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied(GateDenial),
}

/// Policy checks run before any Facebook login succeeds
///
/// Rules are evaluated in order: administrator, disabled roles, account status.
#[derive(Debug, Clone, Default)]
pub struct AccountGate {
    policy: GatePolicy,
}

impl AccountGate {
    #[must_use]
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn check(&self, account: &LocalAccount) -> GateDecision {
        let denial = self.first_denial(account);
        match denial {
            Some(denial) => {
                LoggingHelper::log_gate_denial(account.id, &denial.to_string());
                GateDecision::Denied(denial)
            }
            None => GateDecision::Allowed,
        }
    }

    fn first_denial(&self, account: &LocalAccount) -> Option<GateDenial> {
        if self.policy.disable_admin_login && account.id == self.policy.admin_account_id {
            return Some(GateDenial::AdminLoginDisabled);
        }
        if let Some(role) = account
            .roles
            .iter()
            .find(|role| self.policy.disabled_roles.contains(*role))
        {
            return Some(GateDenial::RoleDisabled(role.clone()));
        }
        if !account.is_active() {
            return Some(GateDenial::InactiveAccount);
        }
        None
    }
}
