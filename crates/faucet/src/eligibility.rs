//! Recipient eligibility and signer sufficiency rules.

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Allow,
    Deny(String),
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Eligibility::Allow)
    }
}

/// Rules a recipient must satisfy before anything is dispensed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityPolicy {
    /// Recipients holding this much or more are refused.
    pub max_recipient_balance: u128,
    /// Requests must carry a verified challenge.
    pub challenge: bool,
}

impl EligibilityPolicy {
    pub fn check(&self, balance: u128) -> Eligibility {
        if balance >= self.max_recipient_balance {
            Eligibility::Deny(format!(
                "balance {} is not below the threshold {}",
                balance, self.max_recipient_balance
            ))
        } else {
            Eligibility::Allow
        }
    }

    pub fn check_challenge(&self, challenge_passed: bool) -> Eligibility {
        if self.challenge && !challenge_passed {
            Eligibility::Deny("challenge not solved".to_string())
        } else {
            Eligibility::Allow
        }
    }
}

/// Funds a signer must hold on top of what a single transfer costs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerPolicy {
    pub reserve: u128,
}

impl SignerPolicy {
    pub fn required_balance(&self, amount: u128, max_fee: u128) -> u128 {
        amount.saturating_add(max_fee).saturating_add(self.reserve)
    }

    pub fn is_sufficient(&self, balance: u128, amount: u128, max_fee: u128) -> bool {
        balance >= self.required_balance(amount, max_fee)
    }
}
