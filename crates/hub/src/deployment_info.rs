use ethereum_types::Address;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DeploymentEntry {
    number: u32,
    under_deployment: bool,
}

/// Deployment number and status of every account touched in the conflation.
///
/// The number increases with every (re)deployment at an address and with every
/// SELFDESTRUCT that wipes it. The status is `true` while init code runs at the address.
#[derive(Debug, Clone, Default)]
pub struct DeploymentInfo {
    entries: FxHashMap<Address, DeploymentEntry>,
}

impl DeploymentInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deployment_number(&self, address: Address) -> u32 {
        self.entry(address).number
    }

    pub fn deployment_status(&self, address: Address) -> bool {
        self.entry(address).under_deployment
    }

    /// Init code is about to run at `address`.
    pub fn new_deployment_with_execution_at(&mut self, address: Address) {
        let entry = self.entries.entry(address).or_default();
        entry.number = entry.number.saturating_add(1);
        entry.under_deployment = true;
    }

    /// Empty init code: the account is deployed immediately.
    pub fn new_deployment_sans_execution_at(&mut self, address: Address) {
        let entry = self.entries.entry(address).or_default();
        entry.number = entry.number.saturating_add(1);
        entry.under_deployment = false;
    }

    pub fn mark_as_not_under_deployment(&mut self, address: Address) {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.under_deployment = false;
        }
    }

    /// A SELFDESTRUCT took effect at the end of the transaction.
    pub fn freshen_after_selfdestruct(&mut self, address: Address) {
        let entry = self.entries.entry(address).or_default();
        entry.number = entry.number.saturating_add(1);
        entry.under_deployment = false;
    }

    fn entry(&self, address: Address) -> DeploymentEntry {
        self.entries.get(&address).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_numbers_increase_per_redeployment() {
        let address = Address::from_low_u64_be(7);
        let mut info = DeploymentInfo::new();
        assert_eq!(info.deployment_number(address), 0);
        assert!(!info.deployment_status(address));

        info.new_deployment_with_execution_at(address);
        assert_eq!(info.deployment_number(address), 1);
        assert!(info.deployment_status(address));

        info.mark_as_not_under_deployment(address);
        assert!(!info.deployment_status(address));

        info.freshen_after_selfdestruct(address);
        info.new_deployment_sans_execution_at(address);
        assert_eq!(info.deployment_number(address), 3);
        assert!(!info.deployment_status(address));
    }
}
