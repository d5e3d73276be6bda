use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::Serialize;

use crate::constants::EMPTY_CODE_HASH;
use crate::deployment_info::DeploymentInfo;
use crate::errors::HubError;
use crate::utils::code_hash;
use crate::world::{MessageFrame, WorldView};

/// Point-in-time view of an account.
///
/// Snapshots are values: every mutator returns a new snapshot and leaves `self` untouched, so a
/// "before" and an "after" are always two distinct values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    #[serde(with = "crate::serde_utils::bytes")]
    byte_code: Bytes,
    pub is_warm: bool,
    pub deployment_number: u32,
    pub deployment_status: bool,
}

impl AccountSnapshot {
    /// Snapshot of an account that does not exist.
    pub fn empty(address: Address, is_warm: bool, deployments: &DeploymentInfo) -> Self {
        Self {
            address,
            nonce: 0,
            balance: U256::zero(),
            byte_code: Bytes::new(),
            is_warm,
            deployment_number: deployments.deployment_number(address),
            deployment_status: deployments.deployment_status(address),
        }
    }

    pub fn from_world(
        world: &dyn WorldView,
        deployments: &DeploymentInfo,
        address: Address,
        is_warm: bool,
    ) -> Self {
        match world.account(address) {
            Some(account) => Self {
                address,
                nonce: account.nonce,
                balance: account.balance,
                byte_code: account.code,
                is_warm,
                deployment_number: deployments.deployment_number(address),
                deployment_status: deployments.deployment_status(address),
            },
            None => Self::empty(address, is_warm, deployments),
        }
    }

    /// Snapshot as seen from inside `frame`, warmth included.
    pub fn canonical(
        world: &dyn WorldView,
        frame: &dyn MessageFrame,
        deployments: &DeploymentInfo,
        address: Address,
    ) -> Self {
        Self::from_world(world, deployments, address, frame.is_address_warm(address))
    }

    /// Code the account holds once deployed; empty while its init code runs.
    pub fn code(&self) -> Bytes {
        if self.deployment_status {
            Bytes::new()
        } else {
            self.byte_code.clone()
        }
    }

    /// Code executed when the account is the byte code address of a frame.
    pub fn byte_code(&self) -> &Bytes {
        &self.byte_code
    }

    pub fn code_hash(&self) -> H256 {
        if self.deployment_status || self.byte_code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            code_hash(&self.byte_code)
        }
    }

    pub fn code_size(&self) -> usize {
        if self.deployment_status {
            0
        } else {
            self.byte_code.len()
        }
    }

    pub fn has_code(&self) -> bool {
        self.code_size() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && !self.has_code()
    }

    pub fn debit(&self, amount: U256) -> Result<Self, HubError> {
        let balance =
            self.balance
                .checked_sub(amount)
                .ok_or(HubError::InsufficientBalance {
                    address: self.address,
                    balance: self.balance,
                    amount,
                })?;
        Ok(Self {
            balance,
            ..self.clone()
        })
    }

    pub fn credit(&self, amount: U256) -> Result<Self, HubError> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(HubError::BalanceOverflow {
                address: self.address,
                amount,
            })?;
        Ok(Self {
            balance,
            ..self.clone()
        })
    }

    pub fn raise_nonce(&self) -> Result<Self, HubError> {
        let nonce = self
            .nonce
            .checked_add(1)
            .ok_or(HubError::NonceOverflow(self.address))?;
        Ok(self.with_nonce(nonce))
    }

    pub fn with_nonce(&self, nonce: u64) -> Self {
        Self {
            nonce,
            ..self.clone()
        }
    }

    pub fn with_balance(&self, balance: U256) -> Self {
        Self {
            balance,
            ..self.clone()
        }
    }

    pub fn with_warmth(&self, is_warm: bool) -> Self {
        Self {
            is_warm,
            ..self.clone()
        }
    }

    pub fn turn_on_warmth(&self) -> Self {
        self.with_warmth(true)
    }

    pub fn with_byte_code(&self, byte_code: Bytes) -> Self {
        Self {
            byte_code,
            ..self.clone()
        }
    }

    pub fn with_deployment(&self, deployment_number: u32, deployment_status: bool) -> Self {
        Self {
            deployment_number,
            deployment_status,
            ..self.clone()
        }
    }

    /// Refreshes the deployment number and status from the registry.
    pub fn with_deployment_info(&self, deployments: &DeploymentInfo) -> Self {
        self.with_deployment(
            deployments.deployment_number(self.address),
            deployments.deployment_status(self.address),
        )
    }
}
