//! Agent discovery.
//!
//! A pure reader over the frozen registries and the per-agent fact files.
//! The plan-time registry gives roles, addresses, and endpoints; facts
//! published at runtime contribute wallet addresses. Nothing here ever
//! writes. Construct one `Discovery` per iteration: queries read fresh
//! state, and holding the handle across iterations would hide newly
//! published facts only if the caller never re-queries, not because
//! anything is cached here.

use crate::agent::store::{SharedStore, StoreError};
use crate::registry::{
    miner_info_file, user_info_file, AgentEntry, AgentFact, AgentRegistry, MinerEntry,
    MinerRegistry, AGENT_REGISTRY_FILE, MINER_REGISTRY_FILE,
};
use crate::utils::options::parse_flexible_bool;

#[derive(Debug, Clone)]
pub struct Discovery {
    store: SharedStore,
}

impl Discovery {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// The plan-time agent directory; absent reads as empty.
    pub fn agent_registry(&self) -> Result<AgentRegistry, StoreError> {
        Ok(self
            .store
            .read::<AgentRegistry>(AGENT_REGISTRY_FILE)?
            .unwrap_or_default())
    }

    /// Miners with a published wallet address.
    pub fn list_miners(&self) -> Result<Vec<MinerEntry>, StoreError> {
        let registry = self
            .store
            .read::<MinerRegistry>(MINER_REGISTRY_FILE)?
            .unwrap_or_default();

        let mut miners = Vec::new();
        for mut miner in registry.miners {
            if miner.wallet_address.is_none() {
                miner.wallet_address = self.published_wallet_address(&miner.agent_id, true)?;
            }
            if miner.wallet_address.is_some() {
                miners.push(miner);
            }
        }
        Ok(miners)
    }

    /// Agents whose `can_receive_distributions` attribute parses true,
    /// enriched with any published wallet address.
    pub fn list_distribution_recipients(&self) -> Result<Vec<AgentEntry>, StoreError> {
        let registry = self.agent_registry()?;
        let mut recipients = Vec::new();
        for entry in registry.agents {
            let eligible = entry
                .attributes
                .get("can_receive_distributions")
                .map(|v| parse_flexible_bool(v))
                .unwrap_or(false);
            if eligible {
                recipients.push(self.enrich(entry)?);
            }
        }
        Ok(recipients)
    }

    /// Agents with a published wallet address, i.e. the ones transfers
    /// can actually reach.
    pub fn list_wallet_holders(&self) -> Result<Vec<AgentEntry>, StoreError> {
        let registry = self.agent_registry()?;
        let mut holders = Vec::new();
        for entry in registry.agents {
            let enriched = self.enrich(entry)?;
            if enriched.wallet_address.is_some() {
                holders.push(enriched);
            }
        }
        Ok(holders)
    }

    /// Agents carrying a given role.
    pub fn agents_by_role(&self, role: &str) -> Result<Vec<AgentEntry>, StoreError> {
        let registry = self.agent_registry()?;
        let mut agents = Vec::new();
        for entry in registry.agents {
            if entry.role == role {
                agents.push(self.enrich(entry)?);
            }
        }
        Ok(agents)
    }

    /// Resolve one agent id to its endpoint bundle.
    pub fn resolve(&self, agent_id: &str) -> Result<Option<AgentEntry>, StoreError> {
        let registry = self.agent_registry()?;
        match registry.agents.into_iter().find(|a| a.id == agent_id) {
            Some(entry) => Ok(Some(self.enrich(entry)?)),
            None => Ok(None),
        }
    }

    /// Fill the wallet address from the agent's own published fact.
    fn enrich(&self, mut entry: AgentEntry) -> Result<AgentEntry, StoreError> {
        if entry.wallet_address.is_none() {
            entry.wallet_address =
                self.published_wallet_address(&entry.id, entry.role == "miner")?;
        }
        Ok(entry)
    }

    fn published_wallet_address(
        &self,
        agent_id: &str,
        miner_first: bool,
    ) -> Result<Option<String>, StoreError> {
        let (first, second) = if miner_first {
            (miner_info_file(agent_id), user_info_file(agent_id))
        } else {
            (user_info_file(agent_id), miner_info_file(agent_id))
        };
        for filename in [first, second] {
            if let Some(fact) = self.store.read::<AgentFact>(&filename)? {
                if fact.wallet_address.is_some() {
                    return Ok(fact.wallet_address);
                }
            }
        }
        Ok(None)
    }
}
