//! Outbound group session state.

use sealbox_crypto::{MessageChain, aead};
use sealbox_proto::{GroupDistributionMessage, GroupMessage, SessionId};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::EngineError;

/// Sending side of a sender-key session: one forward-only chain.
#[derive(Serialize, Deserialize)]
pub(crate) struct OutboundGroupState {
    chain_key: [u8; 32],
    next_index: u32,
}

impl OutboundGroupState {
    pub(crate) fn new(seed: [u8; 32]) -> Self {
        Self { chain_key: seed, next_index: 0 }
    }

    /// Export the chain at its current position.
    ///
    /// The recipient can decrypt from `next_index` forward and nothing
    /// earlier, so late joiners never read history.
    pub(crate) fn distribution(&self, session_id: SessionId) -> GroupDistributionMessage {
        GroupDistributionMessage {
            session_id,
            chain_key: self.chain_key,
            index: self.next_index,
        }
    }

    /// Advance the chain one step and seal `plaintext`.
    pub(crate) fn encrypt(
        &mut self,
        session_id: SessionId,
        plaintext: &[u8],
    ) -> Result<GroupMessage, EngineError> {
        let mut chain = MessageChain::from_parts(self.chain_key, self.next_index);
        let secret = chain.advance()?;

        let mut message =
            GroupMessage { session_id, index: secret.index(), ciphertext: Vec::new() };
        let associated_data = message.associated_data();
        message.ciphertext = aead::seal(&secret, &associated_data, plaintext);

        self.chain_key = *chain.key_bytes();
        self.next_index = chain.next_index();
        Ok(message)
    }
}

impl Zeroize for OutboundGroupState {
    fn zeroize(&mut self) {
        self.chain_key.zeroize();
        self.next_index = 0;
    }
}

impl Drop for OutboundGroupState {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for OutboundGroupState {}
