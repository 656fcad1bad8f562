use crate::common::traits::{RandomnessFulfillment, RandomnessOracle, RandomnessRequest};
use crate::common::types::{RandomValue, RequestId};
use crate::errors::{WagerError, WagerResult};
use dashmap::DashMap;
use schnorrkel::{context::SigningContext, ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

const VRF_SIGNING_CONTEXT: &[u8] = b"wagerpool-vrf";

/// Proof material behind one fulfillment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrfBundle {
    pub request_id: RequestId,
    /// Message that was signed
    pub input_message: String,
    #[serde(with = "hex::serde")]
    pub output: RandomValue,
    /// Hex-encoded schnorrkel signature (64 bytes)
    pub proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
}

impl VrfBundle {
    pub fn fulfillment(&self) -> RandomnessFulfillment {
        RandomnessFulfillment {
            request_id: self.request_id,
            random: self.output,
        }
    }
}

/// In-process randomness oracle.
///
/// The public key is the commitment: it is fixed before any request, and
/// every output is SHA-256 of a signature over the request, so it can be
/// checked by anyone holding the key and cannot be chosen by the oracle.
pub struct VrfOracle {
    keypair: Arc<Keypair>,
    next_request: AtomicU64,
    pending: DashMap<RequestId, RandomnessRequest>,
    wake: Notify,
}

impl VrfOracle {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            next_request: AtomicU64::new(0),
            pending: DashMap::new(),
            wake: Notify::new(),
        }
    }

    /// Oracle with a random keypair (for testing)
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Oracle whose keypair is derived from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> WagerResult<Self> {
        let mini = MiniSecretKey::from_bytes(seed)
            .map_err(|e| WagerError::Oracle(format!("Invalid VRF seed: {:?}", e)))?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519)))
    }

    fn input_message(request_id: RequestId, request: &RandomnessRequest) -> String {
        format!(
            "{}:{}:{}:{}",
            hex::encode(request.key_hash),
            request.subscription_id,
            request.confirmations,
            request_id
        )
    }

    /// Continues numbering after `last`, so handles recorded by a restored
    /// ledger are never issued again
    pub fn resume_after(&self, last: RequestId) {
        self.next_request.fetch_max(last, Ordering::SeqCst);
    }

    /// Produces the output for one pending request and forgets it
    pub fn fulfill(&self, request_id: RequestId) -> Option<VrfBundle> {
        let (_, request) = self.pending.remove(&request_id)?;
        let input_message = Self::input_message(request_id, &request);

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(input_message.as_bytes()));
        let signature_bytes = signature.to_bytes();

        let mut output = [0u8; 32];
        output.copy_from_slice(&Sha256::digest(signature_bytes));

        Some(VrfBundle {
            request_id,
            input_message,
            output,
            proof: hex::encode(signature_bytes),
            public_key: self.public_key_hex(),
        })
    }

    /// Fulfills everything queued so far, oldest handle first
    pub fn fulfill_all(&self) -> Vec<VrfBundle> {
        let mut ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.fulfill(id)).collect()
    }

    /// Drops a queued request without answering it
    pub fn withhold(&self, request_id: RequestId) -> bool {
        self.pending.remove(&request_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Answers requests as they arrive and forwards them to `sink`.
    /// Returns once the receiving side is gone.
    pub async fn run(self: Arc<Self>, sink: mpsc::UnboundedSender<RandomnessFulfillment>) {
        loop {
            self.wake.notified().await;
            for bundle in self.fulfill_all() {
                tracing::debug!(request_id = bundle.request_id, "randomness fulfilled");
                if sink.send(bundle.fulfillment()).is_err() {
                    tracing::info!("fulfillment receiver closed, VRF oracle stopping");
                    return;
                }
            }
        }
    }

    /// Checks a bundle against its public key
    pub fn verify(bundle: &VrfBundle) -> Result<bool, String> {
        let public_key_bytes = hex::decode(&bundle.public_key)
            .map_err(|e| format!("Invalid public key hex: {}", e))?;
        let proof_bytes = hex::decode(&bundle.proof)
            .map_err(|e| format!("Invalid VRF proof hex: {}", e))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| format!("Invalid public key: {:?}", e))?;
        let signature = Signature::from_bytes(&proof_bytes)
            .map_err(|e| format!("Invalid signature: {:?}", e))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(bundle.input_message.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        Ok(Sha256::digest(&proof_bytes).as_slice() == bundle.output.as_slice())
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.keypair.public.to_bytes().to_vec()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}

impl RandomnessOracle for VrfOracle {
    fn request_random(&self, request: RandomnessRequest) -> WagerResult<RequestId> {
        if request.num_words != 1 {
            return Err(WagerError::Oracle(format!(
                "unsupported word count {}",
                request.num_words
            )));
        }
        let request_id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.insert(request_id, request);
        self.wake.notify_one();
        Ok(request_id)
    }
}
