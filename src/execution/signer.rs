//! Isolated signing service
//!
//! The keypair is moved into the signing task at startup and never
//! leaves it. Callers hold a `SigningHandle` that sends message bytes
//! and receives signatures. A token-bucket rate cap bounds how fast any
//! bug elsewhere can drain the wallet via signature flooding.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use std::path::Path;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Pending signing requests before callers see backpressure
const SIGNING_QUEUE_CAPACITY: usize = 32;

struct SignRequest {
    message: Vec<u8>,
    reply: oneshot::Sender<Signature>,
}

/// Caller-side handle
#[derive(Clone)]
pub struct SigningHandle {
    tx: mpsc::Sender<SignRequest>,
    pubkey: Pubkey,
}

impl SigningHandle {
    /// Sign arbitrary message bytes
    pub async fn sign(&self, message: Vec<u8>) -> Result<Signature> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SignRequest { message, reply })
            .await
            .map_err(|_| Error::Internal("signing service is gone".into()))?;
        rx.await
            .map_err(|_| Error::SigningRateCap)
    }

    /// The wallet's public key (safe to share)
    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }
}

/// The signing task owner
pub struct SigningService {
    keypair: Keypair,
    rx: mpsc::Receiver<SignRequest>,
    rate_cap_per_sec: u32,
}

impl SigningService {
    /// Load the keypair from the path in `KEYPAIR_PATH`, refusing
    /// world-readable files, and return the service plus its handle.
    pub fn from_env(rate_cap_per_sec: u32) -> Result<(Self, SigningHandle)> {
        let path = std::env::var("KEYPAIR_PATH")
            .map_err(|_| Error::MissingEnvVar("KEYPAIR_PATH".into()))?;
        let keypair = load_keypair(Path::new(&path))?;
        Ok(Self::new(keypair, rate_cap_per_sec))
    }

    pub fn new(keypair: Keypair, rate_cap_per_sec: u32) -> (Self, SigningHandle) {
        let (tx, rx) = mpsc::channel(SIGNING_QUEUE_CAPACITY);
        let pubkey = keypair.pubkey();

        let service = Self {
            keypair,
            rx,
            rate_cap_per_sec,
        };

        (service, SigningHandle { tx, pubkey })
    }

    /// Run the signing loop. Requests over the rate cap are dropped,
    /// which the caller sees as `SigningRateCap`.
    pub async fn run(mut self) {
        info!("signing service started for {}", self.keypair.pubkey());

        let mut window_start = Instant::now();
        let mut signed_in_window = 0u32;

        while let Some(request) = self.rx.recv().await {
            if window_start.elapsed().as_secs() >= 1 {
                window_start = Instant::now();
                signed_in_window = 0;
            }

            if signed_in_window >= self.rate_cap_per_sec {
                warn!("signing rate cap hit, dropping request");
                drop(request.reply);
                continue;
            }
            signed_in_window += 1;

            let signature = self.keypair.sign_message(&request.message);
            let _ = request.reply.send(signature);
        }

        info!("signing service stopped");
    }
}

/// Read a JSON keypair file, enforcing 600-style permissions on Unix
fn load_keypair(path: &Path) -> Result<Keypair> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::InvalidKeypair(format!("cannot stat {}: {e}", path.display())))?;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(Error::InsecureKeypair(format!(
                "{} has permissions {:o}; run chmod 600",
                path.display(),
                mode & 0o777
            )));
        }
    }

    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidKeypair(format!("cannot read {}: {e}", path.display())))?;
    let bytes: Vec<u8> = serde_json::from_str(&data)
        .map_err(|e| Error::InvalidKeypair(format!("bad keypair JSON: {e}")))?;
    Keypair::from_bytes(&bytes).map_err(|e| Error::InvalidKeypair(e.to_string()))
}
