// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Threshold ECDSA (MPC) binary adapter
//!
//! The MPC binary is a black box invoked with `keygen` and `sign`
//! subcommands, each call runs in a fresh working directory.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use k256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey};
use log::{debug, info};
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use tempfile::TempDir;
use tokio::process::Command;
use zeroize::Zeroizing;

use cardvault_apdu::record::ADDRESS_LEN;

use crate::Error;

/// Default MPC binary timeout
pub const DEFAULT_MPC_TIMEOUT: Duration = Duration::from_secs(300);

/// Ethereum signature length, `r || s || v`
pub const ETH_SIG_LEN: usize = 65;

/// Curve expected in MPC outputs
const MPC_CURVE: &str = "secp256k1";

/// Share file name within the keygen working directory
const SHARE_FILE: &str = "share.json";

/// Adapter for the external MPC binary
#[derive(Clone, Debug)]
pub struct MpcRunner {
    binary: PathBuf,
    timeout: Duration,
    manager: Option<String>,
}

/// Share file produced by keygen, removed along with its working
/// directory on drop
pub struct ShareFile {
    dir: TempDir,
    path: PathBuf,
}

impl ShareFile {
    /// Path of the share file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the share file contents
    pub async fn read(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
        Ok(Zeroizing::new(tokio::fs::read(&self.path).await?))
    }

    /// Working directory for the keygen call
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl MpcRunner {
    /// Create a runner for the binary at `binary`
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_MPC_TIMEOUT,
            manager: None,
        }
    }

    /// Set the binary timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the MPC manager (coordination) address, passed as `--address`
    pub fn with_manager(mut self, addr: impl Into<String>) -> Self {
        self.manager = Some(addr.into());
        self
    }

    /// Run distributed key generation as party `index` of `parties` with
    /// signing threshold `threshold`
    pub async fn keygen(&self, threshold: u16, parties: u16, index: u16) -> Result<ShareFile, Error> {
        if threshold == 0 || threshold > parties || index == 0 || index > parties {
            return Err(Error::InvalidInput(format!(
                "keygen parameters t={threshold} n={parties} i={index}"
            )));
        }

        let dir = TempDir::new()?;
        let path = dir.path().join(SHARE_FILE);

        info!(
            "Starting MPC keygen (t: {}, n: {}, i: {})",
            threshold, parties, index
        );

        let args = [
            "keygen".to_string(),
            "--threshold".to_string(),
            threshold.to_string(),
            "--parties".to_string(),
            parties.to_string(),
            "--index".to_string(),
            index.to_string(),
            "--out".to_string(),
            path.display().to_string(),
        ];
        self.run(dir.path(), &args).await?;

        if !path.exists() {
            return Err(Error::Mpc("keygen produced no share file".to_string()));
        }

        Ok(ShareFile { dir, path })
    }

    /// Run a signing session over `data` with the provided party indices,
    /// returning an Ethereum `r || s || v` signature
    pub async fn sign(
        &self,
        parties: &[u16],
        data: &[u8; 32],
        share: &Path,
    ) -> Result<[u8; ETH_SIG_LEN], Error> {
        if parties.is_empty() {
            return Err(Error::InvalidInput("no signing parties".to_string()));
        }

        let csv = parties
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let dir = TempDir::new()?;

        info!("Starting MPC signing (parties: {})", csv);

        let args = [
            "sign".to_string(),
            "--parties".to_string(),
            csv,
            "--data".to_string(),
            hex::encode(data),
            "--share".to_string(),
            share.display().to_string(),
        ];
        let out = self.run(dir.path(), &args).await?;

        parse_signature(&out)
    }

    /// Execute the binary in `cwd`, returning stdout
    async fn run(&self, cwd: &Path, args: &[String]) -> Result<String, Error> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(m) = &self.manager {
            cmd.arg("--address").arg(m);
        }

        debug!("Executing {} {}", self.binary.display(), args[0]);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Mpc(format!("failed to start {}: {e}", self.binary.display())))?;

        // Dropping the child on timeout kills the process
        let out = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(r) => r?,
            Err(_) => return Err(Error::MpcTimeout),
        };

        if !out.status.success() {
            return Err(Error::Mpc(format!(
                "{} failed ({}): {}",
                args[0],
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }
}

#[derive(Deserialize)]
struct RawScalar {
    curve: Option<String>,
    scalar: Vec<u8>,
}

#[derive(Deserialize)]
struct RawSignature {
    r: RawScalar,
    s: RawScalar,
    recid: u8,
}

#[derive(Deserialize)]
struct RawPoint {
    curve: Option<String>,
    point: Vec<u8>,
}

#[derive(Deserialize)]
struct RawShare {
    y_sum_s: RawPoint,
}

fn check_curve(curve: &Option<String>) -> Result<(), Error> {
    match curve.as_deref() {
        None | Some(MPC_CURVE) => Ok(()),
        Some(c) => Err(Error::Mpc(format!("unexpected curve: {c}"))),
    }
}

/// Left-pad a big-endian scalar to 32 bytes
fn pad_scalar(s: &RawScalar) -> Result<[u8; 32], Error> {
    check_curve(&s.curve)?;

    if s.scalar.is_empty() || s.scalar.len() > 32 {
        return Err(Error::Mpc(format!("scalar length {}", s.scalar.len())));
    }

    let mut b = [0u8; 32];
    b[32 - s.scalar.len()..].copy_from_slice(&s.scalar);
    Ok(b)
}

/// Parse MPC signing output to an Ethereum `r || s || v` signature, `v = recid + 27`.
///
/// The binary may log before the signature object, the last parseable JSON line is used.
pub fn parse_signature(out: &str) -> Result<[u8; ETH_SIG_LEN], Error> {
    let raw = serde_json::from_str::<RawSignature>(out.trim())
        .ok()
        .or_else(|| {
            out.lines()
                .rev()
                .filter(|l| l.trim_start().starts_with('{'))
                .find_map(|l| serde_json::from_str::<RawSignature>(l.trim()).ok())
        })
        .ok_or_else(|| Error::Mpc("no signature object in output".to_string()))?;

    if raw.recid > 1 {
        return Err(Error::Mpc(format!("unsupported recovery id: {}", raw.recid)));
    }

    let mut sig = [0u8; ETH_SIG_LEN];
    sig[..32].copy_from_slice(&pad_scalar(&raw.r)?);
    sig[32..64].copy_from_slice(&pad_scalar(&raw.s)?);
    sig[64] = raw.recid + 27;

    Ok(sig)
}

/// Derive the account address from a keygen share file
///
/// `y_sum_s.point` holds the compressed group public key, the address is the
/// last 20 bytes of keccak256 over the uncompressed point (excluding prefix).
pub fn share_address(share: &[u8]) -> Result<[u8; ADDRESS_LEN], Error> {
    let s: RawShare =
        serde_json::from_slice(share).map_err(|e| Error::Mpc(format!("share parse: {e}")))?;

    check_curve(&s.y_sum_s.curve)?;

    let pk = PublicKey::from_sec1_bytes(&s.y_sum_s.point)
        .map_err(|_| Error::Mpc("invalid share public key".to_string()))?;

    Ok(public_key_address(&pk))
}

/// Compute the Ethereum address for a secp256k1 public key
pub fn public_key_address(pk: &PublicKey) -> [u8; ADDRESS_LEN] {
    let p = pk.to_encoded_point(false);
    let h = Keccak256::digest(&p.as_bytes()[1..]);

    let mut a = [0u8; ADDRESS_LEN];
    a.copy_from_slice(&h[32 - ADDRESS_LEN..]);
    a
}

/// Format an address with EIP-55 mixed-case checksum
pub fn checksum_address(a: &[u8; ADDRESS_LEN]) -> String {
    let lower = hex::encode(a);
    let h = Keccak256::digest(lower.as_bytes());

    let mut s = String::with_capacity(2 + lower.len());
    s.push_str("0x");

    for (i, c) in lower.chars().enumerate() {
        let nibble = (h[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
        match c.is_ascii_alphabetic() && nibble >= 8 {
            true => s.push(c.to_ascii_uppercase()),
            false => s.push(c),
        }
    }

    s
}
