// Copyright (c) 2022-2023 The MobileCoin Foundation

//! EIP-155 legacy transaction encoding, signing payloads and sender recovery
//!
//! Value transfers only, the data field is always empty.
//!
//! ```text
//! unsigned: rlp([nonce, gas_price, gas, to, value, data, chain_id, 0, 0])
//! signed:   rlp([nonce, gas_price, gas, to, value, data, v, r, s])
//! v = recid + 35 + 2 * chain_id
//! ```

use ethers_core::{
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use k256::{
    ecdsa::{RecoveryId, Signature, VerifyingKey},
    PublicKey,
};
use rlp::{Rlp, RlpStream};

use cardvault::mpc::public_key_address;

/// Length of an `r || s || v` signature
pub const SIG_LEN: usize = 65;

/// Fields in a legacy transaction list
const TX_FIELDS: usize = 9;

/// EIP-155 encoding errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Eip155Error {
    #[error("invalid signature length {0}, expected 65 bytes")]
    SignatureLength(usize),

    #[error("invalid signature recovery byte {0}")]
    RecoveryByte(u8),

    #[error("signature does not recover a public key")]
    Unrecoverable,

    #[error("malformed transaction RLP: {0}")]
    Rlp(String),

    #[error("transaction is not EIP-155 replay protected (v: {0})")]
    NotReplayProtected(u64),
}

impl From<rlp::DecoderError> for Eip155Error {
    fn from(e: rlp::DecoderError) -> Self {
        Eip155Error::Rlp(e.to_string())
    }
}

/// Unsigned legacy value transfer
#[derive(Clone, PartialEq, Debug)]
pub struct UnsignedTx {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub chain_id: u64,
}

impl UnsignedTx {
    fn append_fields(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        s.append(&self.to);
        s.append(&self.value);
        s.append_empty_data();
    }

    /// EIP-155 signing payload
    pub fn rlp(&self) -> Bytes {
        let mut s = RlpStream::new_list(TX_FIELDS);
        self.append_fields(&mut s);
        s.append(&self.chain_id);
        s.append(&0u8);
        s.append(&0u8);

        s.out().to_vec().into()
    }

    /// Message hash signed by the sender
    pub fn sighash(&self) -> H256 {
        H256::from(keccak256(self.rlp()))
    }
}

/// Build an unsigned transfer for `chain_id`
pub fn build_unsigned(
    to: Address,
    value: U256,
    nonce: U256,
    gas_limit: U256,
    gas_price: U256,
    chain_id: u64,
) -> UnsignedTx {
    UnsignedTx {
        nonce,
        gas_price,
        gas_limit,
        to,
        value,
        chain_id,
    }
}

/// Split an `r || s || v` signature, accepting `v` as a raw recovery id
/// (`0`, `1`) or in Ethereum form (`27`, `28`)
fn split_signature(sig: &[u8]) -> Result<(Signature, RecoveryId), Eip155Error> {
    if sig.len() != SIG_LEN {
        return Err(Eip155Error::SignatureLength(sig.len()));
    }

    let recid = match sig[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        v => return Err(Eip155Error::RecoveryByte(v)),
    };

    let s = Signature::from_slice(&sig[..64]).map_err(|_| Eip155Error::Unrecoverable)?;
    let r = RecoveryId::from_byte(recid).ok_or(Eip155Error::RecoveryByte(sig[64]))?;

    Ok((s, r))
}

/// Attach a signature to an unsigned transaction, returning the signed RLP
pub fn attach_signature(tx: &UnsignedTx, sig: &[u8]) -> Result<Bytes, Eip155Error> {
    let (s, recid) = split_signature(sig)?;

    let v = recid.to_byte() as u64 + 35 + 2 * tx.chain_id;
    let r = U256::from_big_endian(&s.r().to_bytes());
    let s = U256::from_big_endian(&s.s().to_bytes());

    let mut st = RlpStream::new_list(TX_FIELDS);
    tx.append_fields(&mut st);
    st.append(&v);
    st.append(&r);
    st.append(&s);

    Ok(st.out().to_vec().into())
}

/// Transaction hash of a signed transaction
pub fn tx_hash(signed: &[u8]) -> H256 {
    H256::from(keccak256(signed))
}

/// Recover the signer of a message hash
pub fn recover(hash: &H256, sig: &[u8]) -> Result<Address, Eip155Error> {
    let (s, recid) = split_signature(sig)?;

    let vk = VerifyingKey::recover_from_prehash(hash.as_bytes(), &s, recid)
        .map_err(|_| Eip155Error::Unrecoverable)?;

    Ok(Address::from(public_key_address(&PublicKey::from(&vk))))
}

/// Decode a signed transaction, returning the unsigned fields and the
/// recovered sender
pub fn recover_signer(raw: &[u8]) -> Result<(UnsignedTx, Address), Eip155Error> {
    let r = Rlp::new(raw);

    if !r.is_list() || r.item_count()? != TX_FIELDS {
        return Err(Eip155Error::Rlp("expected 9 item list".to_string()));
    }

    let data: Vec<u8> = r.val_at(5)?;
    if !data.is_empty() {
        return Err(Eip155Error::Rlp("unexpected call data".to_string()));
    }

    let v: u64 = r.val_at(6)?;
    if v < 35 {
        return Err(Eip155Error::NotReplayProtected(v));
    }

    let tx = UnsignedTx {
        nonce: r.val_at(0)?,
        gas_price: r.val_at(1)?,
        gas_limit: r.val_at(2)?,
        to: r.val_at(3)?,
        value: r.val_at(4)?,
        chain_id: (v - 35) / 2,
    };

    let sr: U256 = r.val_at(7)?;
    let ss: U256 = r.val_at(8)?;

    let mut sig = [0u8; SIG_LEN];
    sr.to_big_endian(&mut sig[..32]);
    ss.to_big_endian(&mut sig[32..64]);
    sig[64] = ((v - 35) % 2) as u8;

    let from = recover(&tx.sighash(), &sig)?;

    Ok((tx, from))
}
