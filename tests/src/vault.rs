// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Share vault tests

use log::info;
use rand_core::{OsRng, RngCore};

use cardvault::{
    apdu::status::StatusWord, normalize::record_key, CardHandle, Error, ErrorKind,
    LocalAuthorizer, ShareVault, Transport,
};

use crate::{test_address, TEST_USER};

/// Wrap a share, unwrap it, check tampering is detected then forget the key
pub async fn wrap_unwrap<T: Transport>(t: T, auth: &LocalAuthorizer) -> anyhow::Result<()> {
    let d = tempfile::tempdir()?;
    let out = d.path().join("out");
    std::fs::create_dir(&out)?;

    let vault = ShareVault::new(CardHandle::from(t)).with_temp_dir(&out);

    let address = test_address(0x7E);
    let key = record_key(TEST_USER, &address)?;
    let sig = auth.sign(&key.auth_message())?;

    // Random share contents, sized like a GG20 local key
    let mut share = vec![0u8; 6 * 1024];
    OsRng.fill_bytes(&mut share);

    let share_path = d.path().join("share.json");
    std::fs::write(&share_path, &share)?;

    info!("wrapping share");
    let blob = vault.wrap(TEST_USER, &address, &share_path).await?;
    assert!(!share_path.exists(), "share file not removed");
    assert!(!blob.is_empty());

    info!("unwrapping share");
    let p = vault.unwrap(TEST_USER, &address, &blob, &sig).await?;
    assert!(p.starts_with(&out));
    assert_eq!(std::fs::read(&p)?, share);

    // Temporary share is removed on close
    let unwrapped = p.to_path_buf();
    p.close()?;
    assert!(!unwrapped.exists());

    info!("unwrapping tampered blob");
    let mut tampered = blob.clone();
    let n = tampered.len() / 2;
    tampered[n] ^= 0x01;

    let e = vault
        .unwrap(TEST_USER, &address, &tampered, &sig)
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Corrupted(_)), "{e}");
    assert_eq!(e.kind(), ErrorKind::Fatal);
    assert_eq!(std::fs::read_dir(&out)?.count(), 0, "share left on failure");

    info!("forgetting wrapping key");
    vault.forget(TEST_USER, &address, &sig).await?;

    let e = vault
        .unwrap(TEST_USER, &address, &blob, &sig)
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Status(StatusWord::RecordNotFound)), "{e}");
    assert_eq!(e.kind(), ErrorKind::NotFound);

    Ok(())
}

/// Blobs cannot be opened using the wrapping key for another record
pub async fn cross_record<T: Transport>(t: T, auth: &LocalAuthorizer) -> anyhow::Result<()> {
    let d = tempfile::tempdir()?;
    let vault = ShareVault::new(CardHandle::from(t)).with_temp_dir(d.path());

    let (a, b) = (test_address(0x71), test_address(0x72));
    let sig_a = auth.sign(&record_key(TEST_USER, &a)?.auth_message())?;
    let sig_b = auth.sign(&record_key(TEST_USER, &b)?.auth_message())?;

    let mut blobs = vec![];
    for (addr, v) in [(&a, 0xA1u8), (&b, 0xB2u8)] {
        let p = d.path().join(format!("{v:02x}.json"));
        std::fs::write(&p, [v; 512])?;
        blobs.push(vault.wrap(TEST_USER, addr, &p).await?);
    }

    let e = vault
        .unwrap(TEST_USER, &b, &blobs[0], &sig_b)
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Corrupted(_)), "{e}");

    let p = vault.unwrap(TEST_USER, &b, &blobs[1], &sig_b).await?;
    assert_eq!(std::fs::read(&p)?, [0xB2; 512]);

    vault.forget(TEST_USER, &a, &sig_a).await?;
    vault.forget(TEST_USER, &b, &sig_b).await?;

    Ok(())
}
