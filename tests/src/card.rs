// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card record tests

use log::{debug, info};

use cardvault::{
    apdu::status::StatusWord, normalize::record_key, CardHandle, Error, ErrorKind,
    LocalAuthorizer, Transport,
};

use crate::{test_address, TEST_USER};

/// Number of record slots on the card
pub const NUM_SLOTS: usize = 100;

/// Sign the authorisation message for `(user, address)`
fn auth_sig(auth: &LocalAuthorizer, user: &str, address: &str) -> anyhow::Result<Vec<u8>> {
    let key = record_key(user, address)?;
    Ok(auth.sign(&key.auth_message())?)
}

/// Check an error is the expected card status
fn is_status(r: &Error, sw: StatusWord) -> bool {
    matches!(r, Error::Status(s) if *s == sw)
}

/// STORE of an existing key overwrites the message in place
pub async fn overwrite<T: Transport>(t: T, auth: &LocalAuthorizer) -> anyhow::Result<()> {
    let card = CardHandle::from(t);
    let (user, address) = ("u1", format!("0x{}", hex::encode([0xAA; 20])));

    info!("storing initial message");
    let a = card.store(user, &address, &[0x11; 32]).await?;

    info!("overwriting message");
    let b = card.store(user, &address, &[0x22; 32]).await?;

    assert_eq!(a.slot, b.slot, "overwrite moved slot");
    assert_eq!(a.total, b.total, "overwrite changed record count");

    let sig = auth_sig(auth, user, &address)?;
    let m = card.read(user, &address, &sig).await?;
    assert_eq!(&m[..], &[0x22; 32]);

    // Cleanup
    let d = card.delete(user, &address, &sig).await?;
    assert_eq!(d.slot, a.slot);
    assert_eq!(d.total, a.total - 1);

    Ok(())
}

/// Deleted records are not found, repeated deletes fail
pub async fn delete_twice<T: Transport>(t: T, auth: &LocalAuthorizer) -> anyhow::Result<()> {
    let card = CardHandle::from(t);
    let address = test_address(0xD0);
    let sig = auth_sig(auth, TEST_USER, &address)?;

    let s = card.store(TEST_USER, &address, &[0x33; 32]).await?;

    let d = card.delete(TEST_USER, &address, &sig).await?;
    assert_eq!(d.slot, s.slot);
    assert_eq!(d.total, s.total - 1);

    info!("reading deleted record");
    let e = card.read(TEST_USER, &address, &sig).await.unwrap_err();
    assert!(is_status(&e, StatusWord::RecordNotFound), "{e}");
    assert_eq!(e.kind(), ErrorKind::NotFound);

    info!("deleting deleted record");
    let e = card.delete(TEST_USER, &address, &sig).await.unwrap_err();
    assert!(is_status(&e, StatusWord::RecordNotFound), "{e}");

    Ok(())
}

/// Reads and deletes require a valid authorisation signature
pub async fn signature_rejection<T: Transport>(
    t: T,
    auth: &LocalAuthorizer,
) -> anyhow::Result<()> {
    let card = CardHandle::from(t);
    let address = test_address(0x5A);
    let sig = auth_sig(auth, TEST_USER, &address)?;

    card.store(TEST_USER, &address, &[0x44; 32]).await?;

    info!("reading with corrupted signature");
    let mut bad = sig.clone();
    bad[0] ^= 0xFF;

    let e = card.read(TEST_USER, &address, &bad).await.unwrap_err();
    assert!(is_status(&e, StatusWord::SignatureInvalid), "{e}");
    assert_eq!(e.kind(), ErrorKind::Unauthorized);

    info!("reading with signature from another key");
    let other = auth_sig(&LocalAuthorizer::random(), TEST_USER, &address)?;
    let e = card.read(TEST_USER, &address, &other).await.unwrap_err();
    assert!(is_status(&e, StatusWord::SignatureInvalid), "{e}");

    info!("reading with signature for another record");
    let wrong = auth_sig(auth, TEST_USER, &test_address(0x5B))?;
    let e = card.read(TEST_USER, &address, &wrong).await.unwrap_err();
    assert!(is_status(&e, StatusWord::SignatureInvalid), "{e}");

    let e = card.delete(TEST_USER, &address, &bad).await.unwrap_err();
    assert!(is_status(&e, StatusWord::SignatureInvalid), "{e}");

    info!("reading with valid signature");
    let m = card.read(TEST_USER, &address, &sig).await?;
    assert_eq!(&m[..], &[0x44; 32]);

    card.delete(TEST_USER, &address, &sig).await?;

    Ok(())
}

/// Malformed inputs are rejected before any card exchange
pub async fn invalid_inputs<T: Transport>(t: T) -> anyhow::Result<()> {
    let card = CardHandle::from(t);
    let address = test_address(0x1E);

    let tests: Vec<(&str, Result<_, Error>)> = vec![
        (
            "short message",
            card.store(TEST_USER, &address, &[0u8; 31]).await.map(|_| ()),
        ),
        (
            "long message",
            card.store(TEST_USER, &address, &[0u8; 33]).await.map(|_| ()),
        ),
        (
            "short address",
            card.store(TEST_USER, "0x0011", &[0u8; 32]).await.map(|_| ()),
        ),
        (
            "short signature",
            card.read(TEST_USER, &address, &[0x30; 69]).await.map(|_| ()),
        ),
        (
            "long signature",
            card.delete(TEST_USER, &address, &[0x30; 73]).await.map(|_| ()),
        ),
    ];

    for (name, r) in tests {
        debug!("checking {}", name);

        match r {
            Err(Error::InvalidInput(_)) => (),
            r => panic!("{name}: expected invalid input, got: {r:?}"),
        }
    }

    Ok(())
}

/// Fill the card, check exhaustion and freed slot reuse.
///
/// Requires an empty card.
pub async fn capacity<T: Transport>(t: T, auth: &LocalAuthorizer) -> anyhow::Result<()> {
    let card = CardHandle::from(t);

    info!("filling {} slots", NUM_SLOTS);
    for i in 0..NUM_SLOTS {
        let r = card
            .store(TEST_USER, &test_address(i as u8), &[i as u8; 32])
            .await?;

        assert_eq!(r.slot as usize, i);
        assert_eq!(r.total as usize, i + 1);
    }

    info!("storing to full card");
    let e = card
        .store(TEST_USER, &test_address(0xF0), &[0xF0; 32])
        .await
        .unwrap_err();
    assert!(is_status(&e, StatusWord::NotEnoughSpace), "{e}");
    assert_eq!(e.kind(), ErrorKind::ResourceExhausted);

    // Overwrite still succeeds when full
    let r = card.store(TEST_USER, &test_address(3), &[0x03; 32]).await?;
    assert_eq!(r.slot, 3);

    info!("freeing slot 42");
    let sig = auth_sig(auth, TEST_USER, &test_address(42))?;
    let d = card.delete(TEST_USER, &test_address(42), &sig).await?;
    assert_eq!(d.slot, 42);
    assert_eq!(d.total as usize, NUM_SLOTS - 1);

    let r = card
        .store(TEST_USER, &test_address(0xF0), &[0xF0; 32])
        .await?;
    assert_eq!(r.slot, 42, "freed slot not reused");
    assert_eq!(r.total as usize, NUM_SLOTS);

    // Records survive neighbouring operations
    let sig = auth_sig(auth, TEST_USER, &test_address(41))?;
    let m = card.read(TEST_USER, &test_address(41), &sig).await?;
    assert_eq!(&m[..], &[41; 32]);

    info!("clearing records");
    for a in (0..NUM_SLOTS as u8).filter(|i| *i != 42).chain([0xF0]) {
        let sig = auth_sig(auth, TEST_USER, &test_address(a))?;
        card.delete(TEST_USER, &test_address(a), &sig).await?;
    }

    Ok(())
}
