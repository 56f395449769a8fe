// Copyright (c) 2022-2023 The MobileCoin Foundation

use log::info;

use cardvault::{apdu::status::StatusWord, CardHandle, Error, ErrorKind};
use cardvault_tests::card;

mod helpers;
use helpers::setup;

#[tokio::test(flavor = "multi_thread")]
async fn card_records() -> anyhow::Result<()> {
    let (sim, t, auth) = setup().await;

    card::invalid_inputs(t.clone()).await?;
    card::overwrite(t.clone(), &auth).await?;
    card::delete_twice(t.clone(), &auth).await?;
    card::signature_rejection(t.clone(), &auth).await?;

    assert_eq!(sim.stats().total, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn card_capacity() -> anyhow::Result<()> {
    let (sim, t, auth) = setup().await;

    card::capacity(t, &auth).await?;

    assert_eq!(sim.stats().total, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn card_reselect() -> anyhow::Result<()> {
    let (sim, t, auth) = setup().await;
    let h = CardHandle::from(t);

    let address = format!("0x{}", "3c".repeat(20));
    let key = cardvault::normalize::record_key("u1", &address)?;
    let sig = auth.sign(&key.auth_message())?;

    h.store("u1", &address, &[0x3C; 32]).await?;

    info!("resetting card");
    sim.reset();

    // First request following reset reports the deselected applet
    let e = h.read("u1", &address, &sig).await.unwrap_err();
    assert!(matches!(e, Error::Status(StatusWord::ConditionsNotSatisfied)), "{e}");
    assert_eq!(e.kind(), ErrorKind::ProtocolError);

    // Following requests re-select
    let m = h.read("u1", &address, &sig).await?;
    assert_eq!(&m[..], &[0x3C; 32]);

    h.delete("u1", &address, &sig).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn card_cplc() -> anyhow::Result<()> {
    let (_sim, t, _auth) = setup().await;
    let h = CardHandle::from(t);

    let a = h.cplc().await?;
    let b = h.cplc().await?;

    assert_eq!(a, cardvault_sim::SIM_CPLC.to_vec());
    assert_eq!(a, b);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn card_concurrent_handles() -> anyhow::Result<()> {
    let (sim, t, auth) = setup().await;
    let h = CardHandle::from(t);

    // Clones share the card lock, requests are serialised
    let mut tasks = vec![];
    for i in 0..8u8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            let address = format!("0x{}", hex::encode([0xE0 + i; 20]));
            h.store("u1", &address, &[i; 32]).await
        }));
    }

    let mut slots = vec![];
    for t in tasks {
        slots.push(t.await??.slot);
    }
    slots.sort();

    assert_eq!(slots, (0..8).collect::<Vec<u8>>());
    assert_eq!(sim.stats().total, 8);

    for i in 0..8u8 {
        let address = format!("0x{}", hex::encode([0xE0 + i; 20]));
        let sig = auth.sign(&cardvault::normalize::record_key("u1", &address)?.auth_message())?;
        h.delete("u1", &address, &sig).await?;
    }

    Ok(())
}
