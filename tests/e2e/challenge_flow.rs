//! Login challenge behaviour as seen by an authentication handler.

use loyalty_core::ChallengeStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);

/// generate at t=0, verify at +4min, replay at +4min+1s, then a reissue.
#[test]
fn test_wallet_login_scenario() {
    let store = ChallengeStore::new();
    let t0 = Instant::now();

    let n1 = store.generate_at("0xABC", t0);
    assert!(store.verify_at("0xABC", &n1, t0 + 4 * MINUTE));
    assert!(!store.verify_at("0xABC", &n1, t0 + 4 * MINUTE + Duration::from_secs(1)));

    let n1_old = store.generate_at("0xABC", t0);
    let n2 = store.generate_at("0xABC", t0 + Duration::from_secs(1));
    assert!(!store.verify_at("0xabc", &n1_old, t0 + Duration::from_secs(2)));
    assert!(store.verify_at("0xabc", &n2, t0 + Duration::from_secs(2)));
}

#[test]
fn test_expired_challenge_fails_even_with_correct_token() {
    let store = ChallengeStore::new();
    let t0 = Instant::now();

    let token = store.generate_at("0xdef", t0);
    assert!(!store.verify_at("0xdef", &token, t0 + 6 * MINUTE));
}

#[test]
fn test_failures_are_indistinguishable() {
    let store = ChallengeStore::new();
    let t0 = Instant::now();

    let expired = store.generate_at("expired", t0);
    store.generate_at("mismatched", t0 + 6 * MINUTE);
    let now = t0 + 6 * MINUTE;

    let results = [
        store.verify_at("never-issued", "00", now),
        store.verify_at("expired", &expired, now),
        store.verify_at("mismatched", "00", now),
    ];
    assert_eq!(results, [false, false, false]);
}

#[test]
fn test_distinct_principals_in_parallel() {
    let store = Arc::new(ChallengeStore::new());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..250 {
                    let principal = format!("0x{worker:02x}{i:04x}");
                    let token = store.generate(&principal);
                    assert!(store.verify(&principal, &token));
                    assert!(!store.verify(&principal, &token));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread");
    }
    assert!(store.is_empty());
    assert_eq!(store.stats().verified, 2000);
}

#[test]
fn test_same_principal_race_has_single_winner() {
    let store = Arc::new(ChallengeStore::new());
    let token = store.generate("0xrace");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let token = token.clone();
            thread::spawn(move || store.verify("0xrace", &token))
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().expect("verifier thread"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_generate_racing_verify_last_write_wins() {
    let store = Arc::new(ChallengeStore::new());
    let issued = Arc::new(Mutex::new(Vec::<String>::new()));
    let won = Arc::new(Mutex::new(Vec::<String>::new()));

    let generator = {
        let store = Arc::clone(&store);
        let issued = Arc::clone(&issued);
        thread::spawn(move || {
            for _ in 0..500 {
                let token = store.generate("0xRACE");
                issued.lock().push(token);
            }
        })
    };
    let verifiers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let issued = Arc::clone(&issued);
            let won = Arc::clone(&won);
            thread::spawn(move || {
                for _ in 0..500 {
                    let latest = issued.lock().last().cloned();
                    if let Some(token) = latest {
                        if store.verify("0xrace", &token) {
                            won.lock().push(token);
                        }
                    }
                }
            })
        })
        .collect();

    generator.join().expect("generator thread");
    for handle in verifiers {
        handle.join().expect("verifier thread");
    }

    let issued = issued.lock();
    let won = won.lock();
    let distinct: HashSet<_> = won.iter().collect();
    assert_eq!(distinct.len(), won.len(), "a token was accepted twice");

    let (last, superseded) = issued.split_last().expect("tokens issued");
    for token in superseded {
        assert!(!store.verify("0xrace", token));
    }
    assert_eq!(store.verify("0xrace", last), !won.contains(last));
    assert!(store.is_empty());
}
